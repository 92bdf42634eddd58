//! Ingestion orchestrator and read-side operations.
//!
//! [`LabPipeline::ingest`] walks one upload through a fixed sequence of
//! stages:
//!
//! ```text
//! validated → extracted → mapped → fingerprinted → dedup-checked → persisted
//! ```
//!
//! Each stage either hands its output to the next or stops the run with an
//! [`IngestError`]. Nothing is written before the dedup check passes, and the
//! write itself is a single atomic [`ReportStore::create_report`] call.
//!
//! # Logging
//!
//! Stage boundaries are `debug`. A completed ingestion and a detected
//! duplicate are `info`. Extractor failures are `warn`; storage failures
//! are `error`. The inner error of an extractor or storage failure goes to
//! the log and is not rendered by the returned error.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::IngestError;
use crate::extraction::DocumentExtractor;
use crate::fingerprint::generate_fingerprint;
use crate::mapper::map_document;
use crate::models::{clean_text, Report, ReportSummary, TimelineEntry};
use crate::store::{PageLimits, PatientDirectory, ReportStore};

/// MIME types the extraction service accepts.
pub const ALLOWED_MIME_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];

/// One upload to ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub patient_id: String,
    /// Location of the already-uploaded document, passed to the extractor
    /// as-is.
    pub document_uri: String,
    pub mime_type: String,
    pub uploaded_by: String,
}

impl IngestRequest {
    /// Check required fields and the MIME allow-list.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.patient_id.trim().is_empty() {
            return Err(IngestError::InvalidInput("patient id is required".into()));
        }
        if self.uploaded_by.trim().is_empty() {
            return Err(IngestError::InvalidInput("uploader id is required".into()));
        }
        if self.document_uri.trim().is_empty() {
            return Err(IngestError::InvalidDocument("document uri is required".into()));
        }
        let mime = self.mime_type.trim();
        if !ALLOWED_MIME_TYPES
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime))
        {
            return Err(IngestError::InvalidDocument(format!(
                "unsupported mime type {:?}; expected one of {}",
                self.mime_type,
                ALLOWED_MIME_TYPES.join(", ")
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestStage {
    Validated,
    Extracted,
    Mapped,
    Fingerprinted,
    DedupChecked,
    Persisted,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IngestStage::Validated => "validated",
            IngestStage::Extracted => "extracted",
            IngestStage::Mapped => "mapped",
            IngestStage::Fingerprinted => "fingerprinted",
            IngestStage::DedupChecked => "dedup-checked",
            IngestStage::Persisted => "persisted",
        })
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

/// Lab report pipeline over pluggable extractor and store backends.
pub struct LabPipeline {
    extractor: Arc<dyn DocumentExtractor>,
    reports: Arc<dyn ReportStore>,
    patients: Arc<dyn PatientDirectory>,
    limits: PageLimits,
}

impl LabPipeline {
    pub fn new(
        extractor: Arc<dyn DocumentExtractor>,
        reports: Arc<dyn ReportStore>,
        patients: Arc<dyn PatientDirectory>,
    ) -> Self {
        Self {
            extractor,
            reports,
            patients,
            limits: PageLimits::default(),
        }
    }

    pub fn with_page_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Ingest one uploaded lab report.
    ///
    /// Returns the persisted report with its fingerprint and timestamps set.
    ///
    /// # Errors
    ///
    /// - [`IngestError::InvalidInput`] / [`IngestError::InvalidDocument`]
    ///   when the request fails validation; the extractor is not called.
    /// - [`IngestError::DocumentProcessingFailed`] when the extractor fails.
    /// - [`IngestError::InvalidInput`] when a panel or parameter has no name.
    /// - [`IngestError::DuplicateReport`] when the patient already has a
    ///   report with the same content.
    /// - [`IngestError::Storage`] for persistence failures.
    pub async fn ingest(&self, request: &IngestRequest) -> Result<Report, IngestError> {
        request.validate()?;
        let patient_id = request.patient_id.trim();
        debug!(stage = %IngestStage::Validated, patient_id, uri = %request.document_uri);

        let document = self
            .extractor
            .extract(request.document_uri.trim(), &request.mime_type.trim().to_ascii_lowercase())
            .await
            .map_err(|e| {
                warn!(
                    extractor = self.extractor.name(),
                    patient_id,
                    error = %format!("{e:#}"),
                    "document extraction failed"
                );
                IngestError::DocumentProcessingFailed(e.into())
            })?;
        debug!(stage = %IngestStage::Extracted, patient_id, entities = document.entities.len());

        let mut report = map_document(&document, patient_id, &request.uploaded_by)?;
        debug!(
            stage = %IngestStage::Mapped,
            patient_id,
            report_id = %report.id,
            panels = report.results.len(),
            parameters = report.item_count()
        );

        let fingerprint = generate_fingerprint(patient_id, &report);
        if report.item_count() == 0 {
            warn!(
                patient_id,
                report_id = %report.id,
                "report has no parameters; fingerprint cannot tell empty reports apart"
            );
        }
        debug!(stage = %IngestStage::Fingerprinted, patient_id, fingerprint = short(&fingerprint));

        if self
            .reports
            .exists_by_fingerprint(patient_id, &fingerprint)
            .await
            .inspect_err(|e| log_storage_failure(e, patient_id))?
        {
            info!(
                patient_id,
                fingerprint = short(&fingerprint),
                "duplicate lab report; nothing written"
            );
            return Err(IngestError::DuplicateReport {
                patient_id: patient_id.to_string(),
                fingerprint,
            });
        }
        debug!(stage = %IngestStage::DedupChecked, patient_id);

        report.fingerprint = Some(fingerprint);
        match self.reports.create_report(&mut report).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => {
                info!(patient_id, "concurrent duplicate rejected by store");
                return Err(e);
            }
            Err(e) => {
                log_storage_failure(&e, patient_id);
                return Err(e);
            }
        }

        info!(
            stage = %IngestStage::Persisted,
            patient_id,
            report_id = %report.id,
            fingerprint = short(report.fingerprint.as_deref().unwrap_or_default()),
            panels = report.results.len(),
            parameters = report.item_count(),
            "lab report ingested"
        );
        Ok(report)
    }

    /// Full report by id.
    pub async fn get_report(&self, report_id: &str) -> Result<Report, IngestError> {
        let id = required(report_id, "report id")?;
        self.reports
            .find_report(&id)
            .await?
            .ok_or(IngestError::ReportNotFound(id))
    }

    /// Compact listing of a patient's reports, newest first.
    pub async fn list_summaries(
        &self,
        patient_id: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<ReportSummary>, IngestError> {
        let reports = self.list_full(patient_id, limit, offset).await?;
        Ok(reports.iter().map(ReportSummary::from).collect())
    }

    /// A patient's reports with all panels and parameters, newest first.
    pub async fn list_full(
        &self,
        patient_id: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Report>, IngestError> {
        let patient_id = self.known_patient(patient_id).await?;
        let page = self.limits.page(limit, offset);
        self.reports.list_reports(&patient_id, page).await
    }

    /// History of one parameter for a patient, newest first.
    pub async fn timeline(
        &self,
        patient_id: &str,
        parameter_name: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<TimelineEntry>, IngestError> {
        let parameter = required(parameter_name, "parameter name")?;
        let patient_id = self.known_patient(patient_id).await?;
        let page = self.limits.page(limit, offset);
        self.reports.timeline(&patient_id, &parameter, page).await
    }

    /// Hard-delete a report with its panels and parameters.
    pub async fn delete_report(&self, report_id: &str) -> Result<(), IngestError> {
        let id = required(report_id, "report id")?;
        if self.reports.delete_report(&id).await? {
            info!(report_id = %id, "lab report deleted");
            Ok(())
        } else {
            Err(IngestError::ReportNotFound(id))
        }
    }

    async fn known_patient(&self, patient_id: &str) -> Result<String, IngestError> {
        let id = required(patient_id, "patient id")?;
        match self.patients.find_patient(&id).await? {
            Some(patient) => Ok(patient.id),
            None => Err(IngestError::PatientNotFound(id)),
        }
    }
}

fn required(value: &str, what: &str) -> Result<String, IngestError> {
    clean_text(value).ok_or_else(|| IngestError::InvalidInput(format!("{what} is required")))
}

fn log_storage_failure(err: &IngestError, patient_id: &str) {
    let cause = std::error::Error::source(err)
        .map(ToString::to_string)
        .unwrap_or_default();
    error!(patient_id, error = %err, cause = %cause, "lab report storage failed");
}
