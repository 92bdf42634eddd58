//! Lab report aggregate and read models.
//!
//! A [`Report`] owns its [`LabResult`] panels, which own their
//! [`ResultItem`] parameters. The tree is created once at ingestion and is
//! never partially updated; corrections arrive as new reports.
//!
//! Optional text fields follow a single rule: present with a trimmed,
//! non-empty value, or absent. [`clean_text`] and [`trim_to_none`] are the
//! only places that rule is implemented.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;

/// Trim `raw`; blank input becomes `None`.
pub fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// [`clean_text`] lifted over an optional value.
pub fn trim_to_none(value: Option<String>) -> Option<String> {
    value.as_deref().and_then(clean_text)
}

/// Lookup key for a parameter name: trimmed and lowercased with full
/// Unicode case folding, so `"Ácido Úrico"` and `"ÁCIDO ÚRICO"` agree.
pub fn parameter_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Current UTC time truncated to whole seconds, matching store precision.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// One laboratory document for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub patient_dob: Option<DateTime<Utc>>,
    pub lab_name: Option<String>,
    pub lab_phone: Option<String>,
    pub insurance_provider: Option<String>,
    pub requesting_doctor: Option<String>,
    pub technical_manager: Option<String>,
    pub report_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    pub uploaded_by: String,
    pub fingerprint: Option<String>,
    pub results: Vec<LabResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// Create an empty report with a fresh id.
    ///
    /// Both the patient reference and the uploader reference are required.
    pub fn new(patient_id: &str, uploaded_by: &str) -> Result<Self, IngestError> {
        let patient_id = clean_text(patient_id)
            .ok_or_else(|| IngestError::InvalidInput("patient id is required".into()))?;
        let uploaded_by = clean_text(uploaded_by)
            .ok_or_else(|| IngestError::InvalidInput("uploader id is required".into()))?;
        let now = now_utc();

        Ok(Self {
            id: new_id(),
            patient_id,
            patient_name: None,
            patient_dob: None,
            lab_name: None,
            lab_phone: None,
            insurance_provider: None,
            requesting_doctor: None,
            technical_manager: None,
            report_date: None,
            raw_text: None,
            uploaded_by,
            fingerprint: None,
            results: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Re-apply the trim-or-absent rule to every optional header field.
    pub fn normalize(&mut self) {
        self.patient_name = trim_to_none(self.patient_name.take());
        self.lab_name = trim_to_none(self.lab_name.take());
        self.lab_phone = trim_to_none(self.lab_phone.take());
        self.insurance_provider = trim_to_none(self.insurance_provider.take());
        self.requesting_doctor = trim_to_none(self.requesting_doctor.take());
        self.technical_manager = trim_to_none(self.technical_manager.take());
        self.raw_text = trim_to_none(self.raw_text.take());
        self.fingerprint = trim_to_none(self.fingerprint.take());
        for result in &mut self.results {
            result.normalize();
        }
    }

    /// Total number of parameters across all panels.
    pub fn item_count(&self) -> usize {
        self.results.iter().map(|r| r.items.len()).sum()
    }
}

/// A panel within a report, e.g. a complete blood count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    pub id: String,
    pub report_id: String,
    pub test_name: String,
    pub material: Option<String>,
    pub method: Option<String>,
    pub collected_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub items: Vec<ResultItem>,
}

impl LabResult {
    pub fn new(report_id: &str, test_name: &str) -> Result<Self, IngestError> {
        let test_name = clean_text(test_name)
            .ok_or_else(|| IngestError::InvalidInput("test name is required".into()))?;
        Ok(Self {
            id: new_id(),
            report_id: report_id.to_string(),
            test_name,
            material: None,
            method: None,
            collected_at: None,
            released_at: None,
            items: Vec::new(),
        })
    }

    pub fn normalize(&mut self) {
        self.material = trim_to_none(self.material.take());
        self.method = trim_to_none(self.method.take());
        for item in &mut self.items {
            item.normalize();
        }
    }
}

/// A single measured parameter, e.g. hemoglobin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub id: String,
    pub result_id: String,
    pub parameter_name: String,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub reference_text: Option<String>,
}

impl ResultItem {
    pub fn new(result_id: &str, parameter_name: &str) -> Result<Self, IngestError> {
        let parameter_name = clean_text(parameter_name)
            .ok_or_else(|| IngestError::InvalidInput("parameter name is required".into()))?;
        Ok(Self {
            id: new_id(),
            result_id: result_id.to_string(),
            parameter_name,
            value: None,
            unit: None,
            reference_text: None,
        })
    }

    pub fn normalize(&mut self) {
        self.value = trim_to_none(self.value.take());
        self.unit = trim_to_none(self.unit.take());
        self.reference_text = trim_to_none(self.reference_text.take());
    }
}

/// A patient known to the patient directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub display_name: Option<String>,
}

/// Compact listing shape: one card per report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub id: String,
    pub patient_id: String,
    pub report_date: Option<DateTime<Utc>>,
    pub tests: Vec<ResultSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub test_name: String,
    pub collected_at: Option<DateTime<Utc>>,
    pub key_results: Vec<KeyResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyResult {
    pub parameter_name: String,
    pub value: Option<String>,
    pub unit: Option<String>,
}

impl From<&Report> for ReportSummary {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.clone(),
            patient_id: report.patient_id.clone(),
            report_date: report.report_date,
            tests: report
                .results
                .iter()
                .map(|r| ResultSummary {
                    test_name: r.test_name.clone(),
                    collected_at: r.collected_at,
                    key_results: r
                        .items
                        .iter()
                        .map(|i| KeyResult {
                            parameter_name: i.parameter_name.clone(),
                            value: i.value.clone(),
                            unit: i.unit.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// One historical measurement of a parameter for a patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub report_id: String,
    pub result_id: String,
    pub item_id: String,
    pub report_date: Option<DateTime<Utc>>,
    pub collected_at: Option<DateTime<Utc>>,
    pub test_name: String,
    pub parameter_name: String,
    pub value: Option<String>,
    pub unit: Option<String>,
}

impl TimelineEntry {
    /// Collection time if known, otherwise the report date.
    pub fn effective_date(&self) -> Option<DateTime<Utc>> {
        self.collected_at.or(self.report_date)
    }
}
