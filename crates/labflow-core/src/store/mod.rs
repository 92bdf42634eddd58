//! Storage abstraction for lab reports.
//!
//! [`ReportStore`] covers everything the pipeline needs from persistence:
//! the dedup existence check, the atomic aggregate write, and the read-side
//! queries. [`PatientDirectory`] is the separate patient lookup used by the
//! listing and timeline operations.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::error::IngestError;
use crate::models::{Patient, Report, TimelineEntry};

/// Default number of rows returned by list and timeline queries.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
/// Upper bound on rows returned by a single list or timeline query.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Default and maximum page sizes, usually taken from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

impl PageLimits {
    /// Resolve caller-supplied paging into a bounded [`Page`].
    ///
    /// A missing limit takes the default; any limit is clamped to
    /// `1..=max_limit`. A missing offset is zero.
    pub fn page(&self, limit: Option<u32>, offset: Option<u32>) -> Page {
        let max = self.max_limit.max(1);
        Page {
            limit: limit.unwrap_or(self.default_limit).clamp(1, max),
            offset: offset.unwrap_or(0),
        }
    }
}

/// A bounded window over an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        PageLimits::default().page(None, None)
    }
}

/// Listing order for reports: newest report date first, undated reports
/// last, then newest creation time first. Ties fall back to the report id
/// so the order is total.
pub fn newest_first(a: &Report, b: &Report) -> Ordering {
    match (a.report_date, b.report_date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.created_at.cmp(&a.created_at))
    .then_with(|| b.id.cmp(&a.id))
}

/// Abstract storage backend for lab reports.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`exists_by_fingerprint`](ReportStore::exists_by_fingerprint) | Dedup existence check |
/// | [`create_report`](ReportStore::create_report) | Atomic write of the full aggregate |
/// | [`find_report`](ReportStore::find_report) | Report with panels and parameters |
/// | [`list_reports`](ReportStore::list_reports) | A patient's reports, newest first |
/// | [`timeline`](ReportStore::timeline) | One parameter's history for a patient |
/// | [`delete_report`](ReportStore::delete_report) | Hard delete of the aggregate |
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Whether a report with this fingerprint already exists for the patient.
    async fn exists_by_fingerprint(
        &self,
        patient_id: &str,
        fingerprint: &str,
    ) -> Result<bool, IngestError>;

    /// Persist the report, its panels, and their parameters as one unit.
    ///
    /// On success the server-assigned timestamps are written back into
    /// `report`. Any failure leaves nothing behind. A uniqueness violation on
    /// `(patient_id, fingerprint)` is reported as
    /// [`IngestError::DuplicateReport`].
    async fn create_report(&self, report: &mut Report) -> Result<(), IngestError>;

    async fn find_report(&self, report_id: &str) -> Result<Option<Report>, IngestError>;

    /// Full reports for a patient in [`newest_first`] order.
    async fn list_reports(&self, patient_id: &str, page: Page)
        -> Result<Vec<Report>, IngestError>;

    /// Every parameter whose [`parameter_key`](crate::models::parameter_key)
    /// equals that of `parameter_name` across the patient's reports, newest
    /// effective date first.
    async fn timeline(
        &self,
        patient_id: &str,
        parameter_name: &str,
        page: Page,
    ) -> Result<Vec<TimelineEntry>, IngestError>;

    /// Remove a report and everything under it. Returns `false` when no such
    /// report exists.
    async fn delete_report(&self, report_id: &str) -> Result<bool, IngestError>;
}

/// Patient lookup used by the read-side operations.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn find_patient(&self, patient_id: &str) -> Result<Option<Patient>, IngestError>;
}
