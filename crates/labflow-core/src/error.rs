//! Typed outcomes of the ingestion pipeline.
//!
//! Business outcomes (bad input, duplicates, unknown ids) are kept apart
//! from infrastructure failures so callers can tell "fix your request" and
//! "already have it" from "something broke". Infrastructure variants never
//! render their inner error in `Display`; it is only reachable through
//! [`std::error::Error::source`] for operator logs.

/// Boxed error used as the source of infrastructure failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("document processing failed")]
    DocumentProcessingFailed(#[source] BoxError),

    #[error("invalid date format: {0:?}")]
    InvalidDateFormat(String),

    #[error("lab report already exists for patient {patient_id}")]
    DuplicateReport {
        patient_id: String,
        fingerprint: String,
    },

    #[error("patient not found: {0}")]
    PatientNotFound(String),

    #[error("lab report not found: {0}")]
    ReportNotFound(String),

    #[error("storage failure during {operation}")]
    Storage {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl IngestError {
    /// Wrap an infrastructure error with the name of the failing operation.
    pub fn storage(operation: &'static str, source: impl Into<BoxError>) -> Self {
        IngestError::Storage {
            operation,
            source: source.into(),
        }
    }

    /// Build a `map_err` adapter for [`IngestError::storage`].
    pub fn storage_op<E: Into<BoxError>>(operation: &'static str) -> impl FnOnce(E) -> Self {
        move |e| IngestError::storage(operation, e)
    }

    /// True for outcomes the caller caused or expects: validation failures,
    /// duplicates, and unknown ids. False for dependent-service and storage
    /// failures.
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidInput(_)
                | IngestError::InvalidDocument(_)
                | IngestError::InvalidDateFormat(_)
                | IngestError::DuplicateReport { .. }
                | IngestError::PatientNotFound(_)
                | IngestError::ReportNotFound(_)
        )
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestError::DuplicateReport { .. })
    }
}
