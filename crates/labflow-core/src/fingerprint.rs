//! Content fingerprint for duplicate detection.
//!
//! The fingerprint answers "has this patient already had these parameter
//! values, from these panels, on these dates?" without looking at any
//! generated identifier. One tuple is built per parameter:
//!
//! ```text
//! patient|YYYY-MM-DD|PANEL NAME|PARAMETER NAME|value
//! ```
//!
//! The date is the panel's collection date, else the report date, else
//! [`NO_DATE_SENTINEL`]. Panel and parameter names are trimmed and
//! upper-cased; the value is trimmed and an absent value is the empty token.
//!
//! Tuples are sorted before hashing, which makes the fingerprint independent
//! of the order in which the extractor emitted panels and parameters. Each
//! tuple is newline-terminated inside the SHA-256 input so adjacent tuples
//! cannot run together.

use sha2::{Digest, Sha256};

use crate::models::Report;

/// Date token used when neither a collection date nor a report date exists.
pub const NO_DATE_SENTINEL: &str = "0000-00-00";

/// Compute the hex-encoded SHA-256 fingerprint of a mapped report.
///
/// A report with no parameters hashes the empty sequence. That value is
/// valid but weak: it cannot distinguish two empty reports for the same
/// patient.
pub fn generate_fingerprint(patient_id: &str, report: &Report) -> String {
    let mut tuples = fingerprint_tuples(patient_id, report);
    tuples.sort();

    let mut hasher = Sha256::new();
    for tuple in &tuples {
        hasher.update(tuple.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// The unsorted tuple strings that feed [`generate_fingerprint`].
pub fn fingerprint_tuples(patient_id: &str, report: &Report) -> Vec<String> {
    let patient_key = match patient_id.trim() {
        "" => report.patient_id.trim(),
        key => key,
    };

    let mut tuples = Vec::with_capacity(report.item_count());
    for result in &report.results {
        let date = result
            .collected_at
            .or(report.report_date)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| NO_DATE_SENTINEL.to_string());
        let panel = canonical_name(&result.test_name);

        for item in &result.items {
            tuples.push(format!(
                "{}|{}|{}|{}|{}",
                patient_key,
                date,
                panel,
                canonical_name(&item.parameter_name),
                item.value.as_deref().map(str::trim).unwrap_or_default()
            ));
        }
    }
    tuples
}

fn canonical_name(name: &str) -> String {
    name.trim().to_uppercase()
}
