//! `labflow ingest`: run one upload through the pipeline against SQLite.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use labflow_core::extraction::DocumentExtractor;
use labflow_core::{IngestError, IngestRequest, LabPipeline};
use tracing::error;

use crate::config::Config;
use crate::db;
use crate::extractor::create_extractor;
use crate::reports::print_report;
use crate::sqlite_store::SqliteStore;

/// Printed (and exit status 0) when the upload matches an existing report.
pub const DUPLICATE_MESSAGE: &str = "duplicate: report already exists";

/// Turn a pipeline error into what the user sees: the `Display` text only.
///
/// Storage and extraction causes stay in the log; the returned error has no
/// source chain for `main` to print.
pub fn user_facing(command: &'static str, err: IngestError) -> anyhow::Error {
    if !err.is_business_outcome() {
        let cause = std::error::Error::source(&err)
            .map(ToString::to_string)
            .unwrap_or_default();
        error!(command, error = %err, cause = %cause, "command failed");
    }
    anyhow!("{err}")
}

/// Open the database and wire the pipeline with the configured extractor.
pub async fn open_pipeline(config: &Config) -> Result<(LabPipeline, Arc<SqliteStore>)> {
    let extractor = create_extractor(&config.extractor)?;
    open_pipeline_with(config, extractor).await
}

/// Same as [`open_pipeline`] with an explicit extractor.
pub async fn open_pipeline_with(
    config: &Config,
    extractor: Arc<dyn DocumentExtractor>,
) -> Result<(LabPipeline, Arc<SqliteStore>)> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let pipeline = LabPipeline::new(extractor, store.clone(), store.clone())
        .with_page_limits(config.listing.page_limits());
    Ok((pipeline, store))
}

/// CLI entry point.
pub async fn run_ingest(config: &Config, request: IngestRequest, json: bool) -> Result<()> {
    let (pipeline, store) = open_pipeline(config).await?;
    let outcome = pipeline.ingest(&request).await;
    store.pool().close().await;

    match outcome {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("ingested report {}", report.id);
                print_report(&report);
            }
            Ok(())
        }
        Err(IngestError::DuplicateReport { fingerprint, .. }) => {
            if json {
                let body = serde_json::json!({
                    "status": "duplicate",
                    "patient_id": request.patient_id.trim(),
                    "fingerprint": fingerprint,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("{DUPLICATE_MESSAGE}");
            }
            Ok(())
        }
        Err(e) => Err(user_facing("ingest", e)),
    }
}
