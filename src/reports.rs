//! Read-side CLI commands: `get`, `list`, `timeline`, `delete`.
//!
//! Every command has a plain-text rendering and a `--json` rendering of the
//! same data.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labflow_core::extraction::{DocumentExtractor, ExtractedDocument};
use labflow_core::models::{ReportSummary, TimelineEntry};
use labflow_core::{LabPipeline, Report};

use crate::config::Config;
use crate::ingest::{open_pipeline_with, user_facing};
use crate::sqlite_store::SqliteStore;

/// Placeholder extractor for commands that never ingest.
struct ReadOnly;

#[async_trait]
impl DocumentExtractor for ReadOnly {
    fn name(&self) -> &str {
        "read-only"
    }

    async fn extract(&self, _uri: &str, _mime: &str) -> Result<ExtractedDocument> {
        bail!("extraction is not available for read-only commands")
    }
}

async fn open(config: &Config) -> Result<(LabPipeline, Arc<SqliteStore>)> {
    open_pipeline_with(config, Arc::new(ReadOnly)).await
}

fn date(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn date_time(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn value_with_unit(value: Option<&str>, unit: Option<&str>) -> String {
    match (value, unit) {
        (Some(v), Some(u)) => format!("{v} {u}"),
        (Some(v), None) => v.to_string(),
        (None, _) => "-".to_string(),
    }
}

/// Plain-text report detail.
pub fn print_report(report: &Report) {
    println!("id:                {}", report.id);
    println!("patient_id:        {}", report.patient_id);
    if let Some(ref name) = report.patient_name {
        println!("patient_name:      {}", name);
    }
    if report.patient_dob.is_some() {
        println!("patient_dob:       {}", date(report.patient_dob));
    }
    if let Some(ref lab) = report.lab_name {
        println!("lab_name:          {}", lab);
    }
    if let Some(ref phone) = report.lab_phone {
        println!("lab_phone:         {}", phone);
    }
    if let Some(ref insurer) = report.insurance_provider {
        println!("insurance:         {}", insurer);
    }
    if let Some(ref doctor) = report.requesting_doctor {
        println!("requesting_doctor: {}", doctor);
    }
    if let Some(ref manager) = report.technical_manager {
        println!("technical_manager: {}", manager);
    }
    println!("report_date:       {}", date(report.report_date));
    println!("uploaded_by:       {}", report.uploaded_by);
    println!(
        "fingerprint:       {}",
        report.fingerprint.as_deref().unwrap_or("-")
    );
    println!("created_at:        {}", report.created_at.to_rfc3339());
    println!();

    println!(
        "--- Results ({} panels, {} parameters) ---",
        report.results.len(),
        report.item_count()
    );
    for result in &report.results {
        print!("[{}] collected {}", result.test_name, date_time(result.collected_at));
        if result.released_at.is_some() {
            print!(", released {}", date_time(result.released_at));
        }
        println!();
        if let Some(ref material) = result.material {
            println!("  material: {}", material);
        }
        if let Some(ref method) = result.method {
            println!("  method:   {}", method);
        }
        for item in &result.items {
            let reference = item
                .reference_text
                .as_deref()
                .map(|r| format!("  (ref: {r})"))
                .unwrap_or_default();
            println!(
                "  {}: {}{}",
                item.parameter_name,
                value_with_unit(item.value.as_deref(), item.unit.as_deref()),
                reference
            );
        }
    }
}

fn print_summary(summary: &ReportSummary) {
    println!("{}  {}", date(summary.report_date), summary.id);
    for test in &summary.tests {
        let results: Vec<String> = test
            .key_results
            .iter()
            .map(|k| {
                format!(
                    "{}={}",
                    k.parameter_name,
                    value_with_unit(k.value.as_deref(), k.unit.as_deref())
                )
            })
            .collect();
        println!("    {}: {}", test.test_name, results.join(", "));
    }
}

fn print_timeline_entry(entry: &TimelineEntry) {
    println!(
        "{}  {}  {} [{}]  report {}",
        date_time(entry.effective_date()),
        entry.parameter_name,
        value_with_unit(entry.value.as_deref(), entry.unit.as_deref()),
        entry.test_name,
        entry.report_id
    );
}

/// `labflow get <report-id>`
pub async fn run_get(config: &Config, report_id: &str, json: bool) -> Result<()> {
    let (pipeline, store) = open(config).await?;
    let outcome = pipeline.get_report(report_id).await;
    store.pool().close().await;
    let report = outcome.map_err(|e| user_facing("get", e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Paging and rendering options shared by `list` and `timeline`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub json: bool,
}

/// `labflow list <patient-id>`
pub async fn run_list(
    config: &Config,
    patient_id: &str,
    full: bool,
    options: ListOptions,
) -> Result<()> {
    let (pipeline, store) = open(config).await?;

    if full {
        let outcome = pipeline
            .list_full(patient_id, options.limit, options.offset)
            .await;
        store.pool().close().await;
        let reports = outcome.map_err(|e| user_facing("list", e))?;
        if options.json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
            return Ok(());
        }
        if reports.is_empty() {
            println!("No reports.");
        }
        for (i, report) in reports.iter().enumerate() {
            if i > 0 {
                println!();
            }
            print_report(report);
        }
    } else {
        let outcome = pipeline
            .list_summaries(patient_id, options.limit, options.offset)
            .await;
        store.pool().close().await;
        let summaries = outcome.map_err(|e| user_facing("list", e))?;
        if options.json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
            return Ok(());
        }
        if summaries.is_empty() {
            println!("No reports.");
        }
        for summary in &summaries {
            print_summary(summary);
        }
    }
    Ok(())
}

/// `labflow timeline <patient-id> <parameter>`
pub async fn run_timeline(
    config: &Config,
    patient_id: &str,
    parameter_name: &str,
    options: ListOptions,
) -> Result<()> {
    let (pipeline, store) = open(config).await?;
    let outcome = pipeline
        .timeline(patient_id, parameter_name, options.limit, options.offset)
        .await;
    store.pool().close().await;
    let entries = outcome.map_err(|e| user_facing("timeline", e))?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No results for {}.", parameter_name.trim());
    }
    for entry in &entries {
        print_timeline_entry(entry);
    }
    Ok(())
}

/// `labflow delete <report-id>`
pub async fn run_delete(config: &Config, report_id: &str) -> Result<()> {
    let (pipeline, store) = open(config).await?;
    let outcome = pipeline.delete_report(report_id).await;
    store.pool().close().await;
    outcome.map_err(|e| user_facing("delete", e))?;

    println!("deleted report {}", report_id.trim());
    Ok(())
}
