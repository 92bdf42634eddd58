//! `labflow patient add`: register a patient for the listing and timeline
//! lookups.

use anyhow::{bail, Result};
use labflow_core::models::clean_text;

use crate::config::Config;
use crate::db;
use crate::ingest::user_facing;
use crate::sqlite_store::SqliteStore;

pub async fn run_patient_add(config: &Config, patient_id: &str, name: Option<&str>) -> Result<()> {
    let Some(id) = clean_text(patient_id) else {
        bail!("patient id is required");
    };
    let display_name = name.and_then(clean_text);

    let store = SqliteStore::new(db::connect(config).await?);
    let outcome = store.add_patient(&id, display_name.as_deref()).await;
    store.pool().close().await;
    outcome.map_err(|e| user_facing("patient add", e))?;

    match display_name {
        Some(name) => println!("patient {} ({}) registered", id, name),
        None => println!("patient {} registered", id),
    }
    Ok(())
}
