use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patients (
            id TEXT PRIMARY KEY,
            display_name TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Patients are owned by another system; reports keep a plain reference.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lab_reports (
            id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL,
            patient_name TEXT,
            patient_dob TEXT,
            lab_name TEXT,
            lab_phone TEXT,
            insurance_provider TEXT,
            requesting_doctor TEXT,
            technical_manager TEXT,
            report_date TEXT,
            raw_text TEXT,
            uploaded_by TEXT NOT NULL,
            fingerprint TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(patient_id, fingerprint)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lab_results (
            id TEXT PRIMARY KEY,
            lab_report_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            test_name TEXT NOT NULL,
            material TEXT,
            method TEXT,
            collected_at TEXT,
            released_at TEXT,
            FOREIGN KEY (lab_report_id) REFERENCES lab_reports(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // SQLite's LOWER() folds ASCII only; parameter_key is lowercased in Rust.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lab_result_items (
            id TEXT PRIMARY KEY,
            lab_result_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            parameter_name TEXT NOT NULL,
            parameter_key TEXT NOT NULL,
            value TEXT,
            unit TEXT,
            reference_text TEXT,
            FOREIGN KEY (lab_result_id) REFERENCES lab_results(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_lab_reports_patient_date ON lab_reports(patient_id, report_date DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_lab_results_report_id ON lab_results(lab_report_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_lab_result_items_result_id ON lab_result_items(lab_result_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_lab_result_items_parameter_key ON lab_result_items(parameter_key)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
