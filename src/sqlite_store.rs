//! SQLite-backed [`ReportStore`] and [`PatientDirectory`].
//!
//! The aggregate write runs in one transaction: the report row, then each
//! panel in emission order, then each panel's parameters. Any failed
//! statement returns early and the dropped transaction rolls back, so a
//! report is either stored whole or not at all.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text
//! (`2025-12-03T08:00:00.000Z`), which keeps `ORDER BY` on the raw column
//! chronological.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use labflow_core::models::{now_utc, parameter_key, Patient, TimelineEntry};
use labflow_core::store::{Page, PatientDirectory, ReportStore};
use labflow_core::{IngestError, LabResult, Report, ResultItem};

/// SQLite implementation of [`ReportStore`] and [`PatientDirectory`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or rename a patient.
    pub async fn add_patient(
        &self,
        patient_id: &str,
        display_name: Option<&str>,
    ) -> Result<(), IngestError> {
        sqlx::query(
            r#"
            INSERT INTO patients (id, display_name, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name
            "#,
        )
        .bind(patient_id)
        .bind(display_name)
        .bind(format_ts(&now_utc()))
        .execute(&self.pool)
        .await
        .map_err(IngestError::storage_op("insert patient"))?;
        Ok(())
    }

    async fn load_results(&self, report: &mut Report) -> Result<(), IngestError> {
        let result_rows = sqlx::query(
            r#"
            SELECT id, lab_report_id, test_name, material, method, collected_at, released_at
            FROM lab_results
            WHERE lab_report_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(&report.id)
        .fetch_all(&self.pool)
        .await
        .map_err(IngestError::storage_op("load lab results"))?;

        let item_rows = sqlx::query(
            r#"
            SELECT i.id, i.lab_result_id, i.parameter_name, i.value, i.unit, i.reference_text
            FROM lab_result_items i
            JOIN lab_results r ON r.id = i.lab_result_id
            WHERE r.lab_report_id = ?
            ORDER BY r.position ASC, i.position ASC
            "#,
        )
        .bind(&report.id)
        .fetch_all(&self.pool)
        .await
        .map_err(IngestError::storage_op("load lab result items"))?;

        let mut items_by_result: HashMap<String, Vec<ResultItem>> = HashMap::new();
        for row in &item_rows {
            let item = ResultItem {
                id: row.get("id"),
                result_id: row.get("lab_result_id"),
                parameter_name: row.get("parameter_name"),
                value: row.get("value"),
                unit: row.get("unit"),
                reference_text: row.get("reference_text"),
            };
            items_by_result
                .entry(item.result_id.clone())
                .or_default()
                .push(item);
        }

        report.results = result_rows
            .iter()
            .map(|row| -> Result<LabResult, IngestError> {
                let id: String = row.get("id");
                Ok(LabResult {
                    items: items_by_result.remove(&id).unwrap_or_default(),
                    id,
                    report_id: row.get("lab_report_id"),
                    test_name: row.get("test_name"),
                    material: row.get("material"),
                    method: row.get("method"),
                    collected_at: parse_ts(row.get("collected_at"))?,
                    released_at: parse_ts(row.get("released_at"))?,
                })
            })
            .collect::<Result<_, IngestError>>()?;
        Ok(())
    }
}

const REPORT_COLUMNS: &str = "id, patient_id, patient_name, patient_dob, lab_name, lab_phone, \
     insurance_provider, requesting_doctor, technical_manager, report_date, raw_text, \
     uploaded_by, fingerprint, created_at, updated_at";

fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, IngestError> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(IngestError::storage_op("decode timestamp"))
    })
    .transpose()
}

fn required_ts(raw: String) -> Result<DateTime<Utc>, IngestError> {
    parse_ts(Some(raw))?.ok_or_else(|| IngestError::storage("decode timestamp", "missing value"))
}

/// Header columns only; panels are loaded separately.
fn report_from_row(row: &SqliteRow) -> Result<Report, IngestError> {
    Ok(Report {
        id: row.get("id"),
        patient_id: row.get("patient_id"),
        patient_name: row.get("patient_name"),
        patient_dob: parse_ts(row.get("patient_dob"))?,
        lab_name: row.get("lab_name"),
        lab_phone: row.get("lab_phone"),
        insurance_provider: row.get("insurance_provider"),
        requesting_doctor: row.get("requesting_doctor"),
        technical_manager: row.get("technical_manager"),
        report_date: parse_ts(row.get("report_date"))?,
        raw_text: row.get("raw_text"),
        uploaded_by: row.get("uploaded_by"),
        fingerprint: row.get("fingerprint"),
        results: Vec::new(),
        created_at: required_ts(row.get("created_at"))?,
        updated_at: required_ts(row.get("updated_at"))?,
    })
}

fn report_insert_error(err: sqlx::Error, report: &Report) -> IngestError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return IngestError::DuplicateReport {
                patient_id: report.patient_id.clone(),
                fingerprint: report.fingerprint.clone().unwrap_or_default(),
            };
        }
    }
    IngestError::storage("insert lab report", err)
}

#[async_trait]
impl ReportStore for SqliteStore {
    async fn exists_by_fingerprint(
        &self,
        patient_id: &str,
        fingerprint: &str,
    ) -> Result<bool, IngestError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM lab_reports WHERE patient_id = ? AND fingerprint = ?",
        )
        .bind(patient_id)
        .bind(fingerprint)
        .fetch_one(&self.pool)
        .await
        .map_err(IngestError::storage_op("check fingerprint"))?;
        Ok(exists)
    }

    async fn create_report(&self, report: &mut Report) -> Result<(), IngestError> {
        let now = now_utc();
        let now_text = format_ts(&now);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(IngestError::storage_op("begin transaction"))?;

        sqlx::query(
            r#"
            INSERT INTO lab_reports (id, patient_id, patient_name, patient_dob, lab_name,
                                     lab_phone, insurance_provider, requesting_doctor,
                                     technical_manager, report_date, raw_text, uploaded_by,
                                     fingerprint, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.id)
        .bind(&report.patient_id)
        .bind(&report.patient_name)
        .bind(report.patient_dob.as_ref().map(format_ts))
        .bind(&report.lab_name)
        .bind(&report.lab_phone)
        .bind(&report.insurance_provider)
        .bind(&report.requesting_doctor)
        .bind(&report.technical_manager)
        .bind(report.report_date.as_ref().map(format_ts))
        .bind(&report.raw_text)
        .bind(&report.uploaded_by)
        .bind(&report.fingerprint)
        .bind(&now_text)
        .bind(&now_text)
        .execute(&mut *tx)
        .await
        .map_err(|e| report_insert_error(e, report))?;

        for (position, result) in report.results.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO lab_results (id, lab_report_id, position, test_name, material,
                                         method, collected_at, released_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&result.id)
            .bind(&report.id)
            .bind(position as i64)
            .bind(&result.test_name)
            .bind(&result.material)
            .bind(&result.method)
            .bind(result.collected_at.as_ref().map(format_ts))
            .bind(result.released_at.as_ref().map(format_ts))
            .execute(&mut *tx)
            .await
            .map_err(IngestError::storage_op("insert lab result"))?;

            for (item_position, item) in result.items.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO lab_result_items (id, lab_result_id, position, parameter_name,
                                                  parameter_key, value, unit, reference_text)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&item.id)
                .bind(&result.id)
                .bind(item_position as i64)
                .bind(&item.parameter_name)
                .bind(parameter_key(&item.parameter_name))
                .bind(&item.value)
                .bind(&item.unit)
                .bind(&item.reference_text)
                .execute(&mut *tx)
                .await
                .map_err(IngestError::storage_op("insert lab result item"))?;
            }
        }

        tx.commit()
            .await
            .map_err(IngestError::storage_op("commit lab report"))?;

        report.created_at = now;
        report.updated_at = now;
        Ok(())
    }

    async fn find_report(&self, report_id: &str) -> Result<Option<Report>, IngestError> {
        let row = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM lab_reports WHERE id = ?"
        ))
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(IngestError::storage_op("load lab report"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut report = report_from_row(&row)?;
        self.load_results(&mut report).await?;
        Ok(Some(report))
    }

    async fn list_reports(&self, patient_id: &str, page: Page) -> Result<Vec<Report>, IngestError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {REPORT_COLUMNS} FROM lab_reports
            WHERE patient_id = ?
            ORDER BY report_date IS NULL, report_date DESC, created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(patient_id)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(IngestError::storage_op("list lab reports"))?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut report = report_from_row(row)?;
            self.load_results(&mut report).await?;
            reports.push(report);
        }
        Ok(reports)
    }

    async fn timeline(
        &self,
        patient_id: &str,
        parameter_name: &str,
        page: Page,
    ) -> Result<Vec<TimelineEntry>, IngestError> {
        let rows = sqlx::query(
            r#"
            SELECT rp.id AS report_id, r.id AS result_id, i.id AS item_id,
                   rp.report_date, r.collected_at, r.test_name,
                   i.parameter_name, i.value, i.unit
            FROM lab_result_items i
            JOIN lab_results r ON r.id = i.lab_result_id
            JOIN lab_reports rp ON rp.id = r.lab_report_id
            WHERE rp.patient_id = ?
              AND i.parameter_key = ?
            ORDER BY COALESCE(r.collected_at, rp.report_date) IS NULL,
                     COALESCE(r.collected_at, rp.report_date) DESC,
                     rp.created_at DESC,
                     rp.id DESC,
                     r.position ASC,
                     i.position ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(patient_id)
        .bind(parameter_key(parameter_name))
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(IngestError::storage_op("load parameter timeline"))?;

        rows.iter()
            .map(|row| -> Result<TimelineEntry, IngestError> {
                Ok(TimelineEntry {
                    report_id: row.get("report_id"),
                    result_id: row.get("result_id"),
                    item_id: row.get("item_id"),
                    report_date: parse_ts(row.get("report_date"))?,
                    collected_at: parse_ts(row.get("collected_at"))?,
                    test_name: row.get("test_name"),
                    parameter_name: row.get("parameter_name"),
                    value: row.get("value"),
                    unit: row.get("unit"),
                })
            })
            .collect()
    }

    async fn delete_report(&self, report_id: &str) -> Result<bool, IngestError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(IngestError::storage_op("begin transaction"))?;

        // Explicit child deletes; cascades only fire with foreign_keys on.
        sqlx::query(
            "DELETE FROM lab_result_items WHERE lab_result_id IN (SELECT id FROM lab_results WHERE lab_report_id = ?)",
        )
        .bind(report_id)
        .execute(&mut *tx)
        .await
        .map_err(IngestError::storage_op("delete lab result items"))?;

        sqlx::query("DELETE FROM lab_results WHERE lab_report_id = ?")
            .bind(report_id)
            .execute(&mut *tx)
            .await
            .map_err(IngestError::storage_op("delete lab results"))?;

        let deleted = sqlx::query("DELETE FROM lab_reports WHERE id = ?")
            .bind(report_id)
            .execute(&mut *tx)
            .await
            .map_err(IngestError::storage_op("delete lab report"))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(IngestError::storage_op("commit lab report delete"))?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl PatientDirectory for SqliteStore {
    async fn find_patient(&self, patient_id: &str) -> Result<Option<Patient>, IngestError> {
        let row = sqlx::query("SELECT id, display_name FROM patients WHERE id = ?")
            .bind(patient_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(IngestError::storage_op("find patient"))?;
        Ok(row.map(|row| Patient {
            id: row.get("id"),
            display_name: row.get("display_name"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width() {
        let a = format_ts(&Utc.with_ymd_and_hms(2025, 12, 3, 8, 0, 0).unwrap());
        let b = format_ts(
            &(Utc.with_ymd_and_hms(2025, 12, 3, 8, 0, 0).unwrap()
                + chrono::Duration::milliseconds(250)),
        );
        assert_eq!(a, "2025-12-03T08:00:00.000Z");
        assert_eq!(b, "2025-12-03T08:00:00.250Z");
        assert!(a < b);
        assert_eq!(
            parse_ts(Some(a)).unwrap(),
            Some(Utc.with_ymd_and_hms(2025, 12, 3, 8, 0, 0).unwrap())
        );
        assert!(parse_ts(Some("03/12/2025".into())).is_err());
    }
}
