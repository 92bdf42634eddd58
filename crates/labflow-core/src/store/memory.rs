//! In-memory [`ReportStore`] and [`PatientDirectory`] for tests and
//! embedding.
//!
//! Reports live in a `Vec` behind `std::sync::RwLock`. The
//! `(patient_id, fingerprint)` uniqueness rule is enforced on insert the
//! same way the SQLite schema enforces it, so pipeline tests see identical
//! duplicate behavior.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::IngestError;
use crate::models::{now_utc, parameter_key, Patient, Report, TimelineEntry};

use super::{newest_first, Page, PatientDirectory, ReportStore};

/// In-memory store for tests.
pub struct InMemoryStore {
    reports: RwLock<Vec<Report>>,
    patients: RwLock<HashMap<String, Patient>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            reports: RwLock::new(Vec::new()),
            patients: RwLock::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Register a patient for [`PatientDirectory`] lookups.
    pub fn add_patient(&self, id: &str, display_name: Option<&str>) {
        if let Ok(mut patients) = self.patients.write() {
            patients.insert(
                id.to_string(),
                Patient {
                    id: id.to_string(),
                    display_name: display_name.map(str::to_string),
                },
            );
        }
    }

    /// Make every subsequent [`ReportStore::create_report`] fail with a
    /// storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn report_count(&self) -> usize {
        self.reports.read().map(|r| r.len()).unwrap_or_default()
    }

    fn read(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, Vec<Report>>, IngestError> {
        self.reports
            .read()
            .map_err(|_| IngestError::storage(operation, "report lock poisoned"))
    }

    fn write(
        &self,
        operation: &'static str,
    ) -> Result<RwLockWriteGuard<'_, Vec<Report>>, IngestError> {
        self.reports
            .write()
            .map_err(|_| IngestError::storage(operation, "report lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn window<T>(rows: Vec<T>, page: Page) -> Vec<T> {
    rows.into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn exists_by_fingerprint(
        &self,
        patient_id: &str,
        fingerprint: &str,
    ) -> Result<bool, IngestError> {
        let reports = self.read("check fingerprint")?;
        Ok(reports
            .iter()
            .any(|r| r.patient_id == patient_id && r.fingerprint.as_deref() == Some(fingerprint)))
    }

    async fn create_report(&self, report: &mut Report) -> Result<(), IngestError> {
        if self.fail_writes.load(AtomicOrdering::SeqCst) {
            return Err(IngestError::storage(
                "insert lab report",
                "writes disabled on this store",
            ));
        }

        let mut reports = self.write("insert lab report")?;
        if let Some(fingerprint) = report.fingerprint.as_deref() {
            let taken = reports.iter().any(|r| {
                r.patient_id == report.patient_id && r.fingerprint.as_deref() == Some(fingerprint)
            });
            if taken {
                return Err(IngestError::DuplicateReport {
                    patient_id: report.patient_id.clone(),
                    fingerprint: fingerprint.to_string(),
                });
            }
        }

        let now = now_utc();
        report.created_at = now;
        report.updated_at = now;
        reports.push(report.clone());
        Ok(())
    }

    async fn find_report(&self, report_id: &str) -> Result<Option<Report>, IngestError> {
        let reports = self.read("load lab report")?;
        Ok(reports.iter().find(|r| r.id == report_id).cloned())
    }

    async fn list_reports(&self, patient_id: &str, page: Page) -> Result<Vec<Report>, IngestError> {
        let mut matching: Vec<Report> = self
            .read("list lab reports")?
            .iter()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect();
        matching.sort_by(newest_first);
        Ok(window(matching, page))
    }

    async fn timeline(
        &self,
        patient_id: &str,
        parameter_name: &str,
        page: Page,
    ) -> Result<Vec<TimelineEntry>, IngestError> {
        let wanted = parameter_key(parameter_name);
        let reports = self.read("load parameter timeline")?;

        let mut rows: Vec<(TimelineEntry, chrono::DateTime<chrono::Utc>)> = Vec::new();
        for report in reports.iter().filter(|r| r.patient_id == patient_id) {
            for result in &report.results {
                for item in &result.items {
                    if parameter_key(&item.parameter_name) != wanted {
                        continue;
                    }
                    let entry = TimelineEntry {
                        report_id: report.id.clone(),
                        result_id: result.id.clone(),
                        item_id: item.id.clone(),
                        report_date: report.report_date,
                        collected_at: result.collected_at,
                        test_name: result.test_name.clone(),
                        parameter_name: item.parameter_name.clone(),
                        value: item.value.clone(),
                        unit: item.unit.clone(),
                    };
                    rows.push((entry, report.created_at));
                }
            }
        }
        drop(reports);

        // Stable sort keeps panel and parameter order for ties.
        rows.sort_by(|(a, a_created), (b, b_created)| {
            match (a.effective_date(), b.effective_date()) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then_with(|| b_created.cmp(a_created))
            .then_with(|| b.report_id.cmp(&a.report_id))
        });
        Ok(window(rows.into_iter().map(|(entry, _)| entry).collect(), page))
    }

    async fn delete_report(&self, report_id: &str) -> Result<bool, IngestError> {
        let mut reports = self.write("delete lab report")?;
        let before = reports.len();
        reports.retain(|r| r.id != report_id);
        Ok(reports.len() != before)
    }
}

#[async_trait]
impl PatientDirectory for InMemoryStore {
    async fn find_patient(&self, patient_id: &str) -> Result<Option<Patient>, IngestError> {
        let patients = self
            .patients
            .read()
            .map_err(|_| IngestError::storage("find patient", "patient lock poisoned"))?;
        Ok(patients.get(patient_id).cloned())
    }
}
