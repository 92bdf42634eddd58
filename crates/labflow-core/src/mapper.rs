//! Extractor entity tree → [`Report`] aggregate.
//!
//! Each nesting level has its own tag vocabulary, resolved through a small
//! field enum (`ReportField`, `PanelField`, `ItemField`). Tags the enums do
//! not know are ignored, so new extractor vocabulary never breaks
//! ingestion; it only goes unmapped until added here.
//!
//! Panels and parameters keep the extractor's emission order. Canonical
//! ordering for identity purposes belongs to the
//! [`fingerprint`](crate::fingerprint) module.
//!
//! Date-bearing fields go through [`datetime`](crate::datetime). A date that
//! cannot be parsed leaves its field absent; it never fails the mapping.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::datetime::{parse_date, parse_datetime};
use crate::error::IngestError;
use crate::extraction::{Entity, ExtractedDocument};
use crate::models::{clean_text, LabResult, Report, ResultItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportField {
    PatientName,
    PatientDob,
    LabName,
    LabPhone,
    InsuranceProvider,
    RequestingDoctor,
    TechnicalManager,
    ReportDate,
    TestResult,
}

impl ReportField {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "patient_name" => Self::PatientName,
            "patient_dob" => Self::PatientDob,
            "lab_name" => Self::LabName,
            "lab_phone" => Self::LabPhone,
            "insurance_provider" => Self::InsuranceProvider,
            "requesting_doctor" => Self::RequestingDoctor,
            "technical_manager" => Self::TechnicalManager,
            "report_date" => Self::ReportDate,
            "test_result" => Self::TestResult,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PanelField {
    TestName,
    Material,
    Method,
    CollectedAt,
    ReleasedAt,
    TestItem,
}

impl PanelField {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "test_name" => Self::TestName,
            "material" => Self::Material,
            "method" => Self::Method,
            "collected_at" | "collection_date" | "collection_datetime" | "collected_date" => {
                Self::CollectedAt
            }
            "release_at" | "released_at" | "release_date" | "result_date" => Self::ReleasedAt,
            "test_item" => Self::TestItem,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemField {
    ParameterName,
    Value,
    Unit,
    ReferenceText,
}

impl ItemField {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "parameter_name" => Self::ParameterName,
            "result_value" | "result" => Self::Value,
            "unit" | "result_unit" => Self::Unit,
            "reference_text" | "reference_range" => Self::ReferenceText,
            _ => return None,
        })
    }
}

/// Map an extracted document into a new, unsaved report.
///
/// The returned report has a fresh id and no fingerprint. Every optional
/// text field is trimmed, with blanks left absent.
///
/// # Errors
///
/// [`IngestError::InvalidInput`] when the patient or uploader reference is
/// blank, or when a panel has no test name or a parameter has no name.
pub fn map_document(
    document: &ExtractedDocument,
    patient_id: &str,
    uploaded_by: &str,
) -> Result<Report, IngestError> {
    let mut report = Report::new(patient_id, uploaded_by)?;
    let text = document.text.as_deref();
    report.raw_text = text.and_then(clean_text);

    for entity in &document.entities {
        let Some(field) = ReportField::from_tag(&entity.entity_type) else {
            continue;
        };
        match field {
            ReportField::PatientName => report.patient_name = free_text(entity, text),
            ReportField::PatientDob => report.patient_dob = date(entity, text),
            ReportField::LabName => report.lab_name = free_text(entity, text),
            ReportField::LabPhone => report.lab_phone = free_text(entity, text),
            ReportField::InsuranceProvider => report.insurance_provider = free_text(entity, text),
            ReportField::RequestingDoctor => report.requesting_doctor = free_text(entity, text),
            ReportField::TechnicalManager => report.technical_manager = free_text(entity, text),
            ReportField::ReportDate => report.report_date = date(entity, text),
            ReportField::TestResult => {
                let result = map_panel(entity, text, &report.id)?;
                report.results.push(result);
            }
        }
    }

    report.normalize();
    Ok(report)
}

fn map_panel(entity: &Entity, text: Option<&str>, report_id: &str) -> Result<LabResult, IngestError> {
    let mut test_name = String::new();
    let mut material = None;
    let mut method = None;
    let mut collected_at = None;
    let mut released_at = None;
    let mut item_entities = Vec::new();

    for prop in &entity.properties {
        let Some(field) = PanelField::from_tag(&prop.entity_type) else {
            continue;
        };
        match field {
            PanelField::TestName => test_name = prop.resolve_text(text),
            PanelField::Material => material = free_text(prop, text),
            PanelField::Method => method = free_text(prop, text),
            PanelField::CollectedAt => collected_at = date_time(prop, text),
            PanelField::ReleasedAt => released_at = date_time(prop, text),
            PanelField::TestItem => item_entities.push(prop),
        }
    }

    let mut result = LabResult::new(report_id, &test_name)?;
    result.material = material;
    result.method = method;
    result.collected_at = collected_at;
    result.released_at = released_at;
    for item_entity in item_entities {
        let item = map_item(item_entity, text, &result.id)?;
        result.items.push(item);
    }
    Ok(result)
}

fn map_item(entity: &Entity, text: Option<&str>, result_id: &str) -> Result<ResultItem, IngestError> {
    let mut parameter_name = String::new();
    let mut value = None;
    let mut unit = None;
    let mut reference_text = None;

    for prop in &entity.properties {
        let Some(field) = ItemField::from_tag(&prop.entity_type) else {
            continue;
        };
        match field {
            ItemField::ParameterName => parameter_name = prop.resolve_text(text),
            ItemField::Value => value = free_text(prop, text),
            ItemField::Unit => unit = free_text(prop, text),
            ItemField::ReferenceText => reference_text = free_text(prop, text),
        }
    }

    let mut item = ResultItem::new(result_id, &parameter_name)?;
    item.value = value;
    item.unit = unit;
    item.reference_text = reference_text;
    Ok(item)
}

fn free_text(entity: &Entity, text: Option<&str>) -> Option<String> {
    clean_text(&entity.resolve_text(text))
}

fn date(entity: &Entity, text: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = entity.resolve_value(text);
    parse_date(&raw)
        .inspect_err(|e| debug!(tag = %entity.entity_type, error = %e, "date left unset"))
        .ok()
}

fn date_time(entity: &Entity, text: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = entity.resolve_value(text);
    parse_datetime(&raw)
        .inspect_err(|e| debug!(tag = %entity.entity_type, error = %e, "date-time left unset"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hemograma_document() -> ExtractedDocument {
        ExtractedDocument {
            text: Some("  LAUDO  ".into()),
            entities: vec![
                Entity::text("patient_name", "Ana Silva"),
                Entity::text("report_date", "04/12/2025"),
                Entity::text("lab_name", "  "),
                Entity::group(
                    "test_result",
                    vec![
                        Entity::text("test_name", "Hemograma"),
                        Entity::text("collection_datetime", "03/12/2025 08:00"),
                        Entity::text("material", "Sangue"),
                        Entity::group(
                            "test_item",
                            vec![
                                Entity::text("parameter_name", "Hemoglobina"),
                                Entity::text("result", "13.5"),
                                Entity::text("unit", "g/dL"),
                                Entity::text("reference_text", "12.0 a 16.0"),
                            ],
                        ),
                        Entity::group(
                            "test_item",
                            vec![
                                Entity::text("parameter_name", "Hematocrito"),
                                Entity::text("result_value", " 40 "),
                                Entity::text("result_unit", "%"),
                            ],
                        ),
                    ],
                ),
            ],
        }
    }

    #[test]
    fn test_maps_three_levels() {
        let report = map_document(&hemograma_document(), "p-1", "u-1").unwrap();

        assert_eq!(report.patient_name.as_deref(), Some("Ana Silva"));
        assert_eq!(report.lab_name, None);
        assert_eq!(report.raw_text.as_deref(), Some("LAUDO"));
        assert_eq!(
            report.report_date,
            Some(Utc.with_ymd_and_hms(2025, 12, 4, 0, 0, 0).unwrap())
        );
        assert!(report.fingerprint.is_none());

        let panel = &report.results[0];
        assert_eq!(panel.report_id, report.id);
        assert_eq!(panel.test_name, "Hemograma");
        assert_eq!(panel.material.as_deref(), Some("Sangue"));
        assert_eq!(
            panel.collected_at,
            Some(Utc.with_ymd_and_hms(2025, 12, 3, 8, 0, 0).unwrap())
        );

        assert_eq!(panel.items.len(), 2);
        assert_eq!(panel.items[0].result_id, panel.id);
        assert_eq!(panel.items[0].parameter_name, "Hemoglobina");
        assert_eq!(panel.items[0].value.as_deref(), Some("13.5"));
        assert_eq!(panel.items[0].unit.as_deref(), Some("g/dL"));
        assert_eq!(panel.items[0].reference_text.as_deref(), Some("12.0 a 16.0"));
        assert_eq!(panel.items[1].value.as_deref(), Some("40"));
        assert_eq!(panel.items[1].unit.as_deref(), Some("%"));
    }

    #[test]
    fn test_preserves_emission_order() {
        let doc = ExtractedDocument {
            text: None,
            entities: vec![
                Entity::group("test_result", vec![Entity::text("test_name", "Zinco")]),
                Entity::group("test_result", vec![Entity::text("test_name", "Albumina")]),
            ],
        };
        let report = map_document(&doc, "p-1", "u-1").unwrap();
        let names: Vec<_> = report.results.iter().map(|r| r.test_name.as_str()).collect();
        assert_eq!(names, vec!["Zinco", "Albumina"]);
    }

    #[test]
    fn test_unknown_tags_ignored() {
        let doc = ExtractedDocument {
            text: None,
            entities: vec![
                Entity::text("barcode", "123456"),
                Entity::group(
                    "test_result",
                    vec![
                        Entity::text("test_name", "Glicose"),
                        Entity::text("analyzer_serial", "XK-9"),
                        Entity::group(
                            "test_item",
                            vec![
                                Entity::text("parameter_name", "Glicose"),
                                Entity::text("flag", "H"),
                            ],
                        ),
                    ],
                ),
            ],
        };
        let report = map_document(&doc, "p-1", "u-1").unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].items[0].value, None);
    }

    #[test]
    fn test_unparsable_date_left_absent() {
        let doc = ExtractedDocument {
            text: None,
            entities: vec![
                Entity::text("patient_dob", "not-a-date"),
                Entity::group(
                    "test_result",
                    vec![
                        Entity::text("test_name", "Glicose"),
                        Entity::text("collected_at", "not-a-date"),
                    ],
                ),
            ],
        };
        let report = map_document(&doc, "p-1", "u-1").unwrap();
        assert_eq!(report.patient_dob, None);
        assert_eq!(report.results[0].collected_at, None);
    }

    #[test]
    fn test_normalized_value_used_for_dates() {
        let mut dob = Entity::text("patient_dob", "12 de março de 1990");
        dob.normalized_value = Some("1990-03-12".into());
        let doc = ExtractedDocument {
            text: None,
            entities: vec![dob],
        };
        let report = map_document(&doc, "p-1", "u-1").unwrap();
        assert_eq!(
            report.patient_dob,
            Some(Utc.with_ymd_and_hms(1990, 3, 12, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_zero_panels_is_sparse_report() {
        let doc = ExtractedDocument {
            text: None,
            entities: vec![Entity::text("patient_name", "Ana Silva")],
        };
        let report = map_document(&doc, "p-1", "u-1").unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.item_count(), 0);
    }

    #[test]
    fn test_nameless_panel_or_item_rejected() {
        let nameless_panel = ExtractedDocument {
            text: None,
            entities: vec![Entity::group(
                "test_result",
                vec![Entity::text("material", "Sangue")],
            )],
        };
        assert!(matches!(
            map_document(&nameless_panel, "p-1", "u-1"),
            Err(IngestError::InvalidInput(_))
        ));

        let nameless_item = ExtractedDocument {
            text: None,
            entities: vec![Entity::group(
                "test_result",
                vec![
                    Entity::text("test_name", "Hemograma"),
                    Entity::group("test_item", vec![Entity::text("result", "13.5")]),
                ],
            )],
        };
        assert!(matches!(
            map_document(&nameless_item, "p-1", "u-1"),
            Err(IngestError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_blank_patient_rejected() {
        assert!(matches!(
            map_document(&ExtractedDocument::default(), " ", "u-1"),
            Err(IngestError::InvalidInput(_))
        ));
    }
}
