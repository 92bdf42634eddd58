//! Extractor entity tree and the [`DocumentExtractor`] seam.
//!
//! The document-understanding service returns a loosely typed tree: a
//! document with its full OCR text and a list of entities, each tagged with
//! a string type and optionally carrying nested `properties`. Lab reports
//! use three levels (report fields → `test_result` panels → `test_item`
//! parameters), but nothing in these types enforces that; the
//! [`mapper`](crate::mapper) decides what each tag means.
//!
//! # JSON shape
//!
//! ```json
//! {
//!   "text": "LABORATORIO ...",
//!   "entities": [
//!     { "type": "patient_name", "mention_text": "Ana Silva" },
//!     { "type": "test_result", "properties": [
//!         { "type": "test_name", "mention_text": "Hemograma" },
//!         { "type": "test_item", "properties": [
//!             { "type": "parameter_name", "mention_text": "Hemoglobina" },
//!             { "type": "result", "mention_text": "13.5" }
//!         ] }
//!     ] }
//!   ]
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Full extractor response for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Complete OCR text; text anchors index into it.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// A byte range of [`ExtractedDocument::text`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    #[serde(default)]
    pub start_index: i64,
    pub end_index: i64,
}

/// One tagged node of the entity tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub mention_text: Option<String>,
    /// Extractor-normalized form of the value, e.g. an ISO date.
    #[serde(default)]
    pub normalized_value: Option<String>,
    #[serde(default)]
    pub text_segments: Vec<TextSegment>,
    #[serde(default)]
    pub properties: Vec<Entity>,
}

impl Entity {
    /// Leaf entity carrying a mention text.
    pub fn text(entity_type: &str, mention: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            mention_text: Some(mention.to_string()),
            ..Default::default()
        }
    }

    /// Entity whose value lives in nested properties.
    pub fn group(entity_type: &str, properties: Vec<Entity>) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            properties,
            ..Default::default()
        }
    }

    /// Visible text of the entity.
    ///
    /// The mention text when non-empty, otherwise the concatenation of the
    /// text-anchor segments. Segments are clamped to the document text and
    /// skipped when empty, inverted, or not on a character boundary.
    pub fn resolve_text(&self, document_text: Option<&str>) -> String {
        if let Some(mention) = self.mention_text.as_deref().filter(|m| !m.is_empty()) {
            return mention.to_string();
        }

        let full = document_text.unwrap_or_default();
        let len = full.len() as i64;
        let mut out = String::new();
        for segment in &self.text_segments {
            let end = segment.end_index.min(len);
            let start = segment.start_index;
            if start < 0 || end <= start || start >= len {
                continue;
            }
            if let Some(slice) = full.get(start as usize..end as usize) {
                out.push_str(slice);
            }
        }
        out
    }

    /// Value of the entity, preferring the normalized form.
    ///
    /// Used for date-bearing fields, where the extractor often supplies an
    /// ISO rendering alongside the printed text.
    pub fn resolve_value(&self, document_text: Option<&str>) -> String {
        if let Some(normalized) = self
            .normalized_value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return normalized.to_string();
        }
        self.resolve_text(document_text).trim().to_string()
    }
}

/// A document-understanding backend.
///
/// Implementations send the already-uploaded document (by URI) to the
/// extraction service and return its entity tree. Any failure (transport,
/// timeout, non-success status, malformed body) is an `Err`; the pipeline
/// reports all of them as `DocumentProcessingFailed`.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use labflow_core::extraction::{DocumentExtractor, Entity, ExtractedDocument};
///
/// struct CannedExtractor;
///
/// #[async_trait]
/// impl DocumentExtractor for CannedExtractor {
///     fn name(&self) -> &str { "canned" }
///
///     async fn extract(&self, _uri: &str, _mime: &str) -> Result<ExtractedDocument> {
///         Ok(ExtractedDocument {
///             text: None,
///             entities: vec![Entity::text("patient_name", "Ana Silva")],
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Short backend identifier used in logs (e.g. `"http"`).
    fn name(&self) -> &str;

    /// Extract the entity tree of the document at `document_uri`.
    async fn extract(&self, document_uri: &str, mime_type: &str) -> Result<ExtractedDocument>;
}
