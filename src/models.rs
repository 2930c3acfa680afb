//! Domain and API models.
//!
//! `WardrobeItem` and `ChangeEvent` mirror the document store's JSON shape
//! (`_id`, camelCase change-stream fields); the remaining types are HTTP
//! request/response bodies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Clothing category of a wardrobe item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tops,
    Bottoms,
    Dresses,
    Accessories,
    Outerwear,
    Others,
}

/// A wardrobe item as stored in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardrobeItem {
    /// Unique record identifier.
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// Free-text description of the item; the input to the embedding model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Embedding of `caption`, written once by the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_embedding: Option<Vec<f32>>,
    /// Fields this service does not interpret, kept as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl WardrobeItem {
    /// Create an item with only an identifier and a caption.
    pub fn new(id: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            image_url: None,
            category: None,
            caption: Some(caption.into()),
            caption_embedding: None,
            extra: BTreeMap::new(),
        }
    }

    /// Decide whether this item needs an embedding.
    ///
    /// An empty embedding array still counts as present. Any non-empty
    /// caption is embedded as-is, whitespace included.
    pub fn eligibility(&self) -> Eligibility {
        if self.caption_embedding.is_some() {
            return Eligibility::AlreadyEmbedded;
        }
        match self.caption.as_deref() {
            Some(caption) if !caption.is_empty() => Eligibility::Eligible,
            _ => Eligibility::MissingCaption,
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.eligibility() == Eligibility::Eligible
    }
}

/// Result of the eligibility guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    MissingCaption,
    AlreadyEmbedded,
}

/// Kind of mutation a change event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Insert,
    Update,
    Replace,
    Delete,
}

/// Identity of the changed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentKey {
    #[serde(rename = "_id")]
    pub id: String,
}

/// Notification carrying the post-mutation state of a wardrobe item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub operation_type: OperationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_key: Option<DocumentKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_document: Option<WardrobeItem>,
}

impl ChangeEvent {
    pub fn insert(item: WardrobeItem) -> Self {
        Self::with_document(OperationType::Insert, item)
    }

    pub fn update(item: WardrobeItem) -> Self {
        Self::with_document(OperationType::Update, item)
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            operation_type: OperationType::Delete,
            document_key: Some(DocumentKey { id: id.into() }),
            full_document: None,
        }
    }

    fn with_document(operation_type: OperationType, item: WardrobeItem) -> Self {
        Self {
            operation_type,
            document_key: Some(DocumentKey {
                id: item.id.clone(),
            }),
            full_document: Some(item),
        }
    }

    /// Identifier of the changed record, from the key or else the document.
    /// Blank identifiers are ignored.
    pub fn record_id(&self) -> Option<&str> {
        let non_blank = |id: &str| !id.trim().is_empty();
        self.document_key
            .as_ref()
            .map(|k| k.id.as_str())
            .filter(|id| non_blank(id))
            .or_else(|| {
                self.full_document
                    .as_ref()
                    .map(|d| d.id.as_str())
                    .filter(|id| non_blank(id))
            })
    }
}

/// Result of a conditional embedding write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    /// A record with the identifier exists.
    pub matched: bool,
    /// The embedding field was absent and has now been set.
    pub modified: bool,
}

/// Why an event was ignored without calling the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoDocument,
    NoIdentifier,
    MissingCaption,
    AlreadyEmbedded,
    /// The record was deleted before a dead-lettered event was replayed.
    RecordGone,
}

/// What handling a single change event did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    Skipped {
        reason: SkipReason,
    },
    Enriched {
        id: String,
        dimension: usize,
        cached: bool,
    },
    Unchanged {
        id: String,
        matched: bool,
    },
    Failed {
        id: String,
        code: String,
        error: String,
        attempts: u32,
    },
}

impl EnrichmentOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub fn is_enriched(&self) -> bool {
        matches!(self, Self::Enriched { .. })
    }
}

/// Counters reported by the health endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatsSnapshot {
    pub events_received: u64,
    pub replayed: u64,
    pub skipped: u64,
    pub enriched: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub provider_calls: u64,
    pub cache_hits: u64,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    pub stats: WorkerStatsSnapshot,
    pub stored_items: usize,
    pub dead_letters: usize,
    pub cache: CacheStats,
    pub endpoints: Vec<String>,
}

/// Occupancy of the embedding cache; a capacity of zero means disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
}

/// Response for a dead-letter replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResponse {
    pub replayed: usize,
    pub outcomes: Vec<EnrichmentOutcome>,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eligibility_guard() {
        let mut item = WardrobeItem::new("a", "red linen shirt");
        assert_eq!(item.eligibility(), Eligibility::Eligible);

        item.caption_embedding = Some(vec![]);
        assert_eq!(item.eligibility(), Eligibility::AlreadyEmbedded);

        item.caption_embedding = None;
        item.caption = Some("   ".to_string());
        assert_eq!(item.eligibility(), Eligibility::Eligible);

        item.caption = Some(String::new());
        assert_eq!(item.eligibility(), Eligibility::MissingCaption);

        item.caption = None;
        assert_eq!(item.eligibility(), Eligibility::MissingCaption);
    }

    #[test]
    fn test_change_event_wire_shape() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "operationType": "insert",
            "documentKey": { "_id": "665f" },
            "fullDocument": {
                "_id": "665f",
                "user_id": "u1",
                "caption": "blue denim jacket",
                "category": "outerwear",
                "created_at": "2024-06-01"
            }
        }))
        .unwrap();

        assert_eq!(event.operation_type, OperationType::Insert);
        assert_eq!(event.record_id(), Some("665f"));
        let doc = event.full_document.unwrap();
        assert_eq!(doc.category, Some(Category::Outerwear));
        assert_eq!(doc.extra["created_at"], json!("2024-06-01"));
        assert!(doc.is_eligible());
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({ "_id": "x", "caption": "scarf", "season": "winter" });
        let item: WardrobeItem = serde_json::from_value(raw).unwrap();
        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["season"], json!("winter"));
        assert!(back.get("caption_embedding").is_none());
    }

    #[test]
    fn test_record_id_prefers_key_and_skips_blanks() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "operationType": "insert",
            "documentKey": { "_id": "665f" },
            "fullDocument": { "caption": "black belt" }
        }))
        .unwrap();
        assert_eq!(event.record_id(), Some("665f"));

        let event: ChangeEvent = serde_json::from_value(json!({
            "operationType": "insert",
            "documentKey": { "_id": " " },
            "fullDocument": { "_id": "doc-id", "caption": "black belt" }
        }))
        .unwrap();
        assert_eq!(event.record_id(), Some("doc-id"));

        let event: ChangeEvent = serde_json::from_value(json!({
            "operationType": "insert",
            "fullDocument": { "caption": "black belt" }
        }))
        .unwrap();
        assert_eq!(event.record_id(), None);
    }

    #[test]
    fn test_delete_event_has_no_document() {
        let event = ChangeEvent::delete("gone");
        assert!(event.full_document.is_none());
        assert_eq!(event.record_id(), Some("gone"));
    }
}
