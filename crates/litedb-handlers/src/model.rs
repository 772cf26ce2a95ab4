//! Payload types exchanged by the collection handlers.

use chrono::{DateTime, Utc};
use litedb_protocol::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `collections/{collectionName}:create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
}

impl Payload for Collection {
    const TYPE_ID: &'static str = "litedb.Collection";
}

/// Body of `collections/{collectionName}/indexes/{indexName}:create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Top-level document field to index.
    pub field: String,
    #[serde(default)]
    pub unique: bool,
}

impl Payload for IndexSpec {
    const TYPE_ID: &'static str = "litedb.IndexSpec";
}

/// Body of document `write` and `update` commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub body: Value,
}

impl Payload for Document {
    const TYPE_ID: &'static str = "litedb.Document";
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub field: String,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub name: String,
    pub document_count: usize,
    pub indexes: Vec<Index>,
    pub created_at: DateTime<Utc>,
}

impl Payload for CollectionInfo {
    const TYPE_ID: &'static str = "litedb.CollectionInfo";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: String,
    pub body: Value,
    /// Starts at 1 and increases on every write or update.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Payload for StoredDocument {
    const TYPE_ID: &'static str = "litedb.StoredDocument";
}
