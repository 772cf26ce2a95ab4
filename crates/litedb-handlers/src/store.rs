//! In-memory collection store.
//!
//! Holds collections, their indexes and their documents behind a single
//! lock. Every method takes the lock once, so each call is atomic with
//! respect to concurrent commands.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::model::{CollectionInfo, Index, IndexSpec, StoredDocument};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invalid name {0:?}")]
    InvalidName(String),

    #[error("collection {0:?} already exists")]
    CollectionExists(String),

    #[error("collection {0:?} not found")]
    CollectionNotFound(String),

    #[error("index {0:?} already exists")]
    IndexExists(String),

    #[error("index {0:?} not found")]
    IndexNotFound(String),

    #[error("document {0:?} not found")]
    DocumentNotFound(String),

    #[error("unique index {index:?} already holds value {value}")]
    UniqueViolation { index: String, value: Value },
}

impl StoreError {
    /// Error code sent to the client.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidName(_) => "invalid-name",
            Self::CollectionExists(_) => "collection-exists",
            Self::CollectionNotFound(_) => "collection-not-found",
            Self::IndexExists(_) => "index-exists",
            Self::IndexNotFound(_) => "index-not-found",
            Self::DocumentNotFound(_) => "document-not-found",
            Self::UniqueViolation { .. } => "unique-violation",
        }
    }
}

struct CollectionState {
    created_at: DateTime<Utc>,
    indexes: BTreeMap<String, IndexSpec>,
    documents: BTreeMap<String, StoredDocument>,
}

impl CollectionState {
    fn info(&self, name: &str) -> CollectionInfo {
        CollectionInfo {
            name: name.to_string(),
            document_count: self.documents.len(),
            indexes: self
                .indexes
                .iter()
                .map(|(index, spec)| Index {
                    name: index.clone(),
                    field: spec.field.clone(),
                    unique: spec.unique,
                })
                .collect(),
            created_at: self.created_at,
        }
    }

    /// Reject `body` for document `id` if it would duplicate a value held
    /// by a unique index.
    fn check_unique(&self, id: &str, body: &Value) -> Result<(), StoreError> {
        for (index, spec) in self.indexes.iter().filter(|(_, spec)| spec.unique) {
            let Some(value) = body.get(&spec.field) else {
                continue;
            };
            let taken = self
                .documents
                .values()
                .any(|doc| doc.id != id && doc.body.get(&spec.field) == Some(value));
            if taken {
                return Err(StoreError::UniqueViolation {
                    index: index.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Names become path segments, so they must be non-blank and free of `/`.
fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() || name.contains('/') {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[derive(Default)]
pub struct CollectionStore {
    collections: RwLock<HashMap<String, CollectionState>>,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_collection(&self, name: &str) -> Result<CollectionInfo, StoreError> {
        validate_name(name)?;
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }
        let state = CollectionState {
            created_at: Utc::now(),
            indexes: BTreeMap::new(),
            documents: BTreeMap::new(),
        };
        let info = state.info(name);
        collections.insert(name.to_string(), state);
        info!("Created collection {name}");
        Ok(info)
    }

    pub fn drop_collection(&self, name: &str) -> Result<(), StoreError> {
        match self.collections.write().remove(name) {
            Some(state) => {
                info!("Dropped collection {name} ({} documents)", state.documents.len());
                Ok(())
            }
            None => Err(StoreError::CollectionNotFound(name.to_string())),
        }
    }

    pub fn collection(&self, name: &str) -> Result<CollectionInfo, StoreError> {
        self.collections
            .read()
            .get(name)
            .map(|state| state.info(name))
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn create_index(
        &self,
        collection: &str,
        index: &str,
        spec: IndexSpec,
    ) -> Result<CollectionInfo, StoreError> {
        validate_name(index)?;
        if spec.field.trim().is_empty() {
            return Err(StoreError::InvalidName(spec.field));
        }

        let mut collections = self.collections.write();
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        if state.indexes.contains_key(index) {
            return Err(StoreError::IndexExists(index.to_string()));
        }

        if spec.unique {
            let mut seen: Vec<&Value> = Vec::new();
            for value in state.documents.values().filter_map(|doc| doc.body.get(&spec.field)) {
                if seen.contains(&value) {
                    return Err(StoreError::UniqueViolation {
                        index: index.to_string(),
                        value: value.clone(),
                    });
                }
                seen.push(value);
            }
        }

        info!("Created index {index} on {collection}.{}", spec.field);
        state.indexes.insert(index.to_string(), spec);
        Ok(state.info(collection))
    }

    pub fn drop_index(&self, collection: &str, index: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        state
            .indexes
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))
    }

    /// Insert or replace document `id`.
    pub fn write_document(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<StoredDocument, StoreError> {
        validate_name(id)?;
        let mut collections = self.collections.write();
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        state.check_unique(id, &body)?;

        let version = state.documents.get(id).map_or(1, |doc| doc.version + 1);
        let document = StoredDocument {
            id: id.to_string(),
            body,
            version,
            updated_at: Utc::now(),
        };
        state.documents.insert(id.to_string(), document.clone());
        Ok(document)
    }

    /// Update an existing document. Object bodies are merged field by
    /// field; any other body replaces the stored one.
    pub fn update_document(
        &self,
        collection: &str,
        id: &str,
        changes: Value,
    ) -> Result<StoredDocument, StoreError> {
        let mut collections = self.collections.write();
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        let current = state
            .documents
            .get(id)
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))?;

        let body = match (current.body.clone(), changes) {
            (Value::Object(mut merged), Value::Object(changes)) => {
                merged.extend(changes);
                Value::Object(merged)
            }
            (_, replacement) => replacement,
        };
        state.check_unique(id, &body)?;

        let document = StoredDocument {
            id: id.to_string(),
            body,
            version: current.version + 1,
            updated_at: Utc::now(),
        };
        state.documents.insert(id.to_string(), document.clone());
        Ok(document)
    }

    pub fn document(&self, collection: &str, id: &str) -> Result<StoredDocument, StoreError> {
        let collections = self.collections.read();
        let state = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        state
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))
    }

    pub fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        state
            .documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))
    }
}
