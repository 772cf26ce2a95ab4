//! LiteDB Handlers
//!
//! Leaf command handlers for collections, indexes and documents, backed by
//! an in-memory [`CollectionStore`]. `collection_routes` returns the route
//! table the server is started with.

pub mod collections;
pub mod model;
pub mod store;

pub use collections::{
    COLLECTION_ROUTE, DOCUMENT_ROUTE, INDEX_ROUTE, NAME_MISMATCH, collection_routes,
};
pub use model::{Collection, CollectionInfo, Document, Index, IndexSpec, StoredDocument};
pub use store::{CollectionStore, StoreError};
