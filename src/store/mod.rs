//! Vector collection storage.
//!
//! The [`VectorStore`] trait is everything the
//! [`EmbeddingIndex`](crate::index::EmbeddingIndex) needs from a backend:
//! named collections of embedded documents with brute-force cosine
//! nearest-neighbour queries, and an atomic collection swap for rebuilds.
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | [`memory::InMemoryStore`] | `HashMap` behind `std::sync::RwLock` |
//! | [`sqlite::SqliteVectorStore`] | the `vectors` / `collections` tables |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::DocumentMetadata;

/// A document and its embedding, ready to store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Stable document id; upserts replace records with the same id.
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
    pub vector: Vec<f32>,
    pub model: String,
}

/// A query result. `distance` is cosine distance, `1 - similarity`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub metadata: DocumentMetadata,
    pub distance: f32,
}

/// Abstract storage backend for embedded catalog documents.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_collection`](VectorStore::create_collection) | Register an (empty) collection |
/// | [`upsert`](VectorStore::upsert) | Insert or replace records by id |
/// | [`query`](VectorStore::query) | Nearest neighbours, closest first |
/// | [`delete_collection`](VectorStore::delete_collection) | Drop a collection; `false` if it was absent |
/// | [`collection_exists`](VectorStore::collection_exists) | Has the collection been created |
/// | [`swap_collection`](VectorStore::swap_collection) | Atomically replace `live` with `staging` |
/// | [`list_metadata`](VectorStore::list_metadata) | Metadata of every record |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist. Idempotent.
    async fn create_collection(&self, collection: &str) -> Result<()>;

    /// Insert or replace records, creating the collection when needed.
    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<usize>;

    /// Up to `k` closest records. Ties keep insertion order.
    ///
    /// Fails with [`QualityError::IndexNotBuilt`](crate::error::QualityError::IndexNotBuilt)
    /// when the collection does not exist.
    async fn query(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>>;

    /// Delete a collection. `Ok(false)` means it did not exist.
    async fn delete_collection(&self, collection: &str) -> Result<bool>;

    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Replace `live` with the contents of `staging` in one step and drop
    /// `staging`. Readers never observe a partially built `live`.
    async fn swap_collection(&self, staging: &str, live: &str) -> Result<()>;

    /// Metadata of every record in insertion order. Empty if absent.
    async fn list_metadata(&self, collection: &str) -> Result<Vec<DocumentMetadata>>;
}

/// Stable ascending sort by distance, then truncate to `k`.
pub(crate) fn nearest(mut matches: Vec<VectorMatch>, k: usize) -> Vec<VectorMatch> {
    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    matches.truncate(k);
    matches
}
