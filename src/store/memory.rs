//! In-memory [`VectorStore`] for tests and embedded use.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`; each keeps
//! its records in insertion order so equal distances sort stably.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use indexmap::IndexMap;

use super::{nearest, VectorMatch, VectorRecord, VectorStore};
use crate::embedding::cosine_similarity;
use crate::error::{QualityError, Result};
use crate::models::DocumentMetadata;

type Collections = HashMap<String, IndexMap<String, VectorRecord>>;

#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn create_collection(&self, collection: &str) -> Result<()> {
        self.write().entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<usize> {
        let mut collections = self.write();
        let stored = collections.entry(collection.to_string()).or_default();
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    async fn query(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
        let collections = self.read();
        let stored = collections
            .get(collection)
            .ok_or_else(|| QualityError::IndexNotBuilt {
                collection: collection.to_string(),
            })?;
        let matches = stored
            .values()
            .map(|r| VectorMatch {
                id: r.id.clone(),
                metadata: r.metadata.clone(),
                distance: 1.0 - cosine_similarity(vector, &r.vector),
            })
            .collect();
        Ok(nearest(matches, k))
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool> {
        Ok(self.write().remove(collection).is_some())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.read().contains_key(collection))
    }

    async fn swap_collection(&self, staging: &str, live: &str) -> Result<()> {
        let mut collections = self.write();
        let records = collections.remove(staging).ok_or_else(|| QualityError::IndexNotBuilt {
            collection: staging.to_string(),
        })?;
        collections.insert(live.to_string(), records);
        Ok(())
    }

    async fn list_metadata(&self, collection: &str) -> Result<Vec<DocumentMetadata>> {
        Ok(self
            .read()
            .get(collection)
            .map(|stored| stored.values().map(|r| r.metadata.clone()).collect())
            .unwrap_or_default())
    }
}
