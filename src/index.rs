//! Persistent vector index over catalog documents.
//!
//! [`EmbeddingIndex`] embeds [`IndexedDocument`]s with the configured
//! [`EmbeddingProvider`] and stores them in one named collection of a
//! [`VectorStore`].
//!
//! # Rebuild vs append
//!
//! - `build(docs, recreate = true)` embeds into a fresh staging collection
//!   and swaps it in with [`VectorStore::swap_collection`]. Only one build
//!   runs at a time; searches hold a read lock across each query so they
//!   see either the old collection or the new one.
//! - `build(docs, recreate = false)` upserts into the live collection by
//!   document id. Documents from other connectors are kept.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::Result;
use crate::models::{DocumentMetadata, IndexedDocument, RankedHit};
use crate::store::{VectorRecord, VectorStore};

/// Outcome of one [`EmbeddingIndex::build`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub collection: String,
    pub documents: usize,
    pub recreated: bool,
    pub model: String,
}

pub struct EmbeddingIndex {
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    collection: String,
    writer: Mutex<()>,
    swap: RwLock<()>,
}

impl EmbeddingIndex {
    pub fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provider,
            collection: collection.into(),
            writer: Mutex::new(()),
            swap: RwLock::new(()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn is_built(&self) -> Result<bool> {
        self.store.collection_exists(&self.collection).await
    }

    pub async fn build(&self, documents: &[IndexedDocument], recreate: bool) -> Result<IndexReport> {
        let _writer = self.writer.lock().await;

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.provider.embed(&texts).await?
        };
        let model = self.provider.model_name().to_string();
        let records: Vec<VectorRecord> = documents
            .iter()
            .zip(vectors)
            .map(|(doc, vector)| VectorRecord {
                id: doc.document_id(),
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                vector,
                model: model.clone(),
            })
            .collect();

        if recreate {
            let staging = format!("{}__staging_{}", self.collection, uuid::Uuid::new_v4().simple());
            self.store.create_collection(&staging).await?;
            if let Err(e) = self.store.upsert(&staging, &records).await {
                if let Err(cleanup) = self.store.delete_collection(&staging).await {
                    tracing::warn!(collection = %staging, error = %cleanup, "failed to drop staging collection");
                }
                return Err(e);
            }
            let _swap = self.swap.write().await;
            self.store.swap_collection(&staging, &self.collection).await?;
        } else {
            self.store.upsert(&self.collection, &records).await?;
        }

        tracing::info!(
            collection = %self.collection,
            documents = records.len(),
            recreate,
            model = %model,
            "index built"
        );

        Ok(IndexReport {
            collection: self.collection.clone(),
            documents: records.len(),
            recreated: recreate,
            model,
        })
    }

    /// Raw nearest neighbours for `query`: `boosted_score == raw_similarity`
    /// and `rank == 0` until the ranker fills them in.
    ///
    /// Fails with `IndexNotBuilt` if no build has completed.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RankedHit>> {
        if !self.is_built().await? {
            return Err(crate::error::QualityError::IndexNotBuilt {
                collection: self.collection.clone(),
            });
        }
        let vector = embed_query(self.provider.as_ref(), query).await?;

        let matches = {
            let _swap = self.swap.read().await;
            self.store.query(&self.collection, &vector, k).await?
        };

        Ok(matches
            .into_iter()
            .map(|m| {
                let similarity = (1.0 - m.distance as f64).clamp(0.0, 1.0);
                RankedHit {
                    full_name: m.metadata.full_name,
                    connector_type: m.metadata.connector_type,
                    raw_similarity: similarity,
                    boosted_score: similarity,
                    rank: 0,
                }
            })
            .collect())
    }

    /// Metadata of every indexed document.
    pub async fn catalog(&self) -> Result<Vec<DocumentMetadata>> {
        let _swap = self.swap.read().await;
        self.store.list_metadata(&self.collection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;
    use crate::error::QualityError;
    use crate::store::memory::InMemoryStore;

    fn doc(connector: &str, full_name: &str, body: &str) -> IndexedDocument {
        IndexedDocument {
            text: format!("DATA SOURCE: {}\nTABLE: {}\n{}", connector.to_uppercase(), full_name, body),
            metadata: DocumentMetadata {
                table_name: full_name.rsplit('.').next().unwrap().to_string(),
                full_name: full_name.to_string(),
                connector_type: connector.to_string(),
                schema: "public".to_string(),
            },
        }
    }

    fn index() -> EmbeddingIndex {
        EmbeddingIndex::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashProvider::new("hash-v1", 256)),
            "table_catalog",
        )
    }

    #[tokio::test]
    async fn test_search_before_build_is_index_not_built() {
        let index = index();
        assert!(matches!(
            index.search("customers", 3).await,
            Err(QualityError::IndexNotBuilt { .. })
        ));
    }

    #[tokio::test]
    async fn test_search_returns_clamped_raw_hits() {
        let index = index();
        index
            .build(
                &[
                    doc("postgres", "stage.public.customers", "customer email name"),
                    doc("postgres", "stage.public.shipments", "carrier weight"),
                ],
                true,
            )
            .await
            .unwrap();

        let hits = index.search("customer email", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].full_name, "stage.public.customers");
        for hit in &hits {
            assert!((0.0..=1.0).contains(&hit.raw_similarity));
            assert_eq!(hit.rank, 0);
        }
    }

    #[tokio::test]
    async fn test_append_preserves_other_connectors() {
        let index = index();
        index
            .build(&[doc("postgres", "stage.public.orders", "order")], true)
            .await
            .unwrap();
        index
            .build(&[doc("snowflake", "PROD.PUBLIC.ORDERS", "order")], false)
            .await
            .unwrap();
        // Re-appending the same table replaces instead of duplicating.
        index
            .build(&[doc("snowflake", "PROD.PUBLIC.ORDERS", "order total")], false)
            .await
            .unwrap();

        let catalog = index.catalog().await.unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn test_recreate_replaces_collection() {
        let index = index();
        index
            .build(&[doc("postgres", "stage.public.orders", "order")], true)
            .await
            .unwrap();
        let report = index
            .build(&[doc("snowflake", "PROD.PUBLIC.SALES", "sales")], true)
            .await
            .unwrap();
        assert!(report.recreated);

        let catalog = index.catalog().await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].connector_type, "snowflake");
    }

    #[tokio::test]
    async fn test_empty_rebuild_is_built_but_empty() {
        let index = index();
        index.build(&[], true).await.unwrap();
        assert!(index.is_built().await.unwrap());
        assert!(index.search("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_readers_never_see_partial_rebuild() {
        let index = Arc::new(index());
        let old: Vec<IndexedDocument> = (0..20)
            .map(|i| doc("postgres", &format!("stage.public.orders_{}", i), "orders"))
            .collect();
        let new: Vec<IndexedDocument> = (0..20)
            .map(|i| doc("snowflake", &format!("PROD.PUBLIC.ORDERS_{}", i), "orders"))
            .collect();
        index.build(&old, true).await.unwrap();

        let writer = {
            let index = Arc::clone(&index);
            tokio::spawn(async move {
                for _ in 0..5 {
                    index.build(&new, true).await.unwrap();
                    index.build(&old, true).await.unwrap();
                }
            })
        };

        for _ in 0..50 {
            let hits = index.search("orders", 40).await.unwrap();
            assert_eq!(hits.len(), 20);
            let first = &hits[0].connector_type;
            assert!(hits.iter().all(|h| &h.connector_type == first));
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }
}
