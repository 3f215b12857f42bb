//! SQLite-backed [`VectorStore`].
//!
//! Vectors are little-endian f32 blobs in the `vectors` table; the
//! `collections` table records which collections have been built. Nearest
//! neighbours are computed in Rust by brute-force cosine over the
//! collection's rows.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{nearest, VectorMatch, VectorRecord, VectorStore};
use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{QualityError, Result};
use crate::migrate;
use crate::models::DocumentMetadata;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Wrap a pool whose schema is already migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and ensure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn create_collection(&self, collection: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(collection)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(collection)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO vectors (id, collection, text, metadata_json, embedding, dims, model, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    model = excluded.model,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&record.id)
            .bind(collection)
            .bind(&record.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.vector))
            .bind(record.vector.len() as i64)
            .bind(&record.model)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    async fn query(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
        if !self.collection_exists(collection).await? {
            return Err(QualityError::IndexNotBuilt {
                collection: collection.to_string(),
            });
        }

        let rows = sqlx::query(
            "SELECT id, metadata_json, embedding FROM vectors WHERE collection = ? ORDER BY rowid",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.try_get("metadata_json")?;
            let blob: Vec<u8> = row.try_get("embedding")?;
            matches.push(VectorMatch {
                id: row.try_get("id")?,
                metadata: serde_json::from_str(&metadata_json)?,
                distance: 1.0 - cosine_similarity(vector, &blob_to_vec(&blob)),
            });
        }
        Ok(nearest(matches, k))
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM vectors WHERE collection = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed > 0)
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn swap_collection(&self, staging: &str, live: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let staged: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(staging)
                .fetch_one(&mut *tx)
                .await?;
        if !staged {
            return Err(QualityError::IndexNotBuilt {
                collection: staging.to_string(),
            });
        }

        sqlx::query("DELETE FROM vectors WHERE collection = ?")
            .bind(live)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE vectors SET collection = ? WHERE collection = ?")
            .bind(live)
            .bind(staging)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(live)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE collections SET name = ? WHERE name = ?")
            .bind(live)
            .bind(staging)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_metadata(&self, collection: &str) -> Result<Vec<DocumentMetadata>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT metadata_json FROM vectors WHERE collection = ? ORDER BY rowid",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for json in rows {
            out.push(serde_json::from_str(&json)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{exercise_store, record};
    use tempfile::TempDir;

    async fn open_store(tmp: &TempDir) -> SqliteVectorStore {
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("dqh.sqlite");
        SqliteVectorStore::open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_store_contract() {
        let tmp = TempDir::new().unwrap();
        exercise_store(&open_store(&tmp).await).await;
    }

    #[tokio::test]
    async fn test_vectors_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open_store(&tmp).await;
            store
                .upsert("live", &[record("a", "files", "db.public.orders", vec![0.25, -1.5])])
                .await
                .unwrap();
            store.pool().close().await;
        }

        let store = open_store(&tmp).await;
        let hits = store.query("live", &[0.25, -1.5], 1).await.unwrap();
        assert_eq!(hits[0].metadata.full_name, "db.public.orders");
        assert!(hits[0].distance.abs() < 1e-6);
    }
}
