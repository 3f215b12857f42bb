//! Core data types shared by the catalog, index and ranker.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A column as reported by a source's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub comment: Option<String>,
}

/// Snapshot of one table taken during catalog discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Database (or directory) the table lives in.
    pub source: String,
    /// Schema.
    pub namespace: String,
    pub table: String,
    /// Tag of the connector that discovered the table.
    pub connector_type: String,
    /// `BASE TABLE`, `VIEW`, `FILE`, ...
    pub object_type: String,
    pub columns: Vec<ColumnDescriptor>,
    pub row_count: Option<u64>,
    pub comment: Option<String>,
}

impl TableDescriptor {
    /// `source.namespace.table`.
    pub fn full_name(&self) -> String {
        format!("{}.{}.{}", self.source, self.namespace, self.table)
    }
}

/// Metadata stored alongside each document in the vector collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub table_name: String,
    pub full_name: String,
    pub connector_type: String,
    pub schema: String,
}

/// Descriptive text for one table plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl IndexedDocument {
    /// Stable id: the same table from the same connector always maps to the
    /// same id, so appends replace instead of duplicating.
    pub fn document_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.metadata.connector_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.metadata.full_name.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A candidate table returned by search.
///
/// Hits straight out of the index carry `rank == 0` and
/// `boosted_score == raw_similarity`; the ranker fills in both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub full_name: String,
    pub connector_type: String,
    pub raw_similarity: f64,
    pub boosted_score: f64,
    pub rank: usize,
}

impl RankedHit {
    /// Bare table name: the last dotted segment of `full_name`.
    pub fn table_name(&self) -> &str {
        self.full_name.rsplit('.').next().unwrap_or(&self.full_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(connector: &str, full_name: &str) -> IndexedDocument {
        IndexedDocument {
            text: "TABLE".to_string(),
            metadata: DocumentMetadata {
                table_name: full_name.rsplit('.').next().unwrap().to_string(),
                full_name: full_name.to_string(),
                connector_type: connector.to_string(),
                schema: "public".to_string(),
            },
        }
    }

    #[test]
    fn test_document_id_stable_per_connector_and_table() {
        let a = doc("postgres", "stage_sales.public.customers");
        let b = doc("postgres", "stage_sales.public.customers");
        let c = doc("snowflake", "stage_sales.public.customers");
        assert_eq!(a.document_id(), b.document_id());
        assert_ne!(a.document_id(), c.document_id());
        assert_eq!(a.document_id().len(), 64);
    }

    #[test]
    fn test_hit_table_name() {
        let hit = RankedHit {
            full_name: "PROD_SALES.PUBLIC.ORDERS".to_string(),
            connector_type: "snowflake".to_string(),
            raw_similarity: 0.5,
            boosted_score: 0.5,
            rank: 0,
        };
        assert_eq!(hit.table_name(), "ORDERS");
    }
}
