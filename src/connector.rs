//! Data source connectors.
//!
//! A [`Connector`] is the narrow interface the harness uses to reach a data
//! source: the core capability set (`connect`, `disconnect`, `load_data`,
//! `test_connection`) plus the catalog queries the
//! [`CatalogBuilder`](crate::catalog::CatalogBuilder) needs.
//!
//! # Variants
//!
//! | Kind | Built-in implementation |
//! |------|-------------------------|
//! | [`ConnectorKind::File`] | [`CsvConnector`](crate::connector_csv::CsvConnector) |
//! | [`ConnectorKind::Relational`] | [`SqliteConnector`](crate::connector_sqlite::SqliteConnector) |
//! | [`ConnectorKind::Warehouse`] | none; register your own implementation |
//!
//! [`create_connector`] builds the built-in variants from a tagged
//! [`SourceConfig`]; [`ConnectorRegistry`] holds every connector by name.
//!
//! # Example
//!
//! ```rust
//! use quality_harness::connector::{ConnectorKind, ConnectorRegistry, MemoryConnector};
//! use quality_harness::frame::{Frame, Value};
//! use std::sync::Arc;
//!
//! let orders = Frame::from_rows(vec!["id".into()], vec![vec![Value::Int(1)]]);
//! let snowflake = MemoryConnector::new("snowflake", ConnectorKind::Warehouse, "PROD_SALES", "PUBLIC")
//!     .with_table("ORDERS", orders);
//!
//! let mut registry = ConnectorRegistry::new();
//! registry.register(Arc::new(snowflake));
//! assert!(registry.get("snowflake").is_some());
//! ```

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, SourceConfig};
use crate::connector_csv::CsvConnector;
use crate::connector_sqlite::SqliteConnector;
use crate::error::{QualityError, Result};
use crate::frame::Frame;
use crate::models::ColumnDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Warehouse,
    Relational,
    File,
}

impl ConnectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorKind::Warehouse => "warehouse",
            ConnectorKind::Relational => "relational",
            ConnectorKind::File => "file",
        }
    }
}

/// A table or view as listed by a schema catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    pub name: String,
    pub object_type: String,
    pub comment: Option<String>,
    pub row_count: Option<u64>,
}

/// A data source adapter.
///
/// `name()` is the connector tag: it is written into every indexed
/// document's `connector_type` and is what queries and assessments refer
/// to. Methods take `&self`; implementations keep their connection state
/// behind interior mutability so one instance can be shared through an
/// `Arc` by the index builder, the aggregator and the server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connector tag (e.g. `"postgres"`, `"files"`).
    fn name(&self) -> &str;

    fn kind(&self) -> ConnectorKind;

    /// Other words a query may use to mean this connector.
    fn aliases(&self) -> &[String] {
        &[]
    }

    /// Open the connection. Calling it again while connected is a no-op.
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Cheap reachability probe; never errors.
    async fn test_connection(&self) -> bool;

    /// Load a full dataset. `dataset_id` is `table`, `schema.table` or
    /// `database.schema.table`.
    async fn load_data(&self, dataset_id: &str) -> Result<Frame>;

    /// Database segment used in qualified names.
    async fn current_database(&self) -> Result<String>;

    /// Schema used when nothing else selects one.
    fn default_schema(&self) -> Option<String> {
        None
    }

    /// Schemas in `database`. An empty list means the source cannot
    /// enumerate them.
    async fn list_schemas(&self, database: &str) -> Result<Vec<String>>;

    async fn list_tables(&self, database: &str, schema: &str) -> Result<Vec<TableEntry>>;

    async fn describe_table(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>>;

    async fn sample_rows(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        limit: usize,
    ) -> Result<Frame>;
}

/// Parts of a dataset id: `(database, schema, table)`.
pub fn split_dataset_id(dataset_id: &str) -> (Option<&str>, Option<&str>, &str) {
    let parts: Vec<&str> = dataset_id.split('.').collect();
    match parts.as_slice() {
        [table] => (None, None, *table),
        [schema, table] => (None, Some(*schema), *table),
        [.., database, schema, table] => (Some(*database), Some(*schema), *table),
        [] => (None, None, dataset_id),
    }
}

/// Build a built-in connector from its configuration.
pub fn create_connector(name: &str, source: &SourceConfig) -> Result<Arc<dyn Connector>> {
    match source {
        SourceConfig::File(cfg) => Ok(Arc::new(CsvConnector::new(name, cfg.clone())?)),
        SourceConfig::Relational(cfg) => Ok(Arc::new(SqliteConnector::new(name, cfg.clone()))),
    }
}

/// Connectors by name, in registration order.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: IndexMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every source in the config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        for (name, source) in &config.sources {
            registry.register(create_connector(name, source)?);
        }
        Ok(registry)
    }

    /// Register a connector, replacing any with the same name.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors
            .insert(connector.name().to_string(), connector);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(name).cloned()
    }

    /// Look up by name, then by alias, case-insensitively.
    pub fn resolve(&self, name_or_alias: &str) -> Option<Arc<dyn Connector>> {
        if let Some(c) = self.get(name_or_alias) {
            return Some(c);
        }
        let wanted = name_or_alias.to_ascii_lowercase();
        self.connectors
            .values()
            .find(|c| {
                c.name().eq_ignore_ascii_case(&wanted)
                    || c.aliases().iter().any(|a| a.eq_ignore_ascii_case(&wanted))
            })
            .cloned()
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Arc<dyn Connector>> {
        self.connectors.values()
    }

    /// `(word, connector tag)` pairs for every name and alias.
    pub fn vocabulary(&self) -> Vec<(String, String)> {
        let mut words = Vec::new();
        for c in self.connectors.values() {
            words.push((c.name().to_ascii_lowercase(), c.name().to_string()));
            for alias in c.aliases() {
                words.push((alias.to_ascii_lowercase(), c.name().to_string()));
            }
        }
        words
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

/// A connector over frames held in memory.
///
/// Useful for embedding the harness in a process that already holds its
/// data, and as the template for a custom warehouse driver.
pub struct MemoryConnector {
    name: String,
    kind: ConnectorKind,
    database: String,
    schema: String,
    aliases: Vec<String>,
    tables: IndexMap<String, Frame>,
    reachable: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryConnector {
    pub fn new(
        name: impl Into<String>,
        kind: ConnectorKind,
        database: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            database: database.into(),
            schema: schema.into(),
            aliases: Vec::new(),
            tables: IndexMap::new(),
            reachable: AtomicBool::new(true),
            latency: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>, frame: Frame) -> Self {
        self.tables.insert(table.into(), frame);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Delay every `load_data` call, as a slow warehouse would.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Simulate an outage: every call after this fails to connect.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QualityError::connection(&self.name, "source unreachable"))
        }
    }

    fn table(&self, schema: &str, table: &str) -> Result<&Frame> {
        if !schema.eq_ignore_ascii_case(&self.schema) {
            return Err(QualityError::Catalog(format!("schema '{}' not found", schema)));
        }
        self.tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
            .map(|(_, frame)| frame)
            .ok_or_else(|| QualityError::Catalog(format!("table '{}' not found", table)))
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    async fn connect(&self) -> Result<()> {
        self.ensure_reachable()
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        self.ensure_reachable().is_ok()
    }

    async fn load_data(&self, dataset_id: &str) -> Result<Frame> {
        self.ensure_reachable()?;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let (_, schema, table) = split_dataset_id(dataset_id);
        self.table(schema.unwrap_or(&self.schema), table).cloned()
    }

    async fn current_database(&self) -> Result<String> {
        Ok(self.database.clone())
    }

    fn default_schema(&self) -> Option<String> {
        Some(self.schema.clone())
    }

    async fn list_schemas(&self, _database: &str) -> Result<Vec<String>> {
        self.ensure_reachable()?;
        Ok(vec![self.schema.clone()])
    }

    async fn list_tables(&self, _database: &str, schema: &str) -> Result<Vec<TableEntry>> {
        self.ensure_reachable()?;
        if !schema.eq_ignore_ascii_case(&self.schema) {
            return Ok(Vec::new());
        }
        Ok(self
            .tables
            .iter()
            .map(|(name, frame)| TableEntry {
                name: name.clone(),
                object_type: "BASE TABLE".to_string(),
                comment: None,
                row_count: Some(frame.height() as u64),
            })
            .collect())
    }

    async fn describe_table(
        &self,
        _database: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>> {
        self.ensure_reachable()?;
        let frame = self.table(schema, table)?;
        Ok(frame
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, name)| ColumnDescriptor {
                name: name.clone(),
                data_type: infer_column_type(frame, idx).to_string(),
                nullable: frame.column(idx).any(|v| v.is_missing()),
                comment: None,
            })
            .collect())
    }

    async fn sample_rows(
        &self,
        _database: &str,
        schema: &str,
        table: &str,
        limit: usize,
    ) -> Result<Frame> {
        self.ensure_reachable()?;
        Ok(self.table(schema, table)?.head(limit))
    }
}

/// SQL-ish type name for a frame column, judged from its present values.
pub fn infer_column_type(frame: &Frame, idx: usize) -> &'static str {
    use crate::frame::Value;

    let mut kind = "NULL";
    for value in frame.column(idx).filter(|v| !v.is_missing()) {
        let this = match value {
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Bool(_) => "BOOLEAN",
            Value::Text(_) | Value::Null => "TEXT",
        };
        kind = match (kind, this) {
            ("NULL", t) => t,
            (a, b) if a == b => a,
            ("INTEGER", "FLOAT") | ("FLOAT", "INTEGER") => "FLOAT",
            _ => "TEXT",
        };
        if kind == "TEXT" {
            break;
        }
    }
    if kind == "NULL" {
        "TEXT"
    } else {
        kind
    }
}
