//! Metadata catalog discovery.
//!
//! A [`CatalogBuilder`] walks one connector's catalog and turns every table
//! into an [`IndexedDocument`]: a plain-text description tagged with the
//! connector it came from, ready for embedding.
//!
//! # Schema selection
//!
//! 1. the explicit schema list, when non-empty;
//! 2. `Connector::list_schemas`, minus the excluded system schemas;
//! 3. the configured `catalog.default_schema`;
//! 4. the connector's own default schema.
//!
//! A level that fails or yields nothing falls through to the next.

use serde::Serialize;
use std::sync::Arc;

use crate::config::CatalogConfig;
use crate::connector::Connector;
use crate::error::{QualityError, Result};
use crate::models::{ColumnDescriptor, DocumentMetadata, IndexedDocument, TableDescriptor};

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub include_sample: bool,
    pub sample_rows: usize,
    pub max_tables: Option<usize>,
    pub default_schema: Option<String>,
    pub exclude_schemas: Vec<String>,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self::from(&CatalogConfig::default())
    }
}

impl From<&CatalogConfig> for CatalogOptions {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            include_sample: config.include_sample,
            sample_rows: config.sample_rows,
            max_tables: config.max_tables,
            default_schema: config.default_schema.clone(),
            exclude_schemas: config.exclude_schemas.clone(),
        }
    }
}

/// Documents for every describable table, plus the ones that were not.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogBuild {
    pub documents: Vec<IndexedDocument>,
    /// `(full_name, reason)` for each table that failed to describe.
    pub skipped: Vec<(String, String)>,
}

pub struct CatalogBuilder {
    connector: Arc<dyn Connector>,
    options: CatalogOptions,
}

impl CatalogBuilder {
    pub fn new(connector: Arc<dyn Connector>, options: CatalogOptions) -> Self {
        Self { connector, options }
    }

    /// Tables in `database` (default: the connector's current database).
    ///
    /// Tables that fail to describe are logged and left out.
    pub async fn discover(
        &self,
        database: Option<&str>,
        schemas: &[String],
    ) -> Result<Vec<TableDescriptor>> {
        Ok(self.discover_tables(database, schemas).await?.0)
    }

    /// Render a table as an indexable document.
    pub async fn describe(&self, table: &TableDescriptor) -> IndexedDocument {
        let mut lines = vec![
            format!(
                "DATA SOURCE: {} ({})",
                table.connector_type.to_uppercase(),
                self.connector.kind().as_str()
            ),
            format!("TABLE: {}", table.full_name()),
            format!("Type: {}", table.object_type),
        ];
        if let Some(comment) = table.comment.as_deref().filter(|c| !c.trim().is_empty()) {
            lines.push(format!("Description: {}", comment));
        }
        if let Some(rows) = table.row_count {
            lines.push(format!("Row Count: {}", rows));
        }
        lines.push(format!("Schema: {}", table.namespace));
        lines.push(String::new());
        lines.push("COLUMNS:".to_string());
        lines.extend(table.columns.iter().map(column_line));

        if self.options.include_sample && self.options.sample_rows > 0 {
            lines.push(String::new());
            lines.push("SAMPLE DATA:".to_string());
            match self
                .connector
                .sample_rows(
                    &table.source,
                    &table.namespace,
                    &table.table,
                    self.options.sample_rows,
                )
                .await
            {
                Ok(frame) => lines.push(frame.to_pipe_table()),
                Err(e) => lines.push(format!("Sample data unavailable: {}", e)),
            }
        }

        IndexedDocument {
            text: lines.join("\n"),
            metadata: DocumentMetadata {
                table_name: table.table.clone(),
                full_name: table.full_name(),
                connector_type: table.connector_type.clone(),
                schema: table.namespace.clone(),
            },
        }
    }

    /// Discover, then describe every table.
    pub async fn build_documents(
        &self,
        database: Option<&str>,
        schemas: &[String],
    ) -> Result<CatalogBuild> {
        let (tables, skipped) = self.discover_tables(database, schemas).await?;
        let mut documents = Vec::with_capacity(tables.len());
        for table in &tables {
            documents.push(self.describe(table).await);
        }

        tracing::info!(
            source = %self.connector.name(),
            documents = documents.len(),
            skipped = skipped.len(),
            "catalog built"
        );
        Ok(CatalogBuild { documents, skipped })
    }

    async fn discover_tables(
        &self,
        database: Option<&str>,
        schemas: &[String],
    ) -> Result<(Vec<TableDescriptor>, Vec<(String, String)>)> {
        self.connector.connect().await?;
        let database = match database {
            Some(db) => db.to_string(),
            None => self.connector.current_database().await?,
        };
        let schemas = self.resolve_schemas(&database, schemas).await;
        if schemas.is_empty() {
            return Err(QualityError::Catalog(format!(
                "no schema to scan in source '{}'",
                self.connector.name()
            )));
        }

        let mut tables = Vec::new();
        let mut skipped = Vec::new();
        let mut listed_any = false;
        let limit = self.options.max_tables.unwrap_or(usize::MAX);

        'schemas: for schema in &schemas {
            let entries = match self.connector.list_tables(&database, schema).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        source = %self.connector.name(),
                        schema = %schema,
                        error = %e,
                        "failed to list tables; skipping schema"
                    );
                    continue;
                }
            };
            listed_any = true;

            for entry in entries {
                if tables.len() >= limit {
                    tracing::info!(max_tables = limit, "table limit reached");
                    break 'schemas;
                }
                let full_name = format!("{}.{}.{}", database, schema, entry.name);
                match self
                    .connector
                    .describe_table(&database, schema, &entry.name)
                    .await
                {
                    Ok(columns) => tables.push(TableDescriptor {
                        source: database.clone(),
                        namespace: schema.clone(),
                        table: entry.name,
                        connector_type: self.connector.name().to_string(),
                        object_type: entry.object_type,
                        columns,
                        row_count: entry.row_count,
                        comment: entry.comment,
                    }),
                    Err(e) => {
                        tracing::warn!(table = %full_name, error = %e, "skipping table");
                        skipped.push((full_name, e.to_string()));
                    }
                }
            }
        }

        if !listed_any {
            return Err(QualityError::Catalog(format!(
                "could not list tables in any schema of '{}'",
                database
            )));
        }
        Ok((tables, skipped))
    }

    async fn resolve_schemas(&self, database: &str, explicit: &[String]) -> Vec<String> {
        if !explicit.is_empty() {
            return explicit.to_vec();
        }

        match self.connector.list_schemas(database).await {
            Ok(found) => {
                let kept: Vec<String> = found
                    .into_iter()
                    .filter(|s| {
                        !self
                            .options
                            .exclude_schemas
                            .iter()
                            .any(|x| x.eq_ignore_ascii_case(s))
                    })
                    .collect();
                if !kept.is_empty() {
                    return kept;
                }
            }
            Err(e) => {
                tracing::warn!(
                    source = %self.connector.name(),
                    error = %e,
                    "schema discovery failed; falling back to default schema"
                );
            }
        }

        self.options
            .default_schema
            .clone()
            .or_else(|| self.connector.default_schema())
            .into_iter()
            .collect()
    }
}

fn column_line(column: &ColumnDescriptor) -> String {
    let mut line = format!("  - {} ({}", column.name, column.data_type);
    if !column.nullable {
        line.push_str(", NOT NULL");
    }
    line.push(')');
    if let Some(comment) = column.comment.as_deref().filter(|c| !c.is_empty()) {
        line.push_str(" - ");
        line.push_str(comment);
    }
    line
}
