//! Flat-file connector over a directory of delimited files.
//!
//! Layout maps onto qualified names like this:
//!
//! ```text
//! base_path/                 database = dir name (or `database` in config)
//! ├── customers.csv          <db>.<default_schema>.customers
//! └── staging/
//!     └── orders.csv         <db>.staging.orders
//! ```
//!
//! Files are selected with `include_globs` / `exclude_globs` relative to
//! `base_path`, the same way the filesystem walkers elsewhere in the crate
//! select documents.

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::FileSourceConfig;
use crate::connector::{infer_column_type, split_dataset_id, Connector, ConnectorKind, TableEntry};
use crate::error::{QualityError, Result};
use crate::frame::Frame;
use crate::models::ColumnDescriptor;

/// One file discovered under `base_path`.
#[derive(Debug, Clone)]
struct CsvTable {
    schema: String,
    table: String,
    path: PathBuf,
    relative: String,
}

pub struct CsvConnector {
    name: String,
    config: FileSourceConfig,
    include: GlobSet,
    exclude: GlobSet,
}

impl CsvConnector {
    pub fn new(name: impl Into<String>, config: FileSourceConfig) -> Result<Self> {
        if !config.delimiter.is_ascii() {
            return Err(QualityError::Config(format!(
                "delimiter '{}' must be a single ASCII character",
                config.delimiter
            )));
        }
        let include = build_globset(&config.include_globs)?;
        let mut excludes = vec!["**/.*/**".to_string()];
        excludes.extend(config.exclude_globs.iter().cloned());
        let exclude = build_globset(&excludes)?;

        Ok(Self {
            name: name.into(),
            config,
            include,
            exclude,
        })
    }

    fn database_name(&self) -> String {
        self.config.database.clone().unwrap_or_else(|| {
            self.config
                .base_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| self.name.clone())
        })
    }

    fn ensure_base(&self) -> Result<&Path> {
        let base = self.config.base_path.as_path();
        if !base.is_dir() {
            return Err(QualityError::connection(
                &self.name,
                format!("directory does not exist: {}", base.display()),
            ));
        }
        Ok(base)
    }

    fn ensure_database(&self, database: &str) -> Result<()> {
        if database.eq_ignore_ascii_case(&self.database_name()) {
            Ok(())
        } else {
            Err(QualityError::Catalog(format!(
                "database '{}' not found in source '{}'",
                database, self.name
            )))
        }
    }

    /// Every matching file, sorted by schema then table.
    fn scan(&self) -> Result<Vec<CsvTable>> {
        let base = self.ensure_base()?;
        let mut tables: Vec<CsvTable> = Vec::new();

        for entry in WalkDir::new(base) {
            let entry = entry.map_err(|e| QualityError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(base).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");
            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }

            let mut components = rel_str.split('/');
            let first = components.next().unwrap_or_default();
            let schema = if components.next().is_some() {
                first.to_string()
            } else {
                self.config.default_schema.clone()
            };
            let table = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();

            if tables.iter().any(|t| t.schema == schema && t.table == table) {
                tracing::warn!(file = %rel_str, "duplicate table name in source; keeping first");
                continue;
            }
            tables.push(CsvTable {
                schema,
                table,
                path: path.to_path_buf(),
                relative: rel_str,
            });
        }

        tables.sort_by(|a, b| a.schema.cmp(&b.schema).then(a.table.cmp(&b.table)));
        Ok(tables)
    }

    fn find(&self, schema: Option<&str>, table: &str) -> Result<CsvTable> {
        let tables = self.scan()?;
        let matches_table = |t: &&CsvTable| t.table.eq_ignore_ascii_case(table);
        let found = match schema {
            Some(schema) => tables
                .iter()
                .filter(matches_table)
                .find(|t| t.schema.eq_ignore_ascii_case(schema)),
            None => tables
                .iter()
                .filter(matches_table)
                .find(|t| t.schema == self.config.default_schema)
                .or_else(|| tables.iter().find(matches_table)),
        };
        found.cloned().ok_or_else(|| {
            QualityError::Catalog(format!(
                "no file for table '{}' in source '{}'",
                table, self.name
            ))
        })
    }

    /// Match `id` against the discovered names as whole strings, so a
    /// stem with dots in it (`sales.2024.csv`) resolves to its own file.
    fn find_qualified(&self, id: &str) -> Result<Option<CsvTable>> {
        let database = self.database_name();
        let tables = self.scan()?;
        let full = |t: &CsvTable| format!("{}.{}.{}", database, t.schema, t.table);
        let in_schema = |t: &CsvTable| format!("{}.{}", t.schema, t.table);

        let found = tables
            .iter()
            .find(|t| full(t).eq_ignore_ascii_case(id))
            .or_else(|| tables.iter().find(|t| in_schema(t).eq_ignore_ascii_case(id)))
            .or_else(|| {
                tables.iter().find(|t| {
                    t.schema == self.config.default_schema && t.table.eq_ignore_ascii_case(id)
                })
            });
        Ok(found.cloned())
    }

    async fn read(&self, path: PathBuf) -> Result<Frame> {
        let delimiter = self.config.delimiter as u8;
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)?;
            Frame::from_csv_reader(std::io::BufReader::new(file), delimiter)
        })
        .await
        .map_err(|e| QualityError::Io(std::io::Error::other(e)))?
    }

    fn count_rows(&self, path: &Path) -> Result<u64> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.config.delimiter as u8)
            .flexible(true)
            .from_path(path)?;
        let mut count = 0u64;
        for record in rdr.records() {
            record?;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl Connector for CsvConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::File
    }

    fn aliases(&self) -> &[String] {
        &self.config.aliases
    }

    async fn connect(&self) -> Result<()> {
        self.ensure_base()?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        self.ensure_base().is_ok()
    }

    async fn load_data(&self, dataset_id: &str) -> Result<Frame> {
        let id = dataset_id.strip_suffix(".csv").unwrap_or(dataset_id);
        let entry = match self.find_qualified(id)? {
            Some(entry) => entry,
            None => {
                let (database, schema, table) = split_dataset_id(id);
                if let Some(database) = database {
                    self.ensure_database(database)?;
                }
                self.find(schema, table)?
            }
        };
        tracing::debug!(source = %self.name, file = %entry.relative, "loading file");
        self.read(entry.path).await
    }

    async fn current_database(&self) -> Result<String> {
        Ok(self.database_name())
    }

    fn default_schema(&self) -> Option<String> {
        Some(self.config.default_schema.clone())
    }

    async fn list_schemas(&self, database: &str) -> Result<Vec<String>> {
        self.ensure_database(database)?;
        let mut schemas: Vec<String> = self.scan()?.into_iter().map(|t| t.schema).collect();
        schemas.dedup();
        Ok(schemas)
    }

    async fn list_tables(&self, database: &str, schema: &str) -> Result<Vec<TableEntry>> {
        self.ensure_database(database)?;
        let mut entries = Vec::new();
        for t in self.scan()?.into_iter().filter(|t| t.schema == schema) {
            let row_count = match self.count_rows(&t.path) {
                Ok(n) => Some(n),
                Err(e) => {
                    tracing::debug!(file = %t.relative, error = %e, "row count unavailable");
                    None
                }
            };
            entries.push(TableEntry {
                name: t.table,
                object_type: "FILE".to_string(),
                comment: Some(format!("Delimited file {}", t.relative)),
                row_count,
            });
        }
        Ok(entries)
    }

    async fn describe_table(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>> {
        self.ensure_database(database)?;
        let entry = self.find(Some(schema), table)?;
        let frame = self.read(entry.path).await?;
        Ok(frame
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, name)| ColumnDescriptor {
                name: name.clone(),
                data_type: infer_column_type(&frame, idx).to_string(),
                nullable: frame.column(idx).any(|v| v.is_missing()),
                comment: None,
            })
            .collect())
    }

    async fn sample_rows(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        limit: usize,
    ) -> Result<Frame> {
        self.ensure_database(database)?;
        let entry = self.find(Some(schema), table)?;
        Ok(self.read(entry.path).await?.head(limit))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| QualityError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| QualityError::Config(format!("invalid glob set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Value;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CsvConnector) {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("stage_sales");
        fs::create_dir_all(base.join("staging")).unwrap();
        fs::write(base.join("customers.csv"), "customer_id,name\n1,Ada\n2,\n").unwrap();
        fs::write(base.join("staging").join("orders.csv"), "order_id,amount\n1,9.5\n").unwrap();
        fs::write(base.join("notes.txt"), "ignored").unwrap();

        let config = FileSourceConfig {
            base_path: base,
            include_globs: vec!["**/*.csv".to_string()],
            exclude_globs: vec![],
            delimiter: ',',
            database: None,
            default_schema: "public".to_string(),
            aliases: vec!["csv".to_string()],
        };
        (tmp, CsvConnector::new("files", config).unwrap())
    }

    #[tokio::test]
    async fn test_catalog_layout() {
        let (_tmp, conn) = setup();
        conn.connect().await.unwrap();
        let db = conn.current_database().await.unwrap();
        assert_eq!(db, "stage_sales");

        let schemas = conn.list_schemas(&db).await.unwrap();
        assert_eq!(schemas, vec!["public", "staging"]);

        let tables = conn.list_tables(&db, "public").await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "customers");
        assert_eq!(tables[0].row_count, Some(2));

        let columns = conn.describe_table(&db, "staging", "orders").await.unwrap();
        assert_eq!(columns[1].name, "amount");
        assert_eq!(columns[1].data_type, "FLOAT");
    }

    #[tokio::test]
    async fn test_load_data_resolves_ids() {
        let (_tmp, conn) = setup();
        let frame = conn.load_data("customers").await.unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.rows()[1][1], Value::Text(String::new()));

        let frame = conn.load_data("stage_sales.staging.orders").await.unwrap();
        assert_eq!(frame.columns(), &["order_id", "amount"]);

        assert!(conn.load_data("other_db.public.customers").await.is_err());
        assert!(conn.load_data("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_dotted_file_stem_loads_by_listed_name() {
        let (tmp, conn) = setup();
        fs::write(
            tmp.path().join("stage_sales").join("sales.2024.csv"),
            "region,total\nemea,10\n",
        )
        .unwrap();

        let tables = conn.list_tables("stage_sales", "public").await.unwrap();
        assert!(tables.iter().any(|t| t.name == "sales.2024"));

        for id in ["stage_sales.public.sales.2024", "public.sales.2024", "sales.2024.csv"] {
            let frame = conn.load_data(id).await.unwrap();
            assert_eq!(frame.columns(), &["region", "total"], "{id}");
        }
    }

    #[tokio::test]
    async fn test_missing_directory_is_connection_error() {
        let (tmp, conn) = setup();
        drop(tmp);
        assert!(!conn.test_connection().await);
        assert!(matches!(
            conn.connect().await.unwrap_err(),
            QualityError::Connection { .. }
        ));
    }
}
