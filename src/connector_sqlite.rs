//! Relational connector backed by sqlx's SQLite driver.
//!
//! The database file's stem is the database segment of qualified names and
//! each attached database (`PRAGMA database_list`) is a schema, so a table
//! in `stage_sales.sqlite` is indexed as `stage_sales.main.customers`.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;

use crate::config::RelationalSourceConfig;
use crate::connector::{split_dataset_id, Connector, ConnectorKind, TableEntry};
use crate::error::{QualityError, Result};
use crate::frame::{Frame, Value};
use crate::models::ColumnDescriptor;

const AMBIENT_SCHEMA: &str = "main";

pub struct SqliteConnector {
    name: String,
    config: RelationalSourceConfig,
    pool: Mutex<Option<SqlitePool>>,
}

impl SqliteConnector {
    pub fn new(name: impl Into<String>, config: RelationalSourceConfig) -> Self {
        Self {
            name: name.into(),
            config,
            pool: Mutex::new(None),
        }
    }

    /// The open pool, connecting on first use.
    async fn pool(&self) -> Result<SqlitePool> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let options = SqliteConnectOptions::from_str(&self.config.url)
            .map_err(|e| QualityError::connection(&self.name, e))?
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(self.config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| QualityError::connection(&self.name, e))?;

        tracing::debug!(source = %self.name, "connected");
        *guard = Some(pool.clone());
        Ok(pool)
    }

    fn database_name(&self) -> String {
        let path = self
            .config
            .url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        let path = path.split('?').next().unwrap_or(path);
        Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty() && s != ":memory:")
            .unwrap_or_else(|| AMBIENT_SCHEMA.to_string())
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

    fn schema_or_default<'a>(&'a self, schema: Option<&'a str>) -> &'a str {
        schema
            .or(self.config.default_schema.as_deref())
            .unwrap_or(AMBIENT_SCHEMA)
    }

    async fn column_names(&self, pool: &SqlitePool, schema: &str, table: &str) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid")
                .bind(table)
                .bind(schema)
                .fetch_all(pool)
                .await?;
        if names.is_empty() {
            return Err(QualityError::Catalog(format!(
                "table '{}.{}' not found in source '{}'",
                schema, table, self.name
            )));
        }
        Ok(names)
    }

    async fn select(&self, schema: &str, table: &str, limit: Option<usize>) -> Result<Frame> {
        let pool = self.pool().await?;
        let columns = self.column_names(&pool, schema, table).await?;

        let mut sql = format!("SELECT * FROM {}.{}", quote_ident(schema), quote_ident(table));
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let rows = sqlx::query(&sql).fetch_all(&pool).await?;
        rows_to_frame(columns, &rows)
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Relational
    }

    fn aliases(&self) -> &[String] {
        &self.config.aliases
    }

    async fn connect(&self) -> Result<()> {
        self.pool().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(pool) = self.pool.lock().await.take() {
            pool.close().await;
        }
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        match self.pool().await {
            Ok(pool) => sqlx::query("SELECT 1").execute(&pool).await.is_ok(),
            Err(_) => false,
        }
    }

    async fn load_data(&self, dataset_id: &str) -> Result<Frame> {
        let (database, schema, table) = split_dataset_id(dataset_id);
        if let Some(database) = database {
            self.ensure_database(database)?;
        }
        self.select(self.schema_or_default(schema), table, None).await
    }

    async fn current_database(&self) -> Result<String> {
        Ok(self.database_name())
    }

    fn default_schema(&self) -> Option<String> {
        Some(self.schema_or_default(None).to_string())
    }

    async fn list_schemas(&self, database: &str) -> Result<Vec<String>> {
        self.ensure_database(database)?;
        let pool = self.pool().await?;
        let rows = sqlx::query("PRAGMA database_list").fetch_all(&pool).await?;
        let mut schemas = Vec::with_capacity(rows.len());
        for row in rows {
            schemas.push(row.try_get::<String, _>("name")?);
        }
        Ok(schemas)
    }

    async fn list_tables(&self, database: &str, schema: &str) -> Result<Vec<TableEntry>> {
        self.ensure_database(database)?;
        let pool = self.pool().await?;
        let sql = format!(
            "SELECT name, type FROM {}.sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
            quote_ident(schema)
        );
        let rows = sqlx::query(&sql).fetch_all(&pool).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let kind: String = row.try_get("type")?;
            let (object_type, row_count) = if kind == "view" {
                ("VIEW", None)
            } else {
                let count_sql = format!(
                    "SELECT COUNT(*) FROM {}.{}",
                    quote_ident(schema),
                    quote_ident(&name)
                );
                let count: i64 = sqlx::query_scalar(&count_sql).fetch_one(&pool).await?;
                ("BASE TABLE", Some(count.max(0) as u64))
            };
            entries.push(TableEntry {
                name,
                object_type: object_type.to_string(),
                comment: None,
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
        let pool = self.pool().await?;
        let rows = sqlx::query(
            "SELECT name, type, \"notnull\" AS not_null, pk FROM pragma_table_info(?1, ?2) ORDER BY cid",
        )
        .bind(table)
        .bind(schema)
        .fetch_all(&pool)
        .await?;

        if rows.is_empty() {
            return Err(QualityError::Catalog(format!(
                "table '{}.{}' not found in source '{}'",
                schema, table, self.name
            )));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let data_type: String = row.try_get("type")?;
            let not_null: i64 = row.try_get("not_null")?;
            let pk: i64 = row.try_get("pk")?;
            columns.push(ColumnDescriptor {
                name: row.try_get("name")?,
                data_type: if data_type.is_empty() {
                    "ANY".to_string()
                } else {
                    data_type.to_uppercase()
                },
                nullable: not_null == 0 && pk == 0,
                comment: (pk > 0).then(|| "primary key".to_string()),
            });
        }
        Ok(columns)
    }

    async fn sample_rows(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        limit: usize,
    ) -> Result<Frame> {
        self.ensure_database(database)?;
        self.select(schema, table, Some(limit)).await
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn rows_to_frame(columns: Vec<String>, rows: &[SqliteRow]) -> Result<Frame> {
    let mut frame = Frame::new(columns);
    for row in rows {
        let mut cells = Vec::with_capacity(row.len());
        for idx in 0..row.len() {
            cells.push(decode_cell(row, idx)?);
        }
        frame.push_row(cells);
    }
    Ok(frame)
}

/// Decode by the value's storage class rather than the declared type.
fn decode_cell(row: &SqliteRow, idx: usize) -> Result<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();
    let value = match storage.as_str() {
        "INTEGER" | "INT8" | "BIGINT" => Value::Int(row.try_get_unchecked::<i64, _>(idx)?),
        "REAL" | "FLOAT" | "DOUBLE" => Value::Float(row.try_get_unchecked::<f64, _>(idx)?),
        "BOOLEAN" => Value::Bool(row.try_get_unchecked::<bool, _>(idx)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get_unchecked(idx)?;
            Value::Text(format!("<{} bytes>", bytes.len()))
        }
        _ => Value::Text(row.try_get_unchecked::<String, _>(idx)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteConnector) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stage_sales.sqlite");
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.unwrap();
        sqlx::query(
            "CREATE TABLE customers (customer_id INTEGER PRIMARY KEY, email TEXT, balance REAL NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO customers VALUES (1, 'a@x.io', 10.5), (2, NULL, 3.0), (3, 'a@x.io', 0.0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("CREATE VIEW rich AS SELECT * FROM customers WHERE balance > 5")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let config = RelationalSourceConfig {
            url: format!("sqlite:{}", path.display()),
            default_schema: None,
            max_connections: 2,
            aliases: vec!["pg".to_string()],
        };
        (tmp, SqliteConnector::new("postgres", config))
    }

    #[tokio::test]
    async fn test_catalog_queries() {
        let (_tmp, conn) = setup().await;
        assert!(conn.test_connection().await);

        let db = conn.current_database().await.unwrap();
        assert_eq!(db, "stage_sales");
        assert_eq!(conn.list_schemas(&db).await.unwrap(), vec!["main"]);

        let tables = conn.list_tables(&db, "main").await.unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "customers");
        assert_eq!(tables[0].row_count, Some(3));
        assert_eq!(tables[1].object_type, "VIEW");

        let columns = conn.describe_table(&db, "main", "customers").await.unwrap();
        assert_eq!(columns.len(), 3);
        assert!(!columns[0].nullable);
        assert_eq!(columns[0].comment.as_deref(), Some("primary key"));
        assert!(columns[1].nullable);
        assert_eq!(columns[2].data_type, "REAL");

        assert!(conn.describe_table(&db, "main", "nope").await.is_err());
    }

    #[tokio::test]
    async fn test_load_data_decodes_storage_classes() {
        let (_tmp, conn) = setup().await;
        let frame = conn.load_data("stage_sales.main.customers").await.unwrap();
        assert_eq!(frame.columns(), &["customer_id", "email", "balance"]);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.rows()[0][0], Value::Int(1));
        assert_eq!(frame.rows()[1][1], Value::Null);
        assert_eq!(frame.rows()[0][2], Value::Float(10.5));

        let sample = conn
            .sample_rows("stage_sales", "main", "customers", 1)
            .await
            .unwrap();
        assert_eq!(sample.height(), 1);
        conn.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_connection_error() {
        let config = RelationalSourceConfig {
            url: "sqlite:/nonexistent/dir/none.sqlite".to_string(),
            default_schema: None,
            max_connections: 1,
            aliases: vec![],
        };
        let conn = SqliteConnector::new("postgres", config);
        assert!(!conn.test_connection().await);
        assert!(matches!(
            conn.load_data("customers").await.unwrap_err(),
            QualityError::Connection { .. }
        ));
    }
}
