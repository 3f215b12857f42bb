//! TOML configuration.
//!
//! The configuration is parsed once by [`load_config`] and passed explicitly
//! to every builder, index and aggregator. Nothing in the crate reads a
//! process-wide default source or schema.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::connector::ConnectorKind;
use crate::report::ReportFormat;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub assessment: AssessmentConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Named data sources, in file order.
    #[serde(default)]
    pub sources: IndexMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    "table_catalog".to_string()
}

/// Search and re-ranking parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Raw nearest neighbours fetched before re-ranking.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,
    #[serde(default = "default_connector_boost")]
    pub connector_boost: f64,
    #[serde(default = "default_lexical_boost")]
    pub lexical_boost: f64,
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    #[serde(default = "default_environments")]
    pub environments: Vec<EnvironmentRule>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_k: default_candidate_k(),
            min_relevance: default_min_relevance(),
            connector_boost: default_connector_boost(),
            lexical_boost: default_lexical_boost(),
            min_token_len: default_min_token_len(),
            environments: default_environments(),
        }
    }
}

/// Maps environment vocabulary ("staging", "prod", ...) to a connector tag.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EnvironmentRule {
    pub keywords: Vec<String>,
    pub connector: String,
}

fn default_top_k() -> usize {
    3
}
fn default_candidate_k() -> usize {
    20
}
fn default_min_relevance() -> f64 {
    0.20
}
fn default_connector_boost() -> f64 {
    0.30
}
fn default_lexical_boost() -> f64 {
    0.20
}
fn default_min_token_len() -> usize {
    3
}
fn default_environments() -> Vec<EnvironmentRule> {
    vec![
        EnvironmentRule {
            keywords: ["stage", "staging", "dev", "test"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            connector: "postgres".to_string(),
        },
        EnvironmentRule {
            keywords: ["prod", "production", "live"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            connector: "snowflake".to_string(),
        },
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default)]
    pub include_sample: bool,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    #[serde(default)]
    pub max_tables: Option<usize>,
    #[serde(default)]
    pub default_schema: Option<String>,
    #[serde(default = "default_exclude_schemas")]
    pub exclude_schemas: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            include_sample: false,
            sample_rows: default_sample_rows(),
            max_tables: None,
            default_schema: None,
            exclude_schemas: default_exclude_schemas(),
        }
    }
}

fn default_sample_rows() -> usize {
    3
}
fn default_exclude_schemas() -> Vec<String> {
    ["information_schema", "pg_catalog", "pg_toast", "temp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssessmentConfig {
    #[serde(default = "default_checks")]
    pub checks: Vec<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            checks: default_checks(),
            workers: default_workers(),
            load_timeout_secs: default_load_timeout(),
            check_timeout_secs: default_check_timeout(),
        }
    }
}

fn default_checks() -> Vec<String> {
    ["duplicates", "null_values", "descriptive_stats"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_workers() -> usize {
    3
}
fn default_load_timeout() -> u64 {
    60
}
fn default_check_timeout() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_formats")]
    pub formats: Vec<ReportFormat>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            formats: default_formats(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./reports")
}
fn default_formats() -> Vec<ReportFormat> {
    vec![ReportFormat::Markdown, ReportFormat::Html, ReportFormat::Json]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// A configured data source, tagged by `kind`.
///
/// Warehouse sources have no built-in driver; they are registered in code
/// through [`crate::connector::ConnectorRegistry`].
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    File(FileSourceConfig),
    Relational(RelationalSourceConfig),
}

impl SourceConfig {
    pub fn kind(&self) -> ConnectorKind {
        match self {
            SourceConfig::File(_) => ConnectorKind::File,
            SourceConfig::Relational(_) => ConnectorKind::Relational,
        }
    }

    pub fn aliases(&self) -> &[String] {
        match self {
            SourceConfig::File(c) => &c.aliases,
            SourceConfig::Relational(c) => &c.aliases,
        }
    }
}

/// A directory of delimited files. Each subdirectory is a schema.
#[derive(Debug, Deserialize, Clone)]
pub struct FileSourceConfig {
    pub base_path: PathBuf,
    #[serde(default = "default_file_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Database segment of qualified names; defaults to the directory name.
    #[serde(default)]
    pub database: Option<String>,
    /// Schema assigned to files directly under `base_path`.
    #[serde(default = "default_file_schema")]
    pub default_schema: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_file_globs() -> Vec<String> {
    vec!["**/*.csv".to_string()]
}
fn default_delimiter() -> char {
    ','
}
fn default_file_schema() -> String {
    "public".to_string()
}

/// A relational database reachable through an sqlx connection URL.
#[derive(Debug, Deserialize, Clone)]
pub struct RelationalSourceConfig {
    pub url: String,
    #[serde(default)]
    pub default_schema: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_max_connections() -> u32 {
    4
}

impl Config {
    /// A configuration with defaults everywhere and no sources.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/dqh.sqlite"),
            },
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            catalog: CatalogConfig::default(),
            assessment: AssessmentConfig::default(),
            reports: ReportsConfig::default(),
            server: ServerConfig::default(),
            sources: IndexMap::new(),
        }
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.get(name)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let retrieval = &config.retrieval;
    if retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if retrieval.candidate_k < retrieval.top_k {
        anyhow::bail!("retrieval.candidate_k must be >= retrieval.top_k");
    }
    if !(0.0..=1.0).contains(&retrieval.min_relevance) {
        anyhow::bail!("retrieval.min_relevance must be in [0.0, 1.0]");
    }
    if retrieval.connector_boost < 0.0 || retrieval.lexical_boost < 0.0 {
        anyhow::bail!("retrieval boosts must be >= 0.0");
    }
    for rule in &retrieval.environments {
        if rule.keywords.is_empty() || rule.connector.trim().is_empty() {
            anyhow::bail!("retrieval.environments entries need keywords and a connector");
        }
    }

    if config.assessment.workers == 0 {
        anyhow::bail!("assessment.workers must be >= 1");
    }
    if config.catalog.include_sample && config.catalog.sample_rows == 0 {
        anyhow::bail!("catalog.sample_rows must be > 0 when include_sample is set");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "hash" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or hash.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[db]
path = "./data/dqh.sqlite"

[embedding]
provider = "hash"
model = "hash-v1"
dims = 64

[retrieval]
min_relevance = 0.25

[sources.files]
kind = "file"
base_path = "./data/csv"
aliases = ["csv"]

[sources.postgres]
kind = "relational"
url = "sqlite:./data/stage.sqlite"
"#;

    #[test]
    fn test_parse_tagged_sources() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        validate(&config).unwrap();

        let names: Vec<&String> = config.sources.keys().collect();
        assert_eq!(names, vec!["files", "postgres"]);
        assert_eq!(config.source("files").unwrap().kind(), ConnectorKind::File);
        assert_eq!(
            config.source("postgres").unwrap().kind(),
            ConnectorKind::Relational
        );
        assert_eq!(
            config.source("files").unwrap().aliases().to_vec(),
            vec!["csv".to_string()]
        );
        assert_eq!(config.retrieval.min_relevance, 0.25);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.reports.formats.len(), 3);
    }

    #[test]
    fn test_rejects_out_of_range_relevance() {
        let mut config = Config::minimal();
        config.retrieval.min_relevance = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let mut config = Config::minimal();
        config.embedding.provider = "local".to_string();
        config.embedding.model = Some("x".to_string());
        config.embedding.dims = Some(8);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_enabled_provider_requires_dims() {
        let mut config = Config::minimal();
        config.embedding.provider = "hash".to_string();
        config.embedding.model = Some("hash-v1".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_source_kind_fails_to_parse() {
        let text = r#"
[db]
path = "x.sqlite"

[sources.snow]
kind = "warehouse"
url = "x"
"#;
        assert!(toml::from_str::<Config>(text).is_err());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config: Config = toml::from_str(include_str!("../config/dqh.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.retrieval.environments.len(), 1);
        assert_eq!(config.catalog.max_tables, Some(500));
    }
}
