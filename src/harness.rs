//! The library facade.
//!
//! [`Harness`] wires the connector registry, the embedding index, the
//! ranker, the assessment aggregator and the renderer together. The CLI and
//! the HTTP server are thin layers over it.
//!
//! # Example
//!
//! ```rust,no_run
//! use quality_harness::config::load_config;
//! use quality_harness::harness::{BuildOptions, Harness};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = load_config(Path::new("config/dqh.toml"))?;
//! let harness = Harness::open(config).await?;
//! harness.build_index("files", &BuildOptions::default()).await?;
//!
//! let response = harness.search_tables("staging customers", None, None, None).await?;
//! if let Some(best) = response.best() {
//!     let assessment = harness
//!         .run_assessment(&best.full_name, &best.connector_type, &[])
//!         .await;
//!     println!("{} checks failed", assessment.summary.failed);
//! }
//! # Ok(())
//! # }
//! ```

use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assessment::{self, Assessment, AssessmentOptions, PendingAssessment};
use crate::catalog::{CatalogBuilder, CatalogOptions};
use crate::checks::CheckResult;
use crate::config::Config;
use crate::connector::{Connector, ConnectorRegistry};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{QualityError, Result};
use crate::index::{EmbeddingIndex, IndexReport};
use crate::ranker::{infer_connector_from_dataset, RelevanceRanker, SearchResponse};
use crate::report::{self, ReportFormat};
use crate::sources::{source_statuses, SourceStatus};
use crate::store::sqlite::SqliteVectorStore;
use crate::store::VectorStore;

/// Options for [`Harness::build_index`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Database to scan; defaults to the connector's current database.
    pub database: Option<String>,
    /// Schemas to scan; empty means auto-discover.
    pub schemas: Vec<String>,
    /// Upsert into the live collection instead of rebuilding it.
    pub append: bool,
    /// Override `catalog.include_sample`.
    pub include_sample: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub source: String,
    pub report: IndexReport,
    pub skipped: Vec<(String, String)>,
}

/// Result of [`Harness::check_query`].
#[derive(Debug, Clone, Serialize)]
pub struct CheckQueryOutcome {
    pub search: SearchResponse,
    /// `None` when no table was a confident match.
    pub assessment: Option<Assessment>,
}

pub struct Harness {
    config: Config,
    registry: ConnectorRegistry,
    index: EmbeddingIndex,
}

impl Harness {
    /// Connectors from `[sources]`, the SQLite vector store at `[db].path`
    /// and the configured embedding provider.
    pub async fn open(config: Config) -> Result<Self> {
        let registry = ConnectorRegistry::from_config(&config)?;
        let store = Arc::new(SqliteVectorStore::open(&config).await?);
        let provider = create_provider(&config.embedding)?;
        Ok(Self::with_parts(config, registry, store, provider))
    }

    pub fn with_parts(
        config: Config,
        registry: ConnectorRegistry,
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let index = EmbeddingIndex::new(store, provider, config.index.collection.clone());
        Self {
            config,
            registry,
            index,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Add a connector built in code, such as a warehouse driver.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.registry.register(connector);
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    fn connector(&self, name: &str) -> Result<Arc<dyn Connector>> {
        self.registry
            .resolve(name)
            .ok_or_else(|| QualityError::UnknownSource(name.to_string()))
    }

    /// Catalog one source and write its documents to the index.
    pub async fn build_index(&self, source: &str, options: &BuildOptions) -> Result<BuildOutcome> {
        let connector = self.connector(source)?;
        let mut catalog_options = CatalogOptions::from(&self.config.catalog);
        if let Some(include_sample) = options.include_sample {
            catalog_options.include_sample = include_sample;
        }

        let build = CatalogBuilder::new(Arc::clone(&connector), catalog_options)
            .build_documents(options.database.as_deref(), &options.schemas)
            .await?;
        let report = self.index.build(&build.documents, !options.append).await?;

        Ok(BuildOutcome {
            source: connector.name().to_string(),
            report,
            skipped: build.skipped,
        })
    }

    /// Ranked tables for a natural-language query.
    ///
    /// An index that was never built yields an empty response with a
    /// diagnostic, as does a query nothing is relevant to.
    pub async fn search_tables(
        &self,
        query: &str,
        k: Option<usize>,
        min_relevance: Option<f64>,
        preferred_connector: Option<&str>,
    ) -> Result<SearchResponse> {
        let retrieval = &self.config.retrieval;
        let k = k.unwrap_or(retrieval.top_k).max(1);
        let min_relevance = min_relevance.unwrap_or(retrieval.min_relevance);

        let raw = match self.index.search(query, retrieval.candidate_k.max(k)).await {
            Ok(raw) => raw,
            Err(QualityError::IndexNotBuilt { collection }) => {
                return Ok(SearchResponse::index_not_built(query, &collection));
            }
            Err(e) => return Err(e),
        };
        let catalog = self.index.catalog().await?;

        let ranker = RelevanceRanker::new(retrieval)
            .with_vocabulary(self.registry.vocabulary())
            .learn(&catalog);
        Ok(ranker.rank(query, raw, preferred_connector, min_relevance, k))
    }

    /// Run checks against one dataset. An empty `check_names` runs the
    /// configured default checks.
    ///
    /// An unknown connector does not fail the call: every check is
    /// reported as `error`.
    pub async fn run_assessment(
        &self,
        dataset_id: &str,
        connector_type: &str,
        check_names: &[String],
    ) -> Assessment {
        let names = if check_names.is_empty() {
            self.config.assessment.checks.clone()
        } else {
            check_names.to_vec()
        };
        let options = AssessmentOptions::from(&self.config.assessment);

        match self.connector(connector_type) {
            Ok(connector) => assessment::run_assessment(connector, dataset_id, &names, &options).await,
            Err(e) => {
                tracing::warn!(connector = %connector_type, error = %e, "cannot assess");
                let names = assessment::normalize_check_names(&names);
                let results = names
                    .iter()
                    .map(|n| (n.clone(), CheckResult::error(e.to_string())))
                    .collect();
                PendingAssessment::new(dataset_id, connector_type, names).complete(results)
            }
        }
    }

    /// Source implied by an environment prefix in the dataset id, such as
    /// `STAGE_SALES.PUBLIC.ORDERS`, per `[[retrieval.environments]]`.
    pub fn infer_source(&self, dataset_id: &str) -> Option<String> {
        infer_connector_from_dataset(dataset_id, &self.config.retrieval.environments)
    }

    pub fn assessment_from_results(
        &self,
        check_results: IndexMap<String, CheckResult>,
        dataset_id: &str,
        connector_type: &str,
    ) -> Assessment {
        assessment::assessment_from_results(check_results, dataset_id, connector_type)
    }

    pub fn render(&self, assessment: &Assessment, format: ReportFormat) -> Result<String> {
        report::render(assessment, format)
    }

    /// Save reports; `None` falls back to `[reports]` in the config.
    pub fn persist(
        &self,
        assessment: &Assessment,
        output_dir: Option<&Path>,
        formats: Option<&[ReportFormat]>,
    ) -> Result<IndexMap<ReportFormat, PathBuf>> {
        report::persist(
            assessment,
            output_dir.unwrap_or(self.config.reports.output_dir.as_path()),
            formats.unwrap_or(self.config.reports.formats.as_slice()),
        )
    }

    /// Search, then assess the best confident table.
    pub async fn check_query(&self, query: &str, check_names: &[String]) -> Result<CheckQueryOutcome> {
        let search = self.search_tables(query, None, None, None).await?;
        let assessment = match search.best() {
            Some(best) => Some(
                self.run_assessment(&best.full_name, &best.connector_type, check_names)
                    .await,
            ),
            None => None,
        };
        Ok(CheckQueryOutcome { search, assessment })
    }

    /// Every registered source with its health.
    pub async fn sources(&self) -> Vec<SourceStatus> {
        source_statuses(&self.registry).await
    }
}
