//! Heuristic re-ranking of raw vector hits.
//!
//! Raw similarity alone can't tell `STAGE_SALES.PUBLIC.CUSTOMERS` from
//! `PROD_SALES.PUBLIC.CUSTOMERS`. The ranker adds two boosts on top of it:
//!
//! - **connector match**: the hit comes from the connector the query is
//!   about, inferred from (in order) an explicit preference, connector
//!   names and aliases in the query, environment keywords, and words
//!   learned from the first segment of indexed table names;
//! - **lexical overlap**: one boost per query token found inside the bare
//!   table name.
//!
//! ```text
//! boosted = min(clamp01(raw) + connector_boost·match + lexical_boost·overlap, 1.0)
//! ```
//!
//! Hits below `min_relevance` (after the cap) are dropped; the rest are
//! sorted, truncated to `k` and ranked from 1.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::config::{EnvironmentRule, RetrievalConfig};
use crate::models::{DocumentMetadata, RankedHit};

pub const DEFAULT_CONNECTOR_BOOST: f64 = 0.30;
pub const DEFAULT_LEXICAL_BOOST: f64 = 0.20;

/// Boosted relevance with the default weights.
pub fn score(raw_similarity: f64, connector_match: bool, token_overlap: usize) -> f64 {
    weighted_score(
        raw_similarity,
        connector_match,
        token_overlap,
        DEFAULT_CONNECTOR_BOOST,
        DEFAULT_LEXICAL_BOOST,
    )
}

fn weighted_score(
    raw_similarity: f64,
    connector_match: bool,
    token_overlap: usize,
    connector_boost: f64,
    lexical_boost: f64,
) -> f64 {
    let raw = if raw_similarity.is_nan() {
        0.0
    } else {
        raw_similarity.clamp(0.0, 1.0)
    };
    let connector = if connector_match { connector_boost } else { 0.0 };
    (raw + connector + lexical_boost * token_overlap as f64).min(1.0)
}

/// Why a search returned no hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchDiagnostic {
    /// Candidates existed but none reached `min_relevance`.
    BelowThreshold {
        best_full_name: String,
        best_connector_type: String,
        best_score: f64,
        min_relevance: f64,
    },
    /// The index is built but holds nothing.
    NoCandidates { message: String },
    IndexNotBuilt { message: String },
}

impl std::fmt::Display for SearchDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchDiagnostic::BelowThreshold {
                best_full_name,
                best_connector_type,
                best_score,
                min_relevance,
            } => write!(
                f,
                "no table reached relevance {:.2}; best candidate was {} ({}) at {:.2}",
                min_relevance, best_full_name, best_connector_type, best_score
            ),
            SearchDiagnostic::NoCandidates { message } => f.write_str(message),
            SearchDiagnostic::IndexNotBuilt { message } => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub inferred_connector: Option<String>,
    pub hits: Vec<RankedHit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<SearchDiagnostic>,
}

impl SearchResponse {
    pub fn index_not_built(query: &str, collection: &str) -> Self {
        Self {
            query: query.to_string(),
            inferred_connector: None,
            hits: Vec::new(),
            diagnostic: Some(SearchDiagnostic::IndexNotBuilt {
                message: format!(
                    "index '{}' has not been built; run `dqh index <source>` first",
                    collection
                ),
            }),
        }
    }

    /// The top hit, if any survived.
    pub fn best(&self) -> Option<&RankedHit> {
        self.hits.first()
    }
}

/// Re-ranks raw hits. Build one per search with [`RelevanceRanker::learn`]
/// over the current index catalog.
#[derive(Debug, Clone)]
pub struct RelevanceRanker {
    connector_boost: f64,
    lexical_boost: f64,
    min_token_len: usize,
    environments: Vec<EnvironmentRule>,
    /// Connector names and aliases, lower-cased, with their tag.
    vocabulary: Vec<(String, String)>,
    /// Connector tags present in the index.
    indexed_tags: BTreeSet<String>,
    /// Unambiguous words from the first segment of indexed names.
    learned: HashMap<String, String>,
}

impl RelevanceRanker {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            connector_boost: config.connector_boost,
            lexical_boost: config.lexical_boost,
            min_token_len: config.min_token_len,
            environments: config.environments.clone(),
            vocabulary: Vec::new(),
            indexed_tags: BTreeSet::new(),
            learned: HashMap::new(),
        }
    }

    /// Words that name a connector directly: `(word, connector tag)`.
    pub fn with_vocabulary(mut self, words: Vec<(String, String)>) -> Self {
        self.vocabulary = words
            .into_iter()
            .map(|(w, tag)| (w.to_lowercase(), tag))
            .collect();
        self
    }

    /// Learn connector tags and name words from the index catalog.
    pub fn learn(mut self, catalog: &[DocumentMetadata]) -> Self {
        let mut seen: HashMap<String, BTreeSet<String>> = HashMap::new();
        for meta in catalog {
            self.indexed_tags.insert(meta.connector_type.clone());
            let prefix = meta.full_name.split('.').next().unwrap_or_default();
            for word in words(prefix) {
                if word.chars().all(|c| c.is_ascii_digit()) {
                    continue;
                }
                seen.entry(word).or_default().insert(meta.connector_type.clone());
            }
        }
        self.learned = seen
            .into_iter()
            .filter_map(|(word, tags)| {
                if tags.len() == 1 {
                    tags.into_iter().next().map(|tag| (word, tag))
                } else {
                    None
                }
            })
            .collect();
        self
    }

    pub fn score(&self, raw_similarity: f64, connector_match: bool, token_overlap: usize) -> f64 {
        weighted_score(
            raw_similarity,
            connector_match,
            token_overlap,
            self.connector_boost,
            self.lexical_boost,
        )
    }

    /// Lower-cased, de-duplicated query tokens long enough to count for
    /// lexical overlap.
    pub fn query_tokens(&self, query: &str) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();
        for word in words(query) {
            if word.chars().count() >= self.min_token_len && !tokens.contains(&word) {
                tokens.push(word);
            }
        }
        tokens
    }

    /// The connector a query is about, if any rule identifies one.
    pub fn infer_connector(&self, query: &str, preferred: Option<&str>) -> Option<String> {
        if let Some(preferred) = preferred.map(str::trim).filter(|p| !p.is_empty()) {
            return Some(preferred.to_string());
        }

        let query_words = words(query);

        for word in &query_words {
            if let Some((_, tag)) = self.vocabulary.iter().find(|(w, _)| w == word) {
                return Some(tag.clone());
            }
            if let Some(tag) = self.indexed_tags.iter().find(|t| t.eq_ignore_ascii_case(word)) {
                return Some(tag.clone());
            }
        }

        for word in &query_words {
            if let Some(rule) = self
                .environments
                .iter()
                .find(|r| r.keywords.iter().any(|k| k.eq_ignore_ascii_case(word)))
            {
                return Some(rule.connector.clone());
            }
        }

        query_words
            .iter()
            .find_map(|word| self.learned.get(word).cloned())
    }

    /// Boost, threshold, sort, truncate and rank `raw_hits`.
    pub fn rank(
        &self,
        query: &str,
        raw_hits: Vec<RankedHit>,
        preferred_connector: Option<&str>,
        min_relevance: f64,
        k: usize,
    ) -> SearchResponse {
        let inferred = self.infer_connector(query, preferred_connector);
        let tokens = self.query_tokens(query);

        let mut boosted: Vec<RankedHit> = raw_hits
            .into_iter()
            .map(|mut hit| {
                let connector_match = inferred
                    .as_deref()
                    .is_some_and(|c| hit.connector_type.eq_ignore_ascii_case(c));
                let table = hit.table_name().to_lowercase();
                let overlap = tokens.iter().filter(|t| table.contains(t.as_str())).count();
                hit.boosted_score = self.score(hit.raw_similarity, connector_match, overlap);
                hit.rank = 0;
                tracing::debug!(
                    table = %hit.full_name,
                    connector = %hit.connector_type,
                    raw = hit.raw_similarity,
                    connector_match,
                    overlap,
                    boosted = hit.boosted_score,
                    "scored candidate"
                );
                hit
            })
            .collect();

        // Best boosted candidate, for the diagnostic. Ties keep index order.
        let best = boosted
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                a.boosted_score
                    .total_cmp(&b.boosted_score)
                    .then(ib.cmp(ia))
            })
            .map(|(_, h)| h.clone());

        boosted.retain(|h| h.boosted_score >= min_relevance);
        boosted.sort_by(|a, b| b.boosted_score.total_cmp(&a.boosted_score));
        boosted.truncate(k);
        for (i, hit) in boosted.iter_mut().enumerate() {
            hit.rank = i + 1;
        }

        let diagnostic = if !boosted.is_empty() {
            None
        } else if let Some(best) = best {
            Some(SearchDiagnostic::BelowThreshold {
                best_full_name: best.full_name,
                best_connector_type: best.connector_type,
                best_score: best.boosted_score,
                min_relevance,
            })
        } else {
            Some(SearchDiagnostic::NoCandidates {
                message: "the index holds no tables; run `dqh index <source>`".to_string(),
            })
        };

        SearchResponse {
            query: query.to_string(),
            inferred_connector: inferred,
            hits: boosted,
            diagnostic,
        }
    }
}

/// Connector implied by a dataset id's environment prefix, such as
/// `STAGE_SALES.PUBLIC.ORDERS` or `ANALYTICS_PROD.X`.
pub fn infer_connector_from_dataset(
    dataset_id: &str,
    environments: &[EnvironmentRule],
) -> Option<String> {
    let upper = dataset_id.to_uppercase();
    environments
        .iter()
        .find(|rule| {
            rule.keywords.iter().any(|k| {
                let k = k.to_uppercase();
                upper.starts_with(&k) || upper.contains(&format!("_{}", k))
            })
        })
        .map(|rule| rule.connector.clone())
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(full_name: &str, connector: &str, raw: f64) -> RankedHit {
        RankedHit {
            full_name: full_name.to_string(),
            connector_type: connector.to_string(),
            raw_similarity: raw,
            boosted_score: raw,
            rank: 0,
        }
    }

    fn meta(full_name: &str, connector: &str) -> DocumentMetadata {
        DocumentMetadata {
            table_name: full_name.rsplit('.').next().unwrap().to_string(),
            full_name: full_name.to_string(),
            connector_type: connector.to_string(),
            schema: "PUBLIC".to_string(),
        }
    }

    fn ranker() -> RelevanceRanker {
        RelevanceRanker::new(&RetrievalConfig::default())
            .with_vocabulary(vec![
                ("postgres".to_string(), "postgres".to_string()),
                ("pg".to_string(), "postgres".to_string()),
                ("snowflake".to_string(), "snowflake".to_string()),
            ])
            .learn(&[
                meta("STAGE_SALES.PUBLIC.CUSTOMERS", "postgres"),
                meta("PROD_SALES.PUBLIC.CUSTOMERS", "snowflake"),
                meta("PROD_SALES.PUBLIC.ORDERS", "snowflake"),
            ])
    }

    #[test]
    fn test_score_formula_and_cap() {
        assert!((score(0.40, true, 1) - 0.90).abs() < 1e-9);
        assert_eq!(score(0.95, true, 3), 1.0);
        assert_eq!(score(-0.3, false, 0), 0.0);
        assert_eq!(score(f64::NAN, false, 0), 0.0);
        assert!((score(1.7, false, 0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_boosted_low_raw_outranks_unboosted_high_raw() {
        let response = ranker().rank(
            "postgres customers",
            vec![
                hit("PROD_SALES.PUBLIC.ORDERS", "snowflake", 0.85),
                hit("STAGE_SALES.PUBLIC.CUSTOMERS", "postgres", 0.40),
            ],
            None,
            0.20,
            3,
        );
        assert_eq!(response.inferred_connector.as_deref(), Some("postgres"));
        assert_eq!(response.hits[0].full_name, "STAGE_SALES.PUBLIC.CUSTOMERS");
        assert!((response.hits[0].boosted_score - 0.90).abs() < 1e-9);
        assert_eq!(response.hits[0].rank, 1);
        assert!((response.hits[1].boosted_score - 0.85).abs() < 1e-9);
        assert_eq!(response.hits[1].rank, 2);
        assert!(response.diagnostic.is_none());
    }

    #[test]
    fn test_inference_order() {
        let r = ranker();
        assert_eq!(
            r.infer_connector("prod customers", Some("postgres")).as_deref(),
            Some("postgres")
        );
        assert_eq!(r.infer_connector("customers in pg", None).as_deref(), Some("postgres"));
        assert_eq!(r.infer_connector("staging customers", None).as_deref(), Some("postgres"));
        assert_eq!(r.infer_connector("production orders", None).as_deref(), Some("snowflake"));
        // "stage" is an environment keyword; "sales" is ambiguous.
        assert_eq!(r.infer_connector("sales figures", None), None);
        assert_eq!(r.infer_connector("customers", None), None);
    }

    #[test]
    fn test_learned_words_are_used_when_unambiguous() {
        let config = RetrievalConfig {
            environments: vec![],
            ..Default::default()
        };
        let r = RelevanceRanker::new(&config).learn(&[
            meta("STAGE_SALES.PUBLIC.CUSTOMERS", "postgres"),
            meta("PROD_SALES.PUBLIC.ORDERS", "snowflake"),
        ]);
        assert_eq!(r.infer_connector("stage customers", None).as_deref(), Some("postgres"));
        assert_eq!(r.infer_connector("sales", None), None);
    }

    #[test]
    fn test_threshold_applies_after_cap_and_reports_best() {
        let response = ranker().rank(
            "weather",
            vec![
                hit("PROD_SALES.PUBLIC.ORDERS", "snowflake", 0.10),
                hit("STAGE_SALES.PUBLIC.CUSTOMERS", "postgres", 0.15),
            ],
            None,
            0.20,
            3,
        );
        assert!(response.hits.is_empty());
        match response.diagnostic {
            Some(SearchDiagnostic::BelowThreshold {
                best_full_name,
                best_score,
                ..
            }) => {
                assert_eq!(best_full_name, "STAGE_SALES.PUBLIC.CUSTOMERS");
                assert!((best_score - 0.15).abs() < 1e-9);
            }
            other => panic!("unexpected diagnostic: {:?}", other),
        }
    }

    #[test]
    fn test_no_candidates_diagnostic() {
        let response = ranker().rank("orders", vec![], None, 0.2, 3);
        assert!(matches!(
            response.diagnostic,
            Some(SearchDiagnostic::NoCandidates { .. })
        ));
    }

    #[test]
    fn test_truncation_dense_ranks_and_bounds() {
        let hits: Vec<RankedHit> = (0..10)
            .map(|i| hit(&format!("DB.S.ORDERS_{}", i), "snowflake", 0.5 + i as f64 * 0.05))
            .collect();
        let response = ranker().rank("prod orders totals", hits, None, 0.2, 4);
        assert_eq!(response.hits.len(), 4);
        let ranks: Vec<usize> = response.hits.iter().map(|h| h.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        for h in &response.hits {
            assert!((0.0..=1.0).contains(&h.boosted_score));
        }
        for pair in response.hits.windows(2) {
            assert!(pair[0].boosted_score >= pair[1].boosted_score);
        }
    }

    #[test]
    fn test_ties_keep_index_order() {
        let response = ranker().rank(
            "zzz",
            vec![hit("A.S.T1", "x", 0.5), hit("A.S.T2", "x", 0.5)],
            None,
            0.2,
            2,
        );
        assert_eq!(response.hits[0].full_name, "A.S.T1");
    }

    #[test]
    fn test_query_tokens_filter_and_dedupe() {
        let r = ranker();
        assert_eq!(
            r.query_tokens("Customer id, customer EMAIL of"),
            vec!["customer", "email"]
        );
    }

    #[test]
    fn test_dataset_environment_prefix() {
        let envs = RetrievalConfig::default().environments;
        assert_eq!(
            infer_connector_from_dataset("STAGE_SALES.PUBLIC.ORDERS", &envs).as_deref(),
            Some("postgres")
        );
        assert_eq!(
            infer_connector_from_dataset("analytics_prod.public.orders", &envs).as_deref(),
            Some("snowflake")
        );
        assert_eq!(infer_connector_from_dataset("sales.public.orders", &envs), None);
    }
}
