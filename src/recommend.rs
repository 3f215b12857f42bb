//! Rule-based remediation suggestions.
//!
//! [`generate`] inspects the metrics of every check result and returns a
//! prioritized list of [`Recommendation`]s. It is a pure function of the
//! results: the same map always yields the same list in the same order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::checks::{
    CheckMetrics, CheckResult, CheckStatus, ColumnStats, DescriptiveStatsMetrics,
    DuplicateMetrics, NullProfileMetrics, Outcome,
};

const HIGH_DUPLICATE_QTY: u64 = 1000;
const HIGH_NULL_PCT: f64 = 20.0;
const MEDIUM_NULL_PCT: f64 = 5.0;
const GOVERNANCE_NULL_COLUMNS: usize = 5;
const HIGH_VARIATION: f64 = 2.0;
const HIGH_UNIQUENESS: f64 = 0.95;
const HIGH_CARDINALITY: u64 = 100;
const WIDE_DATASET_COLUMNS: usize = 10;
/// Columns named in a single recommendation.
const MAX_NAMED_COLUMNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

impl Recommendation {
    fn new(title: impl Into<String>, description: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            priority,
        }
    }
}

/// Derive recommendations from a set of check results.
///
/// Output is sorted High, Medium, Low; ties keep the order in which the
/// rules fired.
pub fn generate(check_results: &IndexMap<String, CheckResult>) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    for result in check_results.values() {
        if result.status != CheckStatus::Success {
            continue;
        }
        match &result.metrics {
            Some(CheckMetrics::Duplicates(m)) => duplicate_rules(m, &mut recs),
            Some(CheckMetrics::NullProfile(m)) => null_rules(m, &mut recs),
            Some(CheckMetrics::DescriptiveStats(m)) => stats_rules(m, &mut recs),
            None => {}
        }
    }

    let errored: Vec<&str> = check_results
        .iter()
        .filter(|(_, r)| r.outcome() == Outcome::Errored)
        .map(|(name, _)| name.as_str())
        .collect();
    if !errored.is_empty() {
        recs.push(Recommendation::new(
            "Fix Check Execution Errors",
            format!(
                "Checks {} did not execute. Verify source connectivity, permissions and data availability before relying on this assessment.",
                errored.join(", ")
            ),
            Priority::High,
        ));
    }

    if !check_results.is_empty() {
        let passed = check_results
            .values()
            .filter(|r| r.outcome() == Outcome::Passed)
            .count();
        let pass_rate = passed as f64 / check_results.len() as f64;
        if pass_rate < 0.5 {
            recs.push(Recommendation::new(
                "Establish Data Quality Framework",
                format!(
                    "Only {:.0}% of checks passed. Add validation at ingestion, scheduled quality monitoring, clear data ownership and quality dashboards.",
                    pass_rate * 100.0
                ),
                Priority::High,
            ));
        } else if pass_rate < 0.8 {
            recs.push(Recommendation::new(
                "Enhance Data Quality Processes",
                format!(
                    "A {:.0}% pass rate leaves room for improvement. Add automated quality gates and proactive monitoring.",
                    pass_rate * 100.0
                ),
                Priority::Medium,
            ));
        }
    }

    recs.sort_by_key(|r| r.priority);
    recs
}

fn duplicate_rules(m: &DuplicateMetrics, recs: &mut Vec<Recommendation>) {
    if m.duplicate_qty == 0 {
        return;
    }
    let priority = if m.duplicate_qty > HIGH_DUPLICATE_QTY {
        Priority::High
    } else {
        Priority::Medium
    };
    recs.push(Recommendation::new(
        "Remove Duplicate Records",
        format!(
            "Found {} duplicate records. Deduplicate on business keys and enforce primary key or unique constraints upstream.",
            m.duplicate_qty
        ),
        priority,
    ));
}

fn null_rules(m: &NullProfileMetrics, recs: &mut Vec<Recommendation>) {
    let high: Vec<&str> = m
        .null_analysis
        .iter()
        .filter(|c| c.null_percentage > HIGH_NULL_PCT)
        .map(|c| c.column_name.as_str())
        .collect();
    let medium: Vec<&str> = m
        .null_analysis
        .iter()
        .filter(|c| c.null_percentage > MEDIUM_NULL_PCT && c.null_percentage <= HIGH_NULL_PCT)
        .map(|c| c.column_name.as_str())
        .collect();

    if !high.is_empty() {
        recs.push(Recommendation::new(
            "Address High Null Value Columns",
            format!(
                "Columns {} have more than 20% null values. Validate the source feed, define defaults, impute, or drop non-critical columns.",
                name_columns(&high)
            ),
            Priority::High,
        ));
    }
    if !medium.is_empty() {
        recs.push(Recommendation::new(
            "Implement Null Handling Strategy",
            format!(
                "Columns {} have 5-20% null values. Add NOT NULL constraints, validation rules or business-driven imputation.",
                name_columns(&medium)
            ),
            Priority::Medium,
        ));
    }
    if m.null_analysis.len() > GOVERNANCE_NULL_COLUMNS {
        recs.push(Recommendation::new(
            "Comprehensive Data Governance",
            format!(
                "{} columns contain null values. Introduce mandatory-field validation and upstream quality monitoring.",
                m.null_analysis.len()
            ),
            Priority::Medium,
        ));
    }
}

fn stats_rules(m: &DescriptiveStatsMetrics, recs: &mut Vec<Recommendation>) {
    for (column, stats) in &m.descriptive_stats {
        if let Some(cv) = coefficient_of_variation(stats) {
            if cv > HIGH_VARIATION {
                recs.push(Recommendation::new(
                    format!("Investigate High Variability in {}", column),
                    format!(
                        "Column `{}` has high variability (CV={:.2}). Review it for outliers or entry errors, or normalize it.",
                        column, cv
                    ),
                    Priority::Low,
                ));
            }
        }

        if let Some(unique) = stats.unique {
            if stats.count > 0
                && unique as f64 / stats.count as f64 > HIGH_UNIQUENESS
                && unique > HIGH_CARDINALITY
            {
                recs.push(Recommendation::new(
                    format!("High Cardinality in {}", column),
                    format!(
                        "Column `{}` has {} distinct values. Consider normalization, bucketing or an index.",
                        column, unique
                    ),
                    Priority::Low,
                ));
            }
        }
    }

    if m.descriptive_stats.len() > WIDE_DATASET_COLUMNS {
        recs.push(Recommendation::new(
            "Data Documentation and Profiling",
            format!(
                "Dataset has {} columns. Maintain a data dictionary and profile it regularly to catch drift.",
                m.descriptive_stats.len()
            ),
            Priority::Low,
        ));
    }
}

fn coefficient_of_variation(stats: &ColumnStats) -> Option<f64> {
    match (stats.mean, stats.std) {
        (Some(mean), Some(std)) if mean != 0.0 => Some(std / mean.abs()),
        _ => None,
    }
}

fn name_columns(columns: &[&str]) -> String {
    columns
        .iter()
        .take(MAX_NAMED_COLUMNS)
        .map(|c| format!("`{}`", c))
        .collect::<Vec<_>>()
        .join(", ")
}
