//! Data-quality checks.
//!
//! Three independent, side-effect-free checks over a loaded [`Frame`]:
//!
//! | Check | Metrics | Domain pass |
//! |-------|---------|-------------|
//! | [`CheckKind::Duplicates`] | [`DuplicateMetrics`] | `duplicate_qty == 0` |
//! | [`CheckKind::NullValues`] | [`NullProfileMetrics`] | `columns_with_nulls == 0` |
//! | [`CheckKind::DescriptiveStats`] | [`DescriptiveStatsMetrics`] | always |
//!
//! [`run_check`] never propagates a failure: errors and panics inside a
//! check become a [`CheckResult`] with [`CheckStatus::Error`], so one broken
//! check cannot take its siblings down.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;

use crate::error::{QualityError, Result};
use crate::frame::{Frame, Value};

/// Column-name suffixes treated as identifiers.
const IDENTIFIER_SUFFIXES: &[&str] = &["_id", "_key", "_uuid"];

/// Most repeated rows reported by the duplicates check.
const MAX_DUPLICATE_EXAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Duplicates,
    NullValues,
    DescriptiveStats,
}

impl CheckKind {
    pub const ALL: [CheckKind; 3] = [
        CheckKind::Duplicates,
        CheckKind::NullValues,
        CheckKind::DescriptiveStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Duplicates => "duplicates",
            CheckKind::NullValues => "null_values",
            CheckKind::DescriptiveStats => "descriptive_stats",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            CheckKind::Duplicates => "Duplicate Records",
            CheckKind::NullValues => "Null Values",
            CheckKind::DescriptiveStats => "Descriptive Statistics",
        }
    }
}

impl FromStr for CheckKind {
    type Err = QualityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duplicates" | "duplicate" | "dupes" => Ok(CheckKind::Duplicates),
            "null_values" | "nulls" | "null_check" | "null_profile" => Ok(CheckKind::NullValues),
            "descriptive_stats" | "stats" | "describe" => Ok(CheckKind::DescriptiveStats),
            other => Err(QualityError::CheckExecution {
                check: other.to_string(),
                message: "unknown check".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Executed without error; pass/fail comes from the metrics.
    Success,
    /// Executed and failed, as reported by an external producer.
    Failure,
    Error,
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    #[serde(default)]
    pub metrics: Option<CheckMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn success(metrics: CheckMetrics) -> Self {
        Self {
            status: CheckStatus::Success,
            metrics: Some(metrics),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            metrics: None,
            error: Some(message.into()),
        }
    }
}

/// Classification of a result for summary counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
    Errored,
}

impl CheckResult {
    /// `error` is errored, `failure` is failed, and `success` defers to the
    /// metrics' domain rule. A success without metrics counts as passed.
    pub fn outcome(&self) -> Outcome {
        match self.status {
            CheckStatus::Error => Outcome::Errored,
            CheckStatus::Failure => Outcome::Failed,
            CheckStatus::Success => match &self.metrics {
                Some(m) if !m.passes() => Outcome::Failed,
                _ => Outcome::Passed,
            },
        }
    }
}

/// Per-check metrics. Each variant has its own required fields, which is
/// what lets the untagged representation round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckMetrics {
    Duplicates(DuplicateMetrics),
    NullProfile(NullProfileMetrics),
    DescriptiveStats(DescriptiveStatsMetrics),
}

impl CheckMetrics {
    /// Domain verdict for a successful execution.
    pub fn passes(&self) -> bool {
        match self {
            CheckMetrics::Duplicates(m) => m.duplicate_qty == 0,
            CheckMetrics::NullProfile(m) => m.columns_with_nulls == 0,
            CheckMetrics::DescriptiveStats(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMetrics {
    pub dataset_id: String,
    pub total_rows: u64,
    pub duplicate_qty: u64,
    pub duplicate_percentage: f64,
    #[serde(default)]
    pub duplicate_examples: Vec<DuplicateExample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateExample {
    pub occurrences: u64,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullProfileMetrics {
    pub dataset_id: String,
    pub total_rows: u64,
    pub total_columns: u64,
    pub columns_with_nulls: u64,
    pub null_analysis: Vec<NullColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullColumn {
    pub column_name: String,
    pub null_count: u64,
    pub null_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStatsMetrics {
    pub dataset_id: String,
    pub total_rows: u64,
    pub columns_analyzed: u64,
    pub descriptive_stats: IndexMap<String, ColumnStats>,
}

/// Summary of one column. Numeric columns fill the numeric fields,
/// categorical columns fill `unique`, `top` and `freq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ColumnStats {
    pub count: u64,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub p25: Option<f64>,
    #[serde(rename = "50%")]
    pub p50: Option<f64>,
    #[serde(rename = "75%")]
    pub p75: Option<f64>,
    pub max: Option<f64>,
    pub unique: Option<u64>,
    pub top: Option<String>,
    pub freq: Option<u64>,
}

impl ColumnStats {
    pub fn is_numeric(&self) -> bool {
        self.mean.is_some()
    }
}

/// Run one check, folding any failure into an error result.
pub fn run_check(kind: CheckKind, dataset_id: &str, frame: &Frame) -> CheckResult {
    let outcome = catch_unwind(AssertUnwindSafe(|| match kind {
        CheckKind::Duplicates => check_duplicates(dataset_id, frame).map(CheckMetrics::Duplicates),
        CheckKind::NullValues => check_null_values(dataset_id, frame).map(CheckMetrics::NullProfile),
        CheckKind::DescriptiveStats => {
            check_descriptive_stats(dataset_id, frame).map(CheckMetrics::DescriptiveStats)
        }
    }));

    match outcome {
        Ok(Ok(metrics)) => CheckResult::success(metrics),
        Ok(Err(e)) => {
            tracing::warn!(check = kind.as_str(), dataset = dataset_id, error = %e, "check failed");
            CheckResult::error(e.to_string())
        }
        Err(_) => {
            tracing::warn!(check = kind.as_str(), dataset = dataset_id, "check panicked");
            CheckResult::error(format!("check '{}' panicked", kind.as_str()))
        }
    }
}

fn require_columns(kind: CheckKind, frame: &Frame) -> Result<()> {
    if frame.width() == 0 {
        return Err(QualityError::CheckExecution {
            check: kind.as_str().to_string(),
            message: "dataset has no columns".to_string(),
        });
    }
    Ok(())
}

/// Rows minus distinct rows. Missing cells compare equal to each other.
pub fn check_duplicates(dataset_id: &str, frame: &Frame) -> Result<DuplicateMetrics> {
    require_columns(CheckKind::Duplicates, frame)?;

    // fingerprint -> (first row index, occurrences)
    let mut seen: HashMap<[u8; 32], (usize, u64)> = HashMap::with_capacity(frame.height());
    for (idx, row) in frame.rows().iter().enumerate() {
        let entry = seen.entry(row_fingerprint(row)).or_insert((idx, 0));
        entry.1 += 1;
    }

    let total_rows = frame.height() as u64;
    let duplicate_qty = total_rows - seen.len() as u64;

    let mut repeated: Vec<(usize, u64)> = seen.into_values().filter(|(_, n)| *n > 1).collect();
    repeated.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let duplicate_examples = repeated
        .into_iter()
        .take(MAX_DUPLICATE_EXAMPLES)
        .map(|(idx, occurrences)| DuplicateExample {
            occurrences,
            values: frame.rows()[idx].iter().map(|v| v.to_string()).collect(),
        })
        .collect();

    Ok(DuplicateMetrics {
        dataset_id: dataset_id.to_string(),
        total_rows,
        duplicate_qty,
        duplicate_percentage: percentage(duplicate_qty, total_rows),
        duplicate_examples,
    })
}

fn row_fingerprint(row: &[Value]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for cell in row {
        hasher.update(cell.canonical().as_bytes());
        hasher.update([0x1f]);
    }
    hasher.finalize().into()
}

/// Missing values per column, most affected first.
pub fn check_null_values(dataset_id: &str, frame: &Frame) -> Result<NullProfileMetrics> {
    require_columns(CheckKind::NullValues, frame)?;

    let total_rows = frame.height() as u64;
    let mut null_analysis: Vec<NullColumn> = frame
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| {
            let null_count = frame.column(idx).filter(|v| v.is_missing()).count() as u64;
            (null_count > 0).then(|| NullColumn {
                column_name: name.clone(),
                null_count,
                null_percentage: percentage(null_count, total_rows),
            })
        })
        .collect();

    // Stable: equal percentages keep column order.
    null_analysis.sort_by(|a, b| b.null_percentage.total_cmp(&a.null_percentage));

    Ok(NullProfileMetrics {
        dataset_id: dataset_id.to_string(),
        total_rows,
        total_columns: frame.width() as u64,
        columns_with_nulls: null_analysis.len() as u64,
        null_analysis,
    })
}

/// Per-column summary statistics.
pub fn check_descriptive_stats(dataset_id: &str, frame: &Frame) -> Result<DescriptiveStatsMetrics> {
    require_columns(CheckKind::DescriptiveStats, frame)?;

    let mut descriptive_stats = IndexMap::with_capacity(frame.width());
    for (idx, name) in frame.columns().iter().enumerate() {
        let present: Vec<&Value> = frame.column(idx).filter(|v| !v.is_missing()).collect();
        let numeric: Option<Vec<f64>> = if is_identifier_column(name) || present.is_empty() {
            None
        } else {
            present.iter().map(|v| v.as_f64()).collect()
        };

        let stats = match numeric {
            Some(values) => numeric_stats(values),
            None => categorical_stats(&present),
        };
        descriptive_stats.insert(name.clone(), stats);
    }

    Ok(DescriptiveStatsMetrics {
        dataset_id: dataset_id.to_string(),
        total_rows: frame.height() as u64,
        columns_analyzed: descriptive_stats.len() as u64,
        descriptive_stats,
    })
}

/// Identifier-like names are summarized as categories, not numbers.
pub fn is_identifier_column(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "id" || IDENTIFIER_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

fn numeric_stats(mut values: Vec<f64>) -> ColumnStats {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let std = (n > 1).then(|| {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        var.sqrt()
    });

    ColumnStats {
        count: n as u64,
        mean: Some(mean),
        std,
        min: values.first().copied(),
        p25: Some(quantile(&values, 0.25)),
        p50: Some(quantile(&values, 0.50)),
        p75: Some(quantile(&values, 0.75)),
        max: values.last().copied(),
        ..ColumnStats::default()
    }
}

fn categorical_stats(present: &[&Value]) -> ColumnStats {
    let mut counts: IndexMap<String, u64> = IndexMap::new();
    for value in present {
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }

    // First value reaching the highest count wins ties.
    let mut top: Option<(&String, u64)> = None;
    for (value, &n) in &counts {
        if top.map_or(true, |(_, best)| n > best) {
            top = Some((value, n));
        }
    }

    ColumnStats {
        count: present.len() as u64,
        unique: Some(counts.len() as u64),
        top: top.map(|(v, _)| v.clone()),
        freq: top.map(|(_, n)| n),
        ..ColumnStats::default()
    }
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// `part / whole * 100`, rounded to two decimals; zero for an empty whole.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_column(name: &str, values: Vec<Value>) -> Frame {
        Frame::from_rows(
            vec![name.to_string()],
            values.into_iter().map(|v| vec![v]).collect(),
        )
    }

    #[test]
    fn test_duplicates_example() {
        let frame = single_column(
            "n",
            [1, 2, 2, 2, 3].iter().map(|&i| Value::Int(i)).collect(),
        );
        let result = run_check(CheckKind::Duplicates, "t", &frame);
        assert_eq!(result.status, CheckStatus::Success);

        let Some(CheckMetrics::Duplicates(m)) = result.metrics else {
            panic!("expected duplicate metrics");
        };
        assert_eq!(m.total_rows, 5);
        assert_eq!(m.duplicate_qty, 2);
        assert_eq!(m.duplicate_percentage, 40.0);
        assert_eq!(m.duplicate_examples.len(), 1);
        assert_eq!(m.duplicate_examples[0].occurrences, 3);
        assert_eq!(m.duplicate_examples[0].values, vec!["2"]);
        assert!(!CheckMetrics::Duplicates(m).passes());
    }

    #[test]
    fn test_duplicates_treat_null_placeholders_as_equal() {
        let frame = Frame::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::Int(1), Value::Null],
                vec![Value::Int(1), Value::Text("NULL".into())],
                vec![Value::Int(1), Value::Text("x".into())],
            ],
        );
        let m = check_duplicates("t", &frame).unwrap();
        assert_eq!(m.duplicate_qty, 1);
    }

    #[test]
    fn test_duplicates_compare_numbers_by_value() {
        let frame = single_column(
            "amount",
            ["1", "1.0", "0.0", "-0.0"].iter().map(|s| Value::parse(s)).collect(),
        );
        let m = check_duplicates("t", &frame).unwrap();
        assert_eq!(m.duplicate_qty, 2);
    }

    #[test]
    fn test_no_duplicates_passes() {
        let frame = single_column("n", vec![Value::Int(1), Value::Int(2)]);
        let m = check_duplicates("t", &frame).unwrap();
        assert_eq!(m.duplicate_qty, 0);
        assert!(CheckMetrics::Duplicates(m).passes());
    }

    #[test]
    fn test_null_percentage_two_decimals() {
        let values: Vec<Value> = (0..50_000)
            .map(|i| if i < 4_000 { Value::Text(String::new()) } else { Value::Int(i) })
            .collect();
        let frame = single_column("amount", values);
        let m = check_null_values("t", &frame).unwrap();

        assert_eq!(m.columns_with_nulls, 1);
        let col = &m.null_analysis[0];
        assert_eq!(col.null_count, 4_000);
        assert_eq!(col.null_percentage, 8.0);
        assert_eq!(format!("{:.2}", col.null_percentage), "8.00");
        let recomputed = col.null_count as f64 / m.total_rows as f64 * 100.0;
        assert_eq!(format!("{:.2}", recomputed), format!("{:.2}", col.null_percentage));
    }

    #[test]
    fn test_null_analysis_sorted_descending() {
        let frame = Frame::from_rows(
            vec!["a".into(), "b".into(), "c".into()],
            vec![
                vec![Value::Null, Value::Text("null".into()), Value::Int(1)],
                vec![Value::Int(1), Value::Text("N/A".into()), Value::Int(1)],
                vec![Value::Int(1), Value::Text("ok".into()), Value::Int(1)],
            ],
        );
        let m = check_null_values("t", &frame).unwrap();
        let names: Vec<&str> = m.null_analysis.iter().map(|c| c.column_name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(m.null_analysis[0].null_percentage, 66.67);
        assert_eq!(m.null_analysis[1].null_percentage, 33.33);
        assert!(!CheckMetrics::NullProfile(m).passes());
    }

    #[test]
    fn test_descriptive_stats_numeric() {
        let frame = single_column(
            "amount",
            [1.0, 2.0, 3.0, 4.0].iter().map(|&f| Value::Float(f)).collect(),
        );
        let m = check_descriptive_stats("t", &frame).unwrap();
        let s = &m.descriptive_stats["amount"];
        assert_eq!(s.count, 4);
        assert_eq!(s.mean, Some(2.5));
        assert!((s.std.unwrap() - 1.290_994).abs() < 1e-6);
        assert_eq!(s.min, Some(1.0));
        assert_eq!(s.p25, Some(1.75));
        assert_eq!(s.p50, Some(2.5));
        assert_eq!(s.p75, Some(3.25));
        assert_eq!(s.max, Some(4.0));
        assert_eq!(s.unique, None);
    }

    #[test]
    fn test_identifier_columns_forced_categorical() {
        let frame = Frame::from_rows(
            vec!["customer_id".into(), "qty".into()],
            vec![
                vec![Value::Int(10), Value::Int(1)],
                vec![Value::Int(10), Value::Int(2)],
                vec![Value::Int(11), Value::Int(3)],
            ],
        );
        let m = check_descriptive_stats("t", &frame).unwrap();
        let id = &m.descriptive_stats["customer_id"];
        assert!(!id.is_numeric());
        assert_eq!(id.unique, Some(2));
        assert_eq!(id.top.as_deref(), Some("10"));
        assert_eq!(id.freq, Some(2));
        assert!(m.descriptive_stats["qty"].is_numeric());
        assert_eq!(m.columns_analyzed, 2);
    }

    #[test]
    fn test_categorical_ignores_missing() {
        let frame = single_column(
            "city",
            vec![
                Value::Text("Oslo".into()),
                Value::Text("".into()),
                Value::Text("Lima".into()),
                Value::Text("Oslo".into()),
            ],
        );
        let m = check_descriptive_stats("t", &frame).unwrap();
        let s = &m.descriptive_stats["city"];
        assert_eq!(s.count, 3);
        assert_eq!(s.unique, Some(2));
        assert_eq!(s.top.as_deref(), Some("Oslo"));
    }

    #[test]
    fn test_empty_frame_is_error_not_panic() {
        let frame = Frame::default();
        for kind in CheckKind::ALL {
            let result = run_check(kind, "t", &frame);
            assert_eq!(result.status, CheckStatus::Error);
            assert!(result.error.unwrap().contains("no columns"));
        }
    }

    #[test]
    fn test_metrics_json_shape() {
        let frame = single_column("n", vec![Value::Int(1), Value::Int(1)]);
        let result = run_check(CheckKind::Duplicates, "t", &frame);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["metrics"]["duplicate_qty"], 1);
        assert!(json.get("error").is_none());

        let back: CheckResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_parse_check_names() {
        assert_eq!("nulls".parse::<CheckKind>().unwrap(), CheckKind::NullValues);
        assert_eq!("Duplicates".parse::<CheckKind>().unwrap(), CheckKind::Duplicates);
        assert!("freshness".parse::<CheckKind>().is_err());
    }
}
