//! Report rendering and persistence.
//!
//! [`render`] turns a completed [`Assessment`] into Markdown, HTML or JSON.
//! Rendering only formats stored values: counts are printed verbatim,
//! stored percentages with two decimals, and nothing is grouped with
//! thousands separators, so the same figure reads the same in every
//! format. No clock is read; rendering twice yields the same text.
//!
//! [`persist`] writes one file per format named
//! `dq_report_{dataset}_{YYYYmmdd_HHMMSS}.{ext}` using the assessment's own
//! timestamp, and [`load_assessment`] reads a JSON report back.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::assessment::Assessment;
use crate::checks::{
    CheckKind, CheckMetrics, CheckResult, ColumnStats, DescriptiveStatsMetrics, DuplicateMetrics,
    NullProfileMetrics, Outcome,
};
use crate::error::{QualityError, Result};

/// Longest `top` value shown in statistics tables.
const MAX_TOP_CHARS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Markdown,
    Html,
    Json,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 3] = [ReportFormat::Markdown, ReportFormat::Html, ReportFormat::Json];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "markdown",
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = QualityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "html" | "htm" => Ok(ReportFormat::Html),
            "json" => Ok(ReportFormat::Json),
            other => Err(QualityError::UnsupportedFormat(other.to_string())),
        }
    }
}

pub fn render(assessment: &Assessment, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Markdown => Ok(render_markdown(assessment)),
        ReportFormat::Html => Ok(render_html(assessment)),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(assessment)?),
    }
}

/// `dq_report_{dataset}_{YYYYmmdd_HHMMSS}.{ext}`.
pub fn report_file_name(assessment: &Assessment, format: ReportFormat) -> String {
    let dataset: String = assessment
        .metadata
        .dataset_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!(
        "dq_report_{}_{}.{}",
        dataset,
        assessment.metadata.timestamp.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Write one file per format into `output_dir`, creating it if needed.
pub fn persist(
    assessment: &Assessment,
    output_dir: &Path,
    formats: &[ReportFormat],
) -> Result<IndexMap<ReportFormat, PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    let mut written = IndexMap::new();
    for &format in formats {
        if written.contains_key(&format) {
            continue;
        }
        let path = output_dir.join(report_file_name(assessment, format));
        std::fs::write(&path, render(assessment, format)?)?;
        tracing::info!(format = %format, path = %path.display(), "report saved");
        written.insert(format, path);
    }
    Ok(written)
}

/// Read an assessment saved as a JSON report.
pub fn load_assessment(path: &Path) -> Result<Assessment> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn check_title(name: &str) -> String {
    match CheckKind::from_str(name) {
        Ok(kind) => kind.title().to_string(),
        Err(_) => name.replace('_', " "),
    }
}

fn status_text(result: &CheckResult) -> &'static str {
    match result.outcome() {
        Outcome::Passed => "PASS",
        Outcome::Failed => "FAIL",
        Outcome::Errored => "ERROR",
    }
}

fn pct(value: f64) -> String {
    format!("{:.2}", value)
}

fn opt_num(value: Option<f64>) -> String {
    value.map(pct).unwrap_or_else(|| "-".to_string())
}

fn opt_count(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn top_value(stats: &ColumnStats) -> String {
    match &stats.top {
        Some(top) => top.chars().take(MAX_TOP_CHARS).collect(),
        None => "-".to_string(),
    }
}

/// Cells of one statistics table row, after the column name.
fn stats_cells(stats: &ColumnStats) -> [String; 11] {
    [
        stats.count.to_string(),
        opt_num(stats.mean),
        opt_num(stats.std),
        opt_num(stats.min),
        opt_num(stats.p25),
        opt_num(stats.p50),
        opt_num(stats.p75),
        opt_num(stats.max),
        opt_count(stats.unique),
        top_value(stats),
        opt_count(stats.freq),
    ]
}

const STATS_HEADERS: [&str; 12] = [
    "Column", "Count", "Mean", "Std", "Min", "25%", "50%", "75%", "Max", "Unique", "Top", "Freq",
];

// ============ Markdown ============

fn md_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn render_markdown(a: &Assessment) -> String {
    let meta = &a.metadata;
    let mut md = String::new();

    md.push_str("# Data Quality Assessment Report\n\n");
    md.push_str("## Dataset Information\n");
    md.push_str(&format!("- **Dataset**: `{}`\n", meta.dataset_id));
    md.push_str(&format!("- **Connector**: {}\n", meta.connector_type.to_uppercase()));
    md.push_str(&format!(
        "- **Assessment Date**: {}\n",
        meta.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!("- **Checks Requested**: {}\n", meta.checks_requested.join(", ")));
    md.push_str(&format!("- **Total Checks**: {}\n", meta.total_checks));

    md.push_str("\n## Executive Summary\n");
    md.push_str(&format!("- **Passed**: {} checks\n", a.summary.passed));
    md.push_str(&format!("- **Failed**: {} checks\n", a.summary.failed));
    md.push_str(&format!("- **Errors**: {} checks\n", a.summary.errored));

    md.push_str("\n---\n\n## Detailed Check Results\n\n");
    for (name, result) in &a.check_results {
        md.push_str(&format!("### {}\n\n", check_title(name)));
        md.push_str(&format!("- **Status**: {}\n", status_text(result)));
        if let Some(error) = &result.error {
            md.push_str(&format!("- **Error**: {}\n", error));
        }
        match &result.metrics {
            Some(CheckMetrics::Duplicates(m)) => md_duplicates(&mut md, m),
            Some(CheckMetrics::NullProfile(m)) => md_nulls(&mut md, m),
            Some(CheckMetrics::DescriptiveStats(m)) => md_stats(&mut md, m),
            None => {}
        }
        md.push('\n');
    }

    if !a.recommendations.is_empty() {
        md.push_str("---\n\n## Recommendations\n\n");
        for (i, rec) in a.recommendations.iter().enumerate() {
            md.push_str(&format!("{}. **{}**\n", i + 1, rec.title));
            md.push_str(&format!("   - {}\n", rec.description));
            md.push_str(&format!("   - *Priority*: {}\n\n", rec.priority.as_str()));
        }
    }

    md
}

fn md_duplicates(md: &mut String, m: &DuplicateMetrics) {
    md.push_str(&format!("- **Total Rows**: {}\n", m.total_rows));
    md.push_str(&format!(
        "- **Duplicate Records**: {} ({}% of data)\n",
        m.duplicate_qty,
        pct(m.duplicate_percentage)
    ));
    if m.duplicate_examples.is_empty() {
        return;
    }
    md.push_str("- **Sample Duplicate Records**:\n");
    for (i, example) in m.duplicate_examples.iter().enumerate() {
        md.push_str(&format!(
            "  {}. Row appears {} times: `{}`\n",
            i + 1,
            example.occurrences,
            example.values.join(", ")
        ));
    }
}

fn md_nulls(md: &mut String, m: &NullProfileMetrics) {
    md.push_str(&format!("- **Dataset Size**: {} rows x {} columns\n", m.total_rows, m.total_columns));
    md.push_str(&format!(
        "- **Columns with Missing Data**: {} out of {} columns\n",
        m.columns_with_nulls, m.total_columns
    ));
    if m.null_analysis.is_empty() {
        return;
    }
    md.push_str("\n| Column | Null Count | Null % |\n|--------|------------|--------|\n");
    for col in &m.null_analysis {
        md.push_str(&format!(
            "| `{}` | {} | {} |\n",
            md_cell(&col.column_name),
            col.null_count,
            pct(col.null_percentage)
        ));
    }
}

fn md_stats(md: &mut String, m: &DescriptiveStatsMetrics) {
    md.push_str(&format!("- **Total Rows**: {}\n", m.total_rows));
    md.push_str(&format!("- **Columns Analyzed**: {}\n", m.columns_analyzed));
    if m.descriptive_stats.is_empty() {
        return;
    }
    md.push_str(&format!("\n| {} |\n", STATS_HEADERS.join(" | ")));
    md.push_str(&format!("|{}\n", "---|".repeat(STATS_HEADERS.len())));
    for (column, stats) in &m.descriptive_stats {
        let cells: Vec<String> = stats_cells(stats).iter().map(|c| md_cell(c)).collect();
        md.push_str(&format!("| `{}` | {} |\n", md_cell(column), cells.join(" | ")));
    }
}

// ============ HTML ============

const HTML_STYLE: &str = r#"<style>
body { font-family: Arial, sans-serif; max-width: 1200px; margin: 0 auto; padding: 20px; }
.header { background: #4b5bd6; color: white; padding: 24px; border-radius: 8px; }
.summary { display: flex; gap: 16px; margin: 20px 0; }
.card { flex: 1; background: #f8f9fa; padding: 16px; border-radius: 8px; border-left: 4px solid #007bff; }
.passed { border-left-color: #28a745; }
.failed { border-left-color: #dc3545; }
.errored { border-left-color: #ffc107; }
.check { border: 1px solid #e9ecef; border-radius: 8px; padding: 16px; margin: 12px 0; }
.status-pass { color: #28a745; }
.status-fail { color: #dc3545; }
.status-error { color: #b8860b; }
.priority-high { border-left: 4px solid #dc3545; padding-left: 8px; }
.priority-medium { border-left: 4px solid #ffc107; padding-left: 8px; }
.priority-low { border-left: 4px solid #28a745; padding-left: 8px; }
table { border-collapse: collapse; width: 100%; }
th, td { padding: 6px 8px; border-bottom: 1px solid #ddd; text-align: left; }
</style>"#;

/// Escape text for HTML element and attribute content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_html(a: &Assessment) -> String {
    let meta = &a.metadata;
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n");
    html.push_str("<title>Data Quality Assessment Report</title>\n");
    html.push_str(HTML_STYLE);
    html.push_str("\n</head>\n<body>\n");

    html.push_str("<div class=\"header\">\n<h1>Data Quality Assessment Report</h1>\n");
    html.push_str(&format!("<p>Dataset: <code>{}</code></p>\n", escape_html(&meta.dataset_id)));
    html.push_str(&format!(
        "<p>Connector: {} | Assessment Date: {} | Total Checks: {}</p>\n",
        escape_html(&meta.connector_type.to_uppercase()),
        meta.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        meta.total_checks
    ));
    html.push_str(&format!(
        "<p>Checks Requested: {}</p>\n</div>\n",
        escape_html(&meta.checks_requested.join(", "))
    ));

    html.push_str("<div class=\"summary\">\n");
    html.push_str(&format!("<div class=\"card passed\"><h3>Passed</h3><p>{}</p></div>\n", a.summary.passed));
    html.push_str(&format!("<div class=\"card failed\"><h3>Failed</h3><p>{}</p></div>\n", a.summary.failed));
    html.push_str(&format!("<div class=\"card errored\"><h3>Errors</h3><p>{}</p></div>\n", a.summary.errored));
    html.push_str("</div>\n");

    html.push_str("<h2>Detailed Check Results</h2>\n");
    for (name, result) in &a.check_results {
        let status = status_text(result);
        html.push_str("<div class=\"check\">\n");
        html.push_str(&format!("<h3>{}</h3>\n", escape_html(&check_title(name))));
        html.push_str(&format!(
            "<p>Status: <strong class=\"status-{}\">{}</strong></p>\n",
            status.to_ascii_lowercase(),
            status
        ));
        if let Some(error) = &result.error {
            html.push_str(&format!("<p>Error: {}</p>\n", escape_html(error)));
        }
        match &result.metrics {
            Some(CheckMetrics::Duplicates(m)) => html_duplicates(&mut html, m),
            Some(CheckMetrics::NullProfile(m)) => html_nulls(&mut html, m),
            Some(CheckMetrics::DescriptiveStats(m)) => html_stats(&mut html, m),
            None => {}
        }
        html.push_str("</div>\n");
    }

    if !a.recommendations.is_empty() {
        html.push_str("<h2>Recommendations</h2>\n<ol>\n");
        for rec in &a.recommendations {
            html.push_str(&format!(
                "<li class=\"priority-{}\"><strong>{}</strong><p>{}</p><p><em>Priority: {}</em></p></li>\n",
                rec.priority.as_str().to_ascii_lowercase(),
                escape_html(&rec.title),
                escape_html(&rec.description),
                rec.priority.as_str()
            ));
        }
        html.push_str("</ol>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn html_duplicates(html: &mut String, m: &DuplicateMetrics) {
    html.push_str(&format!("<p>Total Rows: {}</p>\n", m.total_rows));
    html.push_str(&format!(
        "<p>Duplicate Records: {} ({}% of data)</p>\n",
        m.duplicate_qty,
        pct(m.duplicate_percentage)
    ));
    if m.duplicate_examples.is_empty() {
        return;
    }
    html.push_str("<ol>\n");
    for example in &m.duplicate_examples {
        html.push_str(&format!(
            "<li>Row appears {} times: <code>{}</code></li>\n",
            example.occurrences,
            escape_html(&example.values.join(", "))
        ));
    }
    html.push_str("</ol>\n");
}

fn html_nulls(html: &mut String, m: &NullProfileMetrics) {
    html.push_str(&format!(
        "<p>Dataset Size: {} rows x {} columns</p>\n",
        m.total_rows, m.total_columns
    ));
    html.push_str(&format!(
        "<p>Columns with Missing Data: {} out of {} columns</p>\n",
        m.columns_with_nulls, m.total_columns
    ));
    if m.null_analysis.is_empty() {
        return;
    }
    html.push_str("<table>\n<tr><th>Column</th><th>Null Count</th><th>Null %</th></tr>\n");
    for col in &m.null_analysis {
        html.push_str(&format!(
            "<tr><td><code>{}</code></td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&col.column_name),
            col.null_count,
            pct(col.null_percentage)
        ));
    }
    html.push_str("</table>\n");
}

fn html_stats(html: &mut String, m: &DescriptiveStatsMetrics) {
    html.push_str(&format!("<p>Total Rows: {}</p>\n", m.total_rows));
    html.push_str(&format!("<p>Columns Analyzed: {}</p>\n", m.columns_analyzed));
    if m.descriptive_stats.is_empty() {
        return;
    }
    html.push_str("<table>\n<tr>");
    for header in STATS_HEADERS {
        html.push_str(&format!("<th>{}</th>", escape_html(header)));
    }
    html.push_str("</tr>\n");
    for (column, stats) in &m.descriptive_stats {
        html.push_str(&format!("<tr><td><code>{}</code></td>", escape_html(column)));
        for cell in stats_cells(stats) {
            html.push_str(&format!("<td>{}</td>", escape_html(&cell)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{assessment_from_results, PendingAssessment};
    use crate::checks::{DuplicateExample, NullColumn};
    use chrono::{TimeZone, Utc};

    fn sample() -> Assessment {
        let mut results = IndexMap::new();
        results.insert(
            "duplicates".to_string(),
            CheckResult::success(CheckMetrics::Duplicates(DuplicateMetrics {
                dataset_id: "STAGE_SALES.PUBLIC.ORDERS".into(),
                total_rows: 50000,
                duplicate_qty: 1250,
                duplicate_percentage: 2.5,
                duplicate_examples: vec![DuplicateExample {
                    occurrences: 3,
                    values: vec!["7".into(), "<script>".into()],
                }],
            })),
        );
        results.insert(
            "null_values".to_string(),
            CheckResult::success(CheckMetrics::NullProfile(NullProfileMetrics {
                dataset_id: "STAGE_SALES.PUBLIC.ORDERS".into(),
                total_rows: 50000,
                total_columns: 4,
                columns_with_nulls: 1,
                null_analysis: vec![NullColumn {
                    column_name: "email".into(),
                    null_count: 4000,
                    null_percentage: 8.0,
                }],
            })),
        );
        results.insert("descriptive_stats".to_string(), CheckResult::error("timed out & gave up"));

        PendingAssessment::new(
            "STAGE_SALES.PUBLIC.ORDERS",
            "postgres",
            results.keys().cloned().collect(),
        )
        .with_timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap())
        .complete(results)
    }

    #[test]
    fn test_figures_agree_across_formats() {
        let a = sample();
        let md = render(&a, ReportFormat::Markdown).unwrap();
        let html = render(&a, ReportFormat::Html).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&render(&a, ReportFormat::Json).unwrap()).unwrap();

        for text in [&md, &html] {
            assert!(text.contains("50000"));
            assert!(text.contains("1250 (2.50% of data)"));
            assert!(text.contains("8.00"));
            assert!(!text.contains("50,000"));
        }
        let dup = &json["check_results"]["duplicates"]["metrics"];
        assert_eq!(dup["total_rows"], 50000);
        assert_eq!(dup["duplicate_qty"], 1250);
        assert_eq!(
            json["check_results"]["null_values"]["metrics"]["null_analysis"][0]["null_percentage"],
            8.0
        );
        assert_eq!(json["summary"]["failed_checks"], 2);
        assert_eq!(json["summary"]["error_checks"], 1);
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let a = sample();
        for format in ReportFormat::ALL {
            assert_eq!(render(&a, format).unwrap(), render(&a, format).unwrap());
        }
    }

    #[test]
    fn test_html_escapes_interpolated_text() {
        let html = render(&sample(), ReportFormat::Html).unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("timed out &amp; gave up"));
    }

    #[test]
    fn test_markdown_sections() {
        let md = render(&sample(), ReportFormat::Markdown).unwrap();
        assert!(md.starts_with("# Data Quality Assessment Report"));
        assert!(md.contains("- **Connector**: POSTGRES"));
        assert!(md.contains("- **Assessment Date**: 2024-05-01 12:30:05 UTC"));
        assert!(md.contains("### Duplicate Records"));
        assert!(md.contains("| `email` | 4000 | 8.00 |"));
        assert!(md.contains("- **Status**: ERROR"));
        assert!(md.contains("## Recommendations"));
    }

    #[test]
    fn test_persist_and_reload() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("reports");
        let a = sample();
        let written = persist(&a, &out, &ReportFormat::ALL).unwrap();

        assert_eq!(written.len(), 3);
        let json_path = &written[&ReportFormat::Json];
        assert_eq!(
            json_path.file_name().unwrap().to_str().unwrap(),
            "dq_report_STAGE_SALES_PUBLIC_ORDERS_20240501_123005.json"
        );
        assert!(written[&ReportFormat::Markdown].to_string_lossy().ends_with(".md"));

        let reloaded = load_assessment(json_path).unwrap();
        assert_eq!(reloaded, a);
        assert_eq!(
            render(&reloaded, ReportFormat::Markdown).unwrap(),
            render(&a, ReportFormat::Markdown).unwrap()
        );
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("HTML".parse::<ReportFormat>().unwrap(), ReportFormat::Html);
        assert!(matches!(
            "pdf".parse::<ReportFormat>(),
            Err(QualityError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_from_results_renders_without_metrics() {
        let mut results = IndexMap::new();
        results.insert("custom_rule".to_string(), CheckResult::error("missing"));
        let a = assessment_from_results(results, "x.y", "files");
        let md = render(&a, ReportFormat::Markdown).unwrap();
        assert!(md.contains("### custom rule"));
    }
}
