//! In-memory tabular data handed from connectors to checks.
//!
//! A [`Frame`] is a list of named columns and row-major [`Value`] cells.
//! Connectors produce frames from CSV files or SQL result sets; checks only
//! read them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

use crate::error::Result;

/// Text placeholders that count as a missing value.
const NULL_PLACEHOLDERS: &[&str] = &[
    "null", "NULL", "Null", "None", "none", "NaN", "nan", "N/A", "n/a", "NA", "<NA>", "#N/A",
];

/// One cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Type a raw text cell: integers, then floats, then booleans, else text.
    ///
    /// Placeholders such as `NULL` stay as text; [`Value::is_missing`]
    /// normalizes them when a check needs to.
    pub fn parse(cell: &str) -> Value {
        let trimmed = cell.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if trimmed.bytes().any(|b| b.is_ascii_digit()) {
            if let Ok(f) = trimmed.parse::<f64>() {
                return Value::Float(f);
            }
        }
        match trimmed {
            "true" | "True" | "TRUE" => Value::Bool(true),
            "false" | "False" | "FALSE" => Value::Bool(false),
            _ => Value::Text(cell.to_string()),
        }
    }

    /// True for nulls, NaN, blank text and the usual null placeholders.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            Value::Text(s) => {
                let trimmed = s.trim();
                trimmed.is_empty() || NULL_PLACEHOLDERS.contains(&trimmed)
            }
            Value::Bool(_) | Value::Int(_) => false,
        }
    }

    /// Numeric view of the cell, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    /// Encoding used for row fingerprints and value counts.
    ///
    /// Every missing representation encodes identically, and numbers
    /// encode by value: `1` and `1.0` collapse, as do `0` and `-0.0`.
    pub fn canonical(&self) -> String {
        if self.is_missing() {
            return "\u{0}missing".to_string();
        }
        match self {
            Value::Bool(b) => format!("b:{}", b),
            Value::Int(i) => format!("n:{}", i),
            Value::Float(f) => format!("n:{}", canonical_float(*f)),
            Value::Text(s) => format!("s:{}", s),
            Value::Null => "\u{0}missing".to_string(),
        }
    }
}

/// Integral floats below 2^53 print like the integer.
fn canonical_float(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return format!("{}", f as i64);
    }
    format!("{}", f)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A loaded dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a frame from rows; short rows are padded with nulls and long
    /// rows are truncated to the column count.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut frame = Frame::new(columns);
        for row in rows {
            frame.push_row(row);
        }
        frame
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Parse delimited text with a header row.
    pub fn from_csv_reader<R: Read>(reader: R, delimiter: u8) -> Result<Frame> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut frame = Frame::new(columns);
        for record in rdr.records() {
            let record = record?;
            frame.push_row(record.iter().map(Value::parse).collect());
        }
        Ok(frame)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Cells of column `idx`, top to bottom.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Header plus rows, pipe separated.
    pub fn to_pipe_table(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(self.columns.join(" | "));
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            lines.push(cells.join(" | "));
        }
        lines.join("\n")
    }
}
