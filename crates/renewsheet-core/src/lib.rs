//! # renewsheet-core
//!
//! Core data model and rules for the renewsheet renewal processor.
//!
//! This crate provides:
//! - Tabular model: `Dataset`, `Column`, `CellValue`
//! - The three tracking fields appended to every renewal record
//! - Schema policy and augmenter (`schema`)
//! - State coloring and dropdown rules (`rules`)
//! - TOML configuration (`config`)
//! - Error taxonomy shared by every crate in the workspace
//!
//! ## Example
//!
//! ```rust
//! use renewsheet_core::{augment, CellValue, Dataset, TrackingColumns, TrackingField};
//!
//! let mut dataset = Dataset::new("renewals", vec!["ID".into(), "DueDate".into()]);
//! dataset.push_row(vec![CellValue::from("P-1"), CellValue::Empty]).unwrap();
//!
//! let mut dataset = augment(dataset, &TrackingColumns::default());
//! assert_eq!(
//!     dataset.column_names(),
//!     vec!["ID", "DueDate", "State", "Notes Filed", "Completed By"]
//! );
//!
//! dataset.set_tracking(0, TrackingField::State, "Canceled").unwrap();
//! assert_eq!(dataset.record(0).unwrap().state(), "Canceled");
//! ```

pub mod config;
pub mod rules;
pub mod schema;

pub use config::{Config, DecryptionConfig};
pub use rules::{Color, FormattingRules, StateRule, CANCELED_GRAY};
pub use schema::{augment, SchemaPolicy};

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Cell Values
// ============================================================================

/// A single spreadsheet cell, normalized to the primitives the writer knows
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// True for `Empty` and for empty text
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Borrow the text of a `Text` cell
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String form used for comparisons, widths and round-trip checks.
    ///
    /// Integral numbers drop the fractional part, dates render as
    /// `%Y-%m-%d` (plus `%H:%M:%S` when a time is present).
    pub fn display_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
            CellValue::DateTime(dt) => {
                if dt.time() == NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            CellValue::DateTime(_) => 0,
            CellValue::Number(_) => 1,
            CellValue::Bool(_) => 2,
            CellValue::Text(s) if !s.is_empty() => 3,
            CellValue::Text(_) | CellValue::Empty => 4,
        }
    }

    /// Ordering used when sorting rows: dates, numbers, booleans, text, then empty cells
    pub fn sort_cmp(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::DateTime(a), CellValue::DateTime(b)) => a.cmp(b),
            (CellValue::Number(a), CellValue::Number(b)) => a.total_cmp(b),
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) if !a.is_empty() && !b.is_empty() => a.cmp(b),
            _ => self.sort_rank().cmp(&other.sort_rank()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::DateTime(value)
    }
}

// ============================================================================
// Tracking Fields
// ============================================================================

/// The fields appended to every renewal record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingField {
    State,
    NotesFiled,
    CompletedBy,
}

impl TrackingField {
    /// All tracking fields in the order they are appended
    pub const ALL: [TrackingField; 3] = [
        TrackingField::State,
        TrackingField::NotesFiled,
        TrackingField::CompletedBy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingField::State => "state",
            TrackingField::NotesFiled => "notes_filed",
            TrackingField::CompletedBy => "completed_by",
        }
    }
}

impl fmt::Display for TrackingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header labels used for the tracking columns
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackingColumns {
    pub state: String,
    pub notes_filed: String,
    pub completed_by: String,
}

impl Default for TrackingColumns {
    fn default() -> Self {
        Self {
            state: "State".into(),
            notes_filed: "Notes Filed".into(),
            completed_by: "Completed By".into(),
        }
    }
}

impl TrackingColumns {
    pub fn label(&self, field: TrackingField) -> &str {
        match field {
            TrackingField::State => &self.state,
            TrackingField::NotesFiled => &self.notes_filed,
            TrackingField::CompletedBy => &self.completed_by,
        }
    }

    /// Which tracking field a header label belongs to, if any
    pub fn field_for(&self, name: &str) -> Option<TrackingField> {
        TrackingField::ALL
            .into_iter()
            .find(|field| self.label(*field) == name)
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Where a column came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// Present in the input workbook
    Source,
    /// Appended by the augmenter
    Tracking(TrackingField),
}

/// Column descriptor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn source(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Source,
        }
    }

    pub fn tracking(name: impl Into<String>, field: TrackingField) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Tracking(field),
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.kind, ColumnKind::Tracking(_))
    }
}

// ============================================================================
// Dataset
// ============================================================================

/// One sheet of renewal records with an explicit, ordered schema
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    name: String,
    columns: Vec<Column>,
    rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    /// Create an empty dataset with source columns
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Column::source).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a dataset from descriptors and rows, rejecting duplicate
    /// column names and ragged rows.
    pub fn from_parts(
        name: impl Into<String>,
        columns: Vec<Column>,
        rows: Vec<Vec<CellValue>>,
    ) -> Result<Self, RenewalError> {
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(RenewalError::Schema(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }
        let mut dataset = Self {
            name: name.into(),
            columns,
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Name used for the output file stem (usually the input file stem)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Index of the column tagged with a tracking field
    pub fn tracking_index(&self, field: TrackingField) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.kind == ColumnKind::Tracking(field))
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Append a row; its width must match the schema
    pub fn push_row(&mut self, row: Vec<CellValue>) -> Result<(), RenewalError> {
        if row.len() != self.columns.len() {
            return Err(RenewalError::Schema(format!(
                "row {} has {} cells, expected {}",
                self.rows.len() + 1,
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Read view of one renewal record
    pub fn record(&self, index: usize) -> Option<RenewalRecord<'_>> {
        (index < self.rows.len()).then_some(RenewalRecord {
            dataset: self,
            index,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = RenewalRecord<'_>> {
        (0..self.rows.len()).map(move |index| RenewalRecord {
            dataset: self,
            index,
        })
    }

    /// Overwrite a tracking cell. The dataset must already be augmented.
    pub fn set_tracking(
        &mut self,
        row: usize,
        field: TrackingField,
        value: impl Into<String>,
    ) -> Result<(), RenewalError> {
        let column = self.tracking_index(field).ok_or_else(|| {
            RenewalError::Schema(format!("dataset has no {field} column; augment it first"))
        })?;
        let count = self.rows.len();
        let cells = self.rows.get_mut(row).ok_or_else(|| {
            RenewalError::Schema(format!("row {row} out of range ({count} rows)"))
        })?;
        cells[column] = CellValue::Text(value.into());
        Ok(())
    }

    pub(crate) fn push_column(&mut self, column: Column, fill: &CellValue) {
        self.columns.push(column);
        for row in &mut self.rows {
            row.push(fill.clone());
        }
    }

    pub(crate) fn column_mut(&mut self, index: usize) -> &mut Column {
        &mut self.columns[index]
    }

    /// Keep only the given column indices, in the given order
    pub(crate) fn select_columns(&mut self, order: &[usize]) {
        self.columns = order.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            *row = order.iter().map(|&i| row[i].clone()).collect();
        }
    }

    pub(crate) fn sort_rows_by(&mut self, column: usize) {
        self.rows.sort_by(|a, b| a[column].sort_cmp(&b[column]));
    }
}

/// Borrowed view of one row
#[derive(Clone, Copy, Debug)]
pub struct RenewalRecord<'a> {
    dataset: &'a Dataset,
    index: usize,
}

impl<'a> RenewalRecord<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cells(&self) -> &'a [CellValue] {
        &self.dataset.rows[self.index]
    }

    pub fn get(&self, column: &str) -> Option<&'a CellValue> {
        self.dataset
            .column_index(column)
            .map(|i| &self.dataset.rows[self.index][i])
    }

    /// Display string of a tracking cell; empty when the column is absent
    pub fn tracking(&self, field: TrackingField) -> String {
        self.dataset
            .tracking_index(field)
            .map(|i| self.dataset.rows[self.index][i].display_string())
            .unwrap_or_default()
    }

    pub fn state(&self) -> String {
        self.tracking(TrackingField::State)
    }

    pub fn notes_filed(&self) -> String {
        self.tracking(TrackingField::NotesFiled)
    }

    pub fn completed_by(&self) -> String {
        self.tracking(TrackingField::CompletedBy)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Processing error
#[derive(Debug, Error)]
pub enum RenewalError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Read error: {0}")]
    Read(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a `RenewalError`, used in logs and reports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    FileNotFound,
    Decryption,
    Schema,
    Read,
    Write,
    Encoding,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "FileNotFoundError",
            ErrorKind::Decryption => "DecryptionError",
            ErrorKind::Schema => "SchemaError",
            ErrorKind::Read => "ReadError",
            ErrorKind::Write => "WriteError",
            ErrorKind::Encoding => "EncodingError",
            ErrorKind::Config => "ConfigError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RenewalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenewalError::FileNotFound(_) => ErrorKind::FileNotFound,
            RenewalError::Decryption(_) => ErrorKind::Decryption,
            RenewalError::MissingColumns(_) | RenewalError::Schema(_) => ErrorKind::Schema,
            RenewalError::Read(_) => ErrorKind::Read,
            RenewalError::Write(_) => ErrorKind::Write,
            RenewalError::Encoding(_) => ErrorKind::Encoding,
            RenewalError::Config(_) => ErrorKind::Config,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
