//! calamine cell conversion
//!
//! Turns one calamine worksheet range into a `Dataset`: the first row is the
//! header, every following row is a record.

use calamine::{open_workbook_auto, Data, Range, Reader, XlsError};
use chrono::{NaiveDate, NaiveDateTime};
use std::path::Path;
use tracing::debug;

use renewsheet_core::{CellValue, Column, Dataset, RenewalError};

/// Read one sheet (or the first sheet) of a workbook on disk
pub fn read_sheet(path: &Path, sheet: Option<&str>, name: &str) -> Result<Dataset, RenewalError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| open_error(path, e))?;

    let sheet_names = workbook.sheet_names();
    let sheet_name = match sheet {
        Some(wanted) => sheet_names
            .iter()
            .find(|s| s.as_str() == wanted)
            .cloned()
            .ok_or_else(|| {
                RenewalError::Schema(format!(
                    "sheet '{wanted}' not found (available: {})",
                    sheet_names.join(", ")
                ))
            })?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| RenewalError::Schema("workbook contains no sheets".into()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| RenewalError::Read(format!("cannot read sheet '{sheet_name}': {e}")))?;

    debug!(sheet = %sheet_name, size = ?range.get_size(), "read worksheet range");
    range_to_dataset(&range, name)
}

/// A protected legacy workbook is a decryption failure, anything else a read failure
fn open_error(path: &Path, error: calamine::Error) -> RenewalError {
    match error {
        calamine::Error::Xls(XlsError::Password) => RenewalError::Decryption(format!(
            "{} is password protected; supply a password",
            path.display()
        )),
        other => RenewalError::Read(format!("cannot open {}: {other}", path.display())),
    }
}

/// Build a dataset from a header row plus data rows
pub fn range_to_dataset(range: &Range<Data>, name: &str) -> Result<Dataset, RenewalError> {
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| RenewalError::Schema("sheet has no header row".into()))?;

    let columns: Vec<Column> = header
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let label = convert(cell).display_string().trim().to_string();
            if label.is_empty() {
                Column::source(format!("Column {}", i + 1))
            } else {
                Column::source(label)
            }
        })
        .collect();

    let mut records: Vec<Vec<CellValue>> = rows
        .map(|row| {
            let mut cells: Vec<CellValue> = row.iter().map(convert).collect();
            cells.resize(columns.len(), CellValue::Empty);
            cells
        })
        .collect();

    while records
        .last()
        .is_some_and(|row| row.iter().all(CellValue::is_empty))
    {
        records.pop();
    }

    Dataset::from_parts(name, columns, records)
}

/// Map a calamine cell onto the dataset's primitives
pub fn convert(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map_or(CellValue::Number(dt.as_f64()), CellValue::DateTime),
        Data::DateTimeIso(s) => parse_iso(s).map_or_else(|| CellValue::Text(s.clone()), CellValue::DateTime),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
        #[allow(unreachable_patterns)]
        other => CellValue::Text(other.to_string()),
    }
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
