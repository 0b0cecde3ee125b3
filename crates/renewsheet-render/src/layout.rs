//! Sheet layout planning
//!
//! Everything the writer decides about presentation is computed here first,
//! as plain data: column widths, per-row fills, centered columns and
//! dropdown ranges. `excel` then only translates the plan into
//! rust_xlsxwriter calls.

use chrono::Datelike;
use renewsheet_core::{CellValue, Color, ColumnKind, Dataset, FormattingRules, RenewalError, TrackingField};

/// Alternating fill for uncolored rows when banding is enabled
pub const BANDING_GRAY: Color = Color::rgb(0xF0F0F0);

/// Header row background
pub const HEADER_BLUE: Color = Color::rgb(0x368BE9);

/// Longest string a cell can hold
pub const MAX_TEXT_LEN: usize = 32_767;

/// Data rows available below the header row
pub const MAX_DATA_ROWS: usize = 1_048_575;

pub const MAX_COLUMNS: usize = 16_384;

const TRACKING_WIDTH: f64 = 16.0;
const NOTES_WIDTH: f64 = 50.0;
const MAX_AUTO_WIDTH: f64 = 60.0;

/// List validation over the data rows of one column
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnValidation {
    pub column: usize,
    pub options: Vec<String>,
}

/// Presentation decisions for one output sheet
#[derive(Clone, Debug, PartialEq)]
pub struct SheetLayout {
    pub widths: Vec<f64>,
    pub centered: Vec<bool>,
    /// Static background per data row; `None` keeps the default
    pub row_fills: Vec<Option<Color>>,
    /// Data rows whose static fill comes from their State value
    pub state_filled_rows: Vec<usize>,
    pub validations: Vec<ColumnValidation>,
    pub state_column: Option<usize>,
}

impl SheetLayout {
    pub fn plan(dataset: &Dataset, rules: &FormattingRules, banding: bool) -> Self {
        let widths = dataset
            .columns()
            .iter()
            .enumerate()
            .map(|(i, column)| match column.kind {
                ColumnKind::Tracking(_) => TRACKING_WIDTH,
                ColumnKind::Source if column.name == "Notes" => NOTES_WIDTH,
                ColumnKind::Source => {
                    let longest = dataset
                        .rows()
                        .iter()
                        .map(|row| row[i].display_string().chars().count())
                        .chain(std::iter::once(column.name.chars().count()))
                        .max()
                        .unwrap_or(0);
                    (longest as f64).min(MAX_AUTO_WIDTH)
                }
            })
            .collect();

        let centered = dataset
            .columns()
            .iter()
            .map(|c| c.kind == ColumnKind::Tracking(TrackingField::NotesFiled))
            .collect();

        let state_fills: Vec<Option<Color>> = dataset
            .records()
            .map(|record| rules.color_for(&record.state()))
            .collect();
        let state_filled_rows = state_fills
            .iter()
            .enumerate()
            .filter_map(|(r, fill)| fill.map(|_| r))
            .collect();
        let row_fills = state_fills
            .into_iter()
            .enumerate()
            .map(|(r, fill)| fill.or_else(|| (banding && r % 2 == 0).then_some(BANDING_GRAY)))
            .collect();

        let validations = dataset
            .columns()
            .iter()
            .enumerate()
            .filter_map(|(column, c)| {
                let options = rules.dropdown_options(&c.name);
                (!options.is_empty()).then_some(ColumnValidation { column, options })
            })
            .collect();

        Self {
            widths,
            centered,
            row_fills,
            state_filled_rows,
            validations,
            state_column: dataset.tracking_index(TrackingField::State),
        }
    }
}

/// Convert a zero-based column number to letters (0 -> A, 25 -> Z, 26 -> AA)
pub fn col_to_letter(col: u16) -> String {
    let mut result = String::new();
    let mut n = u32::from(col);
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

fn cell_ref(row: usize, col: usize) -> String {
    format!("{}{}", col_to_letter(col as u16), row + 1)
}

/// Reject anything the xlsx format cannot hold, before a byte is written
pub fn check_encodable(dataset: &Dataset) -> Result<(), RenewalError> {
    if dataset.columns().len() > MAX_COLUMNS {
        return Err(RenewalError::Encoding(format!(
            "{} columns exceed the sheet limit of {MAX_COLUMNS}",
            dataset.columns().len()
        )));
    }
    if dataset.row_count() > MAX_DATA_ROWS {
        return Err(RenewalError::Encoding(format!(
            "{} rows exceed the sheet limit of {MAX_DATA_ROWS}",
            dataset.row_count()
        )));
    }
    for (col, column) in dataset.columns().iter().enumerate() {
        if column.name.chars().count() > MAX_TEXT_LEN {
            return Err(RenewalError::Encoding(format!(
                "header {} is longer than {MAX_TEXT_LEN} characters",
                cell_ref(0, col)
            )));
        }
    }
    for (r, row) in dataset.rows().iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            let problem = match cell {
                CellValue::Text(s) if s.chars().count() > MAX_TEXT_LEN => {
                    Some(format!("text longer than {MAX_TEXT_LEN} characters"))
                }
                CellValue::Number(n) if !n.is_finite() => Some(format!("non-finite number {n}")),
                CellValue::DateTime(dt) if !(1900..=9999).contains(&dt.year()) => {
                    Some(format!("date {dt} outside 1900-9999"))
                }
                _ => None,
            };
            if let Some(problem) = problem {
                return Err(RenewalError::Encoding(format!(
                    "cell {}: {problem}",
                    cell_ref(r + 1, col)
                )));
            }
        }
    }
    Ok(())
}
