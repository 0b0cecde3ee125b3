//! Excel renewal tracker writer
//!
//! Produces one worksheet holding every source column plus the tracking
//! columns, with:
//! - A bold blue header row, frozen
//! - Static row fills from the state color table (and optional banding)
//! - Formula conditional formats, one per state, so that picking a State in
//!   Excel recolors the row immediately
//! - List validation on every column that has dropdown options
//!
//! ## Example Output Structure
//!
//! ```text
//! Sheet: Renewals
//! | ID      | DueDate    | State    | Notes Filed | Completed By |
//! |---------|------------|----------|-------------|--------------|
//! | POL-100 | 2026-07-01 | Canceled |             |              |   <- #808080 fill
//! | POL-200 | 2026-07-09 |          |             |              |
//! ```
//!
//! Static fills are fixed at write time while the conditional formats follow
//! the State cell. A row written with a state color therefore also gets a
//! "cleared State" rule that paints it white once its State is emptied in
//! Excel; otherwise the old color would stay visible. With
//! `static_fills_only` no rule is written and fills never change after export.
//!
//! Files are named `<stem>_<YYYYMMDD_HHMMSS>.xlsx` and written atomically: the
//! bytes go to a temporary file in the output directory, which is renamed
//! onto the final name once complete.

use chrono::{Local, NaiveDateTime};
use rust_xlsxwriter::{
    ConditionalFormatFormula, DataValidation, Format, FormatAlign, Workbook, Worksheet,
};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use renewsheet_core::config::OutputConfig;
use renewsheet_core::{CellValue, Color, Dataset, FormattingRules, RenewalError};

use crate::layout::{check_encodable, col_to_letter, SheetLayout, HEADER_BLUE};

/// Workbook writer configuration
#[derive(Clone, Debug)]
pub struct WorkbookWriter {
    /// Worksheet name
    pub sheet_name: String,
    /// Fixed file stem; the dataset name when unset
    pub file_stem: Option<String>,
    /// chrono format for the file name timestamp
    pub timestamp_format: String,
    /// Light-gray fill on every other uncolored row
    pub banding: bool,
    /// Emit per-state conditional formats
    pub live_state_formatting: bool,
}

impl Default for WorkbookWriter {
    fn default() -> Self {
        Self {
            sheet_name: "Renewals".into(),
            file_stem: None,
            timestamp_format: "%Y%m%d_%H%M%S".into(),
            banding: false,
            live_state_formatting: true,
        }
    }
}

impl WorkbookWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(output: &OutputConfig) -> Self {
        Self {
            sheet_name: output.sheet_name.clone(),
            file_stem: output.file_stem.clone(),
            timestamp_format: output.timestamp_format.clone(),
            banding: output.banding,
            live_state_formatting: output.live_state_formatting,
        }
    }

    /// Set worksheet name
    pub fn sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    /// Use a fixed file stem instead of the dataset name
    pub fn file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = Some(stem.into());
        self
    }

    /// Shade every other uncolored row
    pub fn with_banding(mut self) -> Self {
        self.banding = true;
        self
    }

    /// Static fills only, no conditional formats
    pub fn static_fills_only(mut self) -> Self {
        self.live_state_formatting = false;
        self
    }

    /// `<stem>_<timestamp>.xlsx`
    pub fn output_file_name(
        &self,
        dataset_name: &str,
        at: NaiveDateTime,
    ) -> Result<String, RenewalError> {
        let stem = self.file_stem.as_deref().unwrap_or(dataset_name);
        let mut name = format!("{stem}_");
        write!(name, "{}", at.format(&self.timestamp_format)).map_err(|_| {
            RenewalError::Config(format!(
                "invalid timestamp format '{}'",
                self.timestamp_format
            ))
        })?;
        // The timestamp is formatted text too and must not leave output_dir
        let mut name: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        name.push_str(".xlsx");
        Ok(name)
    }

    /// Write into `output_dir`, stamped with the current local time
    pub fn write(
        &self,
        dataset: &Dataset,
        rules: &FormattingRules,
        output_dir: &Path,
    ) -> Result<PathBuf, RenewalError> {
        self.write_at(dataset, rules, output_dir, Local::now().naive_local())
    }

    /// Write into `output_dir` with an explicit timestamp
    pub fn write_at(
        &self,
        dataset: &Dataset,
        rules: &FormattingRules,
        output_dir: &Path,
        at: NaiveDateTime,
    ) -> Result<PathBuf, RenewalError> {
        if !output_dir.is_dir() {
            return Err(RenewalError::Write(format!(
                "output directory {} does not exist",
                output_dir.display()
            )));
        }
        let file_name = self.output_file_name(dataset.name(), at)?;
        let bytes = self.render_to_bytes(dataset, rules)?;
        let target = output_dir.join(file_name);

        let mut staged = tempfile::Builder::new()
            .prefix(".renewsheet-")
            .suffix(".part")
            .tempfile_in(output_dir)
            .map_err(|e| {
                RenewalError::Write(format!("cannot create file in {}: {e}", output_dir.display()))
            })?;
        staged
            .write_all(&bytes)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|e| RenewalError::Write(format!("cannot write workbook: {e}")))?;
        staged.persist(&target).map_err(|e| {
            RenewalError::Write(format!("cannot create {}: {}", target.display(), e.error))
        })?;

        info!(path = %target.display(), rows = dataset.row_count(), "wrote workbook");
        Ok(target)
    }

    /// Generate workbook bytes
    pub fn render_to_bytes(
        &self,
        dataset: &Dataset,
        rules: &FormattingRules,
    ) -> Result<Vec<u8>, RenewalError> {
        check_encodable(dataset)?;
        let layout = SheetLayout::plan(dataset, rules, self.banding);

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(&self.sheet_name).map_err(format_err)?;

        self.write_header(sheet, dataset, &layout)?;
        self.write_rows(sheet, dataset, &layout)?;
        if !dataset.is_empty() {
            self.add_validations(sheet, dataset, &layout)?;
            if self.live_state_formatting {
                self.add_state_formats(sheet, dataset, rules, &layout)?;
            }
        }
        sheet.set_freeze_panes(1, 0).map_err(format_err)?;

        workbook
            .save_to_buffer()
            .map_err(|e| RenewalError::Encoding(format!("failed to create Excel: {e}")))
    }

    fn write_header(
        &self,
        sheet: &mut Worksheet,
        dataset: &Dataset,
        layout: &SheetLayout,
    ) -> Result<(), RenewalError> {
        let header = Format::new()
            .set_bold()
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_font_color(0xFFFFFF)
            .set_background_color(HEADER_BLUE.value());

        for (col, column) in dataset.columns().iter().enumerate() {
            let col = col as u16;
            sheet
                .write_string_with_format(0, col, &column.name, &header)
                .map_err(format_err)?;
            sheet
                .set_column_width(col, layout.widths[usize::from(col)])
                .ok();
        }
        Ok(())
    }

    fn write_rows(
        &self,
        sheet: &mut Worksheet,
        dataset: &Dataset,
        layout: &SheetLayout,
    ) -> Result<(), RenewalError> {
        let mut formats = CellFormats::default();

        for (r, row) in dataset.rows().iter().enumerate() {
            let excel_row = (r + 1) as u32;
            let fill = layout.row_fills[r];
            for (c, cell) in row.iter().enumerate() {
                let col = c as u16;
                let centered = layout.centered[c];
                let result = match cell {
                    _ if cell.is_empty() && fill.is_none() && !centered => Ok(()),
                    CellValue::Empty => {
                        let format = formats.get(fill, centered, None);
                        sheet.write_blank(excel_row, col, format).map(|_| ())
                    }
                    CellValue::Text(s) if s.is_empty() => {
                        let format = formats.get(fill, centered, None);
                        sheet.write_blank(excel_row, col, format).map(|_| ())
                    }
                    CellValue::Text(s) => {
                        let format = formats.get(fill, centered, None);
                        sheet
                            .write_string_with_format(excel_row, col, s, format)
                            .map(|_| ())
                    }
                    CellValue::Number(n) => {
                        let format = formats.get(fill, centered, None);
                        sheet
                            .write_number_with_format(excel_row, col, *n, format)
                            .map(|_| ())
                    }
                    CellValue::Bool(b) => {
                        let format = formats.get(fill, centered, None);
                        sheet
                            .write_boolean_with_format(excel_row, col, *b, format)
                            .map(|_| ())
                    }
                    CellValue::DateTime(dt) => {
                        let num_format = if dt.time() == chrono::NaiveTime::MIN {
                            "yyyy-mm-dd"
                        } else {
                            "yyyy-mm-dd hh:mm:ss"
                        };
                        let format = formats.get(fill, centered, Some(num_format));
                        sheet
                            .write_datetime_with_format(excel_row, col, dt, format)
                            .map(|_| ())
                    }
                };
                result.map_err(|e| {
                    RenewalError::Encoding(format!(
                        "cell {}{}: {e}",
                        col_to_letter(col),
                        excel_row + 1
                    ))
                })?;
            }
        }
        Ok(())
    }

    fn add_validations(
        &self,
        sheet: &mut Worksheet,
        dataset: &Dataset,
        layout: &SheetLayout,
    ) -> Result<(), RenewalError> {
        let last_row = dataset.row_count() as u32;
        for validation in &layout.validations {
            let col = validation.column as u16;
            let column_name = &dataset.columns()[validation.column].name;
            let rule = DataValidation::new()
                .allow_list_strings(validation.options.as_slice())
                .map_err(|e| {
                    RenewalError::Encoding(format!("dropdown for '{column_name}': {e}"))
                })?;
            sheet
                .add_data_validation(1, col, last_row, col, &rule)
                .map_err(format_err)?;
            debug!(column = %column_name, options = validation.options.len(), "added dropdown");
        }
        Ok(())
    }

    fn add_state_formats(
        &self,
        sheet: &mut Worksheet,
        dataset: &Dataset,
        rules: &FormattingRules,
        layout: &SheetLayout,
    ) -> Result<(), RenewalError> {
        let Some(state_col) = layout.state_column else {
            return Ok(());
        };
        let last_row = dataset.row_count() as u32;
        let last_col = (dataset.columns().len() - 1) as u16;
        let state_letter = col_to_letter(state_col as u16);

        for rule in rules.states() {
            let criteria = format!(
                "=${state_letter}2=\"{}\"",
                rule.name.replace('"', "\"\"")
            );
            let conditional_format = ConditionalFormatFormula::new()
                .set_rule(criteria.as_str())
                .set_format(Format::new().set_background_color(rule.color.value()));
            sheet
                .add_conditional_format(1, 0, last_row, last_col, &conditional_format)
                .map_err(format_err)?;
        }

        let Some(&first) = layout.state_filled_rows.first() else {
            return Ok(());
        };
        let last_letter = col_to_letter(last_col);
        let ranges: Vec<String> = row_spans(&layout.state_filled_rows)
            .into_iter()
            .map(|(top, bottom)| format!("A{}:{last_letter}{}", top + 2, bottom + 2))
            .collect();
        let first_row = (first + 1) as u32;
        let criteria = format!("=${state_letter}{}=\"\"", first_row + 1);
        let cleared = ConditionalFormatFormula::new()
            .set_rule(criteria.as_str())
            .set_multi_range(ranges.join(" "))
            .set_format(Format::new().set_background_color(CLEARED_FILL));
        sheet
            .add_conditional_format(first_row, 0, first_row, last_col, &cleared)
            .map_err(format_err)?;
        debug!(rows = layout.state_filled_rows.len(), "added cleared-state rule");
        Ok(())
    }
}

/// Background for a row whose State was emptied after export
const CLEARED_FILL: u32 = 0xFFFFFF;

/// Collapse sorted row indexes into inclusive `(top, bottom)` runs
fn row_spans(rows: &[usize]) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    for &row in rows {
        match spans.last_mut() {
            Some((_, bottom)) if *bottom + 1 == row => *bottom = row,
            _ => spans.push((row, row)),
        }
    }
    spans
}

fn format_err(e: rust_xlsxwriter::XlsxError) -> RenewalError {
    RenewalError::Encoding(e.to_string())
}

/// Cell formats keyed by fill, alignment and number format
#[derive(Default)]
struct CellFormats {
    cache: HashMap<(Option<u32>, bool, Option<&'static str>), Format>,
}

impl CellFormats {
    fn get(
        &mut self,
        fill: Option<Color>,
        centered: bool,
        num_format: Option<&'static str>,
    ) -> &Format {
        self.cache
            .entry((fill.map(Color::value), centered, num_format))
            .or_insert_with(|| {
                let mut format = Format::new();
                if let Some(color) = fill {
                    format = format.set_background_color(color.value());
                }
                if centered {
                    format = format.set_align(FormatAlign::Center);
                }
                if let Some(num_format) = num_format {
                    format = format.set_num_format(num_format);
                }
                format
            })
    }
}
