//! # renewsheet-render
//!
//! Writes augmented renewal datasets as formatted Excel workbooks.
//!
//! This crate provides:
//! - Layout planning (widths, row fills, dropdown ranges) as plain data
//! - Encoding checks that run before anything touches disk
//! - The xlsx writer with state coloring and list validation
//! - Timestamped, atomic output files
//!
//! ## Example
//!
//! ```rust,no_run
//! use renewsheet_core::{augment, Dataset, FormattingRules, TrackingColumns};
//! use renewsheet_render::WorkbookWriter;
//! use std::path::Path;
//!
//! let dataset = augment(
//!     Dataset::new("Export_RenewalCenter", vec!["ID".into()]),
//!     &TrackingColumns::default(),
//! );
//! let path = WorkbookWriter::new().write(
//!     &dataset,
//!     &FormattingRules::default(),
//!     Path::new("out"),
//! )?;
//! println!("wrote {}", path.display());
//! # Ok::<(), renewsheet_core::RenewalError>(())
//! ```

pub mod excel;
pub mod layout;

pub use excel::WorkbookWriter;
pub use layout::{check_encodable, col_to_letter, ColumnValidation, SheetLayout, BANDING_GRAY};
