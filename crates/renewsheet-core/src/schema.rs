//! Schema policy and augmenter
//!
//! `SchemaPolicy` checks that an input sheet carries the columns the renewal
//! desk relies on, then renames, projects and sorts it. `augment` appends the
//! tracking columns.

use tracing::debug;

use crate::{CellValue, Column, ColumnKind, Dataset, RenewalError, TrackingColumns, TrackingField};

/// Column requirements and reshaping applied to a loaded sheet
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaPolicy {
    /// Columns that must exist in the input (names before renaming)
    pub required: Vec<String>,
    /// `(from, to)` header renames, applied when `from` is present
    pub rename: Vec<(String, String)>,
    /// Output column order; empty keeps every column in input order
    pub columns: Vec<String>,
    /// Column to sort rows by (after renaming)
    pub sort_by: Option<String>,
}

impl SchemaPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.push((from.into(), to.into()));
        self
    }

    pub fn project<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn sort_by(mut self, column: impl Into<String>) -> Self {
        self.sort_by = Some(column.into());
        self
    }

    /// Fail with every missing required column at once
    pub fn validate(&self, dataset: &Dataset) -> Result<(), RenewalError> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|name| dataset.column_index(name).is_none())
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RenewalError::MissingColumns(missing))
        }
    }

    /// Validate, rename, project and sort
    pub fn apply(&self, mut dataset: Dataset) -> Result<Dataset, RenewalError> {
        self.validate(&dataset)?;

        for (from, to) in &self.rename {
            let Some(index) = dataset.column_index(from) else {
                debug!(column = %from, "rename source absent, skipping");
                continue;
            };
            if from != to && dataset.column_index(to).is_some() {
                return Err(RenewalError::Schema(format!(
                    "cannot rename '{from}' to '{to}': column already exists"
                )));
            }
            dataset.column_mut(index).name.clone_from(to);
        }

        if !self.columns.is_empty() {
            let mut order = Vec::with_capacity(self.columns.len());
            for name in &self.columns {
                let index = dataset.column_index(name).ok_or_else(|| {
                    RenewalError::Schema(format!("projected column '{name}' not found"))
                })?;
                order.push(index);
            }
            dataset.select_columns(&order);
        }

        if let Some(column) = &self.sort_by {
            let index = dataset.column_index(column).ok_or_else(|| {
                RenewalError::Schema(format!("sort column '{column}' not found"))
            })?;
            dataset.sort_rows_by(index);
        }

        Ok(dataset)
    }
}

/// Append the tracking columns with empty values.
///
/// Columns already carrying a tracking label are tagged rather than
/// duplicated, so augmenting twice is the same as augmenting once.
pub fn augment(mut dataset: Dataset, tracking: &TrackingColumns) -> Dataset {
    let empty = CellValue::Text(String::new());
    for field in TrackingField::ALL {
        let label = tracking.label(field);
        match dataset.column_index(label) {
            Some(index) => dataset.column_mut(index).kind = ColumnKind::Tracking(field),
            None => dataset.push_column(Column::tracking(label, field), &empty),
        }
    }
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn export() -> Dataset {
        let mut dataset = Dataset::new(
            "Export_RenewalCenter",
            vec![
                "Insured First Name".into(),
                "Insured Last Name".into(),
                "Expiration Date".into(),
                "Carrier".into(),
            ],
        );
        let date = |d| {
            CellValue::DateTime(
                NaiveDate::from_ymd_opt(2026, 5, d)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            )
        };
        for (first, last, day) in [("Ana", "Diaz", 20), ("Bo", "Ng", 3), ("Cy", "Ott", 11)] {
            dataset
                .push_row(vec![
                    CellValue::from(first),
                    CellValue::from(last),
                    date(day),
                    CellValue::from("Acme"),
                ])
                .unwrap();
        }
        dataset
    }

    #[test]
    fn validate_reports_all_missing_columns() {
        let policy = SchemaPolicy::new().require(["Carrier", "Premium", "Status"]);
        let err = policy.validate(&export()).unwrap_err();
        match err {
            RenewalError::MissingColumns(missing) => {
                assert_eq!(missing, vec!["Premium", "Status"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn apply_renames_projects_and_sorts() {
        let policy = SchemaPolicy::new()
            .require(["Insured First Name", "Expiration Date"])
            .rename("Insured First Name", "First Name")
            .rename("Insured Last Name", "Last Name")
            .project(["Expiration Date", "First Name", "Last Name"])
            .sort_by("Expiration Date");

        let dataset = policy.apply(export()).unwrap();
        assert_eq!(
            dataset.column_names(),
            vec!["Expiration Date", "First Name", "Last Name"]
        );
        let firsts: Vec<String> = dataset
            .records()
            .map(|r| r.get("First Name").unwrap().display_string())
            .collect();
        assert_eq!(firsts, vec!["Bo", "Cy", "Ana"]);
    }

    #[test]
    fn apply_rejects_unknown_projection() {
        let policy = SchemaPolicy::new().project(["Carrier", "Premium"]);
        let err = policy.apply(export()).unwrap_err();
        assert!(err.to_string().contains("'Premium' not found"));
    }

    #[test]
    fn apply_rejects_rename_collision() {
        let policy = SchemaPolicy::new().rename("Insured First Name", "Carrier");
        assert!(policy.apply(export()).is_err());
    }

    #[test]
    fn rename_of_absent_column_is_skipped() {
        let policy = SchemaPolicy::new().rename("Agent", "Producer");
        let dataset = policy.apply(export()).unwrap();
        assert_eq!(dataset.columns().len(), 4);
    }

    #[test]
    fn augment_appends_three_empty_columns() {
        let dataset = augment(export(), &TrackingColumns::default());
        assert_eq!(
            &dataset.column_names()[4..],
            &["State", "Notes Filed", "Completed By"]
        );
        for record in dataset.records() {
            assert_eq!(record.state(), "");
            assert_eq!(record.notes_filed(), "");
            assert_eq!(record.completed_by(), "");
        }
        assert_eq!(dataset.tracking_index(TrackingField::State), Some(4));
        assert!(dataset.columns()[6].is_tracking());
    }

    #[test]
    fn augment_is_idempotent() {
        let tracking = TrackingColumns::default();
        let once = augment(export(), &tracking);
        let twice = augment(once.clone(), &tracking);
        assert_eq!(once, twice);
    }

    #[test]
    fn augment_keeps_existing_tracking_values() {
        let mut dataset = Dataset::new("t", vec!["ID".into(), "State".into()]);
        dataset
            .push_row(vec![CellValue::from("1"), CellValue::from("Canceled")])
            .unwrap();

        let dataset = augment(dataset, &TrackingColumns::default());
        assert_eq!(
            dataset.column_names(),
            vec!["ID", "State", "Notes Filed", "Completed By"]
        );
        assert_eq!(dataset.record(0).unwrap().state(), "Canceled");
    }
}
