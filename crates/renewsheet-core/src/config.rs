//! TOML configuration
//!
//! Every section is optional; missing keys fall back to the defaults used by
//! the renewal desk's `Export_RenewalCenter` workbooks.
//!
//! ```toml
//! [schema]
//! required = ["Expiration Date", "Carrier"]
//! sort_by = "Expiration Date"
//!
//! [tracking]
//! completed_by_users = ["Dana", "Lee"]
//!
//! [[states]]
//! name = "Canceled"
//! color = "#808080"
//!
//! [dropdowns]
//! "Notes Filed" = ["Yes", "No", "Left VM", "Sent Email"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::rules::{default_state_rules, StateRule};
use crate::{FormattingRules, RenewalError, SchemaPolicy, TrackingColumns};

/// Top-level configuration file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub input: InputConfig,
    pub schema: SchemaConfig,
    pub tracking: TrackingConfig,
    pub decryption: DecryptionConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub dropdowns: BTreeMap<String, Vec<String>>,
    pub states: Vec<StateRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            schema: SchemaConfig::default(),
            tracking: TrackingConfig::default(),
            decryption: DecryptionConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
            dropdowns: BTreeMap::new(),
            states: default_state_rules(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Sheet to read; the first sheet when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaConfig {
    pub required: Vec<String>,
    pub columns: Vec<String>,
    /// Row sort column; an empty string disables sorting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    pub rename: BTreeMap<String, String>,
}

const EXPORT_COLUMNS: [&str; 9] = [
    "Expiration Date",
    "Insured First Name",
    "Insured Last Name",
    "Carrier",
    "Lines Of Business",
    "Status",
    "Premium",
    "Renewal Premium",
    "Percentage Change",
];

impl Default for SchemaConfig {
    fn default() -> Self {
        let rename: BTreeMap<String, String> = [
            ("Insured First Name", "First Name"),
            ("Insured Last Name", "Last Name"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();
        let columns = EXPORT_COLUMNS
            .iter()
            .map(|name| rename.get(*name).map_or(*name, String::as_str).to_string())
            .collect();
        Self {
            required: EXPORT_COLUMNS.iter().map(ToString::to_string).collect(),
            columns,
            sort_by: Some("Expiration Date".into()),
            rename,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingConfig {
    pub state: String,
    pub notes_filed: String,
    pub completed_by: String,
    /// Users offered in the Completed By dropdown
    pub completed_by_users: Vec<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        let labels = TrackingColumns::default();
        Self {
            state: labels.state,
            notes_filed: labels.notes_filed,
            completed_by: labels.completed_by,
            completed_by_users: Vec::new(),
        }
    }
}

impl TrackingConfig {
    pub fn columns(&self) -> TrackingColumns {
        TrackingColumns {
            state: self.state.clone(),
            notes_filed: self.notes_filed.clone(),
            completed_by: self.completed_by.clone(),
        }
    }
}

/// External tool invoked as `<program> [args..] <source> <destination>`.
/// It receives the password on stdin, never on its command line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecryptionConfig {
    /// Built-in `msoffcrypto` runner when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Where decrypted copies live while being read; system temp when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub sheet_name: String,
    /// Fixed output file stem; the input file stem when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_stem: Option<String>,
    /// chrono format string appended to the stem
    pub timestamp_format: String,
    /// Light-gray fill on alternating uncolored rows
    pub banding: bool,
    /// Conditional formats that recolor rows when a State cell is edited
    pub live_state_formatting: bool,
}

impl Default for OutputConfig {
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

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Persistent log file, appended to on every run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("renewsheet.log")),
        }
    }
}

/// Characters that would move an output file out of its directory
const PATH_SEPARATORS: [char; 3] = ['/', '\\', ':'];

impl Config {
    /// Parse TOML text and validate it
    pub fn from_toml(text: &str) -> Result<Self, RenewalError> {
        let config: Config =
            toml::from_str(text).map_err(|e| RenewalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, RenewalError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RenewalError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String, RenewalError> {
        toml::to_string(self).map_err(|e| RenewalError::Config(e.to_string()))
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), RenewalError> {
        FormattingRules::from_config(self)?;
        let labels = self.tracking.columns();
        let names = [&labels.state, &labels.notes_filed, &labels.completed_by];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(RenewalError::Config(
                "tracking column labels must not be empty".into(),
            ));
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(RenewalError::Config(
                "tracking column labels must be distinct".into(),
            ));
        }
        if self.output.timestamp_format.trim().is_empty() {
            return Err(RenewalError::Config(
                "output.timestamp_format must not be empty".into(),
            ));
        }
        if self.output.timestamp_format.contains(PATH_SEPARATORS) {
            return Err(RenewalError::Config(
                "output.timestamp_format must not produce path separators".into(),
            ));
        }
        if self
            .output
            .file_stem
            .as_deref()
            .is_some_and(|stem| stem.contains(PATH_SEPARATORS))
        {
            return Err(RenewalError::Config(
                "output.file_stem must not contain path separators".into(),
            ));
        }
        if self.output.sheet_name.trim().is_empty() {
            return Err(RenewalError::Config(
                "output.sheet_name must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn schema_policy(&self) -> SchemaPolicy {
        SchemaPolicy {
            required: self.schema.required.clone(),
            rename: self
                .schema
                .rename
                .iter()
                .map(|(from, to)| (from.clone(), to.clone()))
                .collect(),
            columns: self.schema.columns.clone(),
            sort_by: self
                .schema
                .sort_by
                .clone()
                .filter(|column| !column.trim().is_empty()),
        }
    }

    pub fn formatting_rules(&self) -> Result<FormattingRules, RenewalError> {
        FormattingRules::from_config(self)
    }
}
