//! State coloring and dropdown rules
//!
//! The rules engine is a lookup table: each state name maps to exactly one
//! background color, and each constrained column maps to an ordered list of
//! allowed values. The writer asks the table; it never branches on state
//! names itself, so adding a state is a one-line change to the table (or to
//! the `[[states]]` section of the configuration file).
//!
//! ```rust
//! use renewsheet_core::{FormattingRules, CANCELED_GRAY};
//!
//! let rules = FormattingRules::default();
//! assert_eq!(rules.color_for("Canceled"), Some(CANCELED_GRAY));
//! assert_eq!(rules.color_for(""), None);
//! assert!(rules.dropdown_options("State").contains(&"Canceled".to_string()));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Config, RenewalError, TrackingColumns};

// ============================================================================
// Colors
// ============================================================================

/// 24-bit RGB background color, written as `#RRGGBB` in configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(u32);

/// Fill for canceled renewals
pub const CANCELED_GRAY: Color = Color::rgb(0x808080);

impl Color {
    pub const fn rgb(value: u32) -> Self {
        Self(value & 0x00FF_FFFF)
    }

    /// Raw `0xRRGGBB` value
    pub const fn value(self) -> u32 {
        self.0
    }

    pub fn hex(self) -> String {
        format!("#{:06X}", self.0)
    }
}

impl FromStr for Color {
    type Err = RenewalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('#');
        if digits.len() != 6 {
            return Err(RenewalError::Config(format!(
                "invalid color '{s}': expected #RRGGBB"
            )));
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RenewalError::Config(format!(
                "invalid color '{s}': not hexadecimal"
            )));
        }
        u32::from_str_radix(digits, 16)
            .map(Color::rgb)
            .map_err(|e| RenewalError::Config(format!("invalid color '{s}': {e}")))
    }
}

impl TryFrom<String> for Color {
    type Error = RenewalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.hex()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

// ============================================================================
// State Table
// ============================================================================

/// One entry of the state enumeration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRule {
    pub name: String,
    pub color: Color,
}

impl StateRule {
    pub fn new(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }
}

/// States used by the renewal desk, in dropdown order
pub fn default_state_rules() -> Vec<StateRule> {
    vec![
        StateRule::new("Renewal Complete", Color::rgb(0x90EE90)),
        StateRule::new("Nowcerts Complete", Color::rgb(0x36BBE9)),
        StateRule::new("Needs Rewritten", Color::rgb(0xEAE455)),
        StateRule::new("Needs Spoke To", Color::rgb(0x9999FF)),
        StateRule::new("Non Renewing", Color::rgb(0xFF6666)),
        StateRule::new("Canceled", CANCELED_GRAY),
    ]
}

// ============================================================================
// Rules Engine
// ============================================================================

/// Lookup tables consumed by the workbook writer
#[derive(Clone, Debug, PartialEq)]
pub struct FormattingRules {
    states: Vec<StateRule>,
    tracking: TrackingColumns,
    completed_by_users: Vec<String>,
    dropdowns: Vec<(String, Vec<String>)>,
}

impl Default for FormattingRules {
    fn default() -> Self {
        Self {
            states: default_state_rules(),
            tracking: TrackingColumns::default(),
            completed_by_users: Vec::new(),
            dropdowns: Vec::new(),
        }
    }
}

impl FormattingRules {
    /// Build rules from a state table. State names must be non-empty and unique.
    pub fn new(states: Vec<StateRule>, tracking: TrackingColumns) -> Result<Self, RenewalError> {
        for (i, rule) in states.iter().enumerate() {
            if rule.name.trim().is_empty() {
                return Err(RenewalError::Config(format!(
                    "state #{} has an empty name",
                    i + 1
                )));
            }
            if states[..i].iter().any(|r| r.name == rule.name) {
                return Err(RenewalError::Config(format!(
                    "state '{}' is listed more than once",
                    rule.name
                )));
            }
        }
        Ok(Self {
            states,
            tracking,
            completed_by_users: Vec::new(),
            dropdowns: Vec::new(),
        })
    }

    /// Rules described by a configuration file
    pub fn from_config(config: &Config) -> Result<Self, RenewalError> {
        let mut rules = Self::new(config.states.clone(), config.tracking.columns())?
            .with_completed_by_users(config.tracking.completed_by_users.clone());
        for (column, options) in &config.dropdowns {
            rules = rules.with_dropdown(column.clone(), options.clone());
        }
        Ok(rules)
    }

    /// Set the users offered in the Completed By dropdown
    pub fn with_completed_by_users(mut self, users: Vec<String>) -> Self {
        self.completed_by_users = users;
        self
    }

    /// Constrain an additional column to a fixed list
    pub fn with_dropdown(mut self, column: impl Into<String>, options: Vec<String>) -> Self {
        let column = column.into();
        self.dropdowns.retain(|(name, _)| *name != column);
        self.dropdowns.push((column, options));
        self
    }

    pub fn states(&self) -> &[StateRule] {
        &self.states
    }

    pub fn tracking(&self) -> &TrackingColumns {
        &self.tracking
    }

    /// Background color for a state value; `None` means default fill
    pub fn color_for(&self, state: &str) -> Option<Color> {
        self.states
            .iter()
            .find(|rule| rule.name == state)
            .map(|rule| rule.color)
    }

    /// Allowed values for a column, empty when the column is unconstrained
    pub fn dropdown_options(&self, column: &str) -> Vec<String> {
        if column == self.tracking.state {
            return self.states.iter().map(|rule| rule.name.clone()).collect();
        }
        if column == self.tracking.completed_by {
            return self.completed_by_users.clone();
        }
        self.dropdowns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, options)| options.clone())
            .unwrap_or_default()
    }
}
