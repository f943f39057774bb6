//! Error monitoring domain types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pagination::FilterScope;
use crate::stability::{
    DEFAULT_CRITICAL_STABILITY, DEFAULT_TARGET_STABILITY, StabilityTargetType, StabilityTargets,
};

/// Event fields that are never offered as filters.
///
/// `search` is a free-text aggregate over several fields, not a structured
/// field, and the list endpoints reject it as a filter.
pub const EXCLUDED_FILTER_FIELDS: &[&str] = &["search"];

/// Organization the credential belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization id
    pub id: String,
    /// Display name
    pub name: String,
    /// URL slug
    #[serde(default)]
    pub slug: Option<String>,
}

/// `{ "value": 0.995 }` threshold wrapper
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityThreshold {
    /// Threshold (0-1)
    pub value: f64,
}

/// A project within the organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Project id
    pub id: String,
    /// Display name
    pub name: String,
    /// URL slug
    #[serde(default)]
    pub slug: Option<String>,
    /// Notifier API key; matched against the configured fixed-project key
    #[serde(default)]
    pub api_key: Option<String>,
    /// Ratio the stability thresholds apply to
    #[serde(default)]
    pub stability_target_type: StabilityTargetType,
    /// Target stability
    #[serde(default)]
    pub target_stability: Option<StabilityThreshold>,
    /// Critical stability
    #[serde(default)]
    pub critical_stability: Option<StabilityThreshold>,
    /// Everything else the backend returned
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Project {
    /// Stability thresholds, with defaults for missing values
    #[must_use]
    pub fn stability_targets(&self) -> StabilityTargets {
        StabilityTargets {
            target_type: self.stability_target_type,
            target: self
                .target_stability
                .map_or(DEFAULT_TARGET_STABILITY, |t| t.value),
            critical: self
                .critical_stability
                .map_or(DEFAULT_CRITICAL_STABILITY, |t| t.value),
        }
    }
}

/// A project event field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventField {
    /// Field identifier used in filters (e.g. `error.status`)
    pub display_id: String,
    /// Whether this is a custom metadata field
    #[serde(default)]
    pub custom: bool,
    /// Filtering options (match types, values)
    #[serde(default)]
    pub filter_options: Value,
    /// Pivot options
    #[serde(default)]
    pub pivot_options: Value,
}

impl EventField {
    /// Field with only an identifier
    pub fn named(display_id: impl Into<String>) -> Self {
        Self {
            display_id: display_id.into(),
            custom: false,
            filter_options: Value::Null,
            pivot_options: Value::Null,
        }
    }
}

/// The filterable fields of one project
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldSet {
    fields: Vec<EventField>,
}

impl FieldSet {
    /// Build from the backend's field list, dropping excluded fields
    #[must_use]
    pub fn from_fields(fields: Vec<EventField>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .filter(|f| !EXCLUDED_FILTER_FIELDS.contains(&f.display_id.as_str()))
                .collect(),
        }
    }

    /// Whether `display_id` is filterable
    #[must_use]
    pub fn contains(&self, display_id: &str) -> bool {
        self.fields.iter().any(|f| f.display_id == display_id)
    }

    /// The fields
    #[must_use]
    pub fn fields(&self) -> &[EventField] {
        &self.fields
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FilterScope for FieldSet {
    fn allows(&self, key: &str) -> bool {
        self.contains(key)
    }
}

/// Workflow operation on an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOperation {
    /// Reopen
    Open,
    /// Mark fixed
    Fix,
    /// Ignore
    Ignore,
    /// Snooze
    Snooze,
    /// Replace the severity
    OverrideSeverity,
}

impl ErrorOperation {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Fix => "fix",
            Self::Ignore => "ignore",
            Self::Snooze => "snooze",
            Self::OverrideSeverity => "override_severity",
        }
    }

    /// Status the error has once the operation is applied
    #[must_use]
    pub fn resulting_status(self) -> Option<&'static str> {
        match self {
            Self::Open => Some("open"),
            Self::Fix => Some("fixed"),
            Self::Ignore => Some("ignored"),
            Self::Snooze => Some("snoozed"),
            Self::OverrideSeverity => None,
        }
    }
}

/// Error severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Error
    Error,
    /// Warning
    Warning,
    /// Info
    Info,
}

impl Severity {
    /// All severities, in prompt order
    pub const ALL: [Severity; 3] = [Self::Error, Self::Warning, Self::Info];

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}
