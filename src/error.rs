//! Error taxonomy for the experiment pipeline.

use crate::models::Group;

/// Errors surfaced by loading, decoding, and consolidating experiment data.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsError {
    /// A table does not have the column shape its layout declares.
    SchemaMismatch {
        table: String,
        expected: usize,
        found: usize,
    },
    /// A cell could not be interpreted (unknown group label, non-numeric revenue).
    InvalidField {
        table: String,
        row: usize,
        column: usize,
        value: String,
    },
    /// No users survived the active-user join for a group.
    EmptyPopulation { group: Option<Group> },
    /// A per-user average has a zero denominator.
    ZeroDenominator { group: Group, metric: &'static str },
    /// A user maps to more than one group after reconciliation.
    AmbiguousIdentity { user_id: String, groups: Vec<Group> },
    /// Neither the remote share nor the local fallback could be read.
    ResourceUnavailable { source_name: String, reason: String },
    /// Malformed delimited text.
    Parse { table: String, reason: String },
}

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SchemaMismatch {
                table,
                expected,
                found,
            } => write!(
                f,
                "schema mismatch in '{}': expected {} columns, found {}",
                table, expected, found
            ),
            Self::InvalidField {
                table,
                row,
                column,
                value,
            } => write!(
                f,
                "invalid value '{}' in '{}' at row {}, column {}",
                value, table, row, column
            ),
            Self::EmptyPopulation { group: Some(group) } => {
                write!(f, "group {} has no active users", group)
            }
            Self::EmptyPopulation { group: None } => {
                write!(f, "no assigned active users in any group")
            }
            Self::ZeroDenominator { group, metric } => {
                write!(f, "{} is undefined for group {}: zero denominator", metric, group)
            }
            Self::AmbiguousIdentity { user_id, groups } => {
                let labels: Vec<&str> = groups.iter().map(|g| g.as_str()).collect();
                write!(
                    f,
                    "user '{}' is assigned to multiple groups: {}",
                    user_id,
                    labels.join(", ")
                )
            }
            Self::ResourceUnavailable {
                source_name,
                reason,
            } => write!(f, "resource '{}' unavailable: {}", source_name, reason),
            Self::Parse { table, reason } => write!(f, "failed to parse '{}': {}", table, reason),
        }
    }
}

impl std::error::Error for MetricsError {}

pub type Result<T> = std::result::Result<T, MetricsError>;
