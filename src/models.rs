//! Row types shared by every pipeline stage.

use serde::{Deserialize, Serialize};

/// Experiment arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Group {
    A,
    B,
}

impl Group {
    pub const ALL: [Group; 2] = [Group::A, Group::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            Group::A => "A",
            Group::B => "B",
        }
    }

    /// Parse a raw group label. Labels are trimmed and case-insensitive.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "A" | "a" => Some(Group::A),
            "B" | "b" => Some(Group::B),
            _ => None,
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's assignment to an experiment arm
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupAssignment {
    pub user_id: String,
    pub group: Group,
}

impl GroupAssignment {
    pub fn new(user_id: impl Into<String>, group: Group) -> Self {
        Self {
            user_id: user_id.into(),
            group,
        }
    }
}

/// A user seen on the platform during the experiment window
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveUser {
    pub user_id: String,
}

impl ActiveUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// A single payment. `revenue` is `None` when the source cell was empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub user_id: String,
    pub revenue: Option<f64>,
}

impl PaymentEvent {
    pub fn new(user_id: impl Into<String>, revenue: f64) -> Self {
        Self {
            user_id: user_id.into(),
            revenue: Some(revenue),
        }
    }
}

/// One row of the assembled experiment record: an active user paired with
/// one of their payments, or with no payment at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub user_id: String,
    pub group: Option<Group>,
    pub revenue: f64,
    /// 1 iff `revenue > 0`
    pub converted: u8,
}

impl ExperimentRecord {
    pub fn new(user_id: impl Into<String>, group: Option<Group>, revenue: Option<f64>) -> Self {
        let revenue = revenue.unwrap_or(0.0);
        Self {
            user_id: user_id.into(),
            group,
            revenue,
            converted: u8::from(revenue > 0.0),
        }
    }
}

/// Aggregated outcome metrics for one experiment arm.
///
/// Rates are `None` when their denominator is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    pub group: Group,
    /// Users without any converting row
    pub converted_0_count: usize,
    /// Users with at least one converting row
    pub converted_1_count: usize,
    pub total_conversions: usize,
    pub conversion_rate: Option<f64>,
    pub total_revenue: f64,
    pub user_count: usize,
    pub paying_user_count: usize,
    pub arpau: Option<f64>,
    pub arppu: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_parse() {
        assert_eq!(Group::parse("A"), Some(Group::A));
        assert_eq!(Group::parse(" b "), Some(Group::B));
        assert_eq!(Group::parse("C"), None);
        assert_eq!(Group::parse(""), None);
    }

    #[test]
    fn test_record_conversion_flag() {
        assert_eq!(ExperimentRecord::new("1", Some(Group::A), Some(290.0)).converted, 1);
        assert_eq!(ExperimentRecord::new("1", Some(Group::A), None).converted, 0);

        let zero = ExperimentRecord::new("1", None, Some(0.0));
        assert_eq!(zero.converted, 0);
        assert_eq!(zero.revenue, 0.0);
    }
}
