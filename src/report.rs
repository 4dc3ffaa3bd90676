//! Run report and descriptive A/B comparison.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Group, GroupMetrics};
use crate::reconcile::AmbiguousIdentity;

/// Row counts observed at each pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageCounts {
    pub primary_assignments: usize,
    pub supplemental_assignments: usize,
    pub reconciled_assignments: usize,
    pub active_users: usize,
    pub payments: usize,
    pub records: usize,
    /// Active users with no group assignment
    pub unassigned_active_users: usize,
}

/// Relative change of the treatment arm (B) over the control arm (A).
///
/// Each field is `(treatment - control) / control`, or `None` when either
/// side is undefined or the control value is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Uplift {
    pub conversion_rate: Option<f64>,
    pub arpau: Option<f64>,
    pub arppu: Option<f64>,
}

impl Uplift {
    pub fn between(control: &GroupMetrics, treatment: &GroupMetrics) -> Self {
        Self {
            conversion_rate: relative_change(control.conversion_rate, treatment.conversion_rate),
            arpau: relative_change(control.arpau, treatment.arpau),
            arppu: relative_change(control.arppu, treatment.arppu),
        }
    }
}

fn relative_change(control: Option<f64>, treatment: Option<f64>) -> Option<f64> {
    match (control, treatment) {
        (Some(c), Some(t)) if c != 0.0 => Some((t - c) / c),
        _ => None,
    }
}

/// Everything one run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub generated_at: DateTime<Utc>,
    pub counts: StageCounts,
    pub ambiguous_identities: Vec<AmbiguousIdentity>,
    pub metrics: Vec<GroupMetrics>,
    pub uplift: Option<Uplift>,
}

impl PipelineReport {
    pub fn new(
        counts: StageCounts,
        ambiguous_identities: Vec<AmbiguousIdentity>,
        metrics: Vec<GroupMetrics>,
    ) -> Self {
        let control = metrics.iter().find(|m| m.group == Group::A);
        let treatment = metrics.iter().find(|m| m.group == Group::B);
        let uplift = match (control, treatment) {
            (Some(c), Some(t)) => Some(Uplift::between(c, t)),
            _ => None,
        };

        Self {
            generated_at: Utc::now(),
            counts,
            ambiguous_identities,
            metrics,
            uplift,
        }
    }

    pub fn group(&self, group: Group) -> Option<&GroupMetrics> {
        self.metrics.iter().find(|m| m.group == group)
    }

    /// Total revenue across both arms
    pub fn total_revenue(&self) -> f64 {
        self.metrics.iter().map(|m| m.total_revenue).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(group: Group, rate: f64, arpau: f64, arppu: Option<f64>) -> GroupMetrics {
        GroupMetrics {
            group,
            converted_0_count: 0,
            converted_1_count: 0,
            total_conversions: 0,
            conversion_rate: Some(rate),
            total_revenue: 0.0,
            user_count: 0,
            paying_user_count: 0,
            arpau: Some(arpau),
            arppu,
        }
    }

    #[test]
    fn test_uplift() {
        let a = metrics(Group::A, 0.05, 50.0, Some(1000.0));
        let b = metrics(Group::B, 0.04, 60.0, None);

        let uplift = Uplift::between(&a, &b);
        assert!((uplift.conversion_rate.unwrap() + 0.2).abs() < 1e-9);
        assert!((uplift.arpau.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(uplift.arppu, None);
    }

    #[test]
    fn test_zero_control_has_no_uplift() {
        let a = metrics(Group::A, 0.0, 0.0, None);
        let b = metrics(Group::B, 0.1, 10.0, Some(100.0));
        let uplift = Uplift::between(&a, &b);
        assert_eq!(uplift.conversion_rate, None);
        assert_eq!(uplift.arpau, None);
    }

    #[test]
    fn test_report_without_treatment_has_no_uplift() {
        let report = PipelineReport::new(
            StageCounts::default(),
            Vec::new(),
            vec![metrics(Group::A, 0.5, 1.0, Some(2.0))],
        );
        assert!(report.uplift.is_none());
        assert!(report.group(Group::A).is_some());
        assert!(report.group(Group::B).is_none());
    }
}
