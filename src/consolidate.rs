//! Group-level aggregation of the assembled experiment record.
//!
//! Conversion is decided per user: a user's `converted` flags are summed
//! and the user is a converter iff the sum is positive. Users with several
//! converting purchases therefore count once. Revenue, by contrast, is
//! summed over every record row.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MetricsError, Result};
use crate::models::{ExperimentRecord, Group, GroupMetrics};

/// What to do when a rate's denominator is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDenominatorPolicy {
    /// Report the rate as `None`; groups without records get an empty row.
    #[default]
    Undefined,
    /// Fail with `EmptyPopulation` / `ZeroDenominator`; every group must be present.
    Fail,
}

impl std::str::FromStr for ZeroDenominatorPolicy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "undefined" | "nan" | "null" => Ok(Self::Undefined),
            "fail" | "error" | "strict" => Ok(Self::Fail),
            other => Err(format!(
                "unknown zero-denominator policy '{}'; expected undefined or fail",
                other
            )),
        }
    }
}

#[derive(Debug, Default)]
struct GroupAccumulator<'a> {
    /// user_id -> summed converted flags
    conversions: HashMap<&'a str, u32>,
    total_revenue: f64,
}

/// Consolidate with undefined rates reported as `None`.
pub fn consolidate(records: &[ExperimentRecord]) -> Result<Vec<GroupMetrics>> {
    consolidate_with(records, ZeroDenominatorPolicy::Undefined)
}

pub fn consolidate_with(
    records: &[ExperimentRecord],
    policy: ZeroDenominatorPolicy,
) -> Result<Vec<GroupMetrics>> {
    let mut groups: BTreeMap<Group, GroupAccumulator<'_>> = BTreeMap::new();
    let mut unassigned_rows = 0usize;

    for record in records {
        let Some(group) = record.group else {
            unassigned_rows += 1;
            continue;
        };
        let acc = groups.entry(group).or_default();
        *acc.conversions.entry(record.user_id.as_str()).or_insert(0) += u32::from(record.converted);
        acc.total_revenue += record.revenue;
    }

    if unassigned_rows > 0 {
        debug!(rows = unassigned_rows, "records without a group excluded from group metrics");
    }

    if groups.is_empty() {
        return Err(MetricsError::EmptyPopulation { group: None });
    }

    if policy == ZeroDenominatorPolicy::Fail {
        if let Some(missing) = Group::ALL.iter().find(|g| !groups.contains_key(*g)) {
            return Err(MetricsError::EmptyPopulation {
                group: Some(*missing),
            });
        }
    }

    let empty = GroupAccumulator::default();
    let mut metrics = Vec::with_capacity(Group::ALL.len());
    for group in Group::ALL {
        let m = group_metrics(group, groups.get(&group).unwrap_or(&empty), policy)?;
        info!(
            group = %m.group,
            users = m.user_count,
            paying = m.paying_user_count,
            revenue = m.total_revenue,
            "consolidated group metrics"
        );
        metrics.push(m);
    }
    Ok(metrics)
}

fn group_metrics(
    group: Group,
    acc: &GroupAccumulator<'_>,
    policy: ZeroDenominatorPolicy,
) -> Result<GroupMetrics> {
    let user_count = acc.conversions.len();
    let paying_user_count = acc.conversions.values().filter(|&&sum| sum > 0).count();
    let converted_1_count = paying_user_count;
    let converted_0_count = user_count - paying_user_count;
    let total_conversions = converted_0_count + converted_1_count;

    let conversion_rate = match rate(
        group,
        "conversion_rate",
        converted_1_count as f64,
        total_conversions,
        policy,
    ) {
        Err(MetricsError::ZeroDenominator { .. }) => {
            Err(MetricsError::EmptyPopulation { group: Some(group) })
        }
        other => other,
    }?;
    let arpau = rate(group, "arpau", acc.total_revenue, user_count, policy)?;
    let arppu = rate(group, "arppu", acc.total_revenue, paying_user_count, policy)?;

    Ok(GroupMetrics {
        group,
        converted_0_count,
        converted_1_count,
        total_conversions,
        conversion_rate,
        total_revenue: acc.total_revenue,
        user_count,
        paying_user_count,
        arpau,
        arppu,
    })
}

fn rate(
    group: Group,
    metric: &'static str,
    numerator: f64,
    denominator: usize,
    policy: ZeroDenominatorPolicy,
) -> Result<Option<f64>> {
    match (denominator, policy) {
        (0, ZeroDenominatorPolicy::Fail) => Err(MetricsError::ZeroDenominator { group, metric }),
        (0, ZeroDenominatorPolicy::Undefined) => Ok(None),
        (n, _) => Ok(Some(numerator / n as f64)),
    }
}
