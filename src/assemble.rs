//! Record assembly: join assignments and payments onto the active-user
//! population.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::models::{ActiveUser, ExperimentRecord, Group, GroupAssignment, PaymentEvent};

/// Build the per-user experiment record.
///
/// The active-user log defines the population. Each active row yields one
/// row per matching assignment (or one with `group = None`), and each of
/// those yields one row per matching payment (or one with revenue 0).
/// Assignments and payments for users outside the active set are dropped.
pub fn assemble(
    groups: &[GroupAssignment],
    active: &[ActiveUser],
    payments: &[PaymentEvent],
) -> Vec<ExperimentRecord> {
    let mut groups_by_user: HashMap<&str, Vec<Group>> = HashMap::new();
    for row in groups {
        groups_by_user.entry(row.user_id.as_str()).or_default().push(row.group);
    }

    let mut revenue_by_user: HashMap<&str, Vec<Option<f64>>> = HashMap::new();
    for event in payments {
        revenue_by_user
            .entry(event.user_id.as_str())
            .or_default()
            .push(event.revenue);
    }

    let unassigned: [Option<Group>; 1] = [None];
    let unpaid: [Option<f64>; 1] = [None];

    let mut records = Vec::with_capacity(active.len());
    for user in active {
        let id = user.user_id.as_str();

        let user_groups: Vec<Option<Group>> = match groups_by_user.get(id) {
            Some(found) => found.iter().copied().map(Some).collect(),
            None => unassigned.to_vec(),
        };
        let user_revenue: &[Option<f64>] = revenue_by_user
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&unpaid);

        for group in &user_groups {
            for revenue in user_revenue {
                records.push(ExperimentRecord::new(id, *group, *revenue));
            }
        }
    }

    let converted = records.iter().filter(|r| r.converted == 1).count();
    debug!(converted_rows = converted, "derived conversion flags");
    info!(
        active = active.len(),
        assignments = groups.len(),
        payments = payments.len(),
        records = records.len(),
        "assembled experiment record"
    );
    records
}
