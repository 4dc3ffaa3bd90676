//! Identity reconciliation: merge the primary and late-arriving assignment
//! tables into one canonical `(user_id, group)` list.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::models::{Group, GroupAssignment};
use crate::table::{decode_assignments, ColumnLayout, Table};

/// A user mapped to more than one group. Reported, never resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousIdentity {
    pub user_id: String,
    pub groups: Vec<Group>,
}

/// Concatenate `primary` and `supplemental`, dropping exact duplicate rows.
///
/// The first occurrence of each row wins, so output order is stable. Rows
/// that share a `user_id` but disagree on `group` are both kept; see
/// [`find_ambiguous_identities`].
pub fn reconcile(primary: &[GroupAssignment], supplemental: &[GroupAssignment]) -> Vec<GroupAssignment> {
    let mut seen: HashSet<&GroupAssignment> = HashSet::with_capacity(primary.len() + supplemental.len());
    let reconciled: Vec<GroupAssignment> = primary
        .iter()
        .chain(supplemental)
        .filter(|row| seen.insert(*row))
        .cloned()
        .collect();

    info!(
        primary = primary.len(),
        supplemental = supplemental.len(),
        reconciled = reconciled.len(),
        "reconciled group assignments"
    );
    reconciled
}

/// Validate and decode both assignment tables positionally, then reconcile.
pub fn reconcile_tables(primary: &Table, supplemental: &Table) -> Result<Vec<GroupAssignment>> {
    let primary = decode_assignments(primary, &ColumnLayout::GROUPS)?;
    let supplemental = decode_assignments(supplemental, &ColumnLayout::GROUPS)?;
    Ok(reconcile(&primary, &supplemental))
}

/// Users that appear with more than one distinct group, sorted by user id.
pub fn find_ambiguous_identities(assignments: &[GroupAssignment]) -> Vec<AmbiguousIdentity> {
    let mut by_user: BTreeMap<&str, BTreeSet<Group>> = BTreeMap::new();
    for row in assignments {
        by_user.entry(row.user_id.as_str()).or_default().insert(row.group);
    }

    by_user
        .into_iter()
        .filter(|(_, groups)| groups.len() > 1)
        .map(|(user_id, groups)| AmbiguousIdentity {
            user_id: user_id.to_string(),
            groups: groups.into_iter().collect(),
        })
        .collect()
}
