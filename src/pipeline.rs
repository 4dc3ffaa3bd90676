//! End-to-end run: load → reconcile → assemble → consolidate.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::assemble::assemble;
use crate::config::ExperimentConfig;
use crate::consolidate::consolidate_with;
use crate::error::{MetricsError, Result};
use crate::loader::ResourceLoader;
use crate::models::{ActiveUser, GroupAssignment, PaymentEvent};
use crate::reconcile::{find_ambiguous_identities, reconcile};
use crate::report::{PipelineReport, StageCounts};
use crate::table::{decode_active, decode_assignments, decode_payments, ColumnLayout};

/// Decoded inputs for one run
#[derive(Debug, Clone, Default)]
pub struct ExperimentInputs {
    pub groups: Vec<GroupAssignment>,
    pub groups_supplemental: Vec<GroupAssignment>,
    pub active: Vec<ActiveUser>,
    pub payments: Vec<PaymentEvent>,
}

impl ExperimentInputs {
    /// Load and decode all four sources. Fails on the first unavailable or
    /// malformed dataset.
    pub fn load(loader: &dyn ResourceLoader, config: &ExperimentConfig) -> Result<Self> {
        let sources = &config.sources;

        let groups = decode_assignments(&loader.load(&sources.groups)?, &ColumnLayout::GROUPS)?;
        let groups_supplemental = decode_assignments(
            &loader.load(&sources.groups_supplemental)?,
            &ColumnLayout::GROUPS,
        )?;
        let active = decode_active(&loader.load(&sources.active)?, &ColumnLayout::ACTIVE)?;
        let payments = decode_payments(&loader.load(&sources.payments)?, &ColumnLayout::PAYMENTS)?;

        Ok(Self {
            groups,
            groups_supplemental,
            active,
            payments,
        })
    }
}

/// Run the pure stages over already-materialized inputs.
pub fn run(inputs: &ExperimentInputs, config: &ExperimentConfig) -> Result<PipelineReport> {
    let reconciled = reconcile(&inputs.groups, &inputs.groups_supplemental);

    let ambiguous = find_ambiguous_identities(&reconciled);
    if let Some(first) = ambiguous.first() {
        if config.metrics.reject_ambiguous_identities {
            return Err(MetricsError::AmbiguousIdentity {
                user_id: first.user_id.clone(),
                groups: first.groups.clone(),
            });
        }
        warn!(
            count = ambiguous.len(),
            first_user_id = %first.user_id,
            "users assigned to multiple groups; passing through unresolved"
        );
    }

    let records = assemble(&reconciled, &inputs.active, &inputs.payments);
    let metrics = consolidate_with(&records, config.metrics.zero_denominator)?;

    let assigned: HashSet<&str> = reconciled.iter().map(|g| g.user_id.as_str()).collect();
    let counts = StageCounts {
        primary_assignments: inputs.groups.len(),
        supplemental_assignments: inputs.groups_supplemental.len(),
        reconciled_assignments: reconciled.len(),
        active_users: inputs.active.len(),
        payments: inputs.payments.len(),
        records: records.len(),
        unassigned_active_users: inputs
            .active
            .iter()
            .filter(|u| !assigned.contains(u.user_id.as_str()))
            .count(),
    };

    info!(
        records = counts.records,
        unassigned = counts.unassigned_active_users,
        groups = metrics.len(),
        "pipeline complete"
    );
    Ok(PipelineReport::new(counts, ambiguous, metrics))
}

/// Load every source through `loader`, then run.
pub fn run_with_loader(loader: &dyn ResourceLoader, config: &ExperimentConfig) -> Result<PipelineReport> {
    let inputs = ExperimentInputs::load(loader, config)?;
    run(&inputs, config)
}
