//! Decision gate: routes a completed evaluation onto the proposal state
//! machine.
//!
//! The gate is pure. It holds no storage and reads no clocks; the
//! lifecycle controller applies whatever outcome it returns. It is called
//! exactly once per evaluation, whether that evaluation came from the
//! initial submission or a resubmission.

#![deny(unsafe_code)]

use agora_types::{Budget, Evaluation, EvaluationDecision, ProposalStatus};
use serde::{Deserialize, Serialize};

/// Where a completed evaluation sends a proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoutingOutcome {
    /// Advanced with a budget under the council threshold.
    AutoApproved,

    /// Advanced with a budget at or over the council threshold.
    RequiresCouncil,

    /// The engine asked for a rewrite. The proposal stays editable and
    /// the proposer may resubmit.
    Revisable,

    /// The engine blocked the proposal outright.
    Rejected,
}

impl RoutingOutcome {
    /// Status the proposal lands on when this outcome is applied.
    pub fn next_status(&self) -> ProposalStatus {
        match self {
            RoutingOutcome::AutoApproved => ProposalStatus::Approved,
            RoutingOutcome::RequiresCouncil => ProposalStatus::Votable,
            RoutingOutcome::Revisable => ProposalStatus::Submitted,
            RoutingOutcome::Rejected => ProposalStatus::Rejected,
        }
    }
}

/// True when the requested amount must go to a council vote.
///
/// The boundary is inclusive: an amount exactly at the threshold
/// requires council.
pub fn requires_council(amount_minor: u64, council_threshold_minor: u64) -> bool {
    amount_minor >= council_threshold_minor
}

/// Routes a first evaluation, deriving the council requirement from the
/// budget.
pub fn route(
    evaluation: &Evaluation,
    budget: &Budget,
    council_threshold_minor: u64,
) -> RoutingOutcome {
    route_with_requirement(
        evaluation,
        requires_council(budget.amount_requested, council_threshold_minor),
    )
}

/// Routes with the council requirement already fixed.
///
/// Resubmissions reuse the requirement computed at first evaluation, so
/// a proposal never flips between the auto and council paths while its
/// budget is unchanged.
pub fn route_with_requirement(evaluation: &Evaluation, council_required: bool) -> RoutingOutcome {
    match evaluation.decision {
        EvaluationDecision::Block => RoutingOutcome::Rejected,
        EvaluationDecision::Revise => RoutingOutcome::Revisable,
        EvaluationDecision::Advance if council_required => RoutingOutcome::RequiresCouncil,
        EvaluationDecision::Advance => RoutingOutcome::AutoApproved,
    }
}

/// Reason strings persisted as `decision_reasons` next to the outcome.
///
/// The routing line comes first, then the engine's own pass/fail reasons
/// and violations, so the list always reflects the evaluation that
/// produced the current status.
pub fn explain(evaluation: &Evaluation, outcome: RoutingOutcome) -> Vec<String> {
    let mut reasons = vec![match outcome {
        RoutingOutcome::AutoApproved => {
            "advanced by evaluation; budget under council threshold".to_string()
        }
        RoutingOutcome::RequiresCouncil => {
            "advanced by evaluation; budget requires council vote".to_string()
        }
        RoutingOutcome::Revisable => "evaluation requested a revision".to_string(),
        RoutingOutcome::Rejected => "evaluation blocked the proposal".to_string(),
    }];
    reasons.extend(evaluation.pass_fail_reasons.iter().cloned());
    reasons.extend(
        evaluation
            .violations
            .iter()
            .map(|v| format!("violation: {v}")),
    );
    reasons
}
