//! Stateless projection of a proposal snapshot into dashboard steps.
//!
//! Derived entirely from the stored record. The state machine never reads
//! it back, so it is safe to recompute on every request.

use agora_types::{EvaluationDecision, Proposal, ProposalStatus};
use serde::Serialize;

/// Display state of one step on the governance walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Completed,
    Active,
    Pending,
    Skipped,
}

/// One row of the projected timeline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessStep {
    pub name: &'static str,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Projects the five-step walk: submission, evaluation, council vote,
/// decision, funding.
pub fn timeline(proposal: &Proposal) -> Vec<ProcessStep> {
    vec![
        step("submission", StepState::Completed, None),
        evaluation_step(proposal),
        council_step(proposal),
        decision_step(proposal),
        funding_step(proposal),
    ]
}

fn step(name: &'static str, state: StepState, detail: Option<String>) -> ProcessStep {
    ProcessStep { name, state, detail }
}

fn evaluation_step(proposal: &Proposal) -> ProcessStep {
    if proposal.evaluation.is_none() {
        return step(
            "evaluation",
            StepState::Active,
            Some("awaiting evaluation".to_string()),
        );
    }
    match proposal.decision {
        // A revise verdict hands the step back to the proposer.
        Some(EvaluationDecision::Revise) if proposal.status == ProposalStatus::Submitted => step(
            "evaluation",
            StepState::Active,
            Some("revision requested".to_string()),
        ),
        Some(decision) => step(
            "evaluation",
            StepState::Completed,
            Some(format!("decision {}", decision.as_str())),
        ),
        None => step("evaluation", StepState::Completed, None),
    }
}

fn council_step(proposal: &Proposal) -> ProcessStep {
    match proposal.council_required {
        None => step("council_vote", StepState::Pending, None),
        Some(false) => step(
            "council_vote",
            StepState::Skipped,
            Some("budget under council threshold".to_string()),
        ),
        Some(true) => match proposal.status {
            ProposalStatus::Votable => step(
                "council_vote",
                StepState::Active,
                Some("ballots open".to_string()),
            ),
            ProposalStatus::Approved | ProposalStatus::Funded | ProposalStatus::Failed => {
                step("council_vote", StepState::Completed, None)
            }
            ProposalStatus::Rejected => {
                if proposal.decision == Some(EvaluationDecision::Block) {
                    step(
                        "council_vote",
                        StepState::Skipped,
                        Some("blocked before any ballot".to_string()),
                    )
                } else {
                    step("council_vote", StepState::Completed, None)
                }
            }
            ProposalStatus::Withdrawn => step(
                "council_vote",
                StepState::Skipped,
                Some("withdrawn before resolution".to_string()),
            ),
            ProposalStatus::Submitted => step("council_vote", StepState::Pending, None),
        },
    }
}

fn decision_step(proposal: &Proposal) -> ProcessStep {
    match proposal.status {
        ProposalStatus::Submitted | ProposalStatus::Votable => {
            step("decision", StepState::Pending, None)
        }
        ProposalStatus::Approved | ProposalStatus::Funded | ProposalStatus::Failed => {
            step("decision", StepState::Completed, Some("approved".to_string()))
        }
        ProposalStatus::Rejected => {
            step("decision", StepState::Completed, Some("rejected".to_string()))
        }
        ProposalStatus::Withdrawn => {
            step("decision", StepState::Completed, Some("withdrawn".to_string()))
        }
    }
}

fn funding_step(proposal: &Proposal) -> ProcessStep {
    match proposal.status {
        ProposalStatus::Approved => step(
            "funding",
            StepState::Active,
            Some("awaiting disbursement".to_string()),
        ),
        ProposalStatus::Funded => {
            step("funding", StepState::Completed, Some("disbursed".to_string()))
        }
        ProposalStatus::Failed => step(
            "funding",
            StepState::Completed,
            Some("disbursement failed".to_string()),
        ),
        ProposalStatus::Rejected | ProposalStatus::Withdrawn => {
            step("funding", StepState::Skipped, None)
        }
        ProposalStatus::Submitted | ProposalStatus::Votable => {
            step("funding", StepState::Pending, None)
        }
    }
}
