//! Lifecycle events and the pure transition reducer.
//!
//! Every status a proposal ever holds is the result of folding accepted
//! events through [`apply`]. The controller persists the resulting status;
//! nothing else in the workspace writes one.

use agora_council::VoteVerdict;
use agora_gate::RoutingOutcome;
use agora_types::{BallotValue, GovernanceError, GovernanceResult, MemberId, ProposalStatus};
use serde::{Deserialize, Serialize};

/// An accepted change to one proposal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalEvent {
    /// A draft passed validation and was persisted.
    Submitted { proposer: MemberId },

    /// The evaluation engine returned and the gate routed the result.
    Evaluated {
        outcome: RoutingOutcome,
        engine_version: String,
    },

    /// A council member cast or replaced a ballot.
    BallotCast { voter: MemberId, value: BallotValue },

    /// The resolution rule was satisfied.
    Resolved { verdict: VoteVerdict },

    /// The proposer pulled the proposal.
    Withdrawn { by: MemberId },

    /// The proposer replaced the text; the prior state became a revision.
    Resubmitted { revision_number: u32 },

    /// The external disbursement reported back.
    FundingRecorded { success: bool },
}

impl ProposalEvent {
    /// Audit stage name for the event.
    pub fn stage(&self) -> &'static str {
        match self {
            ProposalEvent::Submitted { .. } => "submit",
            ProposalEvent::Evaluated { .. } => "evaluation",
            ProposalEvent::BallotCast { .. } => "council_vote",
            ProposalEvent::Resolved { .. } => "council_resolution",
            ProposalEvent::Withdrawn { .. } => "withdraw",
            ProposalEvent::Resubmitted { .. } => "resubmission",
            ProposalEvent::FundingRecorded { .. } => "funding",
        }
    }
}

/// The transition table.
///
/// `current` is `None` only for the submit event. Any pair not listed is
/// rejected with `InvalidState`; in particular the four terminal statuses
/// accept no event at all, and `approved` accepts only the funding
/// outcome.
pub fn apply(
    current: Option<ProposalStatus>,
    event: &ProposalEvent,
) -> GovernanceResult<ProposalStatus> {
    match (current, event) {
        (None, ProposalEvent::Submitted { .. }) => Ok(ProposalStatus::Submitted),

        (
            Some(ProposalStatus::Submitted | ProposalStatus::Votable),
            ProposalEvent::Evaluated { outcome, .. },
        ) => Ok(outcome.next_status()),

        (Some(ProposalStatus::Votable), ProposalEvent::BallotCast { .. }) => {
            Ok(ProposalStatus::Votable)
        }

        (Some(ProposalStatus::Votable), ProposalEvent::Resolved { verdict }) => Ok(match verdict {
            VoteVerdict::Approve => ProposalStatus::Approved,
            VoteVerdict::Reject => ProposalStatus::Rejected,
        }),

        (
            Some(ProposalStatus::Submitted | ProposalStatus::Votable),
            ProposalEvent::Withdrawn { .. },
        ) => Ok(ProposalStatus::Withdrawn),

        // Resubmission itself keeps the status; the evaluation that
        // follows it routes to the next one.
        (
            Some(status @ (ProposalStatus::Submitted | ProposalStatus::Votable)),
            ProposalEvent::Resubmitted { .. },
        ) => Ok(status),

        (Some(ProposalStatus::Approved), ProposalEvent::FundingRecorded { success }) => {
            Ok(if *success {
                ProposalStatus::Funded
            } else {
                ProposalStatus::Failed
            })
        }

        (current, event) => Err(GovernanceError::InvalidState(format!(
            "event {} not allowed in status {}",
            event.stage(),
            current.map(|s| s.as_str()).unwrap_or("none"),
        ))),
    }
}
