//! Council vote aggregation.
//!
//! Ballots are stored by the proposal store; this crate owns the pure
//! parts: counting them, deciding whether a resolution rule is satisfied,
//! and the roster collaborator that says who may vote. Resolution is
//! evaluated after every ballot, never on a timer.

#![deny(unsafe_code)]

use std::collections::HashSet;

use agora_types::{BallotValue, CouncilBallot, GovernanceResult, MemberId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Ballot counts for one proposal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub for_count: u32,
    pub against_count: u32,
    pub abstain_count: u32,
}

impl VoteTally {
    /// Total ballots cast, abstentions included.
    pub fn total(&self) -> u32 {
        self.for_count + self.against_count + self.abstain_count
    }
}

/// Counts ballots by value. Each voter appears at most once in the slice
/// (the store upserts by voter), so no dedup happens here.
pub fn tally(ballots: &[CouncilBallot]) -> VoteTally {
    let mut counts = VoteTally::default();
    for ballot in ballots {
        match ballot.value {
            BallotValue::For => counts.for_count += 1,
            BallotValue::Against => counts.against_count += 1,
            BallotValue::Abstain => counts.abstain_count += 1,
        }
    }
    counts
}

/// Outcome once a resolution rule is satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteVerdict {
    Approve,
    Reject,
}

/// Policy deciding when a council vote resolves.
///
/// `resolve` returns `None` while the vote stays open. The first ballot
/// whose tally satisfies the rule triggers the status transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionRule {
    /// Strict majority of non-abstain ballots once a minimum number of
    /// ballots (abstentions included) has been cast. Ties stay open.
    MajorityOfCast {
        /// Minimum ballots before the rule is consulted at all.
        min_ballots: u32,
    },

    /// Fixed vote counts. Approval is checked first, so a tally
    /// satisfying both resolves to approve.
    FixedThreshold {
        /// FOR ballots needed to approve.
        approve_votes: u32,
        /// AGAINST ballots needed to reject.
        reject_votes: u32,
    },

    /// Every council seat must vote FOR. A single AGAINST rejects
    /// immediately.
    Unanimous {
        /// Number of council seats.
        council_size: u32,
    },
}

impl ResolutionRule {
    /// Majority rule with a participation floor.
    pub fn majority_of(min_ballots: u32) -> Self {
        Self::MajorityOfCast { min_ballots }
    }

    /// Fixed-count rule.
    pub fn fixed(approve_votes: u32, reject_votes: u32) -> Self {
        Self::FixedThreshold {
            approve_votes,
            reject_votes,
        }
    }

    /// Unanimity across the whole council.
    pub fn unanimous(council_size: u32) -> Self {
        Self::Unanimous { council_size }
    }

    /// Evaluates the rule against the current tally.
    pub fn resolve(&self, tally: &VoteTally) -> Option<VoteVerdict> {
        match self {
            ResolutionRule::MajorityOfCast { min_ballots } => {
                if tally.total() < *min_ballots {
                    return None;
                }
                if tally.for_count > tally.against_count {
                    Some(VoteVerdict::Approve)
                } else if tally.against_count > tally.for_count {
                    Some(VoteVerdict::Reject)
                } else {
                    None
                }
            }
            ResolutionRule::FixedThreshold {
                approve_votes,
                reject_votes,
            } => {
                if tally.for_count >= *approve_votes {
                    Some(VoteVerdict::Approve)
                } else if tally.against_count >= *reject_votes {
                    Some(VoteVerdict::Reject)
                } else {
                    None
                }
            }
            ResolutionRule::Unanimous { council_size } => {
                if tally.against_count > 0 {
                    Some(VoteVerdict::Reject)
                } else if tally.for_count >= *council_size {
                    Some(VoteVerdict::Approve)
                } else {
                    None
                }
            }
        }
    }
}

/// Who holds a council seat. Checked before any ballot is accepted.
#[async_trait]
pub trait CouncilRoster: Send + Sync {
    /// True when the member may cast council ballots.
    async fn is_council_member(&self, member: &MemberId) -> GovernanceResult<bool>;

    /// Number of council seats, for rules that need it.
    async fn council_size(&self) -> GovernanceResult<u32>;
}

/// Fixed roster for tests, demos, and deployments with a static council.
pub struct StaticCouncilRoster {
    members: HashSet<MemberId>,
}

impl StaticCouncilRoster {
    pub fn new(members: impl IntoIterator<Item = MemberId>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }
}

#[async_trait]
impl CouncilRoster for StaticCouncilRoster {
    async fn is_council_member(&self, member: &MemberId) -> GovernanceResult<bool> {
        Ok(self.members.contains(member))
    }

    async fn council_size(&self) -> GovernanceResult<u32> {
        Ok(self.members.len() as u32)
    }
}
