//! Member sentiment on proposals.
//!
//! Reactions are informational. They never gate a status transition, and
//! reactions from different members commute; the only rule is the
//! per-member toggle: sending the kind you already have clears it.

#![deny(unsafe_code)]

use agora_types::{MemberId, MemberReaction, ReactionKind};
use serde::{Deserialize, Serialize};

/// Reaction counts for one proposal, plus the caller's own reaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub support: u32,
    pub concern: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_reaction: Option<ReactionKind>,
}

/// Next stored value for a member's reaction.
///
/// Repeating the current kind clears it; anything else replaces it.
pub fn apply_toggle(prior: Option<ReactionKind>, requested: ReactionKind) -> Option<ReactionKind> {
    if prior == Some(requested) {
        None
    } else {
        Some(requested)
    }
}

/// Counts reactions and picks out the caller's own.
pub fn summarize(reactions: &[MemberReaction], me: &MemberId) -> ReactionSummary {
    let mut summary = ReactionSummary::default();
    for reaction in reactions {
        match reaction.kind {
            ReactionKind::Support => summary.support += 1,
            ReactionKind::Concern => summary.concern += 1,
        }
        if &reaction.member_id == me {
            summary.my_reaction = Some(reaction.kind);
        }
    }
    summary
}
