//! Revision recording for proposal resubmissions.
//!
//! A revision is the immutable snapshot of whatever a resubmission is
//! about to overwrite: text, evaluation, decision, reasons, and the
//! status at that moment. Numbers are dense from 1 per proposal and are
//! assigned by the store when the resubmission commits, so the snapshot
//! built here carries no number of its own.

#![deny(unsafe_code)]

use agora_store::RevisionDraft;
use agora_types::{Proposal, Revision};
use thiserror::Error;

/// Violations found while checking a proposal's revision history.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("revision numbers must start at 1, found {0}")]
    WrongStart(u32),

    #[error("revision sequence has a gap: expected {expected}, found {found}")]
    Gap { expected: u32, found: u32 },
}

/// Snapshots the state a resubmission is about to replace.
///
/// Called before the evaluator runs, so a failed re-evaluation leaves
/// nothing behind: the draft is only persisted by the atomic commit.
pub fn snapshot(proposal: &Proposal) -> RevisionDraft {
    RevisionDraft {
        raw_text: proposal.raw_text.clone(),
        evaluation: proposal.evaluation.clone(),
        decision: proposal.decision,
        decision_reasons: proposal.decision_reasons.clone(),
        audit: proposal.audit.clone(),
        status_at_time: proposal.status,
        submitted_at: proposal.submitted_at,
    }
}

/// Checks that a history, in the order the store returns it, is dense
/// from 1 with no gaps.
pub fn verify_sequence(revisions: &[Revision]) -> Result<(), HistoryError> {
    for (index, revision) in revisions.iter().enumerate() {
        let expected = index as u32 + 1;
        if revision.revision_number != expected {
            if index == 0 {
                return Err(HistoryError::WrongStart(revision.revision_number));
            }
            return Err(HistoryError::Gap {
                expected,
                found: revision.revision_number,
            });
        }
    }
    Ok(())
}
