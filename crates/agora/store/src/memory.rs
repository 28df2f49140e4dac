//! In-memory reference implementation for the governance storage traits.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use a transactional backend (e.g. PostgreSQL) for source-of-truth
//! data.

use crate::model::{
    compute_audit_hash, AuditAppend, AuditRecord, EvaluationUpdate, ResubmissionUpdate,
    RevisionDraft,
};
use crate::traits::{AuditStore, ProposalStore, QueryWindow};
use crate::{StoreError, StoreResult};
use agora_types::{
    CouncilBallot, FundingOutcome, MemberId, MemberReaction, Proposal, ProposalId,
    ProposalStatus, ReactionKind, Revision,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory governance storage adapter.
#[derive(Default)]
pub struct InMemoryGovernanceStore {
    proposals: RwLock<HashMap<ProposalId, Proposal>>,
    revisions: RwLock<HashMap<ProposalId, Vec<Revision>>>,
    ballots: RwLock<HashMap<(ProposalId, MemberId), CouncilBallot>>,
    reactions: RwLock<HashMap<(ProposalId, MemberId), MemberReaction>>,
    audits: RwLock<Vec<AuditRecord>>,
}

impl InMemoryGovernanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProposalStore for InMemoryGovernanceStore {
    async fn create_proposal(&self, proposal: Proposal) -> StoreResult<()> {
        let mut guard = self
            .proposals
            .write()
            .map_err(|_| StoreError::Backend("proposals lock poisoned".to_string()))?;

        if guard.contains_key(&proposal.proposal_id) {
            return Err(StoreError::Conflict(format!(
                "proposal {} already exists",
                proposal.proposal_id
            )));
        }

        guard.insert(proposal.proposal_id.clone(), proposal);
        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &ProposalId) -> StoreResult<Option<Proposal>> {
        let guard = self
            .proposals
            .read()
            .map_err(|_| StoreError::Backend("proposals lock poisoned".to_string()))?;
        Ok(guard.get(proposal_id).cloned())
    }

    async fn list_proposals(&self, window: QueryWindow) -> StoreResult<Vec<Proposal>> {
        let guard = self
            .proposals
            .read()
            .map_err(|_| StoreError::Backend("proposals lock poisoned".to_string()))?;
        let mut values = guard.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(apply_window(values, window))
    }

    async fn transition_status(
        &self,
        proposal_id: &ProposalId,
        expected_from: ProposalStatus,
        to: ProposalStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut guard = self
            .proposals
            .write()
            .map_err(|_| StoreError::Backend("proposals lock poisoned".to_string()))?;
        let record = guard
            .get_mut(proposal_id)
            .ok_or_else(|| StoreError::NotFound(format!("proposal {} not found", proposal_id)))?;

        if record.status != expected_from {
            return Err(StoreError::InvariantViolation(format!(
                "stale status transition: expected {}, found {}",
                expected_from, record.status
            )));
        }

        record.status = to;
        record.updated_at = updated_at;
        record.version += 1;
        Ok(())
    }

    async fn apply_evaluation(
        &self,
        proposal_id: &ProposalId,
        expected_version: u64,
        update: EvaluationUpdate,
    ) -> StoreResult<()> {
        let mut guard = self
            .proposals
            .write()
            .map_err(|_| StoreError::Backend("proposals lock poisoned".to_string()))?;
        let record = guard
            .get_mut(proposal_id)
            .ok_or_else(|| StoreError::NotFound(format!("proposal {} not found", proposal_id)))?;

        if record.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "version conflict on proposal {}: expected {}, found {}",
                proposal_id, expected_version, record.version
            )));
        }

        record.evaluation = Some(update.evaluation);
        record.audit = Some(update.audit);
        record.decision = Some(update.decision);
        record.decision_reasons = update.decision_reasons;
        record.council_required = Some(update.council_required);
        record.status = update.new_status;
        record.updated_at = update.updated_at;
        record.version += 1;
        Ok(())
    }

    async fn commit_resubmission(
        &self,
        proposal_id: &ProposalId,
        expected_version: u64,
        snapshot: RevisionDraft,
        update: ResubmissionUpdate,
    ) -> StoreResult<Revision> {
        // Lock order is proposals, revisions, ballots everywhere.
        let mut proposals = self
            .proposals
            .write()
            .map_err(|_| StoreError::Backend("proposals lock poisoned".to_string()))?;
        let mut revisions = self
            .revisions
            .write()
            .map_err(|_| StoreError::Backend("revisions lock poisoned".to_string()))?;
        let mut ballots = self
            .ballots
            .write()
            .map_err(|_| StoreError::Backend("ballots lock poisoned".to_string()))?;

        let record = proposals
            .get_mut(proposal_id)
            .ok_or_else(|| StoreError::NotFound(format!("proposal {} not found", proposal_id)))?;

        if record.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "version conflict on proposal {}: expected {}, found {}",
                proposal_id, expected_version, record.version
            )));
        }

        let entry = revisions.entry(proposal_id.clone()).or_default();
        let engine_version = snapshot
            .evaluation
            .as_ref()
            .map(|e| e.engine_version.clone());
        let revision = Revision {
            proposal_id: proposal_id.clone(),
            revision_number: entry.len() as u32 + 1,
            raw_text: snapshot.raw_text,
            evaluation: snapshot.evaluation,
            decision: snapshot.decision,
            decision_reasons: snapshot.decision_reasons,
            audit: snapshot.audit,
            status_at_time: snapshot.status_at_time,
            engine_version,
            submitted_at: snapshot.submitted_at,
        };
        entry.push(revision.clone());

        record.raw_text = update.raw_text;
        record.evaluation = Some(update.evaluation);
        record.audit = Some(update.audit);
        record.decision = Some(update.decision);
        record.decision_reasons = update.decision_reasons;
        record.council_required = Some(update.council_required);
        record.status = update.new_status;
        record.submitted_at = update.submitted_at;
        record.updated_at = update.submitted_at;
        record.version += 1;

        if update.reset_ballots {
            ballots.retain(|(pid, _), _| pid != proposal_id);
        }

        Ok(revision)
    }

    async fn set_funding_outcome(
        &self,
        proposal_id: &ProposalId,
        expected_from: ProposalStatus,
        outcome: FundingOutcome,
        final_status: ProposalStatus,
    ) -> StoreResult<()> {
        let mut guard = self
            .proposals
            .write()
            .map_err(|_| StoreError::Backend("proposals lock poisoned".to_string()))?;
        let record = guard
            .get_mut(proposal_id)
            .ok_or_else(|| StoreError::NotFound(format!("proposal {} not found", proposal_id)))?;

        if record.status != expected_from {
            return Err(StoreError::InvariantViolation(format!(
                "stale funding write: expected {}, found {}",
                expected_from, record.status
            )));
        }

        record.updated_at = outcome.recorded_at;
        record.funding = Some(outcome);
        record.status = final_status;
        record.version += 1;
        Ok(())
    }

    async fn list_revisions(&self, proposal_id: &ProposalId) -> StoreResult<Vec<Revision>> {
        let guard = self
            .revisions
            .read()
            .map_err(|_| StoreError::Backend("revisions lock poisoned".to_string()))?;
        Ok(guard.get(proposal_id).cloned().unwrap_or_default())
    }

    async fn upsert_ballot(&self, ballot: CouncilBallot) -> StoreResult<Vec<CouncilBallot>> {
        {
            let proposals = self
                .proposals
                .read()
                .map_err(|_| StoreError::Backend("proposals lock poisoned".to_string()))?;
            if !proposals.contains_key(&ballot.proposal_id) {
                return Err(StoreError::NotFound(format!(
                    "proposal {} not found",
                    ballot.proposal_id
                )));
            }
        }

        let mut guard = self
            .ballots
            .write()
            .map_err(|_| StoreError::Backend("ballots lock poisoned".to_string()))?;
        guard.insert(
            (ballot.proposal_id.clone(), ballot.voter_id.clone()),
            ballot.clone(),
        );

        let mut values = guard
            .values()
            .filter(|b| b.proposal_id == ballot.proposal_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.cast_at.cmp(&b.cast_at));
        Ok(values)
    }

    async fn list_ballots(&self, proposal_id: &ProposalId) -> StoreResult<Vec<CouncilBallot>> {
        let guard = self
            .ballots
            .read()
            .map_err(|_| StoreError::Backend("ballots lock poisoned".to_string()))?;
        let mut values = guard
            .values()
            .filter(|b| &b.proposal_id == proposal_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.cast_at.cmp(&b.cast_at));
        Ok(values)
    }

    async fn put_reaction(
        &self,
        proposal_id: &ProposalId,
        member_id: &MemberId,
        kind: Option<ReactionKind>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        {
            let proposals = self
                .proposals
                .read()
                .map_err(|_| StoreError::Backend("proposals lock poisoned".to_string()))?;
            if !proposals.contains_key(proposal_id) {
                return Err(StoreError::NotFound(format!(
                    "proposal {} not found",
                    proposal_id
                )));
            }
        }

        let mut guard = self
            .reactions
            .write()
            .map_err(|_| StoreError::Backend("reactions lock poisoned".to_string()))?;
        match kind {
            Some(kind) => {
                guard.insert(
                    (proposal_id.clone(), member_id.clone()),
                    MemberReaction {
                        proposal_id: proposal_id.clone(),
                        member_id: member_id.clone(),
                        kind,
                        reacted_at: at,
                    },
                );
            }
            None => {
                guard.remove(&(proposal_id.clone(), member_id.clone()));
            }
        }
        Ok(())
    }

    async fn list_reactions(&self, proposal_id: &ProposalId) -> StoreResult<Vec<MemberReaction>> {
        let guard = self
            .reactions
            .read()
            .map_err(|_| StoreError::Backend("reactions lock poisoned".to_string()))?;
        let mut values = guard
            .values()
            .filter(|r| &r.proposal_id == proposal_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.reacted_at.cmp(&b.reacted_at));
        Ok(values)
    }
}

#[async_trait]
impl AuditStore for InMemoryGovernanceStore {
    async fn append_audit(&self, event: AuditAppend) -> StoreResult<AuditRecord> {
        let mut guard = self
            .audits
            .write()
            .map_err(|_| StoreError::Backend("audit lock poisoned".to_string()))?;

        let previous_hash = guard.last().map(|e| e.hash.clone());
        let sequence = guard.len() as u64 + 1;
        let hash = compute_audit_hash(&event, previous_hash.as_deref(), sequence);

        let record = AuditRecord {
            event_id: format!("audit-{}", Uuid::new_v4()),
            sequence,
            timestamp: event.timestamp,
            actor: event.actor,
            stage: event.stage,
            success: event.success,
            message: event.message,
            proposal_id: event.proposal_id,
            payload: event.payload,
            previous_hash,
            hash,
        };

        guard.push(record.clone());
        Ok(record)
    }

    async fn list_audit(&self, window: QueryWindow) -> StoreResult<Vec<AuditRecord>> {
        let guard = self
            .audits
            .read()
            .map_err(|_| StoreError::Backend("audit lock poisoned".to_string()))?;
        let mut values = guard.clone();
        values.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(apply_window(values, window))
    }

    async fn latest_audit_hash(&self) -> StoreResult<Option<String>> {
        let guard = self
            .audits
            .read()
            .map_err(|_| StoreError::Backend("audit lock poisoned".to_string()))?;
        Ok(guard.last().map(|e| e.hash.clone()))
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
