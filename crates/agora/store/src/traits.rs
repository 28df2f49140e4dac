//! Backend-neutral storage traits for the governance engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use agora_types::{
    CouncilBallot, FundingOutcome, MemberId, MemberReaction, Proposal, ProposalId,
    ProposalStatus, ReactionKind, Revision,
};

use crate::error::StoreResult;
use crate::model::{
    AuditAppend, AuditRecord, EvaluationUpdate, ResubmissionUpdate, RevisionDraft,
};

/// Pagination window for list queries. A `limit` of 0 means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Storage for proposals and their dependent rows (revisions, ballots,
/// reactions).
///
/// Status and version writes are compare-and-swap: the caller states
/// what it last read and the backend rejects the write with
/// [`StoreError::Conflict`] or [`StoreError::InvariantViolation`] if
/// the row has moved on. Every accepted mutation bumps the proposal
/// version.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Persists a new proposal. Fails with `Conflict` if the id exists.
    async fn create_proposal(&self, proposal: Proposal) -> StoreResult<()>;

    /// Fetches a proposal by id.
    async fn get_proposal(&self, proposal_id: &ProposalId) -> StoreResult<Option<Proposal>>;

    /// Lists proposals ordered by most recent update first.
    async fn list_proposals(&self, window: QueryWindow) -> StoreResult<Vec<Proposal>>;

    /// Moves a proposal from `expected_from` to `to`.
    ///
    /// Fails with `InvariantViolation` when the stored status no longer
    /// matches `expected_from`, and `NotFound` when the row is missing.
    async fn transition_status(
        &self,
        proposal_id: &ProposalId,
        expected_from: ProposalStatus,
        to: ProposalStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Writes evaluation results and the routed status in one step.
    ///
    /// Fails with `Conflict` when the stored version differs from
    /// `expected_version`.
    async fn apply_evaluation(
        &self,
        proposal_id: &ProposalId,
        expected_version: u64,
        update: EvaluationUpdate,
    ) -> StoreResult<()>;

    /// Commits a resubmission: appends the snapshot as the next
    /// revision, replaces the proposal content and evaluation state,
    /// and clears ballots when requested, all atomically.
    ///
    /// Fails with `Conflict` when the stored version differs from
    /// `expected_version`. Returns the revision as persisted, with its
    /// assigned number.
    async fn commit_resubmission(
        &self,
        proposal_id: &ProposalId,
        expected_version: u64,
        snapshot: RevisionDraft,
        update: ResubmissionUpdate,
    ) -> StoreResult<Revision>;

    /// Records the funding outcome and the final status it implies.
    ///
    /// Fails with `InvariantViolation` when the stored status no longer
    /// matches `expected_from`, and `NotFound` when the row is missing.
    async fn set_funding_outcome(
        &self,
        proposal_id: &ProposalId,
        expected_from: ProposalStatus,
        outcome: FundingOutcome,
        final_status: ProposalStatus,
    ) -> StoreResult<()>;

    /// Lists revisions for a proposal in ascending revision order.
    async fn list_revisions(&self, proposal_id: &ProposalId) -> StoreResult<Vec<Revision>>;

    /// Inserts or replaces a voter's ballot, then returns every ballot
    /// for the proposal in cast order.
    async fn upsert_ballot(&self, ballot: CouncilBallot) -> StoreResult<Vec<CouncilBallot>>;

    /// Lists ballots for a proposal in cast order.
    async fn list_ballots(&self, proposal_id: &ProposalId) -> StoreResult<Vec<CouncilBallot>>;

    /// Sets or clears one member's reaction. `None` removes it.
    async fn put_reaction(
        &self,
        proposal_id: &ProposalId,
        member_id: &MemberId,
        kind: Option<ReactionKind>,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Lists reactions for a proposal in the order they were recorded.
    async fn list_reactions(&self, proposal_id: &ProposalId) -> StoreResult<Vec<MemberReaction>>;
}

/// Append-only audit log with hash chaining.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends an event, assigning its sequence number and chain hash.
    async fn append_audit(&self, event: AuditAppend) -> StoreResult<AuditRecord>;

    /// Lists audit records, most recent sequence first.
    async fn list_audit(&self, window: QueryWindow) -> StoreResult<Vec<AuditRecord>>;

    /// Returns the hash of the most recent audit record, if any.
    async fn latest_audit_hash(&self) -> StoreResult<Option<String>>;
}

/// Unified storage bundle the lifecycle controller depends on.
pub trait GovernanceStore: ProposalStore + AuditStore + Send + Sync {}

impl<T> GovernanceStore for T where T: ProposalStore + AuditStore + Send + Sync {}
