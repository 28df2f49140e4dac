//! Agora governance facade.
//!
//! One handle for the UI/API layer: lifecycle operations delegate to the
//! controller, while the read surfaces (filtered listings, statistics,
//! audit log, timeline projection) compose the store behind the same
//! object. Nothing here adds governance semantics of its own.

#![deny(unsafe_code)]

pub mod timeline;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agora_council::{CouncilRoster, VoteTally};
use agora_evaluator::ProposalEvaluator;
use agora_lifecycle::config::GovernanceConfig;
use agora_lifecycle::{LifecycleController, VoteOutcome};
use agora_reactions::ReactionSummary;
use agora_store::{AuditRecord, GovernanceStore, QueryWindow};
use agora_types::{
    BallotValue, GovernanceResult, MemberId, Proposal, ProposalDraft, ProposalId, ProposalStatus,
    ReactionKind, Revision,
};

pub use crate::timeline::{ProcessStep, StepState};

/// Filters for proposal listings. Every field is optional; an empty query
/// returns everything, most recently updated first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProposalQuery {
    pub status: Option<ProposalStatus>,
    pub proposer: Option<MemberId>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Aggregate counts across every stored proposal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GovernanceStatistics {
    pub total_proposals: usize,
    pub by_status: HashMap<String, usize>,
    pub live: usize,
    pub terminal: usize,
}

/// Facade over the governance engine.
pub struct GovernanceService {
    controller: LifecycleController,
    store: Arc<dyn GovernanceStore>,
}

impl GovernanceService {
    pub fn new(
        store: Arc<dyn GovernanceStore>,
        evaluator: Arc<dyn ProposalEvaluator>,
        roster: Arc<dyn CouncilRoster>,
        config: GovernanceConfig,
    ) -> Self {
        Self {
            controller: LifecycleController::new(store.clone(), evaluator, roster, config),
            store,
        }
    }

    pub fn config(&self) -> &GovernanceConfig {
        self.controller.config()
    }

    pub async fn submit_proposal(&self, draft: ProposalDraft) -> GovernanceResult<Proposal> {
        self.controller.submit_proposal(draft).await
    }

    pub async fn resubmit_proposal(
        &self,
        proposal_id: &ProposalId,
        new_text: String,
        caller: &MemberId,
    ) -> GovernanceResult<Proposal> {
        self.controller
            .resubmit_proposal(proposal_id, new_text, caller)
            .await
    }

    pub async fn withdraw_proposal(
        &self,
        proposal_id: &ProposalId,
        caller: &MemberId,
    ) -> GovernanceResult<Proposal> {
        self.controller.withdraw_proposal(proposal_id, caller).await
    }

    pub async fn cast_council_vote(
        &self,
        proposal_id: &ProposalId,
        voter: &MemberId,
        value: BallotValue,
    ) -> GovernanceResult<VoteOutcome> {
        self.controller
            .cast_council_vote(proposal_id, voter, value)
            .await
    }

    pub async fn react(
        &self,
        proposal_id: &ProposalId,
        member: &MemberId,
        kind: ReactionKind,
    ) -> GovernanceResult<ReactionSummary> {
        self.controller.react(proposal_id, member, kind).await
    }

    pub async fn record_funding_outcome(
        &self,
        proposal_id: &ProposalId,
        success: bool,
        note: Option<String>,
    ) -> GovernanceResult<Proposal> {
        self.controller
            .record_funding_outcome(proposal_id, success, note)
            .await
    }

    pub async fn get_proposal(&self, proposal_id: &ProposalId) -> GovernanceResult<Proposal> {
        self.controller.get_proposal(proposal_id).await
    }

    pub async fn get_revisions(&self, proposal_id: &ProposalId) -> GovernanceResult<Vec<Revision>> {
        self.controller.get_revisions(proposal_id).await
    }

    pub async fn vote_tally(&self, proposal_id: &ProposalId) -> GovernanceResult<VoteTally> {
        self.controller.vote_tally(proposal_id).await
    }

    pub async fn reaction_summary(
        &self,
        proposal_id: &ProposalId,
        member: &MemberId,
    ) -> GovernanceResult<ReactionSummary> {
        self.controller.reaction_summary(proposal_id, member).await
    }

    /// Proposals matching the query, most recently updated first.
    pub async fn list_proposals(&self, query: ProposalQuery) -> GovernanceResult<Vec<Proposal>> {
        let proposals = self.store.list_proposals(QueryWindow::default()).await?;

        let mut results: Vec<_> = proposals
            .into_iter()
            .filter(|proposal| {
                if let Some(status) = query.status {
                    if proposal.status != status {
                        return false;
                    }
                }

                if let Some(ref proposer) = query.proposer {
                    if &proposal.proposer.wallet != proposer {
                        return false;
                    }
                }

                if let Some(after) = query.after {
                    if proposal.created_at < after {
                        return false;
                    }
                }

                if let Some(before) = query.before {
                    if proposal.created_at > before {
                        return false;
                    }
                }

                true
            })
            .collect();

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    /// Counts by status plus the live/terminal split.
    pub async fn statistics(&self) -> GovernanceResult<GovernanceStatistics> {
        let proposals = self.store.list_proposals(QueryWindow::default()).await?;

        let total_proposals = proposals.len();
        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut live = 0;
        let mut terminal = 0;
        for proposal in &proposals {
            *by_status
                .entry(proposal.status.as_str().to_string())
                .or_insert(0) += 1;
            if proposal.status.is_terminal() {
                terminal += 1;
            } else {
                live += 1;
            }
        }

        Ok(GovernanceStatistics {
            total_proposals,
            by_status,
            live,
            terminal,
        })
    }

    /// Audit records, most recent first.
    pub async fn audit_log(&self, window: QueryWindow) -> GovernanceResult<Vec<AuditRecord>> {
        Ok(self.store.list_audit(window).await?)
    }

    /// Hash anchor of the audit chain head.
    pub async fn latest_audit_hash(&self) -> GovernanceResult<Option<String>> {
        Ok(self.store.latest_audit_hash().await?)
    }

    /// Projected step list for one proposal.
    pub async fn timeline(&self, proposal_id: &ProposalId) -> GovernanceResult<Vec<ProcessStep>> {
        let proposal = self.controller.get_proposal(proposal_id).await?;
        Ok(timeline::timeline(&proposal))
    }
}
