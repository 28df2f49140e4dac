//! Lifecycle controller: the single writer for proposal status.
//!
//! Wires the evaluator gateway, the decision gate, council resolution,
//! reaction toggles, and revision snapshots over one [`GovernanceStore`].
//! Mutations to a proposal are serialized behind a per-proposal guard;
//! the store's compare-and-swap writes cover controller instances that
//! share a backend.

#![deny(unsafe_code)]

pub mod config;
pub mod events;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use agora_council::{tally, CouncilRoster, VoteTally};
use agora_evaluator::{EvaluationRequest, ProposalEvaluator};
use agora_gate::{explain, requires_council, route_with_requirement, RoutingOutcome};
use agora_reactions::{apply_toggle, summarize, ReactionSummary};
use agora_revisions::snapshot;
use agora_store::{
    AuditAppend, EvaluationUpdate, GovernanceStore, QueryWindow, ResubmissionUpdate,
};
use agora_types::{
    BallotValue, CouncilBallot, Evaluation, EvaluationAudit, EvaluationDecision, FundingOutcome,
    GovernanceError, GovernanceResult, MemberId, Proposal, ProposalDraft, ProposalId,
    ProposalStatus, ReactionKind, Revision,
};

use crate::config::GovernanceConfig;
use crate::events::ProposalEvent;

/// Result of one accepted ballot: the running tally and, when that ballot
/// satisfied the resolution rule, the status the proposal moved to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub tally: VoteTally,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<ProposalStatus>,
}

/// Evaluation output already routed through the gate, ready to persist.
struct RoutedEvaluation {
    evaluation: Evaluation,
    audit: EvaluationAudit,
    decision: EvaluationDecision,
    decision_reasons: Vec<String>,
    council_required: bool,
    outcome: RoutingOutcome,
    new_status: ProposalStatus,
}

/// Orchestrates the proposal state machine.
///
/// Every status write flows through [`events::apply`] first, so the
/// enumerated transition table is the only place legality is decided.
pub struct LifecycleController {
    store: Arc<dyn GovernanceStore>,
    evaluator: Arc<dyn ProposalEvaluator>,
    roster: Arc<dyn CouncilRoster>,
    config: GovernanceConfig,
    // One guard per proposal; all mutating operations hold it for their
    // full read-decide-write span.
    guards: Mutex<HashMap<ProposalId, Arc<tokio::sync::Mutex<()>>>>,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn GovernanceStore>,
        evaluator: Arc<dyn ProposalEvaluator>,
        roster: Arc<dyn CouncilRoster>,
        config: GovernanceConfig,
    ) -> Self {
        Self {
            store,
            evaluator,
            roster,
            config,
            guards: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Validates and persists a draft, then runs the first evaluation and
    /// applies whatever status the gate routes to.
    ///
    /// If the evaluator fails or times out the proposal is left in
    /// `submitted` with no evaluation attached and the error is returned;
    /// the proposer can resubmit once the engine is back.
    pub async fn submit_proposal(&self, draft: ProposalDraft) -> GovernanceResult<Proposal> {
        self.validate_draft(&draft)?;

        let proposal_id = ProposalId::generate();
        let proposer = draft.proposer.wallet.clone();
        let submitted = ProposalEvent::Submitted {
            proposer: proposer.clone(),
        };
        let status = events::apply(None, &submitted)?;
        let mut proposal = Proposal::from_draft(draft, proposal_id.clone(), Utc::now());
        proposal.status = status;

        // The id is unpublished until this returns, so no guard is needed
        // for the initial evaluation below.
        self.store.create_proposal(proposal.clone()).await?;
        self.append_audit(
            &proposal_id,
            proposer.0.as_str(),
            submitted.stage(),
            true,
            format!("proposal '{}' submitted", proposal.title),
            serde_json::json!({
                "category": proposal.category,
                "currency": proposal.budget.currency,
                "amount_requested": proposal.budget.amount_requested,
            }),
        )
        .await?;
        info!(proposal_id = %proposal_id, title = %proposal.title, "proposal submitted");

        let routed = self.evaluate_for_routing(&proposal).await?;
        let decision = routed.decision;
        let outcome = routed.outcome;
        let new_status = routed.new_status;
        let engine_version = routed.audit.engine_version.clone();

        self.store
            .apply_evaluation(
                &proposal_id,
                proposal.version,
                EvaluationUpdate {
                    evaluation: routed.evaluation,
                    audit: routed.audit,
                    decision: routed.decision,
                    decision_reasons: routed.decision_reasons,
                    council_required: routed.council_required,
                    new_status,
                    updated_at: Utc::now(),
                },
            )
            .await?;
        self.audit_evaluation(&proposal_id, decision, outcome, new_status, &engine_version)
            .await?;
        info!(
            proposal_id = %proposal_id,
            decision = decision.as_str(),
            status = new_status.as_str(),
            "evaluation routed"
        );

        self.fetch(&proposal_id).await
    }

    /// Replaces the proposal text: the superseded state is archived as the
    /// next revision, the new text is re-evaluated, and the gate routes the
    /// fresh outcome. Ballots are cleared when the proposal re-enters
    /// `votable`, since any prior ballots applied to superseded text.
    ///
    /// Archive, content swap, routed status, and ballot reset commit
    /// atomically; an evaluator failure leaves the proposal untouched.
    pub async fn resubmit_proposal(
        &self,
        proposal_id: &ProposalId,
        new_text: String,
        caller: &MemberId,
    ) -> GovernanceResult<Proposal> {
        let guard = self.guard_for(proposal_id)?;
        let _held = guard.lock().await;

        let proposal = self.fetch(proposal_id).await?;
        if &proposal.proposer.wallet != caller {
            return Err(GovernanceError::Forbidden(format!(
                "only the proposer may resubmit {proposal_id}"
            )));
        }

        let prior_revisions = self.store.list_revisions(proposal_id).await?;
        let resubmitted = ProposalEvent::Resubmitted {
            revision_number: prior_revisions.len() as u32 + 1,
        };
        events::apply(Some(proposal.status), &resubmitted)?;
        self.validate_text(&new_text)?;

        let archived = snapshot(&proposal);
        let mut candidate = proposal.clone();
        candidate.raw_text = new_text.clone();
        let routed = self.evaluate_for_routing(&candidate).await?;
        let decision = routed.decision;
        let outcome = routed.outcome;
        let new_status = routed.new_status;
        let engine_version = routed.audit.engine_version.clone();
        let reset_ballots = new_status == ProposalStatus::Votable;

        let revision = self
            .store
            .commit_resubmission(
                proposal_id,
                proposal.version,
                archived,
                ResubmissionUpdate {
                    raw_text: new_text,
                    evaluation: routed.evaluation,
                    audit: routed.audit,
                    decision: routed.decision,
                    decision_reasons: routed.decision_reasons,
                    council_required: routed.council_required,
                    new_status,
                    reset_ballots,
                    submitted_at: Utc::now(),
                },
            )
            .await?;

        self.append_audit(
            proposal_id,
            caller.0.as_str(),
            resubmitted.stage(),
            true,
            format!("revision {} archived", revision.revision_number),
            serde_json::json!({
                "revision_number": revision.revision_number,
                "ballots_reset": reset_ballots,
            }),
        )
        .await?;
        self.audit_evaluation(proposal_id, decision, outcome, new_status, &engine_version)
            .await?;
        info!(
            proposal_id = %proposal_id,
            revision = revision.revision_number,
            status = new_status.as_str(),
            "proposal resubmitted"
        );

        self.fetch(proposal_id).await
    }

    /// Proposer-only withdrawal, valid while the proposal is still
    /// `submitted` or `votable`.
    pub async fn withdraw_proposal(
        &self,
        proposal_id: &ProposalId,
        caller: &MemberId,
    ) -> GovernanceResult<Proposal> {
        let guard = self.guard_for(proposal_id)?;
        let _held = guard.lock().await;

        let proposal = self.fetch(proposal_id).await?;
        if &proposal.proposer.wallet != caller {
            return Err(GovernanceError::Forbidden(format!(
                "only the proposer may withdraw {proposal_id}"
            )));
        }
        if proposal.status.is_terminal() {
            return Err(GovernanceError::AlreadyTerminal(format!(
                "proposal {proposal_id} is already {}",
                proposal.status
            )));
        }

        let event = ProposalEvent::Withdrawn { by: caller.clone() };
        let new_status = events::apply(Some(proposal.status), &event)?;
        self.store
            .transition_status(proposal_id, proposal.status, new_status, Utc::now())
            .await?;
        self.append_audit(
            proposal_id,
            caller.0.as_str(),
            event.stage(),
            true,
            format!("withdrawn while {}", proposal.status),
            serde_json::json!({ "from": proposal.status.as_str() }),
        )
        .await?;
        info!(proposal_id = %proposal_id, "proposal withdrawn");

        self.fetch(proposal_id).await
    }

    /// Records one council ballot, replacing any prior ballot from the same
    /// voter, and evaluates the resolution rule on the fresh tally.
    ///
    /// The first ballot to satisfy the rule moves the proposal out of
    /// `votable`; every later ballot fails with `VotingClosed`.
    pub async fn cast_council_vote(
        &self,
        proposal_id: &ProposalId,
        voter: &MemberId,
        value: BallotValue,
    ) -> GovernanceResult<VoteOutcome> {
        let guard = self.guard_for(proposal_id)?;
        let _held = guard.lock().await;

        let proposal = self.fetch(proposal_id).await?;
        if !self.roster.is_council_member(voter).await? {
            return Err(GovernanceError::Forbidden(format!(
                "{voter} does not hold a council seat"
            )));
        }
        if !proposal.status.accepts_votes() {
            return Err(GovernanceError::VotingClosed(format!(
                "proposal {proposal_id} is {}, ballots are closed",
                proposal.status
            )));
        }

        let event = ProposalEvent::BallotCast {
            voter: voter.clone(),
            value,
        };
        events::apply(Some(proposal.status), &event)?;

        let ballots = self
            .store
            .upsert_ballot(CouncilBallot {
                proposal_id: proposal_id.clone(),
                voter_id: voter.clone(),
                value,
                cast_at: Utc::now(),
            })
            .await?;
        self.append_audit(
            proposal_id,
            voter.0.as_str(),
            event.stage(),
            true,
            "council ballot recorded".to_string(),
            serde_json::json!({ "value": value }),
        )
        .await?;

        let counts = tally(&ballots);
        let Some(verdict) = self.config.resolution_rule.resolve(&counts) else {
            return Ok(VoteOutcome {
                tally: counts,
                new_status: None,
            });
        };

        let resolved = ProposalEvent::Resolved { verdict };
        let new_status = events::apply(Some(proposal.status), &resolved)?;
        self.store
            .transition_status(proposal_id, ProposalStatus::Votable, new_status, Utc::now())
            .await?;
        self.append_audit(
            proposal_id,
            "council",
            resolved.stage(),
            true,
            format!(
                "vote resolved to {} ({} for, {} against, {} abstain)",
                new_status, counts.for_count, counts.against_count, counts.abstain_count
            ),
            serde_json::json!({
                "for": counts.for_count,
                "against": counts.against_count,
                "abstain": counts.abstain_count,
            }),
        )
        .await?;
        info!(
            proposal_id = %proposal_id,
            status = new_status.as_str(),
            "council vote resolved"
        );

        Ok(VoteOutcome {
            tally: counts,
            new_status: Some(new_status),
        })
    }

    /// Toggles the member's reaction and returns the fresh counts. Never
    /// touches status; allowed in every non-terminal status.
    pub async fn react(
        &self,
        proposal_id: &ProposalId,
        member: &MemberId,
        kind: ReactionKind,
    ) -> GovernanceResult<ReactionSummary> {
        let guard = self.guard_for(proposal_id)?;
        let _held = guard.lock().await;

        let proposal = self.fetch(proposal_id).await?;
        if proposal.status.is_terminal() {
            return Err(GovernanceError::InvalidState(format!(
                "proposal {proposal_id} is {}, reactions are closed",
                proposal.status
            )));
        }

        let reactions = self.store.list_reactions(proposal_id).await?;
        let prior = reactions
            .iter()
            .find(|reaction| &reaction.member_id == member)
            .map(|reaction| reaction.kind);
        let next = apply_toggle(prior, kind);
        self.store
            .put_reaction(proposal_id, member, next, Utc::now())
            .await?;

        let reactions = self.store.list_reactions(proposal_id).await?;
        Ok(summarize(&reactions, member))
    }

    /// Records the external disbursement outcome for an approved proposal,
    /// landing it on `funded` or `failed`.
    pub async fn record_funding_outcome(
        &self,
        proposal_id: &ProposalId,
        success: bool,
        note: Option<String>,
    ) -> GovernanceResult<Proposal> {
        let guard = self.guard_for(proposal_id)?;
        let _held = guard.lock().await;

        let proposal = self.fetch(proposal_id).await?;
        if proposal.status.is_terminal() {
            return Err(GovernanceError::AlreadyTerminal(format!(
                "proposal {proposal_id} is already {}",
                proposal.status
            )));
        }

        let event = ProposalEvent::FundingRecorded { success };
        let new_status = events::apply(Some(proposal.status), &event)?;
        self.store
            .set_funding_outcome(
                proposal_id,
                proposal.status,
                FundingOutcome {
                    success,
                    note,
                    recorded_at: Utc::now(),
                },
                new_status,
            )
            .await?;
        self.append_audit(
            proposal_id,
            "treasury",
            event.stage(),
            true,
            format!("funding outcome recorded, proposal {new_status}"),
            serde_json::json!({ "success": success }),
        )
        .await?;
        info!(
            proposal_id = %proposal_id,
            status = new_status.as_str(),
            "funding outcome recorded"
        );

        self.fetch(proposal_id).await
    }

    pub async fn get_proposal(&self, proposal_id: &ProposalId) -> GovernanceResult<Proposal> {
        self.fetch(proposal_id).await
    }

    pub async fn list_proposals(&self, window: QueryWindow) -> GovernanceResult<Vec<Proposal>> {
        Ok(self.store.list_proposals(window).await?)
    }

    /// Archived revisions in ascending order, oldest first.
    pub async fn get_revisions(&self, proposal_id: &ProposalId) -> GovernanceResult<Vec<Revision>> {
        self.fetch(proposal_id).await?;
        Ok(self.store.list_revisions(proposal_id).await?)
    }

    /// Current ballot counts, resolved or not.
    pub async fn vote_tally(&self, proposal_id: &ProposalId) -> GovernanceResult<VoteTally> {
        self.fetch(proposal_id).await?;
        let ballots = self.store.list_ballots(proposal_id).await?;
        Ok(tally(&ballots))
    }

    /// Reaction counts plus the asking member's own reaction.
    pub async fn reaction_summary(
        &self,
        proposal_id: &ProposalId,
        member: &MemberId,
    ) -> GovernanceResult<ReactionSummary> {
        self.fetch(proposal_id).await?;
        let reactions = self.store.list_reactions(proposal_id).await?;
        Ok(summarize(&reactions, member))
    }

    fn guard_for(&self, proposal_id: &ProposalId) -> GovernanceResult<Arc<tokio::sync::Mutex<()>>> {
        let mut guards = self
            .guards
            .lock()
            .map_err(|_| GovernanceError::Store("proposal guard registry poisoned".to_string()))?;
        // Clones are only handed out under this lock, so a strong count of
        // one means no operation holds or awaits the guard anymore.
        guards.retain(|_, guard| Arc::strong_count(guard) > 1);
        Ok(guards.entry(proposal_id.clone()).or_default().clone())
    }

    fn validate_draft(&self, draft: &ProposalDraft) -> GovernanceResult<()> {
        if draft.title.trim().is_empty() {
            return Err(GovernanceError::Validation(
                "title must not be empty".to_string(),
            ));
        }
        if draft.budget.amount_requested == 0 {
            return Err(GovernanceError::Validation(
                "requested amount must be positive".to_string(),
            ));
        }
        self.validate_text(&draft.raw_text)
    }

    fn validate_text(&self, raw_text: &str) -> GovernanceResult<()> {
        let length = raw_text.trim().chars().count();
        if length < self.config.min_text_len {
            return Err(GovernanceError::Validation(format!(
                "proposal text must be at least {} characters, got {length}",
                self.config.min_text_len
            )));
        }
        Ok(())
    }

    async fn fetch(&self, proposal_id: &ProposalId) -> GovernanceResult<Proposal> {
        self.store
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(proposal_id.to_string()))
    }

    /// Calls the evaluation engine under the configured timeout and routes
    /// the report through the gate. A failed or timed-out call is recorded
    /// in the audit log and surfaced as `EvaluatorUnavailable`; nothing is
    /// written to the proposal itself.
    async fn evaluate_for_routing(&self, proposal: &Proposal) -> GovernanceResult<RoutedEvaluation> {
        let request = EvaluationRequest {
            proposal_id: proposal.proposal_id.clone(),
            title: proposal.title.clone(),
            category: proposal.category.clone(),
            raw_text: proposal.raw_text.clone(),
        };
        let timeout = Duration::from_millis(self.config.evaluation_timeout_ms);
        let report = match tokio::time::timeout(timeout, self.evaluator.evaluate(request)).await {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => {
                return self
                    .evaluation_failed(&proposal.proposal_id, err.to_string())
                    .await;
            }
            Err(_) => {
                return self
                    .evaluation_failed(
                        &proposal.proposal_id,
                        format!(
                            "evaluation timed out after {}ms",
                            self.config.evaluation_timeout_ms
                        ),
                    )
                    .await;
            }
        };

        // councilRequired is computed once, at first evaluation; budgets
        // are immutable after submission so it never flips.
        let council_required = proposal.council_required.unwrap_or_else(|| {
            requires_council(
                proposal.budget.amount_requested,
                self.config.council_threshold_minor,
            )
        });
        let outcome = route_with_requirement(&report.evaluation, council_required);
        let new_status = events::apply(
            Some(proposal.status),
            &ProposalEvent::Evaluated {
                outcome,
                engine_version: report.evaluation.engine_version.clone(),
            },
        )?;
        let decision = report.evaluation.decision;
        let decision_reasons = explain(&report.evaluation, outcome);
        let audit = EvaluationAudit {
            engine_version: report.evaluation.engine_version.clone(),
            checks: report.checks,
        };

        Ok(RoutedEvaluation {
            evaluation: report.evaluation,
            audit,
            decision,
            decision_reasons,
            council_required,
            outcome,
            new_status,
        })
    }

    async fn evaluation_failed(
        &self,
        proposal_id: &ProposalId,
        reason: String,
    ) -> GovernanceResult<RoutedEvaluation> {
        warn!(proposal_id = %proposal_id, reason = %reason, "evaluation failed");
        self.append_audit(
            proposal_id,
            "evaluator",
            "evaluation",
            false,
            reason.clone(),
            serde_json::Value::Null,
        )
        .await?;
        Err(GovernanceError::EvaluatorUnavailable(reason))
    }

    async fn audit_evaluation(
        &self,
        proposal_id: &ProposalId,
        decision: EvaluationDecision,
        outcome: RoutingOutcome,
        new_status: ProposalStatus,
        engine_version: &str,
    ) -> GovernanceResult<()> {
        self.append_audit(
            proposal_id,
            "evaluator",
            "evaluation",
            true,
            format!("decision {} routed to {new_status}", decision.as_str()),
            serde_json::json!({
                "decision": decision.as_str(),
                "outcome": outcome,
                "engine_version": engine_version,
            }),
        )
        .await
    }

    async fn append_audit(
        &self,
        proposal_id: &ProposalId,
        actor: &str,
        stage: &str,
        success: bool,
        message: String,
        payload: serde_json::Value,
    ) -> GovernanceResult<()> {
        self.store
            .append_audit(AuditAppend {
                timestamp: Utc::now(),
                actor: actor.to_string(),
                stage: stage.to_string(),
                success,
                message,
                proposal_id: Some(proposal_id.clone()),
                payload,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_council::{ResolutionRule, StaticCouncilRoster};
    use agora_evaluator::{EvaluationReport, EvaluatorError, ScriptedEvaluator};
    use agora_store::memory::InMemoryGovernanceStore;
    use agora_store::{AuditStore, ProposalStore};
    use agora_types::{Budget, MemberRole, Proposer};

    const LONG_TEXT: &str = "We will drill a community well near the school, train two \
         technicians for maintenance, and publish quarterly water quality reports.";

    const REVISED_TEXT: &str = "Revised plan: drill the community well beside the clinic \
         instead, add a solar pump, and fund a two-year maintenance contract.";

    fn draft(amount: u64) -> ProposalDraft {
        ProposalDraft {
            title: "Community well".to_string(),
            summary: "Clean water for the north ward".to_string(),
            raw_text: LONG_TEXT.to_string(),
            category: "infrastructure".to_string(),
            budget: Budget::new("USD", amount),
            region: "north".to_string(),
            proposer: Proposer {
                wallet: MemberId::new("wallet-asha"),
                display_name: "Asha".to_string(),
                role: MemberRole::Member,
            },
        }
    }

    fn proposer() -> MemberId {
        MemberId::new("wallet-asha")
    }

    fn roster() -> Arc<StaticCouncilRoster> {
        Arc::new(StaticCouncilRoster::new([
            MemberId::new("council-1"),
            MemberId::new("council-2"),
            MemberId::new("council-3"),
        ]))
    }

    fn controller_with(
        store: Arc<InMemoryGovernanceStore>,
        evaluator: Arc<dyn ProposalEvaluator>,
        config: GovernanceConfig,
    ) -> LifecycleController {
        LifecycleController::new(store, evaluator, roster(), config)
    }

    fn controller() -> LifecycleController {
        controller_with(
            Arc::new(InMemoryGovernanceStore::new()),
            Arc::new(ScriptedEvaluator::new()),
            GovernanceConfig::default(),
        )
    }

    fn scripted(decisions: &[EvaluationDecision]) -> Arc<ScriptedEvaluator> {
        let evaluator = ScriptedEvaluator::new();
        for decision in decisions {
            evaluator.push_outcome(*decision);
        }
        Arc::new(evaluator)
    }

    struct DownEvaluator;

    #[async_trait::async_trait]
    impl ProposalEvaluator for DownEvaluator {
        async fn evaluate(
            &self,
            _request: EvaluationRequest,
        ) -> Result<EvaluationReport, EvaluatorError> {
            Err(EvaluatorError::Unavailable("engine offline".to_string()))
        }
    }

    #[tokio::test]
    async fn submit_auto_approves_under_threshold() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(50_000)).await.unwrap();

        assert_eq!(proposal.status, ProposalStatus::Approved);
        assert_eq!(proposal.council_required, Some(false));
        assert_eq!(proposal.decision, Some(EvaluationDecision::Advance));
        assert!(proposal.evaluation.is_some());
        assert!(proposal.funding.is_none());
        assert_eq!(proposal.version, 2);
    }

    #[tokio::test]
    async fn submit_routes_large_budget_to_council() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(250_000)).await.unwrap();

        assert_eq!(proposal.status, ProposalStatus::Votable);
        assert_eq!(proposal.council_required, Some(true));
    }

    #[tokio::test]
    async fn submit_rejects_blocked_text() {
        let store = Arc::new(InMemoryGovernanceStore::new());
        let controller = controller_with(
            store,
            scripted(&[EvaluationDecision::Block]),
            GovernanceConfig::default(),
        );
        let proposal = controller.submit_proposal(draft(50_000)).await.unwrap();

        assert_eq!(proposal.status, ProposalStatus::Rejected);
        assert_eq!(
            proposal.decision_reasons.first().map(String::as_str),
            Some("evaluation blocked the proposal")
        );
    }

    #[tokio::test]
    async fn revise_decision_keeps_proposal_submitted() {
        let store = Arc::new(InMemoryGovernanceStore::new());
        let controller = controller_with(
            store,
            scripted(&[EvaluationDecision::Revise]),
            GovernanceConfig::default(),
        );
        let proposal = controller.submit_proposal(draft(50_000)).await.unwrap();

        assert_eq!(proposal.status, ProposalStatus::Submitted);
        assert_eq!(proposal.decision, Some(EvaluationDecision::Revise));
        assert!(!proposal.status.is_terminal());
    }

    #[tokio::test]
    async fn submit_validates_draft_fields() {
        let controller = controller();

        let mut short = draft(50_000);
        short.raw_text = "tiny".to_string();
        assert!(matches!(
            controller.submit_proposal(short).await,
            Err(GovernanceError::Validation(_))
        ));

        let mut free = draft(50_000);
        free.budget.amount_requested = 0;
        assert!(matches!(
            controller.submit_proposal(free).await,
            Err(GovernanceError::Validation(_))
        ));

        let mut untitled = draft(50_000);
        untitled.title = "  ".to_string();
        assert!(matches!(
            controller.submit_proposal(untitled).await,
            Err(GovernanceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn evaluator_outage_leaves_proposal_submitted() {
        let store = Arc::new(InMemoryGovernanceStore::new());
        let controller = controller_with(
            store.clone(),
            Arc::new(DownEvaluator),
            GovernanceConfig::default(),
        );

        let err = controller.submit_proposal(draft(50_000)).await.unwrap_err();
        assert!(matches!(err, GovernanceError::EvaluatorUnavailable(_)));

        let stored = store.list_proposals(QueryWindow::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, ProposalStatus::Submitted);
        assert!(stored[0].evaluation.is_none());
    }

    #[tokio::test]
    async fn evaluation_timeout_leaves_prior_status() {
        let store = Arc::new(InMemoryGovernanceStore::new());
        let evaluator = Arc::new(ScriptedEvaluator::new().with_latency(Duration::from_millis(200)));
        let controller = controller_with(
            store.clone(),
            evaluator,
            GovernanceConfig::default().with_evaluation_timeout_ms(20),
        );

        let err = controller.submit_proposal(draft(50_000)).await.unwrap_err();
        match err {
            GovernanceError::EvaluatorUnavailable(reason) => {
                assert!(reason.contains("timed out"))
            }
            other => panic!("expected EvaluatorUnavailable, got {other:?}"),
        }

        let stored = store.list_proposals(QueryWindow::default()).await.unwrap();
        assert_eq!(stored[0].status, ProposalStatus::Submitted);
    }

    #[tokio::test]
    async fn resubmit_archives_snapshot_and_reroutes() {
        let controller = controller_with(
            Arc::new(InMemoryGovernanceStore::new()),
            scripted(&[EvaluationDecision::Revise, EvaluationDecision::Advance]),
            GovernanceConfig::default(),
        );

        let proposal = controller.submit_proposal(draft(50_000)).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Submitted);

        let updated = controller
            .resubmit_proposal(&proposal.proposal_id, REVISED_TEXT.to_string(), &proposer())
            .await
            .unwrap();
        assert_eq!(updated.status, ProposalStatus::Approved);
        assert_eq!(updated.raw_text, REVISED_TEXT);
        assert_eq!(updated.version, 3);

        let revisions = controller.get_revisions(&proposal.proposal_id).await.unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].revision_number, 1);
        assert_eq!(revisions[0].raw_text, LONG_TEXT);
        assert_eq!(revisions[0].status_at_time, ProposalStatus::Submitted);
        assert_eq!(
            revisions[0].decision,
            Some(EvaluationDecision::Revise),
            "archived revision keeps the superseded decision"
        );
    }

    #[tokio::test]
    async fn resubmit_back_into_votable_resets_ballots() {
        let controller = controller_with(
            Arc::new(InMemoryGovernanceStore::new()),
            scripted(&[EvaluationDecision::Advance, EvaluationDecision::Advance]),
            GovernanceConfig::default(),
        );

        let proposal = controller.submit_proposal(draft(250_000)).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Votable);

        controller
            .cast_council_vote(&proposal.proposal_id, &MemberId::new("council-1"), BallotValue::For)
            .await
            .unwrap();
        assert_eq!(
            controller.vote_tally(&proposal.proposal_id).await.unwrap().total(),
            1
        );

        let updated = controller
            .resubmit_proposal(&proposal.proposal_id, REVISED_TEXT.to_string(), &proposer())
            .await
            .unwrap();
        assert_eq!(updated.status, ProposalStatus::Votable);
        assert_eq!(updated.council_required, Some(true));
        assert_eq!(
            controller.vote_tally(&proposal.proposal_id).await.unwrap().total(),
            0,
            "ballots cast against superseded text are discarded"
        );
    }

    #[tokio::test]
    async fn resubmit_is_proposer_only() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(50_000)).await.unwrap();

        let err = controller
            .resubmit_proposal(
                &proposal.proposal_id,
                REVISED_TEXT.to_string(),
                &MemberId::new("wallet-bo"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn resubmit_rejected_outside_live_statuses() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(50_000)).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Approved);

        let err = controller
            .resubmit_proposal(&proposal.proposal_id, REVISED_TEXT.to_string(), &proposer())
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn withdraw_from_live_statuses() {
        let controller = controller_with(
            Arc::new(InMemoryGovernanceStore::new()),
            scripted(&[EvaluationDecision::Revise]),
            GovernanceConfig::default(),
        );
        let proposal = controller.submit_proposal(draft(50_000)).await.unwrap();

        let withdrawn = controller
            .withdraw_proposal(&proposal.proposal_id, &proposer())
            .await
            .unwrap();
        assert_eq!(withdrawn.status, ProposalStatus::Withdrawn);

        let again = controller
            .withdraw_proposal(&proposal.proposal_id, &proposer())
            .await
            .unwrap_err();
        assert!(matches!(again, GovernanceError::AlreadyTerminal(_)));
    }

    #[tokio::test]
    async fn withdraw_not_allowed_once_approved() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(50_000)).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Approved);

        let err = controller
            .withdraw_proposal(&proposal.proposal_id, &proposer())
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn withdraw_is_proposer_only() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(250_000)).await.unwrap();

        let err = controller
            .withdraw_proposal(&proposal.proposal_id, &MemberId::new("wallet-bo"))
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn votes_require_a_council_seat() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(250_000)).await.unwrap();

        let err = controller
            .cast_council_vote(&proposal.proposal_id, &proposer(), BallotValue::For)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn votes_rejected_outside_votable() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(50_000)).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Approved);

        let err = controller
            .cast_council_vote(&proposal.proposal_id, &MemberId::new("council-1"), BallotValue::For)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::VotingClosed(_)));
    }

    #[tokio::test]
    async fn majority_resolves_and_closes_voting() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(250_000)).await.unwrap();
        let id = proposal.proposal_id;

        let first = controller
            .cast_council_vote(&id, &MemberId::new("council-1"), BallotValue::For)
            .await
            .unwrap();
        assert!(first.new_status.is_none());

        let second = controller
            .cast_council_vote(&id, &MemberId::new("council-2"), BallotValue::For)
            .await
            .unwrap();
        assert!(second.new_status.is_none(), "below the participation floor");

        let third = controller
            .cast_council_vote(&id, &MemberId::new("council-3"), BallotValue::Against)
            .await
            .unwrap();
        assert_eq!(third.new_status, Some(ProposalStatus::Approved));
        assert_eq!(third.tally.for_count, 2);
        assert_eq!(third.tally.against_count, 1);

        let late = controller
            .cast_council_vote(&id, &MemberId::new("council-2"), BallotValue::Against)
            .await
            .unwrap_err();
        assert!(matches!(late, GovernanceError::VotingClosed(_)));
    }

    #[tokio::test]
    async fn fixed_rule_can_reject_on_first_ballot() {
        let controller = controller_with(
            Arc::new(InMemoryGovernanceStore::new()),
            Arc::new(ScriptedEvaluator::new()),
            GovernanceConfig::default().with_resolution_rule(ResolutionRule::fixed(3, 1)),
        );
        let proposal = controller.submit_proposal(draft(250_000)).await.unwrap();

        let outcome = controller
            .cast_council_vote(
                &proposal.proposal_id,
                &MemberId::new("council-1"),
                BallotValue::Against,
            )
            .await
            .unwrap();
        assert_eq!(outcome.new_status, Some(ProposalStatus::Rejected));

        let settled = controller.get_proposal(&proposal.proposal_id).await.unwrap();
        assert_eq!(settled.status, ProposalStatus::Rejected);
        assert!(settled.status.is_terminal());
    }

    #[tokio::test]
    async fn recast_replaces_instead_of_double_counting() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(250_000)).await.unwrap();
        let id = proposal.proposal_id;

        controller
            .cast_council_vote(&id, &MemberId::new("council-1"), BallotValue::Against)
            .await
            .unwrap();
        let recast = controller
            .cast_council_vote(&id, &MemberId::new("council-1"), BallotValue::For)
            .await
            .unwrap();

        assert_eq!(recast.tally.for_count, 1);
        assert_eq!(recast.tally.against_count, 0);
        assert_eq!(recast.tally.total(), 1);
        assert!(recast.new_status.is_none());
    }

    #[tokio::test]
    async fn concurrent_votes_resolve_exactly_once() {
        let controller = std::sync::Arc::new(controller());
        let proposal = controller.submit_proposal(draft(250_000)).await.unwrap();
        let id = proposal.proposal_id.clone();

        let votes = ["council-1", "council-2", "council-3"].map(|voter| {
            let controller = controller.clone();
            let id = id.clone();
            async move {
                controller
                    .cast_council_vote(&id, &MemberId::new(voter), BallotValue::For)
                    .await
            }
        });
        let results = futures::future::join_all(votes).await;

        let resolutions = results
            .iter()
            .filter(|r| matches!(r, Ok(outcome) if outcome.new_status.is_some()))
            .count();
        assert_eq!(resolutions, 1, "exactly one ballot triggers the transition");
        assert!(results.iter().all(|r| r.is_ok()));

        let settled = controller.get_proposal(&id).await.unwrap();
        assert_eq!(settled.status, ProposalStatus::Approved);
    }

    #[tokio::test]
    async fn idle_proposal_guards_are_pruned() {
        let controller = controller();
        let first = controller.submit_proposal(draft(50_000)).await.unwrap();
        let second = controller.submit_proposal(draft(50_000)).await.unwrap();

        controller
            .react(&first.proposal_id, &MemberId::new("wallet-bo"), ReactionKind::Support)
            .await
            .unwrap();
        controller
            .react(&second.proposal_id, &MemberId::new("wallet-bo"), ReactionKind::Support)
            .await
            .unwrap();

        let guards = controller.guards.lock().unwrap();
        assert_eq!(guards.len(), 1, "idle entries are swept on the next acquisition");
        assert!(guards.contains_key(&second.proposal_id));
    }

    #[tokio::test]
    async fn reactions_toggle_and_never_gate_status() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(50_000)).await.unwrap();
        let id = proposal.proposal_id;
        let member = MemberId::new("wallet-bo");

        let first = controller.react(&id, &member, ReactionKind::Support).await.unwrap();
        assert_eq!(first.support, 1);
        assert_eq!(first.my_reaction, Some(ReactionKind::Support));

        let cleared = controller.react(&id, &member, ReactionKind::Support).await.unwrap();
        assert_eq!(cleared.support, 0);
        assert_eq!(cleared.my_reaction, None);

        let switched = controller.react(&id, &member, ReactionKind::Concern).await.unwrap();
        assert_eq!(switched.concern, 1);
        assert_eq!(switched.support, 0);
        assert_eq!(switched.my_reaction, Some(ReactionKind::Concern));

        let after = controller.get_proposal(&id).await.unwrap();
        assert_eq!(after.status, ProposalStatus::Approved);
    }

    #[tokio::test]
    async fn reactions_closed_on_terminal_proposals() {
        let controller = controller_with(
            Arc::new(InMemoryGovernanceStore::new()),
            scripted(&[EvaluationDecision::Block]),
            GovernanceConfig::default(),
        );
        let proposal = controller.submit_proposal(draft(50_000)).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Rejected);

        let err = controller
            .react(&proposal.proposal_id, &MemberId::new("wallet-bo"), ReactionKind::Support)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn funding_outcome_settles_approved_proposals() {
        let controller = controller();

        let funded = controller.submit_proposal(draft(50_000)).await.unwrap();
        let funded = controller
            .record_funding_outcome(&funded.proposal_id, true, Some("disbursed".to_string()))
            .await
            .unwrap();
        assert_eq!(funded.status, ProposalStatus::Funded);
        assert!(funded.funding.as_ref().is_some_and(|f| f.success));

        let failed = controller.submit_proposal(draft(50_000)).await.unwrap();
        let failed = controller
            .record_funding_outcome(&failed.proposal_id, false, None)
            .await
            .unwrap();
        assert_eq!(failed.status, ProposalStatus::Failed);

        let again = controller
            .record_funding_outcome(&funded.proposal_id, true, None)
            .await
            .unwrap_err();
        assert!(matches!(again, GovernanceError::AlreadyTerminal(_)));
    }

    #[tokio::test]
    async fn funding_outcome_requires_approval_first() {
        let controller = controller();
        let proposal = controller.submit_proposal(draft(250_000)).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Votable);

        let err = controller
            .record_funding_outcome(&proposal.proposal_id, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn audit_trail_follows_the_lifecycle() {
        let store = Arc::new(InMemoryGovernanceStore::new());
        let controller = controller_with(
            store.clone(),
            Arc::new(ScriptedEvaluator::new()),
            GovernanceConfig::default(),
        );

        let proposal = controller.submit_proposal(draft(250_000)).await.unwrap();
        let id = proposal.proposal_id;
        for voter in ["council-1", "council-2", "council-3"] {
            controller
                .cast_council_vote(&id, &MemberId::new(voter), BallotValue::For)
                .await
                .unwrap();
        }
        controller
            .record_funding_outcome(&id, true, None)
            .await
            .unwrap();

        let mut stages: Vec<String> = store
            .list_audit(QueryWindow::default())
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.stage)
            .collect();
        stages.reverse();
        assert_eq!(
            stages,
            vec![
                "submit",
                "evaluation",
                "council_vote",
                "council_vote",
                "council_vote",
                "council_resolution",
                "funding",
            ]
        );
    }

    #[tokio::test]
    async fn operations_on_unknown_ids_are_not_found() {
        let controller = controller();
        let ghost = ProposalId::generate();

        assert!(matches!(
            controller.get_proposal(&ghost).await,
            Err(GovernanceError::NotFound(_))
        ));
        assert!(matches!(
            controller.withdraw_proposal(&ghost, &proposer()).await,
            Err(GovernanceError::NotFound(_))
        ));
        assert!(matches!(
            controller
                .cast_council_vote(&ghost, &MemberId::new("council-1"), BallotValue::For)
                .await,
            Err(GovernanceError::NotFound(_))
        ));
    }
}
