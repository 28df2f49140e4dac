use std::sync::Arc;

use agora_council::{ResolutionRule, StaticCouncilRoster};
use agora_evaluator::ScriptedEvaluator;
use agora_lifecycle::config::GovernanceConfig;
use agora_service::{GovernanceService, StepState};
use agora_store::memory::InMemoryGovernanceStore;
use agora_store::QueryWindow;
use agora_types::{
    BallotValue, Budget, EvaluationDecision, GovernanceError, MemberId, MemberRole, ProposalDraft,
    ProposalStatus, Proposer, ReactionKind,
};

const FIRST_TEXT: &str = "We will drill a community well near the school, train two \
     technicians for maintenance, and publish quarterly water quality reports.";

const SECOND_TEXT: &str = "Revised plan: drill the community well beside the clinic \
     instead, add a solar pump, and fund a two-year maintenance contract.";

fn proposer() -> MemberId {
    MemberId::new("wallet-asha")
}

fn draft(amount_minor: u64) -> ProposalDraft {
    ProposalDraft {
        title: "Community well".to_string(),
        summary: "Clean water for the north ward".to_string(),
        raw_text: FIRST_TEXT.to_string(),
        category: "infrastructure".to_string(),
        budget: Budget::new("USD", amount_minor),
        region: "north".to_string(),
        proposer: Proposer {
            wallet: proposer(),
            display_name: "Asha".to_string(),
            role: MemberRole::Member,
        },
    }
}

// Council threshold $1000.00, budgets in minor units.
fn setup(evaluator: Arc<ScriptedEvaluator>) -> GovernanceService {
    GovernanceService::new(
        Arc::new(InMemoryGovernanceStore::new()),
        evaluator,
        Arc::new(StaticCouncilRoster::new([
            MemberId::new("council-1"),
            MemberId::new("council-2"),
            MemberId::new("council-3"),
        ])),
        GovernanceConfig::default()
            .with_council_threshold(100_000)
            .with_resolution_rule(ResolutionRule::majority_of(3)),
    )
}

#[tokio::test]
async fn small_budget_auto_approves_without_council() {
    let service = setup(Arc::new(ScriptedEvaluator::new()));

    let proposal = service
        .submit_proposal(draft(50_000))
        .await
        .expect("submission should succeed");

    assert_eq!(proposal.status, ProposalStatus::Approved);
    assert_eq!(proposal.council_required, Some(false));
    assert_eq!(proposal.decision, Some(EvaluationDecision::Advance));
}

#[tokio::test]
async fn large_budget_goes_through_council_majority() {
    let service = setup(Arc::new(ScriptedEvaluator::new()));

    let proposal = service
        .submit_proposal(draft(500_000))
        .await
        .expect("submission should succeed");
    assert_eq!(proposal.status, ProposalStatus::Votable);
    assert_eq!(proposal.council_required, Some(true));

    let mut last = None;
    for voter in ["council-1", "council-2", "council-3"] {
        last = Some(
            service
                .cast_council_vote(&proposal.proposal_id, &MemberId::new(voter), BallotValue::For)
                .await
                .expect("council ballot should be accepted"),
        );
    }

    let outcome = last.expect("three ballots were cast");
    assert_eq!(outcome.new_status, Some(ProposalStatus::Approved));
    assert_eq!(outcome.tally.for_count, 3);
    assert_eq!(outcome.tally.against_count, 0);
    assert_eq!(outcome.tally.abstain_count, 0);

    let settled = service
        .get_proposal(&proposal.proposal_id)
        .await
        .expect("proposal should be readable");
    assert_eq!(settled.status, ProposalStatus::Approved);
}

#[tokio::test]
async fn revision_request_then_block_on_resubmit() {
    let evaluator = Arc::new(ScriptedEvaluator::new());
    evaluator.push_outcome(EvaluationDecision::Revise);
    evaluator.push_outcome(EvaluationDecision::Block);
    let service = setup(evaluator);

    let proposal = service
        .submit_proposal(draft(50_000))
        .await
        .expect("submission should succeed");
    assert_eq!(proposal.status, ProposalStatus::Submitted);
    assert!(
        !proposal.decision_reasons.is_empty(),
        "revise verdict must explain itself"
    );

    let resubmitted = service
        .resubmit_proposal(&proposal.proposal_id, SECOND_TEXT.to_string(), &proposer())
        .await
        .expect("resubmission should be accepted");
    assert_eq!(resubmitted.status, ProposalStatus::Rejected);

    let revisions = service
        .get_revisions(&proposal.proposal_id)
        .await
        .expect("revisions should be readable");
    assert_eq!(revisions.len(), 1, "one archived revision");
    assert_eq!(revisions[0].revision_number, 1);
    assert_eq!(revisions[0].decision, Some(EvaluationDecision::Revise));
    assert_eq!(revisions[0].raw_text, FIRST_TEXT);
}

#[tokio::test]
async fn withdrawal_closes_voting() {
    let service = setup(Arc::new(ScriptedEvaluator::new()));

    let proposal = service
        .submit_proposal(draft(500_000))
        .await
        .expect("submission should succeed");
    assert_eq!(proposal.status, ProposalStatus::Votable);

    let withdrawn = service
        .withdraw_proposal(&proposal.proposal_id, &proposer())
        .await
        .expect("proposer should be able to withdraw");
    assert_eq!(withdrawn.status, ProposalStatus::Withdrawn);

    let err = service
        .cast_council_vote(&proposal.proposal_id, &MemberId::new("council-1"), BallotValue::For)
        .await
        .expect_err("ballots after withdrawal must fail");
    assert!(
        matches!(err, GovernanceError::VotingClosed(_)),
        "expected VotingClosed, got {err}"
    );
}

#[tokio::test]
async fn funded_lifecycle_walks_every_step() {
    let service = setup(Arc::new(ScriptedEvaluator::new()));

    let proposal = service
        .submit_proposal(draft(500_000))
        .await
        .expect("submission should succeed");
    let id = proposal.proposal_id.clone();

    service
        .cast_council_vote(&id, &MemberId::new("council-1"), BallotValue::For)
        .await
        .expect("first ballot");
    service
        .cast_council_vote(&id, &MemberId::new("council-2"), BallotValue::Abstain)
        .await
        .expect("second ballot");
    let resolved = service
        .cast_council_vote(&id, &MemberId::new("council-3"), BallotValue::For)
        .await
        .expect("third ballot");
    assert_eq!(resolved.new_status, Some(ProposalStatus::Approved));

    let funded = service
        .record_funding_outcome(&id, true, Some("disbursed by treasury".to_string()))
        .await
        .expect("funding outcome should be recorded");
    assert_eq!(funded.status, ProposalStatus::Funded);

    let steps = service.timeline(&id).await.expect("timeline should project");
    assert!(
        steps.iter().all(|step| step.state == StepState::Completed),
        "every step completes on the funded path"
    );

    let audit = service
        .audit_log(QueryWindow::default())
        .await
        .expect("audit log should be readable");
    let mut stages: Vec<&str> = audit.iter().map(|r| r.stage.as_str()).collect();
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
    let anchor = service
        .latest_audit_hash()
        .await
        .expect("anchor should be readable")
        .expect("chain is non-empty");
    assert_eq!(anchor, audit[0].hash);
}

#[tokio::test]
async fn terminal_status_rejects_every_mutation() {
    let service = setup(Arc::new(ScriptedEvaluator::new()));

    let proposal = service
        .submit_proposal(draft(50_000))
        .await
        .expect("submission should succeed");
    let id = proposal.proposal_id.clone();
    service
        .record_funding_outcome(&id, true, None)
        .await
        .expect("funding outcome should be recorded");

    assert!(matches!(
        service
            .resubmit_proposal(&id, SECOND_TEXT.to_string(), &proposer())
            .await,
        Err(GovernanceError::InvalidState(_))
    ));
    assert!(matches!(
        service
            .cast_council_vote(&id, &MemberId::new("council-1"), BallotValue::For)
            .await,
        Err(GovernanceError::VotingClosed(_))
    ));
    assert!(matches!(
        service.react(&id, &proposer(), ReactionKind::Support).await,
        Err(GovernanceError::InvalidState(_))
    ));
    assert!(matches!(
        service.withdraw_proposal(&id, &proposer()).await,
        Err(GovernanceError::AlreadyTerminal(_))
    ));
    assert!(matches!(
        service.record_funding_outcome(&id, false, None).await,
        Err(GovernanceError::AlreadyTerminal(_))
    ));

    // Reads stay open.
    assert!(service.get_proposal(&id).await.is_ok());
    assert!(service.get_revisions(&id).await.is_ok());
}
