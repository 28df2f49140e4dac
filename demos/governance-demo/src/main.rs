//! Agora Governance Lifecycle Demo
//!
//! Walks one in-memory governance engine through the full proposal
//! lifecycle: auto-approval, a council vote with funding, a requested
//! revision, a withdrawal, and the resulting audit ledger.

use std::sync::Arc;

use agora_council::{ResolutionRule, StaticCouncilRoster};
use agora_evaluator::ScriptedEvaluator;
use agora_lifecycle::config::GovernanceConfig;
use agora_revisions::verify_sequence;
use agora_service::{GovernanceService, ProcessStep, StepState};
use agora_store::memory::InMemoryGovernanceStore;
use agora_store::QueryWindow;
use agora_types::{
    BallotValue, Budget, EvaluationDecision, MemberId, MemberRole, ProposalDraft, ProposalStatus,
    Proposer,
};

use colored::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    println!(
        "{}",
        "╔══════════════════════════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║              Agora Governance Lifecycle Demonstration             ║".cyan()
    );
    println!(
        "{}",
        "║                                                                    ║".cyan()
    );
    println!(
        "{}",
        "║  One engine, five scenarios: auto-approval, council voting with   ║".cyan()
    );
    println!(
        "{}",
        "║  funding, requested revision, withdrawal, and the audit ledger.   ║".cyan()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════════╝".cyan()
    );
    println!();

    // Council threshold $1000.00; three-seat council resolving by majority.
    let evaluator = Arc::new(ScriptedEvaluator::new());
    let service = GovernanceService::new(
        Arc::new(InMemoryGovernanceStore::new()),
        evaluator.clone(),
        Arc::new(StaticCouncilRoster::new([
            MemberId::new("council-amara"),
            MemberId::new("council-badru"),
            MemberId::new("council-chidi"),
        ])),
        GovernanceConfig::default()
            .with_council_threshold(100_000)
            .with_resolution_rule(ResolutionRule::majority_of(3)),
    );

    demo_auto_approval(&service).await?;
    println!();

    demo_council_vote(&service).await?;
    println!();

    demo_revision_cycle(&service, &evaluator).await?;
    println!();

    demo_withdrawal(&service).await?;
    println!();

    demo_audit_ledger(&service).await?;

    println!();
    println!("{}", "Demo complete!".green().bold());
    Ok(())
}

fn section(title: &str) {
    println!(
        "{}",
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
            .yellow()
    );
    println!("  {}", title.yellow().bold());
    println!(
        "{}",
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
            .yellow()
    );
    println!();
}

fn draft(title: &str, amount_minor: u64, text: &str, wallet: &str, name: &str) -> ProposalDraft {
    ProposalDraft {
        title: title.to_string(),
        summary: format!("{title} for the north ward"),
        raw_text: text.to_string(),
        category: "infrastructure".to_string(),
        budget: Budget::new("USD", amount_minor),
        region: "north".to_string(),
        proposer: Proposer {
            wallet: MemberId::new(wallet),
            display_name: name.to_string(),
            role: MemberRole::Member,
        },
    }
}

fn print_status(label: &str, status: ProposalStatus) {
    let rendered = match status {
        ProposalStatus::Approved | ProposalStatus::Funded => status.as_str().green().bold(),
        ProposalStatus::Rejected | ProposalStatus::Failed => status.as_str().red().bold(),
        ProposalStatus::Withdrawn => status.as_str().magenta().bold(),
        ProposalStatus::Votable => status.as_str().blue().bold(),
        ProposalStatus::Submitted => status.as_str().normal(),
    };
    println!("    {label}: {rendered}");
}

fn print_timeline(steps: &[ProcessStep]) {
    for step in steps {
        let state = match step.state {
            StepState::Completed => "completed".green(),
            StepState::Active => "active".yellow(),
            StepState::Pending => "pending".normal(),
            StepState::Skipped => "skipped".blue(),
        };
        match &step.detail {
            Some(detail) => println!("    {:<14} {:<18} {}", step.name, state, detail.dimmed()),
            None => println!("    {:<14} {}", step.name, state),
        }
    }
}

async fn demo_auto_approval(service: &GovernanceService) -> anyhow::Result<()> {
    section("Scenario 1: Small budget auto-approves");

    let proposal = service
        .submit_proposal(draft(
            "Creek footbridge repair",
            45_000,
            "Replace the rotted planks on the creek footbridge, add a handrail on \
             the school side, and repaint the load markings before the rains.",
            "wallet-asha",
            "Asha",
        ))
        .await?;

    println!("  Submitted '{}' for $450.00", proposal.title);
    print_status("status", proposal.status);
    println!(
        "    {} budget sits under the council threshold, no vote needed",
        "→".cyan()
    );
    print_timeline(&service.timeline(&proposal.proposal_id).await?);
    Ok(())
}

async fn demo_council_vote(service: &GovernanceService) -> anyhow::Result<()> {
    section("Scenario 2: Large budget goes to the council");

    let proposal = service
        .submit_proposal(draft(
            "Solar microgrid for the market",
            750_000,
            "Install a 40kW solar array with battery storage behind the market \
             hall, wire twelve stalls, and train two residents as operators.",
            "wallet-asha",
            "Asha",
        ))
        .await?;
    let id = proposal.proposal_id.clone();

    println!("  Submitted '{}' for $7500.00", proposal.title);
    print_status("status", proposal.status);
    println!();

    println!("  Council ballots:");
    for (voter, value) in [
        ("council-amara", BallotValue::For),
        ("council-badru", BallotValue::For),
        ("council-chidi", BallotValue::Abstain),
    ] {
        let outcome = service
            .cast_council_vote(&id, &MemberId::new(voter), value)
            .await?;
        println!(
            "    {voter} votes {:?} (FOR {} / AGAINST {} / ABSTAIN {})",
            value,
            outcome.tally.for_count,
            outcome.tally.against_count,
            outcome.tally.abstain_count
        );
        if let Some(status) = outcome.new_status {
            print_status("resolved", status);
        }
    }

    println!();
    let funded = service
        .record_funding_outcome(&id, true, Some("treasury batch 2026-08".to_string()))
        .await?;
    println!("  Treasury reports disbursement:");
    print_status("status", funded.status);
    print_timeline(&service.timeline(&id).await?);
    Ok(())
}

async fn demo_revision_cycle(
    service: &GovernanceService,
    evaluator: &ScriptedEvaluator,
) -> anyhow::Result<()> {
    section("Scenario 3: Evaluation requests a revision");

    evaluator.push_outcome(EvaluationDecision::Revise);

    let proposal = service
        .submit_proposal(draft(
            "Night classes at the library",
            60_000,
            "Run adult literacy classes three evenings a week at the library, \
             covering materials, lighting, and a stipend for two volunteer tutors.",
            "wallet-binta",
            "Binta",
        ))
        .await?;
    let id = proposal.proposal_id.clone();

    println!("  Submitted '{}' for $600.00", proposal.title);
    print_status("status", proposal.status);
    for reason in &proposal.decision_reasons {
        println!("    {} {}", "reason:".dimmed(), reason);
    }
    println!();

    let resubmitted = service
        .resubmit_proposal(
            &id,
            "Run adult literacy classes three evenings a week at the library. \
             Materials cost $180, lighting upgrades $250, tutor stipends $170. \
             Attendance will be reported to the council monthly."
                .to_string(),
            &MemberId::new("wallet-binta"),
        )
        .await?;
    println!("  Proposer resubmits with an itemized budget:");
    print_status("status", resubmitted.status);

    let revisions = service.get_revisions(&id).await?;
    verify_sequence(&revisions)?;
    println!(
        "    {} {} archived revision(s), numbering verified dense from 1",
        "→".cyan(),
        revisions.len()
    );
    Ok(())
}

async fn demo_withdrawal(service: &GovernanceService) -> anyhow::Result<()> {
    section("Scenario 4: Proposer withdraws before the vote closes");

    let proposal = service
        .submit_proposal(draft(
            "Ward festival sound stage",
            300_000,
            "Rent a covered sound stage, generator, and seating for the harvest \
             festival weekend, with takedown and field restoration included.",
            "wallet-chinedu",
            "Chinedu",
        ))
        .await?;
    let id = proposal.proposal_id.clone();

    println!("  Submitted '{}' for $3000.00", proposal.title);
    print_status("status", proposal.status);

    let withdrawn = service
        .withdraw_proposal(&id, &MemberId::new("wallet-chinedu"))
        .await?;
    println!("  Proposer withdraws:");
    print_status("status", withdrawn.status);

    match service
        .cast_council_vote(&id, &MemberId::new("council-amara"), BallotValue::For)
        .await
    {
        Err(err) => println!("    {} late ballot rejected: {err}", "→".red()),
        Ok(_) => println!("    {} late ballot unexpectedly accepted", "→".red().bold()),
    }
    print_timeline(&service.timeline(&id).await?);
    Ok(())
}

async fn demo_audit_ledger(service: &GovernanceService) -> anyhow::Result<()> {
    section("Scenario 5: Statistics and the audit ledger");

    let stats = service.statistics().await?;
    println!(
        "  {} proposals total ({} live, {} settled)",
        stats.total_proposals, stats.live, stats.terminal
    );
    let mut by_status: Vec<_> = stats.by_status.iter().collect();
    by_status.sort();
    for (status, count) in by_status {
        println!("    {status:<12} {count}");
    }
    println!();

    let recent = service
        .audit_log(QueryWindow {
            limit: 5,
            offset: 0,
        })
        .await?;
    println!("  Last {} audit records (newest first):", recent.len());
    for record in &recent {
        let mark = if record.success {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "    {mark} #{:<3} {:<18} {}",
            record.sequence,
            record.stage,
            record.message.dimmed()
        );
    }

    if let Some(anchor) = service.latest_audit_hash().await? {
        println!();
        println!("  Chain anchor: {}", anchor.cyan());
    }
    Ok(())
}
