//! Evaluation engine contract: trait definition and scripted implementation.
//!
//! The lifecycle controller treats the engine as a black box: one call, one
//! complete report, or an error. Partial results never escape this boundary.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use agora_types::{AuditCheck, Evaluation, EvaluationDecision, ProposalId, ScoreCard};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input handed to the evaluation engine for one pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub proposal_id: ProposalId,
    pub title: String,
    pub category: String,
    pub raw_text: String,
}

/// Complete engine output for one pass: the evaluation snapshot plus the
/// checks it ran while producing it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub evaluation: Evaluation,
    pub checks: Vec<AuditCheck>,
}

#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluation engine unavailable: {0}")]
    Unavailable(String),

    #[error("malformed evaluation response: {0}")]
    Malformed(String),
}

/// Trait for the external evaluation engine.
#[async_trait]
pub trait ProposalEvaluator: Send + Sync {
    /// Evaluate proposal text and return a complete report.
    async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationReport, EvaluatorError>;
}

/// A deterministic evaluator for testing and development.
///
/// Outcomes queued with [`push_outcome`](Self::push_outcome) are consumed in
/// order, one per call; once the queue is empty a keyword/length heuristic
/// takes over. An optional artificial delay exercises caller timeouts.
pub struct ScriptedEvaluator {
    script: Mutex<VecDeque<EvaluationDecision>>,
    latency: Option<Duration>,
    engine_version: String,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            latency: None,
            engine_version: "scripted-1.0".to_string(),
        }
    }

    /// Evaluator that returns the same decision on every call.
    pub fn always(decision: EvaluationDecision) -> AlwaysEvaluator {
        AlwaysEvaluator { decision }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }

    /// Queue the decision for a future call. Queued decisions win over the
    /// heuristic, oldest first.
    pub fn push_outcome(&self, decision: EvaluationDecision) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(decision);
        }
    }

    fn next_decision(&self, text: &str) -> EvaluationDecision {
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        scripted.unwrap_or_else(|| heuristic_decision(text))
    }
}

impl Default for ScriptedEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProposalEvaluator for ScriptedEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationReport, EvaluatorError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let decision = self.next_decision(&request.raw_text);
        Ok(build_report(&request, decision, &self.engine_version))
    }
}

/// Evaluator that returns one fixed decision forever. Counterpart to the
/// scripted queue for tests that never want the heuristic.
pub struct AlwaysEvaluator {
    decision: EvaluationDecision,
}

#[async_trait]
impl ProposalEvaluator for AlwaysEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationReport, EvaluatorError> {
        Ok(build_report(&request, self.decision, "fixed-1.0"))
    }
}

const BLOCK_PHRASES: &[&str] = &["guaranteed returns", "pyramid", "kickback"];
const MIN_NARRATIVE_LEN: usize = 80;

fn heuristic_decision(text: &str) -> EvaluationDecision {
    let lowered = text.to_lowercase();
    if BLOCK_PHRASES.iter().any(|phrase| lowered.contains(phrase)) {
        EvaluationDecision::Block
    } else if text.chars().count() < MIN_NARRATIVE_LEN {
        EvaluationDecision::Revise
    } else {
        EvaluationDecision::Advance
    }
}

fn build_report(
    request: &EvaluationRequest,
    decision: EvaluationDecision,
    engine_version: &str,
) -> EvaluationReport {
    let word_count = request.raw_text.split_whitespace().count();
    let length_score = (word_count as f64 / 120.0).min(1.0);

    let (passes, reasons) = match decision {
        EvaluationDecision::Advance => (
            true,
            vec!["narrative meets structural requirements".to_string()],
        ),
        EvaluationDecision::Revise => (
            false,
            vec!["narrative too thin to assess impact".to_string()],
        ),
        EvaluationDecision::Block => (
            false,
            vec!["text matches a charter violation pattern".to_string()],
        ),
    };

    let violations = if matches!(decision, EvaluationDecision::Block) {
        vec!["charter_violation".to_string()]
    } else {
        Vec::new()
    };

    let checks = vec![
        AuditCheck::passed("schema"),
        if request.category.is_empty() {
            AuditCheck::failed("category", "category missing")
        } else {
            AuditCheck::passed("category")
        },
        if passes {
            AuditCheck::passed("narrative_length")
        } else {
            AuditCheck::failed("narrative_length", format!("{word_count} words"))
        },
    ];

    let evaluation = Evaluation {
        decision,
        structural: Some(
            ScoreCard::new(0.4 + 0.6 * length_score)
                .with_component("clarity", length_score)
                .with_component("budget_detail", 0.5),
        ),
        mission: Some(ScoreCard::new(if passes { 0.8 } else { 0.3 })),
        passes_threshold: passes,
        pass_fail_reasons: reasons,
        risk_flags: Vec::new(),
        violations,
        missing_data: Vec::new(),
        summary: Some(format!("{} ({} words)", decision.as_str(), word_count)),
        engine_version: engine_version.to_string(),
        evaluated_at: Utc::now(),
    };

    EvaluationReport { evaluation, checks }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> EvaluationRequest {
        EvaluationRequest {
            proposal_id: ProposalId::generate(),
            title: "Test".to_string(),
            category: "community".to_string(),
            raw_text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn scripted_outcomes_consumed_in_order() {
        let evaluator = ScriptedEvaluator::new();
        evaluator.push_outcome(EvaluationDecision::Revise);
        evaluator.push_outcome(EvaluationDecision::Block);

        let first = evaluator.evaluate(request("short")).await.unwrap();
        assert_eq!(first.evaluation.decision, EvaluationDecision::Revise);

        let second = evaluator.evaluate(request("short")).await.unwrap();
        assert_eq!(second.evaluation.decision, EvaluationDecision::Block);
    }

    #[tokio::test]
    async fn heuristic_revises_thin_narratives() {
        let evaluator = ScriptedEvaluator::new();
        let report = evaluator.evaluate(request("too short")).await.unwrap();
        assert_eq!(report.evaluation.decision, EvaluationDecision::Revise);
        assert!(!report.evaluation.passes_threshold);
    }

    #[tokio::test]
    async fn heuristic_blocks_charter_violations() {
        let evaluator = ScriptedEvaluator::new();
        let long_scam = format!(
            "This project promises guaranteed returns to every member. {}",
            "It will transform the region. ".repeat(10)
        );
        let report = evaluator.evaluate(request(&long_scam)).await.unwrap();
        assert_eq!(report.evaluation.decision, EvaluationDecision::Block);
        assert_eq!(report.evaluation.violations, vec!["charter_violation"]);
    }

    #[tokio::test]
    async fn heuristic_advances_substantial_narratives() {
        let evaluator = ScriptedEvaluator::new();
        let text = "We will drill a community well near the school, train two \
                    technicians for maintenance, and publish quarterly water \
                    quality reports to the council.";
        let report = evaluator.evaluate(request(text)).await.unwrap();
        assert_eq!(report.evaluation.decision, EvaluationDecision::Advance);
        assert!(report.evaluation.passes_threshold);
        assert!(report.checks.iter().all(|c| c.passed));
    }

    #[tokio::test]
    async fn always_evaluator_is_fixed() {
        let evaluator = ScriptedEvaluator::always(EvaluationDecision::Block);
        for _ in 0..3 {
            let report = evaluator.evaluate(request("anything at all")).await.unwrap();
            assert_eq!(report.evaluation.decision, EvaluationDecision::Block);
        }
    }
}
