//! Agora Types - shared data model for the proposal lifecycle engine
#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub String);
impl ProposalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet-backed member identity. Proposers, council voters, and reacting
/// members are all addressed by it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub String);
impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}
impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Member,
    Council,
    Operator,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposer {
    pub wallet: MemberId,
    pub display_name: String,
    pub role: MemberRole,
}

/// Requested funding, in minor units of the named currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub currency: String,
    pub amount_requested: u64,
}

impl Budget {
    pub fn new(currency: impl Into<String>, amount_requested: u64) -> Self {
        Self {
            currency: currency.into(),
            amount_requested,
        }
    }
}

/// Governance status of a proposal.
///
/// `Approved` is terminal with respect to governance but still awaits a
/// funding outcome; the other four non-live statuses accept no operation
/// besides reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Submitted,
    Votable,
    Approved,
    Rejected,
    Withdrawn,
    Funded,
    Failed,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Rejected
                | ProposalStatus::Withdrawn
                | ProposalStatus::Funded
                | ProposalStatus::Failed
        )
    }

    pub fn accepts_votes(&self) -> bool {
        matches!(self, ProposalStatus::Votable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Submitted => "submitted",
            ProposalStatus::Votable => "votable",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Withdrawn => "withdrawn",
            ProposalStatus::Funded => "funded",
            ProposalStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdict returned by the evaluation engine for one pass over the text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationDecision {
    Advance,
    Revise,
    Block,
}

impl EvaluationDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationDecision::Advance => "advance",
            EvaluationDecision::Revise => "revise",
            EvaluationDecision::Block => "block",
        }
    }
}

/// Score breakdown for one evaluation axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub overall: f64,
    pub components: BTreeMap<String, f64>,
}

impl ScoreCard {
    pub fn new(overall: f64) -> Self {
        Self {
            overall,
            components: BTreeMap::new(),
        }
    }

    pub fn with_component(mut self, name: impl Into<String>, score: f64) -> Self {
        self.components.insert(name.into(), score);
        self
    }
}

/// Complete evaluation snapshot as returned by the evaluation engine.
///
/// Every field the engine may omit is an explicit `Option`; payloads are
/// never shuttled around as untyped maps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub decision: EvaluationDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structural: Option<ScoreCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mission: Option<ScoreCard>,
    pub passes_threshold: bool,
    pub pass_fail_reasons: Vec<String>,
    pub risk_flags: Vec<String>,
    pub violations: Vec<String>,
    pub missing_data: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub engine_version: String,
    pub evaluated_at: DateTime<Utc>,
}

/// Named check performed by the evaluation engine alongside scoring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditCheck {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditCheck {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: None,
        }
    }

    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// Engine provenance attached to an accepted evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationAudit {
    pub engine_version: String,
    pub checks: Vec<AuditCheck>,
}

/// Outcome of the external disbursement step for an approved proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FundingOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new proposal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub title: String,
    pub summary: String,
    pub raw_text: String,
    pub category: String,
    pub budget: Budget,
    pub region: String,
    pub proposer: Proposer,
}

/// A funding proposal and the full state the lifecycle engine owns for it.
///
/// `status` is written exclusively by the lifecycle controller. `version`
/// increments on every accepted mutation and backs optimistic writes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: ProposalId,
    pub title: String,
    pub summary: String,
    pub raw_text: String,
    pub category: String,
    pub budget: Budget,
    pub region: String,
    pub proposer: Proposer,
    pub status: ProposalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<EvaluationDecision>,
    pub decision_reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub council_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<EvaluationAudit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding: Option<FundingOutcome>,
    pub version: u64,
    pub submitted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    /// Build the initial record for an accepted draft. Evaluation fields are
    /// empty until the first evaluation lands.
    pub fn from_draft(draft: ProposalDraft, proposal_id: ProposalId, at: DateTime<Utc>) -> Self {
        Self {
            proposal_id,
            title: draft.title,
            summary: draft.summary,
            raw_text: draft.raw_text,
            category: draft.category,
            budget: draft.budget,
            region: draft.region,
            proposer: draft.proposer,
            status: ProposalStatus::Submitted,
            decision: None,
            decision_reasons: Vec::new(),
            council_required: None,
            evaluation: None,
            audit: None,
            funding: None,
            version: 1,
            submitted_at: at,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Immutable snapshot of a superseded proposal state, written once at the
/// moment a resubmission is accepted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Revision {
    pub proposal_id: ProposalId,
    pub revision_number: u32,
    pub raw_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<EvaluationDecision>,
    pub decision_reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<EvaluationAudit>,
    pub status_at_time: ProposalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Single council ballot. At most one live ballot per (proposal, voter);
/// recasting replaces the value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouncilBallot {
    pub proposal_id: ProposalId,
    pub voter_id: MemberId,
    pub value: BallotValue,
    pub cast_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BallotValue {
    For,
    Against,
    Abstain,
}

/// Member sentiment on a proposal. Informational only; never gates status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberReaction {
    pub proposal_id: ProposalId,
    pub member_id: MemberId,
    pub kind: ReactionKind,
    pub reacted_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionKind {
    Support,
    Concern,
}

/// Result type for governance operations.
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Public error taxonomy for the lifecycle engine. Every failure is scoped
/// to a single proposal operation; none are fatal to the process.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("voting closed: {0}")]
    VotingClosed(String),

    #[error("already terminal: {0}")]
    AlreadyTerminal(String),

    #[error("evaluator unavailable: {0}")]
    EvaluatorUnavailable(String),

    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("proposal not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Store(String),
}
