//! Write payloads and audit records shared by every backend.

use agora_types::{
    Evaluation, EvaluationAudit, EvaluationDecision, ProposalId, ProposalStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Evaluation results applied to a proposal in one write.
///
/// The whole payload lands or none of it does. `new_status` is the
/// routed status the gate produced for this evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationUpdate {
    pub evaluation: Evaluation,
    pub audit: EvaluationAudit,
    pub decision: EvaluationDecision,
    pub decision_reasons: Vec<String>,
    pub council_required: bool,
    pub new_status: ProposalStatus,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of proposal state taken before a resubmission overwrites it.
///
/// The backend assigns the revision number: numbers are dense and
/// start at 1 per proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionDraft {
    pub raw_text: String,
    pub evaluation: Option<Evaluation>,
    pub decision: Option<EvaluationDecision>,
    pub decision_reasons: Vec<String>,
    pub audit: Option<EvaluationAudit>,
    pub status_at_time: ProposalStatus,
    pub submitted_at: DateTime<Utc>,
}

/// Replacement content and re-evaluation results for a resubmission.
///
/// Applied atomically together with the [`RevisionDraft`] snapshot.
/// `reset_ballots` clears every council ballot for the proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResubmissionUpdate {
    pub raw_text: String,
    pub evaluation: Evaluation,
    pub audit: EvaluationAudit,
    pub decision: EvaluationDecision,
    pub decision_reasons: Vec<String>,
    pub council_required: bool,
    pub new_status: ProposalStatus,
    pub reset_ballots: bool,
    pub submitted_at: DateTime<Utc>,
}

/// An audit event as submitted by callers, before the backend assigns
/// its position in the hash chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditAppend {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub stage: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<ProposalId>,
    #[serde(default)]
    pub payload: Value,
}

/// A stored audit event with its chain linkage.
///
/// `hash` commits to the event body, `previous_hash`, and `sequence`,
/// so any retroactive edit breaks verification of every later record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub stage: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<ProposalId>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    pub hash: String,
}

/// Computes the chained blake3 hash for an audit event.
///
/// Both backends use this so records verify identically regardless of
/// where they were written.
pub fn compute_audit_hash(event: &AuditAppend, previous_hash: Option<&str>, sequence: u64) -> String {
    let canonical = serde_json::json!({
        "sequence": sequence,
        "timestamp": event.timestamp.to_rfc3339(),
        "actor": event.actor,
        "stage": event.stage,
        "success": event.success,
        "message": event.message,
        "proposal_id": event.proposal_id.as_ref().map(|id| id.0.clone()),
        "payload": event.payload,
        "previous_hash": previous_hash,
    });
    let bytes = canonical.to_string();
    blake3::hash(bytes.as_bytes()).to_hex().to_string()
}
