//! PostgreSQL adapter for Agora governance storage.
//!
//! This adapter is designed as the transactional source-of-truth backend.
//! Resubmissions run inside a transaction with the proposal row locked, so
//! the revision append, the content swap, and the ballot reset land together
//! or not at all.

use crate::model::{
    compute_audit_hash, AuditAppend, AuditRecord, EvaluationUpdate, ResubmissionUpdate,
    RevisionDraft,
};
use crate::traits::{AuditStore, ProposalStore, QueryWindow};
use crate::{StoreError, StoreResult};
use agora_types::{
    BallotValue, Budget, CouncilBallot, Evaluation, EvaluationAudit, EvaluationDecision,
    FundingOutcome, MemberId, MemberReaction, Proposal, ProposalId, ProposalStatus, Proposer,
    ReactionKind, Revision,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Acquire, Row};
use uuid::Uuid;

/// PostgreSQL-backed governance storage adapter.
#[derive(Clone)]
pub struct PostgresGovernanceStore {
    pool: PgPool,
}

impl PostgresGovernanceStore {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS agora_proposals (
                proposal_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                category TEXT NOT NULL,
                budget JSONB NOT NULL,
                region TEXT NOT NULL,
                proposer JSONB NOT NULL,
                status TEXT NOT NULL,
                decision TEXT,
                decision_reasons JSONB NOT NULL,
                council_required BOOLEAN,
                evaluation JSONB,
                audit JSONB,
                funding JSONB,
                version BIGINT NOT NULL,
                submitted_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS agora_revisions (
                proposal_id TEXT NOT NULL,
                revision_number BIGINT NOT NULL,
                raw_text TEXT NOT NULL,
                evaluation JSONB,
                decision TEXT,
                decision_reasons JSONB NOT NULL,
                audit JSONB,
                status_at_time TEXT NOT NULL,
                engine_version TEXT,
                submitted_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (proposal_id, revision_number)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS agora_ballots (
                proposal_id TEXT NOT NULL,
                voter_id TEXT NOT NULL,
                value TEXT NOT NULL,
                cast_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (proposal_id, voter_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS agora_reactions (
                proposal_id TEXT NOT NULL,
                member_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                reacted_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (proposal_id, member_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS agora_audit_events (
                event_id TEXT PRIMARY KEY,
                sequence BIGINT NOT NULL UNIQUE,
                timestamp TIMESTAMPTZ NOT NULL,
                actor TEXT NOT NULL,
                stage TEXT NOT NULL,
                success BOOLEAN NOT NULL,
                message TEXT NOT NULL,
                proposal_id TEXT,
                payload JSONB NOT NULL,
                previous_hash TEXT,
                hash TEXT NOT NULL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn proposal_exists(&self, proposal_id: &ProposalId) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 AS one FROM agora_proposals WHERE proposal_id = $1")
            .bind(proposal_id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl ProposalStore for PostgresGovernanceStore {
    async fn create_proposal(&self, proposal: Proposal) -> StoreResult<()> {
        let budget_json = serde_json::to_value(&proposal.budget)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let proposer_json = serde_json::to_value(&proposal.proposer)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let reasons_json = serde_json::to_value(&proposal.decision_reasons)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let evaluation_json = proposal
            .evaluation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let audit_json = proposal
            .audit
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let funding_json = proposal
            .funding
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO agora_proposals
                (proposal_id, title, summary, raw_text, category, budget, region, proposer,
                 status, decision, decision_reasons, council_required, evaluation, audit,
                 funding, version, submitted_at, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(proposal.proposal_id.0.clone())
        .bind(proposal.title.clone())
        .bind(proposal.summary.clone())
        .bind(proposal.raw_text.clone())
        .bind(proposal.category.clone())
        .bind(budget_json)
        .bind(proposal.region.clone())
        .bind(proposer_json)
        .bind(proposal.status.as_str())
        .bind(proposal.decision.map(|d| d.as_str()))
        .bind(reasons_json)
        .bind(proposal.council_required)
        .bind(evaluation_json)
        .bind(audit_json)
        .bind(funding_json)
        .bind(version_to_i64(proposal.version)?)
        .bind(proposal.submitted_at)
        .bind(proposal.created_at)
        .bind(proposal.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &ProposalId) -> StoreResult<Option<Proposal>> {
        let row = sqlx::query(
            r#"
            SELECT proposal_id, title, summary, raw_text, category, budget, region, proposer,
                   status, decision, decision_reasons, council_required, evaluation, audit,
                   funding, version, submitted_at, created_at, updated_at
              FROM agora_proposals
             WHERE proposal_id = $1
            "#,
        )
        .bind(proposal_id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        row.map(proposal_row_to_record).transpose()
    }

    async fn list_proposals(&self, window: QueryWindow) -> StoreResult<Vec<Proposal>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT proposal_id, title, summary, raw_text, category, budget, region, proposer,
                       status, decision, decision_reasons, council_required, evaluation, audit,
                       funding, version, submitted_at, created_at, updated_at
                  FROM agora_proposals
                 ORDER BY updated_at DESC
                 OFFSET $1
                "#,
            )
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT proposal_id, title, summary, raw_text, category, budget, region, proposer,
                       status, decision, decision_reasons, council_required, evaluation, audit,
                       funding, version, submitted_at, created_at, updated_at
                  FROM agora_proposals
                 ORDER BY updated_at DESC
                 LIMIT $1 OFFSET $2
                "#,
            )
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
        };

        rows.into_iter().map(proposal_row_to_record).collect()
    }

    async fn transition_status(
        &self,
        proposal_id: &ProposalId,
        expected_from: ProposalStatus,
        to: ProposalStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE agora_proposals
               SET status = $1,
                   updated_at = $2,
                   version = version + 1
             WHERE proposal_id = $3
               AND status = $4
            "#,
        )
        .bind(to.as_str())
        .bind(updated_at)
        .bind(proposal_id.0.clone())
        .bind(expected_from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            if self.proposal_exists(proposal_id).await? {
                return Err(StoreError::InvariantViolation(format!(
                    "stale status transition for proposal {}",
                    proposal_id
                )));
            }
            return Err(StoreError::NotFound(format!(
                "proposal {} not found",
                proposal_id
            )));
        }

        Ok(())
    }

    async fn apply_evaluation(
        &self,
        proposal_id: &ProposalId,
        expected_version: u64,
        update: EvaluationUpdate,
    ) -> StoreResult<()> {
        let evaluation_json = serde_json::to_value(&update.evaluation)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let audit_json = serde_json::to_value(&update.audit)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let reasons_json = serde_json::to_value(&update.decision_reasons)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE agora_proposals
               SET evaluation = $1,
                   audit = $2,
                   decision = $3,
                   decision_reasons = $4,
                   council_required = $5,
                   status = $6,
                   updated_at = $7,
                   version = version + 1
             WHERE proposal_id = $8
               AND version = $9
            "#,
        )
        .bind(evaluation_json)
        .bind(audit_json)
        .bind(update.decision.as_str())
        .bind(reasons_json)
        .bind(update.council_required)
        .bind(update.new_status.as_str())
        .bind(update.updated_at)
        .bind(proposal_id.0.clone())
        .bind(version_to_i64(expected_version)?)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            if self.proposal_exists(proposal_id).await? {
                return Err(StoreError::Conflict(format!(
                    "version conflict on proposal {}",
                    proposal_id
                )));
            }
            return Err(StoreError::NotFound(format!(
                "proposal {} not found",
                proposal_id
            )));
        }

        Ok(())
    }

    async fn commit_resubmission(
        &self,
        proposal_id: &ProposalId,
        expected_version: u64,
        snapshot: RevisionDraft,
        update: ResubmissionUpdate,
    ) -> StoreResult<Revision> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = tx
            .acquire()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let row = sqlx::query("SELECT version FROM agora_proposals WHERE proposal_id = $1 FOR UPDATE")
            .bind(proposal_id.0.clone())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let row = row.ok_or_else(|| {
            StoreError::NotFound(format!("proposal {} not found", proposal_id))
        })?;
        let stored_version: i64 = row
            .try_get("version")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if stored_version as u64 != expected_version {
            return Err(StoreError::Conflict(format!(
                "version conflict on proposal {}: expected {}, found {}",
                proposal_id, expected_version, stored_version
            )));
        }

        let latest = sqlx::query(
            "SELECT COALESCE(MAX(revision_number), 0) AS latest FROM agora_revisions WHERE proposal_id = $1",
        )
        .bind(proposal_id.0.clone())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        let latest: i64 = latest
            .try_get("latest")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let revision_number = latest + 1;

        let engine_version = snapshot
            .evaluation
            .as_ref()
            .map(|e| e.engine_version.clone());
        let revision = Revision {
            proposal_id: proposal_id.clone(),
            revision_number: revision_number as u32,
            raw_text: snapshot.raw_text,
            evaluation: snapshot.evaluation,
            decision: snapshot.decision,
            decision_reasons: snapshot.decision_reasons,
            audit: snapshot.audit,
            status_at_time: snapshot.status_at_time,
            engine_version,
            submitted_at: snapshot.submitted_at,
        };

        let snapshot_eval_json = revision
            .evaluation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let snapshot_audit_json = revision
            .audit
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let snapshot_reasons_json = serde_json::to_value(&revision.decision_reasons)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO agora_revisions
                (proposal_id, revision_number, raw_text, evaluation, decision, decision_reasons,
                 audit, status_at_time, engine_version, submitted_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(proposal_id.0.clone())
        .bind(revision_number)
        .bind(revision.raw_text.clone())
        .bind(snapshot_eval_json)
        .bind(revision.decision.map(|d| d.as_str()))
        .bind(snapshot_reasons_json)
        .bind(snapshot_audit_json)
        .bind(revision.status_at_time.as_str())
        .bind(revision.engine_version.clone())
        .bind(revision.submitted_at)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_conflict)?;

        let evaluation_json = serde_json::to_value(&update.evaluation)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let audit_json = serde_json::to_value(&update.audit)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let reasons_json = serde_json::to_value(&update.decision_reasons)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE agora_proposals
               SET raw_text = $1,
                   evaluation = $2,
                   audit = $3,
                   decision = $4,
                   decision_reasons = $5,
                   council_required = $6,
                   status = $7,
                   submitted_at = $8,
                   updated_at = $8,
                   version = version + 1
             WHERE proposal_id = $9
            "#,
        )
        .bind(update.raw_text.clone())
        .bind(evaluation_json)
        .bind(audit_json)
        .bind(update.decision.as_str())
        .bind(reasons_json)
        .bind(update.council_required)
        .bind(update.new_status.as_str())
        .bind(update.submitted_at)
        .bind(proposal_id.0.clone())
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if update.reset_ballots {
            sqlx::query("DELETE FROM agora_ballots WHERE proposal_id = $1")
                .bind(proposal_id.0.clone())
                .execute(&mut *conn)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(revision)
    }

    async fn set_funding_outcome(
        &self,
        proposal_id: &ProposalId,
        expected_from: ProposalStatus,
        outcome: FundingOutcome,
        final_status: ProposalStatus,
    ) -> StoreResult<()> {
        let outcome_json = serde_json::to_value(&outcome)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE agora_proposals
               SET funding = $1,
                   status = $2,
                   updated_at = $3,
                   version = version + 1
             WHERE proposal_id = $4
               AND status = $5
            "#,
        )
        .bind(outcome_json)
        .bind(final_status.as_str())
        .bind(outcome.recorded_at)
        .bind(proposal_id.0.clone())
        .bind(expected_from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            if self.proposal_exists(proposal_id).await? {
                return Err(StoreError::InvariantViolation(format!(
                    "stale funding write for proposal {}",
                    proposal_id
                )));
            }
            return Err(StoreError::NotFound(format!(
                "proposal {} not found",
                proposal_id
            )));
        }

        Ok(())
    }

    async fn list_revisions(&self, proposal_id: &ProposalId) -> StoreResult<Vec<Revision>> {
        let rows = sqlx::query(
            r#"
            SELECT proposal_id, revision_number, raw_text, evaluation, decision, decision_reasons,
                   audit, status_at_time, engine_version, submitted_at
              FROM agora_revisions
             WHERE proposal_id = $1
             ORDER BY revision_number ASC
            "#,
        )
        .bind(proposal_id.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter().map(revision_row_to_record).collect()
    }

    async fn upsert_ballot(&self, ballot: CouncilBallot) -> StoreResult<Vec<CouncilBallot>> {
        if !self.proposal_exists(&ballot.proposal_id).await? {
            return Err(StoreError::NotFound(format!(
                "proposal {} not found",
                ballot.proposal_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO agora_ballots (proposal_id, voter_id, value, cast_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (proposal_id, voter_id) DO UPDATE SET
                value = EXCLUDED.value,
                cast_at = EXCLUDED.cast_at
            "#,
        )
        .bind(ballot.proposal_id.0.clone())
        .bind(ballot.voter_id.0.clone())
        .bind(ballot_value_to_str(ballot.value))
        .bind(ballot.cast_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        self.list_ballots(&ballot.proposal_id).await
    }

    async fn list_ballots(&self, proposal_id: &ProposalId) -> StoreResult<Vec<CouncilBallot>> {
        let rows = sqlx::query(
            r#"
            SELECT proposal_id, voter_id, value, cast_at
              FROM agora_ballots
             WHERE proposal_id = $1
             ORDER BY cast_at ASC
            "#,
        )
        .bind(proposal_id.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter().map(ballot_row_to_record).collect()
    }

    async fn put_reaction(
        &self,
        proposal_id: &ProposalId,
        member_id: &MemberId,
        kind: Option<ReactionKind>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if !self.proposal_exists(proposal_id).await? {
            return Err(StoreError::NotFound(format!(
                "proposal {} not found",
                proposal_id
            )));
        }

        match kind {
            Some(kind) => {
                sqlx::query(
                    r#"
                    INSERT INTO agora_reactions (proposal_id, member_id, kind, reacted_at)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (proposal_id, member_id) DO UPDATE SET
                        kind = EXCLUDED.kind,
                        reacted_at = EXCLUDED.reacted_at
                    "#,
                )
                .bind(proposal_id.0.clone())
                .bind(member_id.0.clone())
                .bind(reaction_kind_to_str(kind))
                .bind(at)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            }
            None => {
                sqlx::query(
                    "DELETE FROM agora_reactions WHERE proposal_id = $1 AND member_id = $2",
                )
                .bind(proposal_id.0.clone())
                .bind(member_id.0.clone())
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            }
        }

        Ok(())
    }

    async fn list_reactions(&self, proposal_id: &ProposalId) -> StoreResult<Vec<MemberReaction>> {
        let rows = sqlx::query(
            r#"
            SELECT proposal_id, member_id, kind, reacted_at
              FROM agora_reactions
             WHERE proposal_id = $1
             ORDER BY reacted_at ASC
            "#,
        )
        .bind(proposal_id.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter().map(reaction_row_to_record).collect()
    }
}

#[async_trait]
impl AuditStore for PostgresGovernanceStore {
    async fn append_audit(&self, event: AuditAppend) -> StoreResult<AuditRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let conn = tx
            .acquire()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query("LOCK TABLE agora_audit_events IN EXCLUSIVE MODE")
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let last = sqlx::query(
            "SELECT sequence, hash FROM agora_audit_events ORDER BY sequence DESC LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let (sequence, previous_hash) = if let Some(row) = last {
            let seq: i64 = row
                .try_get("sequence")
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let prev: String = row
                .try_get("hash")
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            (seq + 1, Some(prev))
        } else {
            (1_i64, None)
        };

        let hash = compute_audit_hash(&event, previous_hash.as_deref(), sequence as u64);
        let event_id = format!("audit-{}", Uuid::new_v4());

        sqlx::query(
            r#"
            INSERT INTO agora_audit_events
                (event_id, sequence, timestamp, actor, stage, success, message, proposal_id, payload, previous_hash, hash)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(event_id.clone())
        .bind(sequence)
        .bind(event.timestamp)
        .bind(event.actor.clone())
        .bind(event.stage.clone())
        .bind(event.success)
        .bind(event.message.clone())
        .bind(event.proposal_id.as_ref().map(|id| id.0.clone()))
        .bind(event.payload.clone())
        .bind(previous_hash.clone())
        .bind(hash.clone())
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(AuditRecord {
            event_id,
            sequence: sequence as u64,
            timestamp: event.timestamp,
            actor: event.actor,
            stage: event.stage,
            success: event.success,
            message: event.message,
            proposal_id: event.proposal_id,
            payload: event.payload,
            previous_hash,
            hash,
        })
    }

    async fn list_audit(&self, window: QueryWindow) -> StoreResult<Vec<AuditRecord>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT event_id, sequence, timestamp, actor, stage, success, message, proposal_id, payload, previous_hash, hash
                  FROM agora_audit_events
                 ORDER BY sequence DESC
                 OFFSET $1
                "#,
            )
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT event_id, sequence, timestamp, actor, stage, success, message, proposal_id, payload, previous_hash, hash
                  FROM agora_audit_events
                 ORDER BY sequence DESC
                 LIMIT $1 OFFSET $2
                "#,
            )
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
        };

        rows.into_iter().map(audit_row_to_record).collect()
    }

    async fn latest_audit_hash(&self) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT hash FROM agora_audit_events ORDER BY sequence DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(row
            .map(|r| r.try_get::<String, _>("hash"))
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?)
    }
}

fn proposal_row_to_record(row: sqlx::postgres::PgRow) -> StoreResult<Proposal> {
    let proposal_id: String = row
        .try_get("proposal_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let budget_json: serde_json::Value = row
        .try_get("budget")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let budget: Budget = serde_json::from_value(budget_json)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let proposer_json: serde_json::Value = row
        .try_get("proposer")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let proposer: Proposer = serde_json::from_value(proposer_json)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let decision: Option<String> = row
        .try_get("decision")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let reasons_json: serde_json::Value = row
        .try_get("decision_reasons")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let decision_reasons: Vec<String> = serde_json::from_value(reasons_json)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let evaluation_json: Option<serde_json::Value> = row
        .try_get("evaluation")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let evaluation: Option<Evaluation> = evaluation_json
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let audit_json: Option<serde_json::Value> = row
        .try_get("audit")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let audit: Option<EvaluationAudit> = audit_json
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let funding_json: Option<serde_json::Value> = row
        .try_get("funding")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let funding: Option<FundingOutcome> = funding_json
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    Ok(Proposal {
        proposal_id: ProposalId::new(proposal_id),
        title: row
            .try_get("title")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        summary: row
            .try_get("summary")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        raw_text: row
            .try_get("raw_text")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        category: row
            .try_get("category")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        budget,
        region: row
            .try_get("region")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        proposer,
        status: parse_status(&status)?,
        decision: decision.as_deref().map(parse_decision).transpose()?,
        decision_reasons,
        council_required: row
            .try_get("council_required")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        evaluation,
        audit,
        funding,
        version: version as u64,
        submitted_at: row
            .try_get("submitted_at")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
    })
}

fn revision_row_to_record(row: sqlx::postgres::PgRow) -> StoreResult<Revision> {
    let proposal_id: String = row
        .try_get("proposal_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let revision_number: i64 = row
        .try_get("revision_number")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let evaluation_json: Option<serde_json::Value> = row
        .try_get("evaluation")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let evaluation: Option<Evaluation> = evaluation_json
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let decision: Option<String> = row
        .try_get("decision")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let reasons_json: serde_json::Value = row
        .try_get("decision_reasons")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let decision_reasons: Vec<String> = serde_json::from_value(reasons_json)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let audit_json: Option<serde_json::Value> = row
        .try_get("audit")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let audit: Option<EvaluationAudit> = audit_json
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let status_at_time: String = row
        .try_get("status_at_time")
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    Ok(Revision {
        proposal_id: ProposalId::new(proposal_id),
        revision_number: revision_number as u32,
        raw_text: row
            .try_get("raw_text")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        evaluation,
        decision: decision.as_deref().map(parse_decision).transpose()?,
        decision_reasons,
        audit,
        status_at_time: parse_status(&status_at_time)?,
        engine_version: row
            .try_get("engine_version")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        submitted_at: row
            .try_get("submitted_at")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
    })
}

fn ballot_row_to_record(row: sqlx::postgres::PgRow) -> StoreResult<CouncilBallot> {
    let proposal_id: String = row
        .try_get("proposal_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let voter_id: String = row
        .try_get("voter_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let value: String = row
        .try_get("value")
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    Ok(CouncilBallot {
        proposal_id: ProposalId::new(proposal_id),
        voter_id: MemberId::new(voter_id),
        value: parse_ballot_value(&value)?,
        cast_at: row
            .try_get("cast_at")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
    })
}

fn reaction_row_to_record(row: sqlx::postgres::PgRow) -> StoreResult<MemberReaction> {
    let proposal_id: String = row
        .try_get("proposal_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let member_id: String = row
        .try_get("member_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let kind: String = row
        .try_get("kind")
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    Ok(MemberReaction {
        proposal_id: ProposalId::new(proposal_id),
        member_id: MemberId::new(member_id),
        kind: parse_reaction_kind(&kind)?,
        reacted_at: row
            .try_get("reacted_at")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
    })
}

fn audit_row_to_record(row: sqlx::postgres::PgRow) -> StoreResult<AuditRecord> {
    let sequence: i64 = row
        .try_get("sequence")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let proposal_id: Option<String> = row
        .try_get("proposal_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    Ok(AuditRecord {
        event_id: row
            .try_get("event_id")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        sequence: sequence as u64,
        timestamp: row
            .try_get("timestamp")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        actor: row
            .try_get("actor")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        stage: row
            .try_get("stage")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        success: row
            .try_get("success")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        message: row
            .try_get("message")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        proposal_id: proposal_id.map(ProposalId::new),
        payload: row
            .try_get("payload")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        previous_hash: row
            .try_get("previous_hash")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        hash: row
            .try_get("hash")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
    })
}

fn parse_status(raw: &str) -> StoreResult<ProposalStatus> {
    match raw {
        "submitted" => Ok(ProposalStatus::Submitted),
        "votable" => Ok(ProposalStatus::Votable),
        "approved" => Ok(ProposalStatus::Approved),
        "rejected" => Ok(ProposalStatus::Rejected),
        "withdrawn" => Ok(ProposalStatus::Withdrawn),
        "funded" => Ok(ProposalStatus::Funded),
        "failed" => Ok(ProposalStatus::Failed),
        _ => Err(StoreError::Serialization(format!(
            "unknown proposal status `{raw}`"
        ))),
    }
}

fn parse_decision(raw: &str) -> StoreResult<EvaluationDecision> {
    match raw {
        "advance" => Ok(EvaluationDecision::Advance),
        "revise" => Ok(EvaluationDecision::Revise),
        "block" => Ok(EvaluationDecision::Block),
        _ => Err(StoreError::Serialization(format!(
            "unknown evaluation decision `{raw}`"
        ))),
    }
}

fn ballot_value_to_str(value: BallotValue) -> &'static str {
    match value {
        BallotValue::For => "FOR",
        BallotValue::Against => "AGAINST",
        BallotValue::Abstain => "ABSTAIN",
    }
}

fn parse_ballot_value(raw: &str) -> StoreResult<BallotValue> {
    match raw {
        "FOR" => Ok(BallotValue::For),
        "AGAINST" => Ok(BallotValue::Against),
        "ABSTAIN" => Ok(BallotValue::Abstain),
        _ => Err(StoreError::Serialization(format!(
            "unknown ballot value `{raw}`"
        ))),
    }
}

fn reaction_kind_to_str(kind: ReactionKind) -> &'static str {
    match kind {
        ReactionKind::Support => "SUPPORT",
        ReactionKind::Concern => "CONCERN",
    }
}

fn parse_reaction_kind(raw: &str) -> StoreResult<ReactionKind> {
    match raw {
        "SUPPORT" => Ok(ReactionKind::Support),
        "CONCERN" => Ok(ReactionKind::Concern),
        _ => Err(StoreError::Serialization(format!(
            "unknown reaction kind `{raw}`"
        ))),
    }
}

fn map_sqlx_conflict(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Backend(err.to_string())
}

fn to_i64(value: usize) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidInput("window value too large".to_string()))
}

fn version_to_i64(version: u64) -> StoreResult<i64> {
    i64::try_from(version)
        .map_err(|_| StoreError::InvalidInput("version value too large".to_string()))
}
