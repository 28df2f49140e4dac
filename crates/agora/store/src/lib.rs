//! Agora unified storage abstractions.
//!
//! This crate defines the storage contract for the proposal lifecycle
//! engine:
//! - proposal records with compare-and-swap status and version writes
//! - append-only revision history (dense numbering from 1)
//! - council ballots keyed by (proposal, voter)
//! - member reactions keyed by (proposal, member)
//! - an append-only, hash-chained audit log
//!
//! Design stance:
//! - Postgres remains the transactional source of truth.
//! - The in-memory adapter holds the same invariants for tests and demos.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod model;
mod traits;

pub use error::{StoreError, StoreResult};
pub use model::{
    compute_audit_hash, AuditAppend, AuditRecord, EvaluationUpdate, ResubmissionUpdate,
    RevisionDraft,
};
pub use traits::{AuditStore, GovernanceStore, ProposalStore, QueryWindow};
