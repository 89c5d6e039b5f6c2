//! # PCW Core
//!
//! Core workflow logic for the PCW laboratory case tracking system.
//!
//! A case moves through three gated diagnostic stages (gross examination,
//! preparation, microscopic examination) and ends with a final, immutable
//! sign-off. This crate contains the pieces with real invariants:
//!
//! - The stage-transition state machine ([`CaseWorkflowEngine`]) and the
//!   permission policy gating approvals
//! - Derivation of the aggregate case status from per-stage state
//! - Git-versioned case storage with atomic multi-file transactions
//!   ([`CaseRepository`]) and the append-only audit trail
//!
//! **No presentation concerns**: forms, report rendering, HTTP surfaces, and
//! authentication belong in consumer crates. Stage payload content is opaque
//! here: the engine checks presence, never meaning.

pub mod actor;
pub mod audit;
pub mod case;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod permissions;
pub mod records;
pub mod repository;
pub mod stage;
mod versioned;

pub use actor::{Actor, ActorRef, Role};
pub use audit::{AuditAction, AuditEntry};
pub use case::{Case, CaseIntake, StageBlock};
pub use config::CoreConfig;
pub use engine::CaseWorkflowEngine;
pub use error::{StorageError, StorageResult, WorkflowError, WorkflowResult};
pub use permissions::PermissionPolicy;
pub use records::{StageRecord, StageRecordStore};
pub use repository::{CaseRepository, CaseTxn};
pub use stage::{CaseStatus, Stage, StageStatus};

pub use pcw_types::{CaseId, NonEmptyText};
