//! The case workflow engine.
//!
//! All stage transitions go through here. Each operation runs inside a
//! single case transaction: preconditions are validated against the state
//! read under the case lock, and the status change, stage payload, and audit
//! entry commit together or not at all. The aggregate case status is never
//! written directly by an operation; it is rederived from the stage blocks
//! when the transaction commits.
//!
//! Transition rules, per stage `S`:
//!
//! | operation          | requires                                        | moves `S` to        |
//! |--------------------|-------------------------------------------------|---------------------|
//! | `submit_stage_data`| predecessor approved; `S` editable              | `InProgress`        |
//! | `request_approval` | payload present; predecessor approved; `S` in `InProgress`/`Rejected` | `AwaitingApproval` |
//! | `approve_stage`    | approver role; predecessor approved; `S` in `AwaitingApproval` | `Approved`   |
//! | `reject_stage`     | approver role; predecessor approved; `S` in `AwaitingApproval` | `Rejected`   |
//!
//! `finalize_case` requires the approver role and all three stages approved,
//! and is terminal: a finalized case refuses every further mutation.

use crate::actor::Actor;
use crate::audit::AuditAction;
use crate::case::Case;
use crate::config::CoreConfig;
use crate::error::{WorkflowError, WorkflowResult};
use crate::permissions::PermissionPolicy;
use crate::records::StageRecord;
use crate::repository::CaseRepository;
use crate::stage::{Stage, StageStatus};
use chrono::Utc;
use pcw_types::CaseId;
use std::sync::Arc;

/// The state machine driving a case through its three diagnostic stages.
pub struct CaseWorkflowEngine {
    repo: CaseRepository,
    policy: PermissionPolicy,
}

impl CaseWorkflowEngine {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            repo: CaseRepository::new(cfg),
            policy: PermissionPolicy::new(),
        }
    }

    /// The underlying case repository, for read access and case registration.
    pub fn repository(&self) -> &CaseRepository {
        &self.repo
    }

    /// Records (or re-records) stage data and marks the stage in progress.
    ///
    /// The payload itself is opaque; only its presence matters to the
    /// workflow. Editing is allowed while the stage is pending, in progress,
    /// or rejected; once submitted for approval the stage is locked.
    pub fn submit_stage_data(
        &self,
        case_id: &CaseId,
        actor: &Actor,
        stage: Stage,
        record: StageRecord,
    ) -> WorkflowResult<Case> {
        let case = self.repo.with_case(case_id, actor, |txn| {
            check_prerequisite(txn.case(), stage)?;

            let status = txn.case().stage(stage).status;
            if !status.editable() {
                return Err(WorkflowError::StageLocked { stage, status });
            }

            txn.put_stage_record(stage, &record)?;

            let block = txn.case_mut().stage_mut(stage);
            block.status = StageStatus::InProgress;
            block.filled_by = Some(actor.to_ref());
            block.filled_at = Some(Utc::now());

            txn.append_audit(
                actor,
                AuditAction::StageSaved(stage),
                format!("Case {case_id}: {stage} data recorded."),
            );
            txn.case_mut().rederive_status();
            Ok(txn.case().clone())
        })?;

        tracing::info!(case_id = %case_id, stage = %stage, "stage data recorded");
        Ok(case)
    }

    /// Submits a stage for approval, locking it against further edits.
    pub fn request_approval(
        &self,
        case_id: &CaseId,
        actor: &Actor,
        stage: Stage,
    ) -> WorkflowResult<Case> {
        let case = self.repo.with_case(case_id, actor, |txn| {
            if !txn.has_stage_record(stage) {
                return Err(WorkflowError::NoDataRecorded { stage });
            }
            check_prerequisite(txn.case(), stage)?;

            let status = txn.case().stage(stage).status;
            if !matches!(status, StageStatus::InProgress | StageStatus::Rejected) {
                return Err(WorkflowError::InvalidStageState { stage, status });
            }

            txn.case_mut().stage_mut(stage).status = StageStatus::AwaitingApproval;

            txn.append_audit(
                actor,
                AuditAction::StageSubmitted(stage),
                format!("Case {case_id}: {stage} submitted for approval."),
            );
            txn.case_mut().rederive_status();
            Ok(txn.case().clone())
        })?;

        tracing::info!(case_id = %case_id, stage = %stage, "stage submitted for approval");
        Ok(case)
    }

    /// Approves a stage, opening the gate for its successor.
    ///
    /// The successor stays `Pending` until its own first submit; approval
    /// only makes the prerequisite check pass.
    pub fn approve_stage(
        &self,
        case_id: &CaseId,
        actor: &Actor,
        stage: Stage,
    ) -> WorkflowResult<Case> {
        self.check_approver(actor)?;

        let case = self.repo.with_case(case_id, actor, |txn| {
            check_prerequisite(txn.case(), stage)?;

            let status = txn.case().stage(stage).status;
            if status != StageStatus::AwaitingApproval {
                return Err(WorkflowError::InvalidStageState { stage, status });
            }

            let block = txn.case_mut().stage_mut(stage);
            block.status = StageStatus::Approved;
            block.approved_by = Some(actor.to_ref());
            block.approved_at = Some(Utc::now());

            txn.append_audit(
                actor,
                AuditAction::StageApproved(stage),
                format!("Case {case_id}: {stage} approved."),
            );
            txn.case_mut().rederive_status();
            Ok(txn.case().clone())
        })?;

        tracing::info!(case_id = %case_id, stage = %stage, "stage approved");
        Ok(case)
    }

    /// Sends a stage back for rework.
    ///
    /// Mirrors [`approve_stage`](Self::approve_stage) in permission and
    /// precondition shape; the stage returns to an editable state and the
    /// aggregate status falls back to the stage's in-progress value. The
    /// approver fields stay empty since nothing was approved on this path.
    pub fn reject_stage(
        &self,
        case_id: &CaseId,
        actor: &Actor,
        stage: Stage,
    ) -> WorkflowResult<Case> {
        self.check_approver(actor)?;

        let case = self.repo.with_case(case_id, actor, |txn| {
            check_prerequisite(txn.case(), stage)?;

            let status = txn.case().stage(stage).status;
            if status != StageStatus::AwaitingApproval {
                return Err(WorkflowError::InvalidStageState { stage, status });
            }

            txn.case_mut().stage_mut(stage).status = StageStatus::Rejected;

            txn.append_audit(
                actor,
                AuditAction::StageRejected(stage),
                format!("Case {case_id}: {stage} returned for rework."),
            );
            txn.case_mut().rederive_status();
            Ok(txn.case().clone())
        })?;

        tracing::info!(case_id = %case_id, stage = %stage, "stage returned for rework");
        Ok(case)
    }

    /// Records the final, immutable sign-off.
    ///
    /// Fails with [`WorkflowError::AlreadyFinalized`] on a second call: the
    /// repeat attempt is refused rather than silently absorbed, so the audit
    /// trail gains exactly one entry per successful finalization.
    pub fn finalize_case(&self, case_id: &CaseId, actor: &Actor) -> WorkflowResult<Case> {
        self.check_approver(actor)?;

        let case = self.repo.with_case(case_id, actor, |txn| {
            if txn.case().is_finalized() {
                return Err(WorkflowError::AlreadyFinalized);
            }
            if !txn.case().all_stages_approved() {
                return Err(WorkflowError::WorkflowIncomplete);
            }

            let case = txn.case_mut();
            case.finalized_by = Some(actor.to_ref());
            case.finalized_at = Some(Utc::now());

            txn.append_audit(
                actor,
                AuditAction::CaseFinalized,
                format!("Case {case_id}: final report approved."),
            );
            txn.case_mut().rederive_status();
            Ok(txn.case().clone())
        })?;

        tracing::info!(case_id = %case_id, "case finalized");
        Ok(case)
    }

    fn check_approver(&self, actor: &Actor) -> WorkflowResult<()> {
        if !self.policy.can_approve(actor) {
            return Err(WorkflowError::Unauthorized { role: actor.role });
        }
        Ok(())
    }
}

/// The sequential gate: a stage may only be acted on once its predecessor is
/// approved. Gates chain, so checking the immediate predecessor suffices.
fn check_prerequisite(case: &Case, stage: Stage) -> WorkflowResult<()> {
    if let Some(prerequisite) = stage.predecessor() {
        if case.stage(prerequisite).status != StageStatus::Approved {
            return Err(WorkflowError::StagePrerequisiteNotMet {
                stage,
                prerequisite,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
