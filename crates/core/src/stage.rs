//! Stage and status vocabulary for the case workflow.
//!
//! A case moves through three diagnostic stages in a fixed order: gross
//! examination, preparation, microscopic examination. The gate rule is that a
//! stage may only leave `Pending` once its predecessor has been approved, and
//! the case-wide status is always a pure function of the three per-stage
//! statuses plus the finalized flag; it is recomputed on every transition
//! and never accepted from a caller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three sequential diagnostic stages of a case.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Gross,
    Preparation,
    Microscopic,
}

impl Stage {
    /// All stages in pipeline order.
    pub const SEQUENCE: [Stage; 3] = [Stage::Gross, Stage::Preparation, Stage::Microscopic];

    /// The stage whose approval gates entry into this one.
    ///
    /// `Gross` is the first stage and has no prerequisite. Because the gates
    /// chain, an approved predecessor implies every earlier stage is approved
    /// as well.
    pub const fn predecessor(self) -> Option<Stage> {
        match self {
            Stage::Gross => None,
            Stage::Preparation => Some(Stage::Gross),
            Stage::Microscopic => Some(Stage::Preparation),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Gross => "gross",
            Stage::Preparation => "preparation",
            Stage::Microscopic => "microscopic",
        }
    }

    /// The aggregate status reported while this stage is being worked on.
    pub const fn in_progress_status(self) -> CaseStatus {
        match self {
            Stage::Gross => CaseStatus::InGross,
            Stage::Preparation => CaseStatus::InPreparation,
            Stage::Microscopic => CaseStatus::InMicroscopic,
        }
    }

    /// The aggregate status reported while this stage awaits approval.
    pub const fn awaiting_approval_status(self) -> CaseStatus {
        match self {
            Stage::Gross => CaseStatus::AwaitingGrossApproval,
            Stage::Preparation => CaseStatus::AwaitingPreparationApproval,
            Stage::Microscopic => CaseStatus::AwaitingMicroscopicApproval,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress marker for a single stage.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// No data has been recorded yet.
    Pending,
    /// Data has been recorded and may still be edited.
    InProgress,
    /// Submitted for approval; editing is locked.
    AwaitingApproval,
    /// Signed off by an approver; terminal for the stage.
    Approved,
    /// Sent back by a reviewer; editing is unlocked again.
    Rejected,
}

impl StageStatus {
    /// Whether stage data may still be written in this status.
    ///
    /// Once a stage is awaiting approval or approved its content is locked;
    /// a rejection unlocks it again for rework.
    pub const fn editable(self) -> bool {
        matches!(
            self,
            StageStatus::Pending | StageStatus::InProgress | StageStatus::Rejected
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::AwaitingApproval => "awaiting_approval",
            StageStatus::Approved => "approved",
            StageStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-wide status, derived from the three per-stage statuses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Received,
    InGross,
    AwaitingGrossApproval,
    InPreparation,
    AwaitingPreparationApproval,
    InMicroscopic,
    AwaitingMicroscopicApproval,
    AwaitingFinalApproval,
    Finalized,
}

impl CaseStatus {
    /// Derives the aggregate status from per-stage statuses and the finalized flag.
    ///
    /// The first stage (in pipeline order) that is not yet approved decides
    /// the aggregate value: its own awaiting/in-progress marker, or
    /// `Received` when the case is untouched. A `Pending` stage behind an
    /// approved predecessor reports as in progress: the gate is open even
    /// though no data has been recorded yet.
    pub fn derive(
        gross: StageStatus,
        preparation: StageStatus,
        microscopic: StageStatus,
        finalized: bool,
    ) -> CaseStatus {
        if finalized {
            return CaseStatus::Finalized;
        }

        let statuses = [
            (Stage::Gross, gross),
            (Stage::Preparation, preparation),
            (Stage::Microscopic, microscopic),
        ];

        for (stage, status) in statuses {
            match status {
                StageStatus::Approved => continue,
                StageStatus::AwaitingApproval => return stage.awaiting_approval_status(),
                StageStatus::Pending if matches!(stage, Stage::Gross) => {
                    return CaseStatus::Received
                }
                _ => return stage.in_progress_status(),
            }
        }

        CaseStatus::AwaitingFinalApproval
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Received => "received",
            CaseStatus::InGross => "in_gross",
            CaseStatus::AwaitingGrossApproval => "awaiting_gross_approval",
            CaseStatus::InPreparation => "in_preparation",
            CaseStatus::AwaitingPreparationApproval => "awaiting_preparation_approval",
            CaseStatus::InMicroscopic => "in_microscopic",
            CaseStatus::AwaitingMicroscopicApproval => "awaiting_microscopic_approval",
            CaseStatus::AwaitingFinalApproval => "awaiting_final_approval",
            CaseStatus::Finalized => "finalized",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STAGE_STATUSES: [StageStatus; 5] = [
        StageStatus::Pending,
        StageStatus::InProgress,
        StageStatus::AwaitingApproval,
        StageStatus::Approved,
        StageStatus::Rejected,
    ];

    #[test]
    fn predecessors_chain_in_pipeline_order() {
        assert_eq!(Stage::Gross.predecessor(), None);
        assert_eq!(Stage::Preparation.predecessor(), Some(Stage::Gross));
        assert_eq!(Stage::Microscopic.predecessor(), Some(Stage::Preparation));
    }

    #[test]
    fn derive_fresh_case_is_received() {
        let status = CaseStatus::derive(
            StageStatus::Pending,
            StageStatus::Pending,
            StageStatus::Pending,
            false,
        );
        assert_eq!(status, CaseStatus::Received);
    }

    #[test]
    fn derive_follows_the_happy_path() {
        use StageStatus::*;

        let steps = [
            ((Pending, Pending, Pending), CaseStatus::Received),
            ((InProgress, Pending, Pending), CaseStatus::InGross),
            (
                (AwaitingApproval, Pending, Pending),
                CaseStatus::AwaitingGrossApproval,
            ),
            ((Approved, Pending, Pending), CaseStatus::InPreparation),
            ((Approved, InProgress, Pending), CaseStatus::InPreparation),
            (
                (Approved, AwaitingApproval, Pending),
                CaseStatus::AwaitingPreparationApproval,
            ),
            ((Approved, Approved, Pending), CaseStatus::InMicroscopic),
            ((Approved, Approved, InProgress), CaseStatus::InMicroscopic),
            (
                (Approved, Approved, AwaitingApproval),
                CaseStatus::AwaitingMicroscopicApproval,
            ),
            (
                (Approved, Approved, Approved),
                CaseStatus::AwaitingFinalApproval,
            ),
        ];

        for ((gross, preparation, microscopic), expected) in steps {
            assert_eq!(
                CaseStatus::derive(gross, preparation, microscopic, false),
                expected,
                "derive({gross}, {preparation}, {microscopic})"
            );
        }
    }

    #[test]
    fn derive_rejected_stage_reads_as_in_progress() {
        let status = CaseStatus::derive(
            StageStatus::Approved,
            StageStatus::Rejected,
            StageStatus::Pending,
            false,
        );
        assert_eq!(status, CaseStatus::InPreparation);
    }

    #[test]
    fn derive_finalized_flag_dominates() {
        let status = CaseStatus::derive(
            StageStatus::Approved,
            StageStatus::Approved,
            StageStatus::Approved,
            true,
        );
        assert_eq!(status, CaseStatus::Finalized);
    }

    #[test]
    fn derive_is_total_and_deterministic() {
        // Sweep every combination, including states the engine can never
        // produce; derivation must be defined for all of them and two
        // identical inputs must always map to the same output.
        for gross in ALL_STAGE_STATUSES {
            for preparation in ALL_STAGE_STATUSES {
                for microscopic in ALL_STAGE_STATUSES {
                    for finalized in [false, true] {
                        let first = CaseStatus::derive(gross, preparation, microscopic, finalized);
                        let second = CaseStatus::derive(gross, preparation, microscopic, finalized);
                        assert_eq!(first, second);

                        if finalized {
                            assert_eq!(first, CaseStatus::Finalized);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn derive_first_unapproved_stage_decides() {
        // A later stage's status is irrelevant while an earlier one is open.
        let status = CaseStatus::derive(
            StageStatus::AwaitingApproval,
            StageStatus::AwaitingApproval,
            StageStatus::Pending,
            false,
        );
        assert_eq!(status, CaseStatus::AwaitingGrossApproval);
    }

    #[test]
    fn editable_matches_lock_rule() {
        assert!(StageStatus::Pending.editable());
        assert!(StageStatus::InProgress.editable());
        assert!(StageStatus::Rejected.editable());
        assert!(!StageStatus::AwaitingApproval.editable());
        assert!(!StageStatus::Approved.editable());
    }
}
