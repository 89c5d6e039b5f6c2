//! The case aggregate and its on-disk document.
//!
//! A `Case` owns the workflow bookkeeping for one laboratory case: intake
//! metadata, one status block per diagnostic stage, the derived aggregate
//! status, and the final sign-off. It does not own the stage payload content;
//! that lives beside it in the case repository, keyed by stage, and is opaque
//! to the workflow engine.
//!
//! The document follows the strict wire-model/domain-model split used across
//! this crate: the wire struct is the exact YAML schema (unknown keys are
//! rejected), and translation to the domain type validates identifiers. The
//! stored aggregate status is recomputed from the stage blocks on every parse
//! and overwritten on every transaction; it is never trusted as input.

use crate::actor::{Actor, ActorRef};
use crate::error::{StorageError, StorageResult};
use crate::stage::{CaseStatus, Stage, StageStatus};
use chrono::{DateTime, NaiveDate, Utc};
use pcw_types::{CaseId, NonEmptyText};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Domain types
// ============================================================================

/// Per-stage workflow bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageBlock {
    pub status: StageStatus,
    pub filled_by: Option<ActorRef>,
    pub filled_at: Option<DateTime<Utc>>,
    pub approved_by: Option<ActorRef>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl StageBlock {
    fn pending() -> Self {
        Self {
            status: StageStatus::Pending,
            filled_by: None,
            filled_at: None,
            approved_by: None,
            approved_at: None,
        }
    }
}

/// Intake metadata captured when a case is registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseIntake {
    /// Chart number of the subject record this case belongs to.
    pub subject_id: NonEmptyText,
    /// Date the specimen was received by the laboratory.
    pub received_on: NaiveDate,
    /// The clinician who requested the examination.
    pub requested_by: NonEmptyText,
}

/// The case aggregate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Case {
    pub id: CaseId,
    pub intake: CaseIntake,
    pub created_by: ActorRef,
    pub created_at: DateTime<Utc>,
    gross: StageBlock,
    preparation: StageBlock,
    microscopic: StageBlock,
    /// Derived from the stage blocks; kept on the struct (and on disk) for
    /// query convenience, rederived on every mutation and parse.
    pub status: CaseStatus,
    pub finalized_by: Option<ActorRef>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Case {
    /// Creates a fresh case with all stages pending.
    pub fn new(id: CaseId, intake: CaseIntake, created_by: &Actor, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            intake,
            created_by: created_by.to_ref(),
            created_at,
            gross: StageBlock::pending(),
            preparation: StageBlock::pending(),
            microscopic: StageBlock::pending(),
            status: CaseStatus::Received,
            finalized_by: None,
            finalized_at: None,
        }
    }

    pub fn stage(&self, stage: Stage) -> &StageBlock {
        match stage {
            Stage::Gross => &self.gross,
            Stage::Preparation => &self.preparation,
            Stage::Microscopic => &self.microscopic,
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageBlock {
        match stage {
            Stage::Gross => &mut self.gross,
            Stage::Preparation => &mut self.preparation,
            Stage::Microscopic => &mut self.microscopic,
        }
    }

    /// Whether the final sign-off has been recorded. Terminal: no further
    /// stage or aggregate mutation is permitted afterwards.
    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }

    /// True iff every stage has been approved.
    pub fn all_stages_approved(&self) -> bool {
        Stage::SEQUENCE
            .iter()
            .all(|&stage| self.stage(stage).status == StageStatus::Approved)
    }

    /// The aggregate status derived from current stage state.
    pub fn derived_status(&self) -> CaseStatus {
        CaseStatus::derive(
            self.gross.status,
            self.preparation.status,
            self.microscopic.status,
            self.is_finalized(),
        )
    }

    /// Recomputes and stores the aggregate status.
    pub fn rederive_status(&mut self) {
        self.status = self.derived_status();
    }
}

// ============================================================================
// Document operations
// ============================================================================

/// Case document operations.
///
/// Zero-sized type namespacing the render/parse pair for `CASE_STATUS.yaml`.
pub struct CaseDocument;

impl CaseDocument {
    /// Parse a case from YAML text.
    ///
    /// The aggregate status is rederived from the parsed stage blocks; if the
    /// stored value disagrees it is discarded with a warning rather than
    /// trusted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::YamlSchema`] with a best-effort field path if
    /// the YAML does not match the wire schema (unknown keys are rejected),
    /// and [`StorageError::InvalidInput`] for malformed identifiers.
    pub fn parse(yaml_text: &str) -> StorageResult<Case> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        let wire = match serde_path_to_error::deserialize::<_, CaseWire>(deserializer) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let path = if path.is_empty() {
                    "<root>".to_owned()
                } else {
                    path
                };
                return Err(StorageError::YamlSchema {
                    path,
                    source: err.into_inner(),
                });
            }
        };

        wire_to_case(wire)
    }

    /// Render a case as YAML text.
    pub fn render(case: &Case) -> StorageResult<String> {
        let wire = case_to_wire(case);
        serde_yaml::to_string(&wire).map_err(StorageError::YamlSerialization)
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

/// Wire representation of a case for on-disk YAML.
///
/// This is the exact structure serialized to/from `CASE_STATUS.yaml`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CaseWire {
    case_id: String,
    subject_id: NonEmptyText,
    received_on: NaiveDate,
    requested_by: NonEmptyText,
    created_by: ActorRefWire,
    created_at: DateTime<Utc>,
    status: CaseStatus,
    finalized_by: Option<ActorRefWire>,
    finalized_at: Option<DateTime<Utc>>,
    stages: StagesWire,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StagesWire {
    gross: StageBlockWire,
    preparation: StageBlockWire,
    microscopic: StageBlockWire,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageBlockWire {
    status: StageStatus,
    filled_by: Option<ActorRefWire>,
    filled_at: Option<DateTime<Utc>>,
    approved_by: Option<ActorRefWire>,
    approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActorRefWire {
    id: String,
    name: String,
}

fn actor_ref_to_wire(actor: &ActorRef) -> ActorRefWire {
    ActorRefWire {
        id: actor.id.to_string(),
        name: actor.name.clone(),
    }
}

fn wire_to_actor_ref(wire: ActorRefWire, field: &str) -> StorageResult<ActorRef> {
    let id = Uuid::parse_str(&wire.id)
        .map_err(|_| StorageError::InvalidInput(format!("invalid UUID in {field}: {}", wire.id)))?;
    Ok(ActorRef {
        id,
        name: wire.name,
    })
}

fn stage_block_to_wire(block: &StageBlock) -> StageBlockWire {
    StageBlockWire {
        status: block.status,
        filled_by: block.filled_by.as_ref().map(actor_ref_to_wire),
        filled_at: block.filled_at,
        approved_by: block.approved_by.as_ref().map(actor_ref_to_wire),
        approved_at: block.approved_at,
    }
}

fn wire_to_stage_block(wire: StageBlockWire, stage: Stage) -> StorageResult<StageBlock> {
    Ok(StageBlock {
        status: wire.status,
        filled_by: wire
            .filled_by
            .map(|w| wire_to_actor_ref(w, &format!("stages.{stage}.filled_by")))
            .transpose()?,
        filled_at: wire.filled_at,
        approved_by: wire
            .approved_by
            .map(|w| wire_to_actor_ref(w, &format!("stages.{stage}.approved_by")))
            .transpose()?,
        approved_at: wire.approved_at,
    })
}

fn case_to_wire(case: &Case) -> CaseWire {
    CaseWire {
        case_id: case.id.as_str().to_owned(),
        subject_id: case.intake.subject_id.clone(),
        received_on: case.intake.received_on,
        requested_by: case.intake.requested_by.clone(),
        created_by: actor_ref_to_wire(&case.created_by),
        created_at: case.created_at,
        status: case.status,
        finalized_by: case.finalized_by.as_ref().map(actor_ref_to_wire),
        finalized_at: case.finalized_at,
        stages: StagesWire {
            gross: stage_block_to_wire(case.stage(Stage::Gross)),
            preparation: stage_block_to_wire(case.stage(Stage::Preparation)),
            microscopic: stage_block_to_wire(case.stage(Stage::Microscopic)),
        },
    }
}

fn wire_to_case(wire: CaseWire) -> StorageResult<Case> {
    let id = CaseId::new(&wire.case_id)
        .map_err(|e| StorageError::InvalidInput(format!("invalid case_id: {e}")))?;

    let mut case = Case {
        id,
        intake: CaseIntake {
            subject_id: wire.subject_id,
            received_on: wire.received_on,
            requested_by: wire.requested_by,
        },
        created_by: wire_to_actor_ref(wire.created_by, "created_by")?,
        created_at: wire.created_at,
        gross: wire_to_stage_block(wire.stages.gross, Stage::Gross)?,
        preparation: wire_to_stage_block(wire.stages.preparation, Stage::Preparation)?,
        microscopic: wire_to_stage_block(wire.stages.microscopic, Stage::Microscopic)?,
        status: wire.status,
        finalized_by: wire
            .finalized_by
            .map(|w| wire_to_actor_ref(w, "finalized_by"))
            .transpose()?,
        finalized_at: wire.finalized_at,
    };

    let derived = case.derived_status();
    if case.status != derived {
        tracing::warn!(
            case_id = %case.id,
            stored = %case.status,
            derived = %derived,
            "stored case status disagrees with stage state; using derived value"
        );
        case.status = derived;
    }

    Ok(case)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_actor() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            name: NonEmptyText::new("Ana Lima").expect("valid name"),
            email: NonEmptyText::new("ana@lab.example").expect("valid email"),
            role: crate::actor::Role::Student,
        }
    }

    fn test_case() -> Case {
        Case::new(
            CaseId::new("LAB001").expect("valid case id"),
            CaseIntake {
                subject_id: NonEmptyText::new("12345").expect("valid subject"),
                received_on: NaiveDate::from_ymd_opt(2026, 8, 1).expect("valid date"),
                requested_by: NonEmptyText::new("Dr. Chart").expect("valid requester"),
            },
            &test_actor(),
            Utc::now(),
        )
    }

    #[test]
    fn new_case_starts_received_with_pending_stages() {
        let case = test_case();
        assert_eq!(case.status, CaseStatus::Received);
        for stage in Stage::SEQUENCE {
            assert_eq!(case.stage(stage).status, StageStatus::Pending);
            assert!(case.stage(stage).filled_by.is_none());
        }
        assert!(!case.is_finalized());
    }

    #[test]
    fn round_trips_fresh_case() {
        let case = test_case();
        let yaml = CaseDocument::render(&case).expect("render case");
        let reparsed = CaseDocument::parse(&yaml).expect("parse case");
        assert_eq!(case, reparsed);
    }

    #[test]
    fn round_trips_case_mid_workflow() {
        let actor = test_actor();
        let mut case = test_case();

        let block = case.stage_mut(Stage::Gross);
        block.status = StageStatus::Approved;
        block.filled_by = Some(actor.to_ref());
        block.filled_at = Some(Utc::now());
        block.approved_by = Some(actor.to_ref());
        block.approved_at = Some(Utc::now());
        case.stage_mut(Stage::Preparation).status = StageStatus::InProgress;
        case.rederive_status();

        assert_eq!(case.status, CaseStatus::InPreparation);

        let yaml = CaseDocument::render(&case).expect("render case");
        let reparsed = CaseDocument::parse(&yaml).expect("parse case");
        assert_eq!(case, reparsed);
    }

    #[test]
    fn parse_corrects_stale_stored_status() {
        let mut case = test_case();
        case.stage_mut(Stage::Gross).status = StageStatus::InProgress;
        // Deliberately leave the stored aggregate stale (Received).

        let yaml = CaseDocument::render(&case).expect("render case");
        let reparsed = CaseDocument::parse(&yaml).expect("parse case");
        assert_eq!(reparsed.status, CaseStatus::InGross);
    }

    #[test]
    fn parse_rejects_unknown_keys() {
        let case = test_case();
        let yaml = CaseDocument::render(&case).expect("render case");
        let yaml = format!("{yaml}unexpected_key: should_fail\n");

        let err = CaseDocument::parse(&yaml).expect_err("should reject unknown key");
        assert!(matches!(err, StorageError::YamlSchema { .. }));
    }

    #[test]
    fn parse_rejects_invalid_creator_id() {
        let case = test_case();
        let yaml = CaseDocument::render(&case).expect("render case");
        let yaml = yaml.replace(&case.created_by.id.to_string(), "not-a-uuid");

        let err = CaseDocument::parse(&yaml).expect_err("should reject invalid creator id");
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[test]
    fn finalized_case_derives_finalized() {
        let actor = test_actor();
        let mut case = test_case();
        for stage in Stage::SEQUENCE {
            case.stage_mut(stage).status = StageStatus::Approved;
        }
        case.finalized_by = Some(actor.to_ref());
        case.finalized_at = Some(Utc::now());
        case.rederive_status();

        assert_eq!(case.status, CaseStatus::Finalized);
        assert!(case.is_finalized());
        assert!(case.all_stages_approved());
    }
}
