//! Append-only audit trail for case workflow actions.
//!
//! Every successful state-changing operation writes exactly one entry; a
//! refused or failed operation writes none, because the entry is committed in
//! the same transaction as the state change it documents. Entries are never
//! mutated or deleted: the log file only ever grows, and the git history of
//! the case repository preserves every prior version of it.

use crate::actor::ActorRef;
use crate::error::{StorageError, StorageResult};
use crate::stage::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Action vocabulary
// ============================================================================

/// Controlled vocabulary of audit log actions.
///
/// One kind per workflow transition, mirroring the engine operations plus
/// case registration.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AuditAction {
    CaseCreated,
    StageSaved(Stage),
    StageSubmitted(Stage),
    StageApproved(Stage),
    StageRejected(Stage),
    CaseFinalized,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CaseCreated => "case_created",
            Self::StageSaved(Stage::Gross) => "gross_saved",
            Self::StageSaved(Stage::Preparation) => "preparation_saved",
            Self::StageSaved(Stage::Microscopic) => "microscopic_saved",
            Self::StageSubmitted(Stage::Gross) => "gross_submitted",
            Self::StageSubmitted(Stage::Preparation) => "preparation_submitted",
            Self::StageSubmitted(Stage::Microscopic) => "microscopic_submitted",
            Self::StageApproved(Stage::Gross) => "gross_approved",
            Self::StageApproved(Stage::Preparation) => "preparation_approved",
            Self::StageApproved(Stage::Microscopic) => "microscopic_approved",
            Self::StageRejected(Stage::Gross) => "gross_rejected",
            Self::StageRejected(Stage::Preparation) => "preparation_rejected",
            Self::StageRejected(Stage::Microscopic) => "microscopic_rejected",
            Self::CaseFinalized => "case_finalized",
        }
    }

    /// All spellings accepted on the wire, for error reporting.
    const VARIANTS: &'static [&'static str] = &[
        "case_created",
        "gross_saved",
        "preparation_saved",
        "microscopic_saved",
        "gross_submitted",
        "preparation_submitted",
        "microscopic_submitted",
        "gross_approved",
        "preparation_approved",
        "microscopic_approved",
        "gross_rejected",
        "preparation_rejected",
        "microscopic_rejected",
        "case_finalized",
    ];
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AuditAction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuditAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "case_created" => Ok(Self::CaseCreated),
            "gross_saved" => Ok(Self::StageSaved(Stage::Gross)),
            "preparation_saved" => Ok(Self::StageSaved(Stage::Preparation)),
            "microscopic_saved" => Ok(Self::StageSaved(Stage::Microscopic)),
            "gross_submitted" => Ok(Self::StageSubmitted(Stage::Gross)),
            "preparation_submitted" => Ok(Self::StageSubmitted(Stage::Preparation)),
            "microscopic_submitted" => Ok(Self::StageSubmitted(Stage::Microscopic)),
            "gross_approved" => Ok(Self::StageApproved(Stage::Gross)),
            "preparation_approved" => Ok(Self::StageApproved(Stage::Preparation)),
            "microscopic_approved" => Ok(Self::StageApproved(Stage::Microscopic)),
            "gross_rejected" => Ok(Self::StageRejected(Stage::Gross)),
            "preparation_rejected" => Ok(Self::StageRejected(Stage::Preparation)),
            "microscopic_rejected" => Ok(Self::StageRejected(Stage::Microscopic)),
            "case_finalized" => Ok(Self::CaseFinalized),
            _ => Err(serde::de::Error::unknown_variant(&s, Self::VARIANTS)),
        }
    }
}

// ============================================================================
// Entries and log document
// ============================================================================

/// A single immutable audit record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditEntry {
    /// The acting identity, if still known. Accounts may be deleted after the
    /// fact; the entry survives with the actor cleared.
    pub actor: Option<ActorRef>,
    pub action: AuditAction,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// Audit log document operations.
///
/// Zero-sized type used for namespacing the render/parse pair, mirroring the
/// other YAML documents in the case repository.
pub struct AuditLog;

impl AuditLog {
    /// Render the full audit log as YAML text.
    pub fn render(entries: &[AuditEntry]) -> StorageResult<String> {
        let wire = AuditLogWire {
            entries: entries.iter().map(entry_to_wire).collect(),
        };
        serde_yaml::to_string(&wire).map_err(StorageError::YamlSerialization)
    }

    /// Parse an audit log from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::YamlSchema`] with a best-effort field path if
    /// the YAML does not match the wire schema (unknown keys are rejected),
    /// and [`StorageError::InvalidInput`] for malformed actor identifiers.
    pub fn parse(yaml_text: &str) -> StorageResult<Vec<AuditEntry>> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        let wire = match serde_path_to_error::deserialize::<_, AuditLogWire>(deserializer) {
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

        wire.entries.into_iter().map(wire_to_entry).collect()
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

/// Wire representation of the on-disk audit log.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuditLogWire {
    entries: Vec<AuditEntryWire>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuditEntryWire {
    actor_id: Option<String>,
    actor_name: Option<String>,
    action: AuditAction,
    detail: String,
    timestamp: DateTime<Utc>,
}

fn entry_to_wire(entry: &AuditEntry) -> AuditEntryWire {
    AuditEntryWire {
        actor_id: entry.actor.as_ref().map(|a| a.id.to_string()),
        actor_name: entry.actor.as_ref().map(|a| a.name.clone()),
        action: entry.action,
        detail: entry.detail.clone(),
        timestamp: entry.timestamp,
    }
}

fn wire_to_entry(wire: AuditEntryWire) -> StorageResult<AuditEntry> {
    let actor = match (wire.actor_id, wire.actor_name) {
        (Some(id), Some(name)) => {
            let id = Uuid::parse_str(&id).map_err(|_| {
                StorageError::InvalidInput(format!("invalid UUID in audit actor_id: {id}"))
            })?;
            Some(ActorRef { id, name })
        }
        (None, None) => None,
        _ => {
            return Err(StorageError::InvalidInput(
                "audit entry must carry both actor_id and actor_name, or neither".into(),
            ))
        }
    };

    Ok(AuditEntry {
        actor,
        action: wire.action,
        detail: wire.detail,
        timestamp: wire.timestamp,
    })
}

// ============================================================================
// Tests
// ============================================================================
