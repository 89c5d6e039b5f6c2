//! Error types for the PCW core crate.

use crate::actor::Role;
use crate::stage::{Stage, StageStatus};

/// Errors raised by the storage layer (filesystem, YAML documents, git).
///
/// The transaction either committed or was rolled back before any of these
/// surface, so callers may treat them as transient and retry.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("case already exists: {0}")]
    CaseExists(String),
    #[error("case not found: {0}")]
    CaseNotFound(String),
    #[error("failed to create case directory: {0}")]
    CaseDirCreation(std::io::Error),
    #[error(
        "case creation failed and cleanup also failed (path: {path}): init={init_error}; cleanup={cleanup_error}",
        path = path.display()
    )]
    CleanupAfterCreateFailed {
        path: std::path::PathBuf,
        #[source]
        init_error: Box<StorageError>,
        cleanup_error: std::io::Error,
    },
    #[error("failed to write case file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read case file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize stage payload: {0}")]
    PayloadSerialization(serde_json::Error),
    #[error("failed to deserialize stage payload: {0}")]
    PayloadDeserialization(serde_json::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("case document schema mismatch at {path}: {source}")]
    YamlSchema {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to initialise git repository: {0}")]
    GitInit(git2::Error),
    #[error("failed to open git repository: {0}")]
    GitOpen(git2::Error),
    #[error("failed to access git index: {0}")]
    GitIndex(git2::Error),
    #[error("failed to add file to git index: {0}")]
    GitAdd(git2::Error),
    #[error("failed to write git tree: {0}")]
    GitWriteTree(git2::Error),
    #[error("failed to find git tree: {0}")]
    GitFindTree(git2::Error),
    #[error("failed to create git signature: {0}")]
    GitSignature(git2::Error),
    #[error("failed to create git commit: {0}")]
    GitCommit(git2::Error),
    #[error("failed to get git head: {0}")]
    GitHead(git2::Error),
    #[error("failed to set git head: {0}")]
    GitSetHead(git2::Error),
    #[error("failed to peel git commit: {0}")]
    GitPeel(git2::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors returned by workflow engine operations.
///
/// Every variant except `Storage` is a refused precondition: the transition
/// did not happen and nothing was written. `Storage` wraps the granular
/// storage family and is the only variant a caller should consider retrying.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Attempted to edit a stage that is already awaiting approval or approved.
    #[error("{stage} stage is locked for editing (status: {status})")]
    StageLocked { stage: Stage, status: StageStatus },

    /// Attempted to act on a stage before its predecessor was approved.
    #[error("{stage} stage requires the {prerequisite} stage to be approved first")]
    StagePrerequisiteNotMet { stage: Stage, prerequisite: Stage },

    /// Attempted to request approval before any stage data was recorded.
    #[error("no data recorded for the {stage} stage")]
    NoDataRecorded { stage: Stage },

    /// The requested transition is not legal from the current stage status.
    #[error("{stage} stage cannot make this transition from status {status}")]
    InvalidStageState { stage: Stage, status: StageStatus },

    /// The actor's role does not authorize approvals or finalization.
    #[error("role {role} is not authorized to approve")]
    Unauthorized { role: Role },

    /// Finalization attempted before all three stages are approved.
    #[error("cannot finalize: not all stages are approved")]
    WorkflowIncomplete,

    /// Finalization attempted on an already finalized case.
    #[error("case is already finalized")]
    AlreadyFinalized,

    /// The underlying storage transaction failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
