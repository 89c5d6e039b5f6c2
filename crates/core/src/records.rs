//! Opaque stage payload storage.
//!
//! Stage payloads are the content proper of each diagnostic stage, the
//! descriptive findings a consumer records through its own forms. The
//! workflow engine never validates this content; it only needs to know
//! whether a payload is present for a stage. Payloads are stored as one JSON
//! file per stage inside the case repository, so they are versioned and
//! committed in the same transaction as the status change that accompanies
//! them.

use crate::config::CoreConfig;
use crate::constants::STAGE_DATA_DIR_NAME;
use crate::error::{StorageError, StorageResult};
use crate::stage::Stage;
use pcw_types::CaseId;
use std::path::PathBuf;
use std::sync::Arc;

/// An opaque stage payload.
///
/// The engine treats the content as a black box; consumers decide its shape.
#[derive(Clone, Debug, PartialEq)]
pub struct StageRecord {
    pub payload: serde_json::Value,
}

impl StageRecord {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }

    /// Render the payload as the on-disk JSON document.
    pub(crate) fn render(&self) -> StorageResult<String> {
        let mut text = serde_json::to_string_pretty(&self.payload)
            .map_err(StorageError::PayloadSerialization)?;
        text.push('\n');
        Ok(text)
    }

    pub(crate) fn parse(text: &str) -> StorageResult<Self> {
        let payload =
            serde_json::from_str(text).map_err(StorageError::PayloadDeserialization)?;
        Ok(Self { payload })
    }
}

/// Read access to stored stage payloads.
///
/// Writes go through the case transaction (`CaseRepository::with_case`) so
/// that payload, status change, and audit entry commit together.
#[derive(Clone, Debug)]
pub struct StageRecordStore {
    cfg: Arc<CoreConfig>,
}

impl StageRecordStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    /// The path of a stage payload file relative to the case repository root.
    pub(crate) fn relative_path(stage: Stage) -> PathBuf {
        PathBuf::from(STAGE_DATA_DIR_NAME).join(format!("{stage}.json"))
    }

    /// Whether a payload has been recorded for the given stage.
    pub fn exists(&self, case_id: &CaseId, stage: Stage) -> bool {
        self.cfg
            .case_dir(case_id)
            .join(Self::relative_path(stage))
            .is_file()
    }

    /// Reads a stage payload, or `None` if no payload has been recorded.
    pub fn get(&self, case_id: &CaseId, stage: Stage) -> StorageResult<Option<StageRecord>> {
        let path = self.cfg.case_dir(case_id).join(Self::relative_path(stage));
        if !path.is_file() {
            return Ok(None);
        }

        let text = std::fs::read_to_string(&path).map_err(StorageError::FileRead)?;
        StageRecord::parse(&text).map(Some)
    }
}
