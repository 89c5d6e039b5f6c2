//! Constants used throughout the PCW core crate.
//!
//! This module contains all path and filename constants to ensure
//! consistency across the codebase and make maintenance easier.

/// Directory name for case record storage.
pub const CASES_DIR_NAME: &str = "cases";

/// Default directory for case data storage when no explicit directory is configured.
pub const DEFAULT_CASE_DATA_DIR: &str = "case_data";

/// Filename for the case status document inside a case repository.
pub const CASE_STATUS_FILENAME: &str = "CASE_STATUS.yaml";

/// Filename for the append-only audit log inside a case repository.
pub const AUDIT_LOG_FILENAME: &str = "audit_log.yaml";

/// Directory name for stage payload files inside a case repository.
pub const STAGE_DATA_DIR_NAME: &str = "stages";
