//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process
//! startup and then passed into core services. The intent is to avoid reading
//! process-wide environment variables during operation handling, which can
//! lead to inconsistent behaviour in multi-threaded runtimes and test
//! harnesses.

use crate::constants::CASES_DIR_NAME;
use pcw_types::CaseId;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    case_data_dir: PathBuf,
}

impl CoreConfig {
    /// Create a new `CoreConfig` rooted at the given data directory.
    pub fn new(case_data_dir: PathBuf) -> Self {
        Self { case_data_dir }
    }

    pub fn case_data_dir(&self) -> &Path {
        &self.case_data_dir
    }

    /// The directory holding all case repositories.
    pub fn cases_dir(&self) -> PathBuf {
        self.case_data_dir.join(CASES_DIR_NAME)
    }

    /// The repository directory for one case.
    ///
    /// Case identifiers are restricted to a filesystem-safe character set by
    /// [`CaseId`], so joining them onto the base path cannot escape it.
    pub fn case_dir(&self, case_id: &CaseId) -> PathBuf {
        self.cases_dir().join(case_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_dir_nests_under_cases_dir() {
        let cfg = CoreConfig::new(PathBuf::from("/data"));
        let case_id = CaseId::new("LAB001").expect("valid case id");

        assert_eq!(cfg.cases_dir(), PathBuf::from("/data/cases"));
        assert_eq!(cfg.case_dir(&case_id), PathBuf::from("/data/cases/LAB001"));
    }
}
