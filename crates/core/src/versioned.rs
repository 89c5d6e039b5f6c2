//! Versioned file operations with git-based version control for case records.
//!
//! PCW stores each case as a directory of YAML/JSON files and versions that
//! directory with a local git repository (`git2`/libgit2). Every workflow
//! transition becomes exactly one commit, which gives the engine:
//!
//! - **Atomic multi-file transactions**: the status document, stage payload,
//!   and audit log are written and committed together, with automatic
//!   rollback of the working tree if any step fails
//! - **Consistent commit creation**: structured commit messages with a
//!   controlled domain/action vocabulary
//! - **An immutable history**: nothing is ever deleted; every prior state of
//!   the case record is preserved in version control
//!
//! ## Branch policy
//!
//! PCW standardises on `refs/heads/main` for all case repositories.
//!
//! ## Safety
//!
//! Commit messages are labels and indexes. Do not include case identifiers,
//! subject identifiers, or clinical content in them; that data belongs in the
//! versioned files themselves.

use crate::actor::Actor;
use crate::error::{StorageError, StorageResult};
use crate::stage::Stage;
use std::fmt;
use std::path::{Path, PathBuf};

const MAIN_REF: &str = "refs/heads/main";

/// Commit message domain: which part of the case record changed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) enum CommitDomain {
    Case,
    Stage(Stage),
}

impl CommitDomain {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Case => "case",
            Self::Stage(stage) => stage.as_str(),
        }
    }
}

impl fmt::Display for CommitDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commit message action: the workflow operation being recorded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) enum CommitAction {
    Create,
    Save,
    Submit,
    Approve,
    Reject,
    Finalize,
}

impl CommitAction {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Save => "save",
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for CommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured, predictable commit message.
///
/// Rendering rules:
///
/// - Subject line: `<domain>:<action>: <summary>`
/// - Trailers: `Actor-Name` and `Actor-Role`, separated from the subject by a
///   single blank line
/// - No free-form prose paragraphs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CommitMessage {
    domain: CommitDomain,
    action: CommitAction,
    summary: String,
}

impl CommitMessage {
    /// Create a new commit message with required fields.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidInput` if the summary is empty or
    /// contains newlines.
    pub(crate) fn new(
        domain: CommitDomain,
        action: CommitAction,
        summary: impl AsRef<str>,
    ) -> StorageResult<Self> {
        let summary = summary.as_ref().trim();
        if summary.is_empty() {
            return Err(StorageError::InvalidInput(
                "commit summary must be non-empty".into(),
            ));
        }
        if summary.contains(['\n', '\r']) {
            return Err(StorageError::InvalidInput(
                "commit summary must be single-line".into(),
            ));
        }

        Ok(Self {
            domain,
            action,
            summary: summary.to_owned(),
        })
    }

    /// Render the commit message including the mandatory actor trailers.
    pub(crate) fn render_with_actor(&self, actor: &Actor) -> String {
        let mut rendered = format!("{}:{}: {}", self.domain, self.action, self.summary);
        rendered.push_str("\n\n");
        rendered.push_str("Actor-Name: ");
        rendered.push_str(actor.name.as_str());
        rendered.push('\n');
        rendered.push_str("Actor-Role: ");
        rendered.push_str(actor.role.as_str());
        rendered
    }
}

/// Represents a file to be written and committed.
///
/// Used with [`VersionedFileService::write_and_commit_files`] to write
/// multiple files in a single atomic commit operation.
#[derive(Debug, Clone)]
pub(crate) struct FileToWrite<'a> {
    /// The relative path to the file within the repository directory.
    pub relative_path: &'a Path,
    /// The new content to write to the file.
    pub content: &'a str,
    /// The previous file content for rollback. `None` if this is a new file.
    pub old_content: Option<&'a str>,
}

/// Service for managing versioned case files with git version control.
///
/// Provides the atomic write-and-commit primitive every workflow transaction
/// runs through: write the staged files, commit them in one commit, and roll
/// the working tree back if anything fails along the way.
pub(crate) struct VersionedFileService {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl VersionedFileService {
    /// Create a new git repository at the specified working directory.
    pub(crate) fn init(workdir: &Path) -> StorageResult<Self> {
        let repo = git2::Repository::init(workdir).map_err(StorageError::GitInit)?;
        // Use the actual workdir from the repository to ensure path stripping works correctly.
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                StorageError::GitInit(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    /// Open an existing git repository at the specified working directory.
    ///
    /// Uses `NO_SEARCH` so git2 does not walk parent directories looking for
    /// a `.git` folder; each case repository must be opened exactly at its
    /// own root.
    pub(crate) fn open(workdir: &Path) -> StorageResult<Self> {
        let repo = git2::Repository::open_ext(
            workdir,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(StorageError::GitOpen)?;
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                StorageError::GitOpen(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    /// Ensure `HEAD` points at `refs/heads/main`.
    ///
    /// For newly initialised repositories this creates an "unborn" `main`
    /// branch that is born with the first commit.
    fn ensure_main_head(&self) -> StorageResult<()> {
        self.repo
            .set_head(MAIN_REF)
            .map_err(StorageError::GitSetHead)?;
        Ok(())
    }

    /// Writes multiple files and commits them in one commit, rolling back on failure.
    ///
    /// Opens the repository, creates any needed parent directories, writes
    /// all files, and commits them together. If any step fails, files that
    /// previously existed are restored, new files are removed, and
    /// directories created by this operation are removed again.
    pub(crate) fn write_and_commit_files(
        repo_path: &Path,
        actor: &Actor,
        msg: &CommitMessage,
        files: &[FileToWrite],
    ) -> StorageResult<()> {
        let repo = Self::open(repo_path)?;

        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut written_files: Vec<(PathBuf, Option<String>)> = Vec::new();

        let result: StorageResult<()> = (|| {
            // Collect all unique parent directories needed
            let mut dirs_needed = std::collections::HashSet::new();
            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                if let Some(parent) = full_path.parent() {
                    let mut current = parent;
                    while current != repo.workdir && !current.exists() {
                        dirs_needed.insert(current.to_path_buf());
                        if let Some(parent_of_current) = current.parent() {
                            current = parent_of_current;
                        } else {
                            break;
                        }
                    }
                }
            }

            // Create directories, shallowest first
            let mut dirs_to_create: Vec<PathBuf> = dirs_needed.into_iter().collect();
            dirs_to_create.sort_by_key(|p| p.components().count());

            for dir in &dirs_to_create {
                std::fs::create_dir(dir).map_err(StorageError::FileWrite)?;
                created_dirs.push(dir.clone());
            }

            // Write all files
            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                let old_content = file.old_content.map(|s| s.to_string());

                std::fs::write(&full_path, file.content).map_err(StorageError::FileWrite)?;
                written_files.push((full_path, old_content));
            }

            // Commit all files in a single commit
            let paths: Vec<PathBuf> = files
                .iter()
                .map(|f| f.relative_path.to_path_buf())
                .collect();
            repo.commit_paths(actor, msg, &paths)?;

            Ok(())
        })();

        match result {
            Ok(()) => Ok(()),
            Err(write_error) => {
                // Rollback file changes (in reverse order)
                for (full_path, old_content) in written_files.iter().rev() {
                    match old_content {
                        Some(contents) => {
                            let _ = std::fs::write(full_path, contents);
                        }
                        None => {
                            let _ = std::fs::remove_file(full_path);
                        }
                    }
                }

                // Rollback newly created directories (deepest first)
                for dir in created_dirs.iter().rev() {
                    let _ = std::fs::remove_dir(dir);
                }

                Err(write_error)
            }
        }
    }

    /// Initialise a git repository, commit initial files, and clean up on failure.
    ///
    /// Either the case repository is fully initialised with its first commit,
    /// or the directory is completely removed again. If cleanup itself fails,
    /// both errors are reported together.
    pub(crate) fn init_and_commit(
        case_dir: &Path,
        actor: &Actor,
        message: &CommitMessage,
        files: &[FileToWrite],
    ) -> StorageResult<()> {
        let result: StorageResult<()> = (|| {
            let _repo = Self::init(case_dir)?;
            Self::write_and_commit_files(case_dir, actor, message, files)?;
            Ok(())
        })();

        match result {
            Ok(()) => Ok(()),
            Err(init_error) => {
                if let Err(cleanup_error) = std::fs::remove_dir_all(case_dir) {
                    return Err(StorageError::CleanupAfterCreateFailed {
                        path: case_dir.to_path_buf(),
                        init_error: Box::new(init_error),
                        cleanup_error,
                    });
                }
                Err(init_error)
            }
        }
    }

    /// Create a commit including only the provided workdir-relative paths.
    ///
    /// Paths containing `..` are rejected.
    pub(crate) fn commit_paths(
        &self,
        actor: &Actor,
        message: &CommitMessage,
        relative_paths: &[PathBuf],
    ) -> StorageResult<git2::Oid> {
        self.ensure_main_head()?;
        let mut index = self.repo.index().map_err(StorageError::GitIndex)?;

        for path in relative_paths {
            // `git2::Index::add_path` requires repo-workdir-relative paths.
            let rel = if path.is_absolute() {
                path.strip_prefix(&self.workdir)
                    .map_err(|_| {
                        StorageError::InvalidInput(
                            "path is outside the repository working directory".into(),
                        )
                    })?
                    .to_path_buf()
            } else {
                path.to_path_buf()
            };

            if rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(StorageError::InvalidInput(
                    "path must not contain parent directory references (..)".into(),
                ));
            }

            index.add_path(&rel).map_err(StorageError::GitAdd)?;
        }

        let rendered = message.render_with_actor(actor);
        self.commit_from_index(actor, &rendered, &mut index)
    }

    /// Create a commit from the current git index state.
    fn commit_from_index(
        &self,
        actor: &Actor,
        message: &str,
        index: &mut git2::Index,
    ) -> StorageResult<git2::Oid> {
        let tree_id = index.write_tree().map_err(StorageError::GitWriteTree)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(StorageError::GitFindTree)?;

        let sig = git2::Signature::now(actor.name.as_str(), actor.email.as_str())
            .map_err(StorageError::GitSignature)?;

        let parents = self.resolve_head_parents()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .map_err(StorageError::GitCommit)
    }

    /// Resolve the parent commit(s) for a new commit.
    ///
    /// An unborn `main` (first commit) yields an empty parent list; an
    /// existing `HEAD` commit becomes the single parent of a linear history.
    fn resolve_head_parents(&self) -> StorageResult<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(StorageError::GitPeel)?;
                Ok(vec![commit])
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(StorageError::GitHead(e)),
        }
    }

    /// Returns the `HEAD` commit, if the repository has one.
    #[cfg(test)]
    pub(crate) fn head_commit(&self) -> StorageResult<git2::Commit<'_>> {
        self.repo
            .head()
            .map_err(StorageError::GitHead)?
            .peel_to_commit()
            .map_err(StorageError::GitPeel)
    }
}
