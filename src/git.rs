// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Local working-branch check.
//!
//! Deploying pulls the stage's `git_branch` onto the hosts, not whatever the
//! operator has checked out locally. Bundling, however, works from the local
//! tree. When the two differ the operator is probably about to ship assets
//! built from the wrong branch, so the front-end asks before going on.

use git2::{ErrorCode, Repository};
use std::path::Path;
use tracing::debug;

/// Outcome of comparing the local branch with the stage's branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchCheck {
    /// Local branch is the expected one.
    Matches,

    /// Local branch differs from the expected one.
    Mismatch { local: String, expected: String },

    /// No local repository, or HEAD is detached.
    Unknown,
}

/// Name of branch checked out in the repository containing `dir`.
///
/// Returns `None` if `dir` is not inside a repository or HEAD is detached.
/// A freshly initialized repository reports the branch HEAD points to, even
/// though that branch has no commits yet.
///
/// # Errors
///
/// - Return [`GitError::Git2`] if the repository cannot be read.
pub fn working_branch(dir: impl AsRef<Path>) -> Result<Option<String>> {
    let repository = match Repository::discover(dir.as_ref()) {
        Ok(repository) => repository,
        Err(error) if error.code() == ErrorCode::NotFound => {
            debug!("no repository at {}", dir.as_ref().display());
            return Ok(None);
        }
        Err(error) => return Err(error.into()),
    };

    if repository.head_detached()? {
        return Ok(None);
    }

    // INVARIANT: HEAD is symbolic here, but may point to an unborn branch.
    let head = repository.find_reference("HEAD")?;
    let branch = head
        .symbolic_target()
        .and_then(|target| target.strip_prefix("refs/heads/"))
        .map(str::to_owned);

    Ok(branch)
}

/// Compare local branch of repository containing `dir` with expected branch.
///
/// # Errors
///
/// - See [`working_branch`].
pub fn check_branch(dir: impl AsRef<Path>, expected: &str) -> Result<BranchCheck> {
    let check = match working_branch(dir)? {
        Some(local) if local == expected => BranchCheck::Matches,
        Some(local) => BranchCheck::Mismatch {
            local,
            expected: expected.to_string(),
        },
        None => BranchCheck::Unknown,
    };

    Ok(check)
}

/// Git error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Operator declined to deploy from a mismatched branch.
    #[error("local branch {local:?} is not {expected:?}, deployment declined")]
    BranchMismatchDeclined { local: String, expected: String },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;
