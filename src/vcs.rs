// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control collaborator.
//!
//! Publishing only needs a handful of version control operations: prepare the
//! documentation branch, commit, push, pull, and reset. These are modeled
//! through the [`Vcs`] trait, so the publish logic never depends on a
//! specific git implementation. The default implementation is
//! [`Git2Client`](crate::vcs::libgit::Git2Client).
//!
//! # Divergence
//!
//! The remote documentation branch is shared by many publishers. When another
//! publisher pushes first, our local branch __diverges__ from the remote, and
//! any push or fast-forward pull is rejected. Divergence is reported through
//! dedicated error variants so callers never need to inspect error messages
//! to decide whether to retry.

pub mod libgit;

/// Identity used for commits and remote authentication.
#[derive(Default, Debug, PartialEq, Eq, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct GitIdentity {
    /// Author and committer name.
    pub name: String,

    /// Username to authenticate against remote with.
    pub username: String,

    /// Author and committer email.
    pub email: String,

    /// Access token to authenticate against remote with.
    pub token: String,
}

/// Layer of indirection for version control access.
pub trait Vcs {
    /// Make target branch available locally by pulling it from remote.
    ///
    /// Returns [`VcsError::BranchExists`] if branch is already local.
    fn pull_branch(&mut self, branch: &str) -> Result<()>;

    /// Switch working tree over to target branch.
    fn switch_branch(&mut self, branch: &str) -> Result<()>;

    /// Stage all changes of working tree and commit them.
    fn commit(&mut self, message: &str, identity: &GitIdentity) -> Result<()>;

    /// Push current branch to remote.
    fn push(&mut self, identity: &GitIdentity) -> Result<()>;

    /// Pull current branch from remote through fast-forward.
    fn pull(&mut self) -> Result<()>;

    /// Discard local history of current branch back to remote state.
    fn reset(&mut self) -> Result<()>;
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Branch already exists locally.
    #[error("branch {branch:?} already exists")]
    BranchExists { branch: String },

    /// Local and remote history diverged, no fast-forward possible.
    #[error("non-fast-forward update of {branch:?}")]
    Diverged { branch: String },

    /// Remote rejected reference update.
    #[error("remote rejected update of {reference:?}: {message}")]
    TransportRejected { reference: String, message: String },

    /// No branch is checked out.
    #[error("HEAD does not point to a branch")]
    NoBranch,

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

impl VcsError {
    /// Check if error means remote moved ahead of us, and retry may succeed.
    pub fn is_divergence(&self) -> bool {
        matches!(self, Self::Diverged { .. } | Self::TransportRejected { .. })
    }
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
