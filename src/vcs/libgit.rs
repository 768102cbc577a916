// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control through libgit2.
//!
//! Implements [`Vcs`] on top of an existing non-bare repository with a
//! configured remote. Remote authentication goes through [`auth_git2`], which
//! uses the plaintext username and token of the [`GitIdentity`] when given,
//! and falls back to git credential helpers and SSH agents otherwise.

use crate::vcs::{GitIdentity, Result, Vcs, VcsError};

use auth_git2::GitAuthenticator;
use git2::{
    build::CheckoutBuilder, BranchType, Direction, ErrorCode, FetchOptions, IndexAddOption,
    ObjectType, Oid, PushOptions, Remote, RemoteCallbacks, Repository, ResetType, Signature,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{cell::RefCell, path::Path, time};
use tracing::{debug, info, instrument, warn};

/// Default name of remote to synchronize with.
pub const DEFAULT_REMOTE: &str = "origin";

/// Version control access through libgit2.
pub struct Git2Client {
    repository: Repository,
    remote: String,
    identity: GitIdentity,
    bar: ProgressBar,
}

impl Git2Client {
    /// Open existing repository at target path.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Git2`] if repository cannot be opened.
    #[instrument(skip(path), level = "debug")]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        debug!("open repository: {:?}", path.as_ref().display());
        let repository = Repository::open(path.as_ref())?;

        Ok(Self {
            repository,
            remote: DEFAULT_REMOTE.into(),
            identity: GitIdentity::default(),
            bar: ProgressBar::hidden(),
        })
    }

    /// Use target remote instead of [`DEFAULT_REMOTE`].
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Authenticate fetches with target identity.
    ///
    /// Pushes always use the identity handed to [`Vcs::push`].
    pub fn with_identity(mut self, identity: GitIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Display transfer progress through target progress bar.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::IndicatifStyleTemplate`] if bar style is invalid.
    pub fn with_progress(mut self, bar: ProgressBar) -> Result<Self> {
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        self.bar = bar;
        Ok(self)
    }

    fn current_branch(&self) -> Result<String> {
        let head = self.repository.head()?;
        if !head.is_branch() {
            return Err(VcsError::NoBranch);
        }

        head.shorthand().map(ToString::to_string).ok_or(VcsError::NoBranch)
    }

    fn tracking_ref(&self, branch: &str) -> String {
        format!("refs/remotes/{}/{branch}", self.remote)
    }

    /// Fetch branch from remote, returning its tip if remote has it.
    #[instrument(skip(self), level = "debug")]
    fn fetch(&self, branch: &str) -> Result<Option<Oid>> {
        let refspec = format!("+refs/heads/{branch}:{}", self.tracking_ref(branch));
        let config = self.repository.config()?;
        let authenticator = authenticator(&self.identity);

        self.bar.set_message(format!("fetch {}/{branch}", self.remote));
        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                self.bar.set_length(progress.total_objects() as u64);
                self.bar.set_position(progress.received_objects() as u64);
            }
            true
        });

        let mut remote = self.repository.find_remote(&self.remote)?;
        if !self.advertises_branch(&mut remote, branch)? {
            debug!("remote {} does not advertise {branch:?}", self.remote);
            return Ok(None);
        }

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        remote.fetch(&[refspec.as_str()], Some(&mut fo), None)?;
        self.bar.finish_and_clear();

        match self.repository.find_reference(&self.tracking_ref(branch)) {
            Ok(reference) => Ok(reference.target()),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Check if remote lists target branch among its heads.
    ///
    /// Failure to reach the remote is an error, never an absent branch.
    fn advertises_branch(&self, remote: &mut Remote<'_>, branch: &str) -> Result<bool> {
        let config = self.repository.config()?;
        let authenticator = authenticator(&self.identity);
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));

        let connection = remote.connect_auth(Direction::Fetch, Some(rc), None)?;
        let refname = format!("refs/heads/{branch}");
        let found = connection.list()?.iter().any(|head| head.name() == refname);

        Ok(found)
    }

    fn signature(&self, identity: &GitIdentity) -> Result<Signature<'static>> {
        // INVARIANT: Fall back to repository configuration for partial identity.
        if identity.name.is_empty() || identity.email.is_empty() {
            return Ok(self.repository.signature()?);
        }

        Ok(Signature::now(&identity.name, &identity.email)?)
    }
}

impl Vcs for Git2Client {
    #[instrument(skip(self), level = "debug")]
    fn pull_branch(&mut self, branch: &str) -> Result<()> {
        if self.repository.find_branch(branch, BranchType::Local).is_ok() {
            return Err(VcsError::BranchExists {
                branch: branch.into(),
            });
        }

        let (target, tracked) = match self.fetch(branch)? {
            Some(oid) => (oid, true),
            None => {
                warn!("remote lacks branch {branch:?}, branching off HEAD");
                (self.repository.head()?.peel_to_commit()?.id(), false)
            }
        };

        info!("create local branch {branch:?}");
        let commit = self.repository.find_commit(target)?;
        let mut local = self.repository.branch(branch, &commit, false)?;
        if tracked {
            local.set_upstream(Some(&format!("{}/{branch}", self.remote)))?;
        }

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn switch_branch(&mut self, branch: &str) -> Result<()> {
        let refname = format!("refs/heads/{branch}");
        let object = self.repository.revparse_single(&refname)?;
        self.repository
            .checkout_tree(&object, Some(CheckoutBuilder::new().safe()))?;
        self.repository.set_head(&refname)?;
        info!("switched to branch {branch:?}");

        Ok(())
    }

    #[instrument(skip(self, identity), level = "debug")]
    fn commit(&mut self, message: &str, identity: &GitIdentity) -> Result<()> {
        // INVARIANT: Stage additions, modifications, and deletions alike.
        let mut index = self.repository.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repository.find_tree(tree_oid)?;

        let signature = self.signature(identity)?;
        let mut parents = Vec::new();
        if let Some(parent) = self.repository.head().ok().and_then(|head| head.target()) {
            parents.push(self.repository.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        let oid = self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        info!("commit {oid}: {message}");

        Ok(())
    }

    #[instrument(skip(self, identity), level = "debug")]
    fn push(&mut self, identity: &GitIdentity) -> Result<()> {
        let branch = self.current_branch()?;
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let config = self.repository.config()?;
        let authenticator = authenticator(identity);
        let rejection = RefCell::new(None);

        {
            self.bar.set_message(format!("push {}/{branch}", self.remote));
            let bar = self.bar.clone();
            let mut rc = RemoteCallbacks::new();
            rc.credentials(authenticator.credentials(&config));
            rc.push_transfer_progress(move |current, total, _bytes| {
                bar.set_length(total as u64);
                bar.set_position(current as u64);
            });
            rc.push_update_reference(|reference, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some((reference.to_string(), message.to_string()));
                }
                Ok(())
            });

            let mut po = PushOptions::new();
            po.remote_callbacks(rc);
            let mut remote = self.repository.find_remote(&self.remote)?;
            match remote.push(&[refspec.as_str()], Some(&mut po)) {
                Ok(()) => {}
                Err(err) if err.code() == ErrorCode::NotFastForward => {
                    debug!("push rejected locally: {}", err.message());
                    return Err(VcsError::Diverged { branch });
                }
                Err(err) => return Err(err.into()),
            }
            self.bar.finish_and_clear();
        }

        if let Some((reference, message)) = rejection.into_inner() {
            return Err(classify_rejection(branch, reference, message));
        }

        info!("pushed {branch:?} to {}", self.remote);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn pull(&mut self) -> Result<()> {
        let branch = self.current_branch()?;
        let Some(fetched) = self.fetch(&branch)? else {
            return Err(git2::Error::from_str(&format!(
                "remote {} lacks branch {branch:?}",
                self.remote
            ))
            .into());
        };

        let annotated = self.repository.find_annotated_commit(fetched)?;
        let (analysis, _) = self.repository.merge_analysis(&[&annotated])?;
        if analysis.is_up_to_date() {
            debug!("{branch:?} already up to date");
            return Ok(());
        }

        if analysis.is_fast_forward() {
            let refname = format!("refs/heads/{branch}");
            let mut reference = self.repository.find_reference(&refname)?;
            reference.set_target(fetched, "librarian: fast-forward")?;
            self.repository.set_head(&refname)?;
            self.repository
                .checkout_head(Some(CheckoutBuilder::new().force()))?;
            info!("fast-forwarded {branch:?} to {fetched}");
            return Ok(());
        }

        Err(VcsError::Diverged { branch })
    }

    #[instrument(skip(self), level = "debug")]
    fn reset(&mut self) -> Result<()> {
        let branch = self.current_branch()?;
        let reference = self.repository.find_reference(&self.tracking_ref(&branch))?;
        let object = reference.peel(ObjectType::Commit)?;
        self.repository.reset(&object, ResetType::Hard, None)?;
        warn!("reset {branch:?} to {}", object.id());

        Ok(())
    }
}

fn authenticator(identity: &GitIdentity) -> GitAuthenticator {
    let authenticator = GitAuthenticator::default();
    if identity.username.is_empty() || identity.token.is_empty() {
        return authenticator;
    }

    authenticator.add_plaintext_credentials("*", &identity.username, &identity.token)
}

fn classify_rejection(branch: String, reference: String, message: String) -> VcsError {
    if message.contains("non-fast-forward") || message.contains("fetch first") {
        return VcsError::Diverged { branch };
    }

    VcsError::TransportRejected { reference, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_rejections_are_classified() {
        let result = classify_rejection(
            "gh-pages".into(),
            "refs/heads/gh-pages".into(),
            "failed to update ref: non-fast-forward".into(),
        );
        assert!(matches!(result, VcsError::Diverged { branch } if branch == "gh-pages"));

        let result = classify_rejection(
            "gh-pages".into(),
            "refs/heads/gh-pages".into(),
            "pre-receive hook declined".into(),
        );
        assert!(matches!(result, VcsError::TransportRejected { .. }));
    }
}
