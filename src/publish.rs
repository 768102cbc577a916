// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Publish coordination.
//!
//! A __publish__ brings the article of one container build up to date on the
//! documentation branch of the remote. It runs as a strict sequence of steps:
//!
//! 1. Resolve description of container from its primary spec, if any.
//! 2. Make documentation branch available locally, and switch to it.
//! 3. Load existing article, and merge the build into it.
//! 4. Render and write article, then commit.
//! 5. Push to remote, retrying if another publisher got there first.
//!
//! # Optimistic Concurrency
//!
//! Many CI jobs publish different containers onto the same documentation
//! branch at the same time. Nobody holds a lock. When a push is rejected
//! because the remote moved ahead, the publisher pulls the remote branch,
//! resets onto it if a fast-forward is impossible, re-renders its article from
//! memory, commits again, and retries the push. Publishers touch different
//! files, so reapplying the article on top of the remote never loses anyone
//! else's work.

pub mod retry;

use crate::{
    article::{Article, Build},
    build::{
        find_package_path, parser::SpecParser, BuildClassifier, BuildError, BuildKind, SpackEnv,
    },
    path::RepoLayout,
    publish::retry::RetryPolicy,
    store::{self, StoreError},
    vcs::{GitIdentity, Vcs, VcsError},
};

use chrono::Utc;
use std::{
    path::PathBuf,
    thread::sleep,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Version used for builds that do not state one.
pub const DEFAULT_VERSION: &str = "latest";

/// Container build to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    /// Name of container.
    pub container: String,

    /// Version of build, defaults to [`DEFAULT_VERSION`].
    pub version: Option<String>,

    /// Size of built container.
    pub size: String,

    /// Documentation branch to publish onto.
    pub branch: String,

    /// Identity to commit and push with.
    pub identity: GitIdentity,
}

impl PublishRequest {
    /// Version of build, falling back to [`DEFAULT_VERSION`].
    pub fn version(&self) -> &str {
        self.version
            .as_deref()
            .filter(|version| !version.is_empty())
            .unwrap_or(DEFAULT_VERSION)
    }
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Path of written article.
    pub path: PathBuf,

    /// Article as published.
    pub article: Article,

    /// Number of push attempts needed.
    pub attempts: u32,
}

/// Coordinate publishing of container articles.
pub struct Publisher<V, C, P>
where
    V: Vcs,
    C: BuildClassifier,
    P: SpecParser,
{
    vcs: V,
    classifier: C,
    parser: P,
    layout: RepoLayout,
    retry: RetryPolicy,
}

impl<V, C, P> Publisher<V, C, P>
where
    V: Vcs,
    C: BuildClassifier,
    P: SpecParser,
{
    /// Construct new publisher with default retry policy.
    pub fn new(vcs: V, classifier: C, parser: P, layout: RepoLayout) -> Self {
        Self {
            vcs,
            classifier,
            parser,
            layout,
            retry: RetryPolicy::default(),
        }
    }

    /// Use target retry policy for contended pushes.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Version control client of publisher.
    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Publish article of container build onto documentation branch.
    ///
    /// # Errors
    ///
    /// - Return [`PublishError::Build`] if description cannot be resolved.
    /// - Return [`PublishError::Store`] if article cannot be loaded or written.
    /// - Return [`PublishError::Vcs`] if any non-divergence git error occurs.
    /// - Return [`PublishError::DivergenceRetriesExhausted`] if remote kept
    ///   moving ahead for every allowed push attempt.
    /// - Return [`PublishError::DeadlineExceeded`] if retrying would run past
    ///   the deadline of the retry policy.
    #[instrument(skip(self, request), fields(container = %request.container), level = "debug")]
    pub fn publish(&mut self, request: &PublishRequest) -> Result<PublishReport> {
        info!("generate docs for {:?}", request.container);
        let description = self.resolve_description(&request.container)?;
        let build = Build {
            name: request.container.clone(),
            version: request.version().into(),
            size: request.size.clone(),
            description,
        };

        self.prepare_branch(&request.branch)?;

        let mut article = store::load(&self.layout.library, &build.name)?;
        article.merge(&build, Utc::now());

        let path = self.write_and_commit(&article, &build, &request.identity)?;
        let attempts = self.push_with_retry(&article, &build, &request.identity)?;
        info!(
            "published {:?} at version {:?} after {attempts} push attempt(s)",
            build.name, build.version
        );

        Ok(PublishReport {
            path,
            article,
            attempts,
        })
    }

    /// Resolve description of container from its primary spec.
    ///
    /// Only Spack builds have a primary spec. Every other build kind has an
    /// empty description.
    ///
    /// # Errors
    ///
    /// - Return [`PublishError::Build`] if classification, environment
    ///   resolution, package lookup, or parsing fails.
    #[instrument(skip(self), level = "debug")]
    pub fn resolve_description(&self, container: &str) -> Result<String> {
        let (kind, path) = self.classifier.classify(&self.layout.containers, container)?;
        if kind != BuildKind::Spack {
            debug!("{kind} build has no primary spec");
            return Ok(String::new());
        }

        let env = SpackEnv::resolve(&self.layout.default_env, &path)?;
        let spec = env.primary_spec()?;
        let package = find_package_path(spec, &self.layout.packages)?;
        let parsed = self.parser.parse(&package)?;
        debug!("description of {container:?} from {:?}", package.display());

        Ok(parsed.description)
    }

    fn prepare_branch(&mut self, branch: &str) -> Result<()> {
        match self.vcs.pull_branch(branch) {
            Ok(()) => {}
            Err(VcsError::BranchExists { .. }) => debug!("branch {branch:?} already local"),
            Err(err) => return Err(err.into()),
        }

        self.vcs.switch_branch(branch)?;
        Ok(())
    }

    fn write_and_commit(
        &mut self,
        article: &Article,
        build: &Build,
        identity: &GitIdentity,
    ) -> Result<PathBuf> {
        let document = store::render(article, &self.layout.template)?;
        let path = store::write_article(&self.layout.library, article, &document)?;

        let message = format!(
            "Update {} to {} at {}",
            build.name,
            build.version,
            Utc::now().to_rfc3339()
        );
        self.vcs.commit(&message, identity)?;

        Ok(path)
    }

    fn reconcile(&mut self) -> Result<()> {
        match self.vcs.pull() {
            Ok(()) => debug!("pulled remote through fast-forward"),
            Err(err) if err.is_divergence() => {
                warn!("cannot fast-forward onto remote, resetting: {err}");
                self.vcs.reset()?;
            }
            Err(err) => return Err(err.into()),
        }

        Ok(())
    }

    fn push_with_retry(
        &mut self,
        article: &Article,
        build: &Build,
        identity: &GitIdentity,
    ) -> Result<u32> {
        let started = Instant::now();
        let policy = self.retry.clone();
        let max_attempts = policy.max_attempts.max(1);
        let mut backoff = policy.backoff();
        let mut attempt = 1;

        loop {
            let err = match self.vcs.push(identity) {
                Ok(()) => return Ok(attempt),
                Err(err) => err,
            };

            if !err.is_divergence() {
                return Err(err.into());
            }

            if attempt >= max_attempts {
                return Err(PublishError::DivergenceRetriesExhausted {
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = backoff.next_delay();
            if let Some(deadline) = policy.deadline {
                let elapsed = started.elapsed();
                if elapsed + delay > deadline {
                    return Err(PublishError::DeadlineExceeded {
                        elapsed,
                        attempts: attempt,
                    });
                }
            }

            warn!(
                "push rejected (attempt {attempt}/{max_attempts}), retrying in {}ms: {err}",
                delay.as_millis()
            );
            sleep(delay);

            self.reconcile()?;
            self.write_and_commit(article, build, identity)?;
            attempt += 1;
        }
    }
}

/// Publish error types.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Container build cannot be inspected.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Article cannot be loaded, rendered, or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Version control operation fails.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// Remote kept diverging for every allowed push attempt.
    #[error("remote kept diverging after {attempts} push attempt(s)")]
    DivergenceRetriesExhausted {
        attempts: u32,
        #[source]
        source: VcsError,
    },

    /// Retrying would run past the deadline.
    #[error("push retry deadline exceeded after {elapsed:?} and {attempts} attempt(s)")]
    DeadlineExceeded { elapsed: Duration, attempts: u32 },
}

/// Friendly result alias :3
pub type Result<T, E = PublishError> = std::result::Result<T, E>;
