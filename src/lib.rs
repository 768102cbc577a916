// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Container documentation publisher.
//!
//! Librarian keeps a __library__ of articles, one per container, on the
//! documentation branch of a container registry repository. Every CI job that
//! builds a container merges the new build into the article of that container,
//! and pushes the result.
//!
//! # Concurrent Publishers
//!
//! Many containers get built at once, so many publishers push onto the same
//! branch at once. Publishing therefore has two halves:
//!
//! 1. An idempotent merge of the build into the article. Merging the same
//!    build twice leaves the article as it was, so a publish can always be
//!    redone from scratch.
//! 2. An optimistic push loop. Rejected pushes are followed by pulling the
//!    remote, reapplying the article on top of it, and pushing again.
//!
//! See [`publish::Publisher`] for the coordinator tying both halves together.

pub mod article;
pub mod build;
pub mod config;
pub mod path;
pub mod publish;
pub mod store;
pub mod vcs;

pub use article::{Article, Build};
pub use config::Config;
pub use publish::{PublishError, PublishReport, PublishRequest, Publisher};
