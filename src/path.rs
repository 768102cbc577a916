// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the various trees and files that publishing interacts with
//! live inside the registry repository. Does not check if any of the paths
//! actually exist.

use crate::config::Config;

use std::path::{Path, PathBuf};

/// Absolute layout of registry repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    /// Root of repository working tree.
    pub root: PathBuf,

    /// Spack packages tree.
    pub packages: PathBuf,

    /// Containers tree.
    pub containers: PathBuf,

    /// Default Spack environment file.
    pub default_env: PathBuf,

    /// Library of articles.
    pub library: PathBuf,

    /// Article body template.
    pub template: PathBuf,
}

impl RepoLayout {
    /// Resolve layout with every configured path relative to repository root.
    ///
    /// Absolute paths in configuration are kept as is.
    pub fn new(config: &Config) -> Self {
        let root = PathBuf::from(&config.repo.path);

        Self {
            packages: root.join(&config.packages.path),
            containers: root.join(&config.containers.path),
            default_env: root.join(&config.containers.default_env_path),
            library: root.join(&config.library.path),
            template: root.join(&config.template.path),
            root,
        }
    }

    /// Root of repository working tree.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }
}
