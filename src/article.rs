// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Article metadata model.
//!
//! An __article__ is the documentation page of a single container in the
//! library. Every article carries a block of metadata, the __front matter__,
//! that the documentation site uses to list versions, sizes, and links for
//! the container. This module only deals with that metadata in memory. Reading
//! and writing articles is handled by [`store`](crate::store).
//!
//! # Merge Semantics
//!
//! Each publish merges exactly one build into the existing article:
//!
//! - The version list behaves like an insertion ordered set.
//! - The description is sticky. Once set, no later build may replace it.
//! - The size and timestamp always take the value of the latest build.
//! - The links are derived from the name, and never stored independently.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Layout tag that the documentation site renders container pages with.
pub const CONTAINER_LAYOUT: &str = "container";

const SOURCE_BASE: &str = "https://github.com/autamus/registry/blob/main/containers";
const REGISTRY_BASE: &str = "https://github.com/orgs/autamus/packages/container/package";

static FIRST_CAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(.)([A-Z][a-z]+)").expect("valid regex"));
static ALL_CAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("([a-z0-9])([A-Z])").expect("valid regex"));

/// Convert container name into hyphen case.
///
/// Inserts a hyphen before each capitalized word that follows another
/// character, and before any capital letter that follows a lowercase letter
/// or digit. The result is lowercased, e.g., "OpenMPI" becomes "open-mpi".
pub fn to_hyphen_case(name: &str) -> String {
    let hyphened = FIRST_CAP.replace_all(name, "${1}-${2}");
    let hyphened = ALL_CAP.replace_all(&hyphened, "${1}-${2}");
    hyphened.to_lowercase()
}

/// Metadata of a single container article.
///
/// # Invariants
///
/// - No duplicate entries in version listing.
/// - Description never changes once set to non-empty value.
/// - Source and registry links always agree with name.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Article {
    layout: String,
    name: String,
    source_link: String,
    registry_link: String,
    versions: Vec<String>,
    updated_at: Option<DateTime<Utc>>,
    size: String,
    description: Option<String>,
}

impl Article {
    /// Construct empty article.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set name of article along with its layout and derived links.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.layout = CONTAINER_LAYOUT.into();

        let hyphened = to_hyphen_case(&self.name);
        let initial = hyphened.chars().next().map(String::from).unwrap_or_default();
        self.source_link = format!("{SOURCE_BASE}/{initial}/{hyphened}/spack.yaml");
        self.registry_link = format!("{REGISTRY_BASE}/{hyphened}");
    }

    /// Append version unless it is already listed.
    pub fn add_version(&mut self, version: impl Into<String>) {
        let version = version.into();
        if !self.versions.iter().any(|known| *known == version) {
            self.versions.push(version);
        }
    }

    /// Set description only if article has none yet.
    ///
    /// Empty descriptions are ignored, so they never count as being set.
    pub fn set_description_if_empty(&mut self, description: impl Into<String>) {
        if self.description.is_some() {
            return;
        }

        let description = description.into();
        if !description.is_empty() {
            self.description = Some(description);
        }
    }

    /// Set size of latest container build.
    pub fn set_size(&mut self, size: impl Into<String>) {
        self.size = size.into();
    }

    /// Set timestamp of latest publish.
    pub fn set_updated_at(&mut self, updated_at: DateTime<Utc>) {
        self.updated_at = Some(updated_at);
    }

    /// Merge one container build into article.
    pub fn merge(&mut self, build: &Build, updated_at: DateTime<Utc>) {
        self.set_name(build.name.as_str());
        self.add_version(build.version.as_str());
        self.set_description_if_empty(build.description.as_str());
        self.set_size(build.size.as_str());
        self.set_updated_at(updated_at);
    }

    pub fn layout(&self) -> &str {
        &self.layout
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_link(&self) -> &str {
        &self.source_link
    }

    pub fn registry_link(&self) -> &str {
        &self.registry_link
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn size(&self) -> &str {
        &self.size
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Produce front matter layout for serialization.
    pub fn to_front_matter(&self) -> FrontMatter {
        FrontMatter {
            layout: self.layout.clone(),
            name: self.name.clone(),
            github: self.source_link.clone(),
            versions: self.versions.clone(),
            updated_at: self.updated_at,
            size: self.size.clone(),
            description: self.description.clone().unwrap_or_default(),
            container_url: self.registry_link.clone(),
        }
    }
}

impl From<FrontMatter> for Article {
    fn from(front: FrontMatter) -> Self {
        let mut article = Article {
            layout: front.layout,
            versions: Vec::new(),
            updated_at: front.updated_at,
            size: front.size,
            ..Default::default()
        };

        // INVARIANT: Links are recomputed from name, never trusted from disk.
        if !front.name.is_empty() {
            article.set_name(front.name);
        }

        for version in front.versions {
            article.add_version(version);
        }
        article.set_description_if_empty(front.description);

        article
    }
}

/// Front matter layout of an article document.
///
/// Field names follow what the documentation site templates expect.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FrontMatter {
    pub layout: String,
    pub name: String,
    pub github: String,
    pub versions: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub size: String,
    pub description: String,
    pub container_url: String,
}

/// Metadata of a single container build to merge into an article.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct Build {
    pub name: String,
    pub version: String,
    pub size: String,
    pub description: String,
}
