// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Librarian mostly runs inside CI jobs, so configuration is primarily driven
//! by environment variables. Configuration is assembled in layers, where each
//! layer overrides the previous one:
//!
//! 1. Built-in defaults.
//! 2. Optional TOML configuration file.
//! 3. Environment variables.
//!
//! # Environment Variables
//!
//! Each field is recognized under two names: `LIB_<SECTION>_<FIELD>` and
//! `INPUT_<SECTION>_<FIELD>`, e.g., `LIB_GIT_TOKEN` and `INPUT_GIT_TOKEN`.
//! The `INPUT_` form is what CI actions hand their inputs over as, so it wins
//! when both are set. The full mapping lives in [`ENV_FIELDS`].

use crate::vcs::GitIdentity;

use serde::{Deserialize, Serialize};
use std::{
    env::VarError,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    str::FromStr,
    time::Duration,
};
use tracing::debug;

/// Prefixes of environment variables in ascending precedence.
pub const ENV_PREFIXES: [&str; 2] = ["LIB", "INPUT"];

/// Assign value of an environment variable to a configuration field.
pub type Setter = fn(&mut Config, String) -> Result<()>;

/// Static mapping of `(section, field)` environment names to setters.
pub const ENV_FIELDS: &[(&str, &str, Setter)] = &[
    ("GIT", "NAME", |c, v| set(&mut c.git.name, v)),
    ("GIT", "USERNAME", |c, v| set(&mut c.git.username, v)),
    ("GIT", "EMAIL", |c, v| set(&mut c.git.email, v)),
    ("GIT", "TOKEN", |c, v| set(&mut c.git.token, v)),
    ("REPO", "PATH", |c, v| set(&mut c.repo.path, v)),
    ("REPO", "PAGESBRANCH", |c, v| set(&mut c.repo.pages_branch, v)),
    ("PARSERS", "LOADED", |c, v| set(&mut c.parsers.loaded, v)),
    ("PACKAGES", "PATH", |c, v| set(&mut c.packages.path, v)),
    ("CONTAINERS", "PATH", |c, v| set(&mut c.containers.path, v)),
    ("CONTAINERS", "CURRENT", |c, v| set(&mut c.containers.current, v)),
    ("CONTAINERS", "VERSION", |c, v| set(&mut c.containers.version, v)),
    ("CONTAINERS", "DEFAULTENVPATH", |c, v| {
        set(&mut c.containers.default_env_path, v)
    }),
    ("CONTAINERS", "SIZE", |c, v| set(&mut c.containers.size, v)),
    ("TEMPLATE", "PATH", |c, v| set(&mut c.template.path, v)),
    ("LIBRARY", "PATH", |c, v| set(&mut c.library.path, v)),
    ("RETRY", "MAXATTEMPTS", |c, v| {
        c.retry.max_attempts = parse_number("RETRY_MAXATTEMPTS", &v)?;
        Ok(())
    }),
    ("RETRY", "BACKOFFMS", |c, v| {
        c.retry.backoff_ms = parse_number("RETRY_BACKOFFMS", &v)?;
        Ok(())
    }),
    ("RETRY", "MAXBACKOFFMS", |c, v| {
        c.retry.max_backoff_ms = parse_number("RETRY_MAXBACKOFFMS", &v)?;
        Ok(())
    }),
    ("RETRY", "DEADLINESECS", |c, v| {
        c.retry.deadline_secs = Some(parse_number("RETRY_DEADLINESECS", &v)?);
        Ok(())
    }),
];

/// Librarian configuration.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub git: GitIdentity,
    pub repo: RepoSettings,
    pub parsers: ParserSettings,
    pub packages: PackageSettings,
    pub containers: ContainerSettings,
    pub template: TemplateSettings,
    pub library: LibrarySettings,
    pub retry: RetrySettings,
}

impl Config {
    /// Assemble configuration from defaults and process environment.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::InvalidNumber`] if numeric variable is invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name))?;
        Ok(config)
    }

    /// Override fields through lookup of environment variable names.
    ///
    /// Variables are consulted in the order of [`ENV_PREFIXES`] so later
    /// prefixes take precedence.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::InvalidNumber`] if numeric variable is invalid.
    /// - Return [`ConfigError::NotUnicode`] if variable is not valid unicode.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> std::result::Result<String, VarError>,
    {
        for (section, field, setter) in ENV_FIELDS {
            for prefix in ENV_PREFIXES {
                let name = format!("{prefix}_{section}_{field}");
                match lookup(&name) {
                    Ok(value) => {
                        debug!("configure {name}");
                        setter(self, value)?;
                    }
                    Err(VarError::NotPresent) => continue,
                    Err(VarError::NotUnicode(_)) => return Err(ConfigError::NotUnicode(name)),
                }
            }
        }

        Ok(())
    }

    /// Perform shell expansion on all path fields.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if expansion fails.
    pub fn expand_paths(&mut self) -> Result<()> {
        for path in [
            &mut self.repo.path,
            &mut self.packages.path,
            &mut self.containers.path,
            &mut self.containers.default_env_path,
            &mut self.template.path,
            &mut self.library.path,
        ] {
            *path = shellexpand::full(path.as_str())?.into_owned();
        }

        Ok(())
    }

    /// Check that configuration is complete enough to publish with.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Missing`] if container name is missing.
    /// - Return [`ConfigError::Missing`] if pages branch is empty.
    pub fn validate(&self) -> Result<()> {
        if self.containers.current.trim().is_empty() {
            return Err(ConfigError::Missing("LIB_CONTAINERS_CURRENT"));
        }

        if self.repo.pages_branch.trim().is_empty() {
            return Err(ConfigError::Missing("LIB_REPO_PAGESBRANCH"));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Location of the registry repository, and its documentation branch.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepoSettings {
    pub path: String,
    pub pages_branch: String,
}

impl Default for RepoSettings {
    fn default() -> Self {
        Self {
            path: ".".into(),
            pages_branch: "gh-pages".into(),
        }
    }
}

/// Comma separated listing of enabled recipe parsers.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ParserSettings {
    pub loaded: String,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            loaded: "spack,shpc".into(),
        }
    }
}

/// Packages tree relative to repository.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PackageSettings {
    pub path: String,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            path: "spack/".into(),
        }
    }
}

/// Containers tree, and the container build currently being published.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContainerSettings {
    pub path: String,
    pub current: String,
    pub version: String,
    pub default_env_path: String,
    pub size: String,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            path: "containers/".into(),
            current: String::new(),
            version: String::new(),
            default_env_path: "default.yaml".into(),
            size: String::new(),
        }
    }
}

/// Article body template relative to repository.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateSettings {
    pub path: String,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            path: "default.md".into(),
        }
    }
}

/// Library directory relative to repository.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LibrarySettings {
    pub path: String,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            path: "_library".into(),
        }
    }
}

/// Push retry behavior under contention.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub deadline_secs: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 500,
            max_backoff_ms: 8000,
            deadline_secs: None,
        }
    }
}

impl RetrySettings {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

fn set(field: &mut String, value: String) -> Result<()> {
    *field = value;
    Ok(())
}

fn parse_number<T: FromStr>(name: &'static str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            name,
            value: value.into(),
        })
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<VarError>),

    /// Required setting is missing.
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// Numeric setting cannot be parsed.
    #[error("setting {name} expects a number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    /// Environment variable is not valid unicode.
    #[error("environment variable {0} is not valid unicode")]
    NotUnicode(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
