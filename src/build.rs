// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Container build discovery.
//!
//! Containers live in a __containers__ tree of the registry repository, one
//! directory per container. The contents of that directory determine how the
//! container is built:
//!
//! - A `spack.yaml` file means a Spack environment. The first spec of the
//!   environment is the __primary spec__, whose package recipe provides the
//!   description of the container.
//! - A `Dockerfile` means a plain Docker build with no description source.
//!
//! # Spack Environments
//!
//! Registry repositories carry a default Spack environment that every
//! container environment builds upon. Container environments only need to
//! list specs when they differ from the default.

pub mod parser;

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Environment file marking Spack builds.
pub const SPACK_ENV_FILE: &str = "spack.yaml";

/// Build file marking Docker builds.
pub const DOCKERFILE: &str = "Dockerfile";

/// Recipe file of Spack packages.
pub const SPACK_PACKAGE_FILE: &str = "package.py";

/// Kind of build system a container uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
    Spack,
    Docker,
}

impl Display for BuildKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Spack => fmt.write_str("spack"),
            Self::Docker => fmt.write_str("docker"),
        }
    }
}

/// Classify the build system of containers.
pub trait BuildClassifier {
    /// Determine build kind of container, and path to its definition.
    fn classify(&self, containers: &Path, name: &str) -> Result<(BuildKind, PathBuf)>;
}

/// Classify containers by their layout on the file system.
#[derive(Debug, Default, Clone)]
pub struct FsClassifier;

impl FsClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl BuildClassifier for FsClassifier {
    #[instrument(skip(self, containers), level = "debug")]
    fn classify(&self, containers: &Path, name: &str) -> Result<(BuildKind, PathBuf)> {
        let walker = WalkBuilder::new(containers)
            .standard_filters(false)
            .hidden(true)
            .build();

        for entry in walker {
            let entry = entry?;
            let is_dir = entry.file_type().is_some_and(|kind| kind.is_dir());
            if !is_dir || entry.file_name() != name {
                continue;
            }

            let dir = entry.path();
            if dir.join(SPACK_ENV_FILE).is_file() {
                debug!("{name:?} is a spack build at {:?}", dir.display());
                return Ok((BuildKind::Spack, dir.to_path_buf()));
            }

            if dir.join(DOCKERFILE).is_file() {
                debug!("{name:?} is a docker build at {:?}", dir.display());
                return Ok((BuildKind::Docker, dir.to_path_buf()));
            }

            return Err(BuildError::UnknownBuild {
                path: dir.to_path_buf(),
            });
        }

        Err(BuildError::ContainerNotFound {
            name: name.into(),
            containers: containers.to_path_buf(),
        })
    }
}

/// Spack environment layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpackEnv {
    pub spack: SpackSection,
}

/// Body of a Spack environment.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpackSection {
    pub specs: Vec<String>,
}

impl SpackEnv {
    /// Resolve environment of container on top of default environment.
    ///
    /// Specs listed by the container take precedence. The default environment
    /// only fills in when the container lists none. A missing default
    /// environment file counts as an empty one.
    ///
    /// # Errors
    ///
    /// - Return [`BuildError::ReadEnv`] if an environment cannot be read.
    /// - Return [`BuildError::Yaml`] if an environment cannot be parsed.
    #[instrument(skip(default_env, container_dir), level = "debug")]
    pub fn resolve(default_env: impl AsRef<Path>, container_dir: impl AsRef<Path>) -> Result<Self> {
        let mut env = Self::read(container_dir.as_ref().join(SPACK_ENV_FILE))?;
        if env.spack.specs.is_empty() {
            let default = match Self::read(default_env.as_ref()) {
                Ok(default) => default,
                Err(BuildError::ReadEnv { source, .. }) if source.kind() == ErrorKind::NotFound => {
                    Self::default()
                }
                Err(err) => return Err(err),
            };
            env.spack.specs = default.spack.specs;
        }

        Ok(env)
    }

    /// First spec listed by environment.
    ///
    /// # Errors
    ///
    /// - Return [`BuildError::NoSpecs`] if environment lists no specs.
    pub fn primary_spec(&self) -> Result<&str> {
        self.spack
            .specs
            .first()
            .map(String::as_str)
            .ok_or(BuildError::NoSpecs)
    }

    fn read(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_to_string(path.as_ref()).map_err(|err| BuildError::ReadEnv {
            source: err,
            path: path.as_ref().to_path_buf(),
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Extract package name out of a Spack spec.
///
/// Strips versions, variants, compilers, and dependencies, e.g.,
/// "openmpi@4.1.0 +cuda %gcc" becomes "openmpi".
pub fn spec_package_name(spec: &str) -> &str {
    let spec = spec.trim();
    let end = spec
        .find(|c: char| matches!(c, '@' | '+' | '~' | '%' | '^') || c.is_whitespace())
        .unwrap_or(spec.len());
    &spec[..end]
}

/// Locate package recipe of spec in packages tree.
///
/// # Errors
///
/// - Return [`BuildError::PackageNotFound`] if recipe does not exist.
pub fn find_package_path(spec: &str, packages: impl AsRef<Path>) -> Result<PathBuf> {
    let name = spec_package_name(spec);
    let path = packages.as_ref().join(name).join(SPACK_PACKAGE_FILE);
    if name.is_empty() || !path.is_file() {
        return Err(BuildError::PackageNotFound {
            spec: spec.into(),
            path,
        });
    }

    Ok(path)
}

/// Build discovery error types.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Containers tree cannot be traversed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// No container directory matches name.
    #[error("container {name:?} not found in {:?}", containers.display())]
    ContainerNotFound { name: String, containers: PathBuf },

    /// Container directory has no recognized build file.
    #[error("no spack.yaml or Dockerfile in {:?}", path.display())]
    UnknownBuild { path: PathBuf },

    /// Spack environment cannot be read.
    #[error("failed to read spack environment at {:?}", path.display())]
    ReadEnv {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Spack environment lists no specs.
    #[error("spack environment lists no specs")]
    NoSpecs,

    /// Package recipe of spec does not exist.
    #[error("no package recipe for spec {spec:?} at {:?}", path.display())]
    PackageNotFound { spec: String, path: PathBuf },

    /// Recipe file cannot be read.
    #[error("failed to read recipe at {:?}", path.display())]
    ReadRecipe {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// No enabled parser understands recipe file.
    #[error("no enabled parser for {:?}", path.display())]
    NoParser { path: PathBuf },

    /// YAML content cannot be parsed.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Friendly result alias :3
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
