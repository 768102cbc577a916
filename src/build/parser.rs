// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package recipe parsing.
//!
//! Descriptions of containers come from the package recipe of their primary
//! spec. Two recipe formats are understood:
//!
//! - Spack `package.py` recipes, where the description is the docstring of the
//!   package class.
//! - Singularity HPC `container.yaml` recipes, where the description is a plain
//!   `description` key.
//!
//! Parsers are enabled by name through configuration, and dispatched by the
//! file name of the recipe.

use crate::build::{BuildError, Result, SPACK_PACKAGE_FILE};

use serde::Deserialize;
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Recipe file of Singularity HPC containers.
pub const SHPC_RECIPE_FILE: &str = "container.yaml";

/// Information extracted from a package recipe.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct ParsedSpec {
    pub description: String,
}

/// Parse package recipes.
pub trait SpecParser {
    /// Parse recipe at target path.
    fn parse(&self, path: &Path) -> Result<ParsedSpec>;
}

/// Parse description out of Spack `package.py` recipes.
#[derive(Debug, Default, Clone)]
pub struct SpackPackageParser;

impl SpackPackageParser {
    /// Extract docstring of package class from recipe source.
    ///
    /// Whitespace inside the docstring is collapsed into single spaces.
    pub fn description(source: &str) -> String {
        let Some(class_at) = source
            .match_indices("class ")
            .map(|(at, _)| at)
            .find(|at| *at == 0 || source[..*at].ends_with('\n'))
        else {
            return String::new();
        };

        let body = &source[class_at..];
        let Some(start) = body.find(['"', '\'']).filter(|at| {
            body[*at..].starts_with("\"\"\"") || body[*at..].starts_with("'''")
        }) else {
            return String::new();
        };

        let quote = &body[start..start + 3];
        let rest = &body[start + 3..];
        let Some(end) = rest.find(quote) else {
            return String::new();
        };

        rest[..end].split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl SpecParser for SpackPackageParser {
    fn parse(&self, path: &Path) -> Result<ParsedSpec> {
        let source = read_recipe(path)?;
        Ok(ParsedSpec {
            description: Self::description(&source),
        })
    }
}

/// Parse description out of Singularity HPC `container.yaml` recipes.
#[derive(Debug, Default, Clone)]
pub struct ShpcParser;

#[derive(Default, Deserialize)]
#[serde(default)]
struct ShpcRecipe {
    description: String,
}

impl SpecParser for ShpcParser {
    fn parse(&self, path: &Path) -> Result<ParsedSpec> {
        let source = read_recipe(path)?;
        let recipe: ShpcRecipe = serde_yaml::from_str(&source)?;
        Ok(ParsedSpec {
            description: recipe.description.trim().to_string(),
        })
    }
}

/// Set of enabled recipe parsers.
#[derive(Debug, Default, Clone)]
pub struct ParserSet {
    spack: Option<SpackPackageParser>,
    shpc: Option<ShpcParser>,
}

impl ParserSet {
    /// Enable parsers from a comma separated listing of names.
    ///
    /// Unknown names are skipped with a warning.
    pub fn from_names(names: &str) -> Self {
        let mut set = Self::default();
        for name in names.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            match name {
                "spack" => set.spack = Some(SpackPackageParser),
                "shpc" => set.shpc = Some(ShpcParser),
                unknown => warn!("skip unknown parser {unknown:?}"),
            }
        }

        set
    }

    /// List names of enabled parsers.
    pub fn enabled(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.spack.is_some() {
            names.push("spack");
        }
        if self.shpc.is_some() {
            names.push("shpc");
        }

        names
    }
}

impl SpecParser for ParserSet {
    #[instrument(skip(self), level = "debug")]
    fn parse(&self, path: &Path) -> Result<ParsedSpec> {
        let file_name = path.file_name().and_then(|name| name.to_str());
        match (file_name, &self.spack, &self.shpc) {
            (Some(SPACK_PACKAGE_FILE), Some(parser), _) => {
                debug!("parse {:?} as spack package", path.display());
                parser.parse(path)
            }
            (Some(SHPC_RECIPE_FILE), _, Some(parser)) => {
                debug!("parse {:?} as shpc recipe", path.display());
                parser.parse(path)
            }
            _ => Err(BuildError::NoParser {
                path: path.to_path_buf(),
            }),
        }
    }
}

fn read_recipe(path: &Path) -> Result<String> {
    read_to_string(path).map_err(|err| BuildError::ReadRecipe {
        source: err,
        path: PathBuf::from(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::write;

    const OPENMPI: &str = indoc! {r#"
        from spack import *


        class Openmpi(AutotoolsPackage):
            """An open source Message Passing Interface implementation.

            The Open MPI Project is developed and maintained by a consortium."""

            homepage = "https://www.open-mpi.org"
            version("4.1.0", sha256="...")
    "#};

    #[test]
    fn spack_docstring_description() {
        let result = SpackPackageParser::description(OPENMPI);
        let expect = "An open source Message Passing Interface implementation. \
            The Open MPI Project is developed and maintained by a consortium.";
        assert_eq!(result, expect);
    }

    #[test]
    fn spack_recipe_without_docstring() {
        let source = "class Zlib(Package):\n    homepage = \"https://zlib.net\"\n";
        assert_eq!(SpackPackageParser::description(source), "");
        assert_eq!(SpackPackageParser::description("import os\n"), "");
    }

    #[test]
    fn parser_set_from_names() {
        assert_eq!(ParserSet::from_names("spack,shpc").enabled(), ["spack", "shpc"]);
        assert_eq!(ParserSet::from_names(" shpc , bogus,").enabled(), ["shpc"]);
        assert!(ParserSet::from_names("").enabled().is_empty());
    }

    #[sealed_test]
    fn parser_set_dispatch_by_file_name() -> anyhow::Result<()> {
        write("package.py", OPENMPI)?;
        write("container.yaml", "docker: openmpi\ndescription: |\n  Open MPI.\n")?;

        let parsers = ParserSet::from_names("spack,shpc");
        let result = parsers.parse(Path::new("package.py"))?;
        assert!(result.description.starts_with("An open source"));

        let result = parsers.parse(Path::new("container.yaml"))?;
        assert_eq!(result.description, "Open MPI.");

        let parsers = ParserSet::from_names("shpc");
        let result = parsers.parse(Path::new("package.py"));
        assert!(matches!(result, Err(BuildError::NoParser { .. })));

        Ok(())
    }
}
