// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Article store management.
//!
//! All articles live in one place called the __library__. The library is a
//! plain directory in the documentation branch of the repository, where each
//! article is a markdown document named after its container, e.g.,
//! `_library/OpenMPI.md` is the article of the "OpenMPI" container.
//!
//! # Document Layout
//!
//! Every article document is composed of two parts: front matter and body.
//! The front matter is a YAML block fenced by two `---` marker lines at the
//! very top of the document. The body is everything after the second marker,
//! and is rendered from a template using the front matter as its context.
//!
//! ```text
//! ---
//! layout: container
//! name: OpenMPI
//! ...
//! ---
//! <rendered body>
//! ```
//!
//! Documents are always rewritten in full. The body of an existing document is
//! never read back, only its front matter.

use crate::article::{to_hyphen_case, Article, FrontMatter};

use ignore::WalkBuilder;
use minijinja::{Environment, UndefinedBehavior};
use std::{
    fs::{create_dir_all, read_to_string, remove_file, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Marker line that fences front matter.
pub const MARKER: &str = "---";

/// Load article of target container from library.
///
/// Recursively searches library for a markdown document whose file stem
/// matches the container name. If no such document exists, or the library
/// does not exist yet, then an empty article is returned to signal the first
/// publish of the container.
///
/// # Errors
///
/// - Return [`StoreError::Walk`] if library cannot be traversed.
/// - Return [`StoreError::ReadArticle`] if article cannot be read.
/// - Return [`StoreError::MalformedFrontMatter`] if markers are missing.
/// - Return [`StoreError::Yaml`] if front matter cannot be deserialized.
#[instrument(skip(library), level = "debug")]
pub fn load(library: impl AsRef<Path>, container: &str) -> Result<Article> {
    let Some(path) = find_article(library.as_ref(), container)? else {
        info!("no article for {container:?} yet, starting fresh");
        return Ok(Article::default());
    };

    debug!("load article at {:?}", path.display());
    let content = read_to_string(&path).map_err(|err| StoreError::ReadArticle {
        source: err,
        path: path.clone(),
    })?;

    parse(&content).map_err(|err| match err {
        StoreError::MalformedFrontMatter { .. } => StoreError::MalformedFrontMatter { path },
        other => other,
    })
}

/// Parse article from its document content.
///
/// # Errors
///
/// - Return [`StoreError::MalformedFrontMatter`] if markers are missing.
/// - Return [`StoreError::Yaml`] if front matter cannot be deserialized.
pub fn parse(content: &str) -> Result<Article> {
    let yaml = split_front_matter(content).ok_or_else(|| StoreError::MalformedFrontMatter {
        path: PathBuf::new(),
    })?;

    // INVARIANT: Empty front matter block is an empty article, not an error.
    if yaml.trim().is_empty() {
        return Ok(Article::default());
    }

    let front: FrontMatter = serde_yaml::from_str(yaml)?;
    Ok(Article::from(front))
}

/// Render article into a complete document.
///
/// Front matter is serialized as YAML, and the body is rendered from the
/// template at target path with the front matter fields as its context. Any
/// lookup of a field that does not exist fails the render.
///
/// # Errors
///
/// - Return [`StoreError::ReadTemplate`] if template cannot be read.
/// - Return [`StoreError::Yaml`] if front matter cannot be serialized.
/// - Return [`StoreError::Template`] if body cannot be rendered.
#[instrument(skip(article, template), level = "debug")]
pub fn render(article: &Article, template: impl AsRef<Path>) -> Result<String> {
    let source = read_to_string(template.as_ref()).map_err(|err| StoreError::ReadTemplate {
        source: err,
        path: template.as_ref().to_path_buf(),
    })?;

    render_with(article, &source)
}

/// Render article into complete document with template source.
///
/// # Errors
///
/// - Return [`StoreError::Yaml`] if front matter cannot be serialized.
/// - Return [`StoreError::Template`] if body cannot be rendered.
pub fn render_with(article: &Article, source: &str) -> Result<String> {
    let front = article.to_front_matter();
    let yaml = serde_yaml::to_string(&front)?;

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.add_filter("to_hyphen", |value: String| to_hyphen_case(&value));
    let body = env.render_str(source, &front)?;

    let mut document = String::with_capacity(yaml.len() + body.len() + 8);
    document.push_str(MARKER);
    document.push('\n');
    document.push_str(&yaml);
    if !yaml.ends_with('\n') {
        document.push('\n');
    }
    document.push_str(MARKER);
    document.push('\n');
    document.push_str(&body);

    Ok(document)
}

/// Write rendered document of article into library.
///
/// Document is written to `<library>/<name>.md`, fully replacing any existing
/// document. Content goes to a temporary sibling first, and is then renamed
/// into place so the article is never observed half written.
///
/// # Errors
///
/// - Return [`StoreError::WriteArticle`] if document cannot be written.
#[instrument(skip(library, article, document), level = "debug")]
pub fn write_article(
    library: impl AsRef<Path>,
    article: &Article,
    document: &str,
) -> Result<PathBuf> {
    let library = library.as_ref();
    let path = library.join(format!("{}.md", article.name()));
    let staging = library.join(format!(".{}.md.tmp", article.name()));
    let wrap = |err| StoreError::WriteArticle {
        source: err,
        path: path.clone(),
    };

    create_dir_all(library).map_err(wrap)?;
    if let Err(err) = write(&staging, document.as_bytes()).and_then(|()| rename(&staging, &path)) {
        // INVARIANT: Never leave staging file behind to be committed.
        match remove_file(&staging) {
            Err(cleanup) if cleanup.kind() != ErrorKind::NotFound => {
                warn!("failed to remove {:?}: {cleanup}", staging.display());
            }
            _ => {}
        }
        return Err(wrap(err));
    }
    info!("wrote article {:?}", path.display());

    Ok(path)
}

fn find_article(library: &Path, container: &str) -> Result<Option<PathBuf>> {
    if !library.exists() {
        return Ok(None);
    }

    let walker = WalkBuilder::new(library)
        .standard_filters(false)
        .hidden(true)
        .build();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound) => continue,
            Err(err) => return Err(StoreError::Walk(err)),
        };

        let path = entry.path();
        let is_file = entry.file_type().is_some_and(|kind| kind.is_file());
        let is_markdown = path.extension().is_some_and(|ext| ext == "md");
        let is_match = path.file_stem().is_some_and(|stem| stem == container);
        if is_file && is_markdown && is_match {
            return Ok(Some(path.to_path_buf()));
        }
    }

    Ok(None)
}

fn split_front_matter(content: &str) -> Option<&str> {
    let rest = content
        .strip_prefix(MARKER)
        .and_then(|rest| rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')))?;

    // INVARIANT: Closing marker must sit on a line of its own.
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == MARKER {
            return Some(&rest[..offset]);
        }
        offset += line.len();
    }

    None
}

/// Article store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Library cannot be traversed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// Article document cannot be read.
    #[error("failed to read article at {:?}", path.display())]
    ReadArticle {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Article document cannot be written.
    #[error("failed to write article at {:?}", path.display())]
    WriteArticle {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Template cannot be read.
    #[error("failed to read template at {:?}", path.display())]
    ReadTemplate {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Front matter is not fenced by two marker lines.
    #[error("article at {:?} lacks front matter fenced by two \"---\" lines", path.display())]
    MalformedFrontMatter { path: PathBuf },

    /// Front matter cannot be serialized or deserialized.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Body cannot be rendered from template.
    #[error(transparent)]
    Template(#[from] minijinja::Error),
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Build;
    use chrono::{TimeZone, Utc};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    const TEMPLATE: &str = indoc! {r#"
        # {{ name }}

        {{ description }}

        docker pull ghcr.io/autamus/{{ name | to_hyphen }}:{{ versions | last }}
    "#};

    fn openmpi() -> Article {
        let mut article = Article::new();
        article.merge(
            &Build {
                name: "OpenMPI".into(),
                version: "4.1.0".into(),
                size: "120 MB".into(),
                description: "MPI implementation".into(),
            },
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
        );
        article.add_version("4.1.1");
        article
    }

    #[test]
    fn render_document_layout() -> anyhow::Result<()> {
        let result = render_with(&openmpi(), TEMPLATE)?;
        let (front, body) = result
            .strip_prefix("---\n")
            .and_then(|rest| rest.split_once("\n---\n"))
            .expect("fenced front matter");

        assert!(front.starts_with("layout: container\nname: OpenMPI\n"));
        assert!(front.contains("- 4.1.0\n- 4.1.1"));
        assert!(front.contains("description: MPI implementation"));
        assert_eq!(
            body,
            indoc! {r#"
                # OpenMPI

                MPI implementation

                docker pull ghcr.io/autamus/open-mpi:4.1.1
            "#}
        );

        Ok(())
    }

    #[test]
    fn render_rejects_unknown_field() {
        let result = render_with(&openmpi(), "{{ maintainer }}");
        assert!(matches!(result, Err(StoreError::Template(_))));
    }

    #[test]
    fn parse_round_trip() -> anyhow::Result<()> {
        let article = openmpi();
        let document = render_with(&article, "body with a --- rule\n---\n")?;
        let result = parse(&document)?;
        assert_eq!(result, article);

        Ok(())
    }

    #[test]
    fn parse_rejects_missing_markers() {
        let result = parse("name: OpenMPI\n");
        assert!(matches!(result, Err(StoreError::MalformedFrontMatter { .. })));

        let result = parse("---\nname: OpenMPI\n");
        assert!(matches!(result, Err(StoreError::MalformedFrontMatter { .. })));
    }

    #[test]
    fn parse_rejects_bad_yaml() {
        let result = parse("---\nversions: [1.0\n---\n");
        assert!(matches!(result, Err(StoreError::Yaml(_))));
    }

    #[sealed_test]
    fn load_missing_library_is_empty_article() -> anyhow::Result<()> {
        let result = load("_library", "OpenMPI")?;
        assert_eq!(result, Article::default());

        Ok(())
    }

    #[sealed_test]
    fn load_searches_library_recursively() -> anyhow::Result<()> {
        let article = openmpi();
        let document = render_with(&article, TEMPLATE)?;
        create_dir_all("_library/o")?;
        std::fs::write("_library/o/OpenMPI.md", &document)?;
        std::fs::write("_library/o/OpenMPI.txt", "not an article")?;

        let result = load("_library", "OpenMPI")?;
        assert_eq!(result, article);

        let result = load("_library", "gcc")?;
        assert_eq!(result, Article::default());

        Ok(())
    }

    #[sealed_test]
    fn write_then_load_round_trip() -> anyhow::Result<()> {
        let article = openmpi();
        std::fs::write("default.md", TEMPLATE)?;

        let document = render(&article, "default.md")?;
        let path = write_article("_library", &article, &document)?;
        assert_eq!(path, Path::new("_library").join("OpenMPI.md"));

        // Full overwrite, no append.
        let path = write_article("_library", &article, &document)?;
        assert_eq!(std::fs::read_to_string(path)?, document);

        let result = load("_library", "OpenMPI")?;
        assert_eq!(result.name(), article.name());
        assert_eq!(result.versions(), article.versions());
        assert_eq!(result.size(), article.size());
        assert_eq!(result.description(), article.description());
        assert_eq!(result.updated_at(), article.updated_at());

        Ok(())
    }

    #[sealed_test]
    fn failed_write_leaves_no_staging_file() -> anyhow::Result<()> {
        let article = openmpi();
        create_dir_all("_library/OpenMPI.md/occupied")?;

        let result = write_article("_library", &article, "---\n---\n");
        assert!(matches!(result, Err(StoreError::WriteArticle { .. })));
        assert!(!Path::new("_library/.OpenMPI.md.tmp").exists());

        Ok(())
    }

    #[sealed_test]
    fn load_reports_malformed_path() -> anyhow::Result<()> {
        create_dir_all("_library")?;
        std::fs::write("_library/gcc.md", "no front matter here")?;

        let result = load("_library", "gcc");
        assert!(matches!(
            result,
            Err(StoreError::MalformedFrontMatter { path }) if path.ends_with("gcc.md")
        ));

        Ok(())
    }
}
