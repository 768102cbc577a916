// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{identity, RemoteFixture};

use anyhow::Result;
use indoc::indoc;
use librarian::{
    build::{parser::ParserSet, FsClassifier},
    config::Config,
    path::RepoLayout,
    publish::{retry::RetryPolicy, PublishRequest, Publisher},
    store,
    vcs::{libgit::Git2Client, Vcs},
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    env::current_dir,
    fs::{create_dir_all, write},
};

const TEMPLATE: &str = indoc! {"
    # {{ name }}

    {{ description }}

    ```console
    $ docker pull ghcr.io/autamus/{{ name | to_hyphen }}:latest
    ```
"};

const OPENMPI_PACKAGE: &str = indoc! {r#"
    class Openmpi(AutotoolsPackage):
        """An open source Message Passing Interface implementation."""

        homepage = "https://www.open-mpi.org"
"#};

/// Lay out containers, packages, and template outside of any clone.
fn shared_tree() -> Result<()> {
    create_dir_all("shared/containers/OpenMPI")?;
    write(
        "shared/containers/OpenMPI/spack.yaml",
        "spack:\n  specs: [openmpi@4.1.0]\n",
    )?;
    create_dir_all("shared/containers/Zlib")?;
    write("shared/containers/Zlib/Dockerfile", "FROM alpine\n")?;
    create_dir_all("shared/spack/openmpi")?;
    write("shared/spack/openmpi/package.py", OPENMPI_PACKAGE)?;
    write("shared/article.md", TEMPLATE)?;
    Ok(())
}

fn publisher(clone: &str) -> Result<Publisher<Git2Client, FsClassifier, ParserSet>> {
    let shared = current_dir()?.join("shared");
    let mut config = Config::default();
    config.repo.path = clone.into();
    config.containers.path = shared.join("containers").to_string_lossy().into_owned();
    config.packages.path = shared.join("spack").to_string_lossy().into_owned();
    config.template.path = shared.join("article.md").to_string_lossy().into_owned();

    let layout = RepoLayout::new(&config);
    let vcs = Git2Client::open(layout.root())?;
    let parsers = ParserSet::from_names(&config.parsers.loaded);
    Ok(Publisher::new(vcs, FsClassifier::new(), parsers, layout)
        .with_retry(RetryPolicy::immediate(3)))
}

fn request(container: &str, version: &str) -> PublishRequest {
    PublishRequest {
        container: container.into(),
        version: Some(version.into()),
        size: "42 MB".into(),
        branch: "gh-pages".into(),
        identity: identity(),
    }
}

#[sealed_test]
fn racing_publishers_both_land() -> Result<()> {
    let remote = RemoteFixture::new("remote.git")?;
    remote.stage_and_commit("README.md", "container registry\n")?;
    remote.branch("gh-pages")?;
    remote.clone_into("a")?;
    remote.clone_into("b")?;
    shared_tree()?;

    // Clone b picks up the documentation branch before a publishes, so its
    // first push is stale.
    Git2Client::open("b")?.pull_branch("gh-pages")?;

    let mut a = publisher("a")?;
    let mut b = publisher("b")?;
    let report_a = a.publish(&request("OpenMPI", "4.1.0"))?;
    let report_b = b.publish(&request("Zlib", "1.2.11"))?;

    assert_eq!(report_a.attempts, 1);
    assert_eq!(report_b.attempts, 2);

    let openmpi = remote
        .read_file("gh-pages", "_library/OpenMPI.md")?
        .unwrap_or_default();
    let article = store::parse(&openmpi)?;
    assert_eq!(article.versions(), ["4.1.0"]);
    assert_eq!(
        article.description(),
        Some("An open source Message Passing Interface implementation.")
    );
    assert!(openmpi.contains("ghcr.io/autamus/open-mpi:latest"));

    let zlib = remote
        .read_file("gh-pages", "_library/Zlib.md")?
        .unwrap_or_default();
    let article = store::parse(&zlib)?;
    assert_eq!(article.versions(), ["1.2.11"]);
    assert_eq!(article.description(), None);

    assert_eq!(remote.read_file("main", "_library/Zlib.md")?, None);

    Ok(())
}

#[sealed_test]
fn republishing_accumulates_versions() -> Result<()> {
    let remote = RemoteFixture::new("remote.git")?;
    remote.stage_and_commit("README.md", "container registry\n")?;
    remote.branch("gh-pages")?;
    remote.clone_into("a")?;
    shared_tree()?;

    let mut a = publisher("a")?;
    a.publish(&request("OpenMPI", "4.1.0"))?;
    a.publish(&request("OpenMPI", "4.1.0"))?;
    let report = a.publish(&request("OpenMPI", "4.1.1"))?;

    assert_eq!(report.attempts, 1);
    let document = remote
        .read_file("gh-pages", "_library/OpenMPI.md")?
        .unwrap_or_default();
    let article = store::parse(&document)?;
    assert_eq!(article.versions(), ["4.1.0", "4.1.1"]);

    Ok(())
}
