// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod publish;

use anyhow::Result;
use git2::{ErrorCode, IndexEntry, IndexTime, Oid, Repository, RepositoryInitOptions};
use librarian::vcs::GitIdentity;
use std::{
    env::current_dir,
    path::{Path, PathBuf},
};

/// Bare repository standing in for the remote every publisher pushes to.
pub(crate) struct RemoteFixture {
    path: PathBuf,
    repo: Repository,
}

impl RemoteFixture {
    pub(crate) fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = current_dir()?.join(path.as_ref());
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        opts.bare(true);
        let repo = Repository::init_opts(&path, &opts)?;
        configure_user(&repo)?;

        Ok(Self { path, repo })
    }

    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<Oid> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename
                .as_ref()
                .as_os_str()
                .to_string_lossy()
                .into_owned()
                .into_bytes(),
        };

        // INVARIANT: Build new tree on top of tree of latest commit.
        let parent = self.repo.head().ok().and_then(|head| head.target());
        let mut index = self.repo.index()?;
        if let Some(parent) = parent {
            index.read_tree(&self.repo.find_commit(parent)?.tree()?)?;
        }
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let signature = self.repo.signature()?;
        let mut parents = Vec::new();
        if let Some(parent) = parent {
            parents.push(self.repo.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            format!("chore: add {:?}", filename.as_ref()).as_ref(),
            &tree,
            &parents,
        )?;

        Ok(oid)
    }

    /// Create branch at the commit HEAD points to.
    pub(crate) fn branch(&self, name: &str) -> Result<()> {
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.branch(name, &head, false)?;
        Ok(())
    }

    /// Clone remote into a fresh working tree.
    pub(crate) fn clone_into(&self, path: impl AsRef<Path>) -> Result<Repository> {
        let url = self.path.to_string_lossy().into_owned();
        let repo = Repository::clone(&url, path.as_ref())?;
        configure_user(&repo)?;
        Ok(repo)
    }

    /// Read file at tip of target branch, if branch tracks it.
    pub(crate) fn read_file(&self, branch: &str, filename: &str) -> Result<Option<String>> {
        let reference = self.repo.find_reference(&format!("refs/heads/{branch}"))?;
        let tree = reference.peel_to_tree()?;
        let entry = match tree.get_path(Path::new(filename)) {
            Ok(entry) => entry,
            Err(err) if err.code() == ErrorCode::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let blob = self.repo.find_blob(entry.id())?;

        Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
    }

    /// Number of commits reachable from target branch.
    pub(crate) fn count_commits(&self, branch: &str) -> Result<usize> {
        let mut walk = self.repo.revwalk()?;
        walk.push_ref(&format!("refs/heads/{branch}"))?;
        Ok(walk.count())
    }
}

pub(crate) fn identity() -> GitIdentity {
    GitIdentity {
        name: "John Doe".into(),
        email: "john@doe.com".into(),
        ..Default::default()
    }
}

fn configure_user(repo: &Repository) -> Result<()> {
    // INVARIANT: Always provide valid name and email.
    //   - Git will complain if this is not set in CI/CD environments.
    let mut config = repo.config()?;
    config.set_str("user.name", "John Doe")?;
    config.set_str("user.email", "john@doe.com")?;
    Ok(())
}
