// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use librarian::{
    build::{parser::ParserSet, FsClassifier},
    config::Config,
    path::RepoLayout,
    publish::{retry::RetryPolicy, PublishRequest, Publisher},
    vcs::libgit::Git2Client,
};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use std::{fs::read_to_string, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "librarian [options]",
    long_about = "Publish article of a freshly built container onto the documentation \
        branch of its registry repository.\n\nSettings not given as options are read \
        from LIB_* and INPUT_* environment variables, e.g., LIB_CONTAINERS_CURRENT."
)]
struct Cli {
    /// TOML configuration file to layer environment variables on top of.
    #[arg(short, long, value_name = "file")]
    pub config: Option<PathBuf>,

    /// Name of container to publish.
    #[arg(long, value_name = "name")]
    pub container: Option<String>,

    /// Version of container build.
    #[arg(long = "version", value_name = "version")]
    pub container_version: Option<String>,

    /// Size of container build.
    #[arg(long, value_name = "size")]
    pub size: Option<String>,

    /// Print resolved configuration and exit.
    #[arg(long)]
    pub dump_config: bool,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config = self.resolve_config()?;
        if self.dump_config {
            let mut shown = config.clone();
            if !shown.git.token.is_empty() {
                shown.git.token = "<redacted>".into();
            }
            print!("{shown}");
            return Ok(());
        }

        config.validate()?;
        run_publish(config)
    }

    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => read_to_string(path)
                .with_context(|| format!("failed to read config {:?}", path.display()))?
                .parse::<Config>()?,
            None => Config::default(),
        };
        config.apply_env(|name| std::env::var(name))?;

        if let Some(container) = &self.container {
            config.containers.current = container.clone();
        }
        if let Some(version) = &self.container_version {
            config.containers.version = version.clone();
        }
        if let Some(size) = &self.size {
            config.containers.size = size.clone();
        }

        config.expand_paths()?;
        Ok(config)
    }
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_publish(config: Config) -> Result<()> {
    info!("librarian {}", env!("CARGO_PKG_VERSION"));
    let layout = RepoLayout::new(&config);
    let vcs = Git2Client::open(layout.root())?
        .with_identity(config.git.clone())
        .with_progress(ProgressBar::new_spinner())?;

    let parsers = ParserSet::from_names(&config.parsers.loaded);
    info!("enabled parsers: {:?}", parsers.enabled());

    let request = PublishRequest {
        container: config.containers.current.clone(),
        version: Some(config.containers.version.clone()).filter(|version| !version.is_empty()),
        size: config.containers.size.clone(),
        branch: config.repo.pages_branch.clone(),
        identity: config.git.clone(),
    };

    let mut publisher = Publisher::new(vcs, FsClassifier::new(), parsers, layout)
        .with_retry(RetryPolicy::from(&config.retry));
    let report = publisher.publish(&request)?;
    info!(
        "article {:?} published after {} attempt(s)",
        report.path.display(),
        report.attempts
    );

    Ok(())
}
