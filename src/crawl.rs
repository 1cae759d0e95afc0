//! Finds the repositories below a starting directory and updates them.
//!
//! The starting directory is probed first. If it is a repository, only that
//! repository is updated. Otherwise each immediate child directory is
//! classified in parallel and every confirmed repository is updated in
//! parallel. [`Crawler::crawl`] returns only after every update finished.

use crate::config::Config;
use crate::git::{self, GitRunner};
use crate::output::{self, Console, ConsoleGit, SingleRepoCallbacks};
use crate::repo::{self, Classification, UpdateResult, repo_name};
use anyhow::Context;
use colored::Colorize;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What a crawl ended up doing.
#[derive(Debug)]
pub enum CrawlOutcome {
    /// The starting directory was itself a repository.
    SingleRepository(UpdateResult),
    /// The starting directory contained these repositories.
    Workspace(Vec<UpdateResult>),
    /// Nothing to update.
    NoRepositories,
}

impl CrawlOutcome {
    #[must_use]
    pub fn results(&self) -> &[UpdateResult] {
        match self {
            CrawlOutcome::SingleRepository(result) => std::slice::from_ref(result),
            CrawlOutcome::Workspace(results) => results,
            CrawlOutcome::NoRepositories => &[],
        }
    }
}

/// Runs one batch. Owns the worker pool the batch runs on.
pub struct Crawler<'a> {
    git: &'a dyn GitRunner,
    config: Config,
    console: Console,
    pool: rayon::ThreadPool,
}

impl<'a> Crawler<'a> {
    pub fn new(git: &'a dyn GitRunner, config: Config, console: Console) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs.max(1))
            .thread_name(|i| format!("git-daily-{i}"))
            .build()
            .context("Failed to build worker thread pool")?;
        Ok(Self {
            git,
            config,
            console,
            pool,
        })
    }

    /// Updates `start` if it is a repository, otherwise every repository directly below it.
    ///
    /// Errors only when the environment is unusable: git cannot be run at
    /// all, or `start` cannot be read.
    pub fn crawl(&self, start: &Path) -> anyhow::Result<CrawlOutcome> {
        if self.probe_start(start)? {
            self.console.line(format!(
                "{} {}",
                "Working directory is a git repository:".cyan(),
                start.display()
            ));
            let git = ConsoleGit::new(self.git, &self.console);
            let callbacks = SingleRepoCallbacks::new(&self.console, repo_name(start));
            let result = repo::update(&git, start, &callbacks, &self.config);
            return Ok(CrawlOutcome::SingleRepository(result));
        }

        self.console.line(
            "Working directory is not a git repository, scanning child directories..."
                .dimmed()
                .to_string(),
        );
        let repos = self.discover(start)?;
        if repos.is_empty() {
            return Ok(CrawlOutcome::NoRepositories);
        }

        self.console.line(
            format!("Updating {} repositories", repos.len())
                .dimmed()
                .to_string(),
        );
        Ok(CrawlOutcome::Workspace(self.update_workspace(&repos)))
    }

    /// Probes the starting directory.
    ///
    /// "Not a repository" (exit 128) and unparsable output are a plain `false`;
    /// any other failure means git is unusable here and is fatal.
    fn probe_start(&self, start: &Path) -> anyhow::Result<bool> {
        let git = ConsoleGit::new(self.git, &self.console);
        let output = git::is_inside_work_tree(&git, start).with_context(|| {
            format!(
                "Error while checking if {} is a git repository",
                start.display()
            )
        })?;

        if output.is_not_a_repository() {
            return Ok(false);
        }
        if !output.success() {
            anyhow::bail!(
                "Error while checking if {} is a git repository: {}",
                start.display(),
                output.failure_message()
            );
        }
        match git::parse_bool(&output.output) {
            Some(is_repo) => Ok(is_repo),
            None => {
                self.console.line(format!(
                    "{} {:?}, continuing with children",
                    "Could not determine if working directory is a git repository:".yellow(),
                    output.output
                ));
                Ok(false)
            }
        }
    }

    /// Classifies every child directory of `start` in parallel.
    /// Returns the confirmed repositories sorted by path.
    pub fn discover(&self, start: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let candidates = child_directories(start)?;
        output::print_candidates(&self.console, start, &candidates);
        debug!(count = candidates.len(), "classifying child directories");

        let git = ConsoleGit::new(self.git, &self.console);
        let classifications: Vec<Classification> = self.pool.install(|| {
            candidates
                .par_iter()
                .map(|path| repo::classify(&git, path))
                .collect()
        });

        let mut repos = Vec::new();
        for classification in classifications {
            if classification.is_repo {
                self.console.line(format!(
                    "{} is a git repository",
                    classification.path.display().to_string().white()
                ));
                repos.push(classification.path);
            } else {
                self.console.line(
                    format!("{} is not a git repository", classification.path.display())
                        .dimmed()
                        .to_string(),
                );
            }
        }
        repos.sort();
        Ok(repos)
    }

    /// Updates every repository in parallel and waits for all of them.
    pub fn update_workspace(&self, repos: &[PathBuf]) -> Vec<UpdateResult> {
        let git = ConsoleGit::new(self.git, &self.console);
        let progress = self.console.workspace_progress(repos.len());

        let results = self.pool.install(|| {
            repos
                .par_iter()
                .map(|path| {
                    let tracker = progress.create_repo_tracker(repo_name(path));
                    repo::update(&git, path, &tracker, &self.config)
                })
                .collect()
        });

        progress.finish();
        results
    }
}

/// Immediate subdirectories of `path`. Symlinks are not followed.
fn child_directories(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(path)
        .with_context(|| format!("Failed to read directory {}", path.display()))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("Failed to read an entry of {}", path.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
        if file_type.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
