//! Configuration types for CLI verbosity and options.

use crate::constants::{MASTER_BRANCH, RAYON_THREAD_COUNT, git_timeout};
use std::time::Duration;

/// Runtime configuration derived from CLI arguments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Controls the verbosity level of CLI output.
    pub verbosity: Verbosity,
    /// Branch that gets fetched and pulled in every repository.
    pub primary_branch: String,
    /// Upper bound for a single git invocation.
    pub git_timeout: Duration,
    /// Upper bound for the forward part of one repository's update.
    /// Restoration steps always run, even once this is exceeded.
    pub repo_timeout: Option<Duration>,
    /// Worker threads used for classification and updates.
    pub jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::default(),
            primary_branch: MASTER_BRANCH.to_string(),
            git_timeout: git_timeout(),
            repo_timeout: None,
            jobs: RAYON_THREAD_COUNT,
        }
    }
}

impl Config {
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    /// Progress bars only make sense when lines are short and few.
    #[must_use]
    pub fn shows_progress(&self) -> bool {
        self.verbosity == Verbosity::Normal
    }
}

/// Verbosity level for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// Resolves the `--quiet` / `--verbose` flag pair. Clap rejects both at once.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (_, true) => Verbosity::Verbose,
            _ => Verbosity::Normal,
        }
    }
}
