//! Application-wide constants.
//!
//! Centralized configuration values to avoid magic numbers throughout the codebase.

use std::time::Duration;

/// Default timeout for individual git operations (in seconds).
const DEFAULT_GIT_TIMEOUT_SECS: u64 = 30;

/// Returns the git command timeout.
///
/// Can be customized via the GIT_DAILY_TIMEOUT environment variable (in seconds).
/// Falls back to 30 seconds if not set or invalid.
///
/// Example: `GIT_DAILY_TIMEOUT=60 git-daily`
pub fn git_timeout() -> Duration {
    std::env::var("GIT_DAILY_TIMEOUT")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_GIT_TIMEOUT_SECS))
}

/// Number of threads for parallel classification and updates.
/// Higher than CPU count because git operations are I/O-bound (network, disk).
pub const RAYON_THREAD_COUNT: usize = 60;

/// Progress bar tick interval in milliseconds.
pub const PROGRESS_TICK_MS: u64 = 80;

/// Maximum number of completed repositories to show in the workspace progress display.
pub const MAX_VISIBLE_COMPLETIONS: usize = 5;

/// Branch kept up to date unless overridden on the command line.
pub const MASTER_BRANCH: &str = "master";

/// Exit code git uses for "not a git repository".
pub const GIT_NOT_A_REPO_EXIT_CODE: i32 = 128;

/// Default name used when a repository name cannot be determined from its path.
pub const DEFAULT_REPO_NAME: &str = "repository";
