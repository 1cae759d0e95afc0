//! Repository classification, the per-repository update sequence, and
//! result types.
//!
//! An update runs these steps strictly in order:
//!
//! 1. `fetch --prune` (soft: failure becomes a warning)
//! 2. read the current branch (hard)
//! 3. look for modified tracked files (hard)
//! 4. stash them if there are any (hard)
//! 5. check out the primary branch unless already on it (hard)
//! 6. `pull` (soft)
//! 7. check the original branch out again (hard)
//! 8. pop the stash created in step 4 (hard)
//!
//! Hard failures stop the sequence after putting back whatever this run
//! changed: the original branch where possible, and the stash it created.

use crate::config::Config;
use crate::constants::DEFAULT_REPO_NAME;
use crate::git::{self, GitRunner};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Extra attempts made when checking the original branch back out.
const RESTORE_RETRIES: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStep {
    Started,
    Fetching,
    DetectingBranch,
    CheckingChanges,
    Stashing,
    CheckingOut,
    Pulling,
    RestoringBranch,
    PoppingStash,
    Completed,
}

impl fmt::Display for UpdateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateStep::Started => "start",
            UpdateStep::Fetching => "fetch",
            UpdateStep::DetectingBranch => "detect branch",
            UpdateStep::CheckingChanges => "check changes",
            UpdateStep::Stashing => "stash",
            UpdateStep::CheckingOut => "checkout",
            UpdateStep::Pulling => "pull",
            UpdateStep::RestoringBranch => "restore branch",
            UpdateStep::PoppingStash => "unstash",
            UpdateStep::Completed => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of probing one candidate directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub path: PathBuf,
    pub is_repo: bool,
}

#[derive(Debug)]
pub struct UpdateResult {
    pub path: PathBuf,
    pub outcome: UpdateOutcome,
    pub duration: Duration,
}

impl UpdateResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, UpdateOutcome::Success(_))
    }
}

#[derive(Debug)]
pub enum UpdateOutcome {
    Success(UpdateSuccess),
    Failed(UpdateFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSuccess {
    pub initial_branch: String,
    pub primary_branch: String,
    pub had_stash: bool,
    /// Soft failures (fetch, pull, exhausted budget) that did not stop the update.
    pub warnings: Vec<UpdateWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateWarning {
    pub step: UpdateStep,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFailure {
    pub error: String,
    pub step: UpdateStep,
    /// The changes stashed by this run are still in the stash list.
    pub stash_retained: bool,
}

/// Progress notifications emitted while a repository is updated.
pub trait UpdateCallbacks {
    fn on_update_start(&self, _repo_name: &str) {}
    fn on_step(&self, step: &UpdateStep);
    fn on_complete(&self, result: &UpdateResult);
}

/// Display name of a repository: its directory name.
#[must_use]
pub fn repo_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_REPO_NAME)
}

/// Decides whether `path` is inside a git work tree.
///
/// Anything other than a clean "true" from git counts as "not a repository".
pub fn classify(git: &dyn GitRunner, path: &Path) -> Classification {
    let is_repo = match git::is_inside_work_tree(git, path) {
        Ok(output) if output.success() => git::parse_bool(&output.output).unwrap_or_else(|| {
            debug!(path = %path.display(), output = %output.output, "unparsable work tree probe");
            false
        }),
        Ok(_) => false,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "work tree probe failed");
            false
        }
    };
    Classification {
        path: path.to_path_buf(),
        is_repo,
    }
}

/// Brings the primary branch of the repository at `path` up to date.
pub fn update<C>(git: &dyn GitRunner, path: &Path, callbacks: &C, config: &Config) -> UpdateResult
where
    C: UpdateCallbacks + ?Sized,
{
    let started = Instant::now();
    callbacks.on_update_start(repo_name(path));
    callbacks.on_step(&UpdateStep::Started);

    let sequence = Sequence {
        git,
        path,
        callbacks,
        primary: &config.primary_branch,
        deadline: config.repo_timeout.map(|budget| started + budget),
        warnings: Vec::new(),
        owns_stash: false,
    };
    let outcome = match sequence.run() {
        Ok(success) => UpdateOutcome::Success(success),
        Err(failure) => UpdateOutcome::Failed(failure),
    };

    let result = UpdateResult {
        path: path.to_path_buf(),
        outcome,
        duration: started.elapsed(),
    };
    debug!(path = %path.display(), success = result.is_success(), "update finished");
    callbacks.on_complete(&result);
    result
}

struct Sequence<'a, C: ?Sized> {
    git: &'a dyn GitRunner,
    path: &'a Path,
    callbacks: &'a C,
    primary: &'a str,
    deadline: Option<Instant>,
    warnings: Vec<UpdateWarning>,
    owns_stash: bool,
}

impl<C: UpdateCallbacks + ?Sized> Sequence<'_, C> {
    fn run(mut self) -> Result<UpdateSuccess, UpdateFailure> {
        if let Err(e) = self.attempt(UpdateStep::Fetching, git::fetch_prune) {
            self.warn(UpdateStep::Fetching, e);
        }

        let initial_branch = match self.attempt(UpdateStep::DetectingBranch, git::current_branch) {
            Ok(branch) if !branch.is_empty() => branch,
            Ok(_) => {
                return Err(self.abort(
                    UpdateStep::DetectingBranch,
                    "current branch name is empty".to_string(),
                ));
            }
            Err(e) => return Err(self.abort(UpdateStep::DetectingBranch, e)),
        };

        let has_changes = match self.attempt(UpdateStep::CheckingChanges, git::tracked_changes) {
            Ok(status) => !status.is_empty(),
            Err(e) => return Err(self.abort(UpdateStep::CheckingChanges, e)),
        };

        if has_changes {
            self.stash()?;
        }

        let needs_switch = initial_branch != self.primary;
        let mut on_primary = !needs_switch;
        if needs_switch {
            if self.budget_exhausted() {
                self.warn_budget(UpdateStep::CheckingOut);
            } else {
                let primary = self.primary;
                match self.attempt(UpdateStep::CheckingOut, |g, p| git::checkout(g, p, primary)) {
                    Ok(_) => on_primary = true,
                    Err(e) => {
                        if let Err(restore_error) = self.recover_branch(&initial_branch) {
                            // HEAD is not on the initial branch, so the stash stays put.
                            return Err(UpdateFailure {
                                error: format!(
                                    "{e}; restoring {initial_branch} also failed: {restore_error}"
                                ),
                                step: UpdateStep::CheckingOut,
                                stash_retained: self.owns_stash,
                            });
                        }
                        return Err(self.abort(UpdateStep::CheckingOut, e));
                    }
                }
            }
        }

        if on_primary {
            if self.budget_exhausted() {
                self.warn_budget(UpdateStep::Pulling);
            } else if let Err(e) = self.attempt(UpdateStep::Pulling, git::pull) {
                self.warn(UpdateStep::Pulling, e);
            }
        }

        if needs_switch && on_primary {
            if let Err(error) = self.restore_branch(&initial_branch) {
                // Popping onto the primary branch would mix the user's work
                // into it, so the stash stays where it is.
                return Err(UpdateFailure {
                    error,
                    step: UpdateStep::RestoringBranch,
                    stash_retained: self.owns_stash,
                });
            }
        }

        let had_stash = self.owns_stash;
        if self.owns_stash {
            if let Err(error) = self.attempt(UpdateStep::PoppingStash, git::stash_pop) {
                return Err(UpdateFailure {
                    error,
                    step: UpdateStep::PoppingStash,
                    stash_retained: true,
                });
            }
            self.owns_stash = false;
        }

        self.callbacks.on_step(&UpdateStep::Completed);
        Ok(UpdateSuccess {
            initial_branch,
            primary_branch: self.primary.to_string(),
            had_stash,
            warnings: self.warnings,
        })
    }

    /// Runs one git command, turning a non-zero exit into an error message.
    fn attempt<F>(&self, step: UpdateStep, command: F) -> Result<String, String>
    where
        F: FnOnce(&dyn GitRunner, &Path) -> anyhow::Result<git::GitOutput>,
    {
        self.callbacks.on_step(&step);
        match command(self.git, self.path) {
            Ok(output) if output.success() => Ok(output.output),
            Ok(output) => Err(output.failure_message()),
            Err(e) => Err(format!("{e:#}")),
        }
    }

    fn warn(&mut self, step: UpdateStep, message: String) {
        debug!(path = %self.path.display(), %step, %message, "soft failure");
        self.warnings.push(UpdateWarning { step, message });
    }

    fn warn_budget(&mut self, step: UpdateStep) {
        self.warn(step, format!("repository time budget exhausted, skipped {step}"));
    }

    fn budget_exhausted(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Stashes tracked changes. The stash counts as this run's only if the
    /// newest stash entry changed, so a `git stash` that saved nothing never
    /// leads to popping an older entry.
    fn stash(&mut self) -> Result<(), UpdateFailure> {
        self.callbacks.on_step(&UpdateStep::Stashing);
        let before = match self.stash_head() {
            Ok(head) => head,
            Err(e) => return Err(self.abort(UpdateStep::Stashing, e)),
        };
        match git::stash(self.git, self.path) {
            Ok(output) if output.success() => {}
            Ok(output) => return Err(self.abort(UpdateStep::Stashing, output.failure_message())),
            Err(e) => return Err(self.abort(UpdateStep::Stashing, format!("{e:#}"))),
        }
        match self.stash_head() {
            Ok(after) => {
                self.owns_stash = after.is_some() && after != before;
                Ok(())
            }
            Err(e) => Err(UpdateFailure {
                error: format!("stash ran but the stash list could not be read: {e}"),
                step: UpdateStep::Stashing,
                stash_retained: true,
            }),
        }
    }

    fn stash_head(&self) -> Result<Option<String>, String> {
        match git::stash_head(self.git, self.path) {
            Ok(output) => git::parse_stash_head(&output).ok_or_else(|| output.failure_message()),
            Err(e) => Err(format!("{e:#}")),
        }
    }

    /// After a failed switch, make sure HEAD is back on `initial`.
    fn recover_branch(&self, initial: &str) -> Result<(), String> {
        let current = self.attempt(UpdateStep::DetectingBranch, git::current_branch);
        if current.as_deref() == Ok(initial) {
            return Ok(());
        }
        self.restore_branch(initial)
    }

    fn restore_branch(&self, initial: &str) -> Result<(), String> {
        let mut last_error = String::new();
        for _ in 0..=RESTORE_RETRIES {
            match self.attempt(UpdateStep::RestoringBranch, |g, p| git::checkout(g, p, initial)) {
                Ok(_) => return Ok(()),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    /// Builds the failure for a hard stop, first popping any stash this run created.
    fn abort(&mut self, step: UpdateStep, error: String) -> UpdateFailure {
        if !self.owns_stash {
            return UpdateFailure {
                error,
                step,
                stash_retained: false,
            };
        }
        match self.attempt(UpdateStep::PoppingStash, git::stash_pop) {
            Ok(_) => {
                self.owns_stash = false;
                UpdateFailure {
                    error,
                    step,
                    stash_retained: false,
                }
            }
            Err(pop_error) => UpdateFailure {
                error: format!("{error}; restoring stash also failed: {pop_error}"),
                step,
                stash_retained: true,
            },
        }
    }
}
