//! Progress bars, colored output, and summary formatting.
//!
//! Everything printed while repositories are being processed goes through a
//! [`Console`], which suspends the progress bars around each line so that
//! concurrent output interleaves by whole lines.

use crate::config::{Config, Verbosity};
use crate::constants::{MAX_VISIBLE_COMPLETIONS, PROGRESS_TICK_MS};
use crate::git::{GitOutput, GitRunner};
use crate::repo::{UpdateCallbacks, UpdateOutcome, UpdateResult, UpdateStep, repo_name};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// No-op callbacks for when progress tracking is not needed.
/// This is the null object pattern for UpdateCallbacks - use it when
/// you don't need any output or progress tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoOpCallbacks;

impl UpdateCallbacks for NoOpCallbacks {
    fn on_step(&self, _step: &UpdateStep) {}
    fn on_complete(&self, _result: &UpdateResult) {}
}

/// Shared, thread-safe output sink for one run.
#[derive(Debug, Clone)]
pub struct Console {
    verbosity: Verbosity,
    multi: MultiProgress,
}

impl Console {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let multi = if config.shows_progress() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        Self {
            verbosity: config.verbosity,
            multi,
        }
    }

    /// A console that prints nothing.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            verbosity: Verbosity::Quiet,
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    fn shows_progress(&self) -> bool {
        self.verbosity == Verbosity::Normal
    }

    /// Prints one line to stdout unless quiet.
    pub fn line(&self, message: impl AsRef<str>) {
        if self.verbosity == Verbosity::Quiet {
            return;
        }
        self.multi.suspend(|| println!("{}", message.as_ref()));
    }

    pub fn log_command(&self, output: &GitOutput) {
        self.line(format_command_line(output, self.is_verbose()));
    }

    /// Creates a spinner for single repository updates.
    #[must_use]
    pub fn single_repo_progress(&self) -> SingleRepoProgress {
        let spinner = self.shows_progress().then(|| {
            let spinner = self.multi.add(ProgressBar::new_spinner());
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                    .template("{spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));
            spinner
        });
        SingleRepoProgress { spinner }
    }

    /// Creates a progress bar for workspace updates showing completion count.
    #[must_use]
    pub fn workspace_progress(&self, total: usize) -> WorkspaceProgress {
        let (main_bar, completion_slots) = if self.shows_progress() {
            let bar = self.multi.add(ProgressBar::new(total as u64));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{bar:40.cyan/blue} {pos}/{len} completed {spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█░"),
            );
            bar.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));

            let slots = (0..MAX_VISIBLE_COMPLETIONS)
                .map(|_| {
                    let slot = self.multi.add(ProgressBar::new_spinner());
                    slot.set_style(
                        ProgressStyle::default_spinner()
                            .template("  {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                    );
                    slot
                })
                .collect();
            (bar, slots)
        } else {
            (ProgressBar::hidden(), Vec::new())
        };

        WorkspaceProgress {
            console: self.clone(),
            main_bar,
            completion_slots,
            state: Arc::new(Mutex::new(CompletionState {
                repos: VecDeque::new(),
                failed_count: 0,
                total_completed: 0,
            })),
        }
    }
}

/// Reports every git invocation to a [`Console`] before handing back the result.
pub struct ConsoleGit<'a> {
    inner: &'a dyn GitRunner,
    console: &'a Console,
}

impl<'a> ConsoleGit<'a> {
    #[must_use]
    pub fn new(inner: &'a dyn GitRunner, console: &'a Console) -> Self {
        Self { inner, console }
    }
}

impl GitRunner for ConsoleGit<'_> {
    fn run(&self, repo: &Path, args: &[&str]) -> anyhow::Result<GitOutput> {
        let result = self.inner.run(repo, args);
        match &result {
            Ok(output) => self.console.log_command(output),
            Err(e) => self.console.line(format!("  {} {:#}", "✗".red(), e)),
        }
        result
    }
}

fn format_command_line(output: &GitOutput, verbose: bool) -> String {
    let mut line = if output.success() {
        format!("  {} {}", "✓".green(), output.command.dimmed())
    } else if output.timed_out {
        format!("  {} {} {}", "✗".red(), output.command, "(timed out)".red())
    } else {
        let status = match output.exit_code {
            Some(code) => format!("(exit {code})"),
            None => "(killed)".to_string(),
        };
        format!("  {} {} {}", "✗".red(), output.command, status.red())
    };

    if verbose {
        for body in output.output.lines() {
            line.push_str("\n      ");
            line.push_str(&body.dimmed().to_string());
        }
    }
    line
}

/// Prints a repository header in verbose mode.
fn print_repo_header(console: &Console, repo_name: &str) {
    if console.is_verbose() {
        console.line(format!("\n{}", format!("[{}]", repo_name).white().bold()));
    }
}

/// Prints a step progress message in verbose mode.
fn print_step(console: &Console, repo_name: &str, step: &UpdateStep) {
    if !console.is_verbose() || matches!(step, UpdateStep::Started | UpdateStep::Completed) {
        return;
    }
    console.line(format!(
        "  {} {}",
        format!("[{repo_name}]").dimmed(),
        format_step_message(step).dimmed()
    ));
}

/// Prints one line per finished repository.
fn print_completion_status(console: &Console, result: &UpdateResult) {
    let name = repo_name(&result.path);
    match &result.outcome {
        UpdateOutcome::Success(success) => {
            console.line(format!(
                "{} {} updated ({} back on {})",
                "✓".green(),
                name.white().bold(),
                success.primary_branch,
                success.initial_branch.cyan()
            ));
            for warning in &success.warnings {
                console.line(format!(
                    "  {} {} at {}: {}",
                    "!".yellow(),
                    name,
                    warning.step,
                    warning.message.yellow()
                ));
            }
        }
        UpdateOutcome::Failed(failure) => {
            console.line(format!(
                "{} {} failed at {}: {}",
                "✗".red(),
                name.white().bold(),
                failure.step,
                failure.error.red()
            ));
        }
    }
}

/// Progress wrapper for single repository updates.
/// Displays a spinner with step-by-step status messages.
/// Uses `Option` to avoid allocation when progress is hidden (quiet/verbose modes).
pub struct SingleRepoProgress {
    spinner: Option<ProgressBar>,
}

impl SingleRepoProgress {
    pub fn update(&self, step: &UpdateStep) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(format_step_message(step));
        }
    }

    pub fn finish(&self) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
    }
}

/// Callbacks for single repository updates.
/// Combines the spinner with verbose and completion output.
pub struct SingleRepoCallbacks {
    repo_name: String,
    progress: SingleRepoProgress,
    console: Console,
}

impl SingleRepoCallbacks {
    #[must_use]
    pub fn new(console: &Console, repo_name: &str) -> Self {
        Self {
            repo_name: repo_name.to_string(),
            progress: console.single_repo_progress(),
            console: console.clone(),
        }
    }
}

impl UpdateCallbacks for SingleRepoCallbacks {
    fn on_update_start(&self, repo_name: &str) {
        print_repo_header(&self.console, repo_name);
    }

    fn on_step(&self, step: &UpdateStep) {
        self.progress.update(step);
        print_step(&self.console, &self.repo_name, step);
    }

    fn on_complete(&self, result: &UpdateResult) {
        self.progress.finish();
        print_completion_status(&self.console, result);
    }
}

/// Consolidated state for workspace progress tracking.
/// Combining these fields reduces lock contention by acquiring a single lock
/// instead of multiple separate locks for related data.
struct CompletionState {
    /// Recently completed repos for display (bounded by MAX_VISIBLE_COMPLETIONS)
    repos: VecDeque<(String, bool)>,
    /// Count of failed repos for status message
    failed_count: usize,
    /// Total completed for determining ellipsis display
    total_completed: usize,
}

/// Thread-safe progress tracker for workspace mode.
/// Shows a progress bar with the completion count and recent results.
#[derive(Clone)]
pub struct WorkspaceProgress {
    console: Console,
    main_bar: ProgressBar,
    completion_slots: Vec<ProgressBar>,
    state: Arc<Mutex<CompletionState>>,
}

impl WorkspaceProgress {
    #[must_use]
    pub fn create_repo_tracker(&self, repo_name: &str) -> RepoProgressTracker {
        RepoProgressTracker {
            repo_name: repo_name.to_string(),
            workspace: self.clone(),
        }
    }

    pub fn mark_completed(&self, repo_name: &str, success: bool) {
        self.main_bar.inc(1);

        // A poisoned lock only means another tracker panicked mid-redraw.
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if !success {
            state.failed_count += 1;
            self.main_bar
                .set_message(format!("│ {} failed", state.failed_count).red().to_string());
        }

        state.total_completed += 1;
        state.repos.push_back((repo_name.to_string(), success));

        while state.repos.len() > MAX_VISIBLE_COMPLETIONS {
            state.repos.pop_front();
        }

        self.redraw_completions(&state);
    }

    pub fn finish(&self) {
        self.main_bar.finish_and_clear();
        for slot in &self.completion_slots {
            slot.finish_and_clear();
        }
    }

    fn redraw_completions(&self, state: &CompletionState) {
        let show_ellipsis = state.total_completed > MAX_VISIBLE_COMPLETIONS;

        for (i, slot) in self.completion_slots.iter().enumerate() {
            if i == 0 && show_ellipsis {
                slot.set_message("...".dimmed().to_string());
            } else {
                let idx = if show_ellipsis { i - 1 } else { i };
                if idx < state.repos.len() {
                    let (name, success) = &state.repos[idx];
                    let symbol = if *success { "✓".green() } else { "✗".red() };
                    slot.set_message(format!("{} {}", symbol, name));
                } else {
                    slot.set_message("");
                }
            }
        }
    }
}

/// Per-repository progress tracker for workspace mode.
/// Implements `UpdateCallbacks` to receive completion notifications.
#[derive(Clone)]
pub struct RepoProgressTracker {
    repo_name: String,
    workspace: WorkspaceProgress,
}

impl UpdateCallbacks for RepoProgressTracker {
    fn on_update_start(&self, repo_name: &str) {
        print_repo_header(&self.workspace.console, repo_name);
    }

    fn on_step(&self, step: &UpdateStep) {
        print_step(&self.workspace.console, &self.repo_name, step);
    }

    fn on_complete(&self, result: &UpdateResult) {
        print_completion_status(&self.workspace.console, result);
        self.workspace
            .mark_completed(&self.repo_name, result.is_success());
    }
}

pub fn print_working_dir(path: &Path, config: &Config) {
    if config.is_quiet() {
        return;
    }
    println!(
        "{} {}",
        "Working in:".cyan(),
        path.display().to_string().white().bold()
    )
}

/// Lists the directories about to be probed. Verbose only.
pub fn print_candidates(console: &Console, start: &Path, candidates: &[PathBuf]) {
    if !console.is_verbose() {
        return;
    }
    for line in format_candidates(start, candidates) {
        console.line(line);
    }
}

fn format_candidates(start: &Path, candidates: &[PathBuf]) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} ({} directories)",
        "Contents of".dimmed(),
        start.display(),
        candidates.len()
    )];
    lines.extend(
        candidates
            .iter()
            .map(|path| format!("  {} {}", "dir".dimmed(), repo_name(path))),
    );
    lines
}

pub fn print_no_repos(config: &Config) {
    if config.is_quiet() {
        return;
    }
    println!("{}", "No git repositories found".yellow().bold())
}

pub fn print_summary(results: &[UpdateResult], duration: Duration, config: &Config) {
    if config.is_quiet() {
        print_quiet_summary(results);
    } else {
        print_normal_summary(results, duration);
    }
}

fn print_quiet_summary(results: &[UpdateResult]) {
    let (successes, failures): (Vec<_>, Vec<_>) = results.iter().partition(|r| r.is_success());

    // Always print count to stdout
    println!("{}/{} repositories updated", successes.len(), results.len());

    // Print failures to stderr
    for result in &failures {
        if let UpdateOutcome::Failed(failure) = &result.outcome {
            eprintln!("error: {}: {}", result.path.display(), failure.error);
        }
    }
}

fn print_normal_summary(results: &[UpdateResult], duration: Duration) {
    print_section("Summary");
    let (successes, failures): (Vec<_>, Vec<_>) = results.iter().partition(|r| r.is_success());

    print_successes(&successes);
    print_failures(&failures);

    println!(
        "{}: {}/{} repos in {}",
        "Total".white().bold(),
        successes.len(),
        results.len(),
        format_duration(duration)
    );
    println!("{}", "Batch complete.".green().bold());
}

fn format_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f32())
}

fn print_section(title: &str) {
    let line = "=".repeat(50).cyan().dimmed();
    let padding = 50usize.saturating_sub(title.len()) / 2;
    let centered = format!("{:>width$}", title, width = padding + title.len());
    println!("\n{}\n{}\n{}\n", line, centered.cyan().bold(), line);
}

fn print_successes(successes: &[&UpdateResult]) {
    if successes.is_empty() {
        return;
    }
    println!(
        "{}",
        format!("Succeeded ({}):", successes.len()).green().bold()
    );

    for result in successes {
        if let UpdateOutcome::Success(success) = &result.outcome {
            let stash_msg = if success.had_stash {
                " (stash restored)".yellow()
            } else {
                "".normal()
            };
            println!(
                "  {} {} {}{} in {}",
                "OK".green().bold(),
                result.path.display().to_string().white(),
                success.initial_branch.cyan(),
                stash_msg,
                format_duration(result.duration).dimmed(),
            );
            for warning in &success.warnings {
                println!(
                    "     {} {}",
                    format!("warning at {}:", warning.step).yellow(),
                    warning.message
                );
            }
        }
    }
    println!();
}

fn print_failures(failures: &[&UpdateResult]) {
    if failures.is_empty() {
        return;
    }

    println!("{}", format!("Failed ({}):", failures.len()).red().bold());

    for result in failures {
        if let UpdateOutcome::Failed(failure) = &result.outcome {
            let stash_msg = if failure.stash_retained {
                " (changes kept in stash)".yellow()
            } else {
                "".normal()
            };
            println!(
                "  {} {} {}{} in {}",
                "FAIL".red().bold(),
                result.path.display().to_string().white(),
                format!("at {}: {}", failure.step, failure.error).red(),
                stash_msg,
                format_duration(result.duration).dimmed(),
            );
        }
    }
    println!();
}

fn format_step_message(step: &UpdateStep) -> &'static str {
    match step {
        UpdateStep::Started => "Starting update...",
        UpdateStep::Fetching => "Fetching from origin...",
        UpdateStep::DetectingBranch => "Detecting current branch...",
        UpdateStep::CheckingChanges => "Checking for uncommitted changes...",
        UpdateStep::Stashing => "Stashing uncommitted changes...",
        UpdateStep::CheckingOut => "Checking out primary branch...",
        UpdateStep::Pulling => "Pulling changes from origin...",
        UpdateStep::RestoringBranch => "Restoring original branch...",
        UpdateStep::PoppingStash => "Restoring stashed changes...",
        UpdateStep::Completed => "Completed",
    }
}
