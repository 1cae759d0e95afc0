//! Git command wrappers.
//!
//! This module provides a thin wrapper around git CLI commands. Every call
//! goes through [`GitRunner`], which reports *how* git exited and leaves the
//! decision about severity to the caller. An `Err` from a runner means git
//! could not be invoked at all.

use crate::constants::GIT_NOT_A_REPO_EXIT_CODE;
use anyhow::{Context, anyhow};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Result of one git invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    /// Rendered command line, for display.
    pub command: String,
    /// Combined stdout and stderr, trimmed.
    pub output: String,
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl GitOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Exit code 128 is git's way of saying "not a git repository".
    #[must_use]
    pub fn is_not_a_repository(&self) -> bool {
        !self.timed_out && self.exit_code == Some(GIT_NOT_A_REPO_EXIT_CODE)
    }

    /// Human-readable description of a failed invocation.
    #[must_use]
    pub fn failure_message(&self) -> String {
        if self.timed_out {
            return format!("{} timed out", self.command);
        }
        let status = match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        if self.output.is_empty() {
            format!("{} failed ({status})", self.command)
        } else {
            format!("{} failed ({status}): {}", self.command, self.output)
        }
    }
}

/// Executes git inside a working directory.
pub trait GitRunner: Send + Sync {
    fn run(&self, repo: &Path, args: &[&str]) -> anyhow::Result<GitOutput>;
}

/// Runs the real git binary as a child process.
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: String,
    timeout: Duration,
}

impl SystemGit {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("git", timeout)
    }

    #[must_use]
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl GitRunner for SystemGit {
    fn run(&self, repo: &Path, args: &[&str]) -> anyhow::Result<GitOutput> {
        let command = format_command(&self.program, repo, args);
        debug!(%command, "spawning git");

        let mut child = Command::new(&self.program)
            .arg("-C")
            .arg(repo)
            .args(args)
            // A credential prompt would otherwise block until the timeout.
            .env("GIT_TERMINAL_PROMPT", "0")
            // Output is parsed, so it must not be translated.
            .env("LC_ALL", "C")
            .env_remove("LANGUAGE")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn git command: {command}"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;
        let stdout_handle = thread::spawn(move || read_stream(stdout));
        let stderr_handle = thread::spawn(move || read_stream(stderr));

        let status = child
            .wait_timeout(self.timeout)
            .with_context(|| format!("Failed to wait for git command: {command}"))?;

        let Some(status) = status else {
            warn!(%command, timeout_secs = self.timeout.as_secs(), "git timed out, killing");
            child
                .kill()
                .with_context(|| format!("Failed to kill git command: {command}"))?;
            child
                .wait()
                .with_context(|| format!("Failed to reap git command: {command}"))?;
            // Helpers spawned by git (ssh, credential managers) may keep the
            // pipes open, so the reader threads are left to finish on their own.
            return Ok(GitOutput {
                command,
                output: String::new(),
                exit_code: None,
                timed_out: true,
            });
        };

        let stdout = join_stream(stdout_handle).context("Failed to read git stdout")?;
        let stderr = join_stream(stderr_handle).context("Failed to read git stderr")?;

        debug!(%command, exit_code = ?status.code(), "git finished");
        Ok(GitOutput {
            command,
            output: combine_output(&stdout, &stderr),
            exit_code: status.code(),
            timed_out: false,
        })
    }
}

fn read_stream(mut stream: impl Read) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(buf)
}

fn join_stream(handle: thread::JoinHandle<std::io::Result<Vec<u8>>>) -> anyhow::Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => Ok(result?),
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    match (stdout.trim(), stderr.trim()) {
        (out, "") => out.to_string(),
        ("", err) => err.to_string(),
        (out, err) => format!("{out}\n{err}"),
    }
}

/// Renders the command line the way a user would type it.
#[must_use]
pub fn format_command(program: &str, repo: &Path, args: &[&str]) -> String {
    let mut command = format!("{program} -C {}", repo.display());
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}

/// Parses git's boolean output. Anything unrecognised is `None`.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

pub fn validate_branch_name(branch: &str) -> anyhow::Result<()> {
    if branch.is_empty()
        || branch.starts_with('-')
        || branch.contains('\0')
        || branch.contains('\n')
        || branch.chars().any(char::is_whitespace)
    {
        anyhow::bail!("Invalid branch name: {:?}", branch);
    }
    Ok(())
}

pub fn is_inside_work_tree(git: &dyn GitRunner, repo: &Path) -> anyhow::Result<GitOutput> {
    git.run(repo, &["rev-parse", "--is-inside-work-tree"])
}

pub fn fetch_prune(git: &dyn GitRunner, repo: &Path) -> anyhow::Result<GitOutput> {
    git.run(repo, &["fetch", "--prune"])
}

pub fn current_branch(git: &dyn GitRunner, repo: &Path) -> anyhow::Result<GitOutput> {
    git.run(repo, &["symbolic-ref", "--short", "HEAD"])
}

/// Lists modified tracked files. Untracked files are never reported.
pub fn tracked_changes(git: &dyn GitRunner, repo: &Path) -> anyhow::Result<GitOutput> {
    git.run(repo, &["status", "--untracked-files=no", "--porcelain"])
}

pub fn stash(git: &dyn GitRunner, repo: &Path) -> anyhow::Result<GitOutput> {
    git.run(repo, &["stash"])
}

/// Object id of the newest stash entry. Exits 1 with no output when the
/// stash list is empty.
pub fn stash_head(git: &dyn GitRunner, repo: &Path) -> anyhow::Result<GitOutput> {
    git.run(repo, &["rev-parse", "--quiet", "--verify", "refs/stash"])
}

/// Reads the result of [`stash_head`]: `Some(None)` for an empty stash list,
/// `None` when the lookup itself failed.
#[must_use]
pub fn parse_stash_head(output: &GitOutput) -> Option<Option<String>> {
    if output.success() && !output.output.is_empty() {
        Some(Some(output.output.clone()))
    } else if !output.timed_out && output.exit_code == Some(1) && output.output.is_empty() {
        Some(None)
    } else {
        None
    }
}

pub fn stash_pop(git: &dyn GitRunner, repo: &Path) -> anyhow::Result<GitOutput> {
    git.run(repo, &["stash", "pop"])
}

pub fn checkout(git: &dyn GitRunner, repo: &Path, branch: &str) -> anyhow::Result<GitOutput> {
    validate_branch_name(branch)?;
    git.run(repo, &["checkout", branch])
}

pub fn pull(git: &dyn GitRunner, repo: &Path) -> anyhow::Result<GitOutput> {
    git.run(repo, &["pull"])
}
