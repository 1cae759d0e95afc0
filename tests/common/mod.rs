//! Test infrastructure for git-daily integration tests.
#![allow(dead_code)]

use anyhow::Result;
use git_daily::config::{Config, Verbosity};
use git_daily::git::{GitRunner, SystemGit};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const TEST_GIT_TIMEOUT: Duration = Duration::from_secs(60);

pub fn system_git() -> SystemGit {
    SystemGit::new(TEST_GIT_TIMEOUT)
}

/// Runs git for fixture setup, failing on a non-zero exit.
pub fn run_git(path: &Path, args: &[&str]) -> Result<String> {
    let output = system_git().run(path, args)?;
    if !output.success() {
        anyhow::bail!(output.failure_message());
    }
    Ok(output.output)
}

pub fn test_config() -> Config {
    Config {
        verbosity: Verbosity::Quiet,
        jobs: 4,
        git_timeout: TEST_GIT_TIMEOUT,
        ..Config::default()
    }
}

fn configure_identity(path: &Path) -> Result<()> {
    run_git(path, &["config", "user.email", "test@example.com"])?;
    run_git(path, &["config", "user.name", "Test User"])?;
    run_git(path, &["config", "commit.gpgsign", "false"])?;
    Ok(())
}

/// Initializes a repository at `path` with one commit on `branch`.
pub fn init_repo(path: &Path, branch: &str) -> Result<()> {
    run_git(path, &["init", "-b", branch])?;
    configure_identity(path)?;
    std::fs::write(path.join("README.md"), "# Test Repo\n")?;
    run_git(path, &["add", "README.md"])?;
    run_git(path, &["commit", "-m", "Initial commit"])?;
    Ok(())
}

/// Creates a bare repository at `remote` and pushes `branch` of `local` to it.
pub fn attach_remote(local: &Path, remote: &Path, branch: &str) -> Result<()> {
    run_git(remote, &["init", "--bare", "-b", branch])?;
    let remote_url = remote.to_string_lossy();
    run_git(local, &["remote", "add", "origin", &remote_url])?;
    run_git(local, &["push", "-u", "origin", branch])?;
    Ok(())
}

/// A temporary git repository for testing.
/// Automatically cleaned up when dropped.
pub struct TestRepo {
    _temp_dir: TempDir,
    path: PathBuf,
    remote: Option<TempDir>,
    branch: String,
}

impl TestRepo {
    /// Creates a new test repository with an initial commit on the master branch.
    pub fn new() -> Result<Self> {
        Self::on_branch("master")
    }

    pub fn on_branch(branch: &str) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("repo");
        std::fs::create_dir(&path)?;
        init_repo(&path, branch)?;

        Ok(Self {
            _temp_dir: temp_dir,
            path,
            remote: None,
            branch: branch.to_string(),
        })
    }

    /// Creates a test repository whose `branch` (default master) tracks a bare remote.
    pub fn with_remote(branch: Option<&str>) -> Result<Self> {
        let mut repo = Self::on_branch(branch.unwrap_or("master"))?;
        let remote = TempDir::new()?;
        attach_remote(&repo.path, remote.path(), &repo.branch)?;
        repo.remote = Some(remote);
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create_branch(&self, name: &str) -> Result<()> {
        run_git(&self.path, &["branch", name])?;
        Ok(())
    }

    pub fn checkout(&self, name: &str) -> Result<()> {
        run_git(&self.path, &["checkout", name])?;
        Ok(())
    }

    pub fn current_branch(&self) -> Result<String> {
        run_git(&self.path, &["symbolic-ref", "--short", "HEAD"])
    }

    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        run_git(&self.path, &["rev-parse", rev])
    }

    /// Modifies a tracked file.
    pub fn make_dirty(&self) -> Result<()> {
        std::fs::write(self.path.join("README.md"), "# Modified\n")?;
        Ok(())
    }

    pub fn make_untracked(&self) -> Result<()> {
        std::fs::write(self.path.join("untracked.txt"), "untracked content\n")?;
        Ok(())
    }

    /// Commits a nested repository `sub` as a gitlink, then moves its HEAD so
    /// that status reports ` M sub` while `git stash` has nothing to save.
    pub fn make_submodule_change(&self) -> Result<()> {
        let sub = self.path.join("sub");
        std::fs::create_dir(&sub)?;
        init_repo(&sub, "master")?;
        run_git(&self.path, &["add", "sub"])?;
        run_git(&self.path, &["commit", "-m", "Add sub"])?;

        std::fs::write(sub.join("sub.txt"), "moved\n")?;
        run_git(&sub, &["add", "sub.txt"])?;
        run_git(&sub, &["commit", "-m", "Move sub"])?;
        Ok(())
    }

    pub fn read_file(&self, name: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.path.join(name))?)
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.path.join(name).exists()
    }

    pub fn stash_count(&self) -> Result<usize> {
        let output = run_git(&self.path, &["stash", "list"])?;
        Ok(output.lines().filter(|line| !line.trim().is_empty()).count())
    }

    /// Points origin somewhere that does not exist.
    pub fn break_remote(&self) -> Result<()> {
        run_git(&self.path, &["remote", "set-url", "origin", "/nonexistent/remote"])?;
        Ok(())
    }

    /// Commits `file` to the remote's tracked branch from a separate clone.
    /// Returns the new commit id.
    pub fn push_upstream_commit(&self, file: &str) -> Result<String> {
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("repository has no remote"))?;
        let scratch = TempDir::new()?;
        let remote_url = remote.path().to_string_lossy();
        run_git(scratch.path(), &["clone", "-b", &self.branch, &remote_url, "work"])?;

        let work = scratch.path().join("work");
        configure_identity(&work)?;
        std::fs::write(work.join(file), "upstream change\n")?;
        run_git(&work, &["add", file])?;
        run_git(&work, &["commit", "-m", "Upstream commit"])?;
        run_git(&work, &["push", "origin", &self.branch])?;
        run_git(&work, &["rev-parse", "HEAD"])
    }
}

/// Creates `name` repositories with remotes inside `workspace`.
/// The returned directories hold the remotes and must outlive the test.
pub fn setup_workspace_with_repos(
    workspace: &TempDir,
    repos: &[(&str, &str)],
) -> Result<Vec<TempDir>> {
    let mut remotes = Vec::new();
    for (name, branch) in repos {
        let path = workspace.path().join(name);
        std::fs::create_dir_all(&path)?;
        init_repo(&path, branch)?;
        let remote = TempDir::new()?;
        attach_remote(&path, remote.path(), branch)?;
        remotes.push(remote);
    }
    Ok(remotes)
}
