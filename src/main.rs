use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use git_daily::config::{Config, Verbosity};
use git_daily::constants::{MASTER_BRANCH, RAYON_THREAD_COUNT, git_timeout};
use git_daily::crawl::{CrawlOutcome, Crawler};
use git_daily::git::{self, SystemGit};
use git_daily::logging;
use git_daily::output::{self, Console};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

/// Update the primary branch of every git repository in a directory,
/// leaving each one on its original branch with its changes intact.
#[derive(Parser, Debug)]
#[command(name = "git-daily", version, about)]
struct Args {
    /// A repository, or a directory whose children are repositories.
    /// Defaults to the current directory.
    path: Option<PathBuf>,

    /// Only print the final count and failures
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print every step and the output of every git command
    #[arg(short, long)]
    verbose: bool,

    /// Branch to keep up to date
    #[arg(short = 'b', long, default_value = MASTER_BRANCH)]
    primary_branch: String,

    /// Timeout for a single git command, in seconds [default: $GIT_DAILY_TIMEOUT or 30]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Stop pulling a repository after this many seconds and restore it
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    repo_timeout: Option<u64>,

    /// Number of repositories processed at once
    #[arg(short, long, default_value_t = RAYON_THREAD_COUNT)]
    jobs: usize,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            verbosity: Verbosity::from_flags(self.quiet, self.verbose),
            primary_branch: self.primary_branch.clone(),
            git_timeout: self
                .timeout
                .map(Duration::from_secs)
                .unwrap_or_else(git_timeout),
            repo_timeout: self.repo_timeout.map(Duration::from_secs),
            jobs: self.jobs,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = args.config();
    git::validate_branch_name(&config.primary_branch)?;

    let start = match &args.path {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to get path to working directory")?,
    };
    let start = start
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", start.display()))?;
    output::print_working_dir(&start, &config);

    let git = SystemGit::new(config.git_timeout);
    let console = Console::new(&config);
    let crawler = Crawler::new(&git, config.clone(), console)?;

    let started = Instant::now();
    match crawler.crawl(&start)? {
        CrawlOutcome::NoRepositories => output::print_no_repos(&config),
        outcome => output::print_summary(outcome.results(), started.elapsed(), &config),
    }
    Ok(())
}
