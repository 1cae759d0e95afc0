//! Scripted in-memory git used by unit tests.

use crate::git::{GitOutput, GitRunner, format_command};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct Rule {
    path: Option<PathBuf>,
    args: String,
    response: Response,
    remaining: Option<usize>,
}

#[derive(Clone)]
enum Response {
    Exit(i32, String),
    SpawnError,
    TimedOut,
}

/// Answers git invocations from a list of rules and records every call.
///
/// Later rules win over earlier ones. Unmatched commands succeed with empty
/// output, except the work-tree probe (`true`), the branch lookup
/// (`master`) and the stash head lookup, which sees a new entry after every
/// `stash` call and an empty list before the first one.
#[derive(Default)]
pub(crate) struct ScriptedGit {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(PathBuf, String)>>,
}

impl ScriptedGit {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(self, path: Option<&Path>, args: &str, response: Response, times: Option<usize>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            path: path.map(Path::to_path_buf),
            args: args.to_string(),
            response,
            remaining: times,
        });
        self
    }

    pub(crate) fn on(self, args: &str, code: i32, output: &str) -> Self {
        self.push(None, args, Response::Exit(code, output.to_string()), None)
    }

    /// Like [`ScriptedGit::on`] but only for the first `times` matching calls.
    pub(crate) fn on_times(self, args: &str, code: i32, output: &str, times: usize) -> Self {
        self.push(None, args, Response::Exit(code, output.to_string()), Some(times))
    }

    pub(crate) fn on_path(self, path: &Path, args: &str, code: i32, output: &str) -> Self {
        self.push(Some(path), args, Response::Exit(code, output.to_string()), None)
    }

    pub(crate) fn spawn_error(self, args: &str) -> Self {
        self.push(None, args, Response::SpawnError, None)
    }

    pub(crate) fn spawn_error_at(self, path: &Path, args: &str) -> Self {
        self.push(Some(path), args, Response::SpawnError, None)
    }

    pub(crate) fn timeout(self, args: &str) -> Self {
        self.push(None, args, Response::TimedOut, None)
    }

    /// Every call as its joined argument list, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub(crate) fn calls_for(&self, path: &Path) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub(crate) fn count(&self, args: &str) -> usize {
        self.calls().iter().filter(|call| *call == args).count()
    }

    fn respond(&self, repo: &Path, args: &str) -> Response {
        let mut rules = self.rules.lock().unwrap();
        let matched = rules.iter_mut().rev().find(|rule| {
            rule.args == args
                && rule.path.as_deref().is_none_or(|p| p == repo)
                && rule.remaining != Some(0)
        });
        if let Some(rule) = matched {
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            return rule.response.clone();
        }
        match args {
            "rev-parse --is-inside-work-tree" => Response::Exit(0, "true".to_string()),
            "symbolic-ref --short HEAD" => Response::Exit(0, "master".to_string()),
            "rev-parse --quiet --verify refs/stash" => {
                let stashes = self
                    .calls
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|(p, call)| p == repo && call == "stash")
                    .count();
                if stashes == 0 {
                    Response::Exit(1, String::new())
                } else {
                    Response::Exit(0, format!("stash-{stashes}"))
                }
            }
            _ => Response::Exit(0, String::new()),
        }
    }
}

impl GitRunner for ScriptedGit {
    fn run(&self, repo: &Path, args: &[&str]) -> anyhow::Result<GitOutput> {
        let joined = args.join(" ");
        self.calls
            .lock()
            .unwrap()
            .push((repo.to_path_buf(), joined.clone()));
        let command = format_command("git", repo, args);
        match self.respond(repo, &joined) {
            Response::Exit(code, output) => Ok(GitOutput {
                command,
                output,
                exit_code: Some(code),
                timed_out: false,
            }),
            Response::TimedOut => Ok(GitOutput {
                command,
                output: String::new(),
                exit_code: None,
                timed_out: true,
            }),
            Response::SpawnError => anyhow::bail!("Failed to spawn git command: {command}"),
        }
    }
}
