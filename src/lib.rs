//! Git repository updater library.
//!
//! This crate keeps the primary branch of one or many git repositories up
//! to date without disturbing the user's work:
//! - Detecting whether a directory is a repository or a folder of them
//! - Fetching with prune
//! - Stashing uncommitted tracked changes
//! - Checking out and pulling the primary branch
//! - Restoring the original branch and stash

pub mod config;
pub mod constants;
pub mod crawl;
pub mod git;
pub mod logging;
pub mod output;
pub mod repo;

#[cfg(test)]
mod testing;
