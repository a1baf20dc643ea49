//! Issue tracker integration.
//!
//! [`IssueTracker`] is the seam between the notification logic and the remote
//! service. [`GitHubTracker`] talks to the GitHub REST API and
//! [`MemoryTracker`] keeps everything in memory.

mod client;
mod memory;
mod retry;

pub use client::GitHubTracker;
pub use memory::{MemoryIssue, MemoryTracker};
pub use retry::{RetryConfig, retry_with_backoff};

use crate::error::{Result, TrackerError};
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

/// Tracker issue as seen by the notification logic
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
    /// Issue number
    pub number: u64,
    /// Issue title
    pub title: String,
}

/// Operations needed on one tracker repository
pub trait IssueTracker {
    /// Repository this tracker is bound to, `owner/name`
    fn repository(&self) -> &RepoRef;

    /// Open issue with exactly this title
    fn find_issue_by_title(&self, title: &str) -> impl Future<Output = Result<Option<Issue>>>;

    /// Create an issue
    fn create_issue(&self, title: &str, body: &str) -> impl Future<Output = Result<Issue>>;

    /// Add labels to an issue
    fn add_labels(&self, number: u64, labels: &[String]) -> impl Future<Output = Result<()>>;

    /// Remove a label from an issue; removing an absent label succeeds
    fn remove_label(&self, number: u64, label: &str) -> impl Future<Output = Result<()>>;

    /// Comment on an issue
    fn create_comment(&self, number: u64, body: &str) -> impl Future<Output = Result<()>>;
}

/// `owner/name` repository reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    /// Owner or organization
    pub owner: String,
    /// Repository name
    pub name: String,
}

impl FromStr for RepoRef {
    type Err = TrackerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || TrackerError::InvalidRepository {
            repo: s.to_string(),
        };
        let (owner, name) = s.trim().split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
