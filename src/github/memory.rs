//! In-memory tracker.

use super::{Issue, IssueTracker, RepoRef};
use crate::error::{Result, TrackerError};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Issue stored by [`MemoryTracker`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryIssue {
    /// Issue number
    pub number: u64,
    /// Title
    pub title: String,
    /// Body
    pub body: String,
    /// Current labels
    pub labels: BTreeSet<String>,
    /// Comments in posting order
    pub comments: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    issues: Vec<MemoryIssue>,
    fail_writes: bool,
}

/// Tracker keeping issues in memory
///
/// Clones share the same issues, so a handle kept aside observes everything
/// done through another clone.
#[derive(Debug, Clone)]
pub struct MemoryTracker {
    repo: RepoRef,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTracker {
    /// Empty tracker for `repo`
    pub fn new(repo: RepoRef) -> Self {
        Self {
            repo,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Pre-existing issue, returns its number
    pub fn insert_issue(&self, number: u64, title: &str) -> u64 {
        self.lock().issues.push(MemoryIssue {
            number,
            title: title.to_string(),
            ..Default::default()
        });
        number
    }

    /// Make every write fail with a server error
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Snapshot of all issues
    pub fn issues(&self) -> Vec<MemoryIssue> {
        self.lock().issues.clone()
    }

    /// Snapshot of one issue
    pub fn issue(&self, number: u64) -> Option<MemoryIssue> {
        self.lock()
            .issues
            .iter()
            .find(|issue| issue.number == number)
            .cloned()
    }

    /// Snapshot of the issue with `title`
    pub fn issue_by_title(&self, title: &str) -> Option<MemoryIssue> {
        self.lock()
            .issues
            .iter()
            .find(|issue| issue.title == title)
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write<T>(
        &self,
        operation: &str,
        number: u64,
        f: impl FnOnce(&mut MemoryIssue) -> T,
    ) -> Result<T> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(TrackerError::Status {
                operation: operation.to_string(),
                status: 500,
                body: "injected failure".to_string(),
            }
            .into());
        }
        let issue = inner
            .issues
            .iter_mut()
            .find(|issue| issue.number == number)
            .ok_or_else(|| TrackerError::IssueNotFound {
                repo: self.repo.to_string(),
                number,
            })?;
        Ok(f(issue))
    }
}

impl IssueTracker for MemoryTracker {
    fn repository(&self) -> &RepoRef {
        &self.repo
    }

    async fn find_issue_by_title(&self, title: &str) -> Result<Option<Issue>> {
        Ok(self.issue_by_title(title).map(|issue| Issue {
            number: issue.number,
            title: issue.title,
        }))
    }

    async fn create_issue(&self, title: &str, body: &str) -> Result<Issue> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(TrackerError::Status {
                operation: "create issue".to_string(),
                status: 500,
                body: "injected failure".to_string(),
            }
            .into());
        }
        let number = inner.issues.iter().map(|issue| issue.number).max().unwrap_or(0) + 1;
        inner.issues.push(MemoryIssue {
            number,
            title: title.to_string(),
            body: body.to_string(),
            ..Default::default()
        });
        Ok(Issue {
            number,
            title: title.to_string(),
        })
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        self.write("add labels", number, |issue| {
            issue.labels.extend(labels.iter().cloned());
        })
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<()> {
        self.write("remove label", number, |issue| {
            issue.labels.remove(label);
        })
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<()> {
        self.write("create comment", number, |issue| {
            issue.comments.push(body.to_string());
        })
    }
}
