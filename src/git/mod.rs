//! Read-only version control queries through the git command line.

mod changelog;

pub use changelog::{ChangelogExtractor, PackageChanges, component_git_url};

use crate::error::{GitError, Result};
use std::path::{Path, PathBuf};

/// A git working tree queried with `git -C <path>`
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
}

impl GitRepository {
    /// Open the working tree at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Working tree path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let output = tokio::process::Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(args)
            .output()
            .await
            .map_err(|e| GitError::CommandFailed {
                command: args.join(" "),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not a git repository") {
                return Err(GitError::NotRepository {
                    path: self.path.clone(),
                }
                .into());
            }
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                reason: stderr.trim().to_string(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Run git, mapping a failed or empty answer to `None`
    pub async fn query(&self, args: &[&str]) -> Option<String> {
        match self.run(args).await {
            Ok(out) if !out.trim().is_empty() => Some(out),
            Ok(_) => None,
            Err(e) => {
                log::debug!("{}", e);
                None
            }
        }
    }

    /// Full hash of HEAD
    pub async fn current_commit(&self) -> Result<String> {
        self.run(&["log", "-n", "1", "--pretty=format:%H"]).await
    }

    /// Nearest `v*` tag of HEAD, or its abbreviated hash
    pub async fn describe_head(&self) -> Result<String> {
        let out = self.run(&["describe", "--match", "v*", "--always"]).await?;
        first_line(&out).ok_or_else(|| {
            GitError::CommandFailed {
                command: "describe --match v* --always".to_string(),
                reason: "No version tags found".to_string(),
            }
            .into()
        })
    }

    /// `v*` tag pointing exactly at `commit`
    pub async fn exact_tag(&self, commit: &str) -> Option<String> {
        self.query(&["describe", "--match", "v*", "--exact-match", commit])
            .await
            .and_then(|out| first_line(&out))
    }

    /// Most recent `v*` tag reachable from `rev`
    pub async fn previous_tag(&self, rev: &str) -> Option<String> {
        self.query(&["describe", "--match", "v*", "--abbrev=0", rev])
            .await
            .and_then(|out| first_line(&out))
    }

    /// A root commit reachable from `rev`
    pub async fn root_commit(&self, rev: &str) -> Option<String> {
        self.query(&["rev-list", "--max-parents=0", rev])
            .await
            .and_then(|out| first_line(&out))
    }

    /// Full log of `from..to`
    pub async fn log_range(&self, from: &str, to: &str) -> Result<String> {
        self.run(&["log", &format!("{}..{}", from, to)]).await
    }

    /// Log of `from..to` rendered with a custom pretty format
    pub async fn log_formatted(&self, format: &str, from: &str, to: &str) -> Result<String> {
        self.run(&[
            "log",
            &format!("--pretty=format:{}", format),
            &format!("{}..{}", from, to),
        ])
        .await
    }
}

fn first_line(out: &str) -> Option<String> {
    out.lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}
