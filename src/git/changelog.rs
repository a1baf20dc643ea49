//! Version and changelog extraction from git history.

use super::GitRepository;
use crate::error::{ConfigError, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Versions and commit summary between the previous and current release of a component
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageChanges {
    /// Current version (nearest `v*` tag or short hash)
    pub version: String,
    /// Previous version (tag, commit or root commit)
    pub previous_version: String,
    /// One `{owner/repo}@{short hash} {subject}` line per commit
    pub shortlog: String,
    /// Issue numbers referenced by commit messages, ascending
    pub referenced_issues: Vec<u64>,
}

impl PackageChanges {
    /// Referenced issues as `{issues_repo}#{n}` lines
    pub fn render_issues(&self, issues_repo: &str) -> String {
        self.referenced_issues
            .iter()
            .map(|n| format!("{}#{}", issues_repo, n))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Git URL of a component, overridable with `GIT_URL_<component>`
///
/// Dashes in the component name are replaced by underscores in the variable name.
pub fn component_git_url(component: &str, repo_prefix: &str) -> String {
    let var = format!("GIT_URL_{}", component.replace('-', "_"));
    match std::env::var(&var) {
        Ok(url) if !url.is_empty() => url,
        _ => format!("https://github.com/{}{}", repo_prefix, component),
    }
}

/// Derives versions, short logs and issue references for one source tree
#[derive(Debug, Clone)]
pub struct ChangelogExtractor {
    repo: GitRepository,
    git_url: String,
    issues_repo: String,
    issue_re: Regex,
    fixes_re: Regex,
}

impl ChangelogExtractor {
    /// Create an extractor for `source_dir`, published at `git_url`, cross-referencing `issues_repo`
    pub fn new(
        source_dir: impl Into<PathBuf>,
        git_url: impl Into<String>,
        issues_repo: &str,
    ) -> Result<Self> {
        let repo = regex::escape(issues_repo);
        let build = |pattern: String| {
            Regex::new(&pattern).map_err(|e| ConfigError::InvalidValue {
                key: "issues-repo".to_string(),
                reason: e.to_string(),
            })
        };
        Ok(Self {
            repo: GitRepository::new(source_dir),
            git_url: git_url.into().trim_end_matches('/').to_string(),
            issues_repo: issues_repo.to_string(),
            issue_re: build(format!(r"(?i){}(?:#|/issues/)([0-9]+)", repo))?,
            fixes_re: build(format!(
                r"(?i)\b(?:fixes|closes):? (?:https://github\.com/\S+/|{}#)([0-9]+)",
                repo
            ))?,
        })
    }

    /// Underlying repository
    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    /// Git URL the component is published at
    pub fn git_url(&self) -> &str {
        &self.git_url
    }

    /// Repository issue references point to
    pub fn issues_repo(&self) -> &str {
        &self.issues_repo
    }

    /// `owner/repo`, the last two segments of the git URL
    pub fn repo_slug(&self) -> String {
        let url = self.git_url.trim_end_matches(".git");
        let segments: Vec<&str> = url.rsplitn(3, '/').collect();
        match segments.as_slice() {
            [name, owner, ..] => format!("{}/{}", owner, name),
            _ => url.to_string(),
        }
    }

    /// Link comparing two revisions
    pub fn compare_url(&self, from: &str, to: &str) -> String {
        format!("{}/compare/{}...{}", self.git_url, from, to)
    }

    /// Resolve current and previous versions and summarize the commits between them
    ///
    /// With `previous_commit`, the previous version is the tag pointing exactly at it
    /// (or the commit itself). Without, it is the tag preceding the parent of HEAD,
    /// falling back to a root commit. A single-commit history yields identical versions
    /// and empty summaries.
    pub async fn package_changes(&self, previous_commit: Option<&str>) -> Result<PackageChanges> {
        let version = self.repo.describe_head().await?;
        let head = self.repo.current_commit().await?;
        let parent = format!("{}~", head);

        let previous = match previous_commit {
            Some(commit) => Some(
                self.repo
                    .exact_tag(commit)
                    .await
                    .unwrap_or_else(|| commit.to_string()),
            ),
            None => match self.repo.previous_tag(&parent).await {
                Some(tag) => Some(tag),
                None => self.repo.root_commit(&parent).await,
            },
        };

        let Some(previous_version) = previous else {
            return Ok(PackageChanges {
                previous_version: version.clone(),
                version,
                ..Default::default()
            });
        };

        let full_log = self.repo.log_range(&previous_version, &version).await?;
        let referenced_issues = self.scan(&self.issue_re, &full_log);
        let shortlog = self
            .repo
            .log_formatted(
                &format!("{}@%h %s", self.repo_slug()),
                &previous_version,
                &version,
            )
            .await?;

        Ok(PackageChanges {
            version,
            previous_version,
            shortlog,
            referenced_issues,
        })
    }

    /// Issues marked as fixed or closed by commits in `from..to`
    pub async fn closed_issues(&self, from: &str, to: &str) -> Result<Vec<u64>> {
        let full_log = self.repo.log_range(from, to).await?;
        Ok(self.scan(&self.fixes_re, &full_log))
    }

    /// Short log of `from..to`
    pub async fn shortlog(&self, from: &str, to: &str) -> Result<String> {
        self.repo
            .log_formatted(&format!("{}@%h %s", self.repo_slug()), from, to)
            .await
    }

    fn scan(&self, re: &Regex, text: &str) -> Vec<u64> {
        re.captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| m.as_str().parse::<u64>().ok())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
