//! GitHub REST API tracker.

use super::retry::{RetryConfig, retry_with_backoff};
use super::{Issue, IssueTracker, RepoRef};
use crate::error::{Result, TrackerError};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use url::Url;

/// Default API endpoint
pub const GITHUB_API_BASE: &str = "https://api.github.com";

const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

/// Tracker bound to one GitHub repository
#[derive(Debug, Clone)]
pub struct GitHubTracker {
    http: reqwest::Client,
    api_base: Url,
    repo: RepoRef,
    retry: RetryConfig,
}

impl GitHubTracker {
    /// Create a tracker for `repo` authenticating with `token`
    pub fn new(api_base: &str, token: &str, repo: RepoRef, retry: RetryConfig) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(TrackerError::MissingToken.into());
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(concat!(
                "build_notify/",
                env!("CARGO_PKG_VERSION")
            )),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|e| TrackerError::Transport {
                operation: "configure client".to_string(),
                reason: format!("invalid authorization header: {}", e),
                retryable: false,
            })?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TrackerError::Transport {
                operation: "configure client".to_string(),
                reason: e.to_string(),
                retryable: false,
            })?;

        let api_base = Url::parse(api_base).map_err(|e| TrackerError::Transport {
            operation: "configure client".to_string(),
            reason: format!("invalid API base '{}': {}", api_base, e),
            retryable: false,
        })?;

        Ok(Self {
            http,
            api_base,
            repo,
            retry,
        })
    }

    /// Endpoint under `/repos/{owner}/{name}/issues`, each segment percent-encoded
    fn issues_url(&self, segments: &[&str]) -> std::result::Result<Url, TrackerError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| TrackerError::Transport {
                operation: "build url".to_string(),
                reason: format!("API base '{}' cannot carry a path", self.api_base),
                retryable: false,
            })?
            .pop_if_empty()
            .extend(["repos", self.repo.owner.as_str(), self.repo.name.as_str(), "issues"])
            .extend(segments);
        Ok(url)
    }

    /// Send a request built by `build`, retrying transient failures
    async fn send<F>(
        &self,
        operation: &str,
        build: F,
    ) -> std::result::Result<reqwest::Response, TrackerError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let build = &build;
        retry_with_backoff(
            move || async move {
                let response = build().send().await.map_err(|e| TrackerError::Transport {
                    operation: operation.to_string(),
                    reason: e.to_string(),
                    retryable: e.is_timeout() || e.is_connect() || e.is_request(),
                })?;
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                let body = response.text().await.unwrap_or_default();
                Err(TrackerError::Status {
                    operation: operation.to_string(),
                    status: status.as_u16(),
                    body: truncate(&body, 800),
                })
            },
            &self.retry,
            operation,
        )
        .await
    }

    async fn send_json<T, F>(&self, operation: &str, build: F) -> std::result::Result<T, TrackerError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let response = self.send(operation, build).await?;
        response.json::<T>().await.map_err(|e| TrackerError::Decode {
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }
}

impl IssueTracker for GitHubTracker {
    fn repository(&self) -> &RepoRef {
        &self.repo
    }

    async fn find_issue_by_title(&self, title: &str) -> Result<Option<Issue>> {
        let url = self.issues_url(&[])?;
        let mut page = 1_u32;
        loop {
            let page_str = page.to_string();
            let chunk: Vec<ApiIssue> = self
                .send_json("list issues", || {
                    self.http.get(url.clone()).query(&[
                        ("state", "open"),
                        ("per_page", "100"),
                        ("page", page_str.as_str()),
                    ])
                })
                .await?;
            let chunk_len = chunk.len();
            if let Some(found) = chunk
                .into_iter()
                .filter(|issue| issue.pull_request.is_none())
                .find(|issue| issue.title == title)
            {
                return Ok(Some(Issue {
                    number: found.number,
                    title: found.title,
                }));
            }
            if chunk_len < PAGE_SIZE {
                return Ok(None);
            }
            page = page.saturating_add(1);
        }
    }

    async fn create_issue(&self, title: &str, body: &str) -> Result<Issue> {
        let url = self.issues_url(&[])?;
        let payload = json!({ "title": title, "body": body });
        let created: ApiIssue = self
            .send_json("create issue", || self.http.post(url.clone()).json(&payload))
            .await?;
        log::info!("Created issue #{} '{}' in {}", created.number, title, self.repo);
        Ok(Issue {
            number: created.number,
            title: created.title,
        })
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = self.issues_url(&[&number.to_string(), "labels"])?;
        let payload = json!({ "labels": labels });
        self.send("add labels", || self.http.post(url.clone()).json(&payload))
            .await?;
        Ok(())
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<()> {
        let url = self.issues_url(&[&number.to_string(), "labels", label])?;
        match self.send("remove label", || self.http.delete(url.clone())).await {
            Ok(_) => Ok(()),
            Err(TrackerError::Status { status: 404, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<()> {
        let url = self.issues_url(&[&number.to_string(), "comments"])?;
        let payload = json!({ "body": body });
        self.send("create comment", || self.http.post(url.clone()).json(&payload))
            .await?;
        Ok(())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn tracker(server: &MockServer, retry: RetryConfig) -> GitHubTracker {
        GitHubTracker::new(
            &server.base_url(),
            "token",
            "owner/repo".parse().unwrap(),
            retry,
        )
        .unwrap()
    }

    #[test]
    fn test_requires_token() {
        let err = GitHubTracker::new(
            GITHUB_API_BASE,
            "  ",
            "owner/repo".parse().unwrap(),
            RetryConfig::none(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("No API token"));
    }

    #[tokio::test]
    async fn test_find_issue_skips_pull_requests() {
        let server = MockServer::start_async().await;
        let list = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/repos/owner/repo/issues")
                    .query_param("state", "open")
                    .header("authorization", "Bearer token");
                then.status(200).json_body(serde_json::json!([
                    {"number": 1, "title": "core-qrexec v4.2.6 (r4.2)", "pull_request": {}},
                    {"number": 2, "title": "core-qrexec v4.2.6 (r4.2)"}
                ]));
            })
            .await;

        let found = tracker(&server, RetryConfig::none())
            .find_issue_by_title("core-qrexec v4.2.6 (r4.2)")
            .await
            .unwrap();
        list.assert_async().await;
        assert_eq!(found.map(|issue| issue.number), Some(2));
    }

    #[tokio::test]
    async fn test_remove_absent_label_is_ok() {
        let server = MockServer::start_async().await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/repos/owner/repo/issues/7/labels/r4.2-vm-fc42-failed");
                then.status(404).body("{\"message\":\"Label does not exist\"}");
            })
            .await;

        tracker(&server, RetryConfig::none())
            .remove_label(7, "r4.2-vm-fc42-failed")
            .await
            .unwrap();
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_comment_retries_server_errors() {
        let server = MockServer::start_async().await;
        let failing = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/repos/owner/repo/issues/7/comments")
                    .body_contains("was built");
                then.status(502);
            })
            .await;

        let retry = RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        };
        let result = tracker(&server, retry)
            .create_comment(7, "Package for host was built.")
            .await;
        assert!(result.is_err());
        assert_eq!(failing.hits_async().await, 3);
    }

    #[tokio::test]
    async fn test_create_issue() {
        let server = MockServer::start_async().await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/repos/owner/repo/issues")
                    .json_body(serde_json::json!({"title": "t", "body": "b"}));
                then.status(201)
                    .json_body(serde_json::json!({"number": 42, "title": "t"}));
            })
            .await;

        let issue = tracker(&server, RetryConfig::none())
            .create_issue("t", "b")
            .await
            .unwrap();
        create.assert_async().await;
        assert_eq!(issue.number, 42);
    }
}
