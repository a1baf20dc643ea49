//! Shared helpers for integration tests.

#![allow(dead_code)]

use build_notify::action::{ReleaseStatus, StageEngine, StageRequest};
use build_notify::capture::StageLog;
use build_notify::error::{ActionError, GitError, Result};
use build_notify::target::{BuildTarget, Distribution};
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;

/// Run git in `dir` with a fixed identity and no signing
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.name=Builder",
            "-c",
            "user.email=builder@example.org",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Empty commit with `message`, returns its hash
pub fn commit(dir: &Path, message: &str) -> String {
    git(dir, &["commit", "--allow-empty", "-q", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

/// Annotated tag on HEAD
pub fn tag(dir: &Path, name: &str) {
    git(dir, &["tag", "-a", name, "-m", name]);
}

/// Repository with commits tagged `v1.0` and `v1.1`, returns the head commit
pub fn tagged_repo(dir: &Path) -> String {
    git(dir, &["init", "-q"]);
    commit(dir, "Initial import");
    tag(dir, "v1.0");
    commit(dir, "Update translations");
    tag(dir, "v1.1");
    git(dir, &["rev-parse", "HEAD"])
}

/// What the scripted engine does for a stage group
#[derive(Debug, Clone)]
pub enum Script {
    /// Print lines and succeed
    Succeed(Vec<String>),
    /// Print lines and fail with a pipeline failure
    Fail(Vec<String>, String),
    /// Fail with a non-pipeline error
    Crash,
    /// Never finish
    Hang,
}

/// Engine replaying a script, selected by whether a stage group fetches, builds or uploads
#[derive(Debug)]
pub struct ScriptedEngine {
    pub fetch: Script,
    pub build: Script,
    pub upload: Script,
    pub status: ReleaseStatus,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn succeeding() -> Self {
        Self {
            fetch: Script::Succeed(vec!["fetched".to_string()]),
            build: Script::Succeed(vec!["compiling".to_string(), "done".to_string()]),
            upload: Script::Succeed(vec!["uploaded".to_string()]),
            status: ReleaseStatus::NotReleased { tagged: true },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_build(mut self, script: Script) -> Self {
        self.build = script;
        self
    }

    pub fn with_upload(mut self, script: Script) -> Self {
        self.upload = script;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl StageEngine for ScriptedEngine {
    async fn run_stages(&self, request: &StageRequest<'_>, log: &mut StageLog<'_>) -> Result<()> {
        let stages = request.stages.join(" ");
        self.calls.lock().unwrap().push(stages.clone());
        let script = if request.stages.contains(&"fetch") {
            &self.fetch
        } else if request.stages.contains(&"build") {
            &self.build
        } else {
            &self.upload
        };
        match script {
            Script::Succeed(lines) => {
                for line in lines {
                    log.info(line);
                }
                Ok(())
            }
            Script::Fail(lines, message) => {
                for line in lines {
                    log.info(line);
                }
                Err(ActionError::PipelineFailure {
                    message: message.clone(),
                    log: None,
                    tail: None,
                }
                .into())
            }
            Script::Crash => Err(GitError::CommandFailed {
                command: "describe".to_string(),
                reason: "broken".to_string(),
            }
            .into()),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn release_status(&self, _target: &BuildTarget, _dist: &Distribution) -> Result<ReleaseStatus> {
        Ok(self.status)
    }
}
