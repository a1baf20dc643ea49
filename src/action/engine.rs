//! Build engine seam and its subprocess implementation.

use crate::capture::StageLog;
use crate::error::{ActionError, CliError, ConfigError, Result};
use crate::target::{BuildTarget, Distribution, RepositoryChannel, TargetKind};
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Stages run for a fresh build, before its upload group
pub const BUILD_STAGES: [&str; 4] = ["prep", "build", "sign", "publish"];

/// Stages run to fetch sources
pub const FETCH_STAGES: [&str; 1] = ["fetch"];

/// Stages run to move an artifact to another channel
pub const UPLOAD_STAGES: [&str; 1] = ["upload"];

/// Stages run for an installer image, before its upload group
pub const ISO_STAGES: [&str; 4] = ["init-cache", "prep", "build", "sign"];

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*status:\s*(.+?)\s*$").expect("status regex is valid")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*tag:\s*(.+?)\s*$").expect("tag regex is valid"));

/// One group of stages for one target
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    /// Target being built
    pub target: &'a BuildTarget,
    /// Distributions the stages run for
    pub dists: &'a [Distribution],
    /// Stage names, in order
    pub stages: &'a [&'a str],
    /// Repository channel uploads go to
    pub channel: Option<&'a RepositoryChannel>,
}

impl<'a> StageRequest<'a> {
    /// Request without a channel
    pub fn new(target: &'a BuildTarget, dists: &'a [Distribution], stages: &'a [&'a str]) -> Self {
        Self {
            target,
            dists,
            stages,
            channel: None,
        }
    }

    /// Set the upload channel
    pub fn with_channel(mut self, channel: &'a RepositoryChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Header lines written at the top of the stage log
    pub fn head_info(&self) -> Vec<String> {
        let dists: Vec<String> = self.dists.iter().map(Distribution::fullname).collect();
        let mut lines = vec![
            format!("Target: {}", self.target),
            format!("Distributions: {}", dists.join(" ")),
            format!("Stages: {}", self.stages.join(" ")),
        ];
        if let Some(channel) = self.channel {
            lines.push(format!("Repository: {}", channel));
        }
        lines
    }
}

/// Publication state of a component on one distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    /// Not yet built for the current version
    NotReleased {
        /// Whether the source head carries a version tag
        tagged: bool,
    },
    /// Current version already published
    Released,
    /// Component is not built for the distribution
    NotApplicable,
}

impl ReleaseStatus {
    /// Parse the engine's release status report
    ///
    /// ```text
    /// core-qrexec:
    ///   host-fc37:
    ///     status: not released
    ///     tag: v4.2.18
    /// ```
    pub fn parse(output: &str) -> Self {
        let status = STATUS_RE
            .captures(output)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_ascii_lowercase());
        match status.as_deref() {
            Some("released") => ReleaseStatus::Released,
            Some("not released") => {
                let tagged = TAG_RE
                    .captures(output)
                    .and_then(|caps| caps.get(1))
                    .is_some_and(|tag| tag.as_str() != "no version tag");
                ReleaseStatus::NotReleased { tagged }
            }
            _ => ReleaseStatus::NotApplicable,
        }
    }

    /// Whether a build should run
    pub fn needs_build(&self) -> bool {
        matches!(self, ReleaseStatus::NotReleased { tagged: true })
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseStatus::NotReleased { tagged: true } => f.write_str("not released"),
            ReleaseStatus::NotReleased { tagged: false } => {
                f.write_str("not released, no version tag")
            }
            ReleaseStatus::Released => f.write_str("released"),
            ReleaseStatus::NotApplicable => f.write_str("not applicable"),
        }
    }
}

/// The external build engine
///
/// `run_stages` resolves to [`ActionError::PipelineFailure`] when a stage
/// fails. Every output line goes to `log`.
pub trait StageEngine {
    /// Run a group of stages
    fn run_stages(
        &self,
        request: &StageRequest<'_>,
        log: &mut StageLog<'_>,
    ) -> impl Future<Output = Result<()>>;

    /// Release status of a component on one distribution
    fn release_status(
        &self,
        target: &BuildTarget,
        dist: &Distribution,
    ) -> impl Future<Output = Result<ReleaseStatus>>;
}

/// Runs stages through the engine command line
#[derive(Debug, Clone)]
pub struct CommandStageEngine {
    command: Vec<String>,
    status_command: Vec<String>,
}

impl CommandStageEngine {
    /// Engine using `command` for stages and `status_command` for status queries
    pub fn new(command: Vec<String>, status_command: Vec<String>) -> Self {
        Self {
            command,
            status_command,
        }
    }

    /// Engine arguments for a stage group
    pub fn stage_args(request: &StageRequest<'_>) -> Vec<String> {
        let mut args = Vec::new();
        let (subcommand, publish_key) = match &request.target.kind {
            TargetKind::Component { name } => {
                args.extend(["-c".to_string(), name.clone()]);
                for dist in request.dists {
                    args.extend(["-d".to_string(), dist.fullname()]);
                }
                ("package", "components")
            }
            TargetKind::Template { name, .. } => {
                args.extend(["-t".to_string(), name.clone()]);
                ("template", "templates")
            }
            TargetKind::Iso { version } => {
                args.extend(["-o".to_string(), format!("iso:version={}", version)]);
                ("installer", "iso")
            }
        };
        if let Some(channel) = request.channel {
            args.extend([
                "-o".to_string(),
                format!("repository-publish:{}={}", publish_key, channel.normalized()),
            ]);
        }
        args.push(subcommand.to_string());
        args.extend(request.stages.iter().map(|s| s.to_string()));
        args
    }

    fn split(command: &[String]) -> Result<(&String, &[String])> {
        command.split_first().ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "engine.command".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into()
        })
    }
}

impl StageEngine for CommandStageEngine {
    async fn run_stages(&self, request: &StageRequest<'_>, log: &mut StageLog<'_>) -> Result<()> {
        let (program, base) = Self::split(&self.command)?;
        let args = Self::stage_args(request);
        let display = format!("{} {}", program, args.join(" "));
        log::debug!("Running {}", display);

        let mut child = Command::new(program)
            .args(base)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CliError::ExecutionFailed {
                command: display.clone(),
                reason: e.to_string(),
            })?;

        let mut stdout = child.stdout.take().map(|out| BufReader::new(out).lines());
        let mut stderr = child.stderr.take().map(|err| BufReader::new(err).lines());

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                line = async { stdout.as_mut()?.next_line().await.ok().flatten() }, if stdout.is_some() => {
                    match line {
                        Some(line) => log.info(&line),
                        None => stdout = None,
                    }
                }
                line = async { stderr.as_mut()?.next_line().await.ok().flatten() }, if stderr.is_some() => {
                    match line {
                        Some(line) => log.info(&line),
                        None => stderr = None,
                    }
                }
            }
        }

        let status = child.wait().await.map_err(|e| CliError::ExecutionFailed {
            command: display.clone(),
            reason: e.to_string(),
        })?;
        if !status.success() {
            return Err(ActionError::PipelineFailure {
                message: format!(
                    "Failed to run '{}' stages for {}",
                    request.stages.join(" "),
                    request.target.name()
                ),
                log: None,
                tail: None,
            }
            .into());
        }
        Ok(())
    }

    async fn release_status(&self, target: &BuildTarget, dist: &Distribution) -> Result<ReleaseStatus> {
        let TargetKind::Component { name } = &target.kind else {
            return Ok(ReleaseStatus::NotApplicable);
        };
        let (program, base) = Self::split(&self.status_command)?;
        let fullname = dist.fullname();
        let args = [
            "-c",
            name.as_str(),
            "-d",
            fullname.as_str(),
            "repository",
            "check-release-status-for-component",
        ];
        let output = Command::new(program)
            .args(base)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CliError::ExecutionFailed {
                command: format!("{} {}", program, args.join(" ")),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(CliError::ExecutionFailed {
                command: format!("{} {}", program, args.join(" ")),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(ReleaseStatus::parse(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{LogSink, TailBuffer};

    fn dists() -> Vec<Distribution> {
        vec!["host-fc37".parse().unwrap(), "vm-bookworm".parse().unwrap()]
    }

    #[test]
    fn test_parse_release_status() {
        assert_eq!(
            ReleaseStatus::parse("core-qrexec:\n  host-fc37:\n    status: not released\n    tag: v4.2.18\n"),
            ReleaseStatus::NotReleased { tagged: true }
        );
        assert_eq!(
            ReleaseStatus::parse("status: not released\ntag: no version tag\n"),
            ReleaseStatus::NotReleased { tagged: false }
        );
        assert_eq!(ReleaseStatus::parse("status: released\n"), ReleaseStatus::Released);
        assert_eq!(ReleaseStatus::parse(""), ReleaseStatus::NotApplicable);
        assert!(!ReleaseStatus::Released.needs_build());
    }

    #[test]
    fn test_component_stage_args() {
        let target = BuildTarget::component("r4.2", "core-qrexec", "/src");
        let dists = dists();
        let channel = RepositoryChannel::Stable;
        let request = StageRequest::new(&target, &dists, &UPLOAD_STAGES).with_channel(&channel);
        assert_eq!(
            CommandStageEngine::stage_args(&request),
            vec![
                "-c",
                "core-qrexec",
                "-d",
                "host-fc37",
                "-d",
                "vm-bookworm",
                "-o",
                "repository-publish:components=current",
                "package",
                "upload"
            ]
        );
    }

    #[test]
    fn test_template_and_iso_stage_args() {
        let dist: Distribution = "vm-fc42".parse().unwrap();
        let template = BuildTarget::template("r4.2", "fedora-42-xfce", dist.clone(), "202401011200", "/src");
        let dists = [dist];
        let args = CommandStageEngine::stage_args(&StageRequest::new(&template, &dists, &["prep"]));
        assert_eq!(args, vec!["-t", "fedora-42-xfce", "template", "prep"]);

        let iso = BuildTarget::iso("r4.2", "4.2.20240101", "/src");
        let args = CommandStageEngine::stage_args(&StageRequest::new(&iso, &[], &["build"]));
        assert_eq!(args, vec!["-o", "iso:version=4.2.20240101", "installer", "build"]);
    }

    #[test]
    fn test_head_info() {
        let target = BuildTarget::component("r4.2", "core-qrexec", "/src");
        let dists = dists();
        let channel = RepositoryChannel::CurrentTesting;
        let head = StageRequest::new(&target, &dists, &BUILD_STAGES)
            .with_channel(&channel)
            .head_info();
        assert_eq!(head[0], "Target: component core-qrexec (r4.2)");
        assert_eq!(head[1], "Distributions: host-fc37 vm-bookworm");
        assert_eq!(head[3], "Repository: current-testing");
    }

    #[tokio::test]
    async fn test_command_engine_streams_output() {
        let engine = CommandStageEngine::new(
            vec!["sh".to_string(), "-c".to_string(), "echo out; echo err >&2".to_string(), "sh".to_string()],
            vec!["true".to_string()],
        );
        let target = BuildTarget::component("r4.2", "core-qrexec", "/src");
        let dists = dists();
        let mut tail = TailBuffer::new(10);
        {
            let mut log = StageLog::with(vec![&mut tail as &mut dyn LogSink]);
            engine
                .run_stages(&StageRequest::new(&target, &dists, &FETCH_STAGES), &mut log)
                .await
                .unwrap();
        }
        let mut lines: Vec<&str> = tail.lines().collect();
        lines.sort();
        assert_eq!(lines, vec!["err", "out"]);
    }

    #[tokio::test]
    async fn test_command_engine_failure_is_pipeline_failure() {
        let engine = CommandStageEngine::new(
            vec!["sh".to_string(), "-c".to_string(), "echo boom; exit 3".to_string(), "sh".to_string()],
            vec!["true".to_string()],
        );
        let target = BuildTarget::component("r4.2", "core-qrexec", "/src");
        let dists = dists();
        let mut tail = TailBuffer::new(10);
        let mut log = StageLog::with(vec![&mut tail as &mut dyn LogSink]);
        let err = engine
            .run_stages(&StageRequest::new(&target, &dists, &BUILD_STAGES), &mut log)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::NotifyError::Action(ActionError::PipelineFailure { .. })
        ));
    }
}
