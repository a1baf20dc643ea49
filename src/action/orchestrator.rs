//! Drives stage groups for one target and reports every outcome.

use super::engine::{
    BUILD_STAGES, FETCH_STAGES, ISO_STAGES, ReleaseStatus, StageEngine, StageRequest,
    UPLOAD_STAGES,
};
use super::timestamp::{format_timestamp, parse_timestamp, read_build_timestamp, write_build_timestamp};
use crate::capture::{CaptureOutcome, LogLocator, LogSession, LogTransport};
use crate::error::{ActionError, ConfigError, NotifyError, Result};
use crate::git::GitRepository;
use crate::github::IssueTracker;
use crate::notify::{AdditionalInfo, NotificationClient, StatusReport};
use crate::openqa::OpenQaClient;
use crate::target::{BuildStatus, BuildTarget, Distribution, RepositoryChannel, StageKind, TargetKind};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Per-run settings of the orchestrator
#[derive(Debug, Clone)]
pub struct ActionSettings {
    /// Log actions instead of running stages and sending reports
    pub dry_run: bool,
    /// Deadline for the whole target
    pub timeout: Duration,
    /// Repository the log service stores logs in
    pub logs_repo: String,
    /// Base URL installer images are published under
    pub iso_base_url: Option<Url>,
}

impl ActionSettings {
    /// Settings with the given deadline and defaults otherwise
    pub fn new(timeout: Duration) -> Self {
        Self {
            dry_run: false,
            timeout,
            logs_repo: "QubesOS/build-logs".to_string(),
            iso_base_url: None,
        }
    }

    /// Parse and set the installer image base URL
    pub fn with_iso_base_url(mut self, base: Option<&str>) -> Result<Self> {
        self.iso_base_url = match base {
            Some(base) => Some(
                Url::parse(&format!("{}/", base.trim_end_matches('/'))).map_err(|e| {
                    ConfigError::InvalidValue {
                        key: "github.iso-base-url".to_string(),
                        reason: e.to_string(),
                    }
                })?,
            ),
            None => None,
        };
        Ok(self)
    }
}

/// Runs the pipeline for build targets and reports to the tracker
///
/// Every distribution that enters a stage group gets exactly one terminal
/// report. Report failures are logged and never change the pipeline outcome.
#[derive(Debug)]
pub struct AutoAction<E, T> {
    engine: E,
    transport: LogTransport,
    notifier: Option<NotificationClient<T>>,
    openqa: Option<OpenQaClient>,
    settings: ActionSettings,
}

impl<E: StageEngine, T: IssueTracker> AutoAction<E, T> {
    /// Create an orchestrator; without a notifier reports are skipped
    pub fn new(
        engine: E,
        transport: LogTransport,
        notifier: Option<NotificationClient<T>>,
        settings: ActionSettings,
    ) -> Self {
        Self {
            engine,
            transport,
            notifier,
            openqa: None,
            settings,
        }
    }

    /// Schedule installer image tests after each installer upload
    pub fn with_openqa(mut self, openqa: Option<OpenQaClient>) -> Self {
        self.openqa = openqa;
        self
    }

    /// Stage engine in use
    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.settings.timeout
    }

    /// Fetch sources, then build and upload to `channel` every distribution whose tagged
    /// version is not released yet
    pub async fn build_component(
        &self,
        target: &BuildTarget,
        channel: &RepositoryChannel,
        dists: &[Distribution],
    ) -> Result<()> {
        let deadline = self.deadline();
        let mut done: Vec<Distribution> = Vec::new();

        match self.run_group(&StageRequest::new(target, dists, &FETCH_STAGES), deadline).await {
            Ok(_) => {}
            Err(err @ ActionError::Timeout { .. }) => {
                return Err(self.timeout(target, StageKind::Build, None, dists, &done, err).await);
            }
            Err(err) => {
                log::error!("{}: fetch failed: {}", target, err);
                return Err(err.into());
            }
        }

        let mut pending = Vec::new();
        for dist in dists {
            match self.release_status(target, dist).await {
                Ok(status) if status.needs_build() => pending.push(dist.clone()),
                Ok(status) => {
                    log::info!("{}: skipping {} ({})", target, dist, status);
                    done.push(dist.clone());
                }
                Err(e) => {
                    log::warn!("{}: cannot query release status for {}: {}", target, dist, e);
                    done.push(dist.clone());
                }
            }
        }
        if pending.is_empty() {
            log::warn!("{}: nothing to build, no distribution has an unreleased version tag", target);
            return Ok(());
        }

        for dist in &pending {
            let single = std::slice::from_ref(dist);
            let build = StageRequest::new(target, single, &BUILD_STAGES);
            let upload = StageRequest::new(target, single, &UPLOAD_STAGES).with_channel(channel);
            if let Err(err) = self.build_and_upload(target, dist, &build, &upload, deadline).await {
                return Err(self.timeout(target, StageKind::Build, None, dists, &done, err).await);
            }
            done.push(dist.clone());
        }
        Ok(())
    }

    /// Move the built component to `channel`
    ///
    /// Fails with [`ActionError::CommitMismatch`] when the source tree moved past `commit_sha`.
    pub async fn upload_component(
        &self,
        target: &BuildTarget,
        commit_sha: &str,
        channel: &RepositoryChannel,
        dists: &[Distribution],
    ) -> Result<()> {
        let head = GitRepository::new(&target.source_dir).current_commit().await?;
        if head != commit_sha {
            return Err(ActionError::CommitMismatch {
                expected: commit_sha.to_string(),
                actual: head,
            }
            .into());
        }

        let deadline = self.deadline();
        let mut done: Vec<Distribution> = Vec::new();
        for dist in dists {
            if let Ok(ReleaseStatus::NotApplicable) = self.release_status(target, dist).await {
                log::info!("{}: {} not applicable, skipping upload", target, dist);
                done.push(dist.clone());
                continue;
            }
            let request = StageRequest::new(target, std::slice::from_ref(dist), &UPLOAD_STAGES)
                .with_channel(channel);
            match self.upload(target, dist, &request, deadline).await {
                Ok(Some(report)) => self.report(target, report).await,
                Ok(None) => {}
                Err(err) => {
                    return Err(self.timeout(target, StageKind::Upload, Some(channel), dists, &done, err).await);
                }
            }
            done.push(dist.clone());
        }
        Ok(())
    }

    /// Build a template unless an equal or newer build is already recorded
    pub async fn build_template(
        &self,
        target: &BuildTarget,
        channel: &RepositoryChannel,
        timestamp_file: &Path,
    ) -> Result<()> {
        let (dist, timestamp) = template_parts(target)?;
        let requested = parse_timestamp(timestamp)?;
        if let Some(existing) = read_build_timestamp(timestamp_file)?
            && existing >= requested
        {
            log::info!(
                "{}: build {} is not newer than recorded {}, skipping",
                target,
                timestamp,
                format_timestamp(&existing)
            );
            return Ok(());
        }

        let deadline = self.deadline();
        let dists = [dist.clone()];
        let build = StageRequest::new(target, &dists, &BUILD_STAGES);
        let upload = StageRequest::new(target, &dists, &UPLOAD_STAGES).with_channel(channel);
        self.report(target, StatusReport::new(StageKind::Build, BuildStatus::Building, dist.clone()))
            .await;
        let built = match self.run_group(&build, deadline).await {
            Ok(locator) => {
                if !self.settings.dry_run {
                    write_build_timestamp(timestamp_file, &requested)?;
                }
                self.log_url(locator.as_ref())
            }
            Err(err @ ActionError::Timeout { .. }) => {
                return Err(self.timeout(target, StageKind::Build, None, &dists, &[], err).await);
            }
            Err(err) => {
                log::error!("{}: build failed: {}", target, err);
                self.report(target, self.failure_report(StageKind::Build, dist, None, &err))
                    .await;
                return Ok(());
            }
        };
        let report = StatusReport::new(StageKind::Build, BuildStatus::Built, dist.clone())
            .build_log(built.clone());
        self.report(target, report).await;

        match self.upload(target, dist, &upload, deadline).await {
            Ok(Some(report)) => {
                self.report(target, report.build_log(built)).await;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => Err(self.timeout(target, StageKind::Build, None, &dists, &[], err).await),
        }
    }

    /// Move a built template to `channel`
    ///
    /// The target version must match the recorded build timestamp.
    pub async fn upload_template(
        &self,
        target: &BuildTarget,
        channel: &RepositoryChannel,
        timestamp_file: &Path,
    ) -> Result<()> {
        let (dist, _) = template_parts(target)?;
        let requested = target.template_version().unwrap_or_default();
        let recorded = read_build_timestamp(timestamp_file)?
            .map(|ts| format!("{}.0-{}", target.release_number(), format_timestamp(&ts)));
        if recorded.as_deref() != Some(requested.as_str()) {
            return Err(ActionError::CommitMismatch {
                expected: requested,
                actual: recorded.unwrap_or_else(|| "no recorded build".to_string()),
            }
            .into());
        }

        let deadline = self.deadline();
        let dists = [dist.clone()];
        let request = StageRequest::new(target, &dists, &UPLOAD_STAGES).with_channel(channel);
        match self.upload(target, dist, &request, deadline).await {
            Ok(Some(report)) => {
                self.report(target, report).await;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => Err(self.timeout(target, StageKind::Upload, Some(channel), &dists, &[], err).await),
        }
    }

    /// Build the installer image for the single host distribution
    pub async fn build_iso(
        &self,
        target: &BuildTarget,
        dists: &[Distribution],
        is_final: bool,
    ) -> Result<()> {
        let hosts: Vec<&Distribution> = dists.iter().filter(|d| d.is_host()).collect();
        let [dist] = hosts.as_slice() else {
            return Err(ConfigError::InvalidValue {
                key: "distributions".to_string(),
                reason: format!(
                    "installer build needs exactly one host distribution, found {}",
                    hosts.len()
                ),
            }
            .into());
        };
        let dist = (*dist).clone();
        let channel = if is_final {
            RepositoryChannel::Iso
        } else {
            RepositoryChannel::IsoTesting
        };

        let deadline = self.deadline();
        let dists = [dist.clone()];
        let build = StageRequest::new(target, &dists, &ISO_STAGES);
        let upload = StageRequest::new(target, &dists, &UPLOAD_STAGES).with_channel(&channel);
        self.report(target, StatusReport::new(StageKind::Build, BuildStatus::Building, dist.clone()))
            .await;
        let built = match self.run_group(&build, deadline).await {
            Ok(locator) => self.log_url(locator.as_ref()),
            Err(err @ ActionError::Timeout { .. }) => {
                return Err(self.timeout(target, StageKind::Build, None, &dists, &[], err).await);
            }
            Err(err) => {
                log::error!("{}: build failed: {}", target, err);
                self.report(target, self.failure_report(StageKind::Build, &dist, None, &err))
                    .await;
                return Ok(());
            }
        };
        let report = StatusReport::new(StageKind::Build, BuildStatus::Built, dist.clone())
            .build_log(built.clone());
        self.report(target, report).await;

        match self.upload(target, &dist, &upload, deadline).await {
            Ok(Some(report)) => {
                let tests = self.trigger_openqa(target, &channel).await;
                let report = report
                    .build_log(built)
                    .repository_url(self.iso_repository(&channel).map(String::from))
                    .additional_info(tests);
                self.report(target, report).await;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => Err(self.timeout(target, StageKind::Build, None, &dists, &[], err).await),
        }
    }

    /// Build group, `built` report, then upload group
    ///
    /// Failures are reported here; only a timeout is returned.
    async fn build_and_upload(
        &self,
        target: &BuildTarget,
        dist: &Distribution,
        build: &StageRequest<'_>,
        upload: &StageRequest<'_>,
        deadline: Instant,
    ) -> std::result::Result<(), ActionError> {
        self.report(target, StatusReport::new(StageKind::Build, BuildStatus::Building, dist.clone()))
            .await;
        match self.run_group(build, deadline).await {
            Ok(locator) => {
                let report = StatusReport::new(StageKind::Build, BuildStatus::Built, dist.clone())
                    .build_log(self.log_url(locator.as_ref()));
                self.report(target, report).await;
            }
            Err(err @ ActionError::Timeout { .. }) => return Err(err),
            Err(err) => {
                log::error!("{}: build for {} failed: {}", target, dist, err);
                self.report(target, self.failure_report(StageKind::Build, dist, None, &err))
                    .await;
                return Ok(());
            }
        }
        if let Some(report) = self.upload(target, dist, upload, deadline).await? {
            self.report(target, report).await;
        }
        Ok(())
    }

    /// Run one upload group
    ///
    /// Returns the `uploaded` report to send, or `None` once a failure has been
    /// reported. Only a timeout is returned as an error.
    async fn upload(
        &self,
        target: &BuildTarget,
        dist: &Distribution,
        request: &StageRequest<'_>,
        deadline: Instant,
    ) -> std::result::Result<Option<StatusReport>, ActionError> {
        let channel = request.channel.cloned();
        match self.run_group(request, deadline).await {
            Ok(locator) => {
                let report = StatusReport::new(StageKind::Upload, BuildStatus::Uploaded, dist.clone())
                    .build_log(self.log_url(locator.as_ref()));
                Ok(Some(match channel {
                    Some(channel) => report.channel(channel),
                    None => report,
                }))
            }
            Err(err @ ActionError::Timeout { .. }) => Err(err),
            Err(err) => {
                log::error!("{}: upload for {} failed: {}", target, dist, err);
                let report = self.failure_report(StageKind::Upload, dist, channel.as_ref(), &err);
                self.report(target, report).await;
                Ok(None)
            }
        }
    }

    /// Schedule installer tests; the overview link becomes the upload note
    async fn trigger_openqa(
        &self,
        target: &BuildTarget,
        channel: &RepositoryChannel,
    ) -> Option<AdditionalInfo> {
        let client = self.openqa.as_ref()?;
        let TargetKind::Iso { version: build } = &target.kind else {
            return None;
        };
        let Some(repository) = self.iso_repository(channel) else {
            log::debug!("No installer base URL configured, not scheduling openQA tests");
            return None;
        };
        let iso = match client.image_url(&repository, build) {
            Ok(iso) => iso,
            Err(e) => {
                log::error!("{}", e);
                return None;
            }
        };
        let version = target.release_number();
        if self.settings.dry_run {
            log::info!("[DRY-RUN] Would schedule openQA tests of {}", iso);
            return None;
        }
        match client.schedule_iso(version, build, &iso).await {
            Ok(overview) => {
                log::info!("Scheduled openQA tests of {}: {}", iso, overview);
                Some(AdditionalInfo::message(format!(
                    "see [openQA]({}) test result overview",
                    overview
                )))
            }
            Err(e) => {
                log::error!("Failed to schedule openQA tests of {}: {}", iso, e);
                None
            }
        }
    }

    async fn release_status(&self, target: &BuildTarget, dist: &Distribution) -> Result<ReleaseStatus> {
        if self.settings.dry_run {
            log::info!("[DRY-RUN] Assuming {} is not released for {}", target, dist);
            return Ok(ReleaseStatus::NotReleased { tagged: true });
        }
        self.engine.release_status(target, dist).await
    }

    /// Run a stage group under `deadline`, capturing its log
    async fn run_group(
        &self,
        request: &StageRequest<'_>,
        deadline: Instant,
    ) -> std::result::Result<Option<LogLocator>, ActionError> {
        if self.settings.dry_run {
            log::info!(
                "[DRY-RUN] Would run '{}' for {}",
                request.stages.join(" "),
                request.target
            );
            return Ok(None);
        }

        let mut session = self.transport.open(&request.head_info());
        let result = {
            let mut log = session.stage_log();
            let result =
                tokio::time::timeout_at(deadline, self.engine.run_stages(request, &mut log)).await;
            match &result {
                Ok(Err(e)) => log.error(&e.to_string()),
                Err(_) => log.error(&format!("Timeout for {}", request.target.name())),
                Ok(Ok(())) => {}
            }
            result
        };
        let capture = finish_session(session).await;

        match result {
            Ok(Ok(())) => Ok(capture.locator),
            Ok(Err(NotifyError::Action(ActionError::PipelineFailure { message, .. }))) => {
                Err(ActionError::PipelineFailure {
                    message,
                    log: capture.locator,
                    tail: Some(capture.tail).filter(|tail| !tail.is_empty()),
                })
            }
            Ok(Err(e)) => Err(ActionError::internal(e.kind(), e)),
            Err(_elapsed) => Err(ActionError::Timeout {
                target: request.target.name().to_string(),
                after: self.settings.timeout,
            }),
        }
    }

    /// Report a timeout for every distribution not yet done, then hand the error back
    async fn timeout(
        &self,
        target: &BuildTarget,
        stage: StageKind,
        channel: Option<&RepositoryChannel>,
        dists: &[Distribution],
        done: &[Distribution],
        err: ActionError,
    ) -> NotifyError {
        log::error!("{}", err);
        for dist in dists.iter().filter(|d| !done.contains(d)) {
            self.report(target, self.failure_report(stage, dist, channel, &err))
                .await;
        }
        err.into()
    }

    fn failure_report(
        &self,
        stage: StageKind,
        dist: &Distribution,
        channel: Option<&RepositoryChannel>,
        error: &ActionError,
    ) -> StatusReport {
        let (link, info) = match error {
            ActionError::PipelineFailure { message, log, tail } => (
                self.log_url(log.as_ref()),
                match tail {
                    Some(tail) => AdditionalInfo::with_tail(message.as_str(), tail.as_str()),
                    None => AdditionalInfo::message(message.as_str()),
                },
            ),
            ActionError::Timeout { .. } => (None, AdditionalInfo::message("Timeout")),
            ActionError::Internal { kind, .. } => (
                None,
                AdditionalInfo::message(format!("Internal error: '{}'", kind)),
            ),
            ActionError::CommitMismatch { .. } => (None, AdditionalInfo::message(error.to_string())),
        };
        let report = StatusReport::new(stage, BuildStatus::Failed, dist.clone())
            .build_log(link)
            .additional_info(Some(info));
        match channel {
            Some(channel) => report.channel(channel.clone()),
            None => report,
        }
    }

    fn log_url(&self, locator: Option<&LogLocator>) -> Option<String> {
        locator.map(|locator| locator.to_url(&self.settings.logs_repo))
    }

    fn iso_repository(&self, channel: &RepositoryChannel) -> Option<Url> {
        let base = self.settings.iso_base_url.as_ref()?;
        base.join(&format!("{}/", channel)).ok()
    }

    async fn report(&self, target: &BuildTarget, report: StatusReport) {
        let Some(notifier) = &self.notifier else {
            log::debug!(
                "No tracker configured, not reporting {} of {} on {}",
                report.status,
                target,
                report.dist
            );
            return;
        };
        if self.settings.dry_run {
            log::info!(
                "[DRY-RUN] Would report {} of {} on {}",
                report.status,
                target,
                report.dist
            );
            return;
        }
        if let Err(e) = notifier.notify(target, &report).await {
            log::error!(
                "Failed to report {} of {} on {}: {}",
                report.status,
                target,
                report.dist,
                e
            );
        }
    }
}

fn template_parts(target: &BuildTarget) -> Result<(&Distribution, &str)> {
    match &target.kind {
        TargetKind::Template {
            distribution,
            timestamp,
            ..
        } => Ok((distribution, timestamp.as_str())),
        _ => Err(ConfigError::InvalidValue {
            key: "target".to_string(),
            reason: format!("{} is not a template", target),
        }
        .into()),
    }
}

async fn finish_session(session: LogSession) -> CaptureOutcome {
    match tokio::task::spawn_blocking(move || session.finish()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log::warn!("Log capture did not finish cleanly: {}", e);
            CaptureOutcome::default()
        }
    }
}
