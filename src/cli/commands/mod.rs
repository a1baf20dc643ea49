//! Command execution: configuration loading, wiring and dispatch.

use crate::action::{ActionSettings, AutoAction, CommandStageEngine};
use crate::capture::LogTransport;
use crate::cli::{Args, Command};
use crate::config::BuilderConfig;
use crate::error::{ActionError, NotifyError, Result};
use crate::github::{GitHubTracker, RetryConfig};
use crate::notify::{MessageTemplates, NotificationClient, NotifierSettings};
use crate::openqa::OpenQaClient;
use crate::state::StateStore;
use crate::target::{BuildTarget, RepositoryChannel};
use std::time::Duration;

/// Execute the parsed command and map its outcome to an exit code
///
/// A skipped upload exits successfully. A timeout propagates as an error
/// after it has been reported.
pub async fn execute_command(args: Args) -> Result<i32> {
    if let Err(validation_error) = args.validate() {
        log::error!("{}", validation_error);
        return Ok(1);
    }

    match execute(&args).await {
        Ok(()) => Ok(0),
        Err(e) if e.is_commit_mismatch() => {
            log::warn!("{}", e);
            Ok(0)
        }
        Err(e @ NotifyError::Action(ActionError::Timeout { .. })) => Err(e),
        Err(e) => {
            log::error!("Command '{}' failed: {}", args.command.name(), e);
            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                log::info!("Recovery suggestions:");
                for suggestion in suggestions {
                    log::info!("  • {}", suggestion);
                }
            }
            Ok(1)
        }
    }
}

async fn execute(args: &Args) -> Result<()> {
    let builder = args.command.builder();
    let config = BuilderConfig::load(&builder.builder_conf)?;

    let state = StateStore::new(args.state_dir.clone().unwrap_or_else(StateStore::default_dir));
    let notifier = create_notifier(&config, state)?;
    let engine = CommandStageEngine::new(
        config
            .engine
            .stage_command(&builder.builder_dir, &builder.builder_conf),
        config
            .engine
            .release_status_command(&builder.builder_dir, &builder.builder_conf),
    );
    let transport = LogTransport::select(
        args.local_log_file.clone(),
        config.build_log.command.clone(),
        config.build_log.tail_lines,
        Duration::from_secs(config.build_log.finish_timeout),
    );
    let openqa = config.openqa.as_ref().map(OpenQaClient::new).transpose()?;
    let action = |timeout: Duration| -> Result<AutoAction<CommandStageEngine, GitHubTracker>> {
        let mut settings = ActionSettings::new(timeout)
            .with_iso_base_url(config.github.iso_base_url.as_deref())?;
        settings.dry_run = args.dry_run;
        settings.logs_repo = config.github.logs_repo.clone();
        Ok(AutoAction::new(engine, transport, notifier, settings).with_openqa(openqa))
    };

    match &args.command {
        Command::BuildComponent { component, .. } => {
            let entry = config.component(component)?;
            let target = BuildTarget::component(
                &config.release,
                &entry.name,
                config.component_source_dir(entry),
            );
            action(config.deadline(entry.timeout))?
                .build_component(&target, &config.component_channel(), &config.distributions)
                .await
        }
        Command::UploadComponent {
            component,
            commit_sha,
            repository_publish,
            distributions,
            ..
        } => {
            let entry = config.component(component)?;
            let target = BuildTarget::component(
                &config.release,
                &entry.name,
                config.component_source_dir(entry),
            );
            let dists = if distributions.is_empty() {
                &config.distributions
            } else {
                distributions
            };
            let channel = RepositoryChannel::from(repository_publish.as_str());
            action(config.deadline(entry.timeout))?
                .upload_component(&target, commit_sha, &channel, dists)
                .await
        }
        Command::BuildTemplate {
            template,
            timestamp,
            ..
        } => {
            let entry = config.template(template)?;
            let target = BuildTarget::template(
                &config.release,
                &entry.name,
                entry.distribution.clone(),
                timestamp,
                &builder.builder_dir,
            );
            action(config.deadline(entry.timeout))?
                .build_template(
                    &target,
                    &config.template_channel(),
                    &config.template_timestamp_file(&entry.name),
                )
                .await
        }
        Command::UploadTemplate {
            template,
            template_sha,
            repository_publish,
            ..
        } => {
            let entry = config.template(template)?;
            let timestamp = template_sha
                .rsplit_once('-')
                .map_or(template_sha.as_str(), |(_, ts)| ts);
            let target = BuildTarget::template(
                &config.release,
                &entry.name,
                entry.distribution.clone(),
                timestamp,
                &builder.builder_dir,
            );
            if target.template_version().as_deref() != Some(template_sha.as_str()) {
                return Err(ActionError::CommitMismatch {
                    expected: template_sha.clone(),
                    actual: target.template_version().unwrap_or_default(),
                }
                .into());
            }
            let channel = RepositoryChannel::from(repository_publish.as_str());
            action(config.deadline(entry.timeout))?
                .upload_template(
                    &target,
                    &channel,
                    &config.template_timestamp_file(&entry.name),
                )
                .await
        }
        Command::BuildIso {
            iso_version,
            is_final,
            ..
        } => {
            let target = BuildTarget::iso(&config.release, iso_version, &builder.builder_dir);
            action(config.deadline(None))?
                .build_iso(&target, &config.distributions, *is_final)
                .await
        }
    }
}

/// Tracker clients for reports and closed issues; `None` without a token
fn create_notifier(
    config: &BuilderConfig,
    state: StateStore,
) -> Result<Option<NotificationClient<GitHubTracker>>> {
    let Some(token) = config.github.token() else {
        log::debug!("No API token configured, status reports are disabled");
        return Ok(None);
    };
    let retry = RetryConfig::from_env();
    let reports = GitHubTracker::new(
        &config.github.api_base,
        &token,
        config.github.build_report_repo.parse()?,
        retry.clone(),
    )?;
    let issues = GitHubTracker::new(
        &config.github.api_base,
        &token,
        config.github.issues_repo.parse()?,
        retry,
    )?;
    let templates = match &config.github.message_templates_dir {
        Some(dir) => MessageTemplates::with_dir(dir),
        None => MessageTemplates::builtin(),
    };
    let settings = NotifierSettings {
        issues_repo: config.github.issues_repo.clone(),
        repo_prefix: config.github.repo_prefix.clone(),
        min_age_days: config.min_age_days,
        tail_lines: config.build_log.tail_lines,
    };
    Ok(Some(NotificationClient::new(
        reports, issues, templates, state, settings,
    )))
}

