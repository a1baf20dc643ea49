//! Notification client: tracking issue lookup, comments and label transitions.

use super::labels::LabelDelta;
use super::message::{StatusReport, compose_comment};
use super::templates::{self, MessageTemplates, render};
use crate::capture::DEFAULT_TAIL_LINES;
use crate::error::Result;
use crate::git::{ChangelogExtractor, component_git_url};
use crate::github::IssueTracker;
use crate::state::{StateKey, StateStore};
use crate::target::{BuildStatus, BuildTarget, Distribution, RepositoryChannel, StageKind, TargetKind};

/// Settings shared by every report
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Repository holding the referenced and closed issues, `owner/name`
    pub issues_repo: String,
    /// Prefix turning a component name into its repository, e.g. `QubesOS/qubes-`
    pub repo_prefix: String,
    /// Days a testing update waits before it may be promoted
    pub min_age_days: u32,
    /// Lines announced in the log tail block
    pub tail_lines: usize,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            issues_repo: "QubesOS/qubes-issues".to_string(),
            repo_prefix: "QubesOS/qubes-".to_string(),
            min_age_days: 5,
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

/// How a target is titled and described on its tracking issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetIdentity {
    /// Component part of the title
    pub component: String,
    /// Version part of the title
    pub version: String,
    /// Issue body template
    pub report_template: &'static str,
    /// Kind-specific placeholder values
    pub placeholders: Vec<(&'static str, String)>,
}

impl TargetIdentity {
    /// `"{component} {version} ({release})"`
    pub fn title(&self, release: &str) -> String {
        format!("{} {} ({})", self.component, self.version, release)
    }
}

/// A component commit promoted to a channel
#[derive(Clone, Copy)]
struct Promotion<'a> {
    target: &'a BuildTarget,
    name: &'a str,
    changelog: &'a ChangelogExtractor,
    commit: &'a str,
    channel: &'a RepositoryChannel,
    dist: &'a Distribution,
}

/// Turns status reports into tracker updates
///
/// Reports go to the tracking issue in the report repository. Promotions to
/// `stable` or `current-testing` additionally comment on every issue the
/// promoted commits fix, in the issues repository.
#[derive(Debug)]
pub struct NotificationClient<T> {
    reports: T,
    issues: T,
    templates: MessageTemplates,
    state: StateStore,
    settings: NotifierSettings,
}

impl<T: IssueTracker> NotificationClient<T> {
    /// Create a client
    pub fn new(
        reports: T,
        issues: T,
        templates: MessageTemplates,
        state: StateStore,
        settings: NotifierSettings,
    ) -> Self {
        Self {
            reports,
            issues,
            templates,
            state,
            settings,
        }
    }

    /// Report one status transition of `target`
    pub async fn notify(&self, target: &BuildTarget, report: &StatusReport) -> Result<()> {
        let prefix = target.label_prefix(&report.dist);
        let delta = LabelDelta::compute(
            report.stage,
            report.status,
            report.channel.as_ref(),
            &prefix,
            &target.release,
        );

        let source = match &target.kind {
            TargetKind::Component { name } => {
                let changelog = ChangelogExtractor::new(
                    &target.source_dir,
                    component_git_url(name, &self.settings.repo_prefix),
                    &self.settings.issues_repo,
                )?;
                let commit = changelog.repository().current_commit().await?;
                Some((name.as_str(), changelog, commit))
            }
            _ => None,
        };

        let mut previous_stable = None;
        if report.stage == StageKind::Upload
            && report.status == BuildStatus::Uploaded
            && let (Some((name, changelog, commit)), Some(channel)) = (&source, &report.channel)
        {
            let promotion = Promotion {
                target,
                name,
                changelog,
                commit,
                channel,
                dist: &report.dist,
            };
            previous_stable = self.record_promotion(&promotion, &delta).await?;
        }

        let comment = compose_comment(target, report, self.settings.tail_lines);

        let identity = match &source {
            Some((name, changelog, commit)) => {
                component_identity(name, changelog, commit, previous_stable.as_deref()).await?
            }
            None => artifact_identity(target, &report.dist),
        };

        if let Some(number) = self.search_or_create_issue(&target.release, &identity).await? {
            comment_issue(&self.reports, number, comment.as_deref(), &delta).await;
        }
        Ok(())
    }

    /// Store the promoted commit, closing fixed issues first when a previous one is known
    ///
    /// Returns the commit last promoted to `current`, if any.
    async fn record_promotion(
        &self,
        promotion: &Promotion<'_>,
        delta: &LabelDelta,
    ) -> Result<Option<String>> {
        let key = StateKey::new(
            &promotion.target.release,
            promotion.name,
            promotion.dist.clone(),
            promotion.channel,
        );
        let previous = self.state.load(&key).unwrap_or_else(|e| {
            log::warn!("{}", e);
            None
        });

        match previous {
            None => log::warn!(
                "{} does not exist, initializing with the current state",
                self.state.path(&key).display()
            ),
            Some(previous) if promotion.channel.closes_issues() => {
                if let Err(e) = self.notify_closed_issues(promotion, &previous, delta).await {
                    log::error!("Failed to notify closed issues: {}", e);
                }
            }
            Some(_) => {}
        }

        if let Err(e) = self.state.save(&key, promotion.commit) {
            log::error!("Failed to record {} as last promoted commit: {}", promotion.commit, e);
        }

        Ok(self
            .state
            .load(&key.with_channel(&RepositoryChannel::Current))
            .unwrap_or_else(|e| {
                log::warn!("{}", e);
                None
            }))
    }

    async fn notify_closed_issues(
        &self,
        promotion: &Promotion<'_>,
        previous: &str,
        delta: &LabelDelta,
    ) -> Result<()> {
        let Promotion {
            target,
            name,
            changelog,
            commit,
            channel,
            dist,
        } = *promotion;

        let template = self.templates.closing(channel, dist);
        if template.is_none() {
            log::warn!("Cannot find message template not adding comments");
        }

        let closed = changelog.closed_issues(previous, commit).await?;
        if closed.is_empty() {
            return Ok(());
        }

        let message = match template {
            Some(template) => {
                let shortlog = changelog.shortlog(previous, commit).await?;
                let compare = changelog.compare_url(previous, commit);
                let package = target.package_name(dist);
                Some(render(
                    &template,
                    &[
                        ("DIST", &dist.name),
                        ("PACKAGE_SET", dist.package_set.as_str()),
                        ("PACKAGE_NAME", &package),
                        ("COMPONENT", name),
                        ("REPOSITORY", channel.report_name()),
                        ("RELEASE_NAME", &target.release),
                        ("GIT_LOG", &shortlog),
                        ("GIT_LOG_URL", &compare),
                    ],
                ))
            }
            None => None,
        };

        for number in closed {
            log::info!("Adding a comment to issue #{}", number);
            comment_issue(&self.issues, number, message.as_deref(), delta).await;
        }
        Ok(())
    }

    /// Tracking issue for `identity`, created from its report template when missing
    ///
    /// Returns `None` when no issue exists and no template is available.
    pub async fn search_or_create_issue(
        &self,
        release: &str,
        identity: &TargetIdentity,
    ) -> Result<Option<u64>> {
        let title = identity.title(release);
        if let Some(issue) = self.reports.find_issue_by_title(&title).await? {
            return Ok(Some(issue.number));
        }

        let Some(template) = self.templates.get(identity.report_template) else {
            log::warn!(
                "Cannot find message template {}, not creating issue '{}'",
                identity.report_template,
                title
            );
            return Ok(None);
        };

        let min_age = self.settings.min_age_days.to_string();
        let mut values: Vec<(&str, &str)> = vec![
            ("COMPONENT", &identity.component),
            ("RELEASE_NAME", release),
            ("VERSION", &identity.version),
            ("MIN_AGE_DAYS", &min_age),
        ];
        values.extend(identity.placeholders.iter().map(|(k, v)| (*k, v.as_str())));

        let issue = self
            .reports
            .create_issue(&title, &render(&template, &values))
            .await?;
        Ok(Some(issue.number))
    }
}

async fn component_identity(
    name: &str,
    changelog: &ChangelogExtractor,
    commit: &str,
    previous_stable: Option<&str>,
) -> Result<TargetIdentity> {
    let changes = changelog.package_changes(previous_stable).await?;
    let compare = changelog.compare_url(&changes.previous_version, &changes.version);
    Ok(TargetIdentity {
        component: name.to_string(),
        report_template: templates::COMPONENT_REPORT,
        placeholders: vec![
            ("COMMIT_SHA", commit.to_string()),
            ("GIT_URL", changelog.git_url().to_string()),
            ("GIT_LOG", changes.shortlog.clone()),
            ("GIT_LOG_URL", compare),
            ("ISSUES", changes.render_issues(changelog.issues_repo())),
        ],
        version: changes.version,
    })
}

/// Identity of template and installer image targets
pub fn artifact_identity(target: &BuildTarget, dist: &Distribution) -> TargetIdentity {
    match &target.kind {
        TargetKind::Template {
            name, distribution, ..
        } => TargetIdentity {
            component: format!("qubes-template-{}", name),
            version: target.template_version().unwrap_or_default(),
            report_template: templates::TEMPLATE_REPORT,
            placeholders: vec![
                ("TEMPLATE_NAME", name.clone()),
                ("DIST", distribution.fullname()),
            ],
        },
        TargetKind::Iso { version } => TargetIdentity {
            component: "iso".to_string(),
            version: version.clone(),
            report_template: templates::ISO_REPORT,
            placeholders: vec![("ISO_VERSION", version.clone())],
        },
        TargetKind::Component { name } => TargetIdentity {
            component: name.clone(),
            version: target.package_name(dist),
            report_template: templates::COMPONENT_REPORT,
            placeholders: vec![],
        },
    }
}

/// Post `comment`, then apply `delta`; every failure is logged and swallowed
pub async fn comment_issue<T: IssueTracker>(
    tracker: &T,
    number: u64,
    comment: Option<&str>,
    delta: &LabelDelta,
) {
    let repo = tracker.repository();
    if let Some(comment) = comment
        && let Err(e) = tracker.create_comment(number, comment).await
    {
        log::error!("Failed to comment on {}#{}: {}", repo, number, e);
    }
    for label in &delta.remove {
        if let Err(e) = tracker.remove_label(number, label).await {
            log::warn!("Failed to remove label {} from {}#{}: {}", label, repo, number, e);
        }
    }
    if !delta.add.is_empty()
        && let Err(e) = tracker.add_labels(number, &delta.add).await
    {
        log::warn!(
            "Failed to add labels {} to {}#{}: {}",
            delta.add.join(", "),
            repo,
            number,
            e
        );
    }
}
