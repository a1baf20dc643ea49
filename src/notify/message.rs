//! Report comments.

use crate::target::{BuildStatus, BuildTarget, Distribution, RepositoryChannel, StageKind, TargetKind};

/// Maximum length of rendered additional info, in characters
pub const MAX_ADDITIONAL_INFO: usize = 3500;

/// Extra detail attached to a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalInfo {
    /// Short description, e.g. the failure message
    pub message: String,
    /// Last lines of the stage log
    pub tail: Option<String>,
}

impl AdditionalInfo {
    /// Plain message without log tail
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tail: None,
        }
    }

    /// Message followed by a log tail
    pub fn with_tail(message: impl Into<String>, tail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tail: Some(tail.into()).filter(|t: &String| !t.trim().is_empty()),
        }
    }

    /// Render for a comment, at most [`MAX_ADDITIONAL_INFO`] characters
    pub fn render(&self, tail_lines: usize) -> String {
        match &self.tail {
            None => truncate_end(&self.message, MAX_ADDITIONAL_INFO),
            Some(tail) => format_additional_info(&self.message, tail, tail_lines),
        }
    }
}

/// Message and log tail as a collapsible block
///
/// When the result would exceed [`MAX_ADDITIONAL_INFO`], the oldest tail
/// characters are dropped first, then the message is shortened.
pub fn format_additional_info(base: &str, tail: &str, tail_lines: usize) -> String {
    let head = format!("**Additional info:**\n{}\n\n", base.trim());
    let open = format!(
        "<details><summary>Log tail (last ~{} lines)</summary>\n\n```\n",
        tail_lines
    );
    let close = "\n```\n</details>";
    let frame = open.chars().count() + close.chars().count();

    let head = truncate_end(&head, MAX_ADDITIONAL_INFO.saturating_sub(frame) / 2);
    let room = MAX_ADDITIONAL_INFO.saturating_sub(head.chars().count() + frame);
    let tail = keep_end(tail.trim_matches('\n'), room);
    format!("{}{}{}{}", head, open, tail, close)
}

fn truncate_end(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

fn keep_end(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

/// One status transition of a target on one distribution
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Pipeline phase
    pub stage: StageKind,
    /// New status
    pub status: BuildStatus,
    /// Distribution the status applies to
    pub dist: Distribution,
    /// Upload destination
    pub channel: Option<RepositoryChannel>,
    /// Public link to the uploaded images
    pub repository_url: Option<String>,
    /// Link to the stage log
    pub build_log: Option<String>,
    /// Extra detail
    pub additional_info: Option<AdditionalInfo>,
}

impl StatusReport {
    /// Report without log, channel or extra detail
    pub fn new(stage: StageKind, status: BuildStatus, dist: Distribution) -> Self {
        Self {
            stage,
            status,
            dist,
            channel: None,
            repository_url: None,
            build_log: None,
            additional_info: None,
        }
    }

    /// Set the upload channel
    pub fn channel(mut self, channel: RepositoryChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Set the log link
    pub fn build_log(mut self, link: Option<String>) -> Self {
        self.build_log = link;
        self
    }

    /// Set the repository link
    pub fn repository_url(mut self, url: Option<String>) -> Self {
        self.repository_url = url;
        self
    }

    /// Set extra detail
    pub fn additional_info(mut self, info: Option<AdditionalInfo>) -> Self {
        self.additional_info = info;
        self
    }
}

/// Subject of every sentence about `target` on `dist`
pub fn base_message(target: &BuildTarget, dist: &Distribution) -> String {
    match &target.kind {
        TargetKind::Iso { .. } => format!("ISO for {}", target.release),
        TargetKind::Template { .. } => {
            let package = target.package_name(dist);
            format!(
                "Template {}",
                package.strip_prefix("qubes-template-").unwrap_or(&package)
            )
        }
        TargetKind::Component { .. } => format!("Package for {}", dist.dist_label()),
    }
}

fn upload_suffix(target: &BuildTarget, report: &StatusReport) -> String {
    match target.kind {
        TargetKind::Iso { .. } => match &report.repository_url {
            Some(url) => format!("[testing]({}) repository", url),
            None => "testing repository".to_string(),
        },
        _ => format!(
            "{} repository",
            report
                .channel
                .as_ref()
                .map_or("unknown", RepositoryChannel::report_name)
        ),
    }
}

/// Comment for a report; `building` produces none
pub fn compose_comment(target: &BuildTarget, report: &StatusReport, tail_lines: usize) -> Option<String> {
    let base = base_message(target, &report.dist);
    let log_suffix = |text: String| match &report.build_log {
        Some(link) => format!("{} ([build log]({})).", text, link),
        None => format!("{}.", text),
    };
    let info = report
        .additional_info
        .as_ref()
        .map(|info| info.render(tail_lines));

    match report.status {
        BuildStatus::Building => None,
        BuildStatus::Built => {
            let message = log_suffix(format!("{} was built", base));
            Some(with_parenthetical(message, info))
        }
        BuildStatus::Uploaded => {
            let message = format!("{} was uploaded to {}.", base, upload_suffix(target, report));
            Some(with_parenthetical(message, info))
        }
        BuildStatus::Failed => {
            let action = match report.stage {
                StageKind::Build => "build".to_string(),
                StageKind::Upload => format!("upload to {}", upload_suffix(target, report)),
            };
            let message = log_suffix(format!("{} failed to {}", base, action));
            Some(match info {
                Some(info) => format!("{}:\n\n{}", message.trim_end_matches('.'), info),
                None => message,
            })
        }
    }
}

fn with_parenthetical(message: String, info: Option<String>) -> String {
    match info {
        Some(info) => format!("{} ({}).", message.trim_end_matches('.'), info),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component() -> BuildTarget {
        BuildTarget::component("r4.2", "core-qrexec", "/src")
    }

    fn fc42() -> Distribution {
        "vm-fc42".parse().unwrap()
    }

    #[test]
    fn test_built_with_log() {
        let report = StatusReport::new(StageKind::Build, BuildStatus::Built, fc42())
            .build_log(Some("https://example/log".to_string()));
        assert_eq!(
            compose_comment(&component(), &report, 30).unwrap(),
            "Package for vm-fc42 was built ([build log](https://example/log))."
        );
    }

    #[test]
    fn test_building_has_no_comment() {
        let report = StatusReport::new(StageKind::Build, BuildStatus::Building, fc42());
        assert!(compose_comment(&component(), &report, 30).is_none());
    }

    #[test]
    fn test_uploaded_current_reads_stable() {
        let report = StatusReport::new(StageKind::Upload, BuildStatus::Uploaded, fc42())
            .channel(RepositoryChannel::Current);
        assert_eq!(
            compose_comment(&component(), &report, 30).unwrap(),
            "Package for vm-fc42 was uploaded to stable repository."
        );
    }

    #[test]
    fn test_template_messages() {
        let template = BuildTarget::template("r4.2", "fedora-42", fc42(), "202501011200", "/b");
        let report = StatusReport::new(StageKind::Upload, BuildStatus::Failed, fc42())
            .channel(RepositoryChannel::TemplatesItl)
            .build_log(Some("dummy".to_string()));
        assert_eq!(
            compose_comment(&template, &report, 30).unwrap(),
            "Template fedora-42-4.2.0-202501011200 failed to upload to templates-itl repository ([build log](dummy))."
        );
    }

    #[test]
    fn test_iso_upload_links_repository() {
        let host: Distribution = "host-fc41".parse().unwrap();
        let iso = BuildTarget::iso("r4.3", "4.3.0", "/b");
        let report = StatusReport::new(StageKind::Upload, BuildStatus::Uploaded, host.clone())
            .channel(RepositoryChannel::IsoTesting);
        assert_eq!(
            compose_comment(&iso, &report, 30).unwrap(),
            "ISO for r4.3 was uploaded to testing repository."
        );
        let linked = report.repository_url(Some("https://iso.example/iso-testing/".to_string()));
        assert_eq!(
            compose_comment(&iso, &linked, 30).unwrap(),
            "ISO for r4.3 was uploaded to [testing](https://iso.example/iso-testing/) repository."
        );
    }

    #[test]
    fn test_success_info_is_parenthetical() {
        let report = StatusReport::new(StageKind::Build, BuildStatus::Built, fc42())
            .additional_info(Some(AdditionalInfo::message("openQA scheduled")));
        assert_eq!(
            compose_comment(&component(), &report, 30).unwrap(),
            "Package for vm-fc42 was built (openQA scheduled)."
        );
    }

    #[test]
    fn test_failure_info_is_paragraph_with_tail() {
        let report = StatusReport::new(StageKind::Build, BuildStatus::Failed, fc42())
            .build_log(Some("dummy".to_string()))
            .additional_info(Some(AdditionalInfo::with_tail(
                "Invalid something",
                "traceback: boom\n  bim bada boum",
            )));
        let comment = compose_comment(&component(), &report, 30).unwrap();
        assert!(comment.starts_with(
            "Package for vm-fc42 failed to build ([build log](dummy)):\n\n**Additional info:**"
        ));
        assert!(comment.contains("Log tail (last ~30 lines)"));
        assert!(comment.contains("traceback: boom"));
        assert!(comment.contains("bim bada boum"));
    }

    #[test]
    fn test_additional_info_is_bounded_and_keeps_latest_lines() {
        let tail: String = (0..2000).map(|i| format!("line {i}\n")).collect();
        let rendered = format_additional_info("failure", &tail, 30);
        assert!(rendered.chars().count() <= MAX_ADDITIONAL_INFO);
        assert!(rendered.contains("line 1999"));
        assert!(!rendered.contains("line 0\n"));
        assert!(rendered.contains("failure"));

        let long = AdditionalInfo::message("x".repeat(5000)).render(30);
        assert_eq!(long.chars().count(), MAX_ADDITIONAL_INFO);
    }
}
