//! Builder configuration file.
//!
//! TOML with kebab-case keys:
//!
//! ```toml
//! release = "r4.2"
//! artifacts-dir = "/home/user/artifacts"
//! distributions = ["host-fc37", "vm-bookworm"]
//!
//! [[components]]
//! name = "core-qrexec"
//!
//! [[templates]]
//! name = "fedora-42-xfce"
//! distribution = "vm-fc42"
//!
//! [github]
//! build-report-repo = "QubesOS/updates-status"
//!
//! [openqa]
//! url = "https://openqa.qubes-os.org"
//! api-key = "0123456789ABCDEF"
//! api-secret = "FEDCBA9876543210"
//! ```

use crate::capture::DEFAULT_TAIL_LINES;
use crate::error::{ConfigError, Result};
use crate::target::{Distribution, RepositoryChannel};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default deadline for one target, 6 hours
pub const DEFAULT_TIMEOUT_SECS: u64 = 21600;

/// Default streaming log service command
pub const DEFAULT_BUILD_LOG_COMMAND: [&str; 3] =
    ["qrexec-client-vm", "dom0", "qubesbuilder.BuildLog"];

/// Environment variable holding the tracker token when the file has none
pub const API_KEY_ENV: &str = "GITHUB_API_KEY";

/// Whole configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BuilderConfig {
    /// Release identifier, e.g. `r4.2`
    pub release: String,
    /// Root of build artifacts
    pub artifacts_dir: PathBuf,
    /// Default per-target deadline in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Days a testing update waits before promotion
    #[serde(default = "default_min_age_days")]
    pub min_age_days: u32,
    /// Distributions components are built for
    #[serde(default)]
    pub distributions: Vec<Distribution>,
    /// Buildable components
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
    /// Buildable templates
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
    /// Channels freshly built artifacts are uploaded to
    #[serde(default)]
    pub repository_publish: PublishConfig,
    /// Tracker settings
    #[serde(default)]
    pub github: GitHubConfig,
    /// Build engine settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Build log capture settings
    #[serde(default)]
    pub build_log: BuildLogConfig,
    /// Installer test scheduling, disabled when absent
    pub openqa: Option<OpenQaConfig>,
}

/// One component
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ComponentConfig {
    /// Component name
    pub name: String,
    /// Source checkout, defaults to `{artifacts-dir}/sources/{name}`
    pub source_dir: Option<PathBuf>,
    /// Deadline override in seconds
    pub timeout: Option<u64>,
}

/// One template
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TemplateConfig {
    /// Template name
    pub name: String,
    /// Distribution the template is built from
    pub distribution: Distribution,
    /// Deadline override in seconds
    pub timeout: Option<u64>,
}

/// Upload channels for freshly built artifacts
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PublishConfig {
    /// Channel for components
    #[serde(default = "default_component_channel")]
    pub components: String,
    /// Channel for templates
    #[serde(default = "default_template_channel")]
    pub templates: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            components: default_component_channel(),
            templates: default_template_channel(),
        }
    }
}

/// Tracker settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GitHubConfig {
    /// API token, falls back to `GITHUB_API_KEY`
    pub api_key: Option<String>,
    /// API endpoint
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Repository holding tracking issues
    #[serde(default = "default_report_repo")]
    pub build_report_repo: String,
    /// Repository the log service stores logs in
    #[serde(default = "default_logs_repo")]
    pub logs_repo: String,
    /// Repository holding referenced and closed issues
    #[serde(default = "default_issues_repo")]
    pub issues_repo: String,
    /// Prefix turning a component name into its repository
    #[serde(default = "default_repo_prefix")]
    pub repo_prefix: String,
    /// Base URL installer images are published under
    pub iso_base_url: Option<String>,
    /// Directory overriding built-in message templates
    pub message_templates_dir: Option<PathBuf>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_api_base(),
            build_report_repo: default_report_repo(),
            logs_repo: default_logs_repo(),
            issues_repo: default_issues_repo(),
            repo_prefix: default_repo_prefix(),
            iso_base_url: None,
            message_templates_dir: None,
        }
    }
}

impl GitHubConfig {
    /// Token from the file, or from the environment
    pub fn token(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Build engine settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngineConfig {
    /// Engine command, defaults to `{builder-dir}/qb --builder-conf {config}`
    pub command: Option<Vec<String>>,
    /// Command answering release status queries, defaults to `command`
    pub status_command: Option<Vec<String>>,
}

impl EngineConfig {
    /// Stage command for a builder checkout and configuration file
    pub fn stage_command(&self, builder_dir: &Path, builder_conf: &Path) -> Vec<String> {
        self.command.clone().unwrap_or_else(|| {
            vec![
                builder_dir.join("qb").display().to_string(),
                "--builder-conf".to_string(),
                builder_conf.display().to_string(),
            ]
        })
    }

    /// Release status command, falling back to the stage command
    pub fn release_status_command(&self, builder_dir: &Path, builder_conf: &Path) -> Vec<String> {
        self.status_command
            .clone()
            .unwrap_or_else(|| self.stage_command(builder_dir, builder_conf))
    }
}

/// Build log capture settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BuildLogConfig {
    /// Streaming log service command
    #[serde(default = "default_build_log_command")]
    pub command: Vec<String>,
    /// Lines kept for failure reports
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    /// Seconds to wait for the log service to report a location
    #[serde(default = "default_finish_timeout")]
    pub finish_timeout: u64,
}

impl Default for BuildLogConfig {
    fn default() -> Self {
        Self {
            command: default_build_log_command(),
            tail_lines: default_tail_lines(),
            finish_timeout: default_finish_timeout(),
        }
    }
}

/// openQA instance testing freshly uploaded installer images
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OpenQaConfig {
    /// Web UI root, the API lives under `api/v1/`
    pub url: String,
    /// API key
    pub api_key: String,
    /// API secret used to sign requests
    pub api_secret: String,
    /// `DISTRI` of scheduled jobs
    #[serde(default = "default_openqa_distri")]
    pub distri: String,
    /// `FLAVOR` of scheduled jobs
    #[serde(default = "default_openqa_flavor")]
    pub flavor: String,
    /// `ARCH` of scheduled jobs and of the image file name
    #[serde(default = "default_openqa_arch")]
    pub arch: String,
    /// Job group shown in the result overview link
    #[serde(default = "default_openqa_group")]
    pub group_id: u32,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_min_age_days() -> u32 {
    5
}
fn default_component_channel() -> String {
    "current-testing".to_string()
}
fn default_template_channel() -> String {
    "templates-itl-testing".to_string()
}
fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_report_repo() -> String {
    "QubesOS/updates-status".to_string()
}
fn default_logs_repo() -> String {
    "QubesOS/build-logs".to_string()
}
fn default_issues_repo() -> String {
    "QubesOS/qubes-issues".to_string()
}
fn default_repo_prefix() -> String {
    "QubesOS/qubes-".to_string()
}
fn default_build_log_command() -> Vec<String> {
    DEFAULT_BUILD_LOG_COMMAND.iter().map(|s| s.to_string()).collect()
}
fn default_tail_lines() -> usize {
    DEFAULT_TAIL_LINES
}
fn default_finish_timeout() -> u64 {
    60
}
fn default_openqa_distri() -> String {
    "qubesos".to_string()
}
fn default_openqa_flavor() -> String {
    "install-iso".to_string()
}
fn default_openqa_arch() -> String {
    "x86_64".to_string()
}
fn default_openqa_group() -> u32 {
    1
}

impl BuilderConfig {
    /// Read and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text)
    }

    /// Parse and validate configuration text
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !self.release.starts_with('r') {
            return Err(ConfigError::InvalidValue {
                key: "release".to_string(),
                reason: format!("'{}' should look like r4.2", self.release),
            });
        }
        if self.timeout == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.build_log.command.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "build-log.command".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Component entry by name
    pub fn component(&self, name: &str) -> Result<&ComponentConfig> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                ConfigError::UnknownComponent {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Template entry by name
    pub fn template(&self, name: &str) -> Result<&TemplateConfig> {
        self.templates
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| {
                ConfigError::UnknownTemplate {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Source checkout of a component
    pub fn component_source_dir(&self, component: &ComponentConfig) -> PathBuf {
        component
            .source_dir
            .clone()
            .unwrap_or_else(|| self.artifacts_dir.join("sources").join(&component.name))
    }

    /// File recording the last built timestamp of a template
    pub fn template_timestamp_file(&self, name: &str) -> PathBuf {
        self.artifacts_dir
            .join("templates")
            .join(format!("build_timestamp_{}", name))
    }

    /// Deadline for a target, given its override
    pub fn deadline(&self, target_timeout: Option<u64>) -> Duration {
        Duration::from_secs(target_timeout.unwrap_or(self.timeout))
    }

    /// Upload channel for components
    pub fn component_channel(&self) -> RepositoryChannel {
        RepositoryChannel::from(self.repository_publish.components.as_str())
    }

    /// Upload channel for templates
    pub fn template_channel(&self) -> RepositoryChannel {
        RepositoryChannel::from(self.repository_publish.templates.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
release = "r4.2"
artifacts-dir = "/var/lib/builder/artifacts"
distributions = ["host-fc37", "vm-bookworm"]

[[components]]
name = "core-qrexec"
timeout = 600

[[templates]]
name = "fedora-42-xfce"
distribution = "vm-fc42"

[github]
api-key = "secret"
iso-base-url = "https://ftp.example.org/qubes/"
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = BuilderConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.min_age_days, 5);
        assert_eq!(config.github.build_report_repo, "QubesOS/updates-status");
        assert_eq!(config.github.logs_repo, "QubesOS/build-logs");
        assert_eq!(config.build_log.tail_lines, 30);
        assert_eq!(config.build_log.command, default_build_log_command());
        assert_eq!(config.component_channel(), RepositoryChannel::CurrentTesting);
        assert_eq!(config.github.token().as_deref(), Some("secret"));
        assert!(config.openqa.is_none());
    }

    #[test]
    fn test_openqa_section() {
        let text = format!(
            "{}\n[openqa]\nurl = \"https://openqa.example.org\"\napi-key = \"k\"\napi-secret = \"s\"\n",
            SAMPLE
        );
        let config = BuilderConfig::parse(&text).unwrap();
        let openqa = config.openqa.unwrap();
        assert_eq!(openqa.distri, "qubesos");
        assert_eq!(openqa.flavor, "install-iso");
        assert_eq!(openqa.arch, "x86_64");
        assert_eq!(openqa.group_id, 1);
        assert!(BuilderConfig::parse(&format!("{}\n[openqa]\nurl = \"x\"\n", SAMPLE)).is_err());
    }

    #[test]
    fn test_component_lookup_and_paths() {
        let config = BuilderConfig::parse(SAMPLE).unwrap();
        let component = config.component("core-qrexec").unwrap();
        assert_eq!(
            config.component_source_dir(component),
            PathBuf::from("/var/lib/builder/artifacts/sources/core-qrexec")
        );
        assert_eq!(config.deadline(component.timeout), Duration::from_secs(600));
        assert!(config.component("missing").is_err());
        assert_eq!(
            config.template_timestamp_file("fedora-42-xfce"),
            PathBuf::from("/var/lib/builder/artifacts/templates/build_timestamp_fedora-42-xfce")
        );
    }

    #[test]
    fn test_engine_command_defaults() {
        let config = BuilderConfig::parse(SAMPLE).unwrap();
        let command = config
            .engine
            .stage_command(Path::new("/builder"), Path::new("/builder/builder.yml"));
        assert_eq!(
            command,
            vec!["/builder/qb", "--builder-conf", "/builder/builder.yml"]
        );
        assert_eq!(
            config
                .engine
                .release_status_command(Path::new("/builder"), Path::new("/builder/builder.yml")),
            command
        );
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(BuilderConfig::parse("release = \"4.2\"\nartifacts-dir = \"/a\"").is_err());
        assert!(BuilderConfig::parse("release = \"r4.2\"\nartifacts-dir = \"/a\"\nbogus = 1").is_err());
        assert!(
            BuilderConfig::parse(
                "release = \"r4.2\"\nartifacts-dir = \"/a\"\ndistributions = [\"dom0-fc37\"]"
            )
            .is_err()
        );
    }
}
