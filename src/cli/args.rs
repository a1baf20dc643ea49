//! Command line argument parsing.

use crate::error::CliError;
use crate::target::Distribution;
use clap::Parser;
use std::path::PathBuf;

/// Build status notifications and build log capture
#[derive(Parser, Debug)]
#[command(
    name = "build_notify",
    version,
    about = "Run build stages and report their status on the issue tracker",
    long_about = "Run build stages through the build engine, capture their logs and
report every status change as labels and comments on a tracking issue.

Usage:
  build_notify build-component <BUILDER_DIR> <BUILDER_CONF> core-qrexec
  build_notify upload-component <BUILDER_DIR> <BUILDER_CONF> core-qrexec <SHA> current
  build_notify --dry-run build-template <BUILDER_DIR> <BUILDER_CONF> fedora-42-xfce 202401011200"
)]
pub struct Args {
    /// Log what would run and be reported without doing it
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Directory holding promotion state files
    #[arg(long, global = true, value_name = "DIR", env = "BUILD_NOTIFY_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Append stage logs to this file instead of streaming them to the log service
    #[arg(long, global = true, value_name = "FILE")]
    pub local_log_file: Option<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Builder checkout and configuration shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct BuilderArgs {
    /// Builder working directory
    #[arg(value_name = "BUILDER_DIR")]
    pub builder_dir: PathBuf,

    /// Builder configuration file
    #[arg(value_name = "BUILDER_CONF")]
    pub builder_conf: PathBuf,
}

/// Available commands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch and build a component for every unreleased distribution
    BuildComponent {
        #[command(flatten)]
        builder: BuilderArgs,
        /// Component name
        component: String,
    },

    /// Upload a built component to a repository
    UploadComponent {
        #[command(flatten)]
        builder: BuilderArgs,
        /// Component name
        component: String,
        /// Commit that must still be checked out
        commit_sha: String,
        /// Target repository, e.g. current or security-testing
        repository_publish: String,
        /// Restrict the upload to these distributions
        #[arg(long = "distribution", value_name = "DIST")]
        distributions: Vec<Distribution>,
    },

    /// Build a template
    BuildTemplate {
        #[command(flatten)]
        builder: BuilderArgs,
        /// Template name
        template: String,
        /// Build timestamp, %Y%m%d%H%M
        timestamp: String,
    },

    /// Upload a built template to a repository
    UploadTemplate {
        #[command(flatten)]
        builder: BuilderArgs,
        /// Template name
        template: String,
        /// Template version, {release}.0-{timestamp}
        template_sha: String,
        /// Target repository, e.g. templates-itl
        repository_publish: String,
    },

    /// Build and upload the installer image
    BuildIso {
        #[command(flatten)]
        builder: BuilderArgs,
        /// Image version
        iso_version: String,
        /// Publish to the final rather than the testing repository
        #[arg(long = "final")]
        is_final: bool,
    },
}

impl Command {
    /// Subcommand name
    pub fn name(&self) -> &'static str {
        match self {
            Command::BuildComponent { .. } => "build-component",
            Command::UploadComponent { .. } => "upload-component",
            Command::BuildTemplate { .. } => "build-template",
            Command::UploadTemplate { .. } => "upload-template",
            Command::BuildIso { .. } => "build-iso",
        }
    }

    /// Builder arguments of the command
    pub fn builder(&self) -> &BuilderArgs {
        match self {
            Command::BuildComponent { builder, .. }
            | Command::UploadComponent { builder, .. }
            | Command::BuildTemplate { builder, .. }
            | Command::UploadTemplate { builder, .. }
            | Command::BuildIso { builder, .. } => builder,
        }
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), CliError> {
        let reason = match &self.command {
            Command::UploadTemplate { template_sha, .. } if !template_sha.contains('-') => {
                format!("template version '{}' should be <version>-<timestamp>", template_sha)
            }
            Command::UploadComponent { commit_sha, .. }
                if commit_sha.is_empty() || !commit_sha.chars().all(|c| c.is_ascii_hexdigit()) =>
            {
                format!("'{}' is not a commit hash", commit_sha)
            }
            _ => return Ok(()),
        };
        Err(CliError::InvalidArguments { reason })
    }
}
