//! Error types for build notification and log capture.
//!
//! This module defines all error types with actionable error messages and recovery suggestions.

use crate::capture::LogLocator;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for build_notify operations
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Main error type for all build_notify operations
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Build action errors
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    /// Issue tracker errors
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// Git operation errors
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// Installer test scheduling errors
    #[error("openQA error: {0}")]
    OpenQa(#[from] OpenQaError),

    /// State management errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Outcomes of a build action that are not plain success
#[derive(Error, Debug)]
pub enum ActionError {
    /// A build stage reported failure
    #[error("{message}")]
    PipelineFailure {
        /// Failure message from the build engine
        message: String,
        /// Where the stage log was stored, if resolved
        log: Option<LogLocator>,
        /// Last lines of the stage log
        tail: Option<String>,
    },

    /// The action exceeded its deadline
    #[error("Timeout for {target} after {} seconds", .after.as_secs())]
    Timeout {
        /// Target being processed
        target: String,
        /// Deadline that expired
        after: Duration,
    },

    /// The requested commit is no longer the head of the source tree
    #[error("{expected} != {actual}. Skipping.")]
    CommitMismatch {
        /// Commit requested for upload
        expected: String,
        /// Commit currently checked out
        actual: String,
    },

    /// Any other failure raised while processing a target
    #[error("Internal error: '{kind}': {message}")]
    Internal {
        /// Short error kind used in reports
        kind: String,
        /// Full error message for logs
        message: String,
    },
}

impl ActionError {
    /// Wrap any other error as an internal error, keeping its kind name
    pub fn internal(kind: &str, error: impl std::fmt::Display) -> Self {
        ActionError::Internal {
            kind: kind.to_string(),
            message: error.to_string(),
        }
    }
}

/// Issue tracker errors
#[derive(Error, Debug)]
pub enum TrackerError {
    /// No API token available
    #[error("No API token configured")]
    MissingToken,

    /// Invalid repository reference
    #[error("Invalid repository '{repo}': expected owner/name")]
    InvalidRepository {
        /// Repository string
        repo: String,
    },

    /// HTTP request could not be sent or completed
    #[error("Request for {operation} failed: {reason}")]
    Transport {
        /// Operation being performed
        operation: String,
        /// Reason for the error
        reason: String,
        /// Whether the failure was a timeout or connection issue
        retryable: bool,
    },

    /// API returned an error status
    #[error("API {operation} failed with status {status}: {body}")]
    Status {
        /// Operation being performed
        operation: String,
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Response could not be decoded
    #[error("Failed to decode {operation} response: {reason}")]
    Decode {
        /// Operation being performed
        operation: String,
        /// Reason for the error
        reason: String,
    },

    /// Referenced issue does not exist
    #[error("Issue #{number} not found in {repo}")]
    IssueNotFound {
        /// Repository
        repo: String,
        /// Issue number
        number: u64,
    },
}

impl TrackerError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TrackerError::Transport { retryable, .. } => *retryable,
            TrackerError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

/// openQA scheduling errors
#[derive(Error, Debug)]
pub enum OpenQaError {
    /// Configured instance URL is unusable
    #[error("Invalid openQA URL '{url}': {reason}")]
    InvalidUrl {
        /// Configured URL
        url: String,
        /// Reason for the error
        reason: String,
    },

    /// Request could not be sent or completed
    #[error("openQA request failed: {reason}")]
    Request {
        /// Reason for the error
        reason: String,
    },

    /// Instance answered with an error status
    #[error("openQA returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },
}

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Not a git repository
    #[error("Not a git repository: {path}")]
    NotRepository {
        /// Path that was queried
        path: PathBuf,
    },

    /// Git command failed
    #[error("git {command} failed: {reason}")]
    CommandFailed {
        /// Git arguments
        command: String,
        /// Reason for the error
        reason: String,
    },
}

/// State management errors
#[derive(Error, Debug)]
pub enum StateError {
    /// State file exists but holds no commit
    #[error("State file {path} is corrupted: {reason}")]
    Corrupted {
        /// State file path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Failed to save state
    #[error("Failed to save state to {path}: {reason}")]
    SaveFailed {
        /// State file path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Failed to load state
    #[error("Failed to load state from {path}: {reason}")]
    LoadFailed {
        /// State file path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Cannot read configuration {path}: {reason}")]
    Unreadable {
        /// Configuration file path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue {
        /// Configuration key
        key: String,
        /// Reason for the error
        reason: String,
    },

    /// Component not present in configuration
    #[error("Cannot find component '{name}' in configuration")]
    UnknownComponent {
        /// Component name
        name: String,
    },

    /// Template not present in configuration
    #[error("Cannot find template '{name}' in configuration")]
    UnknownTemplate {
        /// Template name
        name: String,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl NotifyError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            NotifyError::Tracker(TrackerError::MissingToken) => vec![
                "Set api-key in the [github] section of the builder configuration".to_string(),
                "Or export GITHUB_API_KEY before running".to_string(),
            ],
            NotifyError::Tracker(TrackerError::Status { status: 401, .. }) => vec![
                "Verify the API token is valid and not expired".to_string(),
            ],
            NotifyError::Tracker(TrackerError::Status { status: 403, .. }) => vec![
                "Check that the token has issues write permission on the report repository"
                    .to_string(),
            ],
            NotifyError::Git(GitError::NotRepository { path }) => vec![
                format!("Check that {} is a git checkout", path.display()),
                "Run the fetch stage before uploading".to_string(),
            ],
            NotifyError::Config(ConfigError::UnknownComponent { name }) => vec![
                format!("Add a [[components]] entry named '{}'", name),
            ],
            NotifyError::Config(ConfigError::UnknownTemplate { name }) => vec![
                format!("Add a [[templates]] entry named '{}'", name),
            ],
            NotifyError::Action(ActionError::Timeout { .. }) => vec![
                "Increase the timeout for this target in the builder configuration".to_string(),
                "Inspect the build log of the last stage for a hung process".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Short name of the error category, used in internal error reports
    pub fn kind(&self) -> &'static str {
        match self {
            NotifyError::Action(_) => "ActionError",
            NotifyError::Tracker(_) => "TrackerError",
            NotifyError::Git(_) => "GitError",
            NotifyError::OpenQa(_) => "OpenQaError",
            NotifyError::State(_) => "StateError",
            NotifyError::Config(_) => "ConfigError",
            NotifyError::Cli(_) => "CliError",
            NotifyError::Io(_) => "IOError",
            NotifyError::Json(_) => "JsonError",
            NotifyError::Toml(_) => "TomlError",
            NotifyError::Anyhow(_) => "Error",
        }
    }

    /// Whether this error means processing of sibling targets may continue
    pub fn is_commit_mismatch(&self) -> bool {
        matches!(self, NotifyError::Action(ActionError::CommitMismatch { .. }))
    }
}
