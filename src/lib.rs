//! # build_notify
//!
//! Build status notifications and build log capture for a multi-stage
//! package build pipeline.
//!
//! The crate drives an external build engine stage group by stage group,
//! captures the stage logs and reports every status change on an issue
//! tracker.
//!
//! ## Features
//!
//! - **Label state machine**: idempotent progress labels per release and distribution
//! - **Log capture**: local file or streaming log service, with a bounded tail for failure reports
//! - **Changelogs**: version and referenced issues derived from git history
//! - **Promotion tracking**: closed-issue comments when fixes reach testing or stable
//! - **Installer testing**: optional openQA scheduling after an installer image upload
//!
//! ## Usage
//!
//! ```bash
//! build_notify build-component ~/builder ~/builder/builder.toml core-qrexec
//! build_notify upload-component ~/builder ~/builder/builder.toml core-qrexec <sha> current
//! build_notify --dry-run build-iso ~/builder ~/builder/builder.toml 4.2.20240101
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod action;
pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod notify;
pub mod openqa;
pub mod state;
pub mod target;

pub use action::{ActionSettings, AutoAction, CommandStageEngine, StageEngine};
pub use capture::{LogLocator, LogTransport, TailBuffer};
pub use cli::Args;
pub use config::BuilderConfig;
pub use error::{ActionError, NotifyError, Result};
pub use github::{GitHubTracker, IssueTracker, MemoryTracker};
pub use notify::{NotificationClient, StatusReport};
pub use state::StateStore;
pub use target::{BuildStatus, BuildTarget, Distribution, RepositoryChannel};
