//! Command line interface for build_notify.

mod args;
pub mod commands;

pub use args::{Args, BuilderArgs, Command};
pub use commands::execute_command;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}

