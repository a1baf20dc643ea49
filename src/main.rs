//! build_notify - run build stages and report their status on the issue tracker.

use build_notify::cli;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            log::error!("Fatal error: {e}");

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                log::info!("Recovery suggestions:");
                for suggestion in suggestions {
                    log::info!("  • {}", suggestion);
                }
            }

            process::exit(1);
        }
    }
}
