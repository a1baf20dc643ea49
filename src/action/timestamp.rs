//! Template build timestamps.

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use std::path::Path;

/// Format of template build timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M";

/// Parse a `%Y%m%d%H%M` timestamp
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .with_context(|| format!("Invalid template timestamp '{}'", raw.trim()))
}

/// Format a timestamp as `%Y%m%d%H%M`
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Timestamp of the last successful build, `None` when never built
pub fn read_build_timestamp(path: &Path) -> Result<Option<NaiveDateTime>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    if raw.trim().is_empty() {
        bail!("Build timestamp file {} is empty", path.display());
    }
    parse_timestamp(&raw).map(Some)
}

/// Record the timestamp of a successful build
pub fn write_build_timestamp(path: &Path, timestamp: &NaiveDateTime) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, format!("{}\n", format_timestamp(timestamp)))
        .with_context(|| format!("Failed to write {}", path.display()))
}
