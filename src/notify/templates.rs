//! Message templates with `@PLACEHOLDER@` substitution.

use crate::target::{Distribution, RepositoryChannel};
use std::path::PathBuf;

/// Issue body for component updates
pub const COMPONENT_REPORT: &str = "message-build-report";
/// Issue body for templates
pub const TEMPLATE_REPORT: &str = "message-build-report-template";
/// Issue body for installer images
pub const ISO_REPORT: &str = "message-build-report-iso";

fn builtin(name: &str) -> Option<&'static str> {
    Some(match name {
        COMPONENT_REPORT => include_str!("../../templates/message-build-report"),
        TEMPLATE_REPORT => include_str!("../../templates/message-build-report-template"),
        ISO_REPORT => include_str!("../../templates/message-build-report-iso"),
        "message-current-testing-vm" => include_str!("../../templates/message-current-testing-vm"),
        "message-current-testing-host" => {
            include_str!("../../templates/message-current-testing-host")
        }
        "message-stable-vm" => include_str!("../../templates/message-stable-vm"),
        "message-stable-host" => include_str!("../../templates/message-stable-host"),
        _ => return None,
    })
}

/// Template lookup: an optional directory first, built-in defaults second
#[derive(Debug, Clone, Default)]
pub struct MessageTemplates {
    dir: Option<PathBuf>,
}

impl MessageTemplates {
    /// Built-in templates only
    pub fn builtin() -> Self {
        Self { dir: None }
    }

    /// Templates from `dir`, falling back to built-in ones
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Raw template text
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(dir) = &self.dir {
            let path = dir.join(name);
            match std::fs::read_to_string(&path) {
                Ok(text) => return Some(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Cannot read template {}: {}", path.display(), e),
            }
        }
        builtin(name).map(str::to_string)
    }

    /// Closing comment template for promotion of `dist` to `channel`
    ///
    /// Looked up as `message-{channel}-{package_set}-{dist name}`, then with the
    /// full distribution name, then without distribution.
    pub fn closing(&self, channel: &RepositoryChannel, dist: &Distribution) -> Option<String> {
        let base = format!("message-{}-{}", channel.report_name(), dist.package_set);
        [
            format!("{}-{}", base, dist.name),
            format!("{}-{}", base, dist.fullname()),
            base,
        ]
        .iter()
        .find_map(|name| self.get(name))
    }
}

/// Replace every `@KEY@` placeholder listed in `values`
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("@{}@", key), value)
        })
}
