//! Build targets, distributions and the statuses reported for them.

mod channel;
mod distribution;

pub use channel::RepositoryChannel;
pub use distribution::{Distribution, PackageSet};

use crate::error::CliError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Kind of artifact a target produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    /// A source component built into packages for each distribution
    Component {
        /// Component name, e.g. `core-qrexec`
        name: String,
    },
    /// A guest template image
    Template {
        /// Template name, e.g. `fedora-42-xfce`
        name: String,
        /// Distribution the template is built from
        distribution: Distribution,
        /// Build timestamp, `%Y%m%d%H%M`
        timestamp: String,
    },
    /// An installer image
    Iso {
        /// Image version, e.g. `4.2.20240101`
        version: String,
    },
}

/// One thing the pipeline builds and reports on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Release identifier, e.g. `r4.2`
    pub release: String,
    /// Source tree queried for version control history
    pub source_dir: PathBuf,
    /// What is being built
    pub kind: TargetKind,
}

impl BuildTarget {
    /// Component target
    pub fn component(
        release: impl Into<String>,
        name: impl Into<String>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            release: release.into(),
            source_dir: source_dir.into(),
            kind: TargetKind::Component { name: name.into() },
        }
    }

    /// Template target
    pub fn template(
        release: impl Into<String>,
        name: impl Into<String>,
        distribution: Distribution,
        timestamp: impl Into<String>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            release: release.into(),
            source_dir: source_dir.into(),
            kind: TargetKind::Template {
                name: name.into(),
                distribution,
                timestamp: timestamp.into(),
            },
        }
    }

    /// Installer image target
    pub fn iso(
        release: impl Into<String>,
        version: impl Into<String>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            release: release.into(),
            source_dir: source_dir.into(),
            kind: TargetKind::Iso {
                version: version.into(),
            },
        }
    }

    /// Name used in logs and engine arguments
    pub fn name(&self) -> &str {
        match &self.kind {
            TargetKind::Component { name } | TargetKind::Template { name, .. } => name,
            TargetKind::Iso { .. } => "iso",
        }
    }

    /// Release number without the leading `r`
    pub fn release_number(&self) -> &str {
        self.release.strip_prefix('r').unwrap_or(&self.release)
    }

    /// Prefix of every progress label for this target on `dist`
    pub fn label_prefix(&self, dist: &Distribution) -> String {
        match self.kind {
            TargetKind::Component { .. } => format!("{}-{}", self.release, dist.dist_label()),
            TargetKind::Template { .. } | TargetKind::Iso { .. } => self.release.clone(),
        }
    }

    /// Template version, `{release number}.0-{timestamp}`
    pub fn template_version(&self) -> Option<String> {
        match &self.kind {
            TargetKind::Template { timestamp, .. } => {
                Some(format!("{}.0-{}", self.release_number(), timestamp))
            }
            _ => None,
        }
    }

    /// Package name reported for templates and images
    ///
    /// Components are identified through their version control history instead,
    /// see [`crate::notify::TargetIdentity`].
    pub fn package_name(&self, dist: &Distribution) -> String {
        match &self.kind {
            TargetKind::Component { name } => name.clone(),
            TargetKind::Template { name, timestamp, .. } => format!(
                "qubes-template-{}-{}.0-{}",
                name,
                self.release_number(),
                timestamp
            ),
            TargetKind::Iso { version } => format!("iso-{}-{}", dist.name, version),
        }
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TargetKind::Component { name } => write!(f, "component {} ({})", name, self.release),
            TargetKind::Template {
                name, timestamp, ..
            } => write!(f, "template {}-{} ({})", name, timestamp, self.release),
            TargetKind::Iso { version } => write!(f, "iso {} ({})", version, self.release),
        }
    }
}

/// Reported state of a target on one distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    /// Build started
    Building,
    /// Build, sign and publish finished
    Built,
    /// Upload to a repository finished
    Uploaded,
    /// A stage failed
    Failed,
}

impl BuildStatus {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Building => "building",
            BuildStatus::Built => "built",
            BuildStatus::Uploaded => "uploaded",
            BuildStatus::Failed => "failed",
        }
    }
}

impl FromStr for BuildStatus {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "building" => Ok(BuildStatus::Building),
            "built" => Ok(BuildStatus::Built),
            "uploaded" => Ok(BuildStatus::Uploaded),
            "failed" => Ok(BuildStatus::Failed),
            other => Err(CliError::InvalidArguments {
                reason: format!("unknown build status '{}'", other),
            }),
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline phase a report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Fetch, build, sign and publish
    Build,
    /// Upload to a remote repository
    Upload,
}

impl StageKind {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Build => "build",
            StageKind::Upload => "upload",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fc42() -> Distribution {
        "vm-fc42".parse().unwrap()
    }

    #[test]
    fn test_label_prefix_by_kind() {
        let component = BuildTarget::component("r4.2", "core-qrexec", "/src");
        assert_eq!(component.label_prefix(&fc42()), "r4.2-vm-fc42");
        let host: Distribution = "host-fc37".parse().unwrap();
        assert_eq!(component.label_prefix(&host), "r4.2-host");

        let template = BuildTarget::template("r4.2", "fedora-42", fc42(), "202501011200", "/b");
        assert_eq!(template.label_prefix(&fc42()), "r4.2");
        assert_eq!(BuildTarget::iso("r4.3", "4.3.0", "/b").label_prefix(&host), "r4.3");
    }

    #[test]
    fn test_template_package_name() {
        let template = BuildTarget::template("r4.2", "fedora-42", fc42(), "202501011200", "/b");
        assert_eq!(
            template.package_name(&fc42()),
            "qubes-template-fedora-42-4.2.0-202501011200"
        );
        assert_eq!(
            template.template_version().as_deref(),
            Some("4.2.0-202501011200")
        );
    }

    #[test]
    fn test_iso_package_name() {
        let host: Distribution = "host-fc41".parse().unwrap();
        let iso = BuildTarget::iso("r4.3", "4.3.20250101", "/b");
        assert_eq!(iso.package_name(&host), "iso-fc41-4.3.20250101");
        assert_eq!(iso.name(), "iso");
    }

    #[test]
    fn test_build_status_parse() {
        assert_eq!("built".parse::<BuildStatus>().unwrap(), BuildStatus::Built);
        assert!("done".parse::<BuildStatus>().is_err());
    }
}
