//! Distribution identifiers as used by the build engine.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Package set a distribution belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageSet {
    /// Packages installed in the management domain
    Host,
    /// Packages installed in guest templates
    Vm,
}

impl PackageSet {
    /// Lowercase name used in labels, file names and engine arguments
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageSet::Host => "host",
            PackageSet::Vm => "vm",
        }
    }
}

impl fmt::Display for PackageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (package set, name) pair such as `host-fc37` or `vm-bookworm`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Distribution {
    /// Package set
    pub package_set: PackageSet,
    /// Distribution name without package set, e.g. `fc37`
    pub name: String,
}

impl Distribution {
    /// Create a distribution
    pub fn new(package_set: PackageSet, name: impl Into<String>) -> Self {
        Self {
            package_set,
            name: name.into(),
        }
    }

    /// Full identifier, `{package_set}-{name}`
    pub fn fullname(&self) -> String {
        format!("{}-{}", self.package_set, self.name)
    }

    /// Label fragment: `host` for the host package set, the full name otherwise
    pub fn dist_label(&self) -> String {
        match self.package_set {
            PackageSet::Host => "host".to_string(),
            PackageSet::Vm => self.fullname(),
        }
    }

    /// Whether this distribution belongs to the host package set
    pub fn is_host(&self) -> bool {
        self.package_set == PackageSet::Host
    }
}

impl FromStr for Distribution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: "distribution".to_string(),
            reason: format!("'{}': {}", s, reason),
        };
        let (set, name) = s
            .split_once('-')
            .ok_or_else(|| invalid("expected <package-set>-<name>"))?;
        let package_set = match set {
            "host" => PackageSet::Host,
            "vm" => PackageSet::Vm,
            _ => return Err(invalid("package set must be 'host' or 'vm'")),
        };
        if name.is_empty() {
            return Err(invalid("empty distribution name"));
        }
        Ok(Self::new(package_set, name))
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.package_set, self.name)
    }
}

impl Serialize for Distribution {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.fullname())
    }
}

impl<'de> Deserialize<'de> for Distribution {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
