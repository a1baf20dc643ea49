//! Repository channels packages and images are promoted through.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Destination repository of an upload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RepositoryChannel {
    /// Stable component repository
    Current,
    /// Component testing repository
    CurrentTesting,
    /// Component security testing repository
    SecurityTesting,
    /// Alias of `current` used in commands
    Stable,
    /// Official template repository
    TemplatesItl,
    /// Official template testing repository
    TemplatesItlTesting,
    /// Community template repository
    TemplatesCommunity,
    /// Community template testing repository
    TemplatesCommunityTesting,
    /// Final installer images
    Iso,
    /// Installer image testing area
    IsoTesting,
    /// Unstable repository, never reported with labels
    Unstable,
    /// Any other repository name, preserved verbatim
    Other(String),
}

impl RepositoryChannel {
    /// Repository name as used by the build engine and in messages
    pub fn as_str(&self) -> &str {
        match self {
            RepositoryChannel::Current => "current",
            RepositoryChannel::CurrentTesting => "current-testing",
            RepositoryChannel::SecurityTesting => "security-testing",
            RepositoryChannel::Stable => "stable",
            RepositoryChannel::TemplatesItl => "templates-itl",
            RepositoryChannel::TemplatesItlTesting => "templates-itl-testing",
            RepositoryChannel::TemplatesCommunity => "templates-community",
            RepositoryChannel::TemplatesCommunityTesting => "templates-community-testing",
            RepositoryChannel::Iso => "iso",
            RepositoryChannel::IsoTesting => "iso-testing",
            RepositoryChannel::Unstable => "unstable",
            RepositoryChannel::Other(name) => name,
        }
    }

    /// `stable` is reported and stored as `current`
    pub fn normalized(&self) -> RepositoryChannel {
        match self {
            RepositoryChannel::Stable => RepositoryChannel::Current,
            other => other.clone(),
        }
    }

    /// Name used in comments and closing message templates; `current` reads as `stable`
    pub fn report_name(&self) -> &str {
        match self {
            RepositoryChannel::Current | RepositoryChannel::Stable => "stable",
            other => other.as_str(),
        }
    }

    /// Whether promotion to this channel closes referenced issues
    pub fn closes_issues(&self) -> bool {
        matches!(
            self.normalized(),
            RepositoryChannel::Current | RepositoryChannel::CurrentTesting
        )
    }
}

impl FromStr for RepositoryChannel {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "current" => RepositoryChannel::Current,
            "current-testing" => RepositoryChannel::CurrentTesting,
            "security-testing" => RepositoryChannel::SecurityTesting,
            "stable" => RepositoryChannel::Stable,
            "templates-itl" => RepositoryChannel::TemplatesItl,
            "templates-itl-testing" => RepositoryChannel::TemplatesItlTesting,
            "templates-community" => RepositoryChannel::TemplatesCommunity,
            "templates-community-testing" => RepositoryChannel::TemplatesCommunityTesting,
            "iso" => RepositoryChannel::Iso,
            "iso-testing" => RepositoryChannel::IsoTesting,
            "unstable" => RepositoryChannel::Unstable,
            other => RepositoryChannel::Other(other.to_string()),
        })
    }
}

impl From<&str> for RepositoryChannel {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(channel) => channel,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for RepositoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
