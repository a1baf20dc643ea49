//! Progress label transitions.

use crate::target::{BuildStatus, RepositoryChannel, StageKind};
use std::collections::BTreeSet;

/// Labels to add to and remove from a tracking issue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelDelta {
    /// Labels to add, in order
    pub add: Vec<String>,
    /// Labels to remove, in order
    pub remove: Vec<String>,
}

impl LabelDelta {
    /// Compute the transition for a report
    ///
    /// `prefix` is the per-distribution label prefix of the target and `release`
    /// the bare release identifier. Unknown channels and any (stage, status) pair
    /// without a transition yield an empty delta.
    pub fn compute(
        stage: StageKind,
        status: BuildStatus,
        channel: Option<&RepositoryChannel>,
        prefix: &str,
        release: &str,
    ) -> Self {
        let p = |suffix: &str| format!("{}-{}", prefix, suffix);
        let r = |suffix: &str| format!("{}-{}", release, suffix);

        match (stage, status) {
            (StageKind::Build, BuildStatus::Building) => Self {
                add: vec![p("building")],
                remove: vec![p("failed")],
            },
            (StageKind::Build, BuildStatus::Failed) => Self {
                add: vec![p("failed")],
                remove: vec![p("building")],
            },
            (StageKind::Build, BuildStatus::Built) => Self {
                add: vec![],
                remove: vec![p("failed"), p("building")],
            },
            (StageKind::Upload, BuildStatus::Uploaded) => {
                let mut remove = vec![p("failed"), p("building")];
                let add = match channel.map(RepositoryChannel::normalized) {
                    Some(RepositoryChannel::Current) => {
                        remove.extend([p("cur-test"), p("sec-test")]);
                        vec![p("stable"), r("stable")]
                    }
                    Some(RepositoryChannel::CurrentTesting) => vec![p("cur-test")],
                    Some(RepositoryChannel::SecurityTesting) => vec![p("sec-test")],
                    Some(RepositoryChannel::TemplatesItl) => {
                        remove.push(r("testing"));
                        vec![r("stable")]
                    }
                    Some(RepositoryChannel::TemplatesCommunity) => {
                        remove.extend([r("testing"), "iso".to_string()]);
                        vec![r("stable")]
                    }
                    Some(
                        RepositoryChannel::TemplatesItlTesting
                        | RepositoryChannel::TemplatesCommunityTesting
                        | RepositoryChannel::IsoTesting,
                    ) => vec![r("testing")],
                    other => {
                        log::warn!(
                            "Ignoring {}",
                            other.map_or_else(|| "missing repository".to_string(), |c| c.to_string())
                        );
                        return Self::default();
                    }
                };
                Self { add, remove }
            }
            _ => Self::default(),
        }
    }

    /// Whether the transition changes nothing
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Apply to a label set: removals first, then additions
    pub fn apply(&self, labels: &mut BTreeSet<String>) {
        for label in &self.remove {
            labels.remove(label);
        }
        labels.extend(self.add.iter().cloned());
    }
}
