//! State file storage with atomic replacement.

use crate::error::{Result, StateError};
use crate::target::{Distribution, RepositoryChannel};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Identifies one state record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    /// Release identifier
    pub release: String,
    /// Component name, or `template` for templates
    pub target: String,
    /// Distribution the packages were built for
    pub dist: Distribution,
    /// Channel the packages were promoted to
    pub channel: RepositoryChannel,
}

impl StateKey {
    /// Create a key; `stable` is stored as `current`
    pub fn new(
        release: impl Into<String>,
        target: impl Into<String>,
        dist: Distribution,
        channel: &RepositoryChannel,
    ) -> Self {
        Self {
            release: release.into(),
            target: target.into(),
            dist,
            channel: channel.normalized(),
        }
    }

    /// Same key on another channel
    pub fn with_channel(&self, channel: &RepositoryChannel) -> Self {
        Self {
            channel: channel.normalized(),
            ..self.clone()
        }
    }

    /// `{release}-{target}-{package_set}-{dist}-{channel}`
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            self.release, self.target, self.dist.package_set, self.dist.name, self.channel
        )
    }
}

/// Directory of state records
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default location, `~/github-notify-state`
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("github-notify-state")
    }

    /// Path of the record for `key`
    pub fn path(&self, key: &StateKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Read the last promoted commit, `None` when never promoted
    pub fn load(&self, key: &StateKey) -> Result<Option<String>> {
        let path = self.path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StateError::LoadFailed {
                    path,
                    reason: e.to_string(),
                }
                .into());
            }
        };

        let commit = content.trim();
        if commit.is_empty() {
            return Err(StateError::Corrupted {
                path,
                reason: "empty state file".to_string(),
            }
            .into());
        }
        Ok(Some(commit.to_string()))
    }

    /// Replace the record for `key` with `commit`
    ///
    /// The commit is written to a temporary file which is then renamed over
    /// the record, so readers never observe a partial write.
    pub fn save(&self, key: &StateKey, commit: &str) -> Result<()> {
        let path = self.path(key);
        let save_failed = |reason: String| StateError::SaveFailed {
            path: path.clone(),
            reason,
        };

        fs::create_dir_all(&self.dir)
            .map_err(|e| save_failed(format!("Failed to create state directory: {}", e)))?;

        let tmp = temp_path(&path);
        {
            let mut file = fs::File::create(&tmp)
                .map_err(|e| save_failed(format!("Failed to create temp file: {}", e)))?;
            file.write_all(commit.trim().as_bytes())
                .map_err(|e| save_failed(format!("Failed to write temp file: {}", e)))?;
            file.sync_all()
                .map_err(|e| save_failed(format!("Failed to sync temp file: {}", e)))?;
        }

        fs::rename(&tmp, &path)
            .map_err(|e| save_failed(format!("Failed to move temp file into place: {}", e)))?;

        log::debug!("Saved {} to {}", commit, path.display());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(channel: &str) -> StateKey {
        StateKey::new(
            "r4.2",
            "core-qrexec",
            "vm-bookworm".parse().unwrap(),
            &RepositoryChannel::from(channel),
        )
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            key("current-testing").file_name(),
            "r4.2-core-qrexec-vm-bookworm-current-testing"
        );
        assert_eq!(key("stable").file_name(), "r4.2-core-qrexec-vm-bookworm-current");
    }

    #[test]
    fn test_missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert_eq!(store.load(&key("current")).unwrap(), None);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested"));
        let k = key("current-testing");
        store.save(&k, "aaaa\n").unwrap();
        store.save(&k, "bbbb").unwrap();
        assert_eq!(store.load(&k).unwrap().as_deref(), Some("bbbb"));
        assert!(!temp_path(&store.path(&k)).exists());
    }

    #[test]
    fn test_empty_record_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let k = key("current");
        fs::write(store.path(&k), "  \n").unwrap();
        assert!(store.load(&k).is_err());
    }
}
