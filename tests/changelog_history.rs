//! Changelog extraction against real git histories.

mod common;

#[cfg(test)]
mod tests {
    use super::common::{commit, git, tag, tagged_repo};
    use build_notify::git::ChangelogExtractor;

    fn extractor(dir: &std::path::Path) -> ChangelogExtractor {
        ChangelogExtractor::new(
            dir,
            "https://github.com/QubesOS/qubes-core-qrexec",
            "QubesOS/qubes-issues",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_tagged_history_without_references() {
        let dir = tempfile::tempdir().unwrap();
        tagged_repo(dir.path());

        let changes = extractor(dir.path()).package_changes(None).await.unwrap();
        assert_eq!(changes.version, "v1.1");
        assert_eq!(changes.previous_version, "v1.0");
        assert!(!changes.shortlog.is_empty());
        assert!(changes.shortlog.contains("QubesOS/qubes-core-qrexec@"));
        assert!(changes.shortlog.contains("Update translations"));
        assert!(changes.referenced_issues.is_empty());
    }

    #[tokio::test]
    async fn test_referenced_and_closed_issues() {
        let dir = tempfile::tempdir().unwrap();
        let first = tagged_repo(dir.path());
        commit(
            dir.path(),
            "Handle EINTR\n\nFixes QubesOS/qubes-issues#4321\nSee https://github.com/QubesOS/qubes-issues/issues/99",
        );
        let last = commit(dir.path(), "Refactor\n\nQubesOS/qubes-issues#4321");
        tag(dir.path(), "v1.2");

        let extractor = extractor(dir.path());
        let changes = extractor.package_changes(None).await.unwrap();
        assert_eq!(changes.version, "v1.2");
        assert_eq!(changes.previous_version, "v1.1");
        assert_eq!(changes.referenced_issues, vec![99, 4321]);
        assert_eq!(
            changes.render_issues("QubesOS/qubes-issues"),
            "QubesOS/qubes-issues#99\nQubesOS/qubes-issues#4321"
        );

        assert_eq!(extractor.closed_issues(&first, &last).await.unwrap(), vec![4321]);
    }

    #[tokio::test]
    async fn test_previous_commit_resolves_to_tag() {
        let dir = tempfile::tempdir().unwrap();
        let released = tagged_repo(dir.path());
        commit(dir.path(), "Fix build");
        tag(dir.path(), "v1.2");

        let changes = extractor(dir.path())
            .package_changes(Some(&released))
            .await
            .unwrap();
        assert_eq!(changes.previous_version, "v1.1");
        assert_eq!(changes.version, "v1.2");
    }

    #[tokio::test]
    async fn test_single_commit_history() {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        commit(dir.path(), "Initial import");
        tag(dir.path(), "v0.1");

        let changes = extractor(dir.path()).package_changes(None).await.unwrap();
        assert_eq!(changes.version, "v0.1");
        assert_eq!(changes.previous_version, "v0.1");
        assert!(changes.shortlog.is_empty());
    }
}
