//! Command line smoke tests.

mod common;

#[cfg(test)]
mod tests {
    use super::common::tagged_repo;
    use assert_cmd::Command;
    use predicates::prelude::*;

    fn build_notify() -> Command {
        let mut cmd = Command::cargo_bin("build_notify").unwrap();
        cmd.env_remove("GITHUB_API_KEY")
            .env_remove("BUILD_NOTIFY_STATE_DIR")
            .env("RUST_LOG", "info");
        cmd
    }

    #[test]
    fn test_help_lists_commands() {
        build_notify()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build-component"))
            .stdout(predicate::str::contains("upload-template"))
            .stdout(predicate::str::contains("--dry-run"));
    }

    #[test]
    fn test_missing_configuration_fails() {
        let dir = tempfile::tempdir().unwrap();
        build_notify()
            .arg("build-component")
            .arg(dir.path())
            .arg(dir.path().join("missing.toml"))
            .arg("core-qrexec")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Cannot read configuration"));
    }

    #[test]
    fn test_unknown_component_fails() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("builder.toml");
        std::fs::write(
            &conf,
            format!(
                "release = \"r4.2\"\nartifacts-dir = \"{}\"\n",
                dir.path().join("artifacts").display()
            ),
        )
        .unwrap();
        build_notify()
            .arg("build-component")
            .arg(dir.path())
            .arg(&conf)
            .arg("core-qrexec")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Cannot find component 'core-qrexec'"));
    }

    #[test]
    fn test_dry_run_template_build() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("builder.toml");
        std::fs::write(
            &conf,
            format!(
                r#"release = "r4.2"
artifacts-dir = "{}"
distributions = ["vm-bookworm"]

[[templates]]
name = "debian-12-xfce"
distribution = "vm-bookworm"
"#,
                dir.path().join("artifacts").display()
            ),
        )
        .unwrap();
        build_notify()
            .arg("--dry-run")
            .arg("--local-log-file")
            .arg(dir.path().join("build.log"))
            .arg("build-template")
            .arg(dir.path())
            .arg(&conf)
            .arg("debian-12-xfce")
            .arg("202401011200")
            .assert()
            .success()
            .stderr(predicate::str::contains("[DRY-RUN]"));
        assert!(!dir.path().join("build.log").exists());
        assert!(
            !dir.path()
                .join("artifacts/templates/build_timestamp_debian-12-xfce")
                .exists()
        );
    }

    #[test]
    fn test_moved_component_upload_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("core-qrexec");
        std::fs::create_dir_all(&source).unwrap();
        tagged_repo(&source);
        let conf = dir.path().join("builder.toml");
        std::fs::write(
            &conf,
            format!(
                r#"release = "r4.2"
artifacts-dir = "{}"
distributions = ["vm-bookworm"]

[[components]]
name = "core-qrexec"
source-dir = "{}"
"#,
                dir.path().join("artifacts").display(),
                source.display()
            ),
        )
        .unwrap();
        build_notify()
            .arg("upload-component")
            .arg(dir.path())
            .arg(&conf)
            .arg("core-qrexec")
            .arg("0000000")
            .arg("current")
            .assert()
            .success()
            .stderr(predicate::str::contains("0000000"));
    }

    #[test]
    fn test_invalid_template_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        build_notify()
            .arg("upload-template")
            .arg(dir.path())
            .arg(dir.path().join("builder.toml"))
            .arg("debian-12-xfce")
            .arg("202401011200")
            .arg("templates-itl")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid arguments"));
    }
}
