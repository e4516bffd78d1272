//! Integration tests for Stowage

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn stowage() -> Command {
        let mut cmd = cargo_bin_cmd!("stowage");
        for var in [
            "STOWAGE_CONFIG",
            "STOWAGE_STORAGE_ROOT",
            "STOWAGE_PATH",
            "STOWAGE_FILENAME",
            "STOWAGE_MOUNT",
            "STOWAGE_FALLBACK_PATH",
            "STOWAGE_FLUSH_PATH",
            "STOWAGE_FLUSH_AGE",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    /// Command bound to a working directory and storage root
    fn stowage_in(workdir: &Path, storage: &Path) -> Command {
        let mut cmd = stowage();
        cmd.arg("-C").arg(workdir).arg("--storage-root").arg(storage);
        cmd
    }

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/left-pad")).unwrap();
        fs::write(dir.path().join("node_modules/left-pad/index.js"), "pad").unwrap();
        fs::write(dir.path().join("build.log"), "ok").unwrap();
        fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
        dir
    }

    #[test]
    fn help_displays() {
        stowage()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build cache"));
    }

    #[test]
    fn version_displays() {
        stowage()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stowage"));
    }

    #[test]
    fn rebuild_then_restore() {
        let ws = workspace();
        let storage = TempDir::new().unwrap();

        stowage_in(ws.path(), storage.path())
            .args([
                "rebuild",
                "--path",
                "cache/{{ .Repo }}",
                "--filename",
                "deps.tgz",
                "--mount",
                "node_modules,build.log",
                "--meta",
                "Repo=app",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache rebuilt at cache/app/deps.tgz"));

        assert!(storage.path().join("cache/app/deps.tgz").is_file());

        let target = TempDir::new().unwrap();
        stowage_in(target.path(), storage.path())
            .args(["restore", "--path", "cache/app", "--filename", "deps.tgz"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache restored from cache/app/deps.tgz"));

        assert_eq!(
            fs::read_to_string(target.path().join("node_modules/left-pad/index.js")).unwrap(),
            "pad"
        );
        assert_eq!(fs::read_to_string(target.path().join("build.log")).unwrap(), "ok");
    }

    #[test]
    fn checksum_key_skips_second_rebuild() {
        let ws = workspace();
        let storage = TempDir::new().unwrap();
        let args = [
            "rebuild",
            "--path",
            r#"cache/{{ checksum "package-lock.json" }}"#,
            "--filename",
            "deps.tar",
            "--mount",
            "node_modules",
        ];

        stowage_in(ws.path(), storage.path())
            .args(args)
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache rebuilt"));

        stowage_in(ws.path(), storage.path())
            .args(args)
            .assert()
            .success()
            .stdout(predicate::str::contains("is up to date"));
    }

    #[test]
    fn restore_uses_fallback() {
        let ws = workspace();
        let storage = TempDir::new().unwrap();

        stowage_in(ws.path(), storage.path())
            .args(["rebuild", "--path", "cache/main", "--mount", "build.log"])
            .assert()
            .success();

        let target = TempDir::new().unwrap();
        stowage_in(target.path(), storage.path())
            .args([
                "restore",
                "--path",
                "cache/feature",
                "--fallback-path",
                "cache/main",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("restored from fallback cache/main/archive.tar"));

        assert!(target.path().join("build.log").is_file());
    }

    #[test]
    fn restore_miss_is_warning() {
        let ws = workspace();
        let storage = TempDir::new().unwrap();

        stowage_in(ws.path(), storage.path())
            .args(["restore", "--path", "cache/app"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache restored"));
    }

    #[test]
    fn restore_miss_strict_fails() {
        let ws = workspace();
        let storage = TempDir::new().unwrap();

        stowage_in(ws.path(), storage.path())
            .args(["restore", "--path", "cache/app", "--strict"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"))
            .stderr(predicate::str::contains("cache does not exist"));
    }

    #[test]
    fn unknown_format_fails() {
        let ws = workspace();
        let storage = TempDir::new().unwrap();

        stowage_in(ws.path(), storage.path())
            .args([
                "rebuild",
                "--path",
                "cache/app",
                "--filename",
                "deps.zip",
                "--mount",
                "build.log",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown file format for archive deps.zip"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn invalid_path_fails() {
        let ws = workspace();
        let storage = TempDir::new().unwrap();

        stowage_in(ws.path(), storage.path())
            .args(["rebuild", "--path", "", "--mount", "build.log"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid path archive.tar"));
    }

    #[test]
    fn missing_mount_stores_nothing() {
        let ws = workspace();
        let storage = TempDir::new().unwrap();

        stowage_in(ws.path(), storage.path())
            .args(["rebuild", "--path", "cache/app", "--mount", "build.log,mount1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("stat mount1"));

        assert!(!storage.path().join("cache/app/archive.tar").exists());
    }

    #[test]
    fn flush_deletes_expired() {
        let ws = workspace();
        let storage = TempDir::new().unwrap();
        let dir = storage.path().join("cache/app");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("old.tar"), "old").unwrap();
        fs::write(dir.join("new.tar"), "new").unwrap();

        let forty_days = Duration::from_secs(40 * 24 * 60 * 60);
        fs::File::options()
            .write(true)
            .open(dir.join("old.tar"))
            .unwrap()
            .set_modified(SystemTime::now() - forty_days)
            .unwrap();

        stowage_in(ws.path(), storage.path())
            .args(["flush", "--flush-path", "cache/app", "--age", "30"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Flushed 1 of 2 entries"));

        assert!(!dir.join("old.tar").exists());
        assert!(dir.join("new.tar").exists());
    }

    #[test]
    fn flush_defaults_to_path_and_tolerates_huge_age() {
        let ws = workspace();
        let storage = TempDir::new().unwrap();
        let dir = storage.path().join("cache/app");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("old.tar"), "old").unwrap();

        stowage_in(ws.path(), storage.path())
            .args(["flush", "--path", "cache/./app/", "--age", "100000000"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Flushed 0 of 1 entries under cache/app"));

        assert!(dir.join("old.tar").exists());
    }

    #[test]
    fn config_path_in_workdir() {
        let ws = TempDir::new().unwrap();
        stowage()
            .arg("-C")
            .arg(ws.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("stowage.toml"));
    }

    #[test]
    fn config_init_then_show() {
        let ws = TempDir::new().unwrap();

        stowage()
            .arg("-C")
            .arg(ws.path())
            .args(["config", "init"])
            .assert()
            .success();
        assert!(ws.path().join("stowage.toml").is_file());

        stowage()
            .arg("-C")
            .arg(ws.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("flush_age_days = 30"));
    }

    #[test]
    fn config_file_sets_filename() {
        let ws = workspace();
        let storage = TempDir::new().unwrap();
        fs::write(
            ws.path().join("stowage.toml"),
            "[cache]\nfilename = \"deps.tar.gz\"\n",
        )
        .unwrap();

        stowage_in(ws.path(), storage.path())
            .args(["rebuild", "--path", "cache/app", "--mount", "build.log"])
            .assert()
            .success();

        assert!(storage.path().join("cache/app/deps.tar.gz").is_file());
    }
}
