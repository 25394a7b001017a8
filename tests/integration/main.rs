//! Integration tests for Strata

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn strata() -> Command {
        cargo_bin_cmd!("strata")
    }

    /// Command bound to a throwaway config file
    fn strata_isolated(dir: &TempDir) -> Command {
        let mut cmd = strata();
        cmd.arg("--config").arg(dir.path().join("config.toml"));
        cmd.env_remove("STRATA_CONFIG").env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn help_displays() {
        strata()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("container image layer analysis"));
    }

    #[test]
    fn version_displays() {
        strata()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("strata"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        strata_isolated(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        strata_isolated(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("capacity = 32"));
    }

    #[test]
    fn config_set_then_show() {
        let dir = TempDir::new().unwrap();
        strata_isolated(&dir)
            .args(["config", "set", "cache.ttl_secs", "90"])
            .assert()
            .success();

        strata_isolated(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ttl_secs = 90"));
    }

    #[test]
    fn config_set_rejects_unknown_key() {
        let dir = TempDir::new().unwrap();
        strata_isolated(&dir)
            .args(["config", "set", "cache.bogus", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn broken_config_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[cache\ncapacity = ").unwrap();
        strata_isolated(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn analyze_without_engine_fails() {
        let dir = TempDir::new().unwrap();
        strata_isolated(&dir)
            .args([
                "analyze",
                "library/redis:7",
                "--engine",
                "strata-no-such-engine",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Container engine not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn analyze_rejects_option_like_image() {
        let dir = TempDir::new().unwrap();
        strata_isolated(&dir)
            .args(["analyze", "--", "--output=/tmp/owned"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid image name"));
    }

    #[test]
    fn zero_capacity_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[cache]\ncapacity = 0\n").unwrap();
        strata_isolated(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cache.capacity"));
    }

    #[test]
    fn serve_rejects_bad_listen_address() {
        let dir = TempDir::new().unwrap();
        strata_isolated(&dir)
            .args(["serve", "--listen", "not-an-address"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid listen address"));
    }

    #[test]
    fn serve_help() {
        strata()
            .args(["serve", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--listen"));
    }
}
