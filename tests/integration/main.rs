//! Integration tests for Cachet

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn cachet() -> Command {
        let mut cmd = cargo_bin_cmd!("cachet");
        cmd.env_remove("CACHET_CONFIG");
        cmd
    }

    /// Config file pointing the file store into `temp`
    fn write_config(temp: &Path, extra: &str) -> PathBuf {
        let config = temp.join("config.toml");
        let store = temp.join("store");
        fs::write(
            &config,
            format!(
                "[store]\nbackend = \"file\"\npath = \"{}\"\n\n{}",
                store.display(),
                extra
            ),
        )
        .unwrap();
        config
    }

    /// Orders of customers in a region, three tables deep
    const NESTED_QUERY: &str = r#"{
        "using": "default",
        "base_table": "orders",
        "sql": "SELECT * FROM orders WHERE customer_id IN (SELECT id FROM customers WHERE region_id IN (SELECT id FROM regions WHERE code = %s))",
        "params": ["EU"],
        "filter": [{
            "node": "comparison",
            "column": "customer_id",
            "lookup": "in",
            "rhs": {"kind": "subquery", "value": {
                "using": "default",
                "base_table": "customers",
                "sql": "SELECT id FROM customers WHERE region_id IN (SELECT id FROM regions WHERE code = %s)",
                "filter": [{
                    "node": "comparison",
                    "column": "region_id",
                    "lookup": "in",
                    "rhs": {"kind": "subquery", "value": {
                        "using": "default",
                        "base_table": "regions",
                        "sql": "SELECT id FROM regions WHERE code = %s"
                    }}
                }]
            }}
        }]
    }"#;

    const RANDOM_QUERY: &str = r#"{
        "using": "default",
        "base_table": "orders",
        "sql": "SELECT * FROM orders ORDER BY RANDOM()",
        "order_by": ["?"]
    }"#;

    fn write_query(temp: &Path, name: &str, json: &str) -> PathBuf {
        let path = temp.join(name);
        fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        cachet()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("query result cache"));
    }

    #[test]
    fn version_displays() {
        cachet()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cachet"));
    }

    #[test]
    fn key_table_is_sha1_of_alias_and_table() {
        cachet()
            .args(["key", "table", "orders"])
            .assert()
            .success()
            .stdout("eb34e818bd727b35ed2b26d388bf9255c228c7de\n");
    }

    #[test]
    fn key_query_renders_params_as_tuple() {
        cachet()
            .args([
                "key",
                "query",
                "--sql",
                "SELECT * FROM orders WHERE id = %s",
                "--param",
                "7",
            ])
            .assert()
            .success()
            .stdout("a7890667a660fd2fd5c1aa33fbcbc65606e5406b\n");
    }

    #[test]
    fn key_strategy_from_config() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "[cache]\nkey_strategy = \"sha256-160\"\n");

        cachet()
            .arg("--config")
            .arg(&config)
            .args(["key", "table", "orders"])
            .assert()
            .success()
            .stdout("d84e4c0cc781642ccc7a8ff1a54d89f0a0f58e54\n");
    }

    #[test]
    fn config_path() {
        cachet()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        cachet()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn config_init_respects_existing_file() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("nested").join("config.toml");

        cachet()
            .arg("--config")
            .arg(&config)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(config.exists());

        cachet()
            .arg("--config")
            .arg(&config)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        fs::write(&config, "[cache\nenabled = ").unwrap();

        cachet()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn config_init_force_repairs_invalid_file() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        fs::write(&config, "[cache\nenabled = ").unwrap();

        cachet()
            .arg("--config")
            .arg(&config)
            .args(["config", "init", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));

        cachet()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn resolve_lists_nested_tables() {
        let temp = TempDir::new().unwrap();
        let query = write_query(temp.path(), "q.json", NESTED_QUERY);

        cachet()
            .arg("resolve")
            .arg(&query)
            .assert()
            .success()
            .stdout(
                predicate::str::contains("customers")
                    .and(predicate::str::contains("regions"))
                    .and(predicate::str::contains(
                        "eb34e818bd727b35ed2b26d388bf9255c228c7de",
                    )),
            );
    }

    #[test]
    fn resolve_json_reports_rejection() {
        let temp = TempDir::new().unwrap();
        let query = write_query(temp.path(), "random.json", RANDOM_QUERY);

        cachet()
            .arg("resolve")
            .arg(&query)
            .args(["--format", "json"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("\"rejected\"")
                    .and(predicate::str::contains("query_key").not()),
            );
    }

    #[test]
    fn resolve_missing_file() {
        cachet()
            .args(["resolve", "/nonexistent/query.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn store_check_invalidate_cycle() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");
        let query = write_query(temp.path(), "q.json", NESTED_QUERY);

        let run = |args: &[&str]| {
            let mut cmd = cachet();
            cmd.arg("--config").arg(&config).args(args).arg(&query);
            cmd
        };

        run(&["check"])
            .assert()
            .success()
            .stdout(predicate::str::contains("miss"));

        run(&["store", "--rows", r#"[{"id": 1}]"#])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cached"));

        run(&["check"])
            .assert()
            .success()
            .stdout(predicate::str::contains("hit"));

        cachet()
            .arg("--config")
            .arg(&config)
            .args(["invalidate", "regions"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Invalidated default.regions"));

        run(&["check"])
            .assert()
            .success()
            .stdout(predicate::str::contains("stale"));
    }

    #[test]
    fn unrelated_invalidation_keeps_hit() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");
        let query = write_query(temp.path(), "q.json", NESTED_QUERY);

        cachet()
            .arg("--config")
            .arg(&config)
            .arg("store")
            .arg(&query)
            .assert()
            .success();

        cachet()
            .arg("--config")
            .arg(&config)
            .args(["invalidate", "products"])
            .assert()
            .success();

        cachet()
            .arg("--config")
            .arg(&config)
            .arg("check")
            .arg(&query)
            .assert()
            .success()
            .stdout(predicate::str::contains("hit"));
    }

    #[test]
    fn raw_write_invalidates_known_tables() {
        let temp = TempDir::new().unwrap();
        let config = write_config(
            temp.path(),
            "[databases.default]\ntables = [\"orders\", \"customers\", \"regions\"]\n",
        );

        cachet()
            .arg("--config")
            .arg(&config)
            .args(["invalidate", "--sql", "UPDATE customers SET name = 'x'"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("default.customers")
                    .and(predicate::str::contains("regions").not()),
            );
    }

    #[test]
    fn check_random_ordering_bypasses() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");
        let query = write_query(temp.path(), "random.json", RANDOM_QUERY);

        cachet()
            .arg("--config")
            .arg(&config)
            .arg("check")
            .arg(&query)
            .assert()
            .success()
            .stdout(predicate::str::contains("bypass"));
    }

    #[test]
    fn check_blacklisted_table_bypasses() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "[cache]\nblacklist = [\"regions\"]\n");
        let query = write_query(temp.path(), "q.json", NESTED_QUERY);

        cachet()
            .arg("--config")
            .arg(&config)
            .arg("check")
            .arg(&query)
            .assert()
            .success()
            .stdout(predicate::str::contains("blacklisted"));
    }
}
