//! Integration tests for CLI commands

use sherwave_core::{PackMetadata, Values};
use sherwave_kube::{FileDriver, StorageConfig, StorageDriver, StoredRelease};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Helper to run sherwave command
fn sherwave(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_sherwave"))
        .args(args)
        .env("SHERWAVE_LOG", "error")
        .output()
        .expect("Failed to execute sherwave")
}

const PLAN: &str = r#"
project: shop
releases:
  - name: db
    namespace: shop
    chart:
      name: ./packs/db
  - name: cache
    namespace: shop
    chart:
      name: ./packs/cache
  - name: web
    namespace: shop
    chart:
      name: ./packs/web
    dependsOn:
      - db
      - name: cache
        optional: true
    tags: [frontend]
"#;

/// Run sherwave with no usable kubeconfig
fn sherwave_offline(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_sherwave"))
        .args(args)
        .env("SHERWAVE_LOG", "error")
        .env("KUBECONFIG", dir.join("missing-kubeconfig"))
        .env_remove("KUBERNETES_SERVICE_HOST")
        .env_remove("KUBERNETES_SERVICE_PORT")
        .output()
        .expect("Failed to execute sherwave")
}

fn write_pack(dir: &Path, name: &str) {
    let pack = dir.join("packs").join(name);
    fs::create_dir_all(pack.join("templates")).unwrap();
    fs::write(
        pack.join("Pack.yaml"),
        format!("apiVersion: sherwave/v1\nmetadata:\n  name: {}\n  version: 0.1.0\n", name),
    )
    .unwrap();
    fs::write(
        pack.join("templates/deployment.yaml"),
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {{ release.name }}\n",
    )
    .unwrap();
}

/// Record a deployed first revision the way a real sync would
async fn record_deployed(dir: &Path, name: &str, namespace: &str) {
    let driver = FileDriver::new(dir.join(".sherwave/releases"), StorageConfig::default()).unwrap();
    let pack: PackMetadata =
        serde_json::from_value(serde_json::json!({ "name": name, "version": "0.1.0" })).unwrap();
    let mut release = StoredRelease::for_install(
        name.to_string(),
        namespace.to_string(),
        pack,
        Values::default(),
        String::new(),
    );
    release.mark_deployed();
    driver.create(&release).await.unwrap();
}

fn write_plan(dir: &Path, content: &str) -> String {
    let path = dir.join("sherwave.yml");
    fs::write(&path, content).unwrap();
    path.display().to_string()
}

mod validate_command {
    use super::*;

    #[test]
    fn test_validate_valid_plan() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(dir.path(), PLAN);

        let output = sherwave(&["validate", "-f", &plan]);

        assert!(output.status.success(), "Expected success for valid plan");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("3 release(s)"));
        assert!(stdout.contains("Plan is valid"));
    }

    #[test]
    fn test_validate_invalid_release_name() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(
            dir.path(),
            "releases:\n  - name: Web_App\n    namespace: shop\n    chart:\n      name: ./packs/web\n",
        );

        let output = sherwave(&["validate", "-f", &plan]);

        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_validate_cycle() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(
            dir.path(),
            r#"
releases:
  - name: a
    namespace: ns
    chart: { name: ./packs/a }
    dependsOn: [b]
  - name: b
    namespace: ns
    chart: { name: ./packs/b }
    dependsOn: [a]
"#,
        );

        let output = sherwave(&["validate", "-f", &plan]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("a@ns"));
    }

    #[test]
    fn test_validate_missing_plan() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.yml");

        let output = sherwave(&["validate", "-f", &missing.display().to_string()]);

        assert_eq!(output.status.code(), Some(5));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("not found"));
    }
}

mod graph_command {
    use super::*;

    #[test]
    fn test_graph_order_puts_dependencies_first() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(dir.path(), PLAN);

        let output = sherwave(&["graph", "--order", "-f", &plan]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<&str> = stdout.lines().map(str::trim).collect();
        assert_eq!(lines, vec!["1. db@shop", "2. cache@shop", "3. web@shop"]);
    }

    #[test]
    fn test_graph_tree() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(dir.path(), PLAN);

        let output = sherwave(&["graph", "-f", &plan]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("└── web@shop"));
        assert!(stdout.contains("db@shop"));
    }
}

mod up_command {
    use super::*;

    #[test]
    fn test_up_without_cluster_fails_as_deploy_error() {
        let dir = TempDir::new().unwrap();
        write_pack(dir.path(), "db");
        let plan = write_plan(
            dir.path(),
            "releases:\n  - name: db\n    namespace: shop\n    chart:\n      name: ./packs/db\n",
        );

        let output = sherwave_offline(dir.path(), &["up", "--dry-run", "-f", &plan]);

        assert_eq!(output.status.code(), Some(6));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("db@shop"));

        // The rehearsal recorded nothing
        let list = sherwave_offline(dir.path(), &["list", "--json", "-f", &plan]);
        assert!(list.status.success());
        let listed: serde_json::Value = serde_json::from_slice(&list.stdout).unwrap();
        assert_eq!(listed, serde_json::json!([]));
    }

    #[test]
    fn test_up_with_unmatched_tags_fails_validation() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(dir.path(), PLAN);

        let output = sherwave(&["up", "--dry-run", "--tags", "backend", "-f", &plan]);

        assert_eq!(output.status.code(), Some(2));
    }
}

mod history_commands {
    use super::*;

    #[test]
    fn test_status_reads_history_without_cluster() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(dir.path(), PLAN);

        let output = sherwave_offline(dir.path(), &["status", "--json", "-f", &plan]);

        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let statuses: Vec<_> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["status"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(statuses, vec!["not-installed"; 3]);
    }

    #[tokio::test]
    async fn test_status_by_name_and_list_show_recorded_releases() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(dir.path(), PLAN);
        record_deployed(dir.path(), "db", "shop").await;

        let status = sherwave_offline(dir.path(), &["status", "db", "--json", "-f", &plan]);
        assert!(status.status.success());
        let listed: serde_json::Value = serde_json::from_slice(&status.stdout).unwrap();
        assert_eq!(listed[0]["release"], "db@shop");
        assert_eq!(listed[0]["status"], "deployed");
        assert_eq!(listed[0]["revision"], 1);

        let list = sherwave_offline(dir.path(), &["list", "-f", &plan]);
        assert!(list.status.success());
        let stdout = String::from_utf8_lossy(&list.stdout);
        assert!(stdout.contains("db@shop"));
        assert!(!stdout.contains("web@shop"));
    }

    #[test]
    fn test_status_unknown_release() {
        let dir = TempDir::new().unwrap();
        let plan = write_plan(dir.path(), PLAN);

        let output = sherwave_offline(dir.path(), &["status", "billing", "-f", &plan]);

        assert_eq!(output.status.code(), Some(2));
    }
}

#[test]
fn test_help_lists_commands() {
    let output = sherwave(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["up", "status", "list", "graph", "validate"] {
        assert!(stdout.contains(command), "missing {command}");
    }
}
