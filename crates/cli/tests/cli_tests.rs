#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use httpmock::Method::{POST, PUT};
use httpmock::MockServer;
use predicates::str::contains;
use serde_json::json;
use std::net::TcpListener;
use tempfile::TempDir;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// The binary with a clean environment, run from `dir`.
fn buildstash(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("buildstash").unwrap();
    cmd.env_clear().current_dir(dir.path());
    cmd
}

fn workspace_with_artifact(len: usize) -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("out")).unwrap();
    std::fs::write(temp.path().join("out/app.bin"), vec![5u8; len]).unwrap();
    temp
}

#[test]
fn provenance_from_environment() {
    let temp = TempDir::new().unwrap();
    let output = buildstash(&temp)
        .args(["provenance", "--no-git"])
        .env("GIT_URL", "https://gitlab.com/acme/widget.git")
        .env("GIT_BRANCH", "origin/main")
        .env("GIT_COMMIT", "abc1234")
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["vc_host_type"], "git");
    assert_eq!(value["vc_host"], "gitlab");
    assert_eq!(value["vc_repo_name"], "widget");
    assert_eq!(value["vc_branch"], "main");
    assert_eq!(
        value["vc_commit_url"],
        "https://gitlab.com/acme/widget/-/commit/abc1234"
    );
}

#[test]
fn provenance_flags_win_over_environment() {
    let temp = TempDir::new().unwrap();
    let output = buildstash(&temp)
        .args(["provenance", "--no-git", "--vc-branch", "release/2.0"])
        .env("GIT_BRANCH", "origin/main")
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["vc_branch"], "release/2.0");
}

#[test]
fn upload_requires_api_key() {
    let temp = workspace_with_artifact(16);
    buildstash(&temp)
        .args(["upload", "--primary-file", "out/app.bin", "--no-git"])
        .assert()
        .failure()
        .stderr(contains("API key is required"));
}

#[test]
fn upload_names_missing_field() {
    let temp = workspace_with_artifact(16);
    buildstash(&temp)
        .args([
            "upload",
            "--api-key",
            "key",
            "--base-url",
            "http://127.0.0.1:9/api/v1",
            "--primary-file",
            "out/app.bin",
            "--version-major",
            "1",
            "--version-patch",
            "3",
            "--platform",
            "android",
            "--stream",
            "beta",
            "--no-git",
        ])
        .assert()
        .failure()
        .stderr(contains("minor version component is required"));
}

#[test]
fn upload_rejects_missing_primary_file() {
    let temp = TempDir::new().unwrap();
    buildstash(&temp)
        .args([
            "upload",
            "--api-key",
            "key",
            "--primary-file",
            "out/absent.bin",
            "--no-git",
        ])
        .assert()
        .failure()
        .stderr(contains("primary file out/absent.bin"));
}

#[test]
fn upload_rejects_bad_start_time() {
    let temp = workspace_with_artifact(16);
    buildstash(&temp)
        .args([
            "upload",
            "--api-key",
            "key",
            "--primary-file",
            "out/app.bin",
            "--ci-started-at",
            "last tuesday",
            "--no-git",
        ])
        .assert()
        .failure()
        .stderr(contains("is not a Unix timestamp"));
}

#[test]
fn upload_reads_config_file() {
    let temp = workspace_with_artifact(16);
    std::fs::write(
        temp.path().join("buildstash.toml"),
        "[transfer]\nmax_parallel_parts = 0\n",
    )
    .unwrap();
    buildstash(&temp)
        .args(["upload", "--api-key", "key", "--primary-file", "out/app.bin"])
        .assert()
        .failure()
        .stderr(contains("max_parallel_parts"));
}

#[test]
fn upload_publishes_build() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let temp = workspace_with_artifact(2048);

    let plan = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/uploads")
            .header("authorization", "Bearer cli-key")
            .json_body_partial(
                json!({
                    "primary_file": { "filename": "app.bin", "size_bytes": 2048 },
                    "labels": ["nightly", "qa"],
                    "platform": "android",
                    "stream": "beta",
                    "source": "jenkins",
                    "ci_pipeline": "widget-release",
                    "ci_run_id": "42"
                })
                .to_string(),
            )
            .body_contains("\"ci_build_duration\":\"");
        then.status(200).json_body(json!({
            "pending_upload_id": "pu_cli",
            "primary_file": {
                "filename": "app.bin",
                "chunked_upload": false,
                "presigned_data": { "url": server.url("/storage/app.bin"), "headers": {} }
            }
        }));
    });
    let put = server.mock(|when, then| {
        when.method(PUT).path("/storage/app.bin");
        then.status(200).header("ETag", "\"cli\"");
    });
    server.mock(|when, then| {
        when.method(POST).path("/api/v1/uploads/pu_cli/complete");
        then.status(200).json_body(json!({
            "message": "Build published",
            "build_id": "b_cli",
            "pending_processing": true,
            "build_info_url": "https://app.buildstash.com/builds/b_cli"
        }));
    });

    buildstash(&temp)
        .args([
            "upload",
            "--primary-file",
            "out/app.bin",
            "--version-major",
            "1",
            "--version-minor",
            "2",
            "--version-patch",
            "3",
            "--platform",
            "android",
            "--stream",
            "beta",
            "--labels",
            "nightly\nqa\n",
            "--ci-started-at",
            "1767261600000",
            "--no-git",
        ])
        .env("BUILDSTASH_API_KEY", "cli-key")
        .env("BUILDSTASH_API__BASE_URL", server.url("/api/v1"))
        .env("JOB_NAME", "widget-release")
        .env("BUILD_NUMBER", "42")
        .assert()
        .success()
        .stdout(contains("Build published: b_cli"))
        .stdout(contains("https://app.buildstash.com/builds/b_cli"))
        .stdout(contains("Processing: pending"));

    plan.assert();
    put.assert();
}
