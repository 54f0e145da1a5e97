use assert_cmd::Command;
use clcache_core::cache::{fingerprint, format_fingerprint};
use indoc::indoc;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn clcache_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("clcache"))
}

fn write_kernel(temp_dir: &TempDir) {
    fs::write(temp_dir.path().join("common.h"), "#define SHARED 1\n").unwrap();
    fs::write(
        temp_dir.path().join("k.cl"),
        indoc! {r#"
            #include "common.h"
            kernel void k(global int* out) { out[0] = SHARED; }
        "#},
    )
    .unwrap();
}

// ============================================================================
// EXPAND
// ============================================================================

#[test]
fn test_expand_inlines_includes() {
    let temp_dir = TempDir::new().unwrap();
    write_kernel(&temp_dir);

    clcache_cmd()
        .current_dir(&temp_dir)
        .arg("expand")
        .arg("k.cl")
        .assert()
        .success()
        .stdout(predicate::str::contains("#define SHARED 1"))
        .stdout(predicate::str::contains("#include").not());
}

#[test]
fn test_expand_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();

    clcache_cmd()
        .current_dir(&temp_dir)
        .arg("expand")
        .arg("missing.cl")
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.cl"));
}

// ============================================================================
// FINGERPRINT
// ============================================================================

#[test]
fn test_fingerprint_matches_library() {
    let temp_dir = TempDir::new().unwrap();
    write_kernel(&temp_dir);
    let source = clcache_core::expand_source(temp_dir.path().join("k.cl")).unwrap();
    let expected = format_fingerprint(fingerprint(
        &source,
        " -DN=4 -cl-kernel-arg-info",
        "Mock Platform",
        "Mock GPU",
    ));

    clcache_cmd()
        .current_dir(&temp_dir)
        .args([
            "fingerprint",
            "k.cl",
            "--options",
            "-DN=4",
            "--platform",
            "Mock Platform",
            "--device",
            "Mock GPU",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.clone()))
        .stdout(predicate::str::contains(format!("k.cl.{}.bin", expected)));
}

#[test]
fn test_fingerprint_depends_on_options() {
    let temp_dir = TempDir::new().unwrap();
    write_kernel(&temp_dir);

    let run = |options: &str| {
        let output = clcache_cmd()
            .current_dir(&temp_dir)
            .args(["fingerprint", "k.cl", "--platform", "P", "--device", "D"])
            .arg("--options")
            .arg(options)
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap()
    };

    assert_ne!(run("-DN=4"), run("-DN=8"));
    assert_eq!(run("-DN=4"), run("-DN=4"));
}

#[test]
fn test_fingerprint_requires_device() {
    clcache_cmd()
        .args(["fingerprint", "k.cl", "--platform", "P"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--device"));
}

// ============================================================================
// CACHE / INIT / CONFIG
// ============================================================================

#[test]
fn test_cache_lists_entries() {
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = temp_dir.path().join("bins");
    fs::create_dir_all(&cache_dir).unwrap();
    fs::write(cache_dir.join("k.cl.00ff00ff00ff00ff.bin"), b"binary").unwrap();
    fs::write(cache_dir.join("notes.txt"), b"ignored").unwrap();

    clcache_cmd()
        .arg("cache")
        .arg("--dir")
        .arg(&cache_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("k.cl"))
        .stdout(predicate::str::contains("00ff00ff00ff00ff"))
        .stdout(predicate::str::contains("1 cached kernel(s)"))
        .stdout(predicate::str::contains("notes.txt").not());
}

#[test]
fn test_cache_empty_dir() {
    let temp_dir = TempDir::new().unwrap();

    clcache_cmd()
        .arg("cache")
        .arg("--dir")
        .arg(temp_dir.path().join("nothing"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No cached kernels"));
}

#[test]
fn test_cache_dir_from_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = temp_dir.path().join("from_config");
    fs::create_dir_all(&cache_dir).unwrap();
    fs::write(cache_dir.join("a.cl.0123456789abcdef.bin"), b"x").unwrap();
    fs::write(
        temp_dir.path().join("clcache.yaml"),
        format!("cacheDir: {}\n", cache_dir.display()),
    )
    .unwrap();

    clcache_cmd()
        .current_dir(&temp_dir)
        .args(["--config", "clcache.yaml", "cache"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a.cl"));
}

#[test]
fn test_cache_dir_from_env() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("b.cl.0123456789abcdef.bin"), b"x").unwrap();

    clcache_cmd()
        .env("CLCACHE_CACHE_DIR", temp_dir.path())
        .arg("cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("b.cl"));
}

#[test]
fn test_init_creates_config_file() {
    let temp_dir = TempDir::new().unwrap();

    clcache_cmd()
        .current_dir(&temp_dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("clcache.yaml"));

    let config = fs::read_to_string(temp_dir.path().join("clcache.yaml")).unwrap();
    assert!(config.contains("cacheDir"));
    assert!(config.contains("globalOptions"));
    assert!(config.contains("cpuDebug"));
}

#[test]
fn test_init_refuses_to_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("clcache.yaml"), "cacheDir: keep\n").unwrap();

    clcache_cmd()
        .current_dir(&temp_dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let config = fs::read_to_string(temp_dir.path().join("clcache.yaml")).unwrap();
    assert_eq!(config, "cacheDir: keep\n");
}

#[test]
fn test_invalid_config_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("bad.json"), "{ not json").unwrap();

    clcache_cmd()
        .current_dir(&temp_dir)
        .args(["--config", "bad.json", "cache"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config file"));
}
