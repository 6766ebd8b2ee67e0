//! Integration tests for the full pipeline with a scripted process runner.

use fxci_core::fakes::ScriptedRunner;
use fxci_core::{
    validate, Architecture, BuildType, CommandSpec, Configuration, HarnessError, HarnessSettings,
    HostFamily, Pipeline, RawOptions,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const DOTNET_INFO: &str = "\
Runtime Environment:
 OS Name:     ubuntu
 OS Platform: Linux
 RID:         linux-x64
";

/// A source tree with a built runtime, and a validated configuration for it.
fn setup() -> (TempDir, Configuration) {
    let dir = tempfile::tempdir().unwrap();
    let product = dir
        .path()
        .join("bin")
        .join("Product")
        .join("Linux.x64.Debug");
    fs::create_dir_all(&product).unwrap();
    fs::write(product.join("libcoreclr.so"), b"fresh runtime").unwrap();

    let raw = RawOptions {
        arch: "X64".to_string(),
        build_type: "debug".to_string(),
        clr_root: Some(dir.path().to_path_buf()),
        ..RawOptions::default()
    };
    let config = validate(&raw, Path::new("/unused/program"), &settings()).unwrap();
    (dir, config)
}

fn settings() -> HarnessSettings {
    HarnessSettings {
        host: HostFamily::Unix,
        repo_url: "https://example.invalid/corefx.git".to_string(),
        ..HarnessSettings::default()
    }
}

/// Simulates `git clone` producing a tree whose build leaves one runtime dir.
fn fake_clone(cmd: &CommandSpec) {
    let dest = Path::new(cmd.args.last().unwrap());
    fs::create_dir_all(dest.join("bin").join("runtime").join("net9.0")).unwrap();
}

fn runner() -> ScriptedRunner {
    ScriptedRunner::new()
        .with_output("uname -s", "Linux\n")
        .with_output("", DOTNET_INFO)
        .with_effect("git clone", fake_clone)
}

fn script(config: &Configuration, name: &str) -> String {
    config.external_root.join(name).display().to_string()
}

#[tokio::test]
async fn test_successful_pipeline() {
    let (_dir, config) = setup();
    assert_eq!(config.arch, Architecture::X64);
    assert_eq!(config.build_type, BuildType::Debug);
    assert_eq!(config.branch, "master");

    let runner = runner();
    let settings = settings();
    let result = Pipeline::new(&runner, &settings)
        .run(&config)
        .await
        .expect("pipeline failed");

    assert!(result.success());
    assert_eq!(result.platform.rid_os, "linux");
    assert_eq!(
        result
            .stages
            .iter()
            .map(|s| s.stage_name.as_str())
            .collect::<Vec<_>>(),
        vec!["checkout", "platform", "build", "overlay", "test"]
    );

    let overlaid = config
        .external_root
        .join("bin")
        .join("runtime")
        .join("net9.0")
        .join("libcoreclr.so");
    assert_eq!(fs::read(overlaid).unwrap(), b"fresh runtime");

    let lines = runner.command_lines();
    let build = lines
        .iter()
        .position(|c| c.starts_with(&script(&config, "build.sh")))
        .expect("build ran");
    let test = lines
        .iter()
        .position(|c| c.starts_with(&script(&config, "build-tests.sh")))
        .expect("tests ran");
    assert!(build < test);
    assert!(lines[build].ends_with("-Release -RuntimeOS=linux -ArchGroup=x64"));
    assert!(lines[test].ends_with(
        "-- /p:WithoutCategories=IgnoreForCI /p:TestWithLocalNativeLibraries=true"
    ));

    let home = ("HOME".to_string(), config.external_root.join("tempHome").display().to_string());
    let calls = runner.calls();
    assert!(calls[test].env.contains(&home));

    let rid_query = calls
        .iter()
        .position(|c| c.program.ends_with("dotnet"))
        .expect("RID query ran");
    let checkout = lines
        .iter()
        .position(|c| c.starts_with("git checkout"))
        .expect("checkout ran");
    assert!(checkout < rid_query && rid_query < build);
    assert!(calls[rid_query].env.contains(&home));
}

#[tokio::test]
async fn test_failed_checkout_stops_before_build() {
    let (_dir, config) = setup();
    let runner = runner().with_status("git checkout", 3);
    let settings = settings();

    let err = Pipeline::new(&runner, &settings)
        .run(&config)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 3);
    assert!(!runner.ran(&script(&config, "build.sh")));
    assert!(!runner.ran(&script(&config, "build-tests.sh")));
}

#[tokio::test]
async fn test_failed_build_skips_overlay_and_tests() {
    let (_dir, config) = setup();
    let runner = runner().with_status(&script(&config, "build.sh"), 42);
    let settings = settings();

    let err = Pipeline::new(&runner, &settings)
        .run(&config)
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::CommandFailed { code: 42, .. }));
    assert!(!runner.ran(&script(&config, "build-tests.sh")));
    assert!(!config
        .external_root
        .join("bin/runtime/net9.0/libcoreclr.so")
        .exists());
}

#[tokio::test]
async fn test_test_status_is_propagated_unchanged() {
    let (_dir, config) = setup();
    let runner = runner().with_status(&script(&config, "build-tests.sh"), 2);
    let settings = settings();

    let result = Pipeline::new(&runner, &settings)
        .run(&config)
        .await
        .expect("pipeline failed");

    assert_eq!(result.exit_code, 2);
    assert!(!result.success());
    assert_eq!(result.passed_count(), 4);
}

#[tokio::test]
async fn test_empty_runtime_output_fails_before_tests() {
    let (_dir, config) = setup();
    let runner = ScriptedRunner::new()
        .with_output("uname -s", "Linux\n")
        .with_output("", DOTNET_INFO)
        .with_effect("git clone", |cmd: &CommandSpec| {
            let dest = Path::new(cmd.args.last().unwrap());
            fs::create_dir_all(dest.join("bin").join("runtime")).unwrap();
        });
    let settings = settings();

    let err = Pipeline::new(&runner, &settings)
        .run(&config)
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::OverlayDestination { found: 0, .. }));
    assert!(!runner.ran(&script(&config, "build-tests.sh")));
}

#[tokio::test]
async fn test_previous_checkout_is_replaced() {
    let (_dir, config) = setup();
    fs::create_dir_all(&config.external_root).unwrap();
    let stale = config.external_root.join("leftover.txt");
    fs::write(&stale, b"stale").unwrap();

    let runner = runner();
    let settings = settings();
    Pipeline::new(&runner, &settings)
        .run(&config)
        .await
        .expect("pipeline failed");

    assert!(!stale.exists());
    assert!(runner.ran("git clean -fxd"));
}

#[tokio::test]
async fn test_unparseable_rid_aborts_before_build() {
    let (_dir, config) = setup();
    let runner = ScriptedRunner::new()
        .with_output("uname -s", "Linux\n")
        .with_output("", "no identification here")
        .with_effect("git clone", fake_clone);
    let settings = settings();

    let err = Pipeline::new(&runner, &settings)
        .run(&config)
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::RidNotFound(_)));
    assert!(runner.ran("git checkout"));
    assert!(!runner.ran(&script(&config, "build.sh")));
}

#[tokio::test]
async fn test_unsupported_host_aborts_before_clone() {
    let (_dir, config) = setup();
    let runner = ScriptedRunner::new().with_output("uname -s", "Haiku\n");
    let settings = settings();

    let err = Pipeline::new(&runner, &settings)
        .run(&config)
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::UnsupportedHost(ref name) if name == "Haiku"));
    assert!(!runner.ran("git clone"));
}
