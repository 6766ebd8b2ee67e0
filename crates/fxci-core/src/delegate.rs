//! Commands for the external tree's own build and test entry points.

use crate::config::{Configuration, HarnessSettings};
use crate::platform::PlatformDescriptor;
use crate::process::CommandSpec;
use crate::repo::Checkout;

/// Excludes tests tagged to be skipped in CI.
pub const SKIP_CI_CATEGORY: &str = "/p:WithoutCategories=IgnoreForCI";

/// Makes the test harness use the overlaid native libraries.
pub const LOCAL_NATIVE_LIBRARIES: &str = "/p:TestWithLocalNativeLibraries=true";

/// Arguments shared by the build and test entry points.
pub fn config_args(platform: &PlatformDescriptor, config: &Configuration) -> Vec<String> {
    vec![
        "-Release".to_string(),
        format!("-RuntimeOS={}", platform.rid_os),
        format!("-ArchGroup={}", config.arch),
    ]
}

/// Primary build: `build.cmd` / `build.sh` with the config arguments.
pub fn build_command(
    checkout: &Checkout,
    platform: &PlatformDescriptor,
    config: &Configuration,
) -> CommandSpec {
    let script = if platform.host.family().is_windows() {
        "build.cmd"
    } else {
        "build.sh"
    };

    checkout
        .command(checkout.root.join(script).to_string_lossy())
        .args(config_args(platform, config))
}

/// Test build-and-run, optionally preceded by the environment script.
pub fn test_command(
    checkout: &Checkout,
    platform: &PlatformDescriptor,
    config: &Configuration,
    settings: &HarnessSettings,
) -> CommandSpec {
    let family = platform.host.family();
    let script = if family.is_windows() {
        "build-tests.cmd"
    } else {
        "build-tests.sh"
    };
    let script = checkout.root.join(script).to_string_lossy().to_string();

    let mut args = config_args(platform, config);
    args.push("--".to_string());
    args.push(SKIP_CI_CATEGORY.to_string());
    if settings.native_libraries.applies_to(family) {
        args.push(LOCAL_NATIVE_LIBRARIES.to_string());
    }

    match &config.env_script {
        None => checkout.command(script).args(args),
        Some(env_script) if family.is_windows() => checkout
            .command("cmd")
            .arg("/c")
            .arg(env_script.to_string_lossy())
            .arg("&&")
            .arg(script)
            .args(args),
        // Script path and arguments travel as positional parameters, so
        // nothing is re-parsed by the shell.
        Some(env_script) => checkout
            .command("sh")
            .args(["-c", ". \"$1\"; shift; exec \"$@\"", "fxci-env"])
            .arg(env_script.to_string_lossy())
            .arg(script)
            .args(args),
    }
}
