//! fxci - run a downstream tree's tests against a locally built runtime
//!
//! Clones the external tree at the requested branch and ref, builds it,
//! overlays `bin/Product/<OS>.<arch>.<build type>` into its runtime output
//! directory and runs its test build. Exits with the test run's status, or
//! with the status of the first clone/checkout/build step that failed.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use fxci_core::config::DEFAULT_REPO_URL;
use fxci_core::{
    init_tracing, validate, DryRunRunner, HarnessError, HarnessSettings, NativeLibraryPolicy,
    Pipeline, PipelineResult, ProcessRunner, RawOptions, SystemRunner,
};
use std::path::PathBuf;
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "fxci")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run downstream tests against a locally built runtime", long_about = None)]
struct Cli {
    /// Target architecture (x86, x64, arm, arm64)
    #[arg(long, env = "FXCI_ARCH", default_value = "x64")]
    arch: String,

    /// Build type of the local runtime (Debug, Checked, Release)
    #[arg(long, env = "FXCI_BUILD_TYPE", default_value = "Debug")]
    build_type: String,

    /// Runtime source root (default: three levels above this executable)
    #[arg(long, env = "FXCI_CLR_ROOT")]
    clr_root: Option<PathBuf>,

    /// Where to clone the external tree (default: <clr_root>/_/fx)
    #[arg(long, env = "FXCI_FX_ROOT")]
    fx_root: Option<PathBuf>,

    /// Branch of the external tree to clone
    #[arg(long, env = "FXCI_FX_BRANCH", default_value = "master")]
    fx_branch: String,

    /// Commit or ref to check out (default: HEAD of the branch)
    #[arg(long, env = "FXCI_FX_COMMIT")]
    fx_commit: Option<String>,

    /// Script to source before running the tests
    #[arg(long, env = "FXCI_ENV_SCRIPT")]
    env_script: Option<PathBuf>,

    /// External repository URL
    #[arg(long, env = "FXCI_REPO_URL", default_value = DEFAULT_REPO_URL)]
    repo_url: String,

    /// When to pass /p:TestWithLocalNativeLibraries=true to the test run
    #[arg(long, value_enum, default_value_t = NativeLibraries::UnixOnly)]
    native_libraries: NativeLibraries,

    /// Print the commands without cloning, building, copying or testing
    #[arg(long)]
    dry_run: bool,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum NativeLibraries {
    UnixOnly,
    Always,
    Never,
}

impl From<NativeLibraries> for NativeLibraryPolicy {
    fn from(value: NativeLibraries) -> Self {
        match value {
            NativeLibraries::UnixOnly => NativeLibraryPolicy::UnixOnly,
            NativeLibraries::Always => NativeLibraryPolicy::Always,
            NativeLibraries::Never => NativeLibraryPolicy::Never,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            err.downcast_ref::<HarnessError>()
                .map(HarnessError::exit_code)
                .unwrap_or(1)
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let settings = HarnessSettings {
        repo_url: cli.repo_url,
        native_libraries: cli.native_libraries.into(),
        dry_run: cli.dry_run,
        ..HarnessSettings::default()
    };

    let raw = RawOptions {
        arch: cli.arch,
        build_type: cli.build_type,
        clr_root: cli.clr_root,
        fx_root: cli.fx_root,
        fx_branch: cli.fx_branch,
        fx_commit: cli.fx_commit,
        env_script: cli.env_script,
    };

    let program = std::env::current_exe().context("Failed to locate the fxci executable")?;
    let config = validate(&raw, &program, &settings)?;

    let system = SystemRunner;
    let dry_run = DryRunRunner::new(SystemRunner);
    let runner: &dyn ProcessRunner = if settings.dry_run { &dry_run } else { &system };

    let result = Pipeline::new(runner, &settings).run(&config).await?;
    print_summary(&result);

    if let Some(path) = cli.report {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(report = %path.display(), "Wrote run report");
    }

    Ok(result.exit_code)
}

fn print_summary(result: &PipelineResult) {
    println!();
    println!("Status: {}", if result.success() { "✓ PASSED" } else { "✗ FAILED" });
    println!("Duration: {}ms", result.duration_ms);
    for stage in &result.stages {
        let status = if stage.passed() { "✓" } else { "✗" };
        println!(
            "  {} {} ({}ms, exit code: {})",
            status, stage.stage_name, stage.duration_ms, stage.exit_code
        );
    }
    if let Some(overlay) = &result.overlay {
        println!(
            "Overlay: {} files -> {}",
            overlay.files,
            overlay.destination.display()
        );
    }
}
