//! Pipeline orchestration: checkout, platform, build, overlay, test.

use crate::config::{Configuration, HarnessSettings};
use crate::delegate::{build_command, test_command};
use crate::error::Result;
use crate::overlay::{self, Overlay};
use crate::paths::ArtifactLocations;
use crate::platform::{detect_host_os, PlatformDescriptor};
use crate::process::{run_stage, CommandSpec, ProcessRunner};
use crate::repo::RepositoryManager;
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, warn};

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,

    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl StageResult {
    /// Whether this stage passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Result of a pipeline that reached the test stage.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// Exit status of the test run, reported as the process exit status.
    pub exit_code: i32,

    pub configuration: Configuration,

    pub platform: PlatformDescriptor,

    /// `None` on dry runs.
    pub overlay: Option<Overlay>,

    /// Stages in execution order.
    pub stages: Vec<StageResult>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Number of stages that passed.
    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.passed()).count()
    }
}

/// Runs the stages strictly in order; the first failure aborts the run.
pub struct Pipeline<'a> {
    runner: &'a dyn ProcessRunner,
    settings: &'a HarnessSettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, settings: &'a HarnessSettings) -> Self {
        Self { runner, settings }
    }

    /// Execute the pipeline for a validated configuration.
    ///
    /// Returns `Err` when any stage before the test run fails; a failed
    /// clone, checkout or build carries its exit code in
    /// [`CommandFailed`](crate::error::HarnessError::CommandFailed). The test
    /// run's own status is returned in [`PipelineResult::exit_code`] whatever
    /// its value.
    pub async fn run(&self, config: &Configuration) -> Result<PipelineResult> {
        let start = Instant::now();
        let mut stages = Vec::new();

        info!(
            repo = %self.settings.repo_url,
            branch = %config.branch,
            commit = %config.commit,
            dry_run = self.settings.dry_run,
            "Starting pipeline"
        );

        let host = detect_host_os(self.runner, self.settings.host, &self.settings.os_names)
            .await
            .inspect_err(|e| error!(error = %e, "Host detection failed"))?;

        let locations = ArtifactLocations::resolve(config, host);
        info!(
            core_root = %locations.core_root.display(),
            runtime_dir = %locations.runtime_dir.display(),
            "Artifact locations"
        );

        let stage_start = Instant::now();
        let checkout = RepositoryManager::new(self.runner, self.settings)
            .prepare(config)
            .await
            .inspect_err(|e| error!(error = %e, "Repository preparation failed"))?;
        stages.push(finished("checkout", 0, stage_start));

        // The RID query runs with the checkout's environment (scoped HOME).
        let stage_start = Instant::now();
        let platform =
            PlatformDescriptor::resolve(self.runner, host, &config.source_root, &checkout.env)
                .await
                .inspect_err(|e| error!(error = %e, "Platform resolution failed"))?;
        stages.push(finished("platform", 0, stage_start));

        let build = build_command(&checkout, &platform, config);
        stages.push(self.gate("build", &build).await?);

        let stage_start = Instant::now();
        let overlay = if self.settings.dry_run {
            info!(
                "[dry-run] would overlay {} into {}",
                locations.core_root.display(),
                locations.runtime_dir.display()
            );
            None
        } else {
            Some(
                overlay::install(&locations)
                    .inspect_err(|e| error!(error = %e, "Overlay failed"))?,
            )
        };
        stages.push(finished("overlay", 0, stage_start));

        let test = test_command(&checkout, &platform, config, self.settings);
        let stage_start = Instant::now();
        info!(stage = "test", "Executing stage");
        let exit_code = self.runner.status(&test).await?;
        stages.push(finished("test", exit_code, stage_start));

        if exit_code == 0 {
            info!("Pipeline completed successfully");
        } else {
            warn!(exit_code, "Test run failed");
        }

        Ok(PipelineResult {
            exit_code,
            configuration: config.clone(),
            platform,
            overlay,
            stages,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Run a stage that must exit zero for the pipeline to continue.
    async fn gate(&self, stage: &str, cmd: &CommandSpec) -> Result<StageResult> {
        let start = Instant::now();
        info!(stage, "Executing stage");

        run_stage(self.runner, stage, cmd)
            .await
            .inspect_err(|e| error!(stage, error = %e, "Stage failed"))?;

        Ok(finished(stage, 0, start))
    }
}

fn finished(stage: &str, exit_code: i32, start: Instant) -> StageResult {
    StageResult {
        stage_name: stage.to_string(),
        exit_code,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}
