//! fxci core - run a downstream tree's tests against a locally built runtime
//!
//! The pipeline:
//! - Validates the run configuration ([`config`])
//! - Resolves the host OS and RID token ([`platform`])
//! - Replaces any previous checkout with a fresh clone ([`repo`])
//! - Runs the external tree's build, overlays the local runtime into it
//!   ([`overlay`]) and runs its tests ([`delegate`])
//!
//! Every external program goes through the [`ProcessRunner`] seam;
//! [`fakes::ScriptedRunner`] stands in for it in tests.

pub mod config;
pub mod delegate;
pub mod error;
pub mod fakes;
pub mod fs_tree;
pub mod overlay;
pub mod paths;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod repo;
pub mod telemetry;

// Re-export key types
pub use config::{
    validate, Architecture, BuildType, Configuration, HarnessSettings, NativeLibraryPolicy,
    PollPolicy, RawOptions,
};
pub use error::{HarnessError, Result};
pub use pipeline::{Pipeline, PipelineResult, StageResult};
pub use platform::{HostFamily, HostOs, PlatformDescriptor};
pub use process::{CommandOutput, CommandSpec, DryRunRunner, ProcessRunner, SystemRunner};
pub use telemetry::init_tracing;
