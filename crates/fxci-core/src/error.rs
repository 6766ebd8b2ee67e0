//! Error types for fxci-core

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a harness run.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// A configuration argument failed its validity check
    #[error("Argument {name}: '{value}' is not valid")]
    InvalidArgument { name: &'static str, value: String },

    /// Host operating system is not in the OS-name table
    #[error("Unsupported host operating system: {0}")]
    UnsupportedHost(String),

    /// `dotnet --info` did not report a RID line
    #[error("Could not determine RID from dotnet output: {0}")]
    RidNotFound(String),

    /// A delegated command exited non-zero
    #[error("Stage '{stage}' exited with code {code}")]
    CommandFailed { stage: String, code: i32 },

    /// A command could not be started at all
    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem operation failed on a specific path
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A process holding file locks did not go away in time
    #[error("{process} still running after {attempts} polls")]
    ResourceLocked { process: String, attempts: u32 },

    /// Runtime output directory does not have exactly one entry
    #[error("Expected exactly one entry under {}, found {found}", dir.display())]
    OverlayDestination { dir: PathBuf, found: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Process exit code to report for this error.
    ///
    /// Failed delegated commands propagate their own status unchanged.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::CommandFailed { code, .. } => *code,
            _ => 1,
        }
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Result type for fxci-core operations
pub type Result<T> = std::result::Result<T, HarnessError>;
