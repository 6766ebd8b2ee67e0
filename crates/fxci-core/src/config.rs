//! Run configuration: raw options, validation and injectable settings.

use crate::error::{HarnessError, Result};
use crate::paths::{default_external_root, default_source_root, normalize};
use crate::platform::{default_os_names, HostFamily, HostOs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default downstream repository.
pub const DEFAULT_REPO_URL: &str = "https://github.com/dotnet/corefx.git";

/// Ref meaning "whatever the cloned branch points at".
pub const LATEST_REF: &str = "HEAD";

/// Target architecture of the locally built runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86,
    X64,
    Arm,
    Arm64,
}

impl Architecture {
    pub const ALL: [Architecture; 4] = [
        Architecture::X86,
        Architecture::X64,
        Architecture::Arm,
        Architecture::Arm64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
            Architecture::Arm => "arm",
            Architecture::Arm64 => "arm64",
        }
    }

    /// Case-insensitive lookup.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build flavor of the locally built runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildType {
    Debug,
    Checked,
    Release,
}

impl BuildType {
    pub const ALL: [BuildType; 3] = [BuildType::Debug, BuildType::Checked, BuildType::Release];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildType::Debug => "Debug",
            BuildType::Checked => "Checked",
            BuildType::Release => "Release",
        }
    }

    /// Case-insensitive lookup.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated options as supplied on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOptions {
    pub arch: String,
    pub build_type: String,
    pub clr_root: Option<PathBuf>,
    pub fx_root: Option<PathBuf>,
    pub fx_branch: String,
    pub fx_commit: Option<String>,
    pub env_script: Option<PathBuf>,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            arch: "x64".to_string(),
            build_type: "Debug".to_string(),
            clr_root: None,
            fx_root: None,
            fx_branch: "master".to_string(),
            fx_commit: None,
            env_script: None,
        }
    }
}

/// Validated, fully resolved run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub arch: Architecture,
    pub build_type: BuildType,

    /// Root of the runtime source tree (holds `bin/Product` and `Tools`).
    pub source_root: PathBuf,

    /// Where the external tree is cloned.
    pub external_root: PathBuf,

    pub branch: String,

    /// Ref to check out after cloning; [`LATEST_REF`] by default.
    pub commit: String,

    /// Absolute path of a script sourced before the test run.
    pub env_script: Option<PathBuf>,
}

/// Whether the test run gets `/p:TestWithLocalNativeLibraries=true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeLibraryPolicy {
    /// Only on non-Windows hosts.
    UnixOnly,
    Always,
    Never,
}

impl NativeLibraryPolicy {
    pub fn applies_to(&self, host: HostFamily) -> bool {
        match self {
            NativeLibraryPolicy::UnixOnly => !host.is_windows(),
            NativeLibraryPolicy::Always => true,
            NativeLibraryPolicy::Never => false,
        }
    }
}

/// Bounded polling for a process that must exit before deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 150,
        }
    }
}

/// Constants the pipeline components depend on, injected rather than global.
#[derive(Debug, Clone)]
pub struct HarnessSettings {
    /// Repository cloned into the external root.
    pub repo_url: String,

    /// Host family commands are shaped for.
    pub host: HostFamily,

    /// `uname -s` output to product OS name.
    pub os_names: BTreeMap<String, HostOs>,

    /// Compiler server image name that holds locks in the external tree.
    pub compiler_server: String,

    pub lock_poll: PollPolicy,

    /// Parent directories between the program and the source root.
    pub source_root_depth: usize,

    pub native_libraries: NativeLibraryPolicy,

    /// Log side-effecting steps without performing them.
    pub dry_run: bool,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            repo_url: DEFAULT_REPO_URL.to_string(),
            host: HostFamily::current(),
            os_names: default_os_names(),
            compiler_server: "VBCSCompiler.exe".to_string(),
            lock_poll: PollPolicy::default(),
            source_root_depth: 3,
            native_libraries: NativeLibraryPolicy::UnixOnly,
            dry_run: false,
        }
    }
}

fn invalid(name: &'static str, value: impl fmt::Display) -> HarnessError {
    HarnessError::InvalidArgument {
        name,
        value: value.to_string(),
    }
}

/// Paths are handed to git and the shell as text, so they must be UTF-8.
fn utf8_path(name: &'static str, path: PathBuf) -> Result<PathBuf> {
    if path.to_str().is_none() {
        return Err(invalid(name, path.display()));
    }
    Ok(path)
}

/// Validate raw options into a [`Configuration`].
///
/// `program` is the path of the running executable, used to derive the
/// source root when none is given. Fails on the first invalid field.
pub fn validate(
    raw: &RawOptions,
    program: &Path,
    settings: &HarnessSettings,
) -> Result<Configuration> {
    let arch = Architecture::parse(&raw.arch).ok_or_else(|| invalid("arch", &raw.arch))?;
    let build_type =
        BuildType::parse(&raw.build_type).ok_or_else(|| invalid("build_type", &raw.build_type))?;

    if raw.fx_branch.is_empty() {
        return Err(invalid("fx_branch", &raw.fx_branch));
    }
    let branch = raw.fx_branch.clone();

    let commit = raw
        .fx_commit
        .clone()
        .unwrap_or_else(|| LATEST_REF.to_string());

    let source_root = match &raw.clr_root {
        None => default_source_root(program, settings.source_root_depth)?,
        Some(root) => {
            let root = normalize(root)?;
            if !root.is_dir() {
                return Err(invalid("clr_root", root.display()));
            }
            root
        }
    };
    let source_root = utf8_path("clr_root", source_root)?;

    let external_root = match &raw.fx_root {
        None => default_external_root(&source_root),
        Some(root) => utf8_path("fx_root", normalize(root)?)?,
    };

    let env_script = match &raw.env_script {
        None => None,
        Some(script) => {
            if !script.is_file() {
                return Err(invalid("env_script", script.display()));
            }
            Some(utf8_path("env_script", normalize(script)?)?)
        }
    };

    let config = Configuration {
        arch,
        build_type,
        source_root,
        external_root,
        branch,
        commit,
        env_script,
    };

    info!("Configuration:");
    info!(" arch: {}", config.arch);
    info!(" build_type: {}", config.build_type);
    info!(" clr_root: {}", config.source_root.display());
    info!(" fx_root: {}", config.external_root.display());
    info!(" fx_branch: {}", config.branch);
    info!(" fx_commit: {}", config.commit);
    info!(
        " env_script: {}",
        config
            .env_script
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "None".to_string())
    );

    Ok(config)
}
