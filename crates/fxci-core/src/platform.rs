//! Host platform identification and RID resolution.

use crate::error::{HarnessError, Result};
use crate::paths::dotnet_cli_dir;
use crate::process::{CommandSpec, ProcessRunner};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

/// RID OS token used on every Windows host.
pub const WINDOWS_RID_OS: &str = "win7";

/// Broad host family; decides script names and command shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostFamily {
    Windows,
    Unix,
}

impl HostFamily {
    /// Family of the machine this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            HostFamily::Windows
        } else {
            HostFamily::Unix
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, HostFamily::Windows)
    }
}

/// Operating system as named in runtime product directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostOs {
    Windows,
    Linux,
    OSX,
    FreeBSD,
    OpenBSD,
    NetBSD,
    SunOS,
}

impl HostOs {
    /// Name used in `bin/Product/<OS>.<arch>.<build type>`.
    pub fn product_name(&self) -> &'static str {
        match self {
            HostOs::Windows => "Windows_NT",
            HostOs::Linux => "Linux",
            HostOs::OSX => "OSX",
            HostOs::FreeBSD => "FreeBSD",
            HostOs::OpenBSD => "OpenBSD",
            HostOs::NetBSD => "NetBSD",
            HostOs::SunOS => "SunOS",
        }
    }

    pub fn family(&self) -> HostFamily {
        match self {
            HostOs::Windows => HostFamily::Windows,
            _ => HostFamily::Unix,
        }
    }
}

/// `uname -s` sysname to [`HostOs`].
pub fn default_os_names() -> BTreeMap<String, HostOs> {
    [
        ("Linux", HostOs::Linux),
        ("Darwin", HostOs::OSX),
        ("FreeBSD", HostOs::FreeBSD),
        ("OpenBSD", HostOs::OpenBSD),
        ("NetBSD", HostOs::NetBSD),
        ("SunOS", HostOs::SunOS),
    ]
    .into_iter()
    .map(|(name, os)| (name.to_string(), os))
    .collect()
}

/// Host OS plus the RID OS token handed to the downstream build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    pub host: HostOs,
    pub rid_os: String,
}

impl PlatformDescriptor {
    /// Resolve the RID OS token for an already detected `host`.
    ///
    /// `env` is applied to the `dotnet --info` query; the pipeline passes the
    /// checkout's scoped `HOME` so the CLI never runs without one.
    pub async fn resolve(
        runner: &dyn ProcessRunner,
        host: HostOs,
        source_root: &Path,
        env: &[(String, String)],
    ) -> Result<Self> {
        let rid_os = resolve_rid_os(runner, host, source_root, env).await?;
        info!(host = host.product_name(), rid_os = %rid_os, "Resolved platform");
        Ok(Self { host, rid_os })
    }
}

/// Map the host to a [`HostOs`] through `os_names`.
pub async fn detect_host_os(
    runner: &dyn ProcessRunner,
    family: HostFamily,
    os_names: &BTreeMap<String, HostOs>,
) -> Result<HostOs> {
    if family.is_windows() {
        return Ok(HostOs::Windows);
    }

    let output = runner.output(&CommandSpec::new("uname").arg("-s")).await?;
    if !output.success() {
        return Err(HarnessError::CommandFailed {
            stage: "uname".to_string(),
            code: output.exit_code,
        });
    }

    let sysname = output.stdout.trim();
    debug!(sysname, "Host sysname");
    os_names
        .get(sysname)
        .copied()
        .ok_or_else(|| HarnessError::UnsupportedHost(sysname.to_string()))
}

/// RID OS token for `host`.
///
/// Fixed on Windows; elsewhere read from `dotnet --info` of the helper tool
/// directory under `source_root`.
pub async fn resolve_rid_os(
    runner: &dyn ProcessRunner,
    host: HostOs,
    source_root: &Path,
    env: &[(String, String)],
) -> Result<String> {
    if host.family().is_windows() {
        return Ok(WINDOWS_RID_OS.to_string());
    }

    let dotnet = dotnet_cli_dir(source_root).join("dotnet");
    let cmd = CommandSpec::new(dotnet.to_string_lossy())
        .arg("--info")
        .envs(env.iter().cloned());
    let output = runner.output(&cmd).await?;
    if !output.success() {
        return Err(HarnessError::CommandFailed {
            stage: "dotnet --info".to_string(),
            code: output.exit_code,
        });
    }

    parse_rid_os(&output.stdout)
}

fn rid_pattern() -> &'static Regex {
    static RID: OnceLock<Regex> = OnceLock::new();
    RID.get_or_init(|| {
        Regex::new(r"(?m)^\s*RID:\s+([^-]*)-(\S*)\s*$").expect("RID pattern is valid")
    })
}

/// Extract the OS segment of the `RID: <os>-<arch>` line.
pub fn parse_rid_os(info: &str) -> Result<String> {
    rid_pattern()
        .captures(info)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            let first = info.lines().next().unwrap_or_default();
            HarnessError::RidNotFound(format!("no 'RID:' line (output began with '{first}')"))
        })
}
