//! External tree acquisition: purge, clone, checkout.

use crate::config::{Configuration, HarnessSettings, LATEST_REF};
use crate::error::{HarnessError, Result};
use crate::fs_tree::remove_tree;
use crate::process::{run_stage, CommandSpec, ProcessRunner};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory under the external root exported as `HOME` on Unix hosts.
pub const TEMP_HOME_DIR: &str = "tempHome";

/// A fresh checkout and the environment its build scripts need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub root: PathBuf,

    /// Variables to set on every command run inside the checkout.
    pub env: Vec<(String, String)>,
}

impl Checkout {
    /// A command rooted in the checkout with its environment applied.
    pub fn command(&self, program: impl Into<String>) -> CommandSpec {
        CommandSpec::new(program)
            .current_dir(&self.root)
            .envs(self.env.iter().cloned())
    }
}

/// Guarantees a clean checkout of the external tree.
pub struct RepositoryManager<'a> {
    runner: &'a dyn ProcessRunner,
    settings: &'a HarnessSettings,
}

impl<'a> RepositoryManager<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, settings: &'a HarnessSettings) -> Self {
        Self { runner, settings }
    }

    /// Purge any previous checkout, clone the branch and check out the ref.
    pub async fn prepare(&self, config: &Configuration) -> Result<Checkout> {
        let root = &config.external_root;

        if root.exists() {
            self.purge(root).await?;
        } else {
            debug!(root = %root.display(), "No previous checkout");
        }

        self.clone_branch(config).await?;
        self.checkout_ref(config).await?;

        let env = self.scoped_home(root)?;
        Ok(Checkout {
            root: root.clone(),
            env,
        })
    }

    /// Clean and delete an existing checkout.
    pub async fn purge(&self, root: &Path) -> Result<()> {
        if self.settings.host.is_windows() {
            self.wait_for_compiler_server().await?;
        }

        let clean = CommandSpec::new("git")
            .args(["clean", "-fxd"])
            .current_dir(root);
        let code = self.runner.status(&clean).await?;
        if code != 0 {
            warn!(code, root = %root.display(), "git clean failed, deleting anyway");
        }

        if self.settings.dry_run {
            info!(root = %root.display(), "[dry-run] would delete previous checkout");
            return Ok(());
        }

        info!(root = %root.display(), "Deleting previous checkout");
        remove_tree(root)
    }

    /// Poll the process list until the compiler server has exited.
    pub async fn wait_for_compiler_server(&self) -> Result<()> {
        let policy = self.settings.lock_poll;
        let process = &self.settings.compiler_server;

        for attempt in 1..=policy.max_attempts {
            let listing = self.runner.output(&CommandSpec::new("tasklist")).await?;
            if !listing.success() {
                return Err(HarnessError::CommandFailed {
                    stage: "tasklist".to_string(),
                    code: listing.exit_code,
                });
            }
            if !listing.stdout.contains(process.as_str()) {
                return Ok(());
            }

            debug!(attempt, process = %process, "Waiting for compiler server to exit");
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        Err(HarnessError::ResourceLocked {
            process: process.clone(),
            attempts: policy.max_attempts,
        })
    }

    async fn clone_branch(&self, config: &Configuration) -> Result<()> {
        let mut clone = CommandSpec::new("git")
            .args(["clone", "-b", config.branch.as_str(), "--single-branch"]);
        if config.commit == LATEST_REF {
            clone = clone.args(["--depth", "1"]);
        }
        let clone = clone
            .arg(self.settings.repo_url.as_str())
            .arg(config.external_root.to_string_lossy());

        run_stage(self.runner, "clone", &clone).await
    }

    async fn checkout_ref(&self, config: &Configuration) -> Result<()> {
        info!("[cd] {}", config.external_root.display());
        let checkout = CommandSpec::new("git")
            .args(["checkout", config.commit.as_str()])
            .current_dir(&config.external_root);

        run_stage(self.runner, "checkout", &checkout).await
    }

    /// The downstream build scripts require `HOME`; give them one inside the tree.
    fn scoped_home(&self, root: &Path) -> Result<Vec<(String, String)>> {
        if self.settings.host.is_windows() {
            return Ok(Vec::new());
        }

        let home = root.join(TEMP_HOME_DIR);
        if !self.settings.dry_run {
            fs::create_dir_all(&home).map_err(|source| HarnessError::fs(&home, source))?;
        }
        info!("HOME={}", home.display());
        Ok(vec![("HOME".to_string(), home.to_string_lossy().to_string())])
    }
}
