use tracing::{debug, warn};

use crate::error::{HelperError, Result};
use crate::shell::{self, CommandRunner, Invocation};

/// Equivalent touch library package names, tried in order.
pub const TSLIB_CANDIDATES: [&str; 3] = ["libts0", "tslib", "libts-dev"];

/// Framebuffer viewer, git, touch tools and a compiler toolchain.
pub const SUPPORT_PACKAGES: [&str; 4] = ["fbi", "git", "libts-bin", "build-essential"];

/// apt-get front end. The package index is refreshed at most once per run.
#[derive(Debug, Default)]
pub struct PackageInstaller {
    index_refreshed: bool,
}

impl PackageInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_refreshed(&self) -> bool {
        self.index_refreshed
    }

    pub fn refresh_index(&mut self, runner: &mut dyn CommandRunner) -> Result<()> {
        if self.index_refreshed {
            debug!("package index already refreshed");
            return Ok(());
        }
        println!("Updating apt indexes...");
        shell::run_stage(
            runner,
            "update apt indexes (try 'sudo apt-get update' manually)",
            &Invocation::new("apt-get").arg("update"),
        )?;
        self.index_refreshed = true;
        Ok(())
    }

    /// Install `packages` in one batch.
    pub fn install(&mut self, runner: &mut dyn CommandRunner, packages: &[&str]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        self.refresh_index(runner)?;
        let invocation = Invocation::new("apt-get")
            .args(["install", "-y"])
            .args(packages);
        shell::run_checked(runner, &invocation).map_err(|e| {
            warn!(error = %e, "package install failed");
            HelperError::PackageInstall {
                what: packages.join(" "),
                source: Some(Box::new(e)),
            }
        })?;
        Ok(())
    }

    /// First of [`TSLIB_CANDIDATES`] that installs cleanly.
    /// The last candidate's failure is kept as the error source.
    pub fn install_touch_library(
        &mut self,
        runner: &mut dyn CommandRunner,
    ) -> Result<&'static str> {
        self.refresh_index(runner)?;
        let mut last_failure = None;
        for candidate in TSLIB_CANDIDATES {
            match self.install(runner, &[candidate]) {
                Ok(()) => return Ok(candidate),
                Err(HelperError::PackageInstall { source, .. }) => {
                    debug!(package = candidate, "not installable, trying next");
                    last_failure = source;
                }
                Err(e) => return Err(e),
            }
        }
        Err(HelperError::PackageInstall {
            what: "TSLIB".into(),
            source: last_failure,
        })
    }

    pub fn install_support_packages(&mut self, runner: &mut dyn CommandRunner) -> Result<()> {
        self.refresh_index(runner)?;
        self.install(runner, &SUPPORT_PACKAGES)
            .map_err(|e| match e {
                HelperError::PackageInstall { source, .. } => HelperError::PackageInstall {
                    what: "software".into(),
                    source,
                },
                other => other,
            })
    }

    /// Touch library, then the support batch.
    pub fn install_all(&mut self, runner: &mut dyn CommandRunner) -> Result<()> {
        println!("Installing Pre-requisite Software...This may take a few minutes!");
        let tslib = self.install_touch_library(runner)?;
        println!("  Touch library: {tslib}");
        self.install_support_packages(runner)
    }
}
