//! Top-level install and uninstall workflows.
//!
//! Steps run strictly in order; the first failure aborts the run.

use std::path::PathBuf;

use goodtft_catalog::Catalog;
use tracing::{debug, info};

use crate::bootconfig;
use crate::context::{RuntimeContext, SystemPaths};
use crate::drivers;
use crate::env;
use crate::error::{HelperError, Result};
use crate::finalize::{self, RebootDecision};
use crate::mirror;
use crate::packages::PackageInstaller;
use crate::prompt::Prompter;
use crate::select::{self, DisplayChoice};
use crate::shell::CommandRunner;
use crate::touch;

pub const MIRROR_PROMPT: &str = "Would you like the HDMI display to mirror to the PiTFT display?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallType {
    /// Install HDMI mirroring without asking.
    Fbcp,
    /// Reverse a previous install and stop.
    Uninstall,
}

/// Everything the command line can decide up front.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub display: Option<String>,
    pub rotation: Option<String>,
    pub install_type: Option<InstallType>,
    pub reboot: RebootDecision,
    pub home_override: Option<PathBuf>,
    pub boot_override: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Installed { rebooted: bool },
    Uninstalled { rebooted: bool },
    /// The user picked "Quit without installing".
    Quit,
}

fn step(title: &str) {
    println!("\n── {title} ──");
}

/// Run the whole helper against `paths`.
pub fn run(
    opts: &Options,
    catalog: &Catalog,
    paths: &SystemPaths,
    runner: &mut dyn CommandRunner,
    prompter: &mut dyn Prompter,
) -> Result<RunOutcome> {
    let boot_dir = env::resolve_boot_directory(opts.boot_override.as_deref());
    let invoking_user = env::invoking_user();
    let home_dir = env::resolve_home_directory(
        invoking_user.as_deref(),
        opts.home_override.as_deref(),
        paths,
    );
    debug!(boot = %boot_dir.display(), home = %home_dir.display(), "directories resolved");

    if opts.install_type == Some(InstallType::Uninstall) {
        return uninstall(opts, paths, &boot_dir, runner, prompter);
    }

    let profile = match select::resolve_profile(opts.display.as_deref(), catalog, prompter)? {
        DisplayChoice::Profile(profile) => profile.clone(),
        DisplayChoice::Uninstall => return uninstall(opts, paths, &boot_dir, runner, prompter),
        DisplayChoice::Quit => return Ok(RunOutcome::Quit),
    };
    let rotation = select::resolve_rotation(opts.rotation.as_deref(), prompter)?;
    select::ensure_supported(&profile, rotation)?;

    step("Checking init system");
    let init = env::detect_init_system(runner, paths)?;
    println!("Found {init}");

    if env::boot_is_mounted(paths) {
        println!("/boot is mounted");
    } else {
        println!(
            "/boot must be mounted. if you think it's not, quit here and try: \
             sudo mount /dev/mmcblk0p1 /boot"
        );
        if !prompter.confirm("Continue?", false)? {
            return Err(HelperError::Declined);
        }
        println!("Proceeding.");
    }

    if !home_dir.is_dir() {
        return Err(HelperError::MissingHomeDirectory {
            path: home_dir.display().to_string(),
        });
    }

    let ctx = RuntimeContext {
        profile,
        rotation,
        boot_dir,
        init,
        paths: paths.clone(),
    };
    info!(
        display = %ctx.profile.type_id,
        rotation = %ctx.rotation,
        init = %ctx.init,
        "installing"
    );
    let rebooted = install(opts, &ctx, runner, prompter)?;
    Ok(RunOutcome::Installed { rebooted })
}

fn install(
    opts: &Options,
    ctx: &RuntimeContext,
    runner: &mut dyn CommandRunner,
    prompter: &mut dyn Prompter,
) -> Result<bool> {
    let mut packages = PackageInstaller::new();

    step("Installing touch library and software");
    packages.install_all(runner)?;

    if drivers::install_overlay(&ctx.profile, &ctx.boot_dir)?.is_some() {
        debug!("overlay installed");
    }

    step(&format!("Updating {}", ctx.boot_config().display()));
    bootconfig::rewrite_overlay_block(&ctx.profile, ctx.rotation, &ctx.boot_dir)?;

    if ctx.profile.touch_calibration.is_some() {
        step("Updating SysFS rules for Touchscreen");
        touch::write_udev_rule(&ctx.paths)?;
        touch::write_xorg_calibration(&ctx.paths, &ctx.profile, ctx.rotation)?;
    }

    let mirror = match opts.install_type {
        Some(InstallType::Fbcp) => true,
        _ => prompter.confirm(MIRROR_PROMPT, false)?,
    };
    if mirror {
        step("Adding FBCP support");
        mirror::install(ctx, runner, &mut packages)?;

        if env::has_display_manager(&ctx.paths) {
            step("Updating X11 default calibration");
            touch::write_xorg_calibration(&ctx.paths, &ctx.profile, ctx.rotation)?;
        }
    } else {
        step("Making sure FBCP is disabled");
        mirror::uninstall(&ctx.paths, &ctx.boot_dir, runner)?;
    }

    finalize::finalize(opts.reboot, runner, prompter)
}

fn uninstall(
    opts: &Options,
    paths: &SystemPaths,
    boot_dir: &std::path::Path,
    runner: &mut dyn CommandRunner,
    prompter: &mut dyn Prompter,
) -> Result<RunOutcome> {
    step("Uninstalling PiTFT");
    bootconfig::remove_overlay_block(boot_dir)?;

    step("Removing FBCP support");
    mirror::uninstall(paths, boot_dir, runner)?;

    let rebooted = finalize::finalize(opts.reboot, runner, prompter)?;
    Ok(RunOutcome::Uninstalled { rebooted })
}
