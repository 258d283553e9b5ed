//! rpi-fbcp: build, boot-time registration and the HDMI settings it needs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use goodtft_catalog::{DisplayProfile, Rotation, DEFAULT_X11_SCALE};
use tracing::{debug, warn};

use crate::bootconfig;
use crate::context::{boot_config_path, InitSystem, RuntimeContext, SystemPaths};
use crate::edit::{self, ConfigFile, Edit};
use crate::env;
use crate::error::{HelperError, Result};
use crate::packages::PackageInstaller;
use crate::shell::{self, CommandRunner, Invocation};

pub const FBCP_REPO: &str = "https://github.com/tasanakorn/rpi-fbcp";
pub const FBCP_BINARY: &str = "/usr/local/bin/fbcp";
pub const FBCP_UNIT: &str = "fbcp.service";
pub const RC_LOCAL_LAUNCH: &str = "/usr/local/bin/fbcp &";
/// Any rc.local line containing this is treated as ours.
const RC_LOCAL_MARKER: &str = "fbcp";
const HDMI_REFRESH_HZ: u32 = 60;

pub fn unit_file() -> String {
    format!(
        "[Unit]
Description=Framebuffer copy utility for GoodTFT
After=network.target

[Service]
Type=simple
ExecStartPre=/bin/sleep 10
ExecStart={FBCP_BINARY}

[Install]
WantedBy=multi-user.target
"
    )
}

/// Clone, build and install fbcp unless it is already installed.
/// Returns whether a build happened.
pub fn build_and_install(
    paths: &SystemPaths,
    runner: &mut dyn CommandRunner,
    packages: &mut PackageInstaller,
) -> Result<bool> {
    let dest = paths.fbcp_binary();
    if dest.exists() {
        debug!(path = %dest.display(), "fbcp already installed");
        return Ok(false);
    }

    println!("Installing cmake...");
    packages.install(runner, &["cmake"])?;

    let scratch = tempfile::Builder::new()
        .prefix("goodtft-fbcp")
        .tempdir()
        .map_err(|e| HelperError::Stage {
            stage: "create build directory",
            detail: e.to_string(),
        })?;
    let source = scratch.path().join("rpi-fbcp");
    let build = source.join("build");

    println!("Downloading rpi-fbcp...");
    shell::run_stage(
        runner,
        "git clone fbcp from https://github.com/tasanakorn/rpi-fbcp",
        &Invocation::new("git")
            .args(["clone", "--depth=1", FBCP_REPO])
            .arg(source.display().to_string()),
    )?;
    fs::create_dir_all(&build).map_err(|e| HelperError::write(&build, e))?;

    println!("Building rpi-fbcp...");
    shell::run_stage(
        runner,
        "cmake fbcp",
        &Invocation::new("cmake").arg("..").current_dir(&build),
    )?;
    shell::run_stage(runner, "make fbcp", &Invocation::new("make").current_dir(&build))?;

    println!("Installing rpi-fbcp...");
    shell::run_stage(
        runner,
        "install fbcp",
        &Invocation::new("install")
            .arg("fbcp")
            .arg(dest.display().to_string())
            .current_dir(&build),
    )?;

    if let Err(e) = scratch.close() {
        warn!(error = %e, "could not remove fbcp build directory");
    }
    Ok(true)
}

/// Ensure rc.local launches fbcp exactly once, before its final `exit 0`.
pub fn register_rc_local(paths: &SystemPaths) -> Result<()> {
    let path = paths.rc_local();
    let mut rc = ConfigFile::load_or_empty(&path)?;

    if rc.lines().is_empty() {
        let contents = format!("#!/bin/sh -e\n\n{RC_LOCAL_LAUNCH}\n\nexit 0\n");
        return edit::atomic_write(&path, contents.as_bytes(), 0o755);
    }

    if rc.contains(RC_LOCAL_MARKER)? {
        // Already launched from rc.local; make sure the line is correct.
        rc.apply_all(&[
            Edit::keep_first(RC_LOCAL_MARKER),
            Edit::replace_line(RC_LOCAL_MARKER, RC_LOCAL_LAUNCH),
        ])?;
    } else {
        rc.apply(&Edit::insert_before("^exit 0", RC_LOCAL_LAUNCH))?;
    }
    rc.save()
}

/// Remove fbcp lines from rc.local. Returns how many were removed.
pub fn strip_rc_local(paths: &SystemPaths) -> Result<usize> {
    let path = paths.rc_local();
    if !path.exists() {
        return Ok(0);
    }
    let mut rc = ConfigFile::load(&path)?;
    let removed = rc.apply(&Edit::delete_line(RC_LOCAL_MARKER))?;
    if removed > 0 {
        rc.save()?;
    }
    Ok(removed)
}

pub fn register_systemd(paths: &SystemPaths, runner: &mut dyn CommandRunner) -> Result<()> {
    strip_rc_local(paths)?;
    edit::write_file(&paths.fbcp_unit(), &unit_file())?;
    shell::run_stage(
        runner,
        "enable fbcp.service",
        &Invocation::new("systemctl").args(["enable", FBCP_UNIT]),
    )
}

/// Start fbcp at boot the way the detected init system expects.
pub fn register_service(ctx: &RuntimeContext, runner: &mut dyn CommandRunner) -> Result<()> {
    match ctx.init {
        InitSystem::Sysvinit => {
            println!("We have sysvinit, so add fbcp to /etc/rc.local...");
            register_rc_local(&ctx.paths)
        }
        InitSystem::Systemd => {
            println!("We have systemd, so install fbcp systemd unit...");
            register_systemd(&ctx.paths, runner)
        }
    }
}

fn raspi_config(runner: &mut dyn CommandRunner, args: &[&str]) {
    let invocation = Invocation::new("raspi-config").arg("nonint").args(args);
    if !shell::succeeds(runner, &invocation) {
        warn!(command = %invocation, "raspi-config failed, continuing");
    }
}

/// Desktop autologin (when a display manager exists) and no overscan.
pub fn configure_desktop(runner: &mut dyn CommandRunner, has_display_manager: bool) {
    if has_display_manager {
        println!("Setting raspi-config to boot to desktop w/o login...");
        raspi_config(runner, &["do_boot_behaviour", "B4"]);
    }
    raspi_config(runner, &["do_overscan", "1"]);
}

/// HDMI output scale: the profile's X11 scale when a desktop is mirrored.
pub fn output_scale(profile: &DisplayProfile, has_display_manager: bool) -> u32 {
    match (has_display_manager, profile.x11_scale) {
        (false, _) => 1,
        (true, 0) => DEFAULT_X11_SCALE,
        (true, scale) => scale,
    }
}

/// The rotation whose mirror code is "0". Falls back to 90 degrees when the
/// table has no such entry.
pub fn baseline_rotation(table: &BTreeMap<Rotation, u8>) -> Rotation {
    table
        .iter()
        .find(|(_, code)| **code == 0)
        .map(|(rotation, _)| *rotation)
        .unwrap_or(Rotation::Deg90)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdmiTuning {
    pub width: u32,
    pub height: u32,
    /// `display_hdmi_rotate` value, `None` when HDMI stays unrotated.
    pub rotate: Option<u8>,
    /// Rotation written into the overlay block.
    pub overlay_rotation: Rotation,
}

pub fn plan_hdmi(profile: &DisplayProfile, rotation: Rotation, scale: u32) -> HdmiTuning {
    let table = profile.mirror_rotation_table();
    let code = table.get(&rotation).copied().unwrap_or_else(|| {
        warn!(%rotation, "no mirror rotation code, leaving HDMI unrotated");
        0
    });
    let (rotate, overlay_rotation) = if code == 0 {
        (None, rotation)
    } else {
        (Some(code), baseline_rotation(&table))
    };
    HdmiTuning {
        width: profile.width * scale,
        height: profile.height * scale,
        rotate,
        overlay_rotation,
    }
}

pub fn hdmi_edits(tuning: &HdmiTuning) -> Vec<Edit> {
    vec![
        Edit::reconfig("^.*hdmi_force_hotplug.*$", "hdmi_force_hotplug=1"),
        Edit::reconfig("^.*hdmi_group.*$", "hdmi_group=2"),
        Edit::reconfig("^.*hdmi_mode.*$", "hdmi_mode=87"),
        Edit::comment_out(r"^\s*dtoverlay=vc4-kms-v3d"),
        Edit::comment_out(r"^\s*dtoverlay=vc4-fkms-v3d"),
        Edit::replace_line("^.*#.*dtparam=spi=.*$", "dtparam=spi=on"),
        Edit::replace_line("^.*#.*dtparam=i2c_arm=.*$", "dtparam=i2c_arm=on"),
        Edit::replace_line("^.*#.*dtparam=i2c1=.*$", "dtparam=i2c1=on"),
        Edit::reconfig(
            "^.*hdmi_cvt.*$",
            format!(
                "hdmi_cvt={} {} {HDMI_REFRESH_HZ} 1 0 0 0",
                tuning.width, tuning.height
            ),
        ),
        Edit::reconfig(
            "^.*display_hdmi_rotate.*$",
            tuning
                .rotate
                .map(|code| format!("display_hdmi_rotate={code}"))
                .unwrap_or_default(),
        ),
    ]
}

/// Force HDMI to the panel's geometry. When HDMI itself is rotated the
/// overlay block is rewritten at the baseline rotation so the panel is not
/// rotated twice.
pub fn tune_hdmi(ctx: &RuntimeContext, scale: u32) -> Result<HdmiTuning> {
    println!("Configuring boot/config.txt for forced HDMI");
    let tuning = plan_hdmi(&ctx.profile, ctx.rotation, scale);

    let mut config = ConfigFile::load(&ctx.boot_config())?;
    config.apply_all(&hdmi_edits(&tuning))?;
    config.save()?;

    if tuning.rotate.is_some() {
        bootconfig::rewrite_overlay_block(&ctx.profile, tuning.overlay_rotation, &ctx.boot_dir)?;
    }
    Ok(tuning)
}

/// Full mirror setup: build, register, desktop, HDMI.
pub fn install(
    ctx: &RuntimeContext,
    runner: &mut dyn CommandRunner,
    packages: &mut PackageInstaller,
) -> Result<HdmiTuning> {
    build_and_install(&ctx.paths, runner, packages)?;
    register_service(ctx, runner)?;

    let has_dm = env::has_display_manager(&ctx.paths);
    configure_desktop(runner, has_dm);
    tune_hdmi(ctx, output_scale(&ctx.profile, has_dm))
}

/// Undo registration and HDMI forcing. GPU overlay lines stay commented.
pub fn uninstall(
    paths: &SystemPaths,
    boot_dir: &Path,
    runner: &mut dyn CommandRunner,
) -> Result<()> {
    println!("Remove fbcp from /etc/rc.local, if it's there...");
    strip_rc_local(paths)?;

    let disable = Invocation::new("systemctl").args(["disable", FBCP_UNIT]);
    if !shell::succeeds(runner, &disable) {
        debug!("fbcp.service was not enabled");
    }
    let unit = paths.fbcp_unit();
    if unit.exists() {
        fs::remove_file(&unit).map_err(|e| HelperError::write(&unit, e))?;
    }

    raspi_config(runner, &["do_overscan", "0"]);

    println!("Configuring boot/config.txt for default HDMI");
    let mut config = ConfigFile::load(&boot_config_path(boot_dir))?;
    config.apply_all(&[
        Edit::reconfig("^.*hdmi_force_hotplug.*$", "hdmi_force_hotplug=0"),
        Edit::delete_line("^hdmi_group=2.*$"),
        Edit::delete_line("^hdmi_mode=87.*$"),
        Edit::delete_line("^hdmi_cvt=.*$"),
        Edit::delete_line("^display_hdmi_rotate=.*$"),
    ])?;
    config.save()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::fake::FakeRunner;
    use goodtft_catalog::Catalog;

    const STOCK_CONFIG: &str = "\
#hdmi_force_hotplug=1
#hdmi_group=1
#hdmi_mode=1
#dtparam=i2c_arm=on
#dtparam=spi=on
dtoverlay=vc4-kms-v3d
[all]
";

    fn context(root: &Path, init: InitSystem, rotation: Rotation) -> RuntimeContext {
        let boot_dir = root.join("boot");
        fs::create_dir_all(&boot_dir).unwrap();
        fs::write(boot_dir.join("config.txt"), STOCK_CONFIG).unwrap();
        RuntimeContext {
            profile: Catalog::builtin().find("3501r").cloned().unwrap(),
            rotation,
            boot_dir,
            init,
            paths: SystemPaths::new(root),
        }
    }

    fn rc_local(paths: &SystemPaths) -> String {
        fs::read_to_string(paths.rc_local()).unwrap()
    }

    fn write_rc_local(paths: &SystemPaths, contents: &str) {
        fs::create_dir_all(paths.rc_local().parent().unwrap()).unwrap();
        fs::write(paths.rc_local(), contents).unwrap();
    }

    #[test]
    fn test_build_runs_stages_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = SystemPaths::new(tmp.path());
        let mut runner = FakeRunner::new();
        let mut packages = PackageInstaller::new();

        assert!(build_and_install(&paths, &mut runner, &mut packages).unwrap());
        let programs: Vec<&str> = runner.calls.iter().map(|c| c.program.as_str()).collect();
        assert_eq!(programs, ["apt-get", "apt-get", "git", "cmake", "make", "install"]);
        assert!(runner.ran("apt-get install -y cmake"));
        let install = runner.calls.last().unwrap();
        assert_eq!(install.args[1], paths.fbcp_binary().display().to_string());
        assert!(install.cwd.as_ref().unwrap().ends_with("rpi-fbcp/build"));
    }

    #[test]
    fn test_build_skipped_when_installed() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = SystemPaths::new(tmp.path());
        fs::create_dir_all(paths.fbcp_binary().parent().unwrap()).unwrap();
        fs::write(paths.fbcp_binary(), "").unwrap();

        let mut runner = FakeRunner::new();
        assert!(!build_and_install(&paths, &mut runner, &mut PackageInstaller::new()).unwrap());
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn test_build_failure_names_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = SystemPaths::new(tmp.path());

        let stages = [
            ("git", "git clone"),
            ("cmake", "cmake fbcp"),
            ("make", "make fbcp"),
        ];
        for (failing, stage) in stages {
            let mut runner = FakeRunner::new().fail(failing);
            let err = build_and_install(&paths, &mut runner, &mut PackageInstaller::new())
                .unwrap_err();
            assert!(format!("{err}").contains(stage), "{err}");
        }
    }

    #[test]
    fn test_build_failure_reports_compiler_output() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = SystemPaths::new(tmp.path());
        let mut runner = FakeRunner::new()
            .fail("make")
            .stderr("make", "fbcp.c:12: error: bcm_host.h: No such file\n");

        let err = build_and_install(&paths, &mut runner, &mut PackageInstaller::new())
            .unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("make fbcp"), "{msg}");
        assert!(msg.contains("bcm_host.h"), "{msg}");
    }

    #[test]
    fn test_rc_local_insert_before_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = SystemPaths::new(tmp.path());
        write_rc_local(&paths, "#!/bin/sh -e\n# comment\nexit 0\n");

        register_rc_local(&paths).unwrap();
        register_rc_local(&paths).unwrap();
        assert_eq!(
            rc_local(&paths),
            "#!/bin/sh -e\n# comment\n/usr/local/bin/fbcp &\nexit 0\n"
        );
    }

    #[test]
    fn test_rc_local_rewrites_existing_line() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = SystemPaths::new(tmp.path());
        write_rc_local(&paths, "#!/bin/sh\nfbcp\nsleep 1\n/opt/fbcp -d &\nexit 0\n");

        register_rc_local(&paths).unwrap();
        let rc = rc_local(&paths);
        assert_eq!(rc, "#!/bin/sh\n/usr/local/bin/fbcp &\nsleep 1\nexit 0\n");
    }

    #[test]
    fn test_rc_local_created_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = SystemPaths::new(tmp.path());
        register_rc_local(&paths).unwrap();
        let rc = rc_local(&paths);
        assert_eq!(rc.matches(RC_LOCAL_LAUNCH).count(), 1);
        assert!(rc.ends_with("exit 0\n"));
    }

    #[test]
    fn test_sysvinit_registration_leaves_unit_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), InitSystem::Sysvinit, Rotation::Deg90);
        write_rc_local(&ctx.paths, "exit 0\n");
        let mut runner = FakeRunner::new();

        register_service(&ctx, &mut runner).unwrap();
        assert!(!ctx.paths.fbcp_unit().exists());
        assert!(runner.calls.is_empty());
        assert_eq!(rc_local(&ctx.paths).matches("fbcp").count(), 1);
    }

    #[test]
    fn test_systemd_registration_strips_rc_local() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), InitSystem::Systemd, Rotation::Deg90);
        write_rc_local(&ctx.paths, "/usr/local/bin/fbcp &\nexit 0\n");
        let mut runner = FakeRunner::new();

        register_service(&ctx, &mut runner).unwrap();
        assert_eq!(rc_local(&ctx.paths), "exit 0\n");
        assert_eq!(fs::read_to_string(ctx.paths.fbcp_unit()).unwrap(), unit_file());
        assert!(runner.ran("systemctl enable fbcp.service"));
    }

    #[test]
    fn test_systemd_enable_failure_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), InitSystem::Systemd, Rotation::Deg90);
        let mut runner = FakeRunner::new().fail("systemctl enable");
        assert!(register_service(&ctx, &mut runner).is_err());
    }

    #[test]
    fn test_baseline_rotation() {
        let profile = Catalog::builtin().find("3501r").cloned().unwrap();
        assert_eq!(baseline_rotation(&profile.mirror_rotation_table()), Rotation::Deg90);

        let table: BTreeMap<Rotation, u8> = [(Rotation::Deg0, 0), (Rotation::Deg90, 1)].into();
        assert_eq!(baseline_rotation(&table), Rotation::Deg0);

        let no_zero: BTreeMap<Rotation, u8> = [(Rotation::Deg0, 2)].into();
        assert_eq!(baseline_rotation(&no_zero), Rotation::Deg90);
    }

    #[test]
    fn test_output_scale() {
        let mut profile = Catalog::builtin().find("3501r").cloned().unwrap();
        assert_eq!(output_scale(&profile, false), 1);
        assert_eq!(output_scale(&profile, true), 2);
        profile.x11_scale = 0;
        assert_eq!(output_scale(&profile, true), DEFAULT_X11_SCALE);
    }

    #[test]
    fn test_tune_hdmi_baseline_rotation() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), InitSystem::Systemd, Rotation::Deg90);

        let tuning = tune_hdmi(&ctx, 1).unwrap();
        assert_eq!(tuning.rotate, None);

        let config = fs::read_to_string(ctx.boot_config()).unwrap();
        let lines: Vec<&str> = config.lines().collect();
        for expected in [
            "hdmi_force_hotplug=1",
            "hdmi_group=2",
            "hdmi_mode=87",
            "dtparam=i2c_arm=on",
            "dtparam=spi=on",
            "#dtoverlay=vc4-kms-v3d",
            "hdmi_cvt=480 320 60 1 0 0 0",
        ] {
            assert!(lines.contains(&expected), "missing {expected}:\n{config}");
        }
        assert!(!config.contains("display_hdmi_rotate"));
        // Overlay block untouched at the baseline rotation.
        assert!(!config.contains("goodtft-helper"));
    }

    #[test]
    fn test_tune_hdmi_rotated_unrotates_overlay() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), InitSystem::Systemd, Rotation::Deg180);
        bootconfig::rewrite_overlay_block(&ctx.profile, ctx.rotation, &ctx.boot_dir).unwrap();

        let tuning = tune_hdmi(&ctx, 2).unwrap();
        assert_eq!(tuning.rotate, Some(3));
        assert_eq!(tuning.overlay_rotation, Rotation::Deg90);

        let config = fs::read_to_string(ctx.boot_config()).unwrap();
        assert!(config.contains("display_hdmi_rotate=3"));
        assert!(config.contains("hdmi_cvt=960 640 60 1 0 0 0"));
        assert!(config.contains("dtoverlay=tft35a,rotate=90,fps=60"));
        assert!(!config.contains("rotate=180"));
        assert_eq!(config.matches("# --- added by goodtft-helper").count(), 1);
    }

    #[test]
    fn test_uninstall_restores_hdmi() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), InitSystem::Systemd, Rotation::Deg270);
        let mut runner = FakeRunner::new();
        register_service(&ctx, &mut runner).unwrap();
        tune_hdmi(&ctx, 1).unwrap();

        uninstall(&ctx.paths, &ctx.boot_dir, &mut runner).unwrap();
        assert!(runner.ran("systemctl disable fbcp.service"));
        assert!(runner.ran("raspi-config nonint do_overscan 0"));
        assert!(!ctx.paths.fbcp_unit().exists());

        let config = fs::read_to_string(ctx.boot_config()).unwrap();
        assert!(config.contains("hdmi_force_hotplug=0"));
        for gone in ["hdmi_group=2", "hdmi_mode=87", "hdmi_cvt=", "display_hdmi_rotate="] {
            assert!(!config.contains(gone), "{gone} still present:\n{config}");
        }
        // GPU overlay is not re-enabled.
        assert!(config.contains("#dtoverlay=vc4-kms-v3d"));
    }
}
