use std::fmt;
use std::path::{Path, PathBuf};

use goodtft_catalog::{DisplayProfile, Rotation};

/// Default target home directory when no user home can be found.
pub const DEFAULT_HOME_DIR: &str = "/home/pi";
pub const DEFAULT_BOOT_DIR: &str = "/boot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystem {
    Systemd,
    Sysvinit,
}

impl InitSystem {
    pub fn name(self) -> &'static str {
        match self {
            Self::Systemd => "systemd",
            Self::Sysvinit => "sysvinit",
        }
    }
}

impl fmt::Display for InitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Well-known system files, resolved under `root`. Production uses `/`;
/// tests point `root` at a temp dir.
#[derive(Debug, Clone)]
pub struct SystemPaths {
    root: PathBuf,
}

impl SystemPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn system() -> Self {
        Self::new("/")
    }

    pub fn resolve(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }

    pub fn rc_local(&self) -> PathBuf {
        self.resolve("/etc/rc.local")
    }

    pub fn udev_rule(&self) -> PathBuf {
        self.resolve("/etc/udev/rules.d/95-touchmouse.rules")
    }

    pub fn xorg_calibration(&self) -> PathBuf {
        self.resolve("/usr/share/X11/xorg.conf.d/20-calibration.conf")
    }

    pub fn fbcp_unit(&self) -> PathBuf {
        self.resolve("/etc/systemd/system/fbcp.service")
    }

    pub fn fbcp_binary(&self) -> PathBuf {
        self.resolve("/usr/local/bin/fbcp")
    }

    pub fn lightdm_dir(&self) -> PathBuf {
        self.resolve("/etc/lightdm")
    }

    pub fn sysvinit_marker(&self) -> PathBuf {
        self.resolve("/etc/init.d/cron")
    }

    pub fn passwd(&self) -> PathBuf {
        self.resolve("/etc/passwd")
    }

    pub fn proc_mounts(&self) -> PathBuf {
        self.resolve("/proc/mounts")
    }
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self::system()
    }
}

/// Everything the install steps need, fixed once selection and probing are done.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub profile: DisplayProfile,
    pub rotation: Rotation,
    pub boot_dir: PathBuf,
    pub init: InitSystem,
    pub paths: SystemPaths,
}

impl RuntimeContext {
    pub fn boot_config(&self) -> PathBuf {
        boot_config_path(&self.boot_dir)
    }
}

pub fn boot_config_path(boot_dir: &Path) -> PathBuf {
    boot_dir.join("config.txt")
}

pub fn boot_config_backup_path(boot_dir: &Path) -> PathBuf {
    boot_dir.join("configtxt.bak")
}
