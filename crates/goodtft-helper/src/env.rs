use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::context::{InitSystem, SystemPaths, DEFAULT_BOOT_DIR, DEFAULT_HOME_DIR};
use crate::error::{HelperError, Result};
use crate::shell::{self, CommandRunner, Invocation};

/// The user who invoked sudo, if any.
pub fn invoking_user() -> Option<String> {
    std::env::var("SUDO_USER").ok().filter(|u| !u.is_empty())
}

/// Target home directory: the override, the invoking user's home, the
/// current home, or `/home/pi`. Existence is checked later by the installer.
pub fn resolve_home_directory(
    invoking_user: Option<&str>,
    override_dir: Option<&Path>,
    paths: &SystemPaths,
) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    let candidate = match invoking_user {
        Some(user) => passwd_home(&paths.passwd(), user),
        None => dirs::home_dir(),
    };
    match candidate {
        Some(home) if home.is_dir() => home,
        _ => PathBuf::from(DEFAULT_HOME_DIR),
    }
}

/// Home directory field for `user` in a passwd(5) file.
pub fn passwd_home(passwd: &Path, user: &str) -> Option<PathBuf> {
    let contents = fs::read_to_string(passwd).ok()?;
    contents.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(':').collect();
        match fields.as_slice() {
            [name, _, _, _, _, home, ..] if *name == user => Some(PathBuf::from(home)),
            _ => None,
        }
    })
}

/// The override if it is a directory, otherwise `/boot`.
pub fn resolve_boot_directory(override_dir: Option<&Path>) -> PathBuf {
    match override_dir {
        Some(dir) if dir.is_dir() => {
            println!("Boot dir = {}", dir.display());
            dir.to_path_buf()
        }
        Some(dir) => {
            warn!(
                "{} not found or not a directory. Using {} instead.",
                dir.display(),
                DEFAULT_BOOT_DIR
            );
            PathBuf::from(DEFAULT_BOOT_DIR)
        }
        None => PathBuf::from(DEFAULT_BOOT_DIR),
    }
}

/// systemd if `systemctl` exists and lists the root mount unit, sysvinit if
/// the cron init script is a regular file (not a symlink), else an error.
pub fn detect_init_system(
    runner: &mut dyn CommandRunner,
    paths: &SystemPaths,
) -> Result<InitSystem> {
    if shell::succeeds(runner, &Invocation::new("which").arg("systemctl")) {
        match runner.run(&Invocation::new("systemctl")) {
            Ok(outcome) if outcome.success && outcome.stdout.contains("-.mount") => {
                return Ok(InitSystem::Systemd);
            }
            Ok(_) => debug!("systemctl present but no root mount unit"),
            Err(e) => debug!(error = %e, "systemctl failed to run"),
        }
    }

    let marker = paths.sysvinit_marker();
    match fs::symlink_metadata(&marker) {
        Ok(meta) if meta.file_type().is_file() => Ok(InitSystem::Sysvinit),
        Ok(_) => {
            debug!(marker = %marker.display(), "marker is not a regular file");
            Err(HelperError::UnrecognizedInitSystem)
        }
        Err(_) => Err(HelperError::UnrecognizedInitSystem),
    }
}

/// True if any mount point in /proc/mounts mentions "boot".
pub fn boot_is_mounted(paths: &SystemPaths) -> bool {
    let Ok(mounts) = fs::read_to_string(paths.proc_mounts()) else {
        return false;
    };
    mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|mount_point| mount_point.contains("boot"))
}

/// A desktop display manager (lightdm) is installed.
pub fn has_display_manager(paths: &SystemPaths) -> bool {
    paths.lightdm_dir().exists()
}

pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}
