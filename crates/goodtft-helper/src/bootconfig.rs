use std::path::Path;

use chrono::Local;
use goodtft_catalog::{DisplayProfile, Rotation};

use crate::context::{boot_config_backup_path, boot_config_path};
use crate::edit::{self, ConfigFile, Edit};
use crate::error::Result;

pub const BLOCK_BEGIN: &str = "# --- added by goodtft-helper";
pub const BLOCK_END: &str = "# --- end goodtft-helper";

/// The delimited section carrying the display overlay directive.
pub fn overlay_block(profile: &DisplayProfile, rotation: Rotation, date: &str) -> Vec<String> {
    vec![
        format!("{BLOCK_BEGIN} {date} ---"),
        "[all]".to_string(),
        profile.overlay_directive_for(rotation),
        format!("{BLOCK_END} {date} ---"),
    ]
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Replace any previous overlay block in `<boot_dir>/config.txt` with a
/// fresh one. The file is backed up first.
pub fn rewrite_overlay_block(
    profile: &DisplayProfile,
    rotation: Rotation,
    boot_dir: &Path,
) -> Result<()> {
    let path = boot_config_path(boot_dir);
    let mut config = ConfigFile::load(&path)?;
    edit::backup(&path, &boot_config_backup_path(boot_dir))?;

    config.apply_all(&[
        Edit::delete_block(BLOCK_BEGIN, BLOCK_END),
        Edit::append_block(overlay_block(profile, rotation, &today())),
    ])?;
    config.save()
}

/// Remove the overlay block. Returns false if there was none.
pub fn remove_overlay_block(boot_dir: &Path) -> Result<bool> {
    let path = boot_config_path(boot_dir);
    let mut config = ConfigFile::load(&path)?;
    if !config.contains(&format!("^{}", regex::escape(BLOCK_BEGIN)))? {
        return Ok(false);
    }

    println!("Removing old section from {}...", path.display());
    edit::backup(&path, &boot_config_backup_path(boot_dir))?;
    config.apply(&Edit::delete_block(BLOCK_BEGIN, BLOCK_END))?;
    config.save()?;
    Ok(true)
}
