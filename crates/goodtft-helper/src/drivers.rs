use std::fs;
use std::path::{Path, PathBuf};

use goodtft_catalog::DisplayProfile;
use tracing::debug;

use crate::error::{HelperError, Result};

/// Copy the profile's device-tree overlay into the boot partition.
/// Returns the destination, or `None` if the profile ships no overlay.
pub fn install_overlay(profile: &DisplayProfile, boot_dir: &Path) -> Result<Option<PathBuf>> {
    let (Some(src), Some(dest)) = (
        profile.overlay_source.as_deref(),
        profile.overlay_destination_for(boot_dir),
    ) else {
        debug!(display = %profile.type_id, "no overlay to install");
        return Ok(None);
    };

    println!("Adding display driver...");
    let dest = PathBuf::from(dest);
    let copy_err = |source| HelperError::Copy {
        src: src.to_string(),
        dest: dest.display().to_string(),
        source,
    };
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(copy_err)?;
    }
    fs::copy(src, &dest).map_err(copy_err)?;
    Ok(Some(dest))
}
