use goodtft_catalog::{DisplayProfile, Rotation, TouchCalibration};

use crate::context::SystemPaths;
use crate::edit;
use crate::error::{HelperError, Result};

pub const UDEV_RULE: &str = "SUBSYSTEM==\"input\", ATTRS{name}==\"touchmouse\", \
ENV{DEVNAME}==\"*event*\", SYMLINK+=\"input/touchscreen\"\n";

/// Stable /dev/input/touchscreen symlink for the touch controller.
pub fn write_udev_rule(paths: &SystemPaths) -> Result<()> {
    edit::write_file(&paths.udev_rule(), UDEV_RULE)
}

pub fn xorg_calibration(touch: &TouchCalibration, matrix: &str) -> String {
    format!(
        r#"Section "InputClass"
        Identifier "{identifier}"
        MatchProduct "{product}"
        MatchDevicePath "/dev/input/event*"
        Driver "libinput"
        Option "TransformationMatrix" "{matrix}"
EndSection
"#,
        identifier = touch.identifier,
        product = touch.product_match,
    )
}

/// Write the X11 calibration for `rotation`. Profiles without touch
/// calibration are skipped and return `false`.
pub fn write_xorg_calibration(
    paths: &SystemPaths,
    profile: &DisplayProfile,
    rotation: Rotation,
) -> Result<bool> {
    let Some(touch) = &profile.touch_calibration else {
        return Ok(false);
    };
    let matrix = touch
        .transform(rotation)
        .ok_or_else(|| HelperError::UnsupportedRotation {
            rotation: rotation.degrees(),
            display: profile.menu_label.clone(),
        })?;
    edit::write_file(&paths.xorg_calibration(), &xorg_calibration(touch, matrix))?;
    Ok(true)
}
