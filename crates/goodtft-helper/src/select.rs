//! Display and rotation selection.
//!
//! Parsing of the command-line values is pure; the menus go through a
//! [`Prompter`] so the whole selection can run headless.

use goodtft_catalog::{Catalog, DisplayProfile, Rotation};

use crate::error::{HelperError, Result};
use crate::prompt::Prompter;

pub const UNINSTALL_LABEL: &str = "Uninstall PiTFT";
pub const QUIT_LABEL: &str = "Quit without installing";

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayChoice<'c> {
    Profile(&'c DisplayProfile),
    Uninstall,
    Quit,
}

/// `--display` as a 1-based index or a catalog type id.
pub fn parse_display_arg<'c>(arg: &str, catalog: &'c Catalog) -> Option<&'c DisplayProfile> {
    let arg = arg.trim();
    match arg.parse::<usize>() {
        Ok(index) if (1..=catalog.len()).contains(&index) => catalog.by_index(index),
        _ => catalog.find(arg),
    }
}

/// Display menu: one entry per profile, then uninstall and quit.
pub fn display_menu(catalog: &Catalog) -> Vec<String> {
    catalog
        .iter()
        .map(DisplayProfile::menu_entry)
        .chain([UNINSTALL_LABEL.to_string(), QUIT_LABEL.to_string()])
        .collect()
}

/// Map a 0-based display menu index back to a choice.
pub fn display_choice(index: usize, catalog: &Catalog) -> DisplayChoice<'_> {
    match catalog.by_index(index + 1) {
        Some(profile) => DisplayChoice::Profile(profile),
        None if index == catalog.len() => DisplayChoice::Uninstall,
        None => DisplayChoice::Quit,
    }
}

pub fn resolve_profile<'c>(
    arg: Option<&str>,
    catalog: &'c Catalog,
    prompter: &mut dyn Prompter,
) -> Result<DisplayChoice<'c>> {
    if let Some(profile) = arg.and_then(|a| parse_display_arg(a, catalog)) {
        println!("Display Type: {}", profile.menu_label);
        return Ok(DisplayChoice::Profile(profile));
    }
    if let Some(arg) = arg {
        tracing::warn!("{}", HelperError::UnknownDisplay(arg.to_string()));
    }

    let index = prompter.select("Select configuration:", &display_menu(catalog))?;
    Ok(display_choice(index, catalog))
}

/// `--rotation` as a 1-4 menu index or literal degrees.
pub fn parse_rotation_arg(arg: &str) -> Option<Rotation> {
    let value: u16 = arg.trim().parse().ok()?;
    match value {
        1..=4 => Some(Rotation::MENU_ORDER[usize::from(value) - 1]),
        degrees => Rotation::from_degrees(degrees),
    }
}

pub fn rotation_menu() -> Vec<String> {
    Rotation::MENU_ORDER
        .iter()
        .map(|r| r.label().to_string())
        .collect()
}

pub fn resolve_rotation(arg: Option<&str>, prompter: &mut dyn Prompter) -> Result<Rotation> {
    if let Some(rotation) = arg.and_then(parse_rotation_arg) {
        println!("Rotation: {rotation}");
        return Ok(rotation);
    }

    let index = prompter.select("Select rotation:", &rotation_menu())?;
    Rotation::MENU_ORDER
        .get(index)
        .copied()
        .ok_or_else(|| HelperError::Prompt(format!("rotation menu index {index} out of range")))
}

/// Reject rotations the profile's touch calibration marks as unsupported.
pub fn ensure_supported(profile: &DisplayProfile, rotation: Rotation) -> Result<()> {
    if profile.supports_rotation(rotation) {
        Ok(())
    } else {
        Err(HelperError::UnsupportedRotation {
            rotation: rotation.degrees(),
            display: profile.menu_label.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::scripted::ScriptedPrompter;

    #[test]
    fn test_parse_display_by_index_and_id() {
        let catalog = Catalog::builtin();
        assert_eq!(parse_display_arg("1", &catalog).unwrap().type_id, "3501r");
        assert_eq!(parse_display_arg("3501r", &catalog).unwrap().type_id, "3501r");
        assert!(parse_display_arg("0", &catalog).is_none());
        assert!(parse_display_arg("2", &catalog).is_none());
        assert!(parse_display_arg("28c", &catalog).is_none());
    }

    #[test]
    fn test_display_menu_layout() {
        let catalog = Catalog::builtin();
        let menu = display_menu(&catalog);
        assert_eq!(menu.len(), catalog.len() + 2);
        assert!(menu[0].ends_with("(480x320)"));
        assert_eq!(menu[1], UNINSTALL_LABEL);
        assert_eq!(menu[2], QUIT_LABEL);

        assert!(matches!(display_choice(0, &catalog), DisplayChoice::Profile(_)));
        assert_eq!(display_choice(1, &catalog), DisplayChoice::Uninstall);
        assert_eq!(display_choice(2, &catalog), DisplayChoice::Quit);
    }

    #[test]
    fn test_resolve_profile_falls_back_to_menu() {
        let catalog = Catalog::builtin();
        let mut prompter = ScriptedPrompter::new().then_select(2);
        let choice = resolve_profile(Some("nope"), &catalog, &mut prompter).unwrap();
        assert_eq!(choice, DisplayChoice::Quit);
        assert_eq!(prompter.asked, ["Select configuration:"]);
    }

    #[test]
    fn test_resolve_profile_from_flag_skips_menu() {
        let catalog = Catalog::builtin();
        let mut prompter = ScriptedPrompter::new();
        let choice = resolve_profile(Some("1"), &catalog, &mut prompter).unwrap();
        assert!(matches!(choice, DisplayChoice::Profile(p) if p.type_id == "3501r"));
        assert!(prompter.asked.is_empty());
    }

    #[test]
    fn test_parse_rotation_index_and_degrees() {
        let by_index: Vec<_> = ["1", "2", "3", "4"]
            .iter()
            .map(|a| parse_rotation_arg(a).unwrap().degrees())
            .collect();
        assert_eq!(by_index, [90, 180, 270, 0]);

        for degrees in ["0", "90", "180", "270"] {
            assert_eq!(
                parse_rotation_arg(degrees).unwrap().degrees().to_string(),
                degrees
            );
        }
        assert!(parse_rotation_arg("45").is_none());
        assert!(parse_rotation_arg("5").is_none());
        assert!(parse_rotation_arg("left").is_none());
    }

    #[test]
    fn test_resolve_rotation_menu() {
        let mut prompter = ScriptedPrompter::new().then_select(3);
        let rotation = resolve_rotation(Some("45"), &mut prompter).unwrap();
        assert_eq!(rotation, Rotation::Deg0);
        assert_eq!(prompter.asked, ["Select rotation:"]);
        assert_eq!(rotation_menu()[0], "90 degrees (landscape)");
    }

    #[test]
    fn test_ensure_supported() {
        let mut profile = Catalog::builtin().find("3501r").cloned().unwrap();
        assert!(ensure_supported(&profile, Rotation::Deg270).is_ok());

        if let Some(touch) = profile.touch_calibration.as_mut() {
            touch.transforms.insert(Rotation::Deg270, None);
        }
        let err = ensure_supported(&profile, Rotation::Deg270).unwrap_err();
        assert!(matches!(
            err,
            HelperError::UnsupportedRotation { rotation: 270, .. }
        ));
    }
}
