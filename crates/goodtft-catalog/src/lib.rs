use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Mirror utility rotation codes used when a profile does not override them.
pub const DEFAULT_MIRROR_ROTATIONS: [(Rotation, u8); 4] = [
    (Rotation::Deg0, 1),
    (Rotation::Deg90, 0),
    (Rotation::Deg180, 3),
    (Rotation::Deg270, 2),
];

/// Scale applied to the panel geometry when a desktop is mirrored.
pub const DEFAULT_X11_SCALE: u32 = 2;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid display catalog")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate display type id: {0}")]
    DuplicateTypeId(String),
}

/// Panel rotation in degrees. Only the four right angles are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Order used by the rotation menu and by `--rotation 1..4`.
    pub const MENU_ORDER: [Rotation; 4] = [
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
        Rotation::Deg0,
    ];

    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    /// Menu label, e.g. "90 degrees (landscape)".
    pub fn label(self) -> &'static str {
        match self {
            Self::Deg0 => "0 degrees (portrait)",
            Self::Deg90 => "90 degrees (landscape)",
            Self::Deg180 => "180 degrees (portrait)",
            Self::Deg270 => "270 degrees (landscape)",
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

impl TryFrom<String> for Rotation {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .trim()
            .parse::<u16>()
            .ok()
            .and_then(Rotation::from_degrees)
            .ok_or_else(|| format!("invalid rotation {value:?}, expected 0, 90, 180 or 270"))
    }
}

/// Touch controller identity and the per-rotation calibration matrices.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TouchCalibration {
    pub identifier: String,
    pub product_match: String,
    /// `None` marks a rotation the panel is known not to support.
    #[serde(deserialize_with = "deserialize_transforms")]
    pub transforms: BTreeMap<Rotation, Option<String>>,
}

impl TouchCalibration {
    /// Calibration matrix for `rotation`, or `None` if that rotation is
    /// unsupported or undeclared.
    pub fn transform(&self, rotation: Rotation) -> Option<&str> {
        self.transforms.get(&rotation).and_then(|t| t.as_deref())
    }
}

/// One supported add-on board.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DisplayProfile {
    pub type_id: String,
    pub menu_label: String,
    pub product_name: String,
    #[serde(default)]
    pub overlay_source: Option<String>,
    /// Template, `{boot_dir}` is replaced by the resolved boot directory.
    #[serde(default)]
    pub overlay_destination: Option<String>,
    /// Template, `{rotation}` is replaced by the rotation in degrees.
    pub overlay_directive: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_x11_scale")]
    pub x11_scale: u32,
    #[serde(default)]
    pub touch_calibration: Option<TouchCalibration>,
    #[serde(default)]
    pub mirror_rotations: Option<BTreeMap<Rotation, u8>>,
}

impl DisplayProfile {
    /// "label (WxH)" as shown in the display menu.
    pub fn menu_entry(&self) -> String {
        format!("{} ({}x{})", self.menu_label, self.width, self.height)
    }

    pub fn overlay_directive_for(&self, rotation: Rotation) -> String {
        self.overlay_directive
            .replace("{rotation}", &rotation.degrees().to_string())
    }

    pub fn overlay_destination_for(&self, boot_dir: &Path) -> Option<String> {
        self.overlay_destination
            .as_ref()
            .map(|d| d.replace("{boot_dir}", &boot_dir.display().to_string()))
    }

    /// The mirror rotation table, falling back to the global defaults.
    pub fn mirror_rotation_table(&self) -> BTreeMap<Rotation, u8> {
        match &self.mirror_rotations {
            Some(table) => table.clone(),
            None => DEFAULT_MIRROR_ROTATIONS.into_iter().collect(),
        }
    }

    /// True unless the profile has touch calibration and no matrix for `rotation`.
    pub fn supports_rotation(&self, rotation: Rotation) -> bool {
        match &self.touch_calibration {
            Some(touch) => touch.transform(rotation).is_some(),
            None => true,
        }
    }
}

fn default_x11_scale() -> u32 {
    DEFAULT_X11_SCALE
}

fn deserialize_transforms<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<Rotation, Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<Rotation, String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(rotation, matrix)| {
            let matrix = matrix.trim().to_string();
            (rotation, (!matrix.is_empty()).then_some(matrix))
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    display: Vec<DisplayProfile>,
}

/// Ordered list of display profiles. Order is menu order.
#[derive(Debug, Clone)]
pub struct Catalog {
    profiles: Vec<DisplayProfile>,
}

impl Catalog {
    /// Profiles shipped with the helper.
    pub fn builtin() -> Self {
        let transforms = [
            (
                Rotation::Deg0,
                "1.102807 0.000030 -0.066352 0.001374 1.085417 -0.027208 0 0 1",
            ),
            (
                Rotation::Deg90,
                "0.003893 -1.087542 1.025913 1.084281 0.008762 -0.060700 0 0 1",
            ),
            (
                Rotation::Deg180,
                "-1.098388 0.003455 1.052099 0.005512 -1.093095 1.026309 0 0 1",
            ),
            (
                Rotation::Deg270,
                "-0.000087 1.094214 -0.028826 -1.091711 -0.004364 1.057821 0 0 1",
            ),
        ]
        .into_iter()
        .map(|(rotation, matrix)| (rotation, Some(matrix.to_string())))
        .collect();

        Self {
            profiles: vec![DisplayProfile {
                type_id: "3501r".into(),
                menu_label: "3.5\" GoodTFT Display (MPI3501) resistive touch".into(),
                product_name: "3.5\" Resistive".into(),
                overlay_source: Some("./overlays/tft35a-overlay.dtb".into()),
                overlay_destination: Some("{boot_dir}/overlays/tft35a.dtbo".into()),
                overlay_directive: "dtoverlay=tft35a,rotate={rotation},fps=60".into(),
                width: 480,
                height: 320,
                x11_scale: 2,
                touch_calibration: Some(TouchCalibration {
                    identifier: "ADS7846 Touchscreen Calibration".into(),
                    product_match: "ADS7846 Touchscreen".into(),
                    transforms,
                }),
                mirror_rotations: None,
            }],
        }
    }

    pub fn from_profiles(profiles: Vec<DisplayProfile>) -> Result<Self, CatalogError> {
        let catalog = Self { profiles };
        catalog.check_unique()?;
        Ok(catalog)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(contents)?;
        Self::from_profiles(file.display)
    }

    /// Load a catalog from a TOML file of `[[display]]` tables.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|e| CatalogError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Append `other`'s profiles after this catalog's.
    pub fn extend(mut self, other: Catalog) -> Result<Self, CatalogError> {
        self.profiles.extend(other.profiles);
        self.check_unique()?;
        Ok(self)
    }

    fn check_unique(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for profile in &self.profiles {
            if !seen.insert(profile.type_id.as_str()) {
                return Err(CatalogError::DuplicateTypeId(profile.type_id.clone()));
            }
        }
        Ok(())
    }

    pub fn type_ids(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.type_id.as_str()).collect()
    }

    pub fn find(&self, type_id: &str) -> Option<&DisplayProfile> {
        self.profiles.iter().find(|p| p.type_id == type_id)
    }

    /// 1-based lookup, matching the menu numbering.
    pub fn by_index(&self, index: usize) -> Option<&DisplayProfile> {
        index.checked_sub(1).and_then(|i| self.profiles.get(i))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisplayProfile> {
        self.profiles.iter()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
