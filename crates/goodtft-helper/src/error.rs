use thiserror::Error;

use goodtft_catalog::CatalogError;

#[derive(Debug, Error)]
pub enum HelperError {
    // Environment
    #[error("Unrecognised init system")]
    UnrecognizedInitSystem,

    #[error("{path} must be an existing directory (use -u /home/foo to specify)")]
    MissingHomeDirectory { path: String },

    #[error("Installer must be run as root. Try 'sudo goodtft-helper'")]
    NotRoot,

    // Selection
    #[error("Unknown display type: {0}")]
    UnknownDisplay(String),

    #[error(
        "Unfortunately {rotation} degrees for the {display} is not working at this time. \
         Please restart the script and choose a different orientation."
    )]
    UnsupportedRotation { rotation: u16, display: String },

    // External commands
    #[error("Command `{command}` failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to {stage}: {detail}")]
    Stage { stage: &'static str, detail: String },

    #[error("Apt failed to install {what}!")]
    PackageInstall {
        what: String,
        #[source]
        source: Option<Box<HelperError>>,
    },

    #[error("Unable to copy {src} to {dest}")]
    Copy {
        src: String,
        dest: String,
        source: std::io::Error,
    },

    // Files
    #[error("Failed to read {path}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write {path}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid line pattern")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    // User
    #[error("Aborting.")]
    Declined,

    #[error("Prompt failed: {0}")]
    Prompt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HelperError {
    pub fn read(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Read {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn write(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type Result<T, E = HelperError> = std::result::Result<T, E>;
