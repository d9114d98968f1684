//! Settings file handling.
//!
//! Loads settings from `<config dir>/glyphcast/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{
    encode::{CAPTURE_BITRATE, CAPTURE_FPS},
    error::Error,
    export::ARTIFACT_PREFIX,
    maps::CharMap,
    pipeline::PREVIEW_WIDTH,
    render::Palette,
};

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreviewConfig {
    pub width: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: PREVIEW_WIDTH,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Step size in pixels.
    pub fidelity: u32,
    pub density: String,
    pub ink: [u8; 3],
    pub background: [u8; 3],
    pub font: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fidelity: 10,
            density: CharMap::default().as_str().to_string(),
            ink: [44, 44, 44],
            background: [255, 255, 255],
            font: None,
        }
    }
}

impl RenderConfig {
    pub fn palette(&self) -> Palette {
        Palette::from_rgb(self.ink, self.background)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub fps: u32,
    pub bitrate: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: CAPTURE_FPS,
            bitrate: CAPTURE_BITRATE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub scale: u32,
    pub prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            scale: 2,
            prefix: ARTIFACT_PREFIX.to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, or from the default location.
    /// Returns defaults if the file doesn't exist and an error if it exists
    /// but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let path = path.map(PathBuf::from).or_else(default_path);
        let Some(path) = path.filter(|p| p.exists()) else {
            return Ok(Settings::default());
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("failed to read '{}': {e}", path.display()))
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("failed to parse '{}': {e}", path.display()))
        })?;
        settings.validate()?;
        log::debug!("settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let checks = [
            (self.preview.width == 0, "preview.width must be positive"),
            (self.render.fidelity == 0, "render.fidelity must be positive"),
            (self.capture.fps == 0, "capture.fps must be positive"),
            (self.capture.bitrate == 0, "capture.bitrate must be positive"),
            (self.export.scale == 0, "export.scale must be positive"),
            (self.export.prefix.is_empty(), "export.prefix must not be empty"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(Error::Config(msg.to_string())),
            None => Ok(()),
        }
    }
}

/// `<config dir>/glyphcast/config.toml`, if the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("glyphcast").join("config.toml"))
}
