//! Canvas client configuration.

use crate::brushes::BrushKind;
use crate::cache::DEFAULT_CACHE_CAPACITY;
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self::new(rgba.r, rgba.g, rgba.b, rgba.a)
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Settings for one canvas session.
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Canvas id on the remote authority.
    pub canvas_id: i64,
    /// Base URL of the remote authority.
    pub server_url: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Seconds between sync rounds.
    pub sync_interval_secs: u64,
    /// Chance per sync round that a synced tile re-puts its composite.
    pub cache_refresh_probability: f64,
    pub cache_capacity_bytes: u64,
    /// Cache directory. `None` uses the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub brush: BrushKind,
    pub color: SerializableColor,
    /// Seed for the cache refresh draw.
    pub seed: u64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            canvas_id: 1,
            server_url: "http://localhost:8085".to_string(),
            viewport_width: 1024,
            viewport_height: 768,
            sync_interval_secs: 5,
            cache_refresh_probability: 0.1,
            cache_capacity_bytes: DEFAULT_CACHE_CAPACITY,
            cache_dir: None,
            request_timeout_secs: 10,
            brush: BrushKind::default(),
            color: SerializableColor::black(),
            seed: 0x5EED,
        }
    }
}

impl CanvasConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn color(&self) -> Color {
        self.color.into()
    }
}
