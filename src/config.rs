//! Converter configuration.
//!
//! Stored as JSON at `<config dir>/abc2jsx/config.json`; every field is
//! optional and falls back to its default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::RotationOrder;

/// Everything that shapes a conversion besides the per-run options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub composition: CompositionDefaults,

    /// Order the emitted X/Y/Z rotations are applied in.
    pub rotation_order: RotationOrder,

    /// Multiplier from archive units to composition pixels.
    pub unit_scale: f64,

    /// Unit the archive stores camera apertures in.
    pub aperture_units: ApertureUnits,

    pub tolerances: Tolerances,

    /// Also keep the sample just before each retained change.
    pub keep_hold_ends: bool,

    /// Fold a camera into a parent transform that holds nothing else.
    pub collapse_camera_transforms: bool,

    /// Resolve the nodes of each frame on a worker pool.
    pub parallel: bool,

    /// Worker count for `parallel`; 0 lets rayon decide.
    pub threads: usize,

    pub logging: LoggingConfig,
}

/// Composition created by the script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionDefaults {
    pub width: u32,
    pub height: u32,
    pub pixel_aspect: f64,
    /// Used when the archive records no frame rate.
    pub frame_rate: f64,
}

/// Camera aperture units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApertureUnits {
    #[default]
    Centimeters,
    Millimeters,
}

impl ApertureUnits {
    /// Factor from the stored unit to millimeters.
    pub fn to_mm(self) -> f64 {
        match self {
            Self::Centimeters => 10.0,
            Self::Millimeters => 1.0,
        }
    }
}

/// Keyframe reduction thresholds per channel family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    pub position: f64,
    /// Degrees
    pub rotation: f64,
    /// Percent
    pub scale: f64,
    pub camera: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "abc2jsx=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            composition: CompositionDefaults::default(),
            rotation_order: RotationOrder::Xyz,
            unit_scale: 1.0,
            aperture_units: ApertureUnits::Centimeters,
            tolerances: Tolerances::default(),
            keep_hold_ends: false,
            collapse_camera_transforms: true,
            parallel: false,
            threads: 0,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CompositionDefaults {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            pixel_aspect: 1.0,
            frame_rate: 24.0,
        }
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            position: 1e-4,
            rotation: 1e-4,
            scale: 1e-4,
            camera: 1e-6,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ConverterConfig {
    /// Load from the standard location, falling back to defaults.
    pub fn load() -> Self {
        match config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::default(),
        }
    }

    /// Load from `path`, falling back to defaults when it cannot be read.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, e);
            }
        }
        Self::default()
    }

    /// Save to the standard location.
    pub fn save(&self) -> crate::util::Result<PathBuf> {
        let path = config_file_path()
            .ok_or_else(|| crate::util::Error::invalid("no configuration directory"))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// Standard config file location.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("abc2jsx").join("config.json"))
}
