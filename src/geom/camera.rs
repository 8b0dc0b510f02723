//! Camera samples.

use crate::util::{Error, Result};

/// Camera schema identifier.
pub const CAMERA_SCHEMA: &str = "AbcGeom_Camera_v1";

/// Number of doubles in a `.core` sample.
pub const CORE_VALUES: usize = 16;

/// Camera lens and film-back at one time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraSample {
    /// Focal length in millimeters.
    pub focal_length: f64,
    /// Horizontal aperture (film width) in centimeters.
    pub horizontal_aperture: f64,
    /// Vertical aperture (film height) in centimeters.
    pub vertical_aperture: f64,
    pub horizontal_film_offset: f64,
    pub vertical_film_offset: f64,
    pub lens_squeeze_ratio: f64,
    pub f_stop: f64,
    pub focus_distance: f64,
    pub near_clipping_plane: f64,
    pub far_clipping_plane: f64,
}

impl Default for CameraSample {
    fn default() -> Self {
        Self {
            focal_length: 35.0,
            horizontal_aperture: 3.6,
            vertical_aperture: 2.4,
            horizontal_film_offset: 0.0,
            vertical_film_offset: 0.0,
            lens_squeeze_ratio: 1.0,
            f_stop: 5.6,
            focus_distance: 5.0,
            near_clipping_plane: 0.1,
            far_clipping_plane: 100000.0,
        }
    }
}

impl CameraSample {
    /// Default 35mm film-back with the given focal length.
    pub fn with_focal_length(focal_length: f64) -> Self {
        Self {
            focal_length,
            ..Self::default()
        }
    }

    /// Decode a `.core` sample.
    ///
    /// Layout: focal length, horizontal aperture, horizontal film offset,
    /// vertical aperture, vertical film offset, lens squeeze, four
    /// overscans, f-stop, focus distance, shutter open/close, near, far.
    pub fn from_core(v: &[f64]) -> Result<Self> {
        if v.len() < CORE_VALUES {
            return Err(Error::invalid(format!(
                "camera core has {} values, expected {}",
                v.len(),
                CORE_VALUES
            )));
        }
        Ok(Self {
            focal_length: v[0],
            horizontal_aperture: v[1],
            horizontal_film_offset: v[2],
            vertical_aperture: v[3],
            vertical_film_offset: v[4],
            lens_squeeze_ratio: v[5],
            f_stop: v[10],
            focus_distance: v[11],
            near_clipping_plane: v[14],
            far_clipping_plane: v[15],
        })
    }

    /// Horizontal field of view in radians.
    pub fn horizontal_fov(&self) -> f64 {
        2.0 * (self.horizontal_aperture / (2.0 * self.focal_length / 10.0)).atan()
    }

    /// True when the lens values can be emitted.
    pub fn is_finite(&self) -> bool {
        self.focal_length.is_finite()
            && self.horizontal_aperture.is_finite()
            && self.vertical_aperture.is_finite()
    }
}
