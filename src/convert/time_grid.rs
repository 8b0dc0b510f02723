//! Frames sampled during a conversion.

use serde::Serialize;

use crate::archive::ArchiveTimeRange;
use crate::util::{Error, Result};

/// Whole frames `start_frame..=end_frame` at `frame_rate` frames per second.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TimeGrid {
    pub start_frame: i64,
    pub end_frame: i64,
    pub frame_rate: f64,
}

impl TimeGrid {
    pub fn new(start_frame: i64, end_frame: i64, frame_rate: f64) -> Result<Self> {
        validate_rate(frame_rate)?;
        if end_frame < start_frame {
            return Err(Error::InvalidOptions(format!(
                "end frame {} before start frame {}",
                end_frame, start_frame
            )));
        }
        Ok(Self {
            start_frame,
            end_frame,
            frame_rate,
        })
    }

    /// Grid for an archive's time range with caller overrides applied.
    ///
    /// `frame_rate` replaces the archive rate and re-derives the frame
    /// numbers; `duration` fixes the frame count from the start frame.
    /// Archives without animation yield a single frame at 0.
    pub fn resolve(
        range: Option<ArchiveTimeRange>,
        default_rate: f64,
        frame_rate: Option<f64>,
        duration: Option<u32>,
    ) -> Result<Self> {
        validate_overrides(frame_rate, duration)?;

        let rate = frame_rate
            .or(range.and_then(|r| r.frame_rate))
            .unwrap_or(default_rate);
        validate_rate(rate)?;

        let (start, end) = match range {
            Some(r) => {
                let start = (r.start_seconds * rate).round() as i64;
                let end = (r.end_seconds * rate).round() as i64;
                (start, end.max(start))
            }
            None => (0, 0),
        };
        let end = match duration {
            Some(n) => start + i64::from(n) - 1,
            None => end,
        };
        Self::new(start, end, rate)
    }

    /// Number of frames, both ends included.
    pub fn frame_count(&self) -> usize {
        (self.end_frame - self.start_frame + 1) as usize
    }

    pub fn frames(&self) -> impl Iterator<Item = i64> {
        self.start_frame..=self.end_frame
    }

    /// Archive time of `frame`.
    #[inline]
    pub fn seconds(&self, frame: i64) -> f64 {
        frame as f64 / self.frame_rate
    }
}

/// Reject caller overrides that cannot describe a grid.
pub fn validate_overrides(frame_rate: Option<f64>, duration: Option<u32>) -> Result<()> {
    if let Some(rate) = frame_rate {
        validate_rate(rate)?;
    }
    if duration == Some(0) {
        return Err(Error::InvalidOptions("duration must be at least one frame".into()));
    }
    Ok(())
}

fn validate_rate(rate: f64) -> Result<()> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidOptions(format!("invalid frame rate {}", rate)))
    }
}
