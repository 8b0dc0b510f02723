//! Time sampling types.
//!
//! Archive properties are sampled over time. A [`TimeSampling`] describes
//! when each stored sample was recorded so that a time in seconds can be
//! mapped back to a sample index.

use crate::util::Chrono;

/// Time sampling information for a property.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum TimeSampling {
    /// Single static sample at time 0.
    #[default]
    Identity,

    /// Samples at regular intervals: `start_time + index * time_per_cycle`.
    Uniform {
        time_per_cycle: Chrono,
        start_time: Chrono,
    },

    /// Repeating pattern of sample times, shifted by `time_per_cycle` each cycle.
    Cyclic {
        time_per_cycle: Chrono,
        times: Vec<Chrono>,
    },

    /// Explicit time for each sample.
    Acyclic { times: Vec<Chrono> },
}

impl TimeSampling {
    /// Create uniform time sampling.
    pub fn uniform(time_per_cycle: Chrono, start_time: Chrono) -> Self {
        Self::Uniform {
            time_per_cycle,
            start_time,
        }
    }

    /// Create acyclic time sampling from explicit times.
    pub fn acyclic(times: Vec<Chrono>) -> Self {
        Self::Acyclic { times }
    }

    /// Create cyclic time sampling.
    pub fn cyclic(time_per_cycle: Chrono, times: Vec<Chrono>) -> Self {
        Self::Cyclic {
            time_per_cycle,
            times,
        }
    }

    /// Samples per second, when the sampling is regular.
    pub fn frame_rate(&self) -> Option<f64> {
        match self {
            Self::Uniform { time_per_cycle, .. } if *time_per_cycle > 0.0 => {
                Some(1.0 / time_per_cycle)
            }
            _ => None,
        }
    }

    /// Time of a specific sample index.
    pub fn sample_time(&self, index: usize) -> Chrono {
        match self {
            Self::Identity => 0.0,
            Self::Uniform {
                time_per_cycle,
                start_time,
            } => start_time + index as Chrono * time_per_cycle,
            Self::Cyclic {
                time_per_cycle,
                times,
            } => {
                if times.is_empty() {
                    return 0.0;
                }
                let cycle = index / times.len();
                times[index % times.len()] + cycle as Chrono * time_per_cycle
            }
            Self::Acyclic { times } => times
                .get(index)
                .or(times.last())
                .copied()
                .unwrap_or(0.0),
        }
    }

    /// First and last sample time for a property with `num_samples` samples.
    pub fn time_range(&self, num_samples: usize) -> (Chrono, Chrono) {
        if num_samples == 0 {
            return (0.0, 0.0);
        }
        (self.sample_time(0), self.sample_time(num_samples - 1))
    }

    /// Largest index whose time is <= `time` (clamped to the stored range).
    pub fn floor_index(&self, time: Chrono, num_samples: usize) -> usize {
        if num_samples <= 1 {
            return 0;
        }
        let last = num_samples - 1;
        match self {
            Self::Identity => 0,
            Self::Uniform {
                time_per_cycle,
                start_time,
            } => {
                if time <= *start_time || *time_per_cycle <= 0.0 {
                    return 0;
                }
                // Tolerate float noise just below an exact sample time.
                let steps = (time - start_time) / time_per_cycle + 1e-9;
                (steps.floor() as usize).min(last)
            }
            Self::Cyclic { .. } | Self::Acyclic { .. } => {
                let (mut lo, mut hi) = (0, num_samples);
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    if self.sample_time(mid) <= time {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                lo.saturating_sub(1)
            }
        }
    }

    /// Index whose time is nearest to `time`, ties resolving to the earlier sample.
    pub fn near_index(&self, time: Chrono, num_samples: usize) -> usize {
        if num_samples <= 1 {
            return 0;
        }
        let floor = self.floor_index(time, num_samples);
        if floor + 1 >= num_samples {
            return floor;
        }
        let before = (time - self.sample_time(floor)).abs();
        let after = (self.sample_time(floor + 1) - time).abs();
        if before <= after {
            floor
        } else {
            floor + 1
        }
    }
}
