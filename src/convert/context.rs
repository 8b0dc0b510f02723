//! Per-run cancellation and progress reporting.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::util::{Error, Result};

/// Cooperative stop flag shared between the caller and a running conversion.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the conversion to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CancellationToken")
            .field(&self.is_cancelled())
            .finish()
    }
}

/// Receives the completed fraction (0..=1) and a status line.
pub type ProgressCallback = Arc<dyn Fn(f64, &str) + Send + Sync>;

/// Progress bands of the pipeline stages.
pub(crate) const WALK_END: f64 = 0.05;
pub(crate) const SAMPLE_END: f64 = 0.90;

/// State threaded through one conversion run.
pub struct RunContext {
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
    last: Cell<f64>,
}

impl RunContext {
    pub fn new(cancel: CancellationToken, progress: Option<ProgressCallback>) -> Self {
        Self {
            cancel,
            progress,
            last: Cell::new(0.0),
        }
    }

    /// Context that never cancels and reports nowhere.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    /// Fail with [`Error::Cancelled`] once cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Report progress. Fractions never move backwards.
    pub fn report(&self, fraction: f64, status: &str) {
        let fraction = fraction.clamp(0.0, 1.0).max(self.last.get());
        self.last.set(fraction);
        if let Some(progress) = &self.progress {
            progress(fraction, status);
        }
    }

    /// Report step `done` of `total` inside the band `[start, end]`.
    pub fn report_step(&self, start: f64, end: f64, done: usize, total: usize, status: &str) {
        let ratio = if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        };
        self.report(start + (end - start) * ratio, status);
    }
}
