//! Progress reporting for long-running jobs.
//!
//! Callbacks run on the worker that performs the job. Callers owning
//! observable state should hand values back with [`progress_channel`].

use std::sync::Arc;
use tokio::sync::watch;

/// A progress sink receiving fractions in `[0.0, 1.0]`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// A callback that discards every update.
#[must_use]
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

/// A callback that publishes into a `watch` channel, plus its receiver.
#[must_use]
pub fn progress_channel() -> (ProgressCallback, watch::Receiver<f64>) {
    let (tx, rx) = watch::channel(0.0);
    let callback: ProgressCallback = Arc::new(move |fraction| {
        // Receivers may have gone away; progress is advisory.
        let _ = tx.send(fraction);
    });
    (callback, rx)
}

/// Unit-based progress that only ever moves forward.
pub struct ProgressReporter {
    callback: ProgressCallback,
    total_units: u64,
    done_units: u64,
    last: f64,
    finished: bool,
}

impl ProgressReporter {
    /// Track `total_units` of work.
    #[must_use]
    pub fn new(callback: ProgressCallback, total_units: u64) -> Self {
        Self {
            callback,
            total_units,
            done_units: 0,
            last: 0.0,
            finished: false,
        }
    }

    /// Record `units` more of completed work.
    pub fn advance(&mut self, units: u64) {
        self.done_units = self.done_units.saturating_add(units);
        if self.total_units > 0 {
            #[allow(clippy::cast_precision_loss)]
            let fraction = self.done_units as f64 / self.total_units as f64;
            self.report(fraction);
        }
    }

    /// Emit `fraction` if it moves progress forward. Values are clamped to
    /// `[0.0, 1.0]`; completion is reserved for [`finish`](Self::finish).
    pub fn report(&mut self, fraction: f64) {
        if self.finished || fraction.is_nan() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction > self.last && fraction < 1.0 {
            self.last = fraction;
            (self.callback)(fraction);
        }
    }

    /// Emit the final `1.0`. Safe to call more than once; only the first
    /// call fires.
    pub fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.last = 1.0;
            (self.callback)(1.0);
        }
    }

    /// Last fraction emitted.
    #[must_use]
    pub const fn fraction(&self) -> f64 {
        self.last
    }
}
