//! Audio clocks
//!
//! An [`AudioClock`] is the time base note onsets are expressed in: a
//! monotonically increasing number of seconds with an opaque origin, plus a
//! `resume` call that activates it. Some clocks (an audio output stream) stay
//! frozen until resumed; resuming an active clock is a no-op.

use anyhow::{Result, anyhow};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time source shared by the sequencer and the instrument it drives
pub trait AudioClock: Send + Sync {
    /// Current time in seconds. Monotonic; the origin is implementation defined.
    fn now(&self) -> f64;

    /// Activate the clock. Idempotent.
    fn resume(&self) -> Result<()>;

    /// Whether `resume` has been called (or the clock never needed it)
    fn is_running(&self) -> bool {
        true
    }
}

/// Wall-clock time since construction
///
/// Used by instruments without their own sample clock (MIDI, trace).
pub struct SystemClock {
    origin: Instant,
    resumed: AtomicBool,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            resumed: AtomicBool::new(false),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn resume(&self) -> Result<()> {
        if !self.resumed.swap(true, Ordering::Relaxed) {
            log::debug!("system clock resumed");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.resumed.load(Ordering::Relaxed)
    }
}

/// Clock that only moves when told to
///
/// Cloning yields another view of the same time, so a test can hand one
/// clone to the sequencer and advance the other.
#[derive(Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualClockState>>,
}

#[derive(Default)]
struct ManualClockState {
    elapsed: Duration,
    resume_count: usize,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.elapsed += by;
        }
    }

    /// Jump to an absolute time (never backwards)
    pub fn set(&self, elapsed: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.elapsed = state.elapsed.max(elapsed);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.state
            .lock()
            .map(|state| state.elapsed)
            .unwrap_or_default()
    }

    /// How many times `resume` was called
    pub fn resume_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.resume_count)
            .unwrap_or_default()
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    fn resume(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| anyhow!("Failed to lock manual clock: {}", e))?;
        state.resume_count += 1;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.resume_count() > 0
    }
}
