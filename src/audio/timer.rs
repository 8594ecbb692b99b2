//! Fire-once cancellable timers
//!
//! A [`Timer`] runs a task once after a delay and hands back a
//! [`TimerHandle`]. Cancelling the handle (or dropping it) guarantees the
//! task has not started yet and never will, unless it was already running.
//!
//! [`ThreadTimer`] waits on a background thread for real time to pass.
//! [`ManualTimer`] only fires when stepped, for offline rendering and tests.

use crate::audio::clock::ManualClock;
use anyhow::{Result, anyhow};
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Work to run when a timer fires
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Schedules fire-once delayed tasks
pub trait Timer: Send + Sync {
    /// Run `task` once `delay` has elapsed (a lower bound, never early)
    fn schedule(&self, delay: Duration, task: Task) -> Result<TimerHandle>;
}

/// Owner of a pending task. Dropping it cancels the task.
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    /// Dropping the sender wakes a sleeping timer thread early
    wake: Option<Sender<()>>,
}

impl TimerHandle {
    fn new(cancelled: Arc<AtomicBool>, wake: Option<Sender<()>>) -> Self {
        Self { cancelled, wake }
    }

    /// Cancel the task if it has not fired yet
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.wake.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// One thread per pending task, sleeping on a channel so cancellation
/// wakes it immediately instead of polling
#[derive(Debug, Clone)]
pub struct ThreadTimer {
    thread_name: String,
}

impl ThreadTimer {
    pub fn new() -> Self {
        Self::named("chordseq-timer")
    }

    pub fn named(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for ThreadTimer {
    fn schedule(&self, delay: Duration, task: Task) -> Result<TimerHandle> {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded::<()>(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || match wake_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) if !flag.load(Ordering::Acquire) => task(),
                _ => log::trace!("timer cancelled before firing"),
            })
            .map_err(|e| anyhow!("Failed to spawn timer thread: {}", e))?;

        Ok(TimerHandle::new(cancelled, Some(wake_tx)))
    }
}

/// Upper bound on tasks fired by one `run_until_idle` call
const MAX_IDLE_STEPS: usize = 100_000;

/// Timer driven by explicit calls to [`ManualTimer::advance`]
///
/// Time is shared with a [`ManualClock`], so instruments stamped with
/// `clock.now()` see exactly the time each task fired at.
#[derive(Clone, Default)]
pub struct ManualTimer {
    clock: ManualClock,
    state: Arc<Mutex<ManualTimerState>>,
}

#[derive(Default)]
struct ManualTimerState {
    pending: Vec<PendingTask>,
    next_seq: u64,
}

struct PendingTask {
    due: Duration,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    task: Task,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share time with an existing clock
    pub fn with_clock(clock: ManualClock) -> Self {
        Self {
            clock,
            state: Arc::default(),
        }
    }

    /// The clock this timer advances
    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    /// Number of tasks still waiting to fire
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .map(|state| {
                state
                    .pending
                    .iter()
                    .filter(|p| !p.cancelled.load(Ordering::Acquire))
                    .count()
            })
            .unwrap_or_default()
    }

    /// Move time forward by `by`, firing due tasks in order. Tasks scheduled
    /// by fired tasks also fire if they fall due within the window.
    /// Returns the number of tasks fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.clock.elapsed() + by;
        let mut fired = 0;
        while let Some(next) = self.take_next(Some(target)) {
            self.clock.set(next.due);
            (next.task)();
            fired += 1;
        }
        self.clock.set(target);
        fired
    }

    /// Fire every pending task, jumping time to each due point
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        while fired < MAX_IDLE_STEPS {
            let Some(next) = self.take_next(None) else {
                break;
            };
            self.clock.set(next.due);
            (next.task)();
            fired += 1;
        }
        fired
    }

    /// Remove and return the earliest live task due at or before `limit`
    fn take_next(&self, limit: Option<Duration>) -> Option<PendingTask> {
        let mut state = self.state.lock().ok()?;
        state
            .pending
            .retain(|p| !p.cancelled.load(Ordering::Acquire));

        let index = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| limit.map_or(true, |limit| p.due <= limit))
            .min_by_key(|(_, p)| (p.due, p.seq))
            .map(|(i, _)| i)?;
        Some(state.pending.swap_remove(index))
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, task: Task) -> Result<TimerHandle> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| anyhow!("Failed to lock manual timer: {}", e))?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(PendingTask {
            due: self.clock.elapsed() + delay,
            seq,
            cancelled: cancelled.clone(),
            task,
        });

        Ok(TimerHandle::new(cancelled, None))
    }
}
