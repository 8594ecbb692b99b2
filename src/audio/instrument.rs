//! Instruments and their asynchronous readiness
//!
//! An [`Instrument`] turns note commands into sound. Instruments usually need
//! loading work (opening a device, rendering sample data) before they can be
//! used, so callers hold an [`InstrumentState`] that starts out `Loading` and
//! becomes `Ready` once the loader thread delivers the instrument.

use anyhow::{Result, anyhow};
use chordseq_core::Note;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Something that can sound notes
pub trait Instrument: Send {
    /// Silence every sounding note and drop any notes scheduled for later.
    /// Safe to call when nothing is sounding.
    fn stop_all(&mut self) -> Result<()>;

    /// Begin sounding `note` at clock time `at` (seconds, in the time base of
    /// the clock the instrument was built with). Notes sharing `at` start
    /// together; an `at` in the past means "now".
    fn start_note(&mut self, note: Note, at: f64) -> Result<()>;

    /// Short name for status output
    fn name(&self) -> &str {
        "instrument"
    }
}

impl<I: Instrument + ?Sized> Instrument for Box<I> {
    fn stop_all(&mut self) -> Result<()> {
        (**self).stop_all()
    }

    fn start_note(&mut self, note: Note, at: f64) -> Result<()> {
        (**self).start_note(note, at)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

pub type BoxedInstrument = Box<dyn Instrument>;

/// Readiness of the instrument a sequencer drives
pub enum InstrumentState {
    /// Loader still running; the receiver resolves exactly once
    Loading(Receiver<Result<BoxedInstrument>>),
    Ready(BoxedInstrument),
    /// Loader failed or vanished; the instrument will never be ready
    Unavailable(String),
}

impl InstrumentState {
    /// An instrument that is usable right away
    pub fn ready(instrument: impl Instrument + 'static) -> Self {
        InstrumentState::Ready(Box::new(instrument))
    }

    /// Wait on an existing readiness channel
    pub fn loading(rx: Receiver<Result<BoxedInstrument>>) -> Self {
        InstrumentState::Loading(rx)
    }

    /// Run `load` on a background thread; the state turns `Ready` when it returns
    pub fn spawn<I, F>(name: &str, load: F) -> Self
    where
        I: Instrument + 'static,
        F: FnOnce() -> Result<I> + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let spawned = thread::Builder::new()
            .name(format!("{}-loader", name))
            .spawn(move || {
                let result = load().map(|instrument| Box::new(instrument) as BoxedInstrument);
                // The receiver may already be gone if the sequencer was dropped
                let _ = tx.send(result);
            });

        match spawned {
            Ok(_) => InstrumentState::Loading(rx),
            Err(e) => InstrumentState::Unavailable(format!("Failed to spawn loader: {}", e)),
        }
    }

    /// Promote `Loading` to `Ready`/`Unavailable` if the loader has finished,
    /// then return the instrument if it is ready. Never blocks.
    pub fn poll(&mut self) -> Option<&mut BoxedInstrument> {
        let outcome = match self {
            InstrumentState::Loading(rx) => match rx.try_recv() {
                Ok(result) => Some(result),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(Err(loader_gone())),
            },
            _ => None,
        };
        if let Some(result) = outcome {
            self.resolve(result);
        }

        match self {
            InstrumentState::Ready(instrument) => Some(instrument),
            _ => None,
        }
    }

    /// Block up to `timeout` for the loader. Returns whether the instrument is ready.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let outcome = match self {
            InstrumentState::Loading(rx) => match rx.recv_timeout(timeout) {
                Ok(result) => Some(result),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(Err(loader_gone())),
            },
            _ => None,
        };
        if let Some(result) = outcome {
            self.resolve(result);
        }
        matches!(self, InstrumentState::Ready(_))
    }

    fn resolve(&mut self, result: Result<BoxedInstrument>) {
        *self = match result {
            Ok(instrument) => {
                log::info!("instrument '{}' ready", instrument.name());
                InstrumentState::Ready(instrument)
            }
            Err(e) => {
                log::error!("instrument failed to load: {:#}", e);
                InstrumentState::Unavailable(format!("{:#}", e))
            }
        };
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, InstrumentState::Ready(_))
    }
}

fn loader_gone() -> anyhow::Error {
    anyhow!("Instrument loader exited without a result")
}

impl fmt::Debug for InstrumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentState::Loading(_) => write!(f, "Loading"),
            InstrumentState::Ready(instrument) => write!(f, "Ready({})", instrument.name()),
            InstrumentState::Unavailable(reason) => write!(f, "Unavailable({})", reason),
        }
    }
}

/// A command an instrument received, as recorded by [`TraceInstrument`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstrumentEvent {
    StopAll,
    StartNote { note: Note, at: f64 },
}

/// Shared, append-only record of instrument commands
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<InstrumentEvent>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: InstrumentEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|e| anyhow!("Failed to lock journal: {}", e))?
            .push(event);
        Ok(())
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<InstrumentEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the recorded events
    pub fn take(&self) -> Vec<InstrumentEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

/// Instrument that makes no sound: it logs every command and records it in a
/// [`Journal`]. Backs the headless `trace` backend.
#[derive(Debug, Clone, Default)]
pub struct TraceInstrument {
    journal: Journal,
}

impl TraceInstrument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record into an existing journal
    pub fn with_journal(journal: Journal) -> Self {
        Self { journal }
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl Instrument for TraceInstrument {
    fn stop_all(&mut self) -> Result<()> {
        log::info!("trace: stop all");
        self.journal.record(InstrumentEvent::StopAll)
    }

    fn start_note(&mut self, note: Note, at: f64) -> Result<()> {
        log::info!("trace: start {} ({}) at {:.3}s", note, note.midi(), at);
        self.journal.record(InstrumentEvent::StartNote { note, at })
    }

    fn name(&self) -> &str {
        "trace"
    }
}
