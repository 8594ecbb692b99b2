//! MIDI output instrument
//!
//! A dedicated thread owns the midir connection and remembers which notes it
//! has switched on, so "stop all" can send a Note Off for each of them before
//! the All Notes Off controller (which some synths ignore). Notes stamped in
//! the future are held back on a [`Timer`] until their onset.
//!
//! Every stop starts a new generation. Note Ons carry the generation they
//! were issued in, and the output thread drops any from before the latest
//! stop, so a deferred note whose timer was already firing when `stop_all`
//! ran cannot sound afterwards.

use super::clock::AudioClock;
use super::instrument::Instrument;
use super::timer::{Timer, TimerHandle};
use anyhow::{Result, anyhow};
use chordseq_core::Note;
use crossbeam_channel::{Receiver, Sender};
use midir::{MidiOutput, MidiOutputConnection};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const CLIENT_NAME: &str = "chordseq";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Controller 123: All Notes Off
const ALL_NOTES_OFF: u8 = 123;

/// Where and how notes are sent
#[derive(Debug, Clone, PartialEq)]
pub struct MidiSettings {
    /// Substring of the output port name; `None` picks the first port
    pub port: Option<String>,
    /// 0-15
    pub channel: u8,
    pub velocity: u8,
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            port: None,
            channel: 0,
            velocity: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MidiMessage {
    NoteOn { note: u8, generation: u64 },
    /// Silence everything and start `generation`
    AllNotesOff { generation: u64 },
    Shutdown,
}

/// Notes currently switched on, and the bytes each message turns into
#[derive(Debug)]
struct OutputState {
    channel: u8,
    velocity: u8,
    sounding: BTreeSet<u8>,
    generation: u64,
}

impl OutputState {
    fn new(channel: u8, velocity: u8) -> Self {
        Self {
            channel: channel & 0x0F,
            velocity: velocity & 0x7F,
            sounding: BTreeSet::new(),
            generation: 0,
        }
    }

    fn encode(&mut self, message: MidiMessage) -> Vec<[u8; 3]> {
        match message {
            MidiMessage::NoteOn { generation, .. } if generation < self.generation => {
                log::trace!("dropped note from generation {}", generation);
                Vec::new()
            }
            MidiMessage::NoteOn { note, .. } => {
                let note = note & 0x7F;
                let mut out = Vec::with_capacity(2);
                // Retrigger cleanly if the note is already on
                if !self.sounding.insert(note) {
                    out.push([0x80 | self.channel, note, 0]);
                }
                out.push([0x90 | self.channel, note, self.velocity]);
                out
            }
            MidiMessage::AllNotesOff { .. } | MidiMessage::Shutdown => {
                if let MidiMessage::AllNotesOff { generation } = message {
                    self.generation = self.generation.max(generation);
                }
                let mut out: Vec<[u8; 3]> = std::mem::take(&mut self.sounding)
                    .into_iter()
                    .map(|note| [0x80 | self.channel, note, 0])
                    .collect();
                out.push([0xB0 | self.channel, ALL_NOTES_OFF, 0]);
                out
            }
        }
    }
}

/// Names of the available MIDI output ports
///
/// Creating a MIDI client occasionally fails on macOS, so this retries a
/// few times before giving up.
pub fn list_ports() -> Result<Vec<String>> {
    let mut last_err = None;
    for attempt in 0..3 {
        if attempt > 0 {
            thread::sleep(Duration::from_millis(100));
        }
        match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_out) => {
                return Ok(midi_out
                    .ports()
                    .iter()
                    .filter_map(|port| midi_out.port_name(port).ok())
                    .collect());
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(anyhow!(
        "MIDI initialization failed after 3 attempts: {:?}",
        last_err
    ))
}

fn open_port(wanted: Option<&str>) -> Result<(MidiOutputConnection, String)> {
    let midi_out = MidiOutput::new(CLIENT_NAME)?;
    let ports = midi_out.ports();

    let port = match wanted {
        Some(wanted) => ports
            .iter()
            .find(|port| {
                midi_out
                    .port_name(port)
                    .map(|name| name.contains(wanted))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("MIDI port '{}' not found", wanted))?,
        None => ports
            .first()
            .ok_or_else(|| anyhow!("No MIDI output ports available"))?,
    };

    let name = midi_out.port_name(port)?;
    let connection = midi_out
        .connect(port, "chordseq-out")
        .map_err(|e| anyhow!("Failed to connect to MIDI port '{}': {}", name, e))?;
    Ok((connection, name))
}

fn run_output(
    settings: MidiSettings,
    messages: Receiver<MidiMessage>,
    ready: Sender<Result<String>>,
) {
    let (mut connection, port_name) = match open_port(settings.port.as_deref()) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(port_name));

    let mut state = OutputState::new(settings.channel, settings.velocity);
    while let Ok(message) = messages.recv() {
        for bytes in state.encode(message) {
            if let Err(e) = connection.send(&bytes) {
                log::warn!("MIDI send failed: {}", e);
            }
        }
        if message == MidiMessage::Shutdown {
            break;
        }
    }
}

/// A Note On waiting on a timer
struct DeferredNote {
    fired: Arc<AtomicBool>,
    handle: TimerHandle,
}

impl DeferredNote {
    fn schedule(
        timer: &dyn Timer,
        delay: Duration,
        message: MidiMessage,
        messages: Sender<MidiMessage>,
    ) -> Result<Self> {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let handle = timer.schedule(
            delay,
            Box::new(move || {
                flag.store(true, Ordering::Release);
                let _ = messages.send(message);
            }),
        )?;
        Ok(Self { fired, handle })
    }

    fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Add `note`, forgetting notes whose timers have already fired
fn track(deferred: &mut Vec<DeferredNote>, note: DeferredNote) {
    deferred.retain(|pending| !pending.has_fired());
    deferred.push(note);
}

/// Sends notes to a MIDI output port
pub struct MidiInstrument {
    messages: Sender<MidiMessage>,
    clock: Arc<dyn AudioClock>,
    timer: Arc<dyn Timer>,
    /// Notes waiting for a future onset
    deferred: Vec<DeferredNote>,
    /// Bumped by every `stop_all`
    generation: u64,
    port_name: String,
    thread: Option<JoinHandle<()>>,
}

impl MidiInstrument {
    /// Open the port and start the output thread. Blocks until the port is open.
    pub fn connect(
        settings: MidiSettings,
        clock: Arc<dyn AudioClock>,
        timer: Arc<dyn Timer>,
    ) -> Result<Self> {
        let (message_tx, message_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let thread = thread::Builder::new()
            .name("chordseq-midi".into())
            .spawn(move || run_output(settings, message_rx, ready_tx))
            .map_err(|e| anyhow!("Failed to spawn MIDI thread: {}", e))?;

        let port_name = ready_rx
            .recv_timeout(CONNECT_TIMEOUT)
            .map_err(|e| anyhow!("MIDI output did not start: {}", e))??;
        log::info!("connected to MIDI port '{}'", port_name);

        Ok(Self {
            messages: message_tx,
            clock,
            timer,
            deferred: Vec::new(),
            generation: 0,
            port_name,
            thread: Some(thread),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&self, message: MidiMessage) -> Result<()> {
        self.messages
            .send(message)
            .map_err(|_| anyhow!("MIDI output thread has exited"))
    }
}

impl Instrument for MidiInstrument {
    fn stop_all(&mut self) -> Result<()> {
        for mut deferred in self.deferred.drain(..) {
            deferred.handle.cancel();
        }
        self.generation += 1;
        self.send(MidiMessage::AllNotesOff {
            generation: self.generation,
        })
    }

    fn start_note(&mut self, note: Note, at: f64) -> Result<()> {
        let message = MidiMessage::NoteOn {
            note: note.midi(),
            generation: self.generation,
        };
        let delay = at - self.clock.now();
        if delay <= 0.0 {
            return self.send(message);
        }

        let delay = Duration::try_from_secs_f64(delay)
            .map_err(|e| anyhow!("Invalid onset {}: {}", at, e))?;
        let deferred =
            DeferredNote::schedule(&*self.timer, delay, message, self.messages.clone())?;
        track(&mut self.deferred, deferred);
        Ok(())
    }

    fn name(&self) -> &str {
        "midi"
    }
}

impl Drop for MidiInstrument {
    fn drop(&mut self) {
        self.deferred.clear();
        let _ = self.messages.send(MidiMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
