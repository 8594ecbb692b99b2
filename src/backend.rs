//! Wiring a sequencer to the configured instrument

use crate::audio::clock::{AudioClock, SystemClock};
use crate::audio::engine::AudioEngine;
use crate::audio::instrument::{InstrumentState, TraceInstrument};
use crate::audio::midi::MidiInstrument;
use crate::audio::sequencer::ChordSequencer;
use crate::audio::synth::SynthInstrument;
use crate::audio::timer::{ThreadTimer, Timer};
use crate::config::{AppConfig, Backend};
use std::sync::Arc;

/// Build a sequencer for `config.backend`
///
/// Returns immediately; the instrument finishes loading in the background.
/// A synth without an audio device yields a sequencer whose instrument is
/// permanently unavailable rather than an error, so the REPL still starts.
pub fn build_sequencer(config: &AppConfig) -> ChordSequencer {
    let timer: Arc<dyn Timer> = Arc::new(ThreadTimer::new());

    match config.backend {
        Backend::Trace => ChordSequencer::new(
            InstrumentState::ready(TraceInstrument::new()),
            Arc::new(SystemClock::new()),
            timer,
        ),
        Backend::Synth => match AudioEngine::start(config.volume) {
            Ok(engine) => {
                let engine = Arc::new(engine);
                let clock: Arc<dyn AudioClock> = engine.clock();
                let patch = config.patch;
                let instrument =
                    InstrumentState::spawn("synth", move || SynthInstrument::load(engine, patch));
                ChordSequencer::new(instrument, clock, timer)
            }
            Err(e) => {
                log::warn!("audio output unavailable: {:#}", e);
                ChordSequencer::new(
                    InstrumentState::Unavailable(format!("{:#}", e)),
                    Arc::new(SystemClock::new()),
                    timer,
                )
            }
        },
        Backend::Midi => {
            let clock: Arc<dyn AudioClock> = Arc::new(SystemClock::new());
            let settings = config.midi.clone();
            let (midi_clock, midi_timer) = (clock.clone(), timer.clone());
            let instrument = InstrumentState::spawn("midi", move || {
                MidiInstrument::connect(settings, midi_clock, midi_timer)
            });
            ChordSequencer::new(instrument, clock, timer)
        }
    }
}
