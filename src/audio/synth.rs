//! Built-in wavetable synthesizer

use super::engine::{AudioEngine, EngineClock, VoiceCommand};
use super::instrument::Instrument;
use super::voice::{Voice, Wavetable};
use anyhow::Result;
use chordseq_core::{AdsrParams, Note, Waveform};
use std::sync::Arc;

/// Sound of the synth
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SynthPatch {
    pub waveform: Waveform,
    pub envelope: AdsrParams,
}

/// Plays notes through an [`AudioEngine`], onsets on its sample clock
pub struct SynthInstrument {
    engine: Arc<AudioEngine>,
    clock: Arc<EngineClock>,
    table: Arc<Wavetable>,
    envelope: AdsrParams,
}

impl SynthInstrument {
    /// Render the patch's wavetable. Meant to run on a loader thread.
    pub fn load(engine: Arc<AudioEngine>, patch: SynthPatch) -> Result<Self> {
        let table = Arc::new(Wavetable::render(patch.waveform));
        log::debug!(
            "rendered {} wavetable for {} Hz output",
            patch.waveform,
            engine.sample_rate()
        );
        Ok(Self {
            clock: engine.clock(),
            engine,
            table,
            envelope: patch.envelope,
        })
    }
}

impl Instrument for SynthInstrument {
    fn stop_all(&mut self) -> Result<()> {
        self.engine.send(VoiceCommand::ReleaseAll)
    }

    fn start_note(&mut self, note: Note, at: f64) -> Result<()> {
        let voice = Voice::new(
            note,
            self.clock.frame_at(at),
            self.table.clone(),
            self.envelope,
            self.clock.sample_rate() as f32,
        );
        self.engine.send(VoiceCommand::Start(voice))
    }

    fn name(&self) -> &str {
        "synth"
    }
}
