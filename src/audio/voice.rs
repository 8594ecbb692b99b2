//! Wavetables and the voices that read them

use super::adsr::Envelope;
use chordseq_core::{AdsrParams, Note, Waveform};
use std::sync::Arc;

/// Samples per wavetable cycle
pub const TABLE_SIZE: usize = 2048;

/// One cycle of a waveform, read back with linear interpolation
#[derive(Debug, Clone)]
pub struct Wavetable {
    waveform: Waveform,
    samples: Vec<f32>,
}

impl Wavetable {
    /// Render one cycle of `waveform`
    pub fn render(waveform: Waveform) -> Self {
        let samples = (0..TABLE_SIZE)
            .map(|i| waveform.value_at(i as f32 / TABLE_SIZE as f32))
            .collect();
        Self { waveform, samples }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Value at `phase` in [0, 1)
    pub fn sample(&self, phase: f32) -> f32 {
        let position = phase.rem_euclid(1.0) * TABLE_SIZE as f32;
        let index = position as usize % TABLE_SIZE;
        let next = (index + 1) % TABLE_SIZE;
        let frac = position - position.floor();
        self.samples[index] + (self.samples[next] - self.samples[index]) * frac
    }
}

/// A single sounding (or about to sound) note
#[derive(Debug, Clone)]
pub struct Voice {
    note: Note,
    /// Output frame the note begins on
    onset: u64,
    phase: f32,
    step: f32,
    table: Arc<Wavetable>,
    envelope: Envelope,
    started: bool,
}

impl Voice {
    pub fn new(
        note: Note,
        onset: u64,
        table: Arc<Wavetable>,
        envelope: AdsrParams,
        sample_rate: f32,
    ) -> Self {
        Self {
            note,
            onset,
            phase: 0.0,
            step: note.frequency() / sample_rate,
            table,
            envelope: Envelope::new(envelope, sample_rate),
            started: false,
        }
    }

    pub fn note(&self) -> Note {
        self.note
    }

    /// Still waiting for its onset frame
    pub fn is_pending(&self) -> bool {
        !self.started
    }

    pub fn is_finished(&self) -> bool {
        self.started && self.envelope.is_done()
    }

    pub fn release(&mut self) {
        self.envelope.note_off();
    }

    /// Produce the sample for output frame `frame`
    pub fn render(&mut self, frame: u64) -> f32 {
        if !self.started {
            if frame < self.onset {
                return 0.0;
            }
            self.started = true;
            self.envelope.note_on();
        }

        let value = self.table.sample(self.phase);
        self.phase += self.step;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value * self.envelope.tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 44_100.0;

    #[test]
    fn test_table_matches_waveform() {
        for waveform in Waveform::ALL {
            let table = Wavetable::render(waveform);
            for phase in [0.0, 0.125, 0.3, 0.75] {
                let expected = waveform.value_at(phase);
                assert!(
                    (table.sample(phase) - expected).abs() < 0.01,
                    "{} at {}",
                    waveform,
                    phase
                );
            }
        }
    }

    #[test]
    fn test_voice_silent_before_onset() {
        let table = Arc::new(Wavetable::render(Waveform::Saw));
        let mut voice = Voice::new(Note::MIDDLE_C, 100, table, AdsrParams::organ(), SAMPLE_RATE);

        for frame in 0..100 {
            assert_eq!(voice.render(frame), 0.0);
        }
        assert!(voice.is_pending());

        let sounding = (100..400).map(|frame| voice.render(frame).abs()).sum::<f32>();
        assert!(sounding > 0.0);
        assert!(!voice.is_pending());
    }

    #[test]
    fn test_past_onset_starts_immediately() {
        let table = Arc::new(Wavetable::render(Waveform::Square));
        let mut voice = Voice::new(Note::MIDDLE_C, 0, table, AdsrParams::organ(), SAMPLE_RATE);
        voice.render(500);
        assert!(!voice.is_pending());
    }

    #[test]
    fn test_released_voice_finishes() {
        let table = Arc::new(Wavetable::render(Waveform::Sine));
        let mut voice = Voice::new(Note::MIDDLE_C, 0, table, AdsrParams::organ(), SAMPLE_RATE);
        for frame in 0..1_000 {
            voice.render(frame);
        }
        voice.release();
        for frame in 1_000..10_000 {
            voice.render(frame);
        }
        assert!(voice.is_finished());
    }
}
