//! Per-sample ADSR amplitude envelope
//!
//! Segments approach their target exponentially, which sounds more natural
//! than straight lines and never overshoots. A note-off during any stage
//! releases from the current level, so voices can be cut short without clicks.

use chordseq_core::AdsrParams;

/// ln(1000): a segment is within 0.1% of its target after its nominal time
const CONVERGENCE: f32 = 6.9;

/// Level below which a releasing envelope counts as silent
const SILENCE: f32 = 1.0e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Per-sample smoothing factor for a segment lasting `seconds`
fn coefficient(seconds: f32, sample_rate: f32) -> f32 {
    if seconds <= 0.0 || sample_rate <= 0.0 {
        return 1.0;
    }
    1.0 - (-CONVERGENCE / (seconds * sample_rate)).exp()
}

#[derive(Debug, Clone)]
pub struct Envelope {
    sustain: f32,
    attack_rate: f32,
    decay_rate: f32,
    release_rate: f32,
    stage: Stage,
    level: f32,
}

impl Envelope {
    pub fn new(params: AdsrParams, sample_rate: f32) -> Self {
        Self {
            sustain: params.sustain,
            attack_rate: coefficient(params.attack, sample_rate),
            decay_rate: coefficient(params.decay, sample_rate),
            release_rate: coefficient(params.release, sample_rate),
            stage: Stage::Idle,
            level: 0.0,
        }
    }

    /// Start (or restart) the attack from the current level
    pub fn note_on(&mut self) {
        self.stage = Stage::Attack;
    }

    pub fn note_off(&mut self) {
        if self.stage != Stage::Idle {
            self.stage = Stage::Release;
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// True once the envelope has released to silence (or never started)
    pub fn is_done(&self) -> bool {
        self.stage == Stage::Idle
    }

    /// Advance one sample and return the amplitude in [0, 1]
    pub fn tick(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => self.level = 0.0,
            Stage::Attack => {
                self.level += (1.0 - self.level) * self.attack_rate;
                if self.level >= 0.999 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level += (self.sustain - self.level) * self.decay_rate;
                if (self.level - self.sustain).abs() < 0.001 {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {
                self.level = self.sustain;
                // A zero sustain has nothing left to hold
                if self.sustain <= SILENCE {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
            Stage::Release => {
                self.level -= self.level * self.release_rate;
                if self.level < SILENCE {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn run(env: &mut Envelope, samples: usize) -> f32 {
        let mut last = 0.0;
        for _ in 0..samples {
            last = env.tick();
            assert!((0.0..=1.0).contains(&last), "level {} out of range", last);
        }
        last
    }

    #[test]
    fn test_idle_until_note_on() {
        let mut env = Envelope::new(AdsrParams::default(), SAMPLE_RATE);
        assert_eq!(run(&mut env, 100), 0.0);
        assert!(env.is_done());
    }

    #[test]
    fn test_reaches_sustain() {
        let mut env = Envelope::new(AdsrParams::new(0.001, 0.01, 0.6, 0.1), SAMPLE_RATE);
        env.note_on();
        run(&mut env, 5_000);
        assert_eq!(env.stage(), Stage::Sustain);
        assert!((env.level() - 0.6).abs() < 0.01);
    }

    #[test]
    fn test_release_falls_to_silence() {
        let mut env = Envelope::new(AdsrParams::new(0.001, 0.01, 0.6, 0.02), SAMPLE_RATE);
        env.note_on();
        run(&mut env, 5_000);

        env.note_off();
        assert_eq!(env.stage(), Stage::Release);
        let before = env.level();
        run(&mut env, 100);
        assert!(env.level() < before);

        run(&mut env, 10_000);
        assert!(env.is_done());
    }

    #[test]
    fn test_release_during_attack_keeps_level() {
        let mut env = Envelope::new(AdsrParams::pad(), SAMPLE_RATE);
        env.note_on();
        let level = run(&mut env, 20);
        env.note_off();
        assert_eq!(env.stage(), Stage::Release);
        assert!((env.level() - level).abs() < f32::EPSILON);
    }

    #[test]
    fn test_pluck_dies_out_without_note_off() {
        let mut env = Envelope::new(AdsrParams::pluck(), SAMPLE_RATE);
        env.note_on();
        run(&mut env, SAMPLE_RATE as usize);
        assert!(env.is_done());
    }
}
