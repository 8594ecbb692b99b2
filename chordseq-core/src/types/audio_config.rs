//! Synth patch settings as plain data
//!
//! Nothing in here generates samples, so it compiles for WebAssembly too.

use anyhow::{Result, anyhow};
use std::fmt;
use std::str::FromStr;

/// Oscillator shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Saw,
    Square,
    Triangle,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Saw,
        Waveform::Square,
        Waveform::Triangle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Saw => "saw",
            Waveform::Square => "square",
            Waveform::Triangle => "triangle",
        }
    }

    /// Value of one cycle at `phase` in [0, 1), range [-1, 1]
    pub fn value_at(&self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (2.0 * std::f32::consts::PI * phase).sin(),
            Waveform::Saw => 2.0 * phase - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
        }
    }
}

impl FromStr for Waveform {
    type Err = anyhow::Error;

    /// Case-insensitive, with short aliases (`sin`, `sawtooth`, `sq`, `tri`)
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sine" | "sin" => Ok(Waveform::Sine),
            "saw" | "sawtooth" => Ok(Waveform::Saw),
            "square" | "sq" => Ok(Waveform::Square),
            "triangle" | "tri" => Ok(Waveform::Triangle),
            other => Err(anyhow!("Unknown waveform: {}", other)),
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Amplitude envelope
///
/// - `attack`, `decay`, `release`: seconds
/// - `sustain`: level (0.0-1.0), not a time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrParams {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl AdsrParams {
    /// Clamps to a 1ms minimum attack and release so notes never click
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.max(0.001),
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.001),
        }
    }

    /// Piano-like: quick attack, decays to a soft sustain
    pub fn piano() -> Self {
        Self::new(0.005, 0.6, 0.35, 0.25)
    }

    pub fn pluck() -> Self {
        Self::new(0.001, 0.15, 0.0, 0.1)
    }

    pub fn pad() -> Self {
        Self::new(0.3, 0.2, 0.8, 0.5)
    }

    pub fn organ() -> Self {
        Self::new(0.005, 0.0, 1.0, 0.01)
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "piano" => Ok(Self::piano()),
            "pluck" => Ok(Self::pluck()),
            "pad" => Ok(Self::pad()),
            "organ" => Ok(Self::organ()),
            other => Err(anyhow!(
                "Unknown envelope preset: {} (expected piano, pluck, pad or organ)",
                other
            )),
        }
    }
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self::piano()
    }
}
