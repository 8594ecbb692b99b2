//! Application configuration
//!
//! Defaults, overridable with `with_*` builders or `CHORDSEQ_*` environment
//! variables.

use crate::audio::midi::MidiSettings;
use crate::audio::synth::SynthPatch;
use anyhow::{Result, anyhow};
use chordseq_core::{AdsrParams, Interval, Waveform};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_BACKEND: &str = "CHORDSEQ_BACKEND";
pub const ENV_MIDI_PORT: &str = "CHORDSEQ_MIDI_PORT";
pub const ENV_MIDI_CHANNEL: &str = "CHORDSEQ_MIDI_CHANNEL";
pub const ENV_WAVEFORM: &str = "CHORDSEQ_WAVEFORM";
pub const ENV_ENVELOPE: &str = "CHORDSEQ_ENVELOPE";
pub const ENV_INTERVAL: &str = "CHORDSEQ_INTERVAL";
pub const ENV_VOLUME: &str = "CHORDSEQ_VOLUME";

/// Which instrument the sequencer drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Built-in synthesizer on the default audio device
    #[default]
    Synth,
    /// External MIDI output port
    Midi,
    /// No sound; commands are logged and recorded
    Trace,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "synth" | "audio" => Ok(Backend::Synth),
            "midi" => Ok(Backend::Midi),
            "trace" | "none" => Ok(Backend::Trace),
            other => Err(anyhow!(
                "Unknown backend: {} (expected synth, midi or trace)",
                other
            )),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Synth => write!(f, "synth"),
            Backend::Midi => write!(f, "midi"),
            Backend::Trace => write!(f, "trace"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub backend: Backend,
    pub midi: MidiSettings,
    pub patch: SynthPatch,
    /// Used when a sequence does not name its own interval
    pub interval: Interval,
    /// Master volume of the synth, 0.0-1.0
    pub volume: f32,
    /// How long startup waits for the instrument before giving the prompt
    pub ready_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            midi: MidiSettings::default(),
            patch: SynthPatch::default(),
            interval: Interval::DEFAULT,
            volume: 0.5,
            ready_timeout: Duration::from_secs(3),
        }
    }
}

impl AppConfig {
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_midi_port(mut self, port: impl Into<String>) -> Self {
        self.midi.port = Some(port.into());
        self
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.patch.waveform = waveform;
        self
    }

    pub fn with_envelope(mut self, envelope: AdsrParams) -> Self {
        self.patch.envelope = envelope;
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    /// Clamped to 0.0-1.0
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = var(ENV_BACKEND) {
            self.backend = parse_var(ENV_BACKEND, &value)?;
        }
        if let Some(value) = var(ENV_MIDI_PORT) {
            self.midi.port = Some(value.trim().to_string());
        }
        if let Some(value) = var(ENV_MIDI_CHANNEL) {
            let channel: u8 = parse_var(ENV_MIDI_CHANNEL, &value)?;
            if !(1..=16).contains(&channel) {
                return Err(anyhow!(
                    "{} must be between 1 and 16, got {}",
                    ENV_MIDI_CHANNEL,
                    channel
                ));
            }
            self.midi.channel = channel - 1;
        }
        if let Some(value) = var(ENV_WAVEFORM) {
            self.patch.waveform = parse_var(ENV_WAVEFORM, &value)?;
        }
        if let Some(value) = var(ENV_ENVELOPE) {
            self.patch.envelope =
                AdsrParams::preset(&value).map_err(|e| anyhow!("{}: {}", ENV_ENVELOPE, e))?;
        }
        if let Some(value) = var(ENV_INTERVAL) {
            self.interval = parse_var(ENV_INTERVAL, &value)?;
        }
        if let Some(value) = var(ENV_VOLUME) {
            let volume: f32 = parse_var(ENV_VOLUME, &value)?;
            if !(0.0..=1.0).contains(&volume) {
                return Err(anyhow!(
                    "{} must be between 0.0 and 1.0, got {}",
                    ENV_VOLUME,
                    volume
                ));
            }
            self.volume = volume;
        }

        Ok(self)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {}={:?}: {}", key, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::default().apply_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = apply(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.backend, Backend::Synth);
        assert_eq!(config.interval, Interval::DEFAULT);
    }

    #[test]
    fn test_overrides() {
        let config = apply(&[
            (ENV_BACKEND, "midi"),
            (ENV_MIDI_PORT, "IAC"),
            (ENV_MIDI_CHANNEL, "10"),
            (ENV_WAVEFORM, "tri"),
            (ENV_ENVELOPE, "pad"),
            (ENV_INTERVAL, "250ms"),
            (ENV_VOLUME, "0.8"),
        ])
        .unwrap();

        assert_eq!(config.backend, Backend::Midi);
        assert_eq!(config.midi.port.as_deref(), Some("IAC"));
        assert_eq!(config.midi.channel, 9);
        assert_eq!(config.patch.waveform, Waveform::Triangle);
        assert_eq!(config.patch.envelope, AdsrParams::pad());
        assert_eq!(config.interval, Interval::from_millis(250).unwrap());
        assert_eq!(config.volume, 0.8);
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = apply(&[(ENV_BACKEND, "  ")]).unwrap();
        assert_eq!(config.backend, Backend::Synth);
    }

    #[test]
    fn test_errors_name_the_variable() {
        for (key, value) in [
            (ENV_BACKEND, "kazoo"),
            (ENV_INTERVAL, "-1"),
            (ENV_VOLUME, "2"),
            (ENV_MIDI_CHANNEL, "0"),
            (ENV_ENVELOPE, "bagpipe"),
        ] {
            let err = apply(&[(key, value)]).unwrap_err();
            assert!(
                err.to_string().contains(key),
                "error for {} should name it: {}",
                key,
                err
            );
        }
    }

    #[test]
    fn test_builders() {
        let config = AppConfig::default()
            .with_backend(Backend::Trace)
            .with_volume(3.0)
            .with_waveform(Waveform::Square)
            .with_midi_port("Synth");
        assert_eq!(config.backend, Backend::Trace);
        assert_eq!(config.volume, 1.0);
        assert_eq!(config.patch.waveform, Waveform::Square);
        assert_eq!(config.midi.port.as_deref(), Some("Synth"));
    }
}
