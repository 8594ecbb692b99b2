//! Chord sequences and the interval that spaces their onsets
//!
//! Text form: chords separated by `|`, with an optional `@ <interval>` suffix.
//!
//! ```ignore
//! let seq: ChordSequence = "C4 | E4 G4 @ 0.5".parse()?;
//! assert_eq!(seq.len(), 2);
//! assert_eq!(seq.interval().as_secs(), 0.5);
//! ```

use crate::types::chord::Chord;
use anyhow::{Result, anyhow};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Positive, finite delay in seconds between consecutive chord onsets
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "f64", into = "f64")
)]
pub struct Interval(f64);

impl Interval {
    pub const DEFAULT: Interval = Interval(1.0);

    pub fn from_secs(secs: f64) -> Result<Self> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(anyhow!(
                "Interval must be a positive number of seconds, got {}",
                secs
            ));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| anyhow!("Interval {} is not representable: {}", secs, e))?;
        Ok(Interval(secs))
    }

    pub fn from_millis(millis: u64) -> Result<Self> {
        Self::from_secs(millis as f64 / 1000.0)
    }

    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// Wall-clock delay for timers
    pub fn as_duration(self) -> Duration {
        // Validated in from_secs
        Duration::from_secs_f64(self.0)
    }

    /// Onset offset of the chord at `index`, relative to the first chord
    pub fn offset(self, index: usize) -> f64 {
        self.0 * index as f64
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    /// Seconds as a plain number or with a unit: `0.5`, `0.5s`, `250ms`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (number, per_second) = if let Some(ms) = s.strip_suffix("ms") {
            (ms, 1000.0)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1.0)
        } else {
            (s, 1.0)
        };
        let value = number
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("Invalid interval: {}", s))?;
        Self::from_secs(value / per_second)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl From<Interval> for f64 {
    fn from(interval: Interval) -> f64 {
        interval.0
    }
}

impl TryFrom<f64> for Interval {
    type Error = anyhow::Error;

    fn try_from(secs: f64) -> Result<Self> {
        Interval::from_secs(secs)
    }
}

/// Ordered chords plus the interval separating their onsets
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "SequenceRepr", into = "SequenceRepr")
)]
pub struct ChordSequence {
    chords: Vec<Chord>,
    interval: Interval,
}

impl ChordSequence {
    pub fn new(chords: Vec<Chord>, interval: Interval) -> Self {
        Self { chords, interval }
    }

    /// An empty sequence (plays nothing)
    pub fn empty(interval: Interval) -> Self {
        Self::new(Vec::new(), interval)
    }

    /// Set the interval
    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    /// Parse the text form, using `default_interval` when no `@` suffix is given
    pub fn parse_with_interval(s: &str, default_interval: Interval) -> Result<Self> {
        let (body, interval) = match s.rsplit_once('@') {
            Some((body, interval)) => (body, interval.parse::<Interval>()?),
            None => (s, default_interval),
        };

        if body.trim().is_empty() {
            return Ok(Self::empty(interval));
        }

        let chords = body
            .split('|')
            .map(str::parse)
            .collect::<Result<Vec<Chord>>>()?;
        Ok(Self::new(chords, interval))
    }

    pub fn chords(&self) -> &[Chord] {
        &self.chords
    }

    pub fn chord(&self, index: usize) -> Option<&Chord> {
        self.chords.get(index)
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    /// Time from the first onset until the last chord's interval has elapsed
    pub fn total_duration(&self) -> f64 {
        self.interval.offset(self.chords.len())
    }

    /// Chords paired with their absolute onset times, starting at `start`
    pub fn timeline(&self, start: f64) -> impl Iterator<Item = (f64, &Chord)> + '_ {
        let interval = self.interval;
        self.chords
            .iter()
            .enumerate()
            .map(move |(i, chord)| (start + interval.offset(i), chord))
    }

    /// Parse the JSON form `[[[60], [64, 67]], 0.5]`; notes may be numbers or names
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow!("Invalid chord sequence JSON: {}", e))
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| anyhow!("Failed to encode chord sequence: {}", e))
    }
}

impl FromStr for ChordSequence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with_interval(s, Interval::DEFAULT)
    }
}

impl fmt::Display for ChordSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chord) in self.chords.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            let names: Vec<String> = chord.iter().map(|n| n.to_string()).collect();
            write!(f, "{}", names.join(" "))?;
        }
        write!(f, " @ {}", self.interval)
    }
}

/// `[chords, interval]`, the shape the web front end passes around
#[cfg(feature = "serde")]
#[derive(Clone, serde::Serialize, serde::Deserialize)]
struct SequenceRepr(Vec<Chord>, Interval);

#[cfg(feature = "serde")]
impl From<SequenceRepr> for ChordSequence {
    fn from(repr: SequenceRepr) -> Self {
        ChordSequence::new(repr.0, repr.1)
    }
}

#[cfg(feature = "serde")]
impl From<ChordSequence> for SequenceRepr {
    fn from(seq: ChordSequence) -> Self {
        SequenceRepr(seq.chords, seq.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_validation() {
        assert!(Interval::from_secs(0.5).is_ok());
        assert!(Interval::from_secs(0.0).is_err());
        assert!(Interval::from_secs(-1.0).is_err());
        assert!(Interval::from_secs(f64::NAN).is_err());
        assert!(Interval::from_secs(f64::INFINITY).is_err());
        assert!(Interval::from_secs(1e30).is_err());
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!("0.5".parse::<Interval>().unwrap().as_secs(), 0.5);
        assert_eq!("2s".parse::<Interval>().unwrap().as_secs(), 2.0);
        assert_eq!("250ms".parse::<Interval>().unwrap().as_secs(), 0.25);
        assert!("fast".parse::<Interval>().is_err());
        assert!("0ms".parse::<Interval>().is_err());
    }

    #[test]
    fn test_interval_duration_and_offset() {
        let interval = Interval::from_millis(500).unwrap();
        assert_eq!(interval.as_duration(), Duration::from_millis(500));
        assert_eq!(interval.offset(0), 0.0);
        assert_eq!(interval.offset(3), 1.5);
    }

    #[test]
    fn test_sequence_parsing() {
        let seq: ChordSequence = "60 | 64 67 @ 0.5".parse().unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.interval().as_secs(), 0.5);
        assert_eq!(seq.chord(0).unwrap(), &Chord::from_midi(&[60]).unwrap());
        assert_eq!(seq.chord(1).unwrap(), &Chord::from_midi(&[64, 67]).unwrap());
        assert!(seq.chord(2).is_none());
    }

    #[test]
    fn test_sequence_default_interval() {
        let seq: ChordSequence = "C4 E4 G4 | F4 A4 C5".parse().unwrap();
        assert_eq!(seq.interval(), Interval::DEFAULT);

        let fallback = Interval::from_secs(0.25).unwrap();
        let seq = ChordSequence::parse_with_interval("C4 | D4", fallback).unwrap();
        assert_eq!(seq.interval(), fallback);
    }

    #[test]
    fn test_empty_sequence() {
        let seq: ChordSequence = "".parse().unwrap();
        assert!(seq.is_empty());
        let seq: ChordSequence = "  @ 2".parse().unwrap();
        assert!(seq.is_empty());
        assert_eq!(seq.interval().as_secs(), 2.0);
        assert_eq!(seq.total_duration(), 0.0);
    }

    #[test]
    fn test_rest_chords() {
        let seq: ChordSequence = "60 | | 62".parse().unwrap();
        assert_eq!(seq.len(), 3);
        assert!(seq.chord(1).unwrap().is_empty());
    }

    #[test]
    fn test_sequence_errors() {
        assert!("60 | Q @ 0.5".parse::<ChordSequence>().is_err());
        assert!("60 | 62 @ -1".parse::<ChordSequence>().is_err());
        assert!("60 | 62 @".parse::<ChordSequence>().is_err());
    }

    #[test]
    fn test_timeline() {
        let seq: ChordSequence = "60 | 62 | 64 @ 0.5".parse().unwrap();
        let onsets: Vec<f64> = seq.timeline(10.0).map(|(t, _)| t).collect();
        assert_eq!(onsets, vec![10.0, 10.5, 11.0]);
        assert_eq!(seq.total_duration(), 1.5);
    }

    #[test]
    fn test_display_round_trip() {
        let seq: ChordSequence = "C4 | E4 G4 @ 0.5".parse().unwrap();
        assert_eq!(seq.to_string(), "C4 | E4 G4 @ 0.5s");
        assert_eq!(seq.to_string().parse::<ChordSequence>().unwrap(), seq);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_form() {
        let seq = ChordSequence::from_json(r#"[[[60], [64, "G4"]], 0.5]"#).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.chord(1).unwrap(), &Chord::from_midi(&[64, 67]).unwrap());
        assert_eq!(seq.to_json().unwrap(), "[[[60],[64,67]],0.5]");

        assert!(ChordSequence::from_json("[[[60]], 0]").is_err());
        assert!(ChordSequence::from_json("[[[128]], 1]").is_err());
    }
}
