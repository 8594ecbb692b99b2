use anyhow::{Result, anyhow};
use std::fmt;
use std::str::FromStr;

/// A note as a MIDI note number (0-127, 60 = middle C = C4)
///
/// The sequencer never looks inside a note; only instruments interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "NoteRepr", into = "u8")
)]
pub struct Note(u8);

/// Sharp spellings used for display
const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

impl Note {
    pub const MIDDLE_C: Note = Note(60);

    /// Highest valid MIDI note number
    pub const MAX_MIDI: u8 = 127;

    /// Create a note from a MIDI note number
    pub fn from_midi(number: u8) -> Result<Self> {
        if number > Self::MAX_MIDI {
            return Err(anyhow!("MIDI note must be 0-127, got {}", number));
        }
        Ok(Note(number))
    }

    /// Create a note from a pitch class (0-11, 0 = C) and an octave in
    /// scientific pitch notation (4 = middle C octave)
    pub fn from_pitch(pitch_class: u8, octave: i8) -> Result<Self> {
        if pitch_class > 11 {
            return Err(anyhow!("Pitch class must be 0-11, got {}", pitch_class));
        }
        Self::from_semitone((octave as i16 + 1) * 12 + pitch_class as i16)
    }

    fn from_semitone(value: i16) -> Result<Self> {
        if !(0..=Self::MAX_MIDI as i16).contains(&value) {
            return Err(anyhow!("Note is outside the MIDI range (0-127): {}", value));
        }
        Ok(Note(value as u8))
    }

    /// The MIDI note number
    pub fn midi(self) -> u8 {
        self.0
    }

    /// Chromatic pitch class (0-11)
    pub fn pitch_class(self) -> u8 {
        self.0 % 12
    }

    /// Octave in scientific pitch notation (MIDI 0 is octave -1)
    pub fn octave(self) -> i8 {
        (self.0 / 12) as i8 - 1
    }

    /// Equal-tempered frequency in Hz, A4 = 440Hz
    pub fn frequency(self) -> f32 {
        440.0 * 2.0_f32.powf((self.0 as f32 - 69.0) / 12.0)
    }

    /// Transpose by a number of semitones, failing if the result leaves the MIDI range
    pub fn transpose(self, semitones: i8) -> Result<Note> {
        Self::from_semitone(self.0 as i16 + semitones as i16)
    }
}

impl FromStr for Note {
    type Err = anyhow::Error;

    /// Accepts a MIDI number (`60`) or a pitch name with optional accidental
    /// and octave (`C`, `F#3`, `Bb2`, `Cs-1`). The octave defaults to 4.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow!("Empty note"));
        }

        if s.chars().all(|c| c.is_ascii_digit()) {
            let number = s
                .parse::<u8>()
                .map_err(|_| anyhow!("Invalid MIDI note: {}", s))?;
            return Self::from_midi(number);
        }

        let letter = s.chars().next().map(|c| c.to_ascii_uppercase());
        let base: i16 = match letter {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') => 11,
            _ => return Err(anyhow!("Invalid note name: {}", s)),
        };

        // The letter is ASCII, so byte 1 is a char boundary
        let rest = &s[1..];
        let (accidental, octave_part) = match rest.chars().next() {
            Some('#') | Some('s') | Some('S') => (1, &rest[1..]),
            Some('b') | Some('B') => (-1, &rest[1..]),
            _ => (0, rest),
        };

        let octave = if octave_part.is_empty() {
            4
        } else {
            octave_part
                .parse::<i8>()
                .map_err(|_| anyhow!("Invalid octave: {}", octave_part))?
        };

        Self::from_semitone((octave as i16 + 1) * 12 + base + accidental)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            SHARP_NAMES[self.pitch_class() as usize],
            self.octave()
        )
    }
}

impl From<Note> for u8 {
    fn from(note: Note) -> u8 {
        note.0
    }
}

impl TryFrom<u8> for Note {
    type Error = anyhow::Error;

    fn try_from(number: u8) -> Result<Self> {
        Note::from_midi(number)
    }
}

/// Wire form of a note: a MIDI number or a pitch name
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum NoteRepr {
    Midi(u8),
    Name(String),
}

#[cfg(feature = "serde")]
impl TryFrom<NoteRepr> for Note {
    type Error = anyhow::Error;

    fn try_from(repr: NoteRepr) -> Result<Self> {
        match repr {
            NoteRepr::Midi(number) => Note::from_midi(number),
            NoteRepr::Name(name) => name.parse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_numbers() {
        assert_eq!("60".parse::<Note>().unwrap(), Note::MIDDLE_C);
        assert_eq!("0".parse::<Note>().unwrap().midi(), 0);
        assert_eq!("127".parse::<Note>().unwrap().midi(), 127);
        assert!("128".parse::<Note>().is_err());
        assert!("300".parse::<Note>().is_err());
    }

    #[test]
    fn test_pitch_names() {
        assert_eq!("C4".parse::<Note>().unwrap().midi(), 60);
        assert_eq!("C".parse::<Note>().unwrap().midi(), 60);
        assert_eq!("A4".parse::<Note>().unwrap().midi(), 69);
        assert_eq!("F#3".parse::<Note>().unwrap().midi(), 54);
        assert_eq!("Bb2".parse::<Note>().unwrap().midi(), 46);
        assert_eq!("cs4".parse::<Note>().unwrap().midi(), 61);
        assert_eq!("C-1".parse::<Note>().unwrap().midi(), 0);
        assert_eq!("G9".parse::<Note>().unwrap().midi(), 127);
    }

    #[test]
    fn test_enharmonic_edges() {
        // Cb4 is B3, B#3 is C4
        assert_eq!("Cb4".parse::<Note>().unwrap().midi(), 59);
        assert_eq!("B#3".parse::<Note>().unwrap().midi(), 60);
        assert!("Cb-1".parse::<Note>().is_err());
        assert!("G#9".parse::<Note>().is_err());
    }

    #[test]
    fn test_invalid_names() {
        assert!("".parse::<Note>().is_err());
        assert!("H4".parse::<Note>().is_err());
        assert!("C4x".parse::<Note>().is_err());
        assert!("ü".parse::<Note>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Note::MIDDLE_C.to_string(), "C4");
        assert_eq!("Bb2".parse::<Note>().unwrap().to_string(), "A#2");
        assert_eq!(Note::from_midi(0).unwrap().to_string(), "C-1");
    }

    #[test]
    fn test_pitch_class_and_octave() {
        let note = Note::from_pitch(9, 4).unwrap();
        assert_eq!(note.midi(), 69);
        assert_eq!(note.pitch_class(), 9);
        assert_eq!(note.octave(), 4);
        assert!(Note::from_pitch(12, 4).is_err());
    }

    #[test]
    fn test_frequency() {
        let a4 = Note::from_midi(69).unwrap();
        assert!((a4.frequency() - 440.0).abs() < 0.01);
        assert!((Note::MIDDLE_C.frequency() - 261.63).abs() < 0.01);
        let a5 = Note::from_midi(81).unwrap();
        assert!((a5.frequency() - 880.0).abs() < 0.01);
    }

    #[test]
    fn test_transpose() {
        assert_eq!(Note::MIDDLE_C.transpose(7).unwrap().midi(), 67);
        assert_eq!(Note::MIDDLE_C.transpose(-12).unwrap().midi(), 48);
        assert!(Note::from_midi(120).unwrap().transpose(12).is_err());
    }
}
