use crate::types::note::Note;
use anyhow::Result;
use std::fmt;
use std::str::FromStr;

/// Notes meant to sound together, kept in the order they were given
///
/// Duplicates are allowed and an empty chord is a rest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Chord {
    notes: Vec<Note>,
}

impl Chord {
    /// Create an empty chord
    pub fn new() -> Self {
        Chord { notes: Vec::new() }
    }

    /// Create a chord from notes in playing order
    pub fn from_notes(notes: Vec<Note>) -> Self {
        Chord { notes }
    }

    /// Create a chord from MIDI note numbers (e.g., `&[60, 64, 67]`)
    pub fn from_midi(numbers: &[u8]) -> Result<Self> {
        let notes = numbers
            .iter()
            .map(|&n| Note::from_midi(n))
            .collect::<Result<Vec<_>>>()?;
        Ok(Chord { notes })
    }

    pub fn push(&mut self, note: Note) {
        self.notes.push(note);
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Note> {
        self.notes.iter()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Transpose every note, failing if any note leaves the MIDI range
    pub fn transpose(&self, semitones: i8) -> Result<Chord> {
        let notes = self
            .notes
            .iter()
            .map(|n| n.transpose(semitones))
            .collect::<Result<Vec<_>>>()?;
        Ok(Chord { notes })
    }
}

impl FromStr for Chord {
    type Err = anyhow::Error;

    /// Notes separated by whitespace and/or commas, optionally wrapped in
    /// brackets: `C4 E4 G4`, `60,64,67`, `[C, E, G]`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(s);

        let notes = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Note>>>()?;
        Ok(Chord { notes })
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, note) in self.notes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", note)?;
        }
        write!(f, "]")
    }
}

impl<'a> IntoIterator for &'a Chord {
    type Item = &'a Note;
    type IntoIter = std::slice::Iter<'a, Note>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.iter()
    }
}

impl From<Vec<Note>> for Chord {
    fn from(notes: Vec<Note>) -> Self {
        Chord::from_notes(notes)
    }
}
