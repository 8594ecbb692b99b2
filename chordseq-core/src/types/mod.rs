// chordseq-core/src/types/mod.rs

pub mod audio_config;
pub mod chord;
pub mod note;
pub mod sequence;

pub use audio_config::{AdsrParams, Waveform};
pub use chord::Chord;
pub use note::Note;
pub use sequence::{ChordSequence, Interval};
