//! # chordseq Core
//!
//! WASM-compatible core library for chordseq.
//! Provides notes, chords, chord sequences and their text/JSON forms without
//! audio or MIDI dependencies.
//!
//! ## Features
//!
//! - **serde**: JSON form of chord sequences (`[[[60], [64, 67]], 0.5]`)
//! - **wasm**: WASM bindings via wasm-bindgen
//!
//! ## Example
//!
//! ```ignore
//! use chordseq_core::ChordSequence;
//!
//! let seq: ChordSequence = "C4 E4 G4 | F4 A4 C5 @ 0.5".parse()?;
//! for (onset, chord) in seq.timeline(0.0) {
//!     println!("{:.2}s {}", onset, chord);
//! }
//! ```

pub mod types;
pub mod wasm;

pub use types::{AdsrParams, Chord, ChordSequence, Interval, Note, Waveform};
