//! # chordseq
//!
//! Plays chord sequences on an instrument, one chord per fixed interval.
//!
//! A [`ChordSequencer`](audio::ChordSequencer) owns an instrument that may
//! still be loading, the clock its note onsets are measured against, and a
//! timer that steps through the chords. Starting a new sequence cancels the
//! old one; stopping silences everything.
//!
//! ## Modules
//!
//! - `audio`: the sequencer plus its collaborators: clocks, timers, the
//!   built-in synthesizer on a cpal output stream, and MIDI output.
//! - `backend`: builds a sequencer for the configured instrument.
//! - `commands`: REPL command handlers.
//! - `config`: application settings and their environment overrides.
//! - `repl`: the interactive prompt.
//!
//! Notes, chords and sequences live in the `chordseq-core` crate, re-exported
//! here.

pub mod audio;
pub mod backend;
pub mod commands;
pub mod config;
pub mod repl;

pub use chordseq_core::{AdsrParams, Chord, ChordSequence, Interval, Note, Waveform};
