//! WASM bindings for chordseq-core
//!
//! Lets a browser front end parse chord sequences and get the flat
//! `{time, note}` list a soundfont player's `schedule` call expects.

use crate::types::{ChordSequence, Note};
#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

/// One note of a sequence with its absolute onset time
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduledNote {
    pub time: f64,
    pub note: Note,
}

/// Flatten a sequence into notes with onsets `start + interval * chord_index`
pub fn scheduled_notes(sequence: &ChordSequence, start: f64) -> Vec<ScheduledNote> {
    sequence
        .timeline(start)
        .flat_map(|(time, chord)| chord.iter().map(move |&note| ScheduledNote { time, note }))
        .collect()
}

/// Parse the text form and return `[chords, interval]` as a JS value
#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = parseChordSequence)]
pub fn parse_chord_sequence(text: &str) -> Result<JsValue, JsValue> {
    let sequence: ChordSequence = text
        .parse()
        .map_err(|e: anyhow::Error| JsValue::from_str(&e.to_string()))?;
    serde_wasm_bindgen::to_value(&sequence).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Parse the text form and return an array of `{time, note}` objects
#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = scheduleNotes)]
pub fn schedule_notes(text: &str, start: f64) -> Result<js_sys::Array, JsValue> {
    let sequence: ChordSequence = text
        .parse()
        .map_err(|e: anyhow::Error| JsValue::from_str(&e.to_string()))?;

    let out = js_sys::Array::new();
    for scheduled in scheduled_notes(&sequence, start) {
        let value = serde_wasm_bindgen::to_value(&scheduled)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        out.push(&value);
    }
    Ok(out)
}

/// Frequency in Hz of a note name or MIDI number
#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = noteFrequency)]
pub fn note_frequency(note: &str) -> Result<f32, JsValue> {
    note.parse::<Note>()
        .map(Note::frequency)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
