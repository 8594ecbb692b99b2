//! Playback commands (play, schedule, stop, status, interval, load)

use crate::audio::sequencer::{ChordSequencer, SequencerStatus};
use crate::commands::{CommandContext, CommandResult};
use anyhow::{Context, Result};
use chordseq_core::{ChordSequence, Interval};
use colored::*;
use std::path::Path;

/// A leading interval token: starts with a digit and has a decimal point or
/// a unit, so `0.5`, `2s` and `250ms` qualify but MIDI numbers like `60` do not
fn leading_interval(args: &str) -> Option<(Interval, &str)> {
    let (first, rest) = args.split_once(char::is_whitespace)?;
    let looks_like_interval = first.starts_with(|c: char| c.is_ascii_digit())
        && (first.contains('.') || first.ends_with('s'));
    if !looks_like_interval {
        return None;
    }
    first.parse().ok().map(|interval| (interval, rest.trim()))
}

/// Parse `[interval] <chords> [@ interval]` against the context's default interval
pub fn parse_chords(args: &str, default: Interval) -> Result<ChordSequence> {
    match leading_interval(args) {
        Some((interval, rest)) => ChordSequence::parse_with_interval(rest, interval),
        None => ChordSequence::parse_with_interval(args, default),
    }
}

/// Parse a sequence file
///
/// `.json` files hold `[[chords...], interval]`. Anything else is text: chords
/// separated by `|` or newlines, `#` comment lines, and an optional
/// `@ <interval>` that applies to the whole file.
pub fn read_sequence_file(path: &Path, default: Interval) -> Result<ChordSequence> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return ChordSequence::from_json(&contents)
            .with_context(|| format!("Invalid sequence in {}", path.display()));
    }

    parse_sequence_text(&contents, default)
        .with_context(|| format!("Invalid sequence in {}", path.display()))
}

fn parse_sequence_text(contents: &str, default: Interval) -> Result<ChordSequence> {
    let mut interval = default;
    let mut chords = Vec::new();

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let body = match line.rsplit_once('@') {
            Some((body, at)) => {
                interval = at.parse()?;
                body.trim()
            }
            None => line,
        };
        if !body.is_empty() {
            chords.push(body);
        }
    }

    ChordSequence::parse_with_interval(&chords.join(" | "), interval)
}

fn started(verb: &str, sequence: &ChordSequence, sequencer: &ChordSequencer) -> CommandResult {
    if !sequencer.is_ready() {
        return CommandResult::Message(
            format!("Instrument not ready, ignored ({})", describe(sequencer))
                .yellow()
                .to_string(),
        );
    }
    if sequence.is_empty() {
        return CommandResult::Message("Nothing to play".dimmed().to_string());
    }
    CommandResult::Message(
        format!(
            "🎵 {} {} chord{} every {}",
            verb,
            sequence.len(),
            if sequence.len() == 1 { "" } else { "s" },
            sequence.interval()
        )
        .bright_green()
        .to_string(),
    )
}

/// Play chords now, one per interval, and report how it went
pub fn play_sequence(sequence: ChordSequence, ctx: &mut CommandContext) -> CommandResult {
    match ctx.sequencer.play(sequence.clone()) {
        Ok(()) => started("Playing", &sequence, &ctx.sequencer),
        Err(e) => CommandResult::Error(format!("{:#}", e)),
    }
}

/// Handle `play [interval] <chords>`
pub fn cmd_play(args: &str, ctx: &mut CommandContext) -> CommandResult {
    match parse_chords(args, ctx.interval) {
        Ok(sequence) => play_sequence(sequence, ctx),
        Err(e) => CommandResult::Error(format!("{:#}", e)),
    }
}

/// Handle `schedule [interval] <chords>`
pub fn cmd_schedule(args: &str, ctx: &mut CommandContext) -> CommandResult {
    let sequence = match parse_chords(args, ctx.interval) {
        Ok(sequence) => sequence,
        Err(e) => return CommandResult::Error(format!("{:#}", e)),
    };
    match ctx.sequencer.schedule(sequence.clone()) {
        Ok(()) => started("Scheduled", &sequence, &ctx.sequencer),
        Err(e) => CommandResult::Error(format!("{:#}", e)),
    }
}

/// Handle `stop`
pub fn cmd_stop(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match ctx.sequencer.stop() {
        Ok(()) => CommandResult::Message("⏹ Stopped".bright_yellow().to_string()),
        Err(e) => CommandResult::Error(format!("{:#}", e)),
    }
}

fn describe(sequencer: &ChordSequencer) -> String {
    match sequencer.status() {
        Ok(SequencerStatus::Loading) => "instrument loading".to_string(),
        Ok(SequencerStatus::Unavailable(reason)) => format!("instrument unavailable: {}", reason),
        Ok(SequencerStatus::Idle) => "idle".to_string(),
        Ok(SequencerStatus::Playing {
            mode,
            chord,
            chords,
        }) => format!("playing chord {}/{} ({})", chord + 1, chords, mode),
        Err(e) => format!("{:#}", e),
    }
}

/// Handle `status`
pub fn cmd_status(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    let instrument = ctx
        .sequencer
        .instrument_name()
        .unwrap_or_else(|| "-".to_string());
    CommandResult::Message(format!(
        "{} {}\n{} {}\n{} {}",
        "Instrument:".bold(),
        instrument.cyan(),
        "State:     ".bold(),
        describe(&ctx.sequencer),
        "Interval:  ".bold(),
        ctx.interval
    ))
}

/// Handle `interval [secs]`
pub fn cmd_interval(args: &str, ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Message(format!("Default interval: {}", ctx.interval));
    }
    match args.parse::<Interval>() {
        Ok(interval) => {
            ctx.interval = interval;
            CommandResult::Message(
                format!("Default interval set to {}", interval)
                    .bright_green()
                    .to_string(),
            )
        }
        Err(e) => CommandResult::Error(format!("{:#}", e)),
    }
}

/// Handle `load <file>`
pub fn cmd_load(args: &str, ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Error("Usage: load <file>".to_string());
    }
    match read_sequence_file(Path::new(args), ctx.interval) {
        Ok(sequence) => play_sequence(sequence, ctx),
        Err(e) => CommandResult::Error(format!("{:#}", e)),
    }
}
