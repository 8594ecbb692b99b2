//! MIDI commands

use crate::audio::midi::list_ports;
use crate::commands::{CommandContext, CommandResult};
use colored::*;

/// Handle `ports`
pub fn cmd_ports(_args: &str, _ctx: &mut CommandContext) -> CommandResult {
    match list_ports() {
        Ok(ports) if ports.is_empty() => {
            CommandResult::Message("No MIDI output ports found".yellow().to_string())
        }
        Ok(ports) => {
            let mut out = format!("{}\n", "🎹 MIDI output ports:".bold());
            for (i, name) in ports.iter().enumerate() {
                out.push_str(&format!("  {}: {}\n", i, name.cyan()));
            }
            out.push_str("Select one with CHORDSEQ_BACKEND=midi CHORDSEQ_MIDI_PORT=<name>");
            CommandResult::Message(out)
        }
        Err(e) => CommandResult::Error(format!("{:#}", e)),
    }
}
