//! General REPL commands (help, quit, watch)

use crate::commands::{CommandContext, CommandResult};
use colored::*;

/// Handle `help` command
pub fn cmd_help(_args: &str, _ctx: &mut CommandContext) -> CommandResult {
    print_help();
    CommandResult::Success
}

/// Handle `quit` or `exit` command
pub fn cmd_quit(_args: &str, _ctx: &mut CommandContext) -> CommandResult {
    CommandResult::Exit
}

/// Handle `watch <file>` command
pub fn cmd_watch(args: &str, _ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Error("Usage: watch <file>".to_string());
    }
    CommandResult::Watch(args.to_string())
}

fn print_help() {
    println!("{}", "🎵 chordseq Help".bold());
    println!("{}", "================".bold());
    println!();
    println!("{}", "Chords:".green());
    println!(
        "  {}         - Notes by name or MIDI number",
        "C4 E4 G4".cyan()
    );
    println!("  {}       - Commas work too", "60, 64, 67".cyan());
    println!(
        "  {}   - Chords separated by |",
        "C4 E4 | F4 A4".cyan()
    );
    println!(
        "  {}   - Interval suffix (seconds, s or ms)",
        "C4 | G3 @ 0.5".cyan()
    );
    println!("  Typing chords on their own plays them.");
    println!();
    println!("{}", "Playback:".green());
    println!(
        "  {}  - Play one chord per interval",
        "play [interval] <chords>".cyan()
    );
    println!(
        "  {} - Hand every note to the instrument up front",
        "schedule [interval] <chords>".cyan()
    );
    println!("  {}                     - Silence and cancel playback", "stop".cyan());
    println!("  {}                   - Show instrument and playback state", "status".cyan());
    println!("  {}        - Show or set the default interval", "interval [secs]".cyan());
    println!();
    println!("{}", "Files:".green());
    println!("  {}              - Play a .txt or .json sequence", "load <file>".cyan());
    println!("  {}             - Replay the file whenever it changes", "watch <file>".cyan());
    println!();
    println!("{}", "Other Commands:".green());
    println!("  {}                    - List MIDI output ports", "ports".bright_green());
    println!("  {}                     - Show this help", "help".bright_green());
    println!("  {}                     - Exit", "quit".bright_red());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;

    #[test]
    fn test_watch_requires_a_path() {
        let (mut ctx, _journal, _timer) = context();
        assert!(matches!(cmd_watch("", &mut ctx), CommandResult::Error(_)));
        assert_eq!(
            cmd_watch("song.txt", &mut ctx),
            CommandResult::Watch("song.txt".into())
        );
    }
}
