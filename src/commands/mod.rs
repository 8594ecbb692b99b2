//! Command registry for REPL commands
//!
//! Commands are matched by prefix, longest first. Input that matches no
//! command is handed back as [`CommandResult::NotACommand`].

pub mod general;
pub mod midi;
pub mod playback;

use crate::audio::sequencer::ChordSequencer;
use crate::config::AppConfig;
use chordseq_core::Interval;

/// What the REPL should do after a command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Done, nothing to print
    Success,
    /// Print this
    Message(String),
    Exit,
    /// No command matched; the line may be chords
    NotACommand,
    Error(String),
    /// Start watching this path
    Watch(String),
}

/// State shared by all command handlers
pub struct CommandContext {
    pub sequencer: ChordSequencer,
    /// Applied to sequences that do not name their own interval
    pub interval: Interval,
}

impl CommandContext {
    pub fn new(sequencer: ChordSequencer, config: &AppConfig) -> Self {
        Self {
            sequencer,
            interval: config.interval,
        }
    }
}

/// Receives the text after the command name, trimmed
pub type CommandHandler = fn(&str, &mut CommandContext) -> CommandResult;

pub struct CommandRegistry {
    /// Longest name first
    commands: Vec<(String, CommandHandler)>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    pub fn register(&mut self, prefix: &str, handler: CommandHandler) {
        self.commands.push((prefix.to_string(), handler));
        self.commands.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    /// Run the handler whose name starts `input`
    pub fn execute(&self, input: &str, ctx: &mut CommandContext) -> CommandResult {
        for (prefix, handler) in &self.commands {
            if input == prefix || input.starts_with(&format!("{} ", prefix)) {
                let args = input[prefix.len()..].trim();
                return handler(args, ctx);
            }
        }
        CommandResult::NotACommand
    }

    pub fn list_commands(&self) -> Vec<&str> {
        self.commands.iter().map(|(p, _)| p.as_str()).collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with every REPL command
pub fn create_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();

    registry.register("play", playback::cmd_play);
    registry.register("schedule", playback::cmd_schedule);
    registry.register("stop", playback::cmd_stop);
    registry.register("status", playback::cmd_status);
    registry.register("interval", playback::cmd_interval);
    registry.register("load", playback::cmd_load);

    registry.register("ports", midi::cmd_ports);

    registry.register("help", general::cmd_help);
    registry.register("quit", general::cmd_quit);
    registry.register("exit", general::cmd_quit);
    registry.register("watch", general::cmd_watch);

    registry
}
