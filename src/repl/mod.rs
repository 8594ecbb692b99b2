//! Interactive chord sequencer prompt

use crate::audio::sequencer::{ChordSequencer, SequencerStatus};
use crate::backend::build_sequencer;
use crate::commands::playback::{parse_chords, play_sequence, read_sequence_file};
use crate::commands::{CommandContext, CommandRegistry, CommandResult, create_registry};
use crate::config::AppConfig;
use crate::repl::watcher::{FileWatcher, changed_paths};
use anyhow::{Result, anyhow};
use colored::*;
use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::Event;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub mod watcher;

/// A changed file is reloaded once it has been quiet this long; editors
/// often truncate and rewrite in several events per save
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(200);

/// Whether the loop keeps going after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Repl {
    ctx: CommandContext,
    registry: CommandRegistry,
    tx_watcher: Sender<notify::Result<Event>>,
    rx_watcher: Receiver<notify::Result<Event>>,
    watcher: Option<FileWatcher>,
    /// Changed files and when their latest event arrived
    pending_reloads: HashMap<PathBuf, Instant>,
}

impl Repl {
    /// Build the configured backend and wait briefly for it to load
    pub fn new(config: &AppConfig) -> Result<Self> {
        let sequencer = build_sequencer(config);
        if !sequencer.wait_ready(config.ready_timeout)? {
            log::warn!(
                "instrument not ready after {:?}; commands are ignored until it is",
                config.ready_timeout
            );
        }
        Ok(Self::with_sequencer(sequencer, config))
    }

    pub fn with_sequencer(sequencer: ChordSequencer, config: &AppConfig) -> Self {
        let (tx_watcher, rx_watcher) = unbounded();
        Self {
            ctx: CommandContext::new(sequencer, config),
            registry: create_registry(),
            tx_watcher,
            rx_watcher,
            watcher: None,
            pending_reloads: HashMap::new(),
        }
    }

    pub fn context(&self) -> &CommandContext {
        &self.ctx
    }

    /// Run one line of input
    pub fn handle_line(&mut self, line: &str) -> Flow {
        let line = line.trim();
        if line.is_empty() {
            return Flow::Continue;
        }

        let result = match self.registry.execute(line, &mut self.ctx) {
            // Bare chords play directly
            CommandResult::NotACommand => match parse_chords(line, self.ctx.interval) {
                Ok(sequence) => play_sequence(sequence, &mut self.ctx),
                Err(e) => CommandResult::Error(format!(
                    "Not a command or chord sequence: {:#} (try 'help')",
                    e
                )),
            },
            other => other,
        };

        match result {
            CommandResult::Success | CommandResult::NotACommand => {}
            CommandResult::Message(msg) => println!("{}", msg),
            CommandResult::Exit => return Flow::Exit,
            CommandResult::Error(e) => println!("{} {}", "Error:".bright_red().bold(), e.red()),
            CommandResult::Watch(path) => match self.watch(Path::new(&path)) {
                Ok(path) => println!(
                    "{} Watching {} for changes...",
                    "👀".bright_cyan(),
                    path.display().to_string().bright_green()
                ),
                Err(e) => println!("{} {:#}", "Error:".bright_red().bold(), e),
            },
        }
        Flow::Continue
    }

    /// Play `path` now and again whenever it changes
    pub fn watch(&mut self, path: &Path) -> Result<PathBuf> {
        let path = path
            .canonicalize()
            .map_err(|e| anyhow!("Cannot watch {}: {}", path.display(), e))?;

        if self.watcher.is_none() {
            let watcher = FileWatcher::new(self.tx_watcher.clone())
                .map_err(|e| anyhow!("Failed to create watcher: {}", e))?;
            self.watcher = Some(watcher);
        }
        if let Some(watcher) = &mut self.watcher {
            watcher
                .watch(&path)
                .map_err(|e| anyhow!("Failed to watch {}: {}", path.display(), e))?;
        }

        self.reload(&path)?;
        Ok(path)
    }

    /// Re-read a sequence file and play it, replacing what is playing
    pub fn reload(&mut self, path: &Path) -> Result<()> {
        let sequence = read_sequence_file(path, self.ctx.interval)?;
        log::debug!("reloaded {}: {}", path.display(), sequence);
        self.ctx.sequencer.play(sequence)?;
        Ok(())
    }

    /// Note a change; the reload waits until the file settles
    fn on_file_event(&mut self, event: Event, now: Instant) {
        for path in changed_paths(event) {
            self.pending_reloads.insert(path, now);
        }
    }

    /// When the next settled file is due
    fn next_reload_at(&self) -> Option<Instant> {
        self.pending_reloads
            .values()
            .map(|changed| *changed + RELOAD_DEBOUNCE)
            .min()
    }

    /// Reload every file that has been quiet for the debounce period
    fn reload_settled(&mut self, now: Instant) -> usize {
        let settled: Vec<PathBuf> = self
            .pending_reloads
            .iter()
            .filter(|(_, changed)| now.saturating_duration_since(**changed) >= RELOAD_DEBOUNCE)
            .map(|(path, _)| path.clone())
            .collect();

        for path in &settled {
            self.pending_reloads.remove(path);
            println!("{} File changed: {}", "⚡".bright_yellow(), path.display());
            match self.reload(path) {
                Ok(()) => println!("{} Reloaded", "✓".bright_green()),
                Err(e) => println!("{} {:#}", "Error:".red(), e),
            }
        }
        settled.len()
    }

    fn print_banner(&self) {
        println!(
            "{} {}",
            "🎵".bright_yellow(),
            "chordseq".bright_cyan().bold()
        );
        match self.ctx.sequencer.status() {
            Ok(SequencerStatus::Unavailable(reason)) => {
                println!("{} {}", "Instrument unavailable:".bright_red(), reason)
            }
            Ok(SequencerStatus::Loading) => println!("{}", "Instrument still loading...".yellow()),
            _ => {
                if let Some(name) = self.ctx.sequencer.instrument_name() {
                    println!("Instrument: {}", name.cyan());
                }
            }
        }
        println!(
            "Type chords like {} or {}",
            "C4 E4 G4 | F4 A4 C5".cyan(),
            "play 0.5 60 64 67 | 65 69 72".cyan()
        );
        println!(
            "Type '{}' for more information, '{}' or {} to exit.\n",
            "help".bright_green(),
            "quit".bright_red(),
            "Ctrl+C".bright_red()
        );
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor =
            DefaultEditor::new().map_err(|e| anyhow!("Failed to initialize line editor: {}", e))?;
        self.print_banner();

        let (tx_input, rx_input) = unbounded::<Result<String, ReadlineError>>();
        thread::Builder::new()
            .name("chordseq-readline".into())
            .spawn(move || loop {
                let prompt = format!("{} ", "chordseq>".bright_magenta().bold());
                match editor.readline(&prompt) {
                    Ok(line) => {
                        let line = line.trim().to_string();
                        if !line.is_empty() {
                            let _ = editor.add_history_entry(&line);
                        }
                        if tx_input.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = tx_input.send(Err(err));
                        break;
                    }
                }
            })
            .map_err(|e| anyhow!("Failed to spawn input thread: {}", e))?;

        loop {
            let settle = match self.next_reload_at() {
                Some(at) => crossbeam_channel::at(at),
                None => crossbeam_channel::never(),
            };

            crossbeam_channel::select! {
                recv(rx_input) -> msg => match msg {
                    Ok(Ok(line)) => {
                        if self.handle_line(&line) == Flow::Exit {
                            break;
                        }
                    }
                    Ok(Err(ReadlineError::Interrupted)) | Ok(Err(ReadlineError::Eof)) => break,
                    Ok(Err(err)) => {
                        println!("{} {:?}", "Error:".bright_red().bold(), err);
                        break;
                    }
                    Err(_) => break,
                },
                recv(self.rx_watcher) -> msg => match msg {
                    Ok(Ok(event)) => self.on_file_event(event, Instant::now()),
                    Ok(Err(e)) => println!("{} Watch error: {}", "Error:".red(), e),
                    Err(_) => break,
                },
                recv(settle) -> _ => {
                    self.reload_settled(Instant::now());
                }
            }
        }

        if let Err(e) = self.ctx.sequencer.stop() {
            log::warn!("stopping on exit: {:#}", e);
        }
        println!("{} 🎵", "Goodbye!".bright_cyan());
        Ok(())
    }
}

/// Convenience function to start the REPL
pub fn start(config: &AppConfig) -> Result<()> {
    Repl::new(config)?.run()
}
