//! Chord sequencer
//!
//! Plays a [`ChordSequence`] one chord at a time: silence the instrument,
//! start every note of the chord at the clock's current time, then arm a
//! timer for the next chord. At most one playback run exists; starting a new
//! one cancels the previous run's pending timer first, so the latest request
//! always wins.
//!
//! All state lives behind one mutex. Timer callbacks and callers take turns
//! on it, and each callback carries the run id and chord index it was armed
//! for, so a callback that loses a race with `play`/`stop` finds a different
//! run (or none) and does nothing.
//!
//! While the instrument is still loading, `play` and `stop` do nothing and
//! return `Ok(())`.

use crate::audio::clock::AudioClock;
use crate::audio::instrument::{BoxedInstrument, InstrumentState};
use crate::audio::timer::{Timer, TimerHandle};
use anyhow::{Result, anyhow};
use chordseq_core::{Chord, ChordSequence};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

/// How a run issues its notes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// One chord per timer tick; onsets follow wall-clock timers
    Stepped,
    /// Every note handed to the instrument up front with its exact onset
    Scheduled,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Stepped => write!(f, "stepped"),
            PlaybackMode::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Snapshot of what the sequencer is doing
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerStatus {
    /// Instrument still loading; commands are ignored
    Loading,
    /// Instrument failed to load; commands are ignored
    Unavailable(String),
    Idle,
    Playing {
        mode: PlaybackMode,
        /// Index of the chord currently sounding
        chord: usize,
        chords: usize,
    },
}

/// The live, cancellable execution of one sequence
struct PlaybackRun {
    id: u64,
    mode: PlaybackMode,
    sequence: ChordSequence,
    /// Index the pending timer will trigger
    next_index: usize,
    started_at: f64,
    pending: Option<TimerHandle>,
}

impl PlaybackRun {
    fn cancel(&mut self) {
        if let Some(mut handle) = self.pending.take() {
            handle.cancel();
        }
    }

    fn current_chord(&self, now: f64) -> usize {
        let last = self.sequence.len().saturating_sub(1);
        match self.mode {
            PlaybackMode::Stepped => self.next_index.saturating_sub(1).min(last),
            PlaybackMode::Scheduled => {
                let elapsed = (now - self.started_at).max(0.0);
                let index = (elapsed / self.sequence.interval().as_secs()).floor() as usize;
                index.min(last)
            }
        }
    }
}

struct SequencerState {
    instrument: InstrumentState,
    clock: Arc<dyn AudioClock>,
    timer: Arc<dyn Timer>,
    run: Option<PlaybackRun>,
    next_run_id: u64,
}

impl SequencerState {
    fn cancel_run(&mut self) {
        if let Some(mut run) = self.run.take() {
            run.cancel();
            log::debug!("run {} superseded at chord {}", run.id, run.next_index);
        }
    }

    fn allocate_run_id(&mut self) -> u64 {
        self.next_run_id += 1;
        self.next_run_id
    }
}

/// Owns the instrument, the clock, the timer and the single playback run
pub struct ChordSequencer {
    state: Arc<Mutex<SequencerState>>,
}

impl ChordSequencer {
    pub fn new(
        instrument: InstrumentState,
        clock: Arc<dyn AudioClock>,
        timer: Arc<dyn Timer>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SequencerState {
                instrument,
                clock,
                timer,
                run: None,
                next_run_id: 0,
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SequencerState>> {
        lock_state(&self.state)
    }

    /// Play `sequence` chord by chord, `sequence.interval()` apart, replacing
    /// whatever was playing. The first chord sounds before this returns.
    ///
    /// An error from the instrument or clock while starting the first chord
    /// is returned; errors on later chords end the run and are logged.
    pub fn play(&self, sequence: ChordSequence) -> Result<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        if state.instrument.poll().is_none() {
            log::debug!("play ignored: instrument not ready");
            return Ok(());
        }

        state.cancel_run();
        state.clock.resume()?;

        let id = state.allocate_run_id();
        log::debug!(
            "run {}: {} chords every {}",
            id,
            sequence.len(),
            sequence.interval()
        );
        state.run = Some(PlaybackRun {
            id,
            mode: PlaybackMode::Stepped,
            sequence,
            next_index: 0,
            started_at: state.clock.now(),
            pending: None,
        });

        step(&self.state, state, id, 0)
    }

    /// Hand every note of `sequence` to the instrument at once, each chord
    /// stamped `interval * index` after now, replacing whatever was playing.
    /// The run stays active until the last chord's interval has passed so
    /// `stop` can still silence it.
    pub fn schedule(&self, sequence: ChordSequence) -> Result<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        if state.instrument.poll().is_none() {
            log::debug!("schedule ignored: instrument not ready");
            return Ok(());
        }

        state.cancel_run();
        state.clock.resume()?;

        if sequence.is_empty() {
            return Ok(());
        }

        let total = Duration::try_from_secs_f64(sequence.total_duration())
            .map_err(|e| anyhow!("Sequence is too long to schedule: {}", e))?;
        let id = state.allocate_run_id();
        let start = state.clock.now();

        let instrument = state
            .instrument
            .poll()
            .ok_or_else(|| anyhow!("Instrument is no longer available"))?;
        instrument.stop_all()?;
        for (at, chord) in sequence.timeline(start) {
            for &note in chord {
                instrument.start_note(note, at)?;
            }
        }
        log::debug!(
            "run {}: scheduled {} chords over {:.3}s",
            id,
            sequence.len(),
            total.as_secs_f64()
        );

        let end = sequence.len();
        let weak = Arc::downgrade(&self.state);
        let handle = state
            .timer
            .schedule(total, Box::new(move || fire(&weak, id, end)))?;

        state.run = Some(PlaybackRun {
            id,
            mode: PlaybackMode::Scheduled,
            sequence,
            next_index: end,
            started_at: start,
            pending: Some(handle),
        });
        Ok(())
    }

    /// Cancel the active run and silence the instrument. Does nothing when
    /// no run is active or the instrument is not ready.
    pub fn stop(&self) -> Result<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let Some(instrument) = state.instrument.poll() else {
            log::debug!("stop ignored: instrument not ready");
            return Ok(());
        };
        let Some(mut run) = state.run.take() else {
            return Ok(());
        };

        run.cancel();
        log::debug!("run {} stopped", run.id);
        instrument.stop_all()
    }

    pub fn status(&self) -> Result<SequencerStatus> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        if state.instrument.poll().is_none() {
            return Ok(match &state.instrument {
                InstrumentState::Unavailable(reason) => {
                    SequencerStatus::Unavailable(reason.clone())
                }
                _ => SequencerStatus::Loading,
            });
        }

        Ok(match &state.run {
            Some(run) => SequencerStatus::Playing {
                mode: run.mode,
                chord: run.current_chord(state.clock.now()),
                chords: run.sequence.len(),
            },
            None => SequencerStatus::Idle,
        })
    }

    pub fn is_playing(&self) -> bool {
        self.lock().map(|state| state.run.is_some()).unwrap_or(false)
    }

    pub fn is_ready(&self) -> bool {
        self.lock()
            .map(|mut state| state.instrument.poll().is_some())
            .unwrap_or(false)
    }

    /// Block up to `timeout` for the instrument to finish loading.
    /// Other calls on this sequencer wait meanwhile.
    pub fn wait_ready(&self, timeout: Duration) -> Result<bool> {
        Ok(self.lock()?.instrument.wait(timeout))
    }

    /// Name of the ready instrument
    pub fn instrument_name(&self) -> Option<String> {
        let mut state = self.lock().ok()?;
        state.instrument.poll().map(|i| i.name().to_string())
    }
}

fn lock_state(state: &Mutex<SequencerState>) -> Result<MutexGuard<'_, SequencerState>> {
    state
        .lock()
        .map_err(|e| anyhow!("Failed to lock sequencer state: {}", e))
}

/// Timer callback: re-enter the sequencer for chord `index` of run `run_id`
fn fire(shared: &Weak<Mutex<SequencerState>>, run_id: u64, index: usize) {
    // Sequencer dropped
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut guard = match lock_state(&shared) {
        Ok(guard) => guard,
        Err(e) => {
            log::error!("{:#}", e);
            return;
        }
    };
    if let Err(e) = step(&shared, &mut guard, run_id, index) {
        log::error!("run {} failed at chord {}: {:#}", run_id, index, e);
    }
}

/// Trigger chord `index` of run `run_id`, ending the run on error
fn step(
    shared: &Arc<Mutex<SequencerState>>,
    state: &mut SequencerState,
    run_id: u64,
    index: usize,
) -> Result<()> {
    let result = advance(shared, state, run_id, index);
    if result.is_err() && state.run.as_ref().is_some_and(|run| run.id == run_id) {
        state.run = None;
    }
    result
}

fn advance(
    shared: &Arc<Mutex<SequencerState>>,
    state: &mut SequencerState,
    run_id: u64,
    index: usize,
) -> Result<()> {
    let (chord, interval) = {
        let Some(run) = state
            .run
            .as_mut()
            .filter(|run| run.id == run_id && run.next_index == index)
        else {
            log::trace!("stale trigger for run {} chord {} ignored", run_id, index);
            return Ok(());
        };
        run.pending = None;
        run.next_index = index + 1;
        (run.sequence.chord(index).cloned(), run.sequence.interval())
    };

    let Some(chord) = chord else {
        log::debug!("run {} finished", run_id);
        state.run = None;
        return Ok(());
    };

    let at = state.clock.now();
    let instrument = state
        .instrument
        .poll()
        .ok_or_else(|| anyhow!("Instrument is no longer available"))?;
    sound_chord(instrument, &chord, at)?;
    log::debug!("run {} chord {} {} at {:.3}s", run_id, index, chord, at);

    let weak = Arc::downgrade(shared);
    let next = index + 1;
    let handle = state.timer.schedule(
        interval.as_duration(),
        Box::new(move || fire(&weak, run_id, next)),
    )?;
    if let Some(run) = state.run.as_mut() {
        run.pending = Some(handle);
    }
    Ok(())
}

/// Silence what is sounding, then start every note of `chord` at `at`
fn sound_chord(instrument: &mut BoxedInstrument, chord: &Chord, at: f64) -> Result<()> {
    instrument.stop_all()?;
    for &note in chord {
        instrument.start_note(note, at)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;
    use crate::audio::instrument::{Instrument, InstrumentEvent, Journal, TraceInstrument};
    use crate::audio::timer::ManualTimer;
    use chordseq_core::Note;

    fn seq(text: &str) -> ChordSequence {
        text.parse().unwrap()
    }

    fn start(midi: u8, at: f64) -> InstrumentEvent {
        InstrumentEvent::StartNote {
            note: Note::from_midi(midi).unwrap(),
            at,
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    struct Rig {
        sequencer: ChordSequencer,
        journal: Journal,
        timer: ManualTimer,
        clock: ManualClock,
    }

    fn rig() -> Rig {
        rig_with(|journal| InstrumentState::ready(TraceInstrument::with_journal(journal)))
    }

    fn rig_with(instrument: impl FnOnce(Journal) -> InstrumentState) -> Rig {
        let timer = ManualTimer::new();
        let clock = timer.clock();
        let journal = Journal::new();
        let sequencer = ChordSequencer::new(
            instrument(journal.clone()),
            Arc::new(clock.clone()),
            Arc::new(timer.clone()),
        );
        Rig {
            sequencer,
            journal,
            timer,
            clock,
        }
    }

    #[test]
    fn test_two_chord_scenario() {
        let rig = rig();
        rig.sequencer.play(seq("60 | 64 67 @ 0.5")).unwrap();

        // First chord is issued synchronously
        assert_eq!(
            rig.journal.take(),
            vec![InstrumentEvent::StopAll, start(60, 0.0)]
        );

        assert_eq!(rig.timer.advance(ms(499)), 0);
        assert!(rig.journal.is_empty());

        assert_eq!(rig.timer.advance(ms(1)), 1);
        assert_eq!(
            rig.journal.take(),
            vec![InstrumentEvent::StopAll, start(64, 0.5), start(67, 0.5)]
        );

        // Terminal trigger ends the run without commands
        assert!(rig.sequencer.is_playing());
        assert_eq!(rig.timer.run_until_idle(), 1);
        assert!(rig.journal.is_empty());
        assert_eq!(rig.sequencer.status().unwrap(), SequencerStatus::Idle);
        assert_eq!(rig.timer.pending(), 0);
    }

    #[test]
    fn test_one_stop_per_chord() {
        let rig = rig();
        rig.sequencer.play(seq("60 62 | 64 | 65 67 69 | 71 @ 0.25")).unwrap();
        rig.timer.run_until_idle();

        let events = rig.journal.events();
        let stops = events
            .iter()
            .filter(|e| **e == InstrumentEvent::StopAll)
            .count();
        assert_eq!(stops, 4);
        assert_eq!(events.len(), 4 + 7);
        assert_eq!(events[0], InstrumentEvent::StopAll);

        // Onsets never decrease and consecutive chords are >= interval apart
        let onsets: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                InstrumentEvent::StartNote { at, .. } => Some(*at),
                InstrumentEvent::StopAll => None,
            })
            .collect();
        let mut distinct = onsets.clone();
        distinct.dedup();
        assert_eq!(distinct, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_empty_sequence_issues_nothing() {
        let rig = rig();
        rig.sequencer.play(ChordSequence::default()).unwrap();
        assert!(rig.journal.is_empty());
        assert!(!rig.sequencer.is_playing());
        assert_eq!(rig.timer.pending(), 0);
    }

    #[test]
    fn test_empty_sequence_cancels_previous_run() {
        let rig = rig();
        rig.sequencer.play(seq("60 | 62 @ 1")).unwrap();
        rig.journal.take();

        rig.sequencer.play(ChordSequence::default()).unwrap();
        rig.timer.run_until_idle();
        assert!(rig.journal.is_empty());
    }

    #[test]
    fn test_play_supersedes_previous_run() {
        let rig = rig();
        rig.sequencer.play(seq("60 | 62 | 64 @ 1")).unwrap();
        rig.timer.advance(ms(300));
        rig.sequencer.play(seq("70 | 72 @ 0.5")).unwrap();
        rig.timer.run_until_idle();

        let started: Vec<u8> = rig
            .journal
            .events()
            .iter()
            .filter_map(|e| match e {
                InstrumentEvent::StartNote { note, .. } => Some(note.midi()),
                InstrumentEvent::StopAll => None,
            })
            .collect();
        assert_eq!(started, vec![60, 70, 72]);
        assert!(!rig.sequencer.is_playing());
    }

    #[test]
    fn test_stop_mid_run() {
        let rig = rig();
        rig.sequencer.play(seq("60 | 62 @ 1.0")).unwrap();
        rig.timer.advance(ms(200));
        rig.sequencer.stop().unwrap();
        rig.timer.run_until_idle();

        assert_eq!(
            rig.journal.events(),
            vec![
                InstrumentEvent::StopAll,
                start(60, 0.0),
                InstrumentEvent::StopAll
            ]
        );
        assert_eq!(rig.sequencer.status().unwrap(), SequencerStatus::Idle);
    }

    #[test]
    fn test_stop_during_last_chord_silences_it() {
        let rig = rig();
        rig.sequencer.play(seq("60 @ 1.0")).unwrap();
        rig.timer.advance(ms(200));
        rig.sequencer.stop().unwrap();

        assert_eq!(
            rig.journal.events(),
            vec![
                InstrumentEvent::StopAll,
                start(60, 0.0),
                InstrumentEvent::StopAll
            ]
        );
    }

    #[test]
    fn test_stop_when_idle_issues_nothing() {
        let rig = rig();
        rig.sequencer.stop().unwrap();
        assert!(rig.journal.is_empty());

        rig.sequencer.play(seq("60 @ 0.1")).unwrap();
        rig.timer.run_until_idle();
        rig.journal.take();
        rig.sequencer.stop().unwrap();
        assert!(rig.journal.is_empty());
    }

    #[test]
    fn test_not_ready_is_a_silent_no_op() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut journal_slot = None;
        let rig = rig_with(|journal| {
            journal_slot = Some(journal);
            InstrumentState::loading(rx)
        });

        assert!(rig.sequencer.play(seq("60 | 62 @ 0.5")).is_ok());
        assert!(rig.sequencer.schedule(seq("60 @ 0.5")).is_ok());
        assert!(rig.sequencer.stop().is_ok());
        assert_eq!(rig.sequencer.status().unwrap(), SequencerStatus::Loading);
        assert_eq!(rig.timer.pending(), 0);
        assert_eq!(rig.clock.resume_count(), 0);

        let journal = journal_slot.unwrap();
        tx.send(Ok(
            Box::new(TraceInstrument::with_journal(journal.clone())) as BoxedInstrument
        ))
        .unwrap();

        assert!(rig.sequencer.is_ready());
        rig.sequencer.play(seq("60 @ 0.5")).unwrap();
        assert_eq!(journal.events(), vec![InstrumentEvent::StopAll, start(60, 0.0)]);
    }

    #[test]
    fn test_unavailable_instrument() {
        let rig = rig_with(|_| InstrumentState::Unavailable("no device".into()));
        rig.sequencer.play(seq("60 @ 0.5")).unwrap();
        assert_eq!(
            rig.sequencer.status().unwrap(),
            SequencerStatus::Unavailable("no device".into())
        );
        assert!(!rig.sequencer.wait_ready(ms(1)).unwrap());
    }

    #[test]
    fn test_clock_resumed_on_every_play() {
        let rig = rig();
        rig.sequencer.play(seq("60 @ 0.5")).unwrap();
        rig.sequencer.play(seq("62 @ 0.5")).unwrap();
        assert_eq!(rig.clock.resume_count(), 2);
    }

    #[test]
    fn test_status_tracks_current_chord() {
        let rig = rig();
        rig.sequencer.play(seq("60 | 62 | 64 @ 1")).unwrap();
        assert_eq!(
            rig.sequencer.status().unwrap(),
            SequencerStatus::Playing {
                mode: PlaybackMode::Stepped,
                chord: 0,
                chords: 3
            }
        );
        rig.timer.advance(ms(1000));
        assert_eq!(
            rig.sequencer.status().unwrap(),
            SequencerStatus::Playing {
                mode: PlaybackMode::Stepped,
                chord: 1,
                chords: 3
            }
        );
    }

    #[test]
    fn test_schedule_issues_everything_up_front() {
        let rig = rig();
        rig.clock.advance(ms(2000));
        rig.sequencer.schedule(seq("60 | 64 67 @ 0.5")).unwrap();

        assert_eq!(
            rig.journal.take(),
            vec![
                InstrumentEvent::StopAll,
                start(60, 2.0),
                start(64, 2.5),
                start(67, 2.5)
            ]
        );

        rig.timer.advance(ms(600));
        assert_eq!(
            rig.sequencer.status().unwrap(),
            SequencerStatus::Playing {
                mode: PlaybackMode::Scheduled,
                chord: 1,
                chords: 2
            }
        );

        rig.timer.advance(ms(400));
        assert!(rig.journal.is_empty());
        assert_eq!(rig.sequencer.status().unwrap(), SequencerStatus::Idle);
    }

    #[test]
    fn test_stop_scheduled_run() {
        let rig = rig();
        rig.sequencer.schedule(seq("60 | 62 @ 1")).unwrap();
        rig.journal.take();
        rig.timer.advance(ms(300));
        rig.sequencer.stop().unwrap();
        assert_eq!(rig.journal.take(), vec![InstrumentEvent::StopAll]);
        assert_eq!(rig.timer.pending(), 0);
    }

    #[test]
    fn test_play_replaces_scheduled_run() {
        let rig = rig();
        rig.sequencer.schedule(seq("60 | 62 @ 1")).unwrap();
        rig.sequencer.play(seq("70 @ 0.5")).unwrap();
        assert!(matches!(
            rig.sequencer.status().unwrap(),
            SequencerStatus::Playing {
                mode: PlaybackMode::Stepped,
                ..
            }
        ));
        rig.timer.run_until_idle();
        assert!(!rig.sequencer.is_playing());
    }

    /// Fails on the Nth start_note call
    struct FlakyInstrument {
        calls: usize,
        fail_at: usize,
    }

    impl Instrument for FlakyInstrument {
        fn stop_all(&mut self) -> Result<()> {
            Ok(())
        }

        fn start_note(&mut self, _note: Note, _at: f64) -> Result<()> {
            self.calls += 1;
            if self.calls == self.fail_at {
                return Err(anyhow!("voice allocation failed"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_first_chord_error_is_returned() {
        let rig = rig_with(|_| {
            InstrumentState::ready(FlakyInstrument {
                calls: 0,
                fail_at: 1,
            })
        });
        let err = rig.sequencer.play(seq("60 | 62 @ 1")).unwrap_err();
        assert!(err.to_string().contains("voice allocation failed"));
        assert!(!rig.sequencer.is_playing());
        assert_eq!(rig.timer.pending(), 0);
    }

    #[test]
    fn test_later_chord_error_ends_run() {
        let rig = rig_with(|_| {
            InstrumentState::ready(FlakyInstrument {
                calls: 0,
                fail_at: 2,
            })
        });
        rig.sequencer.play(seq("60 | 62 | 64 @ 1")).unwrap();
        rig.timer.advance(ms(1000));
        assert!(!rig.sequencer.is_playing());
        assert_eq!(rig.timer.pending(), 0);
    }

    #[test]
    fn test_trigger_after_drop_is_harmless() {
        let rig = rig();
        rig.sequencer.play(seq("60 | 62 @ 1")).unwrap();
        let Rig {
            sequencer,
            journal,
            timer,
            ..
        } = rig;
        drop(sequencer);
        journal.take();
        timer.run_until_idle();
        assert!(journal.is_empty());
    }
}
