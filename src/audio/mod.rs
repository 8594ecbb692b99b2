pub mod adsr;
pub mod clock;
pub mod engine;
pub mod instrument;
pub mod midi;
pub mod sequencer;
pub mod synth;
pub mod timer;
pub mod voice;

pub use clock::{AudioClock, ManualClock, SystemClock};
pub use instrument::{Instrument, InstrumentState};
pub use sequencer::{ChordSequencer, PlaybackMode, SequencerStatus};
pub use timer::{ManualTimer, ThreadTimer, Timer, TimerHandle};
