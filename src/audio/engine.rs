//! Audio output engine
//!
//! A cpal `Stream` cannot leave the thread that built it on every platform,
//! so the engine thread owns it and everything else talks to it through
//! channels. The stream is built paused: the sample clock reads zero and
//! nothing is rendered until [`EngineClock::resume`] starts it, mirroring a
//! browser `AudioContext` that starts suspended.
//!
//! Time is counted in rendered frames, so note onsets stamped with
//! [`EngineClock::now`] land on exact sample positions.

use super::clock::AudioClock;
use super::voice::Voice;
use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Preallocated voice slots; the mixer grows past this rather than drop notes
pub const INITIAL_VOICES: usize = 64;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const RESUME_TIMEOUT: Duration = Duration::from_secs(2);

/// Work for the audio callback
#[derive(Debug)]
pub enum VoiceCommand {
    Start(Voice),
    /// Release sounding voices and drop ones that have not started
    ReleaseAll,
}

enum EngineCommand {
    Resume(Sender<Result<()>>),
    Shutdown,
}

/// Sums voices into the output buffer. Lives inside the audio callback.
pub struct Mixer {
    voices: Vec<Voice>,
    commands: Receiver<VoiceCommand>,
    frames: Arc<AtomicU64>,
    volume: f32,
}

impl Mixer {
    pub fn new(commands: Receiver<VoiceCommand>, frames: Arc<AtomicU64>, volume: f32) -> Self {
        Self {
            voices: Vec::with_capacity(INITIAL_VOICES),
            commands,
            frames,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Voices still waiting for their onset frame
    pub fn pending_voices(&self) -> usize {
        self.voices.iter().filter(|voice| voice.is_pending()).count()
    }

    fn apply(&mut self, command: VoiceCommand) {
        match command {
            VoiceCommand::Start(voice) => self.voices.push(voice),
            VoiceCommand::ReleaseAll => {
                self.voices.retain(|voice| !voice.is_pending());
                for voice in &mut self.voices {
                    voice.release();
                }
            }
        }
    }

    /// Render interleaved frames into `data`, the same value on every channel
    pub fn fill<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: Sample + FromSample<f32>,
    {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }

        let mut frame_index = self.frames.load(Ordering::Acquire);
        for frame in data.chunks_mut(channels.max(1)) {
            let mixed: f32 = self
                .voices
                .iter_mut()
                .map(|voice| voice.render(frame_index))
                .sum();
            let value: T = Sample::from_sample((mixed * self.volume).tanh());
            for sample in frame.iter_mut() {
                *sample = value;
            }
            frame_index += 1;
        }
        self.frames.store(frame_index, Ordering::Release);

        self.voices.retain(|voice| !voice.is_finished());
    }
}

/// Sample clock of the output stream
pub struct EngineClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
    running: AtomicBool,
    control: Sender<EngineCommand>,
}

impl EngineClock {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Output frame corresponding to clock time `at`
    pub fn frame_at(&self, at: f64) -> u64 {
        (at.max(0.0) * self.sample_rate as f64).round() as u64
    }
}

impl AudioClock for EngineClock {
    fn now(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn resume(&self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.control
            .send(EngineCommand::Resume(reply_tx))
            .map_err(|_| anyhow!("Audio engine has shut down"))?;
        reply_rx
            .recv_timeout(RESUME_TIMEOUT)
            .map_err(|e| anyhow!("Audio engine did not respond to resume: {}", e))??;

        self.running.store(true, Ordering::Release);
        log::info!("audio output started at {} Hz", self.sample_rate);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Handle to the engine thread
pub struct AudioEngine {
    clock: Arc<EngineClock>,
    voices: Sender<VoiceCommand>,
    control: Sender<EngineCommand>,
    thread: Option<JoinHandle<()>>,
}

impl AudioEngine {
    /// Open the default output device. Fails if there is none.
    pub fn start(volume: f32) -> Result<Self> {
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (init_tx, init_rx) = crossbeam_channel::bounded(1);
        let frames = Arc::new(AtomicU64::new(0));

        let mixer = Mixer::new(voice_rx, frames.clone(), volume);
        let thread = thread::Builder::new()
            .name("chordseq-audio".into())
            .spawn(move || run_engine(mixer, control_rx, init_tx))
            .map_err(|e| anyhow!("Failed to spawn audio thread: {}", e))?;

        let sample_rate = init_rx
            .recv_timeout(STARTUP_TIMEOUT)
            .map_err(|e| anyhow!("Audio engine did not start: {}", e))??;

        Ok(Self {
            clock: Arc::new(EngineClock {
                frames,
                sample_rate,
                running: AtomicBool::new(false),
                control: control_tx.clone(),
            }),
            voices: voice_tx,
            control: control_tx,
            thread: Some(thread),
        })
    }

    pub fn clock(&self) -> Arc<EngineClock> {
        self.clock.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate
    }

    pub fn send(&self, command: VoiceCommand) -> Result<()> {
        self.voices
            .send(command)
            .map_err(|_| anyhow!("Audio engine has shut down"))
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.control.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_engine(mixer: Mixer, control: Receiver<EngineCommand>, init: Sender<Result<u32>>) {
    let stream = match open_stream(mixer) {
        Ok((stream, sample_rate)) => {
            let _ = init.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            let _ = init.send(Err(e));
            return;
        }
    };

    while let Ok(command) = control.recv() {
        match command {
            EngineCommand::Resume(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| anyhow!("Failed to start output stream: {}", e));
                let _ = reply.send(result);
            }
            EngineCommand::Shutdown => break,
        }
    }

    if let Err(e) = stream.pause() {
        log::debug!("pausing output stream on shutdown: {}", e);
    }
}

fn open_stream(mixer: Mixer) -> Result<(Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;
    let supported = device.default_output_config()?;

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0;
    log::info!(
        "output device '{}': {} Hz, {} channels, {:?}",
        device.name().unwrap_or_else(|_| "unknown".into()),
        sample_rate,
        config.channels,
        sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer)?,
        _ => return Err(anyhow!("Unsupported sample format: {:?}", sample_format)),
    };

    // Some hosts start streams on creation
    stream
        .pause()
        .map_err(|e| anyhow!("Failed to suspend output stream: {}", e))?;

    Ok((stream, sample_rate))
}

fn build_stream<T>(device: &cpal::Device, config: &StreamConfig, mut mixer: Mixer) -> Result<Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| mixer.fill(data, channels),
            |err| log::error!("output stream error: {}", err),
            None,
        )
        .map_err(|e| anyhow!("Failed to build output stream: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::voice::Wavetable;
    use chordseq_core::{AdsrParams, Note, Waveform};

    const SAMPLE_RATE: f32 = 48_000.0;

    fn mixer() -> (Mixer, Sender<VoiceCommand>, Arc<AtomicU64>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let frames = Arc::new(AtomicU64::new(0));
        (Mixer::new(rx, frames.clone(), 0.8), tx, frames)
    }

    fn voice(onset: u64) -> Voice {
        Voice::new(
            Note::MIDDLE_C,
            onset,
            Arc::new(Wavetable::render(Waveform::Saw)),
            AdsrParams::organ(),
            SAMPLE_RATE,
        )
    }

    #[test]
    fn test_frames_advance_with_rendering() {
        let (mut mixer, _tx, frames) = mixer();
        let mut buffer = vec![0.0f32; 512];
        mixer.fill(&mut buffer, 2);
        assert_eq!(frames.load(Ordering::Acquire), 256);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_voice_starts_on_onset_frame() {
        let (mut mixer, tx, _frames) = mixer();
        tx.send(VoiceCommand::Start(voice(300))).unwrap();

        let mut buffer = vec![0.0f32; 256];
        mixer.fill(&mut buffer, 1);
        assert!(buffer.iter().all(|s| *s == 0.0));

        mixer.fill(&mut buffer, 1);
        assert!(buffer[..44].iter().all(|s| *s == 0.0));
        assert!(buffer[44..].iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_release_all_drops_pending_voices() {
        let (mut mixer, tx, _frames) = mixer();
        tx.send(VoiceCommand::Start(voice(0))).unwrap();
        tx.send(VoiceCommand::Start(voice(10_000))).unwrap();

        let mut buffer = vec![0.0f32; 128];
        mixer.fill(&mut buffer, 1);
        assert_eq!(mixer.active_voices(), 2);

        tx.send(VoiceCommand::ReleaseAll).unwrap();
        mixer.fill(&mut buffer, 1);
        assert_eq!(mixer.active_voices(), 1);

        let mut tail = vec![0.0f32; 4_800];
        mixer.fill(&mut tail, 1);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_long_schedule_keeps_every_voice() {
        let (mut mixer, tx, _frames) = mixer();
        tx.send(VoiceCommand::ReleaseAll).unwrap();
        for chord in 0..22u64 {
            for _ in 0..3 {
                tx.send(VoiceCommand::Start(voice(chord * 22_050))).unwrap();
            }
        }

        let mut buffer = vec![0.0f32; 64];
        mixer.fill(&mut buffer, 1);
        assert_eq!(mixer.active_voices(), 66);
        // The whole first chord has started, the rest wait their turn
        assert_eq!(mixer.pending_voices(), 63);
        assert!(buffer.iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_output_stays_in_range() {
        let (mut mixer, tx, _frames) = mixer();
        for _ in 0..16 {
            tx.send(VoiceCommand::Start(voice(0))).unwrap();
        }
        let mut buffer = vec![0i16; 2_048];
        mixer.fill(&mut buffer, 2);
        assert!(buffer.iter().any(|s| *s != 0));
    }
}
