//! Audio engine for Modulo
//!
//! The [`Engine`] lives on the render thread and owns the voice controller.
//! Everything else talks to it through a [`SynthHandle`], which only queues
//! commands. Queued commands take effect at the next block boundary.

mod controller;
mod midi;
mod player;
mod recorder;
mod voice;

pub use controller::{
    note_to_frequency, NoteEvent, Portamento, TeardownPolicy, VoiceController, NOTE_COUNT,
};
pub use midi::{decode, list_midi_ports, MidiEvent, MidiListener, SustainPedal, CC_ALL_NOTES_OFF, CC_SUSTAIN};
pub use player::{default_device_name, list_output_devices, Player};
pub use recorder::Recorder;
pub use voice::{ModuleSet, Voice, VoiceState};

use crate::config::ModuloConfig;
use crate::error::{SynthError, SynthResult};
use crate::params::ParamContainer;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use tracing::{trace, warn};

/// Requests queued for the render thread
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NoteOn(NoteEvent),
    NoteOff(u8),
    AllNotesOff,
    SetParams(ParamContainer),
    SetPortamento(Portamento),
    SetVolume(f32),
}

/// Counters published by the render thread once per block
#[derive(Debug, Default)]
pub struct EngineStatus {
    sounding: AtomicUsize,
    releasing: AtomicUsize,
    frames: AtomicU64,
}

impl EngineStatus {
    /// Voices held by a note
    pub fn sounding(&self) -> usize {
        self.sounding.load(Ordering::Relaxed)
    }

    /// Released voices still fading out
    pub fn releasing(&self) -> usize {
        self.releasing.load(Ordering::Relaxed)
    }

    /// Frames rendered so far
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

/// Control-side handle to a running engine
#[derive(Debug, Clone)]
pub struct SynthHandle {
    commands: Sender<Command>,
    status: Arc<EngineStatus>,
}

impl SynthHandle {
    pub fn send(&self, command: Command) -> SynthResult<()> {
        self.commands
            .send(command)
            .map_err(|_| SynthError::EngineDisconnected)
    }

    pub fn note_on(&self, note: u8, velocity: u8) -> SynthResult<()> {
        self.send(Command::NoteOn(NoteEvent::new(note, velocity)))
    }

    pub fn note_on_event(&self, event: NoteEvent) -> SynthResult<()> {
        self.send(Command::NoteOn(event))
    }

    pub fn note_off(&self, note: u8) -> SynthResult<()> {
        self.send(Command::NoteOff(note))
    }

    pub fn all_notes_off(&self) -> SynthResult<()> {
        self.send(Command::AllNotesOff)
    }

    /// Update the patch. Fields absent from `container` are left unchanged.
    pub fn set_params(&self, container: ParamContainer) -> SynthResult<()> {
        self.send(Command::SetParams(container))
    }

    pub fn set_portamento(&self, on: bool, time: f64) -> SynthResult<()> {
        self.send(Command::SetPortamento(Portamento { on, time }))
    }

    pub fn set_volume(&self, volume: f32) -> SynthResult<()> {
        self.send(Command::SetVolume(volume))
    }

    pub fn status(&self) -> &Arc<EngineStatus> {
        &self.status
    }
}

/// The render-thread engine
pub struct Engine {
    controller: VoiceController,
    commands: Receiver<Command>,
    status: Arc<EngineStatus>,
    sample_rate: f64,
    block_size: u64,
    frame: u64,
    volume: f64,
}

impl Engine {
    /// Create an engine and the handle that controls it. The configured
    /// patch is loaded into the templates before the first block.
    pub fn new(config: &ModuloConfig, sample_rate: u32) -> (Self, SynthHandle) {
        let sample_rate = sample_rate as f64;
        let mut controller = VoiceController::new(
            sample_rate,
            config.voices.max_voices,
            config.voices.teardown_policy(),
        );
        for container in config.patch().containers() {
            controller.set_params(&container, 0.0);
        }

        let (tx, rx) = mpsc::channel();
        let status = Arc::new(EngineStatus::default());
        let engine = Self {
            controller,
            commands: rx,
            status: Arc::clone(&status),
            sample_rate,
            block_size: config.audio.block_size.max(1) as u64,
            frame: 0,
            volume: config.master.volume.clamp(0.0, 1.0) as f64,
        };
        let handle = SynthHandle {
            commands: tx,
            status,
        };
        (engine, handle)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current time of the sample clock in seconds
    pub fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn controller(&self) -> &VoiceController {
        &self.controller
    }

    pub fn status(&self) -> &Arc<EngineStatus> {
        &self.status
    }

    /// Generate the next stereo frame
    pub fn process(&mut self) -> [f64; 2] {
        if self.frame % self.block_size == 0 {
            self.begin_block();
        }
        let time = self.now();
        let [l, r] = self.controller.render(time);
        self.frame += 1;
        [l * self.volume, r * self.volume]
    }

    /// Fill an interleaved buffer. Mono output gets the average of both
    /// sides; extra channels repeat the left/right pair.
    pub fn fill_buffer(&mut self, buffer: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in buffer.chunks_mut(channels) {
            let [l, r] = self.process();
            if channels == 1 {
                frame[0] = ((l + r) * 0.5) as f32;
                continue;
            }
            for (i, sample) in frame.iter_mut().enumerate() {
                *sample = if i % 2 == 0 { l as f32 } else { r as f32 };
            }
        }
    }

    /// Drain queued commands, then free finished voices
    fn begin_block(&mut self) {
        let now = self.now();
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.execute(command, now),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.controller.collect(now);

        self.status
            .sounding
            .store(self.controller.sounding_count(), Ordering::Relaxed);
        self.status
            .releasing
            .store(self.controller.releasing_count(), Ordering::Relaxed);
        self.status.frames.store(self.frame, Ordering::Relaxed);
    }

    fn execute(&mut self, command: Command, now: f64) {
        match command {
            Command::NoteOn(event) => {
                if event.note as usize >= NOTE_COUNT {
                    warn!(note = event.note, "note out of range, ignored");
                    return;
                }
                self.controller.note_on(event, now);
            }
            Command::NoteOff(note) => {
                self.controller.note_off(note, now);
            }
            Command::AllNotesOff => self.controller.all_notes_off(now),
            Command::SetParams(container) => self.controller.set_params(&container, now),
            Command::SetPortamento(p) => self.controller.set_portamento(p.on, p.time),
            Command::SetVolume(volume) => {
                trace!(volume, "master volume");
                self.volume = volume.clamp(0.0, 1.0) as f64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::FilterParams;

    fn test_config() -> ModuloConfig {
        let mut config = ModuloConfig::default();
        config.audio.sample_rate = 44100;
        config.audio.block_size = 64;
        config.voices.max_voices = 4;
        config.master.volume = 1.0;
        config
    }

    fn peak(engine: &mut Engine, frames: usize) -> f64 {
        (0..frames)
            .map(|_| {
                let [l, r] = engine.process();
                l.abs().max(r.abs())
            })
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_engine_creation() {
        let (engine, handle) = Engine::new(&test_config(), 44100);
        assert_eq!(engine.sample_rate(), 44100.0);
        assert_eq!(engine.now(), 0.0);
        assert_eq!(handle.status().sounding(), 0);
        assert_eq!(engine.controller().max_voices(), 4);
    }

    #[test]
    fn test_silent_without_notes() {
        let (mut engine, _handle) = Engine::new(&test_config(), 44100);
        assert_eq!(peak(&mut engine, 1000), 0.0);
    }

    #[test]
    fn test_note_on_through_handle() {
        let (mut engine, handle) = Engine::new(&test_config(), 44100);
        handle.note_on(69, 127).unwrap();
        assert!(peak(&mut engine, 2000) > 0.0);
        assert!(engine.controller().has_voice(69));
        assert_eq!(handle.status().sounding(), 1);
    }

    #[test]
    fn test_commands_wait_for_block_boundary() {
        let (mut engine, handle) = Engine::new(&test_config(), 44100);
        engine.process();
        handle.note_on(60, 100).unwrap();
        for _ in 0..62 {
            engine.process();
        }
        assert!(!engine.controller().has_voice(60));
        engine.process();
        engine.process();
        assert!(engine.controller().has_voice(60));
    }

    #[test]
    fn test_note_off_frees_voice() {
        let (mut engine, handle) = Engine::new(&test_config(), 44100);
        handle.note_on(60, 100).unwrap();
        peak(&mut engine, 4410);
        handle.note_off(60).unwrap();
        // Default release is near zero; the voice is gone after a few blocks
        peak(&mut engine, 4410);
        assert_eq!(engine.controller().active_count(), 0);
        assert_eq!(handle.status().releasing(), 0);
    }

    #[test]
    fn test_patch_from_config() {
        let mut config = test_config();
        let mut patch = crate::params::Patch::default();
        patch.filter = FilterParams {
            cutoff: Some(500.0),
            ..Default::default()
        };
        config.patch = Some(patch);
        let (engine, _handle) = Engine::new(&config, 44100);
        assert_eq!(engine.controller().templates().filter.cutoff(), 500.0);
    }

    #[test]
    fn test_set_volume() {
        let (mut engine, handle) = Engine::new(&test_config(), 44100);
        handle.set_volume(0.0).unwrap();
        handle.note_on(69, 127).unwrap();
        assert_eq!(peak(&mut engine, 1000), 0.0);
        assert_eq!(engine.volume(), 0.0);
    }

    #[test]
    fn test_fill_buffer_stereo() {
        let (mut engine, handle) = Engine::new(&test_config(), 44100);
        handle.note_on(69, 127).unwrap();
        let mut buffer = vec![0.0f32; 1024];
        engine.fill_buffer(&mut buffer, 2);
        assert!(buffer.iter().any(|s| s.abs() > 0.0));
        assert_eq!(engine.status().frames(), 448);
    }

    #[test]
    fn test_handle_reports_disconnect() {
        let (engine, handle) = Engine::new(&test_config(), 44100);
        drop(engine);
        assert!(matches!(
            handle.note_on(60, 100),
            Err(SynthError::EngineDisconnected)
        ));
    }
}
