//! Modulo - polyphonic subtractive synthesizer

use anyhow::{bail, Context, Result};
use clap::Parser;
use modulo::config::{self, ModuloConfig, EXAMPLE_CONFIG};
use modulo::engine::{list_midi_ports, list_output_devices, Engine, MidiListener, Player, Recorder};
use modulo::preset::PresetManager;
use modulo::viz::{self, Keyboard, VizState};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands};

const DEFAULT_CONFIG: &str = "modulo.yaml";

/// Frames kept for the scope
const SCOPE_FRAMES: usize = 4096;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The terminal UI owns the screen, so keep routine logs out of it
    let quiet = matches!(cli.command, Commands::Play { headless: false, .. });
    init_logging(if quiet { "warn" } else { "info" });

    match cli.command {
        Commands::Play {
            config: config_path,
            device,
            no_midi,
            headless,
        } => play(config_path, device, no_midi, headless)?,

        Commands::Record {
            config: config_path,
            output,
            notes,
            velocity,
            hold,
            duration,
        } => record(config_path, &output, &notes, velocity, hold, duration)?,

        Commands::Devices => {
            println!("Audio output devices:");
            let devices = list_output_devices();
            if devices.is_empty() {
                println!("  (none)");
            }
            for (name, config) in devices {
                println!(
                    "  - {} ({} Hz, {} ch)",
                    name, config.sample_rate.0, config.channels
                );
            }

            println!("\nMIDI input ports:");
            match list_midi_ports() {
                Ok(ports) if ports.is_empty() => println!("  (none)"),
                Ok(ports) => {
                    for port in ports {
                        println!("  - {}", port);
                    }
                }
                Err(e) => println!("  Error listing ports: {}", e),
            }
        }

        Commands::Check { config: config_path } => {
            println!("Checking configuration at {:?}...", config_path);

            match config::load_config(&config_path) {
                Ok(cfg) => {
                    println!("Configuration is valid!");
                    print_summary(&cfg);
                }
                Err(e) => {
                    println!("Configuration is invalid: {:#}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Init => {
            if Path::new(DEFAULT_CONFIG).exists() {
                println!("{} already exists. Not overwriting.", DEFAULT_CONFIG);
            } else {
                std::fs::write(DEFAULT_CONFIG, EXAMPLE_CONFIG)?;
                println!("Created {} with example configuration.", DEFAULT_CONFIG);
            }
        }

        Commands::Presets { file, show } => {
            let mut presets = PresetManager::new();
            if let Some(path) = file {
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read preset file: {:?}", path))?;
                presets.import_json(&json)?;
            }

            match show {
                Some(name) => {
                    presets.set_preset(&name)?;
                    let names = [name.as_str()];
                    println!("{}", presets.export_json(Some(&names[..]))?);
                }
                None => {
                    for name in presets.preset_names() {
                        println!("{}", name);
                    }
                }
            }
        }
    }

    Ok(())
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// An explicit path must load; otherwise `modulo.yaml` is used if present
fn resolve_config(path: Option<PathBuf>) -> Result<ModuloConfig> {
    match path {
        Some(path) => config::load_config(&path),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG)),
        None => {
            info!("no {} found, using defaults", DEFAULT_CONFIG);
            Ok(ModuloConfig::default())
        }
    }
}

fn print_summary(cfg: &ModuloConfig) {
    let patch = cfg.patch();
    println!("  Sample rate: {} Hz", cfg.audio.sample_rate);
    println!("  Block size: {}", cfg.audio.block_size);
    println!("  Master volume: {:.0}%", cfg.master.volume * 100.0);
    println!("  Voices: {}", cfg.voices.max_voices);
    println!(
        "  Teardown: below {} or {}s past release (max {}s)",
        cfg.voices.teardown_threshold, cfg.voices.teardown_grace, cfg.voices.teardown_timeout
    );
    println!(
        "  MIDI: {}",
        if cfg.midi.enabled { "enabled" } else { "disabled" }
    );
    println!("  Keyboard base note: {}", cfg.keyboard.base_note);
    if let Some(waveform) = patch.oscillator.waveform {
        println!("  Oscillator: {:?}", waveform);
    }
    if let (Some(kind), Some(cutoff)) = (patch.filter.filter_type, patch.filter.cutoff) {
        println!("  Filter: {:?} at {} Hz", kind, cutoff);
    }
}

fn play(
    config_path: Option<PathBuf>,
    device: Option<String>,
    no_midi: bool,
    headless: bool,
) -> Result<()> {
    let cfg = resolve_config(config_path)?;

    let device_name = device.or_else(|| cfg.audio.device.clone());
    let output = Player::open_device(device_name.as_deref())?;
    let sample_rate = Player::device_sample_rate(&output)?;
    if sample_rate != cfg.audio.sample_rate {
        info!(
            configured = cfg.audio.sample_rate,
            device = sample_rate,
            "using the device sample rate"
        );
    }

    let (engine, handle) = Engine::new(&cfg, sample_rate);
    let keyboard = Keyboard::new(cfg.keyboard.base_note, cfg.keyboard.velocity);
    let mut state = VizState::new(handle.clone(), keyboard, SCOPE_FRAMES);

    let _midi = if cfg.midi.enabled && !no_midi {
        match MidiListener::connect(cfg.midi.port.as_deref(), cfg.midi.sustain_pedal, handle.clone()) {
            Ok(listener) => {
                state.midi_port = Some(listener.port_name().to_string());
                Some(listener)
            }
            Err(e) => {
                warn!("MIDI input unavailable: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    if headless && state.midi_port.is_none() {
        bail!("headless mode needs a MIDI input port");
    }

    let running = state.running.clone();
    ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;

    let mut player = Player::new();
    player.start(&output, engine, Some(state.sample_buffer.clone()))?;

    if headless {
        println!("Playing from {}. Press Ctrl-C to stop.", state.midi_port.as_deref().unwrap_or("MIDI"));
        while state.is_running() {
            std::thread::sleep(Duration::from_millis(100));
        }
    } else {
        viz::run_viz(&mut state)?;
    }

    // Let released voices fade before the stream goes away
    let _ = handle.all_notes_off();
    std::thread::sleep(Duration::from_millis(300));
    player.stop();
    Ok(())
}

fn record(
    config_path: Option<PathBuf>,
    output: &Path,
    notes: &[u8],
    velocity: u8,
    hold: f64,
    duration: f64,
) -> Result<()> {
    if !(duration > 0.0) {
        bail!("Duration must be positive");
    }
    if let Some(&note) = notes.iter().find(|&&n| n > 127) {
        bail!("Note {} is out of range (0-127)", note);
    }

    let cfg = resolve_config(config_path)?;
    let sample_rate = cfg.audio.sample_rate;
    println!(
        "Recording {:.1} seconds of notes {:?} to {:?}...",
        duration, notes, output
    );

    let (mut engine, handle) = Engine::new(&cfg, sample_rate);
    for &note in notes {
        handle.note_on(note, velocity.min(127))?;
    }

    let total_frames = (duration * sample_rate as f64) as u64;
    let release_frame = (hold.max(0.0) * sample_rate as f64) as u64;
    let mut recorder = Recorder::new(output, sample_rate)?;

    for frame in 0..total_frames {
        if frame == release_frame {
            for &note in notes {
                handle.note_off(note)?;
            }
        }
        recorder.write_frame(engine.process())?;

        // Progress update every second
        if frame % sample_rate as u64 == 0 {
            print!(
                "\r  Progress: {}s / {:.0}s",
                frame / sample_rate as u64,
                duration
            );
            std::io::stdout().flush()?;
        }
    }

    recorder.finalize()?;
    println!("\nRecorded to {:?}", output);
    Ok(())
}
