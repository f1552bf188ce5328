//! CLI interface for Modulo

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Polyphonic subtractive synthesizer for the terminal
#[derive(Parser)]
#[command(name = "modulo")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play live from the computer keyboard and MIDI input
    Play {
        /// Configuration file path (default: modulo.yaml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output device name, overrides the configuration
        #[arg(short, long)]
        device: Option<String>,

        /// Do not open a MIDI input port
        #[arg(long)]
        no_midi: bool,

        /// No terminal UI; play from MIDI until Ctrl-C
        #[arg(long)]
        headless: bool,
    },

    /// Render held notes to a stereo WAV file
    Record {
        /// Configuration file path (default: modulo.yaml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// MIDI notes to play together
        #[arg(short, long, value_delimiter = ',', default_value = "60,64,67")]
        notes: Vec<u8>,

        /// Velocity of every note (0-127)
        #[arg(short, long, default_value = "100")]
        velocity: u8,

        /// Seconds before the notes are released
        #[arg(long, default_value = "2.0")]
        hold: f64,

        /// Total length in seconds
        #[arg(short = 't', long, default_value = "4.0")]
        duration: f64,
    },

    /// List audio output devices and MIDI input ports
    Devices,

    /// Validate a configuration file
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "modulo.yaml")]
        config: PathBuf,
    },

    /// Generate an example configuration file
    Init,

    /// List presets, optionally loaded from an exported JSON file
    Presets {
        /// Preset JSON file to import
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print the named preset as JSON
        #[arg(short, long)]
        show: Option<String>,
    },
}
