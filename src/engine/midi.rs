//! MIDI input for Modulo.
//!
//! Raw messages are decoded by [`decode`], filtered through the sustain
//! pedal and forwarded to the engine as commands. Channels are ignored.

use anyhow::{anyhow, Result};
use midir::{MidiInput, MidiInputConnection};
use tracing::{info, trace, warn};

use super::{Command, NoteEvent, SynthHandle, NOTE_COUNT};

/// Sustain (damper) pedal controller number
pub const CC_SUSTAIN: u8 = 64;
/// Channel mode message: all notes off
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Incoming MIDI events the synth reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    /// Pedal down (`true`) or up
    Sustain(bool),
    AllNotesOff,
}

/// Decode one raw message. Anything the synth does not use yields `None`.
pub fn decode(bytes: &[u8]) -> Option<MidiEvent> {
    let (&status, data) = bytes.split_first()?;
    match status & 0xF0 {
        0x90 => {
            let (note, velocity) = (*data.first()? & 0x7F, *data.get(1)? & 0x7F);
            // Running-status keyboards send note-off as velocity 0
            if velocity == 0 {
                Some(MidiEvent::NoteOff { note })
            } else {
                Some(MidiEvent::NoteOn { note, velocity })
            }
        }
        0x80 => Some(MidiEvent::NoteOff {
            note: *data.first()? & 0x7F,
        }),
        0xB0 => {
            let (controller, value) = (*data.first()?, *data.get(1)?);
            match controller {
                CC_SUSTAIN => Some(MidiEvent::Sustain(value >= 64)),
                CC_ALL_NOTES_OFF => Some(MidiEvent::AllNotesOff),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Holds back note-offs while the pedal is down
#[derive(Debug, Clone)]
pub struct SustainPedal {
    enabled: bool,
    down: bool,
    held: [bool; NOTE_COUNT],
}

impl SustainPedal {
    /// A disabled pedal passes every event straight through
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            down: false,
            held: [false; NOTE_COUNT],
        }
    }

    pub fn is_down(&self) -> bool {
        self.down
    }

    /// Notes released while the pedal was down
    pub fn held_notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.held
            .iter()
            .enumerate()
            .filter(|(_, &h)| h)
            .map(|(n, _)| n as u8)
    }

    /// Turn an event into the commands the engine should see
    pub fn process(&mut self, event: MidiEvent) -> Vec<Command> {
        match event {
            MidiEvent::NoteOn { note, velocity } => {
                let event = Command::NoteOn(NoteEvent::new(note, velocity));
                if std::mem::take(&mut self.held[note as usize]) {
                    // Retrigger a note that is only ringing on the pedal
                    vec![Command::NoteOff(note), event]
                } else {
                    vec![event]
                }
            }
            MidiEvent::NoteOff { note } => {
                if self.enabled && self.down {
                    self.held[note as usize] = true;
                    Vec::new()
                } else {
                    vec![Command::NoteOff(note)]
                }
            }
            MidiEvent::Sustain(down) => {
                if !self.enabled {
                    return Vec::new();
                }
                self.down = down;
                if down {
                    return Vec::new();
                }
                let released: Vec<Command> = self.held_notes().map(Command::NoteOff).collect();
                self.held = [false; NOTE_COUNT];
                released
            }
            MidiEvent::AllNotesOff => {
                self.held = [false; NOTE_COUNT];
                vec![Command::AllNotesOff]
            }
        }
    }
}

/// An open MIDI input connection feeding a [`SynthHandle`]
pub struct MidiListener {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiListener {
    /// Connect to the first port whose name contains `port_name`, or to the
    /// first port available
    pub fn connect(port_name: Option<&str>, sustain_pedal: bool, handle: SynthHandle) -> Result<Self> {
        let midi_in = MidiInput::new("Modulo MIDI Input")?;
        let ports = midi_in.ports();

        if ports.is_empty() {
            return Err(anyhow!("No MIDI input ports available"));
        }

        let port = if let Some(name) = port_name {
            ports
                .iter()
                .find(|p| {
                    midi_in
                        .port_name(p)
                        .map(|n| n.contains(name))
                        .unwrap_or(false)
                })
                .ok_or_else(|| anyhow!("MIDI port '{}' not found", name))?
                .clone()
        } else {
            ports[0].clone()
        };

        let port_name_actual = midi_in.port_name(&port)?;
        let mut pedal = SustainPedal::new(sustain_pedal);

        let connection = midi_in
            .connect(
                &port,
                "modulo-input",
                move |_stamp, message, _| {
                    let Some(event) = decode(message) else {
                        return;
                    };
                    trace!(?event, "midi");
                    for command in pedal.process(event) {
                        if handle.send(command).is_err() {
                            warn!("engine stopped, dropping MIDI input");
                            return;
                        }
                    }
                },
                (),
            )
            .map_err(|e| anyhow!("failed to connect to MIDI port: {}", e))?;

        info!(port = %port_name_actual, "MIDI input connected");

        Ok(Self {
            _connection: connection,
            port_name: port_name_actual,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// List available MIDI input ports.
pub fn list_midi_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("Modulo MIDI List")?;
    let ports = midi_in.ports();

    let names: Vec<String> = ports
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect();

    Ok(names)
}
