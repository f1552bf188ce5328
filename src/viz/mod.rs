//! Terminal front end for Modulo
//!
//! Shows a read-only scope of the output, the keyboard state and the voice
//! counts, and turns key presses into notes:
//! - note keys `Q2W3ER5T6Y7UI9O0PZSXDCFVBHNJM,` toggle their note
//! - Space releases all notes
//! - Up/Down shift by an octave, Left/Right transpose by a semitone
//! - Esc or Ctrl-C quits

mod keyboard;
mod scope;

pub use keyboard::{Keyboard, KEY_LAYOUT, MAX_OFFSET};
pub use scope::Scope;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use tracing::warn;

use crate::engine::{Command, EngineStatus, SynthHandle};

/// Ring buffer of recent output samples, filled by the audio callback
pub struct SampleBuffer {
    samples: Vec<f32>,
    capacity: usize,
    write_pos: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: vec![0.0; capacity],
            capacity,
            write_pos: 0,
        }
    }

    /// Push a new sample into the buffer
    pub fn push(&mut self, sample: f32) {
        self.samples[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    /// Copy the most recent `count` samples, oldest first, into `out`
    pub fn copy_recent(&self, count: usize, out: &mut Vec<f32>) {
        let count = count.min(self.capacity);
        out.clear();
        let start = (self.write_pos + self.capacity - count) % self.capacity;
        out.extend((0..count).map(|i| self.samples[(start + i) % self.capacity]));
    }
}

/// Everything the terminal front end needs from the rest of the program
pub struct VizState {
    pub handle: SynthHandle,
    pub keyboard: Keyboard,
    pub sample_buffer: Arc<Mutex<SampleBuffer>>,
    pub running: Arc<AtomicBool>,
    pub midi_port: Option<String>,
    scratch: Vec<f32>,
}

impl VizState {
    pub fn new(handle: SynthHandle, keyboard: Keyboard, buffer_size: usize) -> Self {
        Self {
            handle,
            keyboard,
            sample_buffer: Arc::new(Mutex::new(SampleBuffer::new(buffer_size))),
            running: Arc::new(AtomicBool::new(true)),
            midi_port: None,
            scratch: Vec::with_capacity(buffer_size),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// React to one key. Returns false once the user asked to quit.
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        let command = match (code, modifiers) {
            (KeyCode::Esc, _) => return false,
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => return false,
            (KeyCode::Char(' '), _) => Some(self.keyboard.release_all()),
            (KeyCode::Up, _) => Some(self.keyboard.shift_octave(1)),
            (KeyCode::Down, _) => Some(self.keyboard.shift_octave(-1)),
            (KeyCode::Right, _) => Some(self.keyboard.shift_transpose(1)),
            (KeyCode::Left, _) => Some(self.keyboard.shift_transpose(-1)),
            (KeyCode::Char(c), _) => self.keyboard.press(c),
            _ => None,
        };
        if let Some(command) = command {
            self.send(command);
        }
        true
    }

    fn send(&self, command: Command) {
        if self.handle.send(command).is_err() {
            warn!("audio engine stopped");
            self.stop();
        }
    }
}

/// Run the terminal front end until the user quits
pub fn run_viz(state: &mut VizState) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, state);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    // Leave nothing hanging once the front end is gone
    let _ = state.handle.all_notes_off();
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut VizState,
) -> Result<()> {
    while state.is_running() {
        terminal.draw(|f| draw_ui(f, state))?;

        if event::poll(Duration::from_millis(30))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if !state.handle_key(key.code, key.modifiers) {
                    state.stop();
                }
            }
        }
    }
    Ok(())
}

fn draw_ui(f: &mut Frame, state: &mut VizState) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),    // Scope
            Constraint::Length(3), // Keyboard
            Constraint::Length(3), // Status
        ])
        .split(area);

    draw_scope(f, chunks[0], state);
    draw_keyboard(f, chunks[1], &state.keyboard);
    draw_status(f, chunks[2], state);
}

fn draw_scope(f: &mut Frame, area: Rect, state: &mut VizState) {
    let want = area.width as usize * 4;
    if let Ok(buffer) = state.sample_buffer.lock() {
        buffer.copy_recent(want, &mut state.scratch);
    }

    let scope = Scope::new(&state.scratch)
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).title(" Output "));

    f.render_widget(scope, area);
}

fn draw_keyboard(f: &mut Frame, area: Rect, keyboard: &Keyboard) {
    let spans: Vec<Span> = KEY_LAYOUT
        .chars()
        .map(|key| {
            let style = if keyboard.is_down(key) {
                Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Span::styled(format!(" {} ", key), style)
        })
        .collect();

    let title = format!(
        " Keys  octave {:+}  transpose {:+} ",
        keyboard.octave(),
        keyboard.transpose()
    );
    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(title));

    f.render_widget(paragraph, area);
}

fn draw_status(f: &mut Frame, area: Rect, state: &VizState) {
    let status: &EngineStatus = state.handle.status();
    let midi = state.midi_port.as_deref().unwrap_or("none");

    let text = Line::from(vec![
        Span::raw("  Voices: "),
        Span::styled(
            status.sounding().to_string(),
            Style::default().fg(Color::Green),
        ),
        Span::raw(" held, "),
        Span::styled(
            status.releasing().to_string(),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(" releasing  |  MIDI: "),
        Span::raw(midi),
        Span::raw("  |  Space: release all  Arrows: shift  Esc: quit"),
    ]);

    let paragraph = Paragraph::new(text).block(Block::default().borders(Borders::ALL));

    f.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuloConfig;
    use crate::engine::Engine;

    fn test_state() -> (Engine, VizState) {
        let (engine, handle) = Engine::new(&ModuloConfig::default(), 44100);
        (engine, VizState::new(handle, Keyboard::new(48, 100), 64))
    }

    #[test]
    fn test_sample_buffer_recent_in_order() {
        let mut buffer = SampleBuffer::new(5);
        buffer.push(1.0);
        buffer.push(2.0);
        buffer.push(3.0);

        let mut out = Vec::new();
        buffer.copy_recent(5, &mut out);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 2.0, 3.0]);
        buffer.copy_recent(2, &mut out);
        assert_eq!(out, vec![2.0, 3.0]);
    }

    #[test]
    fn test_sample_buffer_wrap() {
        let mut buffer = SampleBuffer::new(3);
        for s in [1.0, 2.0, 3.0, 4.0] {
            buffer.push(s);
        }

        let mut out = Vec::new();
        buffer.copy_recent(10, &mut out);
        assert_eq!(out, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_viz_state_running() {
        let (_engine, state) = test_state();
        assert!(state.is_running());
        state.stop();
        assert!(!state.is_running());
    }

    #[test]
    fn test_note_keys_reach_engine() {
        let (mut engine, mut state) = test_state();
        assert!(state.handle_key(KeyCode::Char('q'), KeyModifiers::NONE));
        engine.process();
        assert!(engine.controller().has_voice(48));

        state.handle_key(KeyCode::Char(' '), KeyModifiers::NONE);
        engine.process();
        for _ in 0..256 {
            engine.process();
        }
        assert!(!engine.controller().has_voice(48));
        assert_eq!(state.keyboard.held_notes().count(), 0);
    }

    #[test]
    fn test_quit_keys() {
        let (_engine, mut state) = test_state();
        assert!(!state.handle_key(KeyCode::Esc, KeyModifiers::NONE));
        assert!(!state.handle_key(KeyCode::Char('c'), KeyModifiers::CONTROL));
    }

    #[test]
    fn test_stops_when_engine_gone() {
        let (engine, mut state) = test_state();
        drop(engine);
        state.handle_key(KeyCode::Char('w'), KeyModifiers::NONE);
        assert!(!state.is_running());
    }
}
