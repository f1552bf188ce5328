//! Computer keyboard as a note source
//!
//! Terminals report key presses but not releases, so each key toggles its
//! note. Space releases everything.

use crate::engine::{Command, NoteEvent};

/// Keys in pitch order, two rows of a QWERTY keyboard
pub const KEY_LAYOUT: &str = "Q2W3ER5T6Y7UI9O0PZSXDCFVBHNJM,";

const KEY_COUNT: usize = 30;

/// Octave and transpose shifts are limited to this many semitones
pub const MAX_OFFSET: i32 = 48;

/// Toggle state of the 30 note keys
#[derive(Debug, Clone)]
pub struct Keyboard {
    base_note: u8,
    velocity: u8,
    octave: i32,
    transpose: i32,
    down: [Option<u8>; KEY_COUNT],
}

impl Keyboard {
    pub fn new(base_note: u8, velocity: u8) -> Self {
        Self {
            base_note,
            velocity: velocity.min(127),
            octave: 0,
            transpose: 0,
            down: [None; KEY_COUNT],
        }
    }

    /// Position of `key` in the layout, case-insensitive
    pub fn key_index(key: char) -> Option<usize> {
        let key = key.to_ascii_uppercase();
        KEY_LAYOUT.chars().position(|c| c == key)
    }

    /// Semitones added to every key
    pub fn offset(&self) -> i32 {
        12 * self.octave + self.transpose
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    pub fn transpose(&self) -> i32 {
        self.transpose
    }

    /// The note `key` plays at the current offset
    pub fn note_for(&self, key: char) -> Option<u8> {
        let index = Self::key_index(key)?;
        let note = self.base_note as i32 + self.offset() + index as i32;
        u8::try_from(note).ok().filter(|&n| n < 128)
    }

    pub fn is_down(&self, key: char) -> bool {
        Self::key_index(key).map_or(false, |i| self.down[i].is_some())
    }

    /// Notes currently toggled on, in key order
    pub fn held_notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.down.iter().flatten().copied()
    }

    /// Toggle the note under `key`
    pub fn press(&mut self, key: char) -> Option<Command> {
        let index = Self::key_index(key)?;
        if let Some(note) = self.down[index].take() {
            return Some(Command::NoteOff(note));
        }
        let note = self.note_for(key)?;
        self.down[index] = Some(note);
        Some(Command::NoteOn(NoteEvent::new(note, self.velocity)))
    }

    /// Release every toggled note
    pub fn release_all(&mut self) -> Command {
        self.down = [None; KEY_COUNT];
        Command::AllNotesOff
    }

    /// Shift by whole octaves. Sounding notes are released.
    pub fn shift_octave(&mut self, delta: i32) -> Command {
        self.set_offset(self.octave + delta, self.transpose)
    }

    /// Shift by semitones. Sounding notes are released.
    pub fn shift_transpose(&mut self, delta: i32) -> Command {
        self.set_offset(self.octave, self.transpose + delta)
    }

    fn set_offset(&mut self, octave: i32, transpose: i32) -> Command {
        if (12 * octave + transpose).abs() <= MAX_OFFSET {
            self.octave = octave;
            self.transpose = transpose;
        }
        self.release_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_has_thirty_keys() {
        assert_eq!(KEY_LAYOUT.chars().count(), KEY_COUNT);
        assert_eq!(Keyboard::key_index('q'), Some(0));
        assert_eq!(Keyboard::key_index(','), Some(29));
        assert_eq!(Keyboard::key_index('A'), None);
    }

    #[test]
    fn test_keys_map_from_base_note() {
        let kb = Keyboard::new(48, 100);
        assert_eq!(kb.note_for('Q'), Some(48));
        assert_eq!(kb.note_for('2'), Some(49));
        assert_eq!(kb.note_for('I'), Some(48 + 12));
        assert_eq!(kb.note_for('Z'), Some(48 + 17));
    }

    #[test]
    fn test_press_toggles() {
        let mut kb = Keyboard::new(48, 100);
        assert_eq!(
            kb.press('q'),
            Some(Command::NoteOn(NoteEvent::new(48, 100)))
        );
        assert_eq!(kb.held_notes().collect::<Vec<_>>(), vec![48]);
        assert!(kb.is_down('q'));
        assert_eq!(kb.press('Q'), Some(Command::NoteOff(48)));
        assert_eq!(kb.held_notes().count(), 0);
        assert_eq!(kb.press('a'), None);
    }

    #[test]
    fn test_release_all() {
        let mut kb = Keyboard::new(48, 100);
        kb.press('q');
        kb.press('w');
        assert_eq!(kb.release_all(), Command::AllNotesOff);
        assert_eq!(kb.held_notes().count(), 0);
    }

    #[test]
    fn test_octave_shift_releases_and_moves() {
        let mut kb = Keyboard::new(48, 100);
        kb.press('q');
        assert_eq!(kb.shift_octave(1), Command::AllNotesOff);
        assert_eq!(kb.held_notes().count(), 0);
        assert_eq!(kb.note_for('q'), Some(60));
        kb.shift_transpose(-2);
        assert_eq!(kb.note_for('q'), Some(58));
    }

    #[test]
    fn test_offset_is_bounded() {
        let mut kb = Keyboard::new(48, 100);
        for _ in 0..10 {
            kb.shift_octave(-1);
        }
        assert_eq!(kb.offset(), -48);
        assert_eq!(kb.note_for('q'), Some(0));
    }

    #[test]
    fn test_notes_above_range_are_skipped() {
        let mut kb = Keyboard::new(98, 100);
        kb.shift_octave(1);
        assert_eq!(kb.note_for('q'), Some(110));
        assert_eq!(kb.note_for(','), None);
        assert_eq!(kb.press(','), None);
    }
}
