//! # Musical Tuning Module
//!
//! Equal-temperament note tables and cent calculations. A [`NoteTable`] is
//! built once from a configured range and handed to the estimator; it is
//! never mutated afterwards.
//!
//! ## Features
//! - Note name parsing ("A4", "C#3", "Bb2")
//! - 12-TET frequencies relative to a configurable A4 reference
//! - Cent deviation calculations
//! - Autocorrelation lag bounds for the table's frequency span

use std::ops::RangeInclusive;

use serde::Serialize;

use crate::error::ConfigError;

/// Note names within one octave, starting at C where the octave number changes.
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// MIDI number of A4, the tuning reference.
const A4_MIDI: i32 = 69;

/// Represents a single musical note with its name and frequency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    /// Note name (e.g., "A4", "C#3")
    pub name: String,
    /// Frequency in Hz
    pub frequency: f64,
}

/// Parses a note name into its distance from A4 in semitones.
///
/// Accepts a letter `A`-`G` (either case), an optional `#` or `b`, and an
/// octave number, e.g. `"A4"` -> 0, `"C4"` -> -9, `"Bb2"` -> -23.
pub fn parse_note_name(name: &str) -> Result<i32, ConfigError> {
    let invalid = || ConfigError::InvalidNoteName(name.to_string());

    let mut chars = name.chars();
    let pitch_class = match chars.next().map(|c| c.to_ascii_uppercase()) {
        Some('C') => 0,
        Some('D') => 2,
        Some('E') => 4,
        Some('F') => 5,
        Some('G') => 7,
        Some('A') => 9,
        Some('B') => 11,
        _ => return Err(invalid()),
    };

    let rest = chars.as_str();
    let (accidental, octave) = if let Some(octave) = rest.strip_prefix('#') {
        (1, octave)
    } else if let Some(octave) = rest.strip_prefix('b') {
        (-1, octave)
    } else {
        (0, rest)
    };

    let octave: i32 = octave.parse().map_err(|_| invalid())?;
    let midi = 12 * (octave + 1) + pitch_class + accidental;
    Ok(midi - A4_MIDI)
}

/// Name of the note `semitones` away from A4, using sharps.
pub fn note_name(semitones: i32) -> String {
    let midi = A4_MIDI + semitones;
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", NOTE_NAMES[midi.rem_euclid(12) as usize], octave)
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat. Not finite when either
/// frequency is zero, negative or not finite.
pub fn cents_between(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

/// Ordered table of notes, ascending by frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTable {
    notes: Vec<Note>,
}

impl NoteTable {
    /// Builds a table from arbitrary notes, sorted ascending by frequency.
    ///
    /// # Errors
    /// * `ConfigError::EmptyNoteTable` if `notes` is empty
    /// * `ConfigError::InvalidFrequency` if any frequency is not a positive finite number
    pub fn from_notes(mut notes: Vec<Note>) -> Result<Self, ConfigError> {
        if notes.is_empty() {
            return Err(ConfigError::EmptyNoteTable);
        }
        if let Some(bad) = notes
            .iter()
            .find(|note| !(note.frequency.is_finite() && note.frequency > 0.0))
        {
            return Err(ConfigError::InvalidFrequency {
                name: bad.name.clone(),
                frequency: bad.frequency,
            });
        }
        notes.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
        Ok(Self { notes })
    }

    /// Builds every equal-tempered note from `lowest` to `highest`, inclusive.
    ///
    /// The formula for frequency in equal temperament is `f = f0 * 2^(n/12)`,
    /// with `f0` the A4 reference and `n` the semitones away from A4.
    pub fn equal_tempered(
        lowest: &str,
        highest: &str,
        reference_pitch: f64,
    ) -> Result<Self, ConfigError> {
        let low = parse_note_name(lowest)?;
        let high = parse_note_name(highest)?;
        if low > high {
            return Err(ConfigError::InvertedRange {
                lowest: lowest.to_string(),
                highest: highest.to_string(),
            });
        }

        let notes = (low..=high)
            .map(|n| Note {
                name: note_name(n),
                frequency: reference_pitch * 2.0_f64.powf(n as f64 / 12.0),
            })
            .collect();
        Self::from_notes(notes)
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn lowest(&self) -> &Note {
        &self.notes[0]
    }

    pub fn highest(&self) -> &Note {
        &self.notes[self.notes.len() - 1]
    }

    /// Finds the note closest to `freq` in cents, with the signed deviation.
    ///
    /// `None` when `freq` has no meaningful distance to any note (zero,
    /// negative or not finite).
    pub fn nearest(&self, freq: f64) -> Option<(&Note, f64)> {
        self.notes
            .iter()
            .map(|note| (note, cents_between(freq, note.frequency)))
            .filter(|(_, cents)| cents.is_finite())
            .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
    }

    /// Autocorrelation lags covering the table's frequency span.
    ///
    /// The shortest lag belongs to the highest note and the longest to the
    /// lowest. Both are clamped into `[0, fft_size)`; a bound that is not
    /// finite falls back to the matching end of that interval. Returns `None`
    /// when nothing is left to search.
    pub fn lag_range(&self, sample_rate: u32, fft_size: usize) -> Option<RangeInclusive<usize>> {
        if fft_size == 0 {
            return None;
        }
        let rate = sample_rate as f64;
        let last = fft_size - 1;

        let to_lag = |freq: f64| {
            let lag = (rate / freq).round();
            (lag.is_finite() && lag >= 0.0 && lag < fft_size as f64).then_some(lag as usize)
        };
        let low = to_lag(self.highest().frequency).unwrap_or(0);
        let high = to_lag(self.lowest().frequency).unwrap_or(last);

        (low <= high).then_some(low..=high)
    }
}
