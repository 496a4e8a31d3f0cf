//! # Configuration Module
//!
//! Construction-time settings for the estimator, the tracker and the command
//! line front end. Stored as pretty-printed JSON; every field has a default,
//! so a partial file is enough.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::notes::NoteTable;

/// Samples kept in the analysis window (about two seconds at 48 kHz).
pub const DEFAULT_CAPTURE_WINDOW: usize = 96000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Number of most recent samples each analysis looks at.
    pub capture_window: usize,
    /// Expected input sample rate in Hz, used until the first block arrives.
    pub sample_rate: u32,
    /// Lowest note of the table, e.g. "B1".
    pub lowest_note: String,
    /// Highest note of the table, e.g. "B6".
    pub highest_note: String,
    /// Frequency of A4 in Hz.
    pub reference_pitch: f64,
    /// Samples pre-allocated for the hand-off slot. Larger blocks still work
    /// but allocate on the audio thread.
    pub block_capacity: usize,
    /// How long `shutdown` waits for the worker before detaching it.
    pub shutdown_timeout_ms: u64,
    /// How often the front end polls for a new result.
    pub poll_interval_ms: u64,
    /// Stop automatically after this many seconds.
    pub run_seconds: Option<u64>,
    /// Only report results whose note differs from the previous one.
    pub debounce_note_changes: bool,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            capture_window: DEFAULT_CAPTURE_WINDOW,
            sample_rate: 44100,
            lowest_note: "B1".into(),
            highest_note: "B6".into(),
            reference_pitch: 440.0,
            block_capacity: 4096,
            shutdown_timeout_ms: 2000,
            poll_interval_ms: 50,
            run_seconds: None,
            debounce_note_changes: true,
        }
    }
}

impl TunerConfig {
    /// Loads a configuration from a JSON file and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let config: TunerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }

    /// Rejects settings that would only fail later, at first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture_window == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        self.note_table().map(|_| ())
    }

    /// Builds the note table described by the configured range.
    pub fn note_table(&self) -> Result<NoteTable, ConfigError> {
        NoteTable::equal_tempered(&self.lowest_note, &self.highest_note, self.reference_pitch)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TunerConfig::default();
        config.validate().unwrap();
        let table = config.note_table().unwrap();
        assert_eq!(table.lowest().name, "B1");
        assert_eq!(table.highest().name, "B6");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TunerConfig =
            serde_json::from_str(r#"{ "capture_window": 8192, "lowest_note": "E2" }"#).unwrap();
        assert_eq!(config.capture_window, 8192);
        assert_eq!(config.lowest_note, "E2");
        assert_eq!(config.highest_note, "B6");
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.run_seconds, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuner.json");

        let config = TunerConfig {
            capture_window: 16384,
            reference_pitch: 442.0,
            run_seconds: Some(30),
            ..TunerConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(TunerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_rejects_misconfiguration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "capture_window": 0 }"#).unwrap();
        assert!(matches!(
            TunerConfig::load(&path),
            Err(ConfigError::ZeroCapacity)
        ));

        std::fs::write(&path, r#"{ "highest_note": "H6" }"#).unwrap();
        assert!(matches!(
            TunerConfig::load(&path),
            Err(ConfigError::InvalidNoteName(_))
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(TunerConfig::load(&path), Err(ConfigError::Json(_))));

        assert!(matches!(
            TunerConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let config = TunerConfig {
            sample_rate: 0,
            ..TunerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroSampleRate)));
    }
}
