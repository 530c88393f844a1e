//! Configuration system for the transcriber

use crate::error::{Result, TranscribeError};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub stft: StftConfig,
    pub pitch: PitchConfig,
    pub notes: NoteConfig,
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            stft: StftConfig::default(),
            pitch: PitchConfig::default(),
            notes: NoteConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// Analysis window shape applied before the FFT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Hann,
    Rectangular,
}

/// STFT framing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StftConfig {
    /// Window size in samples
    pub frame_size: usize,
    /// Hop between frame starts in samples
    pub hop_size: usize,
    pub window: WindowKind,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
            window: WindowKind::Hann,
        }
    }
}

/// Per-frame candidate selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PitchMethod {
    /// Strongest bin in the band
    Peak,
    /// Harmonic product spectrum
    Hps,
}

/// Pitch estimation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub min_frequency_hz: f32,
    /// Upper edge of the plausible band; `None` means Nyquist
    pub max_frequency_hz: Option<f32>,
    pub method: PitchMethod,
    /// Number of spectrum copies multiplied together by `Hps`
    pub harmonics: usize,
    /// Candidates at or below this magnitude count as unvoiced
    pub min_salience: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            min_frequency_hz: 20.0,
            max_frequency_hz: None,
            method: PitchMethod::Peak,
            harmonics: 3,
            min_salience: 0.0,
        }
    }
}

/// How observations are grouped into note events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Segmentation {
    /// One short note per voiced frame
    #[value(name = "per_frame", alias = "per-frame")]
    PerFrame,
    /// Consecutive same-note frames merge into one note
    Sustain,
}

/// Note synthesis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteConfig {
    pub duration_seconds: f64,
    pub velocity: u8,
    pub segmentation: Segmentation,
}

impl Default for NoteConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 0.1,
            velocity: 100,
            segmentation: Segmentation::PerFrame,
        }
    }
}

/// MIDI export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub ticks_per_quarter_note: u16,
    pub tempo_us_per_quarter_note: u32,
    /// General MIDI program, 0 = acoustic grand piano
    pub program: u8,
    pub channel: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ticks_per_quarter_note: 480,
            tempo_us_per_quarter_note: 500_000,
            program: 0,
            channel: 0,
        }
    }
}

impl ExportConfig {
    /// MIDI ticks per second at the configured tempo and resolution
    pub fn ticks_per_second(&self) -> f64 {
        self.ticks_per_quarter_note as f64 * 1_000_000.0 / self.tempo_us_per_quarter_note as f64
    }
}

fn unsupported(msg: impl Into<String>) -> TranscribeError {
    TranscribeError::UnsupportedParameters(msg.into())
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> Result<()> {
    let stft = &config.stft;
    if stft.frame_size == 0 {
        return Err(unsupported("frame_size must be > 0"));
    }
    if stft.hop_size == 0 {
        return Err(unsupported("hop_size must be > 0"));
    }
    if stft.hop_size > stft.frame_size {
        return Err(unsupported(format!(
            "hop_size ({}) must not exceed frame_size ({})",
            stft.hop_size, stft.frame_size
        )));
    }

    let pitch = &config.pitch;
    if !pitch.min_frequency_hz.is_finite() || pitch.min_frequency_hz < 0.0 {
        return Err(unsupported("min_frequency_hz must be a finite value >= 0"));
    }
    if let Some(max) = pitch.max_frequency_hz {
        if !(max > pitch.min_frequency_hz) {
            return Err(unsupported(format!(
                "max_frequency_hz ({}) must be greater than min_frequency_hz ({})",
                max, pitch.min_frequency_hz
            )));
        }
    }
    if pitch.method == PitchMethod::Hps && pitch.harmonics == 0 {
        return Err(unsupported("hps needs at least one harmonic"));
    }
    if !pitch.min_salience.is_finite() || pitch.min_salience < 0.0 {
        return Err(unsupported("min_salience must be a finite value >= 0"));
    }

    let notes = &config.notes;
    if !(notes.duration_seconds > 0.0) || !notes.duration_seconds.is_finite() {
        return Err(unsupported("duration_seconds must be a finite value > 0"));
    }
    // Velocity 0 on a note-on is read back as a note-off
    if !(1..=127).contains(&notes.velocity) {
        return Err(unsupported(format!(
            "velocity {} outside 1..=127",
            notes.velocity
        )));
    }

    let export = &config.export;
    if !(1..=0x7FFF).contains(&export.ticks_per_quarter_note) {
        return Err(unsupported(format!(
            "ticks_per_quarter_note {} outside 1..=32767",
            export.ticks_per_quarter_note
        )));
    }
    if !(1..=0xFF_FFFF).contains(&export.tempo_us_per_quarter_note) {
        return Err(unsupported(format!(
            "tempo_us_per_quarter_note {} outside 1..=16777215",
            export.tempo_us_per_quarter_note
        )));
    }
    if export.program > 127 {
        return Err(unsupported(format!("program {} > 127", export.program)));
    }
    if export.channel > 15 {
        return Err(unsupported(format!("channel {} > 15", export.channel)));
    }

    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
