//! Per-frame fundamental estimation and equal-tempered quantization

use crate::config::{Config, PitchConfig, PitchMethod};
use crate::spectral::bin_frequency;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// A4 reference
pub const A4_FREQUENCY_HZ: f64 = 440.0;
pub const A4_NOTE: u8 = 69;
pub const MAX_NOTE: u8 = 127;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Best candidate fundamental of one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchObservation {
    /// Frame start in seconds
    pub time_sec: f64,
    /// 0.0 when the frame has no pitch
    pub frequency_hz: f32,
    pub salience: f32,
}

impl PitchObservation {
    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

/// Map a frequency to the nearest MIDI note number.
///
/// Non-positive (or NaN) frequencies and anything below note 0 give `None`;
/// frequencies above note 127 clamp to 127. Halfway values round away from
/// zero.
pub fn frequency_to_note(frequency_hz: f32) -> Option<u8> {
    if !(frequency_hz > 0.0) {
        return None;
    }

    let n = A4_NOTE as f64 + 12.0 * (frequency_hz as f64 / A4_FREQUENCY_HZ).log2();

    if n < 0.0 {
        None
    } else if n > MAX_NOTE as f64 {
        Some(MAX_NOTE)
    } else {
        Some(n.round() as u8)
    }
}

/// Equal-tempered frequency of a note number
pub fn note_to_frequency(note: u8) -> f64 {
    A4_FREQUENCY_HZ * 2.0f64.powf((note as f64 - A4_NOTE as f64) / 12.0)
}

/// Scientific pitch name, e.g. 60 -> "C4"
pub fn note_name(note: u8) -> String {
    let octave = note as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[note as usize % 12], octave)
}

/// Picks one candidate per spectrum column within the plausible band
#[derive(Debug, Clone)]
pub struct PitchEstimator {
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
    method: PitchMethod,
    harmonics: usize,
    min_salience: f32,
    /// Inclusive candidate bin range, `None` when the band holds no bins
    band: Option<(usize, usize)>,
}

impl PitchEstimator {
    pub fn new(sample_rate: u32, config: &Config) -> Self {
        let frame_size = config.stft.frame_size;
        Self {
            sample_rate,
            frame_size,
            hop_size: config.stft.hop_size,
            method: config.pitch.method,
            harmonics: config.pitch.harmonics.max(1),
            min_salience: config.pitch.min_salience,
            band: candidate_band(sample_rate, frame_size, &config.pitch),
        }
    }

    pub fn band(&self) -> Option<(usize, usize)> {
        self.band
    }

    /// Observation for the frame at `frame_index` given its magnitude spectrum
    pub fn estimate(&self, frame_index: usize, spectrum: ArrayView1<'_, f32>) -> PitchObservation {
        let time_sec = (frame_index * self.hop_size) as f64 / self.sample_rate as f64;

        let Some((lo, hi)) = self.band else {
            return PitchObservation {
                time_sec,
                frequency_hz: 0.0,
                salience: 0.0,
            };
        };

        let bin = match self.method {
            PitchMethod::Peak => peak_bin(spectrum, lo, hi),
            PitchMethod::Hps => hps_bin(spectrum, lo, hi, self.harmonics),
        };
        let salience = spectrum[bin];

        let frequency_hz = if salience > self.min_salience {
            bin_frequency(bin, self.sample_rate, self.frame_size)
        } else {
            0.0
        };

        PitchObservation {
            time_sec,
            frequency_hz,
            salience,
        }
    }

    /// One observation per column of a (bins, frames) spectrogram
    pub fn estimate_all(&self, spectrogram: &Array2<f32>) -> Vec<PitchObservation> {
        spectrogram
            .columns()
            .into_iter()
            .enumerate()
            .map(|(idx, column)| self.estimate(idx, column))
            .collect()
    }
}

/// Inclusive bin range whose centers fall inside the configured band
pub fn candidate_band(
    sample_rate: u32,
    frame_size: usize,
    config: &PitchConfig,
) -> Option<(usize, usize)> {
    if sample_rate == 0 || frame_size == 0 {
        return None;
    }

    let n_bins = frame_size / 2 + 1;
    let bin_hz = sample_rate as f64 / frame_size as f64;
    let nyquist = sample_rate as f64 / 2.0;
    let max_hz = config
        .max_frequency_hz
        .map_or(nyquist, |m| (m as f64).min(nyquist));

    let mut lo = (config.min_frequency_hz as f64 / bin_hz).ceil() as usize;
    let mut hi = ((max_hz / bin_hz).floor() as usize).min(n_bins - 1);

    if config.method == PitchMethod::Hps {
        // Every harmonic of a candidate must exist in the spectrum
        lo = lo.max(1);
        hi = hi.min((n_bins - 1) / config.harmonics.max(1));
    }

    if lo > hi {
        None
    } else {
        Some((lo, hi))
    }
}

/// Strongest bin in `lo..=hi`, lowest bin on ties
fn peak_bin(spectrum: ArrayView1<'_, f32>, lo: usize, hi: usize) -> usize {
    let mut best = lo;
    for k in lo + 1..=hi {
        if spectrum[k] > spectrum[best] {
            best = k;
        }
    }
    best
}

/// Bin maximizing the product of its first `harmonics` multiples
fn hps_bin(spectrum: ArrayView1<'_, f32>, lo: usize, hi: usize, harmonics: usize) -> usize {
    let score = |k: usize| -> f64 {
        (1..=harmonics)
            .map(|h| spectrum[h * k] as f64)
            .product::<f64>()
    };

    let mut best = lo;
    let mut best_score = score(lo);
    for k in lo + 1..=hi {
        let s = score(k);
        if s > best_score {
            best = k;
            best_score = s;
        }
    }
    best
}
