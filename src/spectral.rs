//! Framing and magnitude spectra

use crate::config::{StftConfig, WindowKind};
use ndarray::Array2;
use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use std::sync::Arc;

/// One analysis window borrowed from the sample buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame<'a> {
    pub index: usize,
    /// Offset of the first sample in the buffer
    pub start: usize,
    pub samples: &'a [f32],
}

impl Frame<'_> {
    pub fn time_sec(&self, sample_rate: u32) -> f64 {
        self.start as f64 / sample_rate as f64
    }
}

/// Number of full frames in a buffer; a trailing partial frame is dropped
pub fn frame_count(n_samples: usize, frame_size: usize, hop_size: usize) -> usize {
    if frame_size == 0 || hop_size == 0 || n_samples < frame_size {
        return 0;
    }
    (n_samples - frame_size) / hop_size + 1
}

/// Lazy iterator over overlapping frames; clone it to replay from the same position
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    samples: &'a [f32],
    frame_size: usize,
    hop_size: usize,
    next: usize,
    count: usize,
}

impl<'a> Frames<'a> {
    pub fn new(samples: &'a [f32], frame_size: usize, hop_size: usize) -> Self {
        Self {
            samples,
            frame_size,
            hop_size,
            next: 0,
            count: frame_count(samples.len(), frame_size, hop_size),
        }
    }

    pub fn from_config(samples: &'a [f32], stft: &StftConfig) -> Self {
        Self::new(samples, stft.frame_size, stft.hop_size)
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let index = self.next;
        let start = index * self.hop_size;
        self.next += 1;
        Some(Frame {
            index,
            start,
            samples: &self.samples[start..start + self.frame_size],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}

/// Generate window function
pub fn generate_window(kind: WindowKind, size: usize) -> Vec<f32> {
    match kind {
        WindowKind::Hann if size > 1 => (0..size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
            })
            .collect(),
        _ => vec![1.0; size],
    }
}

/// Center frequency of FFT bin `k`
pub fn bin_frequency(k: usize, sample_rate: u32, frame_size: usize) -> f32 {
    (k as f64 * sample_rate as f64 / frame_size as f64) as f32
}

/// Windowed forward FFT planned once for a fixed frame size
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    frame_size: usize,
}

impl SpectralAnalyzer {
    pub fn new(frame_size: usize, window: WindowKind) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);
        Self {
            fft,
            window: generate_window(window, frame_size),
            frame_size,
        }
    }

    pub fn from_config(stft: &StftConfig) -> Self {
        Self::new(stft.frame_size, stft.window)
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Bins 0..=N/2
    pub fn n_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Magnitudes of the non-negative frequency bins of one frame
    pub fn magnitude_spectrum(&self, frame: &[f32]) -> Vec<f32> {
        debug_assert_eq!(frame.len(), self.frame_size);

        let mut buffer: Vec<Complex32> = frame
            .iter()
            .zip(&self.window)
            .map(|(&sample, &win)| Complex32::new(sample * win, 0.0))
            .collect();

        self.fft.process(&mut buffer);

        buffer[..self.n_bins()].iter().map(|c| c.norm()).collect()
    }

    /// Magnitude spectrogram, shape (bins, frames)
    pub fn magnitude_spectrogram(&self, frames: Frames<'_>) -> Array2<f32> {
        let mut s = Array2::<f32>::zeros((self.n_bins(), frames.len()));

        for frame in frames {
            let mags = self.magnitude_spectrum(frame.samples);
            for (bin, &mag) in mags.iter().enumerate() {
                s[[bin, frame.index]] = mag;
            }
        }

        s
    }
}
