//! Audio buffers and WAV loading

use crate::error::{Result, TranscribeError};
use hound::WavReader;
use std::path::Path;

/// Decoded mono PCM samples with their sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get audio duration in seconds
    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Get number of samples
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Reject buffers the pipeline cannot frame
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(TranscribeError::InvalidAudioBuffer(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.samples.is_empty() {
            return Err(TranscribeError::InvalidAudioBuffer(
                "buffer contains no samples".to_string(),
            ));
        }
        if let Some(idx) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(TranscribeError::InvalidAudioBuffer(format!(
                "non-finite sample at index {}",
                idx
            )));
        }
        Ok(())
    }
}

/// Load audio file into a mono buffer
pub fn load_audio_file<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "wav" => load_wav_file(path),
        _ => Err(TranscribeError::AudioFileError(format!(
            "Unsupported audio format: {:?}",
            extension
        ))),
    }
}

fn load_wav_file(path: &Path) -> Result<AudioBuffer> {
    let mut reader = WavReader::open(path)
        .map_err(|e| TranscribeError::AudioFileError(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();

    if spec.channels == 0 || spec.channels > 2 {
        return Err(TranscribeError::AudioFileError(format!(
            "{} channels not supported (mono or stereo only)",
            spec.channels
        )));
    }

    if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
        return Err(TranscribeError::AudioFileError(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let mut samples: Vec<f32> = Vec::with_capacity(reader.len() as usize);

    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                let sample = sample.map_err(|e| TranscribeError::AudioFileError(e.to_string()))?;
                samples.push(sample as f32 / max_value);
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                samples.push(sample.map_err(|e| TranscribeError::AudioFileError(e.to_string()))?);
            }
        }
    }

    let samples = if spec.channels == 2 {
        downmix_stereo(&samples)
    } else {
        samples
    };

    let peak = peak_amplitude(&samples);
    if peak > 0.99 {
        log::warn!("Audio file may be clipped (peak = {:.3})", peak);
    }

    log::debug!(
        "Loaded {}: {} samples at {} Hz ({} channel(s))",
        path.display(),
        samples.len(),
        spec.sample_rate,
        spec.channels
    );

    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

/// Average interleaved stereo frames into mono
pub fn downmix_stereo(interleaved: &[f32]) -> Vec<f32> {
    interleaved
        .chunks_exact(2)
        .map(|pair| (pair[0] + pair[1]) * 0.5)
        .collect()
}

/// Largest absolute sample value
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_buffer() {
        let buffer = AudioBuffer::new(Vec::new(), 44100);
        assert!(matches!(
            buffer.validate(),
            Err(TranscribeError::InvalidAudioBuffer(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_sample_rate() {
        let buffer = AudioBuffer::new(vec![0.0; 16], 0);
        assert!(buffer.validate().is_err());
        assert_eq!(buffer.duration_sec(), 0.0);
    }

    #[test]
    fn test_validate_rejects_nan() {
        let buffer = AudioBuffer::new(vec![0.0, f32::NAN, 0.0], 8000);
        assert!(buffer.validate().is_err());
    }

    #[test]
    fn test_downmix_stereo() {
        let mono = downmix_stereo(&[1.0, 0.0, -0.5, -0.5, 0.25]);
        // Trailing half frame is ignored
        assert_eq!(mono, vec![0.5, -0.5]);
    }

    #[test]
    fn test_peak_amplitude() {
        assert_eq!(peak_amplitude(&[0.1, -0.8, 0.3]), 0.8);
        assert_eq!(peak_amplitude(&[]), 0.0);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_audio_file("song.mp3").unwrap_err();
        assert!(matches!(err, TranscribeError::AudioFileError(_)));
    }

    #[test]
    fn test_aiff_reported_as_unsupported_format() {
        for name in ["take.aiff", "take.AIF"] {
            let err = load_audio_file(name).unwrap_err();
            assert!(
                err.to_string().contains("Unsupported audio format"),
                "{}: {}",
                name,
                err
            );
        }
    }
}
