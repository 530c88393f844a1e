//! Monophonic Audio-to-MIDI Transcription
//!
//! A deterministic, non-ML pipeline that frames a PCM signal, picks one
//! fundamental per frame from its magnitude spectrum, quantizes it to an
//! equal-tempered note and writes the result as a Standard MIDI File.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod notes;
pub mod pitch;
pub mod spectral;

pub use audio::AudioBuffer;
pub use config::Config;
pub use error::{Result as TranscribeResult, TranscribeError};
pub use notes::NoteEvent;
pub use pitch::{frequency_to_note, PitchObservation};

use spectral::{Frames, SpectralAnalyzer};
use std::path::{Path, PathBuf};

/// Everything one pipeline run produced
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub observations: Vec<PitchObservation>,
    pub notes: Vec<NoteEvent>,
    /// Encoded Standard MIDI File
    pub midi: Vec<u8>,
}

/// Main processing pipeline for audio-to-MIDI conversion
#[derive(Debug, Clone)]
pub struct Transcriber {
    config: Config,
    write_report: bool,
}

impl Transcriber {
    /// Create a new processor with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            write_report: false,
        }
    }

    /// Also write `<stem>_analysis.json` next to each MIDI file
    pub fn with_report(mut self, enabled: bool) -> Self {
        self.write_report = enabled;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the full pipeline on a decoded buffer
    pub fn transcribe(&self, buffer: &AudioBuffer) -> TranscribeResult<Transcription> {
        config::validate_config(&self.config)?;
        buffer.validate()?;

        let stft = &self.config.stft;
        let frames = Frames::from_config(buffer.samples(), stft);
        log::debug!(
            "Framing {} samples into {} frames (size {}, hop {})",
            buffer.n_samples(),
            frames.len(),
            stft.frame_size,
            stft.hop_size
        );

        let analyzer = SpectralAnalyzer::from_config(stft);
        let spectrogram = analyzer.magnitude_spectrogram(frames);

        let estimator = pitch::PitchEstimator::new(buffer.sample_rate(), &self.config);
        let observations = estimator.estimate_all(&spectrogram);
        log::debug!(
            "{} of {} frames voiced",
            observations.iter().filter(|o| o.is_voiced()).count(),
            observations.len()
        );

        let notes = notes::synthesize_notes(&observations, &self.config.notes);
        log::debug!(
            "{} note events ({:?} segmentation)",
            notes.len(),
            self.config.notes.segmentation
        );

        let midi = midi::encode_notes(&notes, &self.config.export)?;

        Ok(Transcription {
            observations,
            notes,
            midi,
        })
    }

    /// Transcribe an audio file to `<stem>.mid` in `output_dir` (default: next
    /// to the input). Inputs that are already MIDI files are returned as-is.
    pub fn process<P: AsRef<Path>>(
        &self,
        input_path: P,
        output_dir: Option<&Path>,
    ) -> TranscribeResult<PathBuf> {
        let input_path = input_path.as_ref();

        if is_midi_file(input_path) {
            log::info!("{} is already a MIDI file", input_path.display());
            return Ok(input_path.to_path_buf());
        }

        let buffer = audio::load_audio_file(input_path)?;
        let transcription = self.transcribe(&buffer)?;

        let midi_path = output_path_for(input_path, output_dir, "mid");
        if let Some(parent) = midi_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        midi::write_midi_file(&midi_path, &transcription.midi)?;
        log::info!(
            "Wrote {} notes to {}",
            transcription.notes.len(),
            midi_path.display()
        );

        if self.write_report {
            let report = analysis::build_report(
                &buffer,
                &transcription.observations,
                &transcription.notes,
                &self.config,
            );
            let report_path = with_suffix(&midi_path, "_analysis.json");
            analysis::export_report(&report, &report_path)?;
        }

        Ok(midi_path)
    }

    /// Process independent files on up to `jobs` worker threads. Results come
    /// back in input order.
    pub fn process_batch(
        &self,
        inputs: &[PathBuf],
        output_dir: Option<&Path>,
        jobs: usize,
    ) -> Vec<TranscribeResult<PathBuf>> {
        if inputs.is_empty() {
            return Vec::new();
        }
        let jobs = jobs.clamp(1, inputs.len());

        // Round-robin assignment of (input index, path) to workers
        let chunks: Vec<Vec<(usize, &PathBuf)>> = (0..jobs)
            .map(|worker| inputs.iter().enumerate().skip(worker).step_by(jobs).collect())
            .collect();

        let mut results: Vec<(usize, TranscribeResult<PathBuf>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .iter()
                .map(|chunk| {
                    let handle = scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|&(idx, path)| (idx, self.process(path, output_dir)))
                            .collect::<Vec<_>>()
                    });
                    (chunk, handle)
                })
                .collect();

            let mut collected = Vec::with_capacity(inputs.len());
            for (chunk, handle) in handles {
                match handle.join() {
                    Ok(done) => collected.extend(done),
                    Err(_) => collected.extend(chunk.iter().map(|&(idx, path)| {
                        (
                            idx,
                            Err(TranscribeError::PipelineError(format!(
                                "worker panicked while processing {}",
                                path.display()
                            ))),
                        )
                    })),
                }
            }
            collected
        });

        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, result)| result).collect()
    }
}

/// `<output_dir or input dir>/<input stem>.<extension>`
pub fn output_path_for(input_path: &Path, output_dir: Option<&Path>, extension: &str) -> PathBuf {
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcription".to_string());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{}.{}", stem, extension))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", stem, suffix))
}

fn is_midi_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
}
