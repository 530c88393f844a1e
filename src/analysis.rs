//! Transcription summary and JSON report export

use crate::audio::AudioBuffer;
use crate::config::Config;
use crate::error::{Result, TranscribeError};
use crate::notes::NoteEvent;
use crate::pitch::{note_name, PitchObservation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Complete transcription report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionReport {
    pub version: String,
    pub audio_info: AudioInfo,
    pub frames: FrameStats,
    pub notes: NoteStats,
    pub config: Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfo {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub total_samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameStats {
    pub analyzed: usize,
    pub voiced: usize,
    /// Mean salience over voiced frames
    pub mean_salience: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteStats {
    pub emitted: usize,
    pub lowest: Option<NoteCount>,
    pub highest: Option<NoteCount>,
    /// Ascending by note number
    pub histogram: Vec<NoteCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteCount {
    pub note: u8,
    pub name: String,
    pub count: usize,
}

/// Summarize one transcription
pub fn build_report(
    buffer: &AudioBuffer,
    observations: &[PitchObservation],
    notes: &[NoteEvent],
    config: &Config,
) -> TranscriptionReport {
    let voiced: Vec<&PitchObservation> = observations.iter().filter(|o| o.is_voiced()).collect();
    let mean_salience = if voiced.is_empty() {
        0.0
    } else {
        voiced.iter().map(|o| o.salience).sum::<f32>() / voiced.len() as f32
    };

    let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
    for event in notes {
        *counts.entry(event.note).or_insert(0) += 1;
    }
    let histogram: Vec<NoteCount> = counts
        .into_iter()
        .map(|(note, count)| NoteCount {
            note,
            name: note_name(note),
            count,
        })
        .collect();

    TranscriptionReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        audio_info: AudioInfo {
            duration_seconds: buffer.duration_sec(),
            sample_rate: buffer.sample_rate(),
            total_samples: buffer.n_samples(),
        },
        frames: FrameStats {
            analyzed: observations.len(),
            voiced: voiced.len(),
            mean_salience,
        },
        notes: NoteStats {
            emitted: notes.len(),
            lowest: histogram.first().cloned(),
            highest: histogram.last().cloned(),
            histogram,
        },
        config: config.clone(),
    }
}

/// Write the report as pretty JSON
pub fn export_report(report: &TranscriptionReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .map_err(|e| TranscribeError::ReportExportError(format!("{}: {}", path.display(), e)))?;

    log::info!("Exported analysis report to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let buffer = AudioBuffer::new(vec![0.0; 8000], 8000);
        let observations = vec![
            PitchObservation {
                time_sec: 0.0,
                frequency_hz: 440.0,
                salience: 2.0,
            },
            PitchObservation {
                time_sec: 0.1,
                frequency_hz: 0.0,
                salience: 0.0,
            },
            PitchObservation {
                time_sec: 0.2,
                frequency_hz: 262.0,
                salience: 4.0,
            },
        ];
        let notes = vec![
            NoteEvent {
                note: 69,
                start_sec: 0.0,
                end_sec: 0.1,
                velocity: 100,
            },
            NoteEvent {
                note: 60,
                start_sec: 0.2,
                end_sec: 0.3,
                velocity: 100,
            },
        ];

        let report = build_report(&buffer, &observations, &notes, &Config::default());
        assert_eq!(report.audio_info.duration_seconds, 1.0);
        assert_eq!(report.frames.analyzed, 3);
        assert_eq!(report.frames.voiced, 2);
        assert!((report.frames.mean_salience - 3.0).abs() < 1e-6);
        assert_eq!(report.notes.emitted, 2);
        assert_eq!(report.notes.lowest.as_ref().map(|n| n.name.as_str()), Some("C4"));
        assert_eq!(report.notes.highest.as_ref().map(|n| n.note), Some(69));
    }

    #[test]
    fn test_empty_report() {
        let buffer = AudioBuffer::new(vec![0.0; 10], 44100);
        let report = build_report(&buffer, &[], &[], &Config::default());
        assert!(report.notes.lowest.is_none());
        assert!(report.notes.histogram.is_empty());
        assert_eq!(report.frames.mean_salience, 0.0);
    }
}
