//! Note synthesis from per-frame pitch observations

use crate::config::{NoteConfig, Segmentation};
use crate::pitch::{frequency_to_note, PitchObservation};
use serde::{Deserialize, Serialize};

/// A single note with absolute start and end times
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub note: u8,
    pub start_sec: f64,
    pub end_sec: f64,
    pub velocity: u8, // MIDI velocity 1-127
}

impl NoteEvent {
    pub fn duration_sec(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}

/// Turns an ordered observation stream into ordered note events.
///
/// Implementations must emit events sorted by start time, keeping frame
/// order on ties, with `end_sec > start_sec` for every event.
pub trait SegmentationPolicy {
    fn segment(&self, observations: &[PitchObservation], config: &NoteConfig) -> Vec<NoteEvent>;
}

/// Every voiced frame becomes its own fixed-length note. Repeated frames of
/// the same pitch are not merged and overlaps are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerFrame;

impl SegmentationPolicy for PerFrame {
    fn segment(&self, observations: &[PitchObservation], config: &NoteConfig) -> Vec<NoteEvent> {
        observations
            .iter()
            .filter_map(|obs| {
                let note = frequency_to_note(obs.frequency_hz)?;
                Some(NoteEvent {
                    note,
                    start_sec: obs.time_sec,
                    end_sec: obs.time_sec + config.duration_seconds,
                    velocity: config.velocity,
                })
            })
            .collect()
    }
}

/// Runs of consecutive frames on the same note collapse into one note that
/// lasts from the first frame to the last frame plus the note duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sustain;

impl SegmentationPolicy for Sustain {
    fn segment(&self, observations: &[PitchObservation], config: &NoteConfig) -> Vec<NoteEvent> {
        let mut events = Vec::new();
        // (note, first frame time, last frame time)
        let mut run: Option<(u8, f64, f64)> = None;

        let close = |run: (u8, f64, f64)| NoteEvent {
            note: run.0,
            start_sec: run.1,
            end_sec: run.2 + config.duration_seconds,
            velocity: config.velocity,
        };

        for obs in observations {
            match (frequency_to_note(obs.frequency_hz), run) {
                (Some(note), Some((current, start, _))) if note == current => {
                    run = Some((current, start, obs.time_sec));
                }
                (Some(note), previous) => {
                    if let Some(previous) = previous {
                        events.push(close(previous));
                    }
                    run = Some((note, obs.time_sec, obs.time_sec));
                }
                (None, previous) => {
                    if let Some(previous) = previous {
                        events.push(close(previous));
                    }
                    run = None;
                }
            }
        }

        if let Some(last) = run {
            events.push(close(last));
        }

        events
    }
}

/// Policy object for a configured segmentation mode
pub fn policy_for(segmentation: Segmentation) -> Box<dyn SegmentationPolicy + Send + Sync> {
    match segmentation {
        Segmentation::PerFrame => Box::new(PerFrame),
        Segmentation::Sustain => Box::new(Sustain),
    }
}

/// Build note events with the configured segmentation policy
pub fn synthesize_notes(observations: &[PitchObservation], config: &NoteConfig) -> Vec<NoteEvent> {
    policy_for(config.segmentation).segment(observations, config)
}
