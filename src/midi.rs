//! Standard MIDI File encoding, decoding and export

use crate::config::ExportConfig;
use crate::error::{Result, TranscribeError};
use crate::notes::NoteEvent;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Largest delta a 4-byte variable-length quantity can hold
pub const MAX_DELTA_TICKS: u64 = 0x0FFF_FFFF;

/// Tempo assumed when a file carries no tempo event (120 BPM)
const DEFAULT_TEMPO_US: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    On,
    Off,
}

#[derive(Debug, Clone, Copy)]
struct TimedMessage {
    tick: u64,
    kind: MessageKind,
    /// Index of the source event, keeps input order among equal ticks
    seq: usize,
    note: u8,
    velocity: u8,
}

/// Convert seconds to absolute ticks at the configured tempo
pub fn seconds_to_ticks(seconds: f64, export: &ExportConfig) -> u64 {
    (seconds.max(0.0) * export.ticks_per_second()).round() as u64
}

/// Convert ticks back to seconds for a given resolution and tempo
pub fn ticks_to_seconds(ticks: u64, ticks_per_quarter_note: u16, tempo_us: u32) -> f64 {
    ticks as f64 * tempo_us as f64 / (ticks_per_quarter_note as f64 * 1_000_000.0)
}

fn encoding_failure(msg: impl Into<String>) -> TranscribeError {
    TranscribeError::EncodingFailure(msg.into())
}

/// Encode ordered note events as a single-track Standard MIDI File.
///
/// The track starts with a tempo event and a program change, followed by the
/// note messages merged by absolute tick. An empty note list produces a track
/// holding only the end-of-track marker.
pub fn encode_notes(notes: &[NoteEvent], export: &ExportConfig) -> Result<Vec<u8>> {
    if export.channel > 15 || export.program > 127 {
        return Err(encoding_failure(format!(
            "channel {} / program {} out of range",
            export.channel, export.program
        )));
    }
    if !(1..=0x7FFF).contains(&export.ticks_per_quarter_note)
        || !(1..=0xFF_FFFF).contains(&export.tempo_us_per_quarter_note)
    {
        return Err(encoding_failure(format!(
            "resolution {} / tempo {} cannot be encoded",
            export.ticks_per_quarter_note, export.tempo_us_per_quarter_note
        )));
    }

    let mut messages = Vec::with_capacity(notes.len() * 2);
    for (seq, event) in notes.iter().enumerate() {
        if event.note > 127 || event.velocity > 127 {
            return Err(encoding_failure(format!(
                "event {} has note {} / velocity {} outside 0..=127",
                seq, event.note, event.velocity
            )));
        }

        if !event.start_sec.is_finite()
            || !event.end_sec.is_finite()
            || event.start_sec < 0.0
            || event.end_sec <= event.start_sec
        {
            return Err(encoding_failure(format!(
                "event {} spans {}s..{}s, expected finite 0 <= start < end",
                seq, event.start_sec, event.end_sec
            )));
        }

        let start = seconds_to_ticks(event.start_sec, export);
        // A note must not end on the tick it starts
        let end = seconds_to_ticks(event.end_sec, export).max(start.saturating_add(1));

        messages.push(TimedMessage {
            tick: start,
            kind: MessageKind::On,
            seq,
            note: event.note,
            velocity: event.velocity,
        });
        messages.push(TimedMessage {
            tick: end,
            kind: MessageKind::Off,
            seq,
            note: event.note,
            velocity: 0,
        });
    }

    // Within a tick: offs of keys retriggered on that tick, then note-ons,
    // then the remaining offs
    let retriggered: HashSet<(u64, u8)> = messages
        .iter()
        .filter(|m| m.kind == MessageKind::On)
        .map(|m| (m.tick, m.note))
        .collect();
    messages.sort_by_key(|m| {
        let rank = match m.kind {
            MessageKind::Off if retriggered.contains(&(m.tick, m.note)) => 0u8,
            MessageKind::On => 1,
            MessageKind::Off => 2,
        };
        (m.tick, rank, m.seq)
    });

    let channel = u4::new(export.channel);
    let mut track: Vec<TrackEvent<'static>> = Vec::with_capacity(messages.len() + 3);

    if !messages.is_empty() {
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(
                export.tempo_us_per_quarter_note,
            ))),
        });
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(export.program),
                },
            },
        });
    }

    let mut current_tick = 0u64;
    for message in &messages {
        let delta = message.tick - current_tick;
        if delta > MAX_DELTA_TICKS {
            return Err(encoding_failure(format!(
                "delta of {} ticks exceeds the variable-length limit",
                delta
            )));
        }
        current_tick = message.tick;

        let key = u7::new(message.note);
        let midi_message = match message.kind {
            MessageKind::On => MidiMessage::NoteOn {
                key,
                vel: u7::new(message.velocity),
            },
            MessageKind::Off => MidiMessage::NoteOff {
                key,
                vel: u7::new(0),
            },
        };

        track.push(TrackEvent {
            delta: u28::new(delta as u32),
            kind: TrackEventKind::Midi {
                channel,
                message: midi_message,
            },
        });
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let header = Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(export.ticks_per_quarter_note)),
    );
    let smf = Smf {
        header,
        tracks: vec![track],
    };

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)
        .map_err(|e| encoding_failure(format!("Failed to serialize MIDI data: {}", e)))?;
    Ok(bytes)
}

/// Read note events back from Standard MIDI File bytes.
///
/// Note-offs (and note-ons with velocity 0) close the oldest open note of
/// the same channel and key. Tempo changes are honored. Notes left open at
/// the end of a track are dropped.
pub fn decode_notes(bytes: &[u8]) -> Result<Vec<NoteEvent>> {
    let smf = Smf::parse(bytes)
        .map_err(|e| TranscribeError::DecodingFailure(format!("Invalid MIDI data: {}", e)))?;

    let tpq = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int(),
        Timing::Timecode(..) => {
            return Err(TranscribeError::DecodingFailure(
                "SMPTE timecode timing is not supported".to_string(),
            ))
        }
    };
    if tpq == 0 {
        return Err(TranscribeError::DecodingFailure(
            "ticks per quarter note is zero".to_string(),
        ));
    }

    // (start order, event)
    let mut decoded: Vec<(usize, NoteEvent)> = Vec::new();
    let mut order = 0usize;

    for track in &smf.tracks {
        let mut tempo_us = DEFAULT_TEMPO_US;
        let mut now_sec = 0.0f64;
        let mut open: HashMap<(u8, u8), VecDeque<(usize, f64, u8)>> = HashMap::new();

        for event in track {
            now_sec += ticks_to_seconds(event.delta.as_int() as u64, tpq, tempo_us);

            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(t)) => {
                    tempo_us = t.as_int();
                }
                TrackEventKind::Midi { channel, message } => {
                    let (key, vel, is_on) = match message {
                        MidiMessage::NoteOn { key, vel } => {
                            (key.as_int(), vel.as_int(), vel.as_int() > 0)
                        }
                        MidiMessage::NoteOff { key, vel } => (key.as_int(), vel.as_int(), false),
                        _ => continue,
                    };
                    let slot = open.entry((channel.as_int(), key)).or_default();
                    if is_on {
                        slot.push_back((order, now_sec, vel));
                        order += 1;
                    } else if let Some((start_order, start_sec, velocity)) = slot.pop_front() {
                        decoded.push((
                            start_order,
                            NoteEvent {
                                note: key,
                                start_sec,
                                end_sec: now_sec,
                                velocity,
                            },
                        ));
                    }
                }
                _ => {}
            }
        }

        let dangling: usize = open.values().map(VecDeque::len).sum();
        if dangling > 0 {
            log::warn!("Dropping {} note(s) without a note-off", dangling);
        }
    }

    decoded.sort_by(|a, b| {
        a.1.start_sec
            .total_cmp(&b.1.start_sec)
            .then(a.0.cmp(&b.0))
    });
    Ok(decoded.into_iter().map(|(_, event)| event).collect())
}

/// Note numbers of every sounding note-on, across all tracks in file order
pub fn note_on_array(bytes: &[u8]) -> Result<Vec<u8>> {
    let smf = Smf::parse(bytes)
        .map_err(|e| TranscribeError::DecodingFailure(format!("Invalid MIDI data: {}", e)))?;

    let notes = smf
        .tracks
        .iter()
        .flatten()
        .filter_map(|event| match event.kind {
            TrackEventKind::Midi {
                message: MidiMessage::NoteOn { key, vel },
                ..
            } if vel.as_int() > 0 => Some(key.as_int()),
            _ => None,
        })
        .collect();
    Ok(notes)
}

/// Write bytes to `path` through a temporary sibling renamed into place
pub fn write_midi_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temporary_sibling(path);

    if let Err(err) = write_and_rename(&tmp, path, bytes) {
        // Leave nothing half-written behind
        let _ = fs::remove_file(&tmp);
        return Err(encoding_failure(format!(
            "Failed to write {}: {}",
            path.display(),
            err
        )));
    }
    Ok(())
}

fn write_and_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, path)
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcription.mid".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Encode note events and write them to `output_path`
pub fn export_midi(notes: &[NoteEvent], output_path: &Path, export: &ExportConfig) -> Result<()> {
    let midi_data = encode_notes(notes, export)?;
    write_midi_file(output_path, &midi_data)?;

    log::info!(
        "Exported {} notes ({} bytes) to {}",
        notes.len(),
        midi_data.len(),
        output_path.display()
    );
    Ok(())
}

/// Dump the note-on numbers of a MIDI file as `<stem>_notes.json`
pub fn export_note_array(midi_path: &Path, output_dir: &Path) -> Result<PathBuf> {
    let bytes = fs::read(midi_path).map_err(|e| {
        TranscribeError::DecodingFailure(format!("{}: {}", midi_path.display(), e))
    })?;
    let notes = note_on_array(&bytes)?;

    let stem = midi_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcription".to_string());
    let json_path = output_dir.join(format!("{}_notes.json", stem));

    let json = serde_json::to_string_pretty(&notes)?;
    fs::create_dir_all(output_dir)
        .and_then(|_| fs::write(&json_path, json))
        .map_err(|e| {
            TranscribeError::ReportExportError(format!("{}: {}", json_path.display(), e))
        })?;

    log::info!("Exported {} note numbers to {}", notes.len(), json_path.display());
    Ok(json_path)
}
