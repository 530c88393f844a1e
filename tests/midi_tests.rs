//! Standard MIDI File encoding, decoding and file output

use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};
use pitch2midi::config::ExportConfig;
use pitch2midi::midi::{decode_notes, encode_notes, export_note_array, write_midi_file};
use pitch2midi::{NoteEvent, TranscribeError};
use rand::Rng;
use std::path::PathBuf;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pitch2midi_midi_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Random note events sorted by start time; all share one duration so that
/// overlapping notes of the same pitch pair up unambiguously
fn random_events(count: usize, duration: f64) -> Vec<NoteEvent> {
    let mut rng = rand::thread_rng();
    let mut events: Vec<NoteEvent> = (0..count)
        .map(|_| {
            let start_sec = rng.gen_range(0.0..30.0);
            NoteEvent {
                note: rng.gen_range(0..=127),
                start_sec,
                end_sec: start_sec + duration,
                velocity: rng.gen_range(1..=127),
            }
        })
        .collect();
    events.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
    events
}

fn assert_round_trip(original: &[NoteEvent], export: &ExportConfig) {
    let bytes = encode_notes(original, export).unwrap();
    let decoded = decode_notes(&bytes).unwrap();
    let tick = 1.0 / export.ticks_per_second();

    assert_eq!(decoded.len(), original.len());
    for (orig, dec) in original.iter().zip(&decoded) {
        assert_eq!(dec.note, orig.note);
        assert_eq!(dec.velocity, orig.velocity);
        assert!((dec.start_sec - orig.start_sec).abs() < tick, "{:?} vs {:?}", orig, dec);
        assert!((dec.end_sec - orig.end_sec).abs() < tick, "{:?} vs {:?}", orig, dec);
    }
}

/// (absolute tick, key, is note-on) for every note message of the first track
fn note_messages(smf: &Smf) -> Vec<(u64, u8, bool)> {
    let mut tick = 0u64;
    let mut out = Vec::new();
    for event in &smf.tracks[0] {
        tick += event.delta.as_int() as u64;
        match event.kind {
            TrackEventKind::Midi {
                message: MidiMessage::NoteOn { key, .. },
                ..
            } => out.push((tick, key.as_int(), true)),
            TrackEventKind::Midi {
                message: MidiMessage::NoteOff { key, .. },
                ..
            } => out.push((tick, key.as_int(), false)),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_default_resolution() {
        assert_round_trip(&random_events(500, 0.1), &ExportConfig::default());
    }

    #[test]
    fn test_round_trip_other_tempo_and_resolution() {
        let export = ExportConfig {
            ticks_per_quarter_note: 96,
            tempo_us_per_quarter_note: 750_000,
            program: 40,
            channel: 3,
        };
        assert_round_trip(&random_events(200, 0.25), &export);
    }

    #[test]
    fn test_round_trip_dense_same_pitch_overlaps() {
        // The shape per-frame segmentation produces: 11.6 ms hop, 100 ms notes
        let hop = 512.0 / 44100.0;
        let events: Vec<NoteEvent> = (0..83)
            .map(|i| NoteEvent {
                note: 69,
                start_sec: i as f64 * hop,
                end_sec: i as f64 * hop + 0.1,
                velocity: 100,
            })
            .collect();
        assert_round_trip(&events, &ExportConfig::default());
    }

    #[test]
    fn test_messages_globally_ordered() {
        let events = random_events(300, 0.1);
        let bytes = encode_notes(&events, &ExportConfig::default()).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 1);

        let notes = note_messages(&smf);
        for pair in notes.windows(2) {
            assert!(pair[1].0 >= pair[0].0);
        }

        // Within a tick: offs of retriggered keys, note-ons, remaining offs
        let mut i = 0;
        while i < notes.len() {
            let tick = notes[i].0;
            let group: Vec<(u8, bool)> = notes[i..]
                .iter()
                .take_while(|m| m.0 == tick)
                .map(|m| (m.1, m.2))
                .collect();
            let on_keys: Vec<u8> = group.iter().filter(|m| m.1).map(|m| m.0).collect();
            let rank = |&(key, is_on): &(u8, bool)| {
                if is_on {
                    1
                } else if on_keys.contains(&key) {
                    0
                } else {
                    2
                }
            };
            let ranks: Vec<u8> = group.iter().map(rank).collect();
            assert!(ranks.windows(2).all(|r| r[0] <= r[1]), "tick {}: {:?}", tick, group);
            i += group.len();
        }
    }

    #[test]
    fn test_retriggered_note_releases_before_restrike() {
        let events = vec![
            NoteEvent {
                note: 60,
                start_sec: 0.0,
                end_sec: 0.5,
                velocity: 100,
            },
            NoteEvent {
                note: 60,
                start_sec: 0.5,
                end_sec: 1.0,
                velocity: 80,
            },
        ];
        let bytes = encode_notes(&events, &ExportConfig::default()).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        assert_eq!(
            note_messages(&smf),
            vec![(0, 60, true), (480, 60, false), (480, 60, true), (960, 60, false)]
        );
        assert_round_trip(&events, &ExportConfig::default());
    }

    #[test]
    fn test_track_layout() {
        let export = ExportConfig {
            program: 24,
            ..ExportConfig::default()
        };
        let events = vec![NoteEvent {
            note: 64,
            start_sec: 0.25,
            end_sec: 0.35,
            velocity: 90,
        }];
        let bytes = encode_notes(&events, &export).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        let track = &smf.tracks[0];

        assert_eq!(track.len(), 5);
        assert!(matches!(
            track[0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() == 500_000
        ));
        assert!(matches!(
            track[1].kind,
            TrackEventKind::Midi { message: MidiMessage::ProgramChange { program }, .. }
                if program.as_int() == 24
        ));
        assert_eq!(track[2].delta.as_int(), 240);
        assert_eq!(track[3].delta.as_int(), 96);
        assert!(matches!(
            track[4].kind,
            TrackEventKind::Meta(MetaMessage::EndOfTrack)
        ));
    }

    #[test]
    fn test_large_delta_uses_multibyte_vlq() {
        let events = vec![NoteEvent {
            note: 60,
            start_sec: 100.0,
            end_sec: 100.1,
            velocity: 64,
        }];
        let bytes = encode_notes(&events, &ExportConfig::default()).unwrap();
        let decoded = decode_notes(&bytes).unwrap();
        assert!((decoded[0].start_sec - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_encoding_is_deterministic_and_pure() {
        let events = random_events(100, 0.1);
        let snapshot = events.clone();
        let a = encode_notes(&events, &ExportConfig::default()).unwrap();
        let b = encode_notes(&events, &ExportConfig::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(events, snapshot);
    }

    #[test]
    fn test_write_midi_file_atomic() {
        let dir = temp_dir("atomic");
        let path = dir.join("out.mid");
        let bytes = encode_notes(&random_events(10, 0.1), &ExportConfig::default()).unwrap();

        write_midi_file(&path, &bytes).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), bytes);

        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_write_failure_leaves_nothing() {
        let dir = temp_dir("missing");
        let path = dir.join("no_such_dir").join("out.mid");
        let err = write_midi_file(&path, b"MThd").unwrap_err();
        assert!(matches!(err, TranscribeError::EncodingFailure(_)));
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_export_note_array_json() {
        let dir = temp_dir("notes");
        let path = dir.join("melody.mid");
        let events: Vec<NoteEvent> = [60u8, 62, 64, 65]
            .iter()
            .enumerate()
            .map(|(i, &note)| NoteEvent {
                note,
                start_sec: i as f64 * 0.5,
                end_sec: i as f64 * 0.5 + 0.4,
                velocity: 100,
            })
            .collect();
        let bytes = encode_notes(&events, &ExportConfig::default()).unwrap();
        write_midi_file(&path, &bytes).unwrap();

        let json_path = export_note_array(&path, &dir).unwrap();
        assert_eq!(json_path, dir.join("melody_notes.json"));
        let notes: Vec<u8> =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(notes, vec![60, 62, 64, 65]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
