//! Error types for the transcription pipeline

use std::fmt;

/// Error type for pitch-to-MIDI transcription
#[derive(Debug, Clone, PartialEq)]
pub enum TranscribeError {
    /// E001: Empty buffer, zero sample rate or non-finite samples
    InvalidAudioBuffer(String),
    /// E002: Configuration rejected by validation
    UnsupportedParameters(String),
    /// E003: MIDI serialization or sink write failed
    EncodingFailure(String),
    /// E004: Audio file could not be read
    AudioFileError(String),
    /// E005: MIDI bytes could not be parsed back into notes
    DecodingFailure(String),
    /// E006: JSON report or note array export failed
    ReportExportError(String),
    /// E007: A batch worker failed outside the pipeline
    PipelineError(String),
}

impl fmt::Display for TranscribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscribeError::InvalidAudioBuffer(msg) => {
                write!(f, "E001: Invalid audio buffer - {}", msg)
            }
            TranscribeError::UnsupportedParameters(msg) => {
                write!(f, "E002: Unsupported parameters - {}", msg)
            }
            TranscribeError::EncodingFailure(msg) => {
                write!(f, "E003: Encoding failure - {}", msg)
            }
            TranscribeError::AudioFileError(msg) => {
                write!(f, "E004: Audio file error - {}", msg)
            }
            TranscribeError::DecodingFailure(msg) => {
                write!(f, "E005: MIDI decoding failure - {}", msg)
            }
            TranscribeError::ReportExportError(msg) => {
                write!(f, "E006: Report export error - {}", msg)
            }
            TranscribeError::PipelineError(msg) => {
                write!(f, "E007: Processing pipeline error - {}", msg)
            }
        }
    }
}

impl std::error::Error for TranscribeError {}

// The only I/O inside the library is the output sink
impl From<std::io::Error> for TranscribeError {
    fn from(err: std::io::Error) -> Self {
        TranscribeError::EncodingFailure(format!("Sink write error: {}", err))
    }
}

impl From<serde_json::Error> for TranscribeError {
    fn from(err: serde_json::Error) -> Self {
        TranscribeError::ReportExportError(format!("JSON serialization error: {}", err))
    }
}

/// Result type alias for transcription operations
pub type Result<T> = std::result::Result<T, TranscribeError>;
