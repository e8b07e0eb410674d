//! Error types for the songloom-core crate.

use thiserror::Error;

use crate::song::SongState;

/// Errors raised by an [`Instrument`](crate::instrument::Instrument) when it
/// rejects a trigger request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstrumentError {
    /// A monophonic or percussive voice was handed more pitches than it can sound.
    #[error("{instrument} can sound at most {max} pitch(es), got {got}")]
    TooManyPitches {
        instrument: String,
        max: usize,
        got: usize,
    },

    /// A pitched voice was triggered without any pitch.
    #[error("{0} needs a pitch to play")]
    MissingPitch(String),

    /// The sound backend refused the request.
    #[error("Instrument backend error: {0}")]
    Backend(String),
}

/// Errors that can occur while building or playing a song.
#[derive(Error, Debug)]
pub enum SongError {
    /// A rhythm cannot be used as written (e.g. it has no onsets).
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// A hit grid contained something other than 0 or 1.
    #[error("Invalid hit value {value} at step {index} (expected 0 or 1)")]
    InvalidHitValue { index: usize, value: u8 },

    /// Two parallel lists disagree on their length.
    #[error("Length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A bar-length entry is zero or an empty array.
    #[error("Invalid bar length at entry {index}: {reason}")]
    InvalidBarLength { index: usize, reason: String },

    /// A sequence that must carry data was empty.
    #[error("Empty {0}")]
    EmptySequence(&'static str),

    /// Time signature the sixteenth grid cannot represent.
    #[error("Unsupported time signature {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u32, denominator: u32 },

    /// Tempo outside the supported range.
    #[error("Tempo must be between 20 and 999 BPM, got {0}")]
    InvalidTempo(f64),

    /// A note name could not be parsed.
    #[error("Invalid pitch: {0}")]
    InvalidPitch(String),

    /// A bars:beats:sixteenths value could not be parsed.
    #[error("Invalid transport time: {0}")]
    InvalidTime(String),

    /// A lifecycle operation was requested in the wrong state.
    #[error("Cannot {operation} a song that is {state}")]
    InvalidState {
        state: SongState,
        operation: &'static str,
    },

    /// An instrument rejected a trigger.
    #[error("Track '{track}' failed to trigger: {source}")]
    Instrument {
        track: String,
        #[source]
        source: InstrumentError,
    },
}

/// Result type alias using SongError.
pub type Result<T> = std::result::Result<T, SongError>;
