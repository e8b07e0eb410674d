//! Songloom Core - Pattern expansion and event scheduling for generated songs.
//!
//! This crate turns section-level musical data into a loopable, precisely
//! timed stream of instrument triggers:
//!
//! - **Timing** - Beat time, time signatures, `bars:beats:sixteenths` values
//! - **Pattern** - Hit grids, repeat counts and section expansion
//! - **Durations** - Legato note lengths inferred from sparse rhythms
//! - **Tracks** - Chord timelines, drum tracks and loop sequencers
//! - **Scheduler** - One transport firing every track in time order
//! - **Song** - Builder, lifecycle and settings summary
//!
//! # Architecture
//!
//! Every component is built against one explicit [`SongContext`] (time
//! signature, tempo, humanize). A [`SongBuilder`] registers tracks with a
//! [`Scheduler`], which fires them through the [`Instrument`] capability and
//! the optional [`VisualizationHook`]. Audio rendering lives behind the
//! instrument trait and is not part of this crate.

pub mod context;
pub mod cursor;
pub mod durations;
pub mod error;
pub mod instrument;
pub mod pattern;
pub mod pitch;
pub mod scheduler;
pub mod song;
pub mod timing;
pub mod tracks;
pub mod visual;

pub use context::{SongContext, DEFAULT_HUMANIZE_SECONDS};
pub use cursor::PlaybackCursor;
pub use durations::{infer_durations, DurationSequence};
pub use error::{InstrumentError, Result, SongError};
pub use instrument::{
    Envelope, Instrument, InstrumentKind, InstrumentSpec, LogVoice, RecordedTrigger,
    RecordingInstrument, TriggerLog, TriggerRequest, Waveform,
};
pub use pattern::{expand, expand_grids, flatten_bar_lengths, FlatSequence, HitGrid, RepeatCount};
pub use pitch::{Pitch, PitchSet};
pub use scheduler::{RunReport, Scheduler, StopHandle, TriggerFailure};
pub use song::{InstrumentSummary, RhythmSummary, Song, SongBuilder, SongSettings, SongState};
pub use timing::{BarsBeatsSixteenths, BeatTime, TimeSignature, TransportClock};
pub use tracks::{ChordTimeline, ChordTimelineEntry, ChordTrack, DrumTrack, LoopSequencer, SoloPart, Track};
pub use visual::{ChannelHook, VisualPayload, VisualizationHook};
