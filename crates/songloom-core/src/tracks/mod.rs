//! Playable tracks.
//!
//! A track owns its instrument, its optional visualization hook and the
//! cursor state that decides what it plays next. The scheduler only asks a
//! track when its next trigger is due and tells it to fire.

pub mod chords;
pub mod drums;
pub mod sequencer;

pub use chords::{ChordTimeline, ChordTimelineEntry, ChordTrack};
pub use drums::DrumTrack;
pub use sequencer::{LoopSequencer, SoloPart};

use crate::context::SongContext;
use crate::error::{Result, SongError};
use crate::instrument::{Instrument, TriggerRequest};
use crate::timing::BeatTime;
use crate::visual::{VisualPayload, VisualizationHook};

/// A source of time-ordered triggers.
pub trait Track: Send {
    /// Name used in logs, reports and hook payloads.
    fn name(&self) -> &str;

    /// Beat position of the next pending trigger, or `None` once the track
    /// has nothing left to play.
    fn next_beat(&self) -> Option<BeatTime>;

    /// Fire the pending trigger and move on to the next one.
    ///
    /// The track advances even when its instrument rejects the trigger.
    fn fire(&mut self, ctx: &SongContext) -> Result<()>;

    /// Name of the instrument this track plays.
    fn instrument_name(&self) -> &str;
}

/// Instrument plus optional hook, fired together.
pub(crate) struct Voice {
    instrument: Box<dyn Instrument>,
    hook: Option<Box<dyn VisualizationHook>>,
}

impl Voice {
    pub(crate) fn new(
        instrument: Box<dyn Instrument>,
        hook: Option<Box<dyn VisualizationHook>>,
    ) -> Self {
        Self { instrument, hook }
    }

    pub(crate) fn instrument_name(&self) -> &str {
        self.instrument.name()
    }

    /// Trigger the instrument, then the hook with the same payload.
    ///
    /// A rejected trigger is not shown to the hook.
    pub(crate) fn sound(&mut self, track: &str, request: TriggerRequest) -> Result<()> {
        log::trace!("{track}: {request}");
        self.instrument
            .trigger(&request)
            .map_err(|source| SongError::Instrument {
                track: track.to_string(),
                source,
            })?;

        if let Some(hook) = self.hook.as_mut() {
            hook.on_trigger(&VisualPayload {
                track: track.to_string(),
                pitches: request.pitches,
                duration: request.duration,
                time: request.time,
            });
        }
        Ok(())
    }
}
