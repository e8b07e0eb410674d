//! Chord timeline.
//!
//! A progression is paired with a bar spec. A plain number holds the chord
//! for that many bars; a list plays the chord once per entry, each
//! occurrence lasting its own number of bars. Occurrence j starts where
//! occurrence j-1 ended.

use super::{Track, Voice};
use crate::context::SongContext;
use crate::error::{Result, SongError};
use crate::instrument::{Instrument, TriggerRequest};
use crate::pattern::RepeatCount;
use crate::pitch::PitchSet;
use crate::timing::{BarsBeatsSixteenths, BeatTime, TimeSignature};
use crate::visual::VisualizationHook;

/// One chord occurrence.
#[derive(Clone, Debug, PartialEq)]
pub struct ChordTimelineEntry {
    /// Start relative to the loop origin.
    pub start: BarsBeatsSixteenths,
    pub chord: PitchSet,
    /// How long the chord sounds.
    pub duration: BarsBeatsSixteenths,
    pub bars: u32,
}

/// Immutable, loopable list of chord occurrences.
#[derive(Clone, Debug, PartialEq)]
pub struct ChordTimeline {
    entries: Vec<ChordTimelineEntry>,
    total_bars: u32,
    signature: TimeSignature,
}

impl ChordTimeline {
    /// Lay out a progression against its bar spec.
    pub fn build(
        progression: &[PitchSet],
        chord_bars: &[RepeatCount],
        signature: TimeSignature,
    ) -> Result<Self> {
        if progression.is_empty() {
            return Err(SongError::EmptySequence("chord progression"));
        }
        if progression.len() != chord_bars.len() {
            return Err(SongError::LengthMismatch {
                what: "chord bars",
                expected: progression.len(),
                actual: chord_bars.len(),
            });
        }

        let mut entries = Vec::new();
        let mut elapsed = 0u32;
        for (index, (chord, spec)) in progression.iter().zip(chord_bars).enumerate() {
            let lengths = spec.bar_lengths();
            if lengths.is_empty() {
                return Err(SongError::InvalidBarLength {
                    index,
                    reason: "empty bar array".to_string(),
                });
            }
            for &bars in lengths {
                if bars == 0 {
                    return Err(SongError::InvalidBarLength {
                        index,
                        reason: "a chord must last at least one bar".to_string(),
                    });
                }
                let overflow = || SongError::InvalidBarLength {
                    index,
                    reason: format!("{bars} bars overflow the chord timeline"),
                };
                // the loop end bounds both start and duration
                let end = elapsed
                    .checked_add(bars)
                    .filter(|&end| BarsBeatsSixteenths::from_bars(end, signature).is_some())
                    .ok_or_else(overflow)?;
                entries.push(ChordTimelineEntry {
                    start: BarsBeatsSixteenths::from_bars(elapsed, signature).ok_or_else(overflow)?,
                    chord: chord.clone(),
                    duration: BarsBeatsSixteenths::from_bars(bars, signature).ok_or_else(overflow)?,
                    bars,
                });
                elapsed = end;
            }
        }

        log::debug!(
            "chord timeline: {} occurrences over {} bars of {}",
            entries.len(),
            elapsed,
            signature
        );

        Ok(Self {
            entries,
            total_bars: elapsed,
            signature,
        })
    }

    pub fn entries(&self) -> &[ChordTimelineEntry] {
        &self.entries
    }

    /// Loop length in bars; other parts synchronise to this.
    pub fn total_bars(&self) -> u32 {
        self.total_bars
    }

    pub fn signature(&self) -> TimeSignature {
        self.signature
    }

    /// Start of an entry in beats.
    pub fn start_beat(&self, index: usize) -> Option<BeatTime> {
        self.entries
            .get(index)
            .map(|entry| entry.start.to_beat_time(self.signature))
    }

    pub fn loop_beats(&self) -> BeatTime {
        BeatTime::from_bars(self.total_bars as u64, self.signature)
    }
}

/// Plays a chord timeline forever.
pub struct ChordTrack {
    name: String,
    timeline: ChordTimeline,
    voice: Voice,
    next_entry: usize,
    cycle: u64,
}

impl ChordTrack {
    pub fn new(
        name: impl Into<String>,
        timeline: ChordTimeline,
        instrument: Box<dyn Instrument>,
        hook: Option<Box<dyn VisualizationHook>>,
    ) -> Self {
        Self {
            name: name.into(),
            timeline,
            voice: Voice::new(instrument, hook),
            next_entry: 0,
            cycle: 0,
        }
    }

    pub fn timeline(&self) -> &ChordTimeline {
        &self.timeline
    }
}

impl Track for ChordTrack {
    fn name(&self) -> &str {
        &self.name
    }

    fn instrument_name(&self) -> &str {
        self.voice.instrument_name()
    }

    fn next_beat(&self) -> Option<BeatTime> {
        let loop_start = BeatTime::from_bars(
            self.cycle * self.timeline.total_bars as u64,
            self.timeline.signature,
        );
        self.timeline
            .start_beat(self.next_entry)
            .map(|start| loop_start + start)
    }

    fn fire(&mut self, ctx: &SongContext) -> Result<()> {
        let Some(beat) = self.next_beat() else {
            return Ok(());
        };
        let entry = &self.timeline.entries[self.next_entry];
        let request = TriggerRequest::note(entry.chord.clone(), entry.duration, ctx.seconds_at(beat));

        self.next_entry += 1;
        if self.next_entry == self.timeline.entries.len() {
            self.next_entry = 0;
            self.cycle += 1;
        }
        self.voice.sound(&self.name, request)
    }
}
