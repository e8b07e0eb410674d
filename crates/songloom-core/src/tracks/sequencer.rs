//! Loop sequencer for bass and solo lines.
//!
//! The rhythm, the notes and the note lengths are three independent flat
//! sequences. On every onset of the rhythm the sequencer takes the next
//! note and the next duration from the front of their queues and puts them
//! back at the end, so all three stay in lock-step for as long as their
//! lengths agree and drift in a predictable way when they do not.

use rand::rngs::StdRng;
use rand::Rng;

use super::{Track, Voice};
use crate::context::SongContext;
use crate::cursor::PlaybackCursor;
use crate::durations::infer_durations;
use crate::error::Result;
use crate::instrument::{Instrument, TriggerRequest};
use crate::pattern::{expand, expand_grids, HitGrid, RepeatCount};
use crate::pitch::PitchSet;
use crate::timing::{BarsBeatsSixteenths, BeatTime};
use crate::visual::VisualizationHook;

/// Section-level description of a repeating solo or bass part.
#[derive(Clone, Debug, PartialEq)]
pub struct SoloPart {
    pub name: String,
    /// Notes of each section, played in order on that section's onsets.
    pub notes: Vec<Vec<PitchSet>>,
    /// Rhythm of each section.
    pub patterns: Vec<HitGrid>,
    /// How often each section repeats. Shared by notes and patterns.
    pub repeat_counts: Vec<RepeatCount>,
    /// Silence before the first loop starts.
    pub start: BarsBeatsSixteenths,
    pub looping: bool,
    pub humanize: bool,
}

impl SoloPart {
    /// A looping part starting at the origin, without humanize.
    pub fn new(
        name: impl Into<String>,
        notes: Vec<Vec<PitchSet>>,
        patterns: Vec<HitGrid>,
        repeat_counts: Vec<RepeatCount>,
    ) -> Self {
        Self {
            name: name.into(),
            notes,
            patterns,
            repeat_counts,
            start: BarsBeatsSixteenths::default(),
            looping: true,
            humanize: false,
        }
    }

    pub fn starting_at(mut self, start: BarsBeatsSixteenths) -> Self {
        self.start = start;
        self
    }

    /// Play through the part once instead of looping.
    pub fn once(mut self) -> Self {
        self.looping = false;
        self
    }

    pub fn humanized(mut self, humanize: bool) -> Self {
        self.humanize = humanize;
        self
    }
}

/// Plays a flat note sequence against a flat rhythm.
pub struct LoopSequencer {
    name: String,
    voice: Voice,
    grid_len: u64,
    onsets: Vec<usize>,
    notes: PlaybackCursor<PitchSet>,
    durations: PlaybackCursor<u32>,
    start: BeatTime,
    looping: bool,
    humanizer: Option<StdRng>,
    next_onset: usize,
    cycle: u64,
    finished: bool,
}

impl LoopSequencer {
    /// Expand a part into its flat sequences and prepare the cursors.
    ///
    /// `stream` picks the random stream used for humanize so that parts of
    /// a seeded song do not share offsets.
    pub fn build(
        part: SoloPart,
        instrument: Box<dyn Instrument>,
        hook: Option<Box<dyn VisualizationHook>>,
        ctx: &SongContext,
        stream: u64,
    ) -> Result<Self> {
        let grid = expand_grids(&part.patterns, &part.repeat_counts)?;
        let flat_notes: Vec<PitchSet> = expand(&part.notes, &part.repeat_counts)?;
        let durations = infer_durations(&grid)?;
        let onsets = grid.onsets();

        if onsets.len() != flat_notes.len() {
            log::warn!(
                "{}: {} onsets but {} notes, notes will drift against the rhythm",
                part.name,
                onsets.len(),
                flat_notes.len()
            );
        }

        let start = part.start.to_beat_time(ctx.signature());
        log::debug!(
            "{}: {} steps, {} onsets, start {}, looping {}, humanize {}",
            part.name,
            grid.len(),
            onsets.len(),
            part.start,
            part.looping,
            part.humanize
        );

        Ok(Self {
            name: part.name,
            voice: Voice::new(instrument, hook),
            grid_len: grid.len() as u64,
            onsets,
            notes: PlaybackCursor::new(flat_notes, "solo notes")?,
            durations: PlaybackCursor::new(durations, "note durations")?,
            start,
            looping: part.looping,
            humanizer: part.humanize.then(|| ctx.rng_for(stream)),
            next_onset: 0,
            cycle: 0,
            finished: false,
        })
    }

    /// Notes in the order they will be played next.
    pub fn upcoming_notes(&self) -> impl Iterator<Item = &PitchSet> {
        self.notes.iter()
    }

    /// Number of complete passes through the rhythm so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Loop length in sixteenth steps.
    pub fn grid_len(&self) -> u64 {
        self.grid_len
    }

    fn offset(&mut self, ctx: &SongContext) -> f64 {
        let limit = ctx.humanize_limit();
        match self.humanizer.as_mut() {
            Some(rng) if limit > 0.0 => rng.random_range(-limit..limit),
            _ => 0.0,
        }
    }
}

impl Track for LoopSequencer {
    fn name(&self) -> &str {
        &self.name
    }

    fn instrument_name(&self) -> &str {
        self.voice.instrument_name()
    }

    fn next_beat(&self) -> Option<BeatTime> {
        if self.finished {
            return None;
        }
        let step = self.cycle * self.grid_len + self.onsets[self.next_onset] as u64;
        Some(self.start + BeatTime::from_sixteenths(step))
    }

    fn fire(&mut self, ctx: &SongContext) -> Result<()> {
        let Some(beat) = self.next_beat() else {
            return Ok(());
        };

        let pitches = self.notes.advance().clone();
        let steps = *self.durations.advance();
        self.next_onset += 1;
        if self.next_onset == self.onsets.len() {
            self.next_onset = 0;
            self.cycle += 1;
            self.finished = !self.looping;
        }

        let time = (ctx.seconds_at(beat) + self.offset(ctx)).max(0.0);
        let request = TriggerRequest::note(pitches, BarsBeatsSixteenths::from_sixteenths(steps), time);
        self.voice.sound(&self.name, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{InstrumentKind, InstrumentSpec, RecordingInstrument, TriggerLog};
    use crate::timing::TimeSignature;

    fn notes(names: &[&str]) -> Vec<PitchSet> {
        names.iter().map(|n| PitchSet::parse(&[*n]).unwrap()).collect()
    }

    fn bass(log: &TriggerLog) -> Box<dyn Instrument> {
        Box::new(RecordingInstrument::new(
            InstrumentSpec::new("bass", InstrumentKind::Mono),
            log.clone(),
        ))
    }

    fn drain(seq: &mut LoopSequencer, ctx: &SongContext, count: usize) -> Vec<BeatTime> {
        let mut beats = Vec::new();
        for _ in 0..count {
            let Some(beat) = seq.next_beat() else { break };
            beats.push(beat);
            seq.fire(ctx).unwrap();
        }
        beats
    }

    #[test]
    fn test_notes_and_durations_follow_onsets() {
        let ctx = SongContext::default();
        let log = TriggerLog::new();
        let part = SoloPart::new(
            "bass",
            vec![notes(&["A2", "C3", "E3"])],
            vec![HitGrid::new(vec![1, 0, 0, 1, 0, 1, 0, 0]).unwrap()],
            vec![1.into()],
        );
        let mut seq = LoopSequencer::build(part, bass(&log), None, &ctx, 0).unwrap();

        let beats = drain(&mut seq, &ctx, 4);
        let expected: Vec<BeatTime> = [0, 3, 5, 8]
            .iter()
            .map(|s| BeatTime::from_sixteenths(*s))
            .collect();
        assert_eq!(beats, expected);

        let played = log.for_instrument("bass");
        let names: Vec<String> = played
            .iter()
            .map(|r| r.pitches.as_ref().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["A2", "C3", "E3", "A2"]);
        let steps: Vec<u32> = played.iter().map(|r| r.duration.unwrap().sixteenths).collect();
        assert_eq!(steps, vec![3, 2, 3, 3]);
        assert!((played[1].time - 3.0 * ctx.step_seconds()).abs() < 1e-9);
    }

    #[test]
    fn test_sections_expand_by_repeat_count() {
        let ctx = SongContext::default();
        let log = TriggerLog::new();
        let part = SoloPart::new(
            "bass",
            vec![notes(&["A2"]), notes(&["B2", "C3"])],
            vec![
                HitGrid::from_steps("x...").unwrap(),
                HitGrid::from_steps("x.x.").unwrap(),
            ],
            vec![2.into(), 1.into()],
        )
        .once();
        let mut seq = LoopSequencer::build(part, bass(&log), None, &ctx, 0).unwrap();
        assert_eq!(seq.grid_len(), 12);

        let beats = drain(&mut seq, &ctx, 10);
        assert_eq!(beats.len(), 4);
        assert_eq!(seq.next_beat(), None);

        let names: Vec<String> = log
            .for_instrument("bass")
            .iter()
            .map(|r| r.pitches.as_ref().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["A2", "A2", "B2", "C3"]);
    }

    #[test]
    fn test_start_offset_delays_first_onset() {
        let ctx = SongContext::new(TimeSignature::four_four(), 120.0).unwrap();
        let log = TriggerLog::new();
        let part = SoloPart::new(
            "lead",
            vec![notes(&["E4"])],
            vec![HitGrid::from_steps("x...").unwrap()],
            vec![1.into()],
        )
        .starting_at(BarsBeatsSixteenths::new(1, 0, 0));
        let seq = LoopSequencer::build(part, bass(&log), None, &ctx, 0).unwrap();
        assert_eq!(seq.next_beat(), Some(BeatTime::from_float(4.0)));
    }

    #[test]
    fn test_rotation_returns_to_original_order() {
        let ctx = SongContext::default();
        let log = TriggerLog::new();
        let part = SoloPart::new(
            "bass",
            vec![notes(&["A2", "C3", "E3"])],
            vec![HitGrid::from_steps("x.x.x...").unwrap()],
            vec![1.into()],
        );
        let mut seq = LoopSequencer::build(part, bass(&log), None, &ctx, 0).unwrap();
        let before: Vec<PitchSet> = seq.upcoming_notes().cloned().collect();
        drain(&mut seq, &ctx, 3);
        let after: Vec<PitchSet> = seq.upcoming_notes().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(seq.cycles(), 1);
    }

    #[test]
    fn test_humanize_never_reorders_onsets() {
        let ctx = SongContext::new(TimeSignature::four_four(), 240.0)
            .unwrap()
            .with_humanize(1.0)
            .with_seed(7);
        let log = TriggerLog::new();
        let part = SoloPart::new(
            "lead",
            vec![notes(&["A4"])],
            vec![HitGrid::from_steps("xxxxxxxxxxxxxxxx").unwrap()],
            vec![1.into()],
        )
        .humanized(true);
        let mut seq = LoopSequencer::build(part, bass(&log), None, &ctx, 3).unwrap();
        drain(&mut seq, &ctx, 64);

        let times: Vec<f64> = log.for_instrument("bass").iter().map(|r| r.time).collect();
        assert_eq!(times.len(), 64);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        for (i, t) in times.iter().enumerate() {
            let nominal = i as f64 * ctx.step_seconds();
            assert!((t - nominal).abs() < ctx.step_seconds() / 2.0);
        }
    }

    #[test]
    fn test_rejects_rhythm_without_onsets() {
        let ctx = SongContext::default();
        let log = TriggerLog::new();
        let part = SoloPart::new(
            "bass",
            vec![notes(&["A2"])],
            vec![HitGrid::from_steps("....").unwrap()],
            vec![1.into()],
        );
        assert!(LoopSequencer::build(part, bass(&log), None, &ctx, 0).is_err());
    }
}
