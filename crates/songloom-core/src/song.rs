//! Song assembly and lifecycle.
//!
//! [`SongBuilder`] turns section-level musical data into tracks and hands
//! them to one [`Scheduler`]. The resulting [`Song`] moves through
//! `Built -> Playing -> Stopped`; a stopped song cannot be restarted, build
//! a new one instead (which also gives every track fresh cursors).

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::context::SongContext;
use crate::error::{Result, SongError};
use crate::instrument::Instrument;
use crate::pattern::{HitGrid, RepeatCount};
use crate::pitch::{Pitch, PitchSet};
use crate::scheduler::{RunReport, Scheduler, StopHandle};
use crate::timing::BeatTime;
use crate::tracks::{ChordTimeline, ChordTrack, DrumTrack, LoopSequencer, SoloPart, Track};
use crate::visual::VisualizationHook;

/// Lifecycle state of a song.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SongState {
    Built,
    Playing,
    Stopped,
}

impl fmt::Display for SongState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SongState::Built => "built",
            SongState::Playing => "playing",
            SongState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A rhythm as shown in the settings summary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RhythmSummary {
    pub track: String,
    pub pattern: String,
}

/// A track and the instrument it plays.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstrumentSummary {
    pub track: String,
    pub instrument: String,
}

/// Human-readable description of a generated song.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SongSettings {
    pub key: Option<String>,
    pub bpm: f64,
    pub time_signature: String,
    pub progression: Option<String>,
    pub chord_bars: Vec<String>,
    pub loop_bars: Option<u32>,
    pub rhythms: Vec<RhythmSummary>,
    pub instruments: Vec<InstrumentSummary>,
}

impl SongSettings {
    fn new(ctx: &SongContext) -> Self {
        Self {
            key: None,
            bpm: ctx.bpm(),
            time_signature: ctx.signature().to_string(),
            progression: None,
            chord_bars: Vec::new(),
            loop_bars: None,
            rhythms: Vec::new(),
            instruments: Vec::new(),
        }
    }
}

impl fmt::Display for SongSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(key) = &self.key {
            writeln!(f, "Key:         {key}")?;
        }
        writeln!(f, "Tempo:       {} BPM ({})", self.bpm, self.time_signature)?;
        if let Some(progression) = &self.progression {
            writeln!(f, "Progression: {progression}")?;
            writeln!(f, "Chord bars:  {}", self.chord_bars.join(", "))?;
        }
        if let Some(bars) = self.loop_bars {
            writeln!(f, "Loop:        {bars} bars")?;
        }
        if !self.rhythms.is_empty() {
            writeln!(f, "Rhythms:")?;
            for rhythm in &self.rhythms {
                writeln!(f, "  {:<10} {}", rhythm.track, rhythm.pattern)?;
            }
        }
        writeln!(f, "Instruments:")?;
        for entry in &self.instruments {
            writeln!(f, "  {:<10} {}", entry.track, entry.instrument)?;
        }
        Ok(())
    }
}

/// Collects the parts of a song before playback.
pub struct SongBuilder {
    ctx: SongContext,
    scheduler: Scheduler,
    settings: SongSettings,
    loop_bars: Option<u32>,
}

impl SongBuilder {
    pub fn new(ctx: SongContext) -> Self {
        let settings = SongSettings::new(&ctx);
        Self {
            ctx,
            scheduler: Scheduler::new(StopHandle::new()),
            settings,
            loop_bars: None,
        }
    }

    pub fn context(&self) -> &SongContext {
        &self.ctx
    }

    /// Stop handle of the song being built, e.g. for a hook that ends playback.
    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }

    /// Key label shown in the settings summary.
    pub fn with_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.settings.key = Some(key.into());
        self
    }

    /// Progression label shown in the settings summary, e.g. `i - VI - III - VII`.
    pub fn with_progression_label(&mut self, label: impl Into<String>) -> &mut Self {
        self.settings.progression = Some(label.into());
        self
    }

    fn register(&mut self, track: Box<dyn Track>) {
        self.settings.instruments.push(InstrumentSummary {
            track: track.name().to_string(),
            instrument: track.instrument_name().to_string(),
        });
        self.scheduler.add_track(track);
    }

    /// Add a looping percussion track.
    pub fn add_drum_part(
        &mut self,
        name: &str,
        pattern: &HitGrid,
        instrument: Box<dyn Instrument>,
        hook: Option<Box<dyn VisualizationHook>>,
    ) -> Result<&mut Self> {
        let track = DrumTrack::new(name, pattern, instrument, hook)?;
        self.add_rhythm(name, pattern.to_steps());
        self.register(Box::new(track));
        Ok(self)
    }

    /// Add a percussion track that always sounds one pitch.
    pub fn add_tuned_drum_part(
        &mut self,
        name: &str,
        pattern: &HitGrid,
        pitch: Pitch,
        instrument: Box<dyn Instrument>,
        hook: Option<Box<dyn VisualizationHook>>,
    ) -> Result<&mut Self> {
        let track = DrumTrack::new(name, pattern, instrument, hook)?.tuned(pitch);
        self.add_rhythm(name, format!("{} @ {}", pattern.to_steps(), pitch));
        self.register(Box::new(track));
        Ok(self)
    }

    /// Add the chord track. Its length becomes the song's loop length.
    pub fn add_chord_progression(
        &mut self,
        name: &str,
        progression: &[PitchSet],
        chord_bars: &[RepeatCount],
        instrument: Box<dyn Instrument>,
        hook: Option<Box<dyn VisualizationHook>>,
    ) -> Result<&mut Self> {
        let timeline = ChordTimeline::build(progression, chord_bars, self.ctx.signature())?;
        self.loop_bars = Some(timeline.total_bars());
        self.settings.loop_bars = self.loop_bars;
        self.settings.chord_bars = chord_bars.iter().map(|c| c.to_string()).collect();
        if self.settings.progression.is_none() {
            let names: Vec<String> = progression.iter().map(|c| c.to_string()).collect();
            self.settings.progression = Some(names.join(" - "));
        }
        self.register(Box::new(ChordTrack::new(name, timeline, instrument, hook)));
        Ok(self)
    }

    /// Add a looping solo line from the origin with humanize on.
    pub fn add_solo_part(
        &mut self,
        name: &str,
        notes: Vec<Vec<PitchSet>>,
        patterns: Vec<HitGrid>,
        repeat_counts: Vec<RepeatCount>,
        instrument: Box<dyn Instrument>,
        hook: Option<Box<dyn VisualizationHook>>,
    ) -> Result<&mut Self> {
        let part = SoloPart::new(name, notes, patterns, repeat_counts).humanized(true);
        self.add_repeating_solo_part(part, instrument, hook)
    }

    /// Add a bass or solo part with full control over start, looping and humanize.
    pub fn add_repeating_solo_part(
        &mut self,
        part: SoloPart,
        instrument: Box<dyn Instrument>,
        hook: Option<Box<dyn VisualizationHook>>,
    ) -> Result<&mut Self> {
        let name = part.name.clone();
        let pattern = part
            .patterns
            .iter()
            .zip(&part.repeat_counts)
            .map(|(grid, count)| format!("{} x{}", grid.to_steps(), count.repeats()))
            .collect::<Vec<_>>()
            .join(" | ");
        let stream = self.scheduler.track_count() as u64;
        let sequencer = LoopSequencer::build(part, instrument, hook, &self.ctx, stream)?;
        self.add_rhythm(&name, pattern);
        self.register(Box::new(sequencer));
        Ok(self)
    }

    fn add_rhythm(&mut self, track: &str, pattern: String) {
        self.settings.rhythms.push(RhythmSummary {
            track: track.to_string(),
            pattern,
        });
    }

    /// Finish building. The song starts in the `Built` state.
    pub fn build(self) -> Result<Song> {
        if self.scheduler.track_count() == 0 {
            return Err(SongError::EmptySequence("song tracks"));
        }
        log::debug!(
            "song built: {} tracks, loop {:?} bars",
            self.scheduler.track_count(),
            self.loop_bars
        );
        Ok(Song {
            ctx: self.ctx,
            scheduler: self.scheduler,
            settings: self.settings,
            loop_bars: self.loop_bars,
            state: SongState::Built,
        })
    }
}

/// A built song and its transport.
pub struct Song {
    ctx: SongContext,
    scheduler: Scheduler,
    settings: SongSettings,
    loop_bars: Option<u32>,
    state: SongState,
}

impl Song {
    pub fn context(&self) -> &SongContext {
        &self.ctx
    }

    pub fn settings(&self) -> &SongSettings {
        &self.settings
    }

    /// Loop length in bars, set by the chord progression.
    pub fn loop_bars(&self) -> Option<u32> {
        self.loop_bars
    }

    pub fn state(&self) -> SongState {
        if self.scheduler.stop_handle().is_stopped() {
            SongState::Stopped
        } else {
            self.state
        }
    }

    pub fn position(&self) -> BeatTime {
        self.scheduler.position()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }

    /// Start the transport.
    pub fn play(&mut self) -> Result<()> {
        match self.state() {
            SongState::Built => {
                self.state = SongState::Playing;
                log::info!("song playing at {} BPM", self.ctx.bpm());
                Ok(())
            }
            state => Err(SongError::InvalidState {
                state,
                operation: "play",
            }),
        }
    }

    /// Stop the transport. No trigger fires afterwards.
    pub fn stop(&mut self) {
        if self.state != SongState::Stopped {
            self.scheduler.stop_handle().stop();
            self.state = SongState::Stopped;
            log::info!("song stopped at beat {}", self.scheduler.position());
        }
    }

    fn require_playing(&self, operation: &'static str) -> Result<()> {
        match self.state() {
            SongState::Playing => Ok(()),
            state => Err(SongError::InvalidState { state, operation }),
        }
    }

    fn settle(&mut self, report: &RunReport) {
        if report.stopped {
            self.stop();
        }
    }

    /// Fire every trigger before `end` without waiting for the clock.
    pub fn advance_to(&mut self, end: BeatTime) -> Result<RunReport> {
        self.require_playing("advance")?;
        let report = self.scheduler.advance_to(end, &self.ctx);
        self.settle(&report);
        Ok(report)
    }

    /// Advance by whole bars from the current position.
    pub fn advance_bars(&mut self, bars: u32) -> Result<RunReport> {
        let end = self.position() + BeatTime::from_bars(bars as u64, self.ctx.signature());
        self.advance_to(end)
    }

    /// Play against the wall clock for `limit`, or until stopped.
    pub fn run_realtime(&mut self, limit: Option<Duration>, poll: Duration) -> Result<RunReport> {
        self.require_playing("run")?;
        let end = limit.map(|limit| {
            let beats = limit.as_secs_f64() * self.ctx.bpm() / 60.0;
            self.position() + BeatTime::from_float(beats)
        });
        let report = self.scheduler.run_realtime(&self.ctx, end, poll);
        self.settle(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstrumentError;
    use crate::instrument::{
        InstrumentKind, InstrumentSpec, RecordingInstrument, TriggerLog, TriggerRequest,
    };
    use crate::timing::TimeSignature;
    use crate::visual::VisualPayload;
    use std::sync::{Arc, Mutex};

    fn recorder(name: &str, kind: InstrumentKind, log: &TriggerLog) -> Box<dyn Instrument> {
        Box::new(RecordingInstrument::new(InstrumentSpec::new(name, kind), log.clone()))
    }

    fn chords() -> Vec<PitchSet> {
        vec![
            PitchSet::parse(&["C4", "E4", "G4"]).unwrap(),
            PitchSet::parse(&["F4", "A4", "C5"]).unwrap(),
        ]
    }

    fn lofi_song(log: &TriggerLog) -> Song {
        let _ = env_logger::builder().is_test(true).try_init();
        let ctx = SongContext::default().with_seed(11);
        let mut builder = SongBuilder::new(ctx);
        builder.with_key("C major");
        builder
            .add_chord_progression(
                "chords",
                &chords(),
                &[1.into(), RepeatCount::Bars(vec![1, 1])],
                recorder("SimpleSine", InstrumentKind::Poly, log),
                None,
            )
            .unwrap()
            .add_drum_part(
                "kick",
                &HitGrid::from_steps("x...x...x...x...").unwrap(),
                recorder("KickDrum", InstrumentKind::Drum, log),
                None,
            )
            .unwrap()
            .add_repeating_solo_part(
                SoloPart::new(
                    "bass",
                    vec![vec![PitchSet::parse(&["C2"]).unwrap(), PitchSet::parse(&["G2"]).unwrap()]],
                    vec![HitGrid::from_steps("x.......x.......").unwrap()],
                    vec![3.into()],
                ),
                recorder("SawTooth", InstrumentKind::Mono, log),
                None,
            )
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let log = TriggerLog::new();
        let mut song = lofi_song(&log);
        assert_eq!(song.state(), SongState::Built);
        assert!(matches!(
            song.advance_bars(1),
            Err(SongError::InvalidState { state: SongState::Built, .. })
        ));

        song.play().unwrap();
        assert!(song.play().is_err());
        song.stop();
        assert_eq!(song.state(), SongState::Stopped);
        assert!(matches!(
            song.play(),
            Err(SongError::InvalidState { state: SongState::Stopped, .. })
        ));
    }

    #[test]
    fn test_one_loop_of_triggers() {
        let log = TriggerLog::new();
        let mut song = lofi_song(&log);
        assert_eq!(song.loop_bars(), Some(3));
        song.play().unwrap();

        let report = song.advance_bars(3).unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(log.for_instrument("SimpleSine").len(), 3);
        assert_eq!(log.for_instrument("KickDrum").len(), 12);
        assert_eq!(log.for_instrument("SawTooth").len(), 6);
        assert_eq!(report.fired, 21);

        let times: Vec<f64> = log.snapshot().iter().map(|r| r.request.time).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));

        // Registration order breaks the tie at the origin
        let first: Vec<String> = log.snapshot()[..3].iter().map(|r| r.instrument.clone()).collect();
        assert_eq!(first, vec!["SimpleSine", "KickDrum", "SawTooth"]);
    }

    #[test]
    fn test_stop_from_inside_hook() {
        let log = TriggerLog::new();
        let mut builder = SongBuilder::new(SongContext::default());
        let stop = builder.stop_handle();
        let seen = Arc::new(Mutex::new(0u32));
        let counter = seen.clone();
        let hook = move |_: &VisualPayload| {
            let mut count = counter.lock().unwrap();
            *count += 1;
            if *count == 2 {
                stop.stop();
            }
        };
        builder
            .add_drum_part(
                "hat",
                &HitGrid::from_steps("xxxx").unwrap(),
                recorder("HiHat", InstrumentKind::Drum, &log),
                Some(Box::new(hook)),
            )
            .unwrap();
        let mut song = builder.build().unwrap();
        song.play().unwrap();

        let report = song.advance_bars(4).unwrap();
        assert!(report.stopped);
        assert_eq!(report.fired, 2);
        assert_eq!(log.len(), 2);
        assert_eq!(*seen.lock().unwrap(), 2);
        assert_eq!(song.state(), SongState::Stopped);
        assert!(song.advance_bars(1).is_err());
    }

    struct Flaky {
        calls: u32,
    }

    impl Instrument for Flaky {
        fn name(&self) -> &str {
            "Flaky"
        }

        fn trigger(&mut self, _request: &TriggerRequest) -> std::result::Result<(), InstrumentError> {
            self.calls += 1;
            if self.calls == 2 {
                return Err(InstrumentError::Backend("buffer underrun".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_instrument_failure_does_not_stop_playback() {
        let hooked = Arc::new(Mutex::new(Vec::new()));
        let sink = hooked.clone();
        let mut builder = SongBuilder::new(SongContext::default());
        builder
            .add_drum_part(
                "snare",
                &HitGrid::from_steps("x.x.").unwrap(),
                Box::new(Flaky { calls: 0 }),
                Some(Box::new(move |p: &VisualPayload| sink.lock().unwrap().push(p.time))),
            )
            .unwrap();
        let mut song = builder.build().unwrap();
        song.play().unwrap();

        let report = song.advance_to(BeatTime::from_float(2.0)).unwrap();
        assert_eq!(report.fired, 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].track, "snare");
        assert_eq!(report.failures[0].beat, BeatTime::from_float(0.5));
        assert_eq!(hooked.lock().unwrap().len(), 3);
        assert_eq!(song.state(), SongState::Playing);
    }

    #[test]
    fn test_all_rest_shaker_does_not_block_song() {
        let log = TriggerLog::new();
        let mut builder = SongBuilder::new(SongContext::default());
        builder
            .add_drum_part(
                "kick",
                &HitGrid::from_steps("x...x...x...x...").unwrap(),
                recorder("KickDrum", InstrumentKind::Drum, &log),
                None,
            )
            .unwrap()
            .add_drum_part(
                "shaker",
                &HitGrid::from_steps("................").unwrap(),
                recorder("Shaker", InstrumentKind::Drum, &log),
                None,
            )
            .unwrap();
        let mut song = builder.build().unwrap();
        song.play().unwrap();

        let report = song.advance_bars(2).unwrap();
        assert_eq!(report.fired, 8);
        assert_eq!(log.for_instrument("KickDrum").len(), 8);
        assert!(log.for_instrument("Shaker").is_empty());
    }

    #[test]
    fn test_rebuild_starts_from_fresh_cursors() {
        let log = TriggerLog::new();
        let mut song = lofi_song(&log);
        song.play().unwrap();
        song.advance_to(BeatTime::from_float(2.5)).unwrap();
        song.stop();
        let first_run = log.for_instrument("SawTooth");

        let fresh = TriggerLog::new();
        let mut again = lofi_song(&fresh);
        again.play().unwrap();
        again.advance_to(BeatTime::from_float(2.5)).unwrap();
        assert_eq!(fresh.for_instrument("SawTooth"), first_run);
        assert_eq!(again.position(), BeatTime::from_float(2.5));
    }

    #[test]
    fn test_settings_summary() {
        let log = TriggerLog::new();
        let song = lofi_song(&log);
        let settings = song.settings();
        assert_eq!(settings.key.as_deref(), Some("C major"));
        assert_eq!(settings.chord_bars, vec!["1", "[1,1]"]);
        assert_eq!(settings.instruments.len(), 3);
        assert_eq!(settings.instruments[2].instrument, "SawTooth");

        let text = settings.to_string();
        assert!(text.contains("Key:         C major"));
        assert!(text.contains("Loop:        3 bars"));
        assert!(text.contains("kick"));
    }

    #[test]
    fn test_empty_song_is_rejected() {
        let ctx = SongContext::new(TimeSignature::new(3, 4).unwrap(), 100.0).unwrap();
        assert!(SongBuilder::new(ctx).build().is_err());
    }
}
