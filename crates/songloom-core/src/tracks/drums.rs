//! Drum tracks: one looping hit grid, instantaneous hits.

use super::{Track, Voice};
use crate::context::SongContext;
use crate::error::{Result, SongError};
use crate::instrument::{Instrument, TriggerRequest};
use crate::pattern::HitGrid;
use crate::pitch::Pitch;
use crate::timing::BeatTime;
use crate::visual::VisualizationHook;

pub struct DrumTrack {
    name: String,
    voice: Voice,
    grid_len: u64,
    onsets: Vec<usize>,
    /// Fixed tuning, e.g. a kick pitched to the key root.
    pitch: Option<Pitch>,
    next_onset: usize,
    cycle: u64,
}

impl DrumTrack {
    pub fn new(
        name: impl Into<String>,
        pattern: &HitGrid,
        instrument: Box<dyn Instrument>,
        hook: Option<Box<dyn VisualizationHook>>,
    ) -> Result<Self> {
        let name = name.into();
        if pattern.is_empty() {
            return Err(SongError::InvalidPattern(format!(
                "drum track '{name}' has an empty grid"
            )));
        }
        let onsets = pattern.onsets();
        if onsets.is_empty() {
            log::debug!("{name}: all rests, track stays silent");
        }
        log::debug!("{name}: {} hits in {} steps", onsets.len(), pattern.len());
        Ok(Self {
            name,
            voice: Voice::new(instrument, hook),
            grid_len: pattern.len() as u64,
            onsets,
            pitch: None,
            next_onset: 0,
            cycle: 0,
        })
    }

    pub fn tuned(mut self, pitch: Pitch) -> Self {
        self.pitch = Some(pitch);
        self
    }
}

impl Track for DrumTrack {
    fn name(&self) -> &str {
        &self.name
    }

    fn instrument_name(&self) -> &str {
        self.voice.instrument_name()
    }

    fn next_beat(&self) -> Option<BeatTime> {
        let onset = *self.onsets.get(self.next_onset)?;
        let step = self.cycle * self.grid_len + onset as u64;
        Some(BeatTime::from_sixteenths(step))
    }

    fn fire(&mut self, ctx: &SongContext) -> Result<()> {
        let Some(beat) = self.next_beat() else {
            return Ok(());
        };
        self.next_onset += 1;
        if self.next_onset == self.onsets.len() {
            self.next_onset = 0;
            self.cycle += 1;
        }
        let request = TriggerRequest::hit(self.pitch.map(Into::into), ctx.seconds_at(beat));
        self.voice.sound(&self.name, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{InstrumentKind, InstrumentSpec, RecordingInstrument, TriggerLog};
    use crate::visual::VisualPayload;
    use std::sync::{Arc, Mutex};

    fn kick(log: &TriggerLog) -> Box<dyn Instrument> {
        Box::new(RecordingInstrument::new(
            InstrumentSpec::new("KickDrum", InstrumentKind::Drum),
            log.clone(),
        ))
    }

    #[test]
    fn test_hits_loop_on_sixteenth_grid() {
        let ctx = SongContext::default();
        let log = TriggerLog::new();
        let grid = HitGrid::from_steps("x...x...").unwrap();
        let mut track = DrumTrack::new("kick", &grid, kick(&log), None).unwrap();

        let mut beats = Vec::new();
        for _ in 0..4 {
            beats.push(track.next_beat().unwrap().to_float());
            track.fire(&ctx).unwrap();
        }
        assert_eq!(beats, vec![0.0, 1.0, 2.0, 3.0]);
        assert!(log.snapshot().iter().all(|r| r.request.duration.is_none()));
        assert!(log.snapshot().iter().all(|r| r.request.pitches.is_none()));
    }

    #[test]
    fn test_hook_sees_same_payload() {
        let ctx = SongContext::default();
        let log = TriggerLog::new();
        let seen: Arc<Mutex<Vec<VisualPayload>>> = Arc::default();
        let sink = seen.clone();
        let hook = move |p: &VisualPayload| sink.lock().unwrap().push(p.clone());

        let grid = HitGrid::from_steps("..x.").unwrap();
        let a1 = Pitch::from_midi(33).unwrap();
        let mut track = DrumTrack::new("kick", &grid, kick(&log), Some(Box::new(hook)))
            .unwrap()
            .tuned(a1);
        track.fire(&ctx).unwrap();

        let seen = seen.lock().unwrap();
        let recorded = &log.snapshot()[0].request;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].time, recorded.time);
        assert_eq!(seen[0].pitches, recorded.pitches);
        assert_eq!(seen[0].duration, None);
        assert!((seen[0].time - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_all_rest_grid_is_silent() {
        let ctx = SongContext::default();
        let log = TriggerLog::new();
        let grid = HitGrid::from_steps("....|....").unwrap();
        let mut track = DrumTrack::new("shaker", &grid, kick(&log), None).unwrap();

        assert_eq!(track.next_beat(), None);
        track.fire(&ctx).unwrap();
        assert_eq!(track.next_beat(), None);
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_empty_grid_is_invalid() {
        let log = TriggerLog::new();
        let grid = HitGrid::new(Vec::new()).unwrap();
        assert!(matches!(
            DrumTrack::new("kick", &grid, kick(&log), None),
            Err(SongError::InvalidPattern(_))
        ));
    }
}
