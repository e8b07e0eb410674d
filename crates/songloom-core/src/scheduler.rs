//! Beat-ordered transport.
//!
//! The scheduler owns every track of one song and fires their triggers in
//! strictly increasing beat order. Triggers that fall on the same beat fire
//! in track registration order. Nothing here runs concurrently: a trigger
//! (instrument call plus hook call) always completes before the next one
//! starts, and a stop request is honoured between triggers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::context::SongContext;
use crate::timing::{BeatTime, TransportClock};
use crate::tracks::Track;

/// Shared stop flag.
///
/// Clones refer to the same flag, so a handle can be moved into a hook, a
/// signal handler or another thread.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that no further triggers fire.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The raw flag, for APIs such as `signal_hook::flag::register`.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// An instrument call that failed during playback.
#[derive(Clone, Debug, PartialEq)]
pub struct TriggerFailure {
    pub track: String,
    pub beat: BeatTime,
    pub message: String,
}

/// Summary of one transport run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunReport {
    /// Triggers attempted, including failed ones.
    pub fired: u64,
    pub failures: Vec<TriggerFailure>,
    /// Whether the run ended because of a stop request.
    pub stopped: bool,
}

impl RunReport {
    fn merge(&mut self, other: RunReport) {
        self.fired += other.fired;
        self.failures.extend(other.failures);
        self.stopped |= other.stopped;
    }
}

/// Fires the triggers of a set of tracks in time order.
pub struct Scheduler {
    tracks: Vec<Box<dyn Track>>,
    stop: StopHandle,
    position: BeatTime,
}

impl Scheduler {
    pub fn new(stop: StopHandle) -> Self {
        Self {
            tracks: Vec::new(),
            stop,
            position: BeatTime::ZERO,
        }
    }

    /// Register a track. Earlier tracks win ties.
    pub fn add_track(&mut self, track: Box<dyn Track>) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    pub fn tracks(&self) -> impl Iterator<Item = &dyn Track> {
        self.tracks.iter().map(|t| t.as_ref())
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Beat up to which the transport has been advanced.
    pub fn position(&self) -> BeatTime {
        self.position
    }

    /// The track that fires next and its beat.
    pub fn next_due(&self) -> Option<(usize, BeatTime)> {
        self.tracks
            .iter()
            .enumerate()
            .filter_map(|(index, track)| track.next_beat().map(|beat| (index, beat)))
            .min_by_key(|(index, beat)| (*beat, *index))
    }

    fn fire(&mut self, index: usize, beat: BeatTime, ctx: &SongContext, report: &mut RunReport) {
        let track = &mut self.tracks[index];
        report.fired += 1;
        if let Err(e) = track.fire(ctx) {
            log::warn!("[TRANSPORT] {} at beat {}: {}", track.name(), beat, e);
            report.failures.push(TriggerFailure {
                track: track.name().to_string(),
                beat,
                message: e.to_string(),
            });
        }
    }

    /// Fire every trigger before `end` (exclusive), as fast as possible.
    pub fn advance_to(&mut self, end: BeatTime, ctx: &SongContext) -> RunReport {
        let mut report = RunReport::default();
        while let Some((index, beat)) = self.next_due() {
            if beat >= end {
                break;
            }
            if self.stop.is_stopped() {
                report.stopped = true;
                return report;
            }
            self.fire(index, beat, ctx, &mut report);
        }
        if self.stop.is_stopped() {
            report.stopped = true;
        } else if end > self.position {
            self.position = end;
        }
        report
    }

    /// Fire triggers against the wall clock until `end`, a stop request, or
    /// until every track has finished.
    ///
    /// Waiting happens in slices of at most `poll`, so a stop request is
    /// noticed within one slice even during long rests.
    pub fn run_realtime(
        &mut self,
        ctx: &SongContext,
        end: Option<BeatTime>,
        poll: Duration,
    ) -> RunReport {
        let mut clock = TransportClock::new(ctx.bpm());
        let now = Instant::now();
        clock.seek(self.position, now);
        clock.start(now);
        log::info!("[TRANSPORT] started at beat {} ({} BPM)", self.position, ctx.bpm());

        let mut report = RunReport::default();
        loop {
            let Some((index, beat)) = self.next_due() else {
                log::info!("[TRANSPORT] all tracks finished");
                break;
            };
            if end.is_some_and(|end| beat >= end) {
                report.merge(self.wait_until(&clock, end, poll));
                if !report.stopped {
                    if let Some(end) = end {
                        self.position = end;
                    }
                }
                break;
            }

            let waited = self.wait_until(&clock, Some(beat), poll);
            let stopped = waited.stopped;
            report.merge(waited);
            if stopped {
                break;
            }
            self.fire(index, beat, ctx, &mut report);
            self.position = beat;
        }

        clock.stop(Instant::now());
        log::info!(
            "[TRANSPORT] stopped at beat {} after {} triggers",
            clock.beat_at(Instant::now()),
            report.fired
        );
        report
    }

    fn wait_until(&self, clock: &TransportClock, beat: Option<BeatTime>, poll: Duration) -> RunReport {
        let target = beat.map(|b| clock.instant_for(b));
        loop {
            if self.stop.is_stopped() {
                return RunReport {
                    stopped: true,
                    ..RunReport::default()
                };
            }
            let Some(target) = target else {
                return RunReport::default();
            };
            let now = Instant::now();
            if now >= target {
                return RunReport::default();
            }
            thread::sleep((target - now).min(poll));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{InstrumentKind, InstrumentSpec, RecordingInstrument, TriggerLog};
    use crate::pattern::HitGrid;
    use crate::tracks::DrumTrack;

    fn drum(name: &str, steps: &str, log: &TriggerLog) -> Box<dyn Track> {
        let instrument = RecordingInstrument::new(InstrumentSpec::new(name, InstrumentKind::Drum), log.clone());
        Box::new(
            DrumTrack::new(name, &HitGrid::from_steps(steps).unwrap(), Box::new(instrument), None).unwrap(),
        )
    }

    #[test]
    fn test_fires_in_time_order_with_stable_ties() {
        let ctx = SongContext::default();
        let log = TriggerLog::new();
        let mut scheduler = Scheduler::new(StopHandle::new());
        scheduler.add_track(drum("hat", "x.x.", &log));
        scheduler.add_track(drum("kick", "x...", &log));

        let report = scheduler.advance_to(BeatTime::from_float(1.0), &ctx);
        assert_eq!(report.fired, 3);
        assert!(report.failures.is_empty());

        let order: Vec<(String, f64)> = log
            .snapshot()
            .into_iter()
            .map(|r| (r.instrument, r.request.time))
            .collect();
        assert_eq!(
            order,
            vec![
                ("hat".to_string(), 0.0),
                ("kick".to_string(), 0.0),
                ("hat".to_string(), 0.25),
            ]
        );
        assert_eq!(scheduler.position(), BeatTime::from_float(1.0));
    }

    #[test]
    fn test_advance_is_half_open() {
        let ctx = SongContext::default();
        let log = TriggerLog::new();
        let mut scheduler = Scheduler::new(StopHandle::new());
        scheduler.add_track(drum("kick", "x...", &log));

        scheduler.advance_to(BeatTime::from_float(2.0), &ctx);
        assert_eq!(log.len(), 2);
        scheduler.advance_to(BeatTime::from_float(3.0), &ctx);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_stop_prevents_further_triggers() {
        let ctx = SongContext::default();
        let log = TriggerLog::new();
        let stop = StopHandle::new();
        let mut scheduler = Scheduler::new(stop.clone());
        scheduler.add_track(drum("kick", "x...", &log));

        stop.stop();
        let report = scheduler.advance_to(BeatTime::from_float(8.0), &ctx);
        assert!(report.stopped);
        assert_eq!(report.fired, 0);
        assert!(log.is_empty());
    }

    #[test]
    fn test_realtime_run_honours_end() {
        let ctx = SongContext::new(crate::timing::TimeSignature::four_four(), 999.0).unwrap();
        let log = TriggerLog::new();
        let mut scheduler = Scheduler::new(StopHandle::new());
        scheduler.add_track(drum("hat", "xxxx", &log));

        let report = scheduler.run_realtime(&ctx, Some(BeatTime::from_float(1.0)), Duration::from_millis(5));
        assert_eq!(report.fired, 4);
        assert!(!report.stopped);
        assert_eq!(scheduler.position(), BeatTime::from_float(1.0));
    }
}
