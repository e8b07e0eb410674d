//! Timing primitives for the song timeline.
//!
//! - [`BeatTime`] - Fixed-point beat representation for exact grid positions
//! - [`TimeSignature`] - Beats per bar, validated against the sixteenth grid
//! - [`BarsBeatsSixteenths`] - Exact `bars:beats:sixteenths` transport values
//! - [`TransportClock`] - Wall-clock anchor used by the realtime driver
//!
//! A beat is always a quarter note and the grid step is one sixteenth, so
//! every position the engine schedules is an integer number of sixteenths.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::{Result, SongError};

/// Number of grid steps in one quarter-note beat.
pub const SIXTEENTHS_PER_BEAT: u64 = 4;

/// Fixed-point beat representation with 16 fractional bits.
///
/// A sixteenth is exactly `SCALE / 4` units, so grid arithmetic never drifts
/// no matter how many loops a song plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BeatTime {
    beats: i64,
}

impl BeatTime {
    const SCALE: i64 = 65_536;

    /// Zero beat time constant.
    pub const ZERO: BeatTime = BeatTime { beats: 0 };

    /// Create a BeatTime from a floating-point beat value.
    #[inline]
    pub fn from_float(value: f64) -> Self {
        Self {
            beats: (value * Self::SCALE as f64).round() as i64,
        }
    }

    /// Convert to a floating-point beat value.
    #[inline]
    pub fn to_float(self) -> f64 {
        self.beats as f64 / Self::SCALE as f64
    }

    /// Exact position of a sixteenth-note step.
    #[inline]
    pub fn from_sixteenths(steps: u64) -> Self {
        Self {
            beats: (steps as i64).saturating_mul(Self::SCALE / SIXTEENTHS_PER_BEAT as i64),
        }
    }

    /// Exact position of the start of a bar.
    pub fn from_bars(bars: u64, signature: TimeSignature) -> Self {
        Self::from_sixteenths(bars * signature.sixteenths_per_bar())
    }

    /// Seconds from the origin at the given tempo.
    pub fn to_seconds(self, bpm: f64) -> f64 {
        self.to_float() * 60.0 / bpm
    }
}

impl std::ops::Add for BeatTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            beats: self.beats.saturating_add(rhs.beats),
        }
    }
}

impl std::ops::Sub for BeatTime {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            beats: self.beats.saturating_sub(rhs.beats),
        }
    }
}

impl From<f64> for BeatTime {
    fn from(value: f64) -> Self {
        BeatTime::from_float(value)
    }
}

impl From<BeatTime> for f64 {
    fn from(value: BeatTime) -> Self {
        value.to_float()
    }
}

impl fmt::Display for BeatTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}b", self.to_float())
    }
}

/// Musical time signature (numerator/denominator).
///
/// The numerator is the number of beats per bar and the denominator the
/// note value of one beat. Only denominators that divide the sixteenth grid
/// are accepted, which keeps every bar an integer number of steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    /// Create a validated time signature.
    pub fn new(numerator: u32, denominator: u32) -> Result<Self> {
        let valid_denominator = matches!(denominator, 1 | 2 | 4 | 8 | 16);
        if numerator == 0 || !valid_denominator {
            return Err(SongError::InvalidTimeSignature {
                numerator,
                denominator,
            });
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Common 4/4 time.
    pub fn four_four() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }

    /// Number of sixteenth steps in one bar.
    pub fn sixteenths_per_bar(&self) -> u64 {
        self.numerator as u64 * 16 / self.denominator as u64
    }

    /// Calculate the number of quarter-note beats per bar.
    ///
    /// For 4/4: 4 beats per bar
    /// For 6/8: 3 beats per bar (6 eighth notes = 3 quarter notes)
    pub fn beats_per_bar(&self) -> f64 {
        self.sixteenths_per_bar() as f64 / SIXTEENTHS_PER_BEAT as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for TimeSignature {
    type Err = SongError;

    /// Parse `"6/8"`-style signatures.
    fn from_str(s: &str) -> Result<Self> {
        let (numerator, denominator) = s
            .split_once('/')
            .and_then(|(n, d)| Some((n.trim().parse().ok()?, d.trim().parse().ok()?)))
            .ok_or_else(|| SongError::InvalidTime(s.to_string()))?;
        Self::new(numerator, denominator)
    }
}

/// A transport time written as `bars:beats:sixteenths`.
///
/// Bar counts are converted to this form with zero bars and all of the
/// length carried in beats and sixteenths. Decimal bar values ("1.5 bars")
/// are never produced, so every duration maps onto the grid exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct BarsBeatsSixteenths {
    pub bars: u32,
    pub beats: u32,
    pub sixteenths: u32,
}

impl BarsBeatsSixteenths {
    pub fn new(bars: u32, beats: u32, sixteenths: u32) -> Self {
        Self {
            bars,
            beats,
            sixteenths,
        }
    }

    /// `bars x beats-per-bar` beats and no extra bars, e.g. 2 bars of 4/4 is `0:8:0`.
    ///
    /// `None` when the beat count does not fit in a `u32`.
    pub fn from_bars(bars: u32, signature: TimeSignature) -> Option<Self> {
        let steps = (bars as u64).checked_mul(signature.sixteenths_per_bar())?;
        Some(Self {
            bars: 0,
            beats: u32::try_from(steps / SIXTEENTHS_PER_BEAT).ok()?,
            sixteenths: (steps % SIXTEENTHS_PER_BEAT) as u32,
        })
    }

    /// A plain step count, e.g. 3 steps is `0:0:3`.
    pub fn from_sixteenths(steps: u32) -> Self {
        Self {
            bars: 0,
            beats: 0,
            sixteenths: steps,
        }
    }

    /// Total length in sixteenth steps under the given signature.
    pub fn to_sixteenths(&self, signature: TimeSignature) -> u64 {
        self.bars as u64 * signature.sixteenths_per_bar()
            + self.beats as u64 * SIXTEENTHS_PER_BEAT
            + self.sixteenths as u64
    }

    pub fn to_beat_time(&self, signature: TimeSignature) -> BeatTime {
        BeatTime::from_sixteenths(self.to_sixteenths(signature))
    }

    pub fn to_seconds(&self, signature: TimeSignature, bpm: f64) -> f64 {
        self.to_beat_time(signature).to_seconds(bpm)
    }
}

impl fmt::Display for BarsBeatsSixteenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.bars, self.beats, self.sixteenths)
    }
}

impl FromStr for BarsBeatsSixteenths {
    type Err = SongError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(SongError::InvalidTime(s.to_string()));
        }
        let field = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| SongError::InvalidTime(s.to_string()))
        };
        Ok(Self {
            bars: field(parts[0])?,
            beats: field(parts[1])?,
            sixteenths: field(parts[2])?,
        })
    }
}

/// Transport-aware clock for converting between wall-clock time and beats.
///
/// The clock keeps an anchor point (beat position at a specific instant)
/// and uses BPM to find beat positions at other times.
#[derive(Clone, Debug)]
pub struct TransportClock {
    bpm: f64,
    running: bool,
    anchor_instant: Instant,
    anchor_beat: BeatTime,
}

impl TransportClock {
    /// Create a stopped clock at beat 0.
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm,
            running: false,
            anchor_instant: Instant::now(),
            anchor_beat: BeatTime::ZERO,
        }
    }

    /// Start the transport at the given instant, from the anchored beat.
    pub fn start(&mut self, now: Instant) {
        self.anchor_instant = now;
        self.running = true;
    }

    /// Stop the transport, preserving the current beat position.
    pub fn stop(&mut self, now: Instant) {
        self.anchor_beat = self.beat_at(now);
        self.running = false;
    }

    /// Seek to a specific beat position.
    pub fn seek(&mut self, beat: BeatTime, now: Instant) {
        self.anchor_beat = beat;
        self.anchor_instant = now;
    }

    /// Calculate the beat position at a given instant.
    pub fn beat_at(&self, time: Instant) -> BeatTime {
        if !self.running || time <= self.anchor_instant {
            return self.anchor_beat;
        }

        let elapsed = time.duration_since(self.anchor_instant).as_secs_f64();
        let beats_elapsed = (elapsed / 60.0) * self.bpm;
        self.anchor_beat + BeatTime::from_float(beats_elapsed)
    }

    /// The instant at which a beat position is reached.
    ///
    /// Beats at or before the anchor map to the anchor instant.
    pub fn instant_for(&self, beat: BeatTime) -> Instant {
        let beats_ahead = (beat - self.anchor_beat).to_float();
        if beats_ahead <= 0.0 {
            return self.anchor_instant;
        }
        self.anchor_instant + Duration::from_secs_f64(beats_ahead * 60.0 / self.bpm)
    }

    /// Get the current BPM.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Check if the transport is running.
    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_time_sixteenths_are_exact() {
        let step = BeatTime::from_sixteenths(1);
        let mut acc = BeatTime::ZERO;
        for _ in 0..4_000 {
            acc = acc + step;
        }
        assert_eq!(acc, BeatTime::from_sixteenths(4_000));
        assert_eq!(acc.to_float(), 1_000.0);
    }

    #[test]
    fn test_beat_time_to_seconds() {
        // At 120 BPM one beat lasts half a second
        assert!((BeatTime::from_float(3.0).to_seconds(120.0) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_time_signature_validation() {
        assert!(TimeSignature::new(4, 4).is_ok());
        assert!(TimeSignature::new(7, 8).is_ok());
        assert!(TimeSignature::new(0, 4).is_err());
        assert!(TimeSignature::new(4, 3).is_err());
        assert!(TimeSignature::new(4, 32).is_err());
    }

    #[test]
    fn test_parse_time_signature() {
        let sig: TimeSignature = "6/8".parse().unwrap();
        assert_eq!(sig, TimeSignature::new(6, 8).unwrap());
        assert_eq!(" 3 / 4 ".parse::<TimeSignature>().unwrap().to_string(), "3/4");
        assert!("4".parse::<TimeSignature>().is_err());
        assert!("4/5".parse::<TimeSignature>().is_err());
    }

    #[test]
    fn test_time_signature_steps() {
        assert_eq!(TimeSignature::four_four().sixteenths_per_bar(), 16);
        let six_eight = TimeSignature::new(6, 8).unwrap();
        assert_eq!(six_eight.sixteenths_per_bar(), 12);
        assert!((six_eight.beats_per_bar() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_bars_decompose_into_beats() {
        let sig = TimeSignature::four_four();
        let two_bars = BarsBeatsSixteenths::from_bars(2, sig).unwrap();
        assert_eq!(two_bars.to_string(), "0:8:0");
        assert_eq!(two_bars.to_sixteenths(sig), 32);

        // 7/8 bars do not fill whole beats; the remainder goes to sixteenths
        let seven_eight = TimeSignature::new(7, 8).unwrap();
        let one_bar = BarsBeatsSixteenths::from_bars(1, seven_eight).unwrap();
        assert_eq!(one_bar.to_string(), "0:3:2");
        assert_eq!(one_bar.to_sixteenths(seven_eight), 14);
    }

    #[test]
    fn test_bars_beyond_beat_range_do_not_truncate() {
        let sig = TimeSignature::four_four();
        assert!(BarsBeatsSixteenths::from_bars(u32::MAX / 4, sig).is_some());
        assert_eq!(BarsBeatsSixteenths::from_bars(u32::MAX / 4 + 1, sig), None);
        assert_eq!(BarsBeatsSixteenths::from_bars(u32::MAX, sig), None);
    }

    #[test]
    fn test_bars_beats_sixteenths_seconds() {
        let sig = TimeSignature::four_four();
        let duration = BarsBeatsSixteenths::from_sixteenths(3);
        assert_eq!(duration.to_string(), "0:0:3");
        // 3 sixteenths = 0.75 beats = 0.375s at 120 BPM
        assert!((duration.to_seconds(sig, 120.0) - 0.375).abs() < 1e-9);
    }

    #[test]
    fn test_parse_bars_beats_sixteenths() {
        let parsed: BarsBeatsSixteenths = "1:2:3".parse().unwrap();
        assert_eq!(parsed, BarsBeatsSixteenths::new(1, 2, 3));
        assert_eq!(parsed.to_sixteenths(TimeSignature::four_four()), 16 + 8 + 3);
        assert!("1.5m".parse::<BarsBeatsSixteenths>().is_err());
        assert!("0:1".parse::<BarsBeatsSixteenths>().is_err());
        assert!("0:0:1.5".parse::<BarsBeatsSixteenths>().is_err());
    }

    #[test]
    fn test_transport_clock_beat_calculation() {
        let mut clock = TransportClock::new(120.0);
        let now = Instant::now();
        clock.start(now);
        // 0.5 seconds at 120 BPM is one beat
        let later = now + Duration::from_millis(500);
        let beat = clock.beat_at(later);
        assert!((beat.to_float() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_transport_clock_instant_for() {
        let mut clock = TransportClock::new(120.0);
        let now = Instant::now();
        clock.start(now);
        let target = clock.instant_for(BeatTime::from_float(2.0));
        assert_eq!(target.duration_since(now), Duration::from_secs(1));
        assert_eq!(clock.instant_for(BeatTime::ZERO), now);
    }

    #[test]
    fn test_stopped_clock_holds_position() {
        let mut clock = TransportClock::new(60.0);
        let now = Instant::now();
        clock.start(now);
        clock.stop(now + Duration::from_secs(2));
        let much_later = now + Duration::from_secs(10);
        assert!((clock.beat_at(much_later).to_float() - 2.0).abs() < 0.001);
        assert!(!clock.is_running());
    }
}
