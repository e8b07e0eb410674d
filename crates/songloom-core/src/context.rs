//! Per-song scheduling context.
//!
//! Every component receives the same [`SongContext`] when it is built. The
//! context is fixed for the lifetime of one generated song and read-only
//! afterwards; regenerating a song means building a new context.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Result, SongError};
use crate::timing::{BarsBeatsSixteenths, BeatTime, TimeSignature};

/// Default humanize range in seconds.
pub const DEFAULT_HUMANIZE_SECONDS: f64 = 0.02;

/// Largest humanize offset as a fraction of one grid step.
///
/// Two neighbouring steps can each move by this much towards each other
/// and still never swap places.
const MAX_HUMANIZE_STEP_FRACTION: f64 = 0.45;

/// Time signature, tempo and randomness settings shared by one song.
#[derive(Clone, Debug, PartialEq)]
pub struct SongContext {
    signature: TimeSignature,
    bpm: f64,
    humanize_seconds: f64,
    seed: Option<u64>,
}

impl Default for SongContext {
    fn default() -> Self {
        Self {
            signature: TimeSignature::default(),
            bpm: 120.0,
            humanize_seconds: DEFAULT_HUMANIZE_SECONDS,
            seed: None,
        }
    }
}

impl SongContext {
    /// Create a context, validating the tempo.
    pub fn new(signature: TimeSignature, bpm: f64) -> Result<Self> {
        if !(20.0..=999.0).contains(&bpm) {
            return Err(SongError::InvalidTempo(bpm));
        }
        Ok(Self {
            signature,
            bpm,
            ..Self::default()
        })
    }

    /// Set the humanize range in seconds (negative values are treated as zero).
    pub fn with_humanize(mut self, seconds: f64) -> Self {
        self.humanize_seconds = seconds.max(0.0);
        self
    }

    /// Make humanize offsets reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn signature(&self) -> TimeSignature {
        self.signature
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Length of one sixteenth step in seconds.
    pub fn step_seconds(&self) -> f64 {
        BeatTime::from_sixteenths(1).to_seconds(self.bpm)
    }

    /// Humanize range actually applied, capped below half a grid step.
    pub fn humanize_limit(&self) -> f64 {
        self.humanize_seconds
            .min(self.step_seconds() * MAX_HUMANIZE_STEP_FRACTION)
    }

    /// Convert a beat position to seconds from the song origin.
    pub fn seconds_at(&self, beat: BeatTime) -> f64 {
        beat.to_seconds(self.bpm)
    }

    /// Convert a transport value to seconds under this song's signature.
    pub fn seconds_of(&self, time: BarsBeatsSixteenths) -> f64 {
        time.to_seconds(self.signature, self.bpm)
    }

    /// Random source for one component.
    ///
    /// With a seed every stream is deterministic and distinct; without one
    /// the generator is seeded from the operating system.
    pub fn rng_for(&self, stream: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => StdRng::from_os_rng(),
        }
    }
}
