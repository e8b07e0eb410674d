//! The instrument capability.
//!
//! The engine never renders audio. It hands each note to an [`Instrument`],
//! which turns it into sound (or a log line, or a test record). Instrument
//! flavours differ only by configuration ([`InstrumentSpec`]): a kick drum,
//! a sawtooth bass and a sine pad are all the same kind of value.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::InstrumentError;
use crate::pitch::PitchSet;
use crate::timing::BarsBeatsSixteenths;

/// A request to sound something at a scheduled time.
#[derive(Clone, Debug, PartialEq)]
pub struct TriggerRequest {
    /// Pitches to sound; `None` for unpitched percussion.
    pub pitches: Option<PitchSet>,
    /// How long to hold; `None` for instantaneous hits.
    pub duration: Option<BarsBeatsSixteenths>,
    /// Scheduled time in seconds from the song origin.
    pub time: f64,
}

impl TriggerRequest {
    /// An instantaneous hit, optionally tuned.
    pub fn hit(pitches: Option<PitchSet>, time: f64) -> Self {
        Self {
            pitches,
            duration: None,
            time,
        }
    }

    /// A held note or chord.
    pub fn note(pitches: PitchSet, duration: BarsBeatsSixteenths, time: f64) -> Self {
        Self {
            pitches: Some(pitches),
            duration: Some(duration),
            time,
        }
    }
}

impl fmt::Display for TriggerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={:.3}s", self.time)?;
        if let Some(pitches) = &self.pitches {
            write!(f, " {pitches}")?;
        }
        if let Some(duration) = &self.duration {
            write!(f, " for {duration}")?;
        }
        Ok(())
    }
}

/// Anything that can turn a [`TriggerRequest`] into sound.
///
/// Implementations must not block: they are called from the transport at
/// scheduling granularity.
pub trait Instrument: Send {
    /// Display name used in logs and settings summaries.
    fn name(&self) -> &str;

    /// Sound the request, or explain why it cannot be played.
    fn trigger(&mut self, request: &TriggerRequest) -> Result<(), InstrumentError>;
}

/// Broad class of an instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    /// Percussion; durations are ignored.
    Drum,
    /// One pitch at a time (bass, lead).
    Mono,
    /// Any number of pitches (pads, chords).
    Poly,
}

impl InstrumentKind {
    /// Largest pitch set the kind accepts.
    pub fn max_pitches(&self) -> Option<usize> {
        match self {
            InstrumentKind::Drum | InstrumentKind::Mono => Some(1),
            InstrumentKind::Poly => None,
        }
    }

    pub fn needs_pitch(&self) -> bool {
        !matches!(self, InstrumentKind::Drum)
    }
}

/// Oscillator shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
    Noise,
}

/// ADSR envelope in seconds (sustain is a level in 0..=1).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.8,
            release: 0.3,
        }
    }
}

/// Configuration of one instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub name: String,
    pub kind: InstrumentKind,
    #[serde(default)]
    pub waveform: Waveform,
    #[serde(default)]
    pub envelope: Envelope,
}

impl InstrumentSpec {
    pub fn new(name: impl Into<String>, kind: InstrumentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            waveform: Waveform::default(),
            envelope: Envelope::default(),
        }
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }

    /// Check a request against what this kind of instrument can play.
    pub fn check(&self, request: &TriggerRequest) -> Result<(), InstrumentError> {
        let count = request.pitches.as_ref().map_or(0, |p| p.len());
        if count == 0 && self.kind.needs_pitch() {
            return Err(InstrumentError::MissingPitch(self.name.clone()));
        }
        if let Some(max) = self.kind.max_pitches() {
            if count > max {
                return Err(InstrumentError::TooManyPitches {
                    instrument: self.name.clone(),
                    max,
                    got: count,
                });
            }
        }
        Ok(())
    }
}

/// Instrument that writes every trigger to the log.
///
/// Useful for running a song without an audio backend.
#[derive(Clone, Debug)]
pub struct LogVoice {
    spec: InstrumentSpec,
}

impl LogVoice {
    pub fn new(spec: InstrumentSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }
}

impl Instrument for LogVoice {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn trigger(&mut self, request: &TriggerRequest) -> Result<(), InstrumentError> {
        self.spec.check(request)?;
        match (&request.pitches, self.spec.kind) {
            (Some(pitches), InstrumentKind::Mono) => {
                let hz = pitches.lowest().map_or(0.0, |p| p.frequency());
                log::debug!("[{}] {} ({:.1} Hz)", self.spec.name, request, hz);
            }
            _ => log::debug!("[{}] {}", self.spec.name, request),
        }
        Ok(())
    }
}

/// One trigger captured by a [`RecordingInstrument`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedTrigger {
    pub instrument: String,
    pub request: TriggerRequest,
}

/// Shared, append-only list of recorded triggers.
///
/// Clones share the same underlying list, so one log can collect the
/// output of every instrument in a song.
#[derive(Clone, Debug, Default)]
pub struct TriggerLog {
    entries: Arc<Mutex<Vec<RecordedTrigger>>>,
}

impl TriggerLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RecordedTrigger>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, entry: RecordedTrigger) {
        self.lock().push(entry);
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<RecordedTrigger> {
        self.lock().clone()
    }

    /// Recorded triggers of one instrument.
    pub fn for_instrument(&self, name: &str) -> Vec<TriggerRequest> {
        self.lock()
            .iter()
            .filter(|e| e.instrument == name)
            .map(|e| e.request.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Instrument that records every accepted trigger into a [`TriggerLog`].
#[derive(Clone, Debug)]
pub struct RecordingInstrument {
    spec: InstrumentSpec,
    log: TriggerLog,
}

impl RecordingInstrument {
    pub fn new(spec: InstrumentSpec, log: TriggerLog) -> Self {
        Self { spec, log }
    }
}

impl Instrument for RecordingInstrument {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn trigger(&mut self, request: &TriggerRequest) -> Result<(), InstrumentError> {
        self.spec.check(request)?;
        self.log.push(RecordedTrigger {
            instrument: self.spec.name.clone(),
            request: request.clone(),
        });
        Ok(())
    }
}
