//! Pitches and pitch sets.
//!
//! A [`Pitch`] is a MIDI note number; a [`PitchSet`] is one or more pitches
//! that sound together (a single note or a chord).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SongError};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A single pitch as a MIDI note number (C4 = 60).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pitch(u8);

impl Pitch {
    pub fn from_midi(midi: u8) -> Result<Self> {
        if midi > 127 {
            return Err(SongError::InvalidPitch(format!("MIDI note {midi} out of range")));
        }
        Ok(Self(midi))
    }

    pub fn midi(self) -> u8 {
        self.0
    }

    /// Equal-tempered frequency with A4 = 440 Hz.
    pub fn frequency(self) -> f64 {
        440.0 * 2f64.powf((self.0 as f64 - 69.0) / 12.0)
    }

    /// Shift by a number of semitones, failing outside the MIDI range.
    pub fn transpose(self, semitones: i16) -> Result<Self> {
        match (self.0 as i16).checked_add(semitones) {
            Some(shifted @ 0..=127) => Ok(Self(shifted as u8)),
            _ => Err(SongError::InvalidPitch(format!(
                "{self} transposed by {semitones} leaves the MIDI range"
            ))),
        }
    }

    /// Note name such as "C4" or "A#2".
    pub fn name(self) -> String {
        let octave = (self.0 / 12) as i32 - 1;
        format!("{}{}", NOTE_NAMES[(self.0 % 12) as usize], octave)
    }
}

impl FromStr for Pitch {
    type Err = SongError;

    /// Parse a note name to a pitch.
    ///
    /// Accepts a letter, any number of `#`/`b` accidentals and an octave
    /// (`C4`, `Eb3`, `F#-1`). A missing octave defaults to 4.
    fn from_str(name: &str) -> Result<Self> {
        let invalid = || SongError::InvalidPitch(name.to_string());
        let trimmed = name.trim();
        let mut chars = trimmed.chars().peekable();

        let base = match chars.next().ok_or_else(invalid)?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let mut accidental = 0i32;
        while let Some(&c) = chars.peek() {
            let step = match c {
                '#' | '♯' => 1,
                'b' | '♭' => -1,
                _ => break,
            };
            accidental = accidental.checked_add(step).ok_or_else(invalid)?;
            chars.next();
        }

        let octave_str: String = chars.collect();
        let octave: i32 = if octave_str.is_empty() {
            4
        } else {
            octave_str.parse().map_err(|_| invalid())?
        };

        let midi = octave
            .checked_add(1)
            .and_then(|o| o.checked_mul(12))
            .and_then(|m| m.checked_add(base))
            .and_then(|m| m.checked_add(accidental))
            .ok_or_else(invalid)?;
        match u8::try_from(midi) {
            Ok(midi) if midi <= 127 => Ok(Self(midi)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Pitch {
    type Error = SongError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Pitch> for String {
    fn from(value: Pitch) -> Self {
        value.name()
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// One or more simultaneously sounding pitches.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Pitch>", into = "Vec<Pitch>")]
pub struct PitchSet(Vec<Pitch>);

impl PitchSet {
    /// A set holding at least one pitch.
    pub fn new(pitches: Vec<Pitch>) -> Result<Self> {
        if pitches.is_empty() {
            return Err(SongError::EmptySequence("pitch set"));
        }
        Ok(Self(pitches))
    }

    pub fn single(pitch: Pitch) -> Self {
        Self(vec![pitch])
    }

    /// Parse a list of note names, e.g. `["C4", "E4", "G4"]`.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let pitches = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<Pitch>>>()?;
        Self::new(pitches)
    }

    pub fn pitches(&self) -> &[Pitch] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowest pitch of the set (the root of a close-voiced chord).
    pub fn lowest(&self) -> Option<Pitch> {
        self.0.iter().copied().min()
    }
}

impl TryFrom<Vec<Pitch>> for PitchSet {
    type Error = SongError;

    fn try_from(pitches: Vec<Pitch>) -> Result<Self> {
        Self::new(pitches)
    }
}

impl From<PitchSet> for Vec<Pitch> {
    fn from(set: PitchSet) -> Self {
        set.0
    }
}

impl From<Pitch> for PitchSet {
    fn from(pitch: Pitch) -> Self {
        Self::single(pitch)
    }
}

impl fmt::Display for PitchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(|p| p.name()).collect();
        if names.len() == 1 {
            f.write_str(&names[0])
        } else {
            write!(f, "[{}]", names.join(" "))
        }
    }
}
