//! Hit grids, repeat counts and section expansion.
//!
//! Rhythms are written one sixteenth per step, either as 0/1 values or as
//! step strings:
//!
//! ```
//! use songloom_core::pattern::HitGrid;
//!
//! let kick = HitGrid::from_steps("x...|x...|x...|x...").unwrap();
//! assert_eq!(kick.len(), 16);
//! assert_eq!(kick.onset_count(), 4);
//! ```
//!
//! Sections of material are flattened with [`expand`], which repeats each
//! section according to its [`RepeatCount`].

use serde::{Deserialize, Serialize};

use crate::error::{Result, SongError};
use crate::timing::TimeSignature;

/// Output of [`expand`]: every section's content, repeated and concatenated.
pub type FlatSequence<T> = Vec<T>;

/// A binary rhythm on the sixteenth grid (1 = onset, 0 = rest/continuation).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "HitGridSpec", into = "Vec<u8>")]
pub struct HitGrid(Vec<u8>);

impl HitGrid {
    /// Build a grid from 0/1 values.
    pub fn new(values: Vec<u8>) -> Result<Self> {
        if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| **v > 1) {
            return Err(SongError::InvalidHitValue { index, value });
        }
        Ok(Self(values))
    }

    /// Parse a step string.
    ///
    /// `x`, `X` and `1` are onsets; `.`, `-`, `_` and `0` are rests. Bar
    /// separators (`|`) and whitespace are ignored.
    pub fn from_steps(steps: &str) -> Result<Self> {
        let mut values = Vec::with_capacity(steps.len());
        for ch in steps.chars() {
            match ch {
                'x' | 'X' | '1' => values.push(1),
                '.' | '-' | '_' | '0' => values.push(0),
                '|' => {}
                c if c.is_whitespace() => {}
                other => {
                    return Err(SongError::InvalidPattern(format!(
                        "unexpected step character '{other}' in \"{steps}\""
                    )))
                }
            }
        }
        Ok(Self(values))
    }

    /// Check that the grid spans exactly `bars` bars.
    pub fn for_bars(self, bars: u32, signature: TimeSignature) -> Result<Self> {
        let expected = bars as usize * signature.sixteenths_per_bar() as usize;
        if self.0.len() != expected {
            return Err(SongError::LengthMismatch {
                what: "hit grid steps",
                expected,
                actual: self.0.len(),
            });
        }
        Ok(self)
    }

    /// Number of whole bars the grid covers, if it covers whole bars.
    pub fn bar_count(&self, signature: TimeSignature) -> Option<u32> {
        let per_bar = signature.sixteenths_per_bar() as usize;
        if self.0.is_empty() || self.0.len() % per_bar != 0 {
            return None;
        }
        Some((self.0.len() / per_bar) as u32)
    }

    pub fn steps(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_onset(&self, step: usize) -> bool {
        self.0.get(step) == Some(&1)
    }

    /// Indices of all onsets in order.
    pub fn onsets(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == 1)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn onset_count(&self) -> usize {
        self.0.iter().filter(|v| **v == 1).count()
    }

    /// Step-string rendering, one character per step.
    pub fn to_steps(&self) -> String {
        self.0.iter().map(|v| if *v == 1 { 'x' } else { '.' }).collect()
    }
}

impl AsRef<[u8]> for HitGrid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<HitGrid> for Vec<u8> {
    fn from(grid: HitGrid) -> Self {
        grid.0
    }
}

/// Serialized form of a hit grid: a step string or a list of 0/1 values.
#[derive(Deserialize)]
#[serde(untagged)]
enum HitGridSpec {
    Steps(String),
    Values(Vec<u8>),
}

impl TryFrom<HitGridSpec> for HitGrid {
    type Error = SongError;

    fn try_from(spec: HitGridSpec) -> Result<Self> {
        match spec {
            HitGridSpec::Steps(steps) => HitGrid::from_steps(&steps),
            HitGridSpec::Values(values) => HitGrid::new(values),
        }
    }
}

/// How often a section is played.
///
/// A plain number repeats the section that many times. A list stands for
/// discrete bars: its length is the number of occurrences and each value is
/// that occurrence's length in bars (only chord timelines read the values).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepeatCount {
    Times(u32),
    Bars(Vec<u32>),
}

impl RepeatCount {
    /// Number of times [`expand`] appends the section.
    pub fn repeats(&self) -> usize {
        match self {
            RepeatCount::Times(n) => *n as usize,
            RepeatCount::Bars(bars) => bars.len(),
        }
    }

    /// Bar lengths this entry contributes to a flattened bar list.
    pub fn bar_lengths(&self) -> &[u32] {
        match self {
            RepeatCount::Times(n) => std::slice::from_ref(n),
            RepeatCount::Bars(bars) => bars,
        }
    }
}

impl From<u32> for RepeatCount {
    fn from(n: u32) -> Self {
        RepeatCount::Times(n)
    }
}

impl From<Vec<u32>> for RepeatCount {
    fn from(bars: Vec<u32>) -> Self {
        RepeatCount::Bars(bars)
    }
}

impl std::fmt::Display for RepeatCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepeatCount::Times(n) => write!(f, "{n}"),
            RepeatCount::Bars(bars) => {
                let parts: Vec<String> = bars.iter().map(|b| b.to_string()).collect();
                write!(f, "[{}]", parts.join(","))
            }
        }
    }
}

/// Flatten a list of repeat counts into one bar length per occurrence.
pub fn flatten_bar_lengths(counts: &[RepeatCount]) -> Vec<u32> {
    counts
        .iter()
        .flat_map(|c| c.bar_lengths().iter().copied())
        .collect()
}

/// Repeat each section by its count and concatenate the results.
///
/// Section order and the order within each section are preserved. The two
/// lists must be parallel; a missing count is an error rather than an
/// implicit single repeat.
pub fn expand<T, S>(sections: &[S], repeat_counts: &[RepeatCount]) -> Result<FlatSequence<T>>
where
    T: Clone,
    S: AsRef<[T]>,
{
    if sections.len() != repeat_counts.len() {
        return Err(SongError::LengthMismatch {
            what: "section repeat counts",
            expected: sections.len(),
            actual: repeat_counts.len(),
        });
    }

    let total: usize = sections
        .iter()
        .zip(repeat_counts)
        .map(|(section, count)| section.as_ref().len() * count.repeats())
        .sum();

    let mut flat = Vec::with_capacity(total);
    for (section, count) in sections.iter().zip(repeat_counts) {
        for _ in 0..count.repeats() {
            flat.extend_from_slice(section.as_ref());
        }
    }
    Ok(flat)
}

/// Expand rhythm sections into one continuous hit grid.
pub fn expand_grids(sections: &[HitGrid], repeat_counts: &[RepeatCount]) -> Result<HitGrid> {
    expand(sections, repeat_counts).map(HitGrid)
}
