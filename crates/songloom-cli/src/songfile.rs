//! Song description files.
//!
//! A song file is TOML describing everything the engine needs: tempo and
//! signature, the chord progression with its bar spec, drum rhythms and
//! solo/bass parts. Random generation of that content happens elsewhere;
//! this module only reads it and wires it into a [`SongBuilder`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use songloom_core::{
    BarsBeatsSixteenths, HitGrid, Instrument, InstrumentSpec, Pitch, PitchSet, RepeatCount, Song,
    SongBuilder, SongContext, SoloPart, TimeSignature, VisualizationHook,
};
use std::fs;
use std::path::Path;

use crate::config::SongDefaults;

/// Creates the instrument for one track.
pub type VoiceFactory<'a> = dyn FnMut(&InstrumentSpec) -> Box<dyn Instrument> + 'a;
/// Creates the (optional) visualization hook for one track.
pub type HookFactory<'a> = dyn FnMut(&str) -> Option<Box<dyn VisualizationHook>> + 'a;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SongFile {
    /// Key label, e.g. `"A (minor)"`
    pub key: Option<String>,
    pub bpm: Option<f64>,
    #[serde(default = "default_signature")]
    pub time_signature: String,
    pub humanize: Option<f64>,
    pub seed: Option<u64>,
    pub chords: Option<ChordSection>,
    #[serde(default, rename = "drum")]
    pub drums: Vec<DrumSection>,
    #[serde(default, rename = "solo")]
    pub solos: Vec<SoloSection>,
}

fn default_signature() -> String {
    "4/4".to_string()
}

fn default_chords_name() -> String {
    "chords".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChordSection {
    #[serde(default = "default_chords_name")]
    pub name: String,
    /// Progression label such as `"i - VI - III - VII"`
    pub label: Option<String>,
    pub instrument: InstrumentSpec,
    pub progression: Vec<PitchSet>,
    pub bars: Vec<RepeatCount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DrumSection {
    pub name: String,
    pub instrument: InstrumentSpec,
    pub pattern: HitGrid,
    /// Declared length; the pattern must span exactly this many bars
    pub bars: Option<u32>,
    /// Fixed tuning for pitched percussion
    pub pitch: Option<Pitch>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoloSection {
    pub name: String,
    pub instrument: InstrumentSpec,
    /// Notes of each section
    pub notes: Vec<Vec<Pitch>>,
    /// One rhythm per section, or a single rhythm shared by all sections
    pub patterns: Vec<HitGrid>,
    /// Repeat count per section; derived from the chord bars when omitted
    pub repeat: Option<Vec<RepeatCount>>,
    /// Start offset as `bars:beats:sixteenths`
    pub start: Option<String>,
    #[serde(default = "default_true")]
    pub looping: bool,
    #[serde(default)]
    pub humanize: bool,
}

impl SongFile {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid song file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read song file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Build the song context, falling back to configured defaults.
    pub fn context(&self, defaults: &SongDefaults) -> Result<SongContext> {
        let signature: TimeSignature = self.time_signature.parse()?;
        let mut ctx = SongContext::new(signature, self.bpm.unwrap_or(defaults.bpm))?
            .with_humanize(self.humanize.unwrap_or(defaults.humanize));
        if let Some(seed) = self.seed {
            ctx = ctx.with_seed(seed);
        }
        Ok(ctx)
    }

    /// Section rhythms, widening a single shared rhythm to every section.
    fn solo_patterns(solo: &SoloSection) -> Result<Vec<HitGrid>> {
        match solo.patterns.len() {
            1 => Ok(vec![solo.patterns[0].clone(); solo.notes.len()]),
            n if n == solo.notes.len() => Ok(solo.patterns.clone()),
            n => bail!(
                "solo '{}' has {} note sections but {} patterns",
                solo.name,
                solo.notes.len(),
                n
            ),
        }
    }

    /// Repeat counts for a solo part.
    ///
    /// Without an explicit list every section repeats until it covers the
    /// bars of the chord it belongs to.
    fn solo_repeat_counts(
        &self,
        solo: &SoloSection,
        patterns: &[HitGrid],
        signature: TimeSignature,
    ) -> Result<Vec<RepeatCount>> {
        if let Some(repeat) = &solo.repeat {
            return Ok(repeat.clone());
        }
        let Some(chords) = &self.chords else {
            bail!("solo '{}' needs `repeat` when the song has no chords", solo.name);
        };
        if chords.bars.len() != patterns.len() {
            bail!(
                "solo '{}' has {} sections but the progression has {} chords",
                solo.name,
                patterns.len(),
                chords.bars.len()
            );
        }

        chords
            .bars
            .iter()
            .zip(patterns)
            .enumerate()
            .map(|(index, (bars, pattern))| {
                let chord_bars: u32 = bars.bar_lengths().iter().sum();
                let pattern_bars = pattern.bar_count(signature).filter(|b| *b > 0);
                match pattern_bars {
                    Some(p) if chord_bars % p == 0 && chord_bars >= p => {
                        Ok(RepeatCount::Times(chord_bars / p))
                    }
                    _ => bail!(
                        "solo '{}' section {}: rhythm of {} steps does not fit {} chord bar(s)",
                        solo.name,
                        index,
                        pattern.len(),
                        chord_bars
                    ),
                }
            })
            .collect()
    }

    /// Wire the description into a song.
    pub fn build(
        &self,
        ctx: SongContext,
        voices: &mut VoiceFactory<'_>,
        hooks: &mut HookFactory<'_>,
    ) -> Result<Song> {
        let signature = ctx.signature();
        let mut builder = SongBuilder::new(ctx);
        if let Some(key) = &self.key {
            builder.with_key(key.clone());
        }

        if let Some(chords) = &self.chords {
            if let Some(label) = &chords.label {
                builder.with_progression_label(label.clone());
            }
            builder
                .add_chord_progression(
                    &chords.name,
                    &chords.progression,
                    &chords.bars,
                    voices(&chords.instrument),
                    hooks(&chords.name),
                )
                .with_context(|| format!("chord track '{}'", chords.name))?;
        }

        for drum in &self.drums {
            let pattern = match drum.bars {
                Some(bars) => drum
                    .pattern
                    .clone()
                    .for_bars(bars, signature)
                    .with_context(|| format!("drum track '{}'", drum.name))?,
                None => drum.pattern.clone(),
            };
            let instrument = voices(&drum.instrument);
            let hook = hooks(&drum.name);
            let added = match drum.pitch {
                Some(pitch) => {
                    builder.add_tuned_drum_part(&drum.name, &pattern, pitch, instrument, hook)
                }
                None => builder.add_drum_part(&drum.name, &pattern, instrument, hook),
            };
            added.with_context(|| format!("drum track '{}'", drum.name))?;
        }

        for solo in &self.solos {
            let patterns = Self::solo_patterns(solo)?;
            let repeat_counts = self.solo_repeat_counts(solo, &patterns, signature)?;
            let notes = solo
                .notes
                .iter()
                .map(|section| section.iter().copied().map(PitchSet::single).collect())
                .collect();
            let start = match &solo.start {
                Some(text) => text.parse::<BarsBeatsSixteenths>()?,
                None => BarsBeatsSixteenths::default(),
            };

            let mut part = SoloPart::new(solo.name.clone(), notes, patterns, repeat_counts)
                .starting_at(start)
                .humanized(solo.humanize);
            if !solo.looping {
                part = part.once();
            }
            builder
                .add_repeating_solo_part(part, voices(&solo.instrument), hooks(&solo.name))
                .with_context(|| format!("solo track '{}'", solo.name))?;
        }

        Ok(builder.build()?)
    }
}
