//! Legato duration inference.
//!
//! Every note sounds until the next onset. The last note runs until the end
//! of the grid; leading rests of the next loop stay silent.

use crate::error::{Result, SongError};
use crate::pattern::HitGrid;

/// One step count per onset, in onset order.
pub type DurationSequence = Vec<u32>;

/// Infer the length of every note in a hit grid, in sixteenth steps.
///
/// The durations cover the grid from the first onset to its end, so their
/// sum is the grid length whenever the grid starts with an onset.
pub fn infer_durations(grid: &HitGrid) -> Result<DurationSequence> {
    let mut durations = Vec::with_capacity(grid.onset_count());
    let mut previous: Option<usize> = None;

    for (index, hit) in grid.steps().iter().enumerate() {
        if *hit != 1 {
            continue;
        }
        if let Some(start) = previous {
            durations.push((index - start) as u32);
        }
        previous = Some(index);
    }

    let last = previous.ok_or_else(|| {
        SongError::InvalidPattern("hit grid has no onsets, note durations are undefined".into())
    })?;
    durations.push((grid.len() - last) as u32);

    Ok(durations)
}
