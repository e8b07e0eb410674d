//! Circular playback cursor.

use crate::error::{Result, SongError};

/// Round-robin rotation over a fixed sequence.
///
/// Taking the next item and moving the head one slot forward is the same as
/// popping the front of a queue and pushing it onto the back, without ever
/// moving the items. After `len()` advances the cursor is back where it
/// started.
#[derive(Clone, Debug)]
pub struct PlaybackCursor<T> {
    items: Vec<T>,
    head: usize,
}

impl<T> PlaybackCursor<T> {
    /// Wrap a non-empty sequence.
    pub fn new(items: Vec<T>, what: &'static str) -> Result<Self> {
        if items.is_empty() {
            return Err(SongError::EmptySequence(what));
        }
        Ok(Self { items, head: 0 })
    }

    /// Return the item at the head and rotate it to the back.
    pub fn advance(&mut self) -> &T {
        let index = self.head;
        self.head = (self.head + 1) % self.items.len();
        &self.items[index]
    }

    /// Item the next [`advance`](Self::advance) will return.
    pub fn peek(&self) -> &T {
        &self.items[self.head]
    }

    /// Number of advances since the last full rotation.
    pub fn position(&self) -> usize {
        self.head
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in current queue order, front first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items[self.head..].iter().chain(self.items[..self.head].iter())
    }
}
