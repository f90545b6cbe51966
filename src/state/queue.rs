//! Play order over the playing playlist.
//!
//! The queue is a permutation of `0..len` (playlist indices) plus a cursor
//! into it. It is identity when shuffle is off.

use rand::seq::SliceRandom;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayQueue {
    order: Vec<usize>,
    cursor: usize,
}

impl PlayQueue {
    pub fn identity(len: usize) -> Self {
        Self {
            order: (0..len).collect(),
            cursor: 0,
        }
    }

    /// Rebuild as identity for a new length. The cursor is clamped.
    pub fn reset(&mut self, len: usize) {
        self.order.clear();
        self.order.extend(0..len);
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.cursor = 0;
    }

    /// Randomise the order, keeping the current track under the cursor and
    /// moving it to the front so the rest of the queue plays after it.
    pub fn shuffle(&mut self) {
        let current = self.current();
        self.randomize();
        if let Some(pos) = current.and_then(|ix| self.position_of(ix)) {
            self.order.swap(0, pos);
        }
    }

    /// Randomise the order with no regard for the current track.
    pub fn randomize(&mut self) {
        self.order.shuffle(&mut rand::rng());
        self.cursor = 0;
    }

    /// Back to identity order, with the cursor on the same track by value.
    pub fn unshuffle(&mut self) {
        let current = self.current();
        let len = self.order.len();
        self.order.clear();
        self.order.extend(0..len);
        if let Some(ix) = current {
            self.cursor = ix;
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Playlist index at queue position `pos`.
    pub fn get(&self, pos: usize) -> Option<usize> {
        self.order.get(pos).copied()
    }

    /// Playlist index under the cursor.
    pub fn current(&self) -> Option<usize> {
        self.get(self.cursor)
    }

    pub fn position_of(&self, index: usize) -> Option<usize> {
        self.order.iter().position(|&i| i == index)
    }

    pub fn set_cursor(&mut self, pos: usize) {
        assert!(
            pos < self.order.len(),
            "BUG: queue cursor {pos} out of bounds ({} entries)",
            self.order.len()
        );
        self.cursor = pos;
    }

    /// The position one step away from the cursor, wrapped into range, and
    /// whether that step crossed a queue boundary.
    pub fn step(&self, forward: bool) -> (usize, bool) {
        let len = self.order.len();
        if len == 0 {
            return (0, true);
        }
        if forward {
            let next = self.cursor + 1;
            if next >= len { (0, true) } else { (next, false) }
        } else if self.cursor == 0 {
            (len - 1, true)
        } else {
            (self.cursor - 1, false)
        }
    }

    /// Whether the order is a permutation of `0..len`.
    pub fn is_permutation(&self) -> bool {
        let mut seen = vec![false; self.order.len()];
        for &i in &self.order {
            match seen.get_mut(i) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }
}
