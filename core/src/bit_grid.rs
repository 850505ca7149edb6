//! Fixed-size per-tile bit array.

use crate::constants::{MAP_SIZE, MAP_TILES};

const WORDS: usize = MAP_TILES / 64;

/// One bit per tile of a full-size map.
#[derive(Clone, PartialEq, Eq)]
pub struct BitGrid {
    words: [u64; WORDS],
}

impl Default for BitGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BitGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitGrid")
            .field("set", &self.count())
            .finish()
    }
}

impl BitGrid {
    /// All bits clear.
    pub fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    #[inline]
    fn locate(x: i32, y: i32) -> Option<(usize, u64)> {
        if x < 0 || y < 0 || x >= MAP_SIZE || y >= MAP_SIZE {
            return None;
        }
        let bit = (y * MAP_SIZE + x) as usize;
        Some((bit / 64, 1u64 << (bit % 64)))
    }

    /// Out-of-range coordinates read as clear.
    #[inline]
    pub fn is_set(&self, x: i32, y: i32) -> bool {
        Self::locate(x, y).is_some_and(|(w, mask)| self.words[w] & mask != 0)
    }

    /// Out-of-range coordinates are ignored.
    #[inline]
    pub fn set(&mut self, x: i32, y: i32) {
        if let Some((w, mask)) = Self::locate(x, y) {
            self.words[w] |= mask;
        }
    }

    #[inline]
    pub fn clear(&mut self, x: i32, y: i32) {
        if let Some((w, mask)) = Self::locate(x, y) {
            self.words[w] &= !mask;
        }
    }

    pub fn set_all(&mut self) {
        self.words = [u64::MAX; WORDS];
    }

    pub fn clear_all(&mut self) {
        self.words = [0; WORDS];
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
