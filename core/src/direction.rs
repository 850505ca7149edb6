//! Cardinal directions and per-tile edge masks.

use crate::geometry::Vec2;
use serde::{Deserialize, Serialize};

/// The four tile edges, in clockwise order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// +y
    North = 0,
    /// +x
    East = 1,
    /// -y
    South = 2,
    /// -x
    West = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Direction {
        Self::ALL[index & 3]
    }

    #[inline]
    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    /// Direction after `quarter_turns` clockwise quarter turns.
    #[inline]
    pub fn rotate(self, quarter_turns: u8) -> Direction {
        Self::from_index(self.index() + quarter_turns as usize)
    }

    /// Tile offset of the neighbour across this edge.
    pub fn delta(self) -> Vec2 {
        match self {
            Direction::North => Vec2::new(0, 1),
            Direction::East => Vec2::new(1, 0),
            Direction::South => Vec2::new(0, -1),
            Direction::West => Vec2::new(-1, 0),
        }
    }

    /// Inverse of [`Direction::delta`] for unit cardinal steps.
    pub fn from_delta(delta: Vec2) -> Option<Direction> {
        match (delta.x, delta.y) {
            (0, 1) => Some(Direction::North),
            (1, 0) => Some(Direction::East),
            (0, -1) => Some(Direction::South),
            (-1, 0) => Some(Direction::West),
            _ => None,
        }
    }

    #[inline]
    pub fn bit(self) -> u8 {
        1 << self.index()
    }
}

/// One "blocked" bit per tile edge, indexed by [`Direction`].
///
/// A mask describes a tile from its own point of view: a set `East` bit
/// means nothing crosses the tile's east edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeMask(u8);

impl EdgeMask {
    pub const OPEN: EdgeMask = EdgeMask(0);
    pub const SOLID: EdgeMask = EdgeMask(0x0f);

    /// Builds a mask from raw bits; anything above the low nibble is dropped.
    #[inline]
    pub const fn from_bits(bits: u8) -> EdgeMask {
        EdgeMask(bits & 0x0f)
    }

    pub fn from_directions(dirs: &[Direction]) -> EdgeMask {
        EdgeMask(dirs.iter().fold(0, |acc, d| acc | d.bit()))
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_open(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn blocks(self, dir: Direction) -> bool {
        self.0 & dir.bit() != 0
    }

    #[inline]
    pub fn union(self, other: EdgeMask) -> EdgeMask {
        EdgeMask(self.0 | other.0)
    }

    /// The same blocked edges after rotating the tile clockwise.
    pub fn rotated(self, quarter_turns: u8) -> EdgeMask {
        Direction::ALL
            .iter()
            .filter(|d| self.blocks(**d))
            .fold(EdgeMask::OPEN, |acc, d| {
                acc.union(EdgeMask(d.rotate(quarter_turns).bit()))
            })
    }

    /// The mask seen from the neighbouring tile: every blocked edge is
    /// reported under its opposite direction.
    pub fn inverted(self) -> EdgeMask {
        Direction::ALL
            .iter()
            .filter(|d| self.blocks(**d))
            .fold(EdgeMask::OPEN, |acc, d| {
                acc.union(EdgeMask(d.opposite().bit()))
            })
    }
}
