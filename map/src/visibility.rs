//! Line of sight over the visibility masks.
//!
//! Sight ignores path blocks: units standing on a tile do not hide what is
//! behind them.

use tactics_core::constants::MAP_SIZE;
use tactics_core::{Direction, Vec2};

use crate::connectivity::{ConnectionKind, ConnectivityMap};

impl ConnectivityMap {
    fn sees_across(&self, from: Vec2, dir: Direction) -> bool {
        self.connected(ConnectionKind::Visibility, from.x, from.y, dir)
    }

    /// Whether sight passes between two tiles one king-move apart. A
    /// diagonal step is clear if either way around the corner is.
    pub fn can_see_step(&self, from: Vec2, to: Vec2) -> bool {
        let delta = to - from;
        if delta == Vec2::default() {
            return true;
        }
        if let Some(dir) = Direction::from_delta(delta) {
            return self.sees_across(from, dir);
        }
        if delta.x.abs() != 1 || delta.y.abs() != 1 {
            return false;
        }

        let horizontal = if delta.x > 0 {
            Direction::East
        } else {
            Direction::West
        };
        let vertical = if delta.y > 0 {
            Direction::North
        } else {
            Direction::South
        };
        let via_h = from + horizontal.delta();
        let via_v = from + vertical.delta();
        (self.sees_across(from, horizontal) && self.sees_across(via_h, vertical))
            || (self.sees_across(from, vertical) && self.sees_across(via_v, horizontal))
    }

    /// Walks a Bresenham line from `origin` to `origin + delta` and fails at
    /// the first step sight cannot cross.
    pub fn can_see(&self, origin: Vec2, delta: Vec2) -> bool {
        if !self.in_map(origin.x, origin.y) {
            return false;
        }
        // Any longer reach lands off the map.
        if delta.x.unsigned_abs() >= MAP_SIZE as u32 || delta.y.unsigned_abs() >= MAP_SIZE as u32 {
            return false;
        }
        let target = origin + delta;
        if !self.in_map(target.x, target.y) {
            return false;
        }

        let dx = delta.x.abs();
        let dy = delta.y.abs();
        let sx = if delta.x > 0 { 1 } else { -1 };
        let sy = if delta.y > 0 { 1 } else { -1 };
        let mut err = dx - dy;
        let mut current = origin;

        while current != target {
            let e2 = 2 * err;
            let mut next = current;
            if e2 > -dy {
                err -= dy;
                next.x += sx;
            }
            if e2 < dx {
                err += dx;
                next.y += sy;
            }
            if !self.can_see_step(current, next) {
                return false;
            }
            current = next;
        }
        true
    }
}
