//! Quarter-turn rotation of archetype footprints.

use tactics_core::{Rect, Vec2};

/// Integer 2x2 rotation plus translation mapping a cell of an archetype's
/// local `cx` by `cy` grid onto the rotated footprint, relative to the
/// footprint's min corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationMatrix {
    a: i32,
    b: i32,
    c: i32,
    d: i32,
    tx: i32,
    ty: i32,
}

impl RotationMatrix {
    /// `rot` counts clockwise quarter turns and must be 0..=3.
    pub fn new(cx: i32, cy: i32, rot: u8) -> Self {
        debug_assert!(rot < 4, "rotation {rot} out of range");
        match rot & 3 {
            // (i, j)
            0 => Self { a: 1, b: 0, c: 0, d: 1, tx: 0, ty: 0 },
            // (j, cx-1-i)
            1 => Self { a: 0, b: 1, c: -1, d: 0, tx: 0, ty: cx - 1 },
            // (cx-1-i, cy-1-j)
            2 => Self { a: -1, b: 0, c: 0, d: -1, tx: cx - 1, ty: cy - 1 },
            // (cy-1-j, i)
            _ => Self { a: 0, b: -1, c: 1, d: 0, tx: cy - 1, ty: 0 },
        }
    }

    #[inline]
    pub fn apply(&self, local: Vec2) -> Vec2 {
        Vec2::new(
            self.a * local.x + self.b * local.y + self.tx,
            self.c * local.x + self.d * local.y + self.ty,
        )
    }
}

/// Footprint size after rotation.
pub fn rotated_size(cx: i32, cy: i32, rot: u8) -> (i32, i32) {
    if rot & 1 == 1 { (cy, cx) } else { (cx, cy) }
}

/// Tile rectangle an archetype covers when placed at `(x, y)` with `rot`.
pub fn footprint(x: i32, y: i32, cx: i32, cy: i32, rot: u8) -> Rect {
    let (w, h) = rotated_size(cx, cy, rot);
    Rect::with_size(x, y, w, h)
}
