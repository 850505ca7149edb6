//! Fog of war and the light surface derived from it.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tactics_core::constants::MAP_SIZE;
use tactics_core::{BitGrid, Rect};

use crate::error::{MapError, MapResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// The colour at a quarter of its brightness.
    pub fn dimmed(self) -> Rgb {
        Rgb::new(self.r >> 2, self.g >> 2, self.b >> 2)
    }
}

/// Row-major pixel buffer, one pixel per tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: i32,
    height: i32,
    pixels: Vec<Rgb>,
}

impl Surface {
    pub fn new(width: i32, height: i32, fill: Rgb) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; (width.max(0) * height.max(0)) as usize],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        (x >= 0 && y >= 0 && x < self.width && y < self.height)
            .then(|| (y * self.width + x) as usize)
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Rgb> {
        self.offset(x, y).map(|i| self.pixels[i])
    }

    /// Out-of-range writes are ignored.
    pub fn set(&mut self, x: i32, y: i32, color: Rgb) {
        if let Some(i) = self.offset(x, y) {
            self.pixels[i] = color;
        }
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }
}

#[derive(Debug, Clone)]
pub struct LightMap {
    base: Option<Surface>,
    final_map: Surface,
    /// set bit = tile currently visible
    fog_of_war: BitGrid,
    invalid: Option<Rect>,
}

impl Default for LightMap {
    fn default() -> Self {
        Self::new()
    }
}

fn full_grid() -> Rect {
    Rect::new(0, 0, MAP_SIZE - 1, MAP_SIZE - 1)
}

impl LightMap {
    /// No base lighting and every tile visible.
    pub fn new() -> Self {
        let mut fog_of_war = BitGrid::new();
        fog_of_war.set_all();
        Self {
            base: None,
            final_map: Surface::new(MAP_SIZE, MAP_SIZE, Rgb::WHITE),
            fog_of_war,
            invalid: Some(full_grid()),
        }
    }

    /// Replaces the static lighting. A base surface must cover the full grid.
    pub fn set_base(&mut self, base: Option<Surface>) -> MapResult<()> {
        if let Some(surface) = &base {
            if surface.width != MAP_SIZE || surface.height != MAP_SIZE {
                return Err(MapError::InvalidSize {
                    width: surface.width,
                    height: surface.height,
                });
            }
        }
        self.base = base;
        self.invalidate(full_grid());
        Ok(())
    }

    pub fn base(&self) -> Option<&Surface> {
        self.base.as_ref()
    }

    pub fn invalidate(&mut self, rect: Rect) {
        let Some(rect) = rect.intersection(&full_grid()) else {
            return;
        };
        self.invalid = Some(match self.invalid {
            Some(invalid) => invalid.union(&rect),
            None => rect,
        });
    }

    pub fn invalid(&self) -> Option<Rect> {
        self.invalid
    }

    /// The light surface, regenerating whatever was invalidated since the
    /// last call.
    pub fn surface(&mut self) -> &Surface {
        if let Some(rect) = self.invalid.take() {
            for tile in rect.tiles() {
                let base = self
                    .base
                    .as_ref()
                    .and_then(|s| s.get(tile.x, tile.y))
                    .unwrap_or(Rgb::WHITE);
                let color = if self.fog_of_war.is_set(tile.x, tile.y) {
                    base
                } else {
                    base.dimmed()
                };
                self.final_map.set(tile.x, tile.y, color);
            }
            log::trace!("regenerated light map over {rect:?}");
        }
        &self.final_map
    }

    pub fn fog_of_war(&self) -> &BitGrid {
        &self.fog_of_war
    }

    pub fn lock_fog_of_war(&mut self) -> FogOfWarGuard<'_> {
        FogOfWarGuard { light: self }
    }
}

/// Exclusive write access to the fog-of-war bits. Dropping the guard
/// invalidates the whole light map.
pub struct FogOfWarGuard<'a> {
    light: &'a mut LightMap,
}

impl Deref for FogOfWarGuard<'_> {
    type Target = BitGrid;

    fn deref(&self) -> &BitGrid {
        &self.light.fog_of_war
    }
}

impl DerefMut for FogOfWarGuard<'_> {
    fn deref_mut(&mut self) -> &mut BitGrid {
        &mut self.light.fog_of_war
    }
}

impl Drop for FogOfWarGuard<'_> {
    fn drop(&mut self) {
        self.light.invalidate(full_grid());
    }
}
