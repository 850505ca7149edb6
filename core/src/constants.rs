//! Constants module - grid dimensions, capacities and flag sets shared by the map engine

use bitflags::bitflags;

// =============================================================================
// Grid
// =============================================================================

/// Maximum map dimension in tiles. Maps in use are `<= MAP_SIZE` on each side.
pub const MAP_SIZE: i32 = 64;
pub const LOG2_MAP_SIZE: i32 = 6;
/// Number of tiles in a full-size map.
pub const MAP_TILES: usize = (MAP_SIZE * MAP_SIZE) as usize;

// =============================================================================
// Archetypes and instances
// =============================================================================

/// Size of the archetype table. Index 0 is reserved.
pub const MAX_ITEM_DEF: usize = 256;
/// Largest footprint an archetype may declare, in tiles.
pub const MAX_ITEM_CX: usize = 6;
pub const MAX_ITEM_CY: usize = 6;

/// Archetype hit points meaning "cannot be damaged".
pub const HP_INDESTRUCTIBLE: u16 = 0xffff;

/// Default capacity of the placed-item pool.
pub const DEFAULT_ITEM_POOL: usize = 4096;

// =============================================================================
// Spatial index
// =============================================================================

pub const QUAD_DEPTH: usize = 5;
/// 1 + 4 + 16 + 64 + 256
pub const NUM_QUAD_NODES: usize = 341;

// =============================================================================
// Path costs
// =============================================================================

pub const CARDINAL_COST: f32 = 1.0;
pub const DIAGONAL_COST: f32 = std::f32::consts::SQRT_2;

/// Default limit on nodes opened by a single path search.
pub const DEFAULT_MAX_PATH_NODES: usize = MAP_TILES;

bitflags! {
    /// Per-instance state flags, persisted with the item row.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ItemFlags: u16 {
        /// door or hatch is open and contributes no blocking
        const OPEN = 1 << 0;
    }
}

bitflags! {
    /// Archetype material properties. Interpreted by game rules, not the map.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u16 {
        const FLAMMABLE = 1 << 0;
        const EXPLOSIVE = 1 << 1;
        const METAL = 1 << 2;
    }
}
