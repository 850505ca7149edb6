use tactics_core::{Rect, Vec2};

use crate::item::{ItemId, ModelHandle};

/// Why a map mutation or persistence call was rejected.
///
/// Every variant except [`MapError::Store`] is raised before any state
/// changes, so a failed call leaves the map exactly as it was.
#[derive(thiserror::Error, Debug)]
pub enum MapError {
    /// The placed-item pool has no free slot.
    #[error("item pool exhausted ({capacity} slots in use)")]
    PoolExhausted { capacity: usize },

    /// Archetype index 0 or past the end of the table.
    #[error("archetype index {0} out of range")]
    InvalidDefIndex(usize),

    /// The archetype slot exists but was never initialised.
    #[error("archetype {0} is not defined")]
    UndefinedItemDef(usize),

    /// The archetype declares a footprint the map cannot hold.
    #[error("archetype {index} has invalid footprint {cx}x{cy}")]
    InvalidItemDef { index: usize, cx: u8, cy: u8 },

    #[error("rotation {0} is not a quarter turn (0..=3)")]
    InvalidRotation(u8),

    /// Placed items still use the archetype, so it cannot be redefined.
    #[error("archetype {0} is used by placed items")]
    ItemDefInUse(usize),

    /// Position or footprint leaves the map.
    #[error("footprint {bounds:?} leaves the {width}x{height} map")]
    OutOfBounds { bounds: Rect, width: i32, height: i32 },

    /// Footprint collides with an item whose archetype forbids overlap.
    #[error("footprint {bounds:?} overlaps an existing item at {other:?}")]
    Overlap { bounds: Rect, other: Rect },

    #[error("no item at {0:?}")]
    NoItemAt(Vec2),

    #[error("no item in slot {0:?}")]
    UnknownItem(ItemId),

    #[error("no item owns model {0:?}")]
    UnknownModel(ModelHandle),

    #[error("map size {width}x{height} is not usable")]
    InvalidSize { width: i32, height: i32 },

    #[error("'{0}' is not a valid table name")]
    InvalidTableName(String),

    /// The attached database rejected a read or write.
    #[error("map store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub type MapResult<T> = Result<T, MapError>;
