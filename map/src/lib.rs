//! Tactical tile map engine.
//!
//! A [`Map`] owns placed items on a grid of up to 64x64 tiles, indexes them
//! in a fixed-depth quad tree, derives per-edge path and sight masks from
//! them, and answers path, line-of-sight and "what is here" queries. Item
//! placements can be kept in sync with a SQLite table through [`MapStore`].

pub mod config;
pub mod connectivity;
pub mod error;
pub mod item;
pub mod item_def;
pub mod light_map;
pub mod map;
pub mod path_graph;
pub mod pather;
pub mod quad_tree;
pub mod rotation;
pub mod store;
pub mod visibility;

pub use config::MapConfig;
pub use connectivity::{ConnectionKind, ConnectivityMap};
pub use error::{MapError, MapResult};
pub use item::{ItemId, MapItem, ModelHandle, Storage};
pub use item_def::{CellMasks, ItemDefTable, MapItemDef, ResourceId};
pub use light_map::{FogOfWarGuard, Rgb, Surface};
pub use map::{ItemDump, Map, MapStats, TextureHandle, TileDump};
pub use pather::{Graph, NodeId, PathResult, PathSolver, StateCost};
pub use store::{ItemRow, MapStore};
