use std::env;
use std::str::FromStr;

use tactics_core::constants::{DEFAULT_ITEM_POOL, DEFAULT_MAX_PATH_NODES, MAP_SIZE};

/// Sizes and policies fixed when a [`Map`](crate::Map) is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapConfig {
    /// playable width in tiles, 1..=64
    pub width: i32,
    /// playable height in tiles, 1..=64
    pub height: i32,
    pub item_pool_capacity: usize,
    /// node budget of one path search before it reports out of memory
    pub max_path_nodes: usize,
    /// reject overlapping footprints unless an archetype allows it
    pub check_overlap: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: MAP_SIZE,
            height: MAP_SIZE,
            item_pool_capacity: DEFAULT_ITEM_POOL,
            max_path_nodes: DEFAULT_MAX_PATH_NODES,
            check_overlap: true,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("ignoring unparsable {name}={raw:?}");
            default
        }),
        Err(_) => default,
    }
}

impl MapConfig {
    /// Defaults overridden by `TACTICS_MAP_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut config = Self {
            width: env_or("TACTICS_MAP_WIDTH", defaults.width),
            height: env_or("TACTICS_MAP_HEIGHT", defaults.height),
            item_pool_capacity: env_or("TACTICS_MAP_ITEM_POOL", defaults.item_pool_capacity),
            max_path_nodes: env_or("TACTICS_MAP_PATH_NODES", defaults.max_path_nodes),
            check_overlap: env_or("TACTICS_MAP_CHECK_OVERLAP", defaults.check_overlap),
        };
        if !(1..=MAP_SIZE).contains(&config.width) || !(1..=MAP_SIZE).contains(&config.height) {
            log::warn!(
                "map size {}x{} out of range, using {MAP_SIZE}x{MAP_SIZE}",
                config.width,
                config.height
            );
            config.width = defaults.width;
            config.height = defaults.height;
        }
        config
    }
}
