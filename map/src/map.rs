//! The map: authoritative item store plus every cache derived from it.
//!
//! Mutations validate everything up front, write through to an attached
//! store, and only then touch in-memory state. Derived data (connectivity
//! masks, the light surface) is marked dirty and rebuilt on the next query
//! that reads it, which is why most queries take `&mut self`.

use std::collections::HashMap;

use serde::Serialize;
use tactics_core::constants::{ItemFlags, MAP_SIZE, MAP_TILES, QUAD_DEPTH};
use tactics_core::{BitGrid, Direction, EdgeMask, Rect, Vec2};

use crate::config::MapConfig;
use crate::connectivity::{ConnectionKind, ConnectivityMap};
use crate::error::{MapError, MapResult};
use crate::item::{ItemId, ItemPool, MapItem, ModelHandle, Storage};
use crate::item_def::{ItemDefTable, MapItemDef, ResourceId};
use crate::light_map::{FogOfWarGuard, LightMap, Surface};
use crate::pather::{NodeId, PathResult, PathSolver};
use crate::quad_tree::QuadTree;
use crate::rotation::footprint;
use crate::store::{ItemRow, MapStore};

/// Ground texture owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// One item as reported by [`Map::dump_tile`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDump {
    pub id: u32,
    pub def_index: u8,
    pub name: String,
    pub x: u8,
    pub y: u8,
    pub rot: u8,
    pub hp: u16,
    pub open: bool,
    pub destroyed: bool,
    pub has_storage: bool,
}

/// Everything the map knows about one tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileDump {
    pub x: i32,
    pub y: i32,
    pub path_mask: u8,
    pub vis_mask: u8,
    pub path_blocked: bool,
    pub visible: bool,
    pub items: Vec<ItemDump>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapStats {
    pub width: i32,
    pub height: i32,
    pub items: usize,
    pub item_capacity: usize,
    pub item_defs: usize,
    pub quad_depth_use: [usize; QUAD_DEPTH],
    pub path_query_id: u32,
    pub visibility_query_id: u32,
    pub store_table: Option<String>,
}

pub struct Map {
    config: MapConfig,
    width: i32,
    height: i32,
    defs: ItemDefTable,
    items: ItemPool,
    quad_tree: QuadTree,
    connectivity: ConnectivityMap,
    path_solver: PathSolver,
    light: LightMap,
    /// cost band per tile from the last near-path flood, 0 = unreachable
    walking_map: Vec<u8>,
    texture: Option<TextureHandle>,
    next_model: u32,
    store: Option<MapStore>,
    /// store row backing each item while a store is attached
    row_ids: HashMap<ItemId, i64>,
}

fn full_grid() -> Rect {
    Rect::new(0, 0, MAP_SIZE - 1, MAP_SIZE - 1)
}

fn check_size(width: i32, height: i32) -> MapResult<()> {
    if !(1..=MAP_SIZE).contains(&width) || !(1..=MAP_SIZE).contains(&height) {
        return Err(MapError::InvalidSize { width, height });
    }
    Ok(())
}

impl Map {
    pub fn new(config: MapConfig) -> MapResult<Self> {
        check_size(config.width, config.height)?;
        Ok(Self::build(config))
    }

    /// A full 64x64 map with the default pool and overlap checking.
    pub fn with_defaults() -> Self {
        Self::build(MapConfig::default())
    }

    fn build(config: MapConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            defs: ItemDefTable::new(),
            items: ItemPool::new(config.item_pool_capacity),
            quad_tree: QuadTree::new(),
            connectivity: ConnectivityMap::new(config.width, config.height),
            path_solver: PathSolver::new(config.max_path_nodes),
            light: LightMap::new(),
            walking_map: vec![0; MAP_TILES],
            texture: None,
            next_model: 1,
            store: None,
            row_ids: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    #[inline]
    pub fn in_map(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    /// Shrinks or grows the playable area. Refused if an item would end up
    /// outside it.
    pub fn set_size(&mut self, width: i32, height: i32) -> MapResult<()> {
        check_size(width, height)?;
        if let Some((_, item)) = self
            .items
            .iter()
            .find(|(_, item)| item.bounds.max.x >= width || item.bounds.max.y >= height)
        {
            log::warn!("set_size {width}x{height} would cut off {:?}", item.bounds);
            return Err(MapError::OutOfBounds {
                bounds: item.bounds,
                width,
                height,
            });
        }
        self.width = width;
        self.height = height;
        self.connectivity.set_size(width, height);
        self.light.invalidate(full_grid());
        self.path_solver.reset();
        Ok(())
    }

    fn invalidate(&mut self, rect: Rect) {
        self.connectivity.invalidate(rect);
        self.light.invalidate(rect);
    }

    /// Rebuilds the connectivity masks over whatever became dirty.
    fn regenerate(&mut self) {
        let Some(rect) = self.connectivity.take_dirty() else {
            return;
        };
        let ids = self.quad_tree.find_items(&rect);
        let items = &self.items;
        let defs = &self.defs;
        self.connectivity.rebuild(
            rect,
            ids.iter().filter_map(|id| {
                let item = items.get(*id)?;
                Some((item, defs.get(item.def_index as usize)?))
            }),
        );
    }

    fn write_through<T>(
        &self,
        what: &str,
        write: impl FnOnce(&MapStore) -> MapResult<T>,
    ) -> MapResult<Option<T>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        write(store).map(Some).map_err(|err| {
            log::error!("{what} failed on table {}: {err}", store.table());
            err
        })
    }

    fn row_id(&self, id: ItemId) -> MapResult<i64> {
        self.row_ids.get(&id).copied().ok_or(MapError::UnknownItem(id))
    }

    fn def_in_use(&self, index: usize) -> bool {
        self.items
            .iter()
            .any(|(_, item)| item.def_index as usize == index)
    }

    // ---- archetypes ----

    /// Resets archetype slot `index` to defaults for the caller to fill in.
    /// Refused while placed items use the slot.
    pub fn init_item_def(&mut self, index: usize) -> MapResult<&mut MapItemDef> {
        if self.def_in_use(index) {
            log::warn!("init_item_def {index}: archetype is in use");
            return Err(MapError::ItemDefInUse(index));
        }
        let def = self.defs.init(index)?;
        self.connectivity.invalidate(full_grid());
        Ok(def)
    }

    pub fn item_def(&self, index: usize) -> Option<&MapItemDef> {
        self.defs.get(index)
    }

    pub fn item_def_name(&self, index: usize) -> Option<&str> {
        self.defs.name(index)
    }

    pub fn item_defs(&self) -> &ItemDefTable {
        &self.defs
    }

    /// Fills the archetype table from `store`. Refused, with the table
    /// unchanged, if a stored archetype would reshape one placed items use.
    pub fn load_item_defs(&mut self, store: &MapStore) -> MapResult<usize> {
        let mut defs = self.defs.clone();
        let loaded = store.load_item_defs(&mut defs)?;
        if let Some((_, item)) = self.items.iter().find(|(_, item)| {
            let index = item.def_index as usize;
            defs.get(index) != self.defs.get(index)
        }) {
            log::warn!("stored archetype {} differs from the one in use", item.def_index);
            return Err(MapError::ItemDefInUse(item.def_index as usize));
        }
        self.defs = defs;
        self.connectivity.invalidate(full_grid());
        Ok(loaded)
    }

    // ---- items ----

    /// Places an instance of archetype `def_index` with its min corner at
    /// `(x, y)`. `hp` defaults to the archetype's; `Some(0)` places it
    /// already destroyed.
    #[allow(clippy::too_many_arguments)]
    pub fn add_item(
        &mut self,
        x: i32,
        y: i32,
        rot: u8,
        def_index: usize,
        hp: Option<u16>,
        flags: ItemFlags,
        storage: Option<Storage>,
    ) -> MapResult<ItemId> {
        if rot > 3 {
            log::warn!("add_item at ({x}, {y}): bad rotation {rot}");
            return Err(MapError::InvalidRotation(rot));
        }
        let def = self.defs.resolve(def_index).inspect_err(|err| {
            log::warn!("add_item at ({x}, {y}): {err}");
        })?;
        if !self.in_map(x, y) {
            log::warn!("add_item at ({x}, {y}) leaves the map");
            return Err(MapError::OutOfBounds {
                bounds: Rect::tile(x, y),
                width: self.width,
                height: self.height,
            });
        }

        let bounds = footprint(x, y, def.cx as i32, def.cy as i32, rot);
        if !self.in_map(bounds.min.x, bounds.min.y) || !self.in_map(bounds.max.x, bounds.max.y) {
            log::warn!("add_item {bounds:?} leaves the map");
            return Err(MapError::OutOfBounds {
                bounds,
                width: self.width,
                height: self.height,
            });
        }

        if self.config.check_overlap && !def.allow_overlap {
            let blocker = self.quad_tree.find_items(&bounds).into_iter().find_map(|id| {
                let other = self.items.get(id)?;
                let other_def = self.defs.get(other.def_index as usize)?;
                (!other_def.allow_overlap).then_some(other.bounds)
            });
            if let Some(other) = blocker {
                log::warn!("add_item {bounds:?} overlaps {other:?}");
                return Err(MapError::Overlap { bounds, other });
            }
        }

        if self.items.is_full() {
            log::warn!("add_item {bounds:?}: item pool full");
            return Err(MapError::PoolExhausted {
                capacity: self.items.capacity(),
            });
        }

        let item = MapItem {
            x: x as u8,
            y: y as u8,
            rot,
            def_index: def_index as u8,
            hp: hp.unwrap_or(def.hp),
            flags,
            bounds,
            model: ModelHandle(self.next_model),
            storage,
        };
        let row_id = self.write_through("insert", |store| store.insert_row(&ItemRow::from(&item)))?;

        self.next_model = self.next_model.wrapping_add(1);
        let id = self.items.alloc(item)?;
        if let Some(row_id) = row_id {
            self.row_ids.insert(id, row_id);
        }
        self.quad_tree.add(id, bounds);
        self.invalidate(bounds);
        log::debug!("added item {id:?} (def {def_index}) at {bounds:?}");
        Ok(id)
    }

    /// Removes every item covering `(x, y)` and returns how many went.
    /// The stored rows go in one transaction.
    pub fn delete_at(&mut self, x: i32, y: i32) -> MapResult<usize> {
        let ids = self.quad_tree.find_items_at(x, y);
        if ids.is_empty() {
            return Err(MapError::NoItemAt(Vec2::new(x, y)));
        }

        if let Some(store) = self.store.as_mut() {
            let row_ids = ids
                .iter()
                .map(|id| self.row_ids.get(id).copied().ok_or(MapError::UnknownItem(*id)))
                .collect::<MapResult<Vec<i64>>>()?;
            if let Err(err) = store.delete_rows(&row_ids) {
                log::error!("delete failed on table {}: {err}", store.table());
                return Err(err);
            }
        }

        for id in &ids {
            self.row_ids.remove(id);
            let item = self.items.release(*id);
            self.quad_tree.unlink(*id, &item.bounds);
            self.invalidate(item.bounds);
            log::debug!("removed item {id:?} from {:?}", item.bounds);
        }
        Ok(ids.len())
    }

    /// Removes every item.
    pub fn clear(&mut self) -> MapResult<()> {
        if let Some(store) = self.store.as_mut() {
            store.replace_rows(&[])?;
        }
        self.clear_items();
        Ok(())
    }

    fn clear_items(&mut self) {
        self.items.clear();
        self.row_ids.clear();
        self.quad_tree.clear();
        self.invalidate(full_grid());
    }

    /// Applies explosion or impact damage to the item owning `model`.
    /// Returns true if this destroyed it.
    pub fn do_damage(&mut self, model: ModelHandle, damage: u16) -> MapResult<bool> {
        let id = self.find_item(model).ok_or(MapError::UnknownModel(model))?;
        self.damage_item(id, damage)
    }

    /// Subtracts `damage` from the item. A destroyed item stays in place
    /// and switches to its archetype's destroyed masks. Indestructible and
    /// already destroyed items ignore damage.
    pub fn damage_item(&mut self, id: ItemId, damage: u16) -> MapResult<bool> {
        let item = self.items.get(id).ok_or(MapError::UnknownItem(id))?;
        let can_damage = self
            .defs
            .get(item.def_index as usize)
            .is_some_and(MapItemDef::can_damage);
        if !can_damage || item.destroyed() || damage == 0 {
            return Ok(false);
        }

        let mut updated = item.clone();
        let destroyed = updated.do_damage(damage);
        self.write_through("update", |store| {
            store.update_row(self.row_id(id)?, &ItemRow::from(&updated))
        })?;

        let bounds = updated.bounds;
        if let Some(slot) = self.items.get_mut(id) {
            *slot = updated;
        }
        if destroyed {
            self.invalidate(bounds);
            log::debug!("item {id:?} destroyed at {bounds:?}");
        }
        Ok(destroyed)
    }

    /// Lowest-numbered item covering the tile.
    fn first_item_at(&self, x: i32, y: i32) -> MapResult<ItemId> {
        self.quad_tree
            .find_items_at(x, y)
            .into_iter()
            .min()
            .ok_or(MapError::NoItemAt(Vec2::new(x, y)))
    }

    /// Replaces `id` after `change` edits a copy, writing the result
    /// through first.
    fn update_item(&mut self, id: ItemId, change: impl FnOnce(&mut MapItem)) -> MapResult<&MapItem> {
        let mut updated = self.items.get(id).ok_or(MapError::UnknownItem(id))?.clone();
        change(&mut updated);
        self.write_through("update", |store| {
            store.update_row(self.row_id(id)?, &ItemRow::from(&updated))
        })?;
        let slot = self.items.get_mut(id).ok_or(MapError::UnknownItem(id))?;
        *slot = updated;
        Ok(slot)
    }

    /// Attaches `storage` to the item at `(x, y)`, returning whatever it
    /// held before.
    pub fn set_storage(&mut self, x: i32, y: i32, storage: Storage) -> MapResult<Option<Storage>> {
        let id = self.first_item_at(x, y)?;
        let mut previous = None;
        self.update_item(id, |item| previous = item.storage.replace(storage))?;
        Ok(previous)
    }

    pub fn remove_storage(&mut self, x: i32, y: i32) -> MapResult<Option<Storage>> {
        let id = self.first_item_at(x, y)?;
        let mut taken = None;
        self.update_item(id, |item| taken = item.storage.take())?;
        Ok(taken)
    }

    /// Opens or closes the door-like item at `(x, y)`. Open items add no
    /// blocking to the connectivity masks.
    pub fn set_item_open(&mut self, x: i32, y: i32, open: bool) -> MapResult<()> {
        let id = self.first_item_at(x, y)?;
        let bounds = self
            .update_item(id, |item| item.flags.set(ItemFlags::OPEN, open))?
            .bounds;
        self.invalidate(bounds);
        Ok(())
    }

    pub fn item(&self, id: ItemId) -> Option<&MapItem> {
        self.items.get(id)
    }

    pub fn items(&self) -> impl Iterator<Item = (ItemId, &MapItem)> {
        self.items.iter()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// The mesh the renderer should draw for `id` in its current state.
    pub fn model_resource(&self, id: ItemId) -> Option<ResourceId> {
        let item = self.items.get(id)?;
        let def = self.defs.get(item.def_index as usize)?;
        if item.destroyed() {
            def.model_destroyed.or(def.model)
        } else if item.is_open() {
            def.model_open.or(def.model)
        } else {
            def.model
        }
    }

    pub fn set_texture(&mut self, texture: Option<TextureHandle>) {
        self.texture = texture;
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    // ---- spatial queries ----

    pub fn find_items(&self, rect: &Rect) -> Vec<ItemId> {
        self.quad_tree.find_items(rect)
    }

    pub fn items_at(&self, x: i32, y: i32) -> Vec<ItemId> {
        self.quad_tree.find_items_at(x, y)
    }

    /// The item owning `model`.
    pub fn find_item(&self, model: ModelHandle) -> Option<ItemId> {
        self.quad_tree
            .find_item(|id| self.items.get(id).is_some_and(|item| item.model == model))
    }

    pub fn map_bounds_of_model(&self, model: ModelHandle) -> Option<Rect> {
        self.find_item(model)
            .and_then(|id| self.items.get(id))
            .map(|item| item.bounds)
    }

    pub fn quad_tree(&self) -> &QuadTree {
        &self.quad_tree
    }

    // ---- connectivity ----

    /// The connectivity masks, rebuilt first if anything changed.
    pub fn connectivity(&mut self) -> &ConnectivityMap {
        self.regenerate();
        &self.connectivity
    }

    pub fn path_mask(&mut self, x: i32, y: i32) -> EdgeMask {
        self.connectivity().path_mask(x, y)
    }

    pub fn vis_mask(&mut self, x: i32, y: i32) -> EdgeMask {
        self.connectivity().vis_mask(x, y)
    }

    pub fn connected(&mut self, kind: ConnectionKind, x: i32, y: i32, dir: Direction) -> bool {
        self.connectivity().connected(kind, x, y, dir)
    }

    pub fn clear_path_blocks(&mut self) {
        self.connectivity.clear_path_blocks();
    }

    pub fn set_path_block(&mut self, x: i32, y: i32) {
        self.connectivity.set_path_block(x, y);
    }

    pub fn path_query_id(&self) -> u32 {
        self.connectivity.path_query_id()
    }

    pub fn visibility_query_id(&self) -> u32 {
        self.connectivity.visibility_query_id()
    }

    // ---- pathing ----

    pub fn solve_path(&mut self, start: Vec2, end: Vec2) -> PathResult<Vec2> {
        if !self.in_map(start.x, start.y) || !self.in_map(end.x, end.y) {
            return PathResult::NoSolution;
        }
        self.regenerate();
        self.path_solver
            .solve(
                &self.connectivity,
                NodeId::from_tile(start.x, start.y),
                NodeId::from_tile(end.x, end.y),
            )
            .map_nodes(NodeId::to_tile)
    }

    /// Drops cached path results.
    pub fn reset_path(&mut self) {
        self.path_solver.reset();
    }

    /// Floods outward from `start` and records a cost band per tile in the
    /// walking map: 1 up to `c0`, 2 up to `c1`, 3 up to `c2`. Returns the
    /// number of reachable tiles.
    pub fn show_near_path(&mut self, start: Vec2, c0: f32, c1: f32, c2: f32) -> usize {
        self.clear_near_path();
        if !self.in_map(start.x, start.y) {
            return 0;
        }
        self.regenerate();
        let near = self.path_solver.solve_for_near_states(
            &self.connectivity,
            NodeId::from_tile(start.x, start.y),
            c2,
        );
        for state in &near {
            self.walking_map[state.node.index()] = if state.cost <= c0 {
                1
            } else if state.cost <= c1 {
                2
            } else {
                3
            };
        }
        near.len()
    }

    pub fn walking_map(&self) -> &[u8] {
        &self.walking_map
    }

    pub fn walking_at(&self, x: i32, y: i32) -> u8 {
        if !(0..MAP_SIZE).contains(&x) || !(0..MAP_SIZE).contains(&y) {
            return 0;
        }
        self.walking_map[NodeId::from_tile(x, y).index()]
    }

    pub fn clear_near_path(&mut self) {
        self.walking_map.fill(0);
    }

    // ---- visibility ----

    pub fn can_see(&mut self, origin: Vec2, delta: Vec2) -> bool {
        self.connectivity().can_see(origin, delta)
    }

    pub fn can_see_step(&mut self, from: Vec2, to: Vec2) -> bool {
        self.connectivity().can_see_step(from, to)
    }

    pub fn dump_tile(&mut self, x: i32, y: i32) -> TileDump {
        self.regenerate();
        let mut ids = self.quad_tree.find_items_at(x, y);
        ids.sort();
        let items = ids
            .into_iter()
            .filter_map(|id| self.items.get(id).map(|item| (id, item)))
            .map(|(id, item)| ItemDump {
                id: id.0,
                def_index: item.def_index,
                name: self
                    .defs
                    .name(item.def_index as usize)
                    .unwrap_or_default()
                    .to_string(),
                x: item.x,
                y: item.y,
                rot: item.rot,
                hp: item.hp,
                open: item.is_open(),
                destroyed: item.destroyed(),
                has_storage: item.storage.is_some(),
            })
            .collect();
        let dump = TileDump {
            x,
            y,
            path_mask: self.connectivity.path_mask(x, y).bits(),
            vis_mask: self.connectivity.vis_mask(x, y).bits(),
            path_blocked: self.connectivity.is_path_blocked(x, y),
            visible: self.light.fog_of_war().is_set(x, y),
            items,
        };
        log::debug!("{dump:?}");
        dump
    }

    // ---- light ----

    /// Sets the static lighting surface, which must be 64x64.
    pub fn set_light_map(&mut self, base: Option<Surface>) -> MapResult<()> {
        self.light.set_base(base)
    }

    pub fn light_map(&mut self) -> &Surface {
        self.light.surface()
    }

    pub fn fog_of_war(&self) -> &BitGrid {
        self.light.fog_of_war()
    }

    pub fn lock_fog_of_war(&mut self) -> FogOfWarGuard<'_> {
        self.light.lock_fog_of_war()
    }

    // ---- persistence ----

    /// Attaches `store`. A table with rows replaces the map's items; an
    /// empty table receives the current items. Later mutations write
    /// through to the attached store. Returns the number of items synced.
    pub fn sync_to_db(&mut self, mut store: MapStore) -> MapResult<usize> {
        let rows = store.load_keyed_rows()?;
        let synced = if rows.is_empty() {
            let (ids, rows): (Vec<ItemId>, Vec<ItemRow>) = self
                .items
                .iter()
                .map(|(id, item)| (id, ItemRow::from(item)))
                .unzip();
            let row_ids = store.replace_rows(&rows)?;
            self.row_ids = ids.into_iter().zip(row_ids).collect();
            log::info!("wrote {} items to {}", rows.len(), store.table());
            rows.len()
        } else {
            self.load_rows(rows)?;
            log::info!("loaded {} items from {}", self.items.len(), store.table());
            self.items.len()
        };
        self.store = Some(store);
        Ok(synced)
    }

    /// Replaces every item with `rows`. On failure the previous items are
    /// restored.
    fn load_rows(&mut self, rows: Vec<(i64, ItemRow)>) -> MapResult<()> {
        let previous_store = self.store.take();
        let backup = (
            self.items.clone(),
            self.quad_tree.clone(),
            self.next_model,
            self.row_ids.clone(),
        );
        self.clear_items();

        for (row_id, row) in rows {
            match self.add_item(
                row.x as i32,
                row.y as i32,
                row.rot,
                row.def_index as usize,
                Some(row.hp),
                row.flags,
                row.storage,
            ) {
                Ok(id) => {
                    self.row_ids.insert(id, row_id);
                }
                Err(err) => {
                    log::error!("rejected stored item at ({}, {}): {err}", row.x, row.y);
                    (self.items, self.quad_tree, self.next_model, self.row_ids) = backup;
                    self.invalidate(full_grid());
                    self.store = previous_store;
                    return Err(err);
                }
            }
        }
        self.store = previous_store;
        Ok(())
    }

    pub fn detach_store(&mut self) -> Option<MapStore> {
        self.row_ids.clear();
        self.store.take()
    }

    pub fn store(&self) -> Option<&MapStore> {
        self.store.as_ref()
    }

    pub fn stats(&self) -> MapStats {
        MapStats {
            width: self.width,
            height: self.height,
            items: self.items.len(),
            item_capacity: self.items.capacity(),
            item_defs: self.defs.iter().count(),
            quad_depth_use: self.quad_tree.depth_use(),
            path_query_id: self.path_query_id(),
            visibility_query_id: self.visibility_query_id(),
            store_table: self.store.as_ref().map(|s| s.table().to_string()),
        }
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with_crate() -> Map {
        let mut map = Map::with_defaults();
        let def = map.init_item_def(1).unwrap();
        def.name = "crate".to_string();
        def.cx = 2;
        def.cy = 1;
        def.hp = 30;
        def.fill(EdgeMask::SOLID, EdgeMask::SOLID);
        map
    }

    #[test]
    fn add_item_rejects_bad_input_before_mutating() {
        let mut map = map_with_crate();
        assert!(matches!(
            map.add_item(0, 0, 4, 1, None, ItemFlags::empty(), None),
            Err(MapError::InvalidRotation(4))
        ));
        assert!(matches!(
            map.add_item(0, 0, 0, 0, None, ItemFlags::empty(), None),
            Err(MapError::InvalidDefIndex(0))
        ));
        assert!(matches!(
            map.add_item(0, 0, 0, 9, None, ItemFlags::empty(), None),
            Err(MapError::UndefinedItemDef(9))
        ));
        assert!(matches!(
            map.add_item(63, 0, 0, 1, None, ItemFlags::empty(), None),
            Err(MapError::OutOfBounds { .. })
        ));
        assert!(matches!(
            map.add_item(-1, 0, 0, 1, None, ItemFlags::empty(), None),
            Err(MapError::OutOfBounds { .. })
        ));
        assert_eq!(map.item_count(), 0);
    }

    #[test]
    fn extreme_coordinates_are_out_of_bounds() {
        let mut map = map_with_crate();
        for (x, y) in [(i32::MAX, 0), (0, i32::MAX), (i32::MIN, 5)] {
            assert!(matches!(
                map.add_item(x, y, 0, 1, None, ItemFlags::empty(), None),
                Err(MapError::OutOfBounds { .. })
            ));
        }
        assert!(!map.can_see(Vec2::new(5, 5), Vec2::new(i32::MAX, 0)));
        assert_eq!(map.item_count(), 0);
    }

    #[test]
    fn archetype_in_use_cannot_be_redefined() {
        let mut map = map_with_crate();
        map.add_item(3, 3, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        assert!(matches!(
            map.init_item_def(1),
            Err(MapError::ItemDefInUse(1))
        ));
        assert_eq!(map.item_def(1).unwrap().cx, 2);
        assert_eq!(map.path_mask(4, 3), EdgeMask::SOLID);

        map.delete_at(3, 3).unwrap();
        map.init_item_def(1).unwrap().cx = 3;
        assert_eq!(map.item_def(1).unwrap().cx, 3);
    }

    #[test]
    fn stored_archetypes_cannot_reshape_placed_items() {
        let mut other = Map::with_defaults();
        other.init_item_def(1).unwrap().cx = 4;
        let mut store = MapStore::open_in_memory("items").unwrap();
        store.save_item_defs(other.item_defs()).unwrap();

        let mut map = map_with_crate();
        map.add_item(3, 3, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        assert!(matches!(
            map.load_item_defs(&store),
            Err(MapError::ItemDefInUse(1))
        ));
        assert_eq!(map.item_def(1).unwrap().cx, 2);
    }

    #[test]
    fn rotated_footprint_fits_at_the_edge() {
        let mut map = map_with_crate();
        let id = map
            .add_item(63, 0, 1, 1, None, ItemFlags::empty(), None)
            .unwrap();
        assert_eq!(map.item(id).unwrap().bounds, Rect::new(63, 0, 63, 1));
    }

    #[test]
    fn overlap_is_rejected_unless_allowed() {
        let mut map = map_with_crate();
        map.add_item(4, 4, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        assert!(matches!(
            map.add_item(5, 4, 0, 1, None, ItemFlags::empty(), None),
            Err(MapError::Overlap { .. })
        ));

        let rug = map.init_item_def(2).unwrap();
        rug.allow_overlap = true;
        map.add_item(5, 4, 0, 2, None, ItemFlags::empty(), None)
            .unwrap();
        assert_eq!(map.items_at(5, 4).len(), 2);
    }

    #[test]
    fn overlap_check_can_be_switched_off() {
        let config = MapConfig {
            check_overlap: false,
            ..Default::default()
        };
        let mut map = Map::new(config).unwrap();
        map.init_item_def(1).unwrap();
        map.add_item(1, 1, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        map.add_item(1, 1, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        assert_eq!(map.delete_at(1, 1).unwrap(), 2);
    }

    #[test]
    fn pool_exhaustion_is_reported() {
        let config = MapConfig {
            item_pool_capacity: 1,
            ..Default::default()
        };
        let mut map = Map::new(config).unwrap();
        map.init_item_def(1).unwrap();
        map.add_item(0, 0, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        assert!(matches!(
            map.add_item(2, 2, 0, 1, None, ItemFlags::empty(), None),
            Err(MapError::PoolExhausted { capacity: 1 })
        ));
    }

    #[test]
    fn invalid_size_is_rejected() {
        let config = MapConfig {
            width: 65,
            ..Default::default()
        };
        assert!(matches!(
            Map::new(config),
            Err(MapError::InvalidSize { width: 65, .. })
        ));
    }

    #[test]
    fn set_size_keeps_items_inside() {
        let mut map = map_with_crate();
        map.add_item(10, 10, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        assert!(matches!(
            map.set_size(11, 32),
            Err(MapError::OutOfBounds { .. })
        ));
        assert_eq!(map.width(), 64);
        map.set_size(12, 32).unwrap();
        assert_eq!((map.width(), map.height()), (12, 32));
        assert!(matches!(
            map.add_item(20, 0, 0, 1, None, ItemFlags::empty(), None),
            Err(MapError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn delete_at_empty_tile_fails() {
        let mut map = map_with_crate();
        assert!(matches!(map.delete_at(3, 3), Err(MapError::NoItemAt(_))));
    }

    #[test]
    fn damage_through_model_handle() {
        let mut map = map_with_crate();
        let id = map
            .add_item(2, 2, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        let model = map.item(id).unwrap().model;
        assert_eq!(map.map_bounds_of_model(model), Some(Rect::new(2, 2, 3, 2)));

        assert!(!map.do_damage(model, 10).unwrap());
        assert_eq!(map.item(id).unwrap().hp, 20);
        assert!(map.do_damage(model, 25).unwrap());
        assert!(map.item(id).unwrap().destroyed());
        assert!(!map.do_damage(model, 5).unwrap());
        assert!(matches!(
            map.do_damage(ModelHandle(9999), 1),
            Err(MapError::UnknownModel(_))
        ));
    }

    #[test]
    fn indestructible_items_ignore_damage() {
        let mut map = Map::with_defaults();
        map.init_item_def(1).unwrap();
        let id = map
            .add_item(0, 0, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        assert!(!map.damage_item(id, 60000).unwrap());
        assert!(!map.item(id).unwrap().destroyed());
    }

    #[test]
    fn storage_moves_in_and_out() {
        let mut map = map_with_crate();
        map.add_item(6, 6, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        let mut storage = Storage::new();
        storage.add("medkit", 1);
        assert_eq!(map.set_storage(7, 6, storage.clone()).unwrap(), None);
        assert_eq!(map.remove_storage(6, 6).unwrap(), Some(storage));
        assert_eq!(map.remove_storage(6, 6).unwrap(), None);
        assert!(matches!(
            map.set_storage(0, 0, Storage::new()),
            Err(MapError::NoItemAt(_))
        ));
    }

    #[test]
    fn opening_a_door_clears_its_masks() {
        let mut map = map_with_crate();
        map.add_item(8, 8, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        assert_eq!(map.path_mask(8, 8), EdgeMask::SOLID);
        map.set_item_open(8, 8, true).unwrap();
        assert!(map.path_mask(8, 8).is_open());
        map.set_item_open(9, 8, false).unwrap();
        assert_eq!(map.path_mask(9, 8), EdgeMask::SOLID);
    }

    #[test]
    fn model_resource_follows_state() {
        let mut map = Map::with_defaults();
        {
            let door = map.init_item_def(3).unwrap();
            door.hp = 5;
            door.model = Some(ResourceId(1));
            door.model_open = Some(ResourceId(2));
            door.model_destroyed = Some(ResourceId(3));
        }
        let id = map
            .add_item(0, 0, 0, 3, None, ItemFlags::empty(), None)
            .unwrap();
        assert_eq!(map.model_resource(id), Some(ResourceId(1)));
        map.set_item_open(0, 0, true).unwrap();
        assert_eq!(map.model_resource(id), Some(ResourceId(2)));
        map.damage_item(id, 5).unwrap();
        assert_eq!(map.model_resource(id), Some(ResourceId(3)));
    }

    #[test]
    fn near_path_bands_costs() {
        let mut map = Map::with_defaults();
        let reached = map.show_near_path(Vec2::new(10, 10), 1.0, 2.0, 3.0);
        assert!(reached > 0);
        assert_eq!(map.walking_at(10, 10), 1);
        assert_eq!(map.walking_at(11, 10), 1);
        assert_eq!(map.walking_at(12, 10), 2);
        assert_eq!(map.walking_at(13, 10), 3);
        assert_eq!(map.walking_at(14, 10), 0);
        map.clear_near_path();
        assert!(map.walking_map().iter().all(|band| *band == 0));
    }

    #[test]
    fn dump_tile_lists_items() {
        let mut map = map_with_crate();
        map.add_item(1, 1, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        let dump = map.dump_tile(2, 1);
        assert_eq!(dump.path_mask, EdgeMask::SOLID.bits());
        assert!(dump.visible);
        assert_eq!(dump.items.len(), 1);
        assert_eq!(dump.items[0].name, "crate");
    }

    #[test]
    fn clear_removes_everything() {
        let mut map = map_with_crate();
        map.add_item(1, 1, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        map.add_item(20, 20, 0, 1, None, ItemFlags::empty(), None)
            .unwrap();
        map.clear().unwrap();
        assert_eq!(map.item_count(), 0);
        assert!(map.quad_tree().is_empty());
        assert!(map.path_mask(1, 1).is_open());
    }
}
