//! Per-tile path and visibility masks derived from placed items.
//!
//! The masks are a cache over the item store. Mutations only widen the
//! dirty rectangle; the owning map rebuilds it before the next query.

use tactics_core::constants::{MAP_SIZE, MAP_TILES};
use tactics_core::{BitGrid, Direction, EdgeMask, Rect, Vec2};

use crate::item::MapItem;
use crate::item_def::MapItemDef;
use crate::rotation::RotationMatrix;

/// Which of the two parallel masks an edge test reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Path,
    Visibility,
}

#[derive(Debug, Clone)]
pub struct ConnectivityMap {
    width: i32,
    height: i32,
    path_map: Vec<EdgeMask>,
    vis_map: Vec<EdgeMask>,
    /// transient blockers, e.g. units standing on a tile
    path_block: BitGrid,
    dirty: Option<Rect>,
    path_query_id: u32,
    vis_query_id: u32,
}

#[inline]
fn index(x: i32, y: i32) -> usize {
    (y * MAP_SIZE + x) as usize
}

impl ConnectivityMap {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            path_map: vec![EdgeMask::OPEN; MAP_TILES],
            vis_map: vec![EdgeMask::OPEN; MAP_TILES],
            path_block: BitGrid::new(),
            dirty: None,
            path_query_id: 1,
            vis_query_id: 1,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn set_size(&mut self, width: i32, height: i32) {
        self.width = width;
        self.height = height;
        self.invalidate(Rect::new(0, 0, MAP_SIZE - 1, MAP_SIZE - 1));
    }

    #[inline]
    pub fn in_map(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    /// Marks `rect` for rebuild. Both query ids move so cached path and
    /// visibility answers are dropped.
    pub fn invalidate(&mut self, rect: Rect) {
        let grid = Rect::new(0, 0, MAP_SIZE - 1, MAP_SIZE - 1);
        let Some(rect) = rect.intersection(&grid) else {
            return;
        };
        self.dirty = Some(match self.dirty {
            Some(dirty) => dirty.union(&rect),
            None => rect,
        });
        self.path_query_id = self.path_query_id.wrapping_add(1);
        self.vis_query_id = self.vis_query_id.wrapping_add(1);
    }

    pub fn dirty(&self) -> Option<Rect> {
        self.dirty
    }

    pub fn take_dirty(&mut self) -> Option<Rect> {
        self.dirty.take()
    }

    /// Recomputes the masks inside `rect` from `items`, which must include
    /// every item whose footprint intersects it.
    pub fn rebuild<'a>(
        &mut self,
        rect: Rect,
        items: impl IntoIterator<Item = (&'a MapItem, &'a MapItemDef)>,
    ) {
        for tile in rect.tiles() {
            self.path_map[index(tile.x, tile.y)] = EdgeMask::OPEN;
            self.vis_map[index(tile.x, tile.y)] = EdgeMask::OPEN;
        }

        let mut contributors = 0;
        for (item, def) in items {
            if item.is_open() {
                continue;
            }
            if !def.has_valid_footprint() {
                log::warn!("skipping item at ({}, {}): footprint {}x{}", item.x, item.y, def.cx, def.cy);
                continue;
            }
            contributors += 1;
            let (pather, visibility) = def.masks(item.destroyed());
            let matrix = RotationMatrix::new(def.cx as i32, def.cy as i32, item.rot);
            let origin = Vec2::new(item.x as i32, item.y as i32);

            for i in 0..def.cx as usize {
                for j in 0..def.cy as usize {
                    let tile = origin + matrix.apply(Vec2::new(i as i32, j as i32));
                    if !rect.contains(tile) {
                        continue;
                    }
                    let at = index(tile.x, tile.y);
                    self.path_map[at] = self.path_map[at].union(pather[i][j].rotated(item.rot));
                    self.vis_map[at] = self.vis_map[at].union(visibility[i][j].rotated(item.rot));
                }
            }
        }
        log::trace!("rebuilt connectivity over {rect:?} from {contributors} items");
    }

    fn masks(&self, kind: ConnectionKind) -> &[EdgeMask] {
        match kind {
            ConnectionKind::Path => &self.path_map,
            ConnectionKind::Visibility => &self.vis_map,
        }
    }

    /// Blocked edges of the tile for movement; solid outside the map.
    pub fn path_mask(&self, x: i32, y: i32) -> EdgeMask {
        if !self.in_map(x, y) {
            return EdgeMask::SOLID;
        }
        self.path_map[index(x, y)]
    }

    /// Blocked edges of the tile for sight; solid outside the map.
    pub fn vis_mask(&self, x: i32, y: i32) -> EdgeMask {
        if !self.in_map(x, y) {
            return EdgeMask::SOLID;
        }
        self.vis_map[index(x, y)]
    }

    /// Whether one can cross from `(x, y)` into its neighbour across `dir`.
    ///
    /// The source tile must leave the edge open and so must the neighbour,
    /// read from the neighbour's side through its inverted mask. Path
    /// queries also refuse a neighbour carrying a path block.
    pub fn connected(&self, kind: ConnectionKind, x: i32, y: i32, dir: Direction) -> bool {
        let to = Vec2::new(x, y) + dir.delta();
        if !self.in_map(x, y) || !self.in_map(to.x, to.y) {
            return false;
        }
        let masks = self.masks(kind);
        if masks[index(x, y)].blocks(dir) {
            return false;
        }
        if masks[index(to.x, to.y)].inverted().blocks(dir) {
            return false;
        }
        !(kind == ConnectionKind::Path && self.path_block.is_set(to.x, to.y))
    }

    pub fn clear_path_blocks(&mut self) {
        self.path_block.clear_all();
        self.path_query_id = self.path_query_id.wrapping_add(1);
    }

    pub fn set_path_block(&mut self, x: i32, y: i32) {
        if !self.in_map(x, y) {
            return;
        }
        self.path_block.set(x, y);
        self.path_query_id = self.path_query_id.wrapping_add(1);
    }

    pub fn is_path_blocked(&self, x: i32, y: i32) -> bool {
        self.path_block.is_set(x, y)
    }

    pub fn path_query_id(&self) -> u32 {
        self.path_query_id
    }

    pub fn visibility_query_id(&self) -> u32 {
        self.vis_query_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ModelHandle;
    use tactics_core::constants::ItemFlags;

    fn place(def: &MapItemDef, x: u8, y: u8, rot: u8) -> MapItem {
        let (w, h) = crate::rotation::rotated_size(def.cx as i32, def.cy as i32, rot);
        MapItem {
            x,
            y,
            rot,
            def_index: 1,
            hp: def.hp,
            flags: ItemFlags::empty(),
            bounds: Rect::with_size(x as i32, y as i32, w, h),
            model: ModelHandle(0),
            storage: None,
        }
    }

    fn built(items: &[(MapItem, MapItemDef)]) -> ConnectivityMap {
        let mut map = ConnectivityMap::new(MAP_SIZE, MAP_SIZE);
        map.invalidate(Rect::new(0, 0, 15, 15));
        let rect = map.take_dirty().unwrap();
        map.rebuild(rect, items.iter().map(|(item, def)| (item, def)));
        map
    }

    #[test]
    fn solid_tile_blocks_from_both_sides() {
        let mut def = MapItemDef::default();
        def.fill(EdgeMask::SOLID, EdgeMask::SOLID);
        let map = built(&[(place(&def, 5, 5, 0), def)]);

        assert!(!map.connected(ConnectionKind::Path, 5, 5, Direction::East));
        assert!(!map.connected(ConnectionKind::Path, 4, 5, Direction::East));
        assert!(!map.connected(ConnectionKind::Path, 6, 5, Direction::West));
        assert!(map.connected(ConnectionKind::Path, 4, 4, Direction::East));
    }

    #[test]
    fn single_edge_wall_is_symmetric() {
        let mut def = MapItemDef::default();
        def.fill(EdgeMask::from_directions(&[Direction::North]), EdgeMask::OPEN);
        let map = built(&[(place(&def, 2, 2, 0), def)]);

        assert!(!map.connected(ConnectionKind::Path, 2, 2, Direction::North));
        assert!(!map.connected(ConnectionKind::Path, 2, 3, Direction::South));
        assert!(map.connected(ConnectionKind::Path, 2, 2, Direction::East));
        assert!(map.connected(ConnectionKind::Visibility, 2, 3, Direction::South));
    }

    #[test]
    fn rotation_turns_the_blocked_edge() {
        let mut def = MapItemDef::default();
        def.fill(EdgeMask::from_directions(&[Direction::North]), EdgeMask::OPEN);
        let map = built(&[(place(&def, 2, 2, 1), def)]);
        assert_eq!(
            map.path_mask(2, 2),
            EdgeMask::from_directions(&[Direction::East])
        );
    }

    #[test]
    fn open_items_contribute_nothing() {
        let mut def = MapItemDef::default();
        def.fill(EdgeMask::SOLID, EdgeMask::SOLID);
        let mut door = place(&def, 3, 3, 0);
        door.flags = ItemFlags::OPEN;
        let map = built(&[(door, def)]);
        assert!(map.path_mask(3, 3).is_open());
    }

    #[test]
    fn oversized_archetype_is_skipped() {
        let mut def = MapItemDef::default();
        def.fill(EdgeMask::SOLID, EdgeMask::SOLID);
        def.cx = 7;
        let wide = place(&def, 3, 3, 0);
        let map = built(&[(wide, def)]);
        assert!(map.path_mask(3, 3).is_open());
    }

    #[test]
    fn destroyed_items_use_destroyed_masks() {
        let mut def = MapItemDef {
            hp: 10,
            ..Default::default()
        };
        def.fill(EdgeMask::SOLID, EdgeMask::SOLID);
        let mut wall = place(&def, 3, 3, 0);
        wall.do_damage(10);
        let map = built(&[(wall, def)]);
        assert!(map.path_mask(3, 3).is_open());
        assert!(map.vis_mask(3, 3).is_open());
    }

    #[test]
    fn path_block_only_affects_path_queries() {
        let mut map = ConnectivityMap::new(MAP_SIZE, MAP_SIZE);
        let before = map.path_query_id();
        map.set_path_block(1, 0);
        assert!(map.path_query_id() > before);
        assert!(!map.connected(ConnectionKind::Path, 0, 0, Direction::East));
        assert!(map.connected(ConnectionKind::Visibility, 0, 0, Direction::East));
        map.clear_path_blocks();
        assert!(map.connected(ConnectionKind::Path, 0, 0, Direction::East));
    }

    #[test]
    fn edges_leaving_the_map_are_closed() {
        let map = ConnectivityMap::new(8, 8);
        assert!(!map.connected(ConnectionKind::Path, 0, 0, Direction::West));
        assert!(!map.connected(ConnectionKind::Path, 7, 3, Direction::East));
        assert_eq!(map.path_mask(8, 0), EdgeMask::SOLID);
    }

    #[test]
    fn invalidate_accumulates_and_bumps_ids() {
        let mut map = ConnectivityMap::new(MAP_SIZE, MAP_SIZE);
        let (p, v) = (map.path_query_id(), map.visibility_query_id());
        map.invalidate(Rect::tile(1, 1));
        map.invalidate(Rect::new(4, 6, 5, 7));
        assert_eq!(map.dirty(), Some(Rect::new(1, 1, 5, 7)));
        assert!(map.path_query_id() > p);
        assert!(map.visibility_query_id() > v);
        assert_eq!(map.take_dirty(), Some(Rect::new(1, 1, 5, 7)));
        assert_eq!(map.dirty(), None);
    }
}
