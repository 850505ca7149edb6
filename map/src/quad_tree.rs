//! Fixed-depth quad tree over the 64x64 grid.
//!
//! Each item lives in exactly one node: the deepest one whose cell holds the
//! item's whole footprint. An item that straddles a cell boundary at some
//! depth is pushed up until a single cell contains it, so at worst it sits
//! in the root. Depth `d` has `4^d` nodes of `64 >> d` tiles on a side.

use tactics_core::constants::{LOG2_MAP_SIZE, MAP_SIZE, NUM_QUAD_NODES, QUAD_DEPTH};
use tactics_core::Rect;

use crate::item::ItemId;

/// First node index of each depth, plus the total as a sentinel.
const DEPTH_BASE: [usize; QUAD_DEPTH + 1] = [0, 1, 5, 21, 85, 341];

#[derive(Debug, Clone)]
pub struct QuadTree {
    nodes: Vec<Vec<(ItemId, Rect)>>,
    depth_use: [usize; QUAD_DEPTH],
}

impl Default for QuadTree {
    fn default() -> Self {
        Self::new()
    }
}

impl QuadTree {
    pub fn new() -> Self {
        debug_assert_eq!(DEPTH_BASE[QUAD_DEPTH], NUM_QUAD_NODES);
        Self {
            nodes: vec![Vec::new(); NUM_QUAD_NODES],
            depth_use: [0; QUAD_DEPTH],
        }
    }

    pub fn clear(&mut self) {
        self.nodes.iter_mut().for_each(Vec::clear);
        self.depth_use = [0; QUAD_DEPTH];
    }

    #[inline]
    fn world_to_node(x: i32, depth: usize) -> i32 {
        debug_assert!(depth < QUAD_DEPTH);
        debug_assert!((0..MAP_SIZE).contains(&x), "coordinate {x} outside the grid");
        x >> (LOG2_MAP_SIZE as usize - depth)
    }

    #[inline]
    fn node_offset(x0: i32, y0: i32, depth: usize) -> usize {
        debug_assert!(x0 >= 0 && x0 < (1 << depth));
        debug_assert!(y0 >= 0 && y0 < (1 << depth));
        (y0 * (1 << depth) + x0) as usize
    }

    /// Depth and node index that an item with `bounds` is stored under.
    pub fn node_for(bounds: &Rect) -> (usize, usize) {
        for depth in (1..QUAD_DEPTH).rev() {
            let x0 = Self::world_to_node(bounds.min.x, depth);
            let y0 = Self::world_to_node(bounds.min.y, depth);
            if x0 == Self::world_to_node(bounds.max.x, depth)
                && y0 == Self::world_to_node(bounds.max.y, depth)
            {
                return (depth, DEPTH_BASE[depth] + Self::node_offset(x0, y0, depth));
            }
        }
        (0, 0)
    }

    pub fn add(&mut self, id: ItemId, bounds: Rect) {
        let (depth, node) = Self::node_for(&bounds);
        debug_assert!(
            !self.nodes[node].iter().any(|(other, _)| *other == id),
            "item {id:?} linked twice"
        );
        self.nodes[node].push((id, bounds));
        self.depth_use[depth] += 1;
    }

    /// Removes `id`, locating its node from the same bounds it was added
    /// with. Unlinking an item that is not there panics.
    pub fn unlink(&mut self, id: ItemId, bounds: &Rect) {
        let (depth, node) = Self::node_for(bounds);
        let bucket = &mut self.nodes[node];
        let pos = bucket
            .iter()
            .position(|(other, _)| *other == id)
            .unwrap_or_else(|| panic!("item {id:?} not linked in quad node {node}"));
        bucket.swap_remove(pos);
        self.depth_use[depth] -= 1;
    }

    /// Every item whose footprint intersects `bounds`. Each item appears at
    /// most once since it is stored in exactly one node.
    pub fn find_items(&self, bounds: &Rect) -> Vec<ItemId> {
        let grid = Rect::new(0, 0, MAP_SIZE - 1, MAP_SIZE - 1);
        let Some(query) = bounds.intersection(&grid) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for depth in 0..QUAD_DEPTH {
            if self.depth_use[depth] == 0 {
                continue;
            }
            let x0 = Self::world_to_node(query.min.x, depth);
            let x1 = Self::world_to_node(query.max.x, depth);
            let y0 = Self::world_to_node(query.min.y, depth);
            let y1 = Self::world_to_node(query.max.y, depth);

            for j in y0..=y1 {
                for i in x0..=x1 {
                    let node = DEPTH_BASE[depth] + Self::node_offset(i, j, depth);
                    found.extend(
                        self.nodes[node]
                            .iter()
                            .filter(|(_, item_bounds)| item_bounds.intersects(&query))
                            .map(|(id, _)| *id),
                    );
                }
            }
        }
        found
    }

    pub fn find_items_at(&self, x: i32, y: i32) -> Vec<ItemId> {
        self.find_items(&Rect::tile(x, y))
    }

    /// First item accepted by `filter`, scanning every node.
    pub fn find_item(&self, mut filter: impl FnMut(ItemId) -> bool) -> Option<ItemId> {
        self.nodes
            .iter()
            .flat_map(|bucket| bucket.iter())
            .map(|(id, _)| *id)
            .find(|id| filter(*id))
    }

    /// Number of items stored at each depth.
    pub fn depth_use(&self) -> [usize; QUAD_DEPTH] {
        self.depth_use
    }

    pub fn len(&self) -> usize {
        self.depth_use.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
