//! Tile graph over the connectivity map, fed to [`PathSolver`].
//!
//! [`PathSolver`]: crate::pather::PathSolver

use tactics_core::constants::{CARDINAL_COST, DIAGONAL_COST, MAP_SIZE, MAP_TILES};
use tactics_core::{Direction, Vec2};

use crate::connectivity::{ConnectionKind, ConnectivityMap};
use crate::pather::{Graph, NodeId, StateCost};

/// Clockwise-adjacent pairs; each names one diagonal.
const DIAGONALS: [(Direction, Direction); 4] = [
    (Direction::North, Direction::East),
    (Direction::East, Direction::South),
    (Direction::South, Direction::West),
    (Direction::West, Direction::North),
];

impl NodeId {
    pub fn from_tile(x: i32, y: i32) -> NodeId {
        debug_assert!((0..MAP_SIZE).contains(&x) && (0..MAP_SIZE).contains(&y));
        NodeId((y * MAP_SIZE + x) as u16)
    }

    pub fn to_tile(self) -> Vec2 {
        let i = self.0 as i32;
        Vec2::new(i % MAP_SIZE, i / MAP_SIZE)
    }
}

impl ConnectivityMap {
    fn step(&self, from: Vec2, dir: Direction) -> bool {
        self.connected(ConnectionKind::Path, from.x, from.y, dir)
    }
}

impl Graph for ConnectivityMap {
    fn least_cost_estimate(&self, start: NodeId, end: NodeId) -> f32 {
        start.to_tile().distance(end.to_tile())
    }

    fn adjacent_cost(&self, node: NodeId, adjacent: &mut Vec<StateCost>) {
        let from = node.to_tile();
        for dir in Direction::ALL {
            if self.step(from, dir) {
                let to = from + dir.delta();
                adjacent.push(StateCost {
                    node: NodeId::from_tile(to.x, to.y),
                    cost: CARDINAL_COST,
                });
            }
        }

        // A diagonal move must be possible around both sides of the corner.
        for (a, b) in DIAGONALS {
            let via_a = from + a.delta();
            let via_b = from + b.delta();
            if self.step(from, a) && self.step(via_a, b) && self.step(from, b) && self.step(via_b, a)
            {
                let to = via_a + b.delta();
                adjacent.push(StateCost {
                    node: NodeId::from_tile(to.x, to.y),
                    cost: DIAGONAL_COST,
                });
            }
        }
    }

    fn node_count(&self) -> usize {
        MAP_TILES
    }

    fn query_id(&self) -> u32 {
        self.path_query_id()
    }

    fn print_state_info(&self, node: NodeId) -> String {
        let tile = node.to_tile();
        format!("({}, {})", tile.x, tile.y)
    }
}
