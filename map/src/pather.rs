//! Generic least-cost path search over any [`Graph`].
//!
//! The solver knows nothing about tiles. A graph hands out integer node ids,
//! an admissible cost estimate and per-node adjacency; the solver runs A*
//! over them and caches results until the graph's query id changes.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Dense node identifier handed out by a [`Graph`], `0..node_count()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u16);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A neighbour and the cost of stepping to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateCost {
    pub node: NodeId,
    pub cost: f32,
}

/// What a searchable graph must provide.
pub trait Graph {
    /// Estimate of the cost from `start` to `end`. Must never overestimate
    /// the true cost or returned paths stop being optimal.
    fn least_cost_estimate(&self, start: NodeId, end: NodeId) -> f32;

    /// Appends every node reachable in one step from `node`, with its cost.
    fn adjacent_cost(&self, node: NodeId, adjacent: &mut Vec<StateCost>);

    fn node_count(&self) -> usize;

    /// Changes whenever adjacency or costs change. Cached results are
    /// dropped when it moves.
    fn query_id(&self) -> u32;

    fn print_state_info(&self, node: NodeId) -> String {
        format!("{node:?}")
    }
}

/// Outcome of a path search. Only `Solved` carries a path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathResult<N> {
    /// `path` runs from start to end inclusive; `cost` is its total cost.
    Solved { cost: f32, path: Vec<N> },
    NoSolution,
    StartEndSame,
    /// The search opened more nodes than the solver's budget allows.
    OutOfMemory,
}

impl<N> PathResult<N> {
    pub fn is_solved(&self) -> bool {
        matches!(self, PathResult::Solved { .. })
    }

    pub fn cost(&self) -> Option<f32> {
        match self {
            PathResult::Solved { cost, .. } => Some(*cost),
            _ => None,
        }
    }

    pub fn map_nodes<M>(self, f: impl FnMut(N) -> M) -> PathResult<M> {
        match self {
            PathResult::Solved { cost, path } => PathResult::Solved {
                cost,
                path: path.into_iter().map(f).collect(),
            },
            PathResult::NoSolution => PathResult::NoSolution,
            PathResult::StartEndSame => PathResult::StartEndSame,
            PathResult::OutOfMemory => PathResult::OutOfMemory,
        }
    }
}

/// Entry in the open set
#[derive(Clone, Copy, Debug)]
struct OpenNode {
    /// cost so far plus estimate to goal
    total: f32,
    /// cost so far
    cost: f32,
    node: NodeId,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .total
            .total_cmp(&self.total)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Cache hit/miss counters, reset with the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub hits: u32,
    pub misses: u32,
}

pub struct PathSolver {
    max_nodes: usize,
    cost: Vec<f32>,
    parent: Vec<Option<NodeId>>,
    closed: Vec<bool>,
    /// nodes whose entries must be reset before the next search
    touched: Vec<NodeId>,
    open_set: BinaryHeap<OpenNode>,
    cache_query_id: Option<u32>,
    cache: HashMap<(NodeId, NodeId), PathResult<NodeId>>,
    stats: SolverStats,
}

impl PathSolver {
    /// `max_nodes` bounds how many distinct nodes one search may open.
    pub fn new(max_nodes: usize) -> Self {
        Self {
            max_nodes,
            cost: Vec::new(),
            parent: Vec::new(),
            closed: Vec::new(),
            touched: Vec::new(),
            open_set: BinaryHeap::new(),
            cache_query_id: None,
            cache: HashMap::new(),
            stats: SolverStats::default(),
        }
    }

    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    /// Drops every cached result.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.cache_query_id = None;
        self.stats = SolverStats::default();
    }

    fn sync_cache(&mut self, query_id: u32) {
        if self.cache_query_id != Some(query_id) {
            self.reset();
            self.cache_query_id = Some(query_id);
        }
    }

    /// Reset search state prior to running a new search, sizing the
    /// per-node arrays for `node_count`.
    fn prepare(&mut self, node_count: usize) {
        if self.cost.len() != node_count {
            self.cost = vec![f32::INFINITY; node_count];
            self.parent = vec![None; node_count];
            self.closed = vec![false; node_count];
        } else {
            for node in self.touched.drain(..) {
                self.cost[node.index()] = f32::INFINITY;
                self.parent[node.index()] = None;
                self.closed[node.index()] = false;
            }
        }
        self.touched.clear();
        self.open_set.clear();
    }

    fn touch(&mut self, node: NodeId, cost: f32, parent: Option<NodeId>) {
        if self.cost[node.index()] == f32::INFINITY {
            self.touched.push(node);
        }
        self.cost[node.index()] = cost;
        self.parent[node.index()] = parent;
    }

    fn reconstruct_path(&self, start: NodeId, end: NodeId) -> Vec<NodeId> {
        let mut path = vec![end];
        let mut current = end;
        while current != start {
            current = self.parent[current.index()]
                .unwrap_or_else(|| panic!("broken parent chain at {current:?}"));
            path.push(current);
        }
        path.reverse();
        path
    }

    /// Least-cost path from `start` to `end`.
    pub fn solve<G: Graph + ?Sized>(
        &mut self,
        graph: &G,
        start: NodeId,
        end: NodeId,
    ) -> PathResult<NodeId> {
        if start == end {
            return PathResult::StartEndSame;
        }
        let node_count = graph.node_count();
        if start.index() >= node_count || end.index() >= node_count {
            return PathResult::NoSolution;
        }

        self.sync_cache(graph.query_id());
        if let Some(hit) = self.cache.get(&(start, end)) {
            self.stats.hits += 1;
            return hit.clone();
        }
        self.stats.misses += 1;

        let result = self.astar(graph, start, end);
        log::trace!(
            "solve {} -> {}: {:?}",
            graph.print_state_info(start),
            graph.print_state_info(end),
            result.cost()
        );
        if !matches!(result, PathResult::OutOfMemory) {
            self.cache.insert((start, end), result.clone());
        }
        result
    }

    fn astar<G: Graph + ?Sized>(
        &mut self,
        graph: &G,
        start: NodeId,
        end: NodeId,
    ) -> PathResult<NodeId> {
        self.prepare(graph.node_count());

        self.touch(start, 0.0, None);
        self.open_set.push(OpenNode {
            total: graph.least_cost_estimate(start, end),
            cost: 0.0,
            node: start,
        });

        let mut adjacent = Vec::with_capacity(8);
        while let Some(current) = self.open_set.pop() {
            let index = current.node.index();
            // Skip stale entries superseded by a cheaper push
            if self.closed[index] || current.cost > self.cost[index] {
                continue;
            }

            if current.node == end {
                return PathResult::Solved {
                    cost: current.cost,
                    path: self.reconstruct_path(start, end),
                };
            }
            self.closed[index] = true;

            adjacent.clear();
            graph.adjacent_cost(current.node, &mut adjacent);
            for next in &adjacent {
                let next_index = next.node.index();
                if self.closed[next_index] {
                    continue;
                }
                let cost = current.cost + next.cost;
                if cost >= self.cost[next_index] {
                    continue;
                }
                if self.cost[next_index] == f32::INFINITY && self.touched.len() >= self.max_nodes
                {
                    return PathResult::OutOfMemory;
                }
                self.touch(next.node, cost, Some(current.node));
                self.open_set.push(OpenNode {
                    total: cost + graph.least_cost_estimate(next.node, end),
                    cost,
                    node: next.node,
                });
            }
        }

        PathResult::NoSolution
    }

    /// Every node reachable from `start` at total cost `<= max_cost`, with
    /// that least cost. `start` itself is included at cost 0.
    pub fn solve_for_near_states<G: Graph + ?Sized>(
        &mut self,
        graph: &G,
        start: NodeId,
        max_cost: f32,
    ) -> Vec<StateCost> {
        let mut near = Vec::new();
        if start.index() >= graph.node_count() {
            return near;
        }
        self.prepare(graph.node_count());

        self.touch(start, 0.0, None);
        self.open_set.push(OpenNode {
            total: 0.0,
            cost: 0.0,
            node: start,
        });

        let mut adjacent = Vec::with_capacity(8);
        while let Some(current) = self.open_set.pop() {
            let index = current.node.index();
            if self.closed[index] || current.cost > self.cost[index] {
                continue;
            }
            self.closed[index] = true;
            near.push(StateCost {
                node: current.node,
                cost: current.cost,
            });

            adjacent.clear();
            graph.adjacent_cost(current.node, &mut adjacent);
            for next in &adjacent {
                let cost = current.cost + next.cost;
                if cost > max_cost
                    || self.closed[next.node.index()]
                    || cost >= self.cost[next.node.index()]
                {
                    continue;
                }
                self.touch(next.node, cost, Some(current.node));
                self.open_set.push(OpenNode {
                    total: cost,
                    cost,
                    node: next.node,
                });
            }
        }
        near
    }
}
