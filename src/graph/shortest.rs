//! Shortest paths over Euclidean edge lengths.
//!
//! The embedding search asks for distances and paths between arbitrary
//! pairs of sample-graph vertices many thousands of times, so all sources
//! are solved up front.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;

use super::PtGraph;

/// Entry in Dijkstra's priority queue.
#[derive(Debug, Clone)]
struct DijkstraEntry {
    vertex: usize,
    distance: f64,
}

// Ordering for a min-heap (BinaryHeap is a max-heap by default)
impl PartialEq for DijkstraEntry {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for DijkstraEntry {}

impl PartialOrd for DijkstraEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DijkstraEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

/// Single-source shortest paths.
#[derive(Debug, Clone)]
pub struct ShortestPather {
    source: usize,
    dist: Vec<f64>,
    prev: Vec<Option<usize>>,
}

impl ShortestPather {
    /// Run Dijkstra from `source`.
    pub fn new(graph: &PtGraph, source: usize) -> Self {
        let n = graph.num_vertices();
        let mut dist = vec![f64::INFINITY; n];
        let mut prev = vec![None; n];
        let mut heap = BinaryHeap::new();

        dist[source] = 0.0;
        heap.push(DijkstraEntry {
            vertex: source,
            distance: 0.0,
        });

        while let Some(DijkstraEntry { vertex: u, distance }) = heap.pop() {
            // Skip stale entries
            if distance > dist[u] {
                continue;
            }
            for &v in &graph.edges[u] {
                let nd = distance + graph.distance(u, v);
                if nd < dist[v] {
                    dist[v] = nd;
                    prev[v] = Some(u);
                    heap.push(DijkstraEntry {
                        vertex: v,
                        distance: nd,
                    });
                }
            }
        }

        Self { source, dist, prev }
    }

    /// The source vertex.
    pub fn source(&self) -> usize {
        self.source
    }

    /// Distance to `to`, or `None` if unreachable.
    pub fn dist(&self, to: usize) -> Option<f64> {
        let d = self.dist[to];
        d.is_finite().then_some(d)
    }

    /// Predecessor of `to` on its shortest path.
    pub fn prev(&self, to: usize) -> Option<usize> {
        self.prev[to]
    }

    /// Path from `to` back to the source, inclusive.
    fn path_back(&self, to: usize) -> Vec<usize> {
        if !self.dist[to].is_finite() {
            return Vec::new();
        }
        let mut path = vec![to];
        let mut cur = to;
        while let Some(p) = self.prev[cur] {
            path.push(p);
            cur = p;
        }
        path
    }
}

/// Shortest paths between every pair of vertices.
#[derive(Debug, Clone)]
pub struct AllShortestPather {
    paths: Vec<ShortestPather>,
}

impl AllShortestPather {
    /// Solve from every vertex, in parallel.
    pub fn new(graph: &PtGraph) -> Self {
        let paths = (0..graph.num_vertices())
            .into_par_iter()
            .map(|s| ShortestPather::new(graph, s))
            .collect();
        Self { paths }
    }

    /// Number of vertices covered.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the graph was empty.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Vertices on a shortest path, starting at `from` and ending at `to`.
    ///
    /// Empty if `to` cannot be reached.
    pub fn path(&self, from: usize, to: usize) -> Vec<usize> {
        // Walking predecessors of the tree rooted at `to` yields from -> to.
        self.paths[to].path_back(from)
    }

    /// Shortest-path distance, or `-1.0` if unreachable.
    pub fn dist(&self, from: usize, to: usize) -> f64 {
        self.paths[from].dist(to).unwrap_or(-1.0)
    }
}
