//! Undirected point graphs.
//!
//! A [`PtGraph`] is a set of points in space with an adjacency list. It is
//! used both for the medial sample graph the skeleton is embedded into and
//! for the skeleton's own joint graphs.

mod shortest;

use nalgebra::Point3;

pub use shortest::{AllShortestPather, ShortestPather};

/// Points in space joined by undirected edges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PtGraph {
    /// Vertex positions.
    pub verts: Vec<Point3<f64>>,
    /// Adjacency lists, one per vertex.
    pub edges: Vec<Vec<usize>>,
}

impl PtGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an isolated vertex and return its index.
    pub fn add_vertex(&mut self, p: Point3<f64>) -> usize {
        self.verts.push(p);
        self.edges.push(Vec::new());
        self.verts.len() - 1
    }

    /// Connect `a` and `b`.
    ///
    /// Self-loops and edges that already exist are ignored. Returns whether
    /// an edge was added.
    pub fn add_edge(&mut self, a: usize, b: usize) -> bool {
        if a == b || self.edges[a].contains(&b) {
            return false;
        }
        self.edges[a].push(b);
        self.edges[b].push(a);
        true
    }

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.verts.len()
    }

    /// Number of undirected edges.
    pub fn num_edges(&self) -> usize {
        self.edges.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Number of neighbours of `v`.
    #[inline]
    pub fn degree(&self, v: usize) -> usize {
        self.edges[v].len()
    }

    /// Euclidean length of the edge (or chord) between two vertices.
    #[inline]
    pub fn distance(&self, a: usize, b: usize) -> f64 {
        (self.verts[a] - self.verts[b]).norm()
    }

    /// Check that adjacency is symmetric, in range, and free of self-loops
    /// and repeated edges.
    pub fn integrity_check(&self) -> bool {
        if self.edges.len() != self.verts.len() {
            return false;
        }
        let n = self.verts.len();
        for (i, adj) in self.edges.iter().enumerate() {
            for (k, &j) in adj.iter().enumerate() {
                if j >= n || j == i {
                    return false;
                }
                if adj[..k].contains(&j) {
                    return false;
                }
                if !self.edges[j].contains(&i) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_edge() {
        let mut g = PtGraph::new();
        let a = g.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let b = g.add_vertex(Point3::new(3.0, 4.0, 0.0));
        assert!(g.add_edge(a, b));
        assert!(!g.add_edge(b, a));
        assert!(!g.add_edge(a, a));
        assert_eq!(g.num_edges(), 1);
        assert_eq!(g.degree(a), 1);
        assert_eq!(g.distance(a, b), 5.0);
        assert!(g.integrity_check());
    }

    #[test]
    fn test_integrity_detects_asymmetry() {
        let mut g = PtGraph::new();
        g.add_vertex(Point3::origin());
        g.add_vertex(Point3::origin());
        g.edges[0].push(1);
        assert!(!g.integrity_check());
        g.edges[1].push(0);
        assert!(g.integrity_check());
        g.edges[1].push(0);
        assert!(!g.integrity_check());
    }
}
