//! Adaptive octree of multilinear cells.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]; node 0 is the root
//! and covers the unit cube. Every node stores the field values at its 8
//! corners, so any node (not only leaves) can be interpolated.

use nalgebra::Point3;

use crate::math::{Real, Rect3};
use crate::mesh::NodeId;

/// Deepest level any octree may reach. Morton codes use 3 bits per level.
pub const MAX_LEVEL: u8 = 20;

/// One octree cell.
#[derive(Debug, Clone)]
pub struct OctreeNode {
    /// Region covered by the cell.
    pub rect: Rect3,
    /// Depth below the root.
    pub level: u8,
    /// Parent cell, `None` for the root.
    pub parent: Option<NodeId>,
    /// Children in octant order, `None` for a leaf.
    pub children: Option<[NodeId; 8]>,
    /// Field values at the 8 corners, in octant order.
    pub values: [f64; 8],
}

impl OctreeNode {
    /// Whether the cell has no children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Multilinear interpolation of the corner values at `p`.
    pub fn interpolate(&self, p: &Point3<f64>) -> f64 {
        let u = self.rect.local(p);
        let mut out = 0.0;
        for (i, &v) in self.values.iter().enumerate() {
            let mut w = 1.0;
            for (k, &uk) in u.iter().enumerate() {
                w *= if i & (1 << k) != 0 { uk } else { 1.0 - uk };
            }
            out += v * w;
        }
        out
    }

    /// [`OctreeNode::interpolate`] over any [`Real`].
    pub fn interpolate_generic<T: Real>(&self, p: [T; 3]) -> T {
        let size = self.rect.size();
        let u = [
            (p[0] - self.rect.min.x) / size.x,
            (p[1] - self.rect.min.y) / size.y,
            (p[2] - self.rect.min.z) / size.z,
        ];
        let mut out = T::from_f64(0.0);
        for (i, &v) in self.values.iter().enumerate() {
            let mut w = T::from_f64(1.0);
            for (k, &uk) in u.iter().enumerate() {
                w = w * if i & (1 << k) != 0 { uk } else { -uk + 1.0 };
            }
            out += w * v;
        }
        out
    }

    /// Index of the child octant that contains `p`.
    #[inline]
    pub fn octant(&self, p: &Point3<f64>) -> usize {
        let c = self.rect.center();
        (0..3).filter(|&k| p[k] >= c[k]).map(|k| 1 << k).sum()
    }
}

/// Arena-allocated octree.
#[derive(Debug, Clone)]
pub struct Octree {
    nodes: Vec<OctreeNode>,
}

impl Octree {
    /// A single-cell tree over the unit cube.
    pub fn new(root_values: [f64; 8]) -> Self {
        Self {
            nodes: vec![OctreeNode {
                rect: Rect3::unit(),
                level: 0,
                parent: None,
                children: None,
                values: root_values,
            }],
        }
    }

    /// The root cell.
    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId::new(0)
    }

    /// Get a node by ID.
    #[inline]
    pub fn node(&self, id: NodeId) -> &OctreeNode {
        &self.nodes[id.index()]
    }

    /// Total number of cells.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of cells without children.
    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Deepest level present.
    pub fn depth(&self) -> u8 {
        self.nodes.iter().map(|n| n.level).max().unwrap_or(0)
    }

    /// Leaf ids in arena order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_leaf())
            .map(|(i, _)| NodeId::new(i))
    }

    /// Split a leaf, giving each child its corner values.
    pub fn split(&mut self, id: NodeId, child_values: [[f64; 8]; 8]) -> [NodeId; 8] {
        let parent = &self.nodes[id.index()];
        debug_assert!(parent.is_leaf(), "splitting a cell twice");
        let rect = parent.rect;
        let level = parent.level + 1;
        let first = self.nodes.len();

        for (i, values) in child_values.into_iter().enumerate() {
            self.nodes.push(OctreeNode {
                rect: rect.child(i),
                level,
                parent: Some(id),
                children: None,
                values,
            });
        }

        let children: [NodeId; 8] = std::array::from_fn(|i| NodeId::new(first + i));
        self.nodes[id.index()].children = Some(children);
        children
    }

    /// Descend from `start` to the leaf containing `p`, comparing against cell centres.
    pub fn descend(&self, start: NodeId, p: &Point3<f64>) -> NodeId {
        let mut cur = start;
        while let Some(children) = self.node(cur).children {
            cur = children[self.node(cur).octant(p)];
        }
        cur
    }
}

// ==================== Morton codes ====================

/// Quantize a point of the unit cube to `MAX_LEVEL` bits per axis.
#[inline]
pub fn quantize(p: &Point3<f64>) -> [u64; 3] {
    let scale = (1u64 << MAX_LEVEL) as f64;
    let max = (1u64 << MAX_LEVEL) - 1;
    std::array::from_fn(|k| {
        let q = (p[k] * scale).floor();
        if q <= 0.0 {
            0
        } else {
            (q as u64).min(max)
        }
    })
}

/// Interleave quantized coordinates, most significant level first.
///
/// The three bits at level `l` (counting from the root) are the octant of
/// the level-`l` cell that contains the point.
pub fn morton_code(q: [u64; 3]) -> u64 {
    let mut code = 0u64;
    for l in 0..MAX_LEVEL {
        let shift = MAX_LEVEL - 1 - l;
        let octant = ((q[0] >> shift) & 1) | (((q[1] >> shift) & 1) << 1) | (((q[2] >> shift) & 1) << 2);
        code = (code << 3) | octant;
    }
    code
}

/// Morton prefix identifying the level-`level` cell that contains `code`.
#[inline]
pub fn morton_prefix(code: u64, level: u8) -> u64 {
    code >> (3 * u32::from(MAX_LEVEL - level))
}

/// Octant taken when descending from a level-`level` cell.
#[inline]
pub fn morton_octant(code: u64, level: u8) -> usize {
    (morton_prefix(code, level + 1) & 7) as usize
}
