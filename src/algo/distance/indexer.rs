//! Point location in an octree.
//!
//! All indexers answer the same question, "which leaf contains this
//! point?", and must agree on every input. They differ only in how much
//! they precompute:
//!
//! | Indexer | Preprocessing | Lookup |
//! |---------|---------------|--------|
//! | [`DumbIndexer`] | none | descend comparing cell centres |
//! | [`MortonIndexer`] | none | descend reading 3 Morton bits per level |
//! | [`ArrayIndexer`] | dense table at a fixed level | table, then Morton descent |
//! | [`HashIndexer`] | every node keyed by (level, prefix) | binary search over levels |

use std::collections::HashMap;

use nalgebra::Point3;

use super::octree::{morton_code, morton_octant, morton_prefix, quantize, Octree};
use crate::mesh::NodeId;

/// Level of the dense table built by [`ArrayIndexer`].
pub const ARRAY_LEVEL: u8 = 6;

/// Selects a [`PointIndexer`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexerKind {
    /// [`DumbIndexer`].
    Dumb,
    /// [`MortonIndexer`].
    Morton,
    /// [`ArrayIndexer`].
    #[default]
    ArrayCached,
    /// [`HashIndexer`].
    Hashed,
}

impl IndexerKind {
    /// Instantiate the selected indexer, not yet preprocessed.
    pub fn create(self) -> Box<dyn PointIndexer> {
        match self {
            IndexerKind::Dumb => Box::new(DumbIndexer),
            IndexerKind::Morton => Box::new(MortonIndexer),
            IndexerKind::ArrayCached => Box::new(ArrayIndexer::default()),
            IndexerKind::Hashed => Box::new(HashIndexer::default()),
        }
    }
}

/// Finds the leaf of an octree containing a point.
pub trait PointIndexer: Send + Sync + std::fmt::Debug {
    /// Build any lookup structures for `tree`.
    fn preprocess(&mut self, tree: &Octree);

    /// The leaf containing `p`, which must lie in the unit cube.
    fn locate(&self, tree: &Octree, p: &Point3<f64>) -> NodeId;
}

/// Descends from the root comparing against cell centres.
#[derive(Debug, Clone, Copy, Default)]
pub struct DumbIndexer;

impl PointIndexer for DumbIndexer {
    fn preprocess(&mut self, _tree: &Octree) {}

    fn locate(&self, tree: &Octree, p: &Point3<f64>) -> NodeId {
        tree.descend(tree.root(), p)
    }
}

/// Descends from the root reading the point's Morton code.
#[derive(Debug, Clone, Copy, Default)]
pub struct MortonIndexer;

fn morton_descend(tree: &Octree, start: NodeId, code: u64) -> NodeId {
    let mut cur = start;
    while let Some(children) = tree.node(cur).children {
        cur = children[morton_octant(code, tree.node(cur).level)];
    }
    cur
}

impl PointIndexer for MortonIndexer {
    fn preprocess(&mut self, _tree: &Octree) {}

    fn locate(&self, tree: &Octree, p: &Point3<f64>) -> NodeId {
        morton_descend(tree, tree.root(), morton_code(quantize(p)))
    }
}

/// Dense table from level-[`ARRAY_LEVEL`] Morton prefix to the deepest node
/// at or above that level.
#[derive(Debug, Clone, Default)]
pub struct ArrayIndexer {
    table: Vec<NodeId>,
}

impl ArrayIndexer {
    fn fill(&mut self, tree: &Octree, id: NodeId, prefix: u64) {
        let node = tree.node(id);
        match node.children {
            Some(children) if node.level < ARRAY_LEVEL => {
                for (i, &c) in children.iter().enumerate() {
                    self.fill(tree, c, (prefix << 3) | i as u64);
                }
            }
            _ => {
                let span = 3 * u32::from(ARRAY_LEVEL - node.level);
                let start = (prefix << span) as usize;
                let end = ((prefix + 1) << span) as usize;
                self.table[start..end].fill(id);
            }
        }
    }
}

impl PointIndexer for ArrayIndexer {
    fn preprocess(&mut self, tree: &Octree) {
        self.table = vec![tree.root(); 1 << (3 * u32::from(ARRAY_LEVEL))];
        self.fill(tree, tree.root(), 0);
    }

    fn locate(&self, tree: &Octree, p: &Point3<f64>) -> NodeId {
        let code = morton_code(quantize(p));
        let start = self
            .table
            .get(morton_prefix(code, ARRAY_LEVEL) as usize)
            .copied()
            .unwrap_or_else(|| tree.root());
        morton_descend(tree, start, code)
    }
}

/// Every node keyed by `(level, Morton prefix)`.
#[derive(Debug, Clone, Default)]
pub struct HashIndexer {
    nodes: HashMap<(u8, u64), NodeId>,
    depth: u8,
}

impl HashIndexer {
    fn insert(&mut self, tree: &Octree, id: NodeId, prefix: u64) {
        let node = tree.node(id);
        self.nodes.insert((node.level, prefix), id);
        if let Some(children) = node.children {
            for (i, &c) in children.iter().enumerate() {
                self.insert(tree, c, (prefix << 3) | i as u64);
            }
        }
    }
}

impl PointIndexer for HashIndexer {
    fn preprocess(&mut self, tree: &Octree) {
        self.nodes.clear();
        self.depth = tree.depth();
        self.insert(tree, tree.root(), 0);
    }

    fn locate(&self, tree: &Octree, p: &Point3<f64>) -> NodeId {
        let code = morton_code(quantize(p));
        // Cells covering p exist for every level up to the leaf's.
        let (mut lo, mut hi) = (0u8, self.depth);
        let mut best = tree.root();
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            match self.nodes.get(&(mid, morton_prefix(code, mid))) {
                Some(&id) => {
                    best = id;
                    lo = mid + 1;
                }
                None => {
                    if mid == 0 {
                        break;
                    }
                    hi = mid - 1;
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Rect3;

    /// A lopsided tree refined towards one corner, down to level 8.
    fn corner_tree() -> Octree {
        let mut tree = Octree::new([0.0; 8]);
        let mut cur = tree.root();
        for _ in 0..8 {
            let children = tree.split(cur, [[0.0; 8]; 8]);
            // Also split a sibling so several depths coexist.
            let sibling = children[3];
            if tree.node(sibling).level < 4 {
                tree.split(sibling, [[0.0; 8]; 8]);
            }
            cur = children[6];
        }
        tree
    }

    fn query_points() -> Vec<Point3<f64>> {
        let mut pts = Vec::new();
        let n = 23;
        for i in 0..=n {
            for j in 0..=n {
                for k in 0..=n {
                    pts.push(Point3::new(
                        i as f64 / n as f64,
                        j as f64 / n as f64,
                        k as f64 / n as f64,
                    ));
                }
            }
        }
        pts.push(Point3::new(0.0, 1.0, 1.0));
        pts.push(Point3::new(0.001, 0.999, 0.998));
        pts
    }

    #[test]
    fn test_all_indexers_agree() {
        let tree = corner_tree();
        let mut indexers: Vec<Box<dyn PointIndexer>> = [
            IndexerKind::Dumb,
            IndexerKind::Morton,
            IndexerKind::ArrayCached,
            IndexerKind::Hashed,
        ]
        .into_iter()
        .map(IndexerKind::create)
        .collect();
        for ix in &mut indexers {
            ix.preprocess(&tree);
        }

        for p in query_points() {
            let expected = indexers[0].locate(&tree, &p);
            assert!(tree.node(expected).is_leaf());
            assert!(tree.node(expected).rect.contains_closed(&p));
            for ix in &indexers[1..] {
                assert_eq!(ix.locate(&tree, &p), expected, "{:?} at {:?}", ix, p);
            }
        }
    }

    #[test]
    fn test_single_cell_tree() {
        let tree = Octree::new([0.0; 8]);
        let mut ix = ArrayIndexer::default();
        ix.preprocess(&tree);
        assert_eq!(ix.locate(&tree, &Point3::new(0.4, 0.4, 0.4)), tree.root());

        let mut hx = HashIndexer::default();
        hx.preprocess(&tree);
        assert_eq!(hx.locate(&tree, &Rect3::unit().center()), tree.root());
    }
}
