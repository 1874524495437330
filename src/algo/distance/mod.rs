//! Adaptive signed distance fields.
//!
//! [`construct_distance_field`] samples the signed distance to a closed mesh
//! on an adaptive octree of multilinear cells. A cell is refined until its
//! interpolant matches the true distance within a tolerance at the 19
//! face, edge and centre points of its 3×3×3 lattice.
//!
//! Distances are negative inside the mesh. The mesh is expected to be
//! normalized into the unit cube first (see [`crate::mesh::prepare_mesh`]).
//!
//! # Example
//!
//! ```
//! use armature::prelude::*;
//! use armature::algo::distance::{construct_distance_field, DistanceFieldOptions};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(0.0, 0.0, 1.0),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];
//! let mesh = prepare_mesh(&build_from_triangles(&vertices, &faces).unwrap()).unwrap();
//!
//! let options = DistanceFieldOptions::default().with_max_depth(5);
//! let field = construct_distance_field(&mesh, &options, &Progress::none()).unwrap();
//! assert!(field.evaluate(&Point3::new(0.99, 0.99, 0.99)) > 0.0);
//! ```

mod bvh;
mod indexer;
mod octree;

use std::collections::{HashMap, VecDeque};

use nalgebra::{Point3, Vector3};
use tracing::{debug, warn};

pub use bvh::{closest_point_on_triangle, ray_triangle_intersect, Bvh};
pub use indexer::{
    ArrayIndexer, DumbIndexer, HashIndexer, IndexerKind, MortonIndexer, PointIndexer, ARRAY_LEVEL,
};
pub use octree::{morton_code, quantize, Octree, OctreeNode, MAX_LEVEL};

use super::Progress;
use crate::error::{RigError, Result};
use crate::math::{Deriv, Real, Rect3};
use crate::mesh::{Mesh, NodeId};

/// Ray direction for inside/outside parity, chosen to miss edges and vertices
/// of axis-aligned geometry.
const PARITY_DIRECTION: [f64; 3] = [0.577_215_664_9, 0.618_033_988_7, 0.531_128_874_1];

/// Options for [`construct_distance_field`].
#[derive(Debug, Clone)]
pub struct DistanceFieldOptions {
    /// Maximum interpolation error at the lattice points of a leaf.
    pub tolerance: f64,

    /// Cells at this level are never split.
    pub max_depth: u8,

    /// Cells above this level are always split.
    pub min_depth: u8,

    /// Point location structure built after refinement.
    pub indexer: IndexerKind,

    /// Refinement stops once the tree holds this many cells.
    pub max_nodes: usize,
}

impl Default for DistanceFieldOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.002,
            max_depth: 10,
            min_depth: 2,
            indexer: IndexerKind::default(),
            max_nodes: 8_000_000,
        }
    }
}

impl DistanceFieldOptions {
    /// Set the interpolation tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the maximum refinement level.
    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the level down to which every cell is split.
    pub fn with_min_depth(mut self, min_depth: u8) -> Self {
        self.min_depth = min_depth;
        self
    }

    /// Choose the point indexer.
    pub fn with_indexer(mut self, indexer: IndexerKind) -> Self {
        self.indexer = indexer;
        self
    }

    /// Cap the number of octree cells.
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Check that every option is in range.
    pub fn validate(&self) -> Result<()> {
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(RigError::invalid_param("tolerance", self.tolerance, "must be positive"));
        }
        if self.max_depth > MAX_LEVEL {
            return Err(RigError::invalid_param(
                "max_depth",
                self.max_depth,
                "exceeds the deepest representable level",
            ));
        }
        if self.max_nodes < 1 {
            return Err(RigError::invalid_param("max_nodes", self.max_nodes, "must be at least 1"));
        }
        Ok(())
    }
}

// ==================== Signed distance ====================

/// Memoizing signed distance to a triangle set.
///
/// The sign comes from the parity of ray crossings, so the mesh must be
/// closed. Values are cached on a grid finer than the deepest cell so that
/// cells sharing a corner see the same value.
#[derive(Debug)]
pub struct SignedDistance {
    bvh: Bvh,
    memo: HashMap<[i64; 3], f64>,
    grid: f64,
}

impl SignedDistance {
    /// Build the evaluator for `mesh`, caching on a `2^(max_depth + 2)` grid.
    pub fn new(mesh: &Mesh, max_depth: u8) -> Result<Self> {
        if mesh.num_faces() == 0 {
            return Err(RigError::EmptyMesh);
        }
        Ok(Self {
            bvh: Bvh::build(mesh),
            memo: HashMap::new(),
            grid: (1u64 << (u32::from(max_depth) + 2)) as f64,
        })
    }

    /// Signed distance at `p`, negative inside.
    pub fn eval(&mut self, p: &Point3<f64>) -> Result<f64> {
        let key = [
            (p.x * self.grid).round() as i64,
            (p.y * self.grid).round() as i64,
            (p.z * self.grid).round() as i64,
        ];
        if let Some(&v) = self.memo.get(&key) {
            return Ok(v);
        }
        let (_, dist_sq) = self.bvh.closest_point(p).ok_or(RigError::EmptyDistanceField)?;
        let dir = Vector3::from(PARITY_DIRECTION);
        let inside = self.bvh.count_ray_crossings(p, &dir) % 2 == 1;
        let d = dist_sq.sqrt();
        let v = if inside { -d } else { d };
        self.memo.insert(key, v);
        Ok(v)
    }

    /// Number of distinct points evaluated so far.
    pub fn num_evaluations(&self) -> usize {
        self.memo.len()
    }
}

// ==================== Distance field ====================

/// An adaptive, multilinearly interpolated scalar field over the unit cube.
pub struct DistanceField {
    octree: Octree,
    indexer: Box<dyn PointIndexer>,
}

impl std::fmt::Debug for DistanceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistanceField")
            .field("nodes", &self.octree.num_nodes())
            .field("depth", &self.octree.depth())
            .field("indexer", &self.indexer)
            .finish()
    }
}

impl DistanceField {
    /// Wrap an octree, preprocessing the chosen indexer.
    pub fn new(octree: Octree, kind: IndexerKind) -> Self {
        let mut indexer = kind.create();
        indexer.preprocess(&octree);
        Self { octree, indexer }
    }

    /// The underlying octree.
    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    /// The leaf containing `p`, after clamping `p` to the unit cube.
    pub fn locate(&self, p: &Point3<f64>) -> NodeId {
        let q = Rect3::unit().clamp(p);
        self.indexer.locate(&self.octree, &q)
    }

    /// Field value at `p`. Points outside the unit cube are clamped onto it.
    pub fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let q = Rect3::unit().clamp(p);
        self.octree.node(self.indexer.locate(&self.octree, &q)).interpolate(&q)
    }

    /// [`DistanceField::evaluate`] over any [`Real`].
    ///
    /// A coordinate outside `[0, 1]` is replaced by the clamped constant, so
    /// its derivative vanishes there.
    pub fn evaluate_generic<T: Real>(&self, p: [T; 3]) -> T {
        let clamped: [T; 3] = std::array::from_fn(|k| {
            let v = p[k].value();
            if (0.0..=1.0).contains(&v) {
                p[k]
            } else {
                T::from_f64(v.clamp(0.0, 1.0))
            }
        });
        let q = Point3::new(clamped[0].value(), clamped[1].value(), clamped[2].value());
        self.octree
            .node(self.indexer.locate(&self.octree, &q))
            .interpolate_generic(clamped)
    }

    /// Gradient of the interpolant at `p`.
    pub fn gradient(&self, p: &Point3<f64>) -> Vector3<f64> {
        let v = self.evaluate_generic(Deriv::<3>::variables([p.x, p.y, p.z]));
        *v.gradient()
    }
}

/// Position of lattice point `(a, b, c)`, each in `0..3`, within `rect`.
fn lattice_point(rect: &Rect3, a: usize, b: usize, c: usize) -> Point3<f64> {
    let s = rect.size() * 0.5;
    Point3::new(
        rect.min.x + s.x * a as f64,
        rect.min.y + s.y * b as f64,
        rect.min.z + s.z * c as f64,
    )
}

/// Signed distance on the 3×3×3 lattice of a cell, indexed `a + 3b + 9c`.
///
/// Corner values are taken from the cell so neighbours stay continuous.
fn sample_lattice(sdf: &mut SignedDistance, node: &OctreeNode) -> Result<[f64; 27]> {
    let mut lattice = [0.0; 27];
    for c in 0..3 {
        for b in 0..3 {
            for a in 0..3 {
                let idx = a + 3 * b + 9 * c;
                lattice[idx] = if a != 1 && b != 1 && c != 1 {
                    let corner = (a / 2) | ((b / 2) << 1) | ((c / 2) << 2);
                    node.values[corner]
                } else {
                    sdf.eval(&lattice_point(&node.rect, a, b, c))?
                };
            }
        }
    }
    Ok(lattice)
}

/// Largest deviation of the cell interpolant from the lattice samples.
fn lattice_error(node: &OctreeNode, lattice: &[f64; 27]) -> f64 {
    let mut worst: f64 = 0.0;
    for c in 0..3 {
        for b in 0..3 {
            for a in 0..3 {
                if a != 1 && b != 1 && c != 1 {
                    continue;
                }
                let p = lattice_point(&node.rect, a, b, c);
                worst = worst.max((node.interpolate(&p) - lattice[a + 3 * b + 9 * c]).abs());
            }
        }
    }
    worst
}

/// Corner values of the eight children, read off the lattice.
fn child_values(lattice: &[f64; 27]) -> [[f64; 8]; 8] {
    std::array::from_fn(|i| {
        std::array::from_fn(|j| {
            let a = (i & 1) + (j & 1);
            let b = ((i >> 1) & 1) + ((j >> 1) & 1);
            let c = ((i >> 2) & 1) + ((j >> 2) & 1);
            lattice[a + 3 * b + 9 * c]
        })
    })
}

/// Builds the adaptive signed distance field of a closed mesh.
///
/// The mesh should already lie in the unit cube. Each split is a
/// cancellation point. When the tree reaches `max_nodes` cells, the
/// remaining cells stay leaves and a warning is logged.
///
/// # Errors
///
/// - [`RigError::EmptyMesh`] if the mesh has no faces
/// - [`RigError::InvalidParameter`] for out-of-range options
/// - [`RigError::Cancelled`] if the progress context is cancelled
pub fn construct_distance_field(
    mesh: &Mesh,
    options: &DistanceFieldOptions,
    progress: &Progress,
) -> Result<DistanceField> {
    options.validate()?;
    let mut sdf = SignedDistance::new(mesh, options.max_depth)?;

    let unit = Rect3::unit();
    let mut root_values = [0.0; 8];
    for (i, v) in root_values.iter_mut().enumerate() {
        *v = sdf.eval(&unit.corner(i))?;
    }
    let mut tree = Octree::new(root_values);

    let mut budget_hit = false;
    // Breadth first, so a node budget cuts the deepest level.
    let mut queue = VecDeque::from([tree.root()]);
    while let Some(id) = queue.pop_front() {
        let node = tree.node(id);
        if node.level >= options.max_depth {
            continue;
        }
        let lattice = sample_lattice(&mut sdf, node)?;
        let needs_split =
            node.level < options.min_depth || lattice_error(node, &lattice) > options.tolerance;
        if !needs_split {
            continue;
        }
        if tree.num_nodes() + 8 > options.max_nodes {
            if !budget_hit {
                warn!(
                    max_nodes = options.max_nodes,
                    "distance field node budget reached; leaving remaining cells unrefined"
                );
                budget_hit = true;
            }
            continue;
        }
        progress.checkpoint()?;

        let children = tree.split(id, child_values(&lattice));
        queue.extend(children);

        if tree.num_nodes() % 4096 == 1 {
            progress.report(tree.num_nodes(), options.max_nodes, "Refining distance field");
        }
    }

    debug!(
        nodes = tree.num_nodes(),
        leaves = tree.num_leaves(),
        depth = tree.depth(),
        evaluations = sdf.num_evaluations(),
        "distance field built"
    );
    Ok(DistanceField::new(tree, options.indexer))
}
