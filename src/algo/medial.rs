//! Medial-axis sampling and the sample graph.
//!
//! The medial axis shows up in a distance field as the place where the
//! gradient changes direction abruptly. [`sample_medial_surface`] looks for
//! octree leaves whose corner gradients disagree, samples them finely, and
//! turns every deep-enough sample into a maximal inscribed [`Sphere`].
//! [`pack_spheres`] thins the samples and [`connect_samples`] links the
//! survivors into a [`PtGraph`] that approximates the shape's 1-skeleton.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

use super::distance::DistanceField;
use crate::graph::PtGraph;
use crate::math::Rect3;
use crate::mesh::NodeId;

/// A ball inscribed in the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Centre.
    pub center: Point3<f64>,
    /// Distance from the centre to the surface.
    pub radius: f64,
}

impl Sphere {
    /// Create a sphere.
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        Self { center, radius }
    }
}

/// Options for medial sampling and packing.
#[derive(Debug, Clone)]
pub struct MedialOptions {
    /// Target spacing of samples on leaf faces.
    pub tolerance: f64,

    /// Upper bound on spheres kept by [`pack_spheres`].
    pub max_spheres: usize,

    /// Whether to sample leaves in parallel (default: true).
    pub parallel: bool,
}

impl Default for MedialOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.002,
            max_spheres: 1000,
            parallel: true,
        }
    }
}

impl MedialOptions {
    /// Set the sample spacing.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the sphere cap.
    pub fn with_max_spheres(mut self, max_spheres: usize) -> Self {
        self.max_spheres = max_spheres;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Most samples per leaf-face axis.
const MAX_FACE_SAMPLES: usize = 8;

/// Whether the field gradients at the corners of `rect` point in
/// sufficiently different directions.
///
/// A vanishing gradient counts as disagreement.
fn gradients_disagree(field: &DistanceField, rect: &Rect3) -> bool {
    let mut dirs = [Vector3::zeros(); 8];
    for (i, d) in dirs.iter_mut().enumerate() {
        let g = field.gradient(&rect.corner(i));
        let len = g.norm();
        if len < 1e-12 {
            return true;
        }
        *d = g / len;
    }
    let mut min_dot = f64::INFINITY;
    for i in 0..8 {
        for j in (i + 1)..8 {
            min_dot = min_dot.min(dirs[i].dot(&dirs[j]));
        }
    }
    min_dot <= 0.0
}

fn sample_leaf(field: &DistanceField, id: NodeId, tolerance: f64) -> Vec<Sphere> {
    let rect = field.octree().node(id).rect;
    if !gradients_disagree(field, &rect) {
        return Vec::new();
    }
    let size = rect.size().x;
    let n = ((size / tolerance).ceil() as usize).clamp(1, MAX_FACE_SAMPLES);
    let step = size / n as f64;

    let mut out = Vec::new();
    for axis in 0..3 {
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        for a in 0..n {
            for b in 0..n {
                let mut p = rect.min;
                p[u] += (a as f64 + 0.5) * step;
                p[v] += (b as f64 + 0.5) * step;

                let value = field.evaluate(&p);
                if -value <= 2.0 * step {
                    continue;
                }
                let h = Vector3::repeat(step);
                if !gradients_disagree(field, &Rect3::new(p - h, p + h)) {
                    continue;
                }
                out.push(Sphere::new(p, -value));
            }
        }
    }
    out
}

/// Samples points near the medial axis of the shape described by `field`.
///
/// Every leaf whose corner gradients disagree (minimum pairwise dot product
/// of the normalized gradients ≤ 0) is sampled on an `n × n` grid on each of
/// its three low faces. A sample is kept if it lies more than two grid steps
/// inside the surface and a small cube around it also shows disagreeing
/// gradients. Its radius is the distance to the surface.
///
/// The result is sorted by decreasing radius. Ties keep leaf order, so the
/// output is deterministic whether or not leaves are processed in parallel.
pub fn sample_medial_surface(field: &DistanceField, options: &MedialOptions) -> Vec<Sphere> {
    let leaves: Vec<NodeId> = field.octree().leaves().collect();
    let per_leaf: Vec<Vec<Sphere>> = if options.parallel {
        leaves
            .par_iter()
            .map(|&id| sample_leaf(field, id, options.tolerance))
            .collect()
    } else {
        leaves
            .iter()
            .map(|&id| sample_leaf(field, id, options.tolerance))
            .collect()
    };

    let mut samples: Vec<Sphere> = per_leaf.into_iter().flatten().collect();
    samples.sort_by(|a, b| b.radius.total_cmp(&a.radius));
    debug!(leaves = leaves.len(), samples = samples.len(), "medial surface sampled");
    samples
}

/// Greedily keeps spheres whose centre is not inside an already kept one.
///
/// `samples` should be sorted by decreasing radius. Sample `i` is rejected
/// when `|c_i - c_j|² < r_j²` for some kept `j`. At most `max_spheres` are
/// kept. Running this on its own output returns the output unchanged.
pub fn pack_spheres(samples: &[Sphere], max_spheres: usize) -> Vec<Sphere> {
    let mut out: Vec<Sphere> = Vec::new();
    for s in samples {
        if out.len() >= max_spheres {
            break;
        }
        let covered = out
            .iter()
            .any(|k| (s.center - k.center).norm_squared() < k.radius * k.radius);
        if !covered {
            out.push(*s);
        }
    }
    out
}

/// Number of points tested along a candidate edge.
const SEGMENT_SAMPLES: usize = 101;

fn segment_inside(field: &DistanceField, a: &Sphere, b: &Sphere) -> bool {
    let limit = -0.25 * a.radius.min(b.radius);
    (0..SEGMENT_SAMPLES).all(|k| {
        let t = k as f64 / (SEGMENT_SAMPLES - 1) as f64;
        let p = a.center + (b.center - a.center) * t;
        field.evaluate(&p) <= limit
    })
}

fn gabriel(spheres: &[Sphere], i: usize, j: usize) -> bool {
    let mid = nalgebra::center(&spheres[i].center, &spheres[j].center);
    let rad_sq = (spheres[i].center - spheres[j].center).norm_squared() / 4.0;
    spheres
        .iter()
        .enumerate()
        .all(|(k, s)| k == i || k == j || (s.center - mid).norm_squared() >= rad_sq)
}

/// Links sphere centres into a graph.
///
/// Spheres `i` and `j` are connected when they overlap, or when no third
/// centre lies strictly inside the sphere with diameter `c_i c_j` and the
/// field stays below `-min(r_i, r_j) / 4` along the whole segment.
pub fn connect_samples(field: &DistanceField, spheres: &[Sphere]) -> PtGraph {
    let mut graph = PtGraph::new();
    for s in spheres {
        graph.add_vertex(s.center);
    }

    let edges: Vec<Vec<usize>> = (0..spheres.len())
        .into_par_iter()
        .map(|i| {
            (0..i)
                .filter(|&j| {
                    let (si, sj) = (&spheres[i], &spheres[j]);
                    let dist_sq = (si.center - sj.center).norm_squared();
                    let sum = si.radius + sj.radius;
                    dist_sq / 4.0 < sum * sum / 4.0
                        || (gabriel(spheres, i, j) && segment_inside(field, si, sj))
                })
                .collect()
        })
        .collect();

    for (i, neighbours) in edges.into_iter().enumerate() {
        for j in neighbours {
            graph.add_edge(i, j);
        }
    }
    debug!(vertices = graph.num_vertices(), edges = graph.num_edges(), "samples connected");
    graph
}
