//! Candidate graph vertices for each compressed joint.

use tracing::debug;

use crate::algo::medial::Sphere;
use crate::graph::PtGraph;
use crate::skeleton::Skeleton;

/// Fat joints may only use this many of the largest spheres.
const FAT_SPHERES: usize = 50;

/// Whether `v` looks like the end of a limb.
///
/// A vertex is an extremity if some neighbour `e1` has no continuation:
/// no neighbour `e2` at least half as wide as `v` lies roughly straight
/// ahead along `e1 -> v`. An isolated vertex is never an extremity.
fn is_extremity(graph: &PtGraph, spheres: &[Sphere], v: usize) -> bool {
    let edges = &graph.edges[v];
    let cur = graph.verts[v];
    let rad = spheres[v].radius;
    edges.iter().any(|&e1| {
        let back = (cur - graph.verts[e1]).normalize();
        !edges.iter().any(|&e2| {
            rad <= 2.0 * spheres[e2].radius && (graph.verts[e2] - cur).normalize().dot(&back) > 0.8
        })
    })
}

/// For every compressed joint, the graph vertices it may be matched to.
///
/// - fat joints: vertices whose radius is at least the 50th largest (every
///   vertex when there are fewer than 50)
/// - joints of compressed degree 1: extremity vertices
/// - all others: every vertex
pub fn compute_possibilities(graph: &PtGraph, spheres: &[Sphere], skeleton: &Skeleton) -> Vec<Vec<usize>> {
    let n = graph.num_vertices();
    let all: Vec<usize> = (0..n).collect();
    let limbs: Vec<usize> = (0..n).filter(|&v| is_extremity(graph, spheres, v)).collect();

    let mut radii: Vec<f64> = spheres.iter().map(|s| s.radius).collect();
    radii.sort_by(f64::total_cmp);
    let cutoff = if radii.len() < FAT_SPHERES {
        0.0
    } else {
        radii[radii.len() - FAT_SPHERES]
    };
    let fat: Vec<usize> = (0..n).filter(|&v| spheres[v].radius >= cutoff).collect();
    debug!(limbs = limbs.len(), fat = fat.len(), "candidate vertices");

    let cgraph = skeleton.compressed_graph();
    (0..cgraph.num_vertices())
        .map(|j| {
            if skeleton.fat()[j] {
                fat.clone()
            } else if cgraph.degree(j) == 1 {
                limbs.clone()
            } else {
                all.clone()
            }
        })
        .collect()
}
