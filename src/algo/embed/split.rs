//! Restoring full joint chains from a compressed embedding.

use nalgebra::Point3;

use crate::error::{RigError, Result};
use crate::graph::{AllShortestPather, PtGraph};
use crate::skeleton::Skeleton;

/// Full joint indices from the compressed parent of `joint` down to `joint`.
///
/// `joint` is a compressed index. The first entry is the compressed
/// parent's full index, the last is `joint`'s.
pub(crate) fn uncompressed_chain(skeleton: &Skeleton, joint: usize) -> Vec<usize> {
    let mut chain = vec![skeleton.compressed_to_full()[joint]];
    while let Some(&last) = chain.last() {
        match skeleton.full_prev()[last] {
            Some(p) => {
                chain.push(p);
                if skeleton.full_to_compressed()[p].is_some() {
                    break;
                }
            }
            None => break,
        }
    }
    chain.reverse();
    chain
}

/// Positions along the graph path from `prev_vertex` to `cur_vertex` for
/// every joint of the chain ending at compressed joint `joint`.
///
/// Entry `k` belongs to `uncompressed_chain(skeleton, joint)[k]`. Joints are
/// spaced by their share of the compressed bone length. A zero-length path
/// puts every joint on `prev_vertex`.
pub(crate) fn split_path(
    paths: &AllShortestPather,
    graph: &PtGraph,
    skeleton: &Skeleton,
    joint: usize,
    cur_vertex: usize,
    prev_vertex: usize,
) -> Vec<Point3<f64>> {
    let chain = uncompressed_chain(skeleton, joint);
    let path = paths.path(prev_vertex, cur_vertex);
    let start = graph.verts[prev_vertex];
    let mut out = vec![start; chain.len()];
    if path.len() < 2 {
        return out;
    }

    let total = paths.dist(prev_vertex, cur_vertex);
    let mut targets = vec![0.0; chain.len()];
    for k in 1..chain.len() {
        targets[k] = targets[k - 1] + total * skeleton.fraction()[chain[k]];
    }

    let pts: Vec<Point3<f64>> = path.iter().map(|&v| graph.verts[v]).collect();
    let mut so_far = 0.0;
    let mut cur = 1;
    let mut seg = 1;
    while seg < pts.len() && cur < chain.len() {
        let len = (pts[seg] - pts[seg - 1]).norm();
        if len + so_far + 1e-6 <= targets[cur] {
            so_far += len;
            seg += 1;
            continue;
        }
        let ratio = if len > 0.0 {
            ((targets[cur] - so_far) / len).clamp(0.0, 1.0)
        } else {
            0.0
        };
        out[cur] = pts[seg - 1] + (pts[seg] - pts[seg - 1]) * ratio;
        // The same segment may hold several joints.
        cur += 1;
    }

    if let Some(last) = out.last_mut() {
        *last = graph.verts[cur_vertex];
    }
    out
}

/// Positions for every full joint, given one graph vertex per compressed
/// joint.
///
/// The root and every compressed joint land exactly on their vertices.
/// Joints folded into a compressed bone are spread along the shortest graph
/// path between the bone's end vertices, by arclength fraction. The result
/// is indexed by full joint.
///
/// # Errors
///
/// - [`RigError::SkeletonNotFinalized`] if the skeleton is not compressed
/// - [`RigError::DimensionMismatch`] if `matched` does not have one entry
///   per compressed joint
/// - [`RigError::InvalidParameter`] if an entry is not a graph vertex
pub fn split_paths(matched: &[usize], graph: &PtGraph, skeleton: &Skeleton) -> Result<Vec<Point3<f64>>> {
    if !skeleton.is_compressed() {
        return Err(RigError::SkeletonNotFinalized);
    }
    let m = skeleton.compressed_to_full().len();
    if matched.len() != m {
        return Err(RigError::DimensionMismatch {
            expected: m,
            actual: matched.len(),
        });
    }
    if let Some(&bad) = matched.iter().find(|&&v| v >= graph.num_vertices()) {
        return Err(RigError::invalid_param("matched", bad, "not a graph vertex"));
    }

    let paths = AllShortestPather::new(graph);
    Ok(split_with(&paths, matched, graph, skeleton))
}

pub(crate) fn split_with(
    paths: &AllShortestPather,
    matched: &[usize],
    graph: &PtGraph,
    skeleton: &Skeleton,
) -> Vec<Point3<f64>> {
    let mut out = vec![Point3::origin(); skeleton.num_joints()];
    out[skeleton.compressed_to_full()[0]] = graph.verts[matched[0]];
    for (c, &v) in matched.iter().enumerate().skip(1) {
        let Some(parent) = skeleton.compressed_prev()[c] else {
            continue;
        };
        let chain = uncompressed_chain(skeleton, c);
        let pts = split_path(paths, graph, skeleton, c, v, matched[parent]);
        for (&joint, p) in chain.iter().zip(pts).skip(1) {
            out[joint] = p;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Five collinear graph vertices along +Y, spaced 0.25 apart.
    fn line_graph() -> PtGraph {
        let mut g = PtGraph::new();
        for i in 0..5 {
            g.add_vertex(Point3::new(0.0, 0.25 * i as f64, 0.0));
        }
        for i in 1..5 {
            g.add_edge(i - 1, i);
        }
        g
    }

    fn three_link_chain() -> Skeleton {
        let mut s = Skeleton::new();
        s.make_joint("a", Point3::new(0.0, 0.0, 0.0), None).unwrap();
        s.make_joint("b", Point3::new(0.0, 0.25, 0.0), Some("a")).unwrap();
        s.make_joint("c", Point3::new(0.0, 1.0, 0.0), Some("b")).unwrap();
        s.init_compressed().unwrap();
        s
    }

    #[test]
    fn test_chain_walk() {
        let skel = Skeleton::human();
        let chain = uncompressed_chain(&skel, 1);
        assert_eq!(chain.first(), Some(&0));
        assert_eq!(chain.last(), Some(&skel.compressed_to_full()[1]));
        assert!(chain.windows(2).all(|w| skel.full_prev()[w[1]] == Some(w[0])));
    }

    #[test]
    fn test_split_by_fraction() {
        let g = line_graph();
        let skel = three_link_chain();
        let joints = split_paths(&[0, 4], &g, &skel).unwrap();
        assert_eq!(joints.len(), 3);
        assert_eq!(joints[0], g.verts[0]);
        assert_eq!(joints[2], g.verts[4]);
        // b sits at a quarter of the bone.
        assert!((joints[1].y - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_split_round_trip() {
        let g = line_graph();
        let skel = Skeleton::human();
        let m = skel.compressed_to_full().len();
        let matched: Vec<usize> = (0..m).map(|c| c.min(4)).collect();
        let joints = split_paths(&matched, &g, &skel).unwrap();
        assert_eq!(joints.len(), skel.num_joints());
        for (c, &f) in skel.compressed_to_full().iter().enumerate() {
            assert_eq!(joints[f], g.verts[matched[c]]);
        }
    }

    #[test]
    fn test_zero_length_bone() {
        let g = line_graph();
        let skel = three_link_chain();
        let joints = split_paths(&[2, 2], &g, &skel).unwrap();
        assert!(joints.iter().all(|p| *p == g.verts[2]));
    }

    #[test]
    fn test_rejects_bad_input() {
        let g = line_graph();
        let skel = three_link_chain();
        assert!(matches!(
            split_paths(&[0], &g, &skel),
            Err(RigError::DimensionMismatch { .. })
        ));
        assert!(split_paths(&[0, 9], &g, &skel).is_err());
    }
}
