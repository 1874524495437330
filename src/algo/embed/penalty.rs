//! Penalty terms scoring one joint assignment against a partial match.
//!
//! Every term looks at the compressed joint `idx` being placed on graph
//! vertex `next`, given the vertices already chosen for joints `0..idx`
//! (and which graph vertices their paths occupy). Terms return a
//! non-negative score, or [`NO_MATCH`] to forbid the assignment outright.
//! [`EmbedContext::compute_penalty`] combines them with fixed weights.

use nalgebra::{Point3, Vector3};

use super::split::{split_path, split_with, uncompressed_chain};
use crate::algo::medial::Sphere;
use crate::error::{RigError, Result};
use crate::graph::{AllShortestPather, PtGraph};
use crate::math::smooth_interp;
use crate::skeleton::Skeleton;

/// Score that rules an assignment out.
pub const NO_MATCH: f64 = 1e10;

/// Share of the end-sphere radii credited to a graph path's length.
const DIST_PLAY_FACTOR: f64 = 0.7;

/// Largest value [`EmbedContext::compute_penalty`] returns.
pub const PENALTY_CAP: f64 = 2.0;

/// The penalty terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PenaltyKind {
    /// Graph distance to the parent against the rest bone length.
    Dist,
    /// Directions to the parent and siblings against the rest pose.
    GlobalDot,
    /// Bone length against an already placed symmetric partner.
    Sym,
    /// Reuse of graph vertices claimed by another bone's path.
    Double,
    /// Height of a foot above the lowest graph point.
    Foot,
    /// A joint placed on its parent's vertex.
    Dup,
    /// Local path direction against each rest-pose sub-bone.
    Dot,
    /// A limb tip that stops in the middle of a straight path.
    Extrem,
    /// Shortcuts to non-ancestor joints through the graph.
    Disjoint,
}

impl PenaltyKind {
    /// Every term, in evaluation order.
    pub const ALL: [PenaltyKind; 9] = [
        PenaltyKind::Dist,
        PenaltyKind::GlobalDot,
        PenaltyKind::Sym,
        PenaltyKind::Double,
        PenaltyKind::Foot,
        PenaltyKind::Dup,
        PenaltyKind::Dot,
        PenaltyKind::Extrem,
        PenaltyKind::Disjoint,
    ];

    /// Weight of the term in the combined penalty.
    pub fn weight(self) -> f64 {
        match self {
            PenaltyKind::Dist => 0.027,
            PenaltyKind::GlobalDot => 0.023,
            PenaltyKind::Sym => 0.007,
            PenaltyKind::Double => 0.046,
            PenaltyKind::Foot => 0.014,
            PenaltyKind::Dup => 0.012,
            PenaltyKind::Dot => 0.072,
            PenaltyKind::Extrem => 0.005,
            PenaltyKind::Disjoint => 0.033,
        }
    }
}

/// The partial assignment a penalty is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct MatchView<'m> {
    /// Graph vertex of each already placed compressed joint.
    pub matched: &'m [usize],
    /// Graph vertices on the paths of placed bones.
    pub taken: &'m [bool],
}

/// Everything the penalty terms read: the sample graph, its spheres, all
/// pairs shortest paths and the skeleton.
#[derive(Debug)]
pub struct EmbedContext<'a> {
    graph: &'a PtGraph,
    spheres: &'a [Sphere],
    skeleton: &'a Skeleton,
    paths: AllShortestPather,
    foot_base: f64,
}

#[inline]
fn cube(x: f64) -> f64 {
    x * x * x
}

/// `v` normalized, or zero for a zero vector.
#[inline]
fn unit(v: Vector3<f64>) -> Vector3<f64> {
    v.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
}

/// Direction penalty shared by the two branches of [`PenaltyKind::Dot`].
#[inline]
fn dot_score(rest: Vector3<f64>, dot: f64) -> f64 {
    let penalty = (1.0 - dot) * smooth_interp(dot, -0.5, 6.0, 0.0, 1.0);
    rest.norm_squared() * 50.0 * penalty * penalty
}

impl<'a> EmbedContext<'a> {
    /// Build the context, solving shortest paths from every graph vertex.
    ///
    /// # Errors
    /// - [`RigError::SkeletonNotFinalized`] if the skeleton is not compressed
    /// - [`RigError::DimensionMismatch`] unless there is one sphere per vertex
    pub fn new(graph: &'a PtGraph, spheres: &'a [Sphere], skeleton: &'a Skeleton) -> Result<Self> {
        if !skeleton.is_compressed() {
            return Err(RigError::SkeletonNotFinalized);
        }
        if spheres.len() != graph.num_vertices() {
            return Err(RigError::DimensionMismatch {
                expected: graph.num_vertices(),
                actual: spheres.len(),
            });
        }
        let foot_base = graph.verts.iter().map(|p| p.y).fold(1.0, f64::min);
        Ok(Self {
            graph,
            spheres,
            skeleton,
            paths: AllShortestPather::new(graph),
            foot_base,
        })
    }

    /// All pairs shortest paths over the sample graph.
    pub fn paths(&self) -> &AllShortestPather {
        &self.paths
    }

    /// The sample graph.
    pub fn graph(&self) -> &'a PtGraph {
        self.graph
    }

    /// The skeleton being embedded.
    pub fn skeleton(&self) -> &'a Skeleton {
        self.skeleton
    }

    /// [`split_paths`](super::split_paths) reusing this context's shortest paths.
    ///
    /// # Errors
    /// - [`RigError::DimensionMismatch`] if `matched` does not have one entry
    ///   per compressed joint
    /// - [`RigError::InvalidParameter`] if an entry is not a graph vertex
    pub fn split(&self, matched: &[usize]) -> Result<Vec<Point3<f64>>> {
        let m = self.skeleton.compressed_to_full().len();
        if matched.len() != m {
            return Err(RigError::DimensionMismatch {
                expected: m,
                actual: matched.len(),
            });
        }
        if let Some(&bad) = matched.iter().find(|&&v| v >= self.graph.num_vertices()) {
            return Err(RigError::invalid_param("matched", bad, "not a graph vertex"));
        }
        Ok(split_with(&self.paths, matched, self.graph, self.skeleton))
    }

    /// Combined weighted penalty for placing compressed joint `idx` on `next`.
    ///
    /// The root is free. If any single weighted term exceeds 1 the result is
    /// [`PENALTY_CAP`]; otherwise it is the weighted sum, capped at the same
    /// value.
    pub fn compute_penalty(&self, view: MatchView<'_>, next: usize, idx: usize) -> f64 {
        if idx == 0 {
            return 0.0;
        }
        let mut out = 0.0;
        for kind in PenaltyKind::ALL {
            let p = self.penalty(kind, view, next, idx) * kind.weight();
            if p > 1.0 {
                return PENALTY_CAP;
            }
            out += p;
        }
        out.min(PENALTY_CAP)
    }

    /// Unweighted score of one term. `idx` must not be the root.
    pub fn penalty(&self, kind: PenaltyKind, view: MatchView<'_>, next: usize, idx: usize) -> f64 {
        match kind {
            PenaltyKind::Dist => self.dist_penalty(view, next, idx),
            PenaltyKind::GlobalDot => self.global_dot_penalty(view, next, idx),
            PenaltyKind::Sym => self.sym_penalty(view, next, idx),
            PenaltyKind::Double => self.double_penalty(view, next, idx),
            PenaltyKind::Foot => self.foot_penalty(next, idx),
            PenaltyKind::Dup => self.dup_penalty(view, next, idx),
            PenaltyKind::Dot => self.dot_penalty(view, next, idx),
            PenaltyKind::Extrem => self.extrem_penalty(view, next, idx),
            PenaltyKind::Disjoint => self.disjoint_penalty(view, next, idx),
        }
    }

    // ==================== Helpers ====================

    fn parent(&self, idx: usize) -> usize {
        self.skeleton.compressed_prev()[idx].unwrap_or(0)
    }

    fn radius(&self, v: usize) -> f64 {
        self.spheres[v].radius
    }

    fn play(&self, a: usize, b: usize) -> f64 {
        DIST_PLAY_FACTOR * (self.radius(a) + self.radius(b))
    }

    // ==================== Terms ====================

    fn dist_penalty(&self, view: MatchView<'_>, next: usize, idx: usize) -> f64 {
        let pv = view.matched[self.parent(idx)];
        let dist = self.paths.dist(next, pv);
        if dist < 0.0 {
            return NO_MATCH;
        }
        let play = self.play(next, pv);
        let rest = self.skeleton.compressed_length()[idx];
        if dist + play < 0.5 * rest {
            return NO_MATCH;
        }
        cube(smooth_interp(rest / (dist + play), 0.5, 0.0, 2.0, 3.0))
    }

    fn global_dot_penalty(&self, view: MatchView<'_>, next: usize, idx: usize) -> f64 {
        let prev = self.parent(idx);
        let cverts = &self.skeleton.compressed_graph().verts;
        let cprev = self.skeleton.compressed_prev();
        let mut out = 0.0;
        for (i, &mv) in view.matched.iter().enumerate() {
            if i != prev && cprev[i] != Some(prev) {
                continue;
            }
            let ours = self.graph.verts[next] - self.graph.verts[mv];
            if ours.norm_squared() < 1e-16 {
                continue;
            }
            let given = unit(cverts[idx] - cverts[i]);
            let dot = unit(ours).dot(&given);
            if i == prev {
                if dot < 0.0 {
                    return NO_MATCH;
                }
                let d = (1.0 - dot) * 4.0;
                out += 0.5 * (d * d - 0.1).max(0.0);
            } else {
                if dot < -0.5 {
                    return NO_MATCH;
                }
                let d = (1.0 - dot) * 2.0;
                out += 0.5 * (d * d - 0.5).max(0.0);
            }
        }
        out
    }

    fn sym_penalty(&self, view: MatchView<'_>, next: usize, idx: usize) -> f64 {
        let Some(v1) = self.skeleton.compressed_sym()[idx] else {
            return 0.0;
        };
        if v1 >= view.matched.len() {
            return 0.0;
        }
        let pv = view.matched[self.parent(idx)];
        let dist = self.paths.dist(next, pv);
        let dist_c = dist + self.play(next, pv);

        let v2 = self.parent(v1);
        let (m1, m2) = (view.matched[v1], view.matched[v2]);
        let s_dist = self.paths.dist(m1, m2);
        let s_dist_c = s_dist + self.play(m1, m2);

        let noc_ratio = (dist / (s_dist + 1e-8)).max(s_dist / (dist + 1e-8)).min(2.0);
        let ratio = (s_dist / dist_c).max(dist / s_dist_c);
        (cube(noc_ratio * 0.2 + ratio * 0.8) - 1.2).max(0.0)
    }

    fn double_penalty(&self, view: MatchView<'_>, next: usize, idx: usize) -> f64 {
        let pv = view.matched[self.parent(idx)];
        let path = self.paths.path(next, pv);
        let mut out = 0.0;
        // The last entry is the parent's own vertex.
        for i in (0..path.len().saturating_sub(1)).rev() {
            let v = path[i];
            if view.taken[v] {
                if self.radius(v) < 0.02 {
                    return NO_MATCH;
                }
                let k = (i + 1) as f64;
                out += 0.5 / (k * k);
            }
        }
        if out == 0.0 {
            0.0
        } else {
            out + 0.5
        }
    }

    fn foot_penalty(&self, next: usize, idx: usize) -> f64 {
        if self.skeleton.feet()[idx] {
            self.graph.verts[next].y - self.foot_base
        } else {
            0.0
        }
    }

    fn dup_penalty(&self, view: MatchView<'_>, next: usize, idx: usize) -> f64 {
        if next == view.matched[self.parent(idx)] {
            1.0
        } else {
            0.0
        }
    }

    fn dot_penalty(&self, view: MatchView<'_>, next: usize, idx: usize) -> f64 {
        let prev = self.parent(idx);
        let pv = view.matched[prev];
        if next == pv {
            return 0.0;
        }

        let skel = self.skeleton;
        let full = skel.compressed_to_full()[idx];
        let single_bone = skel.full_prev()[full]
            .and_then(|p| skel.full_to_compressed()[p])
            .is_some_and(|c| c == prev);
        if single_bone {
            let cverts = &skel.compressed_graph().verts;
            let rest = cverts[idx] - cverts[prev];
            let dir = self.graph.verts[next] - self.graph.verts[pv];
            return dot_score(rest, unit(rest).dot(&unit(dir)));
        }

        let chain = uncompressed_chain(skel, idx);
        let pts = split_path(&self.paths, self.graph, skel, idx, next, pv);
        let fverts = &skel.full_graph().verts;
        chain
            .windows(2)
            .zip(pts.windows(2))
            .map(|(c, p)| {
                let rest = fverts[c[1]] - fverts[c[0]];
                dot_score(rest, unit(rest).dot(&unit(p[1] - p[0])))
            })
            .sum()
    }

    fn extrem_penalty(&self, view: MatchView<'_>, next: usize, idx: usize) -> f64 {
        let pv = view.matched[self.parent(idx)];
        if self.skeleton.compressed_graph().degree(idx) != 1 || next == pv {
            return 0.0;
        }
        let verts = &self.graph.verts;
        let big = unit(verts[next] - verts[pv]);
        let cur_rad = self.radius(next);
        for &oth in &self.graph.edges[next] {
            if cur_rad > 2.0 * self.radius(oth) {
                continue;
            }
            let d1 = unit(verts[oth] - verts[pv]);
            let d2 = unit(verts[oth] - verts[next]);
            if d1.dot(&big) > 0.95 && d2.dot(&big) > 0.8 {
                return 1.0;
            }
        }
        0.0
    }

    fn disjoint_penalty(&self, view: MatchView<'_>, next: usize, idx: usize) -> f64 {
        let prev = self.parent(idx);
        let mut out = 0.0;
        for (i, &mi) in view.matched.iter().enumerate() {
            if i == idx || i == prev {
                continue;
            }
            let (mut a1, mut a2) = (idx, i);
            while a1 != a2 {
                if a1 < a2 {
                    a2 = self.parent(a2);
                } else {
                    a1 = self.parent(a1);
                }
            }
            let s_size = self.radius(next) + self.radius(mi);
            let g_dist = self.paths.dist(next, mi);
            let ma = view.matched[a1];
            let b_dist = self.paths.dist(next, ma) + self.paths.dist(ma, mi);
            if (b_dist + s_size) / (g_dist + s_size) > 2.0 {
                out += 1.0;
            }
        }
        out
    }
}
