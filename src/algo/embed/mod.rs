//! Discrete skeleton embedding.
//!
//! The compressed skeleton is matched onto the sample graph one joint at a
//! time, in index order (parents before children), by a best-first search.
//! Each state is a [`PartialMatch`]; its priority is the accumulated
//! penalty plus a lower bound on what the next joints will cost, so the
//! first complete match popped from the queue is the cheapest one.
//!
//! # Example
//!
//! ```
//! use armature::algo::embed::{compute_possibilities, discrete_embed, split_paths, EmbedOptions};
//! use armature::algo::medial::Sphere;
//! use armature::algo::Progress;
//! use armature::graph::PtGraph;
//! use armature::skeleton::Skeleton;
//! use nalgebra::Point3;
//!
//! let mut graph = PtGraph::new();
//! for i in 0..5 {
//!     graph.add_vertex(Point3::new(0.5, 0.2 + 0.15 * i as f64, 0.5));
//! }
//! for i in 1..5 {
//!     graph.add_edge(i - 1, i);
//! }
//! let spheres: Vec<Sphere> = graph.verts.iter().map(|&c| Sphere::new(c, 0.05)).collect();
//!
//! let mut skel = Skeleton::new();
//! skel.make_joint("base", Point3::new(0.0, 0.0, 0.0), None).unwrap();
//! skel.make_joint("tip", Point3::new(0.0, 0.5, 0.0), Some("base")).unwrap();
//! skel.init_compressed().unwrap();
//!
//! let poss = compute_possibilities(&graph, &spheres, &skel);
//! let matched = discrete_embed(&graph, &spheres, &skel, &poss, &EmbedOptions::default(), &Progress::none()).unwrap();
//! assert_eq!(matched.len(), 2);
//! assert!(graph.verts[matched[1]].y > graph.verts[matched[0]].y);
//!
//! let joints = split_paths(&matched, &graph, &skel).unwrap();
//! assert_eq!(joints.len(), 2);
//! ```

mod penalty;
mod possibilities;
mod split;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::{debug, trace};

pub use penalty::{EmbedContext, MatchView, PenaltyKind, NO_MATCH, PENALTY_CAP};
pub use possibilities::compute_possibilities;
pub use split::split_paths;

use super::medial::Sphere;
use super::Progress;
use crate::error::{RigError, Result};
use crate::graph::PtGraph;
use crate::skeleton::Skeleton;

/// Options for [`discrete_embed`].
#[derive(Debug, Clone)]
pub struct EmbedOptions {
    /// States popped from the queue before the search gives up.
    pub max_expansions: usize,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            max_expansions: 1_000_000,
        }
    }
}

impl EmbedOptions {
    /// Set the expansion budget.
    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = max_expansions;
        self
    }
}

/// A search state: graph vertices for compressed joints `0..len`.
///
/// States are ordered so that [`BinaryHeap`] pops the lowest heuristic
/// first; among equal heuristics, the state created first wins.
#[derive(Debug, Clone)]
pub struct PartialMatch {
    matched: Vec<usize>,
    taken: Vec<bool>,
    penalty: f64,
    heuristic: f64,
    order: u64,
}

impl PartialMatch {
    fn root(num_vertices: usize) -> Self {
        Self {
            matched: Vec::new(),
            taken: vec![false; num_vertices],
            penalty: 0.0,
            heuristic: 0.0,
            order: 0,
        }
    }

    /// Vertex chosen for each matched joint.
    pub fn matched(&self) -> &[usize] {
        &self.matched
    }

    /// Graph vertices used by the paths of matched bones.
    pub fn taken(&self) -> &[bool] {
        &self.taken
    }

    /// Accumulated penalty.
    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Accumulated penalty plus the lower bound for the next joints.
    pub fn heuristic(&self) -> f64 {
        self.heuristic
    }

    fn view(&self) -> MatchView<'_> {
        MatchView {
            matched: &self.matched,
            taken: &self.taken,
        }
    }
}

impl PartialEq for PartialMatch {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PartialMatch {}

impl PartialOrd for PartialMatch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PartialMatch {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .heuristic
            .total_cmp(&self.heuristic)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Assigns a graph vertex to every compressed joint.
///
/// `possibilities[j]` lists the vertices joint `j` may use (see
/// [`compute_possibilities`]). A candidate is admitted when the accumulated
/// penalty stays below 1. The priority of a state adds, for each unmatched
/// joint whose parent is matched, the cheapest penalty over its candidates;
/// states whose priority exceeds 1 are dropped.
///
/// Returns the graph vertex of each compressed joint.
///
/// # Errors
///
/// - [`RigError::NoEmbedding`] if every branch is pruned
/// - [`RigError::SearchBudgetExceeded`] after `max_expansions` pops
/// - [`RigError::Cancelled`] if the progress context is cancelled
/// - [`RigError::DimensionMismatch`] for inconsistent inputs
pub fn discrete_embed(
    graph: &PtGraph,
    spheres: &[Sphere],
    skeleton: &Skeleton,
    possibilities: &[Vec<usize>],
    options: &EmbedOptions,
    progress: &Progress,
) -> Result<Vec<usize>> {
    EmbedContext::new(graph, spheres, skeleton)?.search(possibilities, options, progress)
}

impl EmbedContext<'_> {
    /// Run [`discrete_embed`] against this context.
    pub fn search(
        &self,
        possibilities: &[Vec<usize>],
        options: &EmbedOptions,
        progress: &Progress,
    ) -> Result<Vec<usize>> {
        let ctx = self;
        let (graph, skeleton) = (self.graph(), self.skeleton());
        let to_match = skeleton.compressed_to_full().len();
        if possibilities.len() != to_match {
            return Err(RigError::DimensionMismatch {
                expected: to_match,
                actual: possibilities.len(),
            });
        }
        if let Some(&bad) = possibilities.iter().flatten().find(|&&v| v >= graph.num_vertices()) {
            return Err(RigError::invalid_param("possibilities", bad, "not a graph vertex"));
        }
        let cprev = skeleton.compressed_prev();

        let mut queue = BinaryHeap::new();
        queue.push(PartialMatch::root(graph.num_vertices()));
        let mut created: u64 = 1;
        let mut expansions = 0usize;

        while let Some(cur) = queue.pop() {
            progress.checkpoint()?;
            let idx = cur.matched.len();
            if idx == to_match {
                debug!(residual = cur.penalty, expansions, "embedding found");
                return Ok(cur.matched);
            }
            if expansions >= options.max_expansions {
                return Err(RigError::SearchBudgetExceeded { expansions });
            }
            expansions += 1;
            if expansions % 1024 == 0 {
                trace!(expansions, queued = queue.len(), "embedding search");
                progress.report(idx, to_match, "Embedding skeleton");
            }

            for &candidate in &possibilities[idx] {
                let extra = ctx.compute_penalty(cur.view(), candidate, idx);
                if cur.penalty + extra >= 1.0 {
                    continue;
                }

                let mut next = PartialMatch {
                    matched: cur.matched.clone(),
                    taken: cur.taken.clone(),
                    penalty: cur.penalty + extra,
                    heuristic: cur.penalty + extra,
                    order: created,
                };
                next.matched.push(candidate);
                if let Some(parent) = cprev[idx] {
                    for v in ctx.paths().path(candidate, next.matched[parent]) {
                        next.taken[v] = true;
                    }
                }

                next.heuristic = ctx.lower_bound(possibilities, &next, 1.0);
                if next.heuristic > 1.0 {
                    continue;
                }

                created += 1;
                queue.push(next);
            }
        }

        Err(RigError::NoEmbedding)
    }

    /// Penalty of `state` plus the cheapest candidate of every unmatched
    /// joint whose parent is matched. Summing stops once it passes `limit`.
    fn lower_bound(&self, possibilities: &[Vec<usize>], state: &PartialMatch, limit: f64) -> f64 {
        let cprev = self.skeleton().compressed_prev();
        let idx = state.matched.len();
        let mut bound = state.penalty;
        for j in idx..possibilities.len() {
            if cprev[j].is_some_and(|p| p >= idx) {
                continue;
            }
            bound += possibilities[j]
                .iter()
                .map(|&k| self.compute_penalty(state.view(), k, j))
                .fold(f64::INFINITY, f64::min);
            if bound > limit {
                break;
            }
        }
        bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::progress::CancelFlag;
    use nalgebra::Point3;

    /// Vertical column of graph vertices.
    fn column(n: usize, spacing: f64) -> (PtGraph, Vec<Sphere>) {
        let mut g = PtGraph::new();
        for i in 0..n {
            g.add_vertex(Point3::new(0.5, 0.1 + spacing * i as f64, 0.5));
        }
        for i in 1..n {
            g.add_edge(i - 1, i);
        }
        let s = g.verts.iter().map(|&p| Sphere::new(p, 0.03)).collect();
        (g, s)
    }

    /// A "Y": trunk 0-1-2 up the middle, arms 2-3-4 and 2-5-6 up and out.
    fn fork() -> (PtGraph, Vec<Sphere>) {
        let pts = [
            Point3::new(0.5, 0.1, 0.5),
            Point3::new(0.5, 0.25, 0.5),
            Point3::new(0.5, 0.4, 0.5),
            Point3::new(0.4, 0.5, 0.5),
            Point3::new(0.3, 0.6, 0.5),
            Point3::new(0.6, 0.5, 0.5),
            Point3::new(0.7, 0.6, 0.5),
        ];
        let mut g = PtGraph::new();
        for p in pts {
            g.add_vertex(p);
        }
        for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 4), (2, 5), (5, 6)] {
            g.add_edge(a, b);
        }
        let s = pts.iter().map(|&p| Sphere::new(p, 0.03)).collect();
        (g, s)
    }

    fn fork_skeleton() -> Skeleton {
        let mut s = Skeleton::new();
        s.make_joint("root", Point3::new(0.0, 0.0, 0.0), None).unwrap();
        s.make_joint("neck", Point3::new(0.0, 0.3, 0.0), Some("root")).unwrap();
        s.make_joint("left", Point3::new(-0.2, 0.5, 0.0), Some("neck")).unwrap();
        s.make_joint("right", Point3::new(0.2, 0.5, 0.0), Some("neck")).unwrap();
        s.make_symmetric("left", "right").unwrap();
        s.init_compressed().unwrap();
        s
    }

    fn embed(graph: &PtGraph, spheres: &[Sphere], skel: &Skeleton) -> Result<Vec<usize>> {
        let poss = compute_possibilities(graph, spheres, skel);
        discrete_embed(graph, spheres, skel, &poss, &EmbedOptions::default(), &Progress::none())
    }

    /// Cheapest complete match by exhaustive enumeration, under the same
    /// admission rule as the search.
    fn exhaustive(
        ctx: &EmbedContext<'_>,
        skel: &Skeleton,
        poss: &[Vec<usize>],
        cur: &PartialMatch,
        best: &mut Option<(f64, Vec<usize>)>,
    ) {
        let idx = cur.matched.len();
        if idx == poss.len() {
            if best.as_ref().map_or(true, |(p, _)| cur.penalty < *p) {
                *best = Some((cur.penalty, cur.matched.clone()));
            }
            return;
        }
        for &c in &poss[idx] {
            let extra = ctx.compute_penalty(cur.view(), c, idx);
            if cur.penalty + extra >= 1.0 {
                continue;
            }
            let mut next = cur.clone();
            next.matched.push(c);
            next.penalty += extra;
            if let Some(p) = skel.compressed_prev()[idx] {
                for v in ctx.paths().path(c, next.matched[p]) {
                    next.taken[v] = true;
                }
            }
            exhaustive(ctx, skel, poss, &next, best);
        }
    }

    /// The fork with a head above the branch point, and a skeleton whose
    /// neck carries a head beside a symmetric pair of arms.
    fn crowned_fork() -> (PtGraph, Vec<Sphere>, Skeleton) {
        let (mut g, _) = fork();
        let head = g.add_vertex(Point3::new(0.5, 0.6, 0.5));
        g.add_edge(2, head);
        let s = g.verts.iter().map(|&p| Sphere::new(p, 0.03)).collect();

        let mut skel = Skeleton::new();
        skel.make_joint("root", Point3::new(0.0, 0.0, 0.0), None).unwrap();
        skel.make_joint("neck", Point3::new(0.0, 0.3, 0.0), Some("root")).unwrap();
        skel.make_joint("left", Point3::new(-0.2, 0.5, 0.0), Some("neck")).unwrap();
        skel.make_joint("right", Point3::new(0.2, 0.5, 0.0), Some("neck")).unwrap();
        skel.make_joint("head", Point3::new(0.0, 0.5, 0.0), Some("neck")).unwrap();
        skel.make_symmetric("left", "right").unwrap();
        skel.init_compressed().unwrap();
        (g, s, skel)
    }

    /// Visits every admitted state below `cur` and checks that its priority
    /// does not exceed its cheapest completion. Returns that completion.
    fn check_bounds(
        ctx: &EmbedContext<'_>,
        poss: &[Vec<usize>],
        cur: &PartialMatch,
        checked: &mut usize,
    ) -> Option<f64> {
        let idx = cur.matched.len();
        if idx == poss.len() {
            return Some(cur.penalty);
        }
        let mut best: Option<f64> = None;
        for &c in &poss[idx] {
            let extra = ctx.compute_penalty(cur.view(), c, idx);
            if cur.penalty + extra >= 1.0 {
                continue;
            }
            let mut next = cur.clone();
            next.matched.push(c);
            next.penalty += extra;
            if let Some(p) = ctx.skeleton().compressed_prev()[idx] {
                for v in ctx.paths().path(c, next.matched[p]) {
                    next.taken[v] = true;
                }
            }
            next.heuristic = ctx.lower_bound(poss, &next, f64::INFINITY);

            if let Some(completion) = check_bounds(ctx, poss, &next, checked) {
                assert!(
                    next.heuristic <= completion + 1e-12,
                    "bound {} above completion {} at {:?}",
                    next.heuristic,
                    completion,
                    next.matched
                );
                *checked += 1;
                best = Some(best.map_or(completion, |b| b.min(completion)));
            }
        }
        best
    }

    #[test]
    fn test_heuristic_never_overestimates() {
        let (g, s, skel) = crowned_fork();
        assert_eq!(g.num_vertices(), 8);
        assert_eq!(skel.compressed_prev().len(), 5);
        let ctx = EmbedContext::new(&g, &s, &skel).unwrap();
        // Every joint may take every vertex.
        let poss = vec![(0..g.num_vertices()).collect::<Vec<_>>(); 5];

        let root = PartialMatch::root(g.num_vertices());
        let mut checked = 0;
        let cheapest = check_bounds(&ctx, &poss, &root, &mut checked).unwrap();
        assert!(checked > 0);

        let mut best = None;
        exhaustive(&ctx, &skel, &poss, &root, &mut best);
        let (best_penalty, _) = best.unwrap();
        assert!((cheapest - best_penalty).abs() < 1e-12);

        let found = ctx.search(&poss, &EmbedOptions::default(), &Progress::none()).unwrap();
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn test_stick_points_up() {
        let (g, s) = column(6, 0.12);
        let skel = crate::test_util::stick_skeleton();
        let m = embed(&g, &s, &skel).unwrap();
        assert_eq!(m.len(), 2);
        assert!(g.verts[m[1]].y > g.verts[m[0]].y);
    }

    #[test]
    fn test_fork_matches_exhaustive_optimum() {
        let (g, s) = fork();
        let skel = fork_skeleton();
        let poss = compute_possibilities(&g, &s, &skel);
        let found = embed(&g, &s, &skel).unwrap();

        let ctx = EmbedContext::new(&g, &s, &skel).unwrap();
        let mut best = None;
        exhaustive(&ctx, &skel, &poss, &PartialMatch::root(g.num_vertices()), &mut best);
        let (best_penalty, _) = best.unwrap();

        let mut state = PartialMatch::root(g.num_vertices());
        for (idx, &v) in found.iter().enumerate() {
            state.penalty += ctx.compute_penalty(state.view(), v, idx);
            state.matched.push(v);
            if let Some(p) = skel.compressed_prev()[idx] {
                for u in ctx.paths().path(v, state.matched[p]) {
                    state.taken[u] = true;
                }
            }
        }
        assert!((state.penalty - best_penalty).abs() < 1e-9);

        // Arms go to the matching sides.
        let left = skel.full_to_compressed()[skel.joint_index("left").unwrap()].unwrap();
        let right = skel.full_to_compressed()[skel.joint_index("right").unwrap()].unwrap();
        assert!(g.verts[found[left]].x < 0.5);
        assert!(g.verts[found[right]].x > 0.5);
    }

    #[test]
    fn test_context_search_and_split() {
        let (g, s) = column(6, 0.12);
        let skel = crate::test_util::stick_skeleton();
        let poss = compute_possibilities(&g, &s, &skel);
        let ctx = EmbedContext::new(&g, &s, &skel).unwrap();
        let m = ctx.search(&poss, &EmbedOptions::default(), &Progress::none()).unwrap();
        assert_eq!(m, embed(&g, &s, &skel).unwrap());

        let joints = ctx.split(&m).unwrap();
        assert_eq!(joints, split_paths(&m, &g, &skel).unwrap());
        assert!(ctx.split(&m[..1]).is_err());
        assert!(ctx.split(&[0, 99]).is_err());
    }

    #[test]
    fn test_no_embedding() {
        // Every candidate is far too short for the bone.
        let (g, s) = column(2, 0.01);
        let mut skel = crate::test_util::stick_skeleton();
        skel.scale(2.0);
        assert!(matches!(embed(&g, &s, &skel), Err(RigError::NoEmbedding)));
    }

    #[test]
    fn test_budget_and_cancel() {
        let (g, s) = fork();
        let skel = fork_skeleton();
        let poss = compute_possibilities(&g, &s, &skel);
        let tight = EmbedOptions::default().with_max_expansions(1);
        assert!(matches!(
            discrete_embed(&g, &s, &skel, &poss, &tight, &Progress::none()),
            Err(RigError::SearchBudgetExceeded { expansions: 1 })
        ));

        let flag = CancelFlag::new();
        flag.cancel();
        let progress = Progress::none().with_cancel(flag);
        assert!(matches!(
            discrete_embed(&g, &s, &skel, &poss, &EmbedOptions::default(), &progress),
            Err(RigError::Cancelled)
        ));
    }

    #[test]
    fn test_heap_order_is_deterministic() {
        let mut heap = BinaryHeap::new();
        for (order, h) in [(0, 0.5), (1, 0.2), (2, 0.2), (3, 0.9)] {
            let mut pm = PartialMatch::root(0);
            pm.heuristic = h;
            pm.order = order;
            heap.push(pm);
        }
        let popped: Vec<u64> = std::iter::from_fn(|| heap.pop()).map(|p| p.order).collect();
        assert_eq!(popped, vec![1, 2, 0, 3]);
    }
}
