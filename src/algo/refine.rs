//! Continuous refinement of joint positions.
//!
//! The discrete embedding puts joints on sample-graph vertices. This stage
//! moves them freely by gradient descent on an energy that keeps bones near
//! the medial surface and inside the mesh, close to their rest length, and
//! close to their rest direction. Symmetric bones are also pulled towards
//! equal lengths.
//!
//! Gradients come from [`Deriv`]: the per-bone energy is written once over
//! [`Real`] and evaluated on `Deriv<6>` (the two endpoints of a bone) or
//! `Deriv<12>` (the four endpoints of a symmetric pair).
//!
//! # Algorithm
//!
//! For each outer iteration:
//! 1. `global_rounds` line searches along the normalized gradient of the
//!    total energy over every joint
//! 2. one pass over the bones, line-searching both endpoints of each bone
//!    against the energy of every term touching them
//!
//! A line search doubles its step after every improvement and stops at the
//! first trial that does not improve, discarding it.

use nalgebra::{DVector, Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

use super::distance::DistanceField;
use super::Progress;
use crate::error::{RigError, Result};
use crate::math::{vec3, Deriv, Real};
use crate::skeleton::Skeleton;

/// Options for [`refine_embedding`].
#[derive(Debug, Clone)]
pub struct RefineOptions {
    /// Outer iterations.
    pub outer_iterations: usize,

    /// Whole-embedding line searches per outer iteration.
    pub global_rounds: usize,

    /// Points sampled along each bone for the surface term.
    pub surface_samples: usize,

    /// Distance from the nearest medial sample that costs nothing.
    pub corridor: f64,

    /// Weight of the surface term.
    pub surface_weight: f64,

    /// Weight of the length term.
    pub length_weight: f64,

    /// Weight of the angle term.
    pub angle_weight: f64,

    /// Weight of the symmetry term.
    pub symmetry_weight: f64,

    /// First trial step of every line search.
    pub initial_step: f64,

    /// Whether to evaluate bone gradients in parallel (default: true).
    pub parallel: bool,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            outer_iterations: 10,
            global_rounds: 2,
            surface_samples: 10,
            corridor: 0.01,
            surface_weight: 100.0,
            length_weight: 1.0,
            angle_weight: 1.0,
            symmetry_weight: 1.0,
            initial_step: 1e-3,
            parallel: true,
        }
    }
}

impl RefineOptions {
    /// Set the number of outer iterations.
    pub fn with_outer_iterations(mut self, outer_iterations: usize) -> Self {
        self.outer_iterations = outer_iterations;
        self
    }

    /// Set the number of global rounds per outer iteration.
    pub fn with_global_rounds(mut self, global_rounds: usize) -> Self {
        self.global_rounds = global_rounds;
        self
    }

    /// Set the free corridor around the medial samples.
    pub fn with_corridor(mut self, corridor: f64) -> Self {
        self.corridor = corridor;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

// ==================== Medial projector ====================

/// Nearest-point queries over the medial samples, on a uniform bucket grid.
#[derive(Debug, Clone)]
pub struct MedialProjector {
    points: Vec<Point3<f64>>,
    origin: Point3<f64>,
    cell: f64,
    res: usize,
    buckets: Vec<Vec<u32>>,
}

impl MedialProjector {
    /// Bucket `points`. About two points land in each occupied cell.
    pub fn new(points: &[Point3<f64>]) -> Self {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min = min.inf(p);
            max = max.sup(p);
        }
        let res = ((points.len() as f64 / 2.0).cbrt().ceil() as usize).clamp(1, 64);
        let extent = if points.is_empty() {
            1.0
        } else {
            (max - min).max().max(1e-9)
        };
        let cell = extent / res as f64;
        let origin = if points.is_empty() { Point3::origin() } else { min };

        let mut out = Self {
            points: points.to_vec(),
            origin,
            cell,
            res,
            buckets: vec![Vec::new(); res * res * res],
        };
        for (i, p) in points.iter().enumerate() {
            let c = out.cell_of(p);
            let b = out.bucket(c);
            out.buckets[b].push(i as u32);
        }
        out
    }

    fn cell_of(&self, p: &Point3<f64>) -> [usize; 3] {
        std::array::from_fn(|k| {
            let f = ((p[k] - self.origin[k]) / self.cell).floor();
            if f <= 0.0 {
                0
            } else {
                (f as usize).min(self.res - 1)
            }
        })
    }

    fn bucket(&self, c: [usize; 3]) -> usize {
        c[0] + self.res * (c[1] + self.res * c[2])
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The sample closest to `p`.
    pub fn nearest(&self, p: &Point3<f64>) -> Option<Point3<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let c = self.cell_of(p);
        let mut best: Option<(f64, usize)> = None;
        for r in 0..self.res {
            let lo: [usize; 3] = std::array::from_fn(|k| c[k].saturating_sub(r));
            let hi: [usize; 3] = std::array::from_fn(|k| (c[k] + r).min(self.res - 1));
            for z in lo[2]..=hi[2] {
                for y in lo[1]..=hi[1] {
                    for x in lo[0]..=hi[0] {
                        let ring = [x, y, z]
                            .iter()
                            .zip(c.iter())
                            .map(|(&a, &b)| a.abs_diff(b))
                            .max()
                            .unwrap_or(0);
                        if ring != r {
                            continue;
                        }
                        for &i in &self.buckets[self.bucket([x, y, z])] {
                            let d = (self.points[i as usize] - p).norm_squared();
                            if best.map_or(true, |(bd, _)| d < bd) {
                                best = Some((d, i as usize));
                            }
                        }
                    }
                }
            }
            if let Some((bd, _)) = best {
                // Cells outside ring r are at least r cells away.
                let reach = r as f64 * self.cell;
                if bd <= reach * reach {
                    break;
                }
            }
        }
        best.map(|(_, i)| self.points[i])
    }
}

// ==================== Energy ====================

/// Rest-pose data for one bone, from its parent joint to `child`.
#[derive(Debug, Clone, Copy)]
struct Bone {
    parent: usize,
    child: usize,
    dir: [f64; 3],
    length: f64,
}

struct Energy<'a> {
    field: &'a DistanceField,
    projector: MedialProjector,
    bones: Vec<Bone>,
    /// Pairs of bone indices with symmetric children.
    pairs: Vec<(usize, usize)>,
    /// Bones touching each joint.
    incident: Vec<Vec<usize>>,
    /// Symmetric pairs touching each joint.
    incident_pairs: Vec<Vec<usize>>,
    options: &'a RefineOptions,
}

const TWO_POW_1_5: f64 = 2.0 * std::f64::consts::SQRT_2;

impl<'a> Energy<'a> {
    fn new(
        field: &'a DistanceField,
        medial_points: &[Point3<f64>],
        skeleton: &Skeleton,
        options: &'a RefineOptions,
    ) -> Self {
        let verts = &skeleton.full_graph().verts;
        let mut bones = Vec::new();
        let mut bone_of = vec![None; skeleton.num_joints()];
        for (child, parent) in skeleton.full_prev().iter().enumerate() {
            let Some(parent) = *parent else { continue };
            let v = verts[child] - verts[parent];
            let length = v.norm();
            let dir = if length > 0.0 { v / length } else { Vector3::zeros() };
            bone_of[child] = Some(bones.len());
            bones.push(Bone {
                parent,
                child,
                dir: [dir.x, dir.y, dir.z],
                length,
            });
        }

        let pairs: Vec<(usize, usize)> = skeleton
            .full_sym()
            .iter()
            .enumerate()
            .filter_map(|(j, s)| Some((bone_of[j]?, bone_of[(*s)?]?)))
            .collect();

        let n = skeleton.num_joints();
        let mut incident = vec![Vec::new(); n];
        for (b, bone) in bones.iter().enumerate() {
            incident[bone.parent].push(b);
            incident[bone.child].push(b);
        }
        let mut incident_pairs = vec![Vec::new(); n];
        for (k, &(a, b)) in pairs.iter().enumerate() {
            let mut joints = [bones[a].parent, bones[a].child, bones[b].parent, bones[b].child];
            joints.sort_unstable();
            for (i, &j) in joints.iter().enumerate() {
                if i == 0 || joints[i - 1] != j {
                    incident_pairs[j].push(k);
                }
            }
        }

        Self {
            field,
            projector: MedialProjector::new(medial_points),
            bones,
            pairs,
            incident,
            incident_pairs,
            options,
        }
    }

    /// Energy of one bone with endpoints `a` (parent) and `b` (child).
    fn bone<T: Real>(&self, bone: &Bone, a: [T; 3], b: [T; 3]) -> T {
        let opts = self.options;
        let mut out = T::from_f64(0.0);

        // Surface: stay near the medial samples and inside the mesh.
        let n = opts.surface_samples.max(2);
        let mut surface = T::from_f64(0.0);
        for k in 0..n {
            let t = k as f64 / (n - 1) as f64;
            let q = vec3::lerp(a, b, t);
            if let Some(m) = self.projector.nearest(&Point3::from(vec3::value(q))) {
                let d = vec3::norm_sq(vec3::sub(q, vec3::constant([m.x, m.y, m.z]))).sqrt();
                surface += (d - opts.corridor).max_f64(0.0).sqr();
            }
            surface += self.field.evaluate_generic(q).max_f64(0.0).sqr();
        }
        out += surface * (opts.surface_weight / n as f64);

        if bone.length <= 0.0 {
            return out;
        }
        let v = vec3::sub(b, a);
        let proj = vec3::dot_f64(v, bone.dir);

        // Length along the rest direction.
        let ratio = proj / bone.length;
        out += (ratio.max_f64(0.5) - 1.0).sqr() * opts.length_weight;

        // Angle from the rest direction, roughly cubic in the angle.
        let len = vec3::norm_sq(v).sqrt();
        let cos = proj / (len + 1e-10);
        let mut angle = (-cos + 1.0).max_f64(0.0).powf(1.5) * TWO_POW_1_5;
        if cos.value() < 0.0 {
            angle = angle * 10.0;
        }
        out += angle * opts.angle_weight;
        out
    }

    /// Relative length difference of two symmetric bones.
    fn symmetry<T: Real>(&self, a: [[T; 3]; 2], b: [[T; 3]; 2]) -> T {
        let la = vec3::norm_sq(vec3::sub(a[1], a[0])).sqrt();
        let lb = vec3::norm_sq(vec3::sub(b[1], b[0])).sqrt();
        let sum = la + lb;
        if sum.value() < 1e-12 {
            return T::from_f64(0.0);
        }
        ((la - lb) / sum).sqr() * self.options.symmetry_weight
    }

    fn total(&self, x: &[Point3<f64>]) -> f64 {
        let p = |j: usize| [x[j].x, x[j].y, x[j].z];
        let bones: f64 = self
            .bones
            .iter()
            .map(|b| self.bone(b, p(b.parent), p(b.child)))
            .sum();
        let sym: f64 = self
            .pairs
            .iter()
            .map(|&(a, b)| {
                let (ba, bb) = (&self.bones[a], &self.bones[b]);
                self.symmetry([p(ba.parent), p(ba.child)], [p(bb.parent), p(bb.child)])
            })
            .sum();
        bones + sym
    }

    /// Energy of every term touching joints `j0` or `j1`.
    fn local(&self, x: &[Point3<f64>], j0: usize, j1: usize) -> f64 {
        let p = |j: usize| [x[j].x, x[j].y, x[j].z];
        let mut bones: Vec<usize> = self.incident[j0].iter().chain(&self.incident[j1]).copied().collect();
        bones.sort_unstable();
        bones.dedup();
        let mut pairs: Vec<usize> = self.incident_pairs[j0]
            .iter()
            .chain(&self.incident_pairs[j1])
            .copied()
            .collect();
        pairs.sort_unstable();
        pairs.dedup();

        let mut out = 0.0;
        for b in bones {
            let bone = &self.bones[b];
            out += self.bone(bone, p(bone.parent), p(bone.child));
        }
        for k in pairs {
            let (a, b) = self.pairs[k];
            let (ba, bb) = (&self.bones[a], &self.bones[b]);
            out += self.symmetry([p(ba.parent), p(ba.child)], [p(bb.parent), p(bb.child)]);
        }
        out
    }

    /// Gradient of [`Energy::total`], one entry per coordinate.
    fn gradient(&self, x: &[Point3<f64>]) -> DVector<f64> {
        let lift6 = |pa: &Point3<f64>, pb: &Point3<f64>| {
            let v = Deriv::<6>::variables([pa.x, pa.y, pa.z, pb.x, pb.y, pb.z]);
            ([v[0], v[1], v[2]], [v[3], v[4], v[5]])
        };
        let bone_grad = |bone: &Bone| {
            let (a, b) = lift6(&x[bone.parent], &x[bone.child]);
            (bone.parent, bone.child, *self.bone(bone, a, b).gradient())
        };
        let per_bone: Vec<_> = if self.options.parallel {
            self.bones.par_iter().map(bone_grad).collect()
        } else {
            self.bones.iter().map(bone_grad).collect()
        };

        let mut g = DVector::zeros(3 * x.len());
        for (pa, ch, d) in per_bone {
            for k in 0..3 {
                g[3 * pa + k] += d[k];
                g[3 * ch + k] += d[3 + k];
            }
        }

        for &(a, b) in &self.pairs {
            let (ba, bb) = (&self.bones[a], &self.bones[b]);
            let joints = [ba.parent, ba.child, bb.parent, bb.child];
            let mut vals = [0.0; 12];
            for (i, &j) in joints.iter().enumerate() {
                vals[3 * i] = x[j].x;
                vals[3 * i + 1] = x[j].y;
                vals[3 * i + 2] = x[j].z;
            }
            let v = Deriv::<12>::variables(vals);
            let pt = |i: usize| [v[3 * i], v[3 * i + 1], v[3 * i + 2]];
            let e = self.symmetry([pt(0), pt(1)], [pt(2), pt(3)]);
            for (i, &j) in joints.iter().enumerate() {
                for k in 0..3 {
                    g[3 * j + k] += e.gradient()[3 * i + k];
                }
            }
        }
        g
    }

    /// Gradient of [`Energy::local`] with respect to joints `j0` and `j1`.
    fn local_gradient(&self, x: &[Point3<f64>], j0: usize, j1: usize) -> [f64; 6] {
        let lift = |j: usize| -> [Deriv<6>; 3] {
            let p = x[j];
            if j == j0 {
                [0, 1, 2].map(|k| Deriv::variable(p[k], k))
            } else if j == j1 {
                [0, 1, 2].map(|k| Deriv::variable(p[k], 3 + k))
            } else {
                [0, 1, 2].map(|k| Deriv::constant(p[k]))
            }
        };

        let mut bones: Vec<usize> = self.incident[j0].iter().chain(&self.incident[j1]).copied().collect();
        bones.sort_unstable();
        bones.dedup();
        let mut pairs: Vec<usize> = self.incident_pairs[j0]
            .iter()
            .chain(&self.incident_pairs[j1])
            .copied()
            .collect();
        pairs.sort_unstable();
        pairs.dedup();

        let mut e = Deriv::<6>::constant(0.0);
        for b in bones {
            let bone = &self.bones[b];
            e += self.bone(bone, lift(bone.parent), lift(bone.child));
        }
        for k in pairs {
            let (a, b) = self.pairs[k];
            let (ba, bb) = (&self.bones[a], &self.bones[b]);
            e += self.symmetry([lift(ba.parent), lift(ba.child)], [lift(bb.parent), lift(bb.child)]);
        }
        let g = e.gradient();
        std::array::from_fn(|k| g[k])
    }
}

// ==================== Descent ====================

/// Line search along `-grad`, doubling the step after each improvement.
///
/// `apply(x, dir, step)` writes the trial point; returns the final energy.
fn line_search<F, E>(
    x: &mut Vec<Point3<f64>>,
    energy: E,
    grad: &[f64],
    start: f64,
    initial_step: f64,
    apply: F,
) -> f64
where
    E: Fn(&[Point3<f64>]) -> f64,
    F: Fn(&mut [Point3<f64>], &[f64], f64),
{
    let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
    if !norm.is_finite() || norm <= 1e-12 {
        return start;
    }
    let dir: Vec<f64> = grad.iter().map(|g| -g / norm).collect();

    let mut best = start;
    let mut step = initial_step;
    // The step doubles each time, so this bounds it far above the unit cube.
    for _ in 0..40 {
        let mut trial = x.clone();
        apply(trial.as_mut_slice(), &dir, step);
        let e = energy(trial.as_slice());
        if e.is_nan() || e >= best {
            break;
        }
        *x = trial;
        best = e;
        step *= 2.0;
    }
    best
}

/// Refines joint positions against the distance field and medial samples.
///
/// `initial` has one position per full joint, in the normalized space of
/// `field`. Returns the refined positions.
///
/// # Errors
///
/// - [`RigError::DimensionMismatch`] if `initial` does not have one entry
///   per joint
/// - [`RigError::Cancelled`] if the progress context is cancelled
pub fn refine_embedding(
    field: &DistanceField,
    medial_points: &[Point3<f64>],
    initial: &[Point3<f64>],
    skeleton: &Skeleton,
    options: &RefineOptions,
    progress: &Progress,
) -> Result<Vec<Point3<f64>>> {
    if initial.len() != skeleton.num_joints() {
        return Err(RigError::DimensionMismatch {
            expected: skeleton.num_joints(),
            actual: initial.len(),
        });
    }
    let energy = Energy::new(field, medial_points, skeleton, options);
    let mut x = initial.to_vec();
    let mut e = energy.total(&x);
    let before = e;

    for iter in 0..options.outer_iterations {
        progress.checkpoint()?;
        progress.report(iter, options.outer_iterations, "Refining embedding");

        for _ in 0..options.global_rounds {
            let g = energy.gradient(&x);
            e = line_search(
                &mut x,
                |y| energy.total(y),
                g.as_slice(),
                e,
                options.initial_step,
                |y, dir, step| {
                    for (j, p) in y.iter_mut().enumerate() {
                        for k in 0..3 {
                            p[k] += dir[3 * j + k] * step;
                        }
                    }
                },
            );
        }

        for b in 0..energy.bones.len() {
            let Bone { parent, child, .. } = energy.bones[b];
            let g = energy.local_gradient(&x, child, parent);
            let start = energy.local(&x, child, parent);
            let end = line_search(
                &mut x,
                |y| energy.local(y, child, parent),
                &g,
                start,
                options.initial_step,
                |y, dir, step| {
                    for k in 0..3 {
                        y[child][k] += dir[k] * step;
                        y[parent][k] += dir[3 + k] * step;
                    }
                },
            );
            e += end - start;
        }
    }

    debug!(before, after = energy.total(&x), "embedding refined");
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::distance::{construct_distance_field, DistanceFieldOptions};
    use crate::mesh::prepare_mesh;
    use crate::test_util::{icosphere, stick_skeleton};

    fn sphere_field() -> DistanceField {
        let mesh = prepare_mesh(&icosphere(2)).unwrap();
        let options = DistanceFieldOptions::default()
            .with_tolerance(0.01)
            .with_max_depth(6);
        construct_distance_field(&mesh, &options, &Progress::none()).unwrap()
    }

    #[test]
    fn test_projector_matches_brute_force() {
        let mut pts = Vec::new();
        for i in 0..200 {
            let t = i as f64 * 0.37;
            pts.push(Point3::new(t.sin() * 0.3 + 0.5, (t * 1.7).cos() * 0.2 + 0.5, (t * 0.3).sin() * 0.1 + 0.4));
        }
        let proj = MedialProjector::new(&pts);
        for q in [
            Point3::new(0.5, 0.5, 0.5),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.5, 0.2, 0.9),
            Point3::new(0.71, 0.33, 0.42),
        ] {
            let expected = pts
                .iter()
                .map(|p| (p - q).norm_squared())
                .fold(f64::INFINITY, f64::min);
            let got = proj.nearest(&q).unwrap();
            assert!(((got - q).norm_squared() - expected).abs() < 1e-15);
        }
        assert!(MedialProjector::new(&[]).nearest(&Point3::origin()).is_none());
    }

    #[test]
    fn test_bone_gradient_matches_finite_difference() {
        let field = sphere_field();
        let skel = stick_skeleton();
        let options = RefineOptions::default();
        let medial = [Point3::new(0.5, 0.5, 0.5), Point3::new(0.5, 0.6, 0.5)];
        let energy = Energy::new(&field, &medial, &skel, &options);

        let x = vec![Point3::new(0.48, 0.47, 0.5), Point3::new(0.55, 0.73, 0.52)];
        let g = energy.gradient(&x);
        let h = 1e-6;
        for i in 0..6 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[i / 3][i % 3] += h;
            xm[i / 3][i % 3] -= h;
            let fd = (energy.total(&xp) - energy.total(&xm)) / (2.0 * h);
            assert!((fd - g[i]).abs() < 1e-3 * (1.0 + fd.abs()), "coord {}: {} vs {}", i, fd, g[i]);
        }
    }

    #[test]
    fn test_refinement_lowers_energy_and_lifts_tip() {
        let field = sphere_field();
        let skel = stick_skeleton();
        let options = RefineOptions::default();
        let medial = [Point3::new(0.5, 0.5, 0.5)];
        let start = vec![Point3::new(0.5, 0.5, 0.5), Point3::new(0.5, 0.5, 0.5)];

        let out = refine_embedding(&field, &medial, &start, &skel, &options, &Progress::none()).unwrap();
        let energy = Energy::new(&field, &medial, &skel, &options);
        assert!(energy.total(&out) < energy.total(&start));
        assert!(out[1].y > out[0].y);
    }

    #[test]
    fn test_symmetry_term() {
        let field = sphere_field();
        let skel = crate::skeleton::Skeleton::human();
        let options = RefineOptions::default();
        let energy = Energy::new(&field, &[], &skel, &options);
        assert_eq!(energy.pairs.len(), 7);
        let a = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let b = [[0.0, 0.0, 0.0], [0.0, 3.0, 0.0]];
        assert!((energy.symmetry(a, b) - 0.25).abs() < 1e-12);
        assert_eq!(energy.symmetry(a, a), 0.0);
    }

    #[test]
    fn test_wrong_joint_count() {
        let field = sphere_field();
        let skel = stick_skeleton();
        let r = refine_embedding(
            &field,
            &[],
            &[Point3::origin()],
            &skel,
            &RefineOptions::default(),
            &Progress::none(),
        );
        assert!(matches!(r, Err(RigError::DimensionMismatch { .. })));
    }
}
