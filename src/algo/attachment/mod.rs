//! Skinning weights by heat diffusion.
//!
//! Each bone heats the vertices that see it as their closest bone, with
//! strength falling off with the squared distance. The weight of a bone at
//! every vertex is the steady state of heat diffusing over the surface:
//!
//! ```text
//! (L + H / D) w_b = (H_b / D)
//! ```
//!
//! where `L` is the cotangent Laplacian, `D` the inverse vertex area, `H`
//! the total heat at a vertex and `H_b` the part coming from bone `b`. The
//! matrix is shared by all bones, so it is factored once and solved once per
//! bone.
//!
//! Bone `b` runs from joint `b + 1` to that joint's parent.
//!
//! # Example
//!
//! ```no_run
//! use armature::algo::attachment::{Attachment, AttachmentOptions, FieldVisibility, SkinningMode};
//! # fn demo(mesh: &armature::mesh::Mesh, skeleton: &armature::skeleton::Skeleton,
//! #         joints: &[nalgebra::Point3<f64>], field: &armature::algo::distance::DistanceField) {
//! let tester = FieldVisibility::new(field);
//! let attachment = Attachment::new(mesh, skeleton, joints, &tester, &AttachmentOptions::default());
//!
//! let pose = vec![armature::math::Transform::identity(); attachment.num_bones()];
//! let posed = attachment.deform(mesh, &pose, SkinningMode::DualQuaternion);
//! # }
//! ```

mod deform;
mod visibility;

pub use deform::SkinningMode;
pub use visibility::{FieldVisibility, VisibilityTester};

use nalgebra::{DVector, Point3, Vector3};
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::algo::sparse::{CsrMatrix, LltMatrix, SpdMatrix};
use crate::error::Result;
use crate::math::{distance_sq_to_segment, project_to_segment};
use crate::mesh::{Mesh, VertexId};
use crate::skeleton::Skeleton;

/// Weights below this are dropped.
const MIN_WEIGHT: f64 = 1e-8;

/// Options for [`Attachment::new`].
#[derive(Debug, Clone)]
pub struct AttachmentOptions {
    /// Scale of the heat sources.
    pub heat_weight: f64,

    /// Whether to test visibility and solve bones in parallel (default: true).
    pub parallel: bool,
}

impl Default for AttachmentOptions {
    fn default() -> Self {
        Self {
            heat_weight: 1.0,
            parallel: true,
        }
    }
}

impl AttachmentOptions {
    /// Set the heat scale.
    pub fn with_heat_weight(mut self, heat_weight: f64) -> Self {
        self.heat_weight = heat_weight;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Per-vertex bone weights.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Non-zero `(bone, weight)` pairs per vertex, by increasing bone.
    weights: Vec<SmallVec<[(usize, f64); 4]>>,
    num_bones: usize,
    valid: bool,
}

/// Heat reaching one vertex: `(bone, heat)` for its closest visible bones.
type Heat = SmallVec<[(usize, f64); 2]>;

impl Attachment {
    /// Compute weights for `mesh` bound to `skeleton` posed at `joints`.
    ///
    /// `mesh` must have vertex normals, as after
    /// [`prepare_mesh`](crate::mesh::prepare_mesh). `joints` has one position
    /// per full joint, in the mesh's frame.
    ///
    /// When the system cannot be factored the attachment holds no weights
    /// and [`Attachment::is_valid`] is false.
    pub fn new(
        mesh: &Mesh,
        skeleton: &Skeleton,
        joints: &[Point3<f64>],
        tester: &dyn VisibilityTester,
        options: &AttachmentOptions,
    ) -> Self {
        let num_bones = skeleton.num_bones();
        let invalid = || Self {
            weights: vec![SmallVec::new(); mesh.num_vertices()],
            num_bones,
            valid: false,
        };
        if joints.len() != skeleton.num_joints() {
            warn!(
                expected = skeleton.num_joints(),
                actual = joints.len(),
                "joint count does not match skeleton"
            );
            return invalid();
        }

        // Bone b = joint b + 1 to its parent.
        let bones: Vec<(Point3<f64>, Point3<f64>)> = (1..skeleton.num_joints())
            .map(|j| {
                let parent = skeleton.full_prev()[j].unwrap_or(0);
                (joints[j], joints[parent])
            })
            .collect();

        let heat_of = |i: usize| vertex_heat(mesh, VertexId::new(i), &bones, tester, options.heat_weight);
        let heat: Vec<Heat> = if options.parallel {
            (0..mesh.num_vertices()).into_par_iter().map(heat_of).collect()
        } else {
            (0..mesh.num_vertices()).map(heat_of).collect()
        };
        let heated = heat.iter().filter(|h| !h.is_empty()).count();
        debug!(vertices = mesh.num_vertices(), heated, bones = num_bones, "bone visibility");
        if heated == 0 {
            warn!("no vertex sees a bone");
            return invalid();
        }

        let (matrix, area) = heat_system(mesh, &heat);
        let llt = match SpdMatrix::from_csr(&matrix).and_then(|m| m.factor()) {
            Ok(llt) => llt,
            Err(e) => {
                warn!(error = %e, "attachment system could not be factored");
                return invalid();
            }
        };

        let solve = |b: usize| solve_bone(&llt, &heat, &area, b);
        let solutions: Result<Vec<Vec<f64>>> = if options.parallel {
            (0..num_bones).into_par_iter().map(solve).collect()
        } else {
            (0..num_bones).map(solve).collect()
        };
        let solutions = match solutions {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "attachment solve failed");
                return invalid();
            }
        };

        let weights = (0..mesh.num_vertices())
            .map(|i| {
                let mut w: SmallVec<[(usize, f64); 4]> = solutions
                    .iter()
                    .enumerate()
                    .map(|(b, s)| (b, s[i].min(1.0)))
                    .filter(|&(_, x)| x > MIN_WEIGHT)
                    .collect();
                let sum: f64 = w.iter().map(|&(_, x)| x).sum();
                if sum > 0.0 {
                    for (_, x) in &mut w {
                        *x /= sum;
                    }
                }
                w
            })
            .collect();

        Self {
            weights,
            num_bones,
            valid: true,
        }
    }

    /// Whether the weights were computed.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Number of bones.
    pub fn num_bones(&self) -> usize {
        self.num_bones
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.weights.len()
    }

    /// Dense weights of vertex `v`, one entry per bone.
    pub fn weights(&self, v: usize) -> DVector<f64> {
        let mut out = DVector::zeros(self.num_bones);
        for &(b, w) in &self.weights[v] {
            out[b] = w;
        }
        out
    }

    /// Non-zero `(bone, weight)` pairs of vertex `v`, by increasing bone.
    pub fn nonzero_weights(&self, v: usize) -> &[(usize, f64)] {
        &self.weights[v]
    }
}

/// Heat from the closest visible bones at vertex `v`.
fn vertex_heat(
    mesh: &Mesh,
    v: VertexId,
    bones: &[(Point3<f64>, Point3<f64>)],
    tester: &dyn VisibilityTester,
    heat_weight: f64,
) -> Heat {
    let pos = mesh.position(v);
    let normal = mesh.normal(v);
    let dists: Vec<f64> = bones
        .iter()
        .map(|(a, b)| distance_sq_to_segment(pos, a, b).sqrt())
        .collect();
    let Some(min_dist) = dists.iter().copied().reduce(f64::min) else {
        return Heat::new();
    };

    // Ties within a relative 1e-4 all count.
    let visible: SmallVec<[usize; 4]> = (0..bones.len())
        .filter(|&b| dists[b] <= min_dist * 1.0001)
        .filter(|&b| {
            let (a, c) = &bones[b];
            let p = project_to_segment(pos, a, c);
            let dir: Vector3<f64> = pos - p;
            let facing = dir
                .try_normalize(1e-300)
                .is_some_and(|d| d.dot(normal) > 0.5);
            facing && tester.can_see(pos, &p)
        })
        .collect();

    let Some(min_visible) = visible.iter().map(|&b| dists[b]).reduce(f64::min) else {
        return Heat::new();
    };
    visible
        .into_iter()
        .filter(|&b| dists[b] <= min_visible * 1.00001)
        .map(|b| (b, heat_weight / (1e-8 + dists[b]).powi(2)))
        .collect()
}

/// Assemble `L + H / D`. Also returns `1 / D` per vertex.
fn heat_system(mesh: &Mesh, heat: &[Heat]) -> (CsrMatrix, Vec<f64>) {
    let n = mesh.num_vertices();
    let mut triplets = Vec::new();
    let mut area = vec![0.0; n];

    for i in 0..n {
        let v = VertexId::new(i);
        let pos = *mesh.position(v);
        let ring = mesh.one_ring(v);
        let m = ring.len();

        let mut total_area = 0.0;
        let mut diag = 0.0;
        for k in 0..m {
            let prev = *mesh.position(ring[(k + m - 1) % m]);
            let cur = *mesh.position(ring[k]);
            let next = *mesh.position(ring[(k + 1) % m]);

            total_area += (cur - pos).cross(&(next - pos)).norm();

            // Opposite angles at `prev` and `next` across edge (v, cur).
            let cot_prev = {
                let a = pos - prev;
                let b = cur - prev;
                a.dot(&b) / (1e-6 + a.cross(&b).norm())
            };
            let cot_next = {
                let a = pos - next;
                let b = cur - next;
                a.dot(&b) / (1e-6 + a.cross(&b).norm())
            };
            let w = cot_prev + cot_next;
            diag += w;

            let j = ring[k].index();
            if j < i {
                triplets.push((i, j, -w));
            }
        }

        let d = 1.0 / (1e-10 + total_area);
        area[i] = 1.0 / d;
        let h: f64 = heat[i].iter().map(|&(_, x)| x).sum();
        triplets.push((i, i, diag + h / d));
    }

    (CsrMatrix::from_triplets(n, n, triplets), area)
}

fn solve_bone(llt: &LltMatrix, heat: &[Heat], area: &[f64], bone: usize) -> Result<Vec<f64>> {
    let mut rhs: Vec<f64> = heat
        .iter()
        .zip(area)
        .map(|(h, &a)| {
            h.iter()
                .find(|&&(b, _)| b == bone)
                .map_or(0.0, |&(_, x)| x * a)
        })
        .collect();
    llt.solve(&mut rhs)?;
    Ok(rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Transform;
    use crate::mesh::prepare_mesh;
    use crate::test_util::{elbow_skeleton, icosphere, stick_skeleton, two_disjoint_triangles};

    struct SeeAll;

    impl VisibilityTester for SeeAll {
        fn can_see(&self, _: &Point3<f64>, _: &Point3<f64>) -> bool {
            true
        }
    }

    struct SeeNothing;

    impl VisibilityTester for SeeNothing {
        fn can_see(&self, _: &Point3<f64>, _: &Point3<f64>) -> bool {
            false
        }
    }

    fn sphere() -> Mesh {
        prepare_mesh(&icosphere(2)).unwrap()
    }

    fn elbow_joints() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.5, 0.2, 0.5),
            Point3::new(0.5, 0.5, 0.5),
            Point3::new(0.7, 0.75, 0.5),
        ]
    }

    #[test]
    fn test_weights_are_partition_of_unity() {
        let mesh = sphere();
        let skel = elbow_skeleton();
        let att = Attachment::new(&mesh, &skel, &elbow_joints(), &SeeAll, &AttachmentOptions::default());
        assert!(att.is_valid());
        assert_eq!(att.num_bones(), 2);
        assert_eq!(att.num_vertices(), mesh.num_vertices());
        for v in 0..mesh.num_vertices() {
            let w = att.weights(v);
            assert!((w.sum() - 1.0).abs() < 1e-9, "vertex {} sums to {}", v, w.sum());
            assert!(w.iter().all(|&x| (0.0..=1.0).contains(&x)));
            assert!(att.nonzero_weights(v).iter().all(|&(_, x)| x > MIN_WEIGHT));
        }
    }

    #[test]
    fn test_nearest_bone_dominates() {
        let mesh = sphere();
        let skel = elbow_skeleton();
        let att = Attachment::new(&mesh, &skel, &elbow_joints(), &SeeAll, &AttachmentOptions::default());

        // Bone 0 is the lower segment, bone 1 the upper one.
        let lowest = (0..mesh.num_vertices())
            .min_by(|&a, &b| mesh.position(VertexId::new(a)).y.total_cmp(&mesh.position(VertexId::new(b)).y))
            .unwrap();
        // Furthest out along the upper bone.
        let joints = elbow_joints();
        let up = (joints[2] - joints[1]).normalize();
        let reach = |v: usize| (mesh.position(VertexId::new(v)) - joints[1]).dot(&up);
        let highest = (0..mesh.num_vertices())
            .max_by(|&a, &b| reach(a).total_cmp(&reach(b)))
            .unwrap();
        assert!(att.weights(lowest)[0] > 0.9);
        assert!(att.weights(highest)[1] > 0.9);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let mesh = sphere();
        let skel = elbow_skeleton();
        let par = Attachment::new(&mesh, &skel, &elbow_joints(), &SeeAll, &AttachmentOptions::default());
        let ser = Attachment::new(
            &mesh,
            &skel,
            &elbow_joints(),
            &SeeAll,
            &AttachmentOptions::default().with_parallel(false),
        );
        for v in 0..mesh.num_vertices() {
            assert_eq!(par.nonzero_weights(v), ser.nonzero_weights(v));
        }
    }

    #[test]
    fn test_single_bone_gets_everything() {
        let mesh = sphere();
        let skel = stick_skeleton();
        let joints = [Point3::new(0.5, 0.45, 0.5), Point3::new(0.5, 0.7, 0.5)];
        let att = Attachment::new(&mesh, &skel, &joints, &SeeAll, &AttachmentOptions::default());
        for v in 0..mesh.num_vertices() {
            assert_eq!(att.nonzero_weights(v).len(), 1);
            assert!((att.weights(v)[0] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_no_heat_is_invalid() {
        let mesh = sphere();
        let skel = stick_skeleton();
        let joints = [Point3::new(0.5, 0.45, 0.5), Point3::new(0.5, 0.7, 0.5)];
        let att = Attachment::new(&mesh, &skel, &joints, &SeeNothing, &AttachmentOptions::default());
        assert!(!att.is_valid());
        assert!(att.weights(0).iter().all(|&x| x == 0.0));

        // Deforming with an invalid attachment leaves the mesh alone.
        let t = vec![Transform::translation(Vector3::new(1.0, 0.0, 0.0))];
        let out = att.deform(&mesh, &t, SkinningMode::LinearBlend);
        assert_eq!(out.position(VertexId::new(0)), mesh.position(VertexId::new(0)));
    }

    #[test]
    fn test_wrong_joint_count_is_invalid() {
        let mesh = two_disjoint_triangles();
        let skel = stick_skeleton();
        let att = Attachment::new(&mesh, &skel, &[Point3::origin()], &SeeAll, &AttachmentOptions::default());
        assert!(!att.is_valid());
    }
}
