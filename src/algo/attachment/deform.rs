//! Posing a mesh with per-bone rigid transforms.

use nalgebra::Point3;

use super::Attachment;
use crate::math::{DualQuat, Transform};
use crate::mesh::{Mesh, VertexId};

/// How bone transforms are blended at a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SkinningMode {
    /// Weighted sum of the transformed positions.
    #[default]
    LinearBlend,

    /// Weighted sum of unit dual quaternions, normalized before use.
    DualQuaternion,

    /// `(1 - blend) * linear + blend * dual quaternion`.
    Mixed {
        /// Share of the dual-quaternion result, in `[0, 1]`.
        blend: f64,
    },
}

impl Attachment {
    /// Pose `mesh` with one transform per bone.
    ///
    /// Returns an unchanged copy when the attachment is invalid or the
    /// vertex or transform counts do not match. Vertices without weights
    /// keep their position. Normals are recomputed.
    pub fn deform(&self, mesh: &Mesh, transforms: &[Transform], mode: SkinningMode) -> Mesh {
        let mut out = mesh.clone();
        if !self.is_valid() || mesh.num_vertices() != self.num_vertices() || transforms.len() != self.num_bones() {
            return out;
        }

        let quats: Vec<DualQuat> = match mode {
            SkinningMode::LinearBlend => Vec::new(),
            _ => transforms.iter().map(Transform::to_dual_quaternion).collect(),
        };

        for i in 0..mesh.num_vertices() {
            let v = VertexId::new(i);
            let weights = self.nonzero_weights(i);
            if weights.is_empty() {
                continue;
            }
            let p = mesh.position(v);
            let posed = match mode {
                SkinningMode::LinearBlend => linear_blend(p, weights, transforms),
                SkinningMode::DualQuaternion => dual_quaternion(p, weights, &quats),
                SkinningMode::Mixed { blend } => {
                    let lbs = linear_blend(p, weights, transforms);
                    let dqs = dual_quaternion(p, weights, &quats);
                    Point3::from(lbs.coords * (1.0 - blend) + dqs.coords * blend)
                }
            };
            out.set_position(v, posed);
        }
        out.compute_vertex_normals();
        out
    }
}

fn linear_blend(p: &Point3<f64>, weights: &[(usize, f64)], transforms: &[Transform]) -> Point3<f64> {
    let sum = weights
        .iter()
        .fold(nalgebra::Vector3::zeros(), |acc, &(b, w)| acc + transforms[b].apply(p).coords * w);
    Point3::from(sum)
}

fn dual_quaternion(p: &Point3<f64>, weights: &[(usize, f64)], quats: &[DualQuat]) -> Point3<f64> {
    let first = &quats[weights[0].0];
    let blended = weights.iter().fold(DualQuat::zero(), |acc, &(b, w)| {
        let q = &quats[b];
        // Take the shorter way around relative to the first bone.
        let w = if q.real_dot(first) < 0.0 { -w } else { w };
        acc.add_scaled(q, w)
    });
    blended.transform_point(p).unwrap_or(*p)
}
