//! # Armature
//!
//! Automatic rigging of closed triangle meshes.
//!
//! Given a watertight, connected mesh and a template skeleton, armature
//! finds where each joint belongs inside the mesh and how strongly every
//! bone should pull on every vertex when the skeleton moves.
//!
//! ## Pipeline
//!
//! - **Distance field**: an adaptive octree of signed distances to the surface
//! - **Medial sampling**: inscribed spheres along the shape's medial surface,
//!   linked into a sample graph
//! - **Discrete embedding**: a best-first search matching skeleton joints to
//!   graph vertices under nine weighted penalties
//! - **Refinement**: gradient descent on joint positions with forward-mode
//!   automatic differentiation
//! - **Attachment**: bone weights from heat diffusion over the surface,
//!   solved with a sparse Cholesky factorization
//! - **Deformation**: linear blend, dual quaternion or mixed skinning
//!
//! ## Quick Start
//!
//! ```no_run
//! use armature::prelude::*;
//! use nalgebra::{UnitQuaternion, Vector3};
//!
//! # fn load() -> Mesh { unimplemented!() }
//! let mesh = load();
//! let skeleton = Skeleton::human();
//!
//! let rig = autorig(&skeleton, &mesh, &RigOptions::default()).unwrap();
//! println!("joints: {:?}", rig.embedding_in_mesh_space());
//!
//! // Bend every bone a little and pose the mesh.
//! let bend = Transform::rigid(
//!     UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.1),
//!     Vector3::zeros(),
//! );
//! let pose = vec![bend; rig.attachment.num_bones()];
//! let posed = rig.attachment.deform(&rig.mesh, &pose, SkinningMode::DualQuaternion);
//! ```
//!
//! ## Building Inputs Programmatically
//!
//! ```
//! use armature::prelude::*;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(0.0, 0.0, 1.0),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];
//! let mesh = build_from_triangles(&vertices, &faces).unwrap();
//!
//! // Meshes are normalized into the unit cube before rigging.
//! let prepared = prepare_mesh(&mesh).unwrap();
//! assert_eq!(prepared.num_vertices(), 4);
//!
//! let mut skeleton = Skeleton::new();
//! skeleton.make_joint("root", Point3::new(0.0, 0.0, 0.0), None).unwrap();
//! skeleton.make_joint("tip", Point3::new(0.0, 1.0, 0.0), Some("root")).unwrap();
//! skeleton.init_compressed().unwrap();
//! assert_eq!(skeleton.num_bones(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod autorig;
pub mod error;
pub mod graph;
pub mod io;
pub mod math;
pub mod mesh;
pub mod skeleton;

#[cfg(test)]
mod test_util;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use armature::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::attachment::{Attachment, AttachmentOptions, SkinningMode};
    pub use crate::algo::{CancelFlag, Progress};
    pub use crate::autorig::{autorig, autorig_with_progress, RigOptions, RigOutput};
    pub use crate::error::{RigError, Result};
    pub use crate::math::Transform;
    pub use crate::mesh::{build_from_triangles, prepare_mesh, Mesh, VertexId};
    pub use crate::skeleton::Skeleton;
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::test_util::{stick_skeleton, tetrahedron};

    #[test]
    fn test_prepared_tetrahedron() {
        let mesh = prepare_mesh(&tetrahedron()).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 4);
        assert_eq!(mesh.num_halfedges(), 12);
        for v in mesh.vertex_ids() {
            let p = mesh.position(v);
            assert!((0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y) && (0.0..=1.0).contains(&p.z));
            assert!((mesh.normal(v).norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_options_compose() {
        let opts = RigOptions::default().with_parallel(false);
        assert!(!opts.medial.parallel && !opts.refine.parallel && !opts.attachment.parallel);
        assert_eq!(stick_skeleton().num_bones(), 1);
    }
}
