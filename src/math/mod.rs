//! Geometric primitives and automatic differentiation.
//!
//! Vectors, points and quaternions come from [`nalgebra`]. This module adds
//! the pieces the rigging pipeline needs on top:
//!
//! - [`Deriv`] / [`Real`]: forward-mode dual numbers, used for distance-field
//!   gradients and for the refinement energy
//! - [`Rect3`]: axis-aligned boxes with octant numbering
//! - [`Transform`] / [`DualQuat`]: bone transforms and their dual-quaternion form

mod deriv;
mod rect;
mod transform;

pub use deriv::{vec3, Deriv, Real};
pub use rect::Rect3;
pub use transform::{
    distance_sq_to_segment, project_to_segment, smooth_interp, DualQuat, Transform,
};
