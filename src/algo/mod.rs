//! Rigging algorithms.
//!
//! The pipeline stages, in the order [`autorig`](crate::autorig::autorig)
//! runs them:
//!
//! - **distance**: adaptive signed distance field and point locators
//! - **medial**: medial-surface spheres and the sample graph
//! - **embed**: discrete skeleton embedding and path splitting
//! - **refine**: continuous refinement of joint positions
//! - **attachment**: heat-diffusion skinning weights and mesh deformation
//!
//! Supporting modules: **sparse** (CSR matrices, Cholesky, least squares)
//! and **progress** (reporting and cancellation).

pub mod attachment;
pub mod distance;
pub mod embed;
pub mod medial;
pub mod progress;
pub mod refine;
pub mod sparse;

pub use progress::{CancelFlag, Progress};
