//! Core mesh data structures.
//!
//! This module provides the half-edge mesh the rigging pipeline operates
//! on, together with its validation and normalization steps.
//!
//! # Overview
//!
//! The primary type is [`Mesh`], a closed triangle mesh stored as a
//! half-edge (doubly-connected edge list) structure. This representation
//! provides O(1) adjacency queries, which the attachment solver relies on
//! to walk one-rings in order.
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`HalfEdgeId`] - Identifies a half-edge
//! - [`FaceId`] - Identifies a face
//!
//! [`NodeId`] addresses octree cells and is generated by the same macro.
//!
//! # Construction
//!
//! ```
//! use armature::mesh::{build_from_triangles, prepare_mesh};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(0.0, 0.0, 1.0),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];
//!
//! let mesh = build_from_triangles(&vertices, &faces).unwrap();
//! let prepared = prepare_mesh(&mesh).unwrap();
//! assert!((prepared.scale() - 0.9).abs() < 1e-12);
//! ```

mod builder;
mod halfedge;
mod index;
mod prepare;

pub use builder::{build_from_triangles, to_face_vertex};
pub use halfedge::{Face, HalfEdge, Mesh, Vertex, VertexHalfEdgeIter};
pub use index::{FaceId, HalfEdgeId, NodeId, VertexId};
pub use prepare::prepare_mesh;
