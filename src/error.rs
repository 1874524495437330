//! Error types for armature.
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias using [`RigError`].
pub type Result<T> = std::result::Result<T, RigError>;

/// Errors that can occur while building meshes, skeletons, or rigs.
#[derive(Error, Debug)]
pub enum RigError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has duplicate vertex indices (degenerate triangle).
    #[error("face {face} is degenerate (has duplicate vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// The mesh has non-manifold topology.
    #[error("mesh has non-manifold topology: {details}")]
    NonManifold {
        /// Description of the non-manifold condition.
        details: String,
    },

    /// The same directed edge appears in more than one face.
    #[error("directed edge ({v0}, {v1}) is used by more than one face")]
    NonManifoldEdge {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// The mesh is not a single connected component.
    #[error("no valid rig could be computed: mesh is not a single connected component")]
    DisconnectedMesh,

    /// The distance field could not be built for the mesh.
    #[error("no valid rig could be computed: distance field is empty")]
    EmptyDistanceField,

    /// A joint name was not found in the skeleton.
    #[error("unknown joint '{name}'")]
    UnknownJoint {
        /// The joint name.
        name: String,
    },

    /// A joint with the same name already exists.
    #[error("joint '{name}' is already defined")]
    DuplicateJoint {
        /// The joint name.
        name: String,
    },

    /// The skeleton was modified after its compressed graph was built.
    #[error("skeleton is already compressed; joints can no longer be added")]
    SkeletonFinalized,

    /// An operation needs the compressed skeleton graph.
    #[error("skeleton has not been compressed yet")]
    SkeletonNotFinalized,

    /// The discrete search exhausted every candidate without a complete match.
    #[error("no valid rig could be computed: skeleton does not embed into the sample graph")]
    NoEmbedding,

    /// The discrete search ran out of its node-expansion budget.
    #[error("no valid rig could be computed: search budget of {expansions} expansions exhausted")]
    SearchBudgetExceeded {
        /// Number of expansions performed.
        expansions: usize,
    },

    /// Skinning weights could not be computed for the embedded skeleton.
    #[error("no valid rig could be computed: skinning weights are unavailable")]
    AttachmentFailed,

    /// Sparse Cholesky factorization met a non-positive pivot.
    #[error("matrix is not positive definite (pivot {pivot} = {value})")]
    NotPositiveDefinite {
        /// Index of the failing pivot in elimination order.
        pivot: usize,
        /// The pivot value.
        value: f64,
    },

    /// Two sizes that must agree do not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The expected size.
        expected: usize,
        /// The actual size.
        actual: usize,
    },

    /// The operation was cancelled through its progress context.
    #[error("operation cancelled")]
    Cancelled,

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid state for the requested operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl RigError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        RigError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Whether this error means the mesh/skeleton pair cannot be rigged,
    /// as opposed to a usage or environment error.
    pub fn is_rig_failure(&self) -> bool {
        matches!(
            self,
            RigError::EmptyMesh
                | RigError::DisconnectedMesh
                | RigError::EmptyDistanceField
                | RigError::NoEmbedding
                | RigError::SearchBudgetExceeded { .. }
                | RigError::AttachmentFailed
                | RigError::NotPositiveDefinite { .. }
        )
    }
}
