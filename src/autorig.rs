//! The full rigging pipeline.
//!
//! [`autorig`] takes a closed mesh and a compressed skeleton and returns the
//! embedded joint positions together with per-vertex bone weights:
//!
//! 1. validate and normalize the mesh
//! 2. build the distance field
//! 3. sample the medial surface and pack spheres
//! 4. connect the spheres into a sample graph
//! 5. search for the cheapest discrete embedding
//! 6. restore the uncompressed joints along graph paths
//! 7. refine joint positions continuously
//! 8. compute skinning weights
//!
//! # Example
//!
//! ```no_run
//! use armature::prelude::*;
//!
//! # fn load() -> Mesh { unimplemented!() }
//! let mesh = load();
//! let skeleton = Skeleton::human();
//! let rig = autorig(&skeleton, &mesh, &RigOptions::default()).unwrap();
//!
//! for (i, p) in rig.embedding_in_mesh_space().iter().enumerate() {
//!     println!("{} {:?}", skeleton.joint_name(i), p);
//! }
//! ```

use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::algo::attachment::{Attachment, AttachmentOptions, FieldVisibility};
use crate::algo::distance::{construct_distance_field, DistanceFieldOptions};
use crate::algo::embed::{compute_possibilities, EmbedContext, EmbedOptions};
use crate::algo::medial::{connect_samples, pack_spheres, sample_medial_surface, MedialOptions};
use crate::algo::refine::{refine_embedding, RefineOptions};
use crate::algo::Progress;
use crate::error::{RigError, Result};
use crate::mesh::{prepare_mesh, Mesh};
use crate::skeleton::Skeleton;

/// Number of progress stages reported by [`autorig_with_progress`].
const STAGES: usize = 8;

/// Options for every stage of [`autorig`].
#[derive(Debug, Clone, Default)]
pub struct RigOptions {
    /// Distance field refinement.
    pub distance: DistanceFieldOptions,

    /// Medial sampling and sphere packing.
    pub medial: MedialOptions,

    /// Discrete embedding search.
    pub embed: EmbedOptions,

    /// Continuous refinement.
    pub refine: RefineOptions,

    /// Skinning weights.
    pub attachment: AttachmentOptions,
}

impl RigOptions {
    /// Set the distance field options.
    pub fn with_distance(mut self, distance: DistanceFieldOptions) -> Self {
        self.distance = distance;
        self
    }

    /// Set the medial sampling options.
    pub fn with_medial(mut self, medial: MedialOptions) -> Self {
        self.medial = medial;
        self
    }

    /// Set the embedding search options.
    pub fn with_embed(mut self, embed: EmbedOptions) -> Self {
        self.embed = embed;
        self
    }

    /// Set the refinement options.
    pub fn with_refine(mut self, refine: RefineOptions) -> Self {
        self.refine = refine;
        self
    }

    /// Set the attachment options.
    pub fn with_attachment(mut self, attachment: AttachmentOptions) -> Self {
        self.attachment = attachment;
        self
    }

    /// Set whether every stage may use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.medial.parallel = parallel;
        self.refine.parallel = parallel;
        self.attachment.parallel = parallel;
        self
    }
}

/// Result of [`autorig`].
#[derive(Debug, Clone)]
pub struct RigOutput {
    /// One position per full joint, in the normalized frame of `mesh`.
    pub embedding: Vec<Point3<f64>>,

    /// Joint positions of the discrete embedding, before refinement.
    pub discrete: Vec<Point3<f64>>,

    /// Bone weights for every vertex of `mesh`.
    pub attachment: Attachment,

    /// The prepared mesh. Its [`Mesh::scale`] and [`Mesh::to_add`] map the
    /// input frame onto the normalized one.
    pub mesh: Mesh,
}

impl RigOutput {
    /// The embedding mapped back into the frame of the input mesh.
    pub fn embedding_in_mesh_space(&self) -> Vec<Point3<f64>> {
        self.embedding.iter().map(|p| self.mesh.to_original(p)).collect()
    }
}

/// Rig `mesh` with `skeleton`.
///
/// See [`autorig_with_progress`].
pub fn autorig(skeleton: &Skeleton, mesh: &Mesh, options: &RigOptions) -> Result<RigOutput> {
    autorig_with_progress(skeleton, mesh, options, &Progress::none())
}

/// Rig `mesh` with `skeleton`, reporting each stage and honouring
/// cancellation between and within stages.
///
/// # Errors
///
/// - [`RigError::SkeletonNotFinalized`] if the skeleton has not been compressed
/// - [`RigError::EmptyMesh`], [`RigError::DisconnectedMesh`] or
///   [`RigError::NonManifold`] for unusable meshes
/// - [`RigError::NoEmbedding`] or [`RigError::SearchBudgetExceeded`] if the
///   skeleton cannot be matched
/// - [`RigError::AttachmentFailed`] if no skinning weights can be computed
/// - [`RigError::Cancelled`] if the progress context is cancelled
pub fn autorig_with_progress(
    skeleton: &Skeleton,
    mesh: &Mesh,
    options: &RigOptions,
    progress: &Progress,
) -> Result<RigOutput> {
    if !skeleton.is_compressed() {
        return Err(RigError::SkeletonNotFinalized);
    }
    info!(
        vertices = mesh.num_vertices(),
        faces = mesh.num_faces(),
        joints = skeleton.num_joints(),
        "rigging mesh"
    );

    progress.report(0, STAGES, "Preparing mesh");
    let mesh = prepare_mesh(mesh)?;

    progress.checkpoint()?;
    progress.report(1, STAGES, "Building distance field");
    let field = construct_distance_field(&mesh, &options.distance, progress)?;

    progress.checkpoint()?;
    progress.report(2, STAGES, "Sampling medial surface");
    let samples = sample_medial_surface(&field, &options.medial);
    let spheres = pack_spheres(&samples, options.medial.max_spheres);
    if spheres.is_empty() {
        warn!("no medial samples found");
        return Err(RigError::NoEmbedding);
    }

    progress.checkpoint()?;
    progress.report(3, STAGES, "Connecting samples");
    let graph = connect_samples(&field, &spheres);
    debug!(
        samples = samples.len(),
        spheres = spheres.len(),
        edges = graph.num_edges(),
        "sample graph"
    );

    progress.checkpoint()?;
    progress.report(4, STAGES, "Embedding skeleton");
    let possibilities = compute_possibilities(&graph, &spheres, skeleton);
    let context = EmbedContext::new(&graph, &spheres, skeleton)?;
    let matched = context.search(&possibilities, &options.embed, progress)?;

    progress.checkpoint()?;
    progress.report(5, STAGES, "Splitting paths");
    let discrete = context.split(&matched)?;

    progress.checkpoint()?;
    progress.report(6, STAGES, "Refining embedding");
    let medial_points: Vec<Point3<f64>> = spheres.iter().map(|s| s.center).collect();
    let embedding = refine_embedding(
        &field,
        &medial_points,
        &discrete,
        skeleton,
        &options.refine,
        progress,
    )?;

    progress.checkpoint()?;
    progress.report(7, STAGES, "Computing skinning weights");
    let tester = FieldVisibility::new(&field);
    let attachment = Attachment::new(&mesh, skeleton, &embedding, &tester, &options.attachment);
    if !attachment.is_valid() {
        return Err(RigError::AttachmentFailed);
    }

    progress.report(STAGES, STAGES, "Done");
    info!("rig complete");
    Ok(RigOutput {
        embedding,
        discrete,
        attachment,
        mesh,
    })
}
