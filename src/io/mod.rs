//! Plain-text rig output.
//!
//! Two line-oriented formats are written:
//!
//! | File | One line per | Contents |
//! |------|--------------|----------|
//! | skeleton | joint | `index x y z parent` (`-1` for the root) |
//! | attachment | vertex | one weight per bone, rounded to 4 decimals |
//!
//! # Usage
//!
//! ```no_run
//! use armature::prelude::*;
//!
//! # fn run(mesh: &Mesh) -> armature::error::Result<()> {
//! let skeleton = Skeleton::human();
//! let rig = autorig(&skeleton, mesh, &RigOptions::default())?;
//!
//! armature::io::save_skeleton(&rig.embedding_in_mesh_space(), &skeleton, "skeleton.out")?;
//! armature::io::save_attachment(&rig.attachment, rig.mesh.num_vertices(), "attachment.out")?;
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;

use crate::algo::attachment::Attachment;
use crate::error::{RigError, Result};
use crate::skeleton::Skeleton;

/// Write one `index x y z parent` line per joint.
///
/// # Errors
/// - [`RigError::DimensionMismatch`] if `joints` does not have one entry per
///   skeleton joint
/// - [`RigError::Io`] if writing fails
pub fn write_skeleton<W: Write>(mut out: W, joints: &[Point3<f64>], skeleton: &Skeleton) -> Result<()> {
    if joints.len() != skeleton.num_joints() {
        return Err(RigError::DimensionMismatch {
            expected: skeleton.num_joints(),
            actual: joints.len(),
        });
    }
    for (i, (p, prev)) in joints.iter().zip(skeleton.full_prev()).enumerate() {
        let parent = prev.map_or(-1, |p| p as i64);
        writeln!(out, "{} {} {} {} {}", i, p.x, p.y, p.z, parent)?;
    }
    out.flush()?;
    Ok(())
}

/// Write one line of bone weights per vertex.
///
/// Every weight is rounded to four decimals and followed by a space.
///
/// # Errors
/// - [`RigError::DimensionMismatch`] if the attachment covers fewer than
///   `num_vertices` vertices
/// - [`RigError::Io`] if writing fails
pub fn write_attachment<W: Write>(mut out: W, attachment: &Attachment, num_vertices: usize) -> Result<()> {
    if num_vertices > attachment.num_vertices() {
        return Err(RigError::DimensionMismatch {
            expected: attachment.num_vertices(),
            actual: num_vertices,
        });
    }
    for v in 0..num_vertices {
        for w in attachment.weights(v).iter() {
            write!(out, "{} ", round_weight(*w))?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Save a skeleton embedding to a file. See [`write_skeleton`].
pub fn save_skeleton<P: AsRef<Path>>(joints: &[Point3<f64>], skeleton: &Skeleton, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_skeleton(BufWriter::new(file), joints, skeleton)
}

/// Save skinning weights to a file. See [`write_attachment`].
pub fn save_attachment<P: AsRef<Path>>(attachment: &Attachment, num_vertices: usize, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_attachment(BufWriter::new(file), attachment, num_vertices)
}

fn round_weight(w: f64) -> f64 {
    (0.5 + w * 10000.0).floor() / 10000.0
}
