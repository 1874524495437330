//! Validation, repair and normalization of input meshes.
//!
//! Everything downstream of [`prepare_mesh`] works in a normalized frame
//! where the mesh fits inside the unit cube with a 5% margin on its longest
//! axis. The similarity used is stored on the mesh itself.

use std::collections::{HashMap, HashSet, VecDeque};

use nalgebra::{Point3, Vector3};
use tracing::{debug, warn};

use super::builder::{build_from_triangles, to_face_vertex};
use super::halfedge::Mesh;
use super::index::VertexId;
use crate::error::{RigError, Result};

impl Mesh {
    /// Recompute vertex normals as the normalized sum of incident unit face normals.
    pub fn compute_vertex_normals(&mut self) {
        let mut sums = vec![Vector3::zeros(); self.num_vertices()];
        for f in self.face_ids() {
            let n = self.face_normal(f);
            for v in self.face_triangle(f) {
                sums[v.index()] += n;
            }
        }
        for (vertex, sum) in self.vertices.iter_mut().zip(sums) {
            vertex.normal = sum.try_normalize(1e-300).unwrap_or_else(Vector3::zeros);
        }
    }

    /// Fit the mesh into the unit cube.
    ///
    /// The longest bounding-box extent becomes 0.9 and the box centre moves
    /// to `(0.5, 0.5, 0.5)`. The applied similarity is folded into
    /// [`Mesh::scale`] and [`Mesh::to_add`].
    pub fn normalize_bounding_box(&mut self) {
        let Some((min, max)) = self.bounding_box() else {
            return;
        };
        let extent = (max - min).max();
        if extent <= 0.0 {
            return;
        }
        let scale = 0.9 / extent;
        let center = nalgebra::center(&min, &max);
        let to_add = Vector3::new(0.5, 0.5, 0.5) - center.coords * scale;

        for vertex in &mut self.vertices {
            vertex.position = Point3::from(vertex.position.coords * scale + to_add);
        }

        self.scale *= scale;
        self.to_add = self.to_add * scale + to_add;
    }

    /// Map a point from the normalized frame back to the input frame.
    pub fn to_original(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from((p.coords - self.to_add) / self.scale)
    }

    /// Map a point from the input frame into the normalized frame.
    pub fn to_normalized(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(p.coords * self.scale + self.to_add)
    }

    /// Whether every vertex can be reached from vertex 0 along edges.
    pub fn is_connected(&self) -> bool {
        if self.num_vertices() == 0 {
            return true;
        }

        let mut seen = vec![false; self.num_vertices()];
        let mut queue = VecDeque::new();
        seen[0] = true;
        queue.push_back(VertexId::new(0));
        let mut count = 1;

        while let Some(v) = queue.pop_front() {
            for w in self.vertex_neighbors(v) {
                if !seen[w.index()] {
                    seen[w.index()] = true;
                    count += 1;
                    queue.push_back(w);
                }
            }
        }

        count == self.num_vertices()
    }

    /// Verify that the mesh is a closed, consistently linked triangle manifold.
    ///
    /// # Errors
    /// Returns [`RigError::NonManifold`] describing the first violation found.
    pub fn integrity_check(&self) -> Result<()> {
        let fail = |details: String| Err(RigError::NonManifold { details });

        for f in self.face_ids() {
            let he = self.face(f).halfedge;
            if self.next(self.next(self.next(he))) != he {
                return fail(format!("face {} is not a triangle", f.index()));
            }
        }

        let mut outgoing_count = vec![0usize; self.num_vertices()];
        for he in self.halfedge_ids() {
            let data = self.halfedge(he);
            if data.is_boundary() {
                return fail(format!("half-edge {} lies on a boundary", he.index()));
            }
            if !data.twin.is_valid() || self.twin(data.twin) != he {
                return fail(format!("half-edge {} has an asymmetric twin", he.index()));
            }
            if self.origin(data.twin) != self.dest(he) || self.dest(data.twin) != data.origin {
                return fail(format!("half-edge {} and its twin disagree on endpoints", he.index()));
            }
            outgoing_count[data.origin.index()] += 1;
        }

        for v in self.vertex_ids() {
            let he = self.vertex(v).halfedge;
            if !he.is_valid() || self.origin(he) != v {
                return fail(format!("vertex {} has a bad half-edge pointer", v.index()));
            }
            let fan = self.vertex_halfedges(v).count();
            if fan != outgoing_count[v.index()] {
                return fail(format!(
                    "vertex {} has {} outgoing half-edges but its fan has {}",
                    v.index(),
                    outgoing_count[v.index()],
                    fan
                ));
            }
        }

        Ok(())
    }

    /// Remove pairs of faces over the same three vertices, then drop any
    /// vertices no face references, and rebuild connectivity.
    ///
    /// Returns the number of faces removed.
    pub fn fix_dup_faces(&mut self) -> Result<usize> {
        let (positions, faces) = to_face_vertex(self);

        let mut by_key: HashMap<[usize; 3], Vec<usize>> = HashMap::new();
        for (i, face) in faces.iter().enumerate() {
            let mut key = *face;
            key.sort_unstable();
            by_key.entry(key).or_default().push(i);
        }

        let mut removed = HashSet::new();
        for indices in by_key.values() {
            // Faces cancel in pairs; an odd one out survives.
            for pair in indices.chunks_exact(2) {
                removed.insert(pair[0]);
                removed.insert(pair[1]);
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }

        let kept: Vec<[usize; 3]> = faces
            .iter()
            .enumerate()
            .filter(|(i, _)| !removed.contains(i))
            .map(|(_, f)| *f)
            .collect();

        let mut remap = vec![usize::MAX; positions.len()];
        let mut new_positions = Vec::new();
        for face in &kept {
            for &v in face {
                if remap[v] == usize::MAX {
                    remap[v] = new_positions.len();
                    new_positions.push(positions[v]);
                }
            }
        }
        let new_faces: Vec<[usize; 3]> = kept
            .iter()
            .map(|f| [remap[f[0]], remap[f[1]], remap[f[2]]])
            .collect();

        let mut rebuilt = build_from_triangles(&new_positions, &new_faces)?;
        rebuilt.scale = self.scale;
        rebuilt.to_add = self.to_add;
        *self = rebuilt;

        debug!(removed = removed.len(), "removed duplicate faces");
        Ok(removed.len())
    }
}

/// Validate a mesh and bring it into the normalized rigging frame.
///
/// The input is left untouched; the returned mesh has fresh normals and
/// carries the normalizing similarity.
///
/// # Errors
/// - [`RigError::EmptyMesh`] if the mesh has no faces
/// - [`RigError::DisconnectedMesh`] if it has more than one component
/// - [`RigError::NonManifold`] if it is not a closed manifold
pub fn prepare_mesh(mesh: &Mesh) -> Result<Mesh> {
    if mesh.is_empty() {
        warn!("mesh has no faces");
        return Err(RigError::EmptyMesh);
    }
    if !mesh.is_connected() {
        warn!("mesh is not connected");
        return Err(RigError::DisconnectedMesh);
    }
    mesh.integrity_check()?;

    let mut prepared = mesh.clone();
    prepared.compute_vertex_normals();
    prepared.normalize_bounding_box();

    debug!(
        vertices = prepared.num_vertices(),
        faces = prepared.num_faces(),
        scale = prepared.scale(),
        "prepared mesh"
    );
    Ok(prepared)
}
