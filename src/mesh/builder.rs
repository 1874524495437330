//! Mesh construction utilities.
//!
//! This module builds half-edge meshes from face-vertex lists, the layout
//! every interchange format ultimately reduces to.

use std::collections::HashMap;

use nalgebra::Point3;

use super::halfedge::{Face, HalfEdge, Mesh};
use super::index::{FaceId, HalfEdgeId, VertexId};
use crate::error::{RigError, Result};

/// Build a half-edge mesh from vertices and triangle faces.
///
/// Twins are linked in half-edge order, so the same input always produces
/// the same connectivity. Vertex normals are computed before returning.
///
/// # Arguments
/// * `vertices` - List of vertex positions
/// * `faces` - List of triangle faces, each as [v0, v1, v2] indices
///
/// # Errors
/// - [`RigError::EmptyMesh`] if `faces` is empty
/// - [`RigError::InvalidVertexIndex`] / [`RigError::DegenerateFace`] for bad faces
/// - [`RigError::NonManifoldEdge`] if a directed edge is used twice
///
/// # Example
/// ```
/// use armature::mesh::build_from_triangles;
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_faces(), 1);
/// ```
pub fn build_from_triangles(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<Mesh> {
    if faces.is_empty() {
        return Err(RigError::EmptyMesh);
    }

    // Validate vertex indices
    for (fi, face) in faces.iter().enumerate() {
        for &vi in face {
            if vi >= vertices.len() {
                return Err(RigError::InvalidVertexIndex { face: fi, vertex: vi });
            }
        }
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return Err(RigError::DegenerateFace { face: fi });
        }
    }

    let mut mesh = Mesh::with_capacity(vertices.len(), faces.len());

    let vertex_ids: Vec<VertexId> = vertices.iter().map(|&pos| mesh.add_vertex(pos)).collect();

    // Map from directed edge (v0, v1) to half-edge ID
    let mut edge_map: HashMap<(usize, usize), HalfEdgeId> = HashMap::with_capacity(faces.len() * 3);

    // First pass: create all half-edges and faces
    for face in faces {
        let base = mesh.num_halfedges();
        let face_id = FaceId::new(mesh.num_faces());
        mesh.faces.push(Face {
            halfedge: HalfEdgeId::new(base),
        });

        for k in 0..3 {
            let he = HalfEdgeId::new(base + k);
            mesh.halfedges.push(HalfEdge {
                origin: vertex_ids[face[k]],
                twin: HalfEdgeId::invalid(),
                next: HalfEdgeId::new(base + (k + 1) % 3),
                prev: HalfEdgeId::new(base + (k + 2) % 3),
                face: face_id,
            });

            // Set vertex half-edges (will be overwritten for shared vertices)
            mesh.vertex_mut(vertex_ids[face[k]]).halfedge = he;

            let key = (face[k], face[(k + 1) % 3]);
            if edge_map.insert(key, he).is_some() {
                return Err(RigError::NonManifoldEdge {
                    v0: key.0,
                    v1: key.1,
                });
            }
        }
    }

    // Second pass: link twins, walking half-edges in index order
    let num_interior = mesh.num_halfedges();
    for i in 0..num_interior {
        let he = HalfEdgeId::new(i);
        let v0 = mesh.origin(he).index();
        let v1 = mesh.dest(he).index();
        if let Some(&twin) = edge_map.get(&(v1, v0)) {
            mesh.halfedge_mut(he).twin = twin;
        } else {
            // Boundary edge - create boundary half-edge
            let boundary_he = HalfEdgeId::new(mesh.num_halfedges());
            mesh.halfedges.push(HalfEdge {
                origin: vertex_ids[v1],
                twin: he,
                ..HalfEdge::default()
            });
            mesh.halfedge_mut(he).twin = boundary_he;
        }
    }

    link_boundary_loops(&mut mesh, num_interior);
    fix_boundary_vertex_halfedges(&mut mesh);
    mesh.compute_vertex_normals();

    Ok(mesh)
}

/// Link boundary half-edges into loops.
fn link_boundary_loops(mesh: &mut Mesh, first_boundary: usize) {
    let boundary_hes: Vec<HalfEdgeId> = (first_boundary..mesh.num_halfedges())
        .map(HalfEdgeId::new)
        .collect();

    // Group by origin vertex for quick lookup
    let mut outgoing: HashMap<usize, HalfEdgeId> = HashMap::new();
    for &he in &boundary_hes {
        outgoing.entry(mesh.origin(he).index()).or_insert(he);
    }

    for &he in &boundary_hes {
        // The destination of a boundary half-edge is the origin of its twin.
        let dest = mesh.origin(mesh.twin(he)).index();
        if let Some(&next_he) = outgoing.get(&dest) {
            mesh.halfedge_mut(he).next = next_he;
            mesh.halfedge_mut(next_he).prev = he;
        }
    }
}

/// Ensure boundary vertices point to a boundary half-edge.
fn fix_boundary_vertex_halfedges(mesh: &mut Mesh) {
    for vid in mesh.vertex_ids().collect::<Vec<_>>() {
        let boundary = mesh
            .vertex_halfedges(vid)
            .find(|&he| mesh.is_boundary_halfedge(he));
        if let Some(he) = boundary {
            mesh.vertex_mut(vid).halfedge = he;
        }
    }
}

/// Convert a half-edge mesh back to a face-vertex representation.
///
/// Returns (vertices, faces) tuple.
pub fn to_face_vertex(mesh: &Mesh) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let vertices: Vec<Point3<f64>> = mesh.vertex_ids().map(|v| *mesh.position(v)).collect();

    let faces: Vec<[usize; 3]> = mesh
        .face_ids()
        .map(|f| {
            let [v0, v1, v2] = mesh.face_triangle(f);
            [v0.index(), v1.index(), v2.index()]
        })
        .collect();

    (vertices, faces)
}
