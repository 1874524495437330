//! Shared fixtures for unit tests.

use std::collections::HashMap;

use nalgebra::Point3;

use crate::mesh::{build_from_triangles, Mesh};
use crate::skeleton::Skeleton;

/// Unit tetrahedron with outward-facing triangles.
pub fn tetrahedron() -> Mesh {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
    ];
    let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Two triangles that share nothing.
pub fn two_disjoint_triangles() -> Mesh {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(3.0, 0.0, 0.0),
        Point3::new(4.0, 0.0, 0.0),
        Point3::new(3.0, 1.0, 0.0),
    ];
    let faces = vec![[0, 1, 2], [3, 4, 5]];
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Unit sphere around the origin: an icosahedron split `subdivisions` times.
pub fn icosphere(subdivisions: usize) -> Mesh {
    let (vertices, faces) = icosphere_lists(subdivisions);
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Face-vertex lists of [`icosphere`].
pub fn icosphere_lists(subdivisions: usize) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let t = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let mut vertices: Vec<Point3<f64>> = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .iter()
    .map(|p| Point3::from(Point3::new(p[0], p[1], p[2]).coords.normalize()))
    .collect();

    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Point3<f64>>| {
            *midpoints.entry((a.min(b), a.max(b))).or_insert_with(|| {
                let m = nalgebra::center(&vertices[a], &vertices[b]);
                vertices.push(Point3::from(m.coords.normalize()));
                vertices.len() - 1
            })
        };
        let mut next = Vec::with_capacity(faces.len() * 4);
        for [a, b, c] in faces {
            let ab = midpoint(a, b, &mut vertices);
            let bc = midpoint(b, c, &mut vertices);
            let ca = midpoint(c, a, &mut vertices);
            next.push([a, ab, ca]);
            next.push([b, bc, ab]);
            next.push([c, ca, bc]);
            next.push([ab, bc, ca]);
        }
        faces = next;
    }

    (vertices, faces)
}

/// A two-joint skeleton pointing up +Y.
pub fn stick_skeleton() -> Skeleton {
    let mut s = Skeleton::new();
    s.make_joint("base", Point3::new(0.0, 0.0, 0.0), None).unwrap();
    s.make_joint("tip", Point3::new(0.0, 0.5, 0.0), Some("base")).unwrap();
    s.init_compressed().unwrap();
    s
}

/// A three-joint skeleton bent at the middle joint.
pub fn elbow_skeleton() -> Skeleton {
    let mut s = Skeleton::new();
    s.make_joint("base", Point3::new(0.0, 0.0, 0.0), None).unwrap();
    s.make_joint("mid", Point3::new(0.0, 0.5, 0.0), Some("base")).unwrap();
    s.make_joint("tip", Point3::new(0.3, 0.9, 0.0), Some("mid")).unwrap();
    s.init_compressed().unwrap();
    s
}
