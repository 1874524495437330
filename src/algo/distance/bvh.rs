//! Bounding volume hierarchy over mesh triangles.
//!
//! Answers the two queries the signed distance needs: the closest point on
//! the surface, and the number of surface crossings along a ray.

use nalgebra::{Point3, Vector3};
use smallvec::SmallVec;

use crate::math::Rect3;
use crate::mesh::Mesh;

/// Triangles per leaf.
const MAX_LEAF_SIZE: usize = 8;

/// Subtrees at least this large are built on the rayon pool.
const PARALLEL_THRESHOLD: usize = 4096;

/// BVH node containing either leaf triangles or child nodes.
#[derive(Debug)]
enum BvhNode {
    Leaf {
        bbox: Rect3,
        triangles: SmallVec<[u32; 8]>,
    },
    Internal {
        bbox: Rect3,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn bbox(&self) -> &Rect3 {
        match self {
            Self::Leaf { bbox, .. } | Self::Internal { bbox, .. } => bbox,
        }
    }
}

/// Triangle BVH with median splits on the longest axis.
#[derive(Debug)]
pub struct Bvh {
    triangles: Vec<[Point3<f64>; 3]>,
    root: Option<BvhNode>,
}

impl Bvh {
    /// Build over every face of `mesh`.
    pub fn build(mesh: &Mesh) -> Self {
        let triangles: Vec<[Point3<f64>; 3]> =
            mesh.face_ids().map(|f| mesh.face_positions(f)).collect();
        Self::from_triangles(triangles)
    }

    /// Build over a triangle soup.
    pub fn from_triangles(triangles: Vec<[Point3<f64>; 3]>) -> Self {
        if triangles.is_empty() {
            return Self {
                triangles,
                root: None,
            };
        }

        let boxes: Vec<(u32, Rect3)> = triangles
            .iter()
            .enumerate()
            .map(|(i, tri)| {
                let mut b = Rect3::empty();
                tri.iter().for_each(|p| b.expand(p));
                (i as u32, b)
            })
            .collect();

        let indices: Vec<usize> = (0..boxes.len()).collect();
        let root = build_recursive(&boxes, indices);
        Self {
            triangles,
            root: Some(root),
        }
    }

    /// Number of triangles indexed.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// The closest surface point to `p` and its squared distance.
    ///
    /// `None` for an empty hierarchy.
    pub fn closest_point(&self, p: &Point3<f64>) -> Option<(Point3<f64>, f64)> {
        let root = self.root.as_ref()?;
        let mut best = (Point3::origin(), f64::INFINITY);
        self.closest_recursive(root, p, &mut best);
        Some(best)
    }

    fn closest_recursive(&self, node: &BvhNode, p: &Point3<f64>, best: &mut (Point3<f64>, f64)) {
        if node.bbox().distance_sq_to(p) >= best.1 {
            return;
        }
        match node {
            BvhNode::Leaf { triangles, .. } => {
                for &t in triangles {
                    let [a, b, c] = &self.triangles[t as usize];
                    let q = closest_point_on_triangle(p, a, b, c);
                    let d = (q - p).norm_squared();
                    if d < best.1 {
                        *best = (q, d);
                    }
                }
            }
            BvhNode::Internal { left, right, .. } => {
                // Descend into the nearer child first to tighten the bound.
                let dl = left.bbox().distance_sq_to(p);
                let dr = right.bbox().distance_sq_to(p);
                let (first, second) = if dl <= dr { (left, right) } else { (right, left) };
                self.closest_recursive(first, p, best);
                self.closest_recursive(second, p, best);
            }
        }
    }

    /// Number of triangles hit by the ray `origin + t * dir`, `t > 0`.
    pub fn count_ray_crossings(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> usize {
        let Some(root) = self.root.as_ref() else {
            return 0;
        };
        let inv = Vector3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);
        let mut count = 0;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !ray_hits_box(origin, &inv, node.bbox()) {
                continue;
            }
            match node {
                BvhNode::Leaf { triangles, .. } => {
                    for &t in triangles {
                        let [a, b, c] = &self.triangles[t as usize];
                        if ray_triangle_intersect(origin, dir, a, b, c).is_some() {
                            count += 1;
                        }
                    }
                }
                BvhNode::Internal { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        count
    }
}

fn build_recursive(boxes: &[(u32, Rect3)], indices: Vec<usize>) -> BvhNode {
    let mut bbox = Rect3::empty();
    for &i in &indices {
        bbox.union(&boxes[i].1);
    }

    if indices.len() <= MAX_LEAF_SIZE {
        return BvhNode::Leaf {
            bbox,
            triangles: indices.iter().map(|&i| boxes[i].0).collect(),
        };
    }

    // Median split along the longest axis
    let axis = bbox.longest_axis();
    let mut sorted = indices;
    sorted.sort_by(|&a, &b| {
        let ca = boxes[a].1.center()[axis];
        let cb = boxes[b].1.center()[axis];
        ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
    });
    let right_indices = sorted.split_off(sorted.len() / 2);
    let left_indices = sorted;

    let (left, right) = if right_indices.len() >= PARALLEL_THRESHOLD {
        rayon::join(
            || build_recursive(boxes, left_indices),
            || build_recursive(boxes, right_indices),
        )
    } else {
        (
            build_recursive(boxes, left_indices),
            build_recursive(boxes, right_indices),
        )
    };

    BvhNode::Internal {
        bbox,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Slab test for a ray against a box, `t >= 0` only.
fn ray_hits_box(origin: &Point3<f64>, inv_dir: &Vector3<f64>, b: &Rect3) -> bool {
    let mut t_min = 0.0_f64;
    let mut t_max = f64::INFINITY;
    for k in 0..3 {
        let t1 = (b.min[k] - origin[k]) * inv_dir[k];
        let t2 = (b.max[k] - origin[k]) * inv_dir[k];
        t_min = t_min.max(t1.min(t2));
        t_max = t_max.min(t1.max(t2));
    }
    t_min <= t_max
}

/// Closest point on triangle `abc` to `p` (Ericson, Real-Time Collision Detection).
pub fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Point3<f64> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Möller–Trumbore ray/triangle intersection; returns the ray parameter.
pub fn ray_triangle_intersect(
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Option<f64> {
    const EPSILON: f64 = 1e-12;

    let edge1 = b - a;
    let edge2 = c - a;
    let h = dir.cross(&edge2);
    let det = edge1.dot(&h);
    if det.abs() < EPSILON {
        return None;
    }

    let f = 1.0 / det;
    let s = origin - a;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * dir.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    (t > EPSILON).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::icosphere;

    #[test]
    fn test_closest_point_regions() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);

        let inside = closest_point_on_triangle(&Point3::new(0.25, 0.25, 1.0), &a, &b, &c);
        assert!((inside - Point3::new(0.25, 0.25, 0.0)).norm() < 1e-12);

        let vertex = closest_point_on_triangle(&Point3::new(-1.0, -1.0, 0.0), &a, &b, &c);
        assert_eq!(vertex, a);

        let edge = closest_point_on_triangle(&Point3::new(0.5, -1.0, 0.0), &a, &b, &c);
        assert!((edge - Point3::new(0.5, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_ray_triangle() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let up = Vector3::new(0.0, 0.0, 1.0);

        let t = ray_triangle_intersect(&Point3::new(0.2, 0.2, -1.0), &up, &a, &b, &c);
        assert!((t.unwrap() - 1.0).abs() < 1e-12);
        assert!(ray_triangle_intersect(&Point3::new(0.2, 0.2, 1.0), &up, &a, &b, &c).is_none());
        assert!(ray_triangle_intersect(&Point3::new(2.0, 2.0, -1.0), &up, &a, &b, &c).is_none());
    }

    #[test]
    fn test_bvh_matches_brute_force() {
        let mesh = icosphere(2);
        let bvh = Bvh::build(&mesh);
        assert_eq!(bvh.triangle_count(), mesh.num_faces());

        for q in [
            Point3::new(0.1, 0.2, 0.3),
            Point3::new(2.0, -1.0, 0.5),
            Point3::new(0.0, 0.0, 0.99),
        ] {
            let brute = mesh
                .face_ids()
                .map(|f| {
                    let [a, b, c] = mesh.face_positions(f);
                    (closest_point_on_triangle(&q, &a, &b, &c) - q).norm_squared()
                })
                .fold(f64::INFINITY, f64::min);
            let (_, d) = bvh.closest_point(&q).unwrap();
            assert!((d - brute).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ray_parity() {
        let bvh = Bvh::build(&icosphere(2));
        let dir = Vector3::new(0.577, 0.5776, 0.5771);
        assert_eq!(bvh.count_ray_crossings(&Point3::new(0.05, -0.1, 0.02), &dir) % 2, 1);
        assert_eq!(bvh.count_ray_crossings(&Point3::new(1.5, 0.0, 0.0), &dir) % 2, 0);
    }

    #[test]
    fn test_empty() {
        let bvh = Bvh::from_triangles(Vec::new());
        assert!(bvh.closest_point(&Point3::origin()).is_none());
        assert_eq!(bvh.count_ray_crossings(&Point3::origin(), &Vector3::x()), 0);
    }
}
