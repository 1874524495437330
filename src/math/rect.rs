//! Axis-aligned boxes.

use nalgebra::{Point3, Vector3};

/// An axis-aligned box in 3D.
///
/// Corners and children are numbered by bits: bit `k` of the index selects
/// the low (0) or high (1) side along axis `k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect3 {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl Rect3 {
    /// Create a box from its two extreme corners.
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// The unit cube `[0, 1]^3`.
    pub fn unit() -> Self {
        Self::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
    }

    /// An empty box that any `expand` call will replace.
    pub fn empty() -> Self {
        Self::new(
            Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        )
    }

    /// Whether `expand` was never called on an empty box.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to include a point.
    pub fn expand(&mut self, p: &Point3<f64>) {
        for k in 0..3 {
            self.min[k] = self.min[k].min(p[k]);
            self.max[k] = self.max[k].max(p[k]);
        }
    }

    /// Grow to include another box.
    pub fn union(&mut self, other: &Rect3) {
        self.expand(&other.min);
        self.expand(&other.max);
    }

    /// Center point.
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Extent along each axis.
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Index of the longest axis.
    pub fn longest_axis(&self) -> usize {
        self.size().imax()
    }

    /// Containment, half-open on the max side.
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|k| p[k] >= self.min[k] && p[k] < self.max[k])
    }

    /// Containment, closed on both sides.
    pub fn contains_closed(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|k| p[k] >= self.min[k] && p[k] <= self.max[k])
    }

    /// Clamp a point into the box.
    pub fn clamp(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }

    /// Corner `i` in `0..8`.
    pub fn corner(&self, i: usize) -> Point3<f64> {
        Point3::new(
            if i & 1 == 0 { self.min.x } else { self.max.x },
            if i & 2 == 0 { self.min.y } else { self.max.y },
            if i & 4 == 0 { self.min.z } else { self.max.z },
        )
    }

    /// Octant `i` in `0..8`.
    pub fn child(&self, i: usize) -> Rect3 {
        let c = self.center();
        let mut min = self.min;
        let mut max = c;
        for k in 0..3 {
            if i & (1 << k) != 0 {
                min[k] = c[k];
                max[k] = self.max[k];
            }
        }
        Rect3::new(min, max)
    }

    /// Squared distance from a point to the box (zero inside).
    pub fn distance_sq_to(&self, p: &Point3<f64>) -> f64 {
        let mut d = 0.0;
        for k in 0..3 {
            let v = if p[k] < self.min[k] {
                self.min[k] - p[k]
            } else if p[k] > self.max[k] {
                p[k] - self.max[k]
            } else {
                0.0
            };
            d += v * v;
        }
        d
    }

    /// Map a point to local coordinates in `[0, 1]^3`.
    pub fn local(&self, p: &Point3<f64>) -> [f64; 3] {
        let s = self.size();
        [
            (p.x - self.min.x) / s.x,
            (p.y - self.min.y) / s.y,
            (p.z - self.min.z) / s.z,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_tile_parent() {
        let r = Rect3::unit();
        let mut volume = 0.0;
        for i in 0..8 {
            let c = r.child(i);
            let s = c.size();
            volume += s.x * s.y * s.z;
            assert!(c.contains(&c.center()));
            assert!(r.contains_closed(&c.corner(7)));
        }
        assert!((volume - 1.0).abs() < 1e-12);
        assert_eq!(r.child(5).min, Point3::new(0.5, 0.0, 0.5));
    }

    #[test]
    fn test_half_open_containment() {
        let r = Rect3::unit();
        assert!(r.contains(&Point3::new(0.0, 0.0, 0.0)));
        assert!(!r.contains(&Point3::new(1.0, 0.5, 0.5)));
        assert!(r.contains_closed(&Point3::new(1.0, 0.5, 0.5)));
    }

    #[test]
    fn test_distance_and_expand() {
        let mut r = Rect3::empty();
        assert!(r.is_empty());
        r.expand(&Point3::new(1.0, 1.0, 1.0));
        r.expand(&Point3::new(2.0, 3.0, 1.0));
        assert_eq!(r.longest_axis(), 1);
        assert_eq!(r.distance_sq_to(&Point3::new(0.0, 1.0, 1.0)), 1.0);
        assert_eq!(r.distance_sq_to(&Point3::new(1.5, 2.0, 1.0)), 0.0);
    }
}
