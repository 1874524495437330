//! Similarity transforms, dual quaternions, and segment helpers.

use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};

/// Rotation, uniform scale, then translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Rotation part.
    pub rotation: UnitQuaternion<f64>,
    /// Uniform scale applied before rotation.
    pub scale: f64,
    /// Translation applied last.
    pub translation: Vector3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            scale: 1.0,
            translation: Vector3::zeros(),
        }
    }

    /// A rigid transform.
    pub fn rigid(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            scale: 1.0,
            translation,
        }
    }

    /// A pure translation.
    pub fn translation(t: Vector3<f64>) -> Self {
        Self::rigid(UnitQuaternion::identity(), t)
    }

    /// A rotation about `pivot`.
    pub fn rotation_about(rotation: UnitQuaternion<f64>, pivot: &Point3<f64>) -> Self {
        let t = pivot.coords - rotation * pivot.coords;
        Self::rigid(rotation, t)
    }

    /// Apply to a point.
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * (p.coords * self.scale) + self.translation)
    }

    /// `self ∘ other`: apply `other` first.
    pub fn compose(&self, other: &Transform) -> Transform {
        Transform {
            rotation: self.rotation * other.rotation,
            scale: self.scale * other.scale,
            translation: self.rotation * (other.translation * self.scale) + self.translation,
        }
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Transform {
        let inv_rot = self.rotation.inverse();
        let inv_scale = 1.0 / self.scale;
        Transform {
            rotation: inv_rot,
            scale: inv_scale,
            translation: -(inv_rot * self.translation) * inv_scale,
        }
    }

    /// The rigid part as a dual quaternion `(real, dual)`.
    ///
    /// `real = q`, `dual = ½ t q`. Scale is not representable and is dropped.
    pub fn to_dual_quaternion(&self) -> DualQuat {
        let real = self.rotation.into_inner();
        let dual = Quaternion::from_imag(self.translation) * real * 0.5;
        DualQuat { real, dual }
    }
}

/// A (not necessarily normalized) dual quaternion used for blending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualQuat {
    /// Rotation part.
    pub real: Quaternion<f64>,
    /// Translation part.
    pub dual: Quaternion<f64>,
}

impl DualQuat {
    /// The all-zero dual quaternion, the identity for blending sums.
    pub fn zero() -> Self {
        Self {
            real: Quaternion::new(0.0, 0.0, 0.0, 0.0),
            dual: Quaternion::new(0.0, 0.0, 0.0, 0.0),
        }
    }

    /// 4D dot product of the rotation parts.
    pub fn real_dot(&self, other: &DualQuat) -> f64 {
        self.real.coords.dot(&other.real.coords)
    }

    /// `self + other * w`.
    pub fn add_scaled(&self, other: &DualQuat, w: f64) -> DualQuat {
        DualQuat {
            real: self.real + other.real * w,
            dual: self.dual + other.dual * w,
        }
    }

    /// Normalize and apply to a point.
    ///
    /// Returns `None` when the rotation part vanishes.
    pub fn transform_point(&self, p: &Point3<f64>) -> Option<Point3<f64>> {
        let norm = self.real.norm();
        if norm < 1e-12 {
            return None;
        }
        let q0 = self.real / norm;
        let qe = self.dual / norm;
        let v0 = q0.imag();
        let ve = qe.imag();
        let trans = (ve * q0.scalar() - v0 * qe.scalar() + v0.cross(&ve)) * 2.0;
        let rot = UnitQuaternion::new_unchecked(q0);
        Some(Point3::from(rot * p.coords + trans))
    }
}

/// Closest point to `p` on segment `ab`.
pub fn project_to_segment(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> Point3<f64> {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < 1e-30 {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Squared distance from `p` to segment `ab`.
pub fn distance_sq_to_segment(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (p - project_to_segment(p, a, b)).norm_squared()
}

/// Ramp from `(low, at_low)` to `(high, at_high)`, flat outside that range.
pub fn smooth_interp(val: f64, low: f64, at_low: f64, high: f64, at_high: f64) -> f64 {
    if val < low {
        return at_low;
    }
    if val > high {
        return at_high;
    }
    let w = (val - low) / (high - low);
    w * at_high + (1.0 - w) * at_low
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn close(a: &Point3<f64>, b: &Point3<f64>) -> bool {
        (a - b).norm() < 1e-10
    }

    #[test]
    fn test_compose_and_inverse() {
        let a = Transform {
            rotation: UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
            scale: 2.0,
            translation: Vector3::new(1.0, 0.0, 0.0),
        };
        let b = Transform::translation(Vector3::new(0.0, 1.0, 0.0));
        let p = Point3::new(1.0, 2.0, 3.0);

        assert!(close(&a.compose(&b).apply(&p), &a.apply(&b.apply(&p))));
        assert!(close(&a.inverse().apply(&a.apply(&p)), &p));
    }

    #[test]
    fn test_dual_quaternion_matches_rigid() {
        let t = Transform::rigid(
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.7),
            Vector3::new(0.3, -1.0, 2.0),
        );
        let p = Point3::new(0.5, 0.25, -1.0);
        let dq = t.to_dual_quaternion();
        let q = dq.transform_point(&p).unwrap();
        assert!(close(&q, &t.apply(&p)));

        // Blending a transform with itself leaves it unchanged.
        let blend = DualQuat::zero().add_scaled(&dq, 0.4).add_scaled(&dq, 0.6);
        assert!(close(&blend.transform_point(&p).unwrap(), &t.apply(&p)));
        assert!(DualQuat::zero().transform_point(&p).is_none());
    }

    #[test]
    fn test_segment_projection() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 0.0);
        assert!(close(&project_to_segment(&Point3::new(1.0, 1.0, 0.0), &a, &b), &Point3::new(1.0, 0.0, 0.0)));
        assert!(close(&project_to_segment(&Point3::new(-1.0, 1.0, 0.0), &a, &b), &a));
        assert_eq!(distance_sq_to_segment(&Point3::new(3.0, 0.0, 0.0), &a, &b), 1.0);
        assert!(close(&project_to_segment(&b, &a, &a), &a));
    }

    #[test]
    fn test_smooth_interp() {
        assert_eq!(smooth_interp(0.0, 0.5, 0.0, 2.0, 3.0), 0.0);
        assert_eq!(smooth_interp(5.0, 0.5, 0.0, 2.0, 3.0), 3.0);
        let mid = smooth_interp(1.25, 0.5, 0.0, 2.0, 3.0);
        assert!((mid - 1.5).abs() < 1e-12);
    }
}
