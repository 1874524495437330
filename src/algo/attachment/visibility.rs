//! Line-of-sight tests between surface vertices and bones.

use nalgebra::Point3;

use crate::algo::distance::DistanceField;

/// Decides whether a bone point can be seen from a surface point.
pub trait VisibilityTester: Sync {
    /// Whether the segment from `from` to `to` stays inside the mesh.
    fn can_see(&self, from: &Point3<f64>, to: &Point3<f64>) -> bool;
}

/// Marches along the segment through a signed distance field.
#[derive(Debug, Clone, Copy)]
pub struct FieldVisibility<'a> {
    field: &'a DistanceField,
}

impl<'a> FieldVisibility<'a> {
    /// Field values above this count as outside.
    pub const MAX_VALUE: f64 = 0.002;

    /// Samples taken along a segment.
    pub const STEPS: usize = 100;

    /// Test against `field`.
    pub fn new(field: &'a DistanceField) -> Self {
        Self { field }
    }
}

impl VisibilityTester for FieldVisibility<'_> {
    fn can_see(&self, from: &Point3<f64>, to: &Point3<f64>) -> bool {
        let at_to = self.field.evaluate(to);
        let diff = (to - from) / Self::STEPS as f64;
        let step = diff.norm();
        let mut left = (to - from).norm();
        let mut cur = from + diff;
        while left >= 0.0 {
            let d = self.field.evaluate(&cur);
            if d > Self::MAX_VALUE {
                return false;
            }
            // Deep enough that the rest of the segment cannot reach the surface.
            if d + at_to + left <= Self::MAX_VALUE {
                return true;
            }
            cur += diff;
            left -= step;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::distance::{construct_distance_field, DistanceFieldOptions};
    use crate::algo::Progress;
    use crate::mesh::{build_from_triangles, prepare_mesh};
    use crate::test_util::icosphere_lists;

    fn field() -> DistanceField {
        let (verts, faces) = icosphere_lists(2);
        let mesh = prepare_mesh(&build_from_triangles(&verts, &faces).unwrap()).unwrap();
        let options = DistanceFieldOptions::default()
            .with_tolerance(0.01)
            .with_max_depth(6);
        construct_distance_field(&mesh, &options, &Progress::none()).unwrap()
    }

    #[test]
    fn test_inside_segment_is_visible() {
        let f = field();
        let vis = FieldVisibility::new(&f);
        assert!(vis.can_see(&Point3::new(0.5, 0.5, 0.5), &Point3::new(0.6, 0.55, 0.5)));
        // From just under the surface towards the centre.
        assert!(vis.can_see(&Point3::new(0.5, 0.5, 0.93), &Point3::new(0.5, 0.5, 0.5)));
    }

    #[test]
    fn test_outside_segment_is_blocked() {
        let f = field();
        let vis = FieldVisibility::new(&f);
        assert!(!vis.can_see(&Point3::new(0.5, 0.5, 0.5), &Point3::new(1.0, 1.0, 1.0)));
        // Both ends outside.
        assert!(!vis.can_see(&Point3::new(0.15, 0.15, 0.5), &Point3::new(0.85, 0.15, 0.5)));
    }
}
