//! Articulated skeletons.
//!
//! A [`Skeleton`] is a tree of named joints. Joints are created parent
//! first, so every joint's index is greater than its parent's and joint 0
//! is the root.
//!
//! Besides the full joint tree, a skeleton carries a *compressed* view that
//! keeps only the joints whose degree is not 2 (plus the root). Each chain
//! of degree-2 joints collapses into one compressed bone; the embedding
//! search works on the compressed view and the chains are restored
//! afterwards by arclength fraction.
//!
//! # Example
//!
//! ```
//! use armature::skeleton::Skeleton;
//! use nalgebra::Point3;
//!
//! let mut skel = Skeleton::new();
//! skel.make_joint("hip", Point3::new(0.0, 0.0, 0.0), None).unwrap();
//! skel.make_joint("knee", Point3::new(0.0, -0.4, 0.0), Some("hip")).unwrap();
//! skel.make_joint("ankle", Point3::new(0.0, -0.8, 0.0), Some("knee")).unwrap();
//! skel.init_compressed().unwrap();
//!
//! // "knee" has degree 2 and is folded into the hip-ankle bone.
//! assert_eq!(skel.compressed_to_full(), &[0, 2]);
//! assert_eq!(skel.fraction()[1], 0.5);
//! ```

mod presets;

use std::collections::HashMap;

use nalgebra::Point3;

use crate::error::{RigError, Result};
use crate::graph::PtGraph;

/// A joint tree with its compressed view.
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    names: Vec<String>,
    name_index: HashMap<String, usize>,

    full_graph: PtGraph,
    full_prev: Vec<Option<usize>>,
    full_sym: Vec<Option<usize>>,

    compressed: bool,
    compressed_graph: PtGraph,
    compressed_prev: Vec<Option<usize>>,
    compressed_sym: Vec<Option<usize>>,
    compressed_length: Vec<f64>,
    feet: Vec<bool>,
    fat: Vec<bool>,
    full_to_compressed: Vec<Option<usize>>,
    compressed_to_full: Vec<usize>,
    fraction: Vec<f64>,
}

impl Skeleton {
    /// Create an empty skeleton.
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Building ====================

    /// Add a joint and return its index.
    ///
    /// The first joint must be the root (`parent == None`); every later
    /// joint must name an existing parent.
    ///
    /// # Errors
    /// - [`RigError::SkeletonFinalized`] after [`Skeleton::init_compressed`]
    /// - [`RigError::DuplicateJoint`] if `name` is taken
    /// - [`RigError::UnknownJoint`] if `parent` does not exist
    /// - [`RigError::InvalidState`] for a second root
    pub fn make_joint(
        &mut self,
        name: &str,
        position: Point3<f64>,
        parent: Option<&str>,
    ) -> Result<usize> {
        if self.compressed {
            return Err(RigError::SkeletonFinalized);
        }
        if self.name_index.contains_key(name) {
            return Err(RigError::DuplicateJoint {
                name: name.to_string(),
            });
        }
        let parent = match parent {
            Some(p) => Some(self.lookup(p)?),
            None if self.names.is_empty() => None,
            None => {
                return Err(RigError::InvalidState(format!(
                    "joint '{}' has no parent but the skeleton already has a root",
                    name
                )))
            }
        };
        Ok(self.push_joint(name, position, parent))
    }

    /// Declare two joints mirror images of each other.
    ///
    /// The partner of the later joint is recorded as the earlier one.
    pub fn make_symmetric(&mut self, a: &str, b: &str) -> Result<()> {
        if self.compressed {
            return Err(RigError::SkeletonFinalized);
        }
        let (a, b) = (self.lookup(a)?, self.lookup(b)?);
        self.set_symmetric(a, b);
        Ok(())
    }

    /// Build the compressed view. No joints can be added afterwards.
    pub fn init_compressed(&mut self) -> Result<()> {
        if self.compressed {
            return Err(RigError::SkeletonFinalized);
        }
        if self.names.is_empty() {
            return Err(RigError::InvalidState("skeleton has no joints".into()));
        }
        self.compress();
        Ok(())
    }

    /// Mark a compressed joint as a foot.
    pub fn set_foot(&mut self, name: &str) -> Result<()> {
        let c = self.compressed_joint(name)?;
        self.feet[c] = true;
        Ok(())
    }

    /// Mark a compressed joint as lying in a thick part of the body.
    pub fn set_fat(&mut self, name: &str) -> Result<()> {
        let c = self.compressed_joint(name)?;
        self.fat[c] = true;
        Ok(())
    }

    /// Uniformly scale all joint positions and compressed bone lengths.
    pub fn scale(&mut self, factor: f64) {
        for p in &mut self.full_graph.verts {
            p.coords *= factor;
        }
        for p in &mut self.compressed_graph.verts {
            p.coords *= factor;
        }
        for l in &mut self.compressed_length {
            *l *= factor;
        }
    }

    pub(crate) fn push_joint(
        &mut self,
        name: &str,
        position: Point3<f64>,
        parent: Option<usize>,
    ) -> usize {
        let idx = self.full_graph.add_vertex(position);
        if let Some(p) = parent {
            self.full_graph.add_edge(idx, p);
        }
        self.names.push(name.to_string());
        self.name_index.insert(name.to_string(), idx);
        self.full_prev.push(parent);
        self.full_sym.push(None);
        idx
    }

    pub(crate) fn set_symmetric(&mut self, a: usize, b: usize) {
        self.full_sym[a.max(b)] = Some(a.min(b));
    }

    fn compress(&mut self) {
        let n = self.names.len();

        self.full_to_compressed = vec![None; n];
        self.compressed_to_full.clear();
        self.compressed_graph = PtGraph::new();
        for i in 0..n {
            if i == 0 || self.full_graph.degree(i) != 2 {
                self.full_to_compressed[i] = Some(self.compressed_to_full.len());
                self.compressed_to_full.push(i);
                self.compressed_graph.add_vertex(self.full_graph.verts[i]);
            }
        }

        let m = self.compressed_to_full.len();
        self.compressed_prev = vec![None; m];
        self.compressed_length = vec![0.0; m];
        self.fraction = vec![0.0; n];
        self.feet = vec![false; m];
        self.fat = vec![false; m];

        for c in 1..m {
            let mut cur = self.compressed_to_full[c];
            let mut chain = Vec::new();
            let mut length = 0.0;
            // Walk up until the parent is itself a compressed joint.
            while let Some(p) = self.full_prev[cur] {
                let bone = self.full_graph.distance(cur, p);
                chain.push((cur, bone));
                length += bone;
                cur = p;
                if self.full_to_compressed[p].is_some() {
                    break;
                }
            }
            let parent = self.full_to_compressed[cur];
            self.compressed_prev[c] = parent;
            if let Some(pc) = parent {
                self.compressed_graph.add_edge(c, pc);
            }
            self.compressed_length[c] = length;
            for (j, bone) in chain {
                self.fraction[j] = if length > 0.0 { bone / length } else { 0.0 };
            }
        }

        self.compressed_sym = self
            .compressed_to_full
            .iter()
            .map(|&f| self.full_sym[f].and_then(|s| self.full_to_compressed[s]))
            .collect();

        self.compressed = true;
    }

    fn lookup(&self, name: &str) -> Result<usize> {
        self.joint_index(name).ok_or_else(|| RigError::UnknownJoint {
            name: name.to_string(),
        })
    }

    fn compressed_joint(&self, name: &str) -> Result<usize> {
        if !self.compressed {
            return Err(RigError::SkeletonNotFinalized);
        }
        let idx = self.lookup(name)?;
        self.full_to_compressed[idx].ok_or_else(|| {
            RigError::InvalidState(format!("joint '{}' is not kept by compression", name))
        })
    }

    // ==================== Full view ====================

    /// Number of joints.
    pub fn num_joints(&self) -> usize {
        self.names.len()
    }

    /// Number of bones (every joint but the root has one).
    pub fn num_bones(&self) -> usize {
        self.names.len().saturating_sub(1)
    }

    /// Index of a named joint.
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    /// Name of joint `i`.
    pub fn joint_name(&self, i: usize) -> &str {
        &self.names[i]
    }

    /// Joint positions and parent edges.
    pub fn full_graph(&self) -> &PtGraph {
        &self.full_graph
    }

    /// Parent of each joint; `None` for the root.
    pub fn full_prev(&self) -> &[Option<usize>] {
        &self.full_prev
    }

    /// Mirror partner of each joint, recorded on the later of the pair.
    pub fn full_sym(&self) -> &[Option<usize>] {
        &self.full_sym
    }

    // ==================== Compressed view ====================

    /// Whether [`Skeleton::init_compressed`] has run.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Compressed joints and bones.
    pub fn compressed_graph(&self) -> &PtGraph {
        &self.compressed_graph
    }

    /// Compressed parent of each compressed joint.
    pub fn compressed_prev(&self) -> &[Option<usize>] {
        &self.compressed_prev
    }

    /// Mirror partner of each compressed joint.
    pub fn compressed_sym(&self) -> &[Option<usize>] {
        &self.compressed_sym
    }

    /// Rest length of each compressed bone (sum of its full bones).
    pub fn compressed_length(&self) -> &[f64] {
        &self.compressed_length
    }

    /// Which compressed joints are feet.
    pub fn feet(&self) -> &[bool] {
        &self.feet
    }

    /// Which compressed joints sit in thick parts of the body.
    pub fn fat(&self) -> &[bool] {
        &self.fat
    }

    /// Compressed index of each full joint, if it has one.
    pub fn full_to_compressed(&self) -> &[Option<usize>] {
        &self.full_to_compressed
    }

    /// Full index of each compressed joint.
    pub fn compressed_to_full(&self) -> &[usize] {
        &self.compressed_to_full
    }

    /// Share of its compressed bone that each full bone covers.
    pub fn fraction(&self) -> &[f64] {
        &self.fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm() -> Skeleton {
        let mut s = Skeleton::new();
        s.make_joint("shoulder", Point3::new(0.0, 0.0, 0.0), None).unwrap();
        s.make_joint("elbow", Point3::new(1.0, 0.0, 0.0), Some("shoulder")).unwrap();
        s.make_joint("wrist", Point3::new(1.0, 3.0, 0.0), Some("elbow")).unwrap();
        s
    }

    #[test]
    fn test_make_joint_errors() {
        let mut s = arm();
        assert!(matches!(
            s.make_joint("elbow", Point3::origin(), Some("shoulder")),
            Err(RigError::DuplicateJoint { .. })
        ));
        assert!(matches!(
            s.make_joint("finger", Point3::origin(), Some("hand")),
            Err(RigError::UnknownJoint { .. })
        ));
        assert!(matches!(
            s.make_joint("other_root", Point3::origin(), None),
            Err(RigError::InvalidState(_))
        ));
    }

    #[test]
    fn test_parent_precedes_child() {
        let s = Skeleton::human();
        for (i, p) in s.full_prev().iter().enumerate() {
            match p {
                Some(p) => assert!(*p < i),
                None => assert_eq!(i, 0),
            }
        }
    }

    #[test]
    fn test_compression_of_chain() {
        let mut s = arm();
        assert!(matches!(s.set_foot("wrist"), Err(RigError::SkeletonNotFinalized)));
        s.init_compressed().unwrap();

        assert_eq!(s.compressed_to_full(), &[0, 2]);
        assert_eq!(s.full_to_compressed(), &[Some(0), None, Some(1)]);
        assert_eq!(s.compressed_prev(), &[None, Some(0)]);
        assert_eq!(s.compressed_length()[1], 4.0);
        assert_eq!(s.fraction(), &[0.0, 0.25, 0.75]);

        assert!(matches!(s.set_fat("elbow"), Err(RigError::InvalidState(_))));
        s.set_foot("wrist").unwrap();
        assert_eq!(s.feet(), &[false, true]);
        assert!(matches!(
            s.make_joint("hand", Point3::origin(), Some("wrist")),
            Err(RigError::SkeletonFinalized)
        ));
    }

    #[test]
    fn test_symmetry_recorded_on_later_joint() {
        let mut s = Skeleton::new();
        s.make_joint("root", Point3::origin(), None).unwrap();
        s.make_joint("l", Point3::new(-1.0, 0.0, 0.0), Some("root")).unwrap();
        s.make_joint("r", Point3::new(1.0, 0.0, 0.0), Some("root")).unwrap();
        s.make_symmetric("r", "l").unwrap();
        assert_eq!(s.full_sym(), &[None, None, Some(1)]);
        s.init_compressed().unwrap();
        assert_eq!(s.compressed_sym(), &[None, None, Some(1)]);
    }

    #[test]
    fn test_scale() {
        let mut s = arm();
        s.init_compressed().unwrap();
        s.scale(2.0);
        assert_eq!(s.full_graph().verts[2], Point3::new(2.0, 6.0, 0.0));
        assert_eq!(s.compressed_graph().verts[1], Point3::new(2.0, 6.0, 0.0));
        assert_eq!(s.compressed_length()[1], 8.0);
        // Fractions are scale-free.
        assert_eq!(s.fraction()[1], 0.25);
    }
}
