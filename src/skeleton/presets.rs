//! Built-in skeletons for common body plans.
//!
//! Joint tables list joints parent first; the index in the table is the
//! joint index.

use nalgebra::Point3;

use super::Skeleton;

type JointRow = (&'static str, [f64; 3], Option<usize>);

struct Preset {
    joints: &'static [JointRow],
    symmetric: &'static [(usize, usize)],
    feet: &'static [usize],
    fat: &'static [usize],
}

const HUMAN: Preset = Preset {
    joints: &[
        ("shoulders", [0.00, 0.50, 0.00], None),
        ("back", [0.00, 0.15, 0.00], Some(0)),
        ("hips", [0.00, 0.00, 0.00], Some(1)),
        ("head", [0.00, 0.70, 0.00], Some(0)),
        ("lthigh", [-0.10, 0.00, 0.00], Some(2)),
        ("lknee", [-0.15, -0.35, 0.00], Some(4)),
        ("lankle", [-0.15, -0.80, 0.00], Some(5)),
        ("lfoot", [-0.15, -0.80, 0.10], Some(6)),
        ("rthigh", [0.10, 0.00, 0.00], Some(2)),
        ("rknee", [0.15, -0.35, 0.00], Some(8)),
        ("rankle", [0.15, -0.80, 0.00], Some(9)),
        ("rfoot", [0.15, -0.80, 0.10], Some(10)),
        ("lshoulder", [-0.20, 0.50, 0.00], Some(0)),
        ("lelbow", [-0.40, 0.25, 0.075], Some(12)),
        ("lhand", [-0.60, 0.00, 0.15], Some(13)),
        ("rshoulder", [0.20, 0.50, 0.00], Some(0)),
        ("relbow", [0.40, 0.25, 0.075], Some(15)),
        ("rhand", [0.60, 0.00, 0.15], Some(16)),
    ],
    symmetric: &[(4, 8), (5, 9), (6, 10), (7, 11), (12, 15), (13, 16), (14, 17)],
    feet: &[7, 11],
    fat: &[2, 0, 3],
};

const QUAD: Preset = Preset {
    joints: &[
        ("shoulders", [0.00, 0.00, 0.50], None),
        ("back", [0.00, 0.00, 0.00], Some(0)),
        ("hips", [0.00, 0.00, -0.50], Some(1)),
        ("neck", [0.00, 0.20, 0.63], Some(0)),
        ("head", [0.00, 0.20, 0.90], Some(3)),
        ("lthigh", [-0.15, 0.00, -0.50], Some(2)),
        ("lhknee", [-0.20, -0.40, -0.50], Some(5)),
        ("lhfoot", [-0.20, -0.80, -0.50], Some(6)),
        ("rthigh", [0.15, 0.00, -0.50], Some(2)),
        ("rhknee", [0.20, -0.40, -0.50], Some(8)),
        ("rhfoot", [0.20, -0.80, -0.50], Some(9)),
        ("lshoulder", [-0.20, 0.00, 0.50], Some(0)),
        ("lfknee", [-0.20, -0.40, 0.50], Some(11)),
        ("lffoot", [-0.20, -0.80, 0.50], Some(12)),
        ("rshoulder", [0.20, 0.00, 0.50], Some(0)),
        ("rfknee", [0.20, -0.40, 0.50], Some(14)),
        ("rffoot", [0.20, -0.80, 0.50], Some(15)),
        ("tail", [0.00, 0.00, -0.70], Some(2)),
    ],
    symmetric: &[(5, 8), (6, 9), (7, 10), (11, 14), (12, 15), (13, 16)],
    feet: &[7, 10, 13, 16],
    fat: &[2, 0, 4],
};

const HORSE: Preset = Preset {
    joints: &[
        ("shoulders", [0.00, 0.00, 0.50], None),
        ("back", [0.00, 0.00, 0.00], Some(0)),
        ("hips", [0.00, 0.00, -0.50], Some(1)),
        ("neck", [0.00, 0.20, 0.63], Some(0)),
        ("head", [0.00, 0.20, 0.90], Some(3)),
        ("lthigh", [-0.15, 0.00, -0.50], Some(2)),
        ("lhknee", [-0.20, -0.20, -0.45], Some(5)),
        ("lhheel", [-0.20, -0.40, -0.50], Some(6)),
        ("lhfoot", [-0.20, -0.80, -0.50], Some(7)),
        ("rthigh", [0.15, 0.00, -0.50], Some(2)),
        ("rhknee", [0.20, -0.20, -0.45], Some(9)),
        ("rhheel", [0.20, -0.40, -0.50], Some(10)),
        ("rhfoot", [0.20, -0.80, -0.50], Some(11)),
        ("lshoulder", [-0.20, 0.00, 0.50], Some(0)),
        ("lfknee", [-0.20, -0.40, 0.50], Some(13)),
        ("lffoot", [-0.20, -0.80, 0.50], Some(14)),
        ("rshoulder", [0.20, 0.00, 0.50], Some(0)),
        ("rfknee", [0.20, -0.40, 0.50], Some(16)),
        ("rffoot", [0.20, -0.80, 0.50], Some(17)),
        ("tail", [0.00, 0.00, -0.70], Some(2)),
    ],
    symmetric: &[
        (5, 9),
        (6, 10),
        (7, 11),
        (8, 12),
        (13, 16),
        (14, 17),
        (15, 18),
    ],
    feet: &[8, 12, 15, 18],
    fat: &[2, 0, 4],
};

const CENTAUR: Preset = Preset {
    joints: &[
        ("shoulders", [0.00, 0.00, 0.50], None),
        ("back", [0.00, 0.00, 0.00], Some(0)),
        ("hips", [0.00, 0.00, -0.50], Some(1)),
        ("hback", [0.00, 0.25, 0.50], Some(0)),
        ("hshoulders", [0.00, 0.50, 0.50], Some(3)),
        ("head", [0.00, 0.70, 0.50], Some(4)),
        ("lthigh", [-0.15, 0.00, -0.50], Some(2)),
        ("lhknee", [-0.20, -0.40, -0.45], Some(6)),
        ("lhfoot", [-0.20, -0.80, -0.50], Some(7)),
        ("rthigh", [0.15, 0.00, -0.50], Some(2)),
        ("rhknee", [0.20, -0.40, -0.45], Some(9)),
        ("rhfoot", [0.20, -0.80, -0.50], Some(10)),
        ("lshoulder", [-0.20, 0.00, 0.50], Some(0)),
        ("lfknee", [-0.20, -0.40, 0.50], Some(12)),
        ("lffoot", [-0.20, -0.80, 0.50], Some(13)),
        ("rshoulder", [0.20, 0.00, 0.50], Some(0)),
        ("rfknee", [0.20, -0.40, 0.50], Some(15)),
        ("rffoot", [0.20, -0.80, 0.50], Some(16)),
        ("hlshoulder", [-0.20, 0.50, 0.50], Some(4)),
        ("lelbow", [-0.40, 0.25, 0.575], Some(18)),
        ("lhand", [-0.60, 0.00, 0.65], Some(19)),
        ("hrshoulder", [0.20, 0.50, 0.50], Some(4)),
        ("relbow", [0.40, 0.25, 0.575], Some(21)),
        ("rhand", [0.60, 0.00, 0.65], Some(22)),
        ("tail", [0.00, 0.00, -0.70], Some(2)),
    ],
    symmetric: &[
        (6, 9),
        (7, 10),
        (8, 11),
        (12, 15),
        (13, 16),
        (14, 17),
        (18, 21),
        (19, 22),
        (20, 23),
    ],
    feet: &[8, 11, 14, 17],
    fat: &[2, 0, 4, 5],
};

impl Skeleton {
    /// A biped: spine, head, two arms and two legs ending in feet.
    pub fn human() -> Self {
        Self::from_preset(&HUMAN)
    }

    /// A generic quadruped with neck, head and tail.
    pub fn quad() -> Self {
        Self::from_preset(&QUAD)
    }

    /// A quadruped with an extra heel joint on the hind legs.
    pub fn horse() -> Self {
        Self::from_preset(&HORSE)
    }

    /// A quadruped body with a human torso, arms and head.
    pub fn centaur() -> Self {
        Self::from_preset(&CENTAUR)
    }

    fn from_preset(preset: &Preset) -> Self {
        let mut skel = Skeleton::new();
        for &(name, [x, y, z], parent) in preset.joints {
            skel.push_joint(name, Point3::new(x, y, z), parent);
        }
        for &(a, b) in preset.symmetric {
            skel.set_symmetric(a, b);
        }
        skel.compress();
        for &f in preset.feet {
            if let Some(c) = skel.full_to_compressed[f] {
                skel.feet[c] = true;
            }
        }
        for &f in preset.fat {
            if let Some(c) = skel.full_to_compressed[f] {
                skel.fat[c] = true;
            }
        }
        skel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_compression() {
        let s = Skeleton::human();
        assert_eq!(s.num_joints(), 18);
        assert_eq!(s.num_bones(), 17);
        assert_eq!(s.compressed_to_full(), &[0, 2, 3, 7, 11, 14, 17]);
        assert_eq!(
            s.compressed_prev(),
            &[None, Some(0), Some(0), Some(1), Some(1), Some(0), Some(0)]
        );
        assert_eq!(
            s.feet(),
            &[false, false, false, true, true, false, false]
        );
        assert_eq!(s.fat(), &[true, true, true, false, false, false, false]);
        // Feet and hands mirror each other.
        assert_eq!(s.compressed_sym()[4], Some(3));
        assert_eq!(s.compressed_sym()[6], Some(5));
    }

    #[test]
    fn test_human_fractions_sum_to_one() {
        let s = Skeleton::human();
        for (c, &full) in s.compressed_to_full().iter().enumerate().skip(1) {
            let mut sum = 0.0;
            let mut cur = full;
            loop {
                sum += s.fraction()[cur];
                let parent = s.full_prev()[cur].unwrap();
                if s.full_to_compressed()[parent].is_some() {
                    break;
                }
                cur = parent;
            }
            assert!((sum - 1.0).abs() < 1e-12, "chain ending at {} sums to {}", c, sum);
        }
    }

    #[test]
    fn test_preset_sizes() {
        assert_eq!(Skeleton::quad().num_joints(), 18);
        assert_eq!(Skeleton::horse().num_joints(), 20);
        assert_eq!(Skeleton::centaur().num_joints(), 25);

        for s in [Skeleton::quad(), Skeleton::horse(), Skeleton::centaur()] {
            assert!(s.is_compressed());
            assert_eq!(s.feet().iter().filter(|&&f| f).count(), 4);
            assert!(s.full_graph().integrity_check());
            assert!(s.compressed_graph().integrity_check());
        }
    }

    #[test]
    fn test_named_lookup() {
        let s = Skeleton::centaur();
        let idx = s.joint_index("hshoulders").unwrap();
        assert_eq!(s.joint_name(idx), "hshoulders");
        assert!(s.joint_index("lhheel").is_none());
    }
}
