//! Sparse linear least squares with fixed variables.

use std::collections::BTreeMap;

use super::{LltMatrix, SpdMatrix};
use crate::error::{RigError, Result};

#[derive(Debug, Clone)]
struct SoftRow<V> {
    lhs: BTreeMap<V, f64>,
    rhs: f64,
    weight: f64,
}

impl<V> Default for SoftRow<V> {
    fn default() -> Self {
        Self {
            lhs: BTreeMap::new(),
            rhs: 0.0,
            weight: 1.0,
        }
    }
}

/// Minimizes `Σ w_c (a_c · x - b_c)²` over the free variables.
///
/// Variables are keyed by `V` and constraints by `C`. Fixing a variable with
/// [`LsqSystem::set_hard`] moves its term to the right-hand side. The
/// constraint matrix is factored once by [`LsqSystem::factor`]; right-hand
/// sides and fixed values may change between calls to [`LsqSystem::solve`].
///
/// # Example
///
/// ```
/// use armature::algo::sparse::LsqSystem;
///
/// // Fit y = a + b x through (0, 1), (1, 3), (2, 5).
/// let mut s: LsqSystem<&str, usize> = LsqSystem::new();
/// for (i, (x, y)) in [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)].into_iter().enumerate() {
///     s.add_to_lhs(i, "a", 1.0);
///     s.add_to_lhs(i, "b", x);
///     s.add_constraint_rhs(i, y);
/// }
/// s.factor().unwrap();
/// s.solve().unwrap();
/// assert!((s.result(&"a").unwrap() - 1.0).abs() < 1e-10);
/// assert!((s.result(&"b").unwrap() - 2.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone)]
pub struct LsqSystem<V: Ord + Clone, C: Ord + Clone> {
    rows: BTreeMap<C, SoftRow<V>>,
    hard: BTreeMap<V, f64>,

    // Set by factor.
    free: Vec<V>,
    /// Per row: free-variable columns and fixed-variable coefficients.
    matrix: Vec<(Vec<(usize, f64)>, Vec<(V, f64)>)>,
    llt: Option<LltMatrix>,

    result: BTreeMap<V, f64>,
}

impl<V: Ord + Clone, C: Ord + Clone> Default for LsqSystem<V, C> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            hard: BTreeMap::new(),
            free: Vec::new(),
            matrix: Vec::new(),
            llt: None,
            result: BTreeMap::new(),
        }
    }
}

impl<V: Ord + Clone, C: Ord + Clone> LsqSystem<V, C> {
    /// An empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `coeff` to the coefficient of `var` in `constraint`.
    ///
    /// Changes the matrix; call [`LsqSystem::factor`] again afterwards.
    pub fn add_to_lhs(&mut self, constraint: C, var: V, coeff: f64) {
        *self.rows.entry(constraint).or_default().lhs.entry(var).or_insert(0.0) += coeff;
        self.llt = None;
    }

    /// Add `rhs` to the right-hand side of `constraint`.
    pub fn add_constraint_rhs(&mut self, constraint: C, rhs: f64) {
        self.rows.entry(constraint).or_default().rhs += rhs;
    }

    /// Replace the right-hand side of `constraint`.
    pub fn set_rhs(&mut self, constraint: C, rhs: f64) {
        self.rows.entry(constraint).or_default().rhs = rhs;
    }

    /// Scale the squared residual of `constraint` by `weight` (default 1).
    ///
    /// Changes the matrix; call [`LsqSystem::factor`] again afterwards.
    pub fn set_weight(&mut self, constraint: C, weight: f64) {
        self.rows.entry(constraint).or_default().weight = weight;
        self.llt = None;
    }

    /// Fix `var` to `value`.
    ///
    /// Fixing a new variable changes the matrix; updating the value of an
    /// already fixed one does not.
    pub fn set_hard(&mut self, var: V, value: f64) {
        if self.hard.insert(var, value).is_none() {
            self.llt = None;
        }
    }

    /// Number of constraints.
    pub fn num_constraints(&self) -> usize {
        self.rows.len()
    }

    /// Form and factor the normal equations.
    ///
    /// # Errors
    /// - [`RigError::InvalidParameter`] if a weight is not positive
    /// - [`RigError::NotPositiveDefinite`] if the free variables are not
    ///   determined by the constraints
    pub fn factor(&mut self) -> Result<()> {
        let mut index: BTreeMap<V, usize> = BTreeMap::new();
        self.free.clear();
        for row in self.rows.values() {
            for var in row.lhs.keys() {
                if !self.hard.contains_key(var) && !index.contains_key(var) {
                    index.insert(var.clone(), self.free.len());
                    self.free.push(var.clone());
                }
            }
        }

        self.matrix.clear();
        let mut lower: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); self.free.len()];
        for row in self.rows.values() {
            if row.weight.is_nan() || row.weight <= 0.0 {
                return Err(RigError::invalid_param("weight", row.weight, "must be positive"));
            }
            let mut cols = Vec::new();
            let mut fixed = Vec::new();
            for (var, &c) in &row.lhs {
                match index.get(var) {
                    Some(&i) => cols.push((i, c)),
                    None => fixed.push((var.clone(), c)),
                }
            }
            for &(i, ci) in &cols {
                for &(j, cj) in &cols {
                    if j <= i {
                        *lower[i].entry(j).or_insert(0.0) += row.weight * ci * cj;
                    }
                }
            }
            self.matrix.push((cols, fixed));
        }

        let spd = SpdMatrix::from_lower_rows(lower.into_iter().map(|r| r.into_iter().collect()).collect())?;
        self.llt = Some(spd.factor()?);
        Ok(())
    }

    /// Solve with the current right-hand sides and fixed values.
    ///
    /// # Errors
    /// [`RigError::InvalidState`] if the system changed since the last
    /// [`LsqSystem::factor`].
    pub fn solve(&mut self) -> Result<()> {
        let llt = self
            .llt
            .as_ref()
            .ok_or_else(|| RigError::InvalidState("least-squares system is not factored".into()))?;

        let mut rhs = vec![0.0; self.free.len()];
        for (row, (cols, fixed)) in self.rows.values().zip(&self.matrix) {
            let b = row.rhs
                - fixed
                    .iter()
                    .map(|(v, c)| c * self.hard.get(v).copied().unwrap_or(0.0))
                    .sum::<f64>();
            for &(i, c) in cols {
                rhs[i] += row.weight * c * b;
            }
        }
        llt.solve(&mut rhs)?;

        self.result = self.hard.clone();
        for (var, x) in self.free.iter().zip(rhs) {
            self.result.insert(var.clone(), x);
        }
        Ok(())
    }

    /// Value of `var` after the last [`LsqSystem::solve`].
    pub fn result(&self, var: &V) -> Option<f64> {
        self.result.get(var).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overdetermined_fit() {
        // Compared against the closed-form regression line.
        let pts = [(0.0, 0.5), (1.0, 2.5), (2.0, 4.3), (3.0, 6.2)];
        let mut s: LsqSystem<u8, usize> = LsqSystem::new();
        for (i, &(x, y)) in pts.iter().enumerate() {
            s.add_to_lhs(i, 0, 1.0);
            s.add_to_lhs(i, 1, x);
            s.add_constraint_rhs(i, y);
        }
        assert_eq!(s.num_constraints(), pts.len());
        s.factor().unwrap();
        s.solve().unwrap();

        let n = pts.len() as f64;
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(a, b), p| (a + p.0, b + p.1));
        let sxx: f64 = pts.iter().map(|p| p.0 * p.0).sum();
        let sxy: f64 = pts.iter().map(|p| p.0 * p.1).sum();
        let slope = (n * sxy - sx * sy) / (n * sxx - sx * sx);
        let icept = (sy - slope * sx) / n;
        assert!((s.result(&1).unwrap() - slope).abs() < 1e-10);
        assert!((s.result(&0).unwrap() - icept).abs() < 1e-10);
    }

    #[test]
    fn test_hard_variable_and_rhs_updates() {
        // x0 - x1 = 1, x1 - x2 = 1, x0 fixed.
        let mut s: LsqSystem<usize, usize> = LsqSystem::new();
        s.add_to_lhs(0, 0, 1.0);
        s.add_to_lhs(0, 1, -1.0);
        s.add_constraint_rhs(0, 1.0);
        s.add_to_lhs(1, 1, 1.0);
        s.add_to_lhs(1, 2, -1.0);
        s.add_constraint_rhs(1, 1.0);
        s.set_hard(0, 5.0);
        s.factor().unwrap();
        s.solve().unwrap();
        assert_eq!(s.result(&0), Some(5.0));
        assert!((s.result(&1).unwrap() - 4.0).abs() < 1e-12);
        assert!((s.result(&2).unwrap() - 3.0).abs() < 1e-12);

        // New values reuse the factorization.
        s.set_hard(0, 0.0);
        s.set_rhs(1, 2.0);
        s.solve().unwrap();
        assert!((s.result(&1).unwrap() + 1.0).abs() < 1e-12);
        assert!((s.result(&2).unwrap() + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_weights() {
        // Two conflicting constraints on one variable: x = 0 and x = 3 (weight 2).
        let mut s: LsqSystem<char, char> = LsqSystem::new();
        s.add_to_lhs('a', 'x', 1.0);
        s.add_to_lhs('b', 'x', 1.0);
        s.add_constraint_rhs('b', 3.0);
        s.set_weight('b', 2.0);
        s.factor().unwrap();
        s.solve().unwrap();
        assert!((s.result(&'x').unwrap() - 2.0).abs() < 1e-12);

        s.set_weight('b', 0.0);
        assert!(s.factor().is_err());
    }

    #[test]
    fn test_needs_factor() {
        let mut s: LsqSystem<usize, usize> = LsqSystem::new();
        s.add_to_lhs(0, 0, 1.0);
        assert!(matches!(s.solve(), Err(RigError::InvalidState(_))));
        assert_eq!(s.result(&0), None);
    }
}
