//! Sparse Cholesky factorization with a minimum-degree ordering.

use std::collections::BTreeSet;

use tracing::debug;

use super::CsrMatrix;
use crate::error::{RigError, Result};

/// A symmetric positive definite matrix, stored as the rows of its lower
/// triangle (diagonal included).
#[derive(Debug, Clone)]
pub struct SpdMatrix {
    /// `rows[i]` holds `(j, a_ij)` for `j <= i`, sorted by `j`.
    rows: Vec<Vec<(usize, f64)>>,
}

impl SpdMatrix {
    /// Build from lower-triangle rows. Entries may come in any order;
    /// duplicates are summed.
    ///
    /// # Errors
    /// [`RigError::InvalidParameter`] if an entry lies above the diagonal.
    pub fn from_lower_rows(mut rows: Vec<Vec<(usize, f64)>>) -> Result<Self> {
        for (i, row) in rows.iter_mut().enumerate() {
            if let Some(&(j, _)) = row.iter().find(|&&(j, _)| j > i) {
                return Err(RigError::invalid_param(
                    "rows",
                    format!("({}, {})", i, j),
                    "entry above the diagonal",
                ));
            }
            row.sort_by_key(|&(j, _)| j);
            row.dedup_by(|next, kept| {
                if next.0 == kept.0 {
                    kept.1 += next.1;
                    true
                } else {
                    false
                }
            });
        }
        Ok(Self { rows })
    }

    /// Take the lower triangle of a square CSR matrix. Entries above the
    /// diagonal are ignored.
    ///
    /// # Errors
    /// [`RigError::DimensionMismatch`] if the matrix is not square.
    pub fn from_csr(a: &CsrMatrix) -> Result<Self> {
        if a.nrows() != a.ncols() {
            return Err(RigError::DimensionMismatch {
                expected: a.nrows(),
                actual: a.ncols(),
            });
        }
        let rows = (0..a.nrows())
            .map(|i| a.row(i).filter(|&(j, _)| j <= i).collect())
            .collect();
        Ok(Self { rows })
    }

    /// Matrix dimension.
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// A fill-reducing elimination order by greedy minimum degree.
    ///
    /// `perm[k]` is the original index eliminated `k`-th. Ties go to the
    /// lower index.
    pub fn compute_perm(&self) -> Vec<usize> {
        let n = self.size();
        let mut adj: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for (i, row) in self.rows.iter().enumerate() {
            for &(j, _) in row {
                if j != i {
                    adj[i].insert(j);
                    adj[j].insert(i);
                }
            }
        }

        let mut queue: BTreeSet<(usize, usize)> = adj.iter().enumerate().map(|(v, a)| (a.len(), v)).collect();
        let mut perm = Vec::with_capacity(n);
        while let Some((_, v)) = queue.pop_first() {
            perm.push(v);
            let nbrs = std::mem::take(&mut adj[v]);
            for &u in &nbrs {
                queue.remove(&(adj[u].len(), u));
                adj[u].remove(&v);
            }
            // Eliminating v connects all of its neighbours.
            for &u in &nbrs {
                for &w in &nbrs {
                    if u != w {
                        adj[u].insert(w);
                    }
                }
            }
            for &u in &nbrs {
                queue.insert((adj[u].len(), u));
            }
        }
        perm
    }

    /// Factor as `P A Pᵀ = L Lᵀ` with the minimum-degree permutation `P`.
    ///
    /// # Errors
    /// [`RigError::NotPositiveDefinite`] if a pivot is not positive. The
    /// reported pivot is the original row index.
    pub fn factor(&self) -> Result<LltMatrix> {
        let n = self.size();
        let perm = self.compute_perm();
        let mut inv = vec![0; n];
        for (k, &p) in perm.iter().enumerate() {
            inv[p] = k;
        }

        // Lower triangle of the permuted matrix, by column.
        let mut a_cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for (i, row) in self.rows.iter().enumerate() {
            for &(j, v) in row {
                let (pi, pj) = (inv[i], inv[j]);
                let (r, c) = if pi >= pj { (pi, pj) } else { (pj, pi) };
                a_cols[c].push((r, v));
            }
        }

        let mut cols: Vec<Vec<(usize, f64)>> = Vec::with_capacity(n);
        // l_rows[j] lists (k, l_jk) for k < j.
        let mut l_rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        // next[k] is the first entry of column k at or below the current row.
        let mut next = vec![1usize; n];
        let mut x = vec![0.0; n];
        let mut mark = vec![usize::MAX; n];
        let mut touched: Vec<usize> = Vec::new();

        for j in 0..n {
            touched.clear();
            let mut touch = |i: usize, touched: &mut Vec<usize>, x: &mut [f64]| {
                if mark[i] != j {
                    mark[i] = j;
                    x[i] = 0.0;
                    touched.push(i);
                }
            };

            for &(i, v) in &a_cols[j] {
                touch(i, &mut touched, &mut x);
                x[i] += v;
            }
            touch(j, &mut touched, &mut x);

            for &(k, l_jk) in &l_rows[j] {
                let col = &cols[k];
                debug_assert_eq!(col[next[k]].0, j);
                for &(i, l_ik) in &col[next[k]..] {
                    touch(i, &mut touched, &mut x);
                    x[i] -= l_ik * l_jk;
                }
                next[k] += 1;
            }

            let d = x[j];
            if d.is_nan() || d <= 0.0 {
                return Err(RigError::NotPositiveDefinite {
                    pivot: perm[j],
                    value: d,
                });
            }
            let l_jj = d.sqrt();

            touched.sort_unstable();
            let mut col = Vec::with_capacity(touched.len());
            col.push((j, l_jj));
            for &i in touched.iter().filter(|&&i| i > j) {
                let l = x[i] / l_jj;
                if l != 0.0 {
                    col.push((i, l));
                    l_rows[i].push((j, l));
                }
            }
            cols.push(col);
        }

        let llt = LltMatrix { perm, cols };
        debug!(size = n, nnz = llt.nnz(), "factored sparse matrix");
        Ok(llt)
    }
}

/// A factored [`SpdMatrix`]: `P A Pᵀ = L Lᵀ`.
#[derive(Debug, Clone)]
pub struct LltMatrix {
    perm: Vec<usize>,
    /// Column `j` of `L`: the diagonal first, then rows below it in order.
    cols: Vec<Vec<(usize, f64)>>,
}

impl LltMatrix {
    /// Matrix dimension.
    pub fn size(&self) -> usize {
        self.cols.len()
    }

    /// Number of stored entries in `L`.
    pub fn nnz(&self) -> usize {
        self.cols.iter().map(Vec::len).sum()
    }

    /// Solve `A x = b` in place.
    ///
    /// # Errors
    /// [`RigError::DimensionMismatch`] if `b` has the wrong length.
    pub fn solve(&self, b: &mut [f64]) -> Result<()> {
        let n = self.size();
        if b.len() != n {
            return Err(RigError::DimensionMismatch {
                expected: n,
                actual: b.len(),
            });
        }
        let mut y: Vec<f64> = self.perm.iter().map(|&p| b[p]).collect();

        for (j, col) in self.cols.iter().enumerate() {
            y[j] /= col[0].1;
            let yj = y[j];
            for &(i, l) in &col[1..] {
                y[i] -= l * yj;
            }
        }
        for (j, col) in self.cols.iter().enumerate().rev() {
            let mut s = y[j];
            for &(i, l) in &col[1..] {
                s -= l * y[i];
            }
            y[j] = s / col[0].1;
        }

        for (k, &p) in self.perm.iter().enumerate() {
            b[p] = y[k];
        }
        Ok(())
    }
}
