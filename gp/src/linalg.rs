//! Cholesky factorization of symmetric positive definite matrices, generic
//! over [`Scalar`].
//!
//! For complex inputs the factorization is the holomorphic extension
//! `A = L.L^T` (transpose, not conjugate transpose), so that solves and
//! log-determinants of a complex-step perturbed matrix carry the derivative
//! in their imaginary parts.

use crate::errors::{GpError, Result};
use crate::scalar::Scalar;
use ndarray::{s, Array1, Array2, ArrayBase, Data, Ix1, Ix2, Zip};
use rayon::prelude::*;

/// Lower triangular factor `L` of `A = L.L^T`
#[derive(Clone, Debug)]
pub struct Cholesky<T: Scalar> {
    l: Array2<T>,
}

fn dot_prefix<T: Scalar>(l: &Array2<T>, i: usize, j: usize, len: usize) -> T {
    Zip::from(l.slice(s![i, ..len]))
        .and(l.slice(s![j, ..len]))
        .fold(T::zero(), |acc, &a, &b| acc + a * b)
}

impl<T: Scalar> Cholesky<T> {
    /// Factorize the symmetric matrix `a`, only its lower triangle is read.
    ///
    /// Fails with [`GpError::NumericalFailure`] when a pivot is not finite or
    /// its real part is not strictly positive relative to the diagonal scale.
    pub fn factor(a: &ArrayBase<impl Data<Elem = T>, Ix2>) -> Result<Self> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(GpError::NumericalFailure(format!(
                "Cholesky factorization of a non square {}x{} matrix",
                n,
                a.ncols()
            )));
        }
        let a = a.view();
        let scale = a.diag().iter().fold(0f64, |m, v| m.max(v.re().abs()));
        let tol = f64::EPSILON * scale;

        let mut l = Array2::<T>::zeros((n, n));
        for j in 0..n {
            let pivot = a[[j, j]] - dot_prefix(&l, j, j, j);
            if !pivot.is_finite() || pivot.re() <= tol {
                return Err(GpError::NumericalFailure(format!(
                    "Matrix is not positive definite (pivot {:e} at row {j})",
                    pivot.re()
                )));
            }
            let ljj = pivot.sqrt();
            l[[j, j]] = ljj;

            let col: Vec<T> = ((j + 1)..n)
                .into_par_iter()
                .map(|i| (a[[i, j]] - dot_prefix(&l, i, j, j)) / ljj)
                .collect();
            l.slice_mut(s![(j + 1).., j])
                .iter_mut()
                .zip(col)
                .for_each(|(lij, v)| *lij = v);
        }
        Ok(Cholesky { l })
    }

    /// Lower triangular factor
    pub fn lower(&self) -> &Array2<T> {
        &self.l
    }

    /// Matrix order
    pub fn dim(&self) -> usize {
        self.l.nrows()
    }

    /// Solve `A.x = b`
    pub fn solve_vec(&self, b: &ArrayBase<impl Data<Elem = T>, Ix1>) -> Array1<T> {
        let n = self.dim();
        let l = &self.l;
        let mut x = b.to_owned();
        // L.y = b
        for i in 0..n {
            let mut v = x[i];
            for k in 0..i {
                v -= l[[i, k]] * x[k];
            }
            x[i] = v / l[[i, i]];
        }
        // L^T.x = y
        for i in (0..n).rev() {
            let mut v = x[i];
            for k in (i + 1)..n {
                v -= l[[k, i]] * x[k];
            }
            x[i] = v / l[[i, i]];
        }
        x
    }

    /// Solve `A.X = B` column by column
    pub fn solve_mat(&self, b: &ArrayBase<impl Data<Elem = T>, Ix2>) -> Array2<T> {
        let mut x = Array2::<T>::zeros(b.raw_dim());
        let b = b.view();
        Zip::from(x.columns_mut())
            .and(b.columns())
            .par_for_each(|mut xj, bj| xj.assign(&self.solve_vec(&bj)));
        x
    }

    /// Natural logarithm of the determinant of `A`
    pub fn log_det(&self) -> T {
        self.l.diag().iter().map(|v| v.ln()).sum::<T>() * 2.
    }
}
