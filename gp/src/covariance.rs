//! Assembly of covariance matrices from a [`CovarianceKernel`].

use crate::kernels::CovarianceKernel;
use crate::scalar::Scalar;
use ndarray::{Array2, ArrayBase, Data, Ix1, Ix2, Zip};

fn mirror_lower<T: Scalar>(k: &mut Array2<T>) {
    let n = k.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            k[[i, j]] = k[[j, i]];
        }
    }
}

/// Gram matrix `K_y` of the training samples `x` (one sample per row),
/// noise variance included on the diagonal.
///
/// Only the lower triangle is evaluated, the upper one is mirrored so that
/// the result is exactly symmetric.
pub fn gram_matrix<K: CovarianceKernel, T: Scalar>(
    kernel: &K,
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    theta: &ArrayBase<impl Data<Elem = T>, Ix1>,
) -> Array2<T> {
    let n = x.nrows();
    let (x, theta) = (x.view(), theta.view());
    let mut k = Array2::<T>::zeros((n, n));
    Zip::indexed(&mut k).par_for_each(|(i, j), kij| {
        if j <= i {
            *kij = kernel.value(&x.row(i), &x.row(j), &theta, true);
        }
    });
    mirror_lower(&mut k);
    k
}

/// Derivative of the Gram matrix with respect to `theta[idx]`.
///
/// The noise entry (last one) has the analytic derivative `2.sigma_n.I`,
/// other entries are differentiated by complex step.
pub fn gram_derivative<K: CovarianceKernel>(
    kernel: &K,
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    idx: usize,
) -> Array2<f64> {
    let n = x.nrows();
    let noise_idx = kernel.n_params() - 1;
    if idx == noise_idx {
        return Array2::eye(n) * (2. * theta[noise_idx]);
    }
    let (x, theta) = (x.view(), theta.view());
    let mut dk = Array2::<f64>::zeros((n, n));
    Zip::indexed(&mut dk).par_for_each(|(i, j), dkij| {
        if j <= i {
            *dkij = kernel.deriv(&x.row(i), &x.row(j), &theta, idx);
        }
    });
    mirror_lower(&mut dk);
    dk
}

/// Cross-covariance between `x_test` and `x_train`, shape (n_test, n_train), without noise
pub fn cross_covariance<K: CovarianceKernel>(
    kernel: &K,
    x_test: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    x_train: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
) -> Array2<f64> {
    let (x_test, x_train, theta) = (x_test.view(), x_train.view(), theta.view());
    let mut k = Array2::<f64>::zeros((x_test.nrows(), x_train.nrows()));
    Zip::indexed(&mut k).par_for_each(|(i, j), kij| {
        *kij = kernel.value(&x_test.row(i), &x_train.row(j), &theta, false);
    });
    k
}
