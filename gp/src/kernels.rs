//! Covariance kernels of the buckling surrogate.
//!
//! A kernel is evaluated on a pair of feature vectors given a hyperparameter
//! vector theta. It is written generically over [`Scalar`] so that theta may
//! carry a complex perturbation: [`CovarianceKernel::deriv`] relies on it to
//! compute exact derivatives with respect to theta by complex-step
//! differentiation.

use crate::hyperparameters::{N_THETA, NOISE_INDEX};
use crate::scalar::{soft_abs, soft_relu, Scalar, COMPLEX_STEP, SOFT_STEEPNESS};
use ndarray::{ArrayBase, Data, Ix1};
use num_complex::Complex64;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of input features: `[log(1+xi), log(rho_0), log(1+10^3.zeta), log(1+gamma)]`
pub const N_FEATURES: usize = 4;

const XI: usize = 0;
const RHO0: usize = 1;
const ZETA: usize = 2;
const GAMMA: usize = 3;

/// A trait for covariance kernels k(xp, xq; theta) trained by MAP estimation
///
/// The last hyperparameter is the noise standard deviation sigma_n: when
/// noise is included, `sigma_n^2` is added to the self-covariance of a sample,
/// that is when `xp` and `xq` are the very same sample in memory.
pub trait CovarianceKernel: Clone + fmt::Display + Send + Sync {
    /// Expected length of feature vectors
    fn n_features(&self) -> usize;

    /// Expected length of the hyperparameter vector
    fn n_params(&self) -> usize;

    /// Kernel value between `xp` and `xq`
    fn value<T: Scalar>(
        &self,
        xp: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        xq: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        theta: &ArrayBase<impl Data<Elem = T>, Ix1>,
        include_noise: bool,
    ) -> T;

    /// Derivative of the kernel (noise included) with respect to `theta[idx]`
    /// computed by complex-step differentiation.
    fn deriv(
        &self,
        xp: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        xq: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        idx: usize,
    ) -> f64 {
        let mut theta_c = theta.mapv(Complex64::from_re);
        theta_c[idx].im = COMPLEX_STEP;
        self.value(xp, xq, &theta_c, true).im() / COMPLEX_STEP
    }
}

/// Returns true when both views point at the same sample
#[inline]
pub(crate) fn same_sample(
    xp: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    xq: &ArrayBase<impl Data<Elem = f64>, Ix1>,
) -> bool {
    std::ptr::eq(xp.as_ptr(), xq.as_ptr()) && xp.strides() == xq.strides()
}

/// Composite kernel modelling log buckling loads of composite panels.
///
/// With `d = xp - xq`, `s` the soft ReLU and `a` the soft absolute value:
///
/// * boundary layer: `k_bl = theta0 + s(-xp_rho) s(-xq_rho)`
/// * gamma linear: `k_gam = theta9 + theta10 xp_gam xq_gam`
/// * windows: `w_r(x) = s(theta7 - a(x_rho))`, `w_g(x) = s(theta8 - x_gam)`
/// * rho_0 SE: `theta1 exp(-d_rho^2 / 2 theta2^2) w_r(xp) w_r(xq)`
/// * secondary SE: `theta4 exp(-d_gam^2 / 2 theta3^2 - d_xi^2 / 2 theta5^2 - d_zeta^2 / 2 theta6^2)`
///   windowed by `w_r(xp) w_r(xq) w_g(xp) w_g(xq)`
/// * trends: `theta11 xp_xi xq_xi + theta12 xp_xi^2 xq_xi^2`
///   and `theta13 xp_zeta xq_zeta + theta14 xp_zeta^2 xq_zeta^2`
///
/// `k = k_bl k_gam + SE terms + trends (+ theta15^2 on self-covariance)`.
///
/// Each term is a positive semi-definite kernel with non-negative
/// coefficients within the bounds, hence the kernel is symmetric and PSD.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct BucklingKernel {
    steepness: f64,
}

impl Default for BucklingKernel {
    fn default() -> Self {
        BucklingKernel {
            steepness: SOFT_STEEPNESS,
        }
    }
}

impl fmt::Display for BucklingKernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BucklingKernel(steepness={})", self.steepness)
    }
}

impl BucklingKernel {
    /// Kernel with the given steepness of the soft surrogates
    pub fn new(steepness: f64) -> Self {
        BucklingKernel { steepness }
    }

    /// Steepness used in soft ReLU and soft absolute value
    pub fn steepness(&self) -> f64 {
        self.steepness
    }

    fn rho0_window<T: Scalar>(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>, bound: T) -> T {
        soft_relu(bound - soft_abs(x[RHO0], self.steepness), self.steepness)
    }

    fn gamma_window<T: Scalar>(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>, bound: T) -> T {
        soft_relu(bound - x[GAMMA], self.steepness)
    }
}

impl CovarianceKernel for BucklingKernel {
    fn n_features(&self) -> usize {
        N_FEATURES
    }

    fn n_params(&self) -> usize {
        N_THETA
    }

    fn value<T: Scalar>(
        &self,
        xp: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        xq: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        theta: &ArrayBase<impl Data<Elem = T>, Ix1>,
        include_noise: bool,
    ) -> T {
        let rho = self.steepness;
        let sq = |v: f64| v * v;

        // thin plate buckling grows as rho_0 goes to zero
        let bl = theta[0] + soft_relu(-xp[RHO0], rho) * soft_relu(-xq[RHO0], rho);
        let gam = theta[9] + theta[10] * (xp[GAMMA] * xq[GAMMA]);

        let wr = self.rho0_window(xp, theta[7]) * self.rho0_window(xq, theta[7]);
        let wg = self.gamma_window(xp, theta[8]) * self.gamma_window(xq, theta[8]);

        let se_rho0 = theta[1]
            * (T::from_re(-0.5 * sq(xp[RHO0] - xq[RHO0])) / (theta[2] * theta[2])).exp()
            * wr;

        let r2 = T::from_re(sq(xp[GAMMA] - xq[GAMMA])) / (theta[3] * theta[3])
            + T::from_re(sq(xp[XI] - xq[XI])) / (theta[5] * theta[5])
            + T::from_re(sq(xp[ZETA] - xq[ZETA])) / (theta[6] * theta[6]);
        let se_secondary = theta[4] * (r2 * -0.5).exp() * wr * wg;

        let xi = theta[11] * (xp[XI] * xq[XI]) + theta[12] * sq(xp[XI] * xq[XI]);
        let zeta = theta[13] * (xp[ZETA] * xq[ZETA]) + theta[14] * sq(xp[ZETA] * xq[ZETA]);

        let mut k = bl * gam + se_rho0 + se_secondary + xi + zeta;
        if include_noise && same_sample(xp, xq) {
            k += theta[NOISE_INDEX] * theta[NOISE_INDEX];
        }
        k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparameters::{THETA0, THETA_BOUNDS};
    use crate::scalar::complex_step;
    use approx::assert_abs_diff_eq;
    use finitediff::FiniteDiff;
    use ndarray::{array, Array1, Array2};
    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256Plus;

    fn theta0() -> Array1<f64> {
        Array1::from_vec(THETA0.to_vec())
    }

    fn random_features(n: usize, seed: u64) -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        Array2::from_shape_fn((n, N_FEATURES), |(_, j)| match j {
            RHO0 => rng.gen_range(-1.5..1.5),
            GAMMA => rng.gen_range(0.0..2.0),
            _ => rng.gen_range(0.0..1.0),
        })
    }

    fn random_theta(seed: u64) -> Array1<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        THETA_BOUNDS
            .iter()
            .map(|&(lo, up)| rng.gen_range(lo..=up))
            .collect()
    }

    #[test]
    fn test_kernel_symmetry() {
        let kernel = BucklingKernel::default();
        let x = random_features(10, 42);
        let thetas = std::iter::once(theta0()).chain((0..5).map(random_theta));
        for theta in thetas {
            for a in x.rows() {
                for b in x.rows() {
                    let kab: f64 = kernel.value(&a, &b, &theta, true);
                    let kba: f64 = kernel.value(&b, &a, &theta, true);
                    assert_abs_diff_eq!(kab, kba, epsilon = 1e-12 * kab.abs().max(1.));
                }
            }
        }
    }

    #[test]
    fn test_noise_only_on_self_covariance() {
        let kernel = BucklingKernel::default();
        let x = array![[0.2, -0.3, 0.1, 0.5]];
        let copy = x.clone();
        let theta = theta0();
        let with_noise: f64 = kernel.value(&x.row(0), &x.row(0), &theta, true);
        let without: f64 = kernel.value(&x.row(0), &x.row(0), &theta, false);
        let other: f64 = kernel.value(&x.row(0), &copy.row(0), &theta, true);
        assert_abs_diff_eq!(with_noise - without, 0.1 * 0.1, epsilon = 1e-14);
        assert_abs_diff_eq!(other, without, epsilon = 1e-14);
    }

    #[test]
    fn test_deriv_of_linear_terms() {
        let kernel = BucklingKernel::default();
        let x = random_features(2, 7);
        let (p, q) = (x.row(0), x.row(1));
        let theta = theta0();

        assert_abs_diff_eq!(kernel.deriv(&p, &q, &theta, 11), p[XI] * q[XI], epsilon = 1e-14);
        assert_abs_diff_eq!(
            kernel.deriv(&p, &q, &theta, 14),
            (p[ZETA] * q[ZETA]).powi(2),
            epsilon = 1e-14
        );
        let bl = theta[0] + soft_relu(-p[RHO0], 10.) * soft_relu(-q[RHO0], 10.);
        assert_abs_diff_eq!(kernel.deriv(&p, &q, &theta, 9), bl, epsilon = 1e-14);
        assert_abs_diff_eq!(
            kernel.deriv(&p, &q, &theta, 10),
            bl * p[GAMMA] * q[GAMMA],
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_deriv_noise() {
        let kernel = BucklingKernel::default();
        let x = random_features(2, 3);
        let theta = theta0();
        let d = kernel.deriv(&x.row(0), &x.row(0), &theta, NOISE_INDEX);
        assert_abs_diff_eq!(d, 2. * theta[NOISE_INDEX], epsilon = 1e-14);
        let d = kernel.deriv(&x.row(0), &x.row(1), &theta, NOISE_INDEX);
        assert_abs_diff_eq!(d, 0., epsilon = 1e-14);
    }

    #[test]
    fn test_deriv_matches_complex_step_of_kernel() {
        let kernel = BucklingKernel::default();
        let x = random_features(4, 11);
        let theta = theta0();
        for idx in 0..N_THETA {
            for (i, j) in [(0, 1), (2, 3), (1, 1)] {
                let (p, q) = (x.row(i), x.row(j));
                let expected = complex_step(
                    |z| {
                        let mut theta_c = theta.mapv(Complex64::from_re);
                        theta_c[idx] = z;
                        kernel.value(&p, &q, &theta_c, true)
                    },
                    theta[idx],
                );
                let d = kernel.deriv(&p, &q, &theta, idx);
                assert_abs_diff_eq!(d, expected, epsilon = 1e-8 * expected.abs().max(1.));
            }
        }
    }

    #[test]
    fn test_deriv_matches_finite_differences() {
        let kernel = BucklingKernel::default();
        let x = random_features(3, 5);
        let (p, q) = (x.row(0), x.row(2));
        let theta = theta0();
        let f = |t: &Vec<f64>| -> f64 { kernel.value(&p, &q, &Array1::from_vec(t.clone()), true) };
        let fd = theta.to_vec().central_diff(&f);
        for (idx, g) in fd.into_iter().enumerate() {
            assert_abs_diff_eq!(kernel.deriv(&p, &q, &theta, idx), g, epsilon = 1e-6);
        }
    }
}
