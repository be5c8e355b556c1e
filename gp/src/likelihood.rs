//! Maximum a posteriori (MAP) training objective of a Gaussian process.
//!
//! The objective is the negative log marginal likelihood of the training
//! targets
//!
//! ```text
//! nMAP(theta) = 1/2 y^T alpha + 1/2 log|K_y| + n/2 log(2 pi),   K_y alpha = y
//! ```
//!
//! and its gradient
//!
//! ```text
//! d nMAP / d theta_j = -1/2 (alpha^T dK_j alpha - trace(K_y^-1 dK_j))
//! ```
//!
//! where `K_y^-1 dK_j` is obtained by solving against `dK_j` with the
//! Cholesky factor of `K_y`.

use crate::covariance::{cross_covariance, gram_derivative, gram_matrix};
use crate::errors::{GpError, Result};
use crate::kernels::CovarianceKernel;
use crate::linalg::Cholesky;
use crate::metrics::mean_relative_error;
use crate::scalar::{Scalar, COMPLEX_STEP};
use linfa::dataset::Dataset;
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2, Zip};
use num_complex::Complex64;
use rayon::prelude::*;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Design variables handed over by the optimizer, theta under the `theta` key
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct DesignVars {
    /// Kernel hyperparameters
    pub theta: Array1<f64>,
}

/// Objective values returned to the optimizer under the `obj` key
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Funcs {
    /// Negative log marginal likelihood
    pub obj: f64,
}

/// Gradient of `obj` with respect to the `theta` design variables
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ObjSens {
    /// d obj / d theta
    pub theta: Array1<f64>,
}

/// Sensitivities returned to the optimizer under the `obj` key
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct FuncsSens {
    /// Sensitivities of the objective
    pub obj: ObjSens,
}

/// Outcome of comparing the analytic gradient to a complex-step derivative
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientCheck {
    /// Complex-step directional derivative of nMAP
    pub complex_step: f64,
    /// Analytic gradient projected on the direction
    pub analytic: f64,
    /// Relative discrepancy
    pub rel_error: f64,
}

impl GradientCheck {
    /// Fails with a numerical failure when the relative discrepancy exceeds `tol`
    pub fn verify(self, tol: f64) -> Result<Self> {
        if self.rel_error > tol {
            return Err(GpError::NumericalFailure(format!(
                "Gradient mismatch: complex step {:e} vs analytic {:e} (rel. error {:e})",
                self.complex_step, self.analytic, self.rel_error
            )));
        }
        Ok(self)
    }
}

/// One evaluation at the optimizer boundary
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// Objective values
    pub funcs: Funcs,
    /// Sensitivities, when requested
    pub sens: Option<FuncsSens>,
    /// Set when the Gram matrix could not be factorized
    pub fail: bool,
    alpha: Option<Array1<f64>>,
}

impl Evaluation {
    /// Weights `K_y^-1 y` of the training targets, None on failure
    pub fn alpha(&self) -> Option<&Array1<f64>> {
        self.alpha.as_ref()
    }
}

/// Training problem: a kernel, fixed training samples and held-out samples
#[derive(Clone, Debug)]
pub struct MapProblem<K: CovarianceKernel> {
    kernel: K,
    train: Dataset<f64, f64, Ix1>,
    test: Dataset<f64, f64, Ix1>,
}

impl<K: CovarianceKernel> MapProblem<K> {
    /// Build a problem, checking that samples match the kernel input size
    pub fn new(
        kernel: K,
        train: Dataset<f64, f64, Ix1>,
        test: Dataset<f64, f64, Ix1>,
    ) -> Result<Self> {
        for (name, ds) in [("training", &train), ("test", &test)] {
            if ds.records().ncols() != kernel.n_features() {
                return Err(GpError::ConfigurationError(format!(
                    "Kernel expects {} features, {} set has {}",
                    kernel.n_features(),
                    name,
                    ds.records().ncols()
                )));
            }
        }
        if train.records().nrows() == 0 {
            return Err(GpError::ConfigurationError("Empty training set".to_string()));
        }
        Ok(MapProblem {
            kernel,
            train,
            test,
        })
    }

    /// Covariance kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Training samples
    pub fn train(&self) -> &Dataset<f64, f64, Ix1> {
        &self.train
    }

    /// Held-out samples
    pub fn test(&self) -> &Dataset<f64, f64, Ix1> {
        &self.test
    }

    /// Number of hyperparameters
    pub fn n_params(&self) -> usize {
        self.kernel.n_params()
    }

    fn check_theta_len(&self, len: usize) -> Result<()> {
        if len != self.n_params() {
            return Err(GpError::ConfigurationError(format!(
                "Expected {} hyperparameters, got {}",
                self.n_params(),
                len
            )));
        }
        Ok(())
    }

    fn factor<T: Scalar>(
        &self,
        theta: &ArrayBase<impl Data<Elem = T>, Ix1>,
    ) -> Result<(T, Array1<T>, Cholesky<T>)> {
        self.check_theta_len(theta.len())?;
        let x = self.train.records();
        let y = self.train.targets().mapv(T::from_re);
        let k = gram_matrix(&self.kernel, x, theta);
        let chol = Cholesky::factor(&k)?;
        let alpha = chol.solve_vec(&y);

        let n = x.nrows() as f64;
        let fit: T = y.iter().zip(alpha.iter()).map(|(&yi, &ai)| yi * ai).sum();
        let obj = fit * 0.5 + chol.log_det() * 0.5 + 0.5 * n * (2. * PI).ln();
        if !obj.is_finite() {
            return Err(GpError::NumericalFailure(format!(
                "Non finite objective {obj:?}"
            )));
        }
        Ok((obj, alpha, chol))
    }

    /// Negative log marginal likelihood and weights `alpha = K_y^-1 y`.
    ///
    /// Generic over [`Scalar`] so it can be differentiated by complex step.
    pub fn nmap<T: Scalar>(
        &self,
        theta: &ArrayBase<impl Data<Elem = T>, Ix1>,
    ) -> Result<(T, Array1<T>)> {
        let (obj, alpha, _) = self.factor(theta)?;
        Ok((obj, alpha))
    }

    /// Gradient of [`MapProblem::nmap`] with respect to theta
    pub fn nmap_grad(&self, theta: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<Array1<f64>> {
        let (_, alpha, chol) = self.factor(theta)?;
        Ok(self.gradient(theta, &alpha, &chol))
    }

    /// Objective and gradient sharing one factorization of `K_y`
    pub fn nmap_and_grad(
        &self,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<(f64, Array1<f64>)> {
        let (obj, _, grad) = self.nmap_alpha_grad(theta)?;
        Ok((obj, grad))
    }

    /// Objective, weights `alpha` and gradient
    pub(crate) fn nmap_alpha_grad(
        &self,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<(f64, Array1<f64>, Array1<f64>)> {
        let (obj, alpha, chol) = self.factor(theta)?;
        let grad = self.gradient(theta, &alpha, &chol);
        Ok((obj, alpha, grad))
    }

    fn gradient(
        &self,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        alpha: &Array1<f64>,
        chol: &Cholesky<f64>,
    ) -> Array1<f64> {
        let x = self.train.records();
        let theta = theta.view();
        let grad: Vec<f64> = (0..self.n_params())
            .into_par_iter()
            .map(|j| {
                let dk: Array2<f64> = gram_derivative(&self.kernel, x, &theta, j);
                let fit = alpha.dot(&dk.dot(alpha));
                let trace = chol.solve_mat(&dk).diag().sum();
                debug!("grad[{j}]: fit term {fit:e}, trace term {trace:e}");
                -0.5 * (fit - trace)
            })
            .collect();
        Array1::from_vec(grad)
    }

    /// Predicted log-loads at `x` given theta and training weights `alpha`
    pub fn predict(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        alpha: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array1<f64> {
        cross_covariance(&self.kernel, x, self.train.records(), theta).dot(alpha)
    }

    /// Mean relative error of critical loads predicted on the held-out set.
    ///
    /// Fails with a configuration error when the held-out set is empty.
    pub fn post_evaluate(
        &self,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        alpha: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<f64> {
        let pred = self.predict(self.test.records(), theta, alpha);
        mean_relative_error(&pred, self.test.targets())
    }

    /// Compare the complex-step derivative of nMAP along `direction`
    /// with the analytic gradient projected on `direction`.
    pub fn check_gradient(
        &self,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        direction: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<GradientCheck> {
        self.check_theta_len(theta.len())?;
        self.check_theta_len(direction.len())?;
        let theta_c = Zip::from(theta)
            .and(direction)
            .map_collect(|&t, &d| Complex64::new(t, d * COMPLEX_STEP));
        let (obj_c, _) = self.nmap(&theta_c)?;
        let complex_step = obj_c.im / COMPLEX_STEP;
        let analytic = self.nmap_grad(theta)?.dot(direction);
        let rel_error = if complex_step == analytic {
            0.
        } else {
            ((complex_step - analytic) / complex_step.abs().max(f64::MIN_POSITIVE)).abs()
        };
        Ok(GradientCheck {
            complex_step,
            analytic,
            rel_error,
        })
    }

    /// Same as [`MapProblem::check_gradient`] along the `idx`-th axis
    pub fn check_gradient_component(
        &self,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        idx: usize,
    ) -> Result<GradientCheck> {
        if idx >= self.n_params() {
            return Err(GpError::ConfigurationError(format!(
                "No hyperparameter at index {idx}"
            )));
        }
        let mut direction = Array1::zeros(self.n_params());
        direction[idx] = 1.;
        self.check_gradient(theta, &direction)
    }

    /// Objective, and sensitivities when `with_sens` is set, in the optimizer
    /// keyed format sharing one factorization of `K_y`.
    ///
    /// A numerical failure gives an infinite objective, zero sensitivities
    /// and `fail` set. Other errors are returned.
    pub fn evaluate(&self, dvs: &DesignVars, with_sens: bool) -> Result<Evaluation> {
        let res = if with_sens {
            self.nmap_alpha_grad(&dvs.theta).map(|(obj, alpha, grad)| (obj, alpha, Some(grad)))
        } else {
            self.nmap(&dvs.theta).map(|(obj, alpha)| (obj, alpha, None))
        };
        match res {
            Ok((obj, alpha, grad)) => Ok(Evaluation {
                funcs: Funcs { obj },
                sens: grad.map(|theta| FuncsSens {
                    obj: ObjSens { theta },
                }),
                fail: false,
                alpha: Some(alpha),
            }),
            Err(err) if err.is_numerical() => Ok(Evaluation {
                funcs: Funcs { obj: f64::INFINITY },
                sens: with_sens.then(|| FuncsSens {
                    obj: ObjSens {
                        theta: Array1::zeros(dvs.theta.len()),
                    },
                }),
                fail: true,
                alpha: None,
            }),
            Err(err) => Err(err),
        }
    }

    /// Objective in the optimizer keyed format, `fail` is set on numerical failure
    pub fn objective(&self, dvs: &DesignVars) -> Result<(Funcs, bool)> {
        let eval = self.evaluate(dvs, false)?;
        Ok((eval.funcs, eval.fail))
    }

    /// Gradient in the optimizer keyed format, `fail` is set on numerical failure
    pub fn sensitivity(&self, dvs: &DesignVars) -> Result<(FuncsSens, bool)> {
        let eval = self.evaluate(dvs, true)?;
        let sens = eval.sens.unwrap_or_else(|| FuncsSens {
            obj: ObjSens {
                theta: Array1::zeros(dvs.theta.len()),
            },
        });
        Ok((sens, eval.fail))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dataset::shuffle_split;
    use crate::hyperparameters::{N_THETA, THETA0, THETA_BOUNDS};
    use crate::kernels::BucklingKernel;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256Plus;

    /// Synthetic buckling data: log(lam) = -0.5 log(rho_0) + noise
    pub(crate) fn synthetic_dataset(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let x = Array2::from_shape_fn((n, 4), |(_, j)| match j {
            1 => rng.gen_range(-1.0..1.5),
            3 => rng.gen_range(0.0..1.5),
            _ => rng.gen_range(0.0..1.0),
        });
        let y = x
            .column(1)
            .mapv(|log_rho0| -0.5 * log_rho0 + 0.01 * rng.gen_range(-1.0..1.0));
        (x, y)
    }

    pub(crate) fn problem(n_train: usize, n_test: usize) -> MapProblem<BucklingKernel> {
        let (x, y) = synthetic_dataset(n_train + n_test, 0);
        let split = shuffle_split(&x, &y, n_train, n_test, 1234567).unwrap();
        MapProblem::new(BucklingKernel::default(), split.train, split.test).unwrap()
    }

    fn theta0() -> Array1<f64> {
        Array1::from_vec(THETA0.to_vec())
    }

    #[test]
    fn test_end_to_end_at_theta0() {
        let pb = problem(15, 5);
        let theta = theta0();
        let (obj, alpha) = pb.nmap(&theta).unwrap();
        assert!(obj.is_finite());
        assert_eq!(alpha.len(), 15);

        let grad = pb.nmap_grad(&theta).unwrap();
        assert_eq!(grad.len(), N_THETA);
        assert!(grad.iter().all(|g| g.is_finite()));

        let err = pb.post_evaluate(&theta, &alpha).unwrap();
        assert!(err >= 0.);
    }

    #[test]
    fn test_nmap_matches_direct_formula() {
        let pb = problem(6, 0);
        let theta = theta0();
        let (obj, alpha) = pb.nmap(&theta).unwrap();
        let k = gram_matrix(pb.kernel(), pb.train().records(), &theta);
        let y = pb.train().targets();
        assert_abs_diff_eq!(k.dot(&alpha), y.to_owned(), epsilon = 1e-10);

        let log_det = Cholesky::factor(&k).unwrap().log_det();
        let expected = 0.5 * y.dot(&alpha) + 0.5 * log_det + 3. * (2. * PI).ln();
        assert_abs_diff_eq!(obj, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_matches_complex_step_random_directions() {
        let pb = problem(20, 0);
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        for _ in 0..3 {
            let theta: Array1<f64> = THETA_BOUNDS
                .iter()
                .map(|&(lo, up)| lo + (up - lo) * rng.gen_range(0.1..0.9))
                .collect();
            let direction: Array1<f64> = (0..N_THETA).map(|_| rng.gen::<f64>()).collect();
            let check = pb.check_gradient(&theta, &direction).unwrap();
            assert!(
                check.rel_error < 1e-4,
                "complex step {} vs analytic {}",
                check.complex_step,
                check.analytic
            );
        }
    }

    #[test]
    fn test_gradient_components() {
        let pb = problem(12, 0);
        let theta = theta0();
        let grad = pb.nmap_grad(&theta).unwrap();
        for idx in 0..N_THETA {
            let check = pb.check_gradient_component(&theta, idx).unwrap();
            assert_abs_diff_eq!(check.analytic, grad[idx], epsilon = 1e-14);
            assert_abs_diff_eq!(
                check.complex_step,
                check.analytic,
                epsilon = 1e-6 * check.analytic.abs().max(1.)
            );
        }
        assert!(pb.check_gradient_component(&theta, N_THETA).is_err());
    }

    #[test]
    fn test_verify_gradient() {
        let pb = problem(10, 0);
        let direction = Array1::ones(N_THETA);
        let check = pb.check_gradient(&theta0(), &direction).unwrap();
        assert!(check.verify(1e-4).is_ok());
        let res = check.verify(-1.);
        assert!(matches!(res, Err(GpError::NumericalFailure(_))));
    }

    #[test]
    fn test_evaluate_shares_factorization() {
        let pb = problem(10, 0);
        let theta = theta0();
        let dvs = DesignVars {
            theta: theta.clone(),
        };
        let eval = pb.evaluate(&dvs, true).unwrap();
        assert!(!eval.fail);
        let (obj, grad) = pb.nmap_and_grad(&theta).unwrap();
        assert_eq!(eval.funcs.obj, obj);
        assert_eq!(eval.sens.unwrap().obj.theta, grad);
        let (_, alpha) = pb.nmap(&theta).unwrap();
        assert_eq!(eval.alpha, Some(alpha));

        let eval = pb.evaluate(&dvs, false).unwrap();
        assert!(eval.sens.is_none());
    }

    #[test]
    fn test_keyed_boundary_propagates_configuration_errors() {
        let pb = problem(5, 0);
        let dvs = DesignVars {
            theta: array![0.1, 0.2],
        };
        assert!(matches!(
            pb.objective(&dvs),
            Err(GpError::ConfigurationError(_))
        ));
        assert!(matches!(
            pb.sensitivity(&dvs),
            Err(GpError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_objective_is_deterministic() {
        let (o1, _) = problem(10, 3).nmap(&theta0()).unwrap();
        let (o2, _) = problem(10, 3).nmap(&theta0()).unwrap();
        assert_eq!(o1, o2);
    }

    #[test]
    fn test_wrong_theta_length() {
        let pb = problem(5, 0);
        let res = pb.nmap(&array![0.1, 0.2]);
        assert!(matches!(res, Err(GpError::ConfigurationError(_))));
    }

    #[test]
    fn test_post_evaluate_without_test_set() {
        let pb = problem(5, 0);
        let (_, alpha) = pb.nmap(&theta0()).unwrap();
        assert!(pb.post_evaluate(&theta0(), &alpha).is_err());
    }

    #[test]
    fn test_keyed_boundary_flags_numerical_failure() {
        let x = array![[0.1, 0.2, 0.3, 0.4], [0.2, -0.1, 0.5, 0.3]];
        let y = array![0.1, 0.1];
        let pb = MapProblem::new(
            BucklingKernel::default(),
            Dataset::new(x, y),
            Dataset::new(Array2::zeros((0, 4)), Array1::zeros(0)),
        )
        .unwrap();
        // negative gamma constant makes the Gram matrix indefinite
        let mut theta = theta0();
        theta[9] = -50.;
        let dvs = DesignVars { theta };
        let (funcs, fail) = pb.objective(&dvs).unwrap();
        assert!(fail);
        assert_eq!(funcs.obj, f64::INFINITY);
        let (sens, fail) = pb.sensitivity(&dvs).unwrap();
        assert!(fail);
        assert_eq!(sens.obj.theta, Array1::<f64>::zeros(N_THETA));

        let dvs = DesignVars { theta: theta0() };
        let (funcs, fail) = pb.objective(&dvs).unwrap();
        assert!(!fail && funcs.obj.is_finite());
        let (sens, fail) = pb.sensitivity(&dvs).unwrap();
        assert!(!fail);
        assert_eq!(sens.obj.theta.len(), N_THETA);
    }
}
