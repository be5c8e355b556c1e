use crate::errors::{GpError, Result};
use ndarray::{Array1, ArrayBase, Data, Ix1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of hyperparameters of the [`BucklingKernel`](crate::kernels::BucklingKernel)
pub const N_THETA: usize = 16;

/// Index of the noise standard deviation, always the last hyperparameter
pub const NOISE_INDEX: usize = N_THETA - 1;

/// Role of each buckling kernel hyperparameter
pub const THETA_NAMES: [&str; N_THETA] = [
    "boundary-layer constant",
    "SE factor rho_0",
    "length scale rho_0",
    "length scale gamma",
    "SE factor secondary",
    "length scale xi",
    "length scale zeta",
    "window boundary rho_0",
    "window boundary gamma",
    "gamma constant",
    "gamma slope",
    "xi linear slope",
    "xi quadratic slope",
    "zeta linear slope",
    "zeta quadratic slope",
    "noise std dev",
];

/// Initial guess used to train the buckling kernel
pub const THETA0: [f64; N_THETA] = [
    0.1, 0.05, 0.2, 0.3, 0.01, 0.5, 0.3, 1.0, 0.3, 1.0, 0.1, 0.1, 0.01, 0.02, 0.01, 0.1,
];

/// Search space of the buckling kernel hyperparameters as (lower, upper)
pub const THETA_BOUNDS: [(f64, f64); N_THETA] = [
    (0.02, 0.3),
    (0.01, 1.0),
    (0.05, 1.0),
    (0.05, 1.0),
    (1e-3, 0.3),
    (0.1, 1.0),
    (0.1, 1.0),
    (0.5, 2.0),
    (0.1, 1.0),
    (0.01, 5.0),
    (0.01, 3.0),
    (0.01, 3.0),
    (1e-3, 0.1),
    (1e-3, 0.1),
    (1e-3, 0.1),
    (1e-3, 1.0),
];

/// Initial guess and bounds of the kernel hyperparameter vector theta.
///
/// The last entry is the noise standard deviation and has to stay positive.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Hyperparameters {
    init: Array1<f64>,
    bounds: Vec<(f64, f64)>,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            init: Array1::from_vec(THETA0.to_vec()),
            bounds: THETA_BOUNDS.to_vec(),
        }
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, (v, (lo, up))) in self.init.iter().zip(&self.bounds).enumerate() {
            let name = THETA_NAMES.get(i).copied().unwrap_or("theta");
            writeln!(f, "theta[{i:2}] = {v:<8} in [{lo}, {up}]  ({name})")?;
        }
        Ok(())
    }
}

impl Hyperparameters {
    /// Build from an initial guess and bounds, checked later by [`Hyperparameters::validate`]
    pub fn new(init: Array1<f64>, bounds: Vec<(f64, f64)>) -> Self {
        Hyperparameters { init, bounds }
    }

    /// Get initial theta
    pub fn init(&self) -> &Array1<f64> {
        &self.init
    }

    /// Get bounds as (lower, upper)
    pub fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    /// Set initial theta
    pub fn with_init(mut self, init: Array1<f64>) -> Self {
        self.init = init;
        self
    }

    /// Set bounds
    pub fn with_bounds(mut self, bounds: Vec<(f64, f64)>) -> Self {
        self.bounds = bounds;
        self
    }

    /// Number of hyperparameters
    pub fn len(&self) -> usize {
        self.init.len()
    }

    /// Whether there are no hyperparameters
    pub fn is_empty(&self) -> bool {
        self.init.is_empty()
    }

    /// Check the hyperparameters against a kernel expecting `n_params` entries
    pub fn validate(&self, n_params: usize) -> Result<()> {
        if n_params == 0 || self.init.len() != n_params || self.bounds.len() != n_params {
            return Err(GpError::ConfigurationError(format!(
                "Expected {} hyperparameters, got {} initial values and {} bounds",
                n_params,
                self.init.len(),
                self.bounds.len()
            )));
        }
        for (i, &(lo, up)) in self.bounds.iter().enumerate() {
            if !(lo.is_finite() && up.is_finite()) || lo > up {
                return Err(GpError::ConfigurationError(format!(
                    "Bad bounds [{lo}, {up}] for theta[{i}]"
                )));
            }
        }
        self.check_within_bounds(&self.init)?;
        let (noise_lo, _) = self.bounds[n_params - 1];
        if noise_lo <= 0. {
            return Err(GpError::ConfigurationError(format!(
                "Noise standard deviation lower bound should be positive, got {noise_lo}"
            )));
        }
        Ok(())
    }

    /// Check that every component of `theta` lies within its bounds
    pub fn check_within_bounds(&self, theta: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<()> {
        if theta.len() != self.bounds.len() {
            return Err(GpError::ConfigurationError(format!(
                "Theta length {} does not match the {} bounds",
                theta.len(),
                self.bounds.len()
            )));
        }
        for (i, (&v, &(lo, up))) in theta.iter().zip(&self.bounds).enumerate() {
            if !(lo..=up).contains(&v) {
                return Err(GpError::ConfigurationError(format!(
                    "theta[{i}] = {v} violates bounds [{lo}, {up}]"
                )));
            }
        }
        Ok(())
    }

    /// Project `theta` onto the bounds box
    pub fn clamp(&self, theta: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Array1<f64> {
        let mut res = theta.to_owned();
        res.iter_mut()
            .zip(&self.bounds)
            .for_each(|(v, &(lo, up))| *v = v.clamp(lo, up));
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_default_hyperparameters_are_valid() {
        let hp = Hyperparameters::default();
        assert_eq!(hp.len(), N_THETA);
        hp.validate(N_THETA).expect("default theta0 within bounds");
    }

    #[test]
    fn test_length_mismatch() {
        let hp = Hyperparameters::default().with_init(array![0.1, 0.2]);
        assert!(matches!(
            hp.validate(N_THETA),
            Err(GpError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_init_out_of_bounds() {
        let mut init = Array1::from_vec(THETA0.to_vec());
        init[3] = 2.;
        let hp = Hyperparameters::default().with_init(init);
        let err = hp.validate(N_THETA).unwrap_err();
        assert!(err.to_string().contains("theta[3]"));
    }

    #[test]
    fn test_noise_lower_bound_positive() {
        let mut bounds = THETA_BOUNDS.to_vec();
        bounds[NOISE_INDEX] = (0., 1.);
        let hp = Hyperparameters::default().with_bounds(bounds);
        assert!(hp.validate(N_THETA).is_err());
    }

    #[test]
    fn test_clamp() {
        let hp = Hyperparameters::new(array![0.5, 0.5], vec![(0., 1.), (1., 2.)]);
        assert_eq!(hp.clamp(&array![-1., 3.]), array![0., 2.]);
    }
}
