use crate::dataset::DEFAULT_SEED;
use crate::errors::{GpError, Result};
use crate::hyperparameters::Hyperparameters;
use crate::kernels::{BucklingKernel, CovarianceKernel};
use crate::optimization::{Algorithm, OptimizerParams};
use linfa::ParamGuard;
use ndarray::Array1;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Default number of training rows
pub const DEFAULT_N_TRAIN: usize = 3000;
/// Default number of held-out rows
pub const DEFAULT_N_TEST: usize = 1000;

/// Role of a worker among independent training runs.
///
/// All workers run the same training, only the coordinator reports progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Role {
    /// The reporting worker
    #[default]
    Coordinator,
    /// A silent worker with the given rank
    Worker(usize),
}

impl Role {
    /// Role of the worker of rank `rank`, rank 0 being the coordinator
    pub fn from_rank(rank: usize) -> Self {
        if rank == 0 {
            Role::Coordinator
        } else {
            Role::Worker(rank)
        }
    }

    /// Whether this worker reports progress
    pub fn is_coordinator(&self) -> bool {
        matches!(self, Role::Coordinator)
    }
}

/// A set of validated training parameters
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct TrainingValidParams<K: CovarianceKernel> {
    /// Covariance kernel
    pub(crate) kernel: K,
    /// Initial guess and bounds of theta
    pub(crate) hyperparameters: Hyperparameters,
    /// Number of training rows
    pub(crate) n_train: usize,
    /// Number of held-out rows, clipped to available data
    pub(crate) n_test: usize,
    /// Seed of the dataset permutation
    pub(crate) seed: u64,
    /// Optimizer settings
    pub(crate) optimizer: OptimizerParams,
    /// Reporting role
    pub(crate) role: Role,
    /// Whether held-out error is computed at each objective evaluation
    pub(crate) report_test_error: bool,
}

impl Default for TrainingValidParams<BucklingKernel> {
    fn default() -> Self {
        TrainingValidParams {
            kernel: BucklingKernel::default(),
            hyperparameters: Hyperparameters::default(),
            n_train: DEFAULT_N_TRAIN,
            n_test: DEFAULT_N_TEST,
            seed: DEFAULT_SEED,
            optimizer: OptimizerParams::default(),
            role: Role::Coordinator,
            report_test_error: true,
        }
    }
}

impl<K: CovarianceKernel> TrainingValidParams<K> {
    /// Get kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Get hyperparameters initial guess and bounds
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Get number of training rows
    pub fn n_train(&self) -> usize {
        self.n_train
    }

    /// Get requested number of held-out rows
    pub fn n_test(&self) -> usize {
        self.n_test
    }

    /// Get permutation seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Get optimizer settings
    pub fn optimizer(&self) -> &OptimizerParams {
        &self.optimizer
    }

    /// Get reporting role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether held-out error is reported along the optimization
    pub fn report_test_error(&self) -> bool {
        self.report_test_error
    }
}

/// The set of parameters of a surrogate [training](crate::TrainedModel)
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingParams<K: CovarianceKernel>(TrainingValidParams<K>);

impl Default for TrainingParams<BucklingKernel> {
    fn default() -> Self {
        TrainingParams(TrainingValidParams::default())
    }
}

impl<K: CovarianceKernel> TrainingParams<K> {
    /// Parameters with defaults for the given kernel
    pub fn new(kernel: K) -> Self {
        let TrainingValidParams {
            hyperparameters,
            n_train,
            n_test,
            seed,
            optimizer,
            role,
            report_test_error,
            ..
        } = TrainingValidParams::default();
        TrainingParams(TrainingValidParams {
            kernel,
            hyperparameters,
            n_train,
            n_test,
            seed,
            optimizer,
            role,
            report_test_error,
        })
    }

    /// A constructor from validated parameters
    pub fn new_from_valid(params: &TrainingValidParams<K>) -> Self {
        Self(params.clone())
    }

    /// Set initial theta
    pub fn theta_init(mut self, theta_init: Array1<f64>) -> Self {
        self.0.hyperparameters = self.0.hyperparameters.with_init(theta_init);
        self
    }

    /// Set theta bounds as (lower, upper)
    pub fn theta_bounds(mut self, bounds: Vec<(f64, f64)>) -> Self {
        self.0.hyperparameters = self.0.hyperparameters.with_bounds(bounds);
        self
    }

    /// Set hyperparameters initial guess and bounds
    pub fn hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.0.hyperparameters = hyperparameters;
        self
    }

    /// Set number of training rows
    pub fn n_train(mut self, n_train: usize) -> Self {
        self.0.n_train = n_train;
        self
    }

    /// Set number of held-out rows
    pub fn n_test(mut self, n_test: usize) -> Self {
        self.0.n_test = n_test;
        self
    }

    /// Set permutation seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }

    /// Set optimizer settings
    pub fn optimizer(mut self, optimizer: OptimizerParams) -> Self {
        self.0.optimizer = optimizer;
        self
    }

    /// Set optimization algorithm
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.0.optimizer.algorithm = algorithm;
        self
    }

    /// Set max number of objective evaluations
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.optimizer.max_eval = max_eval;
        self
    }

    /// Set reporting role
    pub fn role(mut self, role: Role) -> Self {
        self.0.role = role;
        self
    }

    /// Set whether held-out error is computed at each objective evaluation
    pub fn report_test_error(mut self, report: bool) -> Self {
        self.0.report_test_error = report;
        self
    }
}

impl<K: CovarianceKernel> From<TrainingValidParams<K>> for TrainingParams<K> {
    fn from(valid: TrainingValidParams<K>) -> Self {
        TrainingParams(valid)
    }
}

impl<K: CovarianceKernel> ParamGuard for TrainingParams<K> {
    type Checked = TrainingValidParams<K>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        self.0.hyperparameters.validate(self.0.kernel.n_params())?;
        if self.0.n_train == 0 {
            return Err(GpError::ConfigurationError(
                "`n_train` cannot be 0".to_string(),
            ));
        }
        if self.0.optimizer.max_eval == 0 {
            return Err(GpError::ConfigurationError(
                "`max_eval` cannot be 0".to_string(),
            ));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparameters::N_THETA;
    use ndarray::array;

    #[test]
    fn test_default_params_are_valid() {
        let params = TrainingParams::default().check().unwrap();
        assert_eq!(params.n_train(), DEFAULT_N_TRAIN);
        assert_eq!(params.n_test(), DEFAULT_N_TEST);
        assert_eq!(params.seed(), 1234567);
        assert_eq!(params.hyperparameters().len(), N_THETA);
        assert!(params.role().is_coordinator());
    }

    #[test]
    fn test_bad_theta_is_rejected() {
        let res = TrainingParams::default()
            .theta_init(array![0.1, 0.2, 0.3])
            .check();
        assert!(matches!(res, Err(GpError::ConfigurationError(_))));
    }

    #[test]
    fn test_zero_train_is_rejected() {
        assert!(TrainingParams::default().n_train(0).check().is_err());
    }

    #[test]
    fn test_role_from_rank() {
        assert_eq!(Role::from_rank(0), Role::Coordinator);
        assert_eq!(Role::from_rank(3), Role::Worker(3));
        assert!(!Role::from_rank(3).is_coordinator());
    }
}
