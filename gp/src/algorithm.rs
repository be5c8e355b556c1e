use crate::covariance::cross_covariance;
use crate::dataset::{shuffle_split_as, TrainTestSplit};
use crate::errors::{GpError, Result};
use crate::kernels::{BucklingKernel, CovarianceKernel};
use crate::likelihood::{DesignVars, MapProblem};
use crate::optimization::{OptimResult, Optimizer};
use crate::parameters::{Role, TrainingParams, TrainingValidParams};

use linfa::dataset::DatasetBase;
use linfa::prelude::{Fit, ParamGuard};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
use rayon::prelude::*;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::Instant;

#[cfg(feature = "persistent")]
use std::fs;
#[cfg(feature = "persistent")]
use std::io::Write;

/// Gaussian process surrogate of log critical buckling loads trained by
/// maximum a posteriori estimation of its kernel hyperparameters.
///
/// Training shuffles the dataset with a seeded generator, keeps the first
/// rows for training and the next ones as held-out data, then minimizes the
/// negative log marginal likelihood within the hyperparameter bounds:
///
/// ```no_run
/// use buckling_gp::{TrainedModel, TrainingParams};
/// use linfa::prelude::*;
/// use ndarray::{Array1, Array2};
///
/// # let x = Array2::<f64>::zeros((30, 4));
/// # let y = Array1::<f64>::zeros(30);
/// let model = TrainingParams::default()
///     .n_train(20)
///     .n_test(10)
///     .fit(&Dataset::new(x, y))
///     .expect("trained surrogate");
/// println!("theta = {}, held-out error = {:?}", model.theta(), model.test_error());
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct TrainedModel<K: CovarianceKernel = BucklingKernel> {
    kernel: K,
    /// Optimized hyperparameters
    theta: Array1<f64>,
    /// Weights `K_y^-1 y` of the training targets
    alpha: Array1<f64>,
    /// Training samples
    x_train: Array2<f64>,
    /// Negative log marginal likelihood at `theta`
    nmap: f64,
    /// Mean relative error of critical loads on held-out data
    test_error: Option<f64>,
    /// Optimizer outcome
    optim: OptimResult,
    /// Permutation seed
    seed: u64,
}

impl<K: CovarianceKernel> fmt::Display for TrainedModel<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "TrainedModel(kernel={}, n_train={}, nMAP={}, theta={}",
            self.kernel,
            self.x_train.nrows(),
            self.nmap,
            self.theta
        )?;
        if let Some(err) = self.test_error {
            write!(f, ", test_error={err}")?;
        }
        write!(f, ", converged={})", self.optim.converged)
    }
}

impl<K: CovarianceKernel> TrainedModel<K> {
    /// Training parameters constructor
    pub fn params(kernel: K) -> TrainingParams<K> {
        TrainingParams::new(kernel)
    }

    /// Optimized hyperparameters
    pub fn theta(&self) -> &Array1<f64> {
        &self.theta
    }

    /// Weights of the training targets
    pub fn alpha(&self) -> &Array1<f64> {
        &self.alpha
    }

    /// Covariance kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Objective value at the optimum
    pub fn nmap(&self) -> f64 {
        self.nmap
    }

    /// Held-out mean relative error, None without held-out data
    pub fn test_error(&self) -> Option<f64> {
        self.test_error
    }

    /// Optimizer outcome
    pub fn optim_result(&self) -> &OptimResult {
        &self.optim
    }

    /// Whether the optimizer converged
    pub fn converged(&self) -> bool {
        self.optim.converged
    }

    /// Permutation seed used to split the data
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of training samples
    pub fn n_train(&self) -> usize {
        self.x_train.nrows()
    }

    /// Predict log critical loads at `x` (one feature vector per row)
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        if x.ncols() != self.kernel.n_features() {
            return Err(GpError::ConfigurationError(format!(
                "Expected {} features, got {}",
                self.kernel.n_features(),
                x.ncols()
            )));
        }
        let k = cross_covariance(&self.kernel, x, &self.x_train, &self.theta);
        Ok(k.dot(&self.alpha))
    }

    /// Predict critical loads at `x`
    pub fn predict_load(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        Ok(self.predict(x)?.mapv(f64::exp))
    }
}

#[cfg(feature = "persistent")]
impl<K> TrainedModel<K>
where
    K: CovarianceKernel + Serialize + serde::de::DeserializeOwned,
{
    /// Save the model as JSON in the given file
    pub fn save(&self, path: &str) -> Result<()> {
        let mut file = fs::File::create(path)?;
        let bytes = serde_json::to_vec_pretty(self)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Load a model saved with [`TrainedModel::save`]
    pub fn load(path: &str) -> Result<TrainedModel<K>> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Progress line of one objective evaluation, logged by the coordinator only
fn report(role: Role, n_eval: usize, obj: f64, test_error: Option<f64>, theta: &[f64]) {
    if !role.is_coordinator() {
        return;
    }
    match test_error {
        Some(err) => info!("eval {n_eval}: nMAP = {obj:.6e}, avg rel err = {err:.4}, theta = {theta:?}"),
        None => info!("eval {n_eval}: nMAP = {obj:.6e}, theta = {theta:?}"),
    }
}

impl<K: CovarianceKernel> TrainingValidParams<K> {
    /// Train on an already split dataset
    pub fn train_split(&self, split: TrainTestSplit) -> Result<TrainedModel<K>> {
        let problem = MapProblem::new(self.kernel().clone(), split.train, split.test)?;
        let has_test = problem.test().records().nrows() > 0;
        let report_error = self.report_test_error() && has_test;
        let role = self.role();
        let hp = self.hyperparameters();

        let n_eval = Cell::new(0usize);
        let aborted: RefCell<Option<GpError>> = RefCell::new(None);
        let objfn = |x: &[f64], gradient: Option<&mut [f64]>| -> f64 {
            n_eval.set(n_eval.get() + 1);
            let dvs = DesignVars {
                theta: Array1::from_vec(x.to_vec()),
            };
            // after a configuration error the remaining evaluations are skipped
            let res = if aborted.borrow().is_some() {
                None
            } else {
                Some(problem.evaluate(&dvs, gradient.is_some()))
            };
            let eval = match res {
                Some(Ok(eval)) => eval,
                failed => {
                    if let Some(Err(err)) = failed {
                        *aborted.borrow_mut() = Some(err);
                    }
                    if let Some(grad) = gradient {
                        grad.fill(0.);
                    }
                    return f64::INFINITY;
                }
            };
            if let (Some(grad), Some(sens)) = (gradient, eval.sens.as_ref()) {
                grad.iter_mut()
                    .zip(sens.obj.theta.iter())
                    .for_each(|(g, &v)| *g = v);
            }
            if eval.fail {
                if role.is_coordinator() {
                    debug!("Objective evaluation failed at theta = {x:?}");
                }
            } else {
                let test_error = match eval.alpha() {
                    Some(alpha) if report_error => problem.post_evaluate(&dvs.theta, alpha).ok(),
                    _ => None,
                };
                report(role, n_eval.get(), eval.funcs.obj, test_error, x);
            }
            eval.funcs.obj
        };

        let now = Instant::now();
        let optim = Optimizer::new(&objfn, hp.init(), hp.bounds())
            .params(self.optimizer().clone())
            .role(role)
            .minimize()?;
        if let Some(err) = aborted.into_inner() {
            return Err(err);
        }

        let theta = hp.clamp(&optim.x);
        let (nmap, alpha) = problem.nmap(&theta)?;
        let test_error = if has_test {
            Some(problem.post_evaluate(&theta, &alpha)?)
        } else {
            None
        };
        if role.is_coordinator() {
            debug!("elapsed optim = {:?}", now.elapsed().as_millis());
            if !optim.converged {
                warn!("Hyperparameter optimization did not converge: {}", optim.status);
            }
            info!("Final theta = {theta}");
            if let Some(err) = test_error {
                info!("Held-out avg rel err = {err:.6}");
            }
        }
        Ok(TrainedModel {
            kernel: self.kernel().clone(),
            theta,
            alpha,
            x_train: problem.train().records().to_owned(),
            nmap,
            test_error,
            optim,
            seed: self.seed(),
        })
    }
}

impl<K, D> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for TrainingValidParams<K>
where
    K: CovarianceKernel,
    D: Data<Elem = f64>,
{
    type Object = TrainedModel<K>;

    /// Split the dataset and fit kernel hyperparameters by MAP estimation
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let split = shuffle_split_as(
            self.role(),
            dataset.records(),
            dataset.targets(),
            self.n_train(),
            self.n_test(),
            self.seed(),
        )?;
        self.train_split(split)
    }
}

/// Train one independent surrogate per seed in parallel.
///
/// The first seed runs as coordinator, others as silent workers.
pub fn train_ensemble<K: CovarianceKernel>(
    params: &TrainingParams<K>,
    records: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    targets: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    seeds: &[u64],
) -> Result<Vec<TrainedModel<K>>> {
    let params = params.check_ref()?;
    let (records, targets) = (records.view(), targets.view());
    seeds
        .par_iter()
        .enumerate()
        .map(|(rank, &seed)| {
            let worker = TrainingParams::new_from_valid(params)
                .seed(seed)
                .role(Role::from_rank(rank))
                .check()?;
            let split = shuffle_split_as(
                worker.role(),
                &records,
                &targets,
                worker.n_train(),
                worker.n_test(),
                seed,
            )?;
            worker.train_split(split)
        })
        .collect()
}
