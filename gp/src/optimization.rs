//! Bound-constrained minimization of the training objective.

use crate::errors::{GpError, Result};
use crate::parameters::Role;
use cobyla::RhoBeg;
use log::{debug, warn};
use ndarray::{Array1, ArrayBase, Data, Ix1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

/// Objective function signature: value at `x`, gradient written in the
/// second argument when requested
pub type ObjFn<'a> = dyn Fn(&[f64], Option<&mut [f64]>) -> f64 + 'a;

/// Default max number of objective evaluations
pub const DEFAULT_MAX_EVAL: usize = 200;

/// Available minimization algorithms
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Algorithm {
    /// Sequential least squares programming, gradient based
    #[default]
    Slsqp,
    /// Constrained optimization by linear approximations, gradient free
    Cobyla,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Algorithm::Slsqp => write!(f, "slsqp"),
            Algorithm::Cobyla => write!(f, "cobyla"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = GpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "slsqp" => Ok(Algorithm::Slsqp),
            "cobyla" => Ok(Algorithm::Cobyla),
            _ => Err(GpError::ConfigurationError(format!(
                "Unknown optimizer {s}, expected slsqp or cobyla"
            ))),
        }
    }
}

/// Optimizer settings
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct OptimizerParams {
    /// Minimization algorithm
    pub algorithm: Algorithm,
    /// Max number of objective evaluations
    pub max_eval: usize,
    /// Relative tolerance on objective
    pub ftol_rel: f64,
    /// Absolute tolerance on objective
    pub ftol_abs: f64,
    /// Initial trust region radius (COBYLA only)
    pub rhobeg: f64,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        OptimizerParams {
            algorithm: Algorithm::default(),
            max_eval: DEFAULT_MAX_EVAL,
            ftol_rel: 1e-6,
            ftol_abs: 0.,
            rhobeg: 0.05,
        }
    }
}

/// Result of a minimization
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct OptimResult {
    /// Best point found, within bounds
    pub x: Array1<f64>,
    /// Objective value at `x`
    pub fval: f64,
    /// Number of objective evaluations
    pub n_evals: usize,
    /// Whether the optimizer met its stopping criteria within the budget
    pub converged: bool,
    /// Termination status reported by the optimizer
    pub status: String,
}

/// Facade for bound-constrained minimization algorithms
pub struct Optimizer<'a> {
    fun: &'a ObjFn<'a>,
    bounds: Vec<(f64, f64)>,
    xinit: Array1<f64>,
    params: OptimizerParams,
    role: Role,
}

impl<'a> Optimizer<'a> {
    /// Minimize `fun` within `bounds` starting from `xinit`
    pub fn new(
        fun: &'a ObjFn<'a>,
        xinit: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        bounds: &[(f64, f64)],
    ) -> Self {
        Optimizer {
            fun,
            bounds: bounds.to_vec(),
            xinit: xinit.to_owned(),
            params: OptimizerParams::default(),
            role: Role::Coordinator,
        }
    }

    /// Set all settings at once
    pub fn params(&mut self, params: OptimizerParams) -> &mut Self {
        self.params = params;
        self
    }

    /// Set algorithm
    pub fn algorithm(&mut self, algorithm: Algorithm) -> &mut Self {
        self.params.algorithm = algorithm;
        self
    }

    /// Set max number of evaluations
    pub fn max_eval(&mut self, max_eval: usize) -> &mut Self {
        self.params.max_eval = max_eval;
        self
    }

    /// Set relative tolerance on the objective
    pub fn ftol_rel(&mut self, ftol_rel: f64) -> &mut Self {
        self.params.ftol_rel = ftol_rel;
        self
    }

    /// Set absolute tolerance on the objective
    pub fn ftol_abs(&mut self, ftol_abs: f64) -> &mut Self {
        self.params.ftol_abs = ftol_abs;
        self
    }

    /// Set reporting role, only the coordinator logs
    pub fn role(&mut self, role: Role) -> &mut Self {
        self.role = role;
        self
    }

    fn project(&self, x: &[f64]) -> Array1<f64> {
        x.iter()
            .zip(&self.bounds)
            .map(|(&v, &(lo, up))| if v.is_nan() { lo } else { v.clamp(lo, up) })
            .collect()
    }

    /// Run the minimization.
    ///
    /// Optimizer failures are not errors: the best point is returned with
    /// `converged` set to false.
    pub fn minimize(&self) -> Result<OptimResult> {
        if self.bounds.len() != self.xinit.len() {
            return Err(GpError::ConfigurationError(format!(
                "{} bounds for {} variables",
                self.bounds.len(),
                self.xinit.len()
            )));
        }
        let n_evals = Cell::new(0usize);
        let counted = |x: &[f64], g: Option<&mut [f64]>| {
            n_evals.set(n_evals.get() + 1);
            (self.fun)(x, g)
        };
        let xinit = self.xinit.to_vec();
        let max_eval = self.params.max_eval;

        let (ok, status, x_opt, fval) = match self.params.algorithm {
            Algorithm::Slsqp => {
                let cons: Vec<&dyn slsqp::Func<()>> = vec![];
                let res = slsqp::minimize(
                    |x: &[f64], g: Option<&mut [f64]>, _u: &mut ()| counted(x, g),
                    &xinit,
                    &self.bounds,
                    &cons,
                    (),
                    max_eval,
                    Some(slsqp::StopTols {
                        ftol_rel: self.params.ftol_rel,
                        ftol_abs: self.params.ftol_abs,
                        ..slsqp::StopTols::default()
                    }),
                );
                match res {
                    Ok((status, x_opt, fval)) => (true, format!("{status:?}"), x_opt, fval),
                    Err((status, x_opt, fval)) => (false, format!("{status:?}"), x_opt, fval),
                }
            }
            Algorithm::Cobyla => {
                let cons: Vec<&dyn cobyla::Func<()>> = vec![];
                let res = cobyla::minimize(
                    |x: &[f64], _u: &mut ()| counted(x, None),
                    &xinit,
                    &self.bounds,
                    &cons,
                    (),
                    max_eval,
                    RhoBeg::All(self.params.rhobeg),
                    Some(cobyla::StopTols {
                        ftol_rel: self.params.ftol_rel,
                        ftol_abs: self.params.ftol_abs,
                        ..cobyla::StopTols::default()
                    }),
                );
                match res {
                    Ok((status, x_opt, fval)) => (true, format!("{status:?}"), x_opt, fval),
                    Err((status, x_opt, fval)) => (false, format!("{status:?}"), x_opt, fval),
                }
            }
        };

        let n_evals = n_evals.get();
        let converged = ok && n_evals < max_eval;
        if self.role.is_coordinator() {
            if !converged {
                warn!(
                    "{} stopped without converging after {n_evals} evaluations ({status})",
                    self.params.algorithm
                );
            }
            debug!("{} status {status} after {n_evals} evaluations", self.params.algorithm);
        }

        let fval = if fval.is_nan() { f64::INFINITY } else { fval };
        Ok(OptimResult {
            x: self.project(&x_opt),
            fval,
            n_evals,
            converged,
            status,
        })
    }
}
