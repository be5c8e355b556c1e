//! This library implements a [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process)
//! surrogate of the critical buckling load factor of composite panels,
//! trained on log-transformed dimensionless panel parameters.
//!
//! The covariance is a dedicated [kernel](kernels::BucklingKernel) composing a
//! boundary-layer term, squared-exponential terms windowed on the aspect
//! ratio and the stiffener ratio, and linear/quadratic trends. Its 16
//! hyperparameters are fitted by maximum a posteriori estimation: the negative
//! log marginal likelihood ([MapProblem]) and its analytic gradient are fed to
//! a bound-constrained [Optimizer]. Kernel derivatives are computed by
//! complex-step differentiation, the kernel being generic over a
//! [Scalar](scalar::Scalar) which is either `f64` or `Complex64`.
//!
//! Training is driven by [TrainingParams] through the linfa `Fit` trait and
//! produces a [TrainedModel]:
//!
//! ```no_run
//! use buckling_gp::{TrainedModel, TrainingParams};
//! use linfa::prelude::*;
//! use ndarray::{Array1, Array2};
//!
//! # let x = Array2::<f64>::zeros((4000, 4));
//! # let y = Array1::<f64>::zeros(4000);
//! let model = TrainingParams::default()
//!     .max_eval(50)
//!     .fit(&Dataset::new(x, y))
//!     .expect("trained surrogate");
//! println!("{}", model);
//! ```
#![warn(missing_docs)]

mod algorithm;
pub mod covariance;
mod dataset;
mod errors;
mod features;
mod hyperparameters;
pub mod kernels;
mod likelihood;
pub mod linalg;
mod materials;
pub mod metrics;
mod optimization;
mod parameters;
pub mod scalar;

pub use algorithm::*;
pub use dataset::*;
pub use errors::*;
pub use features::*;
pub use hyperparameters::*;
pub use likelihood::*;
pub use materials::*;
pub use optimization::*;
pub use parameters::*;
