//! Accuracy metrics of buckling load predictions.

use crate::errors::{GpError, Result};
use ndarray::{ArrayBase, Data, Ix1, Zip};

/// Mean relative error `|pred - truth| / |truth|` of predicted critical
/// loads given predicted and true log-loads
pub fn mean_relative_error(
    log_pred: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    log_truth: &ArrayBase<impl Data<Elem = f64>, Ix1>,
) -> Result<f64> {
    if log_pred.len() != log_truth.len() {
        return Err(GpError::ConfigurationError(format!(
            "{} predictions for {} observations",
            log_pred.len(),
            log_truth.len()
        )));
    }
    if log_truth.is_empty() {
        return Err(GpError::ConfigurationError(
            "Cannot evaluate errors on an empty test set".to_string(),
        ));
    }
    let total = Zip::from(log_pred)
        .and(log_truth)
        .fold(0., |acc, &lp, &lt| {
            let (pred, truth) = (lp.exp(), lt.exp());
            acc + ((pred - truth) / truth).abs()
        });
    Ok(total / log_truth.len() as f64)
}
