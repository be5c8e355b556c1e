use thiserror::Error;

/// A result type for buckling surrogate training
pub type Result<T> = std::result::Result<T, GpError>;

/// An error raised while building, training or evaluating the [`TrainedModel`](crate::TrainedModel)
#[derive(Error, Debug)]
pub enum GpError {
    /// When the covariance matrix is not positive definite or a derivative check fails
    #[error("Numerical failure: {0}")]
    NumericalFailure(String),
    /// When hyperparameters, bounds or dataset sizes are inconsistent
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When error during saving
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    SaveError(#[from] serde_json::Error),
    /// When error during loading
    #[error("Load IO error")]
    LoadIoError(#[from] std::io::Error),
}

impl GpError {
    /// Whether the error comes from a failed numerical evaluation
    /// rather than a misconfiguration
    pub fn is_numerical(&self) -> bool {
        matches!(self, GpError::NumericalFailure(_))
    }
}
