//! Dimensionless panel parameters and the log-transformed features the
//! surrogate is trained on.

use crate::errors::{GpError, Result};
use crate::kernels::N_FEATURES;
use ndarray::{Array1, Array2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Dataset column names of the features, in kernel order
pub const FEATURE_COLUMNS: [&str; N_FEATURES] = [
    "log(1+xi)",
    "log(rho_0)",
    "log(1+10^3*zeta)",
    "log(1+gamma)",
];

/// Dataset column name of the log critical load factor
pub const TARGET_COLUMN: &str = "log(lam_star)";

/// Scaling applied to the transverse shear parameter before the log transform
pub const ZETA_SCALE: f64 = 1e3;

/// Nondimensional parameters of a stiffened or unstiffened panel
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct PanelParameters {
    /// Generalized Poisson ratio
    pub xi: f64,
    /// Generalized aspect ratio
    pub rho_0: f64,
    /// Transverse shear parameter
    pub zeta: f64,
    /// Stiffener to plate bending stiffness ratio
    pub gamma: f64,
}

impl PanelParameters {
    /// Unstiffened panel (gamma = 0)
    pub fn unstiffened(xi: f64, rho_0: f64, zeta: f64) -> Self {
        PanelParameters {
            xi,
            rho_0,
            zeta,
            gamma: 0.,
        }
    }

    /// Feature vector `[log(1+xi), log(rho_0), log(1+10^3 zeta), log(1+gamma)]`
    pub fn features(&self) -> Result<Array1<f64>> {
        let args = [
            ("1+xi", 1. + self.xi),
            ("rho_0", self.rho_0),
            ("1+10^3*zeta", 1. + ZETA_SCALE * self.zeta),
            ("1+gamma", 1. + self.gamma),
        ];
        args.iter()
            .map(|&(name, v)| {
                if v > 0. && v.is_finite() {
                    Ok(v.ln())
                } else {
                    Err(GpError::ConfigurationError(format!(
                        "{name} = {v} is outside the feature domain"
                    )))
                }
            })
            .collect()
    }

    /// Panel parameters back from a feature vector
    pub fn from_features(features: &[f64]) -> Result<Self> {
        match *features {
            [f0, f1, f2, f3] => Ok(PanelParameters {
                xi: f0.exp() - 1.,
                rho_0: f1.exp(),
                zeta: (f2.exp() - 1.) / ZETA_SCALE,
                gamma: f3.exp() - 1.,
            }),
            _ => Err(GpError::ConfigurationError(format!(
                "Expected {N_FEATURES} features, got {}",
                features.len()
            ))),
        }
    }
}

/// Feature matrix of a set of panels, one row per panel
pub fn feature_matrix(panels: &[PanelParameters]) -> Result<Array2<f64>> {
    let mut x = Array2::zeros((panels.len(), N_FEATURES));
    for (mut row, panel) in x.rows_mut().into_iter().zip(panels) {
        row.assign(&panel.features()?);
    }
    Ok(x)
}
