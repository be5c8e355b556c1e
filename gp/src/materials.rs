//! Catalog of unidirectional composite laminae.
//!
//! Room temperature dry mean properties, moduli in Pa.

use crate::errors::{GpError, Result};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// In-plane elastic properties of an orthotropic lamina
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct LaminaProperties {
    /// Longitudinal modulus
    pub e11: f64,
    /// Transverse modulus
    pub e22: f64,
    /// Major Poisson ratio
    pub nu12: f64,
    /// In-plane shear modulus
    pub g12: f64,
}

impl LaminaProperties {
    /// Properties from `e11` and `nu12` only, the missing ones taken isotropic
    pub fn isotropic(e11: f64, nu12: f64) -> Self {
        LaminaProperties {
            e11,
            e22: e11,
            nu12,
            g12: e11 / 2. / (1. + nu12),
        }
    }

    /// Minor Poisson ratio `nu12 * E22 / E11`
    pub fn nu21(&self) -> f64 {
        self.nu12 * self.e22 / self.e11
    }
}

/// Known lamina materials
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum CompositeMaterial {
    /// Solvay 5320-1 (thermoset)
    Solvay5320,
    /// Solvay MTM45 (thermoset)
    SolvayMtm45,
    /// Toray BT250E-6 S2 unitape (thermoset)
    TorayBt250e,
    /// Hexcel 8552 IM7 unidirectional prepreg (thermoset)
    HexcelIm7,
    /// Victrex AE 250 LMPAEK (thermoplastic)
    VictrexAe,
}

impl CompositeMaterial {
    /// All catalog entries
    pub const ALL: [CompositeMaterial; 5] = [
        CompositeMaterial::Solvay5320,
        CompositeMaterial::SolvayMtm45,
        CompositeMaterial::TorayBt250e,
        CompositeMaterial::HexcelIm7,
        CompositeMaterial::VictrexAe,
    ];

    /// Catalog name
    pub fn name(&self) -> &'static str {
        match self {
            CompositeMaterial::Solvay5320 => "solvay5320",
            CompositeMaterial::SolvayMtm45 => "solvayMTM45",
            CompositeMaterial::TorayBt250e => "torayBT250E",
            CompositeMaterial::HexcelIm7 => "hexcelIM7",
            CompositeMaterial::VictrexAe => "victrexAE",
        }
    }

    /// Lamina properties at zero ply angle
    pub fn properties(&self) -> LaminaProperties {
        let (e11, e22, nu12, g12) = match self {
            CompositeMaterial::Solvay5320 => (138.461e9, 9.177e9, 0.326, 4.957e9),
            CompositeMaterial::SolvayMtm45 => (129.5e9, 7.936e9, 0.313, 4.764e9),
            CompositeMaterial::TorayBt250e => (44.74e9, 11.36e9, 0.278, 3.77e9),
            CompositeMaterial::HexcelIm7 => (158.51e9, 8.96e9, 0.316, 4.688e9),
            CompositeMaterial::VictrexAe => (131.69e9, 9.694e9, 0.3192, 4.524e9),
        };
        LaminaProperties {
            e11,
            e22,
            nu12,
            g12,
        }
    }
}

impl fmt::Display for CompositeMaterial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CompositeMaterial {
    type Err = GpError;

    fn from_str(s: &str) -> Result<Self> {
        CompositeMaterial::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                GpError::ConfigurationError(format!("Unknown composite material {s}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_from_str() {
        for m in CompositeMaterial::ALL {
            assert_eq!(m.name().parse::<CompositeMaterial>().unwrap(), m);
        }
        assert_eq!(
            "HEXCELIM7".parse::<CompositeMaterial>().unwrap(),
            CompositeMaterial::HexcelIm7
        );
        // no substring matching
        assert!("solvay".parse::<CompositeMaterial>().is_err());
        assert!("IM7".parse::<CompositeMaterial>().is_err());
    }

    #[test]
    fn test_nu21() {
        let p = CompositeMaterial::Solvay5320.properties();
        assert_abs_diff_eq!(p.nu21(), 0.326 * 9.177 / 138.461, epsilon = 1e-12);
        assert!(CompositeMaterial::ALL
            .iter()
            .all(|m| m.properties().nu21() < m.properties().nu12));
    }

    #[test]
    fn test_isotropic_defaults() {
        let p = LaminaProperties::isotropic(70e9, 0.3);
        assert_eq!(p.e22, p.e11);
        assert_abs_diff_eq!(p.g12, 70e9 / 2.6, epsilon = 1e-3);
        assert_abs_diff_eq!(p.nu21(), 0.3, epsilon = 1e-15);
    }
}
