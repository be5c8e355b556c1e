//! Numeric element type used to evaluate kernels and covariance matrices.
//!
//! Kernels are written once, generically over [`Scalar`], and evaluated either
//! in `f64` for training or in [`Complex64`] to obtain derivatives by
//! complex-step differentiation. Every operation exposed here is holomorphic,
//! so a perturbation `i.h` of an input comes out as `i.h.f'(x)` in the
//! imaginary part of the result.

use num_complex::Complex64;
use num_traits::{One, Zero};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Step used for complex-step differentiation
pub const COMPLEX_STEP: f64 = 1e-30;

/// Default steepness of the smooth surrogates [`soft_relu`] and [`soft_abs`]
pub const SOFT_STEEPNESS: f64 = 10.;

/// A real or complex number usable in kernel and linear algebra computations
pub trait Scalar:
    Copy
    + Send
    + Sync
    + fmt::Debug
    + 'static
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
    + AddAssign
    + SubAssign
    + Sum
{
    /// Embed a real value
    fn from_re(v: f64) -> Self;
    /// Real part
    fn re(self) -> f64;
    /// Imaginary part, zero for reals
    fn im(self) -> f64;
    /// Exponential
    fn exp(self) -> Self;
    /// Natural logarithm (principal branch)
    fn ln(self) -> Self;
    /// Square root (principal branch)
    fn sqrt(self) -> Self;
    /// Whether both parts are finite
    fn is_finite(self) -> bool;
}

impl Scalar for f64 {
    fn from_re(v: f64) -> Self {
        v
    }
    fn re(self) -> f64 {
        self
    }
    fn im(self) -> f64 {
        0.
    }
    fn exp(self) -> Self {
        f64::exp(self)
    }
    fn ln(self) -> Self {
        f64::ln(self)
    }
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
}

impl Scalar for Complex64 {
    fn from_re(v: f64) -> Self {
        Complex64::new(v, 0.)
    }
    fn re(self) -> f64 {
        self.re
    }
    fn im(self) -> f64 {
        self.im
    }
    fn exp(self) -> Self {
        Complex64::exp(self)
    }
    fn ln(self) -> Self {
        Complex64::ln(self)
    }
    fn sqrt(self) -> Self {
        Complex64::sqrt(self)
    }
    fn is_finite(self) -> bool {
        Complex64::is_finite(self)
    }
}

/// Smooth approximation of `max(x, 0)`: `ln(1 + exp(rho.x)) / rho`
///
/// The expression is rearranged on the sign of the real part of `x` so that
/// the exponential never overflows. Both arrangements are the same analytic
/// function, hence complex-step derivatives go through unchanged.
pub fn soft_relu<T: Scalar>(x: T, rho: f64) -> T {
    if x.re() > 0. {
        x + ((x * -rho).exp() + 1.).ln() / rho
    } else {
        ((x * rho).exp() + 1.).ln() / rho
    }
}

/// Smooth approximation of `|x|`: `ln(exp(rho.x) + exp(-rho.x)) / rho`
///
/// Always greater than `|x|`, by at most `ln(2) / rho` reached at zero.
pub fn soft_abs<T: Scalar>(x: T, rho: f64) -> T {
    if x.re() >= 0. {
        x + ((x * (-2. * rho)).exp() + 1.).ln() / rho
    } else {
        -x + ((x * (2. * rho)).exp() + 1.).ln() / rho
    }
}

/// Derivative of a real function `f` at `x` by complex-step differentiation
pub fn complex_step<F>(f: F, x: f64) -> f64
where
    F: Fn(Complex64) -> Complex64,
{
    f(Complex64::new(x, COMPLEX_STEP)).im / COMPLEX_STEP
}
