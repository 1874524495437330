//! Forward-mode automatic differentiation.
//!
//! [`Deriv`] carries a value together with its gradient with respect to `N`
//! tracked variables. Every arithmetic operation applies the chain rule, so
//! any expression written against the [`Real`] trait can be evaluated either
//! on plain `f64` or on `Deriv<N>` to obtain exact partial derivatives.
//!
//! # Example
//!
//! ```
//! use armature::math::{Deriv, Real};
//!
//! fn energy<T: Real>(x: T, y: T) -> T {
//!     x * x * 3.0 + x * y
//! }
//!
//! let [x, y] = Deriv::<2>::variables([2.0, 5.0]);
//! let e = energy(x, y);
//! assert_eq!(e.value(), 22.0);
//! assert_eq!(e.gradient()[0], 17.0); // 6x + y
//! assert_eq!(e.gradient()[1], 2.0); // x
//! ```

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use nalgebra::SVector;

/// Numeric operations shared by `f64` and [`Deriv`].
pub trait Real:
    Copy
    + Debug
    + Send
    + Sync
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
{
    /// Lift a constant.
    fn from_f64(v: f64) -> Self;

    /// The value with derivatives dropped.
    fn value(self) -> f64;

    /// Square root.
    fn sqrt(self) -> Self;

    /// Real power with a constant exponent.
    fn powf(self, e: f64) -> Self;

    /// Absolute value.
    fn abs(self) -> Self {
        if self.value() < 0.0 {
            -self
        } else {
            self
        }
    }

    /// Maximum of two values, keeping the derivatives of the winner.
    fn max(self, other: Self) -> Self {
        if self.value() >= other.value() {
            self
        } else {
            other
        }
    }

    /// Minimum of two values, keeping the derivatives of the winner.
    fn min(self, other: Self) -> Self {
        if self.value() <= other.value() {
            self
        } else {
            other
        }
    }

    /// Maximum against a constant.
    fn max_f64(self, other: f64) -> Self {
        self.max(Self::from_f64(other))
    }

    /// Minimum against a constant.
    fn min_f64(self, other: f64) -> Self {
        self.min(Self::from_f64(other))
    }

    /// Square.
    fn sqr(self) -> Self {
        self * self
    }
}

impl Real for f64 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn value(self) -> f64 {
        self
    }

    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    #[inline]
    fn powf(self, e: f64) -> Self {
        f64::powf(self, e)
    }
}

/// A dual number tracking the gradient with respect to `N` variables.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Deriv<const N: usize> {
    value: f64,
    grad: SVector<f64, N>,
}

impl<const N: usize> Deriv<N> {
    /// A constant (zero gradient).
    #[inline]
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            grad: SVector::zeros(),
        }
    }

    /// The `index`-th independent variable.
    ///
    /// # Panics
    /// Panics if `index >= N`.
    #[inline]
    pub fn variable(value: f64, index: usize) -> Self {
        let mut grad = SVector::zeros();
        grad[index] = 1.0;
        Self { value, grad }
    }

    /// Build all `N` independent variables at once.
    pub fn variables(values: [f64; N]) -> [Self; N] {
        let mut i = 0;
        values.map(|v| {
            let d = Self::variable(v, i);
            i += 1;
            d
        })
    }

    /// Gradient with respect to the tracked variables.
    #[inline]
    pub fn gradient(&self) -> &SVector<f64, N> {
        &self.grad
    }

    #[inline]
    fn chain(self, value: f64, slope: f64) -> Self {
        Self {
            value,
            grad: self.grad * slope,
        }
    }
}

impl<const N: usize> Real for Deriv<N> {
    #[inline]
    fn from_f64(v: f64) -> Self {
        Self::constant(v)
    }

    #[inline]
    fn value(self) -> f64 {
        self.value
    }

    fn sqrt(self) -> Self {
        let s = self.value.max(0.0).sqrt();
        // The slope is unbounded at zero; treat it as flat there.
        let slope = if s > 0.0 { 0.5 / s } else { 0.0 };
        self.chain(s, slope)
    }

    fn powf(self, e: f64) -> Self {
        let v = self.value.powf(e);
        let slope = if self.value == 0.0 && e >= 1.0 {
            if e == 1.0 {
                1.0
            } else {
                0.0
            }
        } else {
            e * self.value.powf(e - 1.0)
        };
        self.chain(v, slope)
    }
}

impl<const N: usize> Add for Deriv<N> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
            grad: self.grad + rhs.grad,
        }
    }
}

impl<const N: usize> AddAssign for Deriv<N> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.value += rhs.value;
        self.grad += rhs.grad;
    }
}

impl<const N: usize> Sub for Deriv<N> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
            grad: self.grad - rhs.grad,
        }
    }
}

impl<const N: usize> Mul for Deriv<N> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self {
            value: self.value * rhs.value,
            grad: self.grad * rhs.value + rhs.grad * self.value,
        }
    }
}

impl<const N: usize> Div for Deriv<N> {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Self) -> Self {
        let inv = 1.0 / rhs.value;
        Self {
            value: self.value * inv,
            grad: (self.grad * rhs.value - rhs.grad * self.value) * (inv * inv),
        }
    }
}

impl<const N: usize> Neg for Deriv<N> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            value: -self.value,
            grad: -self.grad,
        }
    }
}

impl<const N: usize> Add<f64> for Deriv<N> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: f64) -> Self {
        Self {
            value: self.value + rhs,
            grad: self.grad,
        }
    }
}

impl<const N: usize> Sub<f64> for Deriv<N> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: f64) -> Self {
        Self {
            value: self.value - rhs,
            grad: self.grad,
        }
    }
}

impl<const N: usize> Mul<f64> for Deriv<N> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f64) -> Self {
        Self {
            value: self.value * rhs,
            grad: self.grad * rhs,
        }
    }
}

impl<const N: usize> Div<f64> for Deriv<N> {
    type Output = Self;

    #[inline]
    fn div(self, rhs: f64) -> Self {
        self * (1.0 / rhs)
    }
}

impl<const N: usize> Add<Deriv<N>> for f64 {
    type Output = Deriv<N>;

    #[inline]
    fn add(self, rhs: Deriv<N>) -> Deriv<N> {
        rhs + self
    }
}

impl<const N: usize> Sub<Deriv<N>> for f64 {
    type Output = Deriv<N>;

    #[inline]
    fn sub(self, rhs: Deriv<N>) -> Deriv<N> {
        -rhs + self
    }
}

impl<const N: usize> Mul<Deriv<N>> for f64 {
    type Output = Deriv<N>;

    #[inline]
    fn mul(self, rhs: Deriv<N>) -> Deriv<N> {
        rhs * self
    }
}

/// Small fixed-size vector helpers over any [`Real`].
pub mod vec3 {
    use super::Real;

    /// `a - b`.
    #[inline]
    pub fn sub<T: Real>(a: [T; 3], b: [T; 3]) -> [T; 3] {
        [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
    }

    /// `a + (b - a) * t`.
    #[inline]
    pub fn lerp<T: Real>(a: [T; 3], b: [T; 3], t: f64) -> [T; 3] {
        [
            a[0] + (b[0] - a[0]) * t,
            a[1] + (b[1] - a[1]) * t,
            a[2] + (b[2] - a[2]) * t,
        ]
    }

    /// Dot product.
    #[inline]
    pub fn dot<T: Real>(a: [T; 3], b: [T; 3]) -> T {
        a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
    }

    /// Dot product against a constant vector.
    #[inline]
    pub fn dot_f64<T: Real>(a: [T; 3], b: [f64; 3]) -> T {
        a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
    }

    /// Squared length.
    #[inline]
    pub fn norm_sq<T: Real>(a: [T; 3]) -> T {
        dot(a, a)
    }

    /// Lift a constant vector.
    #[inline]
    pub fn constant<T: Real>(a: [f64; 3]) -> [T; 3] {
        [T::from_f64(a[0]), T::from_f64(a[1]), T::from_f64(a[2])]
    }

    /// Drop derivatives.
    #[inline]
    pub fn value<T: Real>(a: [T; 3]) -> [f64; 3] {
        [a[0].value(), a[1].value(), a[2].value()]
    }
}
