//! Inclusive interval arithmetic
//!
//! Every operation returns an interval guaranteed to contain all values the
//! operation can take over its inputs. Shapes use this to bound their
//! distance over a whole box instead of a single point.

use std::ops::{Add, Mul, Neg, Sub};

/// A closed interval [lo, hi]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    /// Create a new interval
    #[inline]
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Create a point interval [v, v]
    #[inline]
    pub fn point(v: f64) -> Self {
        Self { lo: v, hi: v }
    }

    /// True if either bound is NaN or the bounds are inverted
    pub fn is_invalid(self) -> bool {
        self.lo.is_nan() || self.hi.is_nan() || self.lo > self.hi
    }

    /// Entirely above zero
    #[inline]
    pub fn is_positive(self) -> bool {
        self.lo > 0.0
    }

    /// Entirely at or below zero
    #[inline]
    pub fn is_non_positive(self) -> bool {
        self.hi <= 0.0
    }

    #[inline]
    pub fn contains(self, v: f64) -> bool {
        v >= self.lo && v <= self.hi
    }

    pub fn abs(self) -> Self {
        if self.lo >= 0.0 {
            self
        } else if self.hi <= 0.0 {
            Self::new(-self.hi, -self.lo)
        } else {
            Self::new(0.0, self.hi.max(-self.lo))
        }
    }

    pub fn sqr(self) -> Self {
        if self.lo >= 0.0 {
            Self::new(self.lo * self.lo, self.hi * self.hi)
        } else if self.hi <= 0.0 {
            Self::new(self.hi * self.hi, self.lo * self.lo)
        } else {
            Self::new(0.0, (self.lo * self.lo).max(self.hi * self.hi))
        }
    }

    /// Square root, clamped to the non-negative part
    pub fn sqrt(self) -> Self {
        Self::new(self.lo.max(0.0).sqrt(), self.hi.max(0.0).sqrt())
    }

    /// Lower envelope. NaN in either operand propagates.
    pub fn min(self, other: Self) -> Self {
        if self.is_invalid() || other.is_invalid() {
            return Self::point(f64::NAN);
        }
        Self::new(self.lo.min(other.lo), self.hi.min(other.hi))
    }

    /// Upper envelope. NaN in either operand propagates.
    pub fn max(self, other: Self) -> Self {
        if self.is_invalid() || other.is_invalid() {
            return Self::point(f64::NAN);
        }
        Self::new(self.lo.max(other.lo), self.hi.max(other.hi))
    }

    /// Positive part, `max(x, 0)`
    pub fn positive_part(self) -> Self {
        Self::new(self.lo.max(0.0), self.hi.max(0.0))
    }

    /// Multiply by a scalar
    pub fn scale(self, k: f64) -> Self {
        if k >= 0.0 {
            Self::new(self.lo * k, self.hi * k)
        } else {
            Self::new(self.hi * k, self.lo * k)
        }
    }
}

impl Add for Interval {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.lo + rhs.lo, self.hi + rhs.hi)
    }
}

impl Sub for Interval {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.lo - rhs.hi, self.hi - rhs.lo)
    }
}

impl Neg for Interval {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.hi, -self.lo)
    }
}

impl Mul for Interval {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let a = self.lo * rhs.lo;
        let b = self.lo * rhs.hi;
        let c = self.hi * rhs.lo;
        let d = self.hi * rhs.hi;
        Self::new(a.min(b).min(c).min(d), a.max(b).max(c).max(d))
    }
}

impl Add<f64> for Interval {
    type Output = Self;
    fn add(self, rhs: f64) -> Self {
        Self::new(self.lo + rhs, self.hi + rhs)
    }
}

impl Sub<f64> for Interval {
    type Output = Self;
    fn sub(self, rhs: f64) -> Self {
        Self::new(self.lo - rhs, self.hi - rhs)
    }
}
