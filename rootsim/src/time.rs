//! Virtual time.
//!
//! Simulated time in a Time Warp kernel is a dimensionless quantity: models
//! advance it by arbitrary real-valued deltas, typically drawn from the
//! rollbackable random distributions of the [`Context`](crate::model::Context).
//!
//! [`SimTime`] wraps an `f64` and provides a total order, which makes it usable
//! as a sorting key in the kernel queues. Negative and NaN values are rejected
//! at construction time so that the order is also the natural numerical order.
//!
//! # Examples
//!
//! ```
//! use rootsim::time::SimTime;
//!
//! let t0 = SimTime::ZERO;
//! let t1 = t0 + 1.5;
//!
//! assert!(t1 > t0);
//! assert_eq!(t1.as_f64(), 1.5);
//! assert!(SimTime::INFINITY > t1);
//! ```
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// A point in virtual time.
#[derive(Clone, Copy, Default, Serialize, Deserialize)]
pub struct SimTime(f64);

impl SimTime {
    /// The origin of virtual time, at which INIT events are delivered.
    pub const ZERO: Self = Self(0.0);

    /// A time that is later than any reachable time.
    pub const INFINITY: Self = Self(f64::INFINITY);

    /// Creates a timestamp from a non-negative, non-NaN value.
    ///
    /// Returns `None` if the value is negative or NaN.
    pub fn new(t: f64) -> Option<Self> {
        if t.is_nan() || t < 0.0 {
            None
        } else {
            // Normalizes -0.0, which `total_cmp` would order before 0.0.
            Some(Self(t + 0.0))
        }
    }

    /// Returns the raw value of the timestamp.
    pub const fn as_f64(self) -> f64 {
        self.0
    }

    /// Returns `true` if this is [`SimTime::INFINITY`].
    pub fn is_infinite(self) -> bool {
        self.0.is_infinite()
    }

    /// Returns the earliest of two timestamps.
    pub fn min(self, other: Self) -> Self {
        if other < self {
            other
        } else {
            self
        }
    }

    /// Returns the latest of two timestamps.
    pub fn max(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }

    /// Bit representation, used to publish timestamps through atomics.
    pub(crate) fn to_bits(self) -> u64 {
        self.0.to_bits()
    }

    /// Inverse of [`SimTime::to_bits`].
    pub(crate) fn from_bits(bits: u64) -> Self {
        Self(f64::from_bits(bits))
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add<f64> for SimTime {
    type Output = Self;

    /// Advances the timestamp by a delta.
    ///
    /// # Panics
    ///
    /// Panics if the result is negative or NaN.
    fn add(self, delta: f64) -> Self {
        match Self::new(self.0 + delta) {
            Some(t) => t,
            None => panic!("virtual time {} + {} is not a valid timestamp", self.0, delta),
        }
    }
}

impl AddAssign<f64> for SimTime {
    fn add_assign(&mut self, delta: f64) {
        *self = *self + delta;
    }
}

impl From<SimTime> for f64 {
    fn from(t: SimTime) -> Self {
        t.0
    }
}

impl fmt::Debug for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_timestamps() {
        assert!(SimTime::new(-1.0).is_none());
        assert!(SimTime::new(f64::NAN).is_none());
        assert_eq!(SimTime::new(0.0), Some(SimTime::ZERO));
    }

    #[test]
    fn ordering() {
        let a = SimTime::new(1.0).unwrap();
        let b = SimTime::new(2.0).unwrap();

        assert!(a < b);
        assert_eq!(a.min(b), a);
        assert_eq!(a.max(b), b);
        assert_eq!(SimTime::INFINITY.min(b), b);
        assert!(SimTime::INFINITY.is_infinite());
    }

    #[test]
    fn bits_round_trip() {
        let t = SimTime::new(42.125).unwrap();

        assert_eq!(SimTime::from_bits(t.to_bits()), t);
        assert_eq!(SimTime::from_bits(SimTime::INFINITY.to_bits()), SimTime::INFINITY);
    }
}
