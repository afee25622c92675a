//! The value types the algebra is parametrised over.
//!
//! Spaces are generic in two directions: the values variables range over
//! ([`DomainValue`]) and the utilities assigned to each combination of
//! values ([`UtilityValue`]). The algebra itself only ever goes through
//! these traits, so new value types can be plugged in without touching the
//! operators.

use std::fmt::Debug;
use std::hash::Hash;
use std::hash::Hasher;

use crate::colony_assert_simple;

/// Capabilities required of variable-domain values.
///
/// Domain values are looked up in the per-variable step maps, compared to
/// keep domains sorted, and copied freely into reusable assignment buffers.
pub trait DomainValue: Copy + Ord + Hash + Debug {}

impl<T: Copy + Ord + Hash + Debug> DomainValue for T {}

/// Capabilities required of utility values.
///
/// A utility type is a totally ordered additive (and multiplicative)
/// value with a distinguished zero and two infinities. The `-∞` value is
/// the infeasible utility when maximising, `+∞` when minimising. Addition
/// and multiplication saturate at the infinities; combining opposite
/// infinities indicates a bug in the calling algorithm and is asserted
/// against rather than given a meaning.
pub trait UtilityValue: Copy + Eq + Ord + Debug {
    /// The neutral element of addition.
    fn zero() -> Self;

    /// The `+∞` value. Adding anything (except `-∞`) to it yields `+∞`.
    fn plus_infinity() -> Self;

    /// The `-∞` value. Adding anything (except `+∞`) to it yields `-∞`.
    fn min_infinity() -> Self;

    /// Whether this value is one of the two infinities.
    fn is_infinite(self) -> bool;

    /// Saturating addition.
    fn plus(self, other: Self) -> Self;

    /// Saturating subtraction.
    fn minus(self, other: Self) -> Self;

    /// Saturating multiplication.
    fn times(self, other: Self) -> Self;

    /// This value as a probability / weight reading.
    fn as_f64(self) -> f64;

    /// The closest utility to a probability / weight reading.
    fn from_f64(value: f64) -> Self;
}

macro_rules! utility_value_int_impl {
    ($ty:ty) => {
        impl UtilityValue for $ty {
            fn zero() -> $ty {
                0
            }

            fn plus_infinity() -> $ty {
                <$ty>::MAX
            }

            fn min_infinity() -> $ty {
                <$ty>::MIN
            }

            fn is_infinite(self) -> bool {
                self == <$ty>::MAX || self == <$ty>::MIN
            }

            fn plus(self, other: $ty) -> $ty {
                if self.is_infinite() {
                    colony_assert_simple!(
                        !other.is_infinite() || other == self,
                        "adding opposite infinities"
                    );
                    self
                } else if other.is_infinite() {
                    other
                } else {
                    // Saturation keeps finite overflows from wrapping past
                    // an infinity with the wrong sign.
                    self.saturating_add(other)
                }
            }

            fn minus(self, other: $ty) -> $ty {
                if self.is_infinite() {
                    colony_assert_simple!(
                        !other.is_infinite() || other != self,
                        "subtracting an infinity from itself"
                    );
                    self
                } else if other == <$ty>::MAX {
                    <$ty>::MIN
                } else if other == <$ty>::MIN {
                    <$ty>::MAX
                } else {
                    self.saturating_sub(other)
                }
            }

            fn times(self, other: $ty) -> $ty {
                if self.is_infinite() || other.is_infinite() {
                    let sign = self.signum() * other.signum();
                    colony_assert_simple!(sign != 0, "multiplying an infinity by zero");
                    if sign > 0 {
                        <$ty>::MAX
                    } else {
                        <$ty>::MIN
                    }
                } else {
                    self.saturating_mul(other)
                }
            }

            fn as_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> $ty {
                value.round() as $ty
            }
        }
    };
}

utility_value_int_impl!(i32);
utility_value_int_impl!(i64);

/// A totally ordered, hashable, non-NaN `f64`.
///
/// This is the utility type for problems with real-valued utilities and the
/// value type probability distributions are expressed in. NaN is rejected
/// at construction so that the total order is sound.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Real(f64);

impl Real {
    /// Wraps a finite or infinite (but not NaN) `f64`.
    pub fn new(value: f64) -> Real {
        colony_assert_simple!(!value.is_nan(), "a utility cannot be NaN");
        Real(value)
    }

    /// The underlying `f64`.
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Eq for Real {}

#[allow(clippy::derive_ord_xor_partial_ord, reason = "the type bans NaN, so the orders agree")]
impl Ord for Real {
    fn cmp(&self, other: &Real) -> std::cmp::Ordering {
        self.partial_cmp(other).expect("Real values are never NaN")
    }
}

impl Hash for Real {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // 0.0 and -0.0 compare equal, so they must hash alike.
        let normalised = if self.0 == 0.0 { 0.0 } else { self.0 };
        normalised.to_bits().hash(state);
    }
}

impl std::fmt::Display for Real {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<f64> for Real {
    fn from(value: f64) -> Real {
        Real::new(value)
    }
}

impl UtilityValue for Real {
    fn zero() -> Real {
        Real(0.0)
    }

    fn plus_infinity() -> Real {
        Real(f64::INFINITY)
    }

    fn min_infinity() -> Real {
        Real(f64::NEG_INFINITY)
    }

    fn is_infinite(self) -> bool {
        self.0.is_infinite()
    }

    fn plus(self, other: Real) -> Real {
        colony_assert_simple!(
            !(self.0.is_infinite() && other.0.is_infinite() && self.0 != other.0),
            "adding opposite infinities"
        );
        Real(self.0 + other.0)
    }

    fn minus(self, other: Real) -> Real {
        let difference = self.0 - other.0;
        colony_assert_simple!(!difference.is_nan(), "subtracting an infinity from itself");
        Real(difference)
    }

    fn times(self, other: Real) -> Real {
        let product = self.0 * other.0;
        colony_assert_simple!(!product.is_nan(), "multiplying an infinity by zero");
        Real(product)
    }

    fn as_f64(self) -> f64 {
        self.0
    }

    fn from_f64(value: f64) -> Real {
        Real::new(value)
    }
}
