//! Unit newtypes for the quantities that appear in scenario tables.
//!
//! Scenario data mixes engineering units (MW, Mvar, MVA, kV, degrees) with
//! per-unit quantities used inside the relaxations. The wrappers below keep
//! the two apart at the type level; conversion to per-unit always goes
//! through an explicit `to_per_unit(base)` call.
//!
//! ```
//! use relax_core::units::{Degrees, MegavoltAmperes, Megawatts};
//!
//! let rating = MegavoltAmperes(250.0);
//! assert_eq!(rating.to_per_unit(100.0), 2.5);
//!
//! let p = Megawatts(40.0) + Megawatts(10.0);
//! assert_eq!(p.value(), 50.0);
//!
//! let limit = Degrees(45.0).to_radians();
//! assert!((limit.tan() - 1.0).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Check if value is finite
            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

// =============================================================================
// Power Units
// =============================================================================

/// Active power in megawatts (MW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

impl_unit_ops!(Megawatts, "MW");

/// Reactive power in megavolt-amperes reactive (Mvar)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megavars(pub f64);

impl_unit_ops!(Megavars, "Mvar");

/// Apparent power in megavolt-amperes (MVA), used for thermal ratings.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MegavoltAmperes(pub f64);

impl_unit_ops!(MegavoltAmperes, "MVA");

impl Megawatts {
    /// Build from a per-unit value on the given system base.
    #[inline]
    pub fn from_per_unit(value: f64, base_mva: f64) -> Self {
        Self(value * base_mva)
    }
}

impl Megavars {
    /// Build from a per-unit value on the given system base.
    #[inline]
    pub fn from_per_unit(value: f64, base_mva: f64) -> Self {
        Self(value * base_mva)
    }
}

impl MegavoltAmperes {
    /// Per-unit value on the given system base.
    #[inline]
    pub fn to_per_unit(self, base_mva: f64) -> f64 {
        self.0 / base_mva
    }
}

// =============================================================================
// Voltage Units
// =============================================================================

/// Voltage magnitude in per-unit (pu)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PerUnit(pub f64);

impl_unit_ops!(PerUnit, "pu");

impl PerUnit {
    /// Square of the magnitude; the relaxations bound `|v|²`, not `|v|`.
    #[inline]
    pub fn squared(self) -> f64 {
        self.0 * self.0
    }
}

/// Base voltage in kilovolts (kV)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_unit_ops!(Kilovolts, "kV");

// =============================================================================
// Angle Units
// =============================================================================

/// Angle in radians
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Radians(pub f64);

impl_unit_ops!(Radians, "rad");

/// Angle in degrees
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Degrees(pub f64);

impl_unit_ops!(Degrees, "°");

impl Radians {
    /// Convert to degrees
    #[inline]
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }

    /// Tangent of the angle
    #[inline]
    pub fn tan(self) -> f64 {
        self.0.tan()
    }
}

impl Degrees {
    /// Convert to radians
    #[inline]
    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }
}
