//! Signed fixed-point formats and the rounding/saturation rules every
//! pipeline stage follows.
//!
//! Each quantity is stored in a plain integer with a fixed number of
//! fractional bits. Products are computed in a wider integer; narrowing adds
//! half an LSB of the target precision, shifts right and clamps to the target
//! range.

use std::fmt;

pub const NET_SHIFT: u32 = 23;
pub const ACTIV_SHIFT: u32 = 27;
pub const SHORT_ACTIV_SHIFT: u32 = 15;
pub const ERROR_SHIFT: u32 = 15;
pub const DELTA_SHIFT: u32 = 23;
pub const DERIV_SHIFT: u32 = 15;
pub const LONG_DERIV_SHIFT: u32 = 27;
pub const FPREAL_SHIFT: u32 = 16;

/// Largest short activation (s0.15) expressed in s4.27.
pub const ACTIV_SHORT_MAX: i64 = (i16::MAX as i64) << (ACTIV_SHIFT - SHORT_ACTIV_SHIFT);
/// Smallest short activation (s0.15) expressed in s4.27.
pub const ACTIV_SHORT_MIN: i64 = (i16::MIN as i64) << (ACTIV_SHIFT - SHORT_ACTIV_SHIFT);
/// One short activation LSB expressed in s4.27.
pub const ACTIV_SMALL: i32 = 1 << (ACTIV_SHIFT - SHORT_ACTIV_SHIFT);

/// Shifts `value` right by `shift` bits, rounding to nearest.
pub fn round_shift(value: i64, shift: u32) -> i64 {
    if shift == 0 {
        return value;
    }

    (value + (1 << (shift - 1))) >> shift
}

/// Same as `round_shift` for 128 bit intermediates.
pub fn round_shift_wide(value: i128, shift: u32) -> i128 {
    if shift == 0 {
        return value;
    }

    (value + (1 << (shift - 1))) >> shift
}

/// Clamps `value` into `[min, max]`.
pub fn saturate(value: i64, min: i64, max: i64) -> i64 {
    value.clamp(min, max)
}

macro_rules! fixed_type {
    ($(#[$doc:meta])* $name:ident, $raw:ty, $wide:ty, $shift:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($raw);

        impl $name {
            pub const SHIFT: u32 = $shift;
            pub const ZERO: Self = Self(0);
            pub const ONE: Self = Self(1 << $shift);
            pub const MAX: Self = Self(<$raw>::MAX);
            pub const MIN: Self = Self(<$raw>::MIN);

            pub const fn from_raw(raw: $raw) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> $raw {
                self.0
            }

            /// Narrows a wide intermediate that is already in this format,
            /// clamping to the storage range.
            pub fn saturating_from_wide(value: $wide) -> Self {
                Self(value.clamp(<$raw>::MIN as $wide, <$raw>::MAX as $wide) as $raw)
            }

            /// Converts a real value, rounding to nearest and saturating.
            pub fn from_f64(value: f64) -> Self {
                let scaled = (value * (1u64 << $shift) as f64).round();
                Self(scaled.clamp(<$raw>::MIN as f64, <$raw>::MAX as f64) as $raw)
            }

            pub fn to_f64(self) -> f64 {
                self.0 as f64 / (1u64 << $shift) as f64
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:.7} (0x{:08x})", self.to_f64(), self.0)
            }
        }
    };
}

fixed_type!(
    /// A unit net input, s8.23.
    Net, i32, i64, NET_SHIFT
);
fixed_type!(
    /// A unit output, input or target, s4.27.
    Activation, i32, i64, ACTIV_SHIFT
);
fixed_type!(
    /// A received error, s16.15.
    ErrorVal, i32, i64, ERROR_SHIFT
);
fixed_type!(
    /// An error delta sent upstream, s8.23.
    Delta, i32, i64, DELTA_SHIFT
);
fixed_type!(
    /// A short derivative, s16.15.
    Deriv, i32, i64, DERIV_SHIFT
);
fixed_type!(
    /// An output derivative, s36.27.
    LongDeriv, i64, i128, LONG_DERIV_SHIFT
);
fixed_type!(
    /// Times, rates and strengths, s15.16.
    FpReal, i32, i64, FPREAL_SHIFT
);

impl Activation {
    /// The "no value" sentinel used in input and target tables.
    pub const NAN: Self = Self(i32::MIN);

    pub fn is_nan(self) -> bool {
        self == Self::NAN
    }

    /// Clamps an s4.27 intermediate to the short activation range `[-1, 1 - 2^-15]`.
    pub fn saturate_short(value: i64) -> Self {
        Self(saturate(value, ACTIV_SHORT_MIN, ACTIV_SHORT_MAX) as i32)
    }

    /// Widens a net to s4.27, saturating to the short activation range.
    pub fn from_net(net: Net) -> Self {
        Self::saturate_short((net.0 as i64) << (ACTIV_SHIFT - NET_SHIFT))
    }

    /// Converts to an s16.15 derivative by truncation.
    pub fn to_deriv(self) -> i32 {
        self.0 >> (ACTIV_SHIFT - DERIV_SHIFT)
    }
}

impl ErrorVal {
    /// Adds two errors, saturating at the storage range.
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Widens to an output derivative.
    pub fn to_long_deriv(self) -> LongDeriv {
        LongDeriv((self.0 as i64) << (LONG_DERIV_SHIFT - ERROR_SHIFT))
    }
}

impl Delta {
    /// Narrows an output derivative into a delta, rounding and saturating.
    pub fn from_long_deriv(deriv: LongDeriv) -> Self {
        Self::saturating_from_wide(round_shift(deriv.0, LONG_DERIV_SHIFT - DELTA_SHIFT))
    }

    /// Widens to an output derivative; exact.
    pub fn to_long_deriv(self) -> LongDeriv {
        LongDeriv((self.0 as i64) << (LONG_DERIV_SHIFT - DELTA_SHIFT))
    }
}

impl Deriv {
    /// Widens to an output derivative; exact.
    pub fn to_long_deriv(self) -> LongDeriv {
        LongDeriv((self.0 as i64) << (LONG_DERIV_SHIFT - DERIV_SHIFT))
    }
}

impl LongDeriv {
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl FpReal {
    /// Number of ticks covered by `self` time intervals at `ticks_per_int`
    /// ticks each. One LSB is added before scaling so exact interval counts
    /// don't round down.
    pub fn to_ticks(self, ticks_per_int: u32) -> u32 {
        let scaled = (self.0 as i64 + 1) * ticks_per_int as i64;
        round_shift(scaled, FPREAL_SHIFT).clamp(0, u32::MAX as i64) as u32
    }
}
