use serde::{Deserialize, Serialize};

use crate::fixed::{
    ACTIV_SHIFT, ACTIV_SMALL, Activation, Deriv, LONG_DERIV_SHIFT, LongDeriv, round_shift,
};

/// The function an output core derives its output derivative from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorFn {
    #[default]
    None,
    CrossEntropy,
    Squared,
}

impl ErrorFn {
    /// Computes the output derivative of a unit.
    ///
    /// # Arguments
    /// * `output` - The unit output after the pipeline.
    /// * `target` - The unit target, `Activation::NAN` when undefined.
    ///
    /// # Returns
    /// The derivative; zero when the target is undefined.
    pub fn derivative(self, output: Activation, target: Activation) -> LongDeriv {
        if target.is_nan() {
            return LongDeriv::ZERO;
        }

        match self {
            ErrorFn::None => LongDeriv::ZERO,
            ErrorFn::Squared => LongDeriv::from_raw(output.raw() as i64 - target.raw() as i64),
            ErrorFn::CrossEntropy => cross_entropy(output, target),
        }
    }
}

fn deriv_max() -> LongDeriv {
    Deriv::MAX.to_long_deriv()
}

fn deriv_min() -> LongDeriv {
    Deriv::MIN.to_long_deriv()
}

/// `num / den` with `num` and `den` in s16.15, as an output derivative.
fn divide(num: i64, den: i64, degenerate: LongDeriv) -> LongDeriv {
    match den {
        0 => degenerate,
        den => LongDeriv::saturating_from_wide(((num as i128) << LONG_DERIV_SHIFT) / den as i128),
    }
}

/// `(o - t) / (o (1 - o))`, replaced by the extremal derivative wherever the
/// denominator vanishes at short activation precision.
fn cross_entropy(output: Activation, target: Activation) -> LongDeriv {
    let one = Activation::ONE.raw() as i64;
    let small = ACTIV_SMALL as i64;
    let o = output.raw() as i64;
    let t = target.raw() as i64;

    if target == Activation::ZERO {
        if one - o <= small {
            return deriv_max();
        }

        let den = Deriv::ONE.raw() as i64 - output.to_deriv() as i64;
        return divide(Deriv::ONE.raw() as i64, den, deriv_max());
    }

    if target == Activation::ONE {
        if o <= small {
            return deriv_min();
        }

        return divide(-(Deriv::ONE.raw() as i64), output.to_deriv() as i64, deriv_min());
    }

    let extremal = || {
        let scaled = (deriv_max().raw() as i128 * (o - t) as i128) >> ACTIV_SHIFT;
        LongDeriv::saturating_from_wide(scaled)
    };

    if round_shift(o * (one - o), ACTIV_SHIFT) <= small {
        return extremal();
    }

    let num = output.to_deriv() as i64 - target.to_deriv() as i64;
    let den = (o * (Deriv::ONE.raw() as i64 - output.to_deriv() as i64)) >> ACTIV_SHIFT;

    if den == 0 {
        return extremal();
    }

    divide(num, den, LongDeriv::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn act(x: f64) -> Activation {
        Activation::from_f64(x)
    }

    #[test]
    fn test_undefined_target_has_no_derivative() {
        for f in [ErrorFn::None, ErrorFn::Squared, ErrorFn::CrossEntropy] {
            assert_eq!(f.derivative(act(0.5), Activation::NAN), LongDeriv::ZERO);
        }
    }

    #[test]
    fn test_squared_is_output_minus_target() {
        let d = ErrorFn::Squared.derivative(act(0.75), act(0.25));
        assert_eq!(d, LongDeriv::from_f64(0.5));
    }

    #[test]
    fn test_cross_entropy_regular_cases() {
        let f = ErrorFn::CrossEntropy;

        // 1 / (1 - o)
        assert_eq!(f.derivative(act(0.5), act(0.0)), LongDeriv::from_f64(2.0));
        // -1 / o
        assert_eq!(f.derivative(act(0.5), act(1.0)), LongDeriv::from_f64(-2.0));
        // (o - t) / (o (1 - o))
        assert_eq!(f.derivative(act(0.5), act(0.25)), LongDeriv::from_f64(1.0));
    }

    #[test]
    fn test_cross_entropy_degenerate_cases_saturate() {
        let f = ErrorFn::CrossEntropy;
        let almost_one = Activation::saturate_short(i64::MAX);

        assert_eq!(f.derivative(almost_one, act(0.0)), deriv_max());
        assert_eq!(f.derivative(act(0.0), act(1.0)), deriv_min());

        let d = f.derivative(act(0.0), act(0.5));
        assert!(d < LongDeriv::ZERO);
        assert_eq!(d, LongDeriv::from_raw(deriv_max().raw() / -2));
    }
}
