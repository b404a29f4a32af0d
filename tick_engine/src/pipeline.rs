//! The per-unit output pipeline.
//!
//! FORWARD applies the configured stages in order, BACKPROP applies their
//! backward variants in reverse order. Every stage reads and writes a single
//! unit's `UnitSlot`.

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    fixed::{
        ACTIV_SHIFT, Activation, DELTA_SHIFT, Delta, FPREAL_SHIFT, FpReal, LONG_DERIV_SHIFT,
        LongDeriv, Net, round_shift, round_shift_wide,
    },
    history::{TickLog, alloc},
};

/// The closed set of pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Sigmoid of the received net.
    Logistic,
    /// The received net, unchanged.
    Linear,
    /// Blends the previous output towards the new one by `dt`.
    Integrator,
    /// Replaces the output with the external value.
    HardClamp,
    /// Moves the output towards the external value by the clamp strength.
    WeakClamp,
    /// Forces the output to one.
    Bias,
}

impl Stage {
    /// Whether the stage keeps per-unit state across ticks.
    pub fn is_stateful(self) -> bool {
        matches!(self, Stage::Integrator)
    }
}

/// The working values of the unit currently going through the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitSlot {
    pub net: Net,
    pub output: Activation,
    /// The externally supplied input for this tick, or `Activation::NAN`.
    pub external: Activation,
    pub deriv: LongDeriv,
}

impl UnitSlot {
    pub fn new(net: Net, external: Activation) -> Self {
        Self {
            net,
            external,
            ..Default::default()
        }
    }
}

/// Per-unit state of the integrator stage.
#[derive(Debug)]
struct IntegratorState {
    last_output: Vec<Activation>,
    last_deriv: Vec<LongDeriv>,
    /// The integrator inputs, replayed as outputs during BACKPROP.
    instant: TickLog<Activation>,
}

impl IntegratorState {
    fn new(num_units: usize, max_ticks: usize) -> Result<Self> {
        Ok(Self {
            last_output: alloc("integrator outputs", num_units)?,
            last_deriv: alloc("integrator derivatives", num_units)?,
            instant: TickLog::new("integrator history", num_units, max_ticks)?,
        })
    }

    fn reset(&mut self, init_output: Activation) {
        self.last_output.fill(init_output);
        self.last_deriv.fill(LongDeriv::ZERO);
        self.instant.clear();
    }
}

/// Numeric parameters of the configurable stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageParams {
    pub integrator_dt: FpReal,
    pub weak_clamp_strength: FpReal,
}

/// An ordered list of stages plus the state of the stateful ones.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
    params: StageParams,
    integrator: Option<IntegratorState>,
}

impl Pipeline {
    /// Creates a new `Pipeline`, running the initializer of every stateful
    /// stage.
    ///
    /// # Arguments
    /// * `stages` - The stages in FORWARD order.
    /// * `params` - The numeric stage parameters.
    /// * `num_units` - The amount of units owned by the core.
    /// * `max_ticks` - The largest amount of ticks any example runs for.
    ///
    /// # Returns
    /// The pipeline or `MemoryUnavailable` if stage state can't be allocated.
    pub fn new(
        stages: Vec<Stage>,
        params: StageParams,
        num_units: usize,
        max_ticks: usize,
    ) -> Result<Self> {
        let integrator = if stages.iter().any(|s| s.is_stateful()) {
            Some(IntegratorState::new(num_units, max_ticks)?)
        } else {
            None
        };

        Ok(Self {
            stages,
            params,
            integrator,
        })
    }

    /// Resets stage state for a new example.
    pub fn reset(&mut self, init_output: Activation) {
        if let Some(state) = &mut self.integrator {
            state.reset(init_output);
        }
    }

    /// Runs every stage forward over `slot`.
    ///
    /// The output starts at zero; stages that don't read the net only see
    /// the outputs of the stages before them.
    pub fn forward(&mut self, unit: usize, tick: u32, slot: &mut UnitSlot) {
        slot.output = Activation::ZERO;

        for i in 0..self.stages.len() {
            self.apply(self.stages[i], unit, tick, slot);
        }
    }

    /// Runs every stage backward over `slot`, last stage first.
    ///
    /// `slot` must hold the net and output stored for `tick` and the output
    /// derivative to propagate.
    pub fn backward(&mut self, unit: usize, tick: u32, slot: &mut UnitSlot) {
        for i in (0..self.stages.len()).rev() {
            self.apply_back(self.stages[i], unit, tick, slot);
        }
    }

    fn apply(&mut self, stage: Stage, unit: usize, tick: u32, slot: &mut UnitSlot) {
        match stage {
            Stage::Logistic => slot.output = sigmoid(slot.net),
            Stage::Linear => slot.output = Activation::from_net(slot.net),
            Stage::Integrator => {
                let Some(state) = &mut self.integrator else {
                    return;
                };

                let last = state.last_output[unit].raw() as i64;
                let new = slot.output.raw() as i64;
                state.instant.store(unit, tick, slot.output);

                let dt = self.params.integrator_dt.raw() as i64;
                let out = last + round_shift(dt * (new - last), FPREAL_SHIFT);
                slot.output = Activation::saturate_short(out);
                state.last_output[unit] = slot.output;
            }
            Stage::HardClamp => {
                if !slot.external.is_nan() {
                    slot.output = slot.external;
                }
            }
            Stage::WeakClamp => {
                if !slot.external.is_nan() {
                    let ext = slot.external.raw() as i64;
                    let out = slot.output.raw() as i64;
                    let strength = self.params.weak_clamp_strength.raw() as i64;
                    let pulled = out + round_shift(strength * (ext - out), FPREAL_SHIFT);
                    slot.output = Activation::saturate_short(pulled);
                }
            }
            Stage::Bias => slot.output = Activation::ONE,
        }
    }

    fn apply_back(&mut self, stage: Stage, unit: usize, tick: u32, slot: &mut UnitSlot) {
        match stage {
            Stage::Logistic => {
                let o = slot.output.raw() as i64;
                let slope = round_shift(o * (Activation::ONE.raw() as i64 - o), ACTIV_SHIFT);
                let wide = round_shift_wide(
                    slot.deriv.raw() as i128 * slope as i128,
                    LONG_DERIV_SHIFT + ACTIV_SHIFT - DELTA_SHIFT,
                );

                // Saturate at delta precision so the final narrowing is exact.
                let wide = wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
                slot.deriv = Delta::saturating_from_wide(wide).to_long_deriv();
            }
            Stage::Integrator => {
                let Some(state) = &mut self.integrator else {
                    return;
                };

                slot.output = state.instant.restore(unit, tick);

                let dt = self.params.integrator_dt.raw() as i128;
                let last = state.last_deriv[unit];
                let d = LongDeriv::saturating_from_wide((dt * last.raw() as i128) >> FPREAL_SHIFT);

                state.last_deriv[unit] = last
                    .saturating_add(slot.deriv)
                    .saturating_add(LongDeriv::from_raw(-d.raw()));
                slot.deriv = d;
            }
            Stage::Bias => slot.deriv = LongDeriv::ZERO,
            Stage::Linear | Stage::HardClamp | Stage::WeakClamp => {}
        }
    }
}

/// The logistic function of a net, saturated to the short activation range.
pub fn sigmoid(net: Net) -> Activation {
    let x = net.to_f64();
    let y = 1.0 / (1.0 + (-x).exp());
    Activation::saturate_short(Activation::from_f64(y).raw() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: StageParams = StageParams {
        integrator_dt: FpReal::from_raw(1 << 15),
        weak_clamp_strength: FpReal::from_raw(1 << 15),
    };

    fn pipeline(stages: &[Stage]) -> Pipeline {
        let mut pipeline = Pipeline::new(stages.to_vec(), PARAMS, 2, 4).unwrap();
        pipeline.reset(Activation::ZERO);
        pipeline
    }

    #[test]
    fn test_linear_preserves_the_net() {
        let mut p = pipeline(&[Stage::Linear]);

        for x in [0.5, -0.25, 0.0] {
            let mut slot = UnitSlot::new(Net::from_f64(x), Activation::NAN);
            p.forward(0, 0, &mut slot);
            assert_eq!(slot.output, Activation::from_f64(x));
        }
    }

    #[test]
    fn test_no_op_backward_stages_keep_the_derivative() {
        let mut p = pipeline(&[Stage::Linear, Stage::HardClamp, Stage::WeakClamp]);
        let deriv = LongDeriv::from_f64(-0.3125);

        let mut slot = UnitSlot::new(Net::from_f64(0.25), Activation::from_f64(0.75));
        p.forward(1, 2, &mut slot);
        slot.deriv = deriv;
        p.backward(1, 2, &mut slot);

        assert_eq!(slot.deriv, deriv);
    }

    #[test]
    fn test_clamps_skip_nan_and_inject_values() {
        let mut p = pipeline(&[Stage::Linear, Stage::HardClamp]);
        let mut slot = UnitSlot::new(Net::from_f64(0.25), Activation::NAN);
        p.forward(0, 0, &mut slot);
        assert_eq!(slot.output, Activation::from_f64(0.25));

        slot.external = Activation::from_f64(-0.5);
        p.forward(0, 0, &mut slot);
        assert_eq!(slot.output, Activation::from_f64(-0.5));

        // Half strength moves the output halfway to the external value.
        let mut p = pipeline(&[Stage::Linear, Stage::WeakClamp]);
        let mut slot = UnitSlot::new(Net::from_f64(0.25), Activation::from_f64(0.75));
        p.forward(0, 0, &mut slot);
        assert_eq!(slot.output, Activation::from_f64(0.5));
    }

    #[test]
    fn test_bias_forces_one_and_blocks_derivatives() {
        let mut p = pipeline(&[Stage::Bias]);
        let mut slot = UnitSlot::new(Net::from_f64(-3.0), Activation::NAN);
        p.forward(0, 0, &mut slot);
        assert_eq!(slot.output, Activation::ONE);

        slot.deriv = LongDeriv::ONE;
        p.backward(0, 0, &mut slot);
        assert_eq!(slot.deriv, LongDeriv::ZERO);
    }

    #[test]
    fn test_logistic_forward_and_backward() {
        let mut p = pipeline(&[Stage::Logistic]);
        let mut slot = UnitSlot::new(Net::ZERO, Activation::NAN);
        p.forward(0, 0, &mut slot);
        assert_eq!(slot.output, Activation::from_f64(0.5));

        // o(1 - o) = 0.25 at o = 0.5.
        slot.deriv = LongDeriv::from_f64(0.5);
        p.backward(0, 0, &mut slot);
        assert_eq!(Delta::from_long_deriv(slot.deriv), Delta::from_f64(0.125));

        let mut saturated = UnitSlot::new(Net::MAX, Activation::NAN);
        p.forward(0, 0, &mut saturated);
        assert!(saturated.output < Activation::ONE);
    }

    #[test]
    fn test_integrator_blends_and_replays() {
        let mut p = pipeline(&[Stage::Linear, Stage::Integrator]);

        let mut slot = UnitSlot::new(Net::from_f64(0.5), Activation::NAN);
        p.forward(0, 0, &mut slot);
        assert_eq!(slot.output, Activation::from_f64(0.25));

        p.forward(0, 1, &mut slot);
        assert_eq!(slot.output, Activation::from_f64(0.375));

        // Backward restores the integrator input and passes dt of the carried
        // derivative, which starts at zero.
        slot.deriv = LongDeriv::from_f64(1.0);
        p.backward(0, 1, &mut slot);
        assert_eq!(slot.output, Activation::from_f64(0.5));
        assert_eq!(slot.deriv, LongDeriv::ZERO);

        slot.deriv = LongDeriv::ZERO;
        p.backward(0, 0, &mut slot);
        assert_eq!(slot.deriv, LongDeriv::from_f64(0.5));

        p.reset(Activation::ZERO);
        let mut slot = UnitSlot::new(Net::from_f64(0.5), Activation::NAN);
        p.forward(0, 0, &mut slot);
        assert_eq!(slot.output, Activation::from_f64(0.25));
    }
}
