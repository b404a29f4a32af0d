//! Early stopping: per-unit convergence criteria and the daisy chain that
//! combines every output core's verdict into one decision per tick.

use serde::{Deserialize, Serialize};

use crate::fixed::{ACTIV_SHIFT, Activation, ERROR_SHIFT, ErrorVal, round_shift};

/// The convergence criterion of an output core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Never met; events always run to their maximum tick bound.
    #[default]
    None,
    /// Every unit with a target is within the threshold of it.
    Standard,
    /// The largest output is on the unit with the largest target, within the
    /// threshold of it.
    Max,
}

/// The running evaluation of a criterion over the units of one tick.
#[derive(Debug, Clone)]
pub struct StopCriterion {
    criterion: Criterion,
    threshold: ErrorVal,
    all_close: bool,
    max_output: Option<(usize, Activation)>,
    max_target: Option<(usize, Activation)>,
}

impl StopCriterion {
    /// Creates a new `StopCriterion`.
    ///
    /// # Arguments
    /// * `criterion` - The criterion to evaluate.
    /// * `threshold` - The accepted distance between outputs and targets.
    pub fn new(criterion: Criterion, threshold: ErrorVal) -> Self {
        Self {
            criterion,
            threshold,
            all_close: true,
            max_output: None,
            max_target: None,
        }
    }

    /// Starts a new tick.
    pub fn reset(&mut self) {
        self.all_close = true;
        self.max_output = None;
        self.max_target = None;
    }

    fn distance(a: Activation, b: Activation) -> ErrorVal {
        let diff = round_shift(a.raw() as i64 - b.raw() as i64, ACTIV_SHIFT - ERROR_SHIFT);
        ErrorVal::saturating_from_wide(diff.abs())
    }

    /// Folds one unit into the evaluation. Units without a target are skipped.
    pub fn evaluate(&mut self, unit: usize, output: Activation, target: Activation) {
        if target.is_nan() {
            return;
        }

        match self.criterion {
            Criterion::None => {}
            Criterion::Standard => {
                self.all_close &= Self::distance(output, target) < self.threshold;
            }
            Criterion::Max => {
                if self.max_output.is_none_or(|(_, max)| output > max) {
                    self.max_output = Some((unit, output));
                }

                if self.max_target.is_none_or(|(_, max)| target > max) {
                    self.max_target = Some((unit, target));
                }
            }
        }
    }

    /// Whether the criterion holds for the units evaluated since the last reset.
    pub fn is_met(&self) -> bool {
        match self.criterion {
            Criterion::None => false,
            Criterion::Standard => self.all_close,
            Criterion::Max => match (self.max_output, self.max_target) {
                (Some((out_unit, out)), Some((tgt_unit, tgt))) => {
                    out_unit == tgt_unit && Self::distance(out, tgt) < self.threshold
                }
                _ => true,
            },
        }
    }
}

/// A core's place in the stop daisy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPosition {
    /// Not an output core; only receives the final decision.
    Outside,
    /// Starts the chain; no partial decision to wait for.
    First,
    /// Waits for the previous core's partial decision and relays it.
    Middle,
    /// Waits for the previous core's partial decision and finalizes it.
    Last,
    /// The only output core: starts and finalizes the chain.
    Only,
}

impl ChainPosition {
    /// Derives the position from the core role flags.
    pub fn new(output: bool, first: bool, last: bool) -> Self {
        match (output, first, last) {
            (false, _, _) => ChainPosition::Outside,
            (true, true, true) => ChainPosition::Only,
            (true, true, false) => ChainPosition::First,
            (true, false, true) => ChainPosition::Last,
            (true, false, false) => ChainPosition::Middle,
        }
    }

    /// The amount of contributions the chain scoreboard waits for: the local
    /// evaluation plus the previous core's partial decision, if any.
    pub fn expected_contributions(self) -> u32 {
        match self {
            ChainPosition::Outside => 0,
            ChainPosition::First | ChainPosition::Only => 1,
            ChainPosition::Middle | ChainPosition::Last => 2,
        }
    }

    pub fn finalizes(self) -> bool {
        matches!(self, ChainPosition::Last | ChainPosition::Only)
    }
}

/// Tick bounds of the current event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickBounds {
    pub min_ticks: u32,
    pub max_ticks: u32,
}

impl TickBounds {
    /// Decides whether the event stops after this tick.
    ///
    /// # Arguments
    /// * `criterion_met` - The combined verdict of every core in the chain.
    /// * `ticks_done` - The ticks completed in the event, this one included.
    /// * `global_max_ticks` - The network-wide tick limit.
    pub fn finalize(self, criterion_met: bool, ticks_done: u32, global_max_ticks: u32) -> bool {
        ticks_done >= self.max_ticks
            || ticks_done >= global_max_ticks.saturating_sub(1)
            || (criterion_met && ticks_done >= self.min_ticks)
    }

    /// The ticks the event runs for when the criterion is never met.
    pub fn clipped_ticks(self, global_max_ticks: u32) -> u32 {
        self.max_ticks
            .min(global_max_ticks.saturating_sub(1))
            .max(1)
    }
}
