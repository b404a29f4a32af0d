//! Static core configuration.
//!
//! `CoreConfig` is the JSON document a core is started with. It is validated
//! and converted to fixed point once, producing the `EngineConfig` the engine
//! runs from.

use std::{fs, ops::Range, path::Path, time::Duration};

use comms::{KeyBase, MsgClass, Phase, key::MAX_INDEX};
use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineErr, Result},
    error_fn::ErrorFn,
    fixed::{Activation, ErrorVal, FpReal},
    pipeline::{Stage, StageParams},
    scoreboard::Tally,
    stop::{ChainPosition, Criterion, TickBounds},
};

const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_WATCHDOG_MS: u64 = 1000;

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_watchdog_ms() -> u64 {
    DEFAULT_WATCHDOG_MS
}

fn default_one() -> f64 {
    1.0
}

fn default_write_blks() -> u32 {
    1
}

/// The configuration of a single core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub name: String,
    pub network: NetworkConfig,
    pub units: UnitConfig,
    pub keys: RoutingKeys,
    pub examples: ExampleSet,
}

/// Parameters shared by every core of the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub training: bool,
    pub epochs: u32,
    pub ticks_per_interval: u32,
    pub global_max_ticks: u32,
    #[serde(default = "default_watchdog_ms")]
    pub watchdog_ms: u64,
}

/// The units owned by the core and how they are processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    pub num_units: usize,
    #[serde(default)]
    pub input: bool,
    #[serde(default)]
    pub output: bool,
    /// First output core of the stop chain.
    #[serde(default)]
    pub first_output: bool,
    /// Last output core of the stop chain; it finalizes the stop decision.
    #[serde(default)]
    pub last_output: bool,
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub error_fn: ErrorFn,
    #[serde(default)]
    pub criterion: Criterion,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub init_output: f64,
    #[serde(default = "default_one")]
    pub integrator_dt: f64,
    #[serde(default = "default_one")]
    pub weak_clamp_strength: f64,
    /// Forward sync packets expected before every example but the first.
    #[serde(default)]
    pub sync_expected: u32,
    #[serde(default)]
    pub sync_tally: Tally,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub write_out: bool,
    #[serde(default)]
    pub write_blk: u32,
    #[serde(default = "default_write_blks")]
    pub num_write_blks: u32,
}

/// Route bases of the keys the core sends with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingKeys {
    /// One route per partition of `partition_size` units.
    pub forward: Vec<u32>,
    pub partition_size: usize,
    pub backprop: u32,
    pub stop: u32,
}

/// The examples the network is presented, with their inputs and targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleSet {
    pub min_time: f64,
    pub max_time: f64,
    pub examples: Vec<ExampleConfig>,
    pub events: Vec<EventConfig>,
    /// Rows of `num_units` values; `null` means no input.
    #[serde(default)]
    pub inputs: Vec<Vec<Option<f64>>>,
    /// Rows of `num_units` values; `null` means no target.
    #[serde(default)]
    pub targets: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleConfig {
    pub ev_idx: usize,
    pub num_events: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    #[serde(default)]
    pub min_time: Option<f64>,
    #[serde(default)]
    pub max_time: Option<f64>,
    /// Row of the input and target tables used during the event.
    pub it_idx: usize,
}

impl CoreConfig {
    /// Parses a core configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a core configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Validates the configuration and converts it to fixed point.
    ///
    /// # Returns
    /// The engine configuration or `ConfigUnavailable` naming the problem.
    pub fn validate(self) -> Result<EngineConfig> {
        let CoreConfig {
            name,
            network,
            units,
            keys,
            examples,
        } = self;

        let bail = |detail: String| Err(EngineErr::ConfigUnavailable(format!("{name}: {detail}")));

        if units.num_units == 0 || units.num_units > MAX_INDEX {
            return bail(format!("unit count {} out of range", units.num_units));
        }
        if network.epochs == 0 || network.ticks_per_interval == 0 || network.global_max_ticks == 0
        {
            return bail("epochs, ticks per interval and max ticks must be positive".into());
        }
        if units.queue_capacity == 0 {
            return bail("packet queue capacity must be positive".into());
        }
        if units.sync_tally == Tally::Bitmap && units.sync_expected > 32 {
            return bail(format!("{} sync blocks don't fit a bitmap", units.sync_expected));
        }
        if !units.output && (units.first_output || units.last_output || units.write_out) {
            return bail("stop chain and host reports need an output core".into());
        }

        let partition_size = keys.partition_size;
        if partition_size == 0 || partition_size > MAX_INDEX {
            return bail(format!("partition size {partition_size} out of range"));
        }
        if keys.forward.len() != units.num_units.div_ceil(partition_size) {
            return bail(format!(
                "{} forward keys for {} partitions",
                keys.forward.len(),
                units.num_units.div_ceil(partition_size)
            ));
        }

        let forward = keys
            .forward
            .iter()
            .map(|&route| KeyBase::new(route, Phase::Forward, MsgClass::Data))
            .collect::<comms::Result<Vec<_>>>()?;

        let routes = KeyRoutes {
            forward,
            partition_size,
            backprop: KeyBase::new(keys.backprop, Phase::Backprop, MsgClass::Data)?,
            stop_partial: KeyBase::new(keys.stop, Phase::Forward, MsgClass::StopPartial)?,
            stop_final: KeyBase::new(keys.stop, Phase::Forward, MsgClass::StopFinal)?,
        };

        let needs_inputs = units
            .stages
            .iter()
            .any(|s| matches!(s, Stage::HardClamp | Stage::WeakClamp));
        let inputs = match Table::new(&examples.inputs, units.num_units) {
            Ok(table) => table,
            Err(detail) => return bail(format!("inputs: {detail}")),
        };
        let targets = match Table::new(&examples.targets, units.num_units) {
            Ok(table) => table,
            Err(detail) => return bail(format!("targets: {detail}")),
        };

        if needs_inputs && !units.input {
            return bail("clamp stages need an input core".into());
        }
        if units.input && inputs.is_none() {
            return bail("input cores need an input table".into());
        }
        if units.output && targets.is_none() {
            return bail("output cores need a target table".into());
        }

        let set_min = FpReal::from_f64(examples.min_time);
        let set_max = FpReal::from_f64(examples.max_time);
        let tpi = network.ticks_per_interval;

        let mut events = Vec::with_capacity(examples.events.len());
        for (i, ev) in examples.events.iter().enumerate() {
            let tables = [inputs.as_ref(), targets.as_ref()];
            if tables.into_iter().flatten().any(|t| ev.it_idx >= t.rows()) {
                return bail(format!("event {i} uses missing row {}", ev.it_idx));
            }

            let min_time = ev.min_time.map(FpReal::from_f64).unwrap_or(set_min);
            let max_time = ev.max_time.map(FpReal::from_f64).unwrap_or(set_max);

            events.push(EventPlan {
                bounds: TickBounds {
                    min_ticks: min_time.to_ticks(tpi),
                    max_ticks: max_time.to_ticks(tpi),
                },
                row: ev.it_idx,
            });
        }

        if examples.examples.is_empty() {
            return bail("no examples".into());
        }

        let mut spans = Vec::with_capacity(examples.examples.len());
        for (i, ex) in examples.examples.iter().enumerate() {
            let span = ex.ev_idx..ex.ev_idx + ex.num_events;
            if span.is_empty() || span.end > events.len() {
                return bail(format!("example {i} has events {span:?} of {}", events.len()));
            }
            spans.push(span);
        }

        Ok(EngineConfig {
            name,
            training: network.training,
            epochs: network.epochs,
            global_max_ticks: network.global_max_ticks,
            watchdog: Duration::from_millis(network.watchdog_ms),
            num_units: units.num_units,
            input: units.input,
            output: units.output,
            chain: ChainPosition::new(units.output, units.first_output, units.last_output),
            stages: units.stages,
            params: StageParams {
                integrator_dt: FpReal::from_f64(units.integrator_dt),
                weak_clamp_strength: FpReal::from_f64(units.weak_clamp_strength),
            },
            error_fn: units.error_fn,
            criterion: units.criterion,
            threshold: ErrorVal::from_f64(units.threshold),
            init_output: Activation::from_f64(units.init_output),
            sync_expected: units.sync_expected,
            sync_tally: units.sync_tally,
            queue_capacity: units.queue_capacity,
            report: units.write_out.then_some(ReportConfig {
                write_blk: units.write_blk,
                num_write_blks: units.num_write_blks,
            }),
            keys: routes,
            examples: spans,
            events,
            inputs,
            targets,
        })
    }
}

/// Validated key bases.
#[derive(Debug, Clone)]
pub struct KeyRoutes {
    pub forward: Vec<KeyBase>,
    pub partition_size: usize,
    pub backprop: KeyBase,
    pub stop_partial: KeyBase,
    pub stop_final: KeyBase,
}

impl KeyRoutes {
    /// The key a unit's output is sent with.
    pub fn forward(&self, unit: usize) -> Result<comms::Key> {
        let base = self.forward[unit / self.partition_size];
        Ok(base.at(unit % self.partition_size)?)
    }
}

/// Host reporting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportConfig {
    pub write_blk: u32,
    pub num_write_blks: u32,
}

/// The tick bounds and table row of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPlan {
    pub bounds: TickBounds,
    pub row: usize,
}

/// A row-major table of activations, `num_units` per row.
#[derive(Debug, Clone)]
pub struct Table {
    width: usize,
    values: Vec<Activation>,
}

impl Table {
    fn new(rows: &[Vec<Option<f64>>], width: usize) -> std::result::Result<Option<Self>, String> {
        if rows.is_empty() {
            return Ok(None);
        }

        let mut values = Vec::with_capacity(rows.len() * width);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(format!("row {i} has {} values, expected {width}", row.len()));
            }

            values.extend(
                row.iter()
                    .map(|v| v.map(Activation::from_f64).unwrap_or(Activation::NAN)),
            );
        }

        Ok(Some(Self { width, values }))
    }

    pub fn rows(&self) -> usize {
        self.values.len() / self.width
    }

    /// Returns the value of `unit` in `row`, `Activation::NAN` if out of range.
    pub fn get(&self, row: usize, unit: usize) -> Activation {
        if unit >= self.width {
            return Activation::NAN;
        }

        self.values
            .get(row * self.width + unit)
            .copied()
            .unwrap_or(Activation::NAN)
    }
}

/// A validated core configuration in engine units.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub name: String,
    pub training: bool,
    pub epochs: u32,
    pub global_max_ticks: u32,
    pub watchdog: Duration,
    pub num_units: usize,
    pub input: bool,
    pub output: bool,
    pub chain: ChainPosition,
    pub stages: Vec<Stage>,
    pub params: StageParams,
    pub error_fn: ErrorFn,
    pub criterion: Criterion,
    pub threshold: ErrorVal,
    pub init_output: Activation,
    pub sync_expected: u32,
    pub sync_tally: Tally,
    pub queue_capacity: usize,
    pub report: Option<ReportConfig>,
    pub keys: KeyRoutes,
    /// The event range of every example.
    pub examples: Vec<Range<usize>>,
    pub events: Vec<EventPlan>,
    pub inputs: Option<Table>,
    pub targets: Option<Table>,
}

impl EngineConfig {
    /// The ticks `example` runs for when no event stops early.
    pub fn example_ticks(&self, example: usize) -> u32 {
        self.examples.get(example).map_or(0, |span| {
            self.events[span.clone()]
                .iter()
                .map(|ev| ev.bounds.clipped_ticks(self.global_max_ticks))
                .sum()
        })
    }

    /// The ticks the history has to hold: the longest example.
    pub fn history_ticks(&self) -> usize {
        (0..self.examples.len())
            .map(|ex| self.example_ticks(ex) as usize)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_json() -> String {
        r#"{
            "name": "out",
            "network": {
                "training": false,
                "epochs": 1,
                "ticks_per_interval": 1,
                "global_max_ticks": 4
            },
            "units": {
                "num_units": 1,
                "output": true,
                "first_output": true,
                "last_output": true,
                "stages": ["linear"],
                "criterion": "standard",
                "threshold": 0.2
            },
            "keys": {
                "forward": [65536],
                "partition_size": 1,
                "backprop": 131072,
                "stop": 196608
            },
            "examples": {
                "min_time": 0.0,
                "max_time": 3.0,
                "examples": [{ "ev_idx": 0, "num_events": 2 }],
                "events": [
                    { "max_time": 2.0, "it_idx": 0 },
                    { "it_idx": 1 }
                ],
                "targets": [[0.5], [null]]
            }
        }"#
        .to_string()
    }

    #[test]
    fn test_events_inherit_set_bounds_and_clip() {
        let cfg = CoreConfig::from_json(&sample_json())
            .unwrap()
            .validate()
            .unwrap();

        assert_eq!(cfg.events[0].bounds.max_ticks, 2);
        assert_eq!(cfg.events[1].bounds.max_ticks, 3);
        assert_eq!(cfg.events[1].bounds.min_ticks, 0);
        assert_eq!(cfg.example_ticks(0), 5);
        assert_eq!(cfg.history_ticks(), 5);
        assert_eq!(cfg.chain, ChainPosition::Only);
        assert_eq!(cfg.watchdog, Duration::from_millis(DEFAULT_WATCHDOG_MS));
        assert_eq!(cfg.threshold, ErrorVal::from_f64(0.2));
    }

    #[test]
    fn test_tables_use_nan_for_missing_values() {
        let cfg = CoreConfig::from_json(&sample_json())
            .unwrap()
            .validate()
            .unwrap();

        let targets = cfg.targets.unwrap();
        assert_eq!(targets.get(0, 0), Activation::from_f64(0.5));
        assert!(targets.get(1, 0).is_nan());
        assert!(targets.get(7, 0).is_nan());
        assert!(cfg.inputs.is_none());
    }

    #[test]
    fn test_clamped_input_core_validates() {
        let mut core = CoreConfig::from_json(&sample_json()).unwrap();
        core.units.input = true;
        core.units.stages.push(Stage::HardClamp);
        core.examples.inputs = vec![vec![Some(0.25)], vec![None]];

        let cfg = core.validate().unwrap();
        assert!(cfg.input);
        assert_eq!(cfg.inputs.unwrap().get(0, 0), Activation::from_f64(0.25));
    }

    #[test]
    fn test_forward_keys_follow_partitions() {
        let mut core = CoreConfig::from_json(&sample_json()).unwrap();
        core.units.num_units = 3;
        core.units.output = false;
        core.units.first_output = false;
        core.units.last_output = false;
        core.examples.targets.clear();
        core.keys.partition_size = 2;
        core.keys.forward = vec![0x0001_0000, 0x0002_0000];

        let cfg = core.validate().unwrap();
        assert_eq!(cfg.keys.forward(1).unwrap().raw(), 0x0001_0001);
        assert_eq!(cfg.keys.forward(2).unwrap().raw(), 0x0002_0000);
        assert_eq!(cfg.chain, ChainPosition::Outside);
    }

    #[test]
    fn test_rejects_inconsistent_configs() {
        let cases: Vec<fn(&mut CoreConfig)> = vec![
            |c| c.units.num_units = 0,
            |c| c.units.num_units = MAX_INDEX + 1,
            |c| c.network.epochs = 0,
            |c| c.units.queue_capacity = 0,
            |c| c.examples.targets.clear(),
            |c| c.examples.examples[0].num_events = 3,
            |c| c.examples.events[1].it_idx = 2,
            |c| c.keys.backprop = 0x0002_0001,
            |c| c.keys.forward.push(0x0005_0000),
            |c| c.units.stages.push(Stage::HardClamp),
            |c| c.units.input = true,
            |c| c.examples.targets[0].push(Some(1.0)),
        ];

        for (i, mutate) in cases.into_iter().enumerate() {
            let mut core = CoreConfig::from_json(&sample_json()).unwrap();
            mutate(&mut core);
            let err = core.validate().unwrap_err();
            assert!(matches!(err, EngineErr::ConfigUnavailable(_)), "case {i}: {err}");
        }
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        let json = sample_json().replace("\"linear\"", "\"tanh\"");
        let err = CoreConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, EngineErr::ConfigUnavailable(_)));
    }
}
