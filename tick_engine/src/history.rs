use crate::{
    error::{EngineErr, Result},
    fixed::{Activation, LongDeriv, Net},
};

/// Allocates `len` default entries, reporting failure instead of aborting.
pub(crate) fn alloc<T: Clone + Default>(what: &'static str, len: usize) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| EngineErr::MemoryUnavailable { what, len })?;
    buf.resize(len, T::default());
    Ok(buf)
}

/// One per-tick, per-unit log.
///
/// Entries are laid out tick-major so a whole tick is contiguous.
#[derive(Debug)]
pub struct TickLog<T> {
    num_units: usize,
    values: Vec<T>,
    written: Vec<bool>,
}

impl<T: Copy + Default> TickLog<T> {
    /// Creates a new `TickLog`.
    ///
    /// # Arguments
    /// * `what` - A name for the log, used in allocation errors.
    /// * `num_units` - The amount of units written per tick.
    /// * `max_ticks` - The amount of ticks the log can hold.
    pub fn new(what: &'static str, num_units: usize, max_ticks: usize) -> Result<Self> {
        let len = num_units
            .checked_mul(max_ticks)
            .ok_or(EngineErr::MemoryUnavailable {
                what,
                len: usize::MAX,
            })?;

        Ok(Self {
            num_units,
            values: alloc(what, len)?,
            written: alloc(what, len)?,
        })
    }

    fn slot(&self, unit: usize, tick: u32) -> Option<usize> {
        let i = tick as usize * self.num_units + unit;
        (unit < self.num_units && i < self.values.len()).then_some(i)
    }

    /// Records `value` as the value of `unit` at `tick`.
    pub fn store(&mut self, unit: usize, tick: u32, value: T) {
        let Some(i) = self.slot(unit, tick) else {
            debug_assert!(false, "store out of range: unit {unit} tick {tick}");
            return;
        };

        self.values[i] = value;
        self.written[i] = true;
    }

    /// Returns the value of `unit` at `tick`.
    ///
    /// Reading an entry that was never stored is a logic error; debug builds
    /// panic, release builds return the default value.
    pub fn restore(&self, unit: usize, tick: u32) -> T {
        match self.slot(unit, tick) {
            Some(i) => {
                debug_assert!(self.written[i], "unit {unit} tick {tick} never stored");
                self.values[i]
            }
            None => {
                debug_assert!(false, "restore out of range: unit {unit} tick {tick}");
                T::default()
            }
        }
    }

    /// Returns the value of `unit` at `tick` if it was stored.
    pub fn get(&self, unit: usize, tick: u32) -> Option<T> {
        self.slot(unit, tick)
            .filter(|&i| self.written[i])
            .map(|i| self.values[i])
    }

    /// Forgets every entry, leaving the allocation in place.
    pub fn clear(&mut self) {
        self.written.fill(false);
    }
}

/// The values BACKPROP replays, one log per kind.
#[derive(Debug)]
pub struct History {
    pub nets: TickLog<Net>,
    pub outputs: TickLog<Activation>,
    pub targets: TickLog<Activation>,
    pub output_derivs: TickLog<LongDeriv>,
}

impl History {
    /// Creates a new `History`.
    ///
    /// # Arguments
    /// * `num_units` - The amount of units owned by the core.
    /// * `max_ticks` - The largest amount of ticks any example runs for.
    pub fn new(num_units: usize, max_ticks: usize) -> Result<Self> {
        Ok(Self {
            nets: TickLog::new("net history", num_units, max_ticks)?,
            outputs: TickLog::new("output history", num_units, max_ticks)?,
            targets: TickLog::new("target history", num_units, max_ticks)?,
            output_derivs: TickLog::new("output derivative history", num_units, max_ticks)?,
        })
    }

    /// Forgets the previous example.
    pub fn clear(&mut self) {
        self.nets.clear();
        self.outputs.clear();
        self.targets.clear();
        self.output_derivs.clear();
    }
}
