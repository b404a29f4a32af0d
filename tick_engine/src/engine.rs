//! The per-core tick/phase state machine.
//!
//! An `Engine` is driven from two entry points: `receive` is the arrival
//! path, it classifies a packet, queues it or updates a scoreboard and
//! schedules work; `run_tasks` is the worker path, it runs the scheduled
//! work in order. Keeping both on one owner makes every scoreboard update
//! indivisible with respect to the work it triggers.

use std::collections::VecDeque;

use comms::{Fabric, HostCommand, HostReport, InfoReport, MsgClass, OutputReport, Packet, Phase};
use log::{debug, error, info, trace, warn};

use crate::{
    config::EngineConfig,
    counters::Counters,
    error::{EngineErr, ExitCode, Result},
    fixed::{Activation, Delta, ErrorVal, Net},
    history::History,
    pipeline::{Pipeline, UnitSlot},
    queue::PacketQueue,
    scoreboard::{Arrival, Scoreboard},
    stop::{ChainPosition, StopCriterion, TickBounds},
    watchdog::{Progress, Watchdog},
};

/// The states of a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ForwardTick,
    AwaitStopDecision,
    BackpropTick,
    SwitchToBackprop,
    SwitchToForward,
    AdvanceEvent,
    AdvanceExample,
    AdvanceEpoch,
    Terminated,
}

/// Deferred work, run by the worker in scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    InitOutputs,
    DrainForward,
    AdvanceForwardTick,
    DrainBackprop,
    BackwardTick,
    AdvanceBackwardTick,
}

/// Double-buffered errors: the current tick's bank is read while the next
/// tick's contributions accumulate in the pending bank.
#[derive(Debug)]
struct ErrorBanks {
    current: Vec<ErrorVal>,
    pending: Vec<ErrorVal>,
}

impl ErrorBanks {
    fn new(num_units: usize) -> Result<Self> {
        Ok(Self {
            current: crate::history::alloc("error bank", num_units)?,
            pending: crate::history::alloc("error bank", num_units)?,
        })
    }

    /// Promotes the pending bank and starts a fresh one.
    fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.pending);
        self.pending.fill(ErrorVal::ZERO);
    }

    fn clear(&mut self) {
        self.current.fill(ErrorVal::ZERO);
        self.pending.fill(ErrorVal::ZERO);
    }
}

// Scoreboards with fixed contributors are bitmaps over these roles, so a
// role contributing twice to one round is a protocol error.

/// Contributors of the forward tick scoreboard.
const FWD_PROCESSED: usize = 0;
const FWD_DECIDED: usize = 1;

/// Contributors of the stop chain scoreboard.
const CHAIN_LOCAL: usize = 0;
const CHAIN_PREVIOUS: usize = 1;

/// Contributors of the backprop tick scoreboard.
const BKP_PROCESSED: usize = 0;
const BKP_ERRORS: usize = 1;

/// Contributors of the example start scoreboard.
const START_ADVANCED: usize = 0;
const START_SYNCED: usize = 1;

/// The engine of one core.
pub struct Engine<F> {
    cfg: EngineConfig,
    fabric: F,
    state: State,
    phase: Phase,

    epoch: u32,
    example: u32,
    /// Event index within the example.
    event: u32,
    /// Tick within the example; indexes the history.
    tick: u32,
    /// Tick within the event.
    ev_tick: u32,
    bounds: TickBounds,
    row: usize,
    tick_stop: bool,
    /// Initial outputs of the current example were broadcast.
    initialized: bool,

    fwd_queue: PacketQueue,
    bkp_queue: PacketQueue,
    tasks: VecDeque<Task>,

    outputs: Vec<Activation>,
    errors: ErrorBanks,
    pipeline: Pipeline,
    history: History,
    criterion: StopCriterion,
    prev_met: bool,

    units_done: usize,
    fwd_tick: Scoreboard,
    chain: Scoreboard,
    bkp_tick: Scoreboard,
    bkp_errors: Scoreboard,
    /// Every error of the pending bank arrived; later errors wait.
    errors_done: bool,
    sync: Scoreboard,
    example_start: Scoreboard,
    /// Key of the packet being handled, named in protocol errors.
    last_key: u32,

    counters: Counters,
    watchdog: Watchdog,
}

impl<F: Fabric> Engine<F> {
    /// Creates a new `Engine`, allocating every buffer the run needs.
    ///
    /// # Arguments
    /// * `cfg` - The validated core configuration.
    /// * `fabric` - Where packets and host reports are sent.
    ///
    /// # Returns
    /// The engine or `MemoryUnavailable` if an allocation fails.
    pub fn new(cfg: EngineConfig, fabric: F) -> Result<Self> {
        let num_units = cfg.num_units;
        let max_ticks = cfg.history_ticks();

        let pipeline = Pipeline::new(cfg.stages.clone(), cfg.params, num_units, max_ticks)?;
        let history = History::new(num_units, max_ticks)?;
        let start_expected = if cfg.sync_expected > 0 { 2 } else { 1 };
        let first = cfg.events[cfg.examples[0].start];

        Ok(Self {
            state: State::ForwardTick,
            phase: Phase::Forward,
            epoch: 0,
            example: 0,
            event: 0,
            tick: 0,
            ev_tick: 0,
            bounds: first.bounds,
            row: first.row,
            tick_stop: false,
            initialized: false,
            fwd_queue: PacketQueue::new(Phase::Forward, cfg.queue_capacity)?,
            bkp_queue: PacketQueue::new(Phase::Backprop, cfg.queue_capacity)?,
            tasks: VecDeque::new(),
            outputs: crate::history::alloc("outputs", num_units)?,
            errors: ErrorBanks::new(num_units)?,
            pipeline,
            history,
            criterion: StopCriterion::new(cfg.criterion, cfg.threshold),
            prev_met: true,
            units_done: 0,
            fwd_tick: Scoreboard::bitmap(2),
            chain: Scoreboard::bitmap(cfg.chain.expected_contributions()),
            bkp_tick: Scoreboard::bitmap(2),
            bkp_errors: Scoreboard::counter(num_units as u32),
            errors_done: false,
            sync: Scoreboard::new(cfg.sync_tally, cfg.sync_expected),
            example_start: Scoreboard::bitmap(start_expected),
            last_key: 0,
            counters: Counters::default(),
            watchdog: Watchdog::new(),
            cfg,
            fabric,
        })
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn is_terminated(&self) -> bool {
        self.state == State::Terminated
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn fabric(&self) -> &F {
        &self.fabric
    }

    pub fn fabric_mut(&mut self) -> &mut F {
        &mut self.fabric
    }

    /// The position of the core in its run.
    pub fn progress(&self) -> Progress {
        Progress {
            epoch: self.epoch,
            example: self.example,
            phase: self.phase,
            tick: self.tick,
        }
    }

    fn enter(&mut self, state: State) {
        if self.state != state {
            debug!(core = self.cfg.name.as_str(), tick = self.tick; "{:?} -> {state:?}", self.state);
            self.state = state;
        }
    }

    fn schedule(&mut self, task: Task) {
        trace!(core = self.cfg.name.as_str(); "scheduled {task:?}");
        self.tasks.push_back(task);
    }

    fn unexpected(&self, packet: Packet) -> EngineErr {
        EngineErr::UnexpectedPacket {
            key: packet.key.raw(),
            phase: self.phase,
            tick: self.tick,
        }
    }

    /// Turns a scoreboard arrival into whether the round completed.
    ///
    /// # Returns
    /// `UnexpectedPacket` naming the packet being handled if the arrival
    /// was rejected.
    fn tally(&self, arrival: Arrival) -> Result<bool> {
        match arrival {
            Arrival::Complete => Ok(true),
            Arrival::Pending => Ok(false),
            Arrival::Rejected => Err(EngineErr::UnexpectedPacket {
                key: self.last_key,
                phase: self.phase,
                tick: self.tick,
            }),
        }
    }

    fn send(&mut self, packet: Packet) {
        self.fabric.send(packet);
    }

    /// Starts the stage: reports to the host and broadcasts the initial
    /// outputs of the first example.
    pub fn start(&mut self) -> Result<()> {
        info!(
            core = self.cfg.name.as_str(),
            units = self.cfg.num_units,
            training = self.cfg.training;
            "stage start"
        );

        if let Some(report) = self.cfg.report {
            let info = InfoReport {
                write_blk: report.write_blk,
                num_outputs: self.cfg.num_units as u32,
                num_write_blks: report.num_write_blks,
                total_ticks: self.cfg.example_ticks(0) + 1,
            };
            self.fabric.report(HostReport::Info(info));
        }

        self.load_example();
        self.enter(State::ForwardTick);
        self.schedule(Task::InitOutputs);
        Ok(())
    }

    /// Handles a packet that just arrived.
    ///
    /// # Returns
    /// `QueueFull` if the phase queue overflows or `UnexpectedPacket` if the
    /// packet fits no expected state.
    pub fn receive(&mut self, packet: Packet) -> Result<()> {
        if self.is_terminated() {
            return Err(self.unexpected(packet));
        }

        self.last_key = packet.key.raw();
        let class = packet.key.class().map_err(|_| self.unexpected(packet))?;
        let phase = packet.key.phase();

        trace!(
            core = self.cfg.name.as_str(),
            key = packet.key.raw(),
            payload = packet.value();
            "received {class:?}"
        );

        match (class, phase) {
            (MsgClass::Data, _) if packet.key.index() >= self.cfg.num_units => {
                Err(self.unexpected(packet))
            }
            (MsgClass::Data, Phase::Forward) => {
                self.counters.recv_fwd += 1;
                self.count_wrong_phase(phase);
                self.fwd_queue.push(packet)?;

                if self.phase == Phase::Forward && self.fwd_queue.activate() {
                    self.schedule(Task::DrainForward);
                }
                Ok(())
            }
            (MsgClass::Data, Phase::Backprop) => {
                self.counters.recv_bkp += 1;
                self.count_wrong_phase(phase);
                self.bkp_queue.push(packet)?;

                if self.phase == Phase::Backprop && self.bkp_queue.activate() {
                    self.schedule(Task::DrainBackprop);
                }
                Ok(())
            }
            (MsgClass::Sync, Phase::Forward) if self.cfg.sync_expected > 0 => {
                self.counters.recv_sync += 1;

                if self.tally(self.sync.record(packet.key.index()))? {
                    debug!(core = self.cfg.name.as_str(); "forward sync complete");
                    self.record_example_start(START_SYNCED)?;
                }
                Ok(())
            }
            (MsgClass::StopPartial, Phase::Forward)
                if self.phase == Phase::Forward
                    && matches!(self.cfg.chain, ChainPosition::Middle | ChainPosition::Last) =>
            {
                self.counters.recv_chain += 1;
                let complete = self.tally(self.chain.record(CHAIN_PREVIOUS))?;
                self.prev_met &= packet.key.decision();

                if complete {
                    self.send_stop()?;
                }
                Ok(())
            }
            (MsgClass::StopFinal, Phase::Forward)
                if self.phase == Phase::Forward && !self.cfg.chain.finalizes() =>
            {
                self.counters.recv_stop += 1;
                self.record_forward_tick(FWD_DECIDED)?;
                self.tick_stop = packet.key.decision();

                debug!(
                    core = self.cfg.name.as_str(),
                    tick = self.tick,
                    stop = self.tick_stop;
                    "stop decision received"
                );
                Ok(())
            }
            _ => Err(self.unexpected(packet)),
        }
    }

    fn count_wrong_phase(&mut self, phase: Phase) {
        if phase != self.phase {
            self.counters.wrong_phase += 1;
        }
    }

    /// Runs every scheduled task, including the ones they schedule.
    pub fn run_tasks(&mut self) -> Result<()> {
        while let Some(task) = self.tasks.pop_front() {
            if self.is_terminated() {
                self.tasks.clear();
                break;
            }

            match task {
                Task::InitOutputs => self.init_outputs()?,
                Task::DrainForward => self.drain_forward()?,
                Task::AdvanceForwardTick => self.advance_forward_tick()?,
                Task::DrainBackprop => self.drain_backprop()?,
                Task::BackwardTick => self.backward_tick()?,
                Task::AdvanceBackwardTick => self.advance_backward_tick(),
            }
        }

        Ok(())
    }

    /// Receives a packet and runs the work it triggers.
    pub fn handle(&mut self, packet: Packet) -> Result<()> {
        self.receive(packet)?;
        self.run_tasks()
    }

    /// Checks for tick progress since the previous watchdog period.
    ///
    /// # Returns
    /// `Timeout` if the core made no progress; the host monitor is closed
    /// with a final report first.
    pub fn check_watchdog(&mut self) -> Result<()> {
        let now = self.progress();
        if !self.watchdog.observe(now) {
            return Ok(());
        }

        error!(
            core = self.cfg.name.as_str(),
            epoch = now.epoch,
            example = now.example,
            tick = now.tick;
            "no progress in {:?} phase, aborting", now.phase
        );

        self.report_outputs(HostCommand::Final, self.tick + 1);

        Err(EngineErr::Timeout {
            epoch: now.epoch,
            example: now.example,
            phase: now.phase,
            tick: now.tick,
        })
    }

    /// Ends the stage, logging the outcome and the counters.
    ///
    /// # Returns
    /// The exit code reported to the host.
    pub fn finish(&self, res: &Result<()>) -> ExitCode {
        let code = ExitCode::from(res);

        match res {
            Ok(()) => info!(core = self.cfg.name.as_str(); "stage end: {code}"),
            Err(e) => warn!(core = self.cfg.name.as_str(), code = code.code(); "stage aborted: {e}"),
        }

        self.counters.log(&self.cfg.name);
        code
    }

    fn external(&self, unit: usize) -> Activation {
        match &self.cfg.inputs {
            Some(inputs) if self.cfg.input => inputs.get(self.row, unit),
            _ => Activation::NAN,
        }
    }

    fn target(&self, unit: usize) -> Activation {
        self.cfg
            .targets
            .as_ref()
            .map_or(Activation::NAN, |t| t.get(self.row, unit))
    }

    fn report_outputs(&mut self, command: HostCommand, tick: u32) {
        let Some(report) = self.cfg.report else {
            return;
        };

        // Ticks past 0 report the target their outputs were checked against.
        let pairs = (0..self.cfg.num_units)
            .map(|u| {
                let target = tick
                    .checked_sub(1)
                    .and_then(|t| self.history.targets.get(u, t))
                    .unwrap_or_else(|| self.target(u));
                [self.outputs[u].raw(), target.raw()]
            })
            .collect();

        let event = if tick == 0 { -1 } else { self.event as i32 };

        self.fabric.report(HostReport::Outputs(OutputReport {
            command,
            write_blk: report.write_blk,
            epoch: self.epoch,
            event,
            example: self.example,
            tick,
            pairs,
        }));
    }

    fn init_outputs(&mut self) -> Result<()> {
        debug!(
            core = self.cfg.name.as_str(),
            epoch = self.epoch,
            example = self.example;
            "sending initial outputs"
        );

        let init = self.cfg.init_output;
        self.pipeline.reset(init);

        for unit in 0..self.cfg.num_units {
            self.outputs[unit] = init;
            let key = self.cfg.keys.forward(unit)?;
            self.send(Packet::with_payload(key, init.raw() as u32));
            self.counters.sent_fwd += 1;
        }

        self.report_outputs(HostCommand::Normal, 0);
        self.initialized = true;
        self.resume_forward();
        Ok(())
    }

    fn resume_forward(&mut self) {
        if self.phase == Phase::Forward && !self.fwd_queue.is_empty() && self.fwd_queue.activate()
        {
            self.schedule(Task::DrainForward);
        }
    }

    fn drain_forward(&mut self) -> Result<()> {
        // Nets of the next tick wait until this tick has advanced, nets of a
        // new example until its initial outputs are out.
        while self.phase == Phase::Forward
            && self.initialized
            && self.units_done < self.cfg.num_units
        {
            let Some(packet) = self.fwd_queue.pop() else {
                break;
            };

            self.last_key = packet.key.raw();
            self.process_net(packet)?;
        }

        self.fwd_queue.deactivate();
        Ok(())
    }

    fn process_net(&mut self, packet: Packet) -> Result<()> {
        let unit = packet.key.index();
        let net = Net::from_raw(packet.value() as i32);
        let tick = self.tick;

        let mut slot = UnitSlot::new(net, self.external(unit));
        self.pipeline.forward(unit, tick, &mut slot);
        self.outputs[unit] = slot.output;

        if self.cfg.training {
            self.history.nets.store(unit, tick, net);
            self.history.outputs.store(unit, tick, slot.output);
        }

        if self.cfg.output {
            let target = self.target(unit);
            self.history.targets.store(unit, tick, target);

            if self.cfg.training {
                let deriv = self.cfg.error_fn.derivative(slot.output, target);
                self.history.output_derivs.store(unit, tick, deriv);
            }

            self.criterion.evaluate(unit, slot.output, target);
        }

        let key = self.cfg.keys.forward(unit)?;
        self.send(Packet::with_payload(key, slot.output.raw() as u32));
        self.counters.sent_fwd += 1;

        trace!(core = self.cfg.name.as_str(), unit = unit, tick = tick; "output {}", slot.output);

        self.units_done += 1;
        if self.units_done == self.cfg.num_units {
            self.forward_units_done()?;
        }

        Ok(())
    }

    fn forward_units_done(&mut self) -> Result<()> {
        if self.cfg.chain != ChainPosition::Outside {
            self.enter(State::AwaitStopDecision);

            if self.tally(self.chain.record(CHAIN_LOCAL))? {
                self.send_stop()?;
            }
        }

        self.record_forward_tick(FWD_PROCESSED)
    }

    fn record_forward_tick(&mut self, contributor: usize) -> Result<()> {
        if self.tally(self.fwd_tick.record(contributor))? {
            self.schedule(Task::AdvanceForwardTick);
        }
        Ok(())
    }

    /// Combines the local criterion with the chain so far and passes the
    /// result on, or finalizes it at the end of the chain.
    fn send_stop(&mut self) -> Result<()> {
        let local = self.criterion.is_met();
        self.criterion.reset();

        let met = local && self.prev_met;
        self.prev_met = true;

        if self.cfg.chain.finalizes() {
            let stop = self
                .bounds
                .finalize(met, self.ev_tick + 1, self.cfg.global_max_ticks);
            self.tick_stop = stop;

            debug!(
                core = self.cfg.name.as_str(),
                tick = self.tick,
                ev_tick = self.ev_tick,
                met = met,
                stop = stop;
                "stop decision"
            );

            self.send(Packet::bare(self.cfg.keys.stop_final.decision(stop)));
            self.counters.sent_stop += 1;
            self.record_forward_tick(FWD_DECIDED)?;
        } else {
            self.send(Packet::bare(self.cfg.keys.stop_partial.decision(met)));
            self.counters.sent_stop += 1;
        }

        Ok(())
    }

    fn is_last_report(&self) -> bool {
        let events = self.cfg.examples[self.example as usize].len() as u32;

        self.tick_stop
            && self.epoch + 1 == self.cfg.epochs
            && self.example as usize + 1 == self.cfg.examples.len()
            && self.event + 1 == events
    }

    fn advance_forward_tick(&mut self) -> Result<()> {
        self.units_done = 0;
        self.counters.total_ticks += 1;

        let command = if self.is_last_report() {
            HostCommand::Final
        } else {
            HostCommand::Normal
        };
        self.report_outputs(command, self.tick + 1);

        self.criterion.reset();

        if std::mem::take(&mut self.tick_stop) {
            self.advance_event()?;
        } else {
            self.tick += 1;
            self.ev_tick += 1;
            self.enter(State::ForwardTick);
        }

        self.resume_forward();
        Ok(())
    }

    fn load_event(&mut self) {
        let span = &self.cfg.examples[self.example as usize];
        let plan = self.cfg.events[span.start + self.event as usize];
        self.bounds = plan.bounds;
        self.row = plan.row;
    }

    fn load_example(&mut self) {
        self.event = 0;
        self.tick = 0;
        self.ev_tick = 0;
        self.initialized = false;
        self.load_event();
        self.history.clear();
    }

    fn advance_event(&mut self) -> Result<()> {
        self.enter(State::AdvanceEvent);
        self.event += 1;

        let events = self.cfg.examples[self.example as usize].len() as u32;
        if self.event < events {
            self.load_event();
            self.tick += 1;
            self.ev_tick = 0;
            self.enter(State::ForwardTick);
            return Ok(());
        }

        if self.cfg.training {
            self.switch_to_backprop();
            Ok(())
        } else {
            self.tick = 0;
            self.ev_tick = 0;
            self.advance_example()
        }
    }

    fn switch_to_backprop(&mut self) {
        self.enter(State::SwitchToBackprop);
        debug!(core = self.cfg.name.as_str(), tick = self.tick; "switching to BACKPROP");

        self.phase = Phase::Backprop;
        self.errors.clear();
        self.errors_done = false;
        self.bkp_errors.reset();
        self.bkp_tick.reset();

        self.enter(State::BackpropTick);
        self.schedule(Task::BackwardTick);

        self.resume_backprop();
    }

    fn resume_backprop(&mut self) {
        if self.phase == Phase::Backprop
            && !self.bkp_queue.is_empty()
            && self.bkp_queue.activate()
        {
            self.schedule(Task::DrainBackprop);
        }
    }

    fn drain_backprop(&mut self) -> Result<()> {
        // Errors of the tick after the pending one wait for the swap.
        while self.phase == Phase::Backprop && !self.errors_done {
            let Some(packet) = self.bkp_queue.pop() else {
                break;
            };

            self.last_key = packet.key.raw();
            let unit = packet.key.index();
            let err = ErrorVal::from_raw(packet.value() as i32);
            self.errors.pending[unit] = self.errors.pending[unit].saturating_add(err);

            if self.tally(self.bkp_errors.record(unit))? {
                self.errors_done = true;
                self.record_backprop_tick(BKP_ERRORS)?;
            }
        }

        self.bkp_queue.deactivate();
        Ok(())
    }

    fn record_backprop_tick(&mut self, contributor: usize) -> Result<()> {
        if self.tally(self.bkp_tick.record(contributor))? {
            self.schedule(Task::AdvanceBackwardTick);
        }
        Ok(())
    }

    fn backward_tick(&mut self) -> Result<()> {
        let tick = self.tick;

        for unit in 0..self.cfg.num_units {
            let err = self.errors.current[unit].to_long_deriv();
            let deriv = if self.cfg.output {
                self.history
                    .output_derivs
                    .restore(unit, tick)
                    .saturating_add(err)
            } else {
                err
            };

            let mut slot = UnitSlot {
                net: self.history.nets.restore(unit, tick),
                output: self.history.outputs.restore(unit, tick),
                external: self.external(unit),
                deriv,
            };
            self.pipeline.backward(unit, tick, &mut slot);

            let delta = Delta::from_long_deriv(slot.deriv);
            let key = self.cfg.keys.backprop.at(unit)?;
            self.send(Packet::with_payload(key, delta.raw() as u32));
            self.counters.sent_bkp += 1;

            trace!(core = self.cfg.name.as_str(), unit = unit, tick = tick; "delta {delta}");
        }

        if tick == 0 {
            self.switch_to_forward();
            self.advance_example()
        } else {
            self.record_backprop_tick(BKP_PROCESSED)
        }
    }

    fn advance_backward_tick(&mut self) {
        self.errors.swap();
        self.errors_done = false;
        self.tick -= 1;
        self.counters.total_ticks += 1;
        self.schedule(Task::BackwardTick);
        self.resume_backprop();
    }

    fn switch_to_forward(&mut self) {
        self.enter(State::SwitchToForward);
        debug!(core = self.cfg.name.as_str(); "switching to FORWARD");

        self.phase = Phase::Forward;
        self.tick = 0;
        self.ev_tick = 0;
    }

    fn advance_example(&mut self) -> Result<()> {
        self.enter(State::AdvanceExample);
        self.example += 1;

        if self.example as usize >= self.cfg.examples.len() {
            self.enter(State::AdvanceEpoch);
            self.epoch += 1;

            if self.epoch >= self.cfg.epochs {
                info!(core = self.cfg.name.as_str(), epochs = self.epoch; "all epochs done");
                self.enter(State::Terminated);
                return Ok(());
            }

            self.example = 0;
            info!(core = self.cfg.name.as_str(), epoch = self.epoch; "starting epoch");
        }

        debug!(
            core = self.cfg.name.as_str(),
            epoch = self.epoch,
            example = self.example;
            "advancing example"
        );

        self.load_example();
        self.enter(State::ForwardTick);
        self.record_example_start(START_ADVANCED)
    }

    fn record_example_start(&mut self, contributor: usize) -> Result<()> {
        if self.tally(self.example_start.record(contributor))? {
            self.schedule(Task::InitOutputs);
        }
        Ok(())
    }
}
