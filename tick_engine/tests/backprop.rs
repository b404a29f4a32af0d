mod common;

use comms::{KeyBase, MsgClass, Packet, Phase, RecordingFabric};
use tick_engine::{
    CoreConfig, Engine, EngineErr, State,
    error_fn::ErrorFn,
    fixed::Delta,
    pipeline::Stage,
};

use common::{BKP_ROUTE, core, error, net, payloads, sent, started};

#[test]
fn errors_flow_back_through_the_stored_history() {
    let mut cfg = core("logistic", 2.0);
    cfg.network.training = true;
    cfg.units.stages = vec![Stage::Logistic];
    cfg.units.error_fn = ErrorFn::Squared;
    cfg.examples.targets = vec![vec![Some(1.0)]];

    let mut engine = started(cfg);
    engine.handle(net(0, 0.0)).unwrap();
    engine.handle(net(0, 0.0)).unwrap();

    assert_eq!(engine.phase(), Phase::Backprop);
    assert_eq!(engine.state(), State::BackpropTick);
    assert_eq!(engine.tick(), 1);

    // sigmoid(0) = 0.5: (0.5 - 1) * 0.5 * (1 - 0.5)
    let deltas = sent(&engine.fabric_mut().take_sent(), MsgClass::Data, Phase::Backprop);
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].key.route(), BKP_ROUTE);
    assert_eq!(deltas[0].key.index(), 0);
    assert_eq!(payloads(&deltas), [Delta::from_f64(-0.125).raw()]);

    // The peer error is added to the output derivative of tick 0.
    engine.handle(error(0, 0.25)).unwrap();

    let deltas = sent(&engine.fabric_mut().take_sent(), MsgClass::Data, Phase::Backprop);
    assert_eq!(payloads(&deltas), [Delta::from_f64(-0.0625).raw()]);
    assert!(engine.is_terminated());
    assert_eq!(engine.counters().total_ticks, 3);
    assert_eq!(engine.counters().sent_bkp, 2);
}

#[test]
fn early_errors_wait_for_the_backprop_phase() {
    let mut cfg = core("early-errors", 2.0);
    cfg.network.training = true;
    cfg.units.error_fn = ErrorFn::Squared;
    cfg.examples.targets = vec![vec![Some(0.0)]];

    let mut engine = started(cfg);
    engine.handle(net(0, 0.5)).unwrap();

    // An upstream core already switched phase.
    engine.handle(error(0, 0.5)).unwrap();
    assert_eq!(engine.counters().wrong_phase, 1);
    assert_eq!(engine.counters().sent_bkp, 0);

    engine.handle(net(0, 0.5)).unwrap();
    assert!(engine.is_terminated());

    // Linear: output derivative plus the queued error at tick 0.
    let deltas = sent(&engine.fabric_mut().take_sent(), MsgClass::Data, Phase::Backprop);
    assert_eq!(
        payloads(&deltas),
        [Delta::from_f64(0.5).raw(), Delta::from_f64(1.0).raw()]
    );
}

/// Two hidden units outside the stop chain, trained over `ticks` ticks.
fn hidden_core(name: &str, ticks: f64) -> CoreConfig {
    let mut cfg = core(name, ticks);
    cfg.network.training = true;
    cfg.units.num_units = 2;
    cfg.units.output = false;
    cfg.units.first_output = false;
    cfg.units.last_output = false;
    cfg.keys.partition_size = 2;
    cfg.examples.targets.clear();
    cfg
}

fn decide(stop: bool) -> Packet {
    let key = KeyBase::new(0x0009_0000, Phase::Forward, MsgClass::StopFinal)
        .unwrap()
        .decision(stop);
    Packet::bare(key)
}

/// Runs the forward ticks, stopping at the last one.
fn run_forward(engine: &mut Engine<RecordingFabric>, ticks: usize) {
    for tick in 0..ticks {
        engine.handle(net(0, 0.0)).unwrap();
        engine.handle(net(1, 0.0)).unwrap();
        engine.handle(decide(tick + 1 == ticks)).unwrap();
    }
    assert_eq!(engine.phase(), Phase::Backprop);
    engine.fabric_mut().take_sent();
}

#[test]
fn hidden_core_sends_back_the_received_errors() {
    let mut engine = started(hidden_core("accumulate", 2.0));
    run_forward(&mut engine, 2);

    // One error per unit completes the tick.
    engine.handle(error(1, 0.25)).unwrap();
    assert_eq!(engine.tick(), 1);
    assert_eq!(engine.state(), State::BackpropTick);
    engine.handle(error(0, -0.125)).unwrap();

    assert!(engine.is_terminated());
    let deltas = sent(&engine.fabric_mut().take_sent(), MsgClass::Data, Phase::Backprop);
    assert_eq!(
        payloads(&deltas),
        [Delta::from_f64(-0.125).raw(), Delta::from_f64(0.25).raw()]
    );
}

#[test]
fn errors_of_the_next_tick_wait_for_the_swap() {
    let mut engine = started(hidden_core("burst", 3.0));
    run_forward(&mut engine, 3);
    assert_eq!(engine.tick(), 2);

    // Errors of ticks 1 and 0 arrive back to back.
    for packet in [error(0, 0.25), error(1, 0.5), error(0, -0.125), error(1, -0.25)] {
        engine.receive(packet).unwrap();
    }
    engine.run_tasks().unwrap();

    assert!(engine.is_terminated());
    let deltas = sent(&engine.fabric_mut().take_sent(), MsgClass::Data, Phase::Backprop);
    let expected: Vec<i32> = [0.25, 0.5, -0.125, -0.25]
        .into_iter()
        .map(|x| Delta::from_f64(x).raw())
        .collect();
    assert_eq!(payloads(&deltas), expected);
}

#[test]
fn stop_decision_during_backprop_is_rejected() {
    let mut engine = started(hidden_core("late-stop", 2.0));
    run_forward(&mut engine, 2);
    assert_eq!(engine.tick(), 1);

    let res = engine.receive(decide(false));
    assert!(matches!(
        res,
        Err(EngineErr::UnexpectedPacket {
            phase: Phase::Backprop,
            tick: 1,
            ..
        })
    ));
}
