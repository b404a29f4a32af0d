#![allow(dead_code)]

use comms::{Key, KeyBase, MsgClass, Packet, Phase, RecordingFabric};
use tick_engine::{
    CoreConfig, Engine,
    config::{EventConfig, ExampleConfig, ExampleSet, NetworkConfig, RoutingKeys, UnitConfig},
    fixed::{ErrorVal, Net},
    pipeline::Stage,
    scoreboard::Tally,
    stop::Criterion,
};

pub const FWD_ROUTE: u32 = 0x0001_0000;
pub const BKP_ROUTE: u32 = 0x0002_0000;
pub const STOP_ROUTE: u32 = 0x0003_0000;
/// Route of the nets and errors the test plays the peers with.
pub const PEER_ROUTE: u32 = 0x0004_0000;

/// A single output unit that forwards its net, runs one event of
/// `max_time` ticks and never converges.
pub fn core(name: &str, max_time: f64) -> CoreConfig {
    CoreConfig {
        name: name.to_string(),
        network: NetworkConfig {
            training: false,
            epochs: 1,
            ticks_per_interval: 1,
            global_max_ticks: 10,
            watchdog_ms: 50,
        },
        units: UnitConfig {
            num_units: 1,
            input: false,
            output: true,
            first_output: true,
            last_output: true,
            stages: vec![Stage::Linear],
            error_fn: Default::default(),
            criterion: Criterion::None,
            threshold: 0.0,
            init_output: 0.0,
            integrator_dt: 1.0,
            weak_clamp_strength: 1.0,
            sync_expected: 0,
            sync_tally: Tally::Counter,
            queue_capacity: 16,
            write_out: false,
            write_blk: 0,
            num_write_blks: 1,
        },
        keys: RoutingKeys {
            forward: vec![FWD_ROUTE],
            partition_size: 1,
            backprop: BKP_ROUTE,
            stop: STOP_ROUTE,
        },
        examples: ExampleSet {
            min_time: 0.0,
            max_time,
            examples: vec![ExampleConfig {
                ev_idx: 0,
                num_events: 1,
            }],
            events: vec![EventConfig {
                min_time: None,
                max_time: None,
                it_idx: 0,
            }],
            inputs: vec![],
            targets: vec![vec![None]],
        },
    }
}

pub fn engine(core: CoreConfig) -> Engine<RecordingFabric> {
    let cfg = core.validate().unwrap();
    Engine::new(cfg, RecordingFabric::new()).unwrap()
}

pub fn started(core: CoreConfig) -> Engine<RecordingFabric> {
    let mut engine = engine(core);
    engine.start().unwrap();
    engine.run_tasks().unwrap();
    engine
}

pub fn net(unit: usize, value: f64) -> Packet {
    let key = KeyBase::new(PEER_ROUTE, Phase::Forward, MsgClass::Data)
        .unwrap()
        .at(unit)
        .unwrap();
    Packet::with_payload(key, Net::from_f64(value).raw() as u32)
}

pub fn error(unit: usize, value: f64) -> Packet {
    let key = KeyBase::new(PEER_ROUTE, Phase::Backprop, MsgClass::Data)
        .unwrap()
        .at(unit)
        .unwrap();
    Packet::with_payload(key, ErrorVal::from_f64(value).raw() as u32)
}

pub fn sync(block: usize) -> Packet {
    let key = KeyBase::new(PEER_ROUTE, Phase::Forward, MsgClass::Sync)
        .unwrap()
        .at(block)
        .unwrap();
    Packet::bare(key)
}

/// The sent packets of the given class and phase.
pub fn sent(packets: &[Packet], class: MsgClass, phase: Phase) -> Vec<Packet> {
    packets
        .iter()
        .filter(|p| p.key.class() == Ok(class) && p.key.phase() == phase)
        .copied()
        .collect()
}

pub fn payloads(packets: &[Packet]) -> Vec<i32> {
    packets.iter().map(|p| p.value() as i32).collect()
}

pub fn keys(packets: &[Packet]) -> Vec<Key> {
    packets.iter().map(|p| p.key).collect()
}
