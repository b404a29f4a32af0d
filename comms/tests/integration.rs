use std::sync::Arc;

use comms::{
    Fabric, HostCommand, HostReport, KeyBase, MsgClass, OutputReport, Packet, Phase, Router,
    RouterPort,
};

fn output_report() -> HostReport {
    HostReport::Outputs(OutputReport {
        command: HostCommand::Final,
        write_blk: 1,
        epoch: 2,
        event: 3,
        example: 4,
        tick: 9,
        pairs: vec![[1 << 26, 1 << 27], [-(1 << 26), i32::MIN]],
    })
}

#[test]
fn report_wire_format() {
    let report = output_report();

    let mut buf = Vec::new();
    if let Some(payload) = report.serialize(&mut buf).map(<[u8]>::to_vec) {
        buf.extend(payload);
    }

    assert_eq!(buf.len(), 20 + 2 * 2 * 4);
    assert_eq!(&buf[..4], &1u32.to_le_bytes());
    assert_eq!(&buf[12..16], &0x0003_0004u32.to_le_bytes());

    // Pairs are little-endian words too.
    assert_eq!(&buf[20..24], &(1i32 << 26).to_le_bytes());
    assert_eq!(&buf[32..36], &i32::MIN.to_le_bytes());

    assert_eq!(HostReport::deserialize(&buf).unwrap(), report);
}

#[tokio::test]
async fn cores_exchange_packets_and_report() {
    // Two cores sharing one multicast group, the first also hears itself.
    let mut router = Router::new();
    let (a, mut rx_a) = router.mailbox();
    let (b, mut rx_b) = router.mailbox();
    let mut host = router.host();

    let base = KeyBase::new(0x0010_0000, Phase::Forward, MsgClass::Data).unwrap();
    router.route(base.raw(), 0xffff_f000, vec![a, b]);

    let router = Arc::new(router);
    let mut port_a = RouterPort::new(a, Arc::clone(&router));
    let mut port_b = RouterPort::new(b, Arc::clone(&router));

    for unit in 0..3 {
        port_a.send(Packet::with_payload(base.at(unit).unwrap(), unit as u32 * 10));
    }

    // Backprop keys of the same route match no entry.
    let bkp = KeyBase::new(0x0010_0000, Phase::Backprop, MsgClass::Data).unwrap();
    port_b.send(Packet::with_payload(bkp.at(0).unwrap(), 1));

    for rx in [&mut rx_a, &mut rx_b] {
        for unit in 0..3 {
            let packet = rx.recv().await.unwrap();
            assert_eq!(packet.key.index(), unit);
            assert_eq!(packet.value(), unit as u32 * 10);
        }
        assert!(rx.try_recv().is_err());
    }

    port_b.report(output_report());
    drop((port_a, port_b, router));

    assert_eq!(host.recv().await, Some((b, output_report())));
    assert_eq!(host.recv().await, None);
}
