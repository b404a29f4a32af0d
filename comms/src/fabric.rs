use crate::{packet::Packet, report::HostReport};

/// The sending side of the packet-switched fabric as seen by one core.
///
/// Sends are blocking-retry: an implementation keeps trying until the fabric
/// accepts the packet and never reports failure to the caller.
pub trait Fabric {
    /// Multicasts `packet`; every core subscribed to its key receives a copy.
    fn send(&mut self, packet: Packet);

    /// Delivers `report` to the host.
    fn report(&mut self, report: HostReport);
}

impl<F: Fabric + ?Sized> Fabric for Box<F> {
    fn send(&mut self, packet: Packet) {
        (**self).send(packet)
    }

    fn report(&mut self, report: HostReport) {
        (**self).report(report)
    }
}

/// A fabric that keeps everything it is handed, for inspection.
#[derive(Debug, Default)]
pub struct RecordingFabric {
    pub sent: Vec<Packet>,
    pub reports: Vec<HostReport>,
}

impl RecordingFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every packet sent so far, leaving the record empty.
    pub fn take_sent(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.sent)
    }
}

impl Fabric for RecordingFabric {
    fn send(&mut self, packet: Packet) {
        self.sent.push(packet);
    }

    fn report(&mut self, report: HostReport) {
        self.reports.push(report);
    }
}
