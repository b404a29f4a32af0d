use std::sync::Arc;

use log::trace;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::{fabric::Fabric, packet::Packet, report::HostReport};

/// A multicast routing table entry: packets whose `key & mask == key` go to `dests`.
#[derive(Debug, Clone)]
struct Route {
    key: u32,
    mask: u32,
    dests: Vec<usize>,
}

/// The in-process multicast fabric connecting simulated cores.
///
/// Each core owns one mailbox; routes fan packets out to every mailbox whose
/// entry matches. Mailboxes are unbounded, so sends always succeed while the
/// destination is alive.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
    mailboxes: Vec<UnboundedSender<Packet>>,
    host: Option<UnboundedSender<(usize, HostReport)>>,
}

impl Router {
    /// Creates a new empty `Router`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new core mailbox.
    ///
    /// # Returns
    /// The core's fabric id and the receiving end of its mailbox.
    pub fn mailbox(&mut self) -> (usize, UnboundedReceiver<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.push(tx);
        (self.mailboxes.len() - 1, rx)
    }

    /// Adds a multicast route.
    ///
    /// # Arguments
    /// * `key` - The key to match after masking.
    /// * `mask` - The bits of incoming keys that take part in the match.
    /// * `dests` - The fabric ids of the receiving cores.
    pub fn route(&mut self, key: u32, mask: u32, dests: Vec<usize>) {
        self.routes.push(Route {
            key: key & mask,
            mask,
            dests,
        });
    }

    /// Registers the host channel; reports are tagged with the sending core id.
    pub fn host(&mut self) -> UnboundedReceiver<(usize, HostReport)> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.host = Some(tx);
        rx
    }

    fn deliver(&self, packet: Packet) {
        let raw = packet.key.raw();

        for route in self.routes.iter().filter(|r| raw & r.mask == r.key) {
            for &dest in &route.dests {
                if let Some(mailbox) = self.mailboxes.get(dest)
                    && mailbox.send(packet).is_err()
                {
                    trace!(dest = dest; "dropped packet 0x{raw:08x} for a finished core");
                }
            }
        }
    }
}

/// One core's view of a shared `Router`.
#[derive(Debug, Clone)]
pub struct RouterPort {
    id: usize,
    router: Arc<Router>,
}

impl RouterPort {
    /// Creates a new `RouterPort`.
    ///
    /// # Arguments
    /// * `id` - The fabric id of the core using this port.
    /// * `router` - The shared routing table.
    pub fn new(id: usize, router: Arc<Router>) -> Self {
        Self { id, router }
    }
}

impl Fabric for RouterPort {
    fn send(&mut self, packet: Packet) {
        self.router.deliver(packet);
    }

    fn report(&mut self, report: HostReport) {
        if let Some(host) = &self.router.host {
            let _ = host.send((self.id, report));
        }
    }
}
