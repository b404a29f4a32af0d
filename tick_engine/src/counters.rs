use log::info;

/// Packet and tick counts of one stage, dumped when the stage ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub sent_fwd: u32,
    pub sent_bkp: u32,
    pub sent_stop: u32,
    pub recv_fwd: u32,
    pub recv_bkp: u32,
    pub recv_sync: u32,
    pub recv_chain: u32,
    pub recv_stop: u32,
    /// Data packets that arrived while the core was in the other phase.
    pub wrong_phase: u32,
    pub total_ticks: u32,
}

impl Counters {
    pub fn sent(&self) -> u32 {
        self.sent_fwd + self.sent_bkp + self.sent_stop
    }

    pub fn received(&self) -> u32 {
        self.recv_fwd + self.recv_bkp + self.recv_sync + self.recv_chain + self.recv_stop
    }

    /// Logs every counter under `core`.
    pub fn log(&self, core: &str) {
        info!(
            core = core,
            sent = self.sent(),
            received = self.received(),
            total_ticks = self.total_ticks;
            "stage counters"
        );
        info!(
            core = core;
            "sent fwd:{} bkp:{} stop:{} / recv fwd:{} bkp:{} sync:{} chain:{} stop:{} / wrong phase:{}",
            self.sent_fwd,
            self.sent_bkp,
            self.sent_stop,
            self.recv_fwd,
            self.recv_bkp,
            self.recv_sync,
            self.recv_chain,
            self.recv_stop,
            self.wrong_phase,
        );
    }
}
