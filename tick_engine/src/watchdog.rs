use comms::Phase;

/// Where a core is in its run, as far as liveness is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub epoch: u32,
    pub example: u32,
    pub phase: Phase,
    pub tick: u32,
}

/// Detects a core that stopped making tick progress.
#[derive(Debug, Default)]
pub struct Watchdog {
    last: Option<Progress>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one watchdog period.
    ///
    /// # Returns
    /// `true` if `now` is the same progress seen at the previous period.
    pub fn observe(&mut self, now: Progress) -> bool {
        self.last.replace(now) == Some(now)
    }
}
