use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// How a scoreboard tallies contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tally {
    /// Every arrival counts, regardless of who sent it.
    #[default]
    Counter,
    /// Each contributor sets its own bit once per round.
    Bitmap,
}

/// The outcome of recording an arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Still waiting on more contributions.
    Pending,
    /// This arrival reached the threshold; the scoreboard was reset.
    Complete,
    /// The contributor is not part of the expected set, or already
    /// contributed to this round of a bitmap.
    Rejected,
}

/// A barrier that fires once per threshold's worth of arrivals.
///
/// The read-modify-write of the tally and the reset on completion happen in
/// a single atomic update, so concurrent arrivals can never observe or
/// produce a second completion for the same round.
#[derive(Debug)]
pub struct Scoreboard {
    tally: Tally,
    expected: u32,
    value: AtomicU32,
}

impl Scoreboard {
    /// Creates a counting scoreboard.
    ///
    /// # Arguments
    /// * `expected` - The amount of arrivals that complete a round.
    pub fn counter(expected: u32) -> Self {
        Self {
            tally: Tally::Counter,
            expected,
            value: AtomicU32::new(0),
        }
    }

    /// Creates a bitmap scoreboard expecting contributors `0..contributors`.
    ///
    /// # Arguments
    /// * `contributors` - The amount of distinct contributors, at most 32.
    pub fn bitmap(contributors: u32) -> Self {
        let expected = match contributors {
            32.. => u32::MAX,
            n => (1 << n) - 1,
        };

        Self {
            tally: Tally::Bitmap,
            expected,
            value: AtomicU32::new(0),
        }
    }

    /// Creates a scoreboard of the given kind.
    pub fn new(tally: Tally, contributors: u32) -> Self {
        match tally {
            Tally::Counter => Self::counter(contributors),
            Tally::Bitmap => Self::bitmap(contributors),
        }
    }

    /// Records an arrival from `contributor`.
    ///
    /// # Arguments
    /// * `contributor` - The contributor index, only meaningful for bitmaps.
    ///
    /// # Returns
    /// `Complete` exactly when this arrival reaches the threshold,
    /// `Rejected` for foreign or repeated bitmap contributors; a rejected
    /// arrival leaves the tally untouched.
    pub fn record(&self, contributor: usize) -> Arrival {
        if self.expected == 0 {
            return Arrival::Complete;
        }

        let bit = match self.tally {
            Tally::Counter => 0,
            Tally::Bitmap => match u32::try_from(contributor)
                .ok()
                .and_then(|c| 1u32.checked_shl(c))
            {
                Some(bit) if bit & self.expected != 0 => bit,
                _ => return Arrival::Rejected,
            },
        };

        let step = |current: u32| match self.tally {
            Tally::Counter => current + 1,
            Tally::Bitmap => current | bit,
        };

        let res = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current & bit != 0 {
                    return None;
                }

                let next = step(current);
                Some(if next == self.expected { 0 } else { next })
            });

        match res {
            Err(_) => Arrival::Rejected,
            Ok(prev) if step(prev) == self.expected => Arrival::Complete,
            Ok(_) => Arrival::Pending,
        }
    }

    /// Returns the current tally.
    pub fn value(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    /// Drops any partial tally.
    pub fn reset(&self) {
        self.value.store(0, Ordering::Release);
    }
}
