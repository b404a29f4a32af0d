//! Routing key layout shared by every core in the fabric.
//!
//! ```text
//!  31              16   15   14  12  11          0
//! +------------------+-----+------+--------------+
//! |    route base    |phase|class | unit / block |
//! +------------------+-----+------+--------------+
//! ```
//!
//! Stop keys carry their decision in bit 0 of the index field.

use serde::{Deserialize, Serialize};

use crate::error::{KeyErr, Result};

pub const INDEX_BITS: u32 = 12;
pub const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
pub const CLASS_SHIFT: u32 = INDEX_BITS;
pub const CLASS_MASK: u32 = 0b111 << CLASS_SHIFT;
pub const PHASE_SHIFT: u32 = 15;
pub const PHASE_MASK: u32 = 1 << PHASE_SHIFT;
pub const ROUTE_MASK: u32 = !(PHASE_MASK | CLASS_MASK | INDEX_MASK);

/// The largest number of units or blocks a single key can address.
pub const MAX_INDEX: usize = INDEX_MASK as usize + 1;

/// The processing phase a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Forward,
    Backprop,
}

impl Phase {
    fn bit(self) -> u32 {
        match self {
            Phase::Forward => 0,
            Phase::Backprop => PHASE_MASK,
        }
    }
}

/// The class of a message, distinguished by the class bits of its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgClass {
    Data,
    Sync,
    StopPartial,
    StopFinal,
}

impl MsgClass {
    fn bits(self) -> u32 {
        let class = match self {
            MsgClass::Data => 0,
            MsgClass::Sync => 1,
            MsgClass::StopPartial => 2,
            MsgClass::StopFinal => 3,
        };

        class << CLASS_SHIFT
    }
}

/// A 32 bit multicast routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(u32);

impl Key {
    /// Wraps a raw key received from the fabric.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw value put on the wire.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the route base of this key, with every low field cleared.
    pub fn route(self) -> u32 {
        self.0 & ROUTE_MASK
    }

    /// Returns the phase bit of this key.
    pub fn phase(self) -> Phase {
        if self.0 & PHASE_MASK == 0 {
            Phase::Forward
        } else {
            Phase::Backprop
        }
    }

    /// Decodes the message class of this key.
    ///
    /// # Returns
    /// The class or `KeyErr::UnknownClass` if the class bits are not assigned.
    pub fn class(self) -> Result<MsgClass> {
        match (self.0 & CLASS_MASK) >> CLASS_SHIFT {
            0 => Ok(MsgClass::Data),
            1 => Ok(MsgClass::Sync),
            2 => Ok(MsgClass::StopPartial),
            3 => Ok(MsgClass::StopFinal),
            _ => Err(KeyErr::UnknownClass { key: self.0 }),
        }
    }

    /// Returns the unit or block index of this key.
    pub fn index(self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }

    /// Returns the decision bit of a stop key.
    pub fn decision(self) -> bool {
        self.0 & 1 == 1
    }
}

/// A prevalidated key prefix: route base, phase and class.
///
/// Building the base once at start-up lets the hot path attach indices
/// without re-validating the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBase(u32);

impl KeyBase {
    /// Creates a new `KeyBase`.
    ///
    /// # Arguments
    /// * `route` - The route base key assigned to the link partition.
    /// * `phase` - The phase this key travels in.
    /// * `class` - The class of the messages sent under this base.
    ///
    /// # Returns
    /// The key base or `KeyErr::RouteOverlap` if `route` has low field bits set.
    pub fn new(route: u32, phase: Phase, class: MsgClass) -> Result<Self> {
        if route & !ROUTE_MASK != 0 {
            return Err(KeyErr::RouteOverlap { route });
        }

        Ok(Self(route | phase.bit() | class.bits()))
    }

    /// Attaches a unit or block index.
    ///
    /// # Returns
    /// The full key or `KeyErr::IndexOutOfRange` if `index` doesn't fit.
    pub fn at(self, index: usize) -> Result<Key> {
        if index >= MAX_INDEX {
            return Err(KeyErr::IndexOutOfRange { index });
        }

        Ok(Key(self.0 | index as u32))
    }

    /// Attaches a stop decision bit.
    pub fn decision(self, decision: bool) -> Key {
        Key(self.0 | decision as u32)
    }

    /// The raw prefix, index field zeroed.
    pub fn raw(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_are_disjoint() {
        assert_eq!(ROUTE_MASK & PHASE_MASK, 0);
        assert_eq!(ROUTE_MASK & CLASS_MASK, 0);
        assert_eq!(ROUTE_MASK & INDEX_MASK, 0);
        assert_eq!(PHASE_MASK & CLASS_MASK, 0);
        assert_eq!(ROUTE_MASK | PHASE_MASK | CLASS_MASK | INDEX_MASK, u32::MAX);
    }

    #[test]
    fn test_data_key_layout() {
        let base = KeyBase::new(0x0042_0000, Phase::Backprop, MsgClass::Data).unwrap();
        let key = base.at(7).unwrap();

        assert_eq!(key.raw(), 0x0042_8007);
        assert_eq!(key.route(), 0x0042_0000);
        assert_eq!(key.phase(), Phase::Backprop);
        assert_eq!(key.class(), Ok(MsgClass::Data));
        assert_eq!(key.index(), 7);
    }

    #[test]
    fn test_stop_keys_carry_decision() {
        let partial = KeyBase::new(0x0001_0000, Phase::Forward, MsgClass::StopPartial).unwrap();
        let fin = KeyBase::new(0x0001_0000, Phase::Forward, MsgClass::StopFinal).unwrap();

        assert_eq!(partial.decision(true).raw(), 0x0001_2001);
        assert!(!partial.decision(false).decision());
        assert_eq!(fin.decision(true).class(), Ok(MsgClass::StopFinal));
        assert!(fin.decision(true).decision());
    }

    #[test]
    fn test_rejects_overlapping_route() {
        let res = KeyBase::new(0x0001_0100, Phase::Forward, MsgClass::Data);
        assert_eq!(res, Err(KeyErr::RouteOverlap { route: 0x0001_0100 }));
    }

    #[test]
    fn test_rejects_index_out_of_range() {
        let base = KeyBase::new(0, Phase::Forward, MsgClass::Sync).unwrap();
        assert!(base.at(MAX_INDEX - 1).is_ok());
        assert_eq!(
            base.at(MAX_INDEX),
            Err(KeyErr::IndexOutOfRange { index: MAX_INDEX })
        );
    }

    #[test]
    fn test_unknown_class() {
        let key = Key::from_raw(0x0000_5000);
        assert_eq!(key.class(), Err(KeyErr::UnknownClass { key: 0x5000 }));
    }
}
