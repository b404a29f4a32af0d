use crate::key::Key;

/// A multicast packet: a routing key and an optional scalar payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub key: Key,
    pub payload: Option<u32>,
}

impl Packet {
    /// Creates a packet carrying a fixed-point scalar.
    pub fn with_payload(key: Key, payload: u32) -> Self {
        Self {
            key,
            payload: Some(payload),
        }
    }

    /// Creates a packet whose information is entirely in its key.
    pub fn bare(key: Key) -> Self {
        Self { key, payload: None }
    }

    /// Returns the payload, or zero for bare packets.
    pub fn value(&self) -> u32 {
        self.payload.unwrap_or_default()
    }
}
