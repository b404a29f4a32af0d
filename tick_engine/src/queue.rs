use comms::{Packet, Phase};

use crate::error::{EngineErr, Result};

/// A bounded FIFO of received packets for one phase.
///
/// Filled from the arrival path and drained only by the worker. Overflow is
/// fatal: the queue never overwrites and never applies backpressure.
#[derive(Debug)]
pub struct PacketQueue {
    phase: Phase,
    slots: Box<[Option<Packet>]>,
    head: usize,
    tail: usize,
    len: usize,
    active: bool,
}

impl PacketQueue {
    /// Creates a new `PacketQueue`.
    ///
    /// # Arguments
    /// * `phase` - The phase whose packets this queue holds.
    /// * `capacity` - The amount of packets that fit before overflowing.
    ///
    /// # Returns
    /// The queue or `MemoryUnavailable` if the slots can't be allocated.
    pub fn new(phase: Phase, capacity: usize) -> Result<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| EngineErr::MemoryUnavailable {
                what: "packet queue",
                len: capacity,
            })?;
        slots.resize(capacity, None);

        Ok(Self {
            phase,
            slots: slots.into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
            active: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `packet` at the tail.
    ///
    /// # Returns
    /// `QueueFull` if every slot is taken; the queue is left untouched.
    pub fn push(&mut self, packet: Packet) -> Result<()> {
        if self.len == self.capacity() {
            return Err(EngineErr::QueueFull {
                phase: self.phase,
                capacity: self.capacity(),
            });
        }

        self.slots[self.tail] = Some(packet);
        self.tail = (self.tail + 1) % self.capacity();
        self.len += 1;
        Ok(())
    }

    /// Removes the packet at the head, if any.
    pub fn pop(&mut self) -> Option<Packet> {
        if self.len == 0 {
            return None;
        }

        let packet = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        packet
    }

    /// Marks the queue as being drained.
    ///
    /// # Returns
    /// `true` if the caller must schedule a drain, `false` if one is already
    /// scheduled or running.
    pub fn activate(&mut self) -> bool {
        !std::mem::replace(&mut self.active, true)
    }

    /// Clears the drain flag once the worker goes idle.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

}
