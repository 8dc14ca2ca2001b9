//! Single-producer, single-consumer byte rings shared between Host and Target
//!
//! Each ring lives in target SRAM and consists of a small control block
//! followed by the data area:
//!
//! ```text
//! +0   head      u32   next slot the producer writes, owned by the producer
//! +4   tail      u32   next slot the consumer reads, owned by the consumer
//! +8   capacity  u32   number of data slots, written at construction
//! +12  data[capacity]
//! ```
//!
//! The ring is empty when `head == tail` and full when advancing `head`
//! would make it equal `tail`, so at most `capacity - 1` bytes are in flight.
//! Slots not holding live data are always zero.
//!
//! See [`crate`] for how the two rings are used.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[cfg(feature = "async")]
pub mod futures;
pub mod sync;

#[cfg(feature = "async")]
pub use futures::{AsyncRing, AsyncRingIo, ReaderWriterRing, ReaderWriterRingIo};
pub use sync::RingBuffer;

use crate::{Error, Result};

/// Whether the user of a ring is its Producer or Consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingRole {
    Producer,
    Consumer,
}

/// Control block at the start of every ring.  Describes the layout shared
/// by [`RingBuffer`] on the target and `AsyncRing` on the host.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCb {
    /// Producer index - next slot to be written
    pub head: u32,

    /// Consumer index - next slot to be read
    pub tail: u32,

    /// Number of data slots following this control block
    pub capacity: u32,
}

/// RingCb offsets
impl RingCb {
    pub const fn head_offset() -> u32 {
        core::mem::offset_of!(RingCb, head) as u32
    }

    pub const fn tail_offset() -> u32 {
        core::mem::offset_of!(RingCb, tail) as u32
    }

    pub const fn capacity_offset() -> u32 {
        core::mem::offset_of!(RingCb, capacity) as u32
    }

    pub const fn data_offset() -> u32 {
        core::mem::size_of::<Self>() as u32
    }

    /// Number of bytes which can be written before the ring is full.
    pub fn free(&self) -> usize {
        ring_free(self.head, self.tail, self.capacity)
    }

    /// Number of bytes waiting to be consumed.
    pub fn len(&self) -> usize {
        ring_len(self.head, self.tail, self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }
}

/// Smallest usable ring - one live byte plus the slot that separates full
/// from empty.
pub const MIN_CAPACITY: usize = 2;

// Helper functions

pub(crate) const fn next_index(index: u32, capacity: u32) -> u32 {
    let next = index + 1;
    if next >= capacity { 0 } else { next }
}

pub(crate) const fn ring_len(head: u32, tail: u32, capacity: u32) -> usize {
    if head >= tail {
        (head - tail) as usize
    } else {
        (capacity - tail + head) as usize
    }
}

pub(crate) const fn ring_free(head: u32, tail: u32, capacity: u32) -> usize {
    capacity as usize - 1 - ring_len(head, tail, capacity)
}

#[cfg(feature = "async")]
fn check_base_addr(addr: u32) -> Result<()> {
    if addr % 4 != 0 {
        Err(Error::NotAligned)
    } else {
        Ok(())
    }
}

pub(crate) const fn check_capacity(capacity: usize) -> Result<()> {
    if capacity < MIN_CAPACITY || capacity > u32::MAX as usize {
        Err(Error::BufferTooSmall)
    } else {
        Ok(())
    }
}

#[cfg(feature = "async")]
fn consumer_only(role: RingRole) -> Result<()> {
    if role != RingRole::Consumer {
        Err(Error::InvalidOperation)
    } else {
        Ok(())
    }
}

#[cfg(feature = "async")]
fn producer_only(role: RingRole) -> Result<()> {
    if role != RingRole::Producer {
        Err(Error::InvalidOperation)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_block_layout() {
        assert_eq!(RingCb::head_offset(), 0);
        assert_eq!(RingCb::tail_offset(), 4);
        assert_eq!(RingCb::capacity_offset(), 8);
        assert_eq!(RingCb::data_offset(), 12);
    }

    #[test]
    fn index_arithmetic_wraps() {
        assert_eq!(next_index(14, 16), 15);
        assert_eq!(next_index(15, 16), 0);
        assert_eq!(ring_len(2, 14, 16), 4);
        assert_eq!(ring_free(2, 14, 16), 11);
        assert_eq!(ring_free(0, 0, 16), 15);
        assert_eq!(ring_free(15, 0, 16), 0);
    }

    #[test]
    fn capacity_limits() {
        assert_eq!(check_capacity(1), Err(Error::BufferTooSmall));
        assert_eq!(check_capacity(2), Ok(()));
    }
}
