//! Target side ring buffer, accessed directly in RAM.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::ring::{RingCb, check_capacity, next_index, ring_free, ring_len};
use crate::{Error, Result};

/// Fixed capacity byte ring, laid out in memory as described in
/// [`crate::ring`] so the host can find the indices and data by address.
///
/// All operations take `&self` and only use single word atomic loads and
/// stores, so a ring can live in a `static` and be shared with an interrupt
/// handler and with a host accessing RAM over the debug port.  Each index is
/// only ever stored by its owner:
/// - the producer writes data slots, then publishes `head`
/// - the consumer reads and clears data slots, then publishes `tail`
///
/// No read-modify-write atomics are used, so this works on ARMv6-M.
///
/// ```rust
/// use swd_serial::ring::RingBuffer;
///
/// static RING: RingBuffer<16> = RingBuffer::new();
///
/// RING.try_push(b'A').unwrap();
/// assert_eq!(RING.try_pop(), Some(b'A'));
/// assert_eq!(RING.try_pop(), None);
/// ```
#[repr(C)]
pub struct RingBuffer<const N: usize> {
    head: AtomicU32,
    tail: AtomicU32,
    capacity: u32,
    data: [AtomicU8; N],
}

impl<const N: usize> RingBuffer<N> {
    const CAPACITY_OK: () = assert!(
        check_capacity(N).is_ok(),
        "ring capacity must be at least 2 and fit in a u32"
    );

    /// Create an empty, zeroed ring.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_OK;
        Self {
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            capacity: N as u32,
            data: [const { AtomicU8::new(0) }; N],
        }
    }

    /// Number of data slots.  One is always kept free, so the ring holds at
    /// most `capacity() - 1` bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Consumer: Take the next byte, or `None` if the ring is empty.
    ///
    /// The slot is cleared back to zero before `tail` is advanced, so the
    /// producer always finds free slots zeroed.
    pub fn try_pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        if head >= self.capacity || tail >= self.capacity {
            warn!("Ignoring out of range ring indices {head}/{tail} (capacity {N})");
            return None;
        }

        let slot = &self.data[tail as usize];
        let byte = slot.load(Ordering::Relaxed);
        slot.store(0, Ordering::Relaxed);

        self.tail
            .store(next_index(tail, self.capacity), Ordering::Release);
        Some(byte)
    }

    /// Producer: Queue a single byte.
    ///
    /// Returns [`Error::BufferFull`] without storing anything if there is no
    /// free slot.
    ///
    /// If the consumer scans this ring's memory rather than using the
    /// indices, `byte` must not be zero - pass it through
    /// [`crate::codec`] first.
    pub fn try_push(&self, byte: u8) -> Result<()> {
        self.try_push_all(&[byte])
    }

    /// Producer: Queue all of `bytes`, or none of them.  Used to keep two
    /// byte escape sequences together.
    ///
    /// The slots are written last to first, the first with release ordering,
    /// and `head` is published after that, so a consumer using `head` never
    /// sees any of it early.  A consumer scanning memory can still see part of
    /// a sequence that wraps, which [`crate::codec`] tolerates.
    pub fn try_push_all(&self, bytes: &[u8]) -> Result<()> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head >= self.capacity || tail >= self.capacity {
            warn!("Out of range ring indices {head}/{tail} (capacity {N}), treating as full");
            return Err(Error::BufferFull);
        }
        if ring_free(head, tail, self.capacity) < bytes.len() {
            return Err(Error::BufferFull);
        }
        let Some((&first, rest)) = bytes.split_first() else {
            return Ok(());
        };

        for (offset, &byte) in rest.iter().enumerate().rev() {
            let index = (head as usize + 1 + offset) % N;
            self.data[index].store(byte, Ordering::Relaxed);
        }
        self.data[head as usize].store(first, Ordering::Release);

        let next = ((head as usize + bytes.len()) % N) as u32;
        self.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Number of bytes waiting to be consumed.
    pub fn len(&self) -> usize {
        let (head, tail) = self.indices();
        ring_len(head, tail, self.capacity)
    }

    /// Number of bytes which can be queued before the ring is full.
    pub fn free(&self) -> usize {
        let (head, tail) = self.indices();
        ring_free(head, tail, self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        let (head, tail) = self.indices();
        head == tail
    }

    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    /// Discard any data in flight, zeroing every slot and both indices.
    ///
    /// Must not race either side of the ring.  On the target this is done
    /// with the notification interrupt disabled, before the host has been
    /// told where the ring is (or while it is expected to resynchronise).
    pub fn reset(&self) {
        for slot in self.data.iter() {
            slot.store(0, Ordering::Relaxed);
        }
        self.head.store(0, Ordering::Release);
        self.tail.store(0, Ordering::Release);
        trace!("Reset ring at {:#010X} capacity {N}", self.base_addr());
    }

    /// Snapshot of the control block.
    pub fn control_block(&self) -> RingCb {
        let (head, tail) = self.indices();
        RingCb {
            head,
            tail,
            capacity: self.capacity,
        }
    }

    /// Address of the control block in the target's memory map.
    pub fn base_addr(&self) -> usize {
        self as *const Self as usize
    }

    /// Address of the first data slot in the target's memory map.
    pub fn data_addr(&self) -> usize {
        self.base_addr() + RingCb::data_offset() as usize
    }
}

// Internal functions
impl<const N: usize> RingBuffer<N> {
    fn indices(&self) -> (u32, u32) {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        // A host written index may be out of range - report such a ring as
        // empty rather than index outside the data area.
        if head >= self.capacity || tail >= self.capacity {
            (0, 0)
        } else {
            (head, tail)
        }
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
