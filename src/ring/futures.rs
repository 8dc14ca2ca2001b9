//! Asynchronous ring access - typically used by a Host.
//!
//! The host plays the producer of the target's receive ring and the consumer
//! of its transmit ring:
//! - As producer it reads the target owned `tail`, writes as many bytes as
//!   fit and publishes `head` last.  Bytes are raw - the target consumes by
//!   index, so zero needs no escaping.
//! - As consumer it reads the data area, scans from its `tail` for non-zero
//!   bytes and decodes them with [`crate::codec`].  It clears the consumed
//!   slots to zero before publishing the new `tail`, so the target never
//!   reuses a slot the host has yet to clear.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::boxed::Box;
use alloc::vec;
use async_trait::async_trait;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::codec::Symbol;
use crate::io::{Reader, Writer};
use crate::ring::{RingCb, RingRole, ring_free};
use crate::ring::{check_base_addr, check_capacity, consumer_only, producer_only};
use crate::{Error, Result};

/// Trait for accessing a ring in a shared medium (usually target RAM).
///
/// Async version, typically used for accessing the medium over SWD or
/// other asynchronous protocols.
#[async_trait(?Send)]
pub trait AsyncRingIo {
    /// Atomic read u32 operation
    async fn read_u32(&mut self, addr: u32) -> Result<u32>;

    /// Atomic write u32 operation
    async fn write_u32(&mut self, addr: u32, value: u32) -> Result<()>;

    /// Bulk read access, no need for atomicity
    async fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Bulk write access, no need for atomicity
    async fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<()>;
}

/// Asynchronous view of one of the target's rings
pub struct AsyncRing<'a, I: AsyncRingIo> {
    io: &'a mut I,
    role: RingRole,
    base_addr: u32,
    capacity: u32,
}

impl<'a, I: AsyncRingIo> AsyncRing<'a, I> {
    /// Use a ring whose capacity is already known.  Does not access the
    /// target - the target initializes its own rings.
    ///
    /// Arguments:
    /// - `io` - Object implementing [`AsyncRingIo`] trait to access shared
    ///   medium
    /// - `role` - Whether the user is the Consumer or Producer
    /// - `base_addr` - Address of the ring's control block
    /// - `capacity` - Number of data slots
    pub fn new(io: &'a mut I, role: RingRole, base_addr: u32, capacity: usize) -> Result<Self> {
        check_base_addr(base_addr)?;
        check_capacity(capacity)?;

        Ok(Self {
            io,
            role,
            base_addr,
            capacity: capacity as u32,
        })
    }

    /// Connect to a ring, reading its capacity from the control block.
    ///
    /// Returns [`Error::Uninit`] if the target has not initialized it.
    pub async fn from_target(io: &'a mut I, role: RingRole, base_addr: u32) -> Result<Self> {
        check_base_addr(base_addr)?;

        let capacity = io
            .read_u32(base_addr + RingCb::capacity_offset())
            .await? as usize;
        if capacity == 0 {
            return Err(Error::Uninit);
        }
        check_capacity(capacity)?;

        trace!("Connected to ring {role:?} at {base_addr:#010X} capacity {capacity}");
        Ok(Self {
            io,
            role,
            base_addr,
            capacity: capacity as u32,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Producer: Write as much of `data` as fits, returning the number of
    /// bytes written.
    ///
    /// Returns [`Error::BufferFull`] if the ring has no free slot.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize> {
        producer_only(self.role)?;
        if data.is_empty() {
            return Ok(0);
        }

        let head = self.read_head().await?;
        let tail = self.read_tail().await?;
        let free = ring_free(head, tail, self.capacity);
        if free == 0 {
            return Err(Error::BufferFull);
        }
        let count = free.min(data.len());

        // Data first, in up to two pieces if it wraps
        let first = count.min((self.capacity - head) as usize);
        self.write_bytes(self.slot_addr(head), &data[..first])
            .await?;
        if count > first {
            self.write_bytes(self.slot_addr(0), &data[first..count])
                .await?;
        }

        // Publish by writing head last
        let next = ((head as usize + count) % self.capacity()) as u32;
        self.write_head(next).await?;

        trace!("Sent {count} bytes, head {head} -> {next}");
        Ok(count)
    }

    /// Consumer: Decode waiting data into `buf`, returning the number of
    /// payload bytes written.
    ///
    /// Errors:
    /// - [`Error::BufferEmpty`] if nothing complete is waiting.  An escape
    ///   byte whose count has not been written yet is left for next time.
    /// - [`Error::BufferTooSmall`] if the next zero run does not fit in
    ///   `buf`.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        consumer_only(self.role)?;
        if buf.is_empty() {
            return Ok(0);
        }

        let tail = self.read_tail().await?;
        let capacity = self.capacity();

        let mut window = vec![0u8; capacity];
        self.read_bytes(self.slot_addr(0), &mut window).await?;
        // Rotate so the scan starts at tail.  The last slot is the one
        // before tail, which the producer never fills.
        window.rotate_left(tail as usize);
        let live = &window[..capacity - 1];

        let mut consumed = 0;
        let mut written = 0;
        let mut no_room = false;
        while consumed < live.len() {
            let symbol = match Symbol::parse(&live[consumed..]) {
                Ok(symbol) => symbol,
                Err(Error::MalformedEscape) => {
                    trace!("Escape at end of scanned data, waiting for count");
                    break;
                }
                Err(_) => break,
            };
            if symbol.decoded_len() > buf.len() - written {
                no_room = true;
                break;
            }
            written += symbol.write_decoded(&mut buf[written..])?;
            consumed += symbol.encoded_len();
        }

        if consumed == 0 {
            return Err(if no_room {
                Error::BufferTooSmall
            } else {
                Error::BufferEmpty
            });
        }

        // Clear what was consumed before giving the slots back
        let first = consumed.min(capacity - tail as usize);
        self.clear_slots(tail, first).await?;
        if consumed > first {
            self.clear_slots(0, consumed - first).await?;
        }
        let next = ((tail as usize + consumed) % capacity) as u32;
        self.write_tail(next).await?;

        trace!("Received {written} bytes from {consumed} slots, tail {tail} -> {next}");
        Ok(written)
    }

    /// Read the control block.
    pub async fn control_block(&mut self) -> Result<RingCb> {
        Ok(RingCb {
            head: self.read_head().await?,
            tail: self.read_tail().await?,
            capacity: self.capacity,
        })
    }
}

// Internal functions
impl<I: AsyncRingIo> AsyncRing<'_, I> {
    fn slot_addr(&self, index: u32) -> u32 {
        self.base_addr + RingCb::data_offset() + index
    }

    async fn read_index(&mut self, offset: u32) -> Result<u32> {
        let index = self.io.read_u32(self.base_addr + offset).await?;
        if index >= self.capacity {
            warn!(
                "Ring at {:#010X} index {index} out of range (capacity {})",
                self.base_addr, self.capacity
            );
            Err(Error::BadIndex)
        } else {
            Ok(index)
        }
    }

    async fn read_head(&mut self) -> Result<u32> {
        self.read_index(RingCb::head_offset()).await
    }

    async fn read_tail(&mut self) -> Result<u32> {
        self.read_index(RingCb::tail_offset()).await
    }

    async fn write_head(&mut self, head: u32) -> Result<()> {
        self.io
            .write_u32(self.base_addr + RingCb::head_offset(), head)
            .await
    }

    async fn write_tail(&mut self, tail: u32) -> Result<()> {
        self.io
            .write_u32(self.base_addr + RingCb::tail_offset(), tail)
            .await
    }

    async fn clear_slots(&mut self, index: u32, count: usize) -> Result<()> {
        let zeros = vec![0u8; count];
        self.write_bytes(self.slot_addr(index), &zeros).await
    }

    async fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.io.write_bytes(addr, data).await
    }

    async fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.io.read_bytes(addr, buf).await
    }
}

/// Async Reader/Writer ring type.  Typically used by a Host.
// It is important that AsyncRing and ReaderWriterRingIo have different
// lifetimes - this allows borrowing of both to be decoupled from each other.
pub type ReaderWriterRing<'a, 'b, R, W> = AsyncRing<'a, ReaderWriterRingIo<'b, R, W>>;

/// Ring I/O implementation using [`crate::io::Reader`] and
/// [`crate::io::Writer`] traits.
pub struct ReaderWriterRingIo<'a, R: Reader, W: Writer> {
    reader: &'a mut R,
    writer: &'a mut W,
}

impl<'a, R: Reader, W: Writer> ReaderWriterRingIo<'a, R, W> {
    /// Create new instance
    pub fn new(reader: &'a mut R, writer: &'a mut W) -> Self {
        Self { reader, writer }
    }
}

#[async_trait(?Send)]
impl<R: Reader, W: Writer> AsyncRingIo for ReaderWriterRingIo<'_, R, W> {
    async fn read_u32(&mut self, addr: u32) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.reader.read(addr, &mut buf).await.map_err(|e| {
            debug!("Read of {addr:#010X} failed: {e:?}");
            Error::Io
        })?;
        Ok(u32::from_le_bytes(buf))
    }

    async fn write_u32(&mut self, addr: u32, value: u32) -> Result<()> {
        self.writer
            .write(addr, &value.to_le_bytes())
            .await
            .map_err(|e| {
                debug!("Write of {addr:#010X} failed: {e:?}");
                Error::Io
            })
    }

    async fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        self.reader.read(addr, buf).await.map_err(|e| {
            debug!("Read of {len} bytes at {addr:#010X} failed: {e:?}");
            Error::Io
        })
    }

    async fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.writer.write(addr, data).await.map_err(|e| {
            debug!("Write of {} bytes at {addr:#010X} failed: {e:?}", data.len());
            Error::Io
        })
    }
}
