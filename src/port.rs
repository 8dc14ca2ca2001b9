//! Pseudo-serial port - the transport as seen by target firmware.
//!
//! [`Port`] owns the receive (host to target) and transmit (target to host)
//! rings, the handshake and the notification interrupt.  Firmware normally
//! places one in a `static`:
//!
//! ```rust,no_run
//! use swd_serial::port::CortexMPort;
//! use swd_serial::register::{DEFAULT_IRQ, Dcrdr, Nvic};
//!
//! static PORT: CortexMPort = CortexMPort::new(Dcrdr::new(), Nvic::new(DEFAULT_IRQ));
//!
//! fn main() {
//!     PORT.setup();
//!     loop {
//!         if let Some(byte) = PORT.receive_byte() {
//!             // Echo, dropping the byte if the host is not keeping up
//!             let _ = PORT.send_byte(byte);
//!         }
//!     }
//! }
//!
//! // Wired to vector DEFAULT_IRQ by the application's runtime
//! fn notification_interrupt() {
//!     PORT.notify();
//! }
//! ```

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::sync::atomic::{AtomicU32, Ordering};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::codec::{Encoder, Symbol};
use crate::handshake::{Handshake, HandshakeState, MAGIC, NotifyObserver, PROTOCOL_VERSION};
use crate::register::{Dcrdr, InterruptControl, Nvic, SharedRegister};
use crate::ring::RingBuffer;
use crate::{Error, Result};

/// Default receive ring capacity.  Input is usually typed, so this can be
/// small.
pub const DEFAULT_RX_CAPACITY: usize = 16;

/// Default transmit ring capacity.  Large enough for a line of output, to
/// avoid retrying on every line.
pub const DEFAULT_TX_CAPACITY: usize = 128;

/// Transfer statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Bytes received from the host since setup
    pub rx_bytes: u32,
    /// Payload bytes queued for the host since setup
    pub tx_bytes: u32,
    /// Sends rejected because the transmit ring was full, since setup
    pub tx_full: u32,
    /// Notifications since power on
    pub notifications: u32,
}

/// Where the rings are, for a host discovering them.  Seven little-endian
/// words, in field order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDescriptor {
    /// [`MAGIC`], once the descriptor is valid
    pub magic: u32,
    /// [`PROTOCOL_VERSION`]
    pub version: u32,
    /// Interrupt the host pends to notify the target
    pub irq: u32,
    /// Address of the host to target ring
    pub rx_base: u32,
    /// Data slots in the host to target ring
    pub rx_capacity: u32,
    /// Address of the target to host ring
    pub tx_base: u32,
    /// Data slots in the target to host ring
    pub tx_capacity: u32,
}

impl PortDescriptor {
    /// Number of words in the descriptor.
    pub const WORDS: usize = core::mem::size_of::<Self>() / 4;

    pub fn to_words(&self) -> [u32; Self::WORDS] {
        [
            self.magic,
            self.version,
            self.irq,
            self.rx_base,
            self.rx_capacity,
            self.tx_base,
            self.tx_capacity,
        ]
    }

    /// Parse and validate a descriptor read from the target.
    ///
    /// Returns [`Error::Uninit`] if the magic is missing (the target has not
    /// published it yet) and [`Error::InvalidOperation`] for an unsupported
    /// version.
    pub fn from_words(words: &[u32; Self::WORDS]) -> Result<Self> {
        let descriptor = Self {
            magic: words[0],
            version: words[1],
            irq: words[2],
            rx_base: words[3],
            rx_capacity: words[4],
            tx_base: words[5],
            tx_capacity: words[6],
        };
        if descriptor.magic != MAGIC {
            return Err(Error::Uninit);
        }
        if descriptor.version != PROTOCOL_VERSION {
            warn!("Unsupported protocol version {}", descriptor.version);
            return Err(Error::InvalidOperation);
        }
        Ok(descriptor)
    }

    /// Parse from the raw little-endian bytes of the descriptor.
    pub fn from_le_bytes(bytes: &[u8; Self::WORDS * 4]) -> Result<Self> {
        let mut words = [0u32; Self::WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self::from_words(&words)
    }
}

/// Static home for a [`PortDescriptor`], at a location the host knows (for
/// example placed by the linker script).
pub struct DescriptorSlot {
    words: [AtomicU32; PortDescriptor::WORDS],
}

impl DescriptorSlot {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            words: [const { AtomicU32::new(0) }; PortDescriptor::WORDS],
        }
    }

    /// Write the descriptor.  The magic is cleared first and written last, so
    /// the host never accepts a partially written descriptor.
    pub fn publish(&self, descriptor: &PortDescriptor) {
        self.words[0].store(0, Ordering::Release);
        for (slot, word) in self.words.iter().zip(descriptor.to_words()).skip(1) {
            slot.store(word, Ordering::Relaxed);
        }
        self.words[0].store(descriptor.magic, Ordering::Release);
        debug!("Published port descriptor at {:#010X}", self.addr());
    }

    pub fn read(&self) -> Result<PortDescriptor> {
        let mut words = [0u32; PortDescriptor::WORDS];
        for (word, slot) in words.iter_mut().zip(self.words.iter()) {
            *word = slot.load(Ordering::Acquire);
        }
        PortDescriptor::from_words(&words)
    }

    pub fn addr(&self) -> usize {
        self as *const Self as usize
    }
}

/// Cortex-M port, using the DCRDR and an NVIC interrupt line.
pub type CortexMPort<const RX: usize = DEFAULT_RX_CAPACITY, const TX: usize = DEFAULT_TX_CAPACITY> =
    Port<Dcrdr, Nvic, RX, TX>;

/// The pseudo-serial port.
///
/// All methods take `&self`.  [`Self::receive_byte()`], [`Self::send_byte()`]
/// and friends are called from a single thread of control, and
/// [`Self::notify()`] from the notification interrupt handler.
pub struct Port<
    R: SharedRegister,
    I: InterruptControl,
    const RX: usize = DEFAULT_RX_CAPACITY,
    const TX: usize = DEFAULT_TX_CAPACITY,
> {
    rx: RingBuffer<RX>,
    tx: RingBuffer<TX>,
    handshake: Handshake<R>,
    irq: I,
    rx_bytes: AtomicU32,
    tx_bytes: AtomicU32,
    tx_full: AtomicU32,
}

impl<R: SharedRegister, I: InterruptControl, const RX: usize, const TX: usize> Port<R, I, RX, TX> {
    /// Create a port.  Nothing is written to the shared register until
    /// [`Self::setup()`] is called.
    pub const fn new(register: R, irq: I) -> Self {
        Self {
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
            handshake: Handshake::new(register),
            irq,
            rx_bytes: AtomicU32::new(0),
            tx_bytes: AtomicU32::new(0),
            tx_full: AtomicU32::new(0),
        }
    }

    /// Configure the port: clear both rings and statistics, announce the
    /// target in the shared register and enable the notification interrupt.
    ///
    /// May be called again at any time to resynchronise with the host.  Any
    /// data in flight is discarded.  The interrupt is disabled while the
    /// state is reset, so a notification cannot interleave with it.
    pub fn setup(&self) {
        self.irq.disable();

        self.rx.reset();
        self.tx.reset();
        self.rx_bytes.store(0, Ordering::Relaxed);
        self.tx_bytes.store(0, Ordering::Relaxed);
        self.tx_full.store(0, Ordering::Relaxed);
        self.handshake.announce();

        self.irq.enable();

        debug!(
            "Port setup: rx {:#010X} ({RX} bytes), tx {:#010X} ({TX} bytes), irq {}",
            self.rx.base_addr(),
            self.tx.base_addr(),
            self.irq.irq()
        );
    }

    /// Get the next byte from the host, or `None` if nothing is waiting.
    ///
    /// Never blocks - poll to wait for data.
    pub fn receive_byte(&self) -> Option<u8> {
        let byte = self.rx.try_pop()?;
        bump(&self.rx_bytes, 1);
        if self.handshake.state() == HandshakeState::Announced {
            self.handshake.mark_active();
        }
        Some(byte)
    }

    /// Read as many waiting bytes as fit into `buf`, returning the number
    /// read.
    pub fn receive(&self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        for slot in buf.iter_mut() {
            match self.receive_byte() {
                Some(byte) => *slot = byte,
                None => break,
            }
            count += 1;
        }
        count
    }

    /// Queue a byte for the host.
    ///
    /// Zero and the escape byte take two ring slots.  Returns
    /// [`Error::BufferFull`] if they are not available, in which case nothing
    /// is queued - retry later or drop the byte.
    pub fn send_byte(&self, byte: u8) -> Result<()> {
        let symbol = Symbol::from_byte(byte);
        match self.tx.try_push_all(symbol.encoded().as_slice()) {
            Ok(()) => {
                bump(&self.tx_bytes, 1);
                Ok(())
            }
            Err(e) => {
                bump(&self.tx_full, 1);
                Err(e)
            }
        }
    }

    /// Queue as much of `bytes` as fits, coalescing zero runs, and return the
    /// number of payload bytes accepted.
    ///
    /// Returns [`Error::BufferFull`] if none could be queued.
    pub fn send(&self, bytes: &[u8]) -> Result<usize> {
        if bytes.is_empty() {
            return Ok(0);
        }

        let mut accepted = 0;
        for symbol in Encoder::new(bytes) {
            if self.tx.try_push_all(symbol.encoded().as_slice()).is_err() {
                break;
            }
            accepted += symbol.decoded_len();
        }

        if accepted == 0 {
            bump(&self.tx_full, 1);
            Err(Error::BufferFull)
        } else {
            bump(&self.tx_bytes, accepted as u32);
            Ok(accepted)
        }
    }

    /// Interrupt: Handle a notification from the host.  Returns the new
    /// handshake counter.
    ///
    /// Does not touch the rings - data is moved by polling.
    pub fn notify(&self) -> u32 {
        self.handshake.notify()
    }

    /// Interrupt: As [`Self::notify()`], then run `observer`, for example to
    /// toggle an LED.
    pub fn notify_with<O: NotifyObserver>(&self, observer: &mut O) -> u32 {
        let counter = self.handshake.notify();
        observer.notified(counter);
        counter
    }

    /// Pend the notification interrupt from the target side, for example
    /// from a timer standing in for the host.
    pub fn kick(&self) {
        self.irq.pend();
    }

    pub fn state(&self) -> HandshakeState {
        self.handshake.state()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            tx_full: self.tx_full.load(Ordering::Relaxed),
            notifications: self.handshake.notifications(),
        }
    }

    /// Current contents of the shared register.
    pub fn register_value(&self) -> u32 {
        self.handshake.register_value()
    }

    pub fn handshake(&self) -> &Handshake<R> {
        &self.handshake
    }

    /// Host to target ring.
    pub fn rx(&self) -> &RingBuffer<RX> {
        &self.rx
    }

    /// Target to host ring.
    pub fn tx(&self) -> &RingBuffer<TX> {
        &self.tx
    }

    /// Descriptor for this port at its actual address.
    pub fn descriptor(&self) -> PortDescriptor {
        self.descriptor_at(self as *const Self as usize as u32)
    }

    /// Descriptor for this port, were it located at `base` in the target's
    /// memory map.
    pub fn descriptor_at(&self, base: u32) -> PortDescriptor {
        PortDescriptor {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            irq: self.irq.irq() as u32,
            rx_base: base.wrapping_add(core::mem::offset_of!(Self, rx) as u32),
            rx_capacity: RX as u32,
            tx_base: base.wrapping_add(core::mem::offset_of!(Self, tx) as u32),
            tx_capacity: TX as u32,
        }
    }
}

// Counters are only written from thread mode, so load/store is enough.
fn bump(counter: &AtomicU32, by: u32) {
    let value = counter.load(Ordering::Relaxed);
    counter.store(value.wrapping_add(by), Ordering::Relaxed);
}
