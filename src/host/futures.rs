//! Asynchronous host port.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::handshake::parse_register;
use crate::host::{HostConfig, RingConfig};
use crate::io::{Reader, Writer};
use crate::port::PortDescriptor;
use crate::register::{DCRDR_ADDR, NVIC_ISPR_ADDR, nvic_bit};
use crate::ring::{AsyncRing, AsyncRingIo, ReaderWriterRingIo, RingRole};
use crate::{Error, Result};

/// Yield delay for async polling loops.
///
/// Application must provide an implementation of this trait in order for the
/// host port to be able to yield, waiting for the target.
///
/// This trait keeps `swd-serial` free of any specific async runtime.
///
/// Example:
///
/// ```rust,ignore
/// use embassy_time::{Duration, Timer};
/// struct Delay;
/// impl AsyncDelay for Delay {
///     async fn delay() {
///         Timer::after(Duration::from_millis(10)).await;
///     }
/// }
/// ```
pub trait AsyncDelay {
    fn delay() -> impl Future<Output = ()>;
}

/// Async host end of the pseudo-serial port.
///
/// See [`AsyncDelay`] for required delay trait.
///
/// Example usage:
///
/// ```rust,ignore
/// use swd_serial::host::{AsyncDelay, AsyncHostPort, HostConfig};
///
/// let config = HostConfig::FromTarget {
///     descriptor_ptr: 0x2000_0000,
/// };
/// let mut reader = ...; // implement Reader trait
/// let mut writer = ...; // implement Writer trait
/// let mut port = AsyncHostPort::<_, _, Delay>::new(&mut reader, &mut writer, config);
/// port.wait_for_target(100).await?;
/// port.send_all(b"help\r").await?;
/// let mut buf = [0u8; 64];
/// let len = port.receive(&mut buf).await?;
/// ```
pub struct AsyncHostPort<'a, R: Reader, W: Writer, D: AsyncDelay> {
    io: ReaderWriterRingIo<'a, R, W>,
    config: HostConfig,
    rings: Option<(RingConfig, RingConfig)>,
    irq: Option<u16>,
    _delay: core::marker::PhantomData<D>,
}

impl<'a, R: Reader, W: Writer, D: AsyncDelay> AsyncHostPort<'a, R, W, D> {
    /// Create a new AsyncHostPort
    ///
    /// Arguments:
    /// - `reader`: Reader object to read from target
    /// - `writer`: Writer object to write to target
    /// - `config`: Where to find the target's rings
    pub fn new(reader: &'a mut R, writer: &'a mut W, config: HostConfig) -> Self {
        let (rings, irq) = match config {
            HostConfig::Direct {
                rx_ptr,
                rx_capacity,
                tx_ptr,
                tx_capacity,
                irq,
            } => (
                Some((
                    RingConfig {
                        ptr: rx_ptr,
                        capacity: rx_capacity,
                    },
                    RingConfig {
                        ptr: tx_ptr,
                        capacity: tx_capacity,
                    },
                )),
                irq,
            ),
            HostConfig::FromTarget { .. } => (None, None),
        };

        Self {
            io: ReaderWriterRingIo::new(reader, writer),
            config,
            rings,
            irq,
            _delay: core::marker::PhantomData,
        }
    }

    /// Read the shared register and check it holds the protocol magic.
    ///
    /// Returns the target's notification counter, or [`Error::NoTarget`].
    pub async fn probe(&mut self) -> Result<u8> {
        let value = self.io.read_u32(DCRDR_ADDR).await?;
        parse_register(value).ok_or_else(|| {
            trace!("No target magic in DCRDR: {value:#010X}");
            Error::NoTarget
        })
    }

    /// Poll until the target announces itself and its rings can be located.
    ///
    /// Gives up with [`Error::Timeout`] after `attempts` polls.
    pub async fn wait_for_target(&mut self, attempts: usize) -> Result<u8> {
        for _ in 0..attempts {
            match self.probe().await {
                Ok(counter) => match self.locate().await {
                    Ok(()) => {
                        debug!("Target found, counter {counter}");
                        return Ok(counter);
                    }
                    Err(Error::Uninit) => (),
                    Err(e) => return Err(e),
                },
                Err(Error::NoTarget) => (),
                Err(e) => return Err(e),
            }
            D::delay().await;
        }
        warn!("Target not found after {attempts} attempts");
        Err(Error::Timeout)
    }

    /// Write as much of `data` to the target as fits, returning the number
    /// of bytes written, then raise the notification interrupt if one is
    /// known.
    ///
    /// Returns [`Error::BufferFull`] if the target's receive ring is full.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize> {
        let (rx, _) = self.locate_rings().await?;
        let mut ring = AsyncRing::new(&mut self.io, RingRole::Producer, rx.ptr, rx.capacity)?;
        let count = ring.send(data).await?;
        if self.irq.is_some() {
            self.kick().await?;
        }
        Ok(count)
    }

    /// Write all of `data`, waiting for the target to make room as required.
    pub async fn send_all(&mut self, data: &[u8]) -> Result<()> {
        let mut sent = 0;
        while sent < data.len() {
            match self.send(&data[sent..]).await {
                Ok(count) => sent += count,
                Err(Error::BufferFull) => D::delay().await,
                Err(e) => return Err(e),
            }
        }
        debug!("Sent {} bytes", data.len());
        Ok(())
    }

    /// Read waiting data from the target, returning the number of bytes
    /// read.
    ///
    /// Returns [`Error::BufferEmpty`] if the target has sent nothing.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (_, tx) = self.locate_rings().await?;
        let mut ring = AsyncRing::new(&mut self.io, RingRole::Consumer, tx.ptr, tx.capacity)?;
        ring.receive(buf).await
    }

    /// Pend the target's notification interrupt.
    ///
    /// Returns [`Error::InvalidOperation`] if the interrupt is not known.
    pub async fn kick(&mut self) -> Result<()> {
        let irq = self.irq.ok_or(Error::InvalidOperation)?;
        let (addr, bit) = nvic_bit(NVIC_ISPR_ADDR, irq);
        self.io.write_u32(addr, bit).await
    }

    /// Interrupt used to notify the target, once known.
    pub fn irq(&self) -> Option<u16> {
        self.irq
    }

    async fn locate(&mut self) -> Result<()> {
        self.locate_rings().await.map(|_| ())
    }

    async fn locate_rings(&mut self) -> Result<(RingConfig, RingConfig)> {
        if let Some(rings) = self.rings {
            return Ok(rings);
        }

        let HostConfig::FromTarget { descriptor_ptr } = self.config else {
            return Err(Error::Uninit);
        };
        let mut bytes = [0u8; PortDescriptor::WORDS * 4];
        self.io.read_bytes(descriptor_ptr, &mut bytes).await?;
        let descriptor = PortDescriptor::from_le_bytes(&bytes)?;
        debug!(
            "Port descriptor at {descriptor_ptr:#010X}: rx {:#010X} ({} bytes), tx {:#010X} ({} bytes), irq {}",
            descriptor.rx_base,
            descriptor.rx_capacity,
            descriptor.tx_base,
            descriptor.tx_capacity,
            descriptor.irq
        );

        let rings = (
            RingConfig {
                ptr: descriptor.rx_base,
                capacity: descriptor.rx_capacity as usize,
            },
            RingConfig {
                ptr: descriptor.tx_base,
                capacity: descriptor.tx_capacity as usize,
            },
        );
        self.rings = Some(rings);
        self.irq = Some(descriptor.irq as u16);
        Ok(rings)
    }
}
