//! Host side of the pseudo-serial port, driving the target's rings over a
//! debug probe.
//!
//! See [`AsyncHostPort`] for usage.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

pub mod futures;

pub use futures::{AsyncDelay, AsyncHostPort};

use crate::port::PortDescriptor;

/// Configuration for creating an [`AsyncHostPort`].
/// - `Direct`: Ring locations and sizes are known up front
/// - `FromTarget`: Read the target's [`PortDescriptor`] from a known
///   address, normally a linker placed symbol
#[derive(Debug, Clone, Copy)]
pub enum HostConfig {
    Direct {
        /// Address of the host to target ring in target memory
        rx_ptr: u32,
        /// Data slots in the host to target ring
        rx_capacity: usize,
        /// Address of the target to host ring in target memory
        tx_ptr: u32,
        /// Data slots in the target to host ring
        tx_capacity: usize,
        /// Notification interrupt, if the host should raise one after sending
        irq: Option<u16>,
    },
    FromTarget {
        /// Address of the [`PortDescriptor`] in target memory
        descriptor_ptr: u32,
    },
}

impl From<PortDescriptor> for HostConfig {
    fn from(descriptor: PortDescriptor) -> Self {
        HostConfig::Direct {
            rx_ptr: descriptor.rx_base,
            rx_capacity: descriptor.rx_capacity as usize,
            tx_ptr: descriptor.tx_base,
            tx_capacity: descriptor.tx_capacity as usize,
            irq: Some(descriptor.irq as u16),
        }
    }
}

/// Where a ring is, once known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RingConfig {
    ptr: u32,
    capacity: usize,
}
