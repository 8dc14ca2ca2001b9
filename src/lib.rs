//! Pseudo-serial port for ARM targets over SWD and other debug protocols.
//!
//! Many development boards expose a debug probe but no serial port.  This
//! crate emulates a bidirectional byte stream between a debug host and a
//! target microcontroller using nothing but the debug interface's shared data
//! register and two ring buffers in the target's SRAM.  No UART, no baud rate,
//! no framing.
//!
//! `no_std`.  Requires `alloc` for the async host helper.
//!
//! ## Architecture
//!
//! Assumes a Host (debug controller) and Target (microcontroller)
//! architecture.  The host cannot call target code - it can only read and
//! write target memory through the probe, and optionally pend an interrupt.
//!
//! - **Shared register**: The target announces itself by writing a magic
//!   number to the Debug Core Register Data Register (DCRDR).  The low byte
//!   of the value is a counter, bumped each time the host raises the
//!   notification interrupt, so the host can tell the target is alive.  See
//!   [`handshake`].
//! - **Receive ring** (host to target): The host writes bytes into the ring's
//!   data area and advances its `head` index.  The target polls
//!   [`port::Port::receive_byte()`], which consumes bytes, clears their slots
//!   to zero and advances `tail`.
//! - **Transmit ring** (target to host): The target queues bytes with
//!   [`port::Port::send_byte()`].  The host scans the data area for non-zero
//!   bytes, clears the slots it has consumed to zero and advances `tail`.
//!   Because zero means "empty slot" to the scanning host, payload zeros are
//!   escaped - see [`codec`].
//!
//! Each index is written by exactly one side using a single aligned word
//! store, so no locks are needed.  A full transmit ring is reported to the
//! caller ([`Error::BufferFull`]) and it is up to the caller to retry or drop
//! the byte.
//!
//! Where the rings are is published in a [`port::PortDescriptor`], which
//! the application places at a location known to the host.
//!
//! ## Modules
//!
//! - [`port`] - The transport facade used by target firmware
//! - [`ring`] - The shared ring buffers, target and host sides
//! - [`codec`] - Zero-escape encoding for the scanned direction
//! - [`handshake`] - Magic number and notification counter
//! - [`register`] - Shared register and interrupt traits, with Cortex-M
//!   implementations
//! - [`host`] - Async host helper, built on the [`io`] traits
//! - [`io`] - Async I/O traits for debug interface access to target memory
//!
//! ## Supported Targets
//!
//! Works on ARM Cortex-M microcontrollers with strong memory ordering, with
//! SWD accessing the SRAM via the AHB bus matrix, and no data caches:
//! - Cortex-M0/M0+/M3/M4/M23/M33 (STM32, RP2040/2350, nRF52, etc.)
//!
//! Only aligned single word loads and stores are used for synchronisation, so
//! ARMv6-M targets without compare-and-swap are fine.
//!
//! ## Getting Started
//!
//! **Target setup**:
//! 1. Create a [`port::CortexMPort`] in a `static`
//! 2. Call [`port::Port::setup()`] at startup, and publish
//!    [`port::Port::descriptor()`] where the host can find it
//! 3. Call [`port::Port::notify()`] from the notification interrupt handler
//!    ([`register::DEFAULT_IRQ`] unless configured otherwise)
//! 4. Poll [`port::Port::receive_byte()`] and call [`port::Port::send_byte()`]
//!    from your main loop
//!
//! **Host setup**:
//! 1. Implement [`io::Reader`] and [`io::Writer`] for your debug probe
//! 2. Create a [`host::AsyncHostPort`], either from a known descriptor address
//!    or with explicit ring locations
//! 3. [`host::AsyncHostPort::wait_for_target()`], then
//!    [`host::AsyncHostPort::send()`] and [`host::AsyncHostPort::receive()`]
//!
//! ## Features
//!
//! Default features:
//! - `async` - Enable the async host helper and ring implementation (requires
//!   `alloc`), which is required by the Host, but not by the Target.
//!
//! Compile with `--no-default-features` to disable unnecessary async support
//! for a Target.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "async")]
extern crate alloc;

pub mod codec;
pub mod handshake;
#[cfg(feature = "async")]
pub mod host;
pub mod io;
pub mod port;
pub mod register;
pub mod ring;

pub use handshake::{MAGIC, PROTOCOL_VERSION};
pub use port::{CortexMPort, Port, PortDescriptor};

/// Transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No data available.  A normal outcome when polling.
    BufferEmpty,
    /// No free slot - retry later or drop the data
    BufferFull,
    /// Escape byte seen without its count byte.  Wait for more data.
    MalformedEscape,
    /// Buffer too small for operation
    BufferTooSmall,
    /// Index read from shared memory is out of range
    BadIndex,
    /// Shared register does not hold the protocol magic
    NoTarget,
    /// Timeout waiting for the target
    Timeout,
    /// Invalid operation, for example consuming from a producer's ring
    InvalidOperation,
    /// Descriptor or ring not initialized
    Uninit,
    /// Ring address not aligned
    NotAligned,
    /// I/O error
    Io,
}

/// Type to represent the result of a transport operation
pub type Result<T> = core::result::Result<T, Error>;
