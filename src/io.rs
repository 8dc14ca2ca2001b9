//! Async I/O traits for accessing target RAM and registers from the host.
//!
//! This module contains traits for reading/writing the target's memory over
//! SWD, JTAG or any other debug interface with memory access.  The host
//! helper in [`crate::host`] is built on them.
//!
//! # Possible implementations
//!
//! - For debug probes: Issue memory access port reads and writes
//! - For testing: Read/write an in-memory image of the target's SRAM, or a
//!   real [`crate::port::Port`] in the same process
//!
//! # Address Space
//!
//! The methods use absolute addresses as they appear in the target's memory
//! map.  RAM typically starts at `0x20000000` and the system control space
//! (where the DCRDR and NVIC live) at `0xE000E000`.
//!
//! Ring indices and the shared register are accessed with aligned 4 byte
//! transfers, which implementations must perform as single word accesses so
//! the target never sees a torn index.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

/// Reader trait.
pub trait Reader {
    /// The error type returned by read operations.
    ///
    /// This allows implementations to use their own error types
    /// (e.g., `std::io::Error` for simulators, custom errors for SWD).
    type Error: core::fmt::Debug;

    /// Read bytes from the target at the specified absolute address.
    ///
    /// # Arguments
    ///
    /// * `addr` - The absolute address to read from (e.g., `0x20000200`)
    /// * `buf` - Buffer to fill with the read data
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The address is not accessible on the target
    /// - The underlying read operation fails (I/O error, communication error,
    ///   etc.)
    ///
    /// # Performance Notes
    ///
    /// The host helper reads a whole ring data area at a time when scanning,
    /// so implementations should support block reads efficiently.
    fn read(
        &mut self,
        addr: u32,
        buf: &mut [u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>> + Send;
}

/// Writer trait.
pub trait Writer {
    /// The error type returned by write operations.
    type Error: core::fmt::Debug;

    /// Write bytes to the target at the specified absolute address.
    ///
    /// # Arguments
    ///
    /// * `addr` - The absolute address to write to (e.g., `0x20000200`)
    /// * `data` - Data to write
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The address is not accessible on the target
    /// - The underlying write operation fails (I/O error, communication
    ///   error, etc.)
    fn write(
        &mut self,
        addr: u32,
        data: &[u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>> + Send;
}
