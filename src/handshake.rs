//! Session handshake through the shared register.
//!
//! The target announces itself by writing [`MAGIC`] into the shared register
//! (DCRDR on Cortex-M).  Each time the host raises the notification interrupt
//! the target bumps a counter and writes `MAGIC + counter`, so the host can
//! recognise a compatible target from the top 24 bits and see it is alive
//! from the bottom 8.
//!
//! ```text
//! Uninitialized --setup--> Announced --first host data--> Active
//! ```
//!
//! `Active` is only recorded for information.  The target services its rings
//! in any state, and a target whose host never appears stays `Announced`.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::register::SharedRegister;

/// Protocol identifier written to the shared register.  The low byte is zero
/// and carries the notification counter.
pub const MAGIC: u32 = 0xDB19_6500;

/// Bits of the shared register carrying the counter.
pub const COUNTER_MASK: u32 = 0xFF;

/// Version of the ring layout and descriptor published to the host.
pub const PROTOCOL_VERSION: u32 = 1;

/// Handshake state, as far as the target can observe it.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    #[default]
    Uninitialized = 0,
    Announced = 1,
    Active = 2,
}

impl From<u8> for HandshakeState {
    fn from(value: u8) -> Self {
        match value {
            1 => HandshakeState::Announced,
            2 => HandshakeState::Active,
            _ => HandshakeState::Uninitialized,
        }
    }
}

/// Optional observer run on each notification, for example to toggle a
/// diagnostic LED.  Kept separate from the protocol so boards without an
/// indicator need nothing.
///
/// Implemented for any `FnMut(u32)`, which is passed the new counter.
pub trait NotifyObserver {
    fn notified(&mut self, counter: u32);
}

impl<F: FnMut(u32)> NotifyObserver for F {
    fn notified(&mut self, counter: u32) {
        self(counter)
    }
}

/// Value written to the shared register for a given counter.
pub const fn register_value(counter: u32) -> u32 {
    MAGIC + (counter & COUNTER_MASK)
}

/// Host: Check a shared register value for the protocol magic, returning the
/// published counter if it matches.
pub fn parse_register(value: u32) -> Option<u8> {
    if value & !COUNTER_MASK == MAGIC {
        Some((value & COUNTER_MASK) as u8)
    } else {
        None
    }
}

/// Handshake state machine, owning the shared register.
///
/// The counter is only written from setup (with the interrupt disabled) and
/// from the interrupt handler, so plain atomic loads and stores suffice.
pub struct Handshake<R: SharedRegister> {
    register: R,
    counter: AtomicU32,
    notifications: AtomicU32,
    state: AtomicU8,
}

impl<R: SharedRegister> Handshake<R> {
    pub const fn new(register: R) -> Self {
        Self {
            register,
            counter: AtomicU32::new(0),
            notifications: AtomicU32::new(0),
            state: AtomicU8::new(HandshakeState::Uninitialized as u8),
        }
    }

    /// Reset the counter and announce the target by writing [`MAGIC`].
    pub fn announce(&self) {
        self.counter.store(0, Ordering::Relaxed);
        self.register.write(register_value(0));
        self.state
            .store(HandshakeState::Announced as u8, Ordering::Release);
        debug!("Announced target with {MAGIC:#010X}");
    }

    /// Interrupt: Advance the counter and republish it.  Returns the new
    /// counter.
    pub fn notify(&self) -> u32 {
        let counter = self.counter.load(Ordering::Relaxed).wrapping_add(1);
        self.counter.store(counter, Ordering::Relaxed);
        self.register.write(register_value(counter));

        let notifications = self.notifications.load(Ordering::Relaxed);
        self.notifications
            .store(notifications.wrapping_add(1), Ordering::Relaxed);

        trace!("Notification {counter}");
        counter
    }

    /// Record that the host has been seen.  Returns true on the transition
    /// from `Announced`.
    pub fn mark_active(&self) -> bool {
        if self.state() == HandshakeState::Announced {
            self.state
                .store(HandshakeState::Active as u8, Ordering::Release);
            info!("Host active");
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> HandshakeState {
        HandshakeState::from(self.state.load(Ordering::Acquire))
    }

    /// Notifications since the last announcement.
    pub fn counter(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Notifications since power on.  Not reset by [`Self::announce()`].
    pub fn notifications(&self) -> u32 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Current contents of the shared register.
    pub fn register_value(&self) -> u32 {
        self.register.read()
    }
}
