//! Access to the debug data register and the notification interrupt.
//!
//! The transport only needs two capabilities from the chip:
//! - [`SharedRegister`] - atomic read/write of one word that both the target
//!   and the host can access.  On Cortex-M this is the Debug Core Register
//!   Data Register (DCRDR), see [`Dcrdr`].
//! - [`InterruptControl`] - enable, disable and pend the interrupt the host
//!   raises to notify the target.  On Cortex-M this is an NVIC line, see
//!   [`Nvic`].
//!
//! Both traits take `&self` so the implementations can be held in a `static`
//! shared between thread mode and the interrupt handler.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

/// Debug Core Register Data Register address on ARMv6-M/ARMv7-M/ARMv8-M.
pub const DCRDR_ADDR: u32 = 0xE000_EDF8;

/// NVIC Interrupt Set-Enable Registers.
pub const NVIC_ISER_ADDR: u32 = 0xE000_E100;

/// NVIC Interrupt Clear-Enable Registers.
pub const NVIC_ICER_ADDR: u32 = 0xE000_E180;

/// NVIC Interrupt Set-Pending Registers.
pub const NVIC_ISPR_ADDR: u32 = 0xE000_E200;

/// Default notification interrupt: the FSMC vector on STM32F1, which is
/// rarely used on parts without external memory.
pub const DEFAULT_IRQ: u16 = 48;

/// A single machine word shared with the host.
pub trait SharedRegister {
    /// Atomic read
    fn read(&self) -> u32;

    /// Atomic write
    fn write(&self, value: u32);
}

/// Control of the interrupt used for host notifications.
pub trait InterruptControl {
    /// Interrupt number, as published to the host.
    fn irq(&self) -> u16;

    /// Allow the interrupt to be taken.  Nothing happens until interrupts are
    /// globally enabled.
    fn enable(&self);

    /// Prevent the interrupt being taken.
    fn disable(&self);

    /// Mark the interrupt pending, as the host does when it has written data.
    fn pend(&self);
}

/// Register address and bit for an interrupt within an NVIC register bank.
pub const fn nvic_bit(bank: u32, irq: u16) -> (u32, u32) {
    let addr = bank + ((irq as u32 >> 5) * 4);
    let bit = 1 << (irq as u32 & 0x1F);
    (addr, bit)
}

/// The Cortex-M DCRDR, accessed directly.  Typically used by a Target.
#[derive(Clone, Copy)]
pub struct Dcrdr;

impl Dcrdr {
    /// Create a new Dcrdr instance.
    ///
    /// ```rust
    /// # use swd_serial::register::Dcrdr;
    /// static REGISTER: Dcrdr = Dcrdr::new();
    /// ```
    // We need a new() rather than a default() as it must be const.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {}
    }
}

impl SharedRegister for Dcrdr {
    fn read(&self) -> u32 {
        unsafe { core::ptr::read_volatile(DCRDR_ADDR as *const u32) }
    }

    fn write(&self, value: u32) {
        unsafe { core::ptr::write_volatile(DCRDR_ADDR as *mut u32, value) };
    }
}

/// A Cortex-M NVIC interrupt line, accessed directly.  Typically used by a
/// Target.
#[derive(Clone, Copy)]
pub struct Nvic {
    irq: u16,
}

impl Nvic {
    pub const fn new(irq: u16) -> Self {
        Self { irq }
    }

    fn set_bit(&self, bank: u32) {
        let (addr, bit) = nvic_bit(bank, self.irq);
        // Writing zero bits has no effect on these registers, so no
        // read-modify-write is needed.
        unsafe { core::ptr::write_volatile(addr as *mut u32, bit) };
    }
}

impl InterruptControl for Nvic {
    fn irq(&self) -> u16 {
        self.irq
    }

    fn enable(&self) {
        self.set_bit(NVIC_ISER_ADDR);
    }

    fn disable(&self) {
        self.set_bit(NVIC_ICER_ADDR);
    }

    fn pend(&self) {
        self.set_bit(NVIC_ISPR_ADDR);
    }
}
