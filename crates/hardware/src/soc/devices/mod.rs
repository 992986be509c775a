//! MMIO devices.
//!
//! This module defines the contract bus-attached devices implement and the
//! controllers the machine itself provides:
//! 1. **`MmioDevice`:** Offset-relative read/write at a given width.
//!    Accesses must never block — devices doing real I/O complete it
//!    elsewhere and post results through the interrupt lines.
//! 2. **`IrqSignal`:** A handle external devices use to drive one PLIC
//!    input line.
//! 3. **Controllers:** CLINT (timer/software interrupts), PLIC (external
//!    interrupts), HTIF (console and power-off).

use std::cell::RefCell;
use std::rc::Rc;

/// Core Local Interruptor.
pub mod clint;

/// Host-Target Interface console/power-off channel.
pub mod htif;

/// Platform-Level Interrupt Controller.
pub mod plic;

pub use clint::Clint;
pub use htif::Htif;
pub use plic::Plic;

/// Contract for a device claiming an MMIO window.
///
/// `size_log2` is 0/1/2 for 8/16/32-bit accesses; the memory map only
/// forwards widths the device advertised at registration, and decomposes
/// 64-bit accesses into 32-bit halves where permitted.
pub trait MmioDevice {
    /// Reads a register at a window-relative offset.
    fn read(&mut self, offset: u64, size_log2: u32) -> u32;

    /// Writes a register at a window-relative offset.
    fn write(&mut self, offset: u64, val: u32, size_log2: u32);
}

/// A handle driving one PLIC input line.
///
/// Sources are level-sensitive: `set_irq(true)` asserts the line and
/// `set_irq(false)` releases it.
#[derive(Clone)]
pub struct IrqSignal {
    plic: Rc<RefCell<Plic>>,
    irq_num: u8,
}

impl IrqSignal {
    pub(crate) fn new(plic: Rc<RefCell<Plic>>, irq_num: u8) -> Self {
        Self { plic, irq_num }
    }

    /// The PLIC input line number this signal drives (1..=31).
    pub fn irq_num(&self) -> u8 {
        self.irq_num
    }

    /// Drives the line level.
    pub fn set_irq(&self, level: bool) {
        self.plic.borrow_mut().set_irq(self.irq_num, level);
    }
}

impl std::fmt::Debug for IrqSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrqSignal")
            .field("irq_num", &self.irq_num)
            .finish()
    }
}
