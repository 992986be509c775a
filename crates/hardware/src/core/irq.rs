//! Shared interrupt lines.
//!
//! `mip` is the single word written from outside the hart: the CLINT raises
//! MTIP/MSIP, the PLIC raises MEIP/SEIP, and embedders post completions for
//! asynchronous device work. The hart samples it only at block boundaries,
//! so plain acquire/release atomics are sufficient — there is no
//! per-instruction ordering requirement.
//!
//! `mie` is mirrored here by the CSR unit so that a `set_mip` from a device
//! can wake the hart from WFI exactly when a newly pending interrupt is
//! enabled.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Interrupt lines shared between the hart, the interrupt controllers, and
/// the embedder.
#[derive(Debug, Default)]
pub struct IrqLines {
    mip: AtomicU32,
    mie: AtomicU32,
    power_down: AtomicBool,
}

impl IrqLines {
    /// Creates cleared lines.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the pending bits.
    #[inline]
    pub fn mip(&self) -> u32 {
        self.mip.load(Ordering::Acquire)
    }

    /// Snapshot of the mirrored enable bits.
    #[inline]
    pub fn mie(&self) -> u32 {
        self.mie.load(Ordering::Acquire)
    }

    /// Sets pending bits; leaves power-down if any enabled bit became pending.
    pub fn set_mip(&self, mask: u32) {
        let prev = self.mip.fetch_or(mask, Ordering::AcqRel);
        if (prev | mask) & self.mie() != 0 {
            self.power_down.store(false, Ordering::Release);
        }
    }

    /// Clears pending bits.
    pub fn reset_mip(&self, mask: u32) {
        self.mip.fetch_and(!mask, Ordering::AcqRel);
    }

    /// Replaces the bits selected by `mask` with those of `val`.
    pub fn write_mip_masked(&self, mask: u32, val: u32) {
        let cur = self.mip.load(Ordering::Acquire);
        self.mip
            .store((cur & !mask) | (val & mask), Ordering::Release);
        if val & mask & self.mie() != 0 {
            self.power_down.store(false, Ordering::Release);
        }
    }

    /// Mirrors the hart's `mie`; called by the CSR unit on every change.
    pub fn mirror_mie(&self, mie: u32) {
        self.mie.store(mie, Ordering::Release);
        if self.mip() & mie != 0 {
            self.power_down.store(false, Ordering::Release);
        }
    }

    /// True while the hart is WFI-quiesced.
    #[inline]
    pub fn power_down(&self) -> bool {
        self.power_down.load(Ordering::Acquire)
    }

    /// Sets or clears the power-down flag.
    pub fn set_power_down(&self, value: bool) {
        self.power_down.store(value, Ordering::Release);
    }
}
