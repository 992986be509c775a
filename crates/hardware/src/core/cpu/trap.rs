//! Trap delivery and interrupt selection.
//!
//! Exceptions and interrupts are delivered through the same machinery:
//! 1. **Delegation:** From privilege ≤ S, a set bit in `medeleg` (or
//!    `mideleg` for interrupts) routes delivery to S-mode; otherwise to
//!    M-mode.
//! 2. **Stacking:** `xcause`/`xepc`/`xtval` are written, xPIE captures the
//!    current xIE, xIE clears, xPP captures the interrupted privilege.
//! 3. **Return:** `sret`/`mret` restore xIE from xPIE, set xPIE, drop xPP
//!    to U, and resume at `xepc`.
//!
//! Interrupt selection samples `mip & mie` against the per-privilege
//! enabled mask and takes the lowest-numbered pending bit.

use tracing::trace;

use crate::common::error::Trap;
use crate::core::arch::csr::{
    CAUSE_INTERRUPT, MSTATUS_MIE, MSTATUS_MPIE, MSTATUS_MPIE_SHIFT, MSTATUS_MPP,
    MSTATUS_MPP_SHIFT, MSTATUS_SIE, MSTATUS_SPIE, MSTATUS_SPIE_SHIFT, MSTATUS_SPP,
    MSTATUS_SPP_SHIFT, MSTATUS_SXL_SHIFT, MSTATUS_UXL_SHIFT,
};
use crate::core::arch::mode::PrivilegeMode;

impl super::Cpu {
    /// Switches privilege, flushing the TLBs and reloading the active XLEN
    /// from UXL/SXL/MXL when the mode actually changes.
    pub(crate) fn set_priv(&mut self, mode: PrivilegeMode) {
        if self.priv_mode != mode {
            self.tlb_flush_all();
            if self.max_xlen >= 64 {
                let mxl = match mode {
                    PrivilegeMode::Supervisor => (self.mstatus >> MSTATUS_SXL_SHIFT) & 3,
                    PrivilegeMode::User => (self.mstatus >> MSTATUS_UXL_SHIFT) & 3,
                    PrivilegeMode::Machine => u64::from(self.mxl),
                };
                self.cur_xlen = 1 << (4 + mxl);
            }
            self.priv_mode = mode;
        }
    }

    /// Delivers a trap given the internal cause word (interrupt flag in
    /// bit 31) and trap value. `pc` must already point at the faulting
    /// instruction.
    pub(crate) fn raise_exception_cause(&mut self, cause: u32, tval: u64) {
        trace!(
            cause = format_args!("{cause:#x}"),
            tval = format_args!("{tval:#x}"),
            pc = format_args!("{:#x}", self.pc),
            priv_mode = %self.priv_mode,
            "raise exception"
        );

        // A trap always invalidates the LR reservation.
        self.load_res = None;

        let deleg = if self.priv_mode <= PrivilegeMode::Supervisor {
            if cause & CAUSE_INTERRUPT != 0 {
                (self.mideleg >> (cause & 63)) & 1 != 0
            } else {
                (self.medeleg >> cause) & 1 != 0
            }
        } else {
            false
        };

        let mut causel = u64::from(cause & 0x7fff_ffff);
        if cause & CAUSE_INTERRUPT != 0 {
            causel |= 1u64 << (self.cur_xlen - 1);
        }

        let prev = u64::from(self.priv_mode.to_bits());
        if deleg {
            self.scause = causel;
            self.sepc = self.pc;
            self.stval = tval;
            self.mstatus = (self.mstatus & !MSTATUS_SPIE)
                | (((self.mstatus >> prev) & 1) << MSTATUS_SPIE_SHIFT);
            self.mstatus = (self.mstatus & !MSTATUS_SPP) | (prev << MSTATUS_SPP_SHIFT);
            self.mstatus &= !MSTATUS_SIE;
            self.set_priv(PrivilegeMode::Supervisor);
            self.pc = self.stvec;
        } else {
            self.mcause = causel;
            self.mepc = self.pc;
            self.mtval = tval;
            self.mstatus = (self.mstatus & !MSTATUS_MPIE)
                | (((self.mstatus >> prev) & 1) << MSTATUS_MPIE_SHIFT);
            self.mstatus = (self.mstatus & !MSTATUS_MPP) | (prev << MSTATUS_MPP_SHIFT);
            self.mstatus &= !MSTATUS_MIE;
            self.set_priv(PrivilegeMode::Machine);
            self.pc = self.mtvec;
        }
    }

    /// Delivers a synchronous exception.
    pub(crate) fn raise_trap(&mut self, trap: &Trap) {
        self.raise_exception_cause(trap.code(), trap.tval());
    }

    /// Return from supervisor trap handling.
    pub(crate) fn handle_sret(&mut self) {
        let spp = (self.mstatus >> MSTATUS_SPP_SHIFT) & 1;
        let spie = (self.mstatus >> MSTATUS_SPIE_SHIFT) & 1;
        // Restore the IE bit of the privilege being returned to.
        self.mstatus = (self.mstatus & !(1 << spp)) | (spie << spp);
        self.mstatus |= MSTATUS_SPIE;
        self.mstatus &= !MSTATUS_SPP;
        self.set_priv(PrivilegeMode::from_bits(spp as u8));
        self.pc = self.sepc;
    }

    /// Return from machine trap handling.
    pub(crate) fn handle_mret(&mut self) {
        let mpp = (self.mstatus >> MSTATUS_MPP_SHIFT) & 3;
        let mpie = (self.mstatus >> MSTATUS_MPIE_SHIFT) & 1;
        self.mstatus = (self.mstatus & !(1 << mpp)) | (mpie << mpp);
        self.mstatus |= MSTATUS_MPIE;
        self.mstatus &= !MSTATUS_MPP;
        self.set_priv(PrivilegeMode::from_bits(mpp as u8));
        self.pc = self.mepc;
    }

    /// Pending interrupts that are deliverable at the current privilege.
    pub(crate) fn pending_irq_mask(&self) -> u32 {
        let pending = self.irq.mip() & self.mie;
        if pending == 0 {
            return 0;
        }
        let enabled = match self.priv_mode {
            PrivilegeMode::Machine => {
                if self.mstatus & MSTATUS_MIE != 0 {
                    !self.mideleg
                } else {
                    0
                }
            }
            PrivilegeMode::Supervisor => {
                let mut e = !self.mideleg;
                if self.mstatus & MSTATUS_SIE != 0 {
                    e |= self.mideleg;
                }
                e
            }
            PrivilegeMode::User => u32::MAX,
        };
        pending & enabled
    }

    /// Takes the lowest-numbered deliverable interrupt, if any.
    pub(crate) fn raise_interrupt(&mut self) -> bool {
        let mask = self.pending_irq_mask();
        if mask == 0 {
            return false;
        }
        let irq_num = mask.trailing_zeros();
        trace!(irq_num, "raise interrupt");
        self.raise_exception_cause(irq_num | CAUSE_INTERRUPT, 0);
        true
    }
}
