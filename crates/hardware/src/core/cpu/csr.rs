//! CSR unit.
//!
//! Reads and writes of the supervisor and machine CSR file with per-CSR
//! masks and side effects:
//! - `mstatus`/`sstatus` writes flush the TLBs when a translation-relevant
//!   field changes (MPRV, SUM, MXR, or MPP while MPRV is set).
//! - `satp` accepts only the published modes (others leave it unchanged),
//!   flushes the TLBs, and asks the interpreter to restart its block.
//! - `misa` MXL rewrites change the active XLEN and exit the interpreter
//!   loop so the dispatcher can re-enter the right instantiation.
//! - Any floating-point CSR write dirties the FP state.
//!
//! Reads of unimplemented CSRs fail as illegal; the `time` CSR is expected
//! to be unimplemented and is excluded from the diagnostic log.

use tracing::debug;

use crate::core::arch::csr::*;

/// Side effect of an accepted CSR write, beyond the register update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CsrEffect {
    /// Plain update.
    None,
    /// The active XLEN changed; the interpreter must exit its loop.
    RestartLoop,
    /// The TLBs were flushed; the interpreter must end the current block.
    TlbFlushed,
}

impl super::Cpu {
    /// Composes the full `mstatus` view: stored bits, the live FS field,
    /// and the SD summary bit at the XLEN MSB.
    pub(crate) fn get_mstatus(&self, mask: u64) -> u64 {
        let mut val = self.mstatus | (u64::from(self.fs) << MSTATUS_FS_SHIFT);
        val &= mask;
        let sd =
            (val & MSTATUS_FS) == MSTATUS_FS || (val & MSTATUS_XS) == MSTATUS_XS;
        if sd {
            val |= 1u64 << (self.cur_xlen - 1);
        }
        val
    }

    /// Applies an `mstatus` write: TLB flush on MMU-relevant changes, FS
    /// extraction, and UXL/SXL acceptance (valid encodings only).
    pub(crate) fn set_mstatus(&mut self, val: u64) {
        let diff = self.mstatus ^ val;
        if diff & (MSTATUS_MPRV | MSTATUS_SUM | MSTATUS_MXR) != 0
            || (self.mstatus & MSTATUS_MPRV != 0 && diff & MSTATUS_MPP != 0)
        {
            self.tlb_flush_all();
        }
        self.fs = ((val >> MSTATUS_FS_SHIFT) & 3) as u8;

        let mut mask = MSTATUS_MASK & !MSTATUS_FS;
        if self.max_xlen >= 64 {
            let max_mxl = u64::from(mxl_from_xlen(self.max_xlen));
            let uxl = (val >> MSTATUS_UXL_SHIFT) & 3;
            if uxl >= 1 && uxl <= max_mxl {
                mask |= MSTATUS_UXL_MASK;
            }
            let sxl = (val >> MSTATUS_SXL_SHIFT) & 3;
            if sxl >= 1 && sxl <= max_mxl {
                mask |= MSTATUS_SXL_MASK;
            }
        }
        self.mstatus = (self.mstatus & !mask) | (val & mask);
    }

    fn set_frm(&mut self, val: u8) {
        self.frm = if val >= 5 { 0 } else { val };
    }

    /// Resolves an instruction rounding-mode field: 7 selects the dynamic
    /// `frm`, 5 and 6 are reserved and yield `None` (illegal instruction).
    pub(crate) fn insn_rounding_mode(
        &self,
        rm_field: u32,
    ) -> Option<crate::core::fpu::RoundingMode> {
        let rm = if rm_field == 7 {
            u32::from(self.frm)
        } else {
            rm_field
        };
        crate::core::fpu::RoundingMode::from_bits(rm as u8)
    }

    fn counter_enabled(&self, csr: u32) -> bool {
        use crate::core::arch::mode::PrivilegeMode;
        if self.priv_mode == PrivilegeMode::Machine {
            return true;
        }
        let counteren = if self.priv_mode == PrivilegeMode::User {
            self.scounteren
        } else {
            self.mcounteren
        };
        (counteren >> (csr & 0x1f)) & 1 != 0
    }

    /// Reads a CSR. `will_write` marks accesses that will be followed by a
    /// write, so read-only CSR numbers can be rejected up front.
    pub(crate) fn csr_read(&mut self, csr: u32, will_write: bool) -> Result<u64, ()> {
        if (csr & 0xc00) == 0xc00 && will_write {
            // Read-only CSR number space.
            return Err(());
        }
        if u32::from(self.priv_mode.to_bits()) < ((csr >> 8) & 3) {
            return Err(());
        }
        let val = match csr {
            FFLAGS => {
                if self.fs == 0 {
                    return Err(());
                }
                u64::from(self.fflags)
            }
            FRM => {
                if self.fs == 0 {
                    return Err(());
                }
                u64::from(self.frm)
            }
            FCSR => {
                if self.fs == 0 {
                    return Err(());
                }
                u64::from(self.fflags) | (u64::from(self.frm) << 5)
            }
            CYCLE | INSTRET => {
                if !self.counter_enabled(csr) {
                    return self.invalid_csr_read(csr);
                }
                self.insn_counter
            }
            0xc80 | 0xc82 => {
                // cycleh/instreth exist only in 32-bit mode.
                if self.cur_xlen != 32 || !self.counter_enabled(csr) {
                    return self.invalid_csr_read(csr);
                }
                self.insn_counter >> 32
            }
            SSTATUS => self.get_mstatus(SSTATUS_MASK),
            SIE => u64::from(self.mie & self.mideleg),
            STVEC => self.stvec,
            SCOUNTEREN => u64::from(self.scounteren),
            SSCRATCH => self.sscratch,
            SEPC => self.sepc,
            SCAUSE => self.scause,
            STVAL => self.stval,
            SIP => u64::from(self.irq.mip() & self.mideleg),
            SATP => self.satp,
            MSTATUS => self.get_mstatus(u64::MAX),
            MISA => u64::from(self.misa_ext) | (u64::from(self.mxl) << (self.cur_xlen - 2)),
            MEDELEG => u64::from(self.medeleg),
            MIDELEG => u64::from(self.mideleg),
            MIE => u64::from(self.mie),
            MTVEC => self.mtvec,
            MCOUNTEREN => u64::from(self.mcounteren),
            MSCRATCH => self.mscratch,
            MEPC => self.mepc,
            MCAUSE => self.mcause,
            MTVAL => self.mtval,
            MIP => u64::from(self.irq.mip()),
            MCYCLE | MINSTRET => self.insn_counter,
            0xb80 | 0xb82 => {
                if self.cur_xlen != 32 {
                    return self.invalid_csr_read(csr);
                }
                self.insn_counter >> 32
            }
            MHARTID => self.mhartid,
            _ => return self.invalid_csr_read(csr),
        };
        Ok(val)
    }

    fn invalid_csr_read(&self, csr: u32) -> Result<u64, ()> {
        // The time counter is expected to be emulated by firmware; stay
        // quiet about it.
        if csr != TIME && csr != 0xc81 {
            debug!(csr, "invalid CSR read");
        }
        Err(())
    }

    /// Writes a CSR, applying masks and side effects. `Err(())` means the
    /// access was illegal.
    pub(crate) fn csr_write(&mut self, csr: u32, val: u64) -> Result<CsrEffect, ()> {
        match csr {
            FFLAGS => {
                self.fflags = (val & 0x1f) as u32;
                self.fs = 3;
            }
            FRM => {
                self.set_frm((val & 7) as u8);
                self.fs = 3;
            }
            FCSR => {
                self.set_frm(((val >> 5) & 7) as u8);
                self.fflags = (val & 0x1f) as u32;
                self.fs = 3;
            }
            SSTATUS => {
                let merged = (self.mstatus & !SSTATUS_MASK) | (val & SSTATUS_MASK);
                self.set_mstatus(merged);
            }
            SIE => {
                let mask = self.mideleg;
                self.mie = (self.mie & !mask) | (val as u32 & mask);
                self.irq.mirror_mie(self.mie);
            }
            STVEC => self.stvec = val & !3,
            SCOUNTEREN => self.scounteren = val as u32 & COUNTEREN_MASK,
            SSCRATCH => self.sscratch = val,
            SEPC => self.sepc = val & !1,
            SCAUSE => self.scause = val,
            STVAL => self.stval = val,
            SIP => {
                let mask = self.mideleg;
                self.irq.write_mip_masked(mask, val as u32);
            }
            SATP => {
                // No ASID implemented; unpublished modes leave the mode
                // field unchanged.
                if self.max_xlen == 32 {
                    let new_mode = (val >> 31) & 1;
                    self.satp = (val & ((1u64 << 22) - 1)) | (new_mode << 31);
                } else {
                    let mut mode = self.satp >> SATP_MODE_SHIFT;
                    let new_mode = (val >> SATP_MODE_SHIFT) & 0xf;
                    if new_mode == SATP_MODE_BARE
                        || (SATP_MODE_SV39..=SATP_MODE_SV48).contains(&new_mode)
                    {
                        mode = new_mode;
                    }
                    self.satp = (val & ((1u64 << 44) - 1)) | (mode << SATP_MODE_SHIFT);
                }
                self.tlb_flush_all();
                return Ok(CsrEffect::TlbFlushed);
            }
            MSTATUS => self.set_mstatus(val),
            MISA => {
                if self.max_xlen >= 64 {
                    let new_mxl = ((val >> (self.cur_xlen - 2)) & 3) as u8;
                    if new_mxl >= 1 && new_mxl <= mxl_from_xlen(self.max_xlen) {
                        // misa is only writable in M-mode, so cur_xlen
                        // follows mxl directly.
                        if self.mxl != new_mxl {
                            self.mxl = new_mxl;
                            self.cur_xlen = 1 << (new_mxl + 4);
                            return Ok(CsrEffect::RestartLoop);
                        }
                    }
                }
            }
            MEDELEG => {
                let mask = (1u32 << (crate::common::error::CAUSE_STORE_PAGE_FAULT + 1)) - 1;
                self.medeleg = (self.medeleg & !mask) | (val as u32 & mask);
            }
            MIDELEG => {
                let mask = MIP_SSIP | MIP_STIP | MIP_SEIP;
                self.mideleg = (self.mideleg & !mask) | (val as u32 & mask);
            }
            MIE => {
                let mask = MIP_MSIP | MIP_MTIP | MIP_SSIP | MIP_STIP | MIP_SEIP;
                self.mie = (self.mie & !mask) | (val as u32 & mask);
                self.irq.mirror_mie(self.mie);
            }
            MTVEC => self.mtvec = val & !3,
            MCOUNTEREN => self.mcounteren = val as u32 & COUNTEREN_MASK,
            MSCRATCH => self.mscratch = val,
            MEPC => self.mepc = val & !1,
            MCAUSE => self.mcause = val,
            MTVAL => self.mtval = val,
            MIP => {
                let mask = MIP_SSIP | MIP_STIP;
                self.irq.write_mip_masked(mask, val as u32);
            }
            _ => {
                debug!(csr, "invalid CSR write");
                return Err(());
            }
        }
        Ok(CsrEffect::None)
    }
}
