//! Hart state and public surface.
//!
//! The `Cpu` owns everything one hart needs: the register files, the CSR
//! state, the three TLBs, and the physical memory map. The interpreter,
//! MMU, CSR unit, and trap controller are implemented as `Cpu` methods in
//! the submodules; this module holds the state definition, reset values,
//! and the embedder-facing API (`run`, `set_mip`, counters).

/// Compressed (C extension) execution.
pub mod compressed;

/// CSR unit: reads, writes, masks, and side effects.
pub mod csr;

/// Interpreter main loop and 32-bit opcode dispatch.
pub mod interp;

/// Fast-path and slow-path memory access.
pub mod memory;

/// Page table walker.
pub mod mmu;

/// TLB arrays and flush operations.
pub mod tlb;

/// Trap delivery and interrupt selection.
pub mod trap;

use std::sync::Arc;

use crate::common::constants::TLB_SIZE;
use crate::core::arch::csr::{
    mxl_from_xlen, MISA_A, MISA_C, MISA_D, MISA_F, MISA_I, MISA_M, MISA_S, MISA_U,
    MSTATUS_SXL_SHIFT, MSTATUS_UXL_SHIFT,
};
use crate::core::arch::mode::PrivilegeMode;
use crate::core::arch::xlen::{Rv32, Rv64};
use crate::core::irq::IrqLines;
use crate::soc::memmap::{PhysMemMap, RamHandle};

use self::tlb::TlbEntry;

/// Widest register width a machine is built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseIsa {
    /// 32-bit machine (Sv32 paging).
    Rv32,
    /// 64-bit machine (Sv39/Sv48 paging).
    Rv64,
}

impl BaseIsa {
    /// Register width in bits.
    pub fn bits(self) -> u32 {
        match self {
            BaseIsa::Rv32 => 32,
            BaseIsa::Rv64 => 64,
        }
    }
}

/// One RISC-V hart.
///
/// Registers are stored 64 bits wide; in 32-bit mode every result is
/// truncated and sign-extended on write, so the upper halves only hold
/// meaningful data while `cur_xlen == 64` (see `core::arch::xlen`).
pub struct Cpu {
    pub(crate) pc: u64,
    pub(crate) regs: [u64; 32],
    pub(crate) fregs: [u64; 32],
    pub(crate) fflags: u32,
    pub(crate) frm: u8,

    /// Active register width (32 or 64), changed by misa/UXL/SXL rewrites.
    pub(crate) cur_xlen: u32,
    pub(crate) max_xlen: u32,
    pub(crate) priv_mode: PrivilegeMode,
    /// mstatus.FS value; every FP result forces it to Dirty (3).
    pub(crate) fs: u8,
    /// MXL field of misa.
    pub(crate) mxl: u8,

    /// Retired instructions plus delivered traps; exported as cycle/instret.
    pub(crate) insn_counter: u64,
    /// Remaining budget inside the interpreter loop.
    pub(crate) n_cycles: i64,
    /// `insn_counter` at loop entry plus the budget; the live counter is
    /// `insn_counter_addend - n_cycles`.
    pub(crate) insn_counter_addend: u64,

    pub(crate) irq: Arc<IrqLines>,

    // CSR file. mstatus is stored without its FS field (held in `fs`).
    pub(crate) mstatus: u64,
    pub(crate) mtvec: u64,
    pub(crate) mscratch: u64,
    pub(crate) mepc: u64,
    pub(crate) mcause: u64,
    pub(crate) mtval: u64,
    pub(crate) mhartid: u64,
    pub(crate) misa_ext: u32,
    pub(crate) mie: u32,
    pub(crate) medeleg: u32,
    pub(crate) mideleg: u32,
    pub(crate) mcounteren: u32,
    pub(crate) stvec: u64,
    pub(crate) sscratch: u64,
    pub(crate) sepc: u64,
    pub(crate) scause: u64,
    pub(crate) stval: u64,
    pub(crate) satp: u64,
    pub(crate) scounteren: u32,

    /// Reservation from the last LR; cleared by SC, traps, and TLB flushes.
    pub(crate) load_res: Option<u64>,

    pub(crate) mem_map: PhysMemMap,

    pub(crate) tlb_read: [TlbEntry; TLB_SIZE],
    pub(crate) tlb_write: [TlbEntry; TLB_SIZE],
    pub(crate) tlb_code: [TlbEntry; TLB_SIZE],
}

impl Cpu {
    /// Creates a hart at its reset state: `pc = 0x1000`, machine mode,
    /// XLEN at the machine maximum, TLBs empty, IMAFDCSU in misa.
    pub fn new(mem_map: PhysMemMap, base: BaseIsa, irq: Arc<IrqLines>) -> Self {
        let max_xlen = base.bits();
        let mxl = mxl_from_xlen(max_xlen);
        let mstatus = if max_xlen >= 64 {
            (u64::from(mxl) << MSTATUS_UXL_SHIFT) | (u64::from(mxl) << MSTATUS_SXL_SHIFT)
        } else {
            0
        };
        Self {
            pc: 0x1000,
            regs: [0; 32],
            fregs: [0; 32],
            fflags: 0,
            frm: 0,
            cur_xlen: max_xlen,
            max_xlen,
            priv_mode: PrivilegeMode::Machine,
            fs: 0,
            mxl,
            insn_counter: 0,
            n_cycles: 0,
            insn_counter_addend: 0,
            irq,
            mstatus,
            mtvec: 0,
            mscratch: 0,
            mepc: 0,
            mcause: 0,
            mtval: 0,
            mhartid: 0,
            misa_ext: MISA_S | MISA_U | MISA_I | MISA_M | MISA_A | MISA_F | MISA_D | MISA_C,
            mie: 0,
            medeleg: 0,
            mideleg: 0,
            mcounteren: 0,
            stvec: 0,
            sscratch: 0,
            sepc: 0,
            scause: 0,
            stval: 0,
            satp: 0,
            scounteren: 0,
            load_res: None,
            mem_map,
            tlb_read: [TlbEntry::EMPTY; TLB_SIZE],
            tlb_write: [TlbEntry::EMPTY; TLB_SIZE],
            tlb_code: [TlbEntry::EMPTY; TLB_SIZE],
        }
    }

    /// Executes up to `budget` instructions, returning at WFI, on an XLEN
    /// change boundary, or once the budget is consumed.
    pub fn run(&mut self, budget: u64) {
        let timeout = self.insn_counter.wrapping_add(budget);
        while !self.irq.power_down() && (timeout.wrapping_sub(self.insn_counter) as i64) > 0 {
            let n = timeout.wrapping_sub(self.insn_counter);
            match self.cur_xlen {
                32 => interp::interp::<Rv32>(self, n),
                _ => interp::interp::<Rv64>(self, n),
            }
        }
    }

    /// Retired-instruction count (the cycle/instret CSR value).
    pub fn cycles(&self) -> u64 {
        self.insn_counter
    }

    /// Raises pending interrupt bits; wakes the hart from WFI when any
    /// newly pending bit is enabled.
    pub fn set_mip(&mut self, mask: u32) {
        self.irq.set_mip(mask);
    }

    /// Clears pending interrupt bits.
    pub fn reset_mip(&mut self, mask: u32) {
        self.irq.reset_mip(mask);
    }

    /// Snapshot of the pending interrupt bits.
    pub fn mip(&self) -> u32 {
        self.irq.mip()
    }

    /// True while the hart is WFI-quiesced.
    pub fn power_down(&self) -> bool {
        self.irq.power_down()
    }

    /// The live misa extension bits.
    pub fn misa(&self) -> u32 {
        self.misa_ext
    }

    /// Register width the machine was built with.
    pub fn max_xlen(&self) -> u32 {
        self.max_xlen
    }

    /// Currently active register width.
    pub fn cur_xlen(&self) -> u32 {
        self.cur_xlen
    }

    /// Program counter.
    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// Sets the program counter.
    pub fn set_pc(&mut self, pc: u64) {
        self.pc = pc;
    }

    /// Reads integer register `i`; `x0` is always zero.
    pub fn reg(&self, i: usize) -> u64 {
        self.regs[i]
    }

    /// Writes integer register `i`; writes to `x0` are discarded.
    pub fn set_reg(&mut self, i: usize, val: u64) {
        if i != 0 {
            self.regs[i] = val;
        }
    }

    /// Reads floating-point register `i` (raw bits).
    pub fn freg(&self, i: usize) -> u64 {
        self.fregs[i]
    }

    /// Writes floating-point register `i` (raw bits).
    pub fn set_freg(&mut self, i: usize, val: u64) {
        self.fregs[i] = val;
    }

    /// Current privilege mode.
    pub fn priv_mode(&self) -> PrivilegeMode {
        self.priv_mode
    }

    /// Switches privilege mode with the architectural side effects
    /// (TLB flush, XLEN reload from UXL/SXL).
    pub fn set_priv_mode(&mut self, mode: PrivilegeMode) {
        self.set_priv(mode);
    }

    /// The physical memory map.
    pub fn mem_map(&self) -> &PhysMemMap {
        &self.mem_map
    }

    /// Mutable access to the physical memory map.
    pub fn mem_map_mut(&mut self) -> &mut PhysMemMap {
        &mut self.mem_map
    }

    /// Shared interrupt lines.
    pub fn irq_lines(&self) -> &Arc<IrqLines> {
        &self.irq
    }

    /// CSR read through the architectural path (no write intent).
    /// Returns `None` for unimplemented CSRs or insufficient privilege.
    pub fn read_csr(&mut self, csr: u32) -> Option<u64> {
        self.csr_read(csr, false).ok()
    }

    /// CSR write through the architectural path, applying side effects.
    /// Returns false when the write is illegal.
    pub fn write_csr(&mut self, csr: u32, val: u64) -> bool {
        self.csr_write(csr, val).is_ok()
    }

    /// Invalidates write-TLB entries whose target lies within the given
    /// window of a RAM range. Used after a consumer drains dirty bits so
    /// later stores take the slow path again and re-mark pages.
    pub fn flush_tlb_write_range_ram(&mut self, h: RamHandle, offset: u64, len: u64) {
        let ram_idx = h.0 as u32;
        for e in &mut self.tlb_write {
            if e.vaddr != TlbEntry::EMPTY.vaddr && e.ram == ram_idx {
                let page_off = e.vaddr.wrapping_add(e.addend);
                if page_off < offset + len && page_off + crate::common::PAGE_SIZE > offset {
                    *e = TlbEntry::EMPTY;
                }
            }
        }
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("pc", &format_args!("{:#x}", self.pc))
            .field("priv", &self.priv_mode)
            .field("cur_xlen", &self.cur_xlen)
            .field("insn_counter", &self.insn_counter)
            .finish_non_exhaustive()
    }
}
