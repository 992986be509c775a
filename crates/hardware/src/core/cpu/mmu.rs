//! Page table walker.
//!
//! Three-mode translation driven by `satp`: bare (identity), Sv32 on
//! 32-bit machines, Sv39/Sv48 on 64-bit machines. The walker:
//! 1. Substitutes MPP for the privilege on data accesses when
//!    `mstatus.MPRV` is set.
//! 2. Rejects non-canonical Sv39/Sv48 virtual addresses.
//! 3. Checks V/R/W/X/U at the leaf, honouring `mstatus.SUM` and
//!    `mstatus.MXR`.
//! 4. Sets the A bit (and D on writes) in place when clear.
//!
//! All failures resolve to the page fault matching the access class, with
//! the faulting virtual address as the trap value.

use tracing::trace;

use crate::common::constants::PAGE_SHIFT;
use crate::common::data::AccessType;
use crate::common::error::Trap;
use crate::core::arch::csr::{
    MSTATUS_MPP_SHIFT, MSTATUS_MPRV, MSTATUS_MXR, MSTATUS_SUM,
};
use crate::core::arch::mode::PrivilegeMode;

/// PTE valid bit.
const PTE_V: u64 = 1 << 0;
/// PTE user-accessible bit.
const PTE_U: u64 = 1 << 4;
/// PTE accessed bit.
const PTE_A: u64 = 1 << 6;
/// PTE dirty bit.
const PTE_D: u64 = 1 << 7;
/// Bit position of the PPN field in a PTE.
const PTE_PPN_SHIFT: u64 = 10;

impl super::Cpu {
    /// Translates a virtual address, or fails with the access-matching page
    /// fault. On success the returned physical address composes the leaf
    /// PPN (at whatever level the leaf sat, so superpages fall out
    /// naturally) with the low virtual bits.
    pub(crate) fn get_phys_addr(&mut self, vaddr: u64, access: AccessType) -> Result<u64, Trap> {
        let priv_mode = if self.mstatus & MSTATUS_MPRV != 0 && access != AccessType::Fetch {
            PrivilegeMode::from_bits(((self.mstatus >> MSTATUS_MPP_SHIFT) & 3) as u8)
        } else {
            self.priv_mode
        };

        // A 32-bit machine addresses 32 bits whatever the storage holds.
        let vaddr = if self.max_xlen == 32 {
            vaddr & 0xffff_ffff
        } else {
            vaddr
        };

        if priv_mode == PrivilegeMode::Machine {
            return Ok(self.truncate_no_translate(vaddr));
        }

        let (levels, pte_size_log2, pte_addr_bits): (u32, u32, u32);
        if self.max_xlen == 32 {
            if self.satp >> 31 == 0 {
                return Ok(self.truncate_no_translate(vaddr));
            }
            // Sv32
            levels = 2;
            pte_size_log2 = 2;
            pte_addr_bits = 22;
        } else {
            let mode = (self.satp >> 60) & 0xf;
            if mode == 0 {
                return Ok(self.truncate_no_translate(vaddr));
            }
            // Sv39 (mode 8) or Sv48 (mode 9): sign-extended VA required.
            levels = (mode as u32) - 8 + 3;
            pte_size_log2 = 3;
            let vaddr_shift = 64 - (PAGE_SHIFT as u32 + levels * 9);
            if ((vaddr << vaddr_shift) as i64 >> vaddr_shift) as u64 != vaddr {
                return Err(Trap::page_fault(access, vaddr));
            }
            pte_addr_bits = 44;
        }

        let mut pte_addr = (self.satp & ((1u64 << pte_addr_bits) - 1)) << PAGE_SHIFT;
        let pte_bits = 12 - pte_size_log2;
        let pte_mask = (1u64 << pte_bits) - 1;
        for i in 0..levels {
            let vaddr_shift = PAGE_SHIFT as u32 + pte_bits * (levels - 1 - i);
            let pte_idx = (vaddr >> vaddr_shift) & pte_mask;
            pte_addr += pte_idx << pte_size_log2;
            let mut pte = if pte_size_log2 == 2 {
                u64::from(self.mem_map.phys_read_u32(pte_addr))
            } else {
                self.mem_map.phys_read_u64(pte_addr)
            };
            if pte & PTE_V == 0 {
                return Err(Trap::page_fault(access, vaddr));
            }
            let paddr = (pte >> PTE_PPN_SHIFT) << PAGE_SHIFT;
            let mut xwr = (pte >> 1) & 7;
            if xwr == 0 {
                // Pointer to the next level; a pointer at the last level
                // falls out of the loop and faults.
                pte_addr = paddr;
                continue;
            }
            // W without R is reserved.
            if xwr == 2 || xwr == 6 {
                return Err(Trap::page_fault(access, vaddr));
            }
            if priv_mode == PrivilegeMode::Supervisor {
                if pte & PTE_U != 0 && self.mstatus & MSTATUS_SUM == 0 {
                    return Err(Trap::page_fault(access, vaddr));
                }
            } else if pte & PTE_U == 0 {
                return Err(Trap::page_fault(access, vaddr));
            }
            // MXR folds X into R for loads.
            if self.mstatus & MSTATUS_MXR != 0 {
                xwr |= xwr >> 2;
            }
            let required = match access {
                AccessType::Read => 1,
                AccessType::Write => 2,
                AccessType::Fetch => 4,
            };
            if xwr & required == 0 {
                return Err(Trap::page_fault(access, vaddr));
            }
            let need_write = pte & PTE_A == 0
                || (pte & PTE_D == 0 && access == AccessType::Write);
            pte |= PTE_A;
            if access == AccessType::Write {
                pte |= PTE_D;
            }
            if need_write {
                if pte_size_log2 == 2 {
                    self.mem_map.phys_write_u32(pte_addr, pte as u32);
                } else {
                    self.mem_map.phys_write_u64(pte_addr, pte);
                }
            }
            let vaddr_mask = (1u64 << vaddr_shift) - 1;
            let result = (vaddr & vaddr_mask) | (paddr & !vaddr_mask);
            trace!(vaddr, paddr = result, level = i, "page walk hit");
            return Ok(result);
        }
        Err(Trap::page_fault(access, vaddr))
    }

    /// Address mask applied when translation is off: the effective address
    /// space is `cur_xlen` bits wide.
    fn truncate_no_translate(&self, vaddr: u64) -> u64 {
        if self.cur_xlen < 64 {
            vaddr & ((1u64 << self.cur_xlen) - 1)
        } else {
            vaddr
        }
    }
}
