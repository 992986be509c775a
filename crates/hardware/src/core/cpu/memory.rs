//! Memory access paths.
//!
//! The fast path is one TLB tag compare plus an indexed read from a RAM
//! buffer; everything else funnels into the slow path:
//! 1. **Misaligned accesses** are decomposed into aligned sub-accesses
//!    (reads OR the halves together; writes issue bytes low to high and a
//!    fault mid-sequence propagates immediately).
//! 2. **Translation** through the page walker, with the faulting address
//!    as trap value.
//! 3. **Routing:** RAM installs a TLB entry and performs the native
//!    access (marking dirty pages on writes); devices dispatch through
//!    their advertised widths; unclaimed addresses read zero and drop
//!    writes.
//!
//! Instruction fetch has its own slow path: only RAM is fetchable, and a
//! device or unclaimed range yields a fetch access fault.

use tracing::debug;

use crate::common::constants::{PAGE_MASK, PAGE_SHIFT, TLB_SIZE};
use crate::common::data::AccessType;
use crate::common::error::Trap;
use crate::soc::memmap::RangeRef;

use super::tlb::TlbEntry;

/// Expands the TLB-hit fast path for one access width.
macro_rules! tlb_read_fn {
    ($name:ident, $ty:ty, $ram_read:ident, $size_log2:expr) => {
        /// Reads a value at a virtual address through the read TLB.
        #[inline(always)]
        pub fn $name(&mut self, addr: u64) -> Result<$ty, Trap> {
            let idx = ((addr >> PAGE_SHIFT) as usize) & (TLB_SIZE - 1);
            let e = self.tlb_read[idx];
            if e.vaddr == addr & !(PAGE_MASK & !(std::mem::size_of::<$ty>() as u64 - 1)) {
                let off = addr.wrapping_add(e.addend) as usize;
                Ok(self.mem_map.ram(e.ram as usize).$ram_read(off))
            } else {
                self.read_slow(addr, $size_log2).map(|v| v as $ty)
            }
        }
    };
}

/// Expands the TLB-hit fast path for one store width.
macro_rules! tlb_write_fn {
    ($name:ident, $ty:ty, $ram_write:ident, $size_log2:expr) => {
        /// Writes a value at a virtual address through the write TLB.
        #[inline(always)]
        pub fn $name(&mut self, addr: u64, val: $ty) -> Result<(), Trap> {
            let idx = ((addr >> PAGE_SHIFT) as usize) & (TLB_SIZE - 1);
            let e = self.tlb_write[idx];
            if e.vaddr == addr & !(PAGE_MASK & !(std::mem::size_of::<$ty>() as u64 - 1)) {
                let off = addr.wrapping_add(e.addend) as usize;
                self.mem_map.ram_mut(e.ram as usize).$ram_write(off, val);
                Ok(())
            } else {
                self.write_slow(addr, u64::from(val), $size_log2)
            }
        }
    };
}

impl super::Cpu {
    tlb_read_fn!(read_u8, u8, read_u8, 0);
    tlb_read_fn!(read_u16, u16, read_u16, 1);
    tlb_read_fn!(read_u32, u32, read_u32, 2);
    tlb_read_fn!(read_u64, u64, read_u64, 3);

    tlb_write_fn!(write_u8, u8, write_u8, 0);
    tlb_write_fn!(write_u16, u16, write_u16, 1);
    tlb_write_fn!(write_u32, u32, write_u32, 2);
    tlb_write_fn!(write_u64, u64, write_u64, 3);

    /// Slow read path: misaligned decomposition, translation, routing.
    pub(crate) fn read_slow(&mut self, addr: u64, size_log2: u32) -> Result<u64, Trap> {
        let size = 1u64 << size_log2;
        let al = (addr & (size - 1)) as u32;
        if al != 0 {
            let ret = match size_log2 {
                1 => {
                    let v0 = u64::from(self.read_u8(addr)?);
                    let v1 = u64::from(self.read_u8(addr + 1)?);
                    v0 | (v1 << 8)
                }
                2 => {
                    let base = addr - u64::from(al);
                    let v0 = u64::from(self.read_u32(base)?);
                    let v1 = u64::from(self.read_u32(base + 4)?);
                    ((v0 >> (al * 8)) | (v1 << (32 - al * 8))) & 0xffff_ffff
                }
                _ => {
                    let base = addr - u64::from(al);
                    let v0 = self.read_u64(base)?;
                    let v1 = self.read_u64(base + 8)?;
                    (v0 >> (al * 8)) | (v1 << (64 - al * 8))
                }
            };
            return Ok(ret);
        }

        let paddr = self.get_phys_addr(addr, AccessType::Read)?;
        match self.mem_map.lookup(paddr) {
            None => {
                debug!(paddr, "read from unclaimed physical address");
                Ok(0)
            }
            Some((RangeRef::Ram(i), offset)) => {
                let tlb_idx = ((addr >> PAGE_SHIFT) as usize) & (TLB_SIZE - 1);
                self.tlb_read[tlb_idx] = TlbEntry {
                    vaddr: addr & !PAGE_MASK,
                    ram: i as u32,
                    addend: offset.wrapping_sub(addr),
                };
                let r = self.mem_map.ram(i);
                let off = offset as usize;
                Ok(match size_log2 {
                    0 => u64::from(r.read_u8(off)),
                    1 => u64::from(r.read_u16(off)),
                    2 => u64::from(r.read_u32(off)),
                    _ => r.read_u64(off),
                })
            }
            Some((RangeRef::Device(i), offset)) => {
                Ok(self.mem_map.device_read(i, offset, size_log2))
            }
        }
    }

    /// Slow write path: misaligned decomposition, translation, routing.
    pub(crate) fn write_slow(&mut self, addr: u64, val: u64, size_log2: u32) -> Result<(), Trap> {
        let size = 1u64 << size_log2;
        if addr & (size - 1) != 0 {
            // Byte-by-byte, low to high; a fault mid-sequence leaves the
            // earlier bytes written.
            for i in 0..size {
                self.write_u8(addr + i, (val >> (8 * i)) as u8)?;
            }
            return Ok(());
        }

        let paddr = self.get_phys_addr(addr, AccessType::Write)?;
        match self.mem_map.lookup(paddr) {
            None => {
                debug!(paddr, "write to unclaimed physical address");
                Ok(())
            }
            Some((RangeRef::Ram(i), offset)) => {
                let tlb_idx = ((addr >> PAGE_SHIFT) as usize) & (TLB_SIZE - 1);
                self.tlb_write[tlb_idx] = TlbEntry {
                    vaddr: addr & !PAGE_MASK,
                    ram: i as u32,
                    addend: offset.wrapping_sub(addr),
                };
                let r = self.mem_map.ram_mut(i);
                r.mark_dirty(offset);
                let off = offset as usize;
                match size_log2 {
                    0 => r.write_u8(off, val as u8),
                    1 => r.write_u16(off, val as u16),
                    2 => r.write_u32(off, val as u32),
                    _ => r.write_u64(off, val),
                }
                Ok(())
            }
            Some((RangeRef::Device(i), offset)) => {
                self.mem_map.device_write(i, offset, val, size_log2);
                Ok(())
            }
        }
    }

    /// Fetch slow path: translates with the fetch access class, requires
    /// RAM, and refills the fetch TLB. Returns the RAM range index and the
    /// range-relative offset of `addr`.
    pub(crate) fn read_insn_slow(&mut self, addr: u64) -> Result<(usize, usize), Trap> {
        let paddr = self.get_phys_addr(addr, AccessType::Fetch)?;
        match self.mem_map.lookup(paddr) {
            Some((RangeRef::Ram(i), offset)) => {
                let tlb_idx = ((addr >> PAGE_SHIFT) as usize) & (TLB_SIZE - 1);
                self.tlb_code[tlb_idx] = TlbEntry {
                    vaddr: addr & !PAGE_MASK,
                    ram: i as u32,
                    addend: offset.wrapping_sub(addr),
                };
                Ok((i, offset as usize))
            }
            _ => Err(Trap::InstructionAccessFault(addr)),
        }
    }

    /// Reads an aligned instruction half-word through the fetch TLB.
    pub(crate) fn read_insn_u16(&mut self, addr: u64) -> Result<u16, Trap> {
        let idx = ((addr >> PAGE_SHIFT) as usize) & (TLB_SIZE - 1);
        let e = self.tlb_code[idx];
        if e.vaddr == addr & !PAGE_MASK {
            let off = addr.wrapping_add(e.addend) as usize;
            Ok(self.mem_map.ram(e.ram as usize).read_u16(off))
        } else {
            let (ram, off) = self.read_insn_slow(addr)?;
            Ok(self.mem_map.ram(ram).read_u16(off))
        }
    }
}
