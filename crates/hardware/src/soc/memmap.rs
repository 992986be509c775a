//! Physical memory map.
//!
//! A keyed range table mapping guest physical addresses to either a RAM
//! backing buffer or an MMIO device window. It provides:
//! 1. **Registration:** RAM and device ranges are registered at machine
//!    init and never removed; remapping toggles an enable bit or moves the
//!    base address.
//! 2. **Lookup:** Physical address to range resolution for the slow memory
//!    path and the page walker.
//! 3. **Width policy:** Device windows advertise the access widths they
//!    natively accept; 64-bit accesses are decomposed into two 32-bit
//!    halves when only 32-bit access is advertised, and unsupported widths
//!    read zero / drop writes.
//! 4. **Dirty tracking:** RAM ranges may keep a per-page dirty bitmap,
//!    set on every slow-path write and drained atomically by a consumer
//!    (e.g. a framebuffer scan-out).

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::common::constants::PAGE_SHIFT;
use crate::soc::devices::MmioDevice;

/// Device window accepts 8-bit accesses.
pub const DEVIO_SIZE8: u32 = 1 << 0;

/// Device window accepts 16-bit accesses.
pub const DEVIO_SIZE16: u32 = 1 << 1;

/// Device window accepts 32-bit accesses.
pub const DEVIO_SIZE32: u32 = 1 << 2;

/// RAM range keeps a per-page dirty bitmap.
pub const RAM_DIRTY_BITS: u32 = 1 << 0;

/// Handle to a registered RAM range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RamHandle(pub(crate) usize);

/// Handle to a registered device range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceHandle(pub(crate) usize);

/// Resolved range kind plus index, as returned by [`PhysMemMap::lookup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeRef {
    /// RAM range (index into the RAM table).
    Ram(usize),
    /// Device range (index into the device table).
    Device(usize),
}

/// A RAM-backed physical range.
pub struct RamRange {
    /// Guest physical base address.
    pub addr: u64,
    /// Range size in bytes.
    pub size: u64,
    mem: Vec<u8>,
    dirty: Option<Vec<u64>>,
    enabled: bool,
}

impl RamRange {
    /// Reads one byte at a range-relative offset.
    #[inline(always)]
    pub fn read_u8(&self, off: usize) -> u8 {
        self.mem[off]
    }

    /// Reads a little-endian u16 at a range-relative offset.
    #[inline(always)]
    pub fn read_u16(&self, off: usize) -> u16 {
        u16::from_le_bytes([self.mem[off], self.mem[off + 1]])
    }

    /// Reads a little-endian u32 at a range-relative offset.
    #[inline(always)]
    pub fn read_u32(&self, off: usize) -> u32 {
        u32::from_le_bytes([
            self.mem[off],
            self.mem[off + 1],
            self.mem[off + 2],
            self.mem[off + 3],
        ])
    }

    /// Reads a little-endian u64 at a range-relative offset.
    #[inline(always)]
    pub fn read_u64(&self, off: usize) -> u64 {
        let lo = u64::from(self.read_u32(off));
        let hi = u64::from(self.read_u32(off + 4));
        lo | (hi << 32)
    }

    /// Writes one byte at a range-relative offset.
    #[inline(always)]
    pub fn write_u8(&mut self, off: usize, val: u8) {
        self.mem[off] = val;
    }

    /// Writes a little-endian u16 at a range-relative offset.
    #[inline(always)]
    pub fn write_u16(&mut self, off: usize, val: u16) {
        self.mem[off..off + 2].copy_from_slice(&val.to_le_bytes());
    }

    /// Writes a little-endian u32 at a range-relative offset.
    #[inline(always)]
    pub fn write_u32(&mut self, off: usize, val: u32) {
        self.mem[off..off + 4].copy_from_slice(&val.to_le_bytes());
    }

    /// Writes a little-endian u64 at a range-relative offset.
    #[inline(always)]
    pub fn write_u64(&mut self, off: usize, val: u64) {
        self.mem[off..off + 8].copy_from_slice(&val.to_le_bytes());
    }

    /// Raw view of the backing buffer.
    pub fn bytes(&self) -> &[u8] {
        &self.mem
    }

    /// Raw mutable view of the backing buffer.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    /// Marks the page containing `offset` dirty, if tracking is enabled.
    #[inline]
    pub fn mark_dirty(&mut self, offset: u64) {
        if let Some(bits) = &mut self.dirty {
            let page = (offset >> PAGE_SHIFT) as usize;
            bits[page >> 6] |= 1 << (page & 63);
        }
    }
}

/// A device-backed physical range.
pub struct DeviceRange {
    /// Guest physical base address.
    pub addr: u64,
    /// Range size in bytes.
    pub size: u64,
    dev: Rc<RefCell<dyn MmioDevice>>,
    devio_flags: u32,
    enabled: bool,
}

/// The physical memory map: every RAM and device range of the machine.
#[derive(Default)]
pub struct PhysMemMap {
    rams: Vec<RamRange>,
    devs: Vec<DeviceRange>,
}

impl PhysMemMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a zero-filled RAM range.
    ///
    /// `flags` may contain [`RAM_DIRTY_BITS`] to enable per-page dirty
    /// tracking.
    pub fn register_ram(&mut self, addr: u64, size: u64, flags: u32) -> RamHandle {
        let dirty = if flags & RAM_DIRTY_BITS != 0 {
            let pages = (size >> PAGE_SHIFT) as usize;
            Some(vec![0u64; pages.div_ceil(64).max(1)])
        } else {
            None
        };
        self.rams.push(RamRange {
            addr,
            size,
            mem: vec![0u8; size as usize],
            dirty,
            enabled: true,
        });
        RamHandle(self.rams.len() - 1)
    }

    /// Registers a device window.
    ///
    /// `devio_flags` advertises the widths the device natively accepts
    /// ([`DEVIO_SIZE8`] | [`DEVIO_SIZE16`] | [`DEVIO_SIZE32`]).
    pub fn register_device(
        &mut self,
        addr: u64,
        size: u64,
        dev: Rc<RefCell<dyn MmioDevice>>,
        devio_flags: u32,
    ) -> DeviceHandle {
        self.devs.push(DeviceRange {
            addr,
            size,
            dev,
            devio_flags,
            enabled: true,
        });
        DeviceHandle(self.devs.len() - 1)
    }

    /// Moves and enables/disables a RAM range; a disabled range behaves as
    /// open bus.
    pub fn set_ram_addr(&mut self, h: RamHandle, addr: u64, enabled: bool) {
        self.rams[h.0].addr = addr;
        self.rams[h.0].enabled = enabled;
    }

    /// Moves and enables/disables a device range.
    pub fn set_device_addr(&mut self, h: DeviceHandle, addr: u64, enabled: bool) {
        self.devs[h.0].addr = addr;
        self.devs[h.0].enabled = enabled;
    }

    /// Resolves a physical address to its range and range-relative offset.
    pub fn lookup(&self, paddr: u64) -> Option<(RangeRef, u64)> {
        for (i, r) in self.rams.iter().enumerate() {
            if r.enabled && paddr.wrapping_sub(r.addr) < r.size {
                return Some((RangeRef::Ram(i), paddr - r.addr));
            }
        }
        for (i, d) in self.devs.iter().enumerate() {
            if d.enabled && paddr.wrapping_sub(d.addr) < d.size {
                return Some((RangeRef::Device(i), paddr - d.addr));
            }
        }
        None
    }

    /// Borrows a RAM range by table index.
    #[inline(always)]
    pub fn ram(&self, idx: usize) -> &RamRange {
        &self.rams[idx]
    }

    /// Mutably borrows a RAM range by table index.
    #[inline(always)]
    pub fn ram_mut(&mut self, idx: usize) -> &mut RamRange {
        &mut self.rams[idx]
    }

    /// Borrows a RAM range by handle.
    pub fn ram_by_handle(&self, h: RamHandle) -> &RamRange {
        &self.rams[h.0]
    }

    /// Mutably borrows a RAM range by handle.
    pub fn ram_by_handle_mut(&mut self, h: RamHandle) -> &mut RamRange {
        &mut self.rams[h.0]
    }

    /// Atomically drains the dirty bitmap of a RAM range.
    ///
    /// Returns `None` when the range does not track dirty pages; otherwise
    /// the bitmap with one bit per page, cleared in place.
    pub fn read_and_clear_dirty(&mut self, h: RamHandle) -> Option<Vec<u64>> {
        let r = &mut self.rams[h.0];
        r.dirty.as_mut().map(|bits| {
            let out = bits.clone();
            bits.fill(0);
            out
        })
    }

    /// Reads one byte of physical memory. Only RAM is readable this way;
    /// anything else returns zero.
    pub fn phys_read_u8(&self, paddr: u64) -> u8 {
        match self.lookup(paddr) {
            Some((RangeRef::Ram(i), off)) => self.rams[i].read_u8(off as usize),
            _ => 0,
        }
    }

    /// Reads a u32 of physical memory (aligned; RAM only).
    pub fn phys_read_u32(&self, paddr: u64) -> u32 {
        match self.lookup(paddr) {
            Some((RangeRef::Ram(i), off)) => self.rams[i].read_u32(off as usize),
            _ => 0,
        }
    }

    /// Reads a u64 of physical memory (aligned; RAM only).
    pub fn phys_read_u64(&self, paddr: u64) -> u64 {
        match self.lookup(paddr) {
            Some((RangeRef::Ram(i), off)) => self.rams[i].read_u64(off as usize),
            _ => 0,
        }
    }

    /// Writes one byte of physical memory (RAM only; silently dropped
    /// otherwise).
    pub fn phys_write_u8(&mut self, paddr: u64, val: u8) {
        if let Some((RangeRef::Ram(i), off)) = self.lookup(paddr) {
            self.rams[i].write_u8(off as usize, val);
        }
    }

    /// Writes a u32 of physical memory (aligned; RAM only).
    pub fn phys_write_u32(&mut self, paddr: u64, val: u32) {
        if let Some((RangeRef::Ram(i), off)) = self.lookup(paddr) {
            self.rams[i].write_u32(off as usize, val);
        }
    }

    /// Writes a u64 of physical memory (aligned; RAM only).
    pub fn phys_write_u64(&mut self, paddr: u64, val: u64) {
        if let Some((RangeRef::Ram(i), off)) = self.lookup(paddr) {
            self.rams[i].write_u64(off as usize, val);
        }
    }

    /// Copies a byte slice into RAM at a physical address; bytes falling
    /// outside RAM are dropped.
    pub fn write_phys_bytes(&mut self, paddr: u64, data: &[u8]) {
        if let Some((RangeRef::Ram(i), off)) = self.lookup(paddr) {
            let off = off as usize;
            let r = &mut self.rams[i];
            let n = data.len().min(r.mem.len() - off);
            r.mem[off..off + n].copy_from_slice(&data[..n]);
        }
    }

    /// Dispatches a device read, honouring the advertised widths.
    ///
    /// A 64-bit read from a 32-bit-only window is emulated as two 32-bit
    /// reads (low half first); a width the device neither claims nor can be
    /// decomposed to reads zero.
    pub(crate) fn device_read(&self, idx: usize, offset: u64, size_log2: u32) -> u64 {
        let d = &self.devs[idx];
        if (d.devio_flags >> size_log2) & 1 != 0 {
            u64::from(d.dev.borrow_mut().read(offset, size_log2))
        } else if d.devio_flags & DEVIO_SIZE32 != 0 && size_log2 == 3 {
            let mut dev = d.dev.borrow_mut();
            let lo = u64::from(dev.read(offset, 2));
            let hi = u64::from(dev.read(offset + 4, 2));
            lo | (hi << 32)
        } else {
            debug!(
                paddr = d.addr + offset,
                width = 8u32 << size_log2,
                "unsupported device read width"
            );
            0
        }
    }

    /// Dispatches a device write, honouring the advertised widths.
    pub(crate) fn device_write(&self, idx: usize, offset: u64, val: u64, size_log2: u32) {
        let d = &self.devs[idx];
        if (d.devio_flags >> size_log2) & 1 != 0 {
            d.dev.borrow_mut().write(offset, val as u32, size_log2);
        } else if d.devio_flags & DEVIO_SIZE32 != 0 && size_log2 == 3 {
            let mut dev = d.dev.borrow_mut();
            dev.write(offset, val as u32, 2);
            dev.write(offset + 4, (val >> 32) as u32, 2);
        } else {
            debug!(
                paddr = d.addr + offset,
                width = 8u32 << size_log2,
                "unsupported device write width"
            );
        }
    }
}
