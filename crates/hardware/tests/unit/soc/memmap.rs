//! Physical memory map tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use rvemu_core::core::cpu::{BaseIsa, Cpu};
use rvemu_core::core::irq::IrqLines;
use rvemu_core::soc::devices::MmioDevice;
use rvemu_core::soc::memmap::{
    PhysMemMap, RangeRef, DEVIO_SIZE16, DEVIO_SIZE32, DEVIO_SIZE8, RAM_DIRTY_BITS,
};

/// Device that records every access and serves a fixed pattern.
#[derive(Default)]
struct ProbeDev {
    reads: Vec<(u64, u32)>,
    writes: Vec<(u64, u32, u32)>,
}

impl MmioDevice for ProbeDev {
    fn read(&mut self, offset: u64, size_log2: u32) -> u32 {
        self.reads.push((offset, size_log2));
        0x1111_0000 | offset as u32
    }

    fn write(&mut self, offset: u64, val: u32, size_log2: u32) {
        self.writes.push((offset, val, size_log2));
    }
}

#[test]
fn lookup_resolves_ram_and_devices() {
    let mut map = PhysMemMap::new();
    let _ram = map.register_ram(0x8000_0000, 0x1000, 0);
    let dev = Rc::new(RefCell::new(ProbeDev::default()));
    map.register_device(0x1000_0000, 0x100, dev, DEVIO_SIZE32);

    assert_eq!(
        map.lookup(0x8000_0800),
        Some((RangeRef::Ram(0), 0x800))
    );
    assert_eq!(
        map.lookup(0x1000_0040),
        Some((RangeRef::Device(0), 0x40))
    );
    assert_eq!(map.lookup(0x2000_0000), None);
}

#[test]
fn disabled_range_is_open_bus() {
    let mut map = PhysMemMap::new();
    let ram = map.register_ram(0x8000_0000, 0x1000, 0);
    map.phys_write_u32(0x8000_0000, 7);
    map.set_ram_addr(ram, 0x8000_0000, false);
    assert_eq!(map.lookup(0x8000_0000), None);
    assert_eq!(map.phys_read_u32(0x8000_0000), 0);

    // Remapping brings the contents back at the new base.
    map.set_ram_addr(ram, 0x9000_0000, true);
    assert_eq!(map.phys_read_u32(0x9000_0000), 7);
}

#[test]
fn phys_access_ignores_devices() {
    let mut map = PhysMemMap::new();
    let dev = Rc::new(RefCell::new(ProbeDev::default()));
    map.register_device(0x1000_0000, 0x100, dev.clone(), DEVIO_SIZE32);
    assert_eq!(map.phys_read_u32(0x1000_0000), 0);
    map.phys_write_u32(0x1000_0000, 5);
    assert!(dev.borrow().reads.is_empty());
    assert!(dev.borrow().writes.is_empty());
}

fn device_cpu(devio: u32) -> (Cpu, Rc<RefCell<ProbeDev>>) {
    let mut map = PhysMemMap::new();
    map.register_ram(0x8000_0000, 0x1000, 0);
    let dev = Rc::new(RefCell::new(ProbeDev::default()));
    map.register_device(0x1000_0000, 0x1000, dev.clone(), devio);
    let cpu = Cpu::new(map, BaseIsa::Rv64, Arc::new(IrqLines::new()));
    (cpu, dev)
}

#[test]
fn claimed_width_dispatches_directly() {
    let (mut cpu, dev) = device_cpu(DEVIO_SIZE8 | DEVIO_SIZE16 | DEVIO_SIZE32);
    assert_eq!(cpu.read_u32(0x1000_0010).unwrap(), 0x1111_0010);
    cpu.write_u16(0x1000_0020, 0xabcd).unwrap();
    assert_eq!(dev.borrow().reads, vec![(0x10, 2)]);
    assert_eq!(dev.borrow().writes, vec![(0x20, 0xabcd, 1)]);
}

#[test]
fn u64_access_decomposes_into_32_bit_halves() {
    let (mut cpu, dev) = device_cpu(DEVIO_SIZE32);
    let v = cpu.read_u64(0x1000_0000).unwrap();
    // Low half first, then high half.
    assert_eq!(dev.borrow().reads, vec![(0, 2), (4, 2)]);
    assert_eq!(v, 0x1111_0004_1111_0000);

    cpu.write_u64(0x1000_0008, 0xaaaa_bbbb_cccc_dddd).unwrap();
    assert_eq!(
        dev.borrow().writes,
        vec![(0x8, 0xcccc_dddd, 2), (0xc, 0xaaaa_bbbb, 2)]
    );
}

#[test]
fn unadvertised_width_reads_zero_and_drops_writes() {
    let (mut cpu, dev) = device_cpu(DEVIO_SIZE32);
    assert_eq!(cpu.read_u8(0x1000_0000).unwrap(), 0);
    cpu.write_u8(0x1000_0000, 0xff).unwrap();
    assert!(dev.borrow().reads.is_empty());
    assert!(dev.borrow().writes.is_empty());
}

#[test]
fn dirty_bits_accumulate_and_clear() {
    let mut map = PhysMemMap::new();
    let ram = map.register_ram(0x8000_0000, 0x4000, RAM_DIRTY_BITS);
    let mut cpu = Cpu::new(map, BaseIsa::Rv64, Arc::new(IrqLines::new()));

    cpu.write_u32(0x8000_0000, 1).unwrap(); // page 0
    cpu.write_u32(0x8000_2004, 2).unwrap(); // page 2
    let bits = cpu.mem_map_mut().read_and_clear_dirty(ram).unwrap();
    assert_eq!(bits[0] & 0b111, 0b101);

    // Cleared after the drain.
    let bits = cpu.mem_map_mut().read_and_clear_dirty(ram).unwrap();
    assert_eq!(bits[0], 0);
}

#[test]
fn dirty_tracking_rearms_after_write_tlb_flush() {
    let mut map = PhysMemMap::new();
    let ram = map.register_ram(0x8000_0000, 0x4000, RAM_DIRTY_BITS);
    let mut cpu = Cpu::new(map, BaseIsa::Rv64, Arc::new(IrqLines::new()));

    cpu.write_u32(0x8000_0000, 1).unwrap();
    cpu.mem_map_mut().read_and_clear_dirty(ram).unwrap();

    // A fast-path write through the cached TLB entry does not re-mark the
    // page; flushing the write TLB for the range restores tracking.
    cpu.flush_tlb_write_range_ram(ram, 0, 0x4000);
    cpu.write_u32(0x8000_0004, 2).unwrap();
    let bits = cpu.mem_map_mut().read_and_clear_dirty(ram).unwrap();
    assert_eq!(bits[0] & 1, 1);
}

#[test]
fn ranges_without_dirty_tracking_return_none() {
    let mut map = PhysMemMap::new();
    let ram = map.register_ram(0x8000_0000, 0x1000, 0);
    assert!(map.read_and_clear_dirty(ram).is_none());
}
