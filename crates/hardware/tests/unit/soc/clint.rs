//! CLINT tests.

use std::sync::Arc;

use rvemu_core::core::arch::csr::{MIP_MSIP, MIP_MTIP};
use rvemu_core::core::irq::IrqLines;
use rvemu_core::soc::devices::{Clint, MmioDevice};

fn clint() -> (Clint, Arc<IrqLines>) {
    let irq = Arc::new(IrqLines::new());
    (Clint::new(irq.clone()), irq)
}

#[test]
fn mtimecmp_resets_to_max() {
    let (c, _irq) = clint();
    assert_eq!(c.mtimecmp(), u64::MAX);
    assert_eq!(c.mtime(), 0);
}

#[test]
fn mtime_reads_in_halves() {
    let (mut c, _irq) = clint();
    c.set_mtime(0x0123_4567_89ab_cdef);
    assert_eq!(c.read(0xbff8, 2), 0x89ab_cdef);
    assert_eq!(c.read(0xbffc, 2), 0x0123_4567);
}

#[test]
fn mtimecmp_write_assembles_halves() {
    let (mut c, _irq) = clint();
    c.write(0x4000, 0xdead_beef, 2);
    c.write(0x4004, 0x0000_0001, 2);
    assert_eq!(c.mtimecmp(), 0x1_dead_beef);
    assert_eq!(c.read(0x4000, 2), 0xdead_beef);
    assert_eq!(c.read(0x4004, 2), 1);
}

#[test]
fn mtip_raised_exactly_when_due() {
    let (mut c, irq) = clint();
    c.write(0x4000, 100, 2);
    c.write(0x4004, 0, 2);
    c.set_mtime(99);
    assert_eq!(irq.mip() & MIP_MTIP, 0);
    c.set_mtime(100);
    assert_ne!(irq.mip() & MIP_MTIP, 0);
}

#[test]
fn mtimecmp_write_clears_mtip() {
    let (mut c, irq) = clint();
    c.write(0x4000, 10, 2);
    c.write(0x4004, 0, 2);
    c.set_mtime(50);
    assert_ne!(irq.mip() & MIP_MTIP, 0);
    c.write(0x4000, 1000, 2);
    assert_eq!(irq.mip() & MIP_MTIP, 0);
}

#[test]
fn ticks_until_due_counts_down() {
    let (mut c, irq) = clint();
    c.write(0x4000, 100, 2);
    c.write(0x4004, 0, 2);
    c.set_mtime(40);
    assert_eq!(c.ticks_until_due(), 60);
    c.set_mtime(100);
    assert_eq!(c.ticks_until_due(), 0);
    assert_ne!(irq.mip() & MIP_MTIP, 0);
}

#[test]
fn msip_sets_and_clears_the_software_interrupt() {
    let (mut c, irq) = clint();
    c.write(0, 1, 2);
    assert_ne!(irq.mip() & MIP_MSIP, 0);
    assert_eq!(c.read(0, 2), 1);
    c.write(0, 0, 2);
    assert_eq!(irq.mip() & MIP_MSIP, 0);
    assert_eq!(c.read(0, 2), 0);
}

#[test]
fn unknown_offsets_read_zero() {
    let (mut c, _irq) = clint();
    assert_eq!(c.read(0x8000, 2), 0);
}
