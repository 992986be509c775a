//! PLIC tests.

use std::sync::Arc;

use rvemu_core::core::arch::csr::{MIP_MEIP, MIP_SEIP};
use rvemu_core::core::irq::IrqLines;
use rvemu_core::soc::devices::{MmioDevice, Plic};

const CLAIM: u64 = 0x20_0004;

fn plic() -> (Plic, Arc<IrqLines>) {
    let irq = Arc::new(IrqLines::new());
    (Plic::new(irq.clone()), irq)
}

#[test]
fn pending_line_asserts_meip_and_seip() {
    let (mut p, irq) = plic();
    p.set_irq(3, true);
    assert_ne!(irq.mip() & MIP_MEIP, 0);
    assert_ne!(irq.mip() & MIP_SEIP, 0);
}

#[test]
fn claim_returns_the_lowest_pending_line() {
    let (mut p, _irq) = plic();
    p.set_irq(7, true);
    p.set_irq(3, true);
    assert_eq!(p.read(CLAIM, 2), 3);
    assert_eq!(p.read(CLAIM, 2), 7); // 3 is now served
    assert_eq!(p.read(CLAIM, 2), 0); // nothing left to claim
}

#[test]
fn served_line_releases_the_external_interrupt() {
    let (mut p, irq) = plic();
    p.set_irq(5, true);
    assert_eq!(p.read(CLAIM, 2), 5);
    // All pending lines are served: the mip bits drop.
    assert_eq!(irq.mip() & (MIP_MEIP | MIP_SEIP), 0);
}

#[test]
fn complete_rearms_a_still_pending_level_source() {
    let (mut p, irq) = plic();
    p.set_irq(5, true);
    assert_eq!(p.read(CLAIM, 2), 5);
    // Completion with the line still asserted re-raises the interrupt.
    p.write(CLAIM, 5, 2);
    assert_ne!(irq.mip() & MIP_MEIP, 0);
    assert_eq!(p.read(CLAIM, 2), 5);
}

#[test]
fn dropping_the_level_clears_pending() {
    let (mut p, irq) = plic();
    p.set_irq(2, true);
    p.set_irq(2, false);
    assert_eq!(irq.mip() & MIP_MEIP, 0);
    assert_eq!(p.read(CLAIM, 2), 0);
}

#[test]
fn threshold_reads_zero() {
    let (mut p, _irq) = plic();
    assert_eq!(p.read(0x20_0000, 2), 0);
}
