//! CSR unit tests.

use rvemu_core::core::arch::csr::{
    MIP_SEIP, MIP_SSIP, MIP_STIP, MSTATUS_FS, MSTATUS_MIE, MSTATUS_SIE,
};
use rvemu_core::core::arch::PrivilegeMode;

use crate::common::encode::{csr_op, SELF_JUMP};
use crate::common::harness::{cpu64, load_code, park_traps, run_at, RAM_BASE};

#[test]
fn mscratch_round_trip() {
    let mut cpu = cpu64();
    assert!(cpu.write_csr(0x340, 0x1234_5678_9abc_def0));
    assert_eq!(cpu.read_csr(0x340), Some(0x1234_5678_9abc_def0));
}

#[test]
fn mtvec_low_bits_are_cleared() {
    let mut cpu = cpu64();
    cpu.write_csr(0x305, 0x8000_0103);
    assert_eq!(cpu.read_csr(0x305), Some(0x8000_0100));
}

#[test]
fn mepc_bit_zero_is_cleared() {
    let mut cpu = cpu64();
    cpu.write_csr(0x341, 0x8000_0001);
    assert_eq!(cpu.read_csr(0x341), Some(0x8000_0000));
}

#[test]
fn cycle_and_instret_alias_the_same_counter() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    load_code(&mut cpu, RAM_BASE, &[SELF_JUMP]);
    run_at(&mut cpu, RAM_BASE, 10);
    let cycle = cpu.read_csr(0xb00);
    let instret = cpu.read_csr(0xb02);
    assert_eq!(cycle, instret);
    assert_eq!(cycle, Some(10));
}

#[test]
fn cycleh_only_exists_in_32_bit_mode() {
    let mut cpu = cpu64();
    assert_eq!(cpu.read_csr(0xb80), None);
    let mut cpu = crate::common::harness::cpu32();
    assert_eq!(cpu.read_csr(0xb80), Some(0));
}

#[test]
fn time_csr_is_unimplemented() {
    let mut cpu = cpu64();
    assert_eq!(cpu.read_csr(0xc01), None);
}

#[test]
fn satp_rejects_unsupported_modes() {
    let mut cpu = cpu64();
    cpu.write_csr(0x180, (8u64 << 60) | 0x1234);
    // Mode 5 is unpublished: the mode field keeps its old value.
    cpu.write_csr(0x180, (5u64 << 60) | 0x9999);
    assert_eq!(cpu.read_csr(0x180), Some((8u64 << 60) | 0x9999));
}

#[test]
fn mideleg_writable_bits_are_supervisor_interrupts() {
    let mut cpu = cpu64();
    cpu.write_csr(0x303, u64::MAX);
    assert_eq!(
        cpu.read_csr(0x303),
        Some(u64::from(MIP_SSIP | MIP_STIP | MIP_SEIP))
    );
}

#[test]
fn medeleg_mask_covers_cause_codes_up_to_store_page_fault() {
    let mut cpu = cpu64();
    cpu.write_csr(0x302, u64::MAX);
    assert_eq!(cpu.read_csr(0x302), Some(0xffff));
}

#[test]
fn sie_is_a_masked_view_of_mie() {
    let mut cpu = cpu64();
    cpu.write_csr(0x303, u64::from(MIP_SSIP)); // delegate SSIP only
    cpu.write_csr(0x104, u64::from(MIP_SSIP | MIP_STIP));
    // Only the delegated bit went through.
    assert_eq!(cpu.read_csr(0x104), Some(u64::from(MIP_SSIP)));
    assert_eq!(cpu.read_csr(0x304), Some(u64::from(MIP_SSIP)));
}

#[test]
fn mstatus_write_is_masked() {
    let mut cpu = cpu64();
    cpu.write_csr(0x300, u64::MAX);
    let v = cpu.read_csr(0x300).unwrap();
    // WPRI bits read back as zero; the IE/FS fields went through.
    assert_ne!(v & MSTATUS_MIE, 0);
    assert_ne!(v & MSTATUS_SIE, 0);
    assert_eq!(v & MSTATUS_FS, MSTATUS_FS);
    // SD summarises FS == dirty at the MSB.
    assert_ne!(v >> 63, 0);
}

#[test]
fn fflags_write_dirties_fp_state() {
    let mut cpu = cpu64();
    cpu.write_csr(0x300, 1 << 13); // FS = initial
    cpu.write_csr(0x001, 0x1f);
    let v = cpu.read_csr(0x300).unwrap();
    assert_eq!(v & MSTATUS_FS, MSTATUS_FS); // dirty
    assert_eq!(cpu.read_csr(0x001), Some(0x1f));
}

#[test]
fn fcsr_packs_fflags_and_frm() {
    let mut cpu = cpu64();
    cpu.write_csr(0x300, 1 << 13);
    cpu.write_csr(0x003, (0b010 << 5) | 0x3);
    assert_eq!(cpu.read_csr(0x002), Some(0b010));
    assert_eq!(cpu.read_csr(0x001), Some(0x3));
}

#[test]
fn fp_csrs_fault_when_fs_is_off() {
    let mut cpu = cpu64();
    assert_eq!(cpu.read_csr(0x001), None);
}

#[test]
fn invalid_frm_values_read_back_as_zero() {
    let mut cpu = cpu64();
    cpu.write_csr(0x300, 1 << 13);
    cpu.write_csr(0x002, 6);
    assert_eq!(cpu.read_csr(0x002), Some(0));
}

// ── CSR instructions ─────────────────────────────────────────────────

#[test]
fn csrrw_swaps_old_for_new() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.write_csr(0x340, 0xaa);
    cpu.set_reg(10, 0xbb);
    load_code(&mut cpu, RAM_BASE, &[csr_op(1, 5, 10, 0x340), SELF_JUMP]);
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.reg(5), 0xaa);
    assert_eq!(cpu.read_csr(0x340), Some(0xbb));
}

#[test]
fn csrrs_with_x0_does_not_write() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    // csrrs x5, cycle, x0 — reading a read-only counter must not fault.
    load_code(&mut cpu, RAM_BASE, &[csr_op(2, 5, 0, 0xc00), SELF_JUMP]);
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.reg(5), 1); // the csrrs itself has retired
    assert_eq!(cpu.read_csr(0x342), Some(0)); // no trap
}

#[test]
fn csrrs_with_source_into_read_only_csr_faults() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(10, 1);
    load_code(&mut cpu, RAM_BASE, &[csr_op(2, 5, 10, 0xc00)]);
    run_at(&mut cpu, RAM_BASE, 2);
    assert_eq!(cpu.read_csr(0x342), Some(2)); // illegal instruction
}

#[test]
fn csrrc_clears_selected_bits() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.write_csr(0x340, 0xff);
    cpu.set_reg(10, 0x0f);
    load_code(&mut cpu, RAM_BASE, &[csr_op(3, 5, 10, 0x340), SELF_JUMP]);
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.reg(5), 0xff);
    assert_eq!(cpu.read_csr(0x340), Some(0xf0));
}

#[test]
fn csrrwi_uses_the_immediate() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    // csrrwi x5, mscratch, 13
    load_code(&mut cpu, RAM_BASE, &[csr_op(5, 5, 13, 0x340), SELF_JUMP]);
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.read_csr(0x340), Some(13));
}

#[test]
fn user_mode_cannot_touch_machine_csrs() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    load_code(&mut cpu, RAM_BASE, &[csr_op(2, 5, 0, 0x340)]);
    cpu.set_priv_mode(PrivilegeMode::User);
    // In bare U-mode, RAM_BASE is still fetchable (no translation).
    run_at(&mut cpu, RAM_BASE, 2);
    assert_eq!(cpu.read_csr(0x342), Some(2));
}

#[test]
fn misa_mxl_rewrite_switches_xlen() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    assert_eq!(cpu.cur_xlen(), 64);
    cpu.set_reg(10, 1 << 62); // MXL = 1 (32-bit)
    load_code(&mut cpu, RAM_BASE, &[csr_op(1, 0, 10, 0x301), SELF_JUMP]);
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.cur_xlen(), 32);
}
