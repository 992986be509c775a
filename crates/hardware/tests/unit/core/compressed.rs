//! Compressed instruction tests.
//!
//! Programs are written as 16-bit parcels; mixing in 32-bit words uses
//! two parcels (low half first).

use crate::common::harness::{cpu32, cpu64, load_code16, park_traps, run_at, RAM_BASE};

/// `c.ebreak`.
const C_EBREAK: u16 = 0x9002;

#[test]
fn c_li_loads_an_immediate() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    // c.li x5, 3 ; c.ebreak
    load_code16(&mut cpu, RAM_BASE, &[0x428d, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 3);
    assert_eq!(cpu.reg(5), 3);
    assert_eq!(cpu.read_csr(0x341), Some(RAM_BASE + 2)); // mepc at the ebreak
}

#[test]
fn c_li_sign_extends() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    // c.li x5, -1
    load_code16(&mut cpu, RAM_BASE, &[0x52fd, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 3);
    assert_eq!(cpu.reg(5), u64::MAX);
}

#[test]
fn c_addi4spn_builds_stack_addresses() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(2, 0x1000);
    // c.addi4spn x8, sp, 8 -> encoding 0x0020 | rd'=0 ... imm=8: 0x0020
    load_code16(&mut cpu, RAM_BASE, &[0x0020, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 3);
    assert_eq!(cpu.reg(8), 0x1008);
}

#[test]
fn c_addi4spn_zero_imm_is_illegal() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    load_code16(&mut cpu, RAM_BASE, &[0x0000]);
    run_at(&mut cpu, RAM_BASE, 2);
    assert_eq!(cpu.read_csr(0x342), Some(2));
    assert_eq!(cpu.read_csr(0x343), Some(0)); // tval holds the parcel
}

#[test]
fn c_mv_and_c_add() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(10, 21);
    // c.mv x11, x10 ; c.add x11, x11 ; c.ebreak
    load_code16(&mut cpu, RAM_BASE, &[0x85aa, 0x95ae, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.reg(11), 42);
}

#[test]
fn c_j_jumps_forward() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    // c.j +4 skips the ebreak; c.li x5, 2 lands after it.
    load_code16(&mut cpu, RAM_BASE, &[0xa011, C_EBREAK, 0x4289, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.reg(5), 2);
    assert_eq!(cpu.read_csr(0x341), Some(RAM_BASE + 6));
}

#[test]
fn c_jal_links_on_rv32() {
    let mut cpu = cpu32();
    park_traps(&mut cpu);
    // c.jal +4 ; c.ebreak ; c.ebreak
    load_code16(&mut cpu, RAM_BASE, &[0x2011, C_EBREAK, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 3);
    assert_eq!(cpu.reg(1) as u32, (RAM_BASE + 2) as u32);
    // Jump targets live sign-extended in the 64-bit storage on a 32-bit
    // hart; the guest-visible view is the low word.
    assert_eq!(cpu.read_csr(0x341).map(|v| v as u32), Some(0x8000_0004));
}

#[test]
fn c_addiw_on_rv64_truncates() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(10, 0x7fff_ffff);
    // c.addiw x10, 1 -> 0x2505
    load_code16(&mut cpu, RAM_BASE, &[0x2505, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 3);
    assert_eq!(cpu.reg(10), 0xffff_ffff_8000_0000);
}

#[test]
fn c_beqz_taken_and_not_taken() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(8, 0);
    // c.beqz x8, +4 ; c.ebreak ; c.li x5, 1 ; c.ebreak
    load_code16(&mut cpu, RAM_BASE, &[0xc011, C_EBREAK, 0x4285, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.reg(5), 1);

    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(8, 7); // nonzero: fall through into the ebreak
    load_code16(&mut cpu, RAM_BASE, &[0xc011, C_EBREAK, 0x4285, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.reg(5), 0);
    assert_eq!(cpu.read_csr(0x341), Some(RAM_BASE + 2));
}

#[test]
fn c_lw_c_sw_round_trip() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(9, RAM_BASE + 0x1000); // x9 = base
    cpu.set_reg(8, 0xdead_1234);
    // c.sw x8, 0(x9) ; c.lw x10, 0(x9) ; c.ebreak
    load_code16(&mut cpu, RAM_BASE, &[0xc080, 0x4088, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.reg(10), 0xffff_ffff_dead_1234); // lw sign-extends
    assert_eq!(cpu.mem_map().phys_read_u32(RAM_BASE + 0x1000), 0xdead_1234);
}

#[test]
fn c_jr_and_c_jalr() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(10, RAM_BASE + 0x100);
    load_code16(&mut cpu, RAM_BASE, &[0x9502, C_EBREAK]); // c.jalr x10
    load_code16(&mut cpu, RAM_BASE + 0x100, &[C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 3);
    assert_eq!(cpu.reg(1), RAM_BASE + 2); // link
    assert_eq!(cpu.read_csr(0x341), Some(RAM_BASE + 0x100));
}

#[test]
fn c_slli_shifts() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(10, 1);
    // c.slli x10, 12 -> 0x0532
    load_code16(&mut cpu, RAM_BASE, &[0x0532, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 3);
    assert_eq!(cpu.reg(10), 0x1000);
}

#[test]
fn c_srai_is_arithmetic() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(8, (-64i64) as u64);
    // c.srai x8, 4 -> 0x8411
    load_code16(&mut cpu, RAM_BASE, &[0x8411, C_EBREAK]);
    run_at(&mut cpu, RAM_BASE, 3);
    assert_eq!(cpu.reg(8) as i64, -4);
}

#[test]
fn compressed_insn_straddling_page_is_fetched_in_halves() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    let base = RAM_BASE + 0x1ffe; // last parcel of the page
    // A 32-bit addi x5, x0, 7 straddles the page boundary.
    let insn = crate::common::encode::addi(5, 0, 7);
    cpu.mem_map_mut().phys_write_u8(base, insn as u8);
    cpu.mem_map_mut().phys_write_u8(base + 1, (insn >> 8) as u8);
    cpu.mem_map_mut().phys_write_u8(base + 2, (insn >> 16) as u8);
    cpu.mem_map_mut().phys_write_u8(base + 3, (insn >> 24) as u8);
    load_code16(&mut cpu, base + 4, &[C_EBREAK]);
    run_at(&mut cpu, base, 3);
    assert_eq!(cpu.reg(5), 7);
    assert_eq!(cpu.read_csr(0x341), Some(base + 4));
}
