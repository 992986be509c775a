//! LR/SC and AMO tests.

use crate::common::encode::{amo, ECALL, SELF_JUMP};
use crate::common::harness::{cpu64, load_code, park_traps, run_at, RAM_BASE};

const CELL: u64 = RAM_BASE + 0x1000;

#[test]
fn lr_sc_succeeds_once_then_fails() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(10, CELL);
    cpu.set_reg(7, 1);
    load_code(
        &mut cpu,
        RAM_BASE,
        &[
            amo(0x02, 2, 5, 10, 0), // lr.w x5, (x10)
            amo(0x03, 2, 6, 10, 7), // sc.w x6, x7, (x10)
            amo(0x03, 2, 8, 10, 7), // sc.w x8, x7, (x10)
            SELF_JUMP,
        ],
    );
    run_at(&mut cpu, RAM_BASE, 8);
    assert_eq!(cpu.reg(5), 0); // loaded the initial zero
    assert_eq!(cpu.reg(6), 0); // first sc succeeded
    assert_eq!(cpu.reg(8), 1); // second sc failed
    assert_eq!(cpu.mem_map().phys_read_u32(CELL), 1);
}

#[test]
fn sc_to_a_different_address_fails() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(10, CELL);
    cpu.set_reg(11, CELL + 8);
    cpu.set_reg(7, 9);
    load_code(
        &mut cpu,
        RAM_BASE,
        &[
            amo(0x02, 2, 5, 10, 0), // lr.w (x10)
            amo(0x03, 2, 6, 11, 7), // sc.w (x11)
            SELF_JUMP,
        ],
    );
    run_at(&mut cpu, RAM_BASE, 6);
    assert_eq!(cpu.reg(6), 1);
    assert_eq!(cpu.mem_map().phys_read_u32(CELL + 8), 0);
}

#[test]
fn trap_between_lr_and_sc_kills_the_reservation() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    // mret from the handler back to the sc.
    load_code(&mut cpu, crate::common::harness::TRAP_VEC, &[0x3020_0073]);
    cpu.set_reg(10, CELL);
    cpu.set_reg(7, 5);
    load_code(
        &mut cpu,
        RAM_BASE,
        &[
            amo(0x02, 2, 5, 10, 0), // lr.w
            ECALL,                  // traps; handler mrets back here + 4
            amo(0x03, 2, 6, 10, 7), // sc.w must now fail
            SELF_JUMP,
        ],
    );
    // mepc points at the ecall; bump it past in the handler? Instead rely
    // on mepc + manual fixup: run the lr + ecall + trap first.
    run_at(&mut cpu, RAM_BASE, 3);
    assert_eq!(cpu.read_csr(0x342), Some(11));
    // Return past the ecall and continue with the sc.
    cpu.write_csr(0x341, RAM_BASE + 8);
    cpu.run(3);
    assert_eq!(cpu.reg(6), 1); // reservation gone
    assert_eq!(cpu.mem_map().phys_read_u32(CELL), 0);
}

#[test]
fn lr_with_nonzero_rs2_is_illegal() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.set_reg(10, CELL);
    load_code(&mut cpu, RAM_BASE, &[amo(0x02, 2, 5, 10, 3)]);
    run_at(&mut cpu, RAM_BASE, 2);
    assert_eq!(cpu.read_csr(0x342), Some(2));
}

#[test]
fn amoadd_returns_old_value() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.mem_map_mut().phys_write_u32(CELL, 10);
    cpu.set_reg(10, CELL);
    cpu.set_reg(7, 32);
    load_code(
        &mut cpu,
        RAM_BASE,
        &[amo(0x00, 2, 5, 10, 7), SELF_JUMP], // amoadd.w
    );
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.reg(5), 10);
    assert_eq!(cpu.mem_map().phys_read_u32(CELL), 42);
}

#[test]
fn amoswap_exchanges() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.mem_map_mut().phys_write_u32(CELL, 0xaaaa);
    cpu.set_reg(10, CELL);
    cpu.set_reg(7, 0xbbbb);
    load_code(&mut cpu, RAM_BASE, &[amo(0x01, 2, 5, 10, 7), SELF_JUMP]);
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.reg(5), 0xaaaa);
    assert_eq!(cpu.mem_map().phys_read_u32(CELL), 0xbbbb);
}

#[test]
fn amo_word_result_sign_extends() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.mem_map_mut().phys_write_u32(CELL, 0x8000_0000);
    cpu.set_reg(10, CELL);
    cpu.set_reg(7, 0);
    load_code(&mut cpu, RAM_BASE, &[amo(0x08, 2, 5, 10, 7), SELF_JUMP]); // amoor.w
    run_at(&mut cpu, RAM_BASE, 4);
    assert_eq!(cpu.reg(5), 0xffff_ffff_8000_0000);
}

#[test]
fn amomin_max_signed_and_unsigned() {
    let mut cpu = cpu64();
    park_traps(&mut cpu);
    cpu.mem_map_mut().phys_write_u64(CELL, (-5i64) as u64);
    cpu.set_reg(10, CELL);
    cpu.set_reg(7, 3);
    load_code(
        &mut cpu,
        RAM_BASE,
        &[
            amo(0x10, 3, 5, 10, 7), // amomin.d: min(-5, 3) = -5
            amo(0x1c, 3, 6, 10, 7), // amomaxu.d: maxu(-5 as u64, 3) = -5 as u64
            SELF_JUMP,
        ],
    );
    run_at(&mut cpu, RAM_BASE, 6);
    assert_eq!(cpu.reg(5), (-5i64) as u64); // old value from the min
    assert_eq!(cpu.mem_map().phys_read_u64(CELL), (-5i64) as u64);
}

#[test]
fn amo_d_is_illegal_on_rv32() {
    let mut cpu = crate::common::harness::cpu32();
    park_traps(&mut cpu);
    cpu.set_reg(10, CELL);
    load_code(&mut cpu, RAM_BASE, &[amo(0x00, 3, 5, 10, 7)]);
    run_at(&mut cpu, RAM_BASE, 2);
    assert_eq!(cpu.read_csr(0x342), Some(2));
}
