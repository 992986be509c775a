//! Compressed (C extension) execution.
//!
//! The three RVC quadrants, with the immediate bit-scatter taken straight
//! from the ISA manual tables via `get_field1` relocations. Quadrant
//! contents depend on the active XLEN: `c.jal` exists only on RV32 (where
//! RV64 has `c.addiw`), the 64-bit load/store forms require RV64, and
//! their slots carry the single-precision FP forms on RV32.

use crate::common::error::Trap;
use crate::core::arch::xlen::Xlen;
use crate::core::fpu::nan_handling::F32_HIGH;
use crate::isa::bits::{get_field1, sext};

use super::interp::Ctl;
use super::Cpu;

/// Executes one 16-bit instruction at `pc`.
pub(crate) fn exec_compressed<X: Xlen>(s: &mut Cpu, insn: u32, pc: u64) -> Result<Ctl, Trap> {
    match insn & 3 {
        0 => quadrant0::<X>(s, insn),
        1 => quadrant1::<X>(s, insn, pc),
        _ => quadrant2::<X>(s, insn, pc),
    }
}

fn quadrant0<X: Xlen>(s: &mut Cpu, insn: u32) -> Result<Ctl, Trap> {
    let funct3 = (insn >> 13) & 7;
    let rd = (((insn >> 2) & 7) | 8) as usize;
    match funct3 {
        0 => {
            // c.addi4spn
            let imm = get_field1(insn, 11, 4, 5)
                | get_field1(insn, 7, 6, 9)
                | get_field1(insn, 6, 2, 2)
                | get_field1(insn, 5, 3, 3);
            if imm == 0 {
                return Err(Trap::IllegalInstruction(insn));
            }
            s.regs[rd] = X::canon(s.regs[2].wrapping_add(u64::from(imm)));
        }
        1 => {
            // c.fld
            if s.fs == 0 {
                return Err(Trap::IllegalInstruction(insn));
            }
            let imm = get_field1(insn, 10, 3, 5) | get_field1(insn, 5, 6, 7);
            let rs1 = (((insn >> 7) & 7) | 8) as usize;
            let addr = s.regs[rs1].wrapping_add(u64::from(imm));
            s.fregs[rd] = s.read_u64(addr)?;
            s.fs = 3;
        }
        2 => {
            // c.lw
            let imm = get_field1(insn, 10, 3, 5)
                | get_field1(insn, 6, 2, 2)
                | get_field1(insn, 5, 6, 6);
            let rs1 = (((insn >> 7) & 7) | 8) as usize;
            let addr = s.regs[rs1].wrapping_add(u64::from(imm));
            s.regs[rd] = (s.read_u32(addr)? as i32) as u64;
        }
        3 => {
            if X::BITS >= 64 {
                // c.ld
                let imm = get_field1(insn, 10, 3, 5) | get_field1(insn, 5, 6, 7);
                let rs1 = (((insn >> 7) & 7) | 8) as usize;
                let addr = s.regs[rs1].wrapping_add(u64::from(imm));
                s.regs[rd] = s.read_u64(addr)?;
            } else {
                // c.flw
                if s.fs == 0 {
                    return Err(Trap::IllegalInstruction(insn));
                }
                let imm = get_field1(insn, 10, 3, 5)
                    | get_field1(insn, 6, 2, 2)
                    | get_field1(insn, 5, 6, 6);
                let rs1 = (((insn >> 7) & 7) | 8) as usize;
                let addr = s.regs[rs1].wrapping_add(u64::from(imm));
                s.fregs[rd] = u64::from(s.read_u32(addr)?) | F32_HIGH;
                s.fs = 3;
            }
        }
        5 => {
            // c.fsd
            if s.fs == 0 {
                return Err(Trap::IllegalInstruction(insn));
            }
            let imm = get_field1(insn, 10, 3, 5) | get_field1(insn, 5, 6, 7);
            let rs1 = (((insn >> 7) & 7) | 8) as usize;
            let addr = s.regs[rs1].wrapping_add(u64::from(imm));
            s.write_u64(addr, s.fregs[rd])?;
        }
        6 => {
            // c.sw
            let imm = get_field1(insn, 10, 3, 5)
                | get_field1(insn, 6, 2, 2)
                | get_field1(insn, 5, 6, 6);
            let rs1 = (((insn >> 7) & 7) | 8) as usize;
            let addr = s.regs[rs1].wrapping_add(u64::from(imm));
            s.write_u32(addr, s.regs[rd] as u32)?;
        }
        7 => {
            if X::BITS >= 64 {
                // c.sd
                let imm = get_field1(insn, 10, 3, 5) | get_field1(insn, 5, 6, 7);
                let rs1 = (((insn >> 7) & 7) | 8) as usize;
                let addr = s.regs[rs1].wrapping_add(u64::from(imm));
                s.write_u64(addr, s.regs[rd])?;
            } else {
                // c.fsw
                if s.fs == 0 {
                    return Err(Trap::IllegalInstruction(insn));
                }
                let imm = get_field1(insn, 10, 3, 5)
                    | get_field1(insn, 6, 2, 2)
                    | get_field1(insn, 5, 6, 6);
                let rs1 = (((insn >> 7) & 7) | 8) as usize;
                let addr = s.regs[rs1].wrapping_add(u64::from(imm));
                s.write_u32(addr, s.fregs[rd] as u32)?;
            }
        }
        _ => return Err(Trap::IllegalInstruction(insn)),
    }
    Ok(Ctl::Next)
}

fn quadrant1<X: Xlen>(s: &mut Cpu, insn: u32, pc: u64) -> Result<Ctl, Trap> {
    let funct3 = (insn >> 13) & 7;
    let rd = ((insn >> 7) & 0x1f) as usize;
    match funct3 {
        0 => {
            // c.addi / c.nop
            if rd != 0 {
                let imm = sext(
                    (get_field1(insn, 12, 5, 5) | get_field1(insn, 2, 0, 4)) as i32,
                    6,
                );
                s.regs[rd] = X::canon(s.regs[rd].wrapping_add(imm as u64));
            }
        }
        1 => {
            if X::BITS == 32 {
                // c.jal
                let imm = c_j_imm(insn);
                s.regs[1] = pc.wrapping_add(2);
                s.pc = X::canon(pc.wrapping_add(imm as u64));
                return Ok(Ctl::Jump);
            }
            // c.addiw
            if rd != 0 {
                let imm = sext(
                    (get_field1(insn, 12, 5, 5) | get_field1(insn, 2, 0, 4)) as i32,
                    6,
                );
                s.regs[rd] = (s.regs[rd].wrapping_add(imm as u64) as i32) as u64;
            }
        }
        2 => {
            // c.li
            if rd != 0 {
                let imm = sext(
                    (get_field1(insn, 12, 5, 5) | get_field1(insn, 2, 0, 4)) as i32,
                    6,
                );
                s.regs[rd] = imm as u64;
            }
        }
        3 => {
            if rd == 2 {
                // c.addi16sp
                let imm = sext(
                    (get_field1(insn, 12, 9, 9)
                        | get_field1(insn, 6, 4, 4)
                        | get_field1(insn, 5, 6, 6)
                        | get_field1(insn, 3, 7, 8)
                        | get_field1(insn, 2, 5, 5)) as i32,
                    10,
                );
                if imm == 0 {
                    return Err(Trap::IllegalInstruction(insn));
                }
                s.regs[2] = X::canon(s.regs[2].wrapping_add(imm as u64));
            } else if rd != 0 {
                // c.lui
                let imm = sext(
                    (get_field1(insn, 12, 17, 17) | get_field1(insn, 2, 12, 16)) as i32,
                    18,
                );
                s.regs[rd] = imm as u64;
            }
        }
        4 => {
            let funct2 = (insn >> 10) & 3;
            let rd = (((insn >> 7) & 7) | 8) as usize;
            match funct2 {
                0 | 1 => {
                    // c.srli / c.srai
                    let imm = get_field1(insn, 12, 5, 5) | get_field1(insn, 2, 0, 4);
                    if X::BITS == 32 && imm & 0x20 != 0 {
                        return Err(Trap::IllegalInstruction(insn));
                    }
                    s.regs[rd] = if funct2 == 0 {
                        X::shr(s.regs[rd], imm)
                    } else {
                        X::sar(s.regs[rd], imm)
                    };
                }
                2 => {
                    // c.andi
                    let imm = sext(
                        (get_field1(insn, 12, 5, 5) | get_field1(insn, 2, 0, 4)) as i32,
                        6,
                    );
                    s.regs[rd] &= imm as u64;
                }
                _ => {
                    let rs2 = (((insn >> 2) & 7) | 8) as usize;
                    let op = ((insn >> 5) & 3) | ((insn >> (12 - 2)) & 4);
                    match op {
                        0 => s.regs[rd] = X::canon(s.regs[rd].wrapping_sub(s.regs[rs2])),
                        1 => s.regs[rd] ^= s.regs[rs2],
                        2 => s.regs[rd] |= s.regs[rs2],
                        3 => s.regs[rd] &= s.regs[rs2],
                        4 if X::BITS >= 64 => {
                            s.regs[rd] =
                                (s.regs[rd].wrapping_sub(s.regs[rs2]) as i32) as u64;
                        }
                        5 if X::BITS >= 64 => {
                            s.regs[rd] =
                                (s.regs[rd].wrapping_add(s.regs[rs2]) as i32) as u64;
                        }
                        _ => return Err(Trap::IllegalInstruction(insn)),
                    }
                }
            }
        }
        5 => {
            // c.j
            let imm = c_j_imm(insn);
            s.pc = X::canon(pc.wrapping_add(imm as u64));
            return Ok(Ctl::Jump);
        }
        6 | 7 => {
            // c.beqz / c.bnez
            let rs1 = (((insn >> 7) & 7) | 8) as usize;
            let imm = sext(
                (get_field1(insn, 12, 8, 8)
                    | get_field1(insn, 10, 3, 4)
                    | get_field1(insn, 5, 6, 7)
                    | get_field1(insn, 3, 1, 2)
                    | get_field1(insn, 2, 5, 5)) as i32,
                9,
            );
            let taken = (s.regs[rs1] == 0) == (funct3 == 6);
            if taken {
                s.pc = X::canon(pc.wrapping_add(imm as u64));
                return Ok(Ctl::Jump);
            }
        }
        _ => return Err(Trap::IllegalInstruction(insn)),
    }
    Ok(Ctl::Next)
}

fn quadrant2<X: Xlen>(s: &mut Cpu, insn: u32, pc: u64) -> Result<Ctl, Trap> {
    let funct3 = (insn >> 13) & 7;
    let rd = ((insn >> 7) & 0x1f) as usize;
    let rs2 = ((insn >> 2) & 0x1f) as usize;
    match funct3 {
        0 => {
            // c.slli
            let imm = get_field1(insn, 12, 5, 5) | rs2 as u32;
            if X::BITS == 32 && imm & 0x20 != 0 {
                return Err(Trap::IllegalInstruction(insn));
            }
            if rd != 0 {
                s.regs[rd] = X::shl(s.regs[rd], imm);
            }
        }
        1 => {
            // c.fldsp
            if s.fs == 0 {
                return Err(Trap::IllegalInstruction(insn));
            }
            let imm = get_field1(insn, 12, 5, 5)
                | (rs2 as u32 & (3 << 3))
                | get_field1(insn, 2, 6, 8);
            let addr = s.regs[2].wrapping_add(u64::from(imm));
            s.fregs[rd] = s.read_u64(addr)?;
            s.fs = 3;
        }
        2 => {
            // c.lwsp
            let imm = get_field1(insn, 12, 5, 5)
                | (rs2 as u32 & (7 << 2))
                | get_field1(insn, 2, 6, 7);
            let addr = s.regs[2].wrapping_add(u64::from(imm));
            let val = (s.read_u32(addr)? as i32) as u64;
            if rd != 0 {
                s.regs[rd] = val;
            }
        }
        3 => {
            if X::BITS >= 64 {
                // c.ldsp
                let imm = get_field1(insn, 12, 5, 5)
                    | (rs2 as u32 & (3 << 3))
                    | get_field1(insn, 2, 6, 8);
                let addr = s.regs[2].wrapping_add(u64::from(imm));
                let val = s.read_u64(addr)?;
                if rd != 0 {
                    s.regs[rd] = val;
                }
            } else {
                // c.flwsp
                if s.fs == 0 {
                    return Err(Trap::IllegalInstruction(insn));
                }
                let imm = get_field1(insn, 12, 5, 5)
                    | (rs2 as u32 & (7 << 2))
                    | get_field1(insn, 2, 6, 7);
                let addr = s.regs[2].wrapping_add(u64::from(imm));
                s.fregs[rd] = u64::from(s.read_u32(addr)?) | F32_HIGH;
                s.fs = 3;
            }
        }
        4 => {
            if (insn >> 12) & 1 == 0 {
                if rs2 == 0 {
                    // c.jr
                    if rd == 0 {
                        return Err(Trap::IllegalInstruction(insn));
                    }
                    s.pc = s.regs[rd] & !1;
                    return Ok(Ctl::Jump);
                }
                // c.mv
                if rd != 0 {
                    s.regs[rd] = s.regs[rs2];
                }
            } else if rs2 == 0 {
                if rd == 0 {
                    // c.ebreak
                    return Err(Trap::Breakpoint);
                }
                // c.jalr
                let val = pc.wrapping_add(2);
                s.pc = s.regs[rd] & !1;
                s.regs[1] = val;
                return Ok(Ctl::Jump);
            } else if rd != 0 {
                // c.add
                s.regs[rd] = X::canon(s.regs[rd].wrapping_add(s.regs[rs2]));
            }
        }
        5 => {
            // c.fsdsp
            if s.fs == 0 {
                return Err(Trap::IllegalInstruction(insn));
            }
            let imm = get_field1(insn, 10, 3, 5) | get_field1(insn, 7, 6, 8);
            let addr = s.regs[2].wrapping_add(u64::from(imm));
            s.write_u64(addr, s.fregs[rs2])?;
        }
        6 => {
            // c.swsp
            let imm = get_field1(insn, 9, 2, 5) | get_field1(insn, 7, 6, 7);
            let addr = s.regs[2].wrapping_add(u64::from(imm));
            s.write_u32(addr, s.regs[rs2] as u32)?;
        }
        7 => {
            if X::BITS >= 64 {
                // c.sdsp
                let imm = get_field1(insn, 10, 3, 5) | get_field1(insn, 7, 6, 8);
                let addr = s.regs[2].wrapping_add(u64::from(imm));
                s.write_u64(addr, s.regs[rs2])?;
            } else {
                // c.fswsp
                if s.fs == 0 {
                    return Err(Trap::IllegalInstruction(insn));
                }
                let imm = get_field1(insn, 9, 2, 5) | get_field1(insn, 7, 6, 7);
                let addr = s.regs[2].wrapping_add(u64::from(imm));
                s.write_u32(addr, s.fregs[rs2] as u32)?;
            }
        }
        _ => return Err(Trap::IllegalInstruction(insn)),
    }
    Ok(Ctl::Next)
}

/// The c.j / c.jal target offset.
fn c_j_imm(insn: u32) -> i32 {
    sext(
        (get_field1(insn, 12, 11, 11)
            | get_field1(insn, 11, 4, 4)
            | get_field1(insn, 9, 8, 9)
            | get_field1(insn, 8, 10, 10)
            | get_field1(insn, 7, 6, 6)
            | get_field1(insn, 6, 7, 7)
            | get_field1(insn, 3, 1, 3)
            | get_field1(insn, 2, 5, 5)) as i32,
        12,
    )
}
