//! Interpreter main loop and 32-bit instruction dispatch.
//!
//! Execution is batched over basic blocks: a fetch window spans from the
//! current virtual PC to the end of its page, resolved once through the
//! fetch TLB, and instructions are decoded straight out of the RAM buffer
//! until control flow leaves the window. Interrupts and the cycle budget
//! are sampled only at window boundaries, so asynchronous events land
//! between blocks.
//!
//! The dispatch is monomorphised over [`Xlen`]; the 32-bit and 64-bit
//! interpreters are two instantiations of the same code, and a dynamic
//! XLEN change simply exits the loop so the dispatcher re-enters the other
//! one.
//!
//! A 32-bit encoding whose fetch straddles a page boundary is assembled
//! from two halves, the second pulled through the fetch slow path so a
//! fault on the second page is reported precisely.

use crate::common::constants::{PAGE_MASK, PAGE_SHIFT, TLB_SIZE};
use crate::common::error::Trap;
use crate::core::arch::mode::PrivilegeMode;
use crate::core::arch::xlen::{div32, divu32, rem32, remu32, Xlen};
use crate::core::fpu;
use crate::core::fpu::nan_handling::{F32_HIGH, FSIGN_MASK32, FSIGN_MASK64};
use crate::isa::opcodes::*;

use super::csr::CsrEffect;
use super::Cpu;

/// Where control goes after one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Ctl {
    /// Fall through to the next sequential instruction.
    Next,
    /// `pc` has been set; resolve a new fetch window.
    Jump,
    /// Leave the interpreter loop; `pc` has been set.
    Stop,
}

impl Cpu {
    /// Publishes the live retired-instruction count mid-loop.
    pub(crate) fn sync_insn_counter(&mut self) {
        self.insn_counter = self
            .insn_counter_addend
            .wrapping_sub(self.n_cycles as u64);
    }
}

/// Runs up to `n_cycles` instructions of the current XLEN instantiation.
pub(crate) fn interp<X: Xlen>(s: &mut Cpu, n_cycles: u64) {
    if n_cycles == 0 {
        return;
    }
    s.insn_counter_addend = s.insn_counter.wrapping_add(n_cycles);
    s.n_cycles = n_cycles as i64;

    if s.irq.mip() & s.mie != 0 && s.raise_interrupt() {
        s.n_cycles -= 1;
        s.sync_insn_counter();
        return;
    }

    // Fetch window: `ptr`/`end` are offsets into one RAM range, and
    // `to_pc + ptr` is the virtual PC.
    let mut ram: usize = 0;
    let mut ptr: usize = 0;
    let mut end: usize = 0;
    let mut to_pc: u64 = s.pc;

    loop {
        let insn: u32;
        if ptr >= end {
            s.pc = to_pc.wrapping_add(ptr as u64);
            if s.n_cycles <= 0 {
                break;
            }
            if s.irq.mip() & s.mie != 0 && s.raise_interrupt() {
                s.n_cycles -= 1;
                break;
            }
            let addr = s.pc;
            let idx = ((addr >> PAGE_SHIFT) as usize) & (TLB_SIZE - 1);
            let e = s.tlb_code[idx];
            let off = if e.vaddr == addr & !PAGE_MASK {
                ram = e.ram as usize;
                addr.wrapping_add(e.addend) as usize
            } else {
                match s.read_insn_slow(addr) {
                    Ok((r, o)) => {
                        ram = r;
                        o
                    }
                    Err(trap) => {
                        s.n_cycles -= 1;
                        s.raise_trap(&trap);
                        break;
                    }
                }
            };
            ptr = off;
            end = off + (PAGE_MASK - 1 - (addr & PAGE_MASK)) as usize;
            to_pc = addr.wrapping_sub(ptr as u64);
            if ptr >= end {
                // Window opens within the last two bytes of the page: the
                // encoding may straddle into the next one.
                let lo = u32::from(s.mem_map.ram(ram).read_u16(ptr));
                if lo & 3 == 3 {
                    match s.read_insn_u16(addr.wrapping_add(2)) {
                        Ok(hi) => insn = lo | (u32::from(hi) << 16),
                        Err(trap) => {
                            s.n_cycles -= 1;
                            s.raise_trap(&trap);
                            break;
                        }
                    }
                } else {
                    insn = lo;
                }
            } else {
                insn = s.mem_map.ram(ram).read_u32(ptr);
            }
        } else {
            insn = s.mem_map.ram(ram).read_u32(ptr);
        }

        s.n_cycles -= 1;
        let pc = to_pc.wrapping_add(ptr as u64);
        let res = if insn & 3 == 3 {
            exec_insn32::<X>(s, insn, pc)
        } else {
            super::compressed::exec_compressed::<X>(s, insn & 0xffff, pc)
        };
        match res {
            Ok(Ctl::Next) => ptr += if insn & 3 == 3 { 4 } else { 2 },
            Ok(Ctl::Jump) => {
                ptr = 0;
                end = 0;
                to_pc = s.pc;
            }
            Ok(Ctl::Stop) => break,
            Err(trap) => {
                s.pc = pc;
                // One exception counts as one extra cycle.
                s.n_cycles -= 1;
                s.raise_trap(&trap);
                break;
            }
        }
    }

    s.sync_insn_counter();
}

/// Expands the LR/SC/AMO group for one access width.
macro_rules! exec_amo {
    ($s:expr, $insn:expr, $rd:expr, $rs1:expr, $rs2:expr,
     $read:ident, $write:ident, $ity:ty, $uty:ty) => {{
        let addr = $s.regs[$rs1];
        let funct5 = $insn >> 27;
        let val: u64;
        match funct5 {
            0x02 => {
                // lr
                if $rs2 != 0 {
                    return Err(Trap::IllegalInstruction($insn));
                }
                let rval = $s.$read(addr)?;
                val = (rval as $ity) as u64;
                $s.load_res = Some(addr);
            }
            0x03 => {
                // sc: succeeds only against the live reservation, and
                // consumes it either way.
                if $s.load_res == Some(addr) {
                    $s.$write(addr, $s.regs[$rs2] as $uty)?;
                    val = 0;
                } else {
                    val = 1;
                }
                $s.load_res = None;
            }
            0x01 | 0x00 | 0x04 | 0x0c | 0x08 | 0x10 | 0x14 | 0x18 | 0x1c => {
                let rval = $s.$read(addr)?;
                val = (rval as $ity) as u64;
                let mut val2 = $s.regs[$rs2];
                match funct5 {
                    0x01 => {} // amoswap
                    0x00 => val2 = ((val as $ity).wrapping_add(val2 as $ity)) as u64,
                    0x04 => val2 = ((val as $ity) ^ (val2 as $ity)) as u64,
                    0x0c => val2 = ((val as $ity) & (val2 as $ity)) as u64,
                    0x08 => val2 = ((val as $ity) | (val2 as $ity)) as u64,
                    0x10 => {
                        if (val as $ity) < (val2 as $ity) {
                            val2 = (val as $ity) as u64;
                        }
                    }
                    0x14 => {
                        if (val as $ity) > (val2 as $ity) {
                            val2 = (val as $ity) as u64;
                        }
                    }
                    0x18 => {
                        if (val as $uty) < (val2 as $uty) {
                            val2 = (val as $ity) as u64;
                        }
                    }
                    _ => {
                        if (val as $uty) > (val2 as $uty) {
                            val2 = (val as $ity) as u64;
                        }
                    }
                }
                $s.$write(addr, val2 as $uty)?;
            }
            _ => return Err(Trap::IllegalInstruction($insn)),
        }
        if $rd != 0 {
            $s.regs[$rd] = val;
        }
    }};
}

/// Executes one 32-bit instruction at `pc`. Control-flow instructions set
/// `s.pc` themselves and return `Jump`/`Stop`.
fn exec_insn32<X: Xlen>(s: &mut Cpu, insn: u32, pc: u64) -> Result<Ctl, Trap> {
    let opcode = insn & 0x7f;
    let rd = ((insn >> 7) & 0x1f) as usize;
    let rs1 = ((insn >> 15) & 0x1f) as usize;
    let rs2 = ((insn >> 20) & 0x1f) as usize;

    match opcode {
        OP_LUI => {
            if rd != 0 {
                s.regs[rd] = ((insn & 0xffff_f000) as i32) as u64;
            }
        }
        OP_AUIPC => {
            if rd != 0 {
                s.regs[rd] =
                    X::canon(pc.wrapping_add(((insn & 0xffff_f000) as i32) as u64));
            }
        }
        OP_JAL => {
            let mut imm = ((insn >> (31 - 20)) & (1 << 20))
                | ((insn >> (21 - 1)) & 0x7fe)
                | ((insn >> (20 - 11)) & (1 << 11))
                | (insn & 0xff000);
            imm = (((imm as i32) << 11) >> 11) as u32;
            if rd != 0 {
                s.regs[rd] = pc.wrapping_add(4);
            }
            s.pc = X::canon(pc.wrapping_add((imm as i32) as u64));
            return Ok(Ctl::Jump);
        }
        OP_JALR => {
            let imm = (insn as i32) >> 20;
            let val = pc.wrapping_add(4);
            s.pc = X::canon(s.regs[rs1].wrapping_add(imm as u64)) & !1;
            if rd != 0 {
                s.regs[rd] = val;
            }
            return Ok(Ctl::Jump);
        }
        OP_BRANCH => {
            let funct3 = (insn >> 12) & 7;
            let cond = match funct3 >> 1 {
                0 => s.regs[rs1] == s.regs[rs2],
                2 => (s.regs[rs1] as i64) < (s.regs[rs2] as i64),
                3 => s.regs[rs1] < s.regs[rs2],
                _ => return Err(Trap::IllegalInstruction(insn)),
            };
            if cond ^ (funct3 & 1 != 0) {
                let mut imm = ((insn >> (31 - 12)) & (1 << 12))
                    | ((insn >> (25 - 5)) & 0x7e0)
                    | ((insn >> (8 - 1)) & 0x1e)
                    | ((insn << (11 - 7)) & (1 << 11));
                imm = (((imm as i32) << 19) >> 19) as u32;
                s.pc = X::canon(pc.wrapping_add((imm as i32) as u64));
                return Ok(Ctl::Jump);
            }
        }
        OP_LOAD => {
            let funct3 = (insn >> 12) & 7;
            let imm = (insn as i32) >> 20;
            let addr = s.regs[rs1].wrapping_add(imm as u64);
            let val = match funct3 {
                0 => (s.read_u8(addr)? as i8) as u64,
                1 => (s.read_u16(addr)? as i16) as u64,
                2 => (s.read_u32(addr)? as i32) as u64,
                4 => u64::from(s.read_u8(addr)?),
                5 => u64::from(s.read_u16(addr)?),
                3 if X::BITS >= 64 => s.read_u64(addr)?,
                6 if X::BITS >= 64 => u64::from(s.read_u32(addr)?),
                _ => return Err(Trap::IllegalInstruction(insn)),
            };
            if rd != 0 {
                s.regs[rd] = val;
            }
        }
        OP_STORE => {
            let funct3 = (insn >> 12) & 7;
            let imm = rd as u32 | ((insn >> (25 - 5)) & 0xfe0);
            let imm = ((imm as i32) << 20) >> 20;
            let addr = s.regs[rs1].wrapping_add(imm as u64);
            let val = s.regs[rs2];
            match funct3 {
                0 => s.write_u8(addr, val as u8)?,
                1 => s.write_u16(addr, val as u16)?,
                2 => s.write_u32(addr, val as u32)?,
                3 if X::BITS >= 64 => s.write_u64(addr, val)?,
                _ => return Err(Trap::IllegalInstruction(insn)),
            }
        }
        OP_IMM => {
            let funct3 = (insn >> 12) & 7;
            let imm = (insn as i32) >> 20;
            let val = match funct3 {
                0 => X::canon(s.regs[rs1].wrapping_add(imm as u64)),
                1 => {
                    if imm as u32 & !(X::BITS - 1) != 0 {
                        return Err(Trap::IllegalInstruction(insn));
                    }
                    X::shl(s.regs[rs1], imm as u32 & (X::BITS - 1))
                }
                2 => ((s.regs[rs1] as i64) < i64::from(imm)) as u64,
                3 => (s.regs[rs1] < imm as u64) as u64,
                4 => s.regs[rs1] ^ imm as u64,
                5 => {
                    if imm as u32 & !((X::BITS - 1) | 0x400) != 0 {
                        return Err(Trap::IllegalInstruction(insn));
                    }
                    let sh = imm as u32 & (X::BITS - 1);
                    if imm & 0x400 != 0 {
                        X::sar(s.regs[rs1], sh)
                    } else {
                        X::shr(s.regs[rs1], sh)
                    }
                }
                6 => s.regs[rs1] | imm as u64,
                _ => s.regs[rs1] & imm as u64,
            };
            if rd != 0 {
                s.regs[rd] = val;
            }
        }
        OP_IMM_32 if X::BITS >= 64 => {
            let funct3 = (insn >> 12) & 7;
            let imm = (insn as i32) >> 20;
            let rv = s.regs[rs1];
            let val = match funct3 {
                0 => (rv.wrapping_add(imm as u64) as i32) as u64,
                1 => {
                    if imm & !31 != 0 {
                        return Err(Trap::IllegalInstruction(insn));
                    }
                    ((rv << (imm & 31)) as i32) as u64
                }
                5 => {
                    if imm & !(31 | 0x400) != 0 {
                        return Err(Trap::IllegalInstruction(insn));
                    }
                    let sh = imm as u32 & 31;
                    if imm & 0x400 != 0 {
                        ((rv as i32) >> sh) as u64
                    } else {
                        (((rv as u32) >> sh) as i32) as u64
                    }
                }
                _ => return Err(Trap::IllegalInstruction(insn)),
            };
            if rd != 0 {
                s.regs[rd] = val;
            }
        }
        OP_REG => {
            let funct7 = insn >> 25;
            let a = s.regs[rs1];
            let b = s.regs[rs2];
            let val = if funct7 == 1 {
                match (insn >> 12) & 7 {
                    0 => X::mul(a, b),
                    1 => X::mulh(a, b),
                    2 => X::mulhsu(a, b),
                    3 => X::mulhu(a, b),
                    4 => X::div(a, b),
                    5 => X::divu(a, b),
                    6 => X::rem(a, b),
                    _ => X::remu(a, b),
                }
            } else {
                if funct7 & !0x20 != 0 {
                    return Err(Trap::IllegalInstruction(insn));
                }
                let funct3 = ((insn >> 12) & 7) | ((insn >> (30 - 3)) & (1 << 3));
                match funct3 {
                    0 => X::canon(a.wrapping_add(b)),
                    8 => X::canon(a.wrapping_sub(b)),
                    1 => X::shl(a, (b as u32) & (X::BITS - 1)),
                    2 => ((a as i64) < (b as i64)) as u64,
                    3 => (a < b) as u64,
                    4 => a ^ b,
                    5 => X::shr(a, (b as u32) & (X::BITS - 1)),
                    13 => X::sar(a, (b as u32) & (X::BITS - 1)),
                    6 => a | b,
                    7 => a & b,
                    _ => return Err(Trap::IllegalInstruction(insn)),
                }
            };
            if rd != 0 {
                s.regs[rd] = val;
            }
        }
        OP_REG_32 if X::BITS >= 64 => {
            let funct7 = insn >> 25;
            let a = s.regs[rs1];
            let b = s.regs[rs2];
            let val = if funct7 == 1 {
                match (insn >> 12) & 7 {
                    0 => ((a as i32).wrapping_mul(b as i32)) as u64,
                    4 => div32(a as i32, b as i32) as u64,
                    5 => (divu32(a as u32, b as u32) as i32) as u64,
                    6 => rem32(a as i32, b as i32) as u64,
                    7 => (remu32(a as u32, b as u32) as i32) as u64,
                    _ => return Err(Trap::IllegalInstruction(insn)),
                }
            } else {
                if funct7 & !0x20 != 0 {
                    return Err(Trap::IllegalInstruction(insn));
                }
                let funct3 = ((insn >> 12) & 7) | ((insn >> (30 - 3)) & (1 << 3));
                match funct3 {
                    0 => (a.wrapping_add(b) as i32) as u64,
                    8 => (a.wrapping_sub(b) as i32) as u64,
                    1 => (((a as u32) << (b & 31)) as i32) as u64,
                    5 => (((a as u32) >> (b & 31)) as i32) as u64,
                    13 => ((a as i32) >> (b & 31)) as u64,
                    _ => return Err(Trap::IllegalInstruction(insn)),
                }
            };
            if rd != 0 {
                s.regs[rd] = val;
            }
        }
        OP_MISC_MEM => match (insn >> 12) & 7 {
            0 => {
                // fence: ordering is trivial on a single in-order hart.
                if insn & 0xf00f_ff80 != 0 {
                    return Err(Trap::IllegalInstruction(insn));
                }
            }
            1 => {
                if insn != 0x0000_100f {
                    return Err(Trap::IllegalInstruction(insn));
                }
            }
            _ => return Err(Trap::IllegalInstruction(insn)),
        },
        OP_AMO => match (insn >> 12) & 7 {
            2 => exec_amo!(s, insn, rd, rs1, rs2, read_u32, write_u32, i32, u32),
            3 if X::BITS >= 64 => {
                exec_amo!(s, insn, rd, rs1, rs2, read_u64, write_u64, i64, u64)
            }
            _ => return Err(Trap::IllegalInstruction(insn)),
        },
        OP_SYSTEM => return exec_system::<X>(s, insn, pc, rd, rs1),
        OP_LOAD_FP => {
            if s.fs == 0 {
                return Err(Trap::IllegalInstruction(insn));
            }
            let imm = (insn as i32) >> 20;
            let addr = s.regs[rs1].wrapping_add(imm as u64);
            match (insn >> 12) & 7 {
                2 => s.fregs[rd] = u64::from(s.read_u32(addr)?) | F32_HIGH,
                3 => s.fregs[rd] = s.read_u64(addr)?,
                _ => return Err(Trap::IllegalInstruction(insn)),
            }
            s.fs = 3;
        }
        OP_STORE_FP => {
            if s.fs == 0 {
                return Err(Trap::IllegalInstruction(insn));
            }
            let imm = rd as u32 | ((insn >> (25 - 5)) & 0xfe0);
            let imm = ((imm as i32) << 20) >> 20;
            let addr = s.regs[rs1].wrapping_add(imm as u64);
            match (insn >> 12) & 7 {
                2 => s.write_u32(addr, s.fregs[rs2] as u32)?,
                3 => s.write_u64(addr, s.fregs[rs2])?,
                _ => return Err(Trap::IllegalInstruction(insn)),
            }
        }
        OP_MADD | OP_MSUB | OP_NMSUB | OP_NMADD => {
            exec_fma(s, insn, opcode, rd, rs1, rs2)?;
        }
        OP_FP => return exec_op_fp::<X>(s, insn, rd, rs1, rs2).map(|()| Ctl::Next),
        _ => return Err(Trap::IllegalInstruction(insn)),
    }
    Ok(Ctl::Next)
}

/// SYSTEM opcode: CSR accesses, ECALL/EBREAK, xRET, WFI, SFENCE.VMA.
fn exec_system<X: Xlen>(
    s: &mut Cpu,
    insn: u32,
    pc: u64,
    rd: usize,
    rs1: usize,
) -> Result<Ctl, Trap> {
    let mut funct3 = (insn >> 12) & 7;
    let csr = insn >> 20;
    let val = if funct3 & 4 != 0 {
        rs1 as u64
    } else {
        s.regs[rs1]
    };
    funct3 &= 3;
    match funct3 {
        1 => {
            // csrrw
            s.sync_insn_counter();
            let old = s
                .csr_read(csr, true)
                .map_err(|()| Trap::IllegalInstruction(insn))?;
            let old = X::canon(old);
            let effect = s
                .csr_write(csr, val)
                .map_err(|()| Trap::IllegalInstruction(insn))?;
            if rd != 0 {
                s.regs[rd] = old;
            }
            csr_effect::<X>(s, effect, pc)
        }
        2 | 3 => {
            // csrrs / csrrc
            s.sync_insn_counter();
            let old = s
                .csr_read(csr, rs1 != 0)
                .map_err(|()| Trap::IllegalInstruction(insn))?;
            let old = X::canon(old);
            let effect = if rs1 != 0 {
                let new = if funct3 == 2 { old | val } else { old & !val };
                s.csr_write(csr, new)
                    .map_err(|()| Trap::IllegalInstruction(insn))?
            } else {
                CsrEffect::None
            };
            if rd != 0 {
                s.regs[rd] = old;
            }
            csr_effect::<X>(s, effect, pc)
        }
        0 => {
            match csr {
                0x000 => {
                    // ecall
                    if insn & 0x000f_ff80 != 0 {
                        return Err(Trap::IllegalInstruction(insn));
                    }
                    Err(match s.priv_mode {
                        PrivilegeMode::User => Trap::EnvironmentCallFromUMode,
                        PrivilegeMode::Supervisor => Trap::EnvironmentCallFromSMode,
                        PrivilegeMode::Machine => Trap::EnvironmentCallFromMMode,
                    })
                }
                0x001 => {
                    // ebreak
                    if insn & 0x000f_ff80 != 0 {
                        return Err(Trap::IllegalInstruction(insn));
                    }
                    Err(Trap::Breakpoint)
                }
                0x102 => {
                    // sret
                    if insn & 0x000f_ff80 != 0
                        || s.priv_mode < PrivilegeMode::Supervisor
                    {
                        return Err(Trap::IllegalInstruction(insn));
                    }
                    s.pc = pc;
                    s.handle_sret();
                    Ok(Ctl::Stop)
                }
                0x302 => {
                    // mret
                    if insn & 0x000f_ff80 != 0 || s.priv_mode < PrivilegeMode::Machine {
                        return Err(Trap::IllegalInstruction(insn));
                    }
                    s.pc = pc;
                    s.handle_mret();
                    Ok(Ctl::Stop)
                }
                0x105 => {
                    // wfi: quiesce unless an enabled interrupt is already
                    // pending.
                    if insn & 0x0000_7f80 != 0 || s.priv_mode == PrivilegeMode::User {
                        return Err(Trap::IllegalInstruction(insn));
                    }
                    if s.irq.mip() & s.mie == 0 {
                        s.irq.set_power_down(true);
                        s.pc = pc.wrapping_add(4);
                        Ok(Ctl::Stop)
                    } else {
                        Ok(Ctl::Next)
                    }
                }
                _ => {
                    if csr >> 5 == 0x09 {
                        // sfence.vma
                        if insn & 0x0000_7f80 != 0 || s.priv_mode == PrivilegeMode::User
                        {
                            return Err(Trap::IllegalInstruction(insn));
                        }
                        if rs1 == 0 {
                            s.tlb_flush_all();
                        } else {
                            let va = s.regs[rs1];
                            s.tlb_flush_vaddr(va);
                        }
                        // The fetch window may now be stale.
                        s.pc = pc.wrapping_add(4);
                        Ok(Ctl::Jump)
                    } else {
                        Err(Trap::IllegalInstruction(insn))
                    }
                }
            }
        }
        _ => Err(Trap::IllegalInstruction(insn)),
    }
}

/// Applies a CSR write side effect to the loop control flow.
fn csr_effect<X: Xlen>(s: &mut Cpu, effect: CsrEffect, pc: u64) -> Result<Ctl, Trap> {
    match effect {
        CsrEffect::None => Ok(Ctl::Next),
        CsrEffect::TlbFlushed => {
            s.pc = pc.wrapping_add(4);
            Ok(Ctl::Jump)
        }
        CsrEffect::RestartLoop => {
            s.pc = pc.wrapping_add(4);
            Ok(Ctl::Stop)
        }
    }
}

/// Fused multiply-add group (FMADD/FMSUB/FNMSUB/FNMADD).
fn exec_fma(
    s: &mut Cpu,
    insn: u32,
    opcode: u32,
    rd: usize,
    rs1: usize,
    rs2: usize,
) -> Result<(), Trap> {
    if s.fs == 0 {
        return Err(Trap::IllegalInstruction(insn));
    }
    let fmt = (insn >> 25) & 3;
    let rs3 = (insn >> 27) as usize;
    let rm = s
        .insn_rounding_mode((insn >> 12) & 7)
        .ok_or(Trap::IllegalInstruction(insn))?;
    let (neg_a, neg_c) = match opcode {
        OP_MADD => (false, false),
        OP_MSUB => (false, true),
        OP_NMSUB => (true, false),
        _ => (true, true),
    };
    match fmt {
        0 => {
            let mut a = s.fregs[rs1];
            let mut c = s.fregs[rs3];
            if neg_a {
                a ^= FSIGN_MASK32;
            }
            if neg_c {
                c ^= FSIGN_MASK32;
            }
            s.fregs[rd] = u64::from(fpu::fma_sf32(
                a as u32,
                s.fregs[rs2] as u32,
                c as u32,
                rm,
                &mut s.fflags,
            )) | F32_HIGH;
        }
        1 => {
            let mut a = s.fregs[rs1];
            let mut c = s.fregs[rs3];
            if neg_a {
                a ^= FSIGN_MASK64;
            }
            if neg_c {
                c ^= FSIGN_MASK64;
            }
            s.fregs[rd] = fpu::fma_sf64(a, s.fregs[rs2], c, rm, &mut s.fflags);
        }
        _ => return Err(Trap::IllegalInstruction(insn)),
    }
    s.fs = 3;
    Ok(())
}

/// OP-FP dispatch (computational, convert, compare, move, classify).
fn exec_op_fp<X: Xlen>(
    s: &mut Cpu,
    insn: u32,
    rd: usize,
    rs1: usize,
    rs2: usize,
) -> Result<(), Trap> {
    if s.fs == 0 {
        return Err(Trap::IllegalInstruction(insn));
    }
    let funct7 = insn >> 25;
    let rm_field = (insn >> 12) & 7;
    let illegal = || Trap::IllegalInstruction(insn);

    match funct7 {
        // fadd / fsub / fmul / fdiv
        0x00 => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            s.fregs[rd] = u64::from(fpu::add_sf32(
                s.fregs[rs1] as u32,
                s.fregs[rs2] as u32,
                rm,
                &mut s.fflags,
            )) | F32_HIGH;
            s.fs = 3;
        }
        0x01 => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            s.fregs[rd] = fpu::add_sf64(s.fregs[rs1], s.fregs[rs2], rm, &mut s.fflags);
            s.fs = 3;
        }
        0x04 => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            s.fregs[rd] = u64::from(fpu::sub_sf32(
                s.fregs[rs1] as u32,
                s.fregs[rs2] as u32,
                rm,
                &mut s.fflags,
            )) | F32_HIGH;
            s.fs = 3;
        }
        0x05 => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            s.fregs[rd] = fpu::sub_sf64(s.fregs[rs1], s.fregs[rs2], rm, &mut s.fflags);
            s.fs = 3;
        }
        0x08 => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            s.fregs[rd] = u64::from(fpu::mul_sf32(
                s.fregs[rs1] as u32,
                s.fregs[rs2] as u32,
                rm,
                &mut s.fflags,
            )) | F32_HIGH;
            s.fs = 3;
        }
        0x09 => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            s.fregs[rd] = fpu::mul_sf64(s.fregs[rs1], s.fregs[rs2], rm, &mut s.fflags);
            s.fs = 3;
        }
        0x0c => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            s.fregs[rd] = u64::from(fpu::div_sf32(
                s.fregs[rs1] as u32,
                s.fregs[rs2] as u32,
                rm,
                &mut s.fflags,
            )) | F32_HIGH;
            s.fs = 3;
        }
        0x0d => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            s.fregs[rd] = fpu::div_sf64(s.fregs[rs1], s.fregs[rs2], rm, &mut s.fflags);
            s.fs = 3;
        }
        0x2c => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            if rs2 != 0 {
                return Err(illegal());
            }
            s.fregs[rd] =
                u64::from(fpu::sqrt_sf32(s.fregs[rs1] as u32, rm, &mut s.fflags))
                    | F32_HIGH;
            s.fs = 3;
        }
        0x2d => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            if rs2 != 0 {
                return Err(illegal());
            }
            s.fregs[rd] = fpu::sqrt_sf64(s.fregs[rs1], rm, &mut s.fflags);
            s.fs = 3;
        }
        // sign injection
        0x10 => {
            s.fregs[rd] = match rm_field {
                0 => (s.fregs[rs1] & !FSIGN_MASK32) | (s.fregs[rs2] & FSIGN_MASK32),
                1 => {
                    (s.fregs[rs1] & !FSIGN_MASK32)
                        | ((s.fregs[rs2] & FSIGN_MASK32) ^ FSIGN_MASK32)
                }
                2 => s.fregs[rs1] ^ (s.fregs[rs2] & FSIGN_MASK32),
                _ => return Err(illegal()),
            };
            s.fs = 3;
        }
        0x11 => {
            s.fregs[rd] = match rm_field {
                0 => (s.fregs[rs1] & !FSIGN_MASK64) | (s.fregs[rs2] & FSIGN_MASK64),
                1 => {
                    (s.fregs[rs1] & !FSIGN_MASK64)
                        | ((s.fregs[rs2] & FSIGN_MASK64) ^ FSIGN_MASK64)
                }
                2 => s.fregs[rs1] ^ (s.fregs[rs2] & FSIGN_MASK64),
                _ => return Err(illegal()),
            };
            s.fs = 3;
        }
        // fmin / fmax
        0x14 => {
            let v = match rm_field {
                0 => fpu::min_sf32(s.fregs[rs1] as u32, s.fregs[rs2] as u32, &mut s.fflags),
                1 => fpu::max_sf32(s.fregs[rs1] as u32, s.fregs[rs2] as u32, &mut s.fflags),
                _ => return Err(illegal()),
            };
            s.fregs[rd] = u64::from(v) | F32_HIGH;
            s.fs = 3;
        }
        0x15 => {
            s.fregs[rd] = match rm_field {
                0 => fpu::min_sf64(s.fregs[rs1], s.fregs[rs2], &mut s.fflags),
                1 => fpu::max_sf64(s.fregs[rs1], s.fregs[rs2], &mut s.fflags),
                _ => return Err(illegal()),
            };
            s.fs = 3;
        }
        // float → integer conversions
        0x60 => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            let a = s.fregs[rs1] as u32;
            let val = match rs2 {
                0 => (fpu::cvt_sf32_i32(a, rm, &mut s.fflags)) as u64,
                1 => (fpu::cvt_sf32_u32(a, rm, &mut s.fflags) as i32) as u64,
                2 if X::BITS >= 64 => fpu::cvt_sf32_i64(a, rm, &mut s.fflags) as u64,
                3 if X::BITS >= 64 => fpu::cvt_sf32_u64(a, rm, &mut s.fflags),
                _ => return Err(illegal()),
            };
            if rd != 0 {
                s.regs[rd] = val;
            }
        }
        0x61 => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            let a = s.fregs[rs1];
            let val = match rs2 {
                0 => (fpu::cvt_sf64_i32(a, rm, &mut s.fflags)) as u64,
                1 => (fpu::cvt_sf64_u32(a, rm, &mut s.fflags) as i32) as u64,
                2 if X::BITS >= 64 => fpu::cvt_sf64_i64(a, rm, &mut s.fflags) as u64,
                3 if X::BITS >= 64 => fpu::cvt_sf64_u64(a, rm, &mut s.fflags),
                _ => return Err(illegal()),
            };
            if rd != 0 {
                s.regs[rd] = val;
            }
        }
        // comparisons
        0x50 => {
            let (a, b) = (s.fregs[rs1] as u32, s.fregs[rs2] as u32);
            let val = match rm_field {
                0 => fpu::le_sf32(a, b, &mut s.fflags),
                1 => fpu::lt_sf32(a, b, &mut s.fflags),
                2 => fpu::eq_quiet_sf32(a, b, &mut s.fflags),
                _ => return Err(illegal()),
            };
            if rd != 0 {
                s.regs[rd] = u64::from(val);
            }
        }
        0x51 => {
            let (a, b) = (s.fregs[rs1], s.fregs[rs2]);
            let val = match rm_field {
                0 => fpu::le_sf64(a, b, &mut s.fflags),
                1 => fpu::lt_sf64(a, b, &mut s.fflags),
                2 => fpu::eq_quiet_sf64(a, b, &mut s.fflags),
                _ => return Err(illegal()),
            };
            if rd != 0 {
                s.regs[rd] = u64::from(val);
            }
        }
        // integer → float conversions
        0x68 => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            let v = s.regs[rs1];
            let bits = match rs2 {
                0 => fpu::cvt_i32_sf32(v as i32, rm, &mut s.fflags),
                1 => fpu::cvt_u32_sf32(v as u32, rm, &mut s.fflags),
                2 if X::BITS >= 64 => fpu::cvt_i64_sf32(v as i64, rm, &mut s.fflags),
                3 if X::BITS >= 64 => fpu::cvt_u64_sf32(v, rm, &mut s.fflags),
                _ => return Err(illegal()),
            };
            s.fregs[rd] = u64::from(bits) | F32_HIGH;
            s.fs = 3;
        }
        0x69 => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            let v = s.regs[rs1];
            s.fregs[rd] = match rs2 {
                0 => fpu::cvt_i32_sf64(v as i32, rm, &mut s.fflags),
                1 => fpu::cvt_u32_sf64(v as u32, rm, &mut s.fflags),
                2 if X::BITS >= 64 => fpu::cvt_i64_sf64(v as i64, rm, &mut s.fflags),
                3 if X::BITS >= 64 => fpu::cvt_u64_sf64(v, rm, &mut s.fflags),
                _ => return Err(illegal()),
            };
            s.fs = 3;
        }
        // float → float conversions
        0x20 => {
            let rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            if rs2 != 1 {
                return Err(illegal());
            }
            s.fregs[rd] =
                u64::from(fpu::cvt_sf64_sf32(s.fregs[rs1], rm, &mut s.fflags)) | F32_HIGH;
            s.fs = 3;
        }
        0x21 => {
            let _rm = s.insn_rounding_mode(rm_field).ok_or_else(illegal)?;
            if rs2 != 0 {
                return Err(illegal());
            }
            s.fregs[rd] = fpu::cvt_sf32_sf64(s.fregs[rs1] as u32, &mut s.fflags);
            s.fs = 3;
        }
        // fmv.x / fclass
        0x70 => {
            if rs2 != 0 {
                return Err(illegal());
            }
            let val = match rm_field {
                0 => (s.fregs[rs1] as i32) as u64,
                1 => u64::from(fpu::fclass_sf32(s.fregs[rs1] as u32)),
                _ => return Err(illegal()),
            };
            if rd != 0 {
                s.regs[rd] = val;
            }
        }
        0x71 => {
            if rs2 != 0 {
                return Err(illegal());
            }
            let val = match rm_field {
                0 if X::BITS >= 64 => s.fregs[rs1],
                1 => u64::from(fpu::fclass_sf64(s.fregs[rs1])),
                _ => return Err(illegal()),
            };
            if rd != 0 {
                s.regs[rd] = val;
            }
        }
        // fmv to the FP file
        0x78 => {
            if rs2 != 0 || rm_field != 0 {
                return Err(illegal());
            }
            s.fregs[rd] = (s.regs[rs1] as i32) as u64;
            s.fs = 3;
        }
        0x79 if X::BITS >= 64 => {
            if rs2 != 0 || rm_field != 0 {
                return Err(illegal());
            }
            s.fregs[rd] = s.regs[rs1];
            s.fs = 3;
        }
        _ => return Err(illegal()),
    }
    Ok(())
}
