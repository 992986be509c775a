//! Trap definitions.
//!
//! This module defines the synchronous exception taxonomy. Every value
//! matches the RISC-V privileged specification cause encoding so guest
//! debuggers and trap handlers see standard numbers:
//! 1. **Cause codes:** `code()` returns the architectural cause.
//! 2. **Trap values:** `tval()` returns what belongs in `mtval`/`stval` —
//!    the faulting address for memory faults, the instruction bits for
//!    illegal instructions, zero otherwise.
//!
//! Interrupts are not represented here; they are delivered by number with
//! the cause MSB set (see the trap controller).

use std::fmt;

use super::data::AccessType;

/// A synchronous exception, carrying its trap value payload.
///
/// Misaligned loads and stores are emulated rather than faulted, so the
/// misaligned variants exist for taxonomy completeness but are never raised
/// by the memory path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trap {
    /// Instruction address misaligned (cause 0). Not raised: misaligned
    /// fetches cannot occur with the C extension enabled.
    InstructionAddressMisaligned(u64),
    /// Instruction access fault (cause 1): fetch from a non-RAM range.
    InstructionAccessFault(u64),
    /// Illegal instruction (cause 2). Carries the raw instruction bits.
    IllegalInstruction(u32),
    /// Breakpoint (cause 3), raised by `EBREAK`/`C.EBREAK`.
    Breakpoint,
    /// Load address misaligned (cause 4). Not raised: emulated.
    LoadAddressMisaligned(u64),
    /// Load access fault (cause 5).
    LoadAccessFault(u64),
    /// Store address misaligned (cause 6). Not raised: emulated.
    StoreAddressMisaligned(u64),
    /// Store/AMO access fault (cause 7).
    StoreAccessFault(u64),
    /// Environment call from U-mode (cause 8).
    EnvironmentCallFromUMode,
    /// Environment call from S-mode (cause 9).
    EnvironmentCallFromSMode,
    /// Environment call from M-mode (cause 11).
    EnvironmentCallFromMMode,
    /// Instruction page fault (cause 12).
    InstructionPageFault(u64),
    /// Load page fault (cause 13).
    LoadPageFault(u64),
    /// Store/AMO page fault (cause 15).
    StorePageFault(u64),
}

/// Highest exception cause code that may be delegated via `medeleg`.
pub const CAUSE_STORE_PAGE_FAULT: u32 = 15;

impl Trap {
    /// Returns the architectural cause code.
    pub fn code(&self) -> u32 {
        match self {
            Trap::InstructionAddressMisaligned(_) => 0,
            Trap::InstructionAccessFault(_) => 1,
            Trap::IllegalInstruction(_) => 2,
            Trap::Breakpoint => 3,
            Trap::LoadAddressMisaligned(_) => 4,
            Trap::LoadAccessFault(_) => 5,
            Trap::StoreAddressMisaligned(_) => 6,
            Trap::StoreAccessFault(_) => 7,
            Trap::EnvironmentCallFromUMode => 8,
            Trap::EnvironmentCallFromSMode => 9,
            Trap::EnvironmentCallFromMMode => 11,
            Trap::InstructionPageFault(_) => 12,
            Trap::LoadPageFault(_) => 13,
            Trap::StorePageFault(_) => 15,
        }
    }

    /// Returns the value stored into `mtval`/`stval` on delivery.
    pub fn tval(&self) -> u64 {
        match self {
            Trap::InstructionAddressMisaligned(addr)
            | Trap::InstructionAccessFault(addr)
            | Trap::LoadAddressMisaligned(addr)
            | Trap::LoadAccessFault(addr)
            | Trap::StoreAddressMisaligned(addr)
            | Trap::StoreAccessFault(addr)
            | Trap::InstructionPageFault(addr)
            | Trap::LoadPageFault(addr)
            | Trap::StorePageFault(addr) => *addr,
            Trap::IllegalInstruction(insn) => u64::from(*insn),
            _ => 0,
        }
    }

    /// Builds the page fault matching an access class.
    pub fn page_fault(access: AccessType, addr: u64) -> Self {
        match access {
            AccessType::Fetch => Trap::InstructionPageFault(addr),
            AccessType::Read => Trap::LoadPageFault(addr),
            AccessType::Write => Trap::StorePageFault(addr),
        }
    }

    /// Builds the access fault matching an access class.
    pub fn access_fault(access: AccessType, addr: u64) -> Self {
        match access {
            AccessType::Fetch => Trap::InstructionAccessFault(addr),
            AccessType::Read => Trap::LoadAccessFault(addr),
            AccessType::Write => Trap::StoreAccessFault(addr),
        }
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trap::IllegalInstruction(insn) => write!(f, "IllegalInstruction({insn:#010x})"),
            Trap::Breakpoint => write!(f, "Breakpoint"),
            Trap::EnvironmentCallFromUMode => write!(f, "EnvironmentCallFromUMode"),
            Trap::EnvironmentCallFromSMode => write!(f, "EnvironmentCallFromSMode"),
            Trap::EnvironmentCallFromMMode => write!(f, "EnvironmentCallFromMMode"),
            other => write!(f, "cause {} tval {:#x}", other.code(), other.tval()),
        }
    }
}
