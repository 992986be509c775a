//! Instruction set helpers.
//!
//! Bit-plumbing shared by the interpreter: immediate field relocation for
//! the compressed encodings and the major opcode constants.

/// Immediate field extraction and sign extension.
pub mod bits;

/// Major opcode constants.
pub mod opcodes;
