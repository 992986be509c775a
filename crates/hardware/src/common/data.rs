//! Memory access classes.
//!
//! The access class selects the permission bit checked during translation
//! and the fault cause raised when the check fails.

/// Class of a memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    /// Data read (load instructions, AMO reads). Requires R (or X with MXR).
    Read,
    /// Data write (store instructions, AMO writes, SC). Requires W.
    Write,
    /// Instruction fetch. Requires X.
    Fetch,
}
