//! NaN boxing and canonical NaN values.
//!
//! Single-precision values live NaN-boxed in the 64-bit register file:
//! the upper 32 bits are all ones. The kernels consume only the low bits
//! of their operands, so boxing matters on the way *into* the register
//! file, and every NaN produced by an operation is the canonical quiet
//! NaN with a zero payload.

/// Upper-half pattern OR-ed into every 32-bit value written to a 64-bit
/// floating-point register.
pub const F32_HIGH: u64 = !0u64 << 32;

/// Canonical quiet NaN, single precision.
pub const F32_QNAN: u32 = 0x7fc0_0000;

/// Canonical quiet NaN, double precision.
pub const F64_QNAN: u64 = 0x7ff8_0000_0000_0000;

/// Sign bit of a single-precision value.
pub const FSIGN_MASK32: u64 = 1 << 31;

/// Sign bit of a double-precision value.
pub const FSIGN_MASK64: u64 = 1 << 63;
