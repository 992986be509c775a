//! Rounding modes and host environment control.
//!
//! RISC-V defines five rounding modes:
//!
//! | Value | Mode | Description                             |
//! |-------|------|-----------------------------------------|
//! | 0b000 | RNE  | Round to nearest, ties to even          |
//! | 0b001 | RTZ  | Round towards zero                      |
//! | 0b010 | RDN  | Round down (towards −∞)                 |
//! | 0b011 | RUP  | Round up (towards +∞)                   |
//! | 0b100 | RMM  | Round to nearest, ties to max magnitude |
//!
//! The first four map onto the C floating-point environment; RMM has no
//! host equivalent and is approximated by RNE for arithmetic (conversions
//! to integer implement it exactly in the kernel).
//!
//! `host_op` brackets one host operation: set the rounding direction,
//! clear the exception state, run, read the raised exceptions back, and
//! restore round-to-nearest (the Rust default the rest of the process
//! expects).

use libc::c_int;

use super::exception_flags::{fflags_from_host, FE_ALL_EXCEPT};

extern "C" {
    fn fesetround(round: c_int) -> c_int;
    fn feclearexcept(excepts: c_int) -> c_int;
    fn fetestexcept(excepts: c_int) -> c_int;
}

/// Host `FE_TONEAREST`.
#[cfg(target_arch = "aarch64")]
const FE_TONEAREST: c_int = 0;
/// Host `FE_TOWARDZERO`.
#[cfg(target_arch = "aarch64")]
const FE_TOWARDZERO: c_int = 0xc0_0000;
/// Host `FE_DOWNWARD`.
#[cfg(target_arch = "aarch64")]
const FE_DOWNWARD: c_int = 0x80_0000;
/// Host `FE_UPWARD`.
#[cfg(target_arch = "aarch64")]
const FE_UPWARD: c_int = 0x40_0000;

/// Host `FE_TONEAREST`.
#[cfg(not(target_arch = "aarch64"))]
const FE_TONEAREST: c_int = 0;
/// Host `FE_TOWARDZERO`.
#[cfg(not(target_arch = "aarch64"))]
const FE_TOWARDZERO: c_int = 0xc00;
/// Host `FE_DOWNWARD`.
#[cfg(not(target_arch = "aarch64"))]
const FE_DOWNWARD: c_int = 0x400;
/// Host `FE_UPWARD`.
#[cfg(not(target_arch = "aarch64"))]
const FE_UPWARD: c_int = 0x800;

/// RISC-V rounding mode encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RoundingMode {
    /// Round to nearest, ties to even (the IEEE default).
    Rne = 0b000,
    /// Round towards zero.
    Rtz = 0b001,
    /// Round down (towards −∞).
    Rdn = 0b010,
    /// Round up (towards +∞).
    Rup = 0b011,
    /// Round to nearest, ties to max magnitude.
    Rmm = 0b100,
}

impl RoundingMode {
    /// Decodes a 3-bit rounding mode field.
    ///
    /// Returns `None` for the reserved encodings (0b101, 0b110) and for
    /// the dynamic sentinel (0b111), which the caller must resolve through
    /// `frm` before decoding.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x7 {
            0b000 => Some(Self::Rne),
            0b001 => Some(Self::Rtz),
            0b010 => Some(Self::Rdn),
            0b011 => Some(Self::Rup),
            0b100 => Some(Self::Rmm),
            _ => None,
        }
    }

    fn host(self) -> c_int {
        match self {
            RoundingMode::Rne | RoundingMode::Rmm => FE_TONEAREST,
            RoundingMode::Rtz => FE_TOWARDZERO,
            RoundingMode::Rdn => FE_DOWNWARD,
            RoundingMode::Rup => FE_UPWARD,
        }
    }
}

/// Runs one host floating-point operation under `rm`, returning the result
/// and the `fflags` bits it raised.
pub(crate) fn host_op<R>(rm: RoundingMode, op: impl FnOnce() -> R) -> (R, u32) {
    // SAFETY: fesetround/feclearexcept/fetestexcept only touch the
    // thread-local floating-point environment; the default direction is
    // restored before returning.
    unsafe {
        fesetround(rm.host());
        feclearexcept(FE_ALL_EXCEPT);
    }
    let r = op();
    let host = unsafe { fetestexcept(FE_ALL_EXCEPT) };
    unsafe {
        fesetround(FE_TONEAREST);
    }
    (r, fflags_from_host(host))
}
