//! Accrued exception flags.
//!
//! The five `fflags` bits, in the architectural layout:
//!
//! | Bit | Flag | Meaning           |
//! |-----|------|-------------------|
//! |  4  | NV   | Invalid operation |
//! |  3  | DZ   | Divide by zero    |
//! |  2  | OF   | Overflow          |
//! |  1  | UF   | Underflow         |
//! |  0  | NX   | Inexact           |
//!
//! plus the translation from the host `<fenv.h>` exception bits.

use libc::c_int;

/// Inexact.
pub const FFLAG_NX: u32 = 1 << 0;
/// Underflow.
pub const FFLAG_UF: u32 = 1 << 1;
/// Overflow.
pub const FFLAG_OF: u32 = 1 << 2;
/// Divide by zero.
pub const FFLAG_DZ: u32 = 1 << 3;
/// Invalid operation.
pub const FFLAG_NV: u32 = 1 << 4;

/// Host `FE_INVALID`.
#[cfg(target_arch = "aarch64")]
const FE_INVALID: c_int = 0x01;
/// Host `FE_DIVBYZERO`.
#[cfg(target_arch = "aarch64")]
const FE_DIVBYZERO: c_int = 0x02;
/// Host `FE_OVERFLOW`.
#[cfg(target_arch = "aarch64")]
const FE_OVERFLOW: c_int = 0x04;
/// Host `FE_UNDERFLOW`.
#[cfg(target_arch = "aarch64")]
const FE_UNDERFLOW: c_int = 0x08;
/// Host `FE_INEXACT`.
#[cfg(target_arch = "aarch64")]
const FE_INEXACT: c_int = 0x10;

/// Host `FE_INVALID`.
#[cfg(not(target_arch = "aarch64"))]
const FE_INVALID: c_int = 0x01;
/// Host `FE_DIVBYZERO`.
#[cfg(not(target_arch = "aarch64"))]
const FE_DIVBYZERO: c_int = 0x04;
/// Host `FE_OVERFLOW`.
#[cfg(not(target_arch = "aarch64"))]
const FE_OVERFLOW: c_int = 0x08;
/// Host `FE_UNDERFLOW`.
#[cfg(not(target_arch = "aarch64"))]
const FE_UNDERFLOW: c_int = 0x10;
/// Host `FE_INEXACT`.
#[cfg(not(target_arch = "aarch64"))]
const FE_INEXACT: c_int = 0x20;

/// All host exception bits we track.
pub(crate) const FE_ALL_EXCEPT: c_int =
    FE_INVALID | FE_DIVBYZERO | FE_OVERFLOW | FE_UNDERFLOW | FE_INEXACT;

/// Translates host exception bits into `fflags` bits.
pub(crate) fn fflags_from_host(host: c_int) -> u32 {
    let mut flags = 0;
    if host & FE_INVALID != 0 {
        flags |= FFLAG_NV;
    }
    if host & FE_DIVBYZERO != 0 {
        flags |= FFLAG_DZ;
    }
    if host & FE_OVERFLOW != 0 {
        flags |= FFLAG_OF;
    }
    if host & FE_UNDERFLOW != 0 {
        flags |= FFLAG_UF;
    }
    if host & FE_INEXACT != 0 {
        flags |= FFLAG_NX;
    }
    flags
}
