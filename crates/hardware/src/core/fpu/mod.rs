//! Floating-point kernel.
//!
//! Bit-level F/D operations over the host floating-point unit. The host
//! already implements IEEE 754 arithmetic exactly for every operation we
//! need; what this module adds is the RISC-V contract around it:
//! 1. **Directed rounding** via the C floating-point environment
//!    (`fesetround`), restored to round-to-nearest after each operation.
//! 2. **Accrued flags**: host exception bits are read back with
//!    `fetestexcept` and translated to `fflags` bits; float→integer
//!    conversions compute their flags directly.
//! 3. **NaN discipline**: every arithmetic NaN result is replaced by the
//!    canonical quiet NaN, and min/max/compare follow the IEEE 754-201x
//!    semantics the ISA specifies.
//!
//! Operands and results are raw bit patterns (`u32`/`u64`); callers keep
//! 32-bit values NaN-boxed in the 64-bit register file.
//!
//! RMM (round to nearest, ties away from zero) has no host equivalent and
//! is approximated by round-to-nearest-even for the arithmetic operations;
//! float→integer conversions implement it exactly.

/// Accrued exception flag bits and host-environment translation.
pub mod exception_flags;

/// NaN boxing and canonical NaN constants.
pub mod nan_handling;

/// Rounding mode encoding and host environment control.
pub mod rounding_modes;

pub use exception_flags::{FFLAG_DZ, FFLAG_NV, FFLAG_NX, FFLAG_OF, FFLAG_UF};
pub use nan_handling::{F32_HIGH, F32_QNAN, F64_QNAN};
pub use rounding_modes::RoundingMode;

use self::rounding_modes::host_op;

/// Generates the arithmetic, comparison, conversion, and classification
/// kernels for one precision.
macro_rules! fp_kernels {
    (
        $f:ty, $u:ty, $qnan:expr, $sign_bit:expr,
        $add:ident, $sub:ident, $mul:ident, $div:ident, $sqrt:ident, $fma:ident,
        $min:ident, $max:ident, $eq:ident, $lt:ident, $le:ident, $class:ident,
        $cvt_i32:ident, $cvt_u32:ident, $cvt_i64:ident, $cvt_u64:ident,
        $cvt_from_i32:ident, $cvt_from_u32:ident, $cvt_from_i64:ident, $cvt_from_u64:ident
    ) => {
        /// Addition.
        pub fn $add(a: $u, b: $u, rm: RoundingMode, fflags: &mut u32) -> $u {
            let (r, flags) = host_op(rm, || <$f>::from_bits(a) + <$f>::from_bits(b));
            *fflags |= flags;
            canonicalize(r)
        }

        /// Subtraction.
        pub fn $sub(a: $u, b: $u, rm: RoundingMode, fflags: &mut u32) -> $u {
            let (r, flags) = host_op(rm, || <$f>::from_bits(a) - <$f>::from_bits(b));
            *fflags |= flags;
            canonicalize(r)
        }

        /// Multiplication.
        pub fn $mul(a: $u, b: $u, rm: RoundingMode, fflags: &mut u32) -> $u {
            let (r, flags) = host_op(rm, || <$f>::from_bits(a) * <$f>::from_bits(b));
            *fflags |= flags;
            canonicalize(r)
        }

        /// Division.
        pub fn $div(a: $u, b: $u, rm: RoundingMode, fflags: &mut u32) -> $u {
            let (r, flags) = host_op(rm, || <$f>::from_bits(a) / <$f>::from_bits(b));
            *fflags |= flags;
            canonicalize(r)
        }

        /// Square root.
        pub fn $sqrt(a: $u, rm: RoundingMode, fflags: &mut u32) -> $u {
            let (r, flags) = host_op(rm, || <$f>::from_bits(a).sqrt());
            *fflags |= flags;
            canonicalize(r)
        }

        /// Fused multiply-add (`a * b + c` with a single rounding).
        pub fn $fma(a: $u, b: $u, c: $u, rm: RoundingMode, fflags: &mut u32) -> $u {
            let (r, flags) = host_op(rm, || {
                <$f>::from_bits(a).mul_add(<$f>::from_bits(b), <$f>::from_bits(c))
            });
            *fflags |= flags;
            canonicalize(r)
        }

        /// Minimum, IEEE 754-201x: the non-NaN operand wins, -0 < +0,
        /// signaling inputs raise NV.
        pub fn $min(a: $u, b: $u, fflags: &mut u32) -> $u {
            if is_signaling(a) || is_signaling(b) {
                *fflags |= FFLAG_NV;
            }
            let (fa, fb) = (<$f>::from_bits(a), <$f>::from_bits(b));
            match (fa.is_nan(), fb.is_nan()) {
                (true, true) => $qnan,
                (true, false) => b,
                (false, true) => a,
                (false, false) => {
                    if fa == fb {
                        // Equal magnitude: -0 is the minimum.
                        a | b
                    } else if fa < fb {
                        a
                    } else {
                        b
                    }
                }
            }
        }

        /// Maximum, IEEE 754-201x semantics.
        pub fn $max(a: $u, b: $u, fflags: &mut u32) -> $u {
            if is_signaling(a) || is_signaling(b) {
                *fflags |= FFLAG_NV;
            }
            let (fa, fb) = (<$f>::from_bits(a), <$f>::from_bits(b));
            match (fa.is_nan(), fb.is_nan()) {
                (true, true) => $qnan,
                (true, false) => b,
                (false, true) => a,
                (false, false) => {
                    if fa == fb {
                        // Equal magnitude: +0 is the maximum.
                        a & b
                    } else if fa > fb {
                        a
                    } else {
                        b
                    }
                }
            }
        }

        /// Quiet equality; signaling inputs raise NV.
        pub fn $eq(a: $u, b: $u, fflags: &mut u32) -> u32 {
            if is_signaling(a) || is_signaling(b) {
                *fflags |= FFLAG_NV;
            }
            (<$f>::from_bits(a) == <$f>::from_bits(b)) as u32
        }

        /// Ordered less-than; any NaN input raises NV.
        pub fn $lt(a: $u, b: $u, fflags: &mut u32) -> u32 {
            let (fa, fb) = (<$f>::from_bits(a), <$f>::from_bits(b));
            if fa.is_nan() || fb.is_nan() {
                *fflags |= FFLAG_NV;
                return 0;
            }
            (fa < fb) as u32
        }

        /// Ordered less-or-equal; any NaN input raises NV.
        pub fn $le(a: $u, b: $u, fflags: &mut u32) -> u32 {
            let (fa, fb) = (<$f>::from_bits(a), <$f>::from_bits(b));
            if fa.is_nan() || fb.is_nan() {
                *fflags |= FFLAG_NV;
                return 0;
            }
            (fa <= fb) as u32
        }

        /// FCLASS: one-hot category of the value.
        pub fn $class(a: $u) -> u32 {
            let f = <$f>::from_bits(a);
            let sign = a & $sign_bit != 0;
            if f.is_nan() {
                if is_signaling(a) { 1 << 8 } else { 1 << 9 }
            } else if f.is_infinite() {
                if sign { 1 << 0 } else { 1 << 7 }
            } else if f == 0.0 {
                if sign { 1 << 3 } else { 1 << 4 }
            } else if f.is_subnormal() {
                if sign { 1 << 2 } else { 1 << 5 }
            } else if sign {
                1 << 1
            } else {
                1 << 6
            }
        }

        /// Conversion to i32 with RISC-V saturation (NaN → maximum).
        pub fn $cvt_i32(a: $u, rm: RoundingMode, fflags: &mut u32) -> i32 {
            let f = <$f>::from_bits(a);
            if f.is_nan() {
                *fflags |= FFLAG_NV;
                return i32::MAX;
            }
            let r = round_int(f, rm);
            if r >= 2_147_483_648.0 as $f {
                *fflags |= FFLAG_NV;
                i32::MAX
            } else if r < -2_147_483_648.0 as $f {
                *fflags |= FFLAG_NV;
                i32::MIN
            } else {
                if r != f {
                    *fflags |= FFLAG_NX;
                }
                r as i32
            }
        }

        /// Conversion to u32 with RISC-V saturation.
        pub fn $cvt_u32(a: $u, rm: RoundingMode, fflags: &mut u32) -> u32 {
            let f = <$f>::from_bits(a);
            if f.is_nan() {
                *fflags |= FFLAG_NV;
                return u32::MAX;
            }
            let r = round_int(f, rm);
            if r >= 4_294_967_296.0 as $f {
                *fflags |= FFLAG_NV;
                u32::MAX
            } else if r < 0.0 {
                *fflags |= FFLAG_NV;
                0
            } else {
                if r != f {
                    *fflags |= FFLAG_NX;
                }
                r as u32
            }
        }

        /// Conversion to i64 with RISC-V saturation.
        pub fn $cvt_i64(a: $u, rm: RoundingMode, fflags: &mut u32) -> i64 {
            let f = <$f>::from_bits(a);
            if f.is_nan() {
                *fflags |= FFLAG_NV;
                return i64::MAX;
            }
            let r = round_int(f, rm);
            if r >= 9_223_372_036_854_775_808.0 as $f {
                *fflags |= FFLAG_NV;
                i64::MAX
            } else if r < -9_223_372_036_854_775_808.0 as $f {
                *fflags |= FFLAG_NV;
                i64::MIN
            } else {
                if r != f {
                    *fflags |= FFLAG_NX;
                }
                r as i64
            }
        }

        /// Conversion to u64 with RISC-V saturation.
        pub fn $cvt_u64(a: $u, rm: RoundingMode, fflags: &mut u32) -> u64 {
            let f = <$f>::from_bits(a);
            if f.is_nan() {
                *fflags |= FFLAG_NV;
                return u64::MAX;
            }
            let r = round_int(f, rm);
            if r >= 18_446_744_073_709_551_616.0 as $f {
                *fflags |= FFLAG_NV;
                u64::MAX
            } else if r < 0.0 {
                *fflags |= FFLAG_NV;
                0
            } else {
                if r != f {
                    *fflags |= FFLAG_NX;
                }
                r as u64
            }
        }

        /// Conversion from i32.
        pub fn $cvt_from_i32(v: i32, rm: RoundingMode, fflags: &mut u32) -> $u {
            let (r, flags) = host_op(rm, || v as $f);
            *fflags |= flags;
            r.to_bits()
        }

        /// Conversion from u32.
        pub fn $cvt_from_u32(v: u32, rm: RoundingMode, fflags: &mut u32) -> $u {
            let (r, flags) = host_op(rm, || v as $f);
            *fflags |= flags;
            r.to_bits()
        }

        /// Conversion from i64.
        pub fn $cvt_from_i64(v: i64, rm: RoundingMode, fflags: &mut u32) -> $u {
            let (r, flags) = host_op(rm, || v as $f);
            *fflags |= flags;
            r.to_bits()
        }

        /// Conversion from u64.
        pub fn $cvt_from_u64(v: u64, rm: RoundingMode, fflags: &mut u32) -> $u {
            let (r, flags) = host_op(rm, || v as $f);
            *fflags |= flags;
            r.to_bits()
        }
    };
}

fp_kernels!(
    f32, u32, F32_QNAN, 0x8000_0000u32,
    add_sf32, sub_sf32, mul_sf32, div_sf32, sqrt_sf32, fma_sf32,
    min_sf32, max_sf32, eq_quiet_sf32, lt_sf32, le_sf32, fclass_sf32,
    cvt_sf32_i32, cvt_sf32_u32, cvt_sf32_i64, cvt_sf32_u64,
    cvt_i32_sf32, cvt_u32_sf32, cvt_i64_sf32, cvt_u64_sf32
);

fp_kernels!(
    f64, u64, F64_QNAN, 0x8000_0000_0000_0000u64,
    add_sf64, sub_sf64, mul_sf64, div_sf64, sqrt_sf64, fma_sf64,
    min_sf64, max_sf64, eq_quiet_sf64, lt_sf64, le_sf64, fclass_sf64,
    cvt_sf64_i32, cvt_sf64_u32, cvt_sf64_i64, cvt_sf64_u64,
    cvt_i32_sf64, cvt_u32_sf64, cvt_i64_sf64, cvt_u64_sf64
);

/// Widens f32 to f64 (exact; NaNs canonicalised).
pub fn cvt_sf32_sf64(a: u32, _fflags: &mut u32) -> u64 {
    canonicalize(f64::from(f32::from_bits(a)))
}

/// Narrows f64 to f32 under the given rounding mode.
pub fn cvt_sf64_sf32(a: u64, rm: RoundingMode, fflags: &mut u32) -> u32 {
    let (r, flags) = host_op(rm, || f64::from_bits(a) as f32);
    *fflags |= flags;
    canonicalize(r)
}

fn canonicalize<F: CanonNan>(f: F) -> F::Bits {
    f.canon_bits()
}

/// Canonical-NaN replacement on the way back to bit patterns.
trait CanonNan {
    type Bits;
    fn canon_bits(self) -> Self::Bits;
}

impl CanonNan for f32 {
    type Bits = u32;
    fn canon_bits(self) -> u32 {
        if self.is_nan() { F32_QNAN } else { self.to_bits() }
    }
}

impl CanonNan for f64 {
    type Bits = u64;
    fn canon_bits(self) -> u64 {
        if self.is_nan() { F64_QNAN } else { self.to_bits() }
    }
}

/// Signaling-NaN test on raw bits.
trait SignalingBits {
    fn signaling(self) -> bool;
}

impl SignalingBits for u32 {
    fn signaling(self) -> bool {
        let exp_all = self & 0x7f80_0000 == 0x7f80_0000;
        let frac = self & 0x007f_ffff;
        exp_all && frac != 0 && frac & 0x0040_0000 == 0
    }
}

impl SignalingBits for u64 {
    fn signaling(self) -> bool {
        let exp_all = self & 0x7ff0_0000_0000_0000 == 0x7ff0_0000_0000_0000;
        let frac = self & 0x000f_ffff_ffff_ffff;
        exp_all && frac != 0 && frac & 0x0008_0000_0000_0000 == 0
    }
}

fn is_signaling<B: SignalingBits>(bits: B) -> bool {
    bits.signaling()
}

/// Exact rounding to an integral value under a RISC-V rounding mode.
trait RoundInt {
    fn round_int(self, rm: RoundingMode) -> Self;
}

impl RoundInt for f32 {
    fn round_int(self, rm: RoundingMode) -> f32 {
        match rm {
            RoundingMode::Rne => self.round_ties_even(),
            RoundingMode::Rtz => self.trunc(),
            RoundingMode::Rdn => self.floor(),
            RoundingMode::Rup => self.ceil(),
            RoundingMode::Rmm => self.round(),
        }
    }
}

impl RoundInt for f64 {
    fn round_int(self, rm: RoundingMode) -> f64 {
        match rm {
            RoundingMode::Rne => self.round_ties_even(),
            RoundingMode::Rtz => self.trunc(),
            RoundingMode::Rdn => self.floor(),
            RoundingMode::Rup => self.ceil(),
            RoundingMode::Rmm => self.round(),
        }
    }
}

fn round_int<F: RoundInt>(f: F, rm: RoundingMode) -> F {
    f.round_int(rm)
}
