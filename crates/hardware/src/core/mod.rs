//! CPU core.
//!
//! This module holds everything hart-private:
//! 1. **Architecture:** CSR addresses and field masks, privilege modes,
//!    and the XLEN monomorphisation seam.
//! 2. **CPU:** Hart state, the interpreter, the software MMU and TLBs,
//!    the CSR unit, and trap delivery.
//! 3. **FPU:** The floating-point kernel behind the F/D dispatch.
//! 4. **Interrupt lines:** The shared `mip`/`mie`/power-down word.

/// Architectural definitions (CSRs, privilege modes, XLEN arithmetic).
pub mod arch;

/// Hart state and the interpreter.
pub mod cpu;

/// Floating-point kernel.
pub mod fpu;

/// Shared interrupt lines between the hart, devices, and the embedder.
pub mod irq;
