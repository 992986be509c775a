//! RISC-V full-system emulator library.
//!
//! This crate implements a single-hart RISC-V (RV32/RV64 IMAFDC) machine
//! emulator with the following:
//! 1. **Core:** An interpreter batched over basic blocks, with dynamic XLEN,
//!    precise traps, LR/SC and the full privileged architecture (M/S/U).
//! 2. **Memory:** A software MMU (bare/Sv32/Sv39/Sv48), three direct-mapped
//!    TLBs, and a physical memory map routing accesses to RAM or MMIO.
//! 3. **FPU:** F and D extensions over the host floating-point environment,
//!    with NaN boxing, directed rounding, and accrued exception flags.
//! 4. **SoC:** CLINT, PLIC, and HTIF devices plus pluggable MMIO windows.
//! 5. **Machine:** Boot glue — image placement, flattened device tree, reset
//!    shim — and the cooperative outer run loop.

/// Common types and constants (traps, access classes, page geometry).
pub mod common;
/// Machine configuration (defaults, JSON deserialization).
pub mod config;
/// CPU core: hart state, interpreter, MMU, TLBs, CSR file, FPU.
pub mod core;
/// Instruction field extraction helpers and opcode constants.
pub mod isa;
/// Machine assembly: boot images, device tree, outer run loop.
pub mod sim;
/// System-on-chip: physical memory map and MMIO devices.
pub mod soc;

/// Root configuration type; use `MachineConfig::default()` or deserialize from JSON.
pub use crate::config::MachineConfig;
/// The hart: architectural state plus the interpreter's public surface.
pub use crate::core::cpu::Cpu;
/// Top-level machine; owns the hart and the interrupt controllers.
pub use crate::sim::machine::Machine;
/// Physical memory map; construct ranges with `register_ram`/`register_device`.
pub use crate::soc::memmap::PhysMemMap;
