//! Machine assembly and the outer run loop.
//!
//! 1. **Machine:** Lays out the physical address space, owns the hart and
//!    the interrupt controllers, places boot images, and drives execution
//!    slices for the embedder.
//! 2. **FDT:** The flattened-device-tree builder describing the machine to
//!    the booting kernel.
//! 3. **Loader:** Firmware/kernel/initrd image reading (ELF or raw).

/// Flattened device tree builder.
pub mod fdt;

/// Boot image loading.
pub mod loader;

/// Machine construction and run loop.
pub mod machine;

pub use loader::BootImages;
pub use machine::{Machine, MachineError};
