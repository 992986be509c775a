//! Machine configuration.
//!
//! A small, JSON-deserializable description of the machine to build:
//! register width, RAM size, kernel command line, and the optional
//! framebuffer. Device window base addresses are architectural constants,
//! not configuration.

use serde::Deserialize;

/// Baseline values used when a field is omitted.
mod defaults {
    /// Default register width.
    pub const XLEN: u32 = 64;

    /// Default main RAM size (256 MiB).
    pub const RAM_SIZE: u64 = 256 * 1024 * 1024;
}

/// Optional framebuffer geometry.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct FramebufferConfig {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Machine description.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Register width: 32 or 64.
    pub xlen: u32,
    /// Main RAM size in bytes.
    pub ram_size: u64,
    /// Kernel command line placed in the device tree `chosen` node.
    pub cmdline: String,
    /// Framebuffer geometry, when a framebuffer region is wanted.
    pub framebuffer: Option<FramebufferConfig>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            xlen: defaults::XLEN,
            ram_size: defaults::RAM_SIZE,
            cmdline: String::new(),
            framebuffer: None,
        }
    }
}

impl MachineConfig {
    /// Parses a configuration from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
