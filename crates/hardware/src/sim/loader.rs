//! Boot image loading.
//!
//! Firmware and kernel images may be ELF executables or raw flat binaries.
//! ELF files are flattened: loadable segments are laid out relative to the
//! lowest segment address, matching what the machine glue expects to copy
//! to the RAM base. Raw images pass through untouched.

use std::path::Path;

use object::{Object, ObjectSegment};

use super::machine::MachineError;

/// The set of images placed into RAM at power-on.
#[derive(Debug, Default)]
pub struct BootImages {
    /// Firmware (e.g. a BBL/OpenSBI build), entered by the reset shim.
    pub firmware: Vec<u8>,
    /// Optional kernel image, placed above the firmware.
    pub kernel: Option<Vec<u8>>,
    /// Optional initial ramdisk.
    pub initrd: Option<Vec<u8>>,
}

/// Reads an image from disk, flattening it when it is an ELF executable.
pub fn load_image(path: &Path) -> Result<Vec<u8>, MachineError> {
    let data = std::fs::read(path).map_err(|source| MachineError::ImageRead {
        path: path.display().to_string(),
        source,
    })?;
    if data.len() >= 4 && data[0..4] == [0x7f, b'E', b'L', b'F'] {
        flatten_elf(&data)
    } else {
        Ok(data)
    }
}

/// Reads an image as raw bytes with no format interpretation.
pub fn load_raw(path: &Path) -> Result<Vec<u8>, MachineError> {
    std::fs::read(path).map_err(|source| MachineError::ImageRead {
        path: path.display().to_string(),
        source,
    })
}

fn flatten_elf(data: &[u8]) -> Result<Vec<u8>, MachineError> {
    let file = object::File::parse(data)?;
    let mut segments: Vec<(u64, &[u8])> = Vec::new();
    for seg in file.segments() {
        let bytes = seg.data()?;
        if !bytes.is_empty() {
            segments.push((seg.address(), bytes));
        }
    }
    if segments.is_empty() {
        return Ok(Vec::new());
    }
    let base = segments.iter().map(|(a, _)| *a).min().unwrap_or(0);
    let end = segments
        .iter()
        .map(|(a, d)| a - base + d.len() as u64)
        .max()
        .unwrap_or(0);
    let mut flat = vec![0u8; end as usize];
    for (addr, bytes) in segments {
        let off = (addr - base) as usize;
        flat[off..off + bytes.len()].copy_from_slice(bytes);
    }
    Ok(flat)
}
