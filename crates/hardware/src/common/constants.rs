//! Global system constants.
//!
//! This module defines system-wide constants used across the emulator:
//! 1. **Page geometry:** Size, shift, and mask for the 4 KiB page.
//! 2. **TLB:** Entry count for the direct-mapped translation caches.
//! 3. **Timing:** The virtual real-time clock frequency and divider.

/// Page size in bytes (4 KiB).
pub const PAGE_SIZE: u64 = 4096;

/// Number of bits to shift to convert between bytes and pages.
pub const PAGE_SHIFT: u64 = 12;

/// Mask for extracting the page offset from an address.
pub const PAGE_MASK: u64 = PAGE_SIZE - 1;

/// Number of entries in each direct-mapped TLB (read, write, fetch).
pub const TLB_SIZE: usize = 256;

/// Virtual real-time clock frequency in Hz (10 MHz).
pub const RTC_FREQ: u64 = 10_000_000;

/// Retired instructions per RTC tick; scales the instruction counter to a
/// 10 MHz clock relative to the nominal core frequency.
pub const RTC_FREQ_DIV: u64 = 16;
