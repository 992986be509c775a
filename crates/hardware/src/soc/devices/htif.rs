//! Host-Target Interface (HTIF).
//!
//! The 16-byte shared-memory channel used by RISC-V reference firmware for
//! console output and clean shutdown: `tohost` at offsets 0/4, `fromhost`
//! at offsets 8/12, each accessed as two 32-bit halves. A command is acted
//! on when the high half of `tohost` is written (a 64-bit guest store is
//! decomposed low-then-high by the bus, so the full value is visible then).
//!
//! Commands:
//! - `tohost` with low word 1: clean power-off.
//! - device 1, cmd 1: the low byte is console output; acknowledged through
//!   `fromhost`.
//! - device 1, cmd 0: console input request; ignored (no input source).

use tracing::debug;

use crate::soc::devices::MmioDevice;

/// HTIF device state.
#[derive(Default)]
pub struct Htif {
    tohost: u64,
    fromhost: u64,
    console_out: Vec<u8>,
    power_off: bool,
}

impl Htif {
    /// Creates an idle HTIF channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the guest has requested a clean shutdown.
    pub fn power_off(&self) -> bool {
        self.power_off
    }

    /// Drains the console output accumulated since the last call.
    pub fn drain_console(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.console_out)
    }

    fn handle_cmd(&mut self) {
        let device = self.tohost >> 56;
        let cmd = (self.tohost >> 48) & 0xff;
        if self.tohost == 1 {
            self.power_off = true;
        } else if device == 1 && cmd == 1 {
            self.console_out.push(self.tohost as u8);
            self.tohost = 0;
            self.fromhost = (device << 56) | (cmd << 48);
        } else if device == 1 && cmd == 0 {
            self.tohost = 0;
        } else {
            debug!(tohost = self.tohost, "unsupported HTIF command");
        }
    }
}

impl MmioDevice for Htif {
    fn read(&mut self, offset: u64, _size_log2: u32) -> u32 {
        match offset {
            0 => self.tohost as u32,
            4 => (self.tohost >> 32) as u32,
            8 => self.fromhost as u32,
            12 => (self.fromhost >> 32) as u32,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u64, val: u32, _size_log2: u32) {
        match offset {
            0 => self.tohost = (self.tohost & !0xffff_ffff) | u64::from(val),
            4 => {
                self.tohost = (self.tohost & 0xffff_ffff) | (u64::from(val) << 32);
                self.handle_cmd();
            }
            8 => self.fromhost = (self.fromhost & !0xffff_ffff) | u64::from(val),
            12 => self.fromhost = (self.fromhost & 0xffff_ffff) | (u64::from(val) << 32),
            _ => {}
        }
    }
}
