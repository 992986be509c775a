//! Machine construction and the outer run loop.
//!
//! One `Machine` is a single-hart RISC-V system with the reference memory
//! layout:
//!
//! | Region             | Base          | Size      |
//! |--------------------|---------------|-----------|
//! | Reset shim and FDT | `0x0000_0000` | 64 KiB    |
//! | CLINT              | `0x0200_0000` | 0xC_0000  |
//! | HTIF               | `0x4000_8000` | 16 B      |
//! | virtio window *i*  | `0x4001_0000` + i·0x1000 | 4 KiB |
//! | PLIC               | `0x4010_0000` | 0x40_0000 |
//! | Framebuffer        | `0x4100_0000` | fb size   |
//! | RAM                | `0x8000_0000` | configured|
//!
//! Booting copies the firmware to the RAM base, places the kernel at an
//! XLEN-dependent alignment above it and the initrd at half of RAM
//! (capped at 128 MiB), builds the device tree at `0x1000 + 64`, and
//! plants a five-instruction shim at the reset vector that enters the
//! firmware with `a0 = hartid` and `a1 = &fdt`.
//!
//! Execution is cooperative: `run` executes one bounded slice and
//! returns; the embedder services timers (via `sleep_duration_ms`),
//! drains the console, and polls for power-off between slices.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::common::constants::{RTC_FREQ, RTC_FREQ_DIV};
use crate::config::MachineConfig;
use crate::core::arch::csr::MIP_MTIP;
use crate::core::cpu::{BaseIsa, Cpu};
use crate::core::irq::IrqLines;
use crate::sim::fdt::FdtBuilder;
use crate::sim::loader::BootImages;
use crate::soc::devices::{Clint, Htif, IrqSignal, MmioDevice, Plic};
use crate::soc::memmap::{
    PhysMemMap, RamHandle, DEVIO_SIZE16, DEVIO_SIZE32, DEVIO_SIZE8, RAM_DIRTY_BITS,
};

/// Size of the low RAM holding the reset shim and the device tree.
const LOW_RAM_SIZE: u64 = 0x10000;
/// Main RAM base address.
const RAM_BASE_ADDR: u64 = 0x8000_0000;
/// CLINT window.
const CLINT_BASE_ADDR: u64 = 0x0200_0000;
/// CLINT window size.
const CLINT_SIZE: u64 = 0x000c_0000;
/// HTIF window.
const HTIF_BASE_ADDR: u64 = 0x4000_8000;
/// First virtio MMIO window.
const VIRTIO_BASE_ADDR: u64 = 0x4001_0000;
/// Size of one virtio MMIO window.
const VIRTIO_SIZE: u64 = 0x1000;
/// PLIC input line of the first virtio window.
const VIRTIO_IRQ: u8 = 1;
/// PLIC window.
const PLIC_BASE_ADDR: u64 = 0x4010_0000;
/// PLIC window size.
const PLIC_SIZE: u64 = 0x0040_0000;
/// Framebuffer base address.
const FRAMEBUFFER_BASE_ADDR: u64 = 0x4100_0000;

/// Reset vector and shim location.
const RESET_VECTOR: u64 = 0x1000;

/// Host-side machine construction and boot failures.
#[derive(Debug, Error)]
pub enum MachineError {
    /// The configured XLEN is not buildable.
    #[error("unsupported xlen {0} (expected 32 or 64)")]
    UnsupportedXlen(u32),
    /// The firmware does not fit in RAM.
    #[error("firmware image ({size} bytes) does not fit in {ram} bytes of RAM")]
    FirmwareTooBig {
        /// Image size.
        size: usize,
        /// Configured RAM size.
        ram: u64,
    },
    /// The kernel does not fit above the firmware.
    #[error("kernel image does not fit in RAM")]
    KernelTooBig,
    /// The initrd does not fit at its placement address.
    #[error("initrd image does not fit in RAM")]
    InitrdTooBig,
    /// An image file could not be read.
    #[error("failed to read image {path}")]
    ImageRead {
        /// Path of the image.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// An ELF image could not be parsed.
    #[error("malformed ELF image")]
    Elf(#[from] object::read::Error),
}

/// A single-hart RISC-V machine.
pub struct Machine {
    cpu: Cpu,
    irq: Arc<IrqLines>,
    clint: Rc<RefCell<Clint>>,
    plic: Rc<RefCell<Plic>>,
    htif: Rc<RefCell<Htif>>,
    base: BaseIsa,
    ram_size: u64,
    cmdline: String,
    virtio_count: usize,
    fb: Option<(RamHandle, u32, u32)>,
}

impl Machine {
    /// Builds the machine from its configuration: registers RAM and the
    /// controller windows, and resets the hart.
    pub fn new(config: &MachineConfig) -> Result<Self, MachineError> {
        let base = match config.xlen {
            32 => BaseIsa::Rv32,
            64 => BaseIsa::Rv64,
            other => return Err(MachineError::UnsupportedXlen(other)),
        };
        let irq = Arc::new(IrqLines::new());
        let mut mem_map = PhysMemMap::new();
        mem_map.register_ram(RAM_BASE_ADDR, config.ram_size, 0);
        mem_map.register_ram(0, LOW_RAM_SIZE, 0);

        let clint = Rc::new(RefCell::new(Clint::new(irq.clone())));
        mem_map.register_device(CLINT_BASE_ADDR, CLINT_SIZE, clint.clone(), DEVIO_SIZE32);

        let plic = Rc::new(RefCell::new(Plic::new(irq.clone())));
        mem_map.register_device(PLIC_BASE_ADDR, PLIC_SIZE, plic.clone(), DEVIO_SIZE32);

        let htif = Rc::new(RefCell::new(Htif::new()));
        mem_map.register_device(HTIF_BASE_ADDR, 16, htif.clone(), DEVIO_SIZE32);

        let fb = config.framebuffer.as_ref().map(|f| {
            let size = (u64::from(f.width) * u64::from(f.height) * 4 + 0xfff) & !0xfff;
            let h = mem_map.register_ram(FRAMEBUFFER_BASE_ADDR, size, RAM_DIRTY_BITS);
            (h, f.width, f.height)
        });

        let cpu = Cpu::new(mem_map, base, irq.clone());
        Ok(Self {
            cpu,
            irq,
            clint,
            plic,
            htif,
            base,
            ram_size: config.ram_size,
            cmdline: config.cmdline.clone(),
            virtio_count: 0,
            fb,
        })
    }

    /// Registers an external device on the next virtio MMIO window and
    /// hands back the PLIC line assigned to it. Must be called before
    /// [`Machine::boot`] so the window appears in the device tree.
    pub fn attach_virtio(&mut self, dev: Rc<RefCell<dyn MmioDevice>>) -> IrqSignal {
        let addr = VIRTIO_BASE_ADDR + self.virtio_count as u64 * VIRTIO_SIZE;
        self.cpu.mem_map_mut().register_device(
            addr,
            VIRTIO_SIZE,
            dev,
            DEVIO_SIZE8 | DEVIO_SIZE16 | DEVIO_SIZE32,
        );
        let irq_num = VIRTIO_IRQ + self.virtio_count as u8;
        self.virtio_count += 1;
        IrqSignal::new(self.plic.clone(), irq_num)
    }

    /// Places the boot images and the device tree in RAM and plants the
    /// reset shim.
    pub fn boot(&mut self, images: &BootImages) -> Result<(), MachineError> {
        if images.firmware.len() as u64 > self.ram_size {
            return Err(MachineError::FirmwareTooBig {
                size: images.firmware.len(),
                ram: self.ram_size,
            });
        }
        let mem = self.cpu.mem_map_mut();
        mem.write_phys_bytes(RAM_BASE_ADDR, &images.firmware);

        let mut kernel_base = 0u64;
        let mut kernel_size = 0u64;
        if let Some(kernel) = &images.kernel {
            // 2 MiB alignment above the firmware (4 MiB for rv32 pages).
            let align: u64 = if self.base == BaseIsa::Rv32 {
                4 << 20
            } else {
                2 << 20
            };
            kernel_base = (images.firmware.len() as u64 + align - 1) & !(align - 1);
            kernel_size = kernel.len() as u64;
            if kernel_base + kernel_size > self.ram_size {
                return Err(MachineError::KernelTooBig);
            }
            mem.write_phys_bytes(RAM_BASE_ADDR + kernel_base, kernel);
        }

        let mut initrd_base = 0u64;
        let mut initrd_size = 0u64;
        if let Some(initrd) = &images.initrd {
            initrd_base = (self.ram_size / 2).min(128 << 20);
            initrd_size = initrd.len() as u64;
            if initrd_base + initrd_size > self.ram_size {
                return Err(MachineError::InitrdTooBig);
            }
            mem.write_phys_bytes(RAM_BASE_ADDR + initrd_base, initrd);
        }

        let fdt_addr = RESET_VECTOR + 8 * 8;
        let fdt = self.build_fdt(
            RAM_BASE_ADDR + kernel_base,
            kernel_size,
            RAM_BASE_ADDR + initrd_base,
            initrd_size,
        );
        let mem = self.cpu.mem_map_mut();
        mem.write_phys_bytes(fdt_addr, &fdt);

        // Reset shim: compute the firmware entry and the FDT address, load
        // the hart id, and jump.
        let shim: [u32; 5] = [
            0x297u32.wrapping_add((RAM_BASE_ADDR - RESET_VECTOR) as u32), // auipc t0, fw
            0x597,                                                        // auipc a1, 0
            0x5_8593 + ((fdt_addr as u32 - 4) << 20),                     // addi a1, a1, fdt
            0xf140_2573,                                                  // csrr a0, mhartid
            0x0002_8067,                                                  // jalr zero, t0, 0
        ];
        for (i, word) in shim.iter().enumerate() {
            mem.phys_write_u32(RESET_VECTOR + 4 * i as u64, *word);
        }

        self.cpu.set_pc(RESET_VECTOR);
        info!(
            ram = self.ram_size,
            firmware = images.firmware.len(),
            kernel = kernel_size,
            initrd = initrd_size,
            "machine booted"
        );
        Ok(())
    }

    fn build_fdt(
        &self,
        kernel_start: u64,
        kernel_size: u64,
        initrd_start: u64,
        initrd_size: u64,
    ) -> Vec<u8> {
        let mut f = FdtBuilder::new();
        let intc_phandle = 1u32;
        let plic_phandle = 2u32;
        let max_xlen = self.base.bits();

        f.begin_node("");
        f.prop_u32("#address-cells", 2);
        f.prop_u32("#size-cells", 2);
        f.prop_str("compatible", "ucbbar,riscvemu-bar_dev");
        f.prop_str("model", "ucbbar,riscvemu-bare");

        f.begin_node("cpus");
        f.prop_u32("#address-cells", 1);
        f.prop_u32("#size-cells", 0);
        f.prop_u32("timebase-frequency", RTC_FREQ as u32);

        f.begin_node_num("cpu", 0);
        f.prop_str("device_type", "cpu");
        f.prop_u32("reg", 0);
        f.prop_str("status", "okay");
        f.prop_str("compatible", "riscv");
        let misa = self.cpu.misa();
        let mut isa = format!("rv{max_xlen}");
        for i in 0..26 {
            if misa & (1 << i) != 0 {
                isa.push((b'a' + i as u8) as char);
            }
        }
        f.prop_str("riscv,isa", &isa);
        f.prop_str(
            "mmu-type",
            if max_xlen <= 32 {
                "riscv,sv32"
            } else {
                "riscv,sv48"
            },
        );
        f.prop_u32("clock-frequency", 2_000_000_000);

        f.begin_node("interrupt-controller");
        f.prop_u32("#interrupt-cells", 1);
        f.prop_empty("interrupt-controller");
        f.prop_str("compatible", "riscv,cpu-intc");
        f.prop_u32("phandle", intc_phandle);
        f.end_node(); // interrupt-controller
        f.end_node(); // cpu
        f.end_node(); // cpus

        f.begin_node_num("memory", RAM_BASE_ADDR);
        f.prop_str("device_type", "memory");
        f.prop_u64_pair("reg", RAM_BASE_ADDR, self.ram_size);
        f.end_node();

        f.begin_node("htif");
        f.prop_str("compatible", "ucb,htif0");
        f.end_node();

        f.begin_node("soc");
        f.prop_u32("#address-cells", 2);
        f.prop_u32("#size-cells", 2);
        f.prop_str_list("compatible", &["ucbbar,riscvemu-bar-soc", "simple-bus"]);
        f.prop_empty("ranges");

        f.begin_node_num("clint", CLINT_BASE_ADDR);
        f.prop_str("compatible", "riscv,clint0");
        f.prop_u32_list(
            "interrupts-extended",
            &[intc_phandle, 3, intc_phandle, 7],
        );
        f.prop_u64_pair("reg", CLINT_BASE_ADDR, CLINT_SIZE);
        f.end_node();

        f.begin_node_num("plic", PLIC_BASE_ADDR);
        f.prop_u32("#interrupt-cells", 1);
        f.prop_empty("interrupt-controller");
        f.prop_str("compatible", "riscv,plic0");
        f.prop_u32("riscv,ndev", 31);
        f.prop_u64_pair("reg", PLIC_BASE_ADDR, PLIC_SIZE);
        f.prop_u32_list(
            "interrupts-extended",
            &[intc_phandle, 9, intc_phandle, 11],
        );
        f.prop_u32("phandle", plic_phandle);
        f.end_node();

        for i in 0..self.virtio_count {
            let addr = VIRTIO_BASE_ADDR + i as u64 * VIRTIO_SIZE;
            f.begin_node_num("virtio", addr);
            f.prop_str("compatible", "virtio,mmio");
            f.prop_u64_pair("reg", addr, VIRTIO_SIZE);
            f.prop_u32_list(
                "interrupts-extended",
                &[plic_phandle, u32::from(VIRTIO_IRQ) + i as u32],
            );
            f.end_node();
        }

        if let Some((h, width, height)) = &self.fb {
            let size = self.cpu.mem_map().ram_by_handle(*h).size;
            f.begin_node_num("framebuffer", FRAMEBUFFER_BASE_ADDR);
            f.prop_str("compatible", "simple-framebuffer");
            f.prop_u64_pair("reg", FRAMEBUFFER_BASE_ADDR, size);
            f.prop_u32("width", *width);
            f.prop_u32("height", *height);
            f.prop_u32("stride", width * 4);
            f.prop_str("format", "a8r8g8b8");
            f.end_node();
        }

        f.end_node(); // soc

        f.begin_node("chosen");
        f.prop_str("bootargs", &self.cmdline);
        if kernel_size > 0 {
            f.prop_u64("riscv,kernel-start", kernel_start);
            f.prop_u64("riscv,kernel-end", kernel_start + kernel_size);
        }
        if initrd_size > 0 {
            f.prop_u64("linux,initrd-start", initrd_start);
            f.prop_u64("linux,initrd-end", initrd_start + initrd_size);
        }
        f.end_node(); // chosen

        f.end_node(); // root
        f.finish()
    }

    /// Current virtual RTC value derived from the retired-instruction
    /// counter (10 MHz nominal).
    pub fn rtc_time(&self) -> u64 {
        self.cpu.cycles() / RTC_FREQ_DIV
    }

    /// Runs one execution slice of up to `budget` instructions, keeping the
    /// CLINT clock in step on both sides.
    pub fn run(&mut self, budget: u64) {
        let t = self.rtc_time();
        self.clint.borrow_mut().set_mtime(t);
        self.cpu.run(budget);
        let t = self.rtc_time();
        self.clint.borrow_mut().set_mtime(t);
    }

    /// How long the embedder may sleep (in milliseconds, bounded by
    /// `max_ms`) before the timer needs service; zero when the hart is
    /// runnable or the timer is already due (in which case MTIP is raised).
    pub fn sleep_duration_ms(&mut self, max_ms: u64) -> u64 {
        let mut delay = max_ms;
        if self.irq.mip() & MIP_MTIP == 0 {
            let t = self.rtc_time();
            self.clint.borrow_mut().set_mtime(t);
            let ticks = self.clint.borrow_mut().ticks_until_due();
            if ticks == 0 {
                delay = 0;
            } else {
                delay = delay.min(ticks / (RTC_FREQ / 1000));
            }
        }
        if !self.cpu.power_down() {
            delay = 0;
        }
        delay
    }

    /// Drains console output produced through HTIF since the last call.
    pub fn console_output(&mut self) -> Vec<u8> {
        self.htif.borrow_mut().drain_console()
    }

    /// True once the guest has requested a clean power-off.
    pub fn power_off(&self) -> bool {
        self.htif.borrow().power_off()
    }

    /// The hart.
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Mutable access to the hart.
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// Drains the framebuffer dirty page bitmap and re-arms write
    /// tracking, so the next stores to scanned-out pages are observed
    /// again. Returns `None` when no framebuffer is configured.
    pub fn take_fb_dirty(&mut self) -> Option<Vec<u64>> {
        let (h, _, _) = self.fb?;
        let size = self.cpu.mem_map().ram_by_handle(h).size;
        let bits = self.cpu.mem_map_mut().read_and_clear_dirty(h);
        self.cpu.flush_tlb_write_range_ram(h, 0, size);
        bits
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("base", &self.base)
            .field("ram_size", &self.ram_size)
            .field("virtio_count", &self.virtio_count)
            .finish_non_exhaustive()
    }
}
