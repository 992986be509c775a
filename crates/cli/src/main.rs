//! RISC-V machine emulator CLI.
//!
//! Boots a machine from a firmware image (ELF or raw), with an optional
//! kernel and initrd, then drives the cooperative run loop: execute a
//! slice, pump HTIF console output to stdout, and sleep until the timer
//! needs service while the hart is quiesced in WFI.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rvemu_core::sim::loader::{self, BootImages};
use rvemu_core::sim::Machine;
use rvemu_core::MachineConfig;

/// Instructions per execution slice.
const SLICE_INSNS: u64 = 500_000;

/// Longest host sleep while the hart is idle, in milliseconds.
const MAX_SLEEP_MS: u64 = 10;

#[derive(Parser, Debug)]
#[command(
    name = "rvemu",
    author,
    version,
    about = "RISC-V full-system emulator",
    long_about = "Boot a RISC-V firmware image (ELF or raw binary), with an optional \
                  kernel and initrd. Console output arrives over HTIF; a clean guest \
                  power-off ends the run.\n\nExamples:\n  rvemu -b fw_jump.bin\n  \
                  rvemu -b bbl.elf --kernel Image --initrd rootfs.cpio --xlen 64"
)]
struct Cli {
    /// Firmware image entered at reset (ELF or raw binary).
    #[arg(short = 'b', long)]
    bios: PathBuf,

    /// Kernel image placed above the firmware.
    #[arg(long)]
    kernel: Option<PathBuf>,

    /// Initial ramdisk image.
    #[arg(long)]
    initrd: Option<PathBuf>,

    /// Machine configuration file (JSON).
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Register width (32 or 64); overrides the configuration file.
    #[arg(long)]
    xlen: Option<u32>,

    /// RAM size in MiB; overrides the configuration file.
    #[arg(short = 'm', long)]
    memory: Option<u64>,

    /// Kernel command line; overrides the configuration file.
    #[arg(long)]
    cmdline: Option<String>,

    /// Stop after this many retired instructions.
    #[arg(long)]
    max_insns: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("rvemu: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => MachineConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => MachineConfig::default(),
    };
    if let Some(xlen) = cli.xlen {
        config.xlen = xlen;
    }
    if let Some(mib) = cli.memory {
        config.ram_size = mib * 1024 * 1024;
    }
    if let Some(cmdline) = &cli.cmdline {
        config.cmdline = cmdline.clone();
    }

    let images = BootImages {
        firmware: loader::load_image(&cli.bios)?,
        kernel: cli.kernel.as_deref().map(loader::load_image).transpose()?,
        initrd: cli.initrd.as_deref().map(loader::load_raw).transpose()?,
    };

    let mut machine = Machine::new(&config)?;
    machine.boot(&images)?;

    let stdout = std::io::stdout();
    loop {
        machine.run(SLICE_INSNS);

        let out = machine.console_output();
        if !out.is_empty() {
            let mut handle = stdout.lock();
            handle.write_all(&out)?;
            handle.flush()?;
        }

        if machine.power_off() {
            return Ok(ExitCode::SUCCESS);
        }
        if let Some(max) = cli.max_insns {
            if machine.cpu().cycles() >= max {
                return Ok(ExitCode::SUCCESS);
            }
        }

        let sleep = machine.sleep_duration_ms(MAX_SLEEP_MS);
        if sleep > 0 {
            std::thread::sleep(std::time::Duration::from_millis(sleep));
        }
    }
}
