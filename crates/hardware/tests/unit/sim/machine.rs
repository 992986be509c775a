//! Machine construction, boot, and run loop tests.

use rvemu_core::sim::{BootImages, Machine, MachineError};
use rvemu_core::MachineConfig;

use crate::common::encode::{addi, jal, lui, store, SELF_JUMP};

const RAM_BASE: u64 = 0x8000_0000;
const HTIF_BASE: u32 = 0x4000_8000;

fn small_config() -> MachineConfig {
    MachineConfig::from_json(r#"{ "ram_size": 4194304 }"#).unwrap()
}

/// Firmware that writes `tohost = 1` (clean power-off) and parks.
fn poweroff_firmware() -> Vec<u8> {
    let words = [
        lui(5, HTIF_BASE >> 12),  // t0 = HTIF base
        addi(6, 0, 1),            // t1 = 1
        store(2, 6, 5, 0),        // sw t1, 0(t0)
        store(2, 0, 5, 4),        // sw x0, 4(t0) — commits the command
        SELF_JUMP,
    ];
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[test]
fn unsupported_xlen_is_rejected() {
    let config = MachineConfig::from_json(r#"{ "xlen": 128 }"#).unwrap();
    match Machine::new(&config) {
        Err(MachineError::UnsupportedXlen(128)) => {}
        other => panic!("expected an xlen error, got {other:?}"),
    }
}

#[test]
fn oversized_firmware_is_rejected() {
    let mut machine = Machine::new(&small_config()).unwrap();
    let images = BootImages {
        firmware: vec![0; 8 * 1024 * 1024],
        ..Default::default()
    };
    assert!(matches!(
        machine.boot(&images),
        Err(MachineError::FirmwareTooBig { .. })
    ));
}

#[test]
fn boot_places_firmware_shim_and_fdt() {
    let mut machine = Machine::new(&small_config()).unwrap();
    let images = BootImages {
        firmware: poweroff_firmware(),
        ..Default::default()
    };
    machine.boot(&images).unwrap();

    let mem = machine.cpu().mem_map();
    // Firmware at the RAM base.
    assert_eq!(mem.phys_read_u32(RAM_BASE), lui(5, HTIF_BASE >> 12));
    // The reset shim: auipc t0 towards the RAM base, ending in jalr.
    assert_eq!(mem.phys_read_u32(0x1000), 0x7fff_f297);
    assert_eq!(mem.phys_read_u32(0x1010), 0x0002_8067);
    // The device tree magic sits at 0x1040.
    assert_eq!(mem.phys_read_u32(0x1040).swap_bytes(), 0xd00d_feed);
    // Reset vector.
    assert_eq!(machine.cpu().pc(), 0x1000);
}

#[test]
fn shim_enters_firmware_with_hartid_and_fdt() {
    let mut machine = Machine::new(&small_config()).unwrap();
    let images = BootImages {
        firmware: poweroff_firmware(),
        ..Default::default()
    };
    machine.boot(&images).unwrap();
    machine.run(100);

    assert!(machine.power_off());
    assert_eq!(machine.cpu().reg(10), 0); // a0 = hartid
    assert_eq!(machine.cpu().reg(11), 0x1040); // a1 = &fdt
}

#[test]
fn kernel_is_placed_at_the_alignment_boundary() {
    let mut machine = Machine::new(&small_config()).unwrap();
    let images = BootImages {
        firmware: vec![0xaa; 0x1000],
        kernel: Some(vec![0xbb; 0x100]),
        initrd: None,
    };
    machine.boot(&images).unwrap();
    // 2 MiB alignment above a 4 KiB firmware.
    assert_eq!(
        machine.cpu().mem_map().phys_read_u8(RAM_BASE + 0x20_0000),
        0xbb
    );
    // The chosen node advertises the kernel window.
    let mem = machine.cpu().mem_map();
    let fdt_size = u64::from(mem.phys_read_u32(0x1044).swap_bytes());
    let blob: Vec<u8> = (0..fdt_size).map(|i| mem.phys_read_u8(0x1040 + i)).collect();
    let needle = b"riscv,kernel-start";
    assert!(blob.windows(needle.len()).any(|w| w == needle));
}

#[test]
fn console_output_flows_through_htif() {
    // Firmware printing 'A' then powering off.
    let mut asm: Vec<u32> = Vec::new();
    asm.push(lui(5, HTIF_BASE >> 12)); // t0 = htif
    // t1 = (1 << 56) | (1 << 48) | 'A' built from halves: high word
    // 0x0101_0000, low word 'A'.
    asm.push(lui(6, 0x0101_0)); // t1 = 0x0101_0000
    asm.push(addi(7, 0, b'A' as i32)); // t2 = 'A'
    asm.push(store(2, 7, 5, 0)); // sw t2, 0(t0)
    asm.push(store(2, 6, 5, 4)); // sw t1, 4(t0) — console putchar
    asm.push(addi(6, 0, 1));
    asm.push(store(2, 6, 5, 0)); // tohost = 1
    asm.push(store(2, 0, 5, 4)); // commit: power off
    asm.push(SELF_JUMP);
    let firmware: Vec<u8> = asm.iter().flat_map(|w| w.to_le_bytes()).collect();

    let mut machine = Machine::new(&small_config()).unwrap();
    machine
        .boot(&BootImages {
            firmware,
            ..Default::default()
        })
        .unwrap();
    machine.run(100);
    assert_eq!(machine.console_output(), b"A");
    assert!(machine.power_off());
}

#[test]
fn rtc_follows_the_instruction_counter() {
    let mut machine = Machine::new(&small_config()).unwrap();
    machine
        .boot(&BootImages {
            firmware: jal(0, 0).to_le_bytes().to_vec(),
            ..Default::default()
        })
        .unwrap();
    machine.run(160);
    assert_eq!(machine.rtc_time(), 10); // 160 instructions / 16
}

#[test]
fn sleep_duration_is_bounded_by_the_timer() {
    let mut machine = Machine::new(&small_config()).unwrap();
    machine
        .boot(&BootImages {
            firmware: jal(0, 0).to_le_bytes().to_vec(),
            ..Default::default()
        })
        .unwrap();
    // Runnable hart: no sleeping.
    assert_eq!(machine.sleep_duration_ms(10), 0);
}
