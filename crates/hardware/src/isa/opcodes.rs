//! Major opcode constants (bits [6:0] of the 32-bit encodings).

/// LUI.
pub const OP_LUI: u32 = 0x37;
/// AUIPC.
pub const OP_AUIPC: u32 = 0x17;
/// JAL.
pub const OP_JAL: u32 = 0x6f;
/// JALR.
pub const OP_JALR: u32 = 0x67;
/// Conditional branches.
pub const OP_BRANCH: u32 = 0x63;
/// Integer loads.
pub const OP_LOAD: u32 = 0x03;
/// Integer stores.
pub const OP_STORE: u32 = 0x23;
/// Integer register-immediate operations.
pub const OP_IMM: u32 = 0x13;
/// 32-bit register-immediate operations (RV64).
pub const OP_IMM_32: u32 = 0x1b;
/// Integer register-register operations.
pub const OP_REG: u32 = 0x33;
/// 32-bit register-register operations (RV64).
pub const OP_REG_32: u32 = 0x3b;
/// SYSTEM: CSR accesses, ECALL/EBREAK, xRET, WFI, SFENCE.VMA.
pub const OP_SYSTEM: u32 = 0x73;
/// MISC-MEM: FENCE and FENCE.I.
pub const OP_MISC_MEM: u32 = 0x0f;
/// Atomics (LR/SC/AMO).
pub const OP_AMO: u32 = 0x2f;
/// Floating-point loads.
pub const OP_LOAD_FP: u32 = 0x07;
/// Floating-point stores.
pub const OP_STORE_FP: u32 = 0x27;
/// Fused multiply-add.
pub const OP_MADD: u32 = 0x43;
/// Fused multiply-subtract.
pub const OP_MSUB: u32 = 0x47;
/// Fused negated multiply-subtract.
pub const OP_NMSUB: u32 = 0x4b;
/// Fused negated multiply-add.
pub const OP_NMADD: u32 = 0x4f;
/// Floating-point computational operations.
pub const OP_FP: u32 = 0x53;
