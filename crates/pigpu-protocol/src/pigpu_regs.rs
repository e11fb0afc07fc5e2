//! Register block layout.
//!
//! The block is tiny: an identification word, the scanout format code (8-bit) and the scanout
//! pitch (16-bit). Writes are fire-and-forget; the device never acknowledges them.

/// Read-only identification register (u32).
pub const PIGPU_REG_ID: u64 = 0x00;
/// Scanout format register (u8, see [`crate::pigpu_format::PigpuFormat`]).
pub const PIGPU_REG_FORMAT: u64 = 0x04;
/// Scanout pitch register (u16, bytes).
pub const PIGPU_REG_PITCH: u64 = 0x08;

pub const PIGPU_REGS_SIZE_BYTES: u64 = 0x10;

/// Value of [`PIGPU_REG_ID`] (`"PIGP"` little-endian).
pub const PIGPU_ID: u32 = 0x5047_4950;

const _: () = {
    assert!(PIGPU_REG_ID + 4 <= PIGPU_REG_FORMAT);
    assert!(PIGPU_REG_FORMAT + 1 <= PIGPU_REG_PITCH);
    assert!(PIGPU_REG_PITCH + 2 <= PIGPU_REGS_SIZE_BYTES);
};
