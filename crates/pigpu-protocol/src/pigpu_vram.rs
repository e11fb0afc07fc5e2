//! Device memory (VRAM) layout.
//!
//! VRAM is one flat region split into two disjoint parts:
//!
//! - the descriptor region at the start, addressed in 32-bit words, where the buffer-submission
//!   path publishes the instruction/frame buffer descriptors, and
//! - the scanout region, starting at a fixed byte offset past the descriptors, which the display
//!   path fills with pixel data.
//!
//! Descriptor offsets below are *word* indices (multiply by 4 for a byte offset).

/// Instruction buffer address, low 32 bits. The high half follows at `+ 1`.
pub const INS_BUFFER_OFFSET: usize = 0x0000;
/// Offset inside the instruction buffer where execution starts.
pub const INS_BUFFER_START_OFFSET: usize = 0x0002;
/// Number of instruction bytes to execute.
pub const INS_BUFFER_LEN_OFFSET: usize = 0x0003;

/// Frame buffer address, low 32 bits. The high half follows at `+ 1`.
pub const FRM_BUFFER_OFFSET: usize = 0x1000;
/// Frame buffer length, low 32 bits. The high half follows at `+ 1`.
pub const FRM_BUFFER_LEN_OFFSET: usize = 0x1002;

/// Number of words covered by the descriptor region.
pub const DESCRIPTOR_REGION_WORDS: usize = FRM_BUFFER_LEN_OFFSET + 2;
pub const DESCRIPTOR_REGION_BYTES: usize = DESCRIPTOR_REGION_WORDS * 4;

/// Default byte offset of the scanout region.
pub const SCANOUT_BASE_DEFAULT: usize = 0x1_0000;

/// Maximum scanout pitch: `(4096 - 1) & !0b111`, kept a multiple of 8 for aligned row access.
pub const PIGPU_MAX_PITCH: u32 = 0x1ff << 3;

/// Maximum number of scanout bytes (`pitch * height`).
pub const PIGPU_MAX_SCANOUT_BYTES: u64 = 4 * 1024 * 1024;

const _: () = {
    assert!(PIGPU_MAX_PITCH == 4088);
    assert!(PIGPU_MAX_PITCH % 8 == 0);
    assert!(INS_BUFFER_LEN_OFFSET < FRM_BUFFER_OFFSET);
    assert!(DESCRIPTOR_REGION_BYTES <= SCANOUT_BASE_DEFAULT);
};

/// Low 32 bits of a 64-bit value.
pub const fn lo32(value: u64) -> u32 {
    (value & 0xffff_ffff) as u32
}

/// High 32 bits of a 64-bit value.
pub const fn hi32(value: u64) -> u32 {
    ((value >> 32) & 0xffff_ffff) as u32
}
