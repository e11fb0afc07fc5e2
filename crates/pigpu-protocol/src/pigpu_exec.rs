//! Buffer-submission command contract.
//!
//! A client submits up to [`PIGPU_MAX_EXEC_BUFFERS`] buffer objects with custom command
//! [`PIGPU_IOCTL_EXEC_BUFFER`]. The argument block ([`PigpuExecBuffer`]) points at a client-side
//! array of [`PigpuExecBufferObj`] entries; the device resolves every handle, pins it and publishes
//! its address/length in the descriptor region (see [`crate::pigpu_vram`]).

/// Custom command code for buffer submission.
pub const PIGPU_IOCTL_EXEC_BUFFER: u32 = 0x00;

/// Maximum number of buffer objects in one submission: one instruction buffer and one frame
/// buffer.
pub const PIGPU_MAX_EXEC_BUFFERS: usize = 2;

/// `flag` value of an instruction buffer entry.
pub const PIGPU_EXEC_OBJ_INSTRUCTION: u8 = 0x00;
/// `flag` value of a frame buffer entry.
pub const PIGPU_EXEC_OBJ_FRAME: u8 = 0x01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PigpuExecObjKind {
    Instruction,
    Frame,
}

impl PigpuExecObjKind {
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            PIGPU_EXEC_OBJ_INSTRUCTION => Some(Self::Instruction),
            PIGPU_EXEC_OBJ_FRAME => Some(Self::Frame),
            _ => None,
        }
    }

    pub fn flag(self) -> u8 {
        match self {
            Self::Instruction => PIGPU_EXEC_OBJ_INSTRUCTION,
            Self::Frame => PIGPU_EXEC_OBJ_FRAME,
        }
    }
}

/// Argument block of [`PIGPU_IOCTL_EXEC_BUFFER`].
///
/// Layout (`repr(C)`, little-endian, 8-byte aligned):
///
/// | offset | field                |
/// |--------|----------------------|
/// | 0      | `buffers` (u64)      |
/// | 8      | `num_buffers`        |
/// | 12     | `instr_start_offset` |
/// | 16     | `instr_len`          |
/// | 20     | tail padding         |
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PigpuExecBuffer {
    /// Client address of a `[PigpuExecBufferObj; num_buffers]` array.
    pub buffers: u64,
    pub num_buffers: u32,
    /// Offset inside the instruction buffer where execution starts. Usually 0.
    pub instr_start_offset: u32,
    /// Number of bytes to execute from `instr_start_offset`; 0 means the whole buffer.
    pub instr_len: u32,
}

impl PigpuExecBuffer {
    pub const SIZE_BYTES: usize = 24;

    pub fn decode_from_le_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE_BYTES {
            return None;
        }
        Some(Self {
            buffers: u64::from_le_bytes(buf[0..8].try_into().ok()?),
            num_buffers: u32::from_le_bytes(buf[8..12].try_into().ok()?),
            instr_start_offset: u32::from_le_bytes(buf[12..16].try_into().ok()?),
            instr_len: u32::from_le_bytes(buf[16..20].try_into().ok()?),
        })
    }

    pub fn encode_to_le_bytes(&self) -> [u8; Self::SIZE_BYTES] {
        let mut out = [0u8; Self::SIZE_BYTES];
        out[0..8].copy_from_slice(&self.buffers.to_le_bytes());
        out[8..12].copy_from_slice(&self.num_buffers.to_le_bytes());
        out[12..16].copy_from_slice(&self.instr_start_offset.to_le_bytes());
        out[16..20].copy_from_slice(&self.instr_len.to_le_bytes());
        out
    }
}

/// One element of the buffer array referenced by [`PigpuExecBuffer::buffers`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PigpuExecBufferObj {
    /// Buffer-object handle, scoped to the submitting client.
    pub handle: u32,
    /// One of [`PIGPU_EXEC_OBJ_INSTRUCTION`] / [`PIGPU_EXEC_OBJ_FRAME`].
    pub flag: u8,
    pub padding: [u8; 3],
}

impl PigpuExecBufferObj {
    pub const SIZE_BYTES: usize = 8;

    pub fn new(handle: u32, kind: PigpuExecObjKind) -> Self {
        Self {
            handle,
            flag: kind.flag(),
            padding: [0; 3],
        }
    }

    pub fn decode_from_le_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE_BYTES {
            return None;
        }
        Some(Self {
            handle: u32::from_le_bytes(buf[0..4].try_into().ok()?),
            flag: buf[4],
            padding: [buf[5], buf[6], buf[7]],
        })
    }

    pub fn encode_to_le_bytes(&self) -> [u8; Self::SIZE_BYTES] {
        let mut out = [0u8; Self::SIZE_BYTES];
        out[0..4].copy_from_slice(&self.handle.to_le_bytes());
        out[4] = self.flag;
        out[5..8].copy_from_slice(&self.padding);
        out
    }

    /// Encodes a whole descriptor array the way a client lays it out in its own memory.
    pub fn encode_array(objs: &[Self]) -> Vec<u8> {
        objs.iter().flat_map(|obj| obj.encode_to_le_bytes()).collect()
    }
}

const _: () = {
    assert!(core::mem::size_of::<PigpuExecBuffer>() == PigpuExecBuffer::SIZE_BYTES);
    assert!(core::mem::size_of::<PigpuExecBufferObj>() == PigpuExecBufferObj::SIZE_BYTES);
    assert!(core::mem::align_of::<PigpuExecBufferObj>() == 4);
};
