//! Register file.

use pigpu_protocol::pigpu_regs::{
    PIGPU_ID, PIGPU_REGS_SIZE_BYTES, PIGPU_REG_FORMAT, PIGPU_REG_ID, PIGPU_REG_PITCH,
};
use tracing::debug;

use crate::format::PixelFormat;

const REGS_LEN: usize = PIGPU_REGS_SIZE_BYTES as usize;

/// Backing store of the register block. Out-of-range accesses read as zero and drop writes.
#[derive(Clone, Debug)]
pub struct PiGpuRegs {
    bytes: [u8; REGS_LEN],
}

impl Default for PiGpuRegs {
    fn default() -> Self {
        let mut regs = Self {
            bytes: [0; REGS_LEN],
        };
        regs.store(PIGPU_REG_ID, &PIGPU_ID.to_le_bytes());
        regs
    }
}

impl PiGpuRegs {
    fn range(offset: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(len)?;
        (end <= REGS_LEN).then_some(start..end)
    }

    fn store(&mut self, offset: u64, bytes: &[u8]) {
        if let Some(r) = Self::range(offset, bytes.len()) {
            self.bytes[r].copy_from_slice(bytes);
        }
    }

    fn load<const N: usize>(&self, offset: u64) -> [u8; N] {
        let mut out = [0u8; N];
        if let Some(r) = Self::range(offset, N) {
            out.copy_from_slice(&self.bytes[r]);
        }
        out
    }

    pub fn read_u8(&self, offset: u64) -> u8 {
        self.load::<1>(offset)[0]
    }

    pub fn read_u16(&self, offset: u64) -> u16 {
        u16::from_le_bytes(self.load(offset))
    }

    pub fn read_u32(&self, offset: u64) -> u32 {
        u32::from_le_bytes(self.load(offset))
    }

    pub fn write_u8(&mut self, offset: u64, value: u8) {
        // The identification register is read-only.
        if offset < PIGPU_REG_ID + 4 {
            return;
        }
        self.store(offset, &[value]);
    }

    pub fn write_u16(&mut self, offset: u64, value: u16) {
        if offset < PIGPU_REG_ID + 4 {
            return;
        }
        self.store(offset, &value.to_le_bytes());
    }

    /// Programs the scanout format.
    pub fn format_set(&mut self, format: PixelFormat) {
        let code = format.device_code() as u8;
        debug!(?format, code, "set scanout format");
        self.write_u8(PIGPU_REG_FORMAT, code);
    }

    /// Programs the scanout pitch. The register is 16 bits wide.
    pub fn pitch_set(&mut self, pitch: u32) {
        let value = pitch as u16;
        debug!(pitch, value, "set scanout pitch");
        self.write_u16(PIGPU_REG_PITCH, value);
    }

    pub fn id(&self) -> u32 {
        self.read_u32(PIGPU_REG_ID)
    }

    pub fn format(&self) -> u8 {
        self.read_u8(PIGPU_REG_FORMAT)
    }

    pub fn pitch(&self) -> u16 {
        self.read_u16(PIGPU_REG_PITCH)
    }
}
