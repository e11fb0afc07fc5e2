//! Device memory: descriptor region and scanout region.

use pigpu_protocol::pigpu_vram::DESCRIPTOR_REGION_WORDS;
use tracing::debug;

use crate::config::PiGpuConfig;
use crate::error::ConfigError;

#[derive(Clone, Debug)]
pub struct Vram {
    data: Vec<u8>,
    scanout_base: usize,
    scanout_size: usize,
}

impl Vram {
    pub fn new(config: &PiGpuConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let scanout_size = usize::try_from(config.scanout_size_bytes())
            .map_err(|_| ConfigError::Invalid("scanout region does not fit in memory"))?;
        Ok(Self {
            data: vec![0; config.vram_size_bytes],
            scanout_base: config.scanout_base,
            scanout_size,
        })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn scanout_base(&self) -> usize {
        self.scanout_base
    }

    pub fn scanout_size(&self) -> usize {
        self.scanout_size
    }

    /// Writes a 32-bit word into the descriptor region. `index` is a word index. Returns `false`
    /// without writing if `index` is outside the region.
    #[must_use]
    pub fn write_word(&mut self, index: usize, value: u32) -> bool {
        if index >= DESCRIPTOR_REGION_WORDS {
            return false;
        }
        let off = index * 4;
        debug!(
            word = format_args!("0x{index:04x}"),
            value = format_args!("0x{value:08x}"),
            "write descriptor word"
        );
        self.data[off..off + 4].copy_from_slice(&value.to_le_bytes());
        true
    }

    pub fn read_word(&self, index: usize) -> Option<u32> {
        if index >= DESCRIPTOR_REGION_WORDS {
            return None;
        }
        let off = index * 4;
        Some(u32::from_le_bytes([
            self.data[off],
            self.data[off + 1],
            self.data[off + 2],
            self.data[off + 3],
        ]))
    }

    pub fn scanout(&self) -> &[u8] {
        &self.data[self.scanout_base..self.scanout_base + self.scanout_size]
    }

    /// Mutable view of `len` scanout bytes starting at `offset` (relative to the scanout base).
    /// `None` if the range leaves the scanout region.
    pub fn scanout_span_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        if end > self.scanout_size {
            return None;
        }
        let base = self.scanout_base;
        Some(&mut self.data[base + offset..base + end])
    }
}
