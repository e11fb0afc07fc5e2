use serde::Deserialize;

use pigpu_protocol::pigpu_vram::{
    DESCRIPTOR_REGION_BYTES, PIGPU_MAX_PITCH, PIGPU_MAX_SCANOUT_BYTES, SCANOUT_BASE_DEFAULT,
};

use crate::error::ConfigError;

/// Device configuration handed over by the platform integration layer at attach time.
///
/// Every field has a default, so a partial JSON/TOML document is enough:
///
/// ```
/// let cfg: pigpu_devices::PiGpuConfig =
///     serde_json::from_str(r#"{ "max_width": 1280, "max_height": 720 }"#).unwrap();
/// assert_eq!(cfg.max_width, 1280);
/// assert_eq!(cfg.max_pitch, 4088);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PiGpuConfig {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    /// Total size of device memory in bytes.
    pub vram_size_bytes: usize,
    /// Byte offset of the scanout region inside device memory.
    pub scanout_base: usize,
    pub max_pitch: u32,
    pub max_scanout_bytes: u64,
    /// Reject submissions carrying two buffers of the same kind instead of letting the later one
    /// overwrite the earlier descriptor.
    pub strict_exec_kinds: bool,
}

impl Default for PiGpuConfig {
    fn default() -> Self {
        Self {
            min_width: 0,
            max_width: 1920,
            min_height: 0,
            max_height: 1080,
            vram_size_bytes: SCANOUT_BASE_DEFAULT + PIGPU_MAX_SCANOUT_BYTES as usize,
            scanout_base: SCANOUT_BASE_DEFAULT,
            max_pitch: PIGPU_MAX_PITCH,
            max_scanout_bytes: PIGPU_MAX_SCANOUT_BYTES,
            strict_exec_kinds: false,
        }
    }
}

impl PiGpuConfig {
    /// Size of the scanout region: the largest frame the limits allow, capped by the memory
    /// budget.
    pub fn scanout_size_bytes(&self) -> u64 {
        (u64::from(self.max_pitch) * u64::from(self.max_height)).min(self.max_scanout_bytes)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(ConfigError::Invalid("maximum width/height must be non-zero"));
        }
        if self.min_width > self.max_width || self.min_height > self.max_height {
            return Err(ConfigError::Invalid("minimum bounds exceed maximum bounds"));
        }
        if self.max_pitch == 0 || self.max_pitch % 8 != 0 {
            return Err(ConfigError::Invalid("max_pitch must be a non-zero multiple of 8"));
        }
        // The pitch register is 16 bits wide.
        if self.max_pitch > u32::from(u16::MAX) {
            return Err(ConfigError::Invalid("max_pitch does not fit the pitch register"));
        }
        if self.scanout_base < DESCRIPTOR_REGION_BYTES {
            return Err(ConfigError::Invalid(
                "scanout region overlaps the descriptor region",
            ));
        }

        let needed = (self.scanout_base as u64)
            .checked_add(self.scanout_size_bytes())
            .ok_or(ConfigError::Invalid("scanout region overflows"))?;
        if (self.vram_size_bytes as u64) < needed {
            return Err(ConfigError::VramTooSmall {
                size: self.vram_size_bytes,
                needed,
            });
        }
        Ok(())
    }
}
