//! Framebuffers: a buffer object described as a 2D surface.

use std::sync::Arc;

use crate::error::FramebufferError;
use crate::format::{FormatModifier, PixelFormat, PRIMARY_PLANE_FORMATS};
use crate::gem::{BufferObject, BufferObjectTable};

/// Client request for a new framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferCreate {
    pub handle: u32,
    pub width: u32,
    pub height: u32,
    pub fourcc: u32,
    pub pitch: u32,
    pub offset: u32,
    pub modifier: u64,
}

/// Framebuffers are shared through `Arc`; plane states hold a clone for as long as they reference
/// the surface.
#[derive(Debug)]
pub struct Framebuffer {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub modifier: FormatModifier,
    pub pitch: u32,
    pub offset: u32,
    pub handle: u32,
    pub bo: Arc<dyn BufferObject>,
}

impl Framebuffer {
    pub(crate) fn create(
        id: u32,
        objects: &dyn BufferObjectTable,
        req: &FramebufferCreate,
    ) -> Result<Self, FramebufferError> {
        let format = PixelFormat::from_fourcc(req.fourcc)
            .filter(|f| PRIMARY_PLANE_FORMATS.contains(f))
            .ok_or(FramebufferError::UnsupportedFormat(req.fourcc))?;
        let modifier = FormatModifier::from_raw(req.modifier)
            .ok_or(FramebufferError::UnsupportedModifier(req.modifier))?;

        // Mode bounds are enforced per CRTC by the atomic check, not here.
        if req.width == 0 || req.height == 0 {
            return Err(FramebufferError::InvalidSize {
                width: req.width,
                height: req.height,
            });
        }

        let min = format
            .min_pitch(req.width)
            .ok_or(FramebufferError::InvalidSize {
                width: req.width,
                height: req.height,
            })?;
        if req.pitch < min {
            return Err(FramebufferError::PitchTooSmall {
                pitch: req.pitch,
                min,
            });
        }

        let bo = objects
            .lookup(req.handle)
            .ok_or(FramebufferError::InvalidHandle(req.handle))?;

        // The last row only needs `width * cpp` bytes.
        let needed = u64::from(req.offset)
            + u64::from(req.pitch) * u64::from(req.height - 1)
            + u64::from(min);
        if (bo.size() as u64) < needed {
            return Err(FramebufferError::BackingTooSmall {
                size: bo.size(),
                needed,
            });
        }

        Ok(Self {
            id,
            width: req.width,
            height: req.height,
            format,
            modifier,
            pitch: req.pitch,
            offset: req.offset,
            handle: req.handle,
            bo,
        })
    }

    /// Byte offset of pixel `(x, y)` inside the backing object.
    pub fn byte_offset(&self, x: u32, y: u32) -> u64 {
        u64::from(self.offset)
            + u64::from(y) * u64::from(self.pitch)
            + u64::from(x) * u64::from(self.format.cpp())
    }
}
