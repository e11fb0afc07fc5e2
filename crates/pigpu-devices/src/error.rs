use thiserror::Error;

use crate::crtc::CrtcId;
use crate::damage::Rect;
use crate::device::DeviceId;
use crate::plane::PlaneId;
use pigpu_protocol::pigpu_exec::PigpuExecObjKind;

/// Linux errno values surfaced through the command entry point (always returned negated).
pub mod errno {
    pub const EIO: i32 = 5;
    pub const EFAULT: i32 = 14;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
}

/// A client address range that could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("user memory fault: addr=0x{addr:x} len=0x{len:x}")]
pub struct UserFault {
    pub addr: u64,
    pub len: usize,
}

/// Errors from mode-setting (plane/CRTC state lookup and the atomic check phase).
///
/// A rejected transition leaves every committed state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModesetError {
    #[error("unknown plane {0:?}")]
    UnknownPlane(PlaneId),

    #[error("unknown crtc {0:?}")]
    UnknownCrtc(CrtcId),

    #[error("plane {0:?} has no current state (not reset)")]
    PlaneNotReset(PlaneId),

    #[error("scaling is not supported: src {src_width}x{src_height} -> dst {dst_width}x{dst_height}")]
    ScalingUnsupported {
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    },

    #[error("plane does not support format 0x{0:08x}")]
    UnsupportedFormat(u32),

    #[error("plane must cover the entire crtc")]
    PlaneMustCoverCrtc,

    #[error("source rectangle {src:?} exceeds framebuffer {width}x{height}")]
    SourceOutOfBounds { src: Rect, width: u32, height: u32 },

    #[error("framebuffer {width}x{height} is outside the crtc bounds")]
    SurfaceOutOfBounds { width: u32, height: u32 },

    #[error("pitch {pitch} exceeds maximum pitch {max}")]
    PitchTooLarge { pitch: u32, max: u32 },

    #[error("scanout needs {needed} bytes but the budget is {budget}")]
    MemoryBudgetExceeded { needed: u64, budget: u64 },

    #[error("failed to map framebuffer for scanout: errno {errno}")]
    FramebufferMap { errno: i32 },
}

impl ModesetError {
    pub fn errno(&self) -> i32 {
        match self {
            ModesetError::FramebufferMap { errno } => *errno,
            _ => -errno::EINVAL,
        }
    }
}

/// Errors from the buffer-submission path.
///
/// Every variant is returned only after all pins taken by the request have been released.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("too many buffers: {count} (max {max})")]
    TooManyBuffers { count: u32, max: usize },

    #[error("failed to copy buffer list from client: {0}")]
    Fault(#[from] UserFault),

    #[error("no buffer object for handle {0}")]
    InvalidHandle(u32),

    #[error("failed to pin buffer object {handle}: errno {errno}")]
    PinFailed { handle: u32, errno: i32 },

    #[error("buffer object {0} is mapped as I/O memory")]
    IoMemMapping(u32),

    #[error("buffer object {handle} belongs to device {owner:?}")]
    ForeignDevice { handle: u32, owner: DeviceId },

    #[error("invalid buffer kind flag 0x{flag:02x} for handle {handle}")]
    InvalidKind { handle: u32, flag: u8 },

    #[error("more than one {0:?} buffer in a single submission")]
    DuplicateKind(PigpuExecObjKind),

    #[error("device has been unplugged")]
    NoDevice,
}

impl ExecError {
    /// Negative errno reported to the client.
    pub fn errno(&self) -> i32 {
        match self {
            ExecError::TooManyBuffers { .. }
            | ExecError::InvalidHandle(_)
            | ExecError::InvalidKind { .. }
            | ExecError::DuplicateKind(_) => -errno::EINVAL,
            // Pin failures are propagated as reported by the memory manager.
            ExecError::PinFailed { errno, .. } => *errno,
            ExecError::Fault(_) => -errno::EFAULT,
            ExecError::IoMemMapping(_) => -errno::EIO,
            ExecError::ForeignDevice { .. } | ExecError::NoDevice => -errno::ENODEV,
        }
    }
}

/// Errors from framebuffer creation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramebufferError {
    #[error("no buffer object for handle {0}")]
    InvalidHandle(u32),

    #[error("unsupported pixel format 0x{0:08x}")]
    UnsupportedFormat(u32),

    #[error("unsupported format modifier 0x{0:x}")]
    UnsupportedModifier(u64),

    #[error("invalid framebuffer size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("pitch {pitch} is below the minimum {min}")]
    PitchTooSmall { pitch: u32, min: u32 },

    #[error("buffer object holds {size} bytes but the framebuffer needs {needed}")]
    BackingTooSmall { size: usize, needed: u64 },
}

impl FramebufferError {
    pub fn errno(&self) -> i32 {
        -errno::EINVAL
    }
}

/// Errors from device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),

    #[error("vram too small: {size} bytes, layout needs {needed}")]
    VramTooSmall { size: usize, needed: u64 },
}
