//! Device model of the pigpu virtual display/compute adapter.
//!
//! The crate covers the driver side of the adapter:
//!
//! - atomic mode-setting for the single primary plane and its CRTC, including scanout format
//!   negotiation and damage-clipped copies into the device's scanout region ([`atomic`]),
//! - buffer submission, which pins client buffer objects and publishes their address/length in
//!   the descriptor region of device memory ([`exec`]),
//! - the register block and device memory those paths program.
//!
//! Buffer objects and client memory are collaborator interfaces ([`BufferObjectTable`],
//! [`UserMemory`]); [`ShmemObjectTable`] and [`VecUserMemory`] are in-process implementations.

pub mod atomic;
pub mod config;
pub mod crtc;
pub mod damage;
pub mod device;
pub mod error;
pub mod exec;
pub mod format;
pub mod framebuffer;
pub mod gem;
pub mod plane;
pub mod regs;
pub mod uaccess;
pub mod vram;

pub use atomic::{
    primary_plane_atomic_check, AtomicRequest, CommitSummary, CrtcUpdate, PlaneUpdate,
    ScanoutLimits, UpdateOutcome,
};
pub use config::PiGpuConfig;
pub use crtc::{Crtc, CrtcId, CrtcState, DisplayMode, ModeConfig};
pub use damage::Rect;
pub use device::{DeviceId, PiGpuDevice, PiGpuHw, UnplugHandle};
pub use error::{ConfigError, ExecError, FramebufferError, ModesetError, UserFault};
pub use format::{format_mod_supported, FormatModifier, PixelFormat};
pub use framebuffer::{Framebuffer, FramebufferCreate};
pub use gem::{
    BoMapping, BufferObject, BufferObjectTable, DumbBuffer, PinnedBo, ShmemObject,
    ShmemObjectTable,
};
pub use plane::{Plane, PlaneId, PlaneKind, PlaneState};
pub use regs::PiGpuRegs;
pub use uaccess::{UserMemory, VecUserMemory};
pub use vram::Vram;

#[cfg(all(test, not(target_arch = "wasm32")))]
mod proptests;
