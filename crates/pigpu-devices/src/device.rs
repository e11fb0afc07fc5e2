//! Device context.
//!
//! [`PiGpuDevice`] owns the register block, device memory, the primary plane and its CRTC. Every
//! operation that mutates the device takes `&mut self`: callers sharing a device between threads
//! must serialize mode-setting and buffer submission themselves (e.g. behind a `Mutex`). Only
//! logical unplug, through [`UnplugHandle`], may happen concurrently with an operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pigpu_protocol::pigpu_exec::{PigpuExecBuffer, PIGPU_IOCTL_EXEC_BUFFER};
use tracing::{info, warn};

use crate::config::PiGpuConfig;
use crate::crtc::{Crtc, CrtcId, ModeConfig};
use crate::error::{errno, ConfigError, FramebufferError};
use crate::framebuffer::{Framebuffer, FramebufferCreate};
use crate::gem::BufferObjectTable;
use crate::plane::{Plane, PlaneId};
use crate::regs::PiGpuRegs;
use crate::uaccess::UserMemory;
use crate::vram::Vram;

/// Identity of a device instance. Buffer objects record the device that created them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u64);

/// Hardware the driver talks to: the register block and device memory.
#[derive(Clone, Debug)]
pub struct PiGpuHw {
    pub regs: PiGpuRegs,
    pub vram: Vram,
}

/// Shared "device is present" flag.
#[derive(Clone, Debug)]
pub(crate) struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Enters a hardware access section, or returns `None` if the device is gone.
    pub(crate) fn enter(&self) -> Option<DevGuard<'_>> {
        self.is_alive().then_some(DevGuard { _liveness: self })
    }
}

/// Marks a section that touches device memory or registers.
///
/// Unplug does not wait for outstanding guards: it only flips the flag, and a section that already
/// entered keeps running. Long sections re-check [`Liveness::is_alive`] between units of work.
pub(crate) struct DevGuard<'a> {
    _liveness: &'a Liveness,
}

/// Lets another thread (e.g. the bus layer) logically remove the device.
#[derive(Clone, Debug)]
pub struct UnplugHandle(Arc<AtomicBool>);

impl UnplugHandle {
    pub fn unplug(&self) {
        if self.0.swap(false, Ordering::AcqRel) {
            info!("device unplugged");
        }
    }

    pub fn is_unplugged(&self) -> bool {
        !self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct PiGpuDevice {
    pub(crate) id: DeviceId,
    pub(crate) config: PiGpuConfig,
    pub(crate) mode_config: ModeConfig,
    pub(crate) hw: PiGpuHw,
    pub(crate) planes: Vec<Plane>,
    pub(crate) crtc: Crtc,
    pub(crate) liveness: Liveness,
    next_fb_id: u32,
}

impl PiGpuDevice {
    /// Creates and initializes a device: zeroed memory, preset registers, and reset primary plane
    /// and CRTC.
    pub fn attach(id: DeviceId, config: PiGpuConfig) -> Result<Self, ConfigError> {
        let vram = Vram::new(&config)?;
        let mut primary = Plane::new_primary(PlaneId::PRIMARY);
        primary.reset();
        let mut crtc = Crtc::new(CrtcId::PRIMARY, primary.id());
        crtc.reset();

        info!(
            device = id.0,
            vram_size = vram.size(),
            scanout_base = format_args!("0x{:x}", vram.scanout_base()),
            scanout_size = vram.scanout_size(),
            max_width = config.max_width,
            max_height = config.max_height,
            "pigpu device attached"
        );

        Ok(Self {
            id,
            mode_config: ModeConfig::from_config(&config),
            config,
            hw: PiGpuHw {
                regs: PiGpuRegs::default(),
                vram,
            },
            planes: vec![primary],
            crtc,
            liveness: Liveness::new(),
            next_fb_id: 1,
        })
    }

    /// Logically removes the device. Later updates skip hardware access and later submissions
    /// fail with `-ENODEV`.
    pub fn detach(&mut self) {
        if self.liveness.0.swap(false, Ordering::AcqRel) {
            info!(device = self.id.0, "pigpu device detached");
        }
    }

    pub fn unplug_handle(&self) -> UnplugHandle {
        UnplugHandle(Arc::clone(&self.liveness.0))
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn config(&self) -> &PiGpuConfig {
        &self.config
    }

    pub fn mode_config(&self) -> &ModeConfig {
        &self.mode_config
    }

    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    pub fn plane(&self, id: PlaneId) -> Option<&Plane> {
        self.planes.iter().find(|p| p.id() == id)
    }

    pub fn crtc(&self) -> &Crtc {
        &self.crtc
    }

    pub fn regs(&self) -> &PiGpuRegs {
        &self.hw.regs
    }

    /// The scanout region as the emulated device sees it.
    pub fn scanout_bytes(&self) -> &[u8] {
        self.hw.vram.scanout()
    }

    /// Reads one word of the descriptor region.
    pub fn descriptor_word(&self, index: usize) -> Option<u32> {
        self.hw.vram.read_word(index)
    }

    /// Wraps a buffer object in a framebuffer usable by the primary plane.
    pub fn framebuffer_create(
        &mut self,
        objects: &dyn BufferObjectTable,
        req: &FramebufferCreate,
    ) -> Result<Arc<Framebuffer>, FramebufferError> {
        let fb = Framebuffer::create(self.next_fb_id, objects, req).inspect_err(|err| {
            warn!(handle = req.handle, %err, "framebuffer creation rejected");
        })?;
        self.next_fb_id = self.next_fb_id.wrapping_add(1).max(1);
        Ok(Arc::new(fb))
    }

    /// Custom command entry point. Returns 0 or a negative errno.
    pub fn ioctl(
        &mut self,
        cmd: u32,
        arg: &[u8],
        objects: &dyn BufferObjectTable,
        user: &dyn UserMemory,
    ) -> i32 {
        match cmd {
            PIGPU_IOCTL_EXEC_BUFFER => {
                let Some(args) = PigpuExecBuffer::decode_from_le_bytes(arg) else {
                    return -errno::EINVAL;
                };
                match self.exec_buffer(&args, objects, user) {
                    Ok(()) => 0,
                    Err(err) => err.errno(),
                }
            }
            _ => -errno::EINVAL,
        }
    }
}
