//! Atomic mode-setting: the primary plane check/update pair and the commit driver.
//!
//! A commit runs in phases. Every affected state is duplicated and the request applied to the
//! duplicates; every plane is checked; visible framebuffers are pinned for CPU access; then each
//! plane is updated (register writes and damage blits into the scanout region) and the pending
//! states replace the current ones. A failure before the update phase discards all pending states,
//! so committed state only ever reflects transitions that passed the check.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::crtc::{CrtcId, CrtcState, DisplayMode, ModeConfig};
use crate::damage::{plane_damage, Rect};
use crate::device::{Liveness, PiGpuDevice, PiGpuHw};
use crate::error::ModesetError;
use crate::format::{convert_row, negotiate, PixelFormat};
use crate::framebuffer::Framebuffer;
use crate::gem::PinnedBo;
use crate::plane::{destroy_state, PlaneId, PlaneState};

/// Pitch and memory ceilings the scanout engine can honour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanoutLimits {
    pub max_pitch: u32,
    pub max_scanout_bytes: u64,
}

/// Requested configuration of one plane.
#[derive(Clone, Debug)]
pub struct PlaneUpdate {
    pub plane: PlaneId,
    pub crtc: Option<CrtcId>,
    pub fb: Option<Arc<Framebuffer>>,
    pub src: Rect,
    pub dst: Rect,
    pub damage: Vec<Rect>,
}

impl PlaneUpdate {
    /// Shows the whole of `fb` on `crtc`, unscaled, at the origin.
    pub fn full_screen(plane: PlaneId, crtc: CrtcId, fb: Arc<Framebuffer>) -> Self {
        let rect = Rect::new(0, 0, fb.width, fb.height);
        Self {
            plane,
            crtc: Some(crtc),
            fb: Some(fb),
            src: rect,
            dst: rect,
            damage: Vec::new(),
        }
    }

    /// Detaches the plane from its CRTC and framebuffer.
    pub fn disable(plane: PlaneId) -> Self {
        Self {
            plane,
            crtc: None,
            fb: None,
            src: Rect::default(),
            dst: Rect::default(),
            damage: Vec::new(),
        }
    }

    pub fn with_damage(mut self, damage: Vec<Rect>) -> Self {
        self.damage = damage;
        self
    }
}

/// Requested CRTC configuration. `mode: None` disables the CRTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrtcUpdate {
    pub crtc: CrtcId,
    pub mode: Option<DisplayMode>,
}

#[derive(Clone, Debug, Default)]
pub struct AtomicRequest {
    pub planes: Vec<PlaneUpdate>,
    pub crtc: Option<CrtcUpdate>,
}

/// What the update phase did for one plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No framebuffer or not visible: nothing was written.
    Disabled,
    /// The device was gone before anything was written.
    DeviceGone,
    /// All damage rectangles were copied.
    Updated { rects: usize },
    /// The device went away mid-update; `rects` rectangles were copied before that.
    Interrupted { rects: usize },
    /// An internal inconsistency stopped the update. Logged at error level.
    Aborted,
}

/// Per-plane result of a successful commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitSummary {
    pub planes: Vec<(PlaneId, UpdateOutcome)>,
}

/// Validates a pending primary plane state against the CRTC state it will be committed with.
///
/// On success of a visible plane the negotiated scanout format and pitch are recorded in `state`.
/// On failure `state` must be discarded.
pub fn primary_plane_atomic_check(
    limits: &ScanoutLimits,
    mode_config: &ModeConfig,
    formats: &[PixelFormat],
    state: &mut PlaneState,
    crtc_state: Option<&CrtcState>,
) -> Result<(), ModesetError> {
    let (Some(fb), Some(_)) = (state.fb.clone(), state.crtc) else {
        state.visible = false;
        return Ok(());
    };

    if !formats.contains(&fb.format) {
        return Err(ModesetError::UnsupportedFormat(fb.format.fourcc()));
    }
    if !mode_config.contains(fb.width, fb.height) {
        return Err(ModesetError::SurfaceOutOfBounds {
            width: fb.width,
            height: fb.height,
        });
    }
    if !state.src.fits_within(fb.width, fb.height) {
        return Err(ModesetError::SourceOutOfBounds {
            src: state.src,
            width: fb.width,
            height: fb.height,
        });
    }

    let Some(mode) = crtc_state.filter(|c| c.is_enabled()).and_then(|c| c.mode) else {
        state.visible = false;
        return Ok(());
    };

    if state.src.width != state.dst.width || state.src.height != state.dst.height {
        return Err(ModesetError::ScalingUnsupported {
            src_width: state.src.width,
            src_height: state.src.height,
            dst_width: state.dst.width,
            dst_height: state.dst.height,
        });
    }

    let screen = mode.rect();
    if state.dst.intersect(&screen).is_none() {
        state.visible = false;
        return Ok(());
    }
    if state.dst != screen {
        return Err(ModesetError::PlaneMustCoverCrtc);
    }

    let n = negotiate(fb.format, fb.width, fb.pitch, limits.max_pitch);
    if n.converted {
        debug!(
            from = ?fb.format,
            to = ?n.format,
            width = fb.width,
            fb_pitch = fb.pitch,
            pitch = n.pitch,
            "scanout format converted to fit the maximum pitch"
        );
    }
    if n.pitch > limits.max_pitch {
        return Err(ModesetError::PitchTooLarge {
            pitch: n.pitch,
            max: limits.max_pitch,
        });
    }
    let needed = u64::from(n.pitch) * u64::from(fb.height);
    if needed > limits.max_scanout_bytes {
        return Err(ModesetError::MemoryBudgetExceeded {
            needed,
            budget: limits.max_scanout_bytes,
        });
    }

    state.visible = true;
    state.format = Some(n.format);
    state.pitch = n.pitch;
    Ok(())
}

/// Programs the device for a checked plane state and copies its damage into the scanout region.
///
/// `new.shadow` must hold a mapping of `new.fb`.
pub(crate) fn primary_plane_atomic_update(
    hw: &mut PiGpuHw,
    liveness: &Liveness,
    new: &PlaneState,
    old: &PlaneState,
) -> UpdateOutcome {
    let Some(fb) = new.fb.as_ref() else {
        return UpdateOutcome::Disabled;
    };
    if !new.visible {
        return UpdateOutcome::Disabled;
    }
    let Some(_guard) = liveness.enter() else {
        return UpdateOutcome::DeviceGone;
    };
    let (Some(format), Some(shadow)) = (new.format, new.shadow.as_ref()) else {
        error!(
            plane = new.plane.0,
            "visible plane reached update without a checked format or mapping"
        );
        return UpdateOutcome::Aborted;
    };

    if old.format != Some(format) {
        hw.regs.format_set(format);
    }
    if old.pitch != new.pitch {
        hw.regs.pitch_set(new.pitch);
    }

    let mut rects = 0;
    for clip in plane_damage(old, new) {
        if !liveness.is_alive() {
            return UpdateOutcome::Interrupted { rects };
        }
        if !blit_rect(hw, fb, shadow, new, format, &clip) {
            return UpdateOutcome::Aborted;
        }
        rects += 1;
    }
    UpdateOutcome::Updated { rects }
}

/// Copies `clip` (framebuffer coordinates) row by row into the scanout region, converting pixels
/// to `format`.
fn blit_rect(
    hw: &mut PiGpuHw,
    fb: &Framebuffer,
    shadow: &PinnedBo,
    state: &PlaneState,
    format: PixelFormat,
    clip: &Rect,
) -> bool {
    let dst_x = clip.x - state.src.x + state.dst.x;
    let dst_y = clip.y - state.src.y + state.dst.y;
    let width = clip.width as usize;
    let src_cpp = fb.format.cpp() as usize;
    let dst_cpp = format.cpp() as usize;
    let pitch = state.pitch as usize;

    trace!(
        x = clip.x,
        y = clip.y,
        width = clip.width,
        height = clip.height,
        dst_x,
        dst_y,
        "blit damage rectangle"
    );

    let mut src_row = vec![0u8; width * src_cpp];
    for row in 0..clip.height {
        let Ok(src_off) = usize::try_from(fb.byte_offset(clip.x, clip.y + row)) else {
            error!(fb = fb.id, "framebuffer offset overflow");
            return false;
        };
        if !shadow.bo().read(src_off, &mut src_row) {
            error!(fb = fb.id, offset = src_off, "damage rectangle outside framebuffer backing");
            return false;
        }
        let dst_off = (dst_y + row) as usize * pitch + dst_x as usize * dst_cpp;
        let Some(dst) = hw.vram.scanout_span_mut(dst_off, width * dst_cpp) else {
            error!(offset = dst_off, len = width * dst_cpp, "blit outside the scanout region");
            return false;
        };
        if !convert_row(fb.format, format, &src_row, dst, width) {
            error!(from = ?fb.format, to = ?format, "unsupported scanout conversion");
            return false;
        }
    }
    true
}

impl PiGpuDevice {
    pub fn scanout_limits(&self) -> ScanoutLimits {
        ScanoutLimits {
            max_pitch: self.config.max_pitch,
            max_scanout_bytes: self.config.max_scanout_bytes,
        }
    }

    /// Applies `req` atomically.
    ///
    /// Either every plane and CRTC change in the request is committed, or none is and the first
    /// failure is returned.
    pub fn atomic_commit(&mut self, req: AtomicRequest) -> Result<CommitSummary, ModesetError> {
        let crtc_id = self.crtc.id();

        let mut pending_crtc = self.crtc.duplicate_state()?;
        if let Some(update) = req.crtc {
            if update.crtc != crtc_id {
                return Err(ModesetError::UnknownCrtc(update.crtc));
            }
            pending_crtc.enable = update.mode.is_some();
            pending_crtc.active = update.mode.is_some();
            pending_crtc.mode = update.mode;
        }

        let mut pending: Vec<(usize, PlaneState)> = Vec::new();
        for update in req.planes {
            if let Some(crtc) = update.crtc {
                if crtc != crtc_id {
                    discard(pending);
                    return Err(ModesetError::UnknownCrtc(crtc));
                }
            }
            let Some(idx) = self.planes.iter().position(|p| p.id() == update.plane) else {
                discard(pending);
                return Err(ModesetError::UnknownPlane(update.plane));
            };
            let mut state = match self.planes[idx].duplicate_state() {
                Ok(state) => state,
                Err(err) => {
                    discard(pending);
                    return Err(err);
                }
            };
            state.crtc = update.crtc;
            state.fb = update.fb;
            state.src = update.src;
            state.dst = update.dst;
            state.damage = update.damage;

            // A later update of the same plane replaces the earlier one.
            if let Some(slot) = pending.iter_mut().find(|(i, _)| *i == idx) {
                destroy_state(std::mem::replace(&mut slot.1, state));
            } else {
                pending.push((idx, state));
            }
        }

        // A CRTC change affects every plane attached to it.
        if req.crtc.is_some() {
            for (idx, plane) in self.planes.iter().enumerate() {
                let attached = plane.state().is_some_and(|s| s.crtc == Some(crtc_id));
                if attached && !pending.iter().any(|(i, _)| *i == idx) {
                    match plane.duplicate_state() {
                        Ok(state) => pending.push((idx, state)),
                        Err(err) => {
                            discard(pending);
                            return Err(err);
                        }
                    }
                }
            }
        }

        let limits = self.scanout_limits();
        let planes = &self.planes;
        let mode_config = &self.mode_config;
        let checked = pending.iter_mut().try_for_each(|(idx, state)| {
            let crtc_state = state.crtc.map(|_| &pending_crtc);
            let formats = planes[*idx].formats();
            primary_plane_atomic_check(&limits, mode_config, formats, state, crtc_state).map_err(
                |err| {
                    warn!(plane = state.plane.0, %err, "atomic check rejected plane state");
                    err
                },
            )
        });
        if let Err(err) = checked {
            discard(pending);
            return Err(err);
        }

        let mapped = pending.iter_mut().try_for_each(|(_, state)| {
            let Some(fb) = state.fb.as_ref().filter(|_| state.visible) else {
                return Ok(());
            };
            let pin = PinnedBo::acquire(fb.handle, Arc::clone(&fb.bo)).map_err(|errno| {
                warn!(plane = state.plane.0, fb = fb.id, errno, "failed to map framebuffer");
                ModesetError::FramebufferMap { errno }
            })?;
            state.shadow = Some(pin);
            Ok(())
        });
        if let Err(err) = mapped {
            discard(pending);
            return Err(err);
        }

        self.crtc.swap_state(pending_crtc);

        let mut summary = CommitSummary { planes: Vec::new() };
        for (idx, mut state) in pending {
            let plane = &mut self.planes[idx];
            let outcome = match plane.state() {
                Some(old) => primary_plane_atomic_update(&mut self.hw, &self.liveness, &state, old),
                None => UpdateOutcome::Aborted,
            };
            state.shadow = None;
            summary.planes.push((plane.id(), outcome));
            if let Some(old) = plane.swap_state(state) {
                destroy_state(old);
            }
        }
        Ok(summary)
    }

    /// Turns the plane off, keeping the CRTC as is.
    pub fn disable_plane(&mut self, plane: PlaneId) -> Result<CommitSummary, ModesetError> {
        self.atomic_commit(AtomicRequest {
            planes: vec![PlaneUpdate::disable(plane)],
            crtc: None,
        })
    }
}

fn discard(pending: Vec<(usize, PlaneState)>) {
    for (_, state) in pending {
        destroy_state(state);
    }
}
