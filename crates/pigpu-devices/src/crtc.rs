//! CRTC and mode-setting bounds.

use crate::config::PiGpuConfig;
use crate::damage::Rect;
use crate::error::ModesetError;
use crate::plane::PlaneId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CrtcId(pub u32);

impl CrtcId {
    pub const PRIMARY: CrtcId = CrtcId(0);
}

/// Surface size bounds accepted for scanout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeConfig {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl ModeConfig {
    pub fn from_config(config: &PiGpuConfig) -> Self {
        Self {
            min_width: config.min_width,
            max_width: config.max_width,
            min_height: config.min_height,
            max_height: config.max_height,
        }
    }

    pub fn contains(&self, width: u32, height: u32) -> bool {
        (self.min_width..=self.max_width).contains(&width)
            && (self.min_height..=self.max_height).contains(&height)
    }
}

/// Active display mode. Only the visible area matters to the scanout engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayMode {
    pub hdisplay: u32,
    pub vdisplay: u32,
}

impl DisplayMode {
    pub fn new(hdisplay: u32, vdisplay: u32) -> Self {
        Self { hdisplay, vdisplay }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(0, 0, self.hdisplay, self.vdisplay)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CrtcState {
    pub enable: bool,
    pub active: bool,
    pub mode: Option<DisplayMode>,
}

impl CrtcState {
    /// Whether planes on this CRTC can be visible.
    pub fn is_enabled(&self) -> bool {
        self.enable && self.mode.is_some()
    }
}

#[derive(Debug)]
pub struct Crtc {
    id: CrtcId,
    primary: PlaneId,
    state: Option<CrtcState>,
}

impl Crtc {
    pub fn new(id: CrtcId, primary: PlaneId) -> Self {
        Self {
            id,
            primary,
            state: None,
        }
    }

    pub fn id(&self) -> CrtcId {
        self.id
    }

    pub fn primary(&self) -> PlaneId {
        self.primary
    }

    pub fn state(&self) -> Option<&CrtcState> {
        self.state.as_ref()
    }

    pub fn reset(&mut self) {
        self.state = Some(CrtcState::default());
    }

    pub fn duplicate_state(&self) -> Result<CrtcState, ModesetError> {
        self.state.ok_or(ModesetError::UnknownCrtc(self.id))
    }

    pub(crate) fn swap_state(&mut self, new: CrtcState) -> Option<CrtcState> {
        self.state.replace(new)
    }
}
