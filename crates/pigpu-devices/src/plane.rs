//! Plane state store.
//!
//! Each plane owns exactly one committed ("current") [`PlaneState`]. An atomic transition works
//! on a duplicate that only replaces the current state once the whole transition has been
//! checked; a rejected duplicate is destroyed without ever becoming visible.

use std::sync::Arc;

use tracing::trace;

use crate::crtc::CrtcId;
use crate::damage::Rect;
use crate::error::ModesetError;
use crate::format::{FormatModifier, PixelFormat, PRIMARY_PLANE_FORMATS};
use crate::framebuffer::Framebuffer;
use crate::gem::PinnedBo;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaneId(pub u32);

impl PlaneId {
    pub const PRIMARY: PlaneId = PlaneId(0);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneKind {
    Primary,
}

/// Per-plane state.
///
/// `format` and `pitch` hold the negotiated scanout parameters. They are only filled in by a
/// successful check and are carried over unchanged by [`Plane::duplicate_state`].
#[derive(Debug)]
pub struct PlaneState {
    pub plane: PlaneId,
    pub crtc: Option<CrtcId>,
    pub fb: Option<Arc<Framebuffer>>,
    /// Source rectangle in framebuffer pixels.
    pub src: Rect,
    /// Destination rectangle in CRTC pixels.
    pub dst: Rect,
    pub visible: bool,
    /// Client damage clips for this transition (framebuffer coordinates).
    pub damage: Vec<Rect>,
    pub format: Option<PixelFormat>,
    pub pitch: u32,
    /// CPU mapping of `fb` held for the duration of a commit.
    pub(crate) shadow: Option<PinnedBo>,
}

impl PlaneState {
    fn new(plane: PlaneId) -> Self {
        Self {
            plane,
            crtc: None,
            fb: None,
            src: Rect::default(),
            dst: Rect::default(),
            visible: false,
            damage: Vec::new(),
            format: None,
            pitch: 0,
            shadow: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

#[derive(Debug)]
pub struct Plane {
    id: PlaneId,
    kind: PlaneKind,
    formats: Vec<PixelFormat>,
    modifiers: Vec<FormatModifier>,
    state: Option<PlaneState>,
}

impl Plane {
    pub fn new_primary(id: PlaneId) -> Self {
        Self {
            id,
            kind: PlaneKind::Primary,
            formats: PRIMARY_PLANE_FORMATS.to_vec(),
            modifiers: vec![FormatModifier::Linear],
            state: None,
        }
    }

    pub fn id(&self) -> PlaneId {
        self.id
    }

    pub fn kind(&self) -> PlaneKind {
        self.kind
    }

    pub fn formats(&self) -> &[PixelFormat] {
        &self.formats
    }

    pub fn modifiers(&self) -> &[FormatModifier] {
        &self.modifiers
    }

    /// Committed state, if the plane has been reset.
    pub fn state(&self) -> Option<&PlaneState> {
        self.state.as_ref()
    }

    /// Replaces the current state with a fresh default one, destroying the old state.
    pub fn reset(&mut self) {
        if let Some(old) = self.state.take() {
            destroy_state(old);
        }
        self.state = Some(PlaneState::new(self.id));
    }

    /// Builds a pending state from the current one.
    ///
    /// The framebuffer reference is shared, not copied. Negotiated format and pitch carry over so
    /// that an unchanged plane keeps its scanout parameters; damage clips and the commit-time
    /// shadow mapping do not.
    pub fn duplicate_state(&self) -> Result<PlaneState, ModesetError> {
        let cur = self
            .state
            .as_ref()
            .ok_or(ModesetError::PlaneNotReset(self.id))?;
        Ok(PlaneState {
            plane: cur.plane,
            crtc: cur.crtc,
            fb: cur.fb.clone(),
            src: cur.src,
            dst: cur.dst,
            visible: cur.visible,
            damage: Vec::new(),
            format: cur.format,
            pitch: cur.pitch,
            shadow: None,
        })
    }

    /// Installs `new` as the current state and returns the previous one.
    pub(crate) fn swap_state(&mut self, new: PlaneState) -> Option<PlaneState> {
        self.state.replace(new)
    }
}

/// Releases everything `state` holds: its framebuffer reference and any shadow mapping.
pub fn destroy_state(state: PlaneState) {
    trace!(
        plane = state.plane.0,
        fb = state.fb.as_ref().map(|fb| fb.id),
        "destroy plane state"
    );
    drop(state);
}
