//! Rectangles and per-plane damage computation.

use std::sync::Arc;

use crate::plane::PlaneState;

/// Integer rectangle in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    pub fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether `self` lies entirely inside a `width x height` area anchored at the origin.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= u64::from(width) && self.bottom() <= u64::from(height)
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= u64::from(x0) || y1 <= u64::from(y0) {
            return None;
        }
        Some(Rect {
            x: x0,
            y: y0,
            width: (x1 - u64::from(x0)) as u32,
            height: (y1 - u64::from(y0)) as u32,
        })
    }
}

/// Rectangles (in framebuffer coordinates) that need copying for a plane transition.
///
/// An invisible plane has no damage. The whole source rectangle is damaged when the client
/// supplied no clips, or when the source rectangle or framebuffer changed since `old`. Otherwise
/// the client's clips are clamped to the source rectangle.
pub fn plane_damage(old: &PlaneState, new: &PlaneState) -> Vec<Rect> {
    let Some(fb) = new.fb.as_ref() else {
        return Vec::new();
    };
    if !new.visible || new.src.is_empty() {
        return Vec::new();
    }

    let fb_changed = match old.fb.as_ref() {
        Some(old_fb) => !Arc::ptr_eq(old_fb, fb),
        None => true,
    };
    if new.damage.is_empty() || fb_changed || old.src != new.src || !old.visible {
        return vec![new.src];
    }

    new.damage
        .iter()
        .filter_map(|clip| clip.intersect(&new.src))
        .collect()
}
