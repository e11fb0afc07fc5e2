//! Pixel format registry, scanout format negotiation and row conversion.

use pigpu_protocol::pigpu_format::{
    PigpuFormat, FORMAT_MOD_LINEAR, FOURCC_RGB565, FOURCC_RGB888, FOURCC_XRGB8888,
};

/// A pixel format the primary plane accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb565,
    Rgb888,
    Xrgb8888,
}

/// Formats advertised by the primary plane, in preference order.
pub const PRIMARY_PLANE_FORMATS: &[PixelFormat] = &[
    PixelFormat::Xrgb8888,
    PixelFormat::Rgb888,
    PixelFormat::Rgb565,
];

impl PixelFormat {
    pub fn fourcc(self) -> u32 {
        match self {
            Self::Rgb565 => FOURCC_RGB565,
            Self::Rgb888 => FOURCC_RGB888,
            Self::Xrgb8888 => FOURCC_XRGB8888,
        }
    }

    pub fn from_fourcc(fourcc: u32) -> Option<Self> {
        match fourcc {
            FOURCC_RGB565 => Some(Self::Rgb565),
            FOURCC_RGB888 => Some(Self::Rgb888),
            FOURCC_XRGB8888 => Some(Self::Xrgb8888),
            _ => None,
        }
    }

    /// Bytes per pixel.
    pub fn cpp(self) -> u32 {
        match self {
            Self::Rgb565 => 2,
            Self::Rgb888 => 3,
            Self::Xrgb8888 => 4,
        }
    }

    /// Code written to the format register.
    pub fn device_code(self) -> PigpuFormat {
        match self {
            Self::Rgb565 => PigpuFormat::Rgb565,
            Self::Rgb888 => PigpuFormat::Rgb888,
            Self::Xrgb8888 => PigpuFormat::Xrgb8888,
        }
    }

    /// Smallest pitch able to hold `width` pixels. `None` on overflow.
    pub fn min_pitch(self, width: u32) -> Option<u32> {
        width.checked_mul(self.cpp())
    }
}

/// Memory layout modifier of a framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatModifier {
    Linear,
}

impl FormatModifier {
    pub fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            FORMAT_MOD_LINEAR => Some(Self::Linear),
            _ => None,
        }
    }

    pub fn raw(self) -> u64 {
        match self {
            Self::Linear => FORMAT_MOD_LINEAR,
        }
    }
}

/// Whether the primary plane can scan out `fourcc` with `modifier`.
///
/// Only linear layouts of the advertised formats are accepted.
pub fn format_mod_supported(fourcc: u32, modifier: u64) -> bool {
    FormatModifier::from_raw(modifier).is_some()
        && PixelFormat::from_fourcc(fourcc).is_some_and(|f| PRIMARY_PLANE_FORMATS.contains(&f))
}

/// Picks the format the scanout engine should use for a framebuffer.
///
/// Returns `None` when the framebuffer can be scanned out as-is. Only 32-bit XRGB surfaces whose
/// pitch exceeds `max_pitch` are converted: to RGB888 when `width * 3` fits, RGB565 otherwise.
/// The caller still has to verify that the converted pitch fits.
pub fn convert_format(
    format: PixelFormat,
    width: u32,
    pitch: u32,
    max_pitch: u32,
) -> Option<PixelFormat> {
    if format != PixelFormat::Xrgb8888 || pitch <= max_pitch {
        return None;
    }
    let rgb888_pitch = u64::from(width) * u64::from(PixelFormat::Rgb888.cpp());
    if rgb888_pitch <= u64::from(max_pitch) {
        Some(PixelFormat::Rgb888)
    } else {
        Some(PixelFormat::Rgb565)
    }
}

/// Result of scanout negotiation: the format the device is programmed with and the resulting
/// scanout pitch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Negotiated {
    pub format: PixelFormat,
    pub pitch: u32,
    pub converted: bool,
}

/// Applies [`convert_format`] to a framebuffer description.
///
/// A converted surface gets the tightly packed pitch `width * cpp`; an unconverted one keeps the
/// framebuffer pitch.
pub fn negotiate(format: PixelFormat, width: u32, pitch: u32, max_pitch: u32) -> Negotiated {
    match convert_format(format, width, pitch, max_pitch) {
        Some(target) => Negotiated {
            format: target,
            pitch: width.saturating_mul(target.cpp()),
            converted: true,
        },
        None => Negotiated {
            format,
            pitch,
            converted: false,
        },
    }
}

/// Converts `width` pixels from `src` (in `src_format`) into `dst` (in `dst_format`).
///
/// Supported conversions are the identity and XRGB8888 to RGB888/RGB565. Returns `false` for any
/// other pair or if either slice is too short.
pub fn convert_row(
    src_format: PixelFormat,
    dst_format: PixelFormat,
    src: &[u8],
    dst: &mut [u8],
    width: usize,
) -> bool {
    let src_len = width * src_format.cpp() as usize;
    let dst_len = width * dst_format.cpp() as usize;
    if src.len() < src_len || dst.len() < dst_len {
        return false;
    }

    match (src_format, dst_format) {
        (a, b) if a == b => {
            dst[..dst_len].copy_from_slice(&src[..src_len]);
        }
        (PixelFormat::Xrgb8888, PixelFormat::Rgb888) => {
            for (px, out) in src[..src_len]
                .chunks_exact(4)
                .zip(dst[..dst_len].chunks_exact_mut(3))
            {
                // Little-endian XRGB8888 is stored as [B, G, R, X]; RGB888 as [B, G, R].
                out.copy_from_slice(&px[..3]);
            }
        }
        (PixelFormat::Xrgb8888, PixelFormat::Rgb565) => {
            for (px, out) in src[..src_len]
                .chunks_exact(4)
                .zip(dst[..dst_len].chunks_exact_mut(2))
            {
                let b = u16::from(px[0]);
                let g = u16::from(px[1]);
                let r = u16::from(px[2]);
                let v = ((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3);
                out.copy_from_slice(&v.to_le_bytes());
            }
        }
        _ => return false,
    }
    true
}
