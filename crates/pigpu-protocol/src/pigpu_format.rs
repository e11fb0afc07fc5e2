//! Pixel formats understood by the scanout engine.
//!
//! Clients describe surfaces with DRM-style fourcc codes; the device register takes a small
//! format code instead (see [`PigpuFormat`]).

const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

/// `[31:0] x:R:G:B 8:8:8:8` little-endian (`"XR24"`).
pub const FOURCC_XRGB8888: u32 = fourcc(b'X', b'R', b'2', b'4');
/// `[23:0] R:G:B` little-endian (`"RG24"`).
pub const FOURCC_RGB888: u32 = fourcc(b'R', b'G', b'2', b'4');
/// `[15:0] R:G:B 5:6:5` little-endian (`"RG16"`).
pub const FOURCC_RGB565: u32 = fourcc(b'R', b'G', b'1', b'6');

/// Linear (untiled) memory layout. The only layout the scanout engine reads.
pub const FORMAT_MOD_LINEAR: u64 = 0;

/// Format code written to the format register.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PigpuFormat {
    Rgb565 = 0,
    Rgb888 = 1,
    Xrgb8888 = 2,
}

impl PigpuFormat {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Rgb565),
            1 => Some(Self::Rgb888),
            2 => Some(Self::Xrgb8888),
            _ => None,
        }
    }
}
