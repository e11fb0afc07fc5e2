#![allow(dead_code)]

use std::sync::Arc;

use pigpu_devices::{
    AtomicRequest, CrtcId, CrtcUpdate, DeviceId, DisplayMode, Framebuffer, FramebufferCreate,
    PiGpuConfig, PiGpuDevice, PixelFormat, PlaneId, PlaneUpdate, ShmemObjectTable,
};

pub const DEVICE: DeviceId = DeviceId(0x5049);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

pub fn new_device() -> PiGpuDevice {
    new_device_with(PiGpuConfig::default())
}

pub fn new_device_with(config: PiGpuConfig) -> PiGpuDevice {
    init_tracing();
    PiGpuDevice::attach(DEVICE, config).unwrap()
}

/// Allocates a dumb buffer, fills every pixel with `pixel(x, y)` and wraps it in a framebuffer.
pub fn filled_fb(
    dev: &mut PiGpuDevice,
    objects: &ShmemObjectTable,
    width: u32,
    height: u32,
    format: PixelFormat,
    pitch: u32,
    pixel: impl Fn(u32, u32) -> Vec<u8>,
) -> Arc<Framebuffer> {
    let size = pitch as usize * height as usize;
    let handle = objects.create(size);
    let mut bytes = vec![0u8; size];
    for y in 0..height {
        for x in 0..width {
            let px = pixel(x, y);
            assert_eq!(px.len(), format.cpp() as usize);
            let off = (y * pitch + x * format.cpp()) as usize;
            bytes[off..off + px.len()].copy_from_slice(&px);
        }
    }
    assert!(objects.write(handle, 0, &bytes));
    dev.framebuffer_create(
        objects,
        &FramebufferCreate {
            handle,
            width,
            height,
            fourcc: format.fourcc(),
            pitch,
            offset: 0,
            modifier: 0,
        },
    )
    .unwrap()
}

/// XRGB8888 pixel `[B, G, R, X]` with a per-position pattern.
pub fn xrgb_pattern(x: u32, y: u32) -> Vec<u8> {
    vec![(x & 0xff) as u8, (y & 0xff) as u8, ((x + y) & 0xff) as u8, 0xee]
}

pub fn modeset_request(fb: Arc<Framebuffer>) -> AtomicRequest {
    let mode = DisplayMode::new(fb.width, fb.height);
    AtomicRequest {
        planes: vec![PlaneUpdate::full_screen(PlaneId::PRIMARY, CrtcId::PRIMARY, fb)],
        crtc: Some(CrtcUpdate {
            crtc: CrtcId::PRIMARY,
            mode: Some(mode),
        }),
    }
}

/// Scanout row `y`, `len` bytes wide.
pub fn scanout_row(dev: &PiGpuDevice, pitch: u32, y: u32, len: usize) -> Vec<u8> {
    let off = (pitch * y) as usize;
    dev.scanout_bytes()[off..off + len].to_vec()
}
