use std::sync::Arc;

use crate::{
    format::{convert_format, negotiate, PRIMARY_PLANE_FORMATS},
    primary_plane_atomic_check, CrtcId, CrtcState, DeviceId, DisplayMode, Framebuffer,
    FramebufferCreate, ModeConfig, PiGpuConfig, Plane, PlaneId, PixelFormat, Rect, ScanoutLimits,
    ShmemObjectTable,
};
use proptest::prelude::*;

const MAX_PITCH: u32 = 4088;
const MAX_SCANOUT: u64 = 4 * 1024 * 1024;

fn format_strategy() -> impl Strategy<Value = PixelFormat> {
    prop_oneof![
        Just(PixelFormat::Rgb565),
        Just(PixelFormat::Rgb888),
        Just(PixelFormat::Xrgb8888),
    ]
}

/// Surface size and padded pitch. Heights stay small so backing objects are cheap.
fn surface_strategy() -> impl Strategy<Value = (PixelFormat, u32, u32, u32)> {
    (format_strategy(), 1u32..=1920, 1u32..=8, 0u32..=64).prop_map(
        |(format, width, height, pad)| {
            let pitch = width * format.cpp() + pad * 8;
            (format, width, height, pitch)
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn negotiator_picks_narrowest_fitting_packing(
        (format, width, _height, pitch) in surface_strategy(),
    ) {
        let converted = convert_format(format, width, pitch, MAX_PITCH);
        if format != PixelFormat::Xrgb8888 || pitch <= MAX_PITCH {
            prop_assert_eq!(converted, None);
        } else if width * 3 <= MAX_PITCH {
            prop_assert_eq!(converted, Some(PixelFormat::Rgb888));
        } else {
            prop_assert_eq!(converted, Some(PixelFormat::Rgb565));
        }

        let n = negotiate(format, width, pitch, MAX_PITCH);
        if let Some(target) = converted {
            prop_assert_eq!(n.pitch, width * target.cpp());
            // A conversion exists for every width the device can display.
            prop_assert!(n.pitch <= MAX_PITCH);
        }
    }

    #[test]
    fn successful_visible_check_respects_limits(
        (format, width, height, pitch) in surface_strategy(),
    ) {
        let table = ShmemObjectTable::new(DeviceId(1));
        let handle = table.create(pitch as usize * height as usize);
        let req = FramebufferCreate {
            handle,
            width,
            height,
            fourcc: format.fourcc(),
            pitch,
            offset: 0,
            modifier: 0,
        };
        let fb = Arc::new(Framebuffer::create(1, &table, &req).unwrap());

        let mut plane = Plane::new_primary(PlaneId::PRIMARY);
        plane.reset();
        let mut state = plane.duplicate_state().unwrap();
        let rect = Rect::new(0, 0, width, height);
        state.crtc = Some(CrtcId::PRIMARY);
        state.fb = Some(fb);
        state.src = rect;
        state.dst = rect;

        let crtc = CrtcState {
            enable: true,
            active: true,
            mode: Some(DisplayMode::new(width, height)),
        };
        let limits = ScanoutLimits { max_pitch: MAX_PITCH, max_scanout_bytes: MAX_SCANOUT };
        let result = primary_plane_atomic_check(
            &limits,
            &ModeConfig::from_config(&PiGpuConfig::default()),
            PRIMARY_PLANE_FORMATS,
            &mut state,
            Some(&crtc),
        );

        let expected = negotiate(format, width, pitch, MAX_PITCH);
        let fits = expected.pitch <= MAX_PITCH
            && u64::from(expected.pitch) * u64::from(height) <= MAX_SCANOUT;
        prop_assert_eq!(result.is_ok(), fits);
        if result.is_ok() {
            prop_assert!(state.visible);
            prop_assert!(state.pitch <= MAX_PITCH);
            prop_assert!(u64::from(state.pitch) * u64::from(height) <= MAX_SCANOUT);
            prop_assert_eq!(state.format, Some(expected.format));
        }
    }
}
