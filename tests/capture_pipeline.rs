use image::{Rgba, RgbaImage};
use povbridge::agent::{AgentSnapshot, HotbarItem, Position};
use povbridge::capture::{blank_image, flip_rows, FallbackFrame};
use povbridge::hud::{debug_lines, HudCompositor};
use povbridge::{CaptureOutcome, DegradedReason, FrameBuffer, Viewport};

fn snapshot() -> AgentSnapshot {
    AgentSnapshot {
        position: Position::new(10.0, 64.0, 10.0),
        yaw: 0.0,
        pitch: 0.0,
        health: 14.0,
        food: 18.0,
        hotbar_slot: 3,
        hotbar: vec![HotbarItem {
            name: "minecraft:torch".into(),
            count: 12,
            slot: 1,
        }],
    }
}

/// Bottom-up buffer whose rows are tagged with their index and alpha zero.
fn tagged_frame(width: u32, height: u32) -> FrameBuffer {
    let data = (0..height)
        .flat_map(|row| (0..width).flat_map(move |_| [row as u8, 50, 90, 0]))
        .collect();
    FrameBuffer::from_bottom_up(width, height, data).unwrap()
}

#[test]
fn readback_is_flipped_and_made_opaque() {
    let img = tagged_frame(640, 360).into_top_down();
    assert_eq!(img.dimensions(), (640, 360));
    // bottom-up row 359 lands on top
    assert_eq!(img.get_pixel(0, 0)[0], 359u32 as u8);
    assert_eq!(img.get_pixel(639, 359)[0], 0);
    assert!(img.pixels().all(|p| p[3] == 255));
}

#[test]
fn flip_boundaries() {
    let one = vec![1, 2, 3, 4, 5, 6, 7, 8];
    assert_eq!(flip_rows(&one, 2, 1), one);

    let raw = tagged_frame(3, 360).as_bytes().to_vec();
    let flipped = flip_rows(&raw, 3, 360);
    assert_eq!(flip_rows(&flipped, 3, 360), raw);
    let rows: Vec<u8> = flipped.chunks(12).map(|r| r[0]).collect();
    let expected: Vec<u8> = (0..360u32).rev().map(|r| r as u8).collect();
    assert_eq!(rows, expected);
}

#[test]
fn short_readback_is_rejected() {
    assert!(FrameBuffer::from_bottom_up(4, 4, vec![0; 63]).is_err());
}

#[test]
fn hud_scenario_matches_agent_state() {
    let hud = HudCompositor::new(Viewport::default());
    let frame = RgbaImage::from_pixel(640, 360, Rgba([0, 0, 0, 255]));
    let composed = hud.compose(frame, &snapshot());
    let px = composed.pixels();
    assert!(composed.is_opaque());

    let layout = hud.layout();
    let unit_center = |origin: (i32, i32), i: u32| {
        let r = layout.bar_unit(origin, i);
        *px.get_pixel((r.x + 5) as u32, (r.y + 5) as u32)
    };

    // health 14 -> 7 filled units
    assert_eq!(unit_center(layout.health_bar(), 6), Rgba([220, 30, 30, 255]));
    assert_ne!(unit_center(layout.health_bar(), 7), Rgba([220, 30, 30, 255]));
    // food 18 -> 9 filled units
    assert_eq!(unit_center(layout.food_bar(), 8), Rgba([200, 130, 40, 255]));
    assert_ne!(unit_center(layout.food_bar(), 9), Rgba([200, 130, 40, 255]));

    // selected slot has a thick white border
    let white = Rgba([255, 255, 255, 255]);
    for k in 0..9u8 {
        let r = hud.hotbar_slot_rect(k);
        let inner_edge = *px.get_pixel((r.x + 2) as u32, (r.y + 20) as u32);
        assert_eq!(inner_edge == white, k == 3, "slot {}", k);
    }

    let lines = debug_lines(&snapshot());
    assert!(lines[0].contains("10.0") && lines[0].contains("64.0"));
}

#[test]
fn fallback_response_is_solid_black() {
    let outcome = CaptureOutcome::degraded(Viewport::default(), [0, 0, 0], DegradedReason::NoSession);
    let fallback = FallbackFrame::new(Viewport::default(), [0, 0, 0], 90).unwrap();
    let response = outcome.into_response(90, &fallback);
    assert!(response.success);
    assert_eq!(response.format, "jpeg");
    assert_eq!(response.degraded.as_deref(), Some("no render session"));

    let img = response.decode_image().unwrap();
    assert_eq!(img.dimensions(), (640, 360));
    assert!(img.pixels().all(|p| p[0] <= 2 && p[1] <= 2 && p[2] <= 2));
}

#[test]
fn blank_image_uses_configured_color() {
    let img = blank_image(Viewport { width: 8, height: 4 }, [10, 20, 30]);
    assert!(img.pixels().pixels().all(|p| *p == Rgba([10, 20, 30, 255])));
}
