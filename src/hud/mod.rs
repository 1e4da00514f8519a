//! HUD compositor.
//!
//! Turns an [`AgentSnapshot`] into a paint list and rasterizes it over a
//! captured frame. Layers are always painted in the same order: reticle,
//! hotbar, vitality bar, sustenance bar, debug panel. The compositor keeps no
//! state; equal inputs give identical pixels.

pub mod layout;
pub mod paint;
pub mod raster;

use crate::agent::AgentSnapshot;
use crate::capture::CompositedImage;
use crate::dom::{font, Canvas2d};
use crate::Viewport;
use image::RgbaImage;
use layout::{HudLayout, Rect, BAR_UNITS, RETICLE_HALF, SLOT_COUNT};
use paint::{PaintCommand, Rgba};

const WHITE: Rgba = (255, 255, 255, 255);
const BLACK: Rgba = (0, 0, 0, 255);
const SLOT_FILL: Rgba = (0, 0, 0, 140);
const SLOT_FILL_SELECTED: Rgba = (255, 255, 255, 70);
const SLOT_BORDER: Rgba = (160, 160, 160, 255);
const HEALTH_FULL: Rgba = (220, 30, 30, 255);
const FOOD_FULL: Rgba = (200, 130, 40, 255);
const UNIT_EMPTY: Rgba = (40, 40, 40, 200);
const PANEL_FILL: Rgba = (0, 0, 0, 160);

/// Border width marking the active hotbar slot
pub const SELECTED_BORDER: u32 = 3;
/// Characters of an item name shown in its slot
pub const LABEL_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HudLayer {
    Reticle,
    Hotbar,
    Vitality,
    Sustenance,
    Debug,
}

/// Filled units for a 0..=20 stat: `ceil(value / 2)`, clamped to 0..=10.
pub fn bar_units(value: f32) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    ((value / 2.0).ceil() as u32).min(BAR_UNITS)
}

/// Lines shown in the debug panel
pub fn debug_lines(snapshot: &AgentSnapshot) -> Vec<String> {
    let p = &snapshot.position;
    vec![
        format!("XYZ: {:.1} / {:.1} / {:.1}", p.x, p.y, p.z),
        format!(
            "YAW: {:.1} PITCH: {:.1}",
            snapshot.yaw.to_degrees(),
            snapshot.pitch.to_degrees()
        ),
        format!("HEALTH: {}", snapshot.health),
        format!("FOOD: {}", snapshot.food),
    ]
}

/// Slot label: namespace stripped, first five characters
pub fn item_label(name: &str) -> String {
    let name = name.strip_prefix("minecraft:").unwrap_or(name);
    name.chars().take(LABEL_CHARS).collect()
}

#[derive(Debug, Clone, Copy)]
pub struct HudCompositor {
    layout: HudLayout,
}

impl HudCompositor {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            layout: HudLayout::new(viewport),
        }
    }

    pub fn layout(&self) -> &HudLayout {
        &self.layout
    }

    pub fn hotbar_slot_rect(&self, k: u8) -> Rect {
        self.layout.hotbar_slot(k)
    }

    /// Paint commands grouped by layer, in painting order
    pub fn layers(&self, snapshot: &AgentSnapshot) -> Vec<(HudLayer, Vec<PaintCommand>)> {
        let health = self.layout.health_bar();
        let food = self.layout.food_bar();
        vec![
            (HudLayer::Reticle, self.reticle()),
            (HudLayer::Hotbar, self.hotbar(snapshot)),
            (HudLayer::Vitality, self.bar("HP", health, bar_units(snapshot.health), HEALTH_FULL)),
            (HudLayer::Sustenance, self.bar("FOOD", food, bar_units(snapshot.food), FOOD_FULL)),
            (HudLayer::Debug, self.debug_panel(snapshot)),
        ]
    }

    pub fn paint_list(&self, snapshot: &AgentSnapshot) -> Vec<PaintCommand> {
        self.layers(snapshot).into_iter().flat_map(|(_, cmds)| cmds).collect()
    }

    /// Draw the HUD over a top-down frame.
    pub fn compose(&self, frame: RgbaImage, snapshot: &AgentSnapshot) -> CompositedImage {
        let mut canvas = Canvas2d::from_image(frame);
        raster::rasterize(&mut canvas, &self.paint_list(snapshot));
        CompositedImage::new(canvas.into_image())
    }

    fn reticle(&self) -> Vec<PaintCommand> {
        let (cx, cy) = self.layout.center();
        let mut out = Vec::with_capacity(4);
        for (width, rgba) in [(4, BLACK), (2, WHITE)] {
            out.push(PaintCommand::Line {
                from: (cx - RETICLE_HALF, cy),
                to: (cx + RETICLE_HALF, cy),
                width,
                rgba,
            });
            out.push(PaintCommand::Line {
                from: (cx, cy - RETICLE_HALF),
                to: (cx, cy + RETICLE_HALF),
                width,
                rgba,
            });
        }
        out
    }

    fn hotbar(&self, snapshot: &AgentSnapshot) -> Vec<PaintCommand> {
        let mut out = Vec::new();
        for k in 0..SLOT_COUNT as u8 {
            let r = self.layout.hotbar_slot(k);
            let selected = k == snapshot.hotbar_slot;
            out.push(PaintCommand::SolidRect {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
                rgba: if selected { SLOT_FILL_SELECTED } else { SLOT_FILL },
            });
            out.push(PaintCommand::StrokeRect {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
                line_width: if selected { SELECTED_BORDER } else { 1 },
                rgba: if selected { WHITE } else { SLOT_BORDER },
            });

            if let Some(item) = snapshot.hotbar_item(k) {
                out.push(PaintCommand::Text {
                    x: r.x + 4,
                    y: r.y + 5,
                    text: item_label(&item.name),
                    scale: 1,
                    rgba: WHITE,
                });
                if item.count > 1 {
                    let count = item.count.to_string();
                    let w = font::text_width(&count, 1) as i32;
                    out.push(PaintCommand::Text {
                        x: r.x + r.width as i32 - 4 - w,
                        y: r.y + r.height as i32 - 4 - font::GLYPH_HEIGHT as i32,
                        text: count,
                        scale: 1,
                        rgba: WHITE,
                    });
                }
            }
        }
        out
    }

    fn bar(&self, label: &str, origin: (i32, i32), filled: u32, full: Rgba) -> Vec<PaintCommand> {
        let mut out = vec![PaintCommand::Text {
            x: origin.0,
            y: origin.1 - font::GLYPH_HEIGHT as i32 - 3,
            text: label.to_string(),
            scale: 1,
            rgba: WHITE,
        }];
        for i in 0..BAR_UNITS {
            let r = self.layout.bar_unit(origin, i);
            out.push(PaintCommand::SolidRect {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
                rgba: if i < filled { full } else { UNIT_EMPTY },
            });
        }
        out
    }

    fn debug_panel(&self, snapshot: &AgentSnapshot) -> Vec<PaintCommand> {
        let lines = debug_lines(snapshot);
        let (x, y) = self.layout.debug_origin();
        let line_h = font::GLYPH_HEIGHT as i32 + 3;
        let width = lines.iter().map(|l| font::text_width(l, 1)).max().unwrap_or(0) + 10;
        let height = lines.len() as u32 * line_h as u32 + 7;

        let mut out = vec![PaintCommand::SolidRect {
            x,
            y,
            width,
            height,
            rgba: PANEL_FILL,
        }];
        for (i, line) in lines.into_iter().enumerate() {
            out.push(PaintCommand::Text {
                x: x + 5,
                y: y + 5 + i as i32 * line_h,
                text: line,
                scale: 1,
                rgba: WHITE,
            });
        }
        out
    }
}
