/// Fixed HUD geometry derived from the viewport

use crate::Viewport;

pub const SLOT_SIZE: u32 = 40;
pub const SLOT_COUNT: u32 = 9;
pub const BAR_UNITS: u32 = 10;
pub const UNIT_SIZE: u32 = 10;
pub const UNIT_GAP: u32 = 2;
pub const RETICLE_HALF: i32 = 10;
const MARGIN: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width as i32 && y < self.y + self.height as i32
    }
}

/// Positions of every HUD element for one viewport size.
///
/// For 640x360 the hotbar starts at (140, 310), the health bar at (10, 340)
/// and the food bar at (510, 340).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HudLayout {
    pub viewport: Viewport,
}

impl HudLayout {
    pub fn new(viewport: Viewport) -> Self {
        Self { viewport }
    }

    pub fn center(&self) -> (i32, i32) {
        ((self.viewport.width / 2) as i32, (self.viewport.height / 2) as i32)
    }

    /// Screen rectangle of hotbar slot `k` (0..=8)
    pub fn hotbar_slot(&self, k: u8) -> Rect {
        let total = SLOT_SIZE * SLOT_COUNT;
        let x0 = (self.viewport.width.saturating_sub(total) / 2) as i32;
        let y = self.viewport.height as i32 - (SLOT_SIZE + MARGIN) as i32;
        Rect {
            x: x0 + (k as u32 * SLOT_SIZE) as i32,
            y,
            width: SLOT_SIZE,
            height: SLOT_SIZE,
        }
    }

    /// Width of a full bar including gaps
    pub fn bar_width(&self) -> u32 {
        BAR_UNITS * (UNIT_SIZE + UNIT_GAP)
    }

    fn bar_y(&self) -> i32 {
        self.viewport.height as i32 - (UNIT_SIZE + MARGIN) as i32
    }

    /// Bottom-left
    pub fn health_bar(&self) -> (i32, i32) {
        (MARGIN as i32, self.bar_y())
    }

    /// Bottom-right
    pub fn food_bar(&self) -> (i32, i32) {
        (
            self.viewport.width.saturating_sub(MARGIN + self.bar_width()) as i32,
            self.bar_y(),
        )
    }

    /// Rectangle of unit `i` in a bar starting at `origin`
    pub fn bar_unit(&self, origin: (i32, i32), i: u32) -> Rect {
        Rect {
            x: origin.0 + (i * (UNIT_SIZE + UNIT_GAP)) as i32,
            y: origin.1,
            width: UNIT_SIZE,
            height: UNIT_SIZE,
        }
    }

    pub fn debug_origin(&self) -> (i32, i32) {
        (5, 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_viewport_positions() {
        let l = HudLayout::new(Viewport::default());
        assert_eq!(l.hotbar_slot(0), Rect { x: 140, y: 310, width: 40, height: 40 });
        assert_eq!(l.hotbar_slot(8).x, 460);
        assert_eq!(l.health_bar(), (10, 340));
        assert_eq!(l.food_bar(), (510, 340));
        assert_eq!(l.center(), (320, 180));
    }

    #[test]
    fn slots_do_not_overlap_bars() {
        let l = HudLayout::new(Viewport::default());
        let last_health = l.bar_unit(l.health_bar(), BAR_UNITS - 1);
        let first_slot = l.hotbar_slot(0);
        assert!(last_health.x + last_health.width as i32 <= first_slot.x);
        let last_slot = l.hotbar_slot(8);
        assert!(last_slot.x + last_slot.width as i32 <= l.food_bar().0);
    }
}
