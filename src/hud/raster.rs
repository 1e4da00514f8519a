/// Executes paint commands onto a 2D canvas

use super::paint::PaintCommand;
use crate::dom::Canvas2d;
use image::Rgba;

pub fn rasterize(canvas: &mut Canvas2d, commands: &[PaintCommand]) {
    for cmd in commands {
        match cmd {
            PaintCommand::SolidRect {
                x,
                y,
                width,
                height,
                rgba,
            } => canvas.fill_rect(*x, *y, *width, *height, color(*rgba)),
            PaintCommand::StrokeRect {
                x,
                y,
                width,
                height,
                line_width,
                rgba,
            } => canvas.stroke_rect(*x, *y, *width, *height, *line_width, color(*rgba)),
            PaintCommand::Line {
                from,
                to,
                width,
                rgba,
            } => canvas.stroke_line(from.0, from.1, to.0, to.1, *width, color(*rgba)),
            PaintCommand::Text {
                x,
                y,
                text,
                scale,
                rgba,
            } => canvas.fill_text(*x, *y, text, *scale, color(*rgba)),
        }
    }
}

fn color((r, g, b, a): (u8, u8, u8, u8)) -> Rgba<u8> {
    Rgba([r, g, b, a])
}
