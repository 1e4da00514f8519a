/// HUD paint command set

pub type Rgba = (u8, u8, u8, u8);

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: Rgba,
    },
    /// Outline drawn inside the rectangle
    StrokeRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        line_width: u32,
        rgba: Rgba,
    },
    Line {
        from: (i32, i32),
        to: (i32, i32),
        width: u32,
        rgba: Rgba,
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        scale: u32,
        rgba: Rgba,
    },
}

impl PaintCommand {
    /// Text payload, for text commands
    pub fn text(&self) -> Option<&str> {
        match self {
            PaintCommand::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_accessor_only_matches_text() {
        let cmd = PaintCommand::Text {
            x: 0,
            y: 0,
            text: "HP".into(),
            scale: 1,
            rgba: (255, 255, 255, 255),
        };
        assert_eq!(cmd.text(), Some("HP"));
        let rect = PaintCommand::SolidRect {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            rgba: (255, 0, 0, 255),
        };
        assert!(rect.text().is_none());
    }
}
