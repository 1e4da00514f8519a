//! Synthetic display surface.
//!
//! The hosted renderer was written against a browser canvas. This module
//! provides exactly the capabilities it calls during setup and rendering,
//! and nothing else: fixed dimensions, no-op event subscription, a bounding
//! rectangle, context acquisition, and an element factory for canvases and
//! images. Anything else is reported as [`Error::Unsupported`].

pub mod canvas2d;
pub mod font;
pub mod image_element;

pub use canvas2d::Canvas2d;
pub use image_element::{DecodeState, ImageElement};

use crate::gl::GraphicsContext;
use crate::{Error, Result};
use std::collections::HashMap;

pub type ElementId = u32;

/// Context names that resolve to the graphics adapter.
pub const WEBGL_CONTEXT_NAMES: [&str; 3] = ["webgl", "webgl2", "experimental-webgl"];

/// Bounding rectangle reported for the surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub top: f64,
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Kind of element recorded in the surface registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Canvas,
    Image,
}

/// Element returned from [`DisplaySurface::create_element`]
#[derive(Debug, Clone)]
pub enum Element {
    /// The surface itself; the renderer only ever asks for its own canvas
    Canvas,
    Image(ImageElement),
}

pub struct DisplaySurface {
    width: u32,
    height: u32,
    context: Option<GraphicsContext>,
    elements: HashMap<ElementId, ElementKind>,
    attributes: HashMap<String, String>,
    next_element: ElementId,
    ignored_listeners: usize,
}

impl DisplaySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            context: None,
            elements: HashMap::new(),
            attributes: HashMap::new(),
            next_element: 1,
            ignored_listeners: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Install the graphics adapter returned for WebGL-family context requests.
    pub fn attach_context(&mut self, context: GraphicsContext) {
        self.context = Some(context);
    }

    /// Drop the attached context, releasing its GPU resources.
    pub fn detach_context(&mut self) -> Option<GraphicsContext> {
        self.context.take()
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// Accepts any subscription and never fires it.
    pub fn add_event_listener(&mut self, event: &str) {
        log::trace!("surface: ignoring '{}' listener", event);
        self.ignored_listeners += 1;
    }

    pub fn remove_event_listener(&mut self, _event: &str) {
        self.ignored_listeners = self.ignored_listeners.saturating_sub(1);
    }

    pub fn ignored_listeners(&self) -> usize {
        self.ignored_listeners
    }

    /// Fixed dimensions anchored at the origin.
    pub fn bounding_client_rect(&self) -> DomRect {
        let (w, h) = (self.width as f64, self.height as f64);
        DomRect {
            x: 0.0,
            y: 0.0,
            width: w,
            height: h,
            top: 0.0,
            left: 0.0,
            right: w,
            bottom: h,
        }
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        self.attributes.insert(name.to_string(), value.to_string());
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Context acquisition: WebGL-family names yield the adapter, anything
    /// else is unavailable.
    pub fn get_context(&mut self, kind: &str) -> Option<&mut GraphicsContext> {
        if WEBGL_CONTEXT_NAMES.contains(&kind) {
            self.context.as_mut()
        } else {
            None
        }
    }

    /// Element factory. `canvas` yields the surface itself, `img`/`image` a
    /// fresh decodable image element.
    pub fn create_element(&mut self, tag: &str) -> Result<Element> {
        let id = self.next_element;
        let element = match tag.to_ascii_lowercase().as_str() {
            "canvas" => {
                self.elements.insert(id, ElementKind::Canvas);
                Element::Canvas
            }
            "img" | "image" => {
                self.elements.insert(id, ElementKind::Image);
                Element::Image(ImageElement::new(id))
            }
            other => {
                return Err(Error::Unsupported(format!(
                    "createElement('{}') is not provided by the headless surface",
                    other
                )))
            }
        };
        self.next_element += 1;
        Ok(element)
    }

    /// Number of elements created so far, by kind
    pub fn element_count(&self, kind: ElementKind) -> usize {
        self.elements.values().filter(|k| **k == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::software::SoftwareContext;

    fn surface_with_context() -> DisplaySurface {
        let mut s = DisplaySurface::new(640, 360);
        let ctx = GraphicsContext::new(Box::new(SoftwareContext::new(640, 360)), 640, 360);
        s.attach_context(ctx);
        s
    }

    #[test]
    fn webgl_names_resolve_to_adapter() {
        let mut s = surface_with_context();
        for name in WEBGL_CONTEXT_NAMES {
            let ctx = s.get_context(name).expect("context");
            assert_eq!(ctx.drawing_buffer_width(), 640);
            assert_eq!(ctx.drawing_buffer_height(), 360);
        }
        assert!(s.get_context("2d").is_none());
        assert!(s.get_context("bitmaprenderer").is_none());
    }

    #[test]
    fn no_context_before_attach() {
        let mut s = DisplaySurface::new(640, 360);
        assert!(s.get_context("webgl").is_none());
    }

    #[test]
    fn bounding_rect_is_fixed_at_origin() {
        let s = DisplaySurface::new(640, 360);
        let r = s.bounding_client_rect();
        assert_eq!((r.x, r.y, r.width, r.height), (0.0, 0.0, 640.0, 360.0));
        assert_eq!((r.right, r.bottom), (640.0, 360.0));
    }

    #[test]
    fn element_factory_and_registry() {
        let mut s = DisplaySurface::new(8, 8);
        assert!(matches!(s.create_element("canvas"), Ok(Element::Canvas)));
        assert!(matches!(s.create_element("img"), Ok(Element::Image(_))));
        assert!(matches!(s.create_element("IMAGE"), Ok(Element::Image(_))));
        assert!(matches!(s.create_element("div"), Err(Error::Unsupported(_))));
        assert_eq!(s.element_count(ElementKind::Canvas), 1);
        assert_eq!(s.element_count(ElementKind::Image), 2);
    }

    #[test]
    fn listeners_are_accepted_and_ignored() {
        let mut s = DisplaySurface::new(8, 8);
        s.add_event_listener("resize");
        s.add_event_listener("webglcontextlost");
        s.remove_event_listener("resize");
        assert_eq!(s.ignored_listeners(), 1);
        s.set_attribute("width", "8");
        assert_eq!(s.attribute("width"), Some("8"));
    }
}
