//! Image elements handed out by the synthetic surface.
//!
//! Assigning a source starts decoding; completion is observable through
//! `complete()` or by awaiting `loaded()`, the same contract the hosted
//! renderer's texture loader expects from a browser image.

use super::ElementId;
use crate::{Error, Result};
use image::RgbaImage;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub enum DecodeState {
    /// No source assigned yet
    Empty,
    Pending,
    Loaded(Arc<RgbaImage>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ImageElement {
    id: ElementId,
    state: watch::Receiver<DecodeState>,
}

impl ImageElement {
    pub(crate) fn new(id: ElementId) -> Self {
        let (_tx, rx) = watch::channel(DecodeState::Empty);
        Self { id, state: rx }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Assign encoded image bytes and start decoding.
    ///
    /// Decoding runs on the blocking pool when called inside a tokio runtime
    /// and inline otherwise. A later assignment supersedes an earlier one.
    pub fn set_source(&mut self, bytes: impl Into<Arc<[u8]>>) {
        let bytes: Arc<[u8]> = bytes.into();
        let (tx, rx) = watch::channel(DecodeState::Pending);
        self.state = rx;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || {
                    tx.send_replace(decode(&bytes));
                });
            }
            Err(_) => {
                tx.send_replace(decode(&bytes));
            }
        }
    }

    /// Whether decoding has finished, successfully or not
    pub fn complete(&self) -> bool {
        matches!(
            *self.state.borrow(),
            DecodeState::Loaded(_) | DecodeState::Failed(_)
        )
    }

    pub fn state(&self) -> DecodeState {
        self.state.borrow().clone()
    }

    /// Decoded pixels, once available
    pub fn bitmap(&self) -> Option<Arc<RgbaImage>> {
        match &*self.state.borrow() {
            DecodeState::Loaded(img) => Some(img.clone()),
            _ => None,
        }
    }

    /// Natural width; 0 until decoded
    pub fn width(&self) -> u32 {
        self.bitmap().map(|b| b.width()).unwrap_or(0)
    }

    /// Natural height; 0 until decoded
    pub fn height(&self) -> u32 {
        self.bitmap().map(|b| b.height()).unwrap_or(0)
    }

    /// Wait for decoding to finish.
    pub async fn loaded(&self) -> Result<Arc<RgbaImage>> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|s| !matches!(s, DecodeState::Pending))
            .await
            .map_err(|_| Error::EncodeError("image decoder went away".into()))?
            .clone();
        match state {
            DecodeState::Loaded(img) => Ok(img),
            DecodeState::Failed(e) => Err(Error::EncodeError(e)),
            DecodeState::Empty | DecodeState::Pending => {
                Err(Error::Other("image element has no source".into()))
            }
        }
    }
}

fn decode(bytes: &[u8]) -> DecodeState {
    match image::load_from_memory(bytes) {
        Ok(img) => DecodeState::Loaded(Arc::new(img.to_rgba8())),
        Err(e) => DecodeState::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgba};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_inline_without_runtime() {
        let mut el = ImageElement::new(1);
        assert!(!el.complete());
        assert_eq!(el.width(), 0);
        el.set_source(png_bytes(4, 2));
        assert!(el.complete());
        assert_eq!((el.width(), el.height()), (4, 2));
    }

    #[tokio::test]
    async fn decodes_on_blocking_pool_inside_runtime() {
        let mut el = ImageElement::new(2);
        el.set_source(png_bytes(3, 3));
        let bitmap = el.loaded().await.unwrap();
        assert_eq!(bitmap.get_pixel(1, 1), &Rgba([10, 20, 30, 255]));
        assert!(el.complete());
    }

    #[tokio::test]
    async fn garbage_source_fails() {
        let mut el = ImageElement::new(3);
        el.set_source(vec![1u8, 2, 3, 4]);
        assert!(matches!(el.loaded().await, Err(Error::EncodeError(_))));
        assert!(el.complete());
        assert!(el.bitmap().is_none());
    }
}
