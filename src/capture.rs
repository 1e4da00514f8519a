//! Frame capture: readback correction, explicit outcomes and transport
//! encoding.

use crate::{Error, Result, Viewport};
use base64::Engine as Base64Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw readback: RGBA rows in bottom-up order, as the context delivers them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    pub fn from_bottom_up(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(Error::CaptureError(format!(
                "readback returned {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reverse row order. Applying it twice yields the original buffer.
    pub fn flip_rows(&self) -> FrameBuffer {
        FrameBuffer {
            width: self.width,
            height: self.height,
            data: flip_rows(&self.data, self.width, self.height),
        }
    }

    /// Top-down image with every pixel forced opaque. RGB is untouched.
    pub fn into_top_down(self) -> RgbaImage {
        let mut data = flip_rows(&self.data, self.width, self.height);
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        // length was validated on construction
        RgbaImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

/// Destination row `y` takes source row `height - 1 - y`.
pub fn flip_rows(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let stride = width as usize * 4;
    let mut out = Vec::with_capacity(data.len());
    for y in 0..height as usize {
        let src = height as usize - 1 - y;
        out.extend_from_slice(&data[src * stride..(src + 1) * stride]);
    }
    out
}

/// Final frame, HUD included. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositedImage {
    image: RgbaImage,
}

impl CompositedImage {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.image
    }

    pub fn is_opaque(&self) -> bool {
        self.image.pixels().all(|p| p[3] == 255)
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let rgb = image::DynamicImage::ImageRgba8(self.image.clone()).to_rgb8();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality).encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ColorType::Rgb8,
        )?;
        Ok(out)
    }
}

/// Uniform fallback frame
pub fn blank_image(viewport: Viewport, color: [u8; 3]) -> CompositedImage {
    let [r, g, b] = color;
    CompositedImage::new(RgbaImage::from_pixel(
        viewport.width,
        viewport.height,
        Rgba([r, g, b, 255]),
    ))
}

/// The fallback frame together with its encoding, produced once up front so
/// a degraded response never depends on a fresh encode succeeding.
#[derive(Debug, Clone)]
pub struct FallbackFrame {
    image: CompositedImage,
    jpeg: Vec<u8>,
}

impl FallbackFrame {
    pub fn new(viewport: Viewport, color: [u8; 3], quality: u8) -> Result<Self> {
        let image = blank_image(viewport, color);
        let jpeg = image.encode_jpeg(quality)?;
        Ok(Self { image, jpeg })
    }

    pub fn image(&self) -> &CompositedImage {
        &self.image
    }

    pub fn jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    /// Degraded outcome carrying a copy of the fallback frame
    pub fn outcome(&self, reason: DegradedReason) -> CaptureOutcome {
        CaptureOutcome::Degraded {
            image: self.image.clone(),
            reason,
        }
    }
}

/// Why a capture answered with the fallback frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    NoAgent,
    NoSession,
    NotReady,
    Failed(String),
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedReason::NoAgent => write!(f, "no agent connected"),
            DegradedReason::NoSession => write!(f, "no render session"),
            DegradedReason::NotReady => write!(f, "render session not ready"),
            DegradedReason::Failed(e) => write!(f, "capture failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Rendered(CompositedImage),
    Degraded {
        image: CompositedImage,
        reason: DegradedReason,
    },
}

impl CaptureOutcome {
    pub fn degraded(viewport: Viewport, color: [u8; 3], reason: DegradedReason) -> Self {
        CaptureOutcome::Degraded {
            image: blank_image(viewport, color),
            reason,
        }
    }

    pub fn image(&self) -> &CompositedImage {
        match self {
            CaptureOutcome::Rendered(image) => image,
            CaptureOutcome::Degraded { image, .. } => image,
        }
    }

    pub fn reason(&self) -> Option<&DegradedReason> {
        match self {
            CaptureOutcome::Rendered(_) => None,
            CaptureOutcome::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.reason().is_some()
    }

    /// Encode for transport. Never fails: an encoder error answers with the
    /// pre-encoded fallback frame.
    pub fn into_response(self, quality: u8, fallback: &FallbackFrame) -> CaptureResponse {
        let (width, height, encoded, reason) = match self.image().encode_jpeg(quality) {
            Ok(bytes) => (
                self.image().width(),
                self.image().height(),
                bytes,
                self.reason().map(ToString::to_string),
            ),
            Err(e) => {
                log::error!("frame encoding failed, answering fallback frame: {}", e);
                (
                    fallback.image().width(),
                    fallback.image().height(),
                    fallback.jpeg().to_vec(),
                    Some(DegradedReason::Failed(e.to_string()).to_string()),
                )
            }
        };
        CaptureResponse {
            success: true,
            image: base64::engine::general_purpose::STANDARD.encode(&encoded),
            format: "jpeg".to_string(),
            width,
            height,
            degraded: reason,
        }
    }
}

/// Payload returned for a screenshot request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub success: bool,
    /// Base64 of the encoded image
    pub image: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl CaptureResponse {
    /// Decode the payload back into pixels.
    pub fn decode_image(&self) -> Result<RgbaImage> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.image)
            .map_err(|e| Error::EncodeError(e.to_string()))?;
        Ok(image::load_from_memory(&bytes)?.to_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(width: u32, height: u32) -> FrameBuffer {
        let data = (0..height)
            .flat_map(|y| (0..width).flat_map(move |x| [y as u8, x as u8, 7, 0]))
            .collect();
        FrameBuffer::from_bottom_up(width, height, data).unwrap()
    }

    #[test]
    fn flip_is_an_involution() {
        for h in [1, 2, 3, 360] {
            let fb = numbered(4, h);
            assert_eq!(fb.flip_rows().flip_rows(), fb);
        }
    }

    #[test]
    fn flip_maps_bottom_row_to_top() {
        let img = numbered(2, 3).into_top_down();
        assert_eq!(img.get_pixel(0, 0)[0], 2);
        assert_eq!(img.get_pixel(0, 2)[0], 0);
        assert_eq!(img.get_pixel(1, 1)[1], 1);
    }

    #[test]
    fn single_row_is_unchanged_except_alpha() {
        let img = numbered(3, 1).into_top_down();
        assert_eq!(img.get_pixel(2, 0), &Rgba([0, 2, 7, 255]));
    }

    #[test]
    fn alpha_forced_opaque_rgb_kept() {
        let img = numbered(4, 4).into_top_down();
        assert!(img.pixels().all(|p| p[3] == 255 && p[2] == 7));
    }

    #[test]
    fn short_readback_is_rejected() {
        assert!(matches!(
            FrameBuffer::from_bottom_up(2, 2, vec![0; 15]),
            Err(Error::CaptureError(_))
        ));
    }

    fn black() -> FallbackFrame {
        FallbackFrame::new(Viewport::default(), [0, 0, 0], 90).unwrap()
    }

    #[test]
    fn degraded_response_is_black_and_successful() {
        let outcome = CaptureOutcome::degraded(Viewport::default(), [0, 0, 0], DegradedReason::NotReady);
        let resp = outcome.into_response(90, &black());
        assert!(resp.success);
        assert_eq!(resp.format, "jpeg");
        assert_eq!((resp.width, resp.height), (640, 360));
        assert_eq!(resp.degraded.as_deref(), Some("render session not ready"));
        let img = resp.decode_image().unwrap();
        assert_eq!(img.dimensions(), (640, 360));
        assert!(img.pixels().all(|p| p[0] <= 2 && p[1] <= 2 && p[2] <= 2));
    }

    #[test]
    fn response_omits_degraded_when_rendered() {
        let outcome = CaptureOutcome::Rendered(blank_image(Viewport { width: 8, height: 8 }, [255, 255, 255]));
        let json = serde_json::to_value(outcome.into_response(90, &black())).unwrap();
        assert!(json.get("degraded").is_none());
        assert_eq!(json["width"], 8);
    }

    #[test]
    fn unencodable_frame_answers_cached_fallback() {
        // JPEG caps dimensions at 65535
        let outcome = CaptureOutcome::Rendered(CompositedImage::new(RgbaImage::new(65_536, 1)));
        let resp = outcome.into_response(90, &black());
        assert!(resp.success);
        assert!(!resp.image.is_empty());
        assert_eq!((resp.width, resp.height), (640, 360));
        assert!(resp.degraded.as_deref().unwrap().starts_with("capture failed"));
        let img = resp.decode_image().unwrap();
        assert_eq!(img.dimensions(), (640, 360));
        assert!(img.pixels().all(|p| p[0] <= 2 && p[1] <= 2 && p[2] <= 2));
    }

    #[test]
    fn fallback_frame_outcome_is_degraded() {
        let fallback = FallbackFrame::new(Viewport { width: 4, height: 2 }, [9, 9, 9], 90).unwrap();
        let outcome = fallback.outcome(DegradedReason::NoAgent);
        assert_eq!(outcome.reason(), Some(&DegradedReason::NoAgent));
        assert_eq!(outcome.image(), fallback.image());
    }
}
