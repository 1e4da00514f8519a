//! Error types for the render bridge

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while bootstrapping or driving a render session
#[derive(Error, Debug)]
pub enum Error {
    /// A session bootstrap step failed
    #[error("Session initialization failed: {0}")]
    InitializationError(String),

    /// No headless graphics context could be created
    #[error("Graphics context unavailable: {0}")]
    ContextUnavailable(String),

    /// The graphics context stopped working after creation
    #[error("Graphics context lost: {0}")]
    ContextLost(String),

    /// The scene renderer failed during a pass
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Pixel readback or frame conversion failed
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// Image encoding or decoding failed
    #[error("Image codec error: {0}")]
    EncodeError(String),

    /// The streamed chunk window could not be loaded
    #[error("World view error: {0}")]
    WorldViewError(String),

    /// The synthetic surface was asked for something it does not provide
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error leaves the session unable to render again.
    ///
    /// Only a lost context qualifies; everything else degrades a single
    /// capture and leaves the session usable.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Error::ContextLost(_))
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::EncodeError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_context_loss_is_unrecoverable() {
        assert!(Error::ContextLost("device removed".into()).is_unrecoverable());
        assert!(!Error::RenderError("bad mesh".into()).is_unrecoverable());
        assert!(!Error::CaptureError("short read".into()).is_unrecoverable());
    }

    #[test]
    fn display_includes_detail() {
        let e = Error::ContextUnavailable("no adapter".into());
        assert_eq!(e.to_string(), "Graphics context unavailable: no adapter");
    }
}
