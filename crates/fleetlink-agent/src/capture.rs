//! Screen capture seam.
//!
//! The dispatcher asks a [`CaptureProvider`] for PNG bytes when the relay
//! forwards a `get_screenshot` request. Platforms without a capturer ship
//! [`UnsupportedCapture`], which makes the agent answer with a
//! `screenshot_response` error instead of a frame.

/// Errors from a capture attempt.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Capture unavailable: {0}")]
    Unavailable(String),

    #[error("Capture failed: {0}")]
    Failed(String),
}

/// Produces PNG-encoded screen captures.
pub trait CaptureProvider: Send + Sync {
    fn capture(&self) -> Result<Vec<u8>, CaptureError>;
}

/// Capture provider for hosts without screen capture support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedCapture;

impl CaptureProvider for UnsupportedCapture {
    fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        Err(CaptureError::Unavailable(
            "screen capture is not available on this host".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_capture_reports_unavailable() {
        let err = UnsupportedCapture.capture().unwrap_err();
        assert!(err.to_string().contains("not available"));
    }
}
