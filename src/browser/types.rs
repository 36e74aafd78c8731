// Core types shared by browser capability implementations

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Page viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Fixed viewport for every run
pub const DEFAULT_VIEWPORT: Viewport = Viewport::new(1280, 720);

impl Default for Viewport {
    fn default() -> Self {
        DEFAULT_VIEWPORT
    }
}

/// Element box in page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// Region of the page to capture
pub type ClipRect = BoundingBox;

/// Options for launching a browser
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run without a visible window
    pub headless: bool,
    /// Viewport applied to every page
    pub viewport: Viewport,
    /// How long element actions wait for their target before failing
    pub action_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: DEFAULT_VIEWPORT,
            action_timeout: Duration::from_millis(crate::config::DEFAULT_ACTION_TIMEOUT_MS),
        }
    }
}

/// Options for a browsing context
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Directory that receives the session recording when the context closes
    pub record_video_dir: Option<PathBuf>,
    /// Frame size of the recording
    pub video_size: Viewport,
}

/// Result type for browser operations
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Failures reported by a browser capability
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The browser process could not be started
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to '{url}' failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    /// Waited for a selector longer than allowed
    #[error("Timeout {timeout_ms}ms exceeded waiting for selector '{selector}'")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("Unknown key: \"{0}\"")]
    InvalidKey(String),

    #[error("No option with value \"{value}\" in '{selector}'")]
    OptionNotFound { selector: String, value: String },

    /// Any other protocol-level failure
    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl BrowserError {
    pub fn protocol(err: impl std::fmt::Display) -> Self {
        BrowserError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_viewport_is_fixed() {
        assert_eq!(Viewport::default(), Viewport::new(1280, 720));
        assert_eq!(LaunchOptions::default().viewport, DEFAULT_VIEWPORT);
    }

    #[test]
    fn test_error_messages() {
        let err = BrowserError::Timeout {
            selector: "#late".to_string(),
            timeout_ms: 250,
        };
        assert_eq!(
            err.to_string(),
            "Timeout 250ms exceeded waiting for selector '#late'"
        );
        assert_eq!(
            BrowserError::InvalidKey("Foo".to_string()).to_string(),
            "Unknown key: \"Foo\""
        );
    }
}
