//! Dispatch of a single step to the page.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::browser::{BoundingBox, BrowserError, ClipRect, Page, Viewport};
use crate::dsl::TestStep;
use crate::session::RecordingSession;

/// Why a step did not reach its postcondition
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Expected text \"{expected}\" not found in element. Got: \"{actual}\"")]
    TextMismatch { expected: String, actual: String },

    #[error("Element not visible: {selector}")]
    NotVisible { selector: String },

    #[error("Invalid screenshot name: '{name}'")]
    InvalidScreenshotName { name: String },
}

/// Per-run knobs consulted by individual steps
#[derive(Debug, Clone, PartialEq)]
pub struct StepSettings {
    /// Used by `wait_for` steps that carry no timeout, and before element captures
    pub wait_for_timeout: Duration,
    /// Used by `screenshot_element` steps that carry no padding
    pub default_padding: f64,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            wait_for_timeout: Duration::from_millis(crate::config::DEFAULT_WAIT_FOR_TIMEOUT_MS),
            default_padding: crate::config::DEFAULT_ELEMENT_PADDING,
        }
    }
}

/// Run one step against `page`. Screenshot steps return the file they wrote.
pub async fn execute_step(
    page: &dyn Page,
    step: &TestStep,
    session: &RecordingSession,
    settings: &StepSettings,
) -> Result<Option<PathBuf>, StepError> {
    match step {
        TestStep::Goto { url } => page.goto(url).await?,
        TestStep::Click { selector } => page.click(selector).await?,
        TestStep::Type { selector, text } => page.fill(selector, text).await?,
        TestStep::WaitFor { selector, timeout } => {
            let timeout = match timeout {
                Some(0) => Duration::MAX,
                Some(ms) => Duration::from_millis(*ms),
                None => settings.wait_for_timeout,
            };
            page.wait_for_selector(selector, timeout).await?
        }
        TestStep::Wait { duration } => tokio::time::sleep(Duration::from_millis(*duration)).await,
        TestStep::Screenshot { name } => {
            let path = screenshot_path(session, name)?;
            page.screenshot(&path, None).await?;
            return Ok(Some(path));
        }
        TestStep::ScreenshotElement {
            selector,
            name,
            padding,
        } => {
            let path = screenshot_path(session, name)?;
            screenshot_element(
                page,
                selector,
                padding.unwrap_or(settings.default_padding),
                &path,
                settings,
            )
            .await?;
            return Ok(Some(path));
        }
        TestStep::AssertText { selector, text } => {
            page.wait_for_selector(selector, settings.wait_for_timeout)
                .await?;
            let actual = page.text_content(selector).await?;
            match actual {
                Some(actual) if actual.contains(text.as_str()) => {}
                other => {
                    return Err(StepError::TextMismatch {
                        expected: text.clone(),
                        actual: other.unwrap_or_default(),
                    });
                }
            }
        }
        TestStep::AssertVisible { selector } => {
            if !page.is_visible(selector).await? {
                return Err(StepError::NotVisible {
                    selector: selector.clone(),
                });
            }
        }
        TestStep::Hover { selector } => page.hover(selector).await?,
        TestStep::Select { selector, value } => page.select_option(selector, value).await?,
        TestStep::Press { key } => page.press(key).await?,
    }
    Ok(None)
}

fn screenshot_path(session: &RecordingSession, name: &str) -> Result<PathBuf, StepError> {
    session
        .screenshot_path(name)
        .ok_or_else(|| StepError::InvalidScreenshotName {
            name: name.to_string(),
        })
}

async fn screenshot_element(
    page: &dyn Page,
    selector: &str,
    padding: f64,
    path: &std::path::Path,
    settings: &StepSettings,
) -> Result<(), StepError> {
    page.wait_for_selector(selector, settings.wait_for_timeout)
        .await?;

    if padding <= 0.0 {
        page.element_screenshot(selector, path).await?;
        return Ok(());
    }

    match page.bounding_box(selector).await? {
        Some(bounds) => {
            let clip = padded_clip(&bounds, padding, page.viewport());
            if clip.width <= 0.0 || clip.height <= 0.0 {
                debug!(selector, ?bounds, "Element outside the viewport, capturing it directly");
                page.element_screenshot(selector, path).await?;
            } else {
                debug!(?clip, "Capturing padded element region");
                page.screenshot(path, Some(clip)).await?;
            }
        }
        None => {
            debug!(selector, "No bounding box, capturing element directly");
            page.element_screenshot(selector, path).await?;
        }
    }
    Ok(())
}

/// Expand `bounds` by `padding` on every side. The top-left corner is
/// clamped at the origin and the far edges at the viewport. A region
/// entirely past the viewport comes back with zero width or height.
pub fn padded_clip(bounds: &BoundingBox, padding: f64, viewport: Viewport) -> ClipRect {
    let x = (bounds.x - padding).max(0.0);
    let y = (bounds.y - padding).max(0.0);
    let width = (bounds.width + padding * 2.0)
        .min(f64::from(viewport.width) - x)
        .max(0.0);
    let height = (bounds.height + padding * 2.0)
        .min(f64::from(viewport.height) - y)
        .max(0.0);
    ClipRect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::DEFAULT_VIEWPORT;

    #[test]
    fn test_padded_clip_inside_viewport() {
        let clip = padded_clip(&BoundingBox::new(100.0, 50.0, 200.0, 40.0), 10.0, DEFAULT_VIEWPORT);
        assert_eq!(clip, ClipRect::new(90.0, 40.0, 220.0, 60.0));
    }

    #[test]
    fn test_padded_clip_clamps_top_left() {
        let clip = padded_clip(&BoundingBox::new(4.0, 2.0, 50.0, 20.0), 10.0, DEFAULT_VIEWPORT);
        assert_eq!(clip.x, 0.0);
        assert_eq!(clip.y, 0.0);
        assert_eq!(clip.width, 70.0);
        assert_eq!(clip.height, 40.0);
    }

    #[test]
    fn test_padded_clip_clamps_bottom_right() {
        let clip = padded_clip(
            &BoundingBox::new(1200.0, 690.0, 100.0, 50.0),
            20.0,
            DEFAULT_VIEWPORT,
        );
        assert_eq!(clip.x, 1180.0);
        assert_eq!(clip.y, 670.0);
        assert_eq!(clip.width, 100.0);
        assert_eq!(clip.height, 50.0);
    }

    #[test]
    fn test_padded_clip_below_the_fold_is_empty() {
        let clip = padded_clip(
            &BoundingBox::new(100.0, 1000.0, 200.0, 40.0),
            10.0,
            DEFAULT_VIEWPORT,
        );
        assert_eq!(clip, ClipRect::new(90.0, 990.0, 220.0, 0.0));
    }

    #[test]
    fn test_step_error_messages() {
        let err = StepError::TextMismatch {
            expected: "Welcome".to_string(),
            actual: "Goodbye".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Expected text \"Welcome\" not found in element. Got: \"Goodbye\""
        );

        let err = StepError::from(BrowserError::ElementNotFound {
            selector: "#gone".to_string(),
        });
        assert_eq!(err.to_string(), "Element not found: #gone");

        let err = StepError::InvalidScreenshotName {
            name: "../escape".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid screenshot name: '../escape'");
    }
}
