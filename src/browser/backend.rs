//! Browser capability abstraction.
//!
//! The interpreter drives a browser through these traits only:
//! - `ChromeLauncher` for real Chromium over the DevTools protocol
//! - `MockLauncher` for tests with a scripted page model
//!
//! A launcher produces a `Browser`, a browser opens one `BrowserContext`
//! (recording is configured when the context is created), and the context
//! owns a single `Page`. Closing the context finalizes the recording.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use super::types::{BoundingBox, BrowserResult, ClipRect, ContextOptions, LaunchOptions, Viewport};

/// Starts browser processes
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a new, independent browser
    async fn launch(&self, options: &LaunchOptions) -> BrowserResult<Box<dyn Browser>>;

    /// Identifier of the engine (e.g., "chromium", "mock")
    fn engine_name(&self) -> &str;
}

/// A running browser process
#[async_trait]
pub trait Browser: Send {
    /// Open a browsing context, recording into `options.record_video_dir` if set
    async fn new_context(&mut self, options: ContextOptions)
    -> BrowserResult<Box<dyn BrowserContext>>;

    /// Shut the browser down. Safe to call more than once.
    async fn close(&mut self) -> BrowserResult<()>;
}

/// An isolated browsing context
#[async_trait]
pub trait BrowserContext: Send {
    async fn new_page(&mut self) -> BrowserResult<Box<dyn Page>>;

    /// Close all pages and finish writing the recording. Safe to call more than once.
    async fn close(&mut self) -> BrowserResult<()>;
}

/// A single page and the element-level operations the DSL needs.
///
/// Element operations wait up to the launch `action_timeout` for their
/// selector to resolve, except `is_visible`, which checks once.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for the DOM content to load
    async fn goto(&self, url: &str) -> BrowserResult<()>;

    async fn click(&self, selector: &str) -> BrowserResult<()>;

    /// Clear the element's content, then type `text` into it
    async fn fill(&self, selector: &str, text: &str) -> BrowserResult<()>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    /// Text content of the element, `None` when it has none
    async fn text_content(&self, selector: &str) -> BrowserResult<Option<String>>;

    /// Point-in-time visibility check; a missing element is not visible
    async fn is_visible(&self, selector: &str) -> BrowserResult<bool>;

    async fn hover(&self, selector: &str) -> BrowserResult<()>;

    /// Select the `<option>` whose value is `value`
    async fn select_option(&self, selector: &str, value: &str) -> BrowserResult<()>;

    /// Press a named key on the focused element
    async fn press(&self, key: &str) -> BrowserResult<()>;

    /// Write a PNG of the full page, or of `clip` only, to `path`
    async fn screenshot(&self, path: &Path, clip: Option<ClipRect>) -> BrowserResult<()>;

    /// Write a PNG of the element's own box to `path`
    async fn element_screenshot(&self, selector: &str, path: &Path) -> BrowserResult<()>;

    /// Box of the element, `None` when it is not rendered
    async fn bounding_box(&self, selector: &str) -> BrowserResult<Option<BoundingBox>>;

    fn viewport(&self) -> Viewport;
}
