//! Chromium backend over the DevTools protocol.
//!
//! Each launch gets its own profile directory so concurrent runs never share
//! a browser process. Every context is a separate CDP browser context with a
//! single page, recorded through the screencast.

use async_trait::async_trait;
use chromiumoxide::Page as CdpPage;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport as CdpClip};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::Element;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{Browser, BrowserContext, BrowserLauncher, Page};
use super::recorder::ScreencastRecorder;
use super::types::{
    BoundingBox, BrowserError, BrowserResult, ClipRect, ContextOptions, LaunchOptions, Viewport,
};

/// How often element lookups are retried while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Largest frame size kept in recordings
const MAX_RECORDING_SIZE: Viewport = Viewport::new(640, 360);

static PROFILE_COUNTER: AtomicU64 = AtomicU64::new(0);

const CLEAR_JS: &str = "function() {
    this.focus();
    if ('value' in this) {
        this.value = '';
        this.dispatchEvent(new Event('input', { bubbles: true }));
    } else if (this.isContentEditable) {
        this.textContent = '';
    }
}";

const TEXT_CONTENT_JS: &str = "function() { return this.textContent; }";

/// Launches headless Chromium through chromiumoxide
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    /// Explicit Chromium binary; auto-detected when `None`
    executable: Option<PathBuf>,
    /// Extra command-line switches
    args: Vec<String>,
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher using `WEBQA_CHROME_PATH` when set
    pub fn from_config() -> Self {
        Self {
            executable: crate::config::get().browser.chrome_path.clone(),
            args: Vec::new(),
        }
    }

    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> BrowserResult<Box<dyn Browser>> {
        let profile_dir = std::env::temp_dir().join(format!(
            "webqa-profile-{}-{}",
            std::process::id(),
            PROFILE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .window_size(options.viewport.width, options.viewport.height)
            .user_data_dir(&profile_dir);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &self.args {
            builder = builder.arg(arg.as_str());
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        info!(headless = options.headless, "Launching Chromium");
        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // The handler drives the CDP websocket; it must be polled for any
        // command to complete.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
            debug!("CDP handler event loop ended");
        });

        Ok(Box::new(ChromeBrowser {
            inner: Arc::new(Mutex::new(browser)),
            handler_task: Some(handler_task),
            options: options.clone(),
            profile_dir,
            closed: false,
        }))
    }

    fn engine_name(&self) -> &str {
        "chromium"
    }
}

/// A launched Chromium process
pub struct ChromeBrowser {
    inner: Arc<Mutex<CdpBrowser>>,
    handler_task: Option<JoinHandle<()>>,
    options: LaunchOptions,
    profile_dir: PathBuf,
    closed: bool,
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn new_context(
        &mut self,
        options: ContextOptions,
    ) -> BrowserResult<Box<dyn BrowserContext>> {
        let context_id = self
            .inner
            .lock()
            .await
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(BrowserError::protocol)?
            .result
            .browser_context_id;
        debug!(?context_id, "Created browser context");

        Ok(Box::new(ChromeContext {
            browser: Arc::clone(&self.inner),
            context_id: Some(context_id),
            page: None,
            recorder: None,
            options,
            launch: self.options.clone(),
            closed: false,
        }))
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = {
            let mut browser = self.inner.lock().await;
            let closed = browser.close().await.map(|_| ());
            if let Err(e) = browser.wait().await {
                warn!("Failed to reap Chromium process: {}", e);
            }
            closed
        };
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
            debug!("Profile dir {} not removed: {}", self.profile_dir.display(), e);
        }
        info!("Chromium closed");
        result.map_err(BrowserError::protocol)
    }
}

impl Drop for ChromeBrowser {
    fn drop(&mut self) {
        // chromiumoxide kills the child process when its Browser drops.
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        if !self.closed {
            let _ = std::fs::remove_dir_all(&self.profile_dir);
        }
    }
}

/// An isolated CDP browser context holding one recorded page
pub struct ChromeContext {
    browser: Arc<Mutex<CdpBrowser>>,
    context_id: Option<BrowserContextId>,
    page: Option<CdpPage>,
    recorder: Option<ScreencastRecorder>,
    options: ContextOptions,
    launch: LaunchOptions,
    closed: bool,
}

#[async_trait]
impl BrowserContext for ChromeContext {
    async fn new_page(&mut self) -> BrowserResult<Box<dyn Page>> {
        if self.page.is_some() {
            return Err(BrowserError::Protocol(
                "context already has a page".to_string(),
            ));
        }

        let mut target = CreateTargetParams::new("about:blank");
        target.browser_context_id = self.context_id.clone();
        let page = self
            .browser
            .lock()
            .await
            .new_page(target)
            .await
            .map_err(BrowserError::protocol)?;

        let viewport = self.launch.viewport;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        ))
        .await
        .map_err(BrowserError::protocol)?;

        if self.options.record_video_dir.is_some() {
            let size = Viewport::new(
                self.options.video_size.width.min(MAX_RECORDING_SIZE.width),
                self.options.video_size.height.min(MAX_RECORDING_SIZE.height),
            );
            self.recorder = Some(ScreencastRecorder::start(&page, size).await?);
        }

        self.page = Some(page.clone());
        Ok(Box::new(ChromePage {
            page,
            viewport,
            action_timeout: self.launch.action_timeout,
        }))
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let recording = match (self.recorder.as_mut(), self.options.record_video_dir.as_ref()) {
            (Some(recorder), Some(dir)) => recorder.finish(dir).await,
            _ => Ok(None),
        };
        self.recorder = None;

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close page: {}", e);
            }
        }
        if let Some(id) = self.context_id.take() {
            self.browser
                .lock()
                .await
                .execute(DisposeBrowserContextParams::new(id))
                .await
                .map_err(BrowserError::protocol)?;
        }

        if let Some(path) = recording? {
            debug!("Recording written to {}", path.display());
        }
        Ok(())
    }
}

/// One Chromium tab
pub struct ChromePage {
    page: CdpPage,
    viewport: Viewport,
    action_timeout: Duration,
}

impl ChromePage {
    /// Poll for the selector until it resolves or `timeout` elapses
    async fn wait_element(&self, selector: &str, timeout: Duration) -> BrowserResult<Element> {
        let start = Instant::now();
        loop {
            match self.page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(_) if start.elapsed() >= timeout => {
                    return Err(BrowserError::Timeout {
                        selector: selector.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                Err(_) => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    }

    async fn element(&self, selector: &str) -> BrowserResult<Element> {
        self.wait_element(selector, self.action_timeout).await
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, expression: String) -> BrowserResult<T> {
        self.page
            .evaluate(expression)
            .await
            .map_err(BrowserError::protocol)?
            .into_value::<T>()
            .map_err(BrowserError::protocol)
    }
}

/// Quote a string as a JavaScript literal
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[async_trait]
impl Page for ChromePage {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        debug!("Navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        self.element(selector)
            .await?
            .click()
            .await
            .map_err(BrowserError::protocol)?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> BrowserResult<()> {
        let element = self.element(selector).await?;
        element
            .call_js_fn(CLEAR_JS, false)
            .await
            .map_err(BrowserError::protocol)?;
        element
            .type_str(text)
            .await
            .map_err(BrowserError::protocol)?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        self.wait_element(selector, timeout).await.map(|_| ())
    }

    async fn text_content(&self, selector: &str) -> BrowserResult<Option<String>> {
        let returns = self
            .element(selector)
            .await?
            .call_js_fn(TEXT_CONTENT_JS, false)
            .await
            .map_err(BrowserError::protocol)?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    async fn is_visible(&self, selector: &str) -> BrowserResult<bool> {
        self.eval(format!(
            "(() => {{
                const el = document.querySelector({});
                if (!el) return false;
                const style = window.getComputedStyle(el);
                if (style.visibility === 'hidden' || style.display === 'none') return false;
                const rect = el.getBoundingClientRect();
                return rect.width > 0 && rect.height > 0;
            }})()",
            js_string(selector)
        ))
        .await
    }

    async fn hover(&self, selector: &str) -> BrowserResult<()> {
        self.element(selector)
            .await?
            .hover()
            .await
            .map_err(BrowserError::protocol)?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> BrowserResult<()> {
        self.element(selector).await?;
        let outcome: String = self
            .eval(format!(
                "(() => {{
                    const el = document.querySelector({sel});
                    if (!el || el.tagName !== 'SELECT') return 'not-select';
                    const opt = Array.from(el.options).find(o => o.value === {val});
                    if (!opt) return 'missing';
                    el.value = {val};
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    return 'ok';
                }})()",
                sel = js_string(selector),
                val = js_string(value)
            ))
            .await?;
        match outcome.as_str() {
            "ok" => Ok(()),
            "missing" => Err(BrowserError::OptionNotFound {
                selector: selector.to_string(),
                value: value.to_string(),
            }),
            _ => Err(BrowserError::Protocol(format!(
                "Element '{}' is not a <select>",
                selector
            ))),
        }
    }

    async fn press(&self, key: &str) -> BrowserResult<()> {
        let target = match self.page.find_element(":focus").await {
            Ok(element) => element,
            Err(_) => self
                .page
                .find_element("body")
                .await
                .map_err(BrowserError::protocol)?,
        };
        target
            .press_key(key)
            .await
            .map_err(|e| BrowserError::Protocol(format!("Failed to press '{}': {}", key, e)))?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path, clip: Option<ClipRect>) -> BrowserResult<()> {
        let params = ScreenshotParams::builder().format(CaptureScreenshotFormat::Png);
        let params = match clip {
            Some(clip) => params.clip(CdpClip {
                x: clip.x,
                y: clip.y,
                width: clip.width,
                height: clip.height,
                scale: 1.0,
            }),
            None => params.full_page(true),
        };
        self.page
            .save_screenshot(params.build(), path)
            .await
            .map_err(BrowserError::protocol)?;
        Ok(())
    }

    async fn element_screenshot(&self, selector: &str, path: &Path) -> BrowserResult<()> {
        self.element(selector)
            .await?
            .save_screenshot(CaptureScreenshotFormat::Png, path)
            .await
            .map_err(BrowserError::protocol)?;
        Ok(())
    }

    async fn bounding_box(&self, selector: &str) -> BrowserResult<Option<BoundingBox>> {
        let element = self.element(selector).await?;
        match element.bounding_box().await {
            Ok(b) => Ok(Some(BoundingBox::new(b.x, b.y, b.width, b.height))),
            Err(e) => {
                debug!("No bounding box for '{}': {}", selector, e);
                Ok(None)
            }
        }
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string("a[name=\"q\"]"), r#""a[name=\"q\"]""#);
        assert_eq!(js_string("#title"), "\"#title\"");
    }

    #[test]
    fn test_launcher_builder() {
        let launcher = ChromeLauncher::new()
            .executable("/usr/bin/chromium")
            .arg("--lang=en-US");
        assert_eq!(launcher.executable, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(launcher.args, vec!["--lang=en-US".to_string()]);
        assert_eq!(launcher.engine_name(), "chromium");
    }
}
