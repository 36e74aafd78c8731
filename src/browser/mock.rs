//! In-process browser for tests.
//!
//! A `MockSite` maps URLs to `MockDocument`s, each a set of elements keyed
//! by selector. Pages render with the `Canvas` so screenshots are real PNGs,
//! and contexts write real GIF recordings. Every capability call is appended
//! to a per-session `MockSessionLog` for inspection.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use super::backend::{Browser, BrowserContext, BrowserLauncher, Page};
use super::canvas::{Canvas, GLYPH_SIZE};
use super::recorder::FrameBuffer;
use super::types::{
    BoundingBox, BrowserError, BrowserResult, ClipRect, ContextOptions, LaunchOptions, Viewport,
};

/// How often waits re-check the document
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Recording frames are thumbnails of the page
const FRAME_SIZE: (u32, u32) = (160, 90);

const BACKGROUND: [u8; 3] = [255, 255, 255];
const ELEMENT_FILL: [u8; 3] = [230, 236, 245];
const ELEMENT_BORDER: [u8; 3] = [60, 90, 160];
const TEXT_COLOR: [u8; 3] = [20, 20, 20];

/// One element of a mock page
#[derive(Debug, Clone, PartialEq)]
pub struct MockElement {
    pub text: String,
    pub visible: bool,
    /// Layout box; `None` means the element has no box
    pub bounds: Option<BoundingBox>,
    /// Option values when the element is a `<select>`
    pub options: Vec<String>,
    /// Delay after page load before the element exists
    pub appears_after: Option<Duration>,
}

impl MockElement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visible: true,
            bounds: None,
            options: Vec::new(),
            appears_after: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn at(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bounds = Some(BoundingBox::new(x, y, width, height));
        self
    }

    pub fn with_options(mut self, options: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = Some(delay);
        self
    }
}

/// The elements of one page, keyed by selector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockDocument {
    elements: BTreeMap<String, MockElement>,
}

impl MockDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(mut self, selector: impl Into<String>, element: MockElement) -> Self {
        self.elements.insert(selector.into(), element);
        self
    }

    pub fn get(&self, selector: &str) -> Option<&MockElement> {
        self.elements.get(selector)
    }
}

/// URL to document routing for mock pages. `about:blank` always resolves.
#[derive(Debug, Clone, Default)]
pub struct MockSite {
    pages: HashMap<String, MockDocument>,
}

impl MockSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: impl Into<String>, document: MockDocument) -> Self {
        self.pages.insert(url.into(), document);
        self
    }

    fn resolve(&self, url: &str) -> Option<MockDocument> {
        match self.pages.get(url) {
            Some(doc) => Some(doc.clone()),
            None if url == "about:blank" => Some(MockDocument::default()),
            None => None,
        }
    }
}

/// Record of what one launched mock browser was asked to do
#[derive(Debug, Default)]
pub struct MockSessionLog {
    calls: Mutex<Vec<String>>,
    browser_closed: AtomicBool,
    context_closed: AtomicBool,
}

impl MockSessionLog {
    fn record(&self, call: impl Into<String>) {
        lock(&self.calls).push(call.into());
    }

    /// Capability calls in order, e.g. `"click #submit"`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn browser_closed(&self) -> bool {
        self.browser_closed.load(Ordering::SeqCst)
    }

    pub fn context_closed(&self) -> bool {
        self.context_closed.load(Ordering::SeqCst)
    }
}

/// Failures the mock can be told to inject
#[derive(Debug, Clone, Default)]
struct MockFailures {
    launch: Option<String>,
    new_context: Option<String>,
    close_context: Option<String>,
    /// Panic message raised by every `goto`
    goto_panic: Option<String>,
    /// Contexts write no recording even when asked to
    no_recording: bool,
}

/// Launcher for mock browsers serving a fixed `MockSite`
#[derive(Debug, Default)]
pub struct MockLauncher {
    site: Arc<MockSite>,
    failures: MockFailures,
    sessions: Mutex<Vec<Arc<MockSessionLog>>>,
}

impl MockLauncher {
    pub fn new(site: MockSite) -> Self {
        Self {
            site: Arc::new(site),
            ..Default::default()
        }
    }

    /// Make every launch fail with `message`
    pub fn fail_launch(mut self, message: impl Into<String>) -> Self {
        self.failures.launch = Some(message.into());
        self
    }

    /// Make context creation fail with `message`
    pub fn fail_new_context(mut self, message: impl Into<String>) -> Self {
        self.failures.new_context = Some(message.into());
        self
    }

    /// Make context close (video finalization) fail with `message`
    pub fn fail_context_close(mut self, message: impl Into<String>) -> Self {
        self.failures.close_context = Some(message.into());
        self
    }

    /// Make every `goto` panic with `message`
    pub fn panic_on_goto(mut self, message: impl Into<String>) -> Self {
        self.failures.goto_panic = Some(message.into());
        self
    }

    /// Contexts ignore the recording directory and never write a video
    pub fn disable_recording(mut self) -> Self {
        self.failures.no_recording = true;
        self
    }

    /// Logs of every browser launched so far, in launch order
    pub fn sessions(&self) -> Vec<Arc<MockSessionLog>> {
        lock(&self.sessions).clone()
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, options: &LaunchOptions) -> BrowserResult<Box<dyn Browser>> {
        if let Some(message) = &self.failures.launch {
            return Err(BrowserError::Launch(message.clone()));
        }
        let log = Arc::new(MockSessionLog::default());
        log.record("launch");
        lock(&self.sessions).push(Arc::clone(&log));

        Ok(Box::new(MockBrowser {
            site: Arc::clone(&self.site),
            failures: self.failures.clone(),
            options: options.clone(),
            log,
        }))
    }

    fn engine_name(&self) -> &str {
        "mock"
    }
}

struct MockBrowser {
    site: Arc<MockSite>,
    failures: MockFailures,
    options: LaunchOptions,
    log: Arc<MockSessionLog>,
}

#[async_trait]
impl Browser for MockBrowser {
    async fn new_context(
        &mut self,
        options: ContextOptions,
    ) -> BrowserResult<Box<dyn BrowserContext>> {
        if let Some(message) = &self.failures.new_context {
            return Err(BrowserError::Protocol(message.clone()));
        }
        self.log.record("new_context");
        let frames = options
            .record_video_dir
            .as_ref()
            .filter(|_| !self.failures.no_recording)
            .map(|_| FrameBuffer::new());
        Ok(Box::new(MockContext {
            site: Arc::clone(&self.site),
            close_failure: self.failures.close_context.clone(),
            goto_panic: self.failures.goto_panic.clone(),
            launch: self.options.clone(),
            options,
            frames,
            log: Arc::clone(&self.log),
            has_page: false,
            closed: false,
        }))
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if !self.log.browser_closed.swap(true, Ordering::SeqCst) {
            self.log.record("close_browser");
        }
        Ok(())
    }
}

struct MockContext {
    site: Arc<MockSite>,
    close_failure: Option<String>,
    goto_panic: Option<String>,
    launch: LaunchOptions,
    options: ContextOptions,
    frames: Option<FrameBuffer>,
    log: Arc<MockSessionLog>,
    has_page: bool,
    closed: bool,
}

#[async_trait]
impl BrowserContext for MockContext {
    async fn new_page(&mut self) -> BrowserResult<Box<dyn Page>> {
        if self.has_page {
            return Err(BrowserError::Protocol(
                "context already has a page".to_string(),
            ));
        }
        self.has_page = true;
        self.log.record("new_page");

        let page = MockPage {
            site: Arc::clone(&self.site),
            state: Mutex::new(PageState::blank()),
            goto_panic: self.goto_panic.clone(),
            frames: self.frames.clone(),
            log: Arc::clone(&self.log),
            viewport: self.launch.viewport,
            action_timeout: self.launch.action_timeout,
        };
        page.record_frame();
        Ok(Box::new(page))
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.log.context_closed.store(true, Ordering::SeqCst);
        self.log.record("close_context");

        if let Some(message) = &self.close_failure {
            return Err(BrowserError::Protocol(message.clone()));
        }
        if let (Some(frames), Some(dir)) = (&self.frames, &self.options.record_video_dir) {
            frames.write_to_dir(dir).await?;
        }
        Ok(())
    }
}

/// Mutable state of a mock page
#[derive(Debug)]
struct PageState {
    url: String,
    document: MockDocument,
    loaded_at: Instant,
    /// Values typed or selected, keyed by selector
    values: HashMap<String, String>,
    focused: Option<String>,
}

impl PageState {
    fn blank() -> Self {
        Self {
            url: "about:blank".to_string(),
            document: MockDocument::default(),
            loaded_at: Instant::now(),
            values: HashMap::new(),
            focused: None,
        }
    }

    /// The element if it exists at this moment
    fn present(&self, selector: &str) -> Option<&MockElement> {
        self.document.get(selector).filter(|el| {
            el.appears_after
                .map(|delay| self.loaded_at.elapsed() >= delay)
                .unwrap_or(true)
        })
    }

    fn display_text(&self, selector: &str, element: &MockElement) -> String {
        self.values
            .get(selector)
            .cloned()
            .unwrap_or_else(|| element.text.clone())
    }
}

struct MockPage {
    site: Arc<MockSite>,
    state: Mutex<PageState>,
    goto_panic: Option<String>,
    frames: Option<FrameBuffer>,
    log: Arc<MockSessionLog>,
    viewport: Viewport,
    action_timeout: Duration,
}

impl MockPage {
    fn state(&self) -> MutexGuard<'_, PageState> {
        lock(&self.state)
    }

    /// Wait until `selector` exists (and is visible if `visible` is set)
    async fn wait_until(&self, selector: &str, timeout: Duration, visible: bool) -> BrowserResult<()> {
        let start = Instant::now();
        loop {
            let ready = self
                .state()
                .present(selector)
                .map(|el| !visible || el.visible)
                .unwrap_or(false);
            if ready {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(BrowserError::Timeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn actionable(&self, selector: &str) -> BrowserResult<()> {
        self.wait_until(selector, self.action_timeout, true).await
    }

    fn render(&self) -> Canvas {
        let state = self.state();
        let mut canvas = Canvas::with_color(self.viewport.width, self.viewport.height, BACKGROUND);
        for (selector, element) in &state.document.elements {
            let Some(bounds) = element.bounds else { continue };
            if !element.visible || state.present(selector).is_none() {
                continue;
            }
            let (x, y) = (bounds.x.max(0.0) as u32, bounds.y.max(0.0) as u32);
            let (w, h) = (bounds.width.max(0.0) as u32, bounds.height.max(0.0) as u32);
            canvas.draw_rect(x, y, w, h, ELEMENT_FILL);
            canvas.draw_outline(x, y, w, h, ELEMENT_BORDER);
            let text = state.display_text(selector, element);
            canvas.draw_text(x + 2, y + 2, &text, TEXT_COLOR, ELEMENT_FILL);
        }
        canvas
    }

    fn record_frame(&self) {
        if let Some(frames) = &self.frames {
            match self.render().to_frame(FRAME_SIZE.0, FRAME_SIZE.1) {
                Ok(png) => frames.push(png),
                Err(e) => debug!("Dropping mock frame: {}", e),
            }
        }
    }

    /// Log the call and capture a recording frame
    fn after_action(&self, call: String) {
        self.log.record(call);
        self.record_frame();
    }
}

#[async_trait]
impl Page for MockPage {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        if let Some(message) = &self.goto_panic {
            self.log.record(format!("goto {} (panic)", url));
            panic!("{}", message);
        }
        let document = self
            .site
            .resolve(url)
            .ok_or_else(|| BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            })?;
        {
            let mut state = self.state();
            *state = PageState::blank();
            state.url = url.to_string();
            state.document = document;
        }
        self.after_action(format!("goto {}", url));
        Ok(())
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        self.actionable(selector).await?;
        self.state().focused = Some(selector.to_string());
        self.after_action(format!("click {}", selector));
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> BrowserResult<()> {
        self.actionable(selector).await?;
        {
            let mut state = self.state();
            state.values.insert(selector.to_string(), text.to_string());
            state.focused = Some(selector.to_string());
        }
        self.after_action(format!("fill {} {}", selector, text));
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        self.wait_until(selector, timeout, false).await?;
        self.log.record(format!("wait_for {}", selector));
        Ok(())
    }

    async fn text_content(&self, selector: &str) -> BrowserResult<Option<String>> {
        self.wait_until(selector, self.action_timeout, false).await?;
        let state = self.state();
        Ok(state
            .present(selector)
            .map(|el| state.display_text(selector, el)))
    }

    async fn is_visible(&self, selector: &str) -> BrowserResult<bool> {
        self.log.record(format!("is_visible {}", selector));
        Ok(self
            .state()
            .present(selector)
            .map(|el| el.visible)
            .unwrap_or(false))
    }

    async fn hover(&self, selector: &str) -> BrowserResult<()> {
        self.actionable(selector).await?;
        self.after_action(format!("hover {}", selector));
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> BrowserResult<()> {
        self.actionable(selector).await?;
        {
            let mut state = self.state();
            let has_option = state
                .present(selector)
                .map(|el| el.options.iter().any(|o| o == value))
                .unwrap_or(false);
            if !has_option {
                return Err(BrowserError::OptionNotFound {
                    selector: selector.to_string(),
                    value: value.to_string(),
                });
            }
            state.values.insert(selector.to_string(), value.to_string());
        }
        self.after_action(format!("select {} {}", selector, value));
        Ok(())
    }

    async fn press(&self, key: &str) -> BrowserResult<()> {
        if !is_known_key(key) {
            return Err(BrowserError::InvalidKey(key.to_string()));
        }
        let target = self
            .state()
            .focused
            .clone()
            .unwrap_or_else(|| "body".to_string());
        self.after_action(format!("press {} on {}", key, target));
        Ok(())
    }

    async fn screenshot(&self, path: &Path, clip: Option<ClipRect>) -> BrowserResult<()> {
        let canvas = self.render();
        let image = match &clip {
            Some(region) => canvas.crop(region),
            None => canvas,
        };
        std::fs::write(path, image.to_png()?)?;
        self.log.record(match clip {
            Some(c) => format!("screenshot clip {} {} {} {}", c.x, c.y, c.width, c.height),
            None => "screenshot full".to_string(),
        });
        Ok(())
    }

    async fn element_screenshot(&self, selector: &str, path: &Path) -> BrowserResult<()> {
        self.wait_until(selector, self.action_timeout, false).await?;
        let (bounds, text) = {
            let state = self.state();
            let element = state
                .present(selector)
                .ok_or_else(|| BrowserError::ElementNotFound {
                    selector: selector.to_string(),
                })?;
            (element.bounds, state.display_text(selector, element))
        };
        let image = match bounds {
            Some(b) => self.render().crop(&b),
            None => {
                let width = (text.chars().count() as u32 * GLYPH_SIZE + 4).max(4);
                let mut canvas = Canvas::with_color(width, GLYPH_SIZE + 4, ELEMENT_FILL);
                canvas.draw_text(2, 2, &text, TEXT_COLOR, ELEMENT_FILL);
                canvas
            }
        };
        std::fs::write(path, image.to_png()?)?;
        self.log.record(format!("element_screenshot {}", selector));
        Ok(())
    }

    async fn bounding_box(&self, selector: &str) -> BrowserResult<Option<BoundingBox>> {
        self.wait_until(selector, self.action_timeout, false).await?;
        let state = self.state();
        Ok(state.present(selector).and_then(|el| {
            if el.visible { el.bounds } else { None }
        }))
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }
}

/// Key names accepted by `press`, including `+`-joined chords
pub fn is_known_key(key: &str) -> bool {
    const NAMED: &[&str] = &[
        "Enter", "Tab", "Escape", "Backspace", "Delete", "Space", "ArrowUp", "ArrowDown",
        "ArrowLeft", "ArrowRight", "Home", "End", "PageUp", "PageDown", "Insert", "Shift",
        "Control", "Alt", "Meta", "ControlOrMeta",
    ];
    if key.is_empty() {
        return false;
    }
    if key == "+" {
        return true;
    }
    key.split('+').all(|part| {
        part.chars().count() == 1
            || NAMED.contains(&part)
            || part
                .strip_prefix('F')
                .and_then(|n| n.parse::<u8>().ok())
                .map(|n| (1..=12).contains(&n))
                .unwrap_or(false)
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch_options() -> LaunchOptions {
        LaunchOptions {
            action_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    async fn open(site: MockSite) -> (MockLauncher, Box<dyn Page>) {
        let launcher = MockLauncher::new(site);
        let mut browser = launcher.launch(&launch_options()).await.unwrap();
        let mut context = browser
            .new_context(ContextOptions {
                record_video_dir: None,
                video_size: Viewport::default(),
            })
            .await
            .unwrap();
        let page = context.new_page().await.unwrap();
        (launcher, page)
    }

    #[test]
    fn test_known_keys() {
        assert!(is_known_key("Enter"));
        assert!(is_known_key("a"));
        assert!(is_known_key("Control+a"));
        assert!(is_known_key("F5"));
        assert!(!is_known_key("F13"));
        assert!(!is_known_key("NotAKey"));
        assert!(!is_known_key(""));
    }

    #[tokio::test]
    async fn test_goto_unknown_url_fails() {
        let (_launcher, page) = open(MockSite::new()).await;
        let err = page.goto("https://nowhere.invalid").await.unwrap_err();
        assert!(err.to_string().contains("ERR_NAME_NOT_RESOLVED"));
        page.goto("about:blank").await.unwrap();
    }

    #[tokio::test]
    async fn test_delayed_element_is_awaited() {
        let site = MockSite::new().page(
            "https://app.test",
            MockDocument::new().element(
                "#late",
                MockElement::new("done").appears_after(Duration::from_millis(30)),
            ),
        );
        let (_launcher, page) = open(site).await;
        page.goto("https://app.test").await.unwrap();

        assert!(!page.is_visible("#late").await.unwrap());
        page.wait_for_selector("#late", Duration::from_millis(500))
            .await
            .unwrap();
        assert!(page.is_visible("#late").await.unwrap());
    }

    #[tokio::test]
    async fn test_fill_replaces_text() {
        let site = MockSite::new().page(
            "https://app.test",
            MockDocument::new().element("#name", MockElement::new("placeholder")),
        );
        let (launcher, page) = open(site).await;
        page.goto("https://app.test").await.unwrap();
        page.fill("#name", "alice").await.unwrap();

        assert_eq!(
            page.text_content("#name").await.unwrap(),
            Some("alice".to_string())
        );
        let calls = launcher.sessions()[0].calls();
        assert!(calls.contains(&"fill #name alice".to_string()));
    }

    #[tokio::test]
    async fn test_hidden_element_is_not_clickable() {
        let site = MockSite::new().page(
            "https://app.test",
            MockDocument::new().element("#ghost", MockElement::new("boo").hidden()),
        );
        let (_launcher, page) = open(site).await;
        page.goto("https://app.test").await.unwrap();

        let err = page.click("#ghost").await.unwrap_err();
        assert!(matches!(err, BrowserError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_select_requires_existing_option() {
        let site = MockSite::new().page(
            "https://app.test",
            MockDocument::new().element(
                "#color",
                MockElement::new("").with_options(["red", "green"]),
            ),
        );
        let (_launcher, page) = open(site).await;
        page.goto("https://app.test").await.unwrap();

        page.select_option("#color", "green").await.unwrap();
        let err = page.select_option("#color", "blue").await.unwrap_err();
        assert!(matches!(err, BrowserError::OptionNotFound { .. }));
    }
}
