//! Test interpreter.
//!
//! `Interpreter::execute_test` owns one browser session for one run:
//!
//! 1. create the run's recording directory
//! 2. launch a browser and open a context that records into that directory
//! 3. execute the steps in order, stopping at the first failure
//! 4. close the context, which finalizes the recording, then look it up
//! 5. assemble the `TestResult`
//!
//! Every failure ends up in the returned report. The context and browser are
//! closed on every path, including a panic inside the run.

pub mod executor;

pub use executor::{StepError, StepSettings, execute_step, padded_clip};

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::{
    Browser, BrowserContext, BrowserError, BrowserLauncher, ContextOptions, DEFAULT_VIEWPORT,
    LaunchOptions, Page, VIDEO_EXTENSION, Viewport,
};
use crate::config::Config;
use crate::dsl::{StepResult, TestDefinition, TestResult};
use crate::session::RecordingSession;

/// Failures outside any single step
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Failed to prepare recording directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Test run panicked: {0}")]
    Panicked(String),
}

/// Settings shared by every run of an `Interpreter`
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Base directory; each run gets its own subdirectory
    pub recordings_dir: PathBuf,
    pub headless: bool,
    pub viewport: Viewport,
    /// Capability default timeout for element actions
    pub action_timeout: Duration,
    pub steps: StepSettings,
    /// Delay between context close and the first recording lookup
    pub video_grace: Duration,
    pub video_poll_attempts: u32,
}

impl InterpreterConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            recordings_dir: config.recording.base_dir.clone(),
            headless: config.browser.headless,
            viewport: DEFAULT_VIEWPORT,
            action_timeout: Duration::from_millis(config.timeouts.action_ms),
            steps: StepSettings {
                wait_for_timeout: Duration::from_millis(config.timeouts.wait_for_ms),
                ..StepSettings::default()
            },
            video_grace: Duration::from_millis(config.recording.video_grace_ms),
            video_poll_attempts: config.recording.video_poll_attempts,
        }
    }

    pub fn recordings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recordings_dir = dir.into();
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn wait_for_timeout(mut self, timeout: Duration) -> Self {
        self.steps.wait_for_timeout = timeout;
        self
    }

    pub fn video_grace(mut self, grace: Duration) -> Self {
        self.video_grace = grace;
        self
    }

    /// At least one lookup always happens
    pub fn video_poll_attempts(mut self, attempts: u32) -> Self {
        self.video_poll_attempts = attempts.max(1);
        self
    }

    fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.headless,
            viewport: self.viewport,
            action_timeout: self.action_timeout,
        }
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::from_config(crate::config::get())
    }
}

/// Runs test definitions against browsers from one launcher
pub struct Interpreter<L> {
    launcher: L,
    config: InterpreterConfig,
}

impl<L: BrowserLauncher> Interpreter<L> {
    /// Interpreter configured from the environment
    pub fn new(launcher: L) -> Self {
        Self::with_config(launcher, InterpreterConfig::default())
    }

    pub fn with_config(launcher: L, config: InterpreterConfig) -> Self {
        Self { launcher, config }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Run `definition` to completion. Never fails; problems are reported in
    /// the returned `TestResult`.
    pub async fn execute_test(&self, definition: &TestDefinition) -> TestResult {
        let started = Instant::now();
        let session = RecordingSession::new(
            &self.config.recordings_dir,
            &definition.test_name,
            self.config.viewport,
        );
        info!(
            test = %definition.test_name,
            engine = self.launcher.engine_name(),
            dir = %session.dir.display(),
            "Starting test run"
        );

        let mut resources = SessionResources::default();
        let mut progress = RunProgress::default();

        let outcome = AssertUnwindSafe(self.run(definition, &session, &mut resources, &mut progress))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(SessionError::Panicked(panic_message(payload))));

        resources.release().await;

        let error = match outcome {
            Ok(None) => None,
            Ok(Some(step_failure)) => Some(step_failure),
            Err(e) => Some(format!("Test execution failed: {}", e)),
        };
        let success = error.is_none();
        let result = TestResult {
            test_name: definition.test_name.clone(),
            success,
            steps_executed: progress.step_results.len(),
            steps_total: definition.steps.len(),
            step_results: progress.step_results,
            video_path: progress.video_path.map(|p| p.display().to_string()),
            screenshots: progress.screenshots,
            error,
            total_duration_ms: elapsed_ms(started),
        };

        match &result.error {
            None => info!(
                test = %result.test_name,
                steps = result.steps_executed,
                duration_ms = result.total_duration_ms,
                "Test passed"
            ),
            Some(e) => info!(test = %result.test_name, error = %e, "Test failed"),
        }
        result
    }

    /// The guarded part of a run. Returns the step failure message, if any.
    async fn run(
        &self,
        definition: &TestDefinition,
        session: &RecordingSession,
        resources: &mut SessionResources,
        progress: &mut RunProgress,
    ) -> Result<Option<String>, SessionError> {
        session.init()?;

        let browser = self.launcher.launch(&self.config.launch_options()).await?;
        let browser = resources.browser.insert(browser);
        let context = browser
            .new_context(ContextOptions {
                record_video_dir: Some(session.dir.clone()),
                video_size: self.config.viewport,
            })
            .await?;
        let context = resources.context.insert(context);
        let page = context.new_page().await?;
        let page: &dyn Page = &**resources.page.insert(page);

        let mut failure = None;
        for (index, step) in definition.steps.iter().enumerate() {
            let action = step.action();
            let step_started = Instant::now();
            debug!(index, action, "Executing step");

            match execute_step(page, step, session, &self.config.steps).await {
                Ok(screenshot) => {
                    if let Some(path) = screenshot {
                        progress.screenshots.push(path.display().to_string());
                    }
                    progress.step_results.push(StepResult {
                        step_index: index,
                        action: action.to_string(),
                        success: true,
                        error: None,
                        duration_ms: elapsed_ms(step_started),
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    debug!(index, action, error = %message, "Step failed");
                    progress.step_results.push(StepResult {
                        step_index: index,
                        action: action.to_string(),
                        success: false,
                        error: Some(message.clone()),
                        duration_ms: elapsed_ms(step_started),
                    });
                    failure = Some(format!("Step {} ({}) failed: {}", index, action, message));
                    break;
                }
            }
        }

        resources.page = None;
        if let Some(mut context) = resources.context.take() {
            context.close().await?;
        }
        progress.video_path = self.find_video(session).await;

        Ok(failure)
    }

    /// Best-effort lookup of the finalized recording
    async fn find_video(&self, session: &RecordingSession) -> Option<PathBuf> {
        for attempt in 1..=self.config.video_poll_attempts.max(1) {
            tokio::time::sleep(self.config.video_grace).await;
            if let Some(path) = session.find_video(VIDEO_EXTENSION) {
                return Some(path);
            }
            debug!(attempt, "Recording not found yet");
        }
        None
    }
}

/// What a run has produced so far. Survives a failed or panicked run.
#[derive(Debug, Default)]
struct RunProgress {
    step_results: Vec<StepResult>,
    screenshots: Vec<String>,
    video_path: Option<PathBuf>,
}

/// Browser handles opened by a run, released in reverse order
#[derive(Default)]
struct SessionResources {
    browser: Option<Box<dyn Browser>>,
    context: Option<Box<dyn BrowserContext>>,
    page: Option<Box<dyn Page>>,
}

impl SessionResources {
    async fn release(&mut self) {
        self.page = None;
        if let Some(mut context) = self.context.take() {
            if let Err(e) = context.close().await {
                warn!("Failed to close browser context: {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder_overrides() {
        let config = InterpreterConfig::from_config(&Config::defaults())
            .recordings_dir("/tmp/webqa-test")
            .headless(false)
            .wait_for_timeout(Duration::from_millis(250))
            .video_poll_attempts(0);

        assert_eq!(config.recordings_dir, PathBuf::from("/tmp/webqa-test"));
        assert!(!config.headless);
        assert_eq!(config.steps.wait_for_timeout, Duration::from_millis(250));
        assert_eq!(config.steps.default_padding, 10.0);
        assert_eq!(config.video_poll_attempts, 1);
        assert_eq!(config.viewport, Viewport::new(1280, 720));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
