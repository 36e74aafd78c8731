//! Configuration management with environment variable support.
//!
//! Every tunable has a hard-coded default that can be overridden from the
//! environment. The global `Config` is read once and cached.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `WEBQA_RECORDINGS_DIR` | Base directory for run recordings | `./recordings` |
//! | `WEBQA_HEADLESS` | Run Chromium without a window | `true` |
//! | `WEBQA_CHROME_PATH` | Chromium executable | auto-detected |
//! | `WEBQA_ACTION_TIMEOUT` | Element action timeout (ms) | `30000` |
//! | `WEBQA_WAIT_FOR_TIMEOUT` | Default `wait_for` timeout (ms) | `30000` |
//! | `WEBQA_VIDEO_GRACE` | Delay before looking for the recording (ms) | `500` |
//! | `WEBQA_VIDEO_POLL_ATTEMPTS` | Recording lookups before giving up | `1` |
//!
//! # Example
//!
//! ```bash
//! export WEBQA_RECORDINGS_DIR="/var/tmp/webqa"
//! export WEBQA_HEADLESS=false
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default base directory for recordings
pub const DEFAULT_RECORDINGS_DIR: &str = "./recordings";

/// Chromium runs headless unless told otherwise
pub const DEFAULT_HEADLESS: bool = true;

/// Default timeout for element actions (milliseconds)
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for `wait_for` steps without one (milliseconds)
pub const DEFAULT_WAIT_FOR_TIMEOUT_MS: u64 = 30_000;

/// Padding around `screenshot_element` captures (pixels)
pub const DEFAULT_ELEMENT_PADDING: f64 = 10.0;

/// Delay after context close before the recording is looked up (milliseconds)
pub const DEFAULT_VIDEO_GRACE_MS: u64 = 500;

/// Number of recording lookups after the grace delay
pub const DEFAULT_VIDEO_POLL_ATTEMPTS: u32 = 1;

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_RECORDINGS_DIR: &str = "WEBQA_RECORDINGS_DIR";

pub const ENV_HEADLESS: &str = "WEBQA_HEADLESS";

pub const ENV_CHROME_PATH: &str = "WEBQA_CHROME_PATH";

pub const ENV_ACTION_TIMEOUT: &str = "WEBQA_ACTION_TIMEOUT";

pub const ENV_WAIT_FOR_TIMEOUT: &str = "WEBQA_WAIT_FOR_TIMEOUT";

pub const ENV_VIDEO_GRACE: &str = "WEBQA_VIDEO_GRACE";

pub const ENV_VIDEO_POLL_ATTEMPTS: &str = "WEBQA_VIDEO_POLL_ATTEMPTS";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub browser: BrowserSettings,
    pub recording: RecordingSettings,
    pub timeouts: TimeoutSettings,
}

/// Browser process settings
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Explicit Chromium executable; `None` lets the launcher search for one
    pub chrome_path: Option<PathBuf>,
}

/// Where and how recordings are collected
#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub base_dir: PathBuf,
    /// Delay before the recording is looked up (milliseconds)
    pub video_grace_ms: u64,
    pub video_poll_attempts: u32,
}

/// Timeouts in milliseconds
#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    pub action_ms: u64,
    pub wait_for_ms: u64,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            browser: BrowserSettings::from_env(),
            recording: RecordingSettings::from_env(),
            timeouts: TimeoutSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            browser: BrowserSettings::defaults(),
            recording: RecordingSettings::defaults(),
            timeouts: TimeoutSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl BrowserSettings {
    pub fn from_env() -> Self {
        Self {
            headless: env::var(ENV_HEADLESS)
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(DEFAULT_HEADLESS),
            chrome_path: env::var_os(ENV_CHROME_PATH)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn defaults() -> Self {
        Self {
            headless: DEFAULT_HEADLESS,
            chrome_path: None,
        }
    }
}

impl RecordingSettings {
    pub fn from_env() -> Self {
        Self {
            base_dir: env::var_os(ENV_RECORDINGS_DIR)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORDINGS_DIR)),
            video_grace_ms: parse_env(ENV_VIDEO_GRACE).unwrap_or(DEFAULT_VIDEO_GRACE_MS),
            video_poll_attempts: parse_env(ENV_VIDEO_POLL_ATTEMPTS)
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_VIDEO_POLL_ATTEMPTS),
        }
    }

    pub fn defaults() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_RECORDINGS_DIR),
            video_grace_ms: DEFAULT_VIDEO_GRACE_MS,
            video_poll_attempts: DEFAULT_VIDEO_POLL_ATTEMPTS,
        }
    }
}

impl TimeoutSettings {
    pub fn from_env() -> Self {
        Self {
            action_ms: parse_env(ENV_ACTION_TIMEOUT).unwrap_or(DEFAULT_ACTION_TIMEOUT_MS),
            wait_for_ms: parse_env(ENV_WAIT_FOR_TIMEOUT).unwrap_or(DEFAULT_WAIT_FOR_TIMEOUT_MS),
        }
    }

    pub fn defaults() -> Self {
        Self {
            action_ms: DEFAULT_ACTION_TIMEOUT_MS,
            wait_for_ms: DEFAULT_WAIT_FOR_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Accepts true/false, 1/0, yes/no and on/off
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Base recordings directory (convenience function)
pub fn recordings_dir() -> PathBuf {
    get().recording.base_dir.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool(" YES "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert!(config.browser.headless);
        assert!(config.browser.chrome_path.is_none());
        assert_eq!(config.recording.base_dir, PathBuf::from(DEFAULT_RECORDINGS_DIR));
        assert_eq!(config.recording.video_grace_ms, 500);
        assert_eq!(config.recording.video_poll_attempts, 1);
        assert_eq!(config.timeouts.action_ms, 30_000);
        assert_eq!(config.timeouts.wait_for_ms, 30_000);
    }
}
