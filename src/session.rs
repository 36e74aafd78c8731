//! Recording directories for test runs.
//!
//! Each run owns one directory under the recordings base, named after the
//! test and the run's start time:
//! - `{test_name}_{timestamp}` with `:` and `.` replaced by `-`
//! - a `.session.json` metadata file
//! - `{name}.png` screenshots, names kept verbatim, and the finalized recording

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::browser::Viewport;

/// Name of the metadata file written into every recording directory
pub const METADATA_FILE: &str = ".session.json";

/// The recording directory of one run
#[derive(Debug, Clone)]
pub struct RecordingSession {
    /// Directory name, unique per run
    pub id: String,
    /// Test name as given by the caller
    pub test_name: String,
    /// Root directory for this run
    pub dir: PathBuf,
    pub viewport: Viewport,
}

/// Contents of `.session.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: String,
    pub test_name: String,
    pub created: String,
    pub hostname: Option<String>,
    pub viewport: Viewport,
}

impl RecordingSession {
    /// Session under `base` for a run of `test_name` starting now
    pub fn new(base: impl AsRef<Path>, test_name: &str, viewport: Viewport) -> Self {
        let id = format!("{}_{}", sanitize_name(test_name), timestamp_suffix());
        let dir = base.as_ref().join(&id);
        Self {
            id,
            test_name: test_name.to_string(),
            dir,
            viewport,
        }
    }

    /// Create the directory (and the base) and write the metadata file
    pub fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let metadata = SessionMetadata {
            id: self.id.clone(),
            test_name: self.test_name.clone(),
            created: Utc::now().to_rfc3339(),
            hostname: hostname::get()
                .ok()
                .map(|h| h.to_string_lossy().into_owned()),
            viewport: self.viewport,
        };
        let metadata_path = self.dir.join(METADATA_FILE);
        fs::write(metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        Ok(())
    }

    /// Path of the screenshot called `name`, kept verbatim. `None` when the
    /// name would leave the session directory.
    pub fn screenshot_path(&self, name: &str) -> Option<PathBuf> {
        let escapes = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\']);
        if escapes {
            return None;
        }
        Some(self.dir.join(format!("{}.png", name)))
    }

    /// All PNG files in the session, sorted
    pub fn list_captures(&self) -> std::io::Result<Vec<PathBuf>> {
        list_with_extension(&self.dir, "png")
    }

    /// First file ending in `.{extension}`, in name order. A missing or
    /// empty directory yields `None`.
    pub fn find_video(&self, extension: &str) -> Option<PathBuf> {
        list_with_extension(&self.dir, extension)
            .ok()
            .and_then(|files| files.into_iter().next())
    }

    pub fn read_metadata(&self) -> std::io::Result<SessionMetadata> {
        let raw = fs::read_to_string(self.dir.join(METADATA_FILE))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn list_with_extension(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if dir.exists() {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map(|e| e == extension).unwrap_or(false) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// ISO-8601 timestamp safe for use in a path on every platform
fn timestamp_suffix() -> String {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// Sanitize a name for use in filenames
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// List all recording directories under `base`
pub fn list_sessions(base: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let base = base.as_ref();
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in fs::read_dir(base)? {
        let path = entry?.path();
        if path.is_dir() {
            sessions.push(path);
        }
    }
    sessions.sort();
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_dir_name() {
        let session = RecordingSession::new("/tmp/rec", "login flow", Viewport::default());
        assert!(session.id.starts_with("login_flow_"));
        assert!(session.dir.starts_with("/tmp/rec"));

        let stamp = session.id.trim_start_matches("login_flow_");
        assert!(!stamp.contains(':'));
        assert!(!stamp.contains('.'));
        assert!(stamp.ends_with('Z'));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("hello world"), "hello_world");
        assert_eq!(sanitize_name("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_name("ok-name_1"), "ok-name_1");
    }

    #[test]
    fn test_screenshot_names_are_kept_verbatim() {
        let session = RecordingSession::new("/tmp/rec", "shots", Viewport::default());

        let spaced = session.screenshot_path("home page").unwrap();
        let underscored = session.screenshot_path("home_page").unwrap();
        assert_ne!(spaced, underscored);
        assert_eq!(spaced, session.dir.join("home page.png"));
        assert_eq!(
            session.screenshot_path("..hidden").unwrap(),
            session.dir.join("..hidden.png")
        );
    }

    #[test]
    fn test_screenshot_names_outside_session_rejected() {
        let session = RecordingSession::new("/tmp/rec", "shots", Viewport::default());
        for name in ["", ".", "..", "../escape", "a/b", "a\\b"] {
            assert!(session.screenshot_path(name).is_none(), "{:?}", name);
        }
    }

    #[test]
    fn test_init_writes_metadata() {
        let base = tempfile::tempdir().unwrap();
        let session = RecordingSession::new(base.path(), "smoke", Viewport::new(800, 600));
        session.init().unwrap();

        let metadata = session.read_metadata().unwrap();
        assert_eq!(metadata.test_name, "smoke");
        assert_eq!(metadata.id, session.id);
        assert_eq!(metadata.viewport, Viewport::new(800, 600));
    }

    #[test]
    fn test_find_video_and_captures() {
        let base = tempfile::tempdir().unwrap();
        let session = RecordingSession::new(base.path(), "media", Viewport::default());
        assert!(session.find_video("gif").is_none());

        session.init().unwrap();
        assert!(session.find_video("gif").is_none());

        fs::write(session.dir.join("b.gif"), b"x").unwrap();
        fs::write(session.dir.join("a.gif"), b"x").unwrap();
        fs::write(session.screenshot_path("home").unwrap(), b"x").unwrap();

        assert!(session.find_video("gif").unwrap().ends_with("a.gif"));
        let captures = session.list_captures().unwrap();
        assert_eq!(captures.len(), 1);
        assert!(captures[0].ends_with("home.png"));
    }

    #[test]
    fn test_list_sessions() {
        let base = tempfile::tempdir().unwrap();
        assert!(list_sessions(base.path().join("missing")).unwrap().is_empty());

        RecordingSession::new(base.path(), "one", Viewport::default())
            .init()
            .unwrap();
        fs::write(base.path().join("stray.txt"), b"x").unwrap();

        let sessions = list_sessions(base.path()).unwrap();
        assert_eq!(sessions.len(), 1);
    }
}
