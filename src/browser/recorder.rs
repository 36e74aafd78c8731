//! Session recording.
//!
//! Frames are collected while a context is open and written as one animated
//! GIF into the recording directory when the context closes. Chromium frames
//! come from the DevTools screencast; the mock browser pushes rendered frames
//! directly.

use base64::Engine;
use chromiumoxide::Page as CdpPage;
use chromiumoxide::cdp::browser_protocol::page::{
    EventScreencastFrame, ScreencastFrameAckParams, StartScreencastFormat, StartScreencastParams,
    StopScreencastParams,
};
use futures::StreamExt;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::{BrowserError, BrowserResult, Viewport};

/// File extension of finalized recordings
pub const VIDEO_EXTENSION: &str = "gif";

/// File name of the recording inside the run directory
pub const VIDEO_FILE_NAME: &str = "recording.gif";

/// Display time of the final frame
const LAST_FRAME_DELAY: Duration = Duration::from_millis(500);

/// Shortest delay GIF viewers honour reliably
const MIN_FRAME_DELAY: Duration = Duration::from_millis(20);

/// Quantizer speed (1 = best quality, 30 = fastest)
const GIF_SPEED: i32 = 20;

/// Frames closer together than this replace the previous frame
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Most frames kept per recording; later frames replace the last one
pub const MAX_FRAMES: usize = 3000;

/// An encoded (JPEG or PNG) frame and when it was taken, relative to
/// recording start
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub offset: Duration,
}

/// Frames collected so far, shared between the producer and the closer.
///
/// Frames stay encoded until the recording is written. A frame arriving
/// within `min_interval` of the last kept one, or once `max_frames` are
/// held, overwrites the last frame instead of adding one.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    started: Instant,
    min_interval: Duration,
    max_frames: usize,
    frames: Arc<Mutex<Vec<VideoFrame>>>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_limits(MIN_FRAME_INTERVAL, MAX_FRAMES)
    }

    pub fn with_limits(min_interval: Duration, max_frames: usize) -> Self {
        Self {
            started: Instant::now(),
            min_interval,
            max_frames: max_frames.max(1),
            frames: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, data: Vec<u8>) {
        let offset = self.started.elapsed();
        let mut frames = self.lock();
        let len = frames.len();
        if let Some(last) = frames.last_mut() {
            let too_soon = offset.saturating_sub(last.offset) < self.min_interval;
            if too_soon || len >= self.max_frames {
                last.data = data;
                return;
            }
        }
        frames.push(VideoFrame { data, offset });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every frame collected so far
    pub fn take(&self) -> Vec<VideoFrame> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<VideoFrame>> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decode and encode the collected frames into `dir/recording.gif` on a
    /// blocking thread. Returns `None` when nothing was captured.
    pub async fn write_to_dir(&self, dir: &Path) -> BrowserResult<Option<PathBuf>> {
        let frames = self.take();
        if frames.is_empty() {
            debug!("No frames captured, skipping recording");
            return Ok(None);
        }
        let path = dir.join(VIDEO_FILE_NAME);
        let out = path.clone();
        tokio::task::spawn_blocking(move || encode_gif(frames, &out))
            .await
            .map_err(BrowserError::protocol)??;
        Ok(Some(path))
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Write frames as a looping animated GIF. Each frame is shown until the
/// next one was captured; frames that fail to decode are skipped.
pub fn encode_gif(frames: Vec<VideoFrame>, path: &Path) -> BrowserResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), GIF_SPEED);
    encoder.set_repeat(Repeat::Infinite)?;

    let offsets: Vec<Duration> = frames.iter().map(|f| f.offset).collect();
    for (idx, frame) in frames.into_iter().enumerate() {
        let image: RgbaImage = match image::load_from_memory(&frame.data) {
            Ok(decoded) => decoded.to_rgba8(),
            Err(e) => {
                debug!("Dropping undecodable frame {}: {}", idx, e);
                continue;
            }
        };
        let shown_for = offsets
            .get(idx + 1)
            .map(|next| next.saturating_sub(frame.offset))
            .unwrap_or(LAST_FRAME_DELAY)
            .max(MIN_FRAME_DELAY);
        let delay = Delay::from_numer_denom_ms(shown_for.as_millis() as u32, 1);
        encoder.encode_frame(Frame::from_parts(image, 0, 0, delay))?;
    }
    Ok(())
}

/// Collects DevTools screencast frames for one page
pub struct ScreencastRecorder {
    page: CdpPage,
    frames: FrameBuffer,
    task: Option<JoinHandle<()>>,
}

impl ScreencastRecorder {
    /// Subscribe to screencast frames and start the screencast
    pub async fn start(page: &CdpPage, size: Viewport) -> BrowserResult<Self> {
        let mut events = page
            .event_listener::<EventScreencastFrame>()
            .await
            .map_err(BrowserError::protocol)?;

        let frames = FrameBuffer::new();
        let sink = frames.clone();
        let ack_page = page.clone();
        let task = tokio::spawn(async move {
            while let Some(frame) = events.next().await {
                if let Err(e) = ack_page
                    .execute(ScreencastFrameAckParams::new(frame.session_id))
                    .await
                {
                    debug!("Screencast ack failed, stopping recorder: {}", e);
                    break;
                }
                match decode_frame(&frame) {
                    Ok(jpeg) => sink.push(jpeg),
                    Err(e) => debug!("Dropping undecodable screencast frame: {}", e),
                }
            }
        });

        page.execute(StartScreencastParams {
            format: Some(StartScreencastFormat::Jpeg),
            quality: Some(70),
            max_width: Some(i64::from(size.width)),
            max_height: Some(i64::from(size.height)),
            every_nth_frame: None,
        })
        .await
        .map_err(BrowserError::protocol)?;

        Ok(Self {
            page: page.clone(),
            frames,
            task: Some(task),
        })
    }

    /// Stop the screencast and write the recording into `dir`
    pub async fn finish(&mut self, dir: &Path) -> BrowserResult<Option<PathBuf>> {
        if let Err(e) = self.page.execute(StopScreencastParams::default()).await {
            warn!("Failed to stop screencast: {}", e);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        debug!("Screencast stopped with {} frames", self.frames.len());
        self.frames.write_to_dir(dir).await
    }
}

impl Drop for ScreencastRecorder {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Base64 payload to JPEG bytes
fn decode_frame(frame: &EventScreencastFrame) -> BrowserResult<Vec<u8>> {
    let data: &str = frame.data.as_ref();
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(BrowserError::protocol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn solid(color: [u8; 4]) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbaImage::from_pixel(8, 8, image::Rgba(color))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_encode_gif_writes_animation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gif");
        let frames = vec![
            VideoFrame {
                data: solid([255, 0, 0, 255]),
                offset: Duration::ZERO,
            },
            VideoFrame {
                data: b"not an image".to_vec(),
                offset: Duration::from_millis(60),
            },
            VideoFrame {
                data: solid([0, 0, 255, 255]),
                offset: Duration::from_millis(120),
            },
        ];

        encode_gif(frames, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..6], b"GIF89a");
    }

    #[test]
    fn test_fast_frames_replace_the_last_one() {
        let buffer = FrameBuffer::with_limits(Duration::from_secs(60), 100);
        for i in 0..500u32 {
            buffer.push(i.to_le_bytes().to_vec());
        }

        let frames = buffer.take();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, 499u32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_frame_count_is_capped() {
        let buffer = FrameBuffer::with_limits(Duration::ZERO, 4);
        for i in 0..50u8 {
            buffer.push(vec![i]);
        }

        let frames = buffer.take();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[3].data, vec![49]);
    }

    #[tokio::test]
    async fn test_empty_buffer_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = FrameBuffer::new();
        assert!(buffer.write_to_dir(dir.path()).await.unwrap().is_none());
        assert!(!dir.path().join(VIDEO_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_buffer_drains_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = FrameBuffer::new();
        buffer.push(solid([0, 255, 0, 255]));
        assert_eq!(buffer.len(), 1);

        let path = buffer.write_to_dir(dir.path()).await.unwrap().unwrap();
        assert!(path.ends_with(VIDEO_FILE_NAME));
        assert!(path.exists());
        assert!(buffer.is_empty());
    }
}
