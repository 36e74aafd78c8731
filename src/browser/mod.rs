pub mod backend;
pub mod canvas;
pub mod chrome;
pub mod mock;
pub mod recorder;
pub mod types;

pub use backend::{Browser, BrowserContext, BrowserLauncher, Page};
pub use canvas::Canvas;
pub use chrome::ChromeLauncher;
pub use mock::{MockDocument, MockElement, MockLauncher, MockSessionLog, MockSite};
pub use recorder::{FrameBuffer, VIDEO_EXTENSION, VIDEO_FILE_NAME};
pub use types::{
    BoundingBox, BrowserError, BrowserResult, ClipRect, ContextOptions, DEFAULT_VIEWPORT,
    LaunchOptions, Viewport,
};
