//! Media sources
//!
//! A `MediaSource` is anything that can hand the compositor a current frame
//! of RGB pixels plus an "upload needed" flag. Layers refer to sources by
//! `MediaId`; the sources themselves live in the `MediaLibrary`.

pub mod animated;
pub mod frame;
pub mod library;
pub mod placeholder;
pub mod still;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use animated::AnimatedMedia;
pub use frame::MediaFrame;
pub use library::MediaLibrary;
pub use placeholder::PlaceholderMedia;
pub use still::ImageMedia;

/// Handle to a source registered in a `MediaLibrary`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaId(pub u32);

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "media#{}", self.0)
    }
}

/// What kind of content a source produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
    Placeholder,
}

/// Provider of frames for the compositor.
///
/// The compositor uploads `current_frame()` whenever `needs_upload()` is set
/// and then calls `mark_uploaded()`. `advance` is called once per tick by
/// the media driver, never by the compositor.
pub trait MediaSource {
    /// Display name (usually the file name)
    fn name(&self) -> &str;

    fn kind(&self) -> MediaKind;

    /// File this source was loaded from, if any
    fn path(&self) -> Option<&Path>;

    /// Native width in pixels
    fn width(&self) -> u32;

    /// Native height in pixels
    fn height(&self) -> u32;

    /// The frame to display, tightly packed RGB8
    fn current_frame(&self) -> Option<&MediaFrame>;

    /// Whether the current frame has not been uploaded yet
    fn needs_upload(&self) -> bool;

    /// Clear the upload flag after the frame reached the GPU
    fn mark_uploaded(&mut self);

    /// Force the next render to upload the current frame again
    fn request_upload(&mut self);

    /// Move playback forward; returns `true` if the frame changed.
    fn advance(&mut self, elapsed: Duration) -> bool {
        let _ = elapsed;
        false
    }

    /// Width / height, or 1.0 for sources without a height
    fn aspect_ratio(&self) -> f32 {
        if self.height() > 0 {
            self.width() as f32 / self.height() as f32
        } else {
            1.0
        }
    }
}

/// Media-related errors
#[derive(Debug)]
pub enum MediaError {
    Io(std::io::Error),
    Decode(image::ImageError),
    UnsupportedFormat(PathBuf),
    Empty(PathBuf),
}

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaError::Io(e) => write!(f, "IO error: {}", e),
            MediaError::Decode(e) => write!(f, "Decode error: {}", e),
            MediaError::UnsupportedFormat(p) => write!(f, "Unsupported media format: {}", p.display()),
            MediaError::Empty(p) => write!(f, "Media has no frames: {}", p.display()),
        }
    }
}

impl std::error::Error for MediaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MediaError::Io(e) => Some(e),
            MediaError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MediaError {
    fn from(e: std::io::Error) -> Self {
        MediaError::Io(e)
    }
}

impl From<image::ImageError> for MediaError {
    fn from(e: image::ImageError) -> Self {
        MediaError::Decode(e)
    }
}

/// File name of `path` for display, falling back to the full path.
pub(crate) fn file_display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
