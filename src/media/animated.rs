//! Looping animated media (GIF) decoded up front
//!
//! All frames are decoded when the file is opened and played back in a loop
//! using each frame's own delay.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;

use super::{file_display_name, MediaError, MediaFrame, MediaKind, MediaSource};

/// Delays below this are treated as unspecified, matching common viewer behavior.
const MIN_FRAME_DELAY: Duration = Duration::from_millis(20);
const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// A decoded animation frame and how long it stays on screen
struct TimedFrame {
    frame: MediaFrame,
    delay: Duration,
}

/// Animated media that loops forever
pub struct AnimatedMedia {
    path: PathBuf,
    name: String,
    frames: Vec<TimedFrame>,
    current: usize,
    elapsed: Duration,
    needs_upload: bool,
}

impl AnimatedMedia {
    /// Decode every frame of an animated GIF
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MediaError> {
        let path = path.as_ref();
        let decoder = GifDecoder::new(BufReader::new(File::open(path)?))?;
        let frames = decoder
            .into_frames()
            .collect_frames()?
            .into_iter()
            .map(|frame| {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let millis = if denom == 0 { 0 } else { numer / denom };
                let rgb = image::DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
                let (width, height) = rgb.dimensions();
                TimedFrame {
                    frame: MediaFrame::new(rgb.into_raw(), width, height),
                    delay: normalize_delay(Duration::from_millis(millis as u64)),
                }
            })
            .collect();

        Self::from_parts(path.to_path_buf(), frames)
    }

    /// Build from already decoded frames, each paired with its delay
    pub fn from_frames(path: impl Into<PathBuf>, frames: Vec<(MediaFrame, Duration)>) -> Result<Self, MediaError> {
        let frames = frames
            .into_iter()
            .map(|(frame, delay)| TimedFrame {
                frame,
                delay: normalize_delay(delay),
            })
            .collect();
        Self::from_parts(path.into(), frames)
    }

    fn from_parts(path: PathBuf, frames: Vec<TimedFrame>) -> Result<Self, MediaError> {
        if frames.is_empty() {
            return Err(MediaError::Empty(path));
        }

        tracing::debug!(path = %path.display(), frames = frames.len(), "Loaded animated media");

        Ok(Self {
            name: file_display_name(&path),
            path,
            frames,
            current: 0,
            elapsed: Duration::ZERO,
            needs_upload: true,
        })
    }

    /// Index of the frame currently shown
    pub fn frame_index(&self) -> usize {
        self.current
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

fn normalize_delay(delay: Duration) -> Duration {
    if delay.is_zero() {
        DEFAULT_FRAME_DELAY
    } else {
        delay.max(MIN_FRAME_DELAY)
    }
}

impl MediaSource for AnimatedMedia {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn width(&self) -> u32 {
        self.frames[self.current].frame.width
    }

    fn height(&self) -> u32 {
        self.frames[self.current].frame.height
    }

    fn current_frame(&self) -> Option<&MediaFrame> {
        Some(&self.frames[self.current].frame)
    }

    fn needs_upload(&self) -> bool {
        self.needs_upload
    }

    fn mark_uploaded(&mut self) {
        self.needs_upload = false;
    }

    fn request_upload(&mut self) {
        self.needs_upload = true;
    }

    fn advance(&mut self, elapsed: Duration) -> bool {
        if self.frames.len() < 2 {
            return false;
        }

        self.elapsed += elapsed;
        let start = self.current;
        while self.elapsed >= self.frames[self.current].delay {
            self.elapsed -= self.frames[self.current].delay;
            self.current = (self.current + 1) % self.frames.len();
        }

        let changed = self.current != start;
        if changed {
            self.needs_upload = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> AnimatedMedia {
        AnimatedMedia::from_frames(
            "clip.gif",
            vec![
                (MediaFrame::solid(2, 2, [255, 0, 0]), Duration::from_millis(100)),
                (MediaFrame::solid(2, 2, [0, 255, 0]), Duration::from_millis(50)),
                (MediaFrame::solid(2, 2, [0, 0, 255]), Duration::ZERO),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_animated_metadata() {
        let media = clip();
        assert_eq!(media.kind(), MediaKind::Video);
        assert_eq!(media.name(), "clip.gif");
        assert_eq!(media.frame_count(), 3);
        assert_eq!((media.width(), media.height()), (2, 2));
    }

    #[test]
    fn test_advance_honors_delays_and_loops() {
        let mut media = clip();
        media.mark_uploaded();

        assert!(!media.advance(Duration::from_millis(60)));
        assert!(!media.needs_upload());
        assert!(media.advance(Duration::from_millis(40)));
        assert_eq!(media.frame_index(), 1);
        assert!(media.needs_upload());

        // 50ms on frame 1, then frame 2 uses the default 100ms delay
        assert!(media.advance(Duration::from_millis(150)));
        assert_eq!(media.frame_index(), 0);
        assert_eq!(media.current_frame().unwrap().data[0], 255);
    }

    #[test]
    fn test_empty_animation_is_error() {
        assert!(matches!(
            AnimatedMedia::from_frames("empty.gif", Vec::new()),
            Err(MediaError::Empty(_))
        ));
    }
}
