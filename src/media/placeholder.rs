//! Placeholder surface media
//!
//! Layers created without media show a grey checkerboard with grid lines and
//! a diagonal cross, so the surface stays visible while it is being mapped.

use std::path::Path;

use super::{MediaFrame, MediaKind, MediaSource};

pub const PLACEHOLDER_SIZE: u32 = 512;
const CELL_SIZE: u32 = 64;
const DARK: [u8; 3] = [40, 40, 40];
const LIGHT: [u8; 3] = [80, 80, 80];
const LINE: [u8; 3] = [100, 100, 100];

/// Generated checkerboard media
pub struct PlaceholderMedia {
    frame: MediaFrame,
    needs_upload: bool,
}

impl Default for PlaceholderMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderMedia {
    pub fn new() -> Self {
        Self {
            frame: Self::render(PLACEHOLDER_SIZE),
            needs_upload: true,
        }
    }

    fn render(size: u32) -> MediaFrame {
        let mut frame = MediaFrame::solid(size, size, DARK);
        let stride = frame.stride();
        let last = size - 1;

        for y in 0..size {
            for x in 0..size {
                let checker = ((x / CELL_SIZE) + (y / CELL_SIZE)) % 2 == 1;
                let grid_line = x % CELL_SIZE == 0 || y % CELL_SIZE == 0;
                // Two-pixel diagonals
                let diagonal = x.abs_diff(y) <= 1 || x.abs_diff(last - y) <= 1;

                let color = if grid_line || diagonal {
                    LINE
                } else if checker {
                    LIGHT
                } else {
                    DARK
                };
                let offset = y as usize * stride + x as usize * MediaFrame::BYTES_PER_PIXEL;
                frame.data[offset..offset + 3].copy_from_slice(&color);
            }
        }
        frame
    }
}

impl MediaSource for PlaceholderMedia {
    fn name(&self) -> &str {
        "Empty Surface"
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Placeholder
    }

    fn path(&self) -> Option<&Path> {
        None
    }

    fn width(&self) -> u32 {
        self.frame.width
    }

    fn height(&self) -> u32 {
        self.frame.height
    }

    fn current_frame(&self) -> Option<&MediaFrame> {
        Some(&self.frame)
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(frame: &MediaFrame, x: u32, y: u32) -> [u8; 3] {
        let offset = y as usize * frame.stride() + x as usize * 3;
        [frame.data[offset], frame.data[offset + 1], frame.data[offset + 2]]
    }

    #[test]
    fn test_placeholder_frame() {
        let media = PlaceholderMedia::new();
        assert_eq!(media.kind(), MediaKind::Placeholder);
        assert_eq!((media.width(), media.height()), (512, 512));
        assert!(media.needs_upload());

        let frame = media.current_frame().unwrap();
        assert!(frame.is_valid());
        assert_eq!(pixel(frame, 0, 0), LINE);
        assert_eq!(pixel(frame, 10, 30), DARK);
        assert_eq!(pixel(frame, 70, 30), LIGHT);
        assert_eq!(pixel(frame, 200, 200), LINE);
    }

    #[test]
    fn test_upload_flag() {
        let mut media = PlaceholderMedia::new();
        media.mark_uploaded();
        assert!(!media.needs_upload());
        media.request_upload();
        assert!(media.needs_upload());
    }
}
