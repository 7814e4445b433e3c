//! Still image media loaded with the `image` crate

use std::path::{Path, PathBuf};

use super::{file_display_name, MediaError, MediaFrame, MediaKind, MediaSource};

/// A decoded still image
pub struct ImageMedia {
    path: PathBuf,
    name: String,
    frame: MediaFrame,
    needs_upload: bool,
}

impl ImageMedia {
    /// Decode an image file into RGB8
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MediaError> {
        let path = path.as_ref();
        let rgb = image::open(path)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(MediaError::Empty(path.to_path_buf()));
        }

        tracing::debug!(path = %path.display(), width, height, "Loaded image media");

        Ok(Self {
            path: path.to_path_buf(),
            name: file_display_name(path),
            frame: MediaFrame::new(rgb.into_raw(), width, height),
            needs_upload: true,
        })
    }
}

impl MediaSource for ImageMedia {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Image
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
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

    #[test]
    fn test_open_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wall.png");
        image::RgbImage::from_pixel(8, 4, image::Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();

        let media = ImageMedia::open(&path).unwrap();
        assert_eq!(media.name(), "wall.png");
        assert_eq!(media.kind(), MediaKind::Image);
        assert_eq!((media.width(), media.height()), (8, 4));
        assert!((media.aspect_ratio() - 2.0).abs() < f32::EPSILON);
        assert!(media.needs_upload());
        let frame = media.current_frame().unwrap();
        assert!(frame.is_valid());
        assert_eq!(&frame.data[..3], &[200, 10, 10]);
    }

    #[test]
    fn test_open_missing_file() {
        assert!(ImageMedia::open("/definitely/not/here.png").is_err());
    }
}
