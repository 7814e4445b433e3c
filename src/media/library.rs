//! Registry of loaded media, keyed by `MediaId`

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use super::{AnimatedMedia, ImageMedia, MediaError, MediaId, MediaSource, PlaceholderMedia};

/// Extensions decoded as still images
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];
/// Extensions decoded as looping animations
const ANIMATED_EXTENSIONS: &[&str] = &["gif"];

/// Owns every media source in the session.
///
/// Layers hold `MediaId`s; the compositor and the App look the sources up
/// here. Advancing is tracked per tick so several callers in the same tick
/// never move playback twice.
#[derive(Default)]
pub struct MediaLibrary {
    sources: HashMap<MediaId, Box<dyn MediaSource>>,
    next_id: u32,
    last_tick: Option<u64>,
}

impl MediaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` has an extension this library can decode
    pub fn is_supported(path: &Path) -> bool {
        let ext = extension(path);
        IMAGE_EXTENSIONS.contains(&ext.as_str()) || ANIMATED_EXTENSIONS.contains(&ext.as_str())
    }

    /// Decode a file and register it
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<MediaId, MediaError> {
        let path = path.as_ref();
        let ext = extension(path);

        let source: Box<dyn MediaSource> = if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Box::new(ImageMedia::open(path)?)
        } else if ANIMATED_EXTENSIONS.contains(&ext.as_str()) {
            Box::new(AnimatedMedia::open(path)?)
        } else {
            return Err(MediaError::UnsupportedFormat(path.to_path_buf()));
        };

        let id = self.insert(source);
        tracing::info!(%id, path = %path.display(), "Opened media");
        Ok(id)
    }

    /// Register an already constructed source
    pub fn insert(&mut self, source: Box<dyn MediaSource>) -> MediaId {
        let id = MediaId(self.next_id);
        self.next_id += 1;
        self.sources.insert(id, source);
        id
    }

    /// Register a fresh placeholder checkerboard
    pub fn placeholder(&mut self) -> MediaId {
        self.insert(Box::new(PlaceholderMedia::new()))
    }

    pub fn get(&self, id: MediaId) -> Option<&dyn MediaSource> {
        self.sources.get(&id).map(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: MediaId) -> Option<&mut (dyn MediaSource + 'static)> {
        self.sources.get_mut(&id).map(|s| s.as_mut())
    }

    pub fn contains(&self, id: MediaId) -> bool {
        self.sources.contains_key(&id)
    }

    pub fn remove(&mut self, id: MediaId) -> Option<Box<dyn MediaSource>> {
        self.sources.remove(&id)
    }

    /// File a source was loaded from
    pub fn path(&self, id: MediaId) -> Option<&Path> {
        self.sources.get(&id).and_then(|s| s.path())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = MediaId> + '_ {
        self.sources.keys().copied()
    }

    /// Advance every source once for `tick`.
    ///
    /// Calling again with the same tick index does nothing. Returns the ids
    /// whose frame changed.
    pub fn advance(&mut self, tick: u64, elapsed: Duration) -> Vec<MediaId> {
        if self.last_tick == Some(tick) {
            return Vec::new();
        }
        self.last_tick = Some(tick);

        let mut changed: Vec<MediaId> = self
            .sources
            .iter_mut()
            .filter_map(|(id, source)| source.advance(elapsed).then_some(*id))
            .collect();
        changed.sort();
        changed
    }

    /// Drop every source not in `used`; returns the removed ids.
    pub fn retain(&mut self, used: &HashSet<MediaId>) -> Vec<MediaId> {
        let removed: Vec<MediaId> = self
            .sources
            .keys()
            .filter(|id| !used.contains(id))
            .copied()
            .collect();
        for id in &removed {
            self.sources.remove(id);
        }
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "Released unused media");
        }
        removed
    }

    /// Ask every source to upload its frame again (e.g. after a device reset)
    pub fn request_upload_all(&mut self) {
        for source in self.sources.values_mut() {
            source.request_upload();
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaFrame, MediaKind};

    fn animated() -> Box<dyn MediaSource> {
        Box::new(
            AnimatedMedia::from_frames(
                "loop.gif",
                vec![
                    (MediaFrame::solid(1, 1, [0, 0, 0]), Duration::from_millis(50)),
                    (MediaFrame::solid(1, 1, [255, 255, 255]), Duration::from_millis(50)),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_ids_are_unique() {
        let mut library = MediaLibrary::new();
        let a = library.placeholder();
        let b = library.placeholder();
        assert_ne!(a, b);
        assert_eq!(library.len(), 2);
        assert_eq!(library.get(a).unwrap().kind(), MediaKind::Placeholder);
    }

    #[test]
    fn test_advance_is_idempotent_per_tick() {
        let mut library = MediaLibrary::new();
        let id = library.insert(animated());

        assert_eq!(library.advance(1, Duration::from_millis(50)), vec![id]);
        // Same tick again: no double advance
        assert!(library.advance(1, Duration::from_millis(50)).is_empty());
        assert_eq!(library.advance(2, Duration::from_millis(50)), vec![id]);
    }

    #[test]
    fn test_unsupported_extension() {
        let mut library = MediaLibrary::new();
        assert!(matches!(
            library.open("/tmp/movie.mp4"),
            Err(MediaError::UnsupportedFormat(_))
        ));
        assert!(!MediaLibrary::is_supported(Path::new("clip.mov")));
        assert!(MediaLibrary::is_supported(Path::new("WALL.PNG")));
    }

    #[test]
    fn test_open_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brick.png");
        image::RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();

        let mut library = MediaLibrary::new();
        let id = library.open(&path).unwrap();
        assert_eq!(library.path(id), Some(path.as_path()));
        assert_eq!(library.get(id).unwrap().kind(), MediaKind::Image);
    }

    #[test]
    fn test_retain_drops_unused() {
        let mut library = MediaLibrary::new();
        let keep = library.placeholder();
        let drop = library.placeholder();

        let used: HashSet<MediaId> = [keep].into_iter().collect();
        assert_eq!(library.retain(&used), vec![drop]);
        assert!(library.contains(keep));
        assert!(!library.contains(drop));
    }
}
