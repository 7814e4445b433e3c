//! Application preferences
//!
//! Stored as XML in the user's config directory. Missing or unreadable
//! files fall back to defaults; values are clamped into usable ranges after
//! every load.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};

use crate::interaction::{DEFAULT_HANDLE_RADIUS, DEFAULT_SNAP_THRESHOLD};

fn default_canvas_width() -> u32 {
    1280
}

fn default_canvas_height() -> u32 {
    800
}

fn default_target_fps() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

fn default_snap_threshold() -> f32 {
    DEFAULT_SNAP_THRESHOLD
}

fn default_handle_radius() -> f32 {
    DEFAULT_HANDLE_RADIUS
}

/// Application preferences (stored in config directory)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "MeshMapperPreferences")]
pub struct AppPreferences {
    /// Editor window width in pixels
    #[serde(rename = "canvasWidth", default = "default_canvas_width")]
    pub canvas_width: u32,

    /// Editor window height in pixels
    #[serde(rename = "canvasHeight", default = "default_canvas_height")]
    pub canvas_height: u32,

    /// Frame pacing target
    #[serde(rename = "targetFps", default = "default_target_fps")]
    pub target_fps: u32,

    #[serde(rename = "snappingEnabled", default = "default_true")]
    pub snapping_enabled: bool,

    /// Snap distance in pixels
    #[serde(rename = "snapThreshold", default = "default_snap_threshold")]
    pub snap_threshold: f32,

    /// Handle pick radius in pixels
    #[serde(rename = "handleRadius", default = "default_handle_radius")]
    pub handle_radius: f32,

    /// Path to the last opened project
    #[serde(rename = "lastOpenedProject", default, skip_serializing_if = "Option::is_none")]
    pub last_opened_project: Option<String>,
}

impl Default for AppPreferences {
    fn default() -> Self {
        Self {
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
            target_fps: default_target_fps(),
            snapping_enabled: true,
            snap_threshold: DEFAULT_SNAP_THRESHOLD,
            handle_radius: DEFAULT_HANDLE_RADIUS,
            last_opened_project: None,
        }
    }
}

impl AppPreferences {
    /// Get the preferences file path
    pub fn prefs_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("MeshMapper");
            p.push("preferences.xml");
            p
        })
    }

    /// Keep values in usable ranges
    pub fn clamp(&mut self) {
        self.target_fps = self.target_fps.clamp(24, 240);
        self.canvas_width = self.canvas_width.clamp(320, 16384);
        self.canvas_height = self.canvas_height.clamp(240, 16384);
        self.snap_threshold = if self.snap_threshold.is_finite() {
            self.snap_threshold.clamp(1.0, 200.0)
        } else {
            DEFAULT_SNAP_THRESHOLD
        };
        self.handle_radius = if self.handle_radius.is_finite() {
            self.handle_radius.clamp(2.0, 100.0)
        } else {
            DEFAULT_HANDLE_RADIUS
        };
    }

    /// Load preferences from config directory, or defaults
    pub fn load() -> Self {
        let Some(path) = Self::prefs_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!("Ignoring unreadable preferences {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load preferences from a specific file
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        let mut prefs: Self = from_str(&contents).map_err(SettingsError::XmlParse)?;
        prefs.clamp();
        Ok(prefs)
    }

    /// Save preferences to config directory
    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = Self::prefs_path() else {
            return Err(SettingsError::NoConfigDir);
        };
        self.save_to(&path)
    }

    /// Save preferences to a specific file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::Io)?;
        }

        let xml = to_string(self).map_err(SettingsError::XmlWrite)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);

        fs::write(path, formatted).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Remember the last opened project
    pub fn set_last_opened(&mut self, path: &Path) {
        self.last_opened_project = Some(path.to_string_lossy().to_string());
    }

    /// Get the last opened project if it still exists
    pub fn last_opened(&self) -> Option<PathBuf> {
        self.last_opened_project
            .as_ref()
            .map(PathBuf::from)
            .filter(|p| p.exists())
    }
}

/// Settings-related errors
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    XmlParse(quick_xml::DeError),
    XmlWrite(quick_xml::SeError),
    NoConfigDir,
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::XmlParse(e) => write!(f, "XML parse error: {}", e),
            SettingsError::XmlWrite(e) => write!(f, "XML write error: {}", e),
            SettingsError::NoConfigDir => write!(f, "Could not find config directory"),
        }
    }
}

impl std::error::Error for SettingsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preferences() {
        let prefs = AppPreferences::default();
        assert_eq!((prefs.canvas_width, prefs.canvas_height), (1280, 800));
        assert_eq!(prefs.target_fps, 60);
        assert!(prefs.snapping_enabled);
        assert_eq!(prefs.snap_threshold, 15.0);
        assert_eq!(prefs.handle_radius, 10.0);
        assert!(prefs.last_opened_project.is_none());
    }

    #[test]
    fn test_clamping() {
        let mut prefs = AppPreferences {
            target_fps: 1000,
            snap_threshold: f32::NAN,
            handle_radius: 0.0,
            ..Default::default()
        };
        prefs.clamp();
        assert_eq!(prefs.target_fps, 240);
        assert_eq!(prefs.snap_threshold, DEFAULT_SNAP_THRESHOLD);
        assert_eq!(prefs.handle_radius, 2.0);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.xml");

        let mut prefs = AppPreferences {
            snapping_enabled: false,
            snap_threshold: 25.0,
            ..Default::default()
        };
        prefs.set_last_opened(Path::new("/shows/opening.json"));
        prefs.save_to(&path).unwrap();

        let loaded = AppPreferences::load_from(&path).unwrap();
        assert_eq!(loaded, prefs);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.xml");
        std::fs::write(&path, "<MeshMapperPreferences><targetFps>fast").unwrap();
        assert!(AppPreferences::load_from(&path).is_err());
    }
}
