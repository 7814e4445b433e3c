//! Display enumeration
//!
//! Lists connected monitors and picks the one a projector window should
//! cover.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use winit::event_loop::ActiveEventLoop;
use winit::monitor::MonitorHandle;

/// Placement of a display in the virtual desktop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLayout {
    /// Stable identifier derived from name, position and size
    pub id: u32,
    pub name: String,
    /// Top-left corner in the virtual desktop
    pub position: (i32, i32),
    /// Physical resolution in pixels
    pub size: (u32, u32),
    pub is_primary: bool,
}

impl DisplayLayout {
    /// Label for logs, including the resolution
    pub fn label(&self) -> String {
        format!("{} ({}x{})", self.name, self.size.0, self.size.1)
    }
}

/// A connected display
#[derive(Debug, Clone)]
pub struct DisplayInfo {
    pub layout: DisplayLayout,
    monitor_handle: MonitorHandle,
}

impl DisplayInfo {
    fn from_monitor(monitor: &MonitorHandle, is_primary: bool) -> Self {
        let pos = monitor.position();
        let size = monitor.size();
        Self {
            layout: DisplayLayout {
                id: display_id_from_monitor(monitor),
                name: monitor.name().unwrap_or_else(|| "Unknown Display".to_string()),
                position: (pos.x, pos.y),
                size: (size.width, size.height),
                is_primary,
            },
            monitor_handle: monitor.clone(),
        }
    }

    /// Get the underlying MonitorHandle for window creation
    pub fn monitor_handle(&self) -> &MonitorHandle {
        &self.monitor_handle
    }
}

/// Generate a stable display ID from a MonitorHandle
fn display_id_from_monitor(monitor: &MonitorHandle) -> u32 {
    let mut hasher = DefaultHasher::new();
    if let Some(name) = monitor.name() {
        name.hash(&mut hasher);
    }
    let pos = monitor.position();
    pos.x.hash(&mut hasher);
    pos.y.hash(&mut hasher);
    let size = monitor.size();
    size.width.hash(&mut hasher);
    size.height.hash(&mut hasher);
    hasher.finish() as u32
}

/// Index of the display a projector window should use: the left-most
/// non-primary display, else the first display. `None` only when nothing is
/// connected.
pub fn projector_index(layouts: &[DisplayLayout]) -> Option<usize> {
    let secondary = layouts
        .iter()
        .enumerate()
        .filter(|(_, d)| !d.is_primary)
        .min_by(|(_, a), (_, b)| {
            a.position
                .0
                .cmp(&b.position.0)
                .then_with(|| a.position.1.cmp(&b.position.1))
        })
        .map(|(index, _)| index);
    secondary.or_else(|| (!layouts.is_empty()).then_some(0))
}

/// Connected displays, refreshed from the event loop
#[derive(Debug, Default)]
pub struct DisplayManager {
    displays: Vec<DisplayInfo>,
}

impl DisplayManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read the monitor list
    pub fn refresh(&mut self, event_loop: &ActiveEventLoop) {
        let primary_id = event_loop.primary_monitor().as_ref().map(display_id_from_monitor);
        self.displays = event_loop
            .available_monitors()
            .map(|monitor| {
                let is_primary = primary_id == Some(display_id_from_monitor(&monitor));
                DisplayInfo::from_monitor(&monitor, is_primary)
            })
            .collect();
        tracing::debug!(count = self.displays.len(), "Displays refreshed");
    }

    pub fn displays(&self) -> &[DisplayInfo] {
        &self.displays
    }

    pub fn count(&self) -> usize {
        self.displays.len()
    }

    /// The display a projector window should cover, if any
    pub fn projector(&self) -> Option<&DisplayInfo> {
        let layouts: Vec<DisplayLayout> = self.displays.iter().map(|d| d.layout.clone()).collect();
        projector_index(&layouts).and_then(|index| self.displays.get(index))
    }
}
