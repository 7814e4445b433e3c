//! Mesh Mapper - Main Entry Point
//!
//! Opens the editor window, optionally a fullscreen projector window on a
//! secondary display, and drives the tick loop at the configured frame rate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mesh_mapper::compositor::MeshRenderer;
use mesh_mapper::gpu_context::GpuContext;
use mesh_mapper::media::MediaLibrary;
use mesh_mapper::output::{DisplayManager, OutputSurface, ViewRole};
use mesh_mapper::settings::AppPreferences;
use mesh_mapper::telemetry::{init_logging, LogConfig};
use mesh_mapper::App;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, Modifiers, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "Mesh Mapper";
const PROJECTOR_TITLE: &str = "Mesh Mapper Output";
/// Where Ctrl+S writes when the scene has never been saved
const DEFAULT_PROJECT_FILE: &str = "project.json";

/// Files named on the command line
#[derive(Debug, Default, PartialEq)]
struct StartupArgs {
    project: Option<PathBuf>,
    media: Vec<PathBuf>,
}

impl StartupArgs {
    /// `.json` / `.proj` files are projects (the last one wins), decodable
    /// media is imported, anything else is skipped.
    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut parsed = Self::default();
        for arg in args {
            let path = PathBuf::from(arg);
            if is_project_file(&path) {
                parsed.project = Some(path);
            } else if MediaLibrary::is_supported(&path) {
                parsed.media.push(path);
            } else {
                tracing::warn!("Ignoring unsupported file {}", path.display());
            }
        }
        parsed
    }
}

fn is_project_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("proj"))
}

/// Frame interval for a target rate, in integer nanoseconds
fn frame_duration(target_fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000u64 / target_fps.max(1) as u64)
}

/// GPU state, created once the event loop is running
struct Views {
    gpu: GpuContext,
    renderer: MeshRenderer,
    editor: OutputSurface,
    projector: Option<OutputSurface>,
}

/// Main application handler implementing winit's ApplicationHandler trait
struct MapperApp {
    app: App,
    startup: Option<StartupArgs>,
    views: Option<Views>,
    displays: DisplayManager,
    modifiers: Modifiers,
    cursor: Option<(f32, f32)>,
    last_tick: Instant,
    next_redraw_at: Instant,
}

impl MapperApp {
    fn new(app: App, startup: StartupArgs) -> Self {
        Self {
            app,
            startup: Some(startup),
            views: None,
            displays: DisplayManager::new(),
            modifiers: Modifiers::default(),
            cursor: None,
            last_tick: Instant::now(),
            next_redraw_at: Instant::now(),
        }
    }

    fn create_views(&mut self, event_loop: &ActiveEventLoop) -> Result<Views, Box<dyn std::error::Error>> {
        let (width, height) = self.app.canvas_size();
        let attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(PhysicalSize::new(width, height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let (gpu, surface) = pollster::block_on(GpuContext::new(window.clone()))?;
        tracing::info!("Max texture size: {}", gpu.max_texture_dimension());

        let renderer = MeshRenderer::new(&gpu.device, gpu.surface_format);
        let editor = OutputSurface::with_surface(&gpu, &renderer, window, surface, ViewRole::Editor)?;

        // Layers are placed in the editor's pixel space
        let (width, height) = editor.size();
        self.app.set_canvas_size(width, height);

        Ok(Views {
            gpu,
            renderer,
            editor,
            projector: None,
        })
    }

    /// Load the project and media named on the command line, or the last
    /// opened project.
    fn load_startup_files(&mut self) {
        let Some(startup) = self.startup.take() else {
            return;
        };

        let project = startup.project.or_else(|| self.app.settings.last_opened());
        if let Some(path) = project {
            if let Err(e) = self.app.open_project(&path) {
                tracing::error!("Failed to open project {}: {}", path.display(), e);
            }
        }

        for path in &startup.media {
            if let Err(e) = self.app.import_media(path) {
                tracing::error!("Failed to import {}: {}", path.display(), e);
            }
        }
    }

    /// Open or close the fullscreen projector window
    fn toggle_projector(&mut self, event_loop: &ActiveEventLoop) {
        let Some(views) = self.views.as_mut() else {
            return;
        };
        if views.projector.take().is_some() {
            tracing::info!("Output window closed");
            return;
        }

        self.displays.refresh(event_loop);
        let Some(display) = self.displays.projector() else {
            tracing::warn!("No display for the output window");
            return;
        };
        if self.displays.count() == 1 {
            tracing::info!("Single display; the output window covers the editor (O closes it)");
        }
        let label = display.layout.label();
        tracing::info!("Outputting to {}", label);

        let attributes = WindowAttributes::default()
            .with_title(PROJECTOR_TITLE)
            .with_fullscreen(Some(Fullscreen::Borderless(Some(display.monitor_handle().clone()))));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!("Failed to create output window: {}", e);
                return;
            }
        };

        match OutputSurface::new(&views.gpu, &views.renderer, window, ViewRole::Projector) {
            Ok(surface) => views.projector = Some(surface),
            Err(e) => tracing::error!("Failed to set up output window: {}", e),
        }
    }

    fn save_project(&mut self) {
        let path = self
            .app
            .current_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECT_FILE));
        match self.app.save_project(&path) {
            Ok(()) => tracing::info!("Project saved to {}", path.display()),
            Err(e) => tracing::error!("Failed to save project: {}", e),
        }
    }

    /// A file dropped on the editor: projects replace the scene, media goes
    /// to the selected layer or group, or onto a new layer.
    fn handle_dropped_file(&mut self, path: &Path) {
        let result = if is_project_file(path) {
            if let Err(e) = self.app.open_project(path) {
                tracing::error!("Failed to open project {}: {}", path.display(), e);
            }
            Ok(())
        } else if !MediaLibrary::is_supported(path) {
            tracing::warn!("Ignoring unsupported file {}", path.display());
            Ok(())
        } else if self.app.selection().is_some() {
            self.app.assign_media_to_selection(path).map(|_| ())
        } else {
            self.app.import_media(path).map(|id| self.app.select(id))
        };
        if let Err(e) = result {
            tracing::error!("Failed to load {}: {}", path.display(), e);
        }
        if let Some(views) = &self.views {
            views.editor.request_redraw();
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key_code: KeyCode) {
        let command = self.modifiers.state().control_key() || self.modifiers.state().super_key();
        let shift = self.modifiers.state().shift_key();
        match key_code {
            KeyCode::KeyS if command => self.save_project(),
            KeyCode::KeyS => {
                if self.app.toggle_selected_span().is_none() {
                    tracing::info!("Select a group to span its media");
                }
            }
            KeyCode::KeyK if shift => {
                self.app.clear_selected_masks();
            }
            KeyCode::KeyK => {
                self.app.add_mask_to_selection();
            }
            KeyCode::KeyB => {
                if let Some(mode) = self.app.cycle_selected_blend_mode() {
                    tracing::info!("Blend mode: {}", mode);
                }
            }
            KeyCode::BracketLeft => {
                self.app.step_selected_opacity(-1);
            }
            KeyCode::BracketRight => {
                self.app.step_selected_opacity(1);
            }
            KeyCode::KeyN if command => {
                self.app.new_project();
            }
            KeyCode::KeyN => {
                let id = self.app.add_quad_surface();
                self.app.select(id);
            }
            KeyCode::KeyG => {
                if self.app.group_selected_with_next().is_none() {
                    tracing::info!("Select a root layer followed by another to group");
                }
            }
            KeyCode::Delete | KeyCode::Backspace => {
                self.app.delete_selected();
            }
            KeyCode::KeyH => {
                self.app.toggle_selected_visibility();
            }
            KeyCode::KeyM => {
                self.app.toggle_snapping();
            }
            KeyCode::KeyO => self.toggle_projector(event_loop),
            KeyCode::Equal | KeyCode::NumpadAdd => {
                self.app.adjust_grid_density(1);
            }
            KeyCode::Minus | KeyCode::NumpadSubtract => {
                self.app.adjust_grid_density(-1);
            }
            KeyCode::Escape => {
                tracing::info!("Escape pressed, exiting...");
                event_loop.exit();
            }
            _ => return,
        }
        if let Some(views) = &self.views {
            views.editor.request_redraw();
        }
    }

    fn render(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId) {
        let Some(views) = self.views.as_mut() else {
            return;
        };

        let released = self.app.take_released_media();
        if !released.is_empty() {
            for media in released {
                views.renderer.release_media(media);
            }
            tracing::debug!(textures = views.renderer.texture_count(), "Media textures released");
        }

        let is_editor = views.editor.window_id() == window_id;
        let surface = if is_editor {
            &mut views.editor
        } else {
            match views.projector.as_mut() {
                Some(projector) if projector.window_id() == window_id => projector,
                _ => return,
            }
        };

        let plan = self.app.plan(surface.role().draws_overlays());
        match surface.render(&views.gpu, &mut views.renderer, &plan, self.app.library_mut()) {
            Ok(_) => {
                if is_editor {
                    self.app.end_frame();
                }
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("Surface reconfigured");
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                tracing::error!("Out of GPU memory, exiting");
                event_loop.exit();
            }
            Err(e) => tracing::warn!("Frame skipped: {}", e),
        }
    }
}

impl ApplicationHandler for MapperApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.views.is_some() {
            return;
        }
        tracing::info!("Creating window...");

        match self.create_views(event_loop) {
            Ok(views) => self.views = Some(views),
            Err(e) => {
                tracing::error!("Failed to initialize graphics: {}", e);
                event_loop.exit();
                return;
            }
        }
        self.load_startup_files();
        self.last_tick = Instant::now();
        self.next_redraw_at = Instant::now();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(views) = self.views.as_mut() else {
            return;
        };
        let is_editor = views.editor.window_id() == window_id;

        match event {
            WindowEvent::CloseRequested if is_editor => {
                tracing::info!("Close requested, exiting...");
                event_loop.exit();
            }
            WindowEvent::CloseRequested => {
                views.projector = None;
                tracing::info!("Output window closed");
            }
            WindowEvent::Resized(size) => {
                if is_editor {
                    views.editor.resize(&views.gpu, size.width, size.height);
                    self.app.set_canvas_size(size.width, size.height);
                } else if let Some(projector) = views.projector.as_mut() {
                    projector.resize(&views.gpu, size.width, size.height);
                }
            }
            WindowEvent::ModifiersChanged(new_modifiers) => {
                self.modifiers = new_modifiers;
            }
            WindowEvent::CursorMoved { position, .. } if is_editor => {
                let (x, y) = (position.x as f32, position.y as f32);
                self.cursor = Some((x, y));
                if self.app.pointer_moved(x, y) {
                    views.editor.request_redraw();
                }
            }
            WindowEvent::CursorLeft { .. } if is_editor => {
                self.cursor = None;
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } if is_editor => {
                match (state, self.cursor) {
                    (ElementState::Pressed, Some((x, y))) => {
                        let outcome = self.app.pointer_pressed(x, y);
                        tracing::trace!(?outcome, "Pointer pressed");
                    }
                    (ElementState::Released, _) => self.app.pointer_released(),
                    _ => {}
                }
                views.editor.request_redraw();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, key_code),
            WindowEvent::DroppedFile(path) if is_editor => self.handle_dropped_file(&path),
            WindowEvent::RedrawRequested => self.render(event_loop, window_id),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(views) = self.views.as_ref() else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        let frame_duration = frame_duration(self.app.target_fps());
        let now = Instant::now();
        if now < self.next_redraw_at {
            event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_redraw_at));
            return;
        }

        // One media advance per tick, shared by every view
        let elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;
        self.app.tick(elapsed);

        views.editor.request_redraw();
        if let Some(projector) = &views.projector {
            projector.request_redraw();
        }

        self.next_redraw_at += frame_duration;
        // Reset if more than 2 frames behind
        if now > self.next_redraw_at + frame_duration * 2 {
            self.next_redraw_at = now + frame_duration;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_redraw_at));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Err(e) = self.app.settings.save() {
            tracing::warn!("Failed to save preferences: {}", e);
        }
        tracing::info!(
            frames = self.app.frame_count(),
            fps = self.app.fps(),
            frame_time_ms = self.app.frame_time_ms(),
            "Shutting down"
        );
    }
}

fn main() {
    let log_config = LogConfig::default();
    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Mesh Mapper v{}", env!("CARGO_PKG_VERSION"));

    let preferences = AppPreferences::load();
    tracing::info!("Target FPS: {}", preferences.target_fps);

    let startup = StartupArgs::parse(std::env::args().skip(1));
    let app = App::new(preferences);

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            tracing::error!("Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };
    // Default to sleeping; redraws are scheduled in `about_to_wait`.
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut handler = MapperApp::new(app, startup);
    if let Err(e) = event_loop.run_app(&mut handler) {
        tracing::error!("Event loop error: {}", e);
        std::process::exit(1);
    }
}
