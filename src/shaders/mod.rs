//! Embedded WGSL shaders
//!
//! All shaders share the same viewport uniform at group 0, binding 0, which
//! converts destination pixels to clip space.

/// Textured mesh content
pub const MESH_SHADER: &str = include_str!("mesh.wgsl");

/// Stencil-only mask geometry and the fullscreen stencil passes
pub const STENCIL_SHADER: &str = include_str!("stencil.wgsl");

/// Selection overlays
pub const OVERLAY_SHADER: &str = include_str!("overlay.wgsl");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_shaders_have_entry_points() {
        assert!(MESH_SHADER.contains("fn vs_main"));
        assert!(MESH_SHADER.contains("fn fs_main"));
        assert!(STENCIL_SHADER.contains("fn vs_polygon"));
        assert!(STENCIL_SHADER.contains("fn vs_fullscreen"));
        assert!(OVERLAY_SHADER.contains("fn vs_main"));
    }

    #[test]
    fn test_viewport_uniform_is_shared() {
        for source in [MESH_SHADER, STENCIL_SHADER, OVERLAY_SHADER] {
            assert!(source.contains("var<uniform> viewport: Viewport"));
        }
    }
}
