//! Blend mode definitions and utilities
//!
//! Defines the available blend modes for layer compositing and provides
//! conversion to wgpu BlendState for GPU rendering.

use serde::{Deserialize, Serialize};

/// Blend modes for layer compositing.
///
/// These modes determine how a layer's pixels are combined with the
/// pixels already in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Standard alpha blending
    /// Result = Source × SourceAlpha + Dest × (1 - SourceAlpha)
    #[default]
    Normal,

    /// Additive blending
    /// Result = Source × SourceAlpha + Dest
    Add,

    /// Multiply blending
    /// Result = Source × Dest
    Multiply,

    /// Screen blending
    /// Result = Source + Dest × (1 - Source)
    Screen,
}

impl BlendMode {
    /// Convert blend mode to wgpu BlendState for GPU rendering.
    pub fn to_blend_state(self) -> wgpu::BlendState {
        match self {
            BlendMode::Normal => wgpu::BlendState::ALPHA_BLENDING,

            BlendMode::Add => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },

            BlendMode::Multiply => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Dst,
                    dst_factor: wgpu::BlendFactor::Zero,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Dst,
                    dst_factor: wgpu::BlendFactor::Zero,
                    operation: wgpu::BlendOperation::Add,
                },
            },

            BlendMode::Screen => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::OneMinusSrc,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::OneMinusSrc,
                    operation: wgpu::BlendOperation::Add,
                },
            },
        }
    }

    /// Name used in project files and logs
    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Add => "Add",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
        }
    }

    /// Parse a blend mode name, falling back to `Normal` for unknown names.
    pub fn from_name(name: &str) -> Self {
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.name().eq_ignore_ascii_case(name))
            .unwrap_or_default()
    }

    /// Get all available blend modes
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Add,
            BlendMode::Multiply,
            BlendMode::Screen,
        ]
    }

    /// Next mode in `all()` order, wrapping around
    pub fn next(self) -> Self {
        let all = Self::all();
        let index = all.iter().position(|m| *m == self).unwrap_or(0);
        all[(index + 1) % all.len()]
    }
}

impl std::fmt::Display for BlendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_mode_default() {
        assert_eq!(BlendMode::default(), BlendMode::Normal);
    }

    #[test]
    fn test_blend_mode_names() {
        for mode in BlendMode::all() {
            assert_eq!(BlendMode::from_name(mode.name()), *mode);
        }
        assert_eq!(BlendMode::from_name("screen"), BlendMode::Screen);
        assert_eq!(BlendMode::from_name("Overlay"), BlendMode::Normal);
        assert_eq!(format!("{}", BlendMode::Add), "Add");
    }

    #[test]
    fn test_blend_mode_serde_names() {
        assert_eq!(serde_json::to_string(&BlendMode::Multiply).unwrap(), "\"Multiply\"");
        let mode: BlendMode = serde_json::from_str("\"Add\"").unwrap();
        assert_eq!(mode, BlendMode::Add);
    }

    #[test]
    fn test_blend_table() {
        use wgpu::BlendFactor as F;
        let factors = |mode: BlendMode| {
            let state = mode.to_blend_state();
            (state.color.src_factor, state.color.dst_factor)
        };
        assert_eq!(factors(BlendMode::Normal), (F::SrcAlpha, F::OneMinusSrcAlpha));
        assert_eq!(factors(BlendMode::Add), (F::SrcAlpha, F::One));
        assert_eq!(factors(BlendMode::Multiply), (F::Dst, F::Zero));
        assert_eq!(factors(BlendMode::Screen), (F::One, F::OneMinusSrc));
    }

    #[test]
    fn test_blend_mode_cycle() {
        assert_eq!(BlendMode::Normal.next(), BlendMode::Add);
        assert_eq!(BlendMode::Screen.next(), BlendMode::Normal);
    }
}
