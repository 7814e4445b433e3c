//! Output windows
//!
//! - `display`: monitor enumeration and projector selection
//! - `surface`: a window's wgpu surface plus its depth/stencil target

pub mod display;
pub mod surface;

pub use display::{DisplayInfo, DisplayLayout, DisplayManager};
pub use surface::{OutputError, OutputSurface, ViewRole};
