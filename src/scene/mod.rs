//! Scene model: geometry, meshes, masks and the layer tree

pub mod blend;
pub mod geometry;
pub mod layer;
pub mod mask;
pub mod mesh;
pub mod store;

pub use blend::BlendMode;
pub use geometry::{Bounds, Point2D};
pub use layer::{LayerId, LayerNode};
pub use mask::{MaskPolygon, MaskSet};
pub use mesh::MeshGrid;
pub use store::SceneStore;
