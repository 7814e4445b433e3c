//! Polygon masks for clipping layer content
//!
//! A layer's content is clipped to the union of its mask polygons. Polygons
//! are open point lists that close implicitly when drawn; anything with
//! fewer than 3 points is kept for editing but never clips.

use super::geometry::Point2D;

/// Minimum vertex count for a polygon to rasterize or contain points.
pub const MIN_POLYGON_POINTS: usize = 3;

/// A single mask polygon (vertices in order, implicitly closed)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskPolygon {
    pub points: Vec<Point2D>,
}

impl MaskPolygon {
    pub fn new(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    /// Whether the polygon has enough vertices to cover any area.
    pub fn is_valid(&self) -> bool {
        self.points.len() >= MIN_POLYGON_POINTS
    }

    /// Fan triangulation anchored at the first vertex.
    ///
    /// For concave polygons the triangles overlap outside the shape; the
    /// renderer counts coverage parity in the stencil buffer, which leaves
    /// exactly the polygon interior. Empty for inert polygons.
    pub fn fan_triangles(&self) -> Vec<[Point2D; 3]> {
        if !self.is_valid() {
            return Vec::new();
        }
        let anchor = self.points[0];
        self.points[1..]
            .windows(2)
            .map(|pair| [anchor, pair[0], pair[1]])
            .collect()
    }
}

impl From<Vec<Point2D>> for MaskPolygon {
    fn from(points: Vec<Point2D>) -> Self {
        Self { points }
    }
}

/// Ordered collection of mask polygons for one layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskSet {
    polygons: Vec<MaskPolygon>,
}

impl MaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a polygon; returns its index.
    pub fn append(&mut self, polygon: impl Into<MaskPolygon>) -> usize {
        self.polygons.push(polygon.into());
        self.polygons.len() - 1
    }

    /// Remove every polygon
    pub fn clear(&mut self) {
        self.polygons.clear();
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn polygons(&self) -> &[MaskPolygon] {
        &self.polygons
    }

    pub fn polygon_mut(&mut self, index: usize) -> Option<&mut MaskPolygon> {
        self.polygons.get_mut(index)
    }

    /// Polygons that take part in clipping (3 or more points).
    pub fn valid_polygons(&self) -> impl Iterator<Item = &MaskPolygon> {
        self.polygons.iter().filter(|p| p.is_valid())
    }

    /// Whether any polygon would clip content.
    pub fn has_valid_polygon(&self) -> bool {
        self.polygons.iter().any(MaskPolygon::is_valid)
    }

    /// Move one vertex. Returns `false` if the indices are out of range.
    pub fn set_vertex(&mut self, polygon: usize, vertex: usize, position: Point2D) -> bool {
        match self.polygons.get_mut(polygon).and_then(|p| p.points.get_mut(vertex)) {
            Some(point) => {
                *point = position;
                true
            }
            None => false,
        }
    }

    /// First `(polygon, vertex)` within `radius` of `(x, y)`.
    ///
    /// Polygons are scanned in order, then their vertices in order; the
    /// first match wins regardless of distance. Inert polygons are included
    /// so their vertices stay editable.
    pub fn hit_test_vertex(&self, x: f32, y: f32, radius: f32) -> Option<(usize, usize)> {
        self.polygons.iter().enumerate().find_map(|(pi, polygon)| {
            polygon
                .points
                .iter()
                .position(|p| p.within(x, y, radius))
                .map(|vi| (pi, vi))
        })
    }
}
