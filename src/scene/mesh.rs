//! Deformable grid mesh for surface warping
//!
//! A `MeshGrid` holds `rows × cols` control points in destination pixel
//! space. Each grid cell is drawn as a quad whose texture coordinates come
//! from the cell's grid position, so moving control points warps the media.

use super::geometry::{Bounds, Point2D};

/// Height in pixels of the rectangle a new layer is placed into.
pub const DEFAULT_SURFACE_HEIGHT: f32 = 400.0;

/// Grid of control points, stored row-major: index = row * cols + col
#[derive(Debug, Clone, PartialEq)]
pub struct MeshGrid {
    rows: usize,
    cols: usize,
    points: Vec<Point2D>,
}

impl Default for MeshGrid {
    fn default() -> Self {
        Self::from_corners([
            Point2D::new(100.0, 100.0),
            Point2D::new(500.0, 100.0),
            Point2D::new(500.0, 400.0),
            Point2D::new(100.0, 400.0),
        ])
    }
}

impl MeshGrid {
    /// Create a grid spanning the unit square. Sizes below 2 are raised to 2.
    pub fn new(rows: usize, cols: usize) -> Self {
        let rows = rows.max(2);
        let cols = cols.max(2);
        let mut points = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                points.push(Point2D::new(
                    c as f32 / (cols - 1) as f32,
                    r as f32 / (rows - 1) as f32,
                ));
            }
        }
        Self { rows, cols, points }
    }

    /// Create a 2×2 grid from four corners given clockwise from top-left.
    pub fn from_corners([tl, tr, br, bl]: [Point2D; 4]) -> Self {
        Self {
            rows: 2,
            cols: 2,
            points: vec![tl, tr, bl, br],
        }
    }

    /// Build a grid from nested rows. Returns `None` unless the rows form a
    /// rectangle of at least 2×2.
    pub fn from_rows(rows: Vec<Vec<Point2D>>) -> Option<Self> {
        let row_count = rows.len();
        let col_count = rows.first().map(Vec::len)?;
        if row_count < 2 || col_count < 2 || rows.iter().any(|r| r.len() != col_count) {
            return None;
        }
        Some(Self {
            rows: row_count,
            cols: col_count,
            points: rows.into_iter().flatten().collect(),
        })
    }

    /// A 2×2 grid forming a rectangle `DEFAULT_SURFACE_HEIGHT` tall, centered
    /// on a canvas of `canvas_width × canvas_height`, with its width derived
    /// from `aspect` (width / height) and truncated to whole pixels.
    pub fn centered(canvas_width: f32, canvas_height: f32, aspect: f32) -> Self {
        let height = DEFAULT_SURFACE_HEIGHT;
        let width = (height * aspect).trunc();
        let x = (canvas_width - width) / 2.0;
        let y = (canvas_height - height) / 2.0;
        Self::from_corners([
            Point2D::new(x, y),
            Point2D::new(x + width, y),
            Point2D::new(x + width, y + height),
            Point2D::new(x, y + height),
        ])
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// All points in row-major order
    pub fn points(&self) -> &[Point2D] {
        &self.points
    }

    /// Get a point by grid coordinates
    pub fn point(&self, row: usize, col: usize) -> Option<Point2D> {
        if row < self.rows && col < self.cols {
            Some(self.points[row * self.cols + col])
        } else {
            None
        }
    }

    /// Move a point. Out-of-range coordinates are ignored; returns whether
    /// a point was written.
    pub fn set_point(&mut self, row: usize, col: usize, position: Point2D) -> bool {
        if row < self.rows && col < self.cols {
            self.points[row * self.cols + col] = position;
            true
        } else {
            false
        }
    }

    /// The four corner points, clockwise from top-left.
    pub fn corners(&self) -> [Point2D; 4] {
        let last_row = self.rows - 1;
        let last_col = self.cols - 1;
        [
            self.points[0],
            self.points[last_col],
            self.points[last_row * self.cols + last_col],
            self.points[last_row * self.cols],
        ]
    }

    /// Points as nested rows, the layout used by the project file.
    pub fn to_rows(&self) -> Vec<Vec<Point2D>> {
        self.points.chunks(self.cols).map(<[Point2D]>::to_vec).collect()
    }

    /// Resample the grid to a new shape with bilinear interpolation.
    ///
    /// Does nothing if either dimension is below 2 or the shape is
    /// unchanged. Sampling is corner-aligned: new index `i` reads old
    /// coordinate `i * (old - 1) / (new - 1)`, so corners stay exact.
    pub fn resize(&mut self, new_rows: usize, new_cols: usize) {
        if new_rows < 2 || new_cols < 2 {
            return;
        }
        if new_rows == self.rows && new_cols == self.cols {
            return;
        }

        let row_scale = (self.rows - 1) as f32 / (new_rows - 1) as f32;
        let col_scale = (self.cols - 1) as f32 / (new_cols - 1) as f32;
        let mut points = Vec::with_capacity(new_rows * new_cols);

        for r in 0..new_rows {
            let (r0, r1, tr) = Self::sample_axis(r, row_scale, self.rows);
            for c in 0..new_cols {
                let (c0, c1, tc) = Self::sample_axis(c, col_scale, self.cols);
                let top = self.points[r0 * self.cols + c0].lerp(&self.points[r0 * self.cols + c1], tc);
                let bottom = self.points[r1 * self.cols + c0].lerp(&self.points[r1 * self.cols + c1], tc);
                points.push(top.lerp(&bottom, tr));
            }
        }

        tracing::debug!(
            from_rows = self.rows,
            from_cols = self.cols,
            to_rows = new_rows,
            to_cols = new_cols,
            "Resampled mesh grid"
        );

        self.rows = new_rows;
        self.cols = new_cols;
        self.points = points;
    }

    /// Neighbouring source indices and blend factor for a resampled index.
    fn sample_axis(index: usize, scale: f32, len: usize) -> (usize, usize, f32) {
        let pos = index as f32 * scale;
        let lo = (pos.floor() as usize).min(len - 1);
        let hi = (lo + 1).min(len - 1);
        (lo, hi, pos - lo as f32)
    }

    /// First control point within `radius` of `(x, y)`, scanning row-major.
    pub fn hit_test_point(&self, x: f32, y: f32, radius: f32) -> Option<(usize, usize)> {
        self.points
            .iter()
            .position(|p| p.within(x, y, radius))
            .map(|i| (i / self.cols, i % self.cols))
    }

    /// Axis-aligned bounds of every control point
    pub fn bounding_box(&self) -> Bounds {
        let first = self.points[0];
        let mut bounds = Bounds { min: first, max: first };
        for p in &self.points[1..] {
            bounds.include(p);
        }
        bounds
    }

    /// Outer boundary: top row, right column, bottom row reversed, left
    /// column reversed. Each vertex appears once.
    pub fn outline(&self) -> Vec<Point2D> {
        let (rows, cols) = (self.rows, self.cols);
        let mut out = Vec::with_capacity(2 * (rows + cols) - 4);
        for c in 0..cols {
            out.push(self.points[c]);
        }
        for r in 1..rows {
            out.push(self.points[r * cols + cols - 1]);
        }
        for c in (0..cols - 1).rev() {
            out.push(self.points[(rows - 1) * cols + c]);
        }
        for r in (1..rows - 1).rev() {
            out.push(self.points[r * cols]);
        }
        out
    }

    /// Iterate grid cells as `(row, col, [top-left, top-right, bottom-right, bottom-left])`.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, [Point2D; 4])> + '_ {
        let cols = self.cols;
        (0..self.rows - 1).flat_map(move |r| {
            (0..cols - 1).map(move |c| {
                let at = |rr: usize, cc: usize| self.points[rr * cols + cc];
                (r, c, [at(r, c), at(r, c + 1), at(r + 1, c + 1), at(r + 1, c)])
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Point2D, b: Point2D) -> bool {
        (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4
    }

    fn skewed_quad() -> MeshGrid {
        MeshGrid::from_corners([
            Point2D::new(10.0, 20.0),
            Point2D::new(310.0, 5.0),
            Point2D::new(330.0, 260.0),
            Point2D::new(-5.0, 240.0),
        ])
    }

    #[test]
    fn test_from_corners_layout() {
        let mesh = skewed_quad();
        assert_eq!(mesh.rows(), 2);
        assert_eq!(mesh.cols(), 2);
        assert_eq!(mesh.point(0, 0), Some(Point2D::new(10.0, 20.0)));
        assert_eq!(mesh.point(0, 1), Some(Point2D::new(310.0, 5.0)));
        assert_eq!(mesh.point(1, 1), Some(Point2D::new(330.0, 260.0)));
        assert_eq!(mesh.point(1, 0), Some(Point2D::new(-5.0, 240.0)));
        assert_eq!(mesh.point(2, 0), None);
    }

    #[test]
    fn test_centered_placement() {
        let mesh = MeshGrid::centered(1280.0, 800.0, 1.0);
        assert_eq!(
            mesh.corners(),
            [
                Point2D::new(440.0, 200.0),
                Point2D::new(840.0, 200.0),
                Point2D::new(840.0, 600.0),
                Point2D::new(440.0, 600.0),
            ]
        );
    }

    #[test]
    fn test_centered_truncates_width() {
        // 400 * 16/9 = 711.11 -> 711
        let mesh = MeshGrid::centered(1920.0, 1080.0, 16.0 / 9.0);
        let [tl, tr, _, _] = mesh.corners();
        assert_eq!(tr.x - tl.x, 711.0);
        assert_eq!(tl.x, (1920.0 - 711.0) / 2.0);
    }

    #[test]
    fn test_resize_ignores_invalid_and_unchanged() {
        let mut mesh = skewed_quad();
        let before = mesh.clone();
        mesh.resize(1, 4);
        assert_eq!(mesh, before);
        mesh.resize(4, 0);
        assert_eq!(mesh, before);
        mesh.resize(2, 2);
        assert_eq!(mesh, before);
    }

    #[test]
    fn test_resize_preserves_corners() {
        let mut mesh = skewed_quad();
        let corners = mesh.corners();
        for (rows, cols) in [(3, 3), (5, 2), (2, 7), (4, 4), (2, 2), (6, 3)] {
            mesh.resize(rows, cols);
            assert_eq!(mesh.rows(), rows);
            assert_eq!(mesh.cols(), cols);
            assert_eq!(mesh.points().len(), rows * cols);
            for (got, want) in mesh.corners().iter().zip(corners.iter()) {
                assert!(approx(*got, *want), "{:?} != {:?} at {}x{}", got, want, rows, cols);
            }
        }
    }

    #[test]
    fn test_resize_is_bilinear() {
        let mut mesh = skewed_quad();
        mesh.resize(3, 3);
        let [tl, tr, br, bl] = skewed_quad().corners();
        let top_mid = tl.lerp(&tr, 0.5);
        let bottom_mid = bl.lerp(&br, 0.5);
        assert!(approx(mesh.point(0, 1).unwrap(), top_mid));
        assert!(approx(mesh.point(1, 1).unwrap(), top_mid.lerp(&bottom_mid, 0.5)));
        assert!(approx(mesh.point(1, 0).unwrap(), tl.lerp(&bl, 0.5)));
    }

    #[test]
    fn test_resize_keeps_interior_warp() {
        let mut mesh = MeshGrid::new(3, 3);
        mesh.set_point(1, 1, Point2D::new(0.8, 0.2));
        mesh.resize(5, 5);
        // Old (1,1) lands on new (2,2)
        assert!(approx(mesh.point(2, 2).unwrap(), Point2D::new(0.8, 0.2)));
        // Shrinking back reproduces the displaced point
        mesh.resize(3, 3);
        assert!(approx(mesh.point(1, 1).unwrap(), Point2D::new(0.8, 0.2)));
    }

    #[test]
    fn test_hit_test_inclusive_radius() {
        let mesh = MeshGrid::from_corners([
            Point2D::new(0.0, 0.0),
            Point2D::new(100.0, 0.0),
            Point2D::new(100.0, 100.0),
            Point2D::new(0.0, 100.0),
        ]);
        // Exactly on the radius: 3-4-5 triangle
        assert_eq!(mesh.hit_test_point(103.0, 4.0, 5.0), Some((0, 1)));
        assert_eq!(mesh.hit_test_point(103.0, 4.1, 5.0), None);
        assert_eq!(mesh.hit_test_point(50.0, 50.0, 10.0), None);
    }

    #[test]
    fn test_hit_test_row_major_precedence() {
        let mut mesh = MeshGrid::new(2, 2);
        // Stack every point near the origin; the first in scan order wins
        mesh.set_point(0, 0, Point2D::new(4.0, 0.0));
        mesh.set_point(0, 1, Point2D::new(1.0, 0.0));
        mesh.set_point(1, 0, Point2D::new(0.0, 0.0));
        mesh.set_point(1, 1, Point2D::new(0.0, 0.0));
        assert_eq!(mesh.hit_test_point(0.0, 0.0, 5.0), Some((0, 0)));
        assert_eq!(mesh.hit_test_point(0.0, 0.0, 2.0), Some((0, 1)));
    }

    #[test]
    fn test_bounding_box() {
        let bounds = skewed_quad().bounding_box();
        assert_eq!(bounds.min, Point2D::new(-5.0, 5.0));
        assert_eq!(bounds.max, Point2D::new(330.0, 260.0));
    }

    #[test]
    fn test_outline_walk() {
        let mesh = MeshGrid::new(3, 3);
        let outline = mesh.outline();
        assert_eq!(outline.len(), 8);
        assert_eq!(outline[0], Point2D::new(0.0, 0.0));
        assert_eq!(outline[2], Point2D::new(1.0, 0.0));
        assert_eq!(outline[4], Point2D::new(1.0, 1.0));
        assert_eq!(outline[6], Point2D::new(0.0, 1.0));
        assert_eq!(outline[7], Point2D::new(0.0, 0.5));

        let quad = MeshGrid::new(2, 2).outline();
        assert_eq!(quad.len(), 4);
    }

    #[test]
    fn test_cells() {
        let mesh = MeshGrid::new(3, 4);
        let cells: Vec<_> = mesh.cells().collect();
        assert_eq!(cells.len(), 2 * 3);
        let (r, c, quad) = cells[4];
        assert_eq!((r, c), (1, 1));
        assert_eq!(quad[0], mesh.point(1, 1).unwrap());
        assert_eq!(quad[2], mesh.point(2, 2).unwrap());
    }

    #[test]
    fn test_rows_round_trip() {
        let mut mesh = MeshGrid::new(3, 2);
        mesh.set_point(2, 1, Point2D::new(9.0, 9.0));
        let rebuilt = MeshGrid::from_rows(mesh.to_rows()).unwrap();
        assert_eq!(rebuilt, mesh);
        assert!(MeshGrid::from_rows(vec![vec![Point2D::default(); 2]]).is_none());
        assert!(MeshGrid::from_rows(vec![
            vec![Point2D::default(); 2],
            vec![Point2D::default(); 3],
        ])
        .is_none());
    }
}
