//! 2D points and axis-aligned bounds in destination (pixel) space.

use serde::{Deserialize, Serialize};

/// A 2D point in destination pixel space.
///
/// Serialized as a `[x, y]` pair to match the project file layout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

impl Point2D {
    /// Create a new point
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Squared distance to another point
    pub fn distance_squared(&self, other: &Point2D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Distance to another point
    pub fn distance(&self, other: &Point2D) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Linear interpolation to another point
    pub fn lerp(&self, other: &Point2D, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Whether this point lies within `radius` of `(x, y)`, boundary included.
    pub fn within(&self, x: f32, y: f32, radius: f32) -> bool {
        self.distance_squared(&Point2D::new(x, y)) <= radius * radius
    }

    pub fn to_array(self) -> [f32; 2] {
        [self.x, self.y]
    }
}

impl From<(f32, f32)> for Point2D {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for Point2D {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point2D> for [f32; 2] {
    fn from(p: Point2D) -> Self {
        [p.x, p.y]
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point2D,
    pub max: Point2D,
}

impl Bounds {
    /// Smallest box containing every point, or `None` for an empty iterator.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2D>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bounds = Bounds { min: first, max: first };
        for p in iter {
            bounds.include(p);
        }
        Some(bounds)
    }

    /// Grow the box to contain `p`.
    pub fn include(&mut self, p: &Point2D) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// Union of two boxes
    pub fn union(&self, other: &Bounds) -> Bounds {
        let mut out = *self;
        out.include(&other.min);
        out.include(&other.max);
        out
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Inclusive containment test.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.min.x <= x && x <= self.max.x && self.min.y <= y && y <= self.max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance_and_lerp() {
        let p1 = Point2D::new(0.0, 0.0);
        let p2 = Point2D::new(3.0, 4.0);
        assert!((p1.distance(&p2) - 5.0).abs() < f32::EPSILON);

        let mid = p1.lerp(&p2, 0.5);
        assert_eq!(mid, Point2D::new(1.5, 2.0));
    }

    #[test]
    fn test_within_is_inclusive() {
        let p = Point2D::new(10.0, 10.0);
        assert!(p.within(13.0, 14.0, 5.0));
        assert!(!p.within(13.0, 14.1, 5.0));
    }

    #[test]
    fn test_point_serializes_as_pair() {
        let json = serde_json::to_string(&Point2D::new(1.5, -2.0)).unwrap();
        assert_eq!(json, "[1.5,-2.0]");
        let back: Point2D = serde_json::from_str("[3.0, 4.0]").unwrap();
        assert_eq!(back, Point2D::new(3.0, 4.0));
    }

    #[test]
    fn test_bounds() {
        let points = [
            Point2D::new(5.0, 1.0),
            Point2D::new(-2.0, 7.0),
            Point2D::new(3.0, 3.0),
        ];
        let b = Bounds::from_points(&points).unwrap();
        assert_eq!(b.min, Point2D::new(-2.0, 1.0));
        assert_eq!(b.max, Point2D::new(5.0, 7.0));
        assert!(b.contains(5.0, 7.0));
        assert!(!b.contains(5.1, 7.0));
        assert!(Bounds::from_points(&Vec::<Point2D>::new()).is_none());
    }
}
