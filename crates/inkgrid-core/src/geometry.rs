//! Point and grid-coordinate math.

use kurbo::{Line, ParamCurveExtrema, Point, QuadBez, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Pixel dimension of each square tile.
pub const TILE_SIZE: i64 = 256;

/// `TILE_SIZE` as a float, for surface-space math.
pub const TILE_SIZE_F64: f64 = TILE_SIZE as f64;

/// An `(x, y)` pair.
///
/// `Coordinate<f64>` is a screen or canvas position; `Coordinate<i64>` is a
/// tile-grid key. Keys order by x, then y.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate<T> {
    pub x: T,
    pub y: T,
}

impl<T> Coordinate<T> {
    pub const fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

impl<T> From<(T, T)> for Coordinate<T> {
    fn from((x, y): (T, T)) -> Self {
        Self { x, y }
    }
}

/// Grid key of a tile: the canvas position of its top-left corner.
pub type TileCoord = Coordinate<i64>;

impl TileCoord {
    /// Bounds of this tile in canvas space.
    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.x as f64,
            self.y as f64,
            (self.x + TILE_SIZE) as f64,
            (self.y + TILE_SIZE) as f64,
        )
    }

    /// Convert a canvas position into this tile's local space.
    pub fn to_local(&self, canvas: Point) -> Point {
        Point::new(canvas.x - self.x as f64, canvas.y - self.y as f64)
    }
}

impl From<Coordinate<f64>> for Point {
    fn from(c: Coordinate<f64>) -> Self {
        Point::new(c.x, c.y)
    }
}

impl From<Point> for Coordinate<f64> {
    fn from(p: Point) -> Self {
        Coordinate::new(p.x, p.y)
    }
}

/// Euclidean distance between two points.
pub fn distance(p0: Coordinate<f64>, p1: Coordinate<f64>) -> f64 {
    let dx = p1.x - p0.x;
    let dy = p1.y - p0.y;
    (dx * dx + dy * dy).sqrt()
}

/// Midpoint of the segment `a`–`b`.
pub fn midpoint(a: Coordinate<f64>, b: Coordinate<f64>) -> Coordinate<f64> {
    Coordinate::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

/// Evaluate a quadratic Bézier at `t` (expected in `[0, 1]`).
pub fn quadratic_point(
    p0: Coordinate<f64>,
    anchor: Coordinate<f64>,
    p2: Coordinate<f64>,
    t: f64,
) -> Coordinate<f64> {
    let coef0 = (1.0 - t) * (1.0 - t);
    let coef1 = 2.0 * (1.0 - t) * t;
    let coef2 = t * t;
    Coordinate::new(
        coef0 * p0.x + coef1 * anchor.x + coef2 * p2.x,
        coef0 * p0.y + coef1 * anchor.y + coef2 * p2.y,
    )
}

/// Align a position to the nearest multiple of `TILE_SIZE` that is `<= pos`.
///
/// Floor division, so negative positions align toward negative infinity.
pub fn align(pos: i64) -> i64 {
    pos.div_euclid(TILE_SIZE) * TILE_SIZE
}

/// Grid key of the tile containing a canvas position.
pub fn align_point(p: Coordinate<f64>) -> TileCoord {
    Coordinate::new(align(p.x.floor() as i64), align(p.y.floor() as i64))
}

/// One piece of a smoothed stroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    Line(Coordinate<f64>, Coordinate<f64>),
    Quad(Coordinate<f64>, Coordinate<f64>, Coordinate<f64>),
}

impl Segment {
    pub fn start(&self) -> Coordinate<f64> {
        match *self {
            Segment::Line(a, _) | Segment::Quad(a, _, _) => a,
        }
    }

    pub fn end(&self) -> Coordinate<f64> {
        match *self {
            Segment::Line(_, b) | Segment::Quad(_, _, b) => b,
        }
    }

    /// Tight bounding box of the painted centreline.
    pub fn bounds(&self) -> Rect {
        match *self {
            Segment::Line(a, b) => Line::new(Point::from(a), Point::from(b)).bounding_box(),
            Segment::Quad(a, c, b) => {
                QuadBez::new(Point::from(a), Point::from(c), Point::from(b)).bounding_box()
            }
        }
    }

    /// Same segment shifted by `offset`.
    pub fn translate(&self, offset: Vec2) -> Segment {
        let shift = |p: Coordinate<f64>| Coordinate::new(p.x + offset.x, p.y + offset.y);
        match *self {
            Segment::Line(a, b) => Segment::Line(shift(a), shift(b)),
            Segment::Quad(a, c, b) => Segment::Quad(shift(a), shift(c), shift(b)),
        }
    }

    /// Same segment traversed end to start.
    pub fn reversed(&self) -> Segment {
        match *self {
            Segment::Line(a, b) => Segment::Line(b, a),
            Segment::Quad(a, c, b) => Segment::Quad(b, c, a),
        }
    }
}

/// Midpoint-smoothed segments through a run of samples.
///
/// For consecutive samples `prev_prev, prev, cur` the curve for `prev` runs
/// from `midpoint(prev_prev, prev)` through `prev` to `midpoint(prev, cur)`.
/// The first piece is a straight line from the first sample and the last
/// piece ends on the literal last sample. Fewer than two samples yield
/// nothing.
pub fn smoothed_segments(points: &[Coordinate<f64>]) -> Vec<Segment> {
    let len = points.len();
    if len < 2 {
        return Vec::new();
    }

    let mut segments = Vec::with_capacity(len);
    let mut cursor = midpoint(points[0], points[1]);
    segments.push(Segment::Line(points[0], cursor));

    for i in 1..len - 1 {
        let next = midpoint(points[i], points[i + 1]);
        segments.push(Segment::Quad(cursor, points[i], next));
        cursor = next;
    }

    segments.push(Segment::Line(cursor, points[len - 1]));
    segments
}

/// Inclusive overlap test that also accepts zero-area boxes.
pub fn rects_overlap(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && a.x1 >= b.x0 && a.y0 <= b.y1 && a.y1 >= b.y0
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::ParamCurve;

    #[test]
    fn test_distance() {
        let d = distance(Coordinate::new(0.0, 0.0), Coordinate::new(3.0, 4.0));
        assert!((d - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_quadratic_point_endpoints() {
        let p0 = Coordinate::new(0.0, 0.0);
        let anchor = Coordinate::new(50.0, 100.0);
        let p2 = Coordinate::new(100.0, 0.0);

        assert_eq!(quadratic_point(p0, anchor, p2, 0.0), p0);
        assert_eq!(quadratic_point(p0, anchor, p2, 1.0), p2);

        let mid = quadratic_point(p0, anchor, p2, 0.5);
        assert!((mid.x - 50.0).abs() < f64::EPSILON);
        assert!((mid.y - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_quadratic_point_matches_kurbo() {
        let p0 = Coordinate::new(-12.0, 4.0);
        let anchor = Coordinate::new(30.0, -80.0);
        let p2 = Coordinate::new(90.0, 17.0);
        let quad = QuadBez::new(Point::from(p0), Point::from(anchor), Point::from(p2));

        for step in 0..=10 {
            let t = step as f64 / 10.0;
            let ours = quadratic_point(p0, anchor, p2, t);
            let theirs = quad.eval(t);
            assert!((ours.x - theirs.x).abs() < 1e-9);
            assert!((ours.y - theirs.y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_align_is_idempotent() {
        for k in -5..5 {
            let c = k * TILE_SIZE;
            assert_eq!(align(c), c);
        }
    }

    #[test]
    fn test_align_bounds() {
        for pos in [-1000, -257, -256, -255, -1, 0, 1, 255, 256, 257, 1000] {
            let a = align(pos);
            assert!(a <= pos, "align({pos}) = {a}");
            assert!(pos < a + TILE_SIZE, "align({pos}) = {a}");
            assert_eq!(a % TILE_SIZE, 0);
        }
    }

    #[test]
    fn test_align_negative() {
        assert_eq!(align(-1), -256);
        assert_eq!(align(-256), -256);
        assert_eq!(align(-257), -512);
    }

    #[test]
    fn test_align_point() {
        let key = align_point(Coordinate::new(-0.5, 300.2));
        assert_eq!(key, Coordinate::new(-256, 256));
    }

    #[test]
    fn test_tile_coord_order() {
        let mut coords = vec![
            Coordinate::new(256, 0),
            Coordinate::new(0, 256),
            Coordinate::new(0, 0),
            Coordinate::new(-256, 512),
        ];
        coords.sort();
        assert_eq!(
            coords,
            vec![
                Coordinate::new(-256, 512),
                Coordinate::new(0, 0),
                Coordinate::new(0, 256),
                Coordinate::new(256, 0),
            ]
        );
    }

    #[test]
    fn test_smoothed_segments_two_points_is_line() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(10.0, 0.0);
        let segments = smoothed_segments(&[a, b]);

        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| matches!(s, Segment::Line(..))));
        assert_eq!(segments[0].start(), a);
        assert_eq!(segments[1].end(), b);
    }

    #[test]
    fn test_smoothed_segments_midpoints() {
        let pts = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(10.0, 0.0),
            Coordinate::new(10.0, 10.0),
        ];
        let segments = smoothed_segments(&pts);

        assert_eq!(segments.len(), 3);
        match segments[1] {
            Segment::Quad(start, anchor, end) => {
                assert_eq!(start, Coordinate::new(5.0, 0.0));
                assert_eq!(anchor, pts[1]);
                assert_eq!(end, Coordinate::new(10.0, 5.0));
            }
            other => panic!("expected a quad, got {other:?}"),
        }
        assert_eq!(segments[2].end(), pts[2]);
    }

    #[test]
    fn test_smoothed_segments_single_point() {
        assert!(smoothed_segments(&[Coordinate::new(1.0, 1.0)]).is_empty());
    }

    #[test]
    fn test_rects_overlap_zero_area() {
        let tile = Rect::new(0.0, 0.0, 256.0, 256.0);
        let horizontal = Rect::new(10.0, 20.0, 50.0, 20.0);
        assert!(rects_overlap(horizontal, tile));
        assert!(!rects_overlap(Rect::new(300.0, 0.0, 400.0, 0.0), tile));
    }
}
