//! Stroke renderers that turn pointer samples into committed ink.
//!
//! Every brush keeps a track of the samples of the current gesture. Ink that
//! has been written to the tile's edit surface is *committed*; the rest of the
//! track is shown through a cheap live preview until it is committed, either
//! periodically (every [`COMMIT_INTERVAL`] samples) or when the gesture ends.

mod eraser;
mod paint;
mod pen;
mod pencil;

pub use eraser::Eraser;
pub use paint::{BRISTLES, PaintBrush};
pub use pen::PenBrush;
pub use pencil::PencilBrush;

use crate::geometry::{Coordinate, Segment, TILE_SIZE_F64, rects_overlap};
use crate::surface::Surface;
use kurbo::Rect;
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tiny_skia::{Paint, Path, PathBuilder};

/// Samples closer than this on both axes to the previous one are dropped.
pub const MIN_SAMPLE_DISTANCE: f64 = 6.0;

/// Number of samples after which the track is committed and restarted.
pub const COMMIT_INTERVAL: usize = 48;

/// Margin around the tile inside which segments are still drawn.
pub const CULL_BUFFER: f64 = TILE_SIZE_F64 / 4.0;

/// Radius of the dot left by a single tap.
pub const DOT_RADIUS: f32 = 5.0;

/// Available brushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrushKind {
    Pencil,
    Pen,
    #[default]
    Paint,
    Eraser,
}

impl BrushKind {
    pub const ALL: [BrushKind; 4] = [
        BrushKind::Pencil,
        BrushKind::Pen,
        BrushKind::Paint,
        BrushKind::Eraser,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BrushKind::Pencil => "pencil",
            BrushKind::Pen => "pen",
            BrushKind::Paint => "paint",
            BrushKind::Eraser => "eraser",
        }
    }
}

impl fmt::Display for BrushKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unrecognised brush name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown brush: {0}")]
pub struct UnknownBrush(pub String);

impl FromStr for BrushKind {
    type Err = UnknownBrush;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BrushKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownBrush(s.to_string()))
    }
}

/// Samples of the gesture in progress.
#[derive(Debug, Clone, Default)]
pub struct StrokeTrack {
    points: Vec<Coordinate<f64>>,
    restarted: bool,
}

impl StrokeTrack {
    pub fn new() -> Self {
        Self {
            points: Vec::with_capacity(COMMIT_INTERVAL),
            restarted: false,
        }
    }

    /// Record a sample. Returns false if it was too close to the last one.
    pub fn record(&mut self, point: Coordinate<f64>) -> bool {
        if let Some(prev) = self.points.last() {
            if (point.x - prev.x).abs() < MIN_SAMPLE_DISTANCE
                && (point.y - prev.y).abs() < MIN_SAMPLE_DISTANCE
            {
                return false;
            }
        }
        self.points.push(point);
        true
    }

    pub fn points(&self) -> &[Coordinate<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<Coordinate<f64>> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<Coordinate<f64>> {
        self.points.last().copied()
    }

    /// True if the whole gesture so far is a single sample.
    pub fn is_tap(&self) -> bool {
        self.points.len() == 1 && !self.restarted
    }

    /// True if there is anything left to draw: a tap or at least one segment.
    pub fn has_pending(&self) -> bool {
        self.points.len() > 1 || self.is_tap()
    }

    /// True once enough samples have piled up to force a commit.
    pub fn is_due_for_commit(&self) -> bool {
        self.points.len() >= COMMIT_INTERVAL
    }

    /// Drop everything but the last sample, which starts the next run.
    pub fn restart(&mut self) {
        if let Some(last) = self.points.last().copied() {
            self.points.clear();
            self.points.push(last);
            self.restarted = true;
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.restarted = false;
    }

    pub(crate) fn set_first(&mut self, point: Coordinate<f64>) {
        if let Some(first) = self.points.first_mut() {
            *first = point;
        }
    }
}

/// Common interface of all brushes.
///
/// All coordinates are tile-local.
pub trait BrushTrait {
    /// Consume a motion sample. Returns true iff committed pixels were written.
    fn on_move(&mut self, surface: &mut Surface, x: f64, y: f64) -> bool;

    /// Flush the rest of the gesture as committed ink and reset the track.
    /// Returns true iff committed pixels were written.
    fn on_release(&mut self, surface: &mut Surface) -> bool;

    /// Draw the uncommitted tail of the gesture onto `target`.
    fn render_preview(&self, target: &mut Surface);

    /// True while there is an uncommitted tail to preview.
    fn has_preview(&self) -> bool;

    /// Change the ink color for future strokes.
    fn set_color(&mut self, color: Color);
}

/// A brush of any kind.
#[derive(Debug, Clone)]
pub enum Brush {
    Pencil(PencilBrush),
    Pen(PenBrush),
    Paint(PaintBrush),
    Eraser(Eraser),
}

impl Brush {
    /// Create a brush of the given kind painting in `color`.
    pub fn new(kind: BrushKind, color: Color) -> Self {
        let mut brush = match kind {
            BrushKind::Pencil => Brush::Pencil(PencilBrush::new()),
            BrushKind::Pen => Brush::Pen(PenBrush::new()),
            BrushKind::Paint => Brush::Paint(PaintBrush::new()),
            BrushKind::Eraser => Brush::Eraser(Eraser::new()),
        };
        brush.set_color(color);
        brush
    }

    pub fn kind(&self) -> BrushKind {
        match self {
            Brush::Pencil(_) => BrushKind::Pencil,
            Brush::Pen(_) => BrushKind::Pen,
            Brush::Paint(_) => BrushKind::Paint,
            Brush::Eraser(_) => BrushKind::Eraser,
        }
    }

    fn as_trait(&self) -> &dyn BrushTrait {
        match self {
            Brush::Pencil(b) => b,
            Brush::Pen(b) => b,
            Brush::Paint(b) => b,
            Brush::Eraser(b) => b,
        }
    }

    fn as_trait_mut(&mut self) -> &mut dyn BrushTrait {
        match self {
            Brush::Pencil(b) => b,
            Brush::Pen(b) => b,
            Brush::Paint(b) => b,
            Brush::Eraser(b) => b,
        }
    }

    pub fn on_move(&mut self, surface: &mut Surface, x: f64, y: f64) -> bool {
        self.as_trait_mut().on_move(surface, x, y)
    }

    pub fn on_release(&mut self, surface: &mut Surface) -> bool {
        self.as_trait_mut().on_release(surface)
    }

    pub fn render_preview(&self, target: &mut Surface) {
        self.as_trait().render_preview(target)
    }

    pub fn has_preview(&self) -> bool {
        self.as_trait().has_preview()
    }

    pub fn set_color(&mut self, color: Color) {
        self.as_trait_mut().set_color(color)
    }
}

/// Tile bounds grown by `reach` on every side.
pub(crate) fn cull_rect(reach: f64) -> Rect {
    Rect::new(-reach, -reach, TILE_SIZE_F64 + reach, TILE_SIZE_F64 + reach)
}

/// True if ink within `reach` of `bounds` can land on the tile.
pub(crate) fn reaches_tile(bounds: Rect, reach: f64) -> bool {
    rects_overlap(bounds, cull_rect(reach))
}

/// Build a path from the segments that can paint into the tile.
///
/// Segments that cannot are skipped; the next visible one starts a new
/// subpath. Returns `None` when nothing is visible.
pub(crate) fn culled_path(segments: &[Segment], reach: f64) -> Option<Path> {
    let mut pb = PathBuilder::new();
    let mut pen_at: Option<Coordinate<f64>> = None;

    for segment in segments {
        if !reaches_tile(segment.bounds(), reach) {
            pen_at = None;
            continue;
        }
        let start = segment.start();
        if pen_at != Some(start) {
            pb.move_to(start.x as f32, start.y as f32);
        }
        match *segment {
            Segment::Line(_, end) => pb.line_to(end.x as f32, end.y as f32),
            Segment::Quad(_, anchor, end) => {
                pb.quad_to(anchor.x as f32, anchor.y as f32, end.x as f32, end.y as f32)
            }
        }
        pen_at = Some(segment.end());
    }

    pb.finish()
}

/// Filled circle path, or `None` if it cannot reach the tile.
pub(crate) fn culled_dot(center: Coordinate<f64>, radius: f32, reach: f64) -> Option<Path> {
    let r = radius as f64;
    let bounds = Rect::new(center.x - r, center.y - r, center.x + r, center.y + r);
    if !reaches_tile(bounds, reach) {
        return None;
    }
    PathBuilder::from_circle(center.x as f32, center.y as f32, radius)
}

/// Anti-aliased solid paint.
pub(crate) fn solid_paint(color: tiny_skia::Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint
}

/// Convert an ink color, overriding its alpha.
pub(crate) fn with_alpha(color: Color, alpha: u8) -> tiny_skia::Color {
    let rgba = color.to_rgba8();
    tiny_skia::Color::from_rgba8(rgba.r, rgba.g, rgba.b, alpha)
}

/// Convert an ink color as-is.
pub(crate) fn to_skia(color: Color) -> tiny_skia::Color {
    let rgba = color.to_rgba8();
    tiny_skia::Color::from_rgba8(rgba.r, rgba.g, rgba.b, rgba.a)
}


#[cfg(test)]
mod tests {
    use super::test_support::horizontal_gesture;
    use super::*;

    #[test]
    fn test_brush_kind_from_str() {
        assert_eq!("pen".parse::<BrushKind>().unwrap(), BrushKind::Pen);
        assert_eq!("Eraser".parse::<BrushKind>().unwrap(), BrushKind::Eraser);
        assert!("crayon".parse::<BrushKind>().is_err());
    }

    #[test]
    fn test_brush_kind_roundtrip_name() {
        for kind in BrushKind::ALL {
            assert_eq!(kind.to_string().parse::<BrushKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_track_undersamples() {
        let mut track = StrokeTrack::new();
        assert!(track.record(Coordinate::new(0.0, 0.0)));
        assert!(!track.record(Coordinate::new(3.0, 5.0)));
        assert!(track.record(Coordinate::new(7.0, 0.0)));
        assert!(track.record(Coordinate::new(7.0, 6.0)));
        assert_eq!(track.len(), 3);
    }

    #[test]
    fn test_track_restart_keeps_last() {
        let mut track = StrokeTrack::new();
        for i in 0..5 {
            track.record(Coordinate::new(i as f64 * 10.0, 0.0));
        }
        track.restart();
        assert_eq!(track.points(), &[Coordinate::new(40.0, 0.0)]);
        assert!(!track.is_tap());
        assert!(!track.has_pending());
    }

    #[test]
    fn test_track_single_sample_is_tap() {
        let mut track = StrokeTrack::new();
        track.record(Coordinate::new(3.0, 4.0));
        assert!(track.is_tap());
        track.clear();
        assert!(!track.is_tap());
    }

    #[test]
    fn test_culled_path_skips_far_segments() {
        let far = [Segment::Line(
            Coordinate::new(-500.0, -500.0),
            Coordinate::new(-400.0, -500.0),
        )];
        assert!(culled_path(&far, 10.0).is_none());

        let near = [Segment::Line(
            Coordinate::new(-5.0, 10.0),
            Coordinate::new(40.0, 10.0),
        )];
        assert!(culled_path(&near, 10.0).is_some());
    }

    #[test]
    fn test_culled_dot() {
        assert!(culled_dot(Coordinate::new(10.0, 10.0), DOT_RADIUS, 0.0).is_some());
        assert!(culled_dot(Coordinate::new(266.0, 10.0), DOT_RADIUS, 0.0).is_none());
    }

    #[test]
    fn test_every_brush_leaves_no_preview_after_release() {
        for kind in BrushKind::ALL {
            let mut brush = Brush::new(kind, Color::from_rgba8(0, 0, 0, 255));
            let mut surface = Surface::tile().unwrap();
            horizontal_gesture(&mut brush, &mut surface, (20.0, 100.0), 10);
            brush.on_release(&mut surface);

            assert!(!brush.has_preview(), "{kind} still has a preview");
            let mut preview = Surface::tile().unwrap();
            brush.render_preview(&mut preview);
            assert!(preview.is_blank(), "{kind} drew a preview after release");
        }
    }

    #[test]
    fn test_far_gesture_commits_nothing() {
        for kind in BrushKind::ALL {
            let mut brush = Brush::new(kind, Color::from_rgba8(0, 0, 0, 255));
            let mut surface = Surface::tile().unwrap();
            let moved = horizontal_gesture(&mut brush, &mut surface, (2000.0, 2000.0), 60);
            let released = brush.on_release(&mut surface);

            assert!(moved.iter().all(|m| !m), "{kind} reported a far change");
            assert!(!released, "{kind} reported a far release");
            assert!(surface.is_blank());
        }
    }

    #[test]
    fn test_stroke_just_outside_tile_inks_edge() {
        for kind in [BrushKind::Pencil, BrushKind::Pen, BrushKind::Paint] {
            let mut brush = Brush::new(kind, Color::from_rgba8(0, 0, 0, 255));
            let mut top = Surface::tile().unwrap();
            let moved = horizontal_gesture(&mut brush, &mut top, (20.0, -1.0), 12);
            let released = brush.on_release(&mut top);
            assert!(moved.contains(&true) || released, "{kind} culled a stroke above the tile");
            assert!(top.alpha_at(60, 0) > 0, "{kind} left a gap on row 0");

            let mut left = Surface::tile().unwrap();
            let moved: Vec<bool> = (0..12)
                .map(|i| brush.on_move(&mut left, -1.0, 20.0 + i as f64 * 8.0))
                .collect();
            let released = brush.on_release(&mut left);
            assert!(moved.contains(&true) || released, "{kind} culled a stroke left of the tile");
            assert!(left.alpha_at(0, 60) > 0, "{kind} left a gap on column 0");
        }
    }

    #[test]
    fn test_cull_buffer_keeps_near_segments() {
        let just_outside = [Segment::Line(
            Coordinate::new(20.0, -CULL_BUFFER - 1.0),
            Coordinate::new(80.0, -CULL_BUFFER - 1.0),
        )];
        assert!(culled_path(&just_outside, CULL_BUFFER + 2.0).is_some());
        assert!(culled_path(&just_outside, CULL_BUFFER).is_none());
    }

    #[test]
    fn test_tap_draws_dot_for_ink_brushes() {
        for kind in [BrushKind::Pencil, BrushKind::Pen, BrushKind::Paint] {
            let mut brush = Brush::new(kind, Color::from_rgba8(0, 0, 0, 255));
            let mut surface = Surface::tile().unwrap();
            brush.on_move(&mut surface, 10.0, 10.0);

            assert!(brush.on_release(&mut surface), "{kind} tap was not committed");
            assert!(surface.alpha_at(10, 10) > 0, "{kind} left no dot");
            assert_eq!(surface.alpha_at(30, 30), 0, "{kind} dot is too large");
        }
    }
}
