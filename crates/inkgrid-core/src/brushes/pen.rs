//! Sharp calligraphy pen.

use super::{
    BrushTrait, CULL_BUFFER, DOT_RADIUS, StrokeTrack, culled_dot, reaches_tile, solid_paint,
    to_skia,
};
use crate::geometry::{Coordinate, Segment, smoothed_segments};
use crate::surface::Surface;
use kurbo::{Rect, Vec2};
use peniko::Color;
use tiny_skia::{FillRule, Path, PathBuilder, Stroke, Transform};

const WIDTH: f32 = 4.0;

/// Nib angle in radians.
const NIB_ANGLE: f64 = 2.1;

/// Distance between the two outline passes.
const NIB_STEP: f64 = 4.0;

#[derive(Debug, Clone)]
pub struct PenBrush {
    track: StrokeTrack,
    color: Color,
}

impl Default for PenBrush {
    fn default() -> Self {
        Self::new()
    }
}

impl PenBrush {
    pub fn new() -> Self {
        Self {
            track: StrokeTrack::new(),
            color: Color::from_rgba8(0, 0, 0, 255),
        }
    }

    /// Offsets of the two outline passes along the nib.
    fn nib_offsets() -> [Vec2; 2] {
        let dir = Vec2::new(NIB_ANGLE.cos(), NIB_ANGLE.sin());
        [1.0, 2.0].map(|k| dir * (k * NIB_STEP - NIB_STEP / 2.0))
    }

    fn reach() -> f64 {
        CULL_BUFFER + WIDTH as f64 / 2.0
    }

    /// Closed outline of the stroke as drawn by a nib offset by `d`: one side
    /// along `+d`, back along `-d`.
    fn outline(segments: &[Segment], d: Vec2) -> Option<(Path, Rect)> {
        let first = segments.first()?;
        let mut pb = PathBuilder::new();
        let mut bounds: Option<Rect> = None;

        let mut push = |pb: &mut PathBuilder, seg: Segment| {
            bounds = Some(match bounds {
                Some(b) => b.union(seg.bounds()),
                None => seg.bounds(),
            });
            match seg {
                Segment::Line(_, b) => pb.line_to(b.x as f32, b.y as f32),
                Segment::Quad(_, c, b) => {
                    pb.quad_to(c.x as f32, c.y as f32, b.x as f32, b.y as f32)
                }
            }
        };

        let start = first.translate(d).start();
        pb.move_to(start.x as f32, start.y as f32);
        for seg in segments {
            push(&mut pb, seg.translate(d));
        }
        let end = segments[segments.len() - 1].end();
        let turn = Segment::Line(
            Coordinate::new(end.x + d.x, end.y + d.y),
            Coordinate::new(end.x - d.x, end.y - d.y),
        );
        push(&mut pb, turn);
        for seg in segments.iter().rev() {
            push(&mut pb, seg.translate(-d).reversed());
        }
        pb.close();

        Some((pb.finish()?, bounds?))
    }

    fn render_track(&self, surface: &mut Surface) -> bool {
        let paint = solid_paint(to_skia(self.color));

        if self.track.is_tap() {
            let Some(at) = self.track.first() else {
                return false;
            };
            let mut drew = false;
            for center in [at, Coordinate::new(at.x - 2.0, at.y - 1.0)] {
                if let Some(path) = culled_dot(center, DOT_RADIUS, 0.0) {
                    surface.pixmap_mut().fill_path(
                        &path,
                        &paint,
                        FillRule::Winding,
                        Transform::identity(),
                        None,
                    );
                    drew = true;
                }
            }
            return drew;
        }

        let segments = smoothed_segments(self.track.points());
        let outlines: Vec<(Path, Rect)> = Self::nib_offsets()
            .into_iter()
            .filter_map(|d| Self::outline(&segments, d))
            .collect();

        let bounds = outlines
            .iter()
            .map(|(_, b)| *b)
            .reduce(|a, b| a.union(b));
        match bounds {
            Some(bounds) if reaches_tile(bounds, Self::reach()) => {}
            _ => return false,
        }

        let stroke = Stroke {
            width: WIDTH,
            ..Stroke::default()
        };
        let pixmap = surface.pixmap_mut();
        for (path, _) in &outlines {
            pixmap.fill_path(path, &paint, FillRule::Winding, Transform::identity(), None);
            pixmap.stroke_path(path, &paint, &stroke, Transform::identity(), None);
        }
        true
    }
}

impl BrushTrait for PenBrush {
    fn on_move(&mut self, surface: &mut Surface, x: f64, y: f64) -> bool {
        if !self.track.record(Coordinate::new(x, y)) || !self.track.is_due_for_commit() {
            return false;
        }
        let drew = self.render_track(surface);
        self.track.restart();
        drew
    }

    fn on_release(&mut self, surface: &mut Surface) -> bool {
        let drew = self.track.has_pending() && self.render_track(surface);
        self.track.clear();
        drew
    }

    fn render_preview(&self, target: &mut Surface) {
        if self.has_preview() {
            self.render_track(target);
        }
    }

    fn has_preview(&self) -> bool {
        self.track.has_pending()
    }

    fn set_color(&mut self, color: Color) {
        self.color = color;
    }
}
