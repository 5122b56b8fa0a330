//! Eraser: a wide round stroke that clears pixels instead of adding color.

use super::{BrushTrait, CULL_BUFFER, StrokeTrack, culled_dot, culled_path, solid_paint};
use crate::geometry::smoothed_segments;
use crate::surface::Surface;
use peniko::Color;
use tiny_skia::{BlendMode, FillRule, LineCap, LineJoin, Paint, Stroke, Transform};

const WIDTH: f32 = 100.0;

/// Radius of the disc cleared by a tap.
pub const ERASER_DOT_RADIUS: f32 = 50.0;

#[derive(Debug, Clone, Default)]
pub struct Eraser {
    track: StrokeTrack,
}

impl Eraser {
    pub fn new() -> Self {
        Self {
            track: StrokeTrack::new(),
        }
    }

    fn reach() -> f64 {
        CULL_BUFFER + WIDTH as f64 / 2.0
    }

    /// Draw the track with `paint`. Returns false if nothing reached the tile.
    fn render_track(&self, surface: &mut Surface, paint: &Paint) -> bool {
        let pixmap = surface.pixmap_mut();

        if self.track.is_tap() {
            let Some(path) = self
                .track
                .first()
                .and_then(|at| culled_dot(at, ERASER_DOT_RADIUS, 0.0))
            else {
                return false;
            };
            pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
            return true;
        }

        let segments = smoothed_segments(self.track.points());
        let Some(path) = culled_path(&segments, Self::reach()) else {
            return false;
        };
        let stroke = Stroke {
            width: WIDTH,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, paint, &stroke, Transform::identity(), None);
        true
    }

    fn commit(&self, surface: &mut Surface) -> bool {
        let mut paint = solid_paint(tiny_skia::Color::BLACK);
        paint.blend_mode = BlendMode::Clear;
        self.render_track(surface, &paint)
    }
}

impl BrushTrait for Eraser {
    fn on_move(&mut self, surface: &mut Surface, x: f64, y: f64) -> bool {
        if !self.track.record((x, y).into()) || !self.track.is_due_for_commit() {
            return false;
        }
        let drew = self.commit(surface);
        self.track.restart();
        drew
    }

    fn on_release(&mut self, surface: &mut Surface) -> bool {
        let drew = self.track.has_pending() && self.commit(surface);
        self.track.clear();
        drew
    }

    /// The erased area shows as opaque white until committed.
    fn render_preview(&self, target: &mut Surface) {
        if self.has_preview() {
            self.render_track(target, &solid_paint(tiny_skia::Color::WHITE));
        }
    }

    fn has_preview(&self) -> bool {
        self.track.has_pending()
    }

    fn set_color(&mut self, _color: Color) {}
}
