//! Soft bristled paint brush.
//!
//! While a gesture is active only a blurred dab is stamped at each sample.
//! The real stroke, one smoothed path per bristle blurred together, is only
//! rendered when the track is committed.

use super::{
    BrushTrait, CULL_BUFFER, DOT_RADIUS, StrokeTrack, culled_dot, culled_path, reaches_tile,
    solid_paint, with_alpha,
};
use crate::geometry::{Coordinate, smoothed_segments};
use crate::surface::Surface;
use kurbo::{Rect, Vec2};
use peniko::Color;
use tiny_skia::{FillRule, LineCap, LineJoin, PathBuilder, Stroke, Transform};

const WIDTH: f32 = 10.0;
const ALPHA: u8 = 100;
const BLUR_RADIUS: u32 = 3;

/// How far the first sample is pulled toward the second.
const FIRST_SHIFT: f64 = 6.0;

/// Offset of each bristle from the stroke centreline.
pub const BRISTLES: [(f64, f64); 10] = [
    (0.0, 0.0),
    (21.0, 2.0),
    (-1.0, 19.0),
    (-20.0, -2.0),
    (1.0, -22.0),
    (14.0, 11.0),
    (-9.0, 17.0),
    (-13.0, -10.0),
    (18.0, -7.0),
    (5.0, -11.0),
];

#[derive(Debug, Clone)]
pub struct PaintBrush {
    track: StrokeTrack,
    color: Color,
    stamp: Option<Surface>,
}

impl Default for PaintBrush {
    fn default() -> Self {
        Self::new()
    }
}

impl PaintBrush {
    pub fn new() -> Self {
        let color = Color::from_rgba8(0, 0, 200, ALPHA);
        Self {
            track: StrokeTrack::new(),
            color,
            stamp: Self::make_stamp(color),
        }
    }

    fn reach() -> f64 {
        CULL_BUFFER + WIDTH as f64 / 2.0 + BLUR_RADIUS as f64
    }

    fn stamp_half() -> i32 {
        (WIDTH / 2.0) as i32 + BLUR_RADIUS as i32
    }

    /// A round dab pre-blurred once per color.
    fn make_stamp(color: Color) -> Option<Surface> {
        let side = (2 * Self::stamp_half() + 1) as u32;
        let mut stamp = Surface::new(side, side).ok()?;
        let center = Self::stamp_half() as f32 + 0.5;
        let path = PathBuilder::from_circle(center, center, WIDTH / 2.0)?;
        stamp.pixmap_mut().fill_path(
            &path,
            &solid_paint(with_alpha(color, ALPHA)),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
        stamp.box_blur(BLUR_RADIUS);
        Some(stamp)
    }

    fn dot(&self, surface: &mut Surface) -> bool {
        let Some(path) = self
            .track
            .first()
            .and_then(|at| culled_dot(at, DOT_RADIUS, 0.0))
        else {
            return false;
        };
        surface.pixmap_mut().fill_path(
            &path,
            &solid_paint(with_alpha(self.color, ALPHA)),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
        true
    }

    /// Quality pass: every bristle stroked onto a scratch layer, blurred, then
    /// drawn onto `surface`.
    fn commit(&self, surface: &mut Surface) -> bool {
        if self.track.is_tap() {
            return self.dot(surface);
        }

        let segments = smoothed_segments(self.track.points());
        let paths: Vec<_> = BRISTLES
            .iter()
            .filter_map(|&(bx, by)| {
                let shifted: Vec<_> = segments
                    .iter()
                    .map(|s| s.translate(Vec2::new(bx, by)))
                    .collect();
                culled_path(&shifted, Self::reach())
            })
            .collect();
        if paths.is_empty() {
            return false;
        }

        let mut scratch = match Surface::tile() {
            Ok(scratch) => scratch,
            Err(e) => {
                log::warn!("Skipping paint commit: {e}");
                return false;
            }
        };
        let paint = solid_paint(with_alpha(self.color, ALPHA));
        let stroke = Stroke {
            width: WIDTH,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        for path in &paths {
            scratch
                .pixmap_mut()
                .stroke_path(path, &paint, &stroke, Transform::identity(), None);
        }
        scratch.box_blur(BLUR_RADIUS);
        surface.draw_surface(&scratch, 0, 0);
        true
    }
}

impl BrushTrait for PaintBrush {
    fn on_move(&mut self, surface: &mut Surface, x: f64, y: f64) -> bool {
        let point = Coordinate::new(x, y);
        let single = self.track.len() == 1;
        if !self.track.record(point) {
            return false;
        }

        // Pulling the start inward hides the restart blip.
        if single {
            if let Some(first) = self.track.first() {
                let angle = (point.y - first.y).atan2(point.x - first.x);
                self.track.set_first(Coordinate::new(
                    first.x + FIRST_SHIFT * angle.cos(),
                    first.y + FIRST_SHIFT * angle.sin(),
                ));
            }
        }

        if !self.track.is_due_for_commit() {
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

    fn render_preview(&self, target: &mut Surface) {
        if !self.has_preview() {
            return;
        }
        let Some(stamp) = &self.stamp else {
            return;
        };
        let half = Self::stamp_half();
        for p in self.track.points() {
            let h = half as f64;
            if !reaches_tile(Rect::new(p.x - h, p.y - h, p.x + h, p.y + h), 0.0) {
                continue;
            }
            target.draw_surface(stamp, p.x.round() as i32 - half, p.y.round() as i32 - half);
        }
    }

    fn has_preview(&self) -> bool {
        self.track.has_pending()
    }

    fn set_color(&mut self, color: Color) {
        self.color = color;
        self.stamp = Self::make_stamp(color);
    }
}
