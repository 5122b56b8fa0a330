//! Sketching pencil.
//!
//! Shades into the inside of corners while drawing: every sample sketches
//! curves from a few earlier samples to the current one, pulled toward the
//! drawn path. Faster movement gives larger but sparser shading.

use super::{
    BrushTrait, CULL_BUFFER, DOT_RADIUS, MIN_SAMPLE_DISTANCE, culled_dot, reaches_tile, solid_paint,
    with_alpha,
};
use crate::geometry::{Coordinate, Segment, distance, midpoint};
use crate::surface::Surface;
use peniko::Color;
use tiny_skia::{LineCap, PathBuilder, Stroke, Transform};

const WIDTH: f32 = 3.0;
const ALPHA: u8 = 100;

/// Moves longer than this are split at their midpoint.
const SUBDIVIDE_DISTANCE: f64 = 64.0;

/// Samples that take part in shading.
const SHADING_SPAN: usize = 6;

#[derive(Debug, Clone)]
pub struct PencilBrush {
    recent: Vec<Coordinate<f64>>,
    samples: usize,
    color: Color,
}

impl Default for PencilBrush {
    fn default() -> Self {
        Self::new()
    }
}

impl PencilBrush {
    pub fn new() -> Self {
        Self {
            recent: Vec::with_capacity(SHADING_SPAN + 1),
            samples: 0,
            color: Color::from_rgba8(0, 0, 0, ALPHA),
        }
    }

    fn reach() -> f64 {
        CULL_BUFFER + WIDTH as f64 / 2.0
    }

    fn record(&mut self, surface: &mut Surface, cur: Coordinate<f64>) -> bool {
        let mut changed = false;

        if let Some(prev) = self.recent.last().copied() {
            if (cur.x - prev.x).abs() < MIN_SAMPLE_DISTANCE
                && (cur.y - prev.y).abs() < MIN_SAMPLE_DISTANCE
            {
                return false;
            }
            if distance(prev, cur) > SUBDIVIDE_DISTANCE {
                changed |= self.record(surface, midpoint(prev, cur));
            }
        }

        self.recent.push(cur);
        self.samples += 1;
        if self.recent.len() > SHADING_SPAN {
            self.recent.remove(0);
        }

        changed | self.shade(surface, cur)
    }

    /// Sketch from every other recent sample to `cur`, each curve anchored on
    /// the mean of the samples it spans.
    fn shade(&self, surface: &mut Surface, cur: Coordinate<f64>) -> bool {
        let len = self.recent.len();
        let mut pb = PathBuilder::new();
        let mut any = false;

        for i in (0..len.saturating_sub(1)).step_by(2) {
            let span = &self.recent[i..];
            let n = span.len() as f64;
            let anchor = Coordinate::new(
                span.iter().map(|p| p.x).sum::<f64>() / n,
                span.iter().map(|p| p.y).sum::<f64>() / n,
            );
            let from = self.recent[i];
            if !reaches_tile(Segment::Quad(from, anchor, cur).bounds(), Self::reach()) {
                continue;
            }
            pb.move_to(from.x as f32, from.y as f32);
            pb.quad_to(anchor.x as f32, anchor.y as f32, cur.x as f32, cur.y as f32);
            any = true;
        }

        if !any {
            return false;
        }
        let Some(path) = pb.finish() else {
            return false;
        };

        let paint = solid_paint(with_alpha(self.color, ALPHA));
        let stroke = Stroke {
            width: WIDTH,
            line_cap: LineCap::Round,
            ..Stroke::default()
        };
        surface
            .pixmap_mut()
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        true
    }

    fn dot(&self, surface: &mut Surface, at: Coordinate<f64>) -> bool {
        let paint = solid_paint(with_alpha(self.color, ALPHA));
        let mut drew = false;
        for center in [at, Coordinate::new(at.x - 2.0, at.y - 1.0)] {
            if let Some(path) = culled_dot(center, DOT_RADIUS, 0.0) {
                surface.pixmap_mut().fill_path(
                    &path,
                    &paint,
                    tiny_skia::FillRule::Winding,
                    Transform::identity(),
                    None,
                );
                drew = true;
            }
        }
        drew
    }
}

impl BrushTrait for PencilBrush {
    fn on_move(&mut self, surface: &mut Surface, x: f64, y: f64) -> bool {
        self.record(surface, Coordinate::new(x, y))
    }

    fn on_release(&mut self, surface: &mut Surface) -> bool {
        let changed = match (self.samples, self.recent.first().copied()) {
            (1, Some(at)) => self.dot(surface, at),
            _ => false,
        };
        self.recent.clear();
        self.samples = 0;
        changed
    }

    // Pencil strokes are cheap enough to commit as they are sampled.
    fn render_preview(&self, _target: &mut Surface) {}

    fn has_preview(&self) -> bool {
        false
    }

    fn set_color(&mut self, color: Color) {
        self.color = color;
    }
}
