//! Visible window onto the canvas.

use crate::geometry::{Coordinate, TILE_SIZE, TileCoord, align};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// The visible part of the canvas.
///
/// `offset` is the canvas position shown at the screen's top-left corner, so
/// a canvas point is drawn at `point - offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub offset: Vec2,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            offset: Vec2::ZERO,
        }
    }
}

impl Viewport {
    pub fn new(width: u32, height: u32, offset: Vec2) -> Self {
        Self {
            width,
            height,
            offset,
        }
    }

    /// Convert a screen point to canvas coordinates.
    pub fn screen_to_canvas(&self, screen: Point) -> Point {
        screen + self.offset
    }

    /// Convert a canvas point to screen coordinates.
    pub fn canvas_to_screen(&self, canvas: Point) -> Point {
        canvas - self.offset
    }

    /// Move the view by `delta` canvas pixels.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Offset rounded to whole pixels, as used for blitting.
    pub fn pixel_offset(&self) -> Coordinate<i64> {
        Coordinate::new(self.offset.x.round() as i64, self.offset.y.round() as i64)
    }

    /// Canvas region that must be resident: the view grown by one tile on
    /// every side.
    pub fn resident_range(&self) -> ResidentRange {
        let origin = self.pixel_offset();
        ResidentRange {
            min: Coordinate::new(origin.x - TILE_SIZE, origin.y - TILE_SIZE),
            max: Coordinate::new(
                origin.x + self.width as i64 + TILE_SIZE,
                origin.y + self.height as i64 + TILE_SIZE,
            ),
        }
    }
}

/// Half-open canvas rectangle `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidentRange {
    pub min: Coordinate<i64>,
    pub max: Coordinate<i64>,
}

impl ResidentRange {
    /// True if the tile keyed by `coord` overlaps the range.
    pub fn contains_tile(&self, coord: TileCoord) -> bool {
        coord.x + TILE_SIZE > self.min.x
            && coord.x < self.max.x
            && coord.y + TILE_SIZE > self.min.y
            && coord.y < self.max.y
    }

    /// Every tile key overlapping the range, in x-then-y order.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let xs = (align(self.min.x)..self.max.x).step_by(TILE_SIZE as usize);
        xs.flat_map(move |x| {
            (align(self.min.y)..self.max.y)
                .step_by(TILE_SIZE as usize)
                .map(move |y| Coordinate::new(x, y))
        })
    }
}
