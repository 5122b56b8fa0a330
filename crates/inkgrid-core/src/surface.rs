//! Raster drawing surfaces backing each tile layer.

use crate::geometry::TILE_SIZE;
use thiserror::Error;
use tiny_skia::{Pixmap, PixmapPaint, PremultipliedColorU8, Transform};

/// Surface errors.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Failed to allocate a {width}x{height} surface")]
    Allocation { width: u32, height: u32 },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Encode error: {0}")]
    Encode(String),
}

/// Result type for surface operations.
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// An RGBA (premultiplied) pixel surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pixmap: Pixmap,
}

impl Surface {
    /// Create a transparent surface.
    pub fn new(width: u32, height: u32) -> SurfaceResult<Self> {
        Pixmap::new(width, height)
            .map(|pixmap| Self { pixmap })
            .ok_or(SurfaceError::Allocation { width, height })
    }

    /// Create a transparent tile-sized surface.
    pub fn tile() -> SurfaceResult<Self> {
        Self::new(TILE_SIZE as u32, TILE_SIZE as u32)
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    /// Draw `other` over this surface with its top-left corner at `(x, y)`.
    pub fn draw_surface(&mut self, other: &Surface, x: i32, y: i32) {
        self.pixmap.draw_pixmap(
            x,
            y,
            other.pixmap.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    /// True if no pixel has any coverage.
    pub fn is_blank(&self) -> bool {
        self.pixmap.pixels().iter().all(|p| p.alpha() == 0)
    }

    /// Pixel at `(x, y)`, or `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<PremultipliedColorU8> {
        self.pixmap.pixel(x, y)
    }

    /// Alpha at `(x, y)`; zero outside the surface.
    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.pixel(x, y).map(|p| p.alpha()).unwrap_or(0)
    }

    /// Number of pixels with non-zero alpha.
    pub fn coverage(&self) -> usize {
        self.pixmap.pixels().iter().filter(|p| p.alpha() > 0).count()
    }

    /// Encode as PNG.
    pub fn encode_png(&self) -> SurfaceResult<Vec<u8>> {
        self.pixmap
            .encode_png()
            .map_err(|e| SurfaceError::Encode(e.to_string()))
    }

    /// Decode a PNG of any size.
    pub fn decode_png(bytes: &[u8]) -> SurfaceResult<Self> {
        Pixmap::decode_png(bytes)
            .map(|pixmap| Self { pixmap })
            .map_err(|e| SurfaceError::Decode(e.to_string()))
    }

    /// Decode a PNG that must be exactly tile-sized.
    pub fn decode_tile_png(bytes: &[u8]) -> SurfaceResult<Self> {
        let surface = Self::decode_png(bytes)?;
        let expected = TILE_SIZE as u32;
        if surface.width() != expected || surface.height() != expected {
            return Err(SurfaceError::Decode(format!(
                "expected a {expected}x{expected} tile, got {}x{}",
                surface.width(),
                surface.height()
            )));
        }
        Ok(surface)
    }

    /// Separable box blur with clamped edges.
    pub fn box_blur(&mut self, radius: u32) {
        if radius == 0 {
            return;
        }
        let w = self.width() as usize;
        let h = self.height() as usize;
        if w == 0 || h == 0 {
            return;
        }

        let r = radius as i64;
        let kernel = (2 * r + 1) as u32;
        let src = self.pixmap.data().to_vec();

        // Horizontal pass
        let mut h_buf = vec![0u32; w * h * 4];
        for y in 0..h {
            for x in 0..w {
                let mut sums = [0u32; 4];
                for k in -r..=r {
                    let sx = (x as i64 + k).clamp(0, w as i64 - 1) as usize;
                    let si = (y * w + sx) * 4;
                    for c in 0..4 {
                        sums[c] += src[si + c] as u32;
                    }
                }
                let oi = (y * w + x) * 4;
                h_buf[oi..oi + 4].copy_from_slice(&sums);
            }
        }

        // Vertical pass
        let dst = self.pixmap.data_mut();
        let norm = kernel * kernel;
        for y in 0..h {
            for x in 0..w {
                let mut sums = [0u32; 4];
                for k in -r..=r {
                    let sy = (y as i64 + k).clamp(0, h as i64 - 1) as usize;
                    let si = (sy * w + x) * 4;
                    for c in 0..4 {
                        sums[c] += h_buf[si + c];
                    }
                }
                let oi = (y * w + x) * 4;
                let alpha = (sums[3] / norm).min(255);
                // Keep premultiplied channels <= alpha.
                for c in 0..3 {
                    dst[oi + c] = (sums[c] / norm).min(alpha) as u8;
                }
                dst[oi + 3] = alpha as u8;
            }
        }
    }

    pub(crate) fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::{Color, Paint, PathBuilder, Rect as SkRect};

    fn filled_square(x: f32, y: f32, size: f32) -> Surface {
        let mut surface = Surface::tile().unwrap();
        let mut paint = Paint::default();
        paint.set_color(Color::from_rgba8(200, 0, 0, 255));
        let rect = SkRect::from_xywh(x, y, size, size).unwrap();
        surface
            .pixmap_mut()
            .fill_rect(rect, &paint, Transform::identity(), None);
        surface
    }

    #[test]
    fn test_new_tile_is_blank() {
        let surface = Surface::tile().unwrap();
        assert_eq!(surface.width(), TILE_SIZE as u32);
        assert!(surface.is_blank());
    }

    #[test]
    fn test_zero_size_allocation_fails() {
        assert!(matches!(
            Surface::new(0, 10),
            Err(SurfaceError::Allocation { width: 0, height: 10 })
        ));
    }

    #[test]
    fn test_png_roundtrip_preserves_pixels() {
        let surface = filled_square(10.0, 10.0, 20.0);
        let bytes = surface.encode_png().unwrap();
        let decoded = Surface::decode_tile_png(&bytes).unwrap();
        assert_eq!(decoded, surface);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Surface::decode_png(b"not a png").is_err());
    }

    #[test]
    fn test_decode_tile_rejects_wrong_size() {
        let small = Surface::new(16, 16).unwrap();
        let bytes = small.encode_png().unwrap();
        assert!(matches!(
            Surface::decode_tile_png(&bytes),
            Err(SurfaceError::Decode(_))
        ));
    }

    #[test]
    fn test_draw_surface_offsets() {
        let src = filled_square(0.0, 0.0, 4.0);
        let mut dst = Surface::tile().unwrap();
        dst.draw_surface(&src, 100, 50);

        assert_eq!(dst.alpha_at(101, 51), 255);
        assert_eq!(dst.alpha_at(1, 1), 0);
    }

    #[test]
    fn test_clear() {
        let mut surface = filled_square(0.0, 0.0, 30.0);
        assert!(!surface.is_blank());
        surface.clear();
        assert!(surface.is_blank());
    }

    #[test]
    fn test_box_blur_spreads_coverage() {
        let mut surface = filled_square(100.0, 100.0, 10.0);
        let before = surface.coverage();
        surface.box_blur(3);

        assert!(surface.coverage() > before);
        assert!(surface.alpha_at(105, 105) > 0);
        assert!(surface.alpha_at(105, 105) <= 255);
        assert_eq!(surface.alpha_at(10, 10), 0);
    }
}
