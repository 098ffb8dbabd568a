//! User-facing off-screen canvases. A canvas owns its backing surface through
//! a shared ref plus its own frame pipeline: drawing calls are recorded and
//! applied by `render()`, and pixel-mutating paths detach a private copy of
//! the surface while a queued draw-canvas command still references it.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::cache::FrameCache;
use crate::font::{FontGroup, Tab};
use crate::geometry::{PolySegment, Rect};
use crate::surface::{DrawTarget, PixelFormat, ScaleMode, Surface};
use crate::{Color, Result};

/// Output format for [`Canvas::save_image`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SaveFormat {
    Png,
    Jpg,
    Avif,
}

/// An off-screen drawing surface with copy-on-write semantics while queued
/// inside a command buffer. `version` increments on every mutating call and
/// keys draw-canvas commands into the dirty grid of their destination.
pub struct Canvas {
    width: i32,
    height: i32,
    version: u64,
    surface: Rc<RefCell<Surface>>,
    cache: FrameCache,
}

impl Canvas {
    /// Creates a canvas filled with `color`; transparent canvases are RGBA32,
    /// opaque ones RGB24.
    pub fn new(width: i32, height: i32, color: Color, transparent: bool) -> Result<Self> {
        let format = if transparent { PixelFormat::Rgba32 } else { PixelFormat::Rgb24 };
        let mut surface = Surface::new(width, height, format)?;
        surface.fill_rect(surface.bounds(), color, true);
        Ok(Self::from_surface(surface))
    }

    pub(crate) fn from_surface(surface: Surface) -> Self {
        let (width, height) = (surface.width(), surface.height());
        Self {
            width,
            height,
            version: 0,
            surface: Rc::new(RefCell::new(surface)),
            cache: FrameCache::new(Rect::of_size(width, height)),
        }
    }

    /// Decodes an image file into an RGBA32 canvas.
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Self> {
        let decoded = image::open(path)?.to_rgba8();
        let (width, height) = (decoded.width() as i32, decoded.height() as i32);
        let surface = Surface::from_pixels(
            width,
            height,
            PixelFormat::Rgba32,
            width as usize * 4,
            decoded.as_raw(),
        )?;
        Ok(Self::from_surface(surface))
    }

    pub fn get_size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn surface_ref(&self) -> &Rc<RefCell<Surface>> {
        &self.surface
    }

    /// Detaches a private copy of the backing surface if a queued command
    /// still pins the current one. Must precede any pixel mutation.
    fn make_unique(&mut self) {
        if Rc::strong_count(&self.surface) > 1 {
            let copy = self.surface.borrow().clone();
            self.surface = Rc::new(RefCell::new(copy));
        }
    }

    /// Reads a block as packed RGBA32 bytes (row-major, pitch = w × 4).
    /// Pending drawing calls are not flushed; call [`render`](Self::render)
    /// first to include them.
    pub fn get_pixels(&self, x: i32, y: i32, w: i32, h: i32) -> Vec<u8> {
        self.surface.borrow().read_rgba(Rect::new(x, y, w, h))
    }

    /// Overwrites a block from packed RGBA32 bytes, no blending. The byte
    /// length must be exactly `w × h × 4`.
    pub fn set_pixels(&mut self, bytes: &[u8], x: i32, y: i32, w: i32, h: i32) -> Result<()> {
        self.make_unique();
        self.surface
            .borrow_mut()
            .write_rgba(Rect::new(x, y, w, h), bytes)?;
        self.version += 1;
        Ok(())
    }

    /// Copies a region into a new canvas, optionally rescaled. A full-rect
    /// same-size copy duplicates the surface; a full-rect resize goes through
    /// a scaled duplicate; sub-rects fall back to a scaled blit.
    // TODO: make copies copy-on-write so full-surface copies don't duplicate
    // pixels up front.
    #[allow(clippy::too_many_arguments)]
    pub fn copy(
        &self,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        new_w: i32,
        new_h: i32,
        mode: ScaleMode,
    ) -> Result<Canvas> {
        let source = self.surface.borrow();
        let full = x == 0 && y == 0 && w == self.width && h == self.height;
        let scaled = new_w != w || new_h != h;
        let surface = if full && !scaled {
            source.duplicate()
        } else if full {
            source.scale(new_w, new_h, mode)?
        } else {
            let mut out = Surface::new(new_w, new_h, source.format())?;
            out.blit_scaled(
                &source,
                Some(Rect::new(x, y, w, h)),
                Rect::of_size(new_w, new_h),
                mode,
            );
            out
        };
        Ok(Canvas::from_surface(surface))
    }

    /// Convenience over [`copy`](Self::copy) for a full-surface resize.
    pub fn scaled(&self, new_w: i32, new_h: i32, mode: ScaleMode) -> Result<Canvas> {
        self.copy(0, 0, self.width, self.height, new_w, new_h, mode)
    }

    /// Records a full clear. Without a color the canvas clears to transparent
    /// black.
    pub fn clear(&mut self, color: Option<Color>) {
        let color = color.unwrap_or(Color::transparent());
        self.cache
            .draw_rect(Rect::of_size(self.width, self.height), color, true);
        self.version += 1;
    }

    pub fn set_clip_rect(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.cache.set_clip_rect(Rect::new(x, y, w, h));
    }

    pub fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Color) {
        self.cache.draw_rect(Rect::new(x, y, w, h), color, false);
        self.version += 1;
    }

    /// Records a text run; returns the pen x after the run.
    pub fn draw_text(&mut self, fonts: &FontGroup, text: &str, x: f64, y: f64, color: Color, tab: Tab) -> f64 {
        let end = self.cache.draw_text(fonts, text, x, y, color, tab, 1.0);
        self.version += 1;
        end
    }

    /// Records a polygon; returns its bounding box.
    pub fn draw_poly(&mut self, segments: &[PolySegment], color: Color) -> Result<Rect> {
        let bbox = self.cache.draw_poly(segments, color)?;
        self.version += 1;
        Ok(bbox)
    }

    /// Records a blit of another canvas at (x, y).
    pub fn draw_canvas(&mut self, src: &Canvas, x: i32, y: i32, blend: bool) {
        let rect = Rect::new(x, y, src.width, src.height);
        self.cache.draw_canvas(src.surface_ref(), src.version, rect, blend);
        self.version += 1;
    }

    /// Applies every recorded drawing call to the backing surface and reopens
    /// recording for the next batch.
    pub fn render(&mut self) {
        self.make_unique();
        {
            let mut surface = self.surface.borrow_mut();
            let mut target = DrawTarget {
                surface: &mut surface,
                scale_x: 1.0,
                scale_y: 1.0,
            };
            self.cache.end_frame(&mut target);
        }
        self.cache.begin_frame((self.width, self.height));
    }

    /// Encodes the backing surface to disk. `quality` applies to the lossy
    /// formats and defaults to 100.
    pub fn save_image<P: AsRef<Path>>(
        &self,
        path: P,
        format: SaveFormat,
        quality: Option<u8>,
    ) -> Result<()> {
        let quality = quality.unwrap_or(100).clamp(1, 100);
        let surface = self.surface.borrow();
        let rgba = surface.read_rgba(surface.bounds());
        let (w, h) = (self.width as u32, self.height as u32);
        let file = std::fs::File::create(path.as_ref())?;
        match format {
            SaveFormat::Png => {
                PngEncoder::new(file).write_image(&rgba, w, h, ExtendedColorType::Rgba8)?;
            }
            SaveFormat::Jpg => {
                let rgb: Vec<u8> = rgba.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect();
                JpegEncoder::new_with_quality(file, quality)
                    .write_image(&rgb, w, h, ExtendedColorType::Rgb8)?;
            }
            SaveFormat::Avif => {
                AvifEncoder::new_with_speed_quality(file, 4, quality)
                    .write_image(&rgba, w, h, ExtendedColorType::Rgba8)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn new_canvas_is_filled() {
        let canvas = Canvas::new(4, 4, Color::rgb(10, 20, 30), true).unwrap();
        assert_eq!(canvas.get_pixels(0, 0, 1, 1), vec![10, 20, 30, 255]);
    }

    #[test]
    fn opaque_canvas_uses_rgb24() {
        let canvas = Canvas::new(4, 4, Color::black(), false).unwrap();
        assert_eq!(canvas.surface.borrow().format(), PixelFormat::Rgb24);
    }

    #[test]
    fn set_then_get_pixels_round_trips() {
        let mut canvas = Canvas::new(4, 4, Color::black(), true).unwrap();
        let block = canvas.get_pixels(1, 1, 2, 2);
        canvas.set_pixels(&block, 1, 1, 2, 2).unwrap();
        let before = canvas.get_pixels(0, 0, 4, 4);
        canvas.set_pixels(&block, 1, 1, 2, 2).unwrap();
        assert_eq!(canvas.get_pixels(0, 0, 4, 4), before);
    }

    #[test]
    fn set_pixels_rejects_wrong_length() {
        let mut canvas = Canvas::new(4, 4, Color::black(), true).unwrap();
        let err = canvas.set_pixels(&[0u8; 7], 0, 0, 2, 2).unwrap_err();
        assert!(matches!(err, ErrorKind::PixelDataSizeMismatch { .. }));
    }

    #[test]
    fn full_copy_is_byte_identical() {
        let mut canvas = Canvas::new(6, 5, Color::rgb(1, 2, 3), true).unwrap();
        canvas.draw_rect(1, 1, 3, 2, Color::rgb(200, 100, 50));
        canvas.render();
        let copy = canvas.copy(0, 0, 6, 5, 6, 5, ScaleMode::Nearest).unwrap();
        assert_eq!(copy.get_pixels(0, 0, 6, 5), canvas.get_pixels(0, 0, 6, 5));
    }

    #[test]
    fn scaled_copy_changes_dimensions() {
        let canvas = Canvas::new(4, 4, Color::rgb(9, 9, 9), true).unwrap();
        let scaled = canvas.scaled(8, 2, ScaleMode::Nearest).unwrap();
        assert_eq!(scaled.get_size(), (8, 2));
        assert_eq!(scaled.get_pixels(7, 1, 1, 1), vec![9, 9, 9, 255]);
    }

    #[test]
    fn version_increments_on_mutation() {
        let mut canvas = Canvas::new(4, 4, Color::black(), true).unwrap();
        let v0 = canvas.version();
        canvas.draw_rect(0, 0, 2, 2, Color::white());
        assert!(canvas.version() > v0);
        let v1 = canvas.version();
        canvas.set_pixels(&[0u8; 4], 0, 0, 1, 1).unwrap();
        assert!(canvas.version() > v1);
    }

    #[test]
    fn render_applies_queued_draws() {
        let mut canvas = Canvas::new(8, 8, Color::black(), true).unwrap();
        canvas.draw_rect(2, 2, 2, 2, Color::rgb(255, 0, 0));
        assert_eq!(canvas.get_pixels(2, 2, 1, 1), vec![0, 0, 0, 255]);
        canvas.render();
        assert_eq!(canvas.get_pixels(2, 2, 1, 1), vec![255, 0, 0, 255]);
    }

    #[test]
    fn render_twice_supports_batches() {
        let mut canvas = Canvas::new(8, 8, Color::black(), true).unwrap();
        canvas.draw_rect(0, 0, 1, 1, Color::rgb(1, 1, 1));
        canvas.render();
        canvas.draw_rect(1, 0, 1, 1, Color::rgb(2, 2, 2));
        canvas.render();
        assert_eq!(canvas.get_pixels(0, 0, 1, 1), vec![1, 1, 1, 255]);
        assert_eq!(canvas.get_pixels(1, 0, 1, 1), vec![2, 2, 2, 255]);
    }

    #[test]
    fn clear_defaults_to_transparent_black() {
        let mut canvas = Canvas::new(4, 4, Color::rgb(50, 60, 70), true).unwrap();
        canvas.clear(None);
        canvas.render();
        assert_eq!(canvas.get_pixels(0, 0, 1, 1), vec![0, 0, 0, 0]);
    }

    #[test]
    fn canvas_to_canvas_blit_respects_blend_flag() {
        let mut dst = Canvas::new(4, 4, Color::rgb(0, 0, 255), true).unwrap();
        let src = Canvas::new(2, 2, Color::rgba(255, 0, 0, 0), true).unwrap();
        // fully transparent source with blending leaves the destination
        dst.draw_canvas(&src, 0, 0, true);
        dst.render();
        assert_eq!(dst.get_pixels(0, 0, 1, 1), vec![0, 0, 255, 255]);
        // without blending the raw transparent bytes replace it
        dst.draw_canvas(&src, 0, 0, false);
        dst.render();
        assert_eq!(dst.get_pixels(0, 0, 1, 1), vec![255, 0, 0, 0]);
    }

    #[test]
    fn cow_detach_preserves_pinned_bytes() {
        let mut dst = Canvas::new(4, 4, Color::black(), true).unwrap();
        let mut src = Canvas::new(2, 2, Color::rgb(255, 0, 0), true).unwrap();
        dst.draw_canvas(&src, 0, 0, true);
        // mutate the source while the destination still pins it
        src.set_pixels(&[0, 0, 255, 255].repeat(4), 0, 0, 2, 2).unwrap();
        dst.render();
        assert_eq!(dst.get_pixels(0, 0, 1, 1), vec![255, 0, 0, 255]);
        assert_eq!(src.get_pixels(0, 0, 1, 1), vec![0, 0, 255, 255]);
    }
}
