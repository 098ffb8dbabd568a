use crate::geometry::Rect;
use crate::{Color, ErrorKind, Result};

/// Pixel layout of a [`Surface`]. Byte order within a pixel is fixed
/// (R, G, B, A for `Rgba32`; R, G, B for `Rgb24`) so that blend math and the
/// packed byte strings exchanged with canvases always agree.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    Rgba32,
    Rgb24,
    /// Single coverage byte per pixel; used for glyph atlas pages.
    Gray8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba32 => 4,
            Self::Rgb24 => 3,
            Self::Gray8 => 1,
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba32)
    }
}

/// Filter used when blitting or copying between differently sized rects.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ScaleMode {
    Nearest,
    #[default]
    Linear,
}

/// Composition mode for surface-to-surface blits.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum BlendMode {
    /// Source-over using the source alpha.
    #[default]
    Blend,
    /// Raw copy, converting between pixel formats where needed.
    None,
}

/// A mutable 2D pixel buffer. Rows are tightly packed (`pitch` is the row
/// stride in bytes and always ≥ `width × bytes_per_pixel`); the clip rect is
/// kept a subset of the surface bounds and every write goes through it.
#[derive(Clone)]
pub struct Surface {
    width: i32,
    height: i32,
    format: PixelFormat,
    pitch: usize,
    pixels: Vec<u8>,
    clip: Rect,
}

impl Surface {
    pub fn new(width: i32, height: i32, format: PixelFormat) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(ErrorKind::GeneralError(format!(
                "invalid surface size {width}x{height}"
            )));
        }
        let pitch = width as usize * format.bytes_per_pixel();
        let len = pitch * height as usize;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|_| ErrorKind::OutOfMemory)?;
        pixels.resize(len, 0);
        Ok(Self {
            width,
            height,
            format,
            pitch,
            pixels,
            clip: Rect::of_size(width, height),
        })
    }

    /// Creates a surface from caller-supplied pixel rows with an arbitrary
    /// pitch. The data is copied and re-packed; rows shorter than the pitch
    /// requirement report an error rather than reading out of bounds.
    pub fn from_pixels(
        width: i32,
        height: i32,
        format: PixelFormat,
        pitch: usize,
        data: &[u8],
    ) -> Result<Self> {
        let mut surface = Self::new(width, height, format)?;
        let row_bytes = width as usize * format.bytes_per_pixel();
        if pitch < row_bytes || data.len() < pitch * (height as usize - 1) + row_bytes {
            return Err(ErrorKind::PixelDataSizeMismatch {
                expected: pitch * height as usize,
                got: data.len(),
            });
        }
        for y in 0..height as usize {
            let src = &data[y * pitch..y * pitch + row_bytes];
            surface.pixels[y * surface.pitch..y * surface.pitch + row_bytes].copy_from_slice(src);
        }
        Ok(surface)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn bounds(&self) -> Rect {
        Rect::of_size(self.width, self.height)
    }

    pub fn clip(&self) -> Rect {
        self.clip
    }

    /// Sets the clip rect, constrained to the surface bounds.
    pub fn set_clip(&mut self, rect: Rect) {
        self.clip = rect.intersect(self.bounds());
    }

    pub fn reset_clip(&mut self) {
        self.clip = self.bounds();
    }

    /// Full copy with the clip reset to the whole surface.
    pub fn duplicate(&self) -> Surface {
        let mut copy = self.clone();
        copy.reset_clip();
        copy
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub(crate) fn row(&self, y: i32) -> &[u8] {
        let start = y as usize * self.pitch;
        &self.pixels[start..start + self.pitch]
    }

    pub(crate) fn row_mut(&mut self, y: i32) -> &mut [u8] {
        let start = y as usize * self.pitch;
        &mut self.pixels[start..start + self.pitch]
    }

    fn read_pixel(&self, x: i32, y: i32) -> [u8; 4] {
        let bpp = self.format.bytes_per_pixel();
        let row = self.row(y);
        let p = &row[x as usize * bpp..];
        match self.format {
            PixelFormat::Rgba32 => [p[0], p[1], p[2], p[3]],
            PixelFormat::Rgb24 => [p[0], p[1], p[2], 255],
            PixelFormat::Gray8 => [p[0], p[0], p[0], 255],
        }
    }

    fn write_pixel(&mut self, x: i32, y: i32, rgba: [u8; 4]) {
        let bpp = self.format.bytes_per_pixel();
        let format = self.format;
        let row = self.row_mut(y);
        let p = &mut row[x as usize * bpp..];
        match format {
            PixelFormat::Rgba32 => p[..4].copy_from_slice(&rgba),
            PixelFormat::Rgb24 => p[..3].copy_from_slice(&rgba[..3]),
            PixelFormat::Gray8 => p[0] = rgba[0],
        }
    }

    /// Fills a pixel-space rect with `color`. With `replace` the raw bytes are
    /// written (alpha included); otherwise a zero alpha is a no-op, an opaque
    /// color fills directly, and anything in between composes source-over.
    pub fn fill_rect(&mut self, rect: Rect, color: Color, replace: bool) {
        let rect = rect.intersect(self.clip);
        if rect.is_empty() {
            return;
        }
        if replace || color.a == 255 {
            for y in rect.y..rect.y + rect.height {
                for x in rect.x..rect.x + rect.width {
                    self.write_pixel(x, y, color.to_array());
                }
            }
            return;
        }
        if color.a == 0 {
            return;
        }
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                let dst = self.read_pixel(x, y);
                self.write_pixel(x, y, blend_solid(color, dst, self.format.has_alpha()));
            }
        }
    }

    /// Copies `src_rect` (or the whole of `src`) to `(dx, dy)`, clipped to
    /// this surface's clip rect. Empty or inverted source rects return
    /// without error.
    pub fn blit(&mut self, src: &Surface, src_rect: Option<Rect>, dx: i32, dy: i32, blend: BlendMode) {
        let src_rect = src_rect
            .unwrap_or_else(|| src.bounds())
            .intersect(src.bounds());
        if src_rect.width <= 0 || src_rect.height <= 0 {
            return;
        }
        let dst_rect = Rect::new(dx, dy, src_rect.width, src_rect.height).intersect(self.clip);
        if dst_rect.is_empty() {
            return;
        }
        let off_x = dst_rect.x - dx;
        let off_y = dst_rect.y - dy;
        for y in 0..dst_rect.height {
            for x in 0..dst_rect.width {
                let sp = src.read_pixel(src_rect.x + off_x + x, src_rect.y + off_y + y);
                let (tx, ty) = (dst_rect.x + x, dst_rect.y + y);
                match blend {
                    BlendMode::None => self.write_pixel(tx, ty, sp),
                    BlendMode::Blend => {
                        if sp[3] == 255 {
                            self.write_pixel(tx, ty, sp);
                        } else if sp[3] > 0 {
                            let dst = self.read_pixel(tx, ty);
                            self.write_pixel(tx, ty, blend_over(sp, dst, self.format.has_alpha()));
                        }
                    }
                }
            }
        }
    }

    /// Stretches `src_rect` (or the whole of `src`) onto `dst_rect` with the
    /// given filter. No blending is applied.
    pub fn blit_scaled(
        &mut self,
        src: &Surface,
        src_rect: Option<Rect>,
        dst_rect: Rect,
        mode: ScaleMode,
    ) {
        let src_rect = src_rect
            .unwrap_or_else(|| src.bounds())
            .intersect(src.bounds());
        if src_rect.width <= 0 || src_rect.height <= 0 || dst_rect.width <= 0 || dst_rect.height <= 0 {
            return;
        }
        let clipped = dst_rect.intersect(self.clip);
        if clipped.is_empty() {
            return;
        }
        for y in clipped.y..clipped.y + clipped.height {
            for x in clipped.x..clipped.x + clipped.width {
                let u = (x - dst_rect.x) as f32 / dst_rect.width as f32;
                let v = (y - dst_rect.y) as f32 / dst_rect.height as f32;
                let rgba = match mode {
                    ScaleMode::Nearest => src.sample_nearest(src_rect, u, v),
                    ScaleMode::Linear => src.sample_linear(src_rect, u, v),
                };
                self.write_pixel(x, y, rgba);
            }
        }
    }

    /// Returns a copy of this surface stretched to `new_w` × `new_h`.
    pub fn scale(&self, new_w: i32, new_h: i32, mode: ScaleMode) -> Result<Surface> {
        let mut out = Surface::new(new_w, new_h, self.format)?;
        out.blit_scaled(self, None, Rect::of_size(new_w, new_h), mode);
        Ok(out)
    }

    fn sample_nearest(&self, rect: Rect, u: f32, v: f32) -> [u8; 4] {
        let x = rect.x + ((u * rect.width as f32) as i32).clamp(0, rect.width - 1);
        let y = rect.y + ((v * rect.height as f32) as i32).clamp(0, rect.height - 1);
        self.read_pixel(x, y)
    }

    fn sample_linear(&self, rect: Rect, u: f32, v: f32) -> [u8; 4] {
        let fx = (u * rect.width as f32 - 0.5).clamp(0.0, rect.width as f32 - 1.0);
        let fy = (v * rect.height as f32 - 0.5).clamp(0.0, rect.height as f32 - 1.0);
        let x0 = fx.floor() as i32;
        let y0 = fy.floor() as i32;
        let x1 = (x0 + 1).min(rect.width - 1);
        let y1 = (y0 + 1).min(rect.height - 1);
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;
        let p00 = self.read_pixel(rect.x + x0, rect.y + y0);
        let p10 = self.read_pixel(rect.x + x1, rect.y + y0);
        let p01 = self.read_pixel(rect.x + x0, rect.y + y1);
        let p11 = self.read_pixel(rect.x + x1, rect.y + y1);
        let mut out = [0u8; 4];
        for c in 0..4 {
            let top = p00[c] as f32 + (p10[c] as f32 - p00[c] as f32) * tx;
            let bottom = p01[c] as f32 + (p11[c] as f32 - p01[c] as f32) * tx;
            out[c] = (top + (bottom - top) * ty + 0.5) as u8;
        }
        out
    }

    /// Reads a rect as packed RGBA32 bytes (pitch = w × 4). Areas outside the
    /// surface read as transparent black.
    pub fn read_rgba(&self, rect: Rect) -> Vec<u8> {
        let mut out = vec![0u8; rect.width.max(0) as usize * rect.height.max(0) as usize * 4];
        let visible = rect.intersect(self.bounds());
        for y in 0..visible.height {
            for x in 0..visible.width {
                let rgba = self.read_pixel(visible.x + x, visible.y + y);
                let ox = (visible.x + x - rect.x) as usize;
                let oy = (visible.y + y - rect.y) as usize;
                let o = (oy * rect.width as usize + ox) * 4;
                out[o..o + 4].copy_from_slice(&rgba);
            }
        }
        out
    }

    /// Blends `color` into one pixel at the given antialiasing coverage. The
    /// destination alpha channel is left untouched.
    pub(crate) fn blend_coverage(&mut self, x: i32, y: i32, color: Color, cov: u8) {
        self.blend_coverage_rgb(x, y, color, [cov, cov, cov]);
    }

    /// Per-channel coverage blend used for LCD-subpixel glyphs; grayscale
    /// callers pass the same coverage on every channel.
    pub(crate) fn blend_coverage_rgb(&mut self, x: i32, y: i32, color: Color, cov: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let dst = self.read_pixel(x, y);
        let a = color.a as u32;
        let chan = |c: u8, s: u8, d: u8| -> u8 {
            ((c as u32 * s as u32 * a + d as u32 * (65025 - s as u32 * a) + 32767) / 65025) as u8
        };
        let out = [
            chan(color.r, cov[0], dst[0]),
            chan(color.g, cov[1], dst[1]),
            chan(color.b, cov[2], dst[2]),
            dst[3],
        ];
        self.write_pixel(x, y, out);
    }

    /// Overwrites a rect from packed RGBA32 bytes. No blending; the clip rect
    /// does not apply (this is the raw pixel-exchange path).
    pub fn write_rgba(&mut self, rect: Rect, data: &[u8]) -> Result<()> {
        let expected = rect.width.max(0) as usize * rect.height.max(0) as usize * 4;
        if data.len() != expected {
            return Err(ErrorKind::PixelDataSizeMismatch { expected, got: data.len() });
        }
        let visible = rect.intersect(self.bounds());
        for y in 0..visible.height {
            for x in 0..visible.width {
                let sx = (visible.x + x - rect.x) as usize;
                let sy = (visible.y + y - rect.y) as usize;
                let o = (sy * rect.width as usize + sx) * 4;
                let rgba = [data[o], data[o + 1], data[o + 2], data[o + 3]];
                self.write_pixel(visible.x + x, visible.y + y, rgba);
            }
        }
        Ok(())
    }
}

/// Source-over of a solid color at full coverage, using the renderer's
/// integer blend with 0.5 rounding bias.
fn blend_solid(color: Color, dst: [u8; 4], keep_alpha_channel: bool) -> [u8; 4] {
    let a = color.a as u32;
    let chan = |c: u8, d: u8| -> u8 {
        ((c as u32 * 255 * a + d as u32 * (65025 - 255 * a) + 32767) / 65025) as u8
    };
    let out_a = if keep_alpha_channel {
        (a + (dst[3] as u32 * (255 - a) + 127) / 255) as u8
    } else {
        dst[3]
    };
    [chan(color.r, dst[0]), chan(color.g, dst[1]), chan(color.b, dst[2]), out_a]
}

/// Source-over of one RGBA pixel onto another.
fn blend_over(src: [u8; 4], dst: [u8; 4], keep_alpha_channel: bool) -> [u8; 4] {
    let a = src[3] as u32;
    let chan = |s: u8, d: u8| -> u8 { ((s as u32 * a + d as u32 * (255 - a) + 127) / 255) as u8 };
    let out_a = if keep_alpha_channel {
        (a + (dst[3] as u32 * (255 - a) + 127) / 255) as u8
    } else {
        dst[3]
    };
    [chan(src[0], dst[0]), chan(src[1], dst[1]), chan(src[2], dst[2]), out_a]
}

/// A surface paired with the point-to-pixel scale factors of its target.
/// Draw operations take point-space coordinates and scale at the last moment.
pub struct DrawTarget<'a> {
    pub surface: &'a mut Surface,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl DrawTarget<'_> {
    /// Sets the surface clip from a point-space rect.
    pub fn set_clip(&mut self, rect: Rect) {
        self.surface.set_clip(rect.scaled(self.scale_x, self.scale_y));
    }

    /// Fills a point-space rect, honoring the current clip.
    pub fn draw_rect(&mut self, rect: Rect, color: Color, replace: bool) {
        if color.a == 0 && !replace {
            return;
        }
        self.surface
            .fill_rect(rect.scaled(self.scale_x, self.scale_y), color, replace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> Color {
        Color::rgb(255, 0, 0)
    }

    #[test]
    fn fill_respects_clip() {
        let mut s = Surface::new(10, 10, PixelFormat::Rgba32).unwrap();
        s.set_clip(Rect::new(0, 0, 5, 5));
        s.fill_rect(Rect::new(0, 0, 10, 10), red(), false);
        assert_eq!(s.read_rgba(Rect::new(4, 4, 1, 1)), vec![255, 0, 0, 255]);
        assert_eq!(s.read_rgba(Rect::new(5, 5, 1, 1)), vec![0, 0, 0, 0]);
    }

    #[test]
    fn empty_intersection_is_noop() {
        let mut s = Surface::new(4, 4, PixelFormat::Rgba32).unwrap();
        s.fill_rect(Rect::new(10, 10, 5, 5), red(), false);
        assert!(s.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn transparent_fill_is_noop_unless_replace() {
        let mut s = Surface::new(2, 2, PixelFormat::Rgba32).unwrap();
        s.fill_rect(s.bounds(), red(), false);
        s.fill_rect(s.bounds(), Color::transparent(), false);
        assert_eq!(s.read_rgba(Rect::new(0, 0, 1, 1)), vec![255, 0, 0, 255]);
        s.fill_rect(s.bounds(), Color::transparent(), true);
        assert_eq!(s.read_rgba(Rect::new(0, 0, 1, 1)), vec![0, 0, 0, 0]);
    }

    #[test]
    fn blend_half_alpha_over_black() {
        let mut s = Surface::new(1, 1, PixelFormat::Rgb24).unwrap();
        s.fill_rect(s.bounds(), Color::rgba(255, 0, 0, 128), false);
        let px = s.read_rgba(Rect::new(0, 0, 1, 1));
        assert_eq!(px[0], 128);
        assert_eq!(px[1], 0);
    }

    #[test]
    fn blit_converts_rgba_to_rgb() {
        let mut src = Surface::new(2, 2, PixelFormat::Rgba32).unwrap();
        src.fill_rect(src.bounds(), Color::rgba(1, 2, 3, 255), true);
        let mut dst = Surface::new(2, 2, PixelFormat::Rgb24).unwrap();
        dst.blit(&src, None, 0, 0, BlendMode::None);
        assert_eq!(dst.read_rgba(Rect::new(1, 1, 1, 1)), vec![1, 2, 3, 255]);
    }

    #[test]
    fn blit_with_negative_offset_clips() {
        let mut src = Surface::new(4, 4, PixelFormat::Rgba32).unwrap();
        src.fill_rect(src.bounds(), red(), true);
        let mut dst = Surface::new(4, 4, PixelFormat::Rgba32).unwrap();
        dst.blit(&src, None, -2, -2, BlendMode::None);
        assert_eq!(dst.read_rgba(Rect::new(1, 1, 1, 1)), vec![255, 0, 0, 255]);
        assert_eq!(dst.read_rgba(Rect::new(2, 2, 1, 1)), vec![0, 0, 0, 0]);
    }

    #[test]
    fn nearest_scale_doubles_pixels() {
        let mut src = Surface::new(2, 1, PixelFormat::Rgba32).unwrap();
        src.fill_rect(Rect::new(0, 0, 1, 1), red(), true);
        src.fill_rect(Rect::new(1, 0, 1, 1), Color::rgb(0, 0, 255), true);
        let scaled = src.scale(4, 1, ScaleMode::Nearest).unwrap();
        assert_eq!(scaled.read_rgba(Rect::new(1, 0, 1, 1)), vec![255, 0, 0, 255]);
        assert_eq!(scaled.read_rgba(Rect::new(2, 0, 1, 1)), vec![0, 0, 255, 255]);
    }

    #[test]
    fn read_write_rgba_round_trip() {
        let mut s = Surface::new(3, 3, PixelFormat::Rgba32).unwrap();
        s.fill_rect(Rect::new(1, 1, 2, 2), Color::rgba(9, 8, 7, 6), true);
        let rect = Rect::new(0, 0, 3, 3);
        let bytes = s.read_rgba(rect);
        let before = s.pixels().to_vec();
        s.write_rgba(rect, &bytes).unwrap();
        assert_eq!(s.pixels(), &before[..]);
    }

    #[test]
    fn write_rgba_rejects_short_data() {
        let mut s = Surface::new(2, 2, PixelFormat::Rgba32).unwrap();
        let err = s.write_rgba(Rect::new(0, 0, 2, 2), &[0u8; 3]).unwrap_err();
        assert!(matches!(err, ErrorKind::PixelDataSizeMismatch { .. }));
    }

    #[test]
    fn draw_target_scales_to_pixels() {
        let mut s = Surface::new(8, 8, PixelFormat::Rgba32).unwrap();
        let mut target = DrawTarget { surface: &mut s, scale_x: 2.0, scale_y: 2.0 };
        target.draw_rect(Rect::new(1, 1, 2, 2), red(), false);
        assert_eq!(s.read_rgba(Rect::new(2, 2, 1, 1)), vec![255, 0, 0, 255]);
        assert_eq!(s.read_rgba(Rect::new(1, 1, 1, 1)), vec![0, 0, 0, 0]);
    }
}
