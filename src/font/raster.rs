//! On-demand rasterization of glyph atlas pages. Outlines come from the face
//! tables, are transformed into pixel space (style shear/embolden and the
//! subpixel phase applied on the way), filled by the shared coverage
//! rasterizer, and packed horizontally into one page surface.

use ttf_parser::{self as ttf, GlyphId, OutlineBuilder};

use super::{
    Font, FontAntialiasing, FontStyle, GlyphMetric, GlyphSet, PageKey, GLYPHSET_SIZE,
    SUBPIXEL_PHASES,
};
use crate::poly::{Contour, CoverageRaster};
use crate::surface::{PixelFormat, Surface};

/// Embolden distance in pixels applied for the bold and smooth styles.
const EMBOLDEN: f32 = 1.0 / 32.0;

/// FIR weights applied across subpixel samples in LCD mode.
const LCD_FILTER_WEIGHTS: [u32; 5] = [0x10, 0x40, 0x70, 0x40, 0x10];

struct GlyphBitmap {
    /// Width in destination pixels.
    width: u32,
    rows: u32,
    left: i32,
    top: i32,
    /// `rows` rows of `width × byte_width` coverage bytes.
    data: Vec<u8>,
}

/// Collects an outline in pixel-space (y down), flattening curves as they
/// arrive. The affine style transform is applied per point so control points
/// transform exactly.
struct PixelOutline {
    units_to_px: f32,
    phase_offset: f32,
    italic: bool,
    current: Contour,
    contours: Vec<Vec<(f32, f32)>>,
}

impl PixelOutline {
    fn new(units_to_px: f32, phase_offset: f32, italic: bool) -> Self {
        Self {
            units_to_px,
            phase_offset,
            italic,
            current: Contour::default(),
            contours: Vec::new(),
        }
    }

    fn to_px(&self, x: f32, y: f32) -> (f32, f32) {
        let x = if self.italic { x + 0.25 * y } else { x };
        (x * self.units_to_px + self.phase_offset, -y * self.units_to_px)
    }

    fn finish_contour(&mut self) {
        if !self.current.is_empty() {
            let contour = std::mem::take(&mut self.current);
            self.contours.push(contour.into_points());
        }
    }

    fn into_contours(mut self) -> Vec<Vec<(f32, f32)>> {
        self.finish_contour();
        self.contours
    }
}

impl OutlineBuilder for PixelOutline {
    fn move_to(&mut self, x: f32, y: f32) {
        self.finish_contour();
        let (x, y) = self.to_px(x, y);
        self.current.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.to_px(x, y);
        self.current.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (cx, cy) = self.to_px(x1, y1);
        let (x, y) = self.to_px(x, y);
        self.current.quad_to(cx, cy, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (c1x, c1y) = self.to_px(x1, y1);
        let (c2x, c2y) = self.to_px(x2, y2);
        let (x, y) = self.to_px(x, y);
        self.current.cubic_to(c1x, c1y, c2x, c2y, x, y);
    }

    fn close(&mut self) {
        self.finish_contour();
    }
}

/// Rasterizes all glyphs of one page and packs them into a page surface.
/// Page height is the font's running max glyph height, which only grows.
pub(crate) fn build_glyph_set(font: &mut Font, key: PageKey) -> GlyphSet {
    let mut metrics = [GlyphMetric::default(); GLYPHSET_SIZE];
    let Ok(face) = ttf::Face::parse(&font.data, 0) else {
        return GlyphSet { surface: None, metrics };
    };

    let subpixel = font.options.antialiasing == FontAntialiasing::Subpixel;
    let byte_width = if subpixel { 3 } else { 1 };
    let units_to_px = font.pixel_size as f32 / font.units_per_em.max(1) as f32;
    let phase_offset = key.phase as f32 / SUBPIXEL_PHASES as f32;
    let glyph_count = face.number_of_glyphs() as u32;

    let mut bitmaps: [Option<GlyphBitmap>; GLYPHSET_SIZE] = Default::default();
    let mut pen_x = 0u32;

    for (i, metric) in metrics.iter_mut().enumerate() {
        let gid = key.page * GLYPHSET_SIZE as u32 + i as u32;
        if gid == 0 || gid >= glyph_count || gid > u16::MAX as u32 {
            continue;
        }
        let glyph = GlyphId(gid as u16);
        let xadvance = face
            .glyph_hor_advance(glyph)
            .map(|adv| adv as f32 * units_to_px)
            .unwrap_or(0.0);
        let bitmap = rasterize_glyph(&face, glyph, font.options, units_to_px, phase_offset);
        let (width, rows, left, top) = bitmap
            .as_ref()
            .map(|b| (b.width, b.rows, b.left, b.top))
            .unwrap_or((0, 0, 0, 0));
        *metric = GlyphMetric {
            x0: pen_x,
            x1: pen_x + width,
            y0: 0,
            y1: rows,
            loaded: true,
            bitmap_left: left,
            bitmap_top: top,
            xadvance,
        };
        pen_x += width;
        font.max_height = font.max_height.max(rows as i32);
        bitmaps[i] = bitmap;
    }

    if pen_x == 0 || font.max_height == 0 {
        return GlyphSet { surface: None, metrics };
    }

    let format = if subpixel { PixelFormat::Rgb24 } else { PixelFormat::Gray8 };
    let Ok(mut page) = Surface::new(pen_x as i32, font.max_height, format) else {
        log::warn!("failed to allocate glyph atlas page; glyphs will render as boxes");
        return GlyphSet { surface: None, metrics };
    };
    for (i, bitmap) in bitmaps.iter().enumerate() {
        let Some(bitmap) = bitmap else { continue };
        let row_bytes = bitmap.width as usize * byte_width;
        for row in 0..bitmap.rows as usize {
            let src = &bitmap.data[row * row_bytes..(row + 1) * row_bytes];
            let dst = page.row_mut(row as i32);
            let offset = metrics[i].x0 as usize * byte_width;
            dst[offset..offset + row_bytes].copy_from_slice(src);
        }
    }

    GlyphSet { surface: Some(page), metrics }
}

fn rasterize_glyph(
    face: &ttf::Face<'_>,
    glyph: GlyphId,
    options: super::FontOptions,
    units_to_px: f32,
    phase_offset: f32,
) -> Option<GlyphBitmap> {
    let italic = options.style.contains(FontStyle::ITALIC);
    let mut outline = PixelOutline::new(units_to_px, phase_offset, italic);
    face.outline_glyph(glyph, &mut outline)?;
    let mut contours = outline.into_contours();
    if contours.is_empty() {
        return None;
    }

    // Emboldening unions a translated copy of the outline; nonzero winding
    // turns the two copies into one thicker shape.
    if options.style.contains(FontStyle::SMOOTH) {
        let shifted = shift_contours(&contours, EMBOLDEN, EMBOLDEN);
        contours.extend(shifted);
    }
    if options.style.contains(FontStyle::BOLD) {
        let shifted = shift_contours(&contours, EMBOLDEN, 0.0);
        contours.extend(shifted);
    }

    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for contour in &contours {
        for &(x, y) in contour {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }
    let left = min_x.floor() as i32;
    let top = min_y.floor() as i32;
    let width = (max_x.ceil() as i32 - left).max(0) as u32;
    let rows = (max_y.ceil() as i32 - top).max(0) as u32;
    if width == 0 || rows == 0 {
        return None;
    }

    let subpixel_scale = if options.antialiasing == FontAntialiasing::Subpixel { 3 } else { 1 };
    let samples_per_row = width as usize * subpixel_scale;
    let mut raster = CoverageRaster::new(samples_per_row, rows as usize);
    for contour in &contours {
        let local: Vec<(f32, f32)> = contour
            .iter()
            .map(|&(x, y)| ((x - left as f32) * subpixel_scale as f32, y - top as f32))
            .collect();
        raster.fill_contour(&local);
    }

    let byte_width = if subpixel_scale == 3 { 3 } else { 1 };
    let mut data = vec![0u8; rows as usize * width as usize * byte_width];
    let mut samples = vec![0u8; samples_per_row];
    for row in 0..rows as usize {
        raster.row_coverage(row, &mut samples);
        let out = &mut data[row * width as usize * byte_width..(row + 1) * width as usize * byte_width];
        match options.antialiasing {
            FontAntialiasing::None => {
                for (x, sample) in samples.iter().enumerate() {
                    out[x] = if *sample >= 128 { 255 } else { 0 };
                }
            }
            FontAntialiasing::Grayscale => out.copy_from_slice(&samples),
            FontAntialiasing::Subpixel => lcd_filter_row(&samples, out),
        }
    }

    Some(GlyphBitmap {
        width,
        rows,
        left,
        top: -top,
        data,
    })
}

fn shift_contours(contours: &[Vec<(f32, f32)>], dx: f32, dy: f32) -> Vec<Vec<(f32, f32)>> {
    contours
        .iter()
        .map(|c| c.iter().map(|&(x, y)| (x + dx, y + dy)).collect())
        .collect()
}

/// Five-tap low-pass filter across the subpixel sample row, saturating at
/// full coverage. Input and output both hold three samples per pixel.
fn lcd_filter_row(samples: &[u8], out: &mut [u8]) {
    let n = samples.len() as i32;
    for i in 0..n {
        let mut acc = 0u32;
        for (k, weight) in LCD_FILTER_WEIGHTS.iter().enumerate() {
            let j = i + k as i32 - 2;
            if j >= 0 && j < n {
                acc += weight * samples[j as usize] as u32;
            }
        }
        out[i as usize] = (acc >> 8).min(255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcd_filter_spreads_energy_and_saturates() {
        let samples = [0, 0, 255, 0, 0];
        let mut out = [0u8; 5];
        lcd_filter_row(&samples, &mut out);
        assert!(out[2] > out[1] && out[1] > out[0]);
        assert_eq!(out[0], ((0x10u32 * 255) >> 8) as u8);

        let solid = [255u8; 5];
        let mut out = [0u8; 5];
        lcd_filter_row(&solid, &mut out);
        assert_eq!(out[2], 255);
    }

    #[test]
    fn shifting_contours_preserves_shape() {
        let contours = vec![vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]];
        let shifted = shift_contours(&contours, 0.5, 0.0);
        assert_eq!(shifted[0][1], (1.5, 0.0));
    }
}
