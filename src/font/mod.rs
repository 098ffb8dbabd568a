//! Scalable font handling: loading, shaping, on-demand glyph atlases, text
//! measurement and the blended text draw path.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use bitflags::bitflags;
use fnv::FnvHashMap;
use ttf_parser as ttf;

use crate::command::FONT_FALLBACK_MAX;
use crate::geometry::Rect;
use crate::surface::{DrawTarget, Surface};
use crate::{Color, ErrorKind, Result};

mod raster;
mod shaper;

mod metadata;
pub use metadata::{font_metadata, FontMetadata};

/// Number of glyphs per atlas page.
pub(crate) const GLYPHSET_SIZE: usize = 16;
/// Horizontal subpixel phases pre-rasterized for subpixel antialiasing.
pub(crate) const SUBPIXEL_PHASES: usize = 3;
/// Codepoint substituted when no fallback font provides a glyph.
const FALLBACK_CODEPOINT: char = '\u{25A1}';

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FontAntialiasing {
    None,
    Grayscale,
    #[default]
    Subpixel,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FontHinting {
    None,
    #[default]
    Slight,
    /// Rounds pen advances to whole pixels at draw and measure time.
    Full,
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct FontStyle: u8 {
        const BOLD = 1;
        const ITALIC = 2;
        const UNDERLINE = 4;
        const SMOOTH = 8;
        const STRIKETHROUGH = 16;
    }
}

/// Rendering options a font is loaded with.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FontOptions {
    pub antialiasing: FontAntialiasing,
    pub hinting: FontHinting,
    pub style: FontStyle,
}

/// Optional absolute origin for tab stops, in points. Without it a tab simply
/// consumes the group's tab advance.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Tab {
    pub offset: Option<f64>,
}

/// Metrics of one rasterized glyph within its atlas page. `x0..x1` is the
/// horizontal pixel span inside the page surface.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct GlyphMetric {
    pub x0: u32,
    pub x1: u32,
    pub y0: u32,
    pub y1: u32,
    pub loaded: bool,
    pub bitmap_left: i32,
    pub bitmap_top: i32,
    pub xadvance: f32,
}

/// One lazily rasterized atlas page holding up to [`GLYPHSET_SIZE`] glyph
/// bitmaps laid out horizontally.
pub(crate) struct GlyphSet {
    pub surface: Option<Surface>,
    pub metrics: [GlyphMetric; GLYPHSET_SIZE],
}

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) struct PageKey {
    pub page: u32,
    pub phase: u8,
}

pub(crate) struct Font {
    pub(crate) path: PathBuf,
    pub(crate) data: Rc<[u8]>,
    pub(crate) options: FontOptions,
    /// Size in points.
    pub(crate) size: f32,
    /// Size in pixels after applying the surface scale.
    pub(crate) pixel_size: i32,
    pub(crate) units_per_em: u16,
    pub(crate) height: i32,
    pub(crate) baseline: i32,
    pub(crate) underline_thickness: i32,
    pub(crate) space_advance: f32,
    pub(crate) tab_advance: f32,
    /// Tallest glyph bitmap seen so far; page surfaces use this height and
    /// the value never decreases.
    pub(crate) max_height: i32,
    pub(crate) sets: FnvHashMap<PageKey, GlyphSet>,
}

impl Font {
    fn derive_metrics(&mut self) -> Result<()> {
        let face = ttf::Face::parse(&self.data, 0)?;
        self.units_per_em = face.units_per_em();
        let upem = self.units_per_em as f32;
        self.height = (face.height() as f32 / upem * self.size) as i32;
        self.baseline = (face.ascender() as f32 / upem * self.size) as i32;
        self.underline_thickness = face
            .underline_metrics()
            .map(|m| (m.thickness as f32 / upem * self.size) as i32)
            .unwrap_or(0);
        if self.underline_thickness == 0 {
            self.underline_thickness = (self.height as f64 / 14.0).ceil() as i32;
        }
        let units_to_px = self.pixel_size as f32 / upem;
        self.space_advance = face
            .glyph_index(' ')
            .and_then(|gid| face.glyph_hor_advance(gid))
            .map(|adv| adv as f32 * units_to_px)
            .unwrap_or(self.pixel_size as f32 / 2.0);
        self.tab_advance = self.space_advance * 2.0;
        Ok(())
    }

    /// Looks up a page, rasterizing it on first use. Non-subpixel fonts keep
    /// a single phase-0 page per index.
    pub(crate) fn glyphset(&mut self, glyph_id: u32, phase: u8) -> &GlyphSet {
        let phase = if self.options.antialiasing == FontAntialiasing::Subpixel {
            phase
        } else {
            0
        };
        let key = PageKey { page: glyph_id / GLYPHSET_SIZE as u32, phase };
        if !self.sets.contains_key(&key) {
            let set = raster::build_glyph_set(self, key);
            self.sets.insert(key, set);
        }
        &self.sets[&key]
    }

    pub(crate) fn metric(&mut self, glyph_id: u32, phase: u8) -> GlyphMetric {
        self.glyphset(glyph_id, phase).metrics[glyph_id as usize % GLYPHSET_SIZE]
    }

    fn clear_glyph_cache(&mut self) {
        self.sets.clear();
        self.max_height = 0;
    }

    fn glyph_index(&self, c: char) -> u32 {
        ttf::Face::parse(&self.data, 0)
            .ok()
            .and_then(|face| face.glyph_index(c))
            .map(|gid| gid.0 as u32)
            .unwrap_or(0)
    }
}

/// Shared, cheaply clonable handle to a loaded font. Handles are the unit of
/// identity for dirty-region hashing: two frames drawing with the same handle
/// hash identically.
#[derive(Clone)]
pub struct FontHandle(Rc<RefCell<Font>>);

impl FontHandle {
    /// Loads a font from disk. The file is stream-read into owned bytes, so
    /// the path need not stay resident. `scale` is the surface scale used to
    /// derive the pixel size from `size` points.
    pub fn load<P: AsRef<Path>>(path: P, size: f32, options: FontOptions, scale: f32) -> Result<Self> {
        if !size.is_finite() || size <= 0.0 {
            return Err(ErrorKind::FontSizeInvalid);
        }
        let path = path.as_ref().to_path_buf();
        let data: Rc<[u8]> = std::fs::read(&path)?.into();
        let mut font = Font {
            path,
            data,
            options,
            size,
            pixel_size: ((size * scale) as i32).max(1),
            units_per_em: 0,
            height: 0,
            baseline: 0,
            underline_thickness: 0,
            space_advance: 0.0,
            tab_advance: 0.0,
            max_height: 0,
            sets: FnvHashMap::default(),
        };
        font.derive_metrics()?;
        Ok(Self(Rc::new(RefCell::new(font))))
    }

    /// Reopens the same file with new parameters, inheriting any that are
    /// omitted. The copy never shares the original's atlas.
    pub fn copy(
        &self,
        size: Option<f32>,
        antialiasing: Option<FontAntialiasing>,
        hinting: Option<FontHinting>,
        style: Option<FontStyle>,
        scale: f32,
    ) -> Result<Self> {
        let font = self.0.borrow();
        let options = FontOptions {
            antialiasing: antialiasing.unwrap_or(font.options.antialiasing),
            hinting: hinting.unwrap_or(font.options.hinting),
            style: style.unwrap_or(font.options.style),
        };
        Self::load(&font.path, size.unwrap_or(font.size), options, scale)
    }

    pub fn path(&self) -> PathBuf {
        self.0.borrow().path.clone()
    }

    pub fn size(&self) -> f32 {
        self.0.borrow().size
    }

    pub fn options(&self) -> FontOptions {
        self.0.borrow().options
    }

    /// Stable identity of this handle for record hashing.
    pub(crate) fn id(&self) -> u64 {
        Rc::as_ptr(&self.0) as usize as u64
    }

    pub(crate) fn borrow(&self) -> std::cell::Ref<'_, Font> {
        self.0.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> std::cell::RefMut<'_, Font> {
        self.0.borrow_mut()
    }
}

/// An ordered fallback chain of fonts. Shaping always uses the first member;
/// glyph lookup walks the chain.
#[derive(Clone)]
pub struct FontGroup {
    fonts: Vec<FontHandle>,
}

impl FontGroup {
    pub fn new(fonts: Vec<FontHandle>) -> Result<Self> {
        if fonts.is_empty() {
            return Err(ErrorKind::FontGroupEmpty);
        }
        if fonts.len() > FONT_FALLBACK_MAX {
            return Err(ErrorKind::FontGroupTooLarge);
        }
        Ok(Self { fonts })
    }

    pub fn fonts(&self) -> &[FontHandle] {
        &self.fonts
    }

    fn first(&self) -> &FontHandle {
        &self.fonts[0]
    }

    /// Identity of every member, zero-padded to the fallback limit; embedded
    /// in draw-text records so the hash tracks the group composition.
    pub(crate) fn ids(&self) -> [u64; FONT_FALLBACK_MAX] {
        let mut ids = [0u64; FONT_FALLBACK_MAX];
        for (i, font) in self.fonts.iter().enumerate() {
            ids[i] = font.id();
        }
        ids
    }

    pub fn height(&self) -> i32 {
        self.first().0.borrow().height
    }

    pub fn size(&self) -> f32 {
        self.first().0.borrow().size
    }

    /// Changes the size of every member, dropping all atlas pages so glyphs
    /// re-rasterize at the new pixel size.
    pub fn set_size(&self, size: f32, scale: f32) -> Result<()> {
        if !size.is_finite() || size <= 0.0 {
            return Err(ErrorKind::FontSizeInvalid);
        }
        for font in &self.fonts {
            let mut font = font.borrow_mut();
            font.clear_glyph_cache();
            font.size = size;
            font.pixel_size = ((size * scale) as i32).max(1);
            font.derive_metrics()?;
        }
        Ok(())
    }

    pub fn set_tab_size(&self, n: i32) {
        for font in &self.fonts {
            let mut font = font.borrow_mut();
            font.tab_advance = font.space_advance * n as f32;
        }
    }

    pub fn tab_size(&self) -> i32 {
        let font = self.first().0.borrow();
        if font.space_advance > 0.0 {
            (font.tab_advance / font.space_advance) as i32
        } else {
            font.tab_advance as i32
        }
    }

    /// Measures a byte run. Returns the width in points and the left-side
    /// bearing of the first glyph (possibly negative), also in points.
    pub fn get_width(&self, text: &str, tab: Tab, scale: f64) -> (f64, i32) {
        let hinting = self.first().0.borrow().options.hinting;
        let glyphs = shaper::shape(&self.first().0.borrow().data, text);
        let mut width = 0.0f64;
        let mut x_offset = None;

        for glyph in &glyphs {
            let ch = glyph.codepoint(text);
            if ch == '\t' {
                width += self.tab_advance_at(width, tab, scale);
                continue;
            }
            let (_, _, metric) = group_glyph(self, glyph.glyph_id, ch, 0);
            let mut advance = if metric.xadvance != 0.0 {
                metric.xadvance as f64
            } else {
                self.first().0.borrow().space_advance as f64
            };
            if hinting == FontHinting::Full {
                advance = advance.round();
            }
            if x_offset.is_none() {
                x_offset = Some((metric.bitmap_left as f64 / scale).floor() as i32);
            }
            width += advance;
        }
        (width / scale, x_offset.unwrap_or(0))
    }

    /// Pixel advance consumed by a tab at pen position `pen_x` (pixels).
    fn tab_advance_at(&self, pen_x: f64, tab: Tab, scale: f64) -> f64 {
        let tab_advance = self.first().0.borrow().tab_advance as f64;
        match tab.offset {
            Some(offset) => {
                let rel = pen_x - offset * scale;
                let next = ((rel / tab_advance).floor() + 1.0) * tab_advance;
                next - rel
            }
            None => tab_advance,
        }
    }
}

impl From<FontHandle> for FontGroup {
    fn from(font: FontHandle) -> Self {
        Self { fonts: vec![font] }
    }
}

/// Resolves one shaped glyph through the fallback chain. `glyph_id` is the
/// shaper's index into the first font; later members are consulted by
/// codepoint. Unknown codepoints above U+00FF retry as U+25A1.
pub(crate) fn group_glyph(
    group: &FontGroup,
    glyph_id: u32,
    fallback: char,
    phase: u8,
) -> (FontHandle, u32, GlyphMetric) {
    let mut glyph_id = glyph_id;
    let mut fallback = fallback;
    loop {
        for (i, handle) in group.fonts().iter().enumerate() {
            let mut font = handle.borrow_mut();
            let gid = if i == 0 { glyph_id } else { font.glyph_index(fallback) };
            let metric = font.metric(gid, phase);
            if metric.loaded || fallback == '\0' {
                drop(font);
                return (handle.clone(), gid, metric);
            }
        }
        if fallback as u32 > 0xFF && fallback != FALLBACK_CODEPOINT {
            glyph_id = group.first().borrow().glyph_index(FALLBACK_CODEPOINT);
            fallback = FALLBACK_CODEPOINT;
            continue;
        }
        let handle = group.first().clone();
        let metric = handle.borrow_mut().metric(glyph_id, phase);
        return (handle, glyph_id, metric);
    }
}

/// Draws a shaped text run onto the target, blending glyph coverage with the
/// requested color and applying underline/strikethrough overlays per
/// same-font segment. Returns the pen position after the run, in points.
#[allow(clippy::too_many_arguments)]
pub(crate) fn draw_text(
    target: &mut DrawTarget<'_>,
    group: &FontGroup,
    text: &str,
    x: f64,
    y: f64,
    color: Color,
    tab: Tab,
) -> f64 {
    let (scale_x, scale_y) = (target.scale_x, target.scale_y);
    let mut pen_x = x * scale_x;
    let y_px = y * scale_y;
    let clip = target.surface.clip();

    let (style, hinting, baseline, group_height) = {
        let first = group.first().borrow();
        (first.options.style, first.options.hinting, first.baseline, first.height)
    };
    let underline = style.contains(FontStyle::UNDERLINE);
    let strikethrough = style.contains(FontStyle::STRIKETHROUGH);

    let glyphs = shaper::shape(&group.first().borrow().data, text);

    let mut last_font: Option<FontHandle> = None;
    let mut last_pen_x = x;
    let count = glyphs.len();

    for (i, glyph) in glyphs.iter().enumerate() {
        let ch = glyph.codepoint(text);
        if ch == '\t' {
            pen_x += group.tab_advance_at(pen_x - x * scale_x, tab, scale_x);
            continue;
        }

        let phase = {
            let frac = pen_x.fract();
            let frac = if frac < 0.0 { frac + 1.0 } else { frac };
            (frac * SUBPIXEL_PHASES as f64) as u8
        };
        let (handle, gid, metric) = group_glyph(group, glyph.glyph_id, ch, phase);

        if !metric.loaded && ch as u32 > 0xFF {
            // No glyph anywhere in the chain: draw a space-sized box.
            let space = handle.borrow().space_advance as f64;
            target.draw_rect(
                Rect::round_from(
                    pen_x / scale_x + 1.0,
                    y,
                    (space - 1.0).max(1.0) / scale_x,
                    group_height as f64,
                ),
                color,
                false,
            );
        }

        if metric.loaded && color.a > 0 {
            blend_glyph(target, &handle, gid, phase, &metric, pen_x, y_px, baseline, scale_y, color, clip);
        }

        let mut advance = if metric.xadvance != 0.0 {
            metric.xadvance as f64
        } else {
            handle.borrow().space_advance as f64
        };
        if hinting == FontHinting::Full {
            advance = advance.round();
        }

        let same_font = last_font
            .as_ref()
            .map(|f| Rc::ptr_eq(&f.0, &handle.0))
            .unwrap_or(false);
        if last_font.is_none() {
            last_font = Some(handle.clone());
        } else if !same_font || i == count - 1 {
            let segment_end = if i == count - 1 { pen_x + advance } else { pen_x };
            if underline || strikethrough {
                if let Some(last) = &last_font {
                    let last = last.borrow();
                    let run = Rect::round_from(
                        last_pen_x / scale_x,
                        0.0,
                        (segment_end - last_pen_x) / scale_x,
                        0.0,
                    );
                    if underline {
                        let rect = Rect::new(
                            run.x,
                            (y + last.height as f64 - 1.0) as i32,
                            run.width,
                            last.underline_thickness,
                        );
                        target.draw_rect(rect, color, false);
                    }
                    if strikethrough {
                        let rect = Rect::new(
                            run.x,
                            (y + last.height as f64 / 2.0) as i32,
                            run.width,
                            last.underline_thickness,
                        );
                        target.draw_rect(rect, color, false);
                    }
                }
            }
            last_font = Some(handle.clone());
            last_pen_x = pen_x;
        }

        pen_x += advance;
    }

    pen_x / scale_x
}

/// Blends one glyph bitmap from its atlas page into the destination surface.
#[allow(clippy::too_many_arguments)]
fn blend_glyph(
    target: &mut DrawTarget<'_>,
    handle: &FontHandle,
    gid: u32,
    phase: u8,
    metric: &GlyphMetric,
    pen_x: f64,
    y_px: f64,
    baseline: i32,
    scale_y: f64,
    color: Color,
    clip: Rect,
) {
    let font = handle.borrow();
    let subpixel = font.options.antialiasing == FontAntialiasing::Subpixel;
    let key = PageKey {
        page: gid / GLYPHSET_SIZE as u32,
        phase: if subpixel { phase } else { 0 },
    };
    let Some(set) = font.sets.get(&key) else { return };
    let Some(page) = set.surface.as_ref() else { return };

    let start_x = pen_x.floor() as i32 + metric.bitmap_left;
    let clip_end_x = clip.x + clip.width;
    let clip_end_y = clip.y + clip.height;
    if (start_x + ((metric.x1 - metric.x0) as i32) < clip.x) || (start_x >= clip_end_x) {
        return;
    }

    let bpp = if subpixel { 3 } else { 1 };
    for line in metric.y0..metric.y1 {
        let target_y = line as i32 + y_px as i32 - metric.bitmap_top
            + (baseline as f64 * scale_y) as i32;
        if target_y < clip.y {
            continue;
        }
        if target_y >= clip_end_y {
            break;
        }
        let row = page.row(line as i32);
        for gx in metric.x0..metric.x1 {
            let dest_x = start_x + (gx - metric.x0) as i32;
            if dest_x < clip.x || dest_x >= clip_end_x {
                continue;
            }
            let s = &row[gx as usize * bpp..];
            let cov = if subpixel { [s[0], s[1], s[2]] } else { [s[0]; 3] };
            if cov != [0, 0, 0] {
                target.surface.blend_coverage_rgb(dest_x, target_y, color, cov);
            }
        }
    }
}
