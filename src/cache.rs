//! The retained frame pipeline: drawing calls are recorded into the command
//! buffer, and end-of-frame walks the log twice, once to hash commands into
//! the dirty grid and once to redraw the cells whose hash changed since the
//! previous frame.

use std::cell::RefCell;
use std::rc::Rc;

use crate::command::{
    Command, CommandBuffer, CommandTag, DrawCanvasCmd, DrawPolyCmd, DrawRectCmd, DrawTextCmd,
    SetClipCmd, DRAW_CANVAS_BLEND, DRAW_RECT_REPLACE,
};
use crate::font::{self, FontGroup, Tab};
use crate::geometry::{poly_control_box, PolyPoint, PolySegment, Rect};
use crate::grid::{fnv1a_update, CellGrid, CELL_SIZE, HASH_INITIAL};
use crate::poly::{self, MAX_POLY_POINTS};
use crate::surface::{BlendMode, DrawTarget, Surface};
use crate::{Color, ErrorKind, Result};

/// Shared pipeline state behind both the window renderer and off-screen
/// canvases: one command buffer, one dirty grid, and the per-frame root sets
/// that keep fonts and canvas surfaces alive while commands reference them.
pub(crate) struct FrameCache {
    commands: CommandBuffer,
    grid: CellGrid,
    rects: Vec<Rect>,
    screen_rect: Rect,
    last_clip_rect: Rect,
    fonts: Vec<FontGroup>,
    pins: Vec<Rc<RefCell<Surface>>>,
    show_debug: bool,
    rng: u32,
}

impl FrameCache {
    pub fn new(screen_rect: Rect) -> Self {
        Self {
            commands: CommandBuffer::new(),
            grid: CellGrid::new(),
            rects: Vec::new(),
            screen_rect,
            last_clip_rect: screen_rect,
            fonts: Vec::new(),
            pins: Vec::new(),
            show_debug: false,
            rng: 0x9e3779b9,
        }
    }

    pub fn set_show_debug(&mut self, enable: bool) {
        self.show_debug = enable;
    }

    /// Opens a frame. A changed target size writes the invalidation sentinel
    /// across the previous grid, forcing a full repaint.
    pub fn begin_frame(&mut self, size: (i32, i32)) {
        self.commands.begin_frame();
        let (width, height) = size;
        if self.screen_rect.width != width || self.screen_rect.height != height {
            self.screen_rect.width = width;
            self.screen_rect.height = height;
            self.grid.invalidate();
        }
        self.last_clip_rect = self.screen_rect;
    }

    pub fn set_clip_rect(&mut self, rect: Rect) {
        let rect = rect.intersect(self.screen_rect);
        if self.commands.push(CommandTag::SetClip, &SetClipCmd { rect }, &[]) {
            self.last_clip_rect = rect;
        }
    }

    pub fn draw_rect(&mut self, rect: Rect, color: Color, replace: bool) {
        if rect.is_empty() || !self.last_clip_rect.overlaps(rect) {
            return;
        }
        let flags = if replace { DRAW_RECT_REPLACE } else { 0 };
        self.commands
            .push(CommandTag::DrawRect, &DrawRectCmd { rect, color, flags }, &[]);
    }

    /// Records a text run. The run is measured up front so its bounding rect
    /// can feed the dirty grid; drawing happens in the redraw pass. Returns
    /// the pen x after the run, in points.
    pub fn draw_text(
        &mut self,
        fonts: &FontGroup,
        text: &str,
        x: f64,
        y: f64,
        color: Color,
        tab: Tab,
        scale: f64,
    ) -> f64 {
        let (width, x_offset) = fonts.get_width(text, tab, scale);
        let rect = Rect::new(
            (x + x_offset as f64) as i32,
            y as i32,
            (width - x_offset as f64) as i32,
            fonts.height(),
        );
        if self.last_clip_rect.overlaps(rect) {
            let (group, added) = self.intern_group(fonts);
            let cmd = DrawTextCmd {
                rect,
                color,
                tab_size: fonts.tab_size(),
                fonts: fonts.ids(),
                text_x: x,
                tab_offset: tab.offset.unwrap_or(f64::NAN),
                len: text.len() as u32,
                group,
            };
            if !self.commands.push(CommandTag::DrawText, &cmd, text.as_bytes()) && added {
                self.fonts.pop();
            }
        }
        x + width
    }

    /// Records a polygon. Errors on an oversized point run; an empty run
    /// yields an empty bounding box and records nothing.
    pub fn draw_poly(&mut self, segments: &[PolySegment], color: Color) -> Result<Rect> {
        let total: usize = segments.iter().map(|s| s.point_count()).sum();
        if total > MAX_POLY_POINTS {
            return Err(ErrorKind::TooManyPolyPoints);
        }
        let mut points: Vec<PolyPoint> = Vec::with_capacity(total);
        for segment in segments {
            segment.write_points(&mut points);
        }
        let Some(rect) = poly_control_box(&points) else {
            return Ok(Rect::default());
        };
        if self.last_clip_rect.overlaps(rect) {
            let cmd = DrawPolyCmd {
                rect,
                color,
                npoints: points.len() as u32,
            };
            self.commands
                .push(CommandTag::DrawPoly, &cmd, bytemuck::cast_slice(&points));
        }
        Ok(rect)
    }

    /// Records a canvas blit, pinning the source surface ref for the rest of
    /// the frame and capturing the source version for dirty hashing.
    pub fn draw_canvas(
        &mut self,
        surface: &Rc<RefCell<Surface>>,
        version: u64,
        rect: Rect,
        blend: bool,
    ) {
        if rect.is_empty() || !self.last_clip_rect.overlaps(rect) {
            return;
        }
        let cmd = DrawCanvasCmd {
            rect,
            version,
            surface_id: Rc::as_ptr(surface) as usize as u64,
            pin: self.pins.len() as u32,
            flags: if blend { DRAW_CANVAS_BLEND } else { 0 },
        };
        if self.commands.push(CommandTag::DrawCanvas, &cmd, &[]) {
            self.pins.push(surface.clone());
        }
    }

    /// Adds a font group to the frame root set and returns its index plus
    /// whether a new entry was created. Groups repeated across consecutive
    /// calls share one entry.
    fn intern_group(&mut self, fonts: &FontGroup) -> (u32, bool) {
        if let Some(last) = self.fonts.last() {
            if last.ids() == fonts.ids() {
                return (self.fonts.len() as u32 - 1, false);
            }
        }
        self.fonts.push(fonts.clone());
        (self.fonts.len() as u32 - 1, true)
    }

    fn next_debug_color(&mut self) -> Color {
        let mut step = || {
            self.rng ^= self.rng << 13;
            self.rng ^= self.rng >> 17;
            self.rng ^= self.rng << 5;
            (self.rng & 0xFF) as u8
        };
        let (r, g, b) = (step(), step(), step());
        Color::rgba(r, g, b, 50)
    }

    /// Closes the frame: hash pass, diff/merge, redraw of changed regions.
    /// Returns the redrawn rects in points for presentation; root sets are
    /// released before returning, so every pinned surface drops back to its
    /// owner afterwards.
    pub fn end_frame(&mut self, target: &mut DrawTarget<'_>) -> &[Rect] {
        // Hash pass: fold every command into the cells its clipped bounds
        // touch. The running clip follows SET_CLIP records.
        let mut clip = self.screen_rect;
        for record in self.commands.iter() {
            if let Some(Command::SetClip(cmd)) = record.decode() {
                clip = cmd.rect;
            }
            let rect = record.rect().intersect(clip);
            if rect.is_empty() {
                continue;
            }
            let h = fnv1a_update(HASH_INITIAL, record.bytes);
            self.grid.update_overlapping(rect, h);
        }

        // Diff the grids and merge changed cells into rectangles.
        self.rects.clear();
        self.grid.diff(self.screen_rect, &mut self.rects);
        for rect in &mut self.rects {
            rect.x *= CELL_SIZE;
            rect.y *= CELL_SIZE;
            rect.width *= CELL_SIZE;
            rect.height *= CELL_SIZE;
            *rect = rect.intersect(self.screen_rect);
        }

        // Redraw pass: replay the whole log against each dirty rect.
        for i in 0..self.rects.len() {
            let region = self.rects[i];
            target.set_clip(region);
            for record in self.commands.iter() {
                let Some(command) = record.decode() else {
                    log::warn!("skipping unknown command record");
                    continue;
                };
                match command {
                    Command::SetClip(cmd) => target.set_clip(cmd.rect.intersect(region)),
                    Command::DrawRect(cmd) => {
                        target.draw_rect(cmd.rect, cmd.color, cmd.flags & DRAW_RECT_REPLACE != 0)
                    }
                    Command::DrawText { cmd, text } => {
                        let Some(group) = self.fonts.get(cmd.group as usize) else { continue };
                        group.set_tab_size(cmd.tab_size);
                        let text = std::str::from_utf8(text).unwrap_or("");
                        let tab = Tab {
                            offset: (!cmd.tab_offset.is_nan()).then_some(cmd.tab_offset),
                        };
                        font::draw_text(
                            target,
                            group,
                            text,
                            cmd.text_x,
                            cmd.rect.y as f64,
                            cmd.color,
                            tab,
                        );
                    }
                    Command::DrawPoly { cmd, points } => {
                        poly::draw_poly(target, points, cmd.color);
                    }
                    Command::DrawCanvas(cmd) => {
                        let Some(pin) = self.pins.get(cmd.pin as usize) else { continue };
                        let src = pin.borrow();
                        let blend = if cmd.flags & DRAW_CANVAS_BLEND != 0 {
                            BlendMode::Blend
                        } else {
                            BlendMode::None
                        };
                        let dx = (cmd.rect.x as f64 * target.scale_x) as i32;
                        let dy = (cmd.rect.y as f64 * target.scale_y) as i32;
                        target.surface.blit(&src, None, dx, dy, blend);
                    }
                }
            }
            if self.show_debug {
                let color = self.next_debug_color();
                target.draw_rect(region, color, false);
            }
        }

        // Swap hash planes, recycle the command arena, release the frame's
        // font and canvas pins.
        self.grid.swap();
        self.commands.reset();
        self.fonts.clear();
        self.pins.clear();
        &self.rects
    }
}
