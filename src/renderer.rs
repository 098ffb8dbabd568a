//! The window-facing frame pipeline: begin/record/finish on a window target,
//! the frame-balance latch, and window lifetime helpers.

use std::cell::{Cell, RefCell};

use crate::cache::FrameCache;
use crate::canvas::Canvas;
use crate::font::{FontGroup, Tab};
use crate::geometry::{PolySegment, Rect};
use crate::surface::{BlendMode, DrawTarget, Surface};
use crate::window::{HitTestInfo, PresentTarget, WindowTarget};
use crate::{Color, PixelFormat, Result};

thread_local! {
    /// Frame-balance latch: while one target is recording, a begin_frame on
    /// any other target is a host programming error. Handles in this crate
    /// are not `Send`, so the latch scope is the thread; hosts driving
    /// windows from several threads serialize at begin_frame granularity.
    static RECORDING: Cell<bool> = const { Cell::new(false) };

    /// Slot for a window kept alive across host teardown.
    static PERSISTED: RefCell<Option<Renderer>> = const { RefCell::new(None) };
}

/// The retained-mode renderer bound to one window. Drawing calls between
/// [`begin_frame`](Self::begin_frame) and [`end_frame`](Self::end_frame) are
/// recorded, hashed into the dirty grid, and only changed screen regions are
/// redrawn and presented.
pub struct Renderer {
    window: WindowTarget,
    cache: FrameCache,
    recording: bool,
}

impl Renderer {
    pub fn new(target: Box<dyn PresentTarget>) -> Result<Self> {
        let window = WindowTarget::new(target)?;
        let (w, h) = window.size_in_points();
        Ok(Self {
            window,
            cache: FrameCache::new(Rect::of_size(w, h)),
            recording: false,
        })
    }

    /// Overlays translucent random-colored rects on every redrawn region.
    pub fn set_show_debug(&mut self, enable: bool) {
        self.cache.set_show_debug(enable);
    }

    /// Window size in points.
    pub fn get_size(&self) -> (i32, i32) {
        self.window.size_in_points()
    }

    pub fn get_refresh_rate(&self) -> Option<f32> {
        self.window.refresh_rate()
    }

    pub fn hit_test_info(&self) -> HitTestInfo {
        self.window.hit_test_info()
    }

    pub fn set_hit_test_info(&mut self, info: HitTestInfo) {
        self.window.set_hit_test_info(info);
    }

    /// Re-queries the window's pixel size and scale after an OS resize event.
    pub fn resize(&mut self) -> Result<()> {
        self.window.resize()?;
        Ok(())
    }

    /// Opens a frame on this target.
    ///
    /// # Panics
    /// Panics if any target is already recording; frames never nest or
    /// interleave across targets.
    pub fn begin_frame(&mut self) {
        RECORDING.with(|latch| {
            assert!(!latch.get(), "begin_frame while another frame is recording");
            latch.set(true);
        });
        self.recording = true;
        self.cache.begin_frame(self.window.size_in_points());
    }

    fn assert_recording(&self) {
        assert!(self.recording, "drawing call outside begin_frame/end_frame");
    }

    /// Sets the clip rect, in points.
    pub fn set_clip_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.assert_recording();
        self.cache.set_clip_rect(Rect::round_from(x, y, w, h));
    }

    pub fn draw_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color) {
        self.assert_recording();
        self.cache.draw_rect(Rect::round_from(x, y, w, h), color, false);
    }

    /// Records a text run at (x, y) points; returns the pen x after the run.
    pub fn draw_text(
        &mut self,
        fonts: &FontGroup,
        text: &str,
        x: f64,
        y: f64,
        color: Color,
        tab: Tab,
    ) -> f64 {
        self.assert_recording();
        let (scale_x, _) = self.window.scale();
        self.cache.draw_text(fonts, text, x, y, color, tab, scale_x)
    }

    /// Records a polygon; returns its bounding box in points.
    pub fn draw_poly(&mut self, segments: &[PolySegment], color: Color) -> Result<Rect> {
        self.assert_recording();
        self.cache.draw_poly(segments, color)
    }

    /// Records a blit of `canvas` at (x, y) points.
    pub fn draw_canvas(&mut self, canvas: &Canvas, x: i32, y: i32) {
        self.assert_recording();
        let (w, h) = canvas.get_size();
        self.cache.draw_canvas(
            canvas.surface_ref(),
            canvas.version(),
            Rect::new(x, y, w, h),
            true,
        );
    }

    /// Snapshots a region of the current target surface into a new RGBA32
    /// canvas. Coordinates are points.
    pub fn to_canvas(&self, x: i32, y: i32, w: i32, h: i32) -> Result<Canvas> {
        let (scale_x, scale_y) = self.window.scale();
        let src_rect = Rect::new(x, y, w, h).scaled(scale_x, scale_y);
        let mut snapshot = Surface::new(
            src_rect.width.max(1),
            src_rect.height.max(1),
            PixelFormat::Rgba32,
        )?;
        snapshot.blit(self.window.surface(), Some(src_rect), 0, 0, BlendMode::None);
        Ok(Canvas::from_surface(snapshot))
    }

    /// Closes the frame: runs the hash, diff and redraw passes, then presents
    /// the merged dirty rects.
    ///
    /// # Panics
    /// Panics without a matching [`begin_frame`](Self::begin_frame).
    pub fn end_frame(&mut self) {
        self.assert_recording();
        let (scale_x, scale_y) = self.window.scale();
        let rects = {
            let mut target = DrawTarget {
                surface: self.window.surface_mut(),
                scale_x,
                scale_y,
            };
            self.cache.end_frame(&mut target)
        };
        if !rects.is_empty() {
            self.window.present_points(rects);
        }
        self.recording = false;
        RECORDING.with(|latch| latch.set(false));
    }

    /// Stores this window in the persisted slot, keeping it alive across
    /// host teardown; [`restore`](Self::restore) takes it back.
    pub fn persist(self) {
        PERSISTED.with(|slot| *slot.borrow_mut() = Some(self));
    }

    pub fn restore() -> Option<Renderer> {
        PERSISTED.with(|slot| slot.borrow_mut().take())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if self.recording {
            RECORDING.with(|latch| latch.set(false));
        }
    }
}
