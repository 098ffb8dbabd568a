//! Window-level plumbing: the presentation seam the host implements, the
//! backing surface in pixels, and the point-to-pixel scale bookkeeping.

use crate::geometry::Rect;
use crate::surface::{PixelFormat, Surface};
use crate::Result;

/// Minimum window extent; prevents too-small-to-see windows on unmaximize.
pub const MIN_WINDOW_WIDTH: i32 = 240;
pub const MIN_WINDOW_HEIGHT: i32 = 180;

/// Resolves a requested window size against the primary display: omitted or
/// zero dimensions default to 80% of the display, and the minimum size is
/// always enforced.
pub fn default_window_size(display: (i32, i32), requested: (i32, i32)) -> (i32, i32) {
    let w = if requested.0 < 1 { display.0 * 8 / 10 } else { requested.0 };
    let h = if requested.1 < 1 { display.1 * 8 / 10 } else { requested.1 };
    (w.max(MIN_WINDOW_WIDTH), h.max(MIN_WINDOW_HEIGHT))
}

/// Measurements used by borderless-window hit testing.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HitTestInfo {
    pub title_height: i32,
    pub controls_width: i32,
    pub resize_border: i32,
}

/// The seam between the renderer and the OS surface. One implementation may
/// hand back the window surface directly, another may stream the backing
/// surface into a texture; both look the same from here.
pub trait PresentTarget {
    /// Current drawable size in pixels.
    fn size_in_pixels(&self) -> (i32, i32);

    /// Pixels per point, per axis.
    fn scale(&self) -> (f64, f64) {
        (1.0, 1.0)
    }

    /// Uploads the listed pixel-space rects of `surface` to the display.
    fn present(&mut self, surface: &Surface, rects: &[Rect]);

    /// Makes the window visible; called once after the first presented frame.
    fn show(&mut self) {}

    /// Display refresh rate in Hz, for frame pacing.
    fn refresh_rate(&self) -> Option<f32> {
        None
    }
}

/// A presentation target that discards everything; useful for tests and
/// headless runs.
pub struct VoidTarget {
    pub width: i32,
    pub height: i32,
}

impl VoidTarget {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl PresentTarget for VoidTarget {
    fn size_in_pixels(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn present(&mut self, _surface: &Surface, _rects: &[Rect]) {}
}

/// A window-attached render target: the boxed OS seam, the RGBA backing
/// surface in pixel units, and the scale factors that convert the point
/// coordinates of the public API into pixels at the bottom of the pipeline.
pub struct WindowTarget {
    target: Box<dyn PresentTarget>,
    surface: Surface,
    scale_x: f64,
    scale_y: f64,
    hit_test_info: HitTestInfo,
    shown: bool,
}

impl WindowTarget {
    pub fn new(target: Box<dyn PresentTarget>) -> Result<Self> {
        let (w, h) = target.size_in_pixels();
        let (scale_x, scale_y) = target.scale();
        let surface = Surface::new(w.max(1), h.max(1), PixelFormat::Rgba32)?;
        Ok(Self {
            target,
            surface,
            scale_x,
            scale_y,
            hit_test_info: HitTestInfo::default(),
            shown: false,
        })
    }

    /// Re-queries the drawable size and scale; rebuilds the backing surface
    /// when either changed. Returns whether a rebuild happened.
    pub fn resize(&mut self) -> Result<bool> {
        let (w, h) = self.target.size_in_pixels();
        let (scale_x, scale_y) = self.target.scale();
        let changed = w != self.surface.width()
            || h != self.surface.height()
            || scale_x != self.scale_x
            || scale_y != self.scale_y;
        if changed {
            self.surface = Surface::new(w.max(1), h.max(1), PixelFormat::Rgba32)?;
            self.scale_x = scale_x;
            self.scale_y = scale_y;
        }
        Ok(changed)
    }

    pub fn scale(&self) -> (f64, f64) {
        (self.scale_x, self.scale_y)
    }

    /// Size in points, the coordinate system of all public drawing calls.
    pub fn size_in_points(&self) -> (i32, i32) {
        (
            (self.surface.width() as f64 / self.scale_x) as i32,
            (self.surface.height() as f64 / self.scale_y) as i32,
        )
    }

    pub fn refresh_rate(&self) -> Option<f32> {
        self.target.refresh_rate()
    }

    pub fn hit_test_info(&self) -> HitTestInfo {
        self.hit_test_info
    }

    pub fn set_hit_test_info(&mut self, info: HitTestInfo) {
        self.hit_test_info = info;
    }

    pub(crate) fn surface(&self) -> &Surface {
        &self.surface
    }

    pub(crate) fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }

    /// Presents point-space rects, scaling them to pixels. The window is
    /// shown after its first presentation.
    pub(crate) fn present_points(&mut self, rects: &[Rect]) {
        let pixel_rects: Vec<Rect> = rects
            .iter()
            .map(|r| r.scaled(self.scale_x, self.scale_y))
            .collect();
        self.target.present(&self.surface, &pixel_rects);
        if !self.shown {
            self.target.show();
            self.shown = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_size_is_80_percent_of_display() {
        assert_eq!(default_window_size((1920, 1080), (0, 0)), (1536, 864));
        assert_eq!(default_window_size((1920, 1080), (800, 0)), (800, 864));
    }

    #[test]
    fn minimum_size_applies() {
        assert_eq!(default_window_size((200, 100), (0, 0)), (240, 180));
        assert_eq!(default_window_size((1920, 1080), (10, 10)), (240, 180));
    }

    #[test]
    fn size_in_points_divides_by_scale() {
        struct Scaled;
        impl PresentTarget for Scaled {
            fn size_in_pixels(&self) -> (i32, i32) {
                (400, 200)
            }
            fn scale(&self) -> (f64, f64) {
                (2.0, 2.0)
            }
            fn present(&mut self, _surface: &Surface, _rects: &[Rect]) {}
        }
        let window = WindowTarget::new(Box::new(Scaled)).unwrap();
        assert_eq!(window.size_in_points(), (200, 100));
    }
}
