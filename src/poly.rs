//! Scanline polygon filling with antialiased coverage. Tagged point runs are
//! flattened into line segments and accumulated into a signed-area buffer;
//! one prefix sum per row turns the buffer into per-pixel coverage.

use crate::geometry::{PolyPoint, Rect, POINT_CONTROL_CONIC, POINT_CONTROL_CUBIC};
use crate::surface::DrawTarget;
use crate::Color;

/// Hard cap on the number of tagged points accepted by a single draw-poly.
pub const MAX_POLY_POINTS: usize = 1024;

const TESS_TOL: f32 = 0.25;
const MAX_TESS_LEVEL: usize = 10;

/// A single closed contour as flat line-segment vertices.
#[derive(Default)]
pub(crate) struct Contour {
    points: Vec<(f32, f32)>,
}

impl Contour {
    pub fn move_to(&mut self, x: f32, y: f32) {
        self.points.clear();
        self.points.push((x, y));
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        self.points.push((x, y));
    }

    pub fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        // Elevate to a cubic and reuse the cubic flattener.
        let (px, py) = self.last();
        let c1x = px + 2.0 / 3.0 * (cx - px);
        let c1y = py + 2.0 / 3.0 * (cy - py);
        let c2x = x + 2.0 / 3.0 * (cx - x);
        let c2y = y + 2.0 / 3.0 * (cy - y);
        self.cubic_to(c1x, c1y, c2x, c2y, x, y);
    }

    pub fn cubic_to(&mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) {
        let (px, py) = self.last();
        self.tesselate(px, py, c1x, c1y, c2x, c2y, x, y, 0);
    }

    fn last(&self) -> (f32, f32) {
        self.points.last().copied().unwrap_or((0.0, 0.0))
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> Vec<(f32, f32)> {
        self.points
    }

    #[allow(clippy::too_many_arguments)]
    fn tesselate(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        x3: f32,
        y3: f32,
        x4: f32,
        y4: f32,
        level: usize,
    ) {
        if level > MAX_TESS_LEVEL {
            self.points.push((x4, y4));
            return;
        }

        let x12 = (x1 + x2) * 0.5;
        let y12 = (y1 + y2) * 0.5;
        let x23 = (x2 + x3) * 0.5;
        let y23 = (y2 + y3) * 0.5;
        let x34 = (x3 + x4) * 0.5;
        let y34 = (y3 + y4) * 0.5;
        let x123 = (x12 + x23) * 0.5;
        let y123 = (y12 + y23) * 0.5;

        let dx = x4 - x1;
        let dy = y4 - y1;
        let d2 = ((x2 - x4) * dy - (y2 - y4) * dx).abs();
        let d3 = ((x3 - x4) * dy - (y3 - y4) * dx).abs();

        if (d2 + d3) * (d2 + d3) < TESS_TOL * (dx * dx + dy * dy) {
            self.points.push((x4, y4));
            return;
        }

        let x234 = (x23 + x34) * 0.5;
        let y234 = (y23 + y34) * 0.5;
        let x1234 = (x123 + x234) * 0.5;
        let y1234 = (y123 + y234) * 0.5;

        self.tesselate(x1, y1, x12, y12, x123, y123, x1234, y1234, level + 1);
        self.tesselate(x1234, y1234, x234, y234, x34, y34, x4, y4, level + 1);
    }
}

/// Flattens a tagged point run into one closed contour. The tag pattern is
/// NORMAL for straight vertices, NORMAL/CONIC/NORMAL for conic segments and
/// NORMAL/CUBIC/CUBIC/NORMAL for cubic segments; stray control tags are
/// treated as straight vertices so a malformed run degrades instead of
/// crashing.
pub(crate) fn flatten(points: &[PolyPoint], scale_x: f32, scale_y: f32) -> Vec<(f32, f32)> {
    let mut contour = Contour::default();
    let at = |p: &PolyPoint| (p.x * scale_x, p.y * scale_y);

    let mut i = 0;
    while i < points.len() {
        let (x, y) = at(&points[i]);
        if contour.points.is_empty() {
            contour.move_to(x, y);
            i += 1;
            continue;
        }
        match points[i].tag {
            POINT_CONTROL_CONIC if i + 1 < points.len() => {
                let (ex, ey) = at(&points[i + 1]);
                contour.quad_to(x, y, ex, ey);
                i += 2;
            }
            POINT_CONTROL_CUBIC if i + 2 < points.len() => {
                let (c2x, c2y) = at(&points[i + 1]);
                let (ex, ey) = at(&points[i + 2]);
                contour.cubic_to(x, y, c2x, c2y, ex, ey);
                i += 3;
            }
            _ => {
                contour.line_to(x, y);
                i += 1;
            }
        }
    }
    contour.points
}

/// Accumulates antialiased coverage for closed contours over a `width` ×
/// `height` window. Geometry is given in window-local coordinates; anything
/// left of the window still contributes winding, anything right of it is
/// absorbed by a gutter column.
pub(crate) struct CoverageRaster {
    width: usize,
    height: usize,
    acc: Vec<f32>,
}

impl CoverageRaster {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            // one gutter column past the right edge
            acc: vec![0.0; (width + 2) * height],
        }
    }

    pub fn fill_contour(&mut self, points: &[(f32, f32)]) {
        if points.len() < 3 {
            return;
        }
        for i in 0..points.len() {
            let p0 = points[i];
            let p1 = points[(i + 1) % points.len()];
            self.add_line(p0, p1);
        }
    }

    fn add_line(&mut self, p0: (f32, f32), p1: (f32, f32)) {
        if p0.1 == p1.1 {
            return;
        }
        let (dir, top, bottom) = if p0.1 < p1.1 {
            (1.0f32, p0, p1)
        } else {
            (-1.0f32, p1, p0)
        };
        let dxdy = (bottom.0 - top.0) / (bottom.1 - top.1);
        let max_x = self.width as f32;
        let clamp_x = move |x: f32| x.clamp(0.0, max_x);

        let y_start = (top.1.floor() as i32).max(0);
        let y_end = (bottom.1.ceil() as i32).min(self.height as i32);
        for y in y_start..y_end {
            let y_top = (y as f32).max(top.1);
            let y_bottom = ((y + 1) as f32).min(bottom.1);
            let dy = y_bottom - y_top;
            if dy <= 0.0 {
                continue;
            }
            let xa = clamp_x(top.0 + dxdy * (y_top - top.1));
            let xb = clamp_x(top.0 + dxdy * (y_bottom - top.1));
            self.add_span(y as usize, xa, xb, dy * dir);
        }
    }

    /// Distributes the signed area `d` of a span crossing one scanline onto
    /// the cells between `xa` and `xb`.
    fn add_span(&mut self, y: usize, xa: f32, xb: f32, d: f32) {
        let row = y * (self.width + 2);
        let (x0, x1) = if xa < xb { (xa, xb) } else { (xb, xa) };
        let x0_floor = x0.floor();
        let x0i = x0_floor as usize;
        let x1_ceil = x1.ceil();
        let x1i = x1_ceil as usize;

        if x1i <= x0i + 1 {
            // The span stays within one cell.
            let xmf = 0.5 * (x0 + x1) - x0_floor;
            self.acc[row + x0i] += d * (1.0 - xmf);
            self.acc[row + x0i + 1] += d * xmf;
            return;
        }

        let s = 1.0 / (x1 - x0);
        let x0f = x0 - x0_floor;
        let a0 = 0.5 * s * (1.0 - x0f) * (1.0 - x0f);
        let x1f = x1 - x1_ceil + 1.0;
        let am = 0.5 * s * x1f * x1f;

        self.acc[row + x0i] += d * a0;
        if x1i == x0i + 2 {
            self.acc[row + x0i + 1] += d * (1.0 - a0 - am);
        } else {
            let a1 = s * (1.5 - x0f);
            self.acc[row + x0i + 1] += d * (a1 - a0);
            for xi in x0i + 2..x1i - 1 {
                self.acc[row + xi] += d * s;
            }
            let a2 = a1 + (x1i - x0i - 3) as f32 * s;
            self.acc[row + x1i - 1] += d * (1.0 - a2 - am);
        }
        self.acc[row + x1i] += d * am;
    }

    /// Resolves the accumulated deltas of one row into 0..=255 coverage.
    pub fn row_coverage(&self, y: usize, out: &mut [u8]) {
        let row = &self.acc[y * (self.width + 2)..y * (self.width + 2) + self.width];
        let mut sum = 0.0f32;
        for (x, delta) in row.iter().enumerate() {
            sum += delta;
            out[x] = (sum.abs() * 255.0).min(255.0) as u8;
        }
    }
}

/// Rasterizes and blends a tagged polygon into the target. Coordinates are in
/// points; the window is the polygon's control box intersected with the
/// surface clip.
pub(crate) fn draw_poly(target: &mut DrawTarget<'_>, points: &[PolyPoint], color: Color) {
    if color.a == 0 {
        return;
    }
    let contour = flatten(points, target.scale_x as f32, target.scale_y as f32);
    if contour.len() < 3 {
        return;
    }

    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for &(x, y) in &contour {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let bbox = Rect::new(
        min_x.floor() as i32,
        min_y.floor() as i32,
        (max_x.ceil() - min_x.floor()) as i32,
        (max_y.ceil() - min_y.floor()) as i32,
    );
    let window = bbox.intersect(target.surface.clip());
    if window.is_empty() {
        return;
    }

    let mut raster = CoverageRaster::new(window.width as usize, window.height as usize);
    let local: Vec<(f32, f32)> = contour
        .iter()
        .map(|&(x, y)| (x - window.x as f32, y - window.y as f32))
        .collect();
    raster.fill_contour(&local);

    let mut coverage = vec![0u8; window.width as usize];
    for y in 0..window.height {
        raster.row_coverage(y as usize, &mut coverage);
        for x in 0..window.width {
            let cov = coverage[x as usize];
            if cov > 0 {
                target
                    .surface
                    .blend_coverage(window.x + x, window.y + y, color, cov);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PolySegment, Rect};
    use crate::surface::{PixelFormat, Surface};

    fn square(x: f32, y: f32, size: f32) -> Vec<PolyPoint> {
        let mut pts = Vec::new();
        for seg in [
            PolySegment::Point { x, y },
            PolySegment::Point { x: x + size, y },
            PolySegment::Point { x: x + size, y: y + size },
            PolySegment::Point { x, y: y + size },
        ] {
            seg.write_points(&mut pts);
        }
        pts
    }

    #[test]
    fn filled_square_covers_interior() {
        let mut surface = Surface::new(20, 20, PixelFormat::Rgba32).unwrap();
        let mut target = DrawTarget { surface: &mut surface, scale_x: 1.0, scale_y: 1.0 };
        draw_poly(&mut target, &square(2.0, 2.0, 10.0), Color::rgb(0, 255, 0));

        assert_eq!(surface.read_rgba(Rect::new(5, 5, 1, 1)), vec![0, 255, 0, 0]);
        assert_eq!(surface.read_rgba(Rect::new(2, 2, 1, 1)), vec![0, 255, 0, 0]);
        assert_eq!(surface.read_rgba(Rect::new(1, 1, 1, 1)), vec![0, 0, 0, 0]);
        assert_eq!(surface.read_rgba(Rect::new(13, 13, 1, 1)), vec![0, 0, 0, 0]);
    }

    #[test]
    fn clip_limits_polygon() {
        let mut surface = Surface::new(20, 20, PixelFormat::Rgba32).unwrap();
        surface.set_clip(Rect::new(0, 0, 5, 5));
        let mut target = DrawTarget { surface: &mut surface, scale_x: 1.0, scale_y: 1.0 };
        draw_poly(&mut target, &square(0.0, 0.0, 20.0), Color::rgb(255, 0, 0));

        assert_eq!(surface.read_rgba(Rect::new(4, 4, 1, 1)), vec![255, 0, 0, 0]);
        assert_eq!(surface.read_rgba(Rect::new(6, 6, 1, 1)), vec![0, 0, 0, 0]);
    }

    #[test]
    fn half_pixel_edge_blends() {
        let mut surface = Surface::new(4, 4, PixelFormat::Rgba32).unwrap();
        let mut target = DrawTarget { surface: &mut surface, scale_x: 1.0, scale_y: 1.0 };
        draw_poly(&mut target, &square(0.0, 0.0, 2.5), Color::rgb(255, 255, 255));

        let edge = surface.read_rgba(Rect::new(2, 1, 1, 1));
        assert!(edge[0] > 100 && edge[0] < 150, "expected ~half coverage, got {}", edge[0]);
    }

    #[test]
    fn conic_segment_bulges_past_chord() {
        let mut pts = Vec::new();
        PolySegment::Conic {
            x0: 0.0,
            y0: 10.0,
            cx: 10.0,
            cy: -10.0,
            x1: 20.0,
            y1: 10.0,
        }
        .write_points(&mut pts);
        let flat = flatten(&pts, 1.0, 1.0);
        let min_y = flat.iter().map(|p| p.1).fold(f32::MAX, f32::min);
        // apex of the quadratic is at y = 0
        assert!(min_y < 1.0 && min_y > -1.0, "apex at {min_y}");
    }

    #[test]
    fn degenerate_run_is_noop() {
        let mut surface = Surface::new(4, 4, PixelFormat::Rgba32).unwrap();
        let mut target = DrawTarget { surface: &mut surface, scale_x: 1.0, scale_y: 1.0 };
        draw_poly(
            &mut target,
            &[PolyPoint::normal(1.0, 1.0), PolyPoint::normal(2.0, 2.0)],
            Color::white(),
        );
        assert!(surface.pixels().iter().all(|&b| b == 0));
    }
}
