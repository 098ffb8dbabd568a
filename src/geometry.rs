use bytemuck::{Pod, Zeroable};

/// Axis-aligned rectangle with an integer origin and extent, in points or
/// pixels depending on context. A rect with a zero dimension is empty.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub const fn of_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Rounds fractional point coordinates onto the integer grid. Both edges
    /// round half-up so that a rect spanning (x, x + w) keeps its width when
    /// x has a fractional part.
    pub fn round_from(x: f64, y: f64, width: f64, height: f64) -> Self {
        let x1 = (x + 0.5).floor() as i32;
        let y1 = (y + 0.5).floor() as i32;
        let x2 = (x + width + 0.5).floor() as i32;
        let y2 = (y + height + 0.5).floor() as i32;
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Edge-inclusive overlap test; rects that merely touch count as
    /// overlapping so that adjacent dirty cells merge into one region.
    pub fn overlaps(&self, other: Rect) -> bool {
        other.x + other.width >= self.x
            && other.x <= self.x + self.width
            && other.y + other.height >= self.y
            && other.y <= self.y + self.height
    }

    pub fn intersect(&self, other: Rect) -> Rect {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        Rect::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0))
    }

    pub fn merge(&self, other: Rect) -> Rect {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = (self.x + self.width).max(other.x + other.width);
        let y2 = (self.y + self.height).max(other.y + other.height);
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Scales a point-space rect into pixel space.
    pub fn scaled(&self, scale_x: f64, scale_y: f64) -> Rect {
        Rect::new(
            (self.x as f64 * scale_x) as i32,
            (self.y as f64 * scale_y) as i32,
            (self.width as f64 * scale_x) as i32,
            (self.height as f64 * scale_y) as i32,
        )
    }
}

/// Role of a polygon point within its contour.
pub const POINT_NORMAL: u32 = 0;
pub const POINT_CONTROL_CONIC: u32 = 1;
pub const POINT_CONTROL_CUBIC: u32 = 2;

/// A tagged polygon point as stored in a draw-poly command. The tag pattern
/// encodes straight vertices and the control points of conic and cubic
/// Bézier segments.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PolyPoint {
    pub x: f32,
    pub y: f32,
    pub tag: u32,
}

impl PolyPoint {
    pub const fn normal(x: f32, y: f32) -> Self {
        Self { x, y, tag: POINT_NORMAL }
    }
}

/// One validated polygon segment as accepted at the host boundary. Sequences
/// of these flatten into tagged [`PolyPoint`] runs for recording.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PolySegment {
    /// A straight vertex.
    Point { x: f32, y: f32 },
    /// A conic Bézier: on-curve start, control, on-curve end.
    Conic { x0: f32, y0: f32, cx: f32, cy: f32, x1: f32, y1: f32 },
    /// A cubic Bézier: on-curve start, two controls, on-curve end.
    Cubic {
        x0: f32,
        y0: f32,
        cx0: f32,
        cy0: f32,
        cx1: f32,
        cy1: f32,
        x1: f32,
        y1: f32,
    },
}

impl PolySegment {
    pub const fn point_count(&self) -> usize {
        match self {
            Self::Point { .. } => 1,
            Self::Conic { .. } => 3,
            Self::Cubic { .. } => 4,
        }
    }

    pub fn write_points(&self, out: &mut Vec<PolyPoint>) {
        match *self {
            Self::Point { x, y } => out.push(PolyPoint { x, y, tag: POINT_NORMAL }),
            Self::Conic { x0, y0, cx, cy, x1, y1 } => {
                out.push(PolyPoint { x: x0, y: y0, tag: POINT_NORMAL });
                out.push(PolyPoint { x: cx, y: cy, tag: POINT_CONTROL_CONIC });
                out.push(PolyPoint { x: x1, y: y1, tag: POINT_NORMAL });
            }
            Self::Cubic { x0, y0, cx0, cy0, cx1, cy1, x1, y1 } => {
                out.push(PolyPoint { x: x0, y: y0, tag: POINT_NORMAL });
                out.push(PolyPoint { x: cx0, y: cy0, tag: POINT_CONTROL_CUBIC });
                out.push(PolyPoint { x: cx1, y: cy1, tag: POINT_CONTROL_CUBIC });
                out.push(PolyPoint { x: x1, y: y1, tag: POINT_NORMAL });
            }
        }
    }
}

/// Control box of a tagged point run: the bounding rect over every point,
/// control points included.
pub fn poly_control_box(points: &[PolyPoint]) -> Option<Rect> {
    let first = points.first()?;
    let (mut min_x, mut min_y) = (first.x, first.y);
    let (mut max_x, mut max_y) = (first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let x = min_x.floor() as i32;
    let y = min_y.floor() as i32;
    Some(Rect::new(
        x,
        y,
        max_x.ceil() as i32 - x,
        max_y.ceil() as i32 - y,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_clamps_to_empty() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 5, 5);
        assert!(a.intersect(b).is_empty());
    }

    #[test]
    fn intersect_of_overlapping_rects() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(b), Rect::new(5, 5, 5, 5));
    }

    #[test]
    fn merge_covers_both() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 5, 5, 10);
        assert_eq!(a.merge(b), Rect::new(0, 0, 25, 15));
    }

    #[test]
    fn touching_rects_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(10, 0, 10, 10);
        assert!(a.overlaps(b));
    }

    #[test]
    fn rounding_keeps_width_across_fractions() {
        let r = Rect::round_from(0.75, 0.0, 10.0, 10.0);
        assert_eq!((r.x, r.width), (1, 10));
    }

    #[test]
    fn control_box_includes_control_points() {
        let mut pts = Vec::new();
        PolySegment::Conic {
            x0: 0.0,
            y0: 0.0,
            cx: 15.0,
            cy: -5.0,
            x1: 10.0,
            y1: 0.0,
        }
        .write_points(&mut pts);
        let bbox = poly_control_box(&pts).unwrap();
        assert_eq!(bbox, Rect::new(0, -5, 15, 5));
    }
}
