//! Append-only log of typed drawing commands. Records are written
//! contiguously into an 8-byte-aligned arena so the dirty tracker can hash
//! raw record bytes; each record carries its own size for iteration without
//! type dispatch, and its payload always begins with the bounding rect.

use bytemuck::{Pod, Zeroable};

use crate::geometry::{PolyPoint, Rect};
use crate::Color;

/// Initial arena capacity in bytes.
pub const COMMAND_BUF_INIT_SIZE: usize = 512 * 1024;
/// Growth factor applied on overflow.
const COMMAND_BUF_RESIZE_RATE: f64 = 1.2;

/// Maximum number of fonts in a fallback chain.
pub const FONT_FALLBACK_MAX: usize = 10;

const TAG_SET_CLIP: u32 = 0;
const TAG_DRAW_RECT: u32 = 1;
const TAG_DRAW_TEXT: u32 = 2;
const TAG_DRAW_POLY: u32 = 3;
const TAG_DRAW_CANVAS: u32 = 4;

pub const DRAW_RECT_REPLACE: u32 = 1;
pub const DRAW_CANVAS_BLEND: u32 = 1;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandTag {
    SetClip,
    DrawRect,
    DrawText,
    DrawPoly,
    DrawCanvas,
}

impl CommandTag {
    fn raw(self) -> u32 {
        match self {
            Self::SetClip => TAG_SET_CLIP,
            Self::DrawRect => TAG_DRAW_RECT,
            Self::DrawText => TAG_DRAW_TEXT,
            Self::DrawPoly => TAG_DRAW_POLY,
            Self::DrawCanvas => TAG_DRAW_CANVAS,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct CommandHeader {
    tag: u32,
    size: u32,
}

const HEADER_SIZE: usize = std::mem::size_of::<CommandHeader>();

#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct SetClipCmd {
    pub rect: Rect,
}

#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct DrawRectCmd {
    pub rect: Rect,
    pub color: Color,
    pub flags: u32,
}

/// Fixed part of a draw-text record; the UTF-8 text bytes follow it. The
/// `fonts` array carries the stable identity of every group member so the
/// record hash changes when the group does; `group` indexes the frame's font
/// root set for access during redraw.
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct DrawTextCmd {
    pub rect: Rect,
    pub color: Color,
    pub tab_size: i32,
    pub fonts: [u64; FONT_FALLBACK_MAX],
    pub text_x: f64,
    /// Absolute tab origin in points; NaN when tab stops are relative.
    pub tab_offset: f64,
    pub len: u32,
    pub group: u32,
}

impl Default for DrawTextCmd {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

/// Fixed part of a draw-poly record; `npoints` tagged points follow it.
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct DrawPolyCmd {
    pub rect: Rect,
    pub color: Color,
    pub npoints: u32,
}

/// A blit of a canvas surface. `surface_id` is the pinned surface ref's
/// stable identity and `version` the canvas version at recording time, so the
/// hash invalidates destinations when the source changes; `pin` indexes the
/// frame's canvas pin set.
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct DrawCanvasCmd {
    pub rect: Rect,
    pub version: u64,
    pub surface_id: u64,
    pub pin: u32,
    pub flags: u32,
}

/// A decoded view over one record's payload.
pub enum Command<'a> {
    SetClip(&'a SetClipCmd),
    DrawRect(&'a DrawRectCmd),
    DrawText { cmd: &'a DrawTextCmd, text: &'a [u8] },
    DrawPoly { cmd: &'a DrawPolyCmd, points: &'a [PolyPoint] },
    DrawCanvas(&'a DrawCanvasCmd),
}

/// Borrowed view of one raw record; `bytes` spans header and payload and is
/// what the dirty tracker hashes.
#[derive(Copy, Clone)]
pub struct CommandRef<'a> {
    pub bytes: &'a [u8],
}

impl<'a> CommandRef<'a> {
    fn header(&self) -> CommandHeader {
        *bytemuck::from_bytes(&self.bytes[..HEADER_SIZE])
    }

    fn payload(&self) -> &'a [u8] {
        &self.bytes[HEADER_SIZE..]
    }

    /// The bounding rect every payload starts with.
    pub fn rect(&self) -> Rect {
        *bytemuck::from_bytes(&self.payload()[..std::mem::size_of::<Rect>()])
    }

    /// Decodes the record. Returns `None` for a tag this build does not know,
    /// letting the caller skip it.
    pub fn decode(&self) -> Option<Command<'a>> {
        let payload = self.payload();
        match self.header().tag {
            TAG_SET_CLIP => Some(Command::SetClip(bytemuck::from_bytes(
                &payload[..std::mem::size_of::<SetClipCmd>()],
            ))),
            TAG_DRAW_RECT => Some(Command::DrawRect(bytemuck::from_bytes(
                &payload[..std::mem::size_of::<DrawRectCmd>()],
            ))),
            TAG_DRAW_TEXT => {
                let fixed = std::mem::size_of::<DrawTextCmd>();
                let cmd: &DrawTextCmd = bytemuck::from_bytes(&payload[..fixed]);
                let text = &payload[fixed..fixed + cmd.len as usize];
                Some(Command::DrawText { cmd, text })
            }
            TAG_DRAW_POLY => {
                let fixed = std::mem::size_of::<DrawPolyCmd>();
                let cmd: &DrawPolyCmd = bytemuck::from_bytes(&payload[..fixed]);
                let points_len = cmd.npoints as usize * std::mem::size_of::<PolyPoint>();
                let points = bytemuck::cast_slice(&payload[fixed..fixed + points_len]);
                Some(Command::DrawPoly { cmd, points })
            }
            TAG_DRAW_CANVAS => Some(Command::DrawCanvas(bytemuck::from_bytes(
                &payload[..std::mem::size_of::<DrawCanvasCmd>()],
            ))),
            _ => None,
        }
    }
}

/// Growable aligned arena of drawing commands. Owned by exactly one frame
/// pipeline; not thread-safe.
pub struct CommandBuffer {
    buf: Vec<u64>,
    /// Write offset in bytes; always a multiple of 8.
    idx: usize,
    resize_issue: bool,
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            idx: 0,
            resize_issue: false,
        }
    }

    /// Bytes currently allocated. Never shrinks.
    pub fn capacity(&self) -> usize {
        self.buf.len() * 8
    }

    /// Bytes written this frame.
    pub fn len(&self) -> usize {
        self.idx
    }

    pub fn is_empty(&self) -> bool {
        self.idx == 0
    }

    /// O(1) reset; the arena is kept for reuse.
    pub fn reset(&mut self) {
        self.idx = 0;
    }

    /// Clears the resize-issue latch at the start of a frame.
    pub fn begin_frame(&mut self) {
        self.resize_issue = false;
    }

    fn grow_to(&mut self, needed: usize) -> bool {
        let mut new_size = self.capacity();
        while new_size < needed {
            new_size = if new_size == 0 {
                COMMAND_BUF_INIT_SIZE
            } else {
                (new_size as f64 * COMMAND_BUF_RESIZE_RATE) as usize
            };
        }
        let new_words = new_size.div_ceil(8);
        let additional = new_words - self.buf.len();
        if self.buf.try_reserve_exact(additional).is_err() {
            log::warn!("unable to resize command buffer to {new_size} bytes; dropping commands until next frame");
            self.resize_issue = true;
            return false;
        }
        self.buf.resize(new_words, 0);
        true
    }

    /// Appends one record: the POD `fixed` part followed by `extra` payload
    /// bytes, zero-padded to 8-byte alignment. Returns false when the record
    /// was dropped because the arena could not grow.
    pub fn push<T: Pod>(&mut self, tag: CommandTag, fixed: &T, extra: &[u8]) -> bool {
        if self.resize_issue {
            return false;
        }
        let payload = std::mem::size_of::<T>() + extra.len();
        let size = (HEADER_SIZE + payload + 7) & !7;
        if self.idx + size > self.capacity() && !self.grow_to(self.idx + size) {
            return false;
        }
        let start = self.idx;
        self.idx += size;

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.buf);
        let record = &mut bytes[start..start + size];
        record.fill(0);
        *bytemuck::from_bytes_mut(&mut record[..HEADER_SIZE]) = CommandHeader {
            tag: tag.raw(),
            size: size as u32,
        };
        let fixed_len = std::mem::size_of::<T>();
        record[HEADER_SIZE..HEADER_SIZE + fixed_len].copy_from_slice(bytemuck::bytes_of(fixed));
        record[HEADER_SIZE + fixed_len..HEADER_SIZE + payload].copy_from_slice(extra);
        true
    }

    /// Iterates the records written this frame in order.
    pub fn iter(&self) -> Commands<'_> {
        Commands {
            bytes: bytemuck::cast_slice(&self.buf),
            offset: 0,
            end: self.idx,
        }
    }
}

pub struct Commands<'a> {
    bytes: &'a [u8],
    offset: usize,
    end: usize,
}

impl<'a> Iterator for Commands<'a> {
    type Item = CommandRef<'a>;

    fn next(&mut self) -> Option<CommandRef<'a>> {
        if self.offset >= self.end {
            return None;
        }
        let header: &CommandHeader =
            bytemuck::from_bytes(&self.bytes[self.offset..self.offset + HEADER_SIZE]);
        let size = header.size as usize;
        let record = CommandRef {
            bytes: &self.bytes[self.offset..self.offset + size],
        };
        self.offset += size;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layouts_have_no_padding() {
        assert_eq!(std::mem::size_of::<CommandHeader>(), 8);
        assert_eq!(std::mem::size_of::<SetClipCmd>(), 16);
        assert_eq!(std::mem::size_of::<DrawRectCmd>(), 24);
        assert_eq!(std::mem::size_of::<DrawTextCmd>(), 128);
        assert_eq!(std::mem::size_of::<DrawPolyCmd>(), 24);
        assert_eq!(std::mem::size_of::<DrawCanvasCmd>(), 40);
    }

    #[test]
    fn push_and_iterate_round_trip() {
        let mut buf = CommandBuffer::new();
        let rect_cmd = DrawRectCmd {
            rect: Rect::new(1, 2, 3, 4),
            color: Color::rgb(9, 8, 7),
            flags: DRAW_RECT_REPLACE,
        };
        assert!(buf.push(CommandTag::DrawRect, &rect_cmd, &[]));

        let text_cmd = DrawTextCmd {
            rect: Rect::new(5, 6, 7, 8),
            len: 5,
            ..Default::default()
        };
        assert!(buf.push(CommandTag::DrawText, &text_cmd, b"hello"));

        let mut iter = buf.iter();
        match iter.next().unwrap().decode().unwrap() {
            Command::DrawRect(cmd) => {
                assert_eq!(cmd.rect, Rect::new(1, 2, 3, 4));
                assert_eq!(cmd.flags, DRAW_RECT_REPLACE);
            }
            _ => panic!("expected draw-rect"),
        }
        match iter.next().unwrap().decode().unwrap() {
            Command::DrawText { cmd, text } => {
                assert_eq!(cmd.rect, Rect::new(5, 6, 7, 8));
                assert_eq!(text, b"hello");
            }
            _ => panic!("expected draw-text"),
        }
        assert!(iter.next().is_none());
    }

    #[test]
    fn every_record_reports_its_bounding_rect() {
        let mut buf = CommandBuffer::new();
        buf.push(
            CommandTag::SetClip,
            &SetClipCmd { rect: Rect::new(0, 0, 10, 10) },
            &[],
        );
        let mut points = Vec::new();
        points.push(PolyPoint::normal(0.0, 0.0));
        points.push(PolyPoint::normal(4.0, 0.0));
        points.push(PolyPoint::normal(4.0, 4.0));
        buf.push(
            CommandTag::DrawPoly,
            &DrawPolyCmd {
                rect: Rect::new(0, 0, 4, 4),
                color: Color::white(),
                npoints: points.len() as u32,
            },
            bytemuck::cast_slice(&points),
        );
        let rects: Vec<Rect> = buf.iter().map(|c| c.rect()).collect();
        assert_eq!(rects, vec![Rect::new(0, 0, 10, 10), Rect::new(0, 0, 4, 4)]);
    }

    #[test]
    fn poly_points_survive_the_arena() {
        let mut buf = CommandBuffer::new();
        let points = [
            PolyPoint::normal(0.5, 1.5),
            PolyPoint::normal(2.5, 3.5),
            PolyPoint::normal(4.5, 5.5),
        ];
        buf.push(
            CommandTag::DrawPoly,
            &DrawPolyCmd {
                rect: Rect::of_size(6, 6),
                color: Color::white(),
                npoints: 3,
            },
            bytemuck::cast_slice(&points),
        );
        match buf.iter().next().unwrap().decode().unwrap() {
            Command::DrawPoly { points: decoded, .. } => assert_eq!(decoded, &points),
            _ => panic!("expected draw-poly"),
        }
    }

    #[test]
    fn reset_is_cheap_and_keeps_capacity() {
        let mut buf = CommandBuffer::new();
        for _ in 0..100 {
            buf.push(
                CommandTag::DrawRect,
                &DrawRectCmd { rect: Rect::of_size(1, 1), ..Default::default() },
                &[],
            );
        }
        let capacity = buf.capacity();
        assert!(capacity >= COMMAND_BUF_INIT_SIZE);
        buf.reset();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), capacity);
        assert!(buf.iter().next().is_none());
    }

    #[test]
    fn identical_pushes_produce_identical_bytes() {
        let mut a = CommandBuffer::new();
        let mut b = CommandBuffer::new();
        let cmd = DrawTextCmd {
            rect: Rect::new(0, 0, 40, 12),
            color: Color::rgb(1, 2, 3),
            len: 3,
            ..Default::default()
        };
        a.push(CommandTag::DrawText, &cmd, b"abc");
        b.push(CommandTag::DrawText, &cmd, b"abc");
        let ra = a.iter().next().unwrap();
        let rb = b.iter().next().unwrap();
        assert_eq!(ra.bytes, rb.bytes);
    }
}
