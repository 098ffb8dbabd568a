//! Thin shaping layer: turns a byte run into (glyph index, cluster) pairs
//! using the first font of a group. Fallback resolution happens later, per
//! glyph, when index 0 comes back for a cluster.

use rustybuzz::{Direction, UnicodeBuffer};

/// One shaped glyph: the index into the shaped font and the byte offset of
/// the cluster it came from. The cluster's codepoint is decoded on demand for
/// fallback lookup.
pub(crate) struct ShapedGlyph {
    pub glyph_id: u32,
    pub cluster: u32,
}

impl ShapedGlyph {
    /// Codepoint at this glyph's cluster offset.
    pub fn codepoint(&self, text: &str) -> char {
        text[self.cluster as usize..].chars().next().unwrap_or('\0')
    }
}

/// Shapes `text` left-to-right against the face in `data`. Advances are not
/// taken from the shaper; they come from the glyph atlas metrics so hinting
/// and tab handling stay consistent with rendering.
pub(crate) fn shape(data: &[u8], text: &str) -> Vec<ShapedGlyph> {
    let Some(face) = rustybuzz::Face::from_slice(data, 0) else {
        return Vec::new();
    };

    let mut buffer = UnicodeBuffer::new();
    buffer.push_str(text);
    buffer.set_direction(Direction::LeftToRight);

    let output = rustybuzz::shape(&face, &[], buffer);
    output
        .glyph_infos()
        .iter()
        .map(|info| ShapedGlyph {
            glyph_id: info.glyph_id,
            cluster: info.cluster,
        })
        .collect()
}
