use bytemuck::{Pod, Zeroable};

/// Struct representing a color with 8-bit red, green, blue, and alpha components.
///
/// An alpha of 0 is fully transparent, 255 fully opaque.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Creates an opaque color from red, green, and blue values.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Creates a color from red, green, blue, and alpha values.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Returns an opaque white color.
    pub const fn white() -> Self {
        Self::rgb(255, 255, 255)
    }

    /// Returns an opaque black color.
    pub const fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    /// Returns fully transparent black, the clear color for transparent canvases.
    pub const fn transparent() -> Self {
        Self::rgba(0, 0, 0, 0)
    }

    /// Builds a color from an optional (r, g, b, a?) tuple as supplied by the
    /// host boundary. `None` yields an even gray at the given intensity with
    /// full opacity, matching the behavior for omitted color arguments.
    pub fn from_channels(channels: Option<(u8, u8, u8, Option<u8>)>, default: u8) -> Self {
        match channels {
            Some((r, g, b, a)) => Self::rgba(r, g, b, a.unwrap_or(255)),
            None => Self::rgba(default, default, default, 255),
        }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}
