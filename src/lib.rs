//! Command-buffered 2D software renderer with dirty-region tracking.
//!
//! Drawing calls issued between [`Renderer::begin_frame`] and
//! [`Renderer::end_frame`] are recorded, not drawn. At the end of the frame
//! the command log is hashed into a fixed grid of screen cells, compared to
//! the previous frame's hashes, and only the changed cells, merged into
//! rectangles, are redrawn and presented. The crate covers the pixel
//! surface, the shaping and glyph-atlas font engine, copy-on-write off-screen
//! canvases, and the window presentation seam; the OS event loop and the
//! scripting layer live on the host side of the API.
//!
//! ```no_run
//! use paintbox::{Color, Renderer, VoidTarget};
//!
//! let mut renderer = Renderer::new(Box::new(VoidTarget::new(800, 600)))?;
//! renderer.begin_frame();
//! renderer.draw_rect(10.0, 10.0, 100.0, 40.0, Color::rgb(200, 60, 40));
//! renderer.end_frame();
//! # Ok::<(), paintbox::ErrorKind>(())
//! ```

mod cache;
mod canvas;
mod color;
mod command;
mod error;
mod geometry;
mod grid;
mod poly;
mod renderer;
mod surface;
mod window;

pub mod font;

pub use canvas::{Canvas, SaveFormat};
pub use color::Color;
pub use command::FONT_FALLBACK_MAX;
pub use error::ErrorKind;
pub use font::{
    font_metadata, FontAntialiasing, FontGroup, FontHandle, FontHinting, FontMetadata,
    FontOptions, FontStyle, Tab,
};
pub use geometry::{PolyPoint, PolySegment, Rect};
pub use poly::MAX_POLY_POINTS;
pub use renderer::Renderer;
pub use surface::{BlendMode, DrawTarget, PixelFormat, ScaleMode, Surface};
pub use window::{
    default_window_size, HitTestInfo, PresentTarget, VoidTarget, WindowTarget,
    MIN_WINDOW_HEIGHT, MIN_WINDOW_WIDTH,
};

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ErrorKind>;
