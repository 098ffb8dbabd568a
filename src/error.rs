use std::fmt::{self, Display, Formatter};
use std::io;

use image::ImageError;
use ttf_parser as ttf;

/// Enum with all possible renderer errors that could occur.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    GeneralError(String),
    ImageError(ImageError),
    IoError(io::Error),
    FontParseError(ttf::FaceParsingError),
    FontSizeInvalid,
    NoGlyphsFound,
    NoFontNamesFound,
    FontGroupEmpty,
    FontGroupTooLarge,
    TooManyPolyPoints,
    PixelDataSizeMismatch { expected: usize, got: usize },
    UnsupportedPixelFormat,
    UnsupportedImageFormat(String),
    OutOfMemory,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeneralError(message) => write!(f, "{message}"),
            Self::ImageError(error) => write!(f, "image error: {error}"),
            Self::IoError(error) => write!(f, "i/o error: {error}"),
            Self::FontParseError(error) => write!(f, "font parse error: {error}"),
            Self::FontSizeInvalid => write!(f, "font size must be a positive number"),
            Self::NoGlyphsFound => write!(f, "font provides no usable glyphs"),
            Self::NoFontNamesFound => write!(f, "no name records found in font"),
            Self::FontGroupEmpty => write!(f, "font group is empty"),
            Self::FontGroupTooLarge => write!(f, "font group exceeds the fallback limit"),
            Self::TooManyPolyPoints => write!(f, "too many polygon points"),
            Self::PixelDataSizeMismatch { expected, got } => {
                write!(f, "pixel data is {got} bytes, expected {expected}")
            }
            Self::UnsupportedPixelFormat => write!(f, "unsupported pixel format"),
            Self::UnsupportedImageFormat(format) => {
                write!(f, "unsupported image format: {format}")
            }
            Self::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl From<ImageError> for ErrorKind {
    fn from(error: ImageError) -> Self {
        Self::ImageError(error)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(error: io::Error) -> Self {
        Self::IoError(error)
    }
}

impl From<ttf::FaceParsingError> for ErrorKind {
    fn from(error: ttf::FaceParsingError) -> Self {
        Self::FontParseError(error)
    }
}

impl std::error::Error for ErrorKind {}
