//! Image decoding for slides.
//!
//! The decoder is only ever called from the load worker thread. Anything it
//! returns (or panics with) is turned into a load result there; the control
//! thread never touches the filesystem for pixels.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::debug;

/// Pixels made transparent around the edge so scaled slides don't show a
/// hard seam while zooming.
pub const TRANSPARENT_BORDER: u32 = 4;

/// Largest width or height handed to the display; bigger images are downsized.
pub const MAX_TEXTURE_SIZE: u32 = 2048;

/// Decoding errors
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    Io(String),
    Image(String),
    Empty,
    /// Decoder panicked.
    Fault(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Io(e) => write!(f, "I/O error: {}", e),
            DecodeError::Image(e) => write!(f, "Image error: {}", e),
            DecodeError::Empty => write!(f, "Image has no pixels"),
            DecodeError::Fault(e) => write!(f, "Decoder fault: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decoded RGBA8 pixels. Shared by handle so slides clone cheaply.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: Arc<Vec<u8>>,
    width: u32,
    height: u32,
}

impl DecodedImage {
    pub fn from_rgba8(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            pixels: Arc::new(pixels),
            width,
            height,
        }
    }

    /// Solid placeholder, used by tests and scripted decoders.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::from_rgba8(vec![0u8; (width * height * 4) as usize], width, height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Memory held by the pixel buffer (bytes)
    pub fn mem(&self) -> usize {
        self.pixels.len()
    }
}

/// Turns a file into pixels.
pub trait ImageDecoder: Send + 'static {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError>;
}

/// Decoder backed by the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageCrateDecoder {
    max_dimension: u32,
    border: u32,
}

impl Default for ImageCrateDecoder {
    fn default() -> Self {
        Self {
            max_dimension: MAX_TEXTURE_SIZE,
            border: TRANSPARENT_BORDER,
        }
    }
}

impl ImageCrateDecoder {
    pub fn new(max_dimension: u32, border: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            border,
        }
    }
}

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
        debug!("Decoding image: {}", path.display());

        let reader = image::ImageReader::open(path)
            .map_err(|e| DecodeError::Io(format!("{}: {}", path.display(), e)))?
            .with_guessed_format()
            .map_err(|e| DecodeError::Io(format!("{}: {}", path.display(), e)))?;

        let mut img = reader
            .decode()
            .map_err(|e| DecodeError::Image(format!("{}: {}", path.display(), e)))?;

        if img.width() == 0 || img.height() == 0 {
            return Err(DecodeError::Empty);
        }

        if img.width() > self.max_dimension || img.height() > self.max_dimension {
            img = img.resize(
                self.max_dimension,
                self.max_dimension,
                image::imageops::FilterType::Triangle,
            );
        }

        let mut rgba = img.to_rgba8();
        clear_border(&mut rgba, self.border);

        let (width, height) = rgba.dimensions();
        Ok(DecodedImage::from_rgba8(rgba.into_raw(), width, height))
    }
}

/// Make a `border`-pixel frame fully transparent.
fn clear_border(img: &mut image::RgbaImage, border: u32) {
    let (width, height) = img.dimensions();
    for y in 0..height {
        for x in 0..width {
            let edge = x < border || y < border || x + border >= width || y + border >= height;
            if edge {
                img.put_pixel(x, y, image::Rgba([0, 0, 0, 0]));
            }
        }
    }
}
