//! Tile codec.
//!
//! The store treats encoded tile bytes as opaque. A [`TileCodec`] turns a
//! [`PixelBuffer`] into bytes for one image format and back; the store only
//! supplies the pixels and consumes pass/fail.
//!
//! # Design Decisions
//!
//! - **Interleaved only**: image formats store pixels interleaved, so banded
//!   buffers are rejected rather than silently transposed.
//!
//! - **Decode any known format**: a mosaic may hold files written by an
//!   earlier configuration, so decoding guesses the format from the bytes
//!   instead of trusting the configured one.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use bytes::Bytes;
use image::{DynamicImage, ImageBuffer, ImageFormat, ImageReader};

use crate::error::CodecError;
use crate::raster::{Photometric, PixelBuffer, PlanarLayout, Samples};

/// Extensions probed when looking for a tile file, after the codec's own.
pub const READ_EXTENSIONS: &[&str] = &["png", "tiff", "tif", "jpg", "jpeg"];

// =============================================================================
// TileCodec
// =============================================================================

/// Encoder/decoder for tile files.
pub trait TileCodec: Send + Sync {
    /// Format name recorded in the resource descriptor.
    fn format_name(&self) -> &'static str;

    /// File extension used for newly written tiles.
    fn extension(&self) -> &'static str;

    /// Encode pixels to the codec's format.
    fn encode(&self, tile: &PixelBuffer) -> Result<Bytes, CodecError>;

    /// Decode tile bytes back to pixels.
    fn decode(&self, data: &[u8]) -> Result<PixelBuffer, CodecError>;
}

/// Extensions to try for a tile file, the codec's own first.
pub fn candidate_extensions(codec: &dyn TileCodec) -> Vec<String> {
    let own = codec.extension();
    std::iter::once(own)
        .chain(READ_EXTENSIONS.iter().copied().filter(|ext| *ext != own))
        .map(str::to_string)
        .collect()
}

// =============================================================================
// TileFormat
// =============================================================================

/// Image formats available through [`ImageTileCodec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileFormat {
    #[default]
    Png,
    Tiff,
    Jpeg,
}

impl TileFormat {
    pub fn name(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Tiff => "tiff",
            TileFormat::Jpeg => "jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Tiff => "tiff",
            TileFormat::Jpeg => "jpg",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            TileFormat::Png => ImageFormat::Png,
            TileFormat::Tiff => ImageFormat::Tiff,
            TileFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(TileFormat::Png),
            "tiff" | "tif" => Ok(TileFormat::Tiff),
            "jpeg" | "jpg" => Ok(TileFormat::Jpeg),
            other => Err(format!("unknown tile format '{}' (expected png, tiff or jpeg)", other)),
        }
    }
}

// =============================================================================
// ImageTileCodec
// =============================================================================

/// [`TileCodec`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTileCodec {
    format: TileFormat,
}

impl ImageTileCodec {
    pub fn new(format: TileFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    fn to_dynamic(&self, tile: &PixelBuffer) -> Result<DynamicImage, CodecError> {
        if tile.planar() != PlanarLayout::Interleaved {
            return Err(CodecError::UnsupportedLayout {
                format: self.format.name(),
                reason: "banded sample layout".to_string(),
            });
        }

        let (w, h) = (tile.width(), tile.height());
        let image = match (tile.samples(), tile.bands()) {
            (Samples::U8(v), 1) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageLuma8),
            (Samples::U8(v), 2) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageLumaA8),
            (Samples::U8(v), 3) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgb8),
            (Samples::U8(v), 4) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgba8),
            (Samples::U16(v), 1) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageLuma16),
            (Samples::U16(v), 2) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageLumaA16),
            (Samples::U16(v), 3) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgb16),
            (Samples::U16(v), 4) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgba16),
            (Samples::F32(v), 3) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgb32F),
            (Samples::F32(v), 4) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgba32F),
            (samples, bands) => {
                return Err(CodecError::UnsupportedLayout {
                    format: self.format.name(),
                    reason: format!(
                        "{} band(s) of {}-bit {} samples",
                        bands,
                        samples.bits_per_sample(),
                        samples.sample_format()
                    ),
                })
            }
        };

        image.ok_or_else(|| CodecError::Encode {
            message: format!("sample buffer does not match {}x{} tile", w, h),
        })
    }
}

impl TileCodec for ImageTileCodec {
    fn format_name(&self) -> &'static str {
        self.format.name()
    }

    fn extension(&self) -> &'static str {
        self.format.extension()
    }

    fn encode(&self, tile: &PixelBuffer) -> Result<Bytes, CodecError> {
        let image = self.to_dynamic(tile)?;

        let mut output = Cursor::new(Vec::new());
        image
            .write_to(&mut output, self.format.image_format())
            .map_err(|e| CodecError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output.into_inner()))
    }

    fn decode(&self, data: &[u8]) -> Result<PixelBuffer, CodecError> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| CodecError::Decode {
                message: e.to_string(),
            })?;

        let image = reader.decode().map_err(|e| CodecError::Decode {
            message: e.to_string(),
        })?;

        from_dynamic(image)
    }
}

fn from_dynamic(image: DynamicImage) -> Result<PixelBuffer, CodecError> {
    use Photometric::{MinIsBlack, Rgb};

    let (w, h, bands, photometric, samples) = match image {
        DynamicImage::ImageLuma8(b) => (b.width(), b.height(), 1, MinIsBlack, Samples::U8(b.into_raw())),
        DynamicImage::ImageLumaA8(b) => (b.width(), b.height(), 2, MinIsBlack, Samples::U8(b.into_raw())),
        DynamicImage::ImageRgb8(b) => (b.width(), b.height(), 3, Rgb, Samples::U8(b.into_raw())),
        DynamicImage::ImageRgba8(b) => (b.width(), b.height(), 4, Rgb, Samples::U8(b.into_raw())),
        DynamicImage::ImageLuma16(b) => (b.width(), b.height(), 1, MinIsBlack, Samples::U16(b.into_raw())),
        DynamicImage::ImageLumaA16(b) => (b.width(), b.height(), 2, MinIsBlack, Samples::U16(b.into_raw())),
        DynamicImage::ImageRgb16(b) => (b.width(), b.height(), 3, Rgb, Samples::U16(b.into_raw())),
        DynamicImage::ImageRgba16(b) => (b.width(), b.height(), 4, Rgb, Samples::U16(b.into_raw())),
        DynamicImage::ImageRgb32F(b) => (b.width(), b.height(), 3, Rgb, Samples::F32(b.into_raw())),
        DynamicImage::ImageRgba32F(b) => (b.width(), b.height(), 4, Rgb, Samples::F32(b.into_raw())),
        other => {
            let rgba = other.to_rgba8();
            (rgba.width(), rgba.height(), 4, Rgb, Samples::U8(rgba.into_raw()))
        }
    };

    PixelBuffer::new(w, h, bands, photometric, samples).map_err(|e| CodecError::Decode {
        message: e.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
