//! Pixel layout and in-memory pixel data.
//!
//! - [`PixelFormatDescriptor`]: resource-wide description of tile pixels
//! - [`ColorModel`]: display description derived from the descriptor
//! - [`PixelBuffer`]: one block of typed samples

mod buffer;
mod format;

pub use buffer::{PixelBuffer, Samples};
pub use format::{
    ColorModel, Photometric, PixelFormatDescriptor, PlanarLayout, SampleFormat, ValueRange,
};
