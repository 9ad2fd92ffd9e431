//! Canonical encoded "empty tile" of a mosaic.
//!
//! Tiles written as all-zero are never materialized. Reads of such tiles are
//! answered with one cached blob per mosaic, built from the resource's pixel
//! format and per-band no-data values.
//!
//! The blob is built outside the lock. Two threads may race to build it; the
//! first result stored wins and the other is discarded.

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::raster::{PixelBuffer, PixelFormatDescriptor};

use super::codec::TileCodec;

struct CachedEmptyTile {
    /// Format the blob was built for; `None` if built before the resource had one
    format: Option<PixelFormatDescriptor>,
    bytes: Bytes,
}

impl CachedEmptyTile {
    fn matches(&self, format: Option<&PixelFormatDescriptor>) -> bool {
        match (&self.format, format) {
            (None, None) => true,
            (Some(built), Some(current)) => built.same_layout(current),
            _ => false,
        }
    }
}

/// Builds and caches the empty-tile blob of one mosaic.
pub struct EmptyTileFactory {
    tile_width: u32,
    tile_height: u32,
    cached: Mutex<Option<CachedEmptyTile>>,
}

impl EmptyTileFactory {
    pub fn new(tile_width: u32, tile_height: u32) -> Self {
        Self {
            tile_width,
            tile_height,
            cached: Mutex::new(None),
        }
    }

    /// Encoded empty tile for the current resource format.
    ///
    /// # Arguments
    ///
    /// * `format` - Resource pixel format, or `None` if no tile was written yet
    /// * `no_data` - Per-band no-data values; bands without one are zero
    /// * `codec` - Codec used to encode the blob
    ///
    /// A blob cached for a different layout (typically one built before the
    /// resource format was known) is rebuilt.
    pub fn get(
        &self,
        format: Option<&PixelFormatDescriptor>,
        no_data: &[Option<f64>],
        codec: &dyn TileCodec,
    ) -> Result<Bytes, StoreError> {
        if let Some(cached) = self.cached.lock().as_ref() {
            if cached.matches(format) {
                return Ok(cached.bytes.clone());
            }
        }

        let pixels = self.build_pixels(format, no_data)?;
        let bytes = codec.encode(&pixels)?;

        let mut cached = self.cached.lock();
        match cached.as_ref() {
            Some(existing) if existing.matches(format) => Ok(existing.bytes.clone()),
            _ => {
                debug!(
                    tile_width = self.tile_width,
                    tile_height = self.tile_height,
                    bytes = bytes.len(),
                    "Built empty tile"
                );
                *cached = Some(CachedEmptyTile {
                    format: format.cloned(),
                    bytes: bytes.clone(),
                });
                Ok(bytes)
            }
        }
    }

    /// Pixels of the empty tile, before encoding.
    pub fn build_pixels(
        &self,
        format: Option<&PixelFormatDescriptor>,
        no_data: &[Option<f64>],
    ) -> Result<PixelBuffer, StoreError> {
        match format {
            Some(format) => {
                let fill: Vec<f64> = no_data.iter().map(|v| v.unwrap_or(0.0)).collect();
                PixelBuffer::filled(self.tile_width, self.tile_height, format, &fill)
            }
            None => PixelBuffer::zeroed(
                self.tile_width,
                self.tile_height,
                &PixelFormatDescriptor::default_opaque(),
            ),
        }
    }
}
