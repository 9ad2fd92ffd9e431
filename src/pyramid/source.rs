//! Pixel sources for bulk writes.

use crate::error::StoreError;
use crate::raster::PixelBuffer;
use crate::tile::TileCoord;

/// Supplies the pixels of a tile when a bulk write unit runs.
pub trait TileSource: Send + Sync {
    /// Pixels of the tile at `coord`, exactly `tile_width` x `tile_height`.
    fn read_tile(
        &self,
        coord: TileCoord,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<PixelBuffer, StoreError>;
}

/// Cuts tiles out of one large in-memory raster.
///
/// Tiles overlapping the right or bottom edge are zero-padded to full size.
#[derive(Debug, Clone)]
pub struct RasterTileSource {
    raster: PixelBuffer,
}

impl RasterTileSource {
    pub fn new(raster: PixelBuffer) -> Self {
        Self { raster }
    }

    pub fn raster(&self) -> &PixelBuffer {
        &self.raster
    }

    /// Grid size needed to cover the raster with tiles of the given size.
    pub fn grid_size(&self, tile_width: u32, tile_height: u32) -> (u32, u32) {
        (
            self.raster.width().div_ceil(tile_width.max(1)),
            self.raster.height().div_ceil(tile_height.max(1)),
        )
    }
}

impl TileSource for RasterTileSource {
    fn read_tile(
        &self,
        coord: TileCoord,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<PixelBuffer, StoreError> {
        let x = coord.col.checked_mul(tile_width);
        let y = coord.row.checked_mul(tile_height);
        match (x, y) {
            (Some(x), Some(y)) => self.raster.crop(x, y, tile_width, tile_height),
            _ => Err(StoreError::InvalidArgument(format!(
                "tile {} offset overflows",
                coord
            ))),
        }
    }
}
