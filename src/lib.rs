//! # Pyramid Store
//!
//! A persistence engine for tiled multi-resolution rasters.
//!
//! A coverage is stored as a directory tree of individually addressable tile
//! files, with a compact per-mosaic index recording which tiles exist and
//! which are uniformly empty. Writers run concurrently on a bounded worker
//! pool and share an opportunistic, coalesced descriptor save.
//!
//! ## Features
//!
//! - **Empty tile elision**: all-zero tiles are never written; reads return a cached placeholder
//! - **Two index modes**: persisted bitsets, or filesystem probing with an LRU cache
//! - **Legacy recovery**: stores without an index fall back to probing their directories
//! - **Parallel bulk writes**: bounded queue with caller-runs backpressure and cooperative cancellation
//! - **Coalesced saves**: any number of concurrent save requests cost at most two writes
//!
//! ## Architecture
//!
//! - [`store`] - Store root, resources, descriptor document and save coordination
//! - [`pyramid`] - Pyramids, mosaics and tile read/write paths
//! - [`tile`] - Addressing, tile-state index, codec, empty tiles and the write pool
//! - [`raster`] - Pixel buffers and pixel format descriptions
//! - [`crs`] - Reference system handle
//! - [`config`] - Library tuning and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use pyramid_store::{
//!     MosaicSpec, Photometric, PixelBuffer, ReferenceSystem, ResourceOptions, Samples,
//!     StoreConfig, TileStatus, TileStore,
//! };
//!
//! # fn main() -> Result<(), pyramid_store::StoreError> {
//! let store = TileStore::new("/var/lib/tiles", StoreConfig::from_env())?;
//! let resource = store.open_or_create_resource("elevation", ResourceOptions::default())?;
//!
//! let crs = ReferenceSystem::parse(r#"GEOGCS["WGS 84",DATUM["WGS_1984"]]"#)?;
//! let pyramid = resource.create_pyramid("main", crs)?;
//! let mosaic = pyramid.create_mosaic(MosaicSpec::new(10.0, vec![0.0, 0.0], 4, 4, 256))?;
//!
//! let tile = PixelBuffer::new(256, 256, 1, Photometric::MinIsBlack, Samples::U16(vec![7; 256 * 256]))?;
//! mosaic.write_tile(1, 2, &tile)?;
//! assert_eq!(mosaic.tile_status(1, 2), TileStatus::Exists);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crs;
pub mod error;
pub mod pyramid;
pub mod raster;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, StoreConfig};
pub use crs::ReferenceSystem;
pub use error::{CodecError, StoreError};
pub use pyramid::{
    BatchReport, Mosaic, MosaicSpec, Pyramid, RasterTileSource, TileContent, TileHandle,
    TileSource, WriteOutcome,
};
pub use raster::{
    ColorModel, Photometric, PixelBuffer, PixelFormatDescriptor, PlanarLayout, SampleFormat,
    Samples, ValueRange,
};
pub use store::{
    CoverageResource, ResourceDescriptor, ResourceOptions, SaveCoordinator, SaveState, TileStore,
};
pub use tile::{
    CancellationFlag, ImageTileCodec, TileCodec, TileCoord, TileFormat, TileRange, TileStateIndex,
    TileStatus, TileWriteExecutor,
};
