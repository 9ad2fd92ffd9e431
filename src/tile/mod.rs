//! Tile layer.
//!
//! Everything a mosaic needs to address, track, encode and write individual
//! tiles, independent of pyramid and resource bookkeeping.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Mosaic                  │
//! └───────┬──────────────┬──────────────┬───┘
//!         │              │              │
//!         ▼              ▼              ▼
//! ┌──────────────┐ ┌────────────┐ ┌──────────────────┐
//! │TileStateIndex│ │ EmptyTile  │ │ TileWriteExecutor│
//! │ (bitsets or  │ │  Factory   │ │ (bounded queue,  │
//! │  probe LRU)  │ │            │ │  caller-runs)    │
//! └──────────────┘ └─────┬──────┘ └────────┬─────────┘
//!                        │                 │
//!                        ▼                 ▼
//!                  ┌─────────────────────────────┐
//!                  │          TileCodec          │
//!                  └─────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileCoord`] / [`TileRange`]: tile addressing and `<row>_<col>.<ext>` file names
//! - [`TileStateIndex`]: existence and emptiness of every tile in a mosaic
//! - [`EmptyTileFactory`]: cached encoded placeholder for all-zero tiles
//! - [`TileCodec`]: encode/decode contract, implemented by [`ImageTileCodec`]
//! - [`TileWriteExecutor`]: worker pool for bulk writes
//!
//! # Example
//!
//! ```
//! use pyramid_store::tile::{TileStateIndex, TileStatus};
//!
//! let index = TileStateIndex::persisted(4, 4);
//! index.mark(1, 2, true, false);
//!
//! assert_eq!(index.status(1, 2), TileStatus::Exists);
//! assert_eq!(index.status(0, 0), TileStatus::Missing);
//! assert_eq!(index.status(4, 0), TileStatus::OutsideExtent);
//! ```

mod address;
mod bitset;
mod codec;
mod empty;
mod executor;
mod state;

pub use address::{
    format_decimal, legacy_mosaic_id, mosaic_id, validate_identifier, TileCoord, TileRange,
};
pub use bitset::BitSet;
pub use codec::{candidate_extensions, ImageTileCodec, TileCodec, TileFormat, READ_EXTENSIONS};
pub use empty::EmptyTileFactory;
pub use executor::{CancellationFlag, Job, TileWriteExecutor};
pub use state::{SerializedIndex, TileStateIndex, TileStatus, DEFAULT_PROBE_CACHE_ENTRIES};
