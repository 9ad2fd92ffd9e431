//! Pyramids and their resolution levels.
//!
//! A [`Pyramid`] is an ordered set of [`Mosaic`]s sharing one reference
//! system. Each mosaic is a grid of tiles stored as
//! `<resource>/<pyramid-id>/<mosaic-id>/<row>_<col>.<ext>`.
//!
//! # Components
//!
//! - [`Pyramid`]: mosaic creation and lookup by id or scale
//! - [`Mosaic`]: tile reads, single and bulk tile writes
//! - [`TileHandle`]: a located tile, decoded on demand
//! - [`TileSource`]: pixels fetched lazily by bulk write units

mod levels;
mod mosaic;
mod source;

pub use levels::Pyramid;
pub use mosaic::{BatchReport, Mosaic, MosaicSpec, TileContent, TileHandle, WriteOutcome};
pub use source::{RasterTileSource, TileSource};
