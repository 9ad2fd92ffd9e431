//! Tile addressing on disk.
//!
//! Tiles live at `<mosaic-dir>/<row>_<col>.<ext>`. Mosaic directories are
//! named from the mosaic's scale and upper-left corner; older stores named
//! them from the scale alone, and that name is still accepted on read.
//!
//! Decimal formatting goes through Rust's `Display` for `f64`, which never
//! depends on the process locale, so the same mosaic always maps to the same
//! directory name.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

// =============================================================================
// TileCoord
// =============================================================================

/// Column/row position of a tile within one mosaic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    /// Tile column (0-indexed from left)
    pub col: u32,

    /// Tile row (0-indexed from top)
    pub row: u32,
}

impl TileCoord {
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }

    /// File name of this tile for the given extension.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}_{}.{}", self.row, self.col, extension)
    }

    /// Full path of this tile inside `dir`.
    pub fn path_in(&self, dir: &Path, extension: &str) -> PathBuf {
        dir.join(self.file_name(extension))
    }

    /// Parse a `<row>_<col>.<ext>` file name.
    ///
    /// Returns the coordinate and the extension, or `None` for any other
    /// file name.
    pub fn parse_file_name(name: &str) -> Option<(TileCoord, &str)> {
        let (stem, extension) = name.rsplit_once('.')?;
        let (row, col) = stem.split_once('_')?;
        if extension.is_empty() {
            return None;
        }
        let row = row.parse().ok()?;
        let col = col.parse().ok()?;
        Some((TileCoord { col, row }, extension))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

// =============================================================================
// TileRange
// =============================================================================

/// Half-open rectangle of tile coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub min_col: u32,
    pub min_row: u32,
    /// Exclusive
    pub max_col: u32,
    /// Exclusive
    pub max_row: u32,
}

impl TileRange {
    pub fn new(min_col: u32, min_row: u32, max_col: u32, max_row: u32) -> Self {
        Self {
            min_col,
            min_row,
            max_col,
            max_row,
        }
    }

    /// Every tile of a `grid_width` x `grid_height` grid.
    pub fn full(grid_width: u32, grid_height: u32) -> Self {
        Self::new(0, 0, grid_width, grid_height)
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        coord.col >= self.min_col
            && coord.col < self.max_col
            && coord.row >= self.min_row
            && coord.row < self.max_row
    }

    /// Clip to a grid of the given size.
    pub fn clip(&self, grid_width: u32, grid_height: u32) -> Self {
        Self::new(
            self.min_col.min(grid_width),
            self.min_row.min(grid_height),
            self.max_col.min(grid_width),
            self.max_row.min(grid_height),
        )
    }

    pub fn tile_count(&self) -> u64 {
        let cols = self.max_col.saturating_sub(self.min_col) as u64;
        let rows = self.max_row.saturating_sub(self.min_row) as u64;
        cols * rows
    }

    /// Iterate row by row.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> {
        let range = *self;
        (range.min_row..range.max_row)
            .flat_map(move |row| (range.min_col..range.max_col).map(move |col| TileCoord { col, row }))
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Format a decimal for use in directory names.
///
/// Negative zero is normalized so that `-0.0` and `0.0` name the same mosaic.
pub fn format_decimal(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}

/// Canonical mosaic identifier: scale and upper-left ordinates joined by `x`.
pub fn mosaic_id(scale: f64, upper_left: &[f64]) -> String {
    let mut id = format_decimal(scale);
    for ordinate in upper_left {
        id.push('x');
        id.push_str(&format_decimal(*ordinate));
    }
    id
}

/// Directory name used by stores that named mosaics by scale alone.
pub fn legacy_mosaic_id(scale: f64) -> String {
    format_decimal(scale)
}

/// Check that a resource, pyramid or mosaic identifier is a single path component.
pub fn validate_identifier(kind: &str, id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(format!(
            "{} identifier {:?} is not a valid directory name",
            kind, id
        )))
    }
}

// =============================================================================
// Tests
// =============================================================================
