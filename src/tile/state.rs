//! Per-mosaic record of which tiles exist and which are known to be empty.
//!
//! # Modes
//!
//! The mode is chosen when the mosaic is loaded and never changes afterwards.
//!
//! - **Persisted**: two bit vectors, `exists` and `empty`, indexed by
//!   `row * grid_width + col`. They are the source of truth and are written
//!   into the resource descriptor on every save.
//! - **Probe**: nothing is persisted. Existence is answered by looking for the
//!   tile file on disk, and answers are kept in a bounded LRU map.
//!
//! A tile with `exists=1, empty=1` was written as all-zero and has no file.
//! A tile with `exists=1, empty=0` has a real file.
//!
//! # Locking
//!
//! Both bit vectors sit behind one reader/writer lock since they are always
//! mutated together. Status checks share the lock; `mark` takes it
//! exclusively. The lock belongs to a single mosaic.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::StoreError;

use super::address::TileCoord;
use super::bitset::BitSet;

/// Default number of coordinates remembered by a probe-mode index.
pub const DEFAULT_PROBE_CACHE_ENTRIES: usize = 10_000;

// =============================================================================
// TileStatus
// =============================================================================

/// Result of a tile existence query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileStatus {
    /// Tile was written (possibly as an empty tile)
    Exists,
    /// Tile was never written
    Missing,
    /// Coordinate is outside the mosaic grid
    OutsideExtent,
    /// Existence could not be determined
    InError,
}

impl TileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileStatus::Exists => "exists",
            TileStatus::Missing => "missing",
            TileStatus::OutsideExtent => "outside_extent",
            TileStatus::InError => "in_error",
        }
    }
}

/// Base64 forms of both bit vectors, as stored in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedIndex {
    pub exists: String,
    pub empty: String,
}

// =============================================================================
// Internal state
// =============================================================================

#[derive(Debug, Default)]
struct TileBits {
    exists: BitSet,
    empty: BitSet,
    /// Set once a bit was marked or a persisted vector was loaded
    populated: bool,
}

struct ProbeCache {
    directory: PathBuf,
    extensions: Vec<String>,
    entries: Mutex<LruCache<TileCoord, bool>>,
}

impl ProbeCache {
    fn lookup(&self, coord: TileCoord) -> std::io::Result<bool> {
        for extension in &self.extensions {
            if coord.path_in(&self.directory, extension).try_exists()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Cache a probe result unless a `mark` landed meanwhile; returns the cached answer.
    fn remember(&self, coord: TileCoord, found: bool) -> bool {
        *self.entries.lock().get_or_insert(coord, || found)
    }
}

enum IndexMode {
    Persisted(RwLock<TileBits>),
    Probe(ProbeCache),
}

// =============================================================================
// TileStateIndex
// =============================================================================

/// Existence and emptiness of every tile in one mosaic.
pub struct TileStateIndex {
    grid_width: u32,
    grid_height: u32,
    mode: IndexMode,
}

impl TileStateIndex {
    /// Empty persisted-mode index.
    pub fn persisted(grid_width: u32, grid_height: u32) -> Self {
        Self {
            grid_width,
            grid_height,
            mode: IndexMode::Persisted(RwLock::new(TileBits::default())),
        }
    }

    /// Persisted-mode index loaded from descriptor blobs.
    ///
    /// A missing `exists` blob yields an empty, unpopulated index.
    pub fn restore(
        grid_width: u32,
        grid_height: u32,
        exists: Option<&str>,
        empty: Option<&str>,
    ) -> Self {
        let index = Self::persisted(grid_width, grid_height);
        if let Some(exists) = exists {
            index.deserialize(exists, empty);
        }
        index
    }

    /// Probe-mode index answering from files in `directory`.
    ///
    /// # Arguments
    ///
    /// * `directory` - Mosaic directory holding `<row>_<col>.<ext>` files
    /// * `extensions` - Candidate tile file extensions, in lookup order
    /// * `capacity` - Maximum number of remembered coordinates
    pub fn probe(
        grid_width: u32,
        grid_height: u32,
        directory: PathBuf,
        extensions: Vec<String>,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            grid_width,
            grid_height,
            mode: IndexMode::Probe(ProbeCache {
                directory,
                extensions,
                entries: Mutex::new(LruCache::new(capacity)),
            }),
        }
    }

    pub fn is_probe_mode(&self) -> bool {
        matches!(self.mode, IndexMode::Probe(_))
    }

    pub fn grid_size(&self) -> (u32, u32) {
        (self.grid_width, self.grid_height)
    }

    #[inline]
    fn flat_index(&self, col: u32, row: u32) -> Option<usize> {
        if col < self.grid_width && row < self.grid_height {
            Some(row as usize * self.grid_width as usize + col as usize)
        } else {
            None
        }
    }

    /// Existence of the tile at (`col`, `row`).
    pub fn status(&self, col: u32, row: u32) -> TileStatus {
        let Some(index) = self.flat_index(col, row) else {
            return TileStatus::OutsideExtent;
        };

        match &self.mode {
            IndexMode::Persisted(bits) => {
                if bits.read().exists.get(index) {
                    TileStatus::Exists
                } else {
                    TileStatus::Missing
                }
            }
            IndexMode::Probe(probe) => {
                let coord = TileCoord::new(col, row);
                if let Some(found) = probe.entries.lock().get(&coord).copied() {
                    return presence(found);
                }
                match probe.lookup(coord) {
                    Ok(found) => presence(probe.remember(coord, found)),
                    Err(e) => {
                        warn!(
                            directory = %probe.directory.display(),
                            %coord,
                            error = %e,
                            "Tile probe failed"
                        );
                        TileStatus::InError
                    }
                }
            }
        }
    }

    /// Record the outcome of a tile write.
    ///
    /// In probe mode only materialized tiles are remembered as present, since
    /// an empty tile leaves no file for a later probe to find.
    pub fn mark(&self, col: u32, row: u32, exists: bool, empty: bool) {
        let Some(index) = self.flat_index(col, row) else {
            debug!(col, row, "Ignoring mark outside grid");
            return;
        };

        match &self.mode {
            IndexMode::Persisted(bits) => {
                let mut bits = bits.write();
                bits.exists.set(index, exists);
                bits.empty.set(index, empty);
                bits.populated = true;
            }
            IndexMode::Probe(probe) => {
                probe
                    .entries
                    .lock()
                    .put(TileCoord::new(col, row), exists && !empty);
            }
        }
    }

    /// Whether the tile is known to be empty.
    ///
    /// Always `false` without a persisted `empty` vector: emptiness cannot be
    /// known without reading the file.
    pub fn is_empty(&self, col: u32, row: u32) -> bool {
        let Some(index) = self.flat_index(col, row) else {
            return false;
        };
        match &self.mode {
            IndexMode::Persisted(bits) => bits.read().empty.get(index),
            IndexMode::Probe(_) => false,
        }
    }

    /// Base64 forms for the descriptor.
    ///
    /// `None` in probe mode, or when nothing was ever marked or loaded.
    pub fn serialize(&self) -> Option<SerializedIndex> {
        match &self.mode {
            IndexMode::Persisted(bits) => {
                let bits = bits.read();
                if !bits.populated {
                    return None;
                }
                Some(SerializedIndex {
                    exists: bits.exists.to_base64(),
                    empty: bits.empty.to_base64(),
                })
            }
            IndexMode::Probe(_) => None,
        }
    }

    /// Replace the bit vectors with decoded descriptor blobs.
    ///
    /// A malformed blob is logged and replaced by an all-zero vector rather
    /// than failing the load. Ignored in probe mode.
    pub fn deserialize(&self, exists: &str, empty: Option<&str>) {
        let IndexMode::Persisted(bits) = &self.mode else {
            return;
        };
        let decode = |name: &str, text: &str| {
            BitSet::from_base64(text).unwrap_or_else(|e| {
                let error = StoreError::IndexCorruption(format!("{} bitset: {}", name, e));
                warn!(error = %error, "Resetting tile index");
                BitSet::new()
            })
        };

        let exists = decode("exists", exists);
        let empty = empty.map(|text| decode("empty", text)).unwrap_or_default();

        let mut bits = bits.write();
        bits.exists = exists;
        bits.empty = empty;
        bits.populated = true;
    }

    /// True if the persisted `exists` vector has any bit set.
    ///
    /// Always `false` in probe mode.
    pub fn has_recorded_tiles(&self) -> bool {
        match &self.mode {
            IndexMode::Persisted(bits) => !bits.read().exists.is_clear(),
            IndexMode::Probe(_) => false,
        }
    }

    /// Number of tiles marked as existing, if known without probing.
    pub fn existing_count(&self) -> Option<usize> {
        match &self.mode {
            IndexMode::Persisted(bits) => Some(bits.read().exists.count_ones()),
            IndexMode::Probe(_) => None,
        }
    }

    /// Coordinates marked both existing and empty, row-major.
    pub fn empty_tiles(&self) -> Vec<TileCoord> {
        let IndexMode::Persisted(bits) = &self.mode else {
            return Vec::new();
        };
        let bits = bits.read();
        let width = self.grid_width as usize;
        bits.empty
            .ones()
            .filter(|i| bits.exists.get(*i) && *i < width * self.grid_height as usize)
            .map(|i| TileCoord::new((i % width) as u32, (i / width) as u32))
            .collect()
    }
}

fn presence(found: bool) -> TileStatus {
    if found {
        TileStatus::Exists
    } else {
        TileStatus::Missing
    }
}

// =============================================================================
// Tests
// =============================================================================
