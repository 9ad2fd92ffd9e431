//! One resolution level of a pyramid.
//!
//! A mosaic is a regular grid of equally sized tiles at a fixed scale. It
//! owns its [`TileStateIndex`] and lazily resolves one directory holding the
//! tile files.
//!
//! # Read path
//!
//! The index is consulted first. Tiles marked empty are answered with the
//! mosaic's cached empty-tile blob; other existing tiles are resolved to the
//! first candidate file on disk. An index/filesystem mismatch is logged and
//! reported as "no tile".
//!
//! # Write path
//!
//! ```text
//! write_tile ──▶ admit pixel format ──▶ all zero? ──yes──▶ mark(exists, empty)
//!   (resource-wide lock)                   │
//!                                          no
//!                                          ▼
//!                                   encode + write file ──▶ mark(exists)
//!                                          │
//!                                          ▼
//!                                   request descriptor save
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::raster::PixelBuffer;
use crate::store::descriptor::MosaicDescriptor;
use crate::store::resource::ResourceInner;
use crate::tile::{
    candidate_extensions, legacy_mosaic_id, mosaic_id, validate_identifier, CancellationFlag,
    EmptyTileFactory, TileCodec, TileCoord, TileRange, TileStateIndex, TileStatus,
};

use super::source::TileSource;

// =============================================================================
// MosaicSpec
// =============================================================================

/// Geometry of a mosaic to create.
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicSpec {
    /// Pyramid-space units per pixel
    pub scale: f64,

    /// Upper-left corner in pyramid space
    pub upper_left: Vec<f64>,

    /// Number of tile columns
    pub grid_width: u32,

    /// Number of tile rows
    pub grid_height: u32,

    /// Tile width in pixels
    pub tile_width: u32,

    /// Tile height in pixels
    pub tile_height: u32,
}

impl MosaicSpec {
    /// Square tiles of `tile_size` pixels in a `grid_width` x `grid_height` grid.
    pub fn new(
        scale: f64,
        upper_left: Vec<f64>,
        grid_width: u32,
        grid_height: u32,
        tile_size: u32,
    ) -> Self {
        Self {
            scale,
            upper_left,
            grid_width,
            grid_height,
            tile_width: tile_size,
            tile_height: tile_size,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(StoreError::InvalidArgument(format!(
                "mosaic scale must be positive, got {}",
                self.scale
            )));
        }
        if self.upper_left.is_empty() || self.upper_left.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::InvalidArgument(
                "mosaic upper-left corner needs at least one finite ordinate".to_string(),
            ));
        }
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(StoreError::InvalidArgument(format!(
                "mosaic grid must be non-empty, got {}x{}",
                self.grid_width, self.grid_height
            )));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(StoreError::InvalidArgument(format!(
                "tile size must be non-zero, got {}x{}",
                self.tile_width, self.tile_height
            )));
        }
        Ok(())
    }
}

// =============================================================================
// TileHandle
// =============================================================================

/// Where a tile's encoded bytes come from.
#[derive(Debug, Clone, PartialEq)]
pub enum TileContent {
    /// In-memory bytes, used for empty tiles
    Encoded(Bytes),
    /// A tile file on disk, read on demand
    File(PathBuf),
}

/// A tile located by a read, not yet decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct TileHandle {
    coord: TileCoord,
    content: TileContent,
}

impl TileHandle {
    fn encoded(coord: TileCoord, bytes: Bytes) -> Self {
        Self {
            coord,
            content: TileContent::Encoded(bytes),
        }
    }

    fn file(coord: TileCoord, path: PathBuf) -> Self {
        Self {
            coord,
            content: TileContent::File(path),
        }
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn content(&self) -> &TileContent {
        &self.content
    }

    /// True for the shared empty-tile placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self.content, TileContent::Encoded(_))
    }

    /// Path of the tile file, if the tile is materialized.
    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            TileContent::File(path) => Some(path),
            TileContent::Encoded(_) => None,
        }
    }

    /// Encoded tile bytes.
    pub fn read_bytes(&self) -> Result<Bytes, StoreError> {
        match &self.content {
            TileContent::Encoded(bytes) => Ok(bytes.clone()),
            TileContent::File(path) => fs::read(path)
                .map(Bytes::from)
                .map_err(|e| StoreError::io(path, e)),
        }
    }

    /// Decode the tile with `codec`.
    pub fn decode(&self, codec: &dyn TileCodec) -> Result<PixelBuffer, StoreError> {
        let bytes = self.read_bytes()?;
        Ok(codec.decode(&bytes)?)
    }
}

// =============================================================================
// Write results
// =============================================================================

/// What a tile write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Tile was encoded and written to a file
    Written,
    /// Tile was all zero and only marked empty
    Empty,
    /// Unit was skipped because the batch was cancelled
    Cancelled,
}

/// Counts of a successful bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub written: usize,
    pub empty: usize,
    pub cancelled: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.written + self.empty + self.cancelled
    }

    fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written => self.written += 1,
            WriteOutcome::Empty => self.empty += 1,
            WriteOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

struct StoredTile {
    outcome: Result<WriteOutcome, StoreError>,
    /// Resource pixel format was established or widened, even if the write then failed
    format_changed: bool,
}

impl StoredTile {
    fn cancelled() -> Self {
        Self {
            outcome: Ok(WriteOutcome::Cancelled),
            format_changed: false,
        }
    }

    fn failed(error: StoreError) -> Self {
        Self {
            outcome: Err(error),
            format_changed: false,
        }
    }
}

// =============================================================================
// Mosaic
// =============================================================================

/// A regular grid of tiles at one scale.
pub struct Mosaic {
    id: String,
    scale: f64,
    upper_left: Vec<f64>,
    grid_width: u32,
    grid_height: u32,
    tile_width: u32,
    tile_height: u32,
    data_pixel_width: u64,
    data_pixel_height: u64,

    pyramid_directory: PathBuf,
    directory: OnceLock<PathBuf>,
    directory_ready: AtomicBool,

    index: TileStateIndex,
    empty_tile: EmptyTileFactory,
    resource: Weak<ResourceInner>,
}

impl Mosaic {
    /// New mosaic with no tiles.
    pub(crate) fn create(
        resource: &Arc<ResourceInner>,
        pyramid_directory: &Path,
        spec: &MosaicSpec,
    ) -> Self {
        let id = mosaic_id(spec.scale, &spec.upper_left);
        let directory = OnceLock::new();
        let index = if resource.probe_tile_state() {
            let resolved = resolve_directory(pyramid_directory, &id, spec.scale);
            let index = probe_index(resource, spec.grid_width, spec.grid_height, &resolved);
            let _ = directory.set(resolved);
            index
        } else {
            TileStateIndex::persisted(spec.grid_width, spec.grid_height)
        };

        Self {
            id,
            scale: spec.scale,
            upper_left: spec.upper_left.clone(),
            grid_width: spec.grid_width,
            grid_height: spec.grid_height,
            tile_width: spec.tile_width,
            tile_height: spec.tile_height,
            data_pixel_width: spec.grid_width as u64 * spec.tile_width as u64,
            data_pixel_height: spec.grid_height as u64 * spec.tile_height as u64,
            pyramid_directory: pyramid_directory.to_path_buf(),
            directory,
            directory_ready: AtomicBool::new(false),
            index,
            empty_tile: EmptyTileFactory::new(spec.tile_width, spec.tile_height),
            resource: Arc::downgrade(resource),
        }
    }

    /// Mosaic loaded from its descriptor entry.
    ///
    /// Probe mode is used when the resource asks for it and no bitset was
    /// persisted. A persisted `exists` bitset with no bit set while the
    /// directory holds tile files means a legacy or damaged store; the mosaic
    /// then falls back to probing the directory.
    pub(crate) fn restore(
        resource: &Arc<ResourceInner>,
        pyramid_directory: &Path,
        descriptor: &MosaicDescriptor,
    ) -> Result<Self, StoreError> {
        validate_identifier("mosaic", &descriptor.id)?;
        let spec = MosaicSpec {
            scale: descriptor.scale,
            upper_left: descriptor.upper_left.clone(),
            grid_width: descriptor.grid_width,
            grid_height: descriptor.grid_height,
            tile_width: descriptor.tile_width,
            tile_height: descriptor.tile_height,
        };
        spec.validate()?;

        let directory = resolve_directory(pyramid_directory, &descriptor.id, descriptor.scale);
        let (grid_width, grid_height) = (descriptor.grid_width, descriptor.grid_height);

        let index = match descriptor.exists.as_deref() {
            None if resource.probe_tile_state() => {
                debug!(mosaic = %descriptor.id, "Using probe mode, no persisted index");
                probe_index(resource, grid_width, grid_height, &directory)
            }
            exists => {
                let index = TileStateIndex::restore(
                    grid_width,
                    grid_height,
                    exists,
                    descriptor.empty.as_deref(),
                );
                if !index.has_recorded_tiles() && directory_has_tiles(&directory) {
                    warn!(
                        mosaic = %descriptor.id,
                        directory = %directory.display(),
                        "Tile index is empty but directory holds tiles, switching to probe mode"
                    );
                    probe_index(resource, grid_width, grid_height, &directory)
                } else {
                    index
                }
            }
        };

        Ok(Self {
            id: descriptor.id.clone(),
            scale: descriptor.scale,
            upper_left: descriptor.upper_left.clone(),
            grid_width,
            grid_height,
            tile_width: descriptor.tile_width,
            tile_height: descriptor.tile_height,
            data_pixel_width: descriptor.data_pixel_width,
            data_pixel_height: descriptor.data_pixel_height,
            pyramid_directory: pyramid_directory.to_path_buf(),
            directory: OnceLock::from(directory),
            directory_ready: AtomicBool::new(false),
            index,
            empty_tile: EmptyTileFactory::new(descriptor.tile_width, descriptor.tile_height),
            resource: Arc::downgrade(resource),
        })
    }

    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn upper_left(&self) -> &[f64] {
        &self.upper_left
    }

    /// Number of tile columns and rows.
    pub fn grid_size(&self) -> (u32, u32) {
        (self.grid_width, self.grid_height)
    }

    /// Tile width and height in pixels.
    pub fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    pub fn data_pixel_size(&self) -> (u64, u64) {
        (self.data_pixel_width, self.data_pixel_height)
    }

    /// Directory holding this mosaic's tile files.
    ///
    /// Resolved on first use: the canonical directory if it exists, else the
    /// legacy scale-named directory if that exists, else the canonical one.
    pub fn directory(&self) -> &Path {
        self.directory
            .get_or_init(|| resolve_directory(&self.pyramid_directory, &self.id, self.scale))
    }

    /// Whether tile state is tracked by probing the filesystem.
    pub fn uses_probe_mode(&self) -> bool {
        self.index.is_probe_mode()
    }

    /// Tiles marked as existing, when known without probing.
    pub fn existing_tile_count(&self) -> Option<usize> {
        self.index.existing_count()
    }

    fn resource(&self) -> Result<Arc<ResourceInner>, StoreError> {
        self.resource.upgrade().ok_or(StoreError::ResourceClosed)
    }

    fn checked_coord(&self, col: u32, row: u32) -> Result<TileCoord, StoreError> {
        if col < self.grid_width && row < self.grid_height {
            Ok(TileCoord::new(col, row))
        } else {
            Err(StoreError::OutsideExtent {
                col,
                row,
                grid_width: self.grid_width,
                grid_height: self.grid_height,
            })
        }
    }

    fn ensure_directory(&self) -> Result<&Path, StoreError> {
        let directory = self.directory();
        if !self.directory_ready.load(Ordering::Acquire) {
            fs::create_dir_all(directory).map_err(|e| StoreError::io(directory, e))?;
            self.directory_ready.store(true, Ordering::Release);
        }
        Ok(directory)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Existence of the tile at (`col`, `row`).
    pub fn tile_status(&self, col: u32, row: u32) -> TileStatus {
        self.index.status(col, row)
    }

    /// Whether the tile was written as all zero.
    pub fn is_empty_tile(&self, col: u32, row: u32) -> bool {
        self.index.is_empty(col, row)
    }

    /// Encoded empty tile for the current resource format.
    pub fn empty_tile_bytes(&self) -> Result<Bytes, StoreError> {
        let resource = self.resource()?;
        self.empty_tile_for(&resource)
    }

    fn empty_tile_for(&self, resource: &ResourceInner) -> Result<Bytes, StoreError> {
        let format = resource.pixel_format();
        self.empty_tile
            .get(format.as_ref(), resource.no_data(), resource.codec())
    }

    /// Locate the tile at (`col`, `row`).
    ///
    /// Returns `Ok(None)` for tiles that were never written, and for tiles the
    /// index reports but whose file is gone.
    ///
    /// # Errors
    ///
    /// `OutsideExtent` for coordinates outside the grid.
    pub fn get_tile(&self, col: u32, row: u32) -> Result<Option<TileHandle>, StoreError> {
        let coord = self.checked_coord(col, row)?;
        let resource = self.resource()?;

        if self.index.is_empty(col, row) {
            let bytes = self.empty_tile_for(&resource)?;
            return Ok(Some(TileHandle::encoded(coord, bytes)));
        }

        if self.index.status(col, row) == TileStatus::Missing {
            return Ok(None);
        }

        match self.find_tile_file(resource.codec(), coord)? {
            Some(path) => Ok(Some(TileHandle::file(coord, path))),
            None => {
                warn!(
                    mosaic = %self.id,
                    %coord,
                    "Tile index reports a tile but no file was found"
                );
                Ok(None)
            }
        }
    }

    fn find_tile_file(
        &self,
        codec: &dyn TileCodec,
        coord: TileCoord,
    ) -> Result<Option<PathBuf>, StoreError> {
        let directory = self.directory();
        for extension in candidate_extensions(codec) {
            let path = coord.path_in(directory, &extension);
            match path.try_exists() {
                Ok(true) => return Ok(Some(path)),
                Ok(false) => {}
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }
        Ok(None)
    }

    /// Decoded pixels of the tile at (`col`, `row`).
    ///
    /// The resource's photometric interpretation is restored on the decoded
    /// buffer, since image formats do not carry it.
    pub fn read_pixels(&self, col: u32, row: u32) -> Result<Option<PixelBuffer>, StoreError> {
        let Some(handle) = self.get_tile(col, row)? else {
            return Ok(None);
        };
        let resource = self.resource()?;
        let mut pixels = handle.decode(resource.codec())?;
        if let Some(format) = resource.pixel_format() {
            pixels.set_photometric(format.photometric);
        }
        Ok(Some(pixels))
    }

    /// Some tile of this mosaic, for sampling its format.
    ///
    /// The first materialized tile in row-major order, or the empty-tile
    /// placeholder at (0, 0) when no tile file exists.
    pub fn any_tile(&self) -> Result<TileHandle, StoreError> {
        let resource = self.resource()?;
        let extensions = candidate_extensions(resource.codec());
        let (files, _) = self.scan_tile_files(&extensions)?;
        if let Some((coord, path)) = files.into_iter().find(|(coord, _)| self.is_recorded(*coord)) {
            return Ok(TileHandle::file(coord, path));
        }
        let bytes = self.empty_tile_for(&resource)?;
        Ok(TileHandle::encoded(TileCoord::new(0, 0), bytes))
    }

    /// Tiles present in `range`, in row-major order.
    ///
    /// Listing the full grid reads the directory once instead of probing
    /// every coordinate. Failures on individual files are returned as error
    /// entries next to the tiles that could be listed.
    pub fn list_tiles(&self, range: TileRange) -> Vec<Result<TileHandle, StoreError>> {
        let range = range.clip(self.grid_width, self.grid_height);
        if range == TileRange::full(self.grid_width, self.grid_height) {
            return self.list_all_tiles();
        }
        range
            .iter()
            .filter_map(|coord| self.get_tile(coord.col, coord.row).transpose())
            .collect()
    }

    fn list_all_tiles(&self) -> Vec<Result<TileHandle, StoreError>> {
        let resource = match self.resource() {
            Ok(resource) => resource,
            Err(e) => return vec![Err(e)],
        };
        let extensions = candidate_extensions(resource.codec());

        let (files, mut errors) = match self.scan_tile_files(&extensions) {
            Ok(scanned) => scanned,
            Err(e) => (Vec::new(), vec![e]),
        };

        let mut tiles: BTreeMap<(u32, u32), TileHandle> = files
            .into_iter()
            .filter(|(coord, _)| self.is_recorded(*coord))
            .map(|(coord, path)| ((coord.row, coord.col), TileHandle::file(coord, path)))
            .collect();

        let empty = self.index.empty_tiles();
        if !empty.is_empty() {
            match self.empty_tile_for(&resource) {
                Ok(bytes) => {
                    for coord in empty {
                        tiles.insert(
                            (coord.row, coord.col),
                            TileHandle::encoded(coord, bytes.clone()),
                        );
                    }
                }
                Err(e) => errors.push(e),
            }
        }

        tiles
            .into_values()
            .map(Ok)
            .chain(errors.into_iter().map(Err))
            .collect()
    }

    /// Whether a scanned tile file counts as a tile.
    ///
    /// In persisted mode the index decides; files it does not record are ignored.
    fn is_recorded(&self, coord: TileCoord) -> bool {
        self.index.is_probe_mode() || self.index.status(coord.col, coord.row) == TileStatus::Exists
    }

    /// Tile files in the mosaic directory, one per coordinate, row-major.
    ///
    /// When a coordinate has files with several extensions, the one earliest
    /// in `extensions` wins. A missing directory yields no files.
    fn scan_tile_files(
        &self,
        extensions: &[String],
    ) -> Result<(Vec<(TileCoord, PathBuf)>, Vec<StoreError>), StoreError> {
        let directory = self.directory();
        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((Vec::new(), Vec::new())),
            Err(e) => return Err(StoreError::io(directory, e)),
        };

        let mut found: BTreeMap<(u32, u32), (usize, TileCoord, PathBuf)> = BTreeMap::new();
        let mut errors = Vec::new();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    errors.push(StoreError::io(directory, e));
                    continue;
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some((coord, extension)) = TileCoord::parse_file_name(name) else {
                continue;
            };
            let Some(priority) = extensions.iter().position(|ext| ext == extension) else {
                continue;
            };
            if coord.col >= self.grid_width || coord.row >= self.grid_height {
                debug!(mosaic = %self.id, file = name, "Ignoring tile file outside grid");
                continue;
            }

            let key = (coord.row, coord.col);
            let better = found
                .get(&key)
                .map_or(true, |(existing, _, _)| priority < *existing);
            if better {
                found.insert(key, (priority, coord, entry.path()));
            }
        }

        let files = found
            .into_values()
            .map(|(_, coord, path)| (coord, path))
            .collect();
        Ok((files, errors))
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Write one tile and persist the updated tile state.
    ///
    /// An all-zero tile is not encoded; it is only marked empty and later
    /// read back as the empty-tile blob.
    ///
    /// # Errors
    ///
    /// - `OutsideExtent` for coordinates outside the grid
    /// - `InvalidArgument` if the buffer is not the mosaic's tile size
    /// - `ConfigurationMismatch` if the buffer's format differs from the resource's
    /// - `Codec` / `Io` if encoding or writing fails
    /// - `Persistence` if the descriptor could not be saved; the tile itself
    ///   is stored and the next save will include it
    pub fn write_tile(&self, col: u32, row: u32, tile: &PixelBuffer) -> Result<WriteOutcome, StoreError> {
        let resource = self.resource()?;
        let stored = self.store_tile(&resource, col, row, tile);
        let marked = stored.outcome.is_ok() && !self.index.is_probe_mode();
        let save = if stored.format_changed || marked {
            resource.request_save()
        } else {
            Ok(())
        };

        match stored.outcome {
            Ok(outcome) => save.map(|()| outcome),
            Err(e) => {
                if let Err(save_error) = save {
                    warn!(mosaic = %self.id, error = %save_error, "Descriptor save failed after tile write error");
                }
                Err(e)
            }
        }
    }

    fn store_tile(
        &self,
        resource: &ResourceInner,
        col: u32,
        row: u32,
        tile: &PixelBuffer,
    ) -> StoredTile {
        if let Err(e) = self.check_tile_shape(col, row, tile) {
            return StoredTile::failed(e);
        }
        let format_changed = match resource.admit_format(tile) {
            Ok(changed) => changed,
            Err(e) => return StoredTile::failed(e),
        };
        StoredTile {
            outcome: self.persist_tile(resource, col, row, tile),
            format_changed,
        }
    }

    fn check_tile_shape(&self, col: u32, row: u32, tile: &PixelBuffer) -> Result<(), StoreError> {
        let coord = self.checked_coord(col, row)?;
        if tile.width() != self.tile_width || tile.height() != self.tile_height {
            return Err(StoreError::InvalidArgument(format!(
                "tile {} is {}x{}, mosaic {} uses {}x{} tiles",
                coord,
                tile.width(),
                tile.height(),
                self.id,
                self.tile_width,
                self.tile_height
            )));
        }
        Ok(())
    }

    /// Encode and write an admitted tile, then mark it in the index.
    fn persist_tile(
        &self,
        resource: &ResourceInner,
        col: u32,
        row: u32,
        tile: &PixelBuffer,
    ) -> Result<WriteOutcome, StoreError> {
        let coord = TileCoord::new(col, row);
        let directory = self.ensure_directory()?;
        let codec = resource.codec();
        let path = coord.path_in(directory, codec.extension());

        if tile.is_all_zero() {
            // A stale file would shadow the empty marker when probing
            match fs::remove_file(&path) {
                Ok(()) => debug!(mosaic = %self.id, %coord, "Removed file of tile rewritten as empty"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(path, e)),
            }
            self.index.mark(col, row, true, true);
            return Ok(WriteOutcome::Empty);
        }

        let bytes = codec.encode(tile)?;
        write_tile_file(&path, &bytes)?;
        self.index.mark(col, row, true, false);
        Ok(WriteOutcome::Written)
    }

    /// Write many tiles in parallel on the store's executor.
    ///
    /// Every tile is attempted even when some fail. The descriptor is saved
    /// once after the batch. Tiles that failed stay missing.
    ///
    /// # Errors
    ///
    /// `BatchFailed` with the failure count and the first error if any tile
    /// failed; otherwise the descriptor save error, if any.
    pub fn write_tiles<I>(
        self: &Arc<Self>,
        tiles: I,
        cancel: &CancellationFlag,
    ) -> Result<BatchReport, StoreError>
    where
        I: IntoIterator<Item = (TileCoord, PixelBuffer)>,
    {
        let resource = self.resource()?;
        let mut coords = Vec::new();
        let units = tiles.into_iter().map(|(coord, tile)| {
            coords.push(coord);
            let mosaic = Arc::clone(self);
            let cancel = cancel.clone();
            move || {
                if cancel.is_cancelled() {
                    return StoredTile::cancelled();
                }
                match mosaic.resource() {
                    Ok(resource) => mosaic.store_tile(&resource, coord.col, coord.row, &tile),
                    Err(e) => StoredTile::failed(e),
                }
            }
        });
        let results = resource.executor().run_all(units);
        self.finish_batch(&resource, &coords, results)
    }

    /// Write every tile of `range` fetched from `source`, in parallel.
    ///
    /// Each unit fetches its tile when it runs, so at most the queued units'
    /// pixels are held in memory. Same failure and save semantics as
    /// [`Mosaic::write_tiles`].
    pub fn write_from_source(
        self: &Arc<Self>,
        source: Arc<dyn TileSource>,
        range: TileRange,
        cancel: &CancellationFlag,
    ) -> Result<BatchReport, StoreError> {
        let resource = self.resource()?;
        let range = range.clip(self.grid_width, self.grid_height);
        let coords: Vec<TileCoord> = range.iter().collect();

        let units = coords.iter().map(|&coord| {
            let mosaic = Arc::clone(self);
            let source = Arc::clone(&source);
            let cancel = cancel.clone();
            move || {
                if cancel.is_cancelled() {
                    return StoredTile::cancelled();
                }
                let tile = match source.read_tile(coord, mosaic.tile_width, mosaic.tile_height) {
                    Ok(tile) => tile,
                    Err(e) => return StoredTile::failed(e),
                };
                match mosaic.resource() {
                    Ok(resource) => mosaic.store_tile(&resource, coord.col, coord.row, &tile),
                    Err(e) => StoredTile::failed(e),
                }
            }
        });
        let results = resource.executor().run_all(units);
        self.finish_batch(&resource, &coords, results)
    }

    fn finish_batch(
        &self,
        resource: &ResourceInner,
        coords: &[TileCoord],
        results: Vec<Option<StoredTile>>,
    ) -> Result<BatchReport, StoreError> {
        let attempted = results.len();
        let mut report = BatchReport::default();
        let mut format_changed = false;
        let mut failed = 0;
        let mut first: Option<StoreError> = None;

        for (slot, result) in results.into_iter().enumerate() {
            let error = match result {
                Some(stored) => {
                    format_changed |= stored.format_changed;
                    match stored.outcome {
                        Ok(outcome) => {
                            report.record(outcome);
                            continue;
                        }
                        Err(e) => e,
                    }
                }
                None => {
                    let coord = coords
                        .get(slot)
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| format!("unit {}", slot));
                    StoreError::TaskPanicked(coord)
                }
            };
            failed += 1;
            debug!(mosaic = %self.id, error = %error, "Tile write failed");
            if first.is_none() {
                first = Some(error);
            }
        }

        let marked = report.written + report.empty > 0;
        let save = if format_changed || (marked && !self.index.is_probe_mode()) {
            resource.request_save()
        } else {
            Ok(())
        };

        info!(
            mosaic = %self.id,
            written = report.written,
            empty = report.empty,
            cancelled = report.cancelled,
            failed,
            "Tile batch finished"
        );

        match first {
            Some(first) => {
                if let Err(e) = save {
                    warn!(mosaic = %self.id, error = %e, "Descriptor save after failed batch also failed");
                }
                Err(StoreError::BatchFailed {
                    failed,
                    attempted,
                    first: Box::new(first),
                })
            }
            None => save.map(|_| report),
        }
    }

    /// Descriptor entry with the current tile state.
    pub(crate) fn to_descriptor(&self) -> MosaicDescriptor {
        let serialized = self.index.serialize();
        let (exists, empty) = match serialized {
            Some(index) => (Some(index.exists), Some(index.empty)),
            None => (None, None),
        };
        MosaicDescriptor {
            id: self.id.clone(),
            scale: self.scale,
            upper_left: self.upper_left.clone(),
            grid_width: self.grid_width,
            grid_height: self.grid_height,
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            data_pixel_width: self.data_pixel_width,
            data_pixel_height: self.data_pixel_height,
            exists,
            empty,
        }
    }
}

impl std::fmt::Debug for Mosaic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mosaic")
            .field("id", &self.id)
            .field("scale", &self.scale)
            .field("grid", &(self.grid_width, self.grid_height))
            .field("tile_size", &(self.tile_width, self.tile_height))
            .field("probe_mode", &self.index.is_probe_mode())
            .finish()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn resolve_directory(pyramid_directory: &Path, id: &str, scale: f64) -> PathBuf {
    let canonical = pyramid_directory.join(id);
    if canonical.is_dir() {
        return canonical;
    }
    let legacy = pyramid_directory.join(legacy_mosaic_id(scale));
    if legacy.is_dir() {
        debug!(mosaic = %id, directory = %legacy.display(), "Using legacy mosaic directory");
        return legacy;
    }
    canonical
}

fn probe_index(
    resource: &ResourceInner,
    grid_width: u32,
    grid_height: u32,
    directory: &Path,
) -> TileStateIndex {
    TileStateIndex::probe(
        grid_width,
        grid_height,
        directory.to_path_buf(),
        candidate_extensions(resource.codec()),
        resource.probe_cache_entries(),
    )
}

/// True if `directory` holds at least one `<row>_<col>.<ext>` file.
/// Sequence for temporary tile file names.
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Write a tile file through a uniquely named temporary file beside it.
///
/// The temporary file is removed if writing or renaming fails, so `path`
/// either holds the complete tile or is left as it was.
fn write_tile_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut temp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    temp_name.push(format!(".{}.{}.tmp", std::process::id(), sequence));
    let temp_path = path.with_file_name(temp_name);

    let result = fs::write(&temp_path, bytes)
        .map_err(|e| StoreError::io(&temp_path, e))
        .and_then(|()| fs::rename(&temp_path, path).map_err(|e| StoreError::io(path, e)));

    if result.is_err() {
        match fs::remove_file(&temp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %temp_path.display(), error = %e, "Failed to remove temporary tile file")
            }
        }
    }
    result
}

fn directory_has_tiles(directory: &Path) -> bool {
    match fs::read_dir(directory) {
        Ok(entries) => entries.flatten().any(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(TileCoord::parse_file_name)
                .is_some()
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(directory = %directory.display(), error = %e, "Could not scan mosaic directory");
            false
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
