//! Coverage resources.
//!
//! A [`CoverageResource`] is one stored coverage: a directory under the store
//! root holding its descriptor and one sub-directory per pyramid. The resource
//! owns the pixel format shared by all its mosaics and the save coordinator
//! that persists the descriptor.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::crs::ReferenceSystem;
use crate::error::StoreError;
use crate::pyramid::Pyramid;
use crate::raster::{ColorModel, PixelBuffer, PixelFormatDescriptor};
use crate::tile::{validate_identifier, TileCodec, TileWriteExecutor};

use super::descriptor::ResourceDescriptor;
use super::save::SaveCoordinator;

// =============================================================================
// ResourceOptions
// =============================================================================

/// Per-resource settings chosen at creation time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceOptions {
    /// No-data value for each band; `None` for bands without one
    pub no_data: Vec<Option<f64>>,

    /// Overrides the store-wide probe setting when set
    pub probe_tile_state: Option<bool>,
}

impl ResourceOptions {
    pub fn with_no_data(mut self, no_data: Vec<Option<f64>>) -> Self {
        self.no_data = no_data;
        self
    }

    pub fn with_probe_tile_state(mut self, probe: bool) -> Self {
        self.probe_tile_state = Some(probe);
        self
    }
}

// =============================================================================
// ResourceInner
// =============================================================================

/// State shared between a resource and its pyramids and mosaics.
///
/// Pyramids and mosaics hold a `Weak` reference to it.
pub(crate) struct ResourceInner {
    id: String,
    directory: PathBuf,
    codec: Arc<dyn TileCodec>,
    executor: Arc<TileWriteExecutor>,
    probe_tile_state: bool,
    probe_cache_entries: usize,
    no_data: Vec<Option<f64>>,

    /// Serializes format initialization across all mosaics
    format: Mutex<Option<PixelFormatDescriptor>>,
    color_model: Mutex<Option<ColorModel>>,

    pyramids: RwLock<Vec<Arc<Pyramid>>>,
    save: SaveCoordinator,
}

/// Settings a resource inherits from its store.
pub(crate) struct ResourceContext {
    pub codec: Arc<dyn TileCodec>,
    pub executor: Arc<TileWriteExecutor>,
    pub probe_tile_state: bool,
    pub probe_cache_entries: usize,
}

impl ResourceInner {
    pub(crate) fn directory(&self) -> &Path {
        &self.directory
    }

    pub(crate) fn codec(&self) -> &dyn TileCodec {
        self.codec.as_ref()
    }

    pub(crate) fn executor(&self) -> &TileWriteExecutor {
        &self.executor
    }

    pub(crate) fn probe_tile_state(&self) -> bool {
        self.probe_tile_state
    }

    pub(crate) fn probe_cache_entries(&self) -> usize {
        self.probe_cache_entries
    }

    pub(crate) fn no_data(&self) -> &[Option<f64>] {
        &self.no_data
    }

    pub(crate) fn pixel_format(&self) -> Option<PixelFormatDescriptor> {
        self.format.lock().clone()
    }

    /// Establish or validate the resource pixel format for `tile`.
    ///
    /// The first tile fixes the format. Later tiles must match it; for scaled
    /// formats their value range widens the recorded one. Returns `true` when
    /// the stored format changed.
    pub(crate) fn admit_format(&self, tile: &PixelBuffer) -> Result<bool, StoreError> {
        let tile_format = tile.pixel_format();
        // Compatible tiles share the photometric, so the scan can happen unlocked
        let observed = if tile_format.is_scaled() {
            tile.value_range()
        } else {
            None
        };

        let mut format = self.format.lock();
        match format.as_mut() {
            None => {
                let mut initial = tile_format;
                initial.value_range = observed;
                info!(
                    resource = %self.id,
                    bands = initial.bands,
                    bits_per_sample = initial.bits_per_sample,
                    sample_format = %initial.sample_format,
                    photometric = %initial.photometric,
                    "Pixel format established from first tile"
                );
                *format = Some(initial);
                self.color_model.lock().take();
                Ok(true)
            }
            Some(current) => {
                current.check_compatible(&tile_format)?;
                let widened = match observed {
                    Some(range) if current.is_scaled() => current.widen_range(range),
                    _ => false,
                };
                if widened {
                    debug!(resource = %self.id, range = ?current.value_range, "Value range widened");
                    self.color_model.lock().take();
                }
                Ok(widened)
            }
        }
    }

    pub(crate) fn color_model(&self) -> Option<ColorModel> {
        let format = self.format.lock();
        let format = format.as_ref()?;
        let mut cached = self.color_model.lock();
        Some(
            cached
                .get_or_insert_with(|| ColorModel::from_format(format))
                .clone(),
        )
    }

    /// Persist the descriptor, coalescing with concurrent requests.
    pub(crate) fn request_save(&self) -> Result<(), StoreError> {
        self.save.request_save(|| self.write_descriptor())
    }

    fn write_descriptor(&self) -> Result<(), StoreError> {
        let descriptor = self.to_descriptor();
        descriptor.write_atomic(&self.directory).map_err(|e| {
            warn!(resource = %self.id, error = %e, "Descriptor write failed");
            e
        })
    }

    fn to_descriptor(&self) -> ResourceDescriptor {
        let mut descriptor = ResourceDescriptor::new(&self.id, self.codec.format_name());
        descriptor.probe_tile_state = self.probe_tile_state;
        descriptor.no_data = self.no_data.clone();
        descriptor.pixel_format = self.pixel_format();
        descriptor.pyramids = self
            .pyramids
            .read()
            .iter()
            .map(|pyramid| pyramid.to_descriptor())
            .collect();
        descriptor
    }
}

// =============================================================================
// CoverageResource
// =============================================================================

/// Handle to one stored coverage.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CoverageResource {
    inner: Arc<ResourceInner>,
}

impl CoverageResource {
    /// Create a new resource directory and write its first descriptor.
    pub(crate) fn create(
        root: &Path,
        id: &str,
        options: ResourceOptions,
        context: ResourceContext,
    ) -> Result<Self, StoreError> {
        validate_identifier("resource", id)?;
        let directory = root.join(id);
        if ResourceDescriptor::exists_in(&directory) {
            return Err(StoreError::AlreadyExists(format!("resource '{}'", id)));
        }
        fs::create_dir_all(&directory).map_err(|e| StoreError::io(&directory, e))?;

        let probe_tile_state = options
            .probe_tile_state
            .unwrap_or(context.probe_tile_state);
        let inner = Arc::new(Self::build_inner(
            id,
            directory,
            options.no_data,
            probe_tile_state,
            None,
            context,
        ));
        inner.request_save()?;

        info!(resource = %id, probe_tile_state, "Created resource");
        Ok(Self { inner })
    }

    /// Load a resource from its descriptor.
    pub(crate) fn open(root: &Path, id: &str, context: ResourceContext) -> Result<Self, StoreError> {
        validate_identifier("resource", id)?;
        let directory = root.join(id);
        let descriptor = ResourceDescriptor::load(&directory)?;

        if descriptor.id != id {
            warn!(
                resource = %id,
                recorded = %descriptor.id,
                "Descriptor records a different resource id"
            );
        }
        if descriptor.tile_format != context.codec.format_name() {
            warn!(
                resource = %id,
                recorded = %descriptor.tile_format,
                configured = %context.codec.format_name(),
                "Resource was written with another tile format; new tiles use the configured one"
            );
        }

        let inner = Arc::new(Self::build_inner(
            id,
            directory,
            descriptor.no_data,
            descriptor.probe_tile_state,
            descriptor.pixel_format,
            context,
        ));

        let pyramids = descriptor
            .pyramids
            .iter()
            .map(|pyramid| Pyramid::restore(&inner, pyramid).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        *inner.pyramids.write() = pyramids;

        debug!(resource = %id, pyramids = inner.pyramids.read().len(), "Opened resource");
        Ok(Self { inner })
    }

    fn build_inner(
        id: &str,
        directory: PathBuf,
        no_data: Vec<Option<f64>>,
        probe_tile_state: bool,
        format: Option<PixelFormatDescriptor>,
        context: ResourceContext,
    ) -> ResourceInner {
        ResourceInner {
            id: id.to_string(),
            directory,
            codec: context.codec,
            executor: context.executor,
            probe_tile_state,
            probe_cache_entries: context.probe_cache_entries,
            no_data,
            format: Mutex::new(format),
            color_model: Mutex::new(None),
            pyramids: RwLock::new(Vec::new()),
            save: SaveCoordinator::new(),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ResourceInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn shared(&self) -> Arc<ResourceInner> {
        Arc::clone(&self.inner)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Directory holding the descriptor and pyramid directories.
    pub fn directory(&self) -> &Path {
        self.inner.directory()
    }

    /// Name of the format new tiles are encoded with.
    pub fn tile_format(&self) -> &'static str {
        self.inner.codec.format_name()
    }

    /// Pixel format, once the first tile has been written.
    pub fn pixel_format(&self) -> Option<PixelFormatDescriptor> {
        self.inner.pixel_format()
    }

    /// Display model derived from the pixel format, rebuilt after the value range widens.
    pub fn color_model(&self) -> Option<ColorModel> {
        self.inner.color_model()
    }

    pub fn no_data(&self) -> &[Option<f64>] {
        self.inner.no_data()
    }

    pub fn uses_probe_tile_state(&self) -> bool {
        self.inner.probe_tile_state
    }

    /// Whether tiles can be written to this resource's directory.
    pub fn is_writable(&self) -> bool {
        fs::metadata(self.directory())
            .map(|meta| meta.is_dir() && !meta.permissions().readonly())
            .unwrap_or(false)
    }

    /// Add a pyramid in the given reference system.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if a pyramid with this id exists; `InvalidArgument` if
    /// the id cannot be used as a directory name. A failed descriptor save is
    /// returned, but the pyramid stays registered in memory.
    pub fn create_pyramid(&self, id: &str, crs: ReferenceSystem) -> Result<Arc<Pyramid>, StoreError> {
        validate_identifier("pyramid", id)?;
        let pyramid = {
            let mut pyramids = self.inner.pyramids.write();
            if pyramids.iter().any(|p| p.id() == id) {
                return Err(StoreError::AlreadyExists(format!(
                    "pyramid '{}' in resource '{}'",
                    id, self.inner.id
                )));
            }
            let pyramid = Arc::new(Pyramid::new(&self.inner, id, crs));
            pyramids.push(Arc::clone(&pyramid));
            pyramid
        };

        info!(resource = %self.inner.id, pyramid = %id, crs = %pyramid.crs().name(), "Created pyramid");
        self.inner.request_save()?;
        Ok(pyramid)
    }

    /// Pyramids are only removed together with their resource.
    pub fn delete_pyramid(&self, _id: &str) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("deleting a pyramid"))
    }

    pub fn pyramid(&self, id: &str) -> Option<Arc<Pyramid>> {
        self.inner
            .pyramids
            .read()
            .iter()
            .find(|p| p.id() == id)
            .cloned()
    }

    pub fn pyramids(&self) -> Vec<Arc<Pyramid>> {
        self.inner.pyramids.read().clone()
    }

    /// Persist the descriptor now.
    pub fn save(&self) -> Result<(), StoreError> {
        self.inner.request_save()
    }

    /// Number of descriptor writes performed since the resource was loaded.
    pub fn descriptor_writes(&self) -> u64 {
        self.inner.save.completed_writes()
    }
}

impl std::fmt::Debug for CoverageResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageResource")
            .field("id", &self.inner.id)
            .field("directory", &self.inner.directory)
            .field("pyramids", &self.inner.pyramids.read().len())
            .finish()
    }
}
