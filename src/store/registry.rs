use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::tile::{ImageTileCodec, TileCodec, TileWriteExecutor};

use super::descriptor::ResourceDescriptor;
use super::resource::{CoverageResource, ResourceContext, ResourceInner, ResourceOptions};

/// Root of a pyramid store: a directory with one sub-directory per resource.
///
/// The store owns the codec and the tile write pool shared by its resources.
/// Opening a resource that is already open returns the live instance, so all
/// handles in a process share one in-memory state and one save coordinator.
///
/// A resource stays open until [`TileStore::close_resource`] is called or the
/// store is dropped. Pyramid and mosaic handles only hold a weak reference to
/// their resource and fail with `ResourceClosed` once it is gone.
pub struct TileStore {
    root: PathBuf,
    config: StoreConfig,
    codec: Arc<dyn TileCodec>,
    executor: Arc<TileWriteExecutor>,

    /// Resources currently open, by id
    open: Mutex<HashMap<String, Arc<ResourceInner>>>,
}

impl TileStore {
    /// Open or create a store at `root` using the image codec for
    /// `config.tile_format`.
    pub fn new(root: impl Into<PathBuf>, config: StoreConfig) -> Result<Self, StoreError> {
        let codec = Arc::new(ImageTileCodec::new(config.tile_format));
        Self::with_codec(root, config, codec)
    }

    /// Open or create a store at `root` with a custom codec.
    pub fn with_codec(
        root: impl Into<PathBuf>,
        config: StoreConfig,
        codec: Arc<dyn TileCodec>,
    ) -> Result<Self, StoreError> {
        config.validate().map_err(StoreError::InvalidArgument)?;
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;

        let executor = Arc::new(TileWriteExecutor::new(
            config.write_threads,
            config.queue_capacity,
        )?);

        info!(
            root = %root.display(),
            format = codec.format_name(),
            write_threads = executor.threads(),
            "Opened tile store"
        );

        Ok(Self {
            root,
            config,
            codec,
            executor,
            open: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn codec(&self) -> Arc<dyn TileCodec> {
        Arc::clone(&self.codec)
    }

    pub fn executor(&self) -> &TileWriteExecutor {
        &self.executor
    }

    fn context(&self) -> ResourceContext {
        ResourceContext {
            codec: Arc::clone(&self.codec),
            executor: Arc::clone(&self.executor),
            probe_tile_state: self.config.probe_tile_state,
            probe_cache_entries: self.config.probe_cache_entries,
        }
    }

    /// Create a new resource.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the resource has a descriptor already.
    pub fn create_resource(
        &self,
        id: &str,
        options: ResourceOptions,
    ) -> Result<CoverageResource, StoreError> {
        let mut open = self.open.lock();
        if open.contains_key(id) {
            return Err(StoreError::AlreadyExists(format!("resource '{}'", id)));
        }
        let resource = CoverageResource::create(&self.root, id, options, self.context())?;
        open.insert(id.to_string(), resource.shared());
        Ok(resource)
    }

    /// Open an existing resource.
    ///
    /// # Errors
    ///
    /// `NotFound` if the resource has no descriptor.
    pub fn open_resource(&self, id: &str) -> Result<CoverageResource, StoreError> {
        let mut open = self.open.lock();
        if let Some(inner) = open.get(id) {
            debug!(resource = %id, "Resource already open");
            return Ok(CoverageResource::from_inner(Arc::clone(inner)));
        }
        let resource = CoverageResource::open(&self.root, id, self.context())?;
        open.insert(id.to_string(), resource.shared());
        Ok(resource)
    }

    /// Release the store's reference to an open resource.
    ///
    /// The resource closes once the last `CoverageResource` handle is dropped;
    /// its pyramids and mosaics then return `ResourceClosed`. Returns `false`
    /// if the resource was not open.
    pub fn close_resource(&self, id: &str) -> bool {
        let closed = self.open.lock().remove(id).is_some();
        if closed {
            debug!(resource = %id, "Closed resource");
        }
        closed
    }

    /// Open a resource, creating it with `options` if it does not exist.
    pub fn open_or_create_resource(
        &self,
        id: &str,
        options: ResourceOptions,
    ) -> Result<CoverageResource, StoreError> {
        match self.open_resource(id) {
            Err(StoreError::NotFound(_)) => self.create_resource(id, options),
            other => other,
        }
    }

    /// Ids of every resource under the root, sorted.
    pub fn resource_ids(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_dir() || !ResourceDescriptor::exists_in(&path) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for TileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileStore")
            .field("root", &self.root)
            .field("format", &self.codec.format_name())
            .field("write_threads", &self.executor.threads())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
