use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::info;

use crate::crs::ReferenceSystem;
use crate::error::StoreError;
use crate::store::descriptor::PyramidDescriptor;
use crate::store::resource::ResourceInner;
use crate::tile::{mosaic_id, validate_identifier};

use super::mosaic::{Mosaic, MosaicSpec};

/// Relative tolerance when comparing requested and stored scales.
const SCALE_TOLERANCE: f64 = 1e-9;

/// Resolution levels of one coverage sharing a reference system.
///
/// Mosaics are kept sorted by scale, finest first.
pub struct Pyramid {
    id: String,
    crs: ReferenceSystem,
    directory: PathBuf,
    mosaics: RwLock<Vec<Arc<Mosaic>>>,
    resource: Weak<ResourceInner>,
}

impl Pyramid {
    pub(crate) fn new(resource: &Arc<ResourceInner>, id: &str, crs: ReferenceSystem) -> Self {
        Self {
            id: id.to_string(),
            crs,
            directory: resource.directory().join(id),
            mosaics: RwLock::new(Vec::new()),
            resource: Arc::downgrade(resource),
        }
    }

    pub(crate) fn restore(
        resource: &Arc<ResourceInner>,
        descriptor: &PyramidDescriptor,
    ) -> Result<Self, StoreError> {
        validate_identifier("pyramid", &descriptor.id)?;
        let crs = descriptor.reference_system()?;
        let pyramid = Self::new(resource, &descriptor.id, crs);

        let mut mosaics = descriptor
            .mosaics
            .iter()
            .map(|m| Mosaic::restore(resource, &pyramid.directory, m).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        sort_by_scale(&mut mosaics);
        *pyramid.mosaics.write() = mosaics;

        Ok(pyramid)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn crs(&self) -> &ReferenceSystem {
        &self.crs
    }

    /// Directory holding this pyramid's mosaic directories.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn resource(&self) -> Result<Arc<ResourceInner>, StoreError> {
        self.resource.upgrade().ok_or(StoreError::ResourceClosed)
    }

    /// Add a mosaic and persist the descriptor.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an invalid geometry, `AlreadyExists` if a mosaic
    /// with the same scale and origin exists. A failed descriptor save is
    /// returned, but the mosaic stays registered in memory.
    pub fn create_mosaic(&self, spec: MosaicSpec) -> Result<Arc<Mosaic>, StoreError> {
        spec.validate()?;
        let resource = self.resource()?;
        let id = mosaic_id(spec.scale, &spec.upper_left);

        let mosaic = {
            let mut mosaics = self.mosaics.write();
            if mosaics.iter().any(|m| m.id() == id) {
                return Err(StoreError::AlreadyExists(format!(
                    "mosaic '{}' in pyramid '{}'",
                    id, self.id
                )));
            }
            let mosaic = Arc::new(Mosaic::create(&resource, &self.directory, &spec));
            mosaics.push(Arc::clone(&mosaic));
            sort_by_scale(&mut mosaics);
            mosaic
        };

        info!(
            pyramid = %self.id,
            mosaic = %mosaic.id(),
            grid_width = spec.grid_width,
            grid_height = spec.grid_height,
            tile_width = spec.tile_width,
            tile_height = spec.tile_height,
            probe_mode = mosaic.uses_probe_mode(),
            "Created mosaic"
        );
        resource.request_save()?;
        Ok(mosaic)
    }

    /// Mosaics are only removed together with their resource.
    pub fn delete_mosaic(&self, _id: &str) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("deleting a mosaic"))
    }

    /// All mosaics, finest scale first.
    pub fn mosaics(&self) -> Vec<Arc<Mosaic>> {
        self.mosaics.read().clone()
    }

    pub fn mosaic(&self, id: &str) -> Option<Arc<Mosaic>> {
        self.mosaics.read().iter().find(|m| m.id() == id).cloned()
    }

    /// Best mosaic for rendering at `scale`.
    ///
    /// The coarsest mosaic whose scale does not exceed the request, so no
    /// detail is lost; if every mosaic is coarser, the finest one.
    pub fn mosaic_for_scale(&self, scale: f64) -> Option<Arc<Mosaic>> {
        let mosaics = self.mosaics.read();
        let limit = scale * (1.0 + SCALE_TOLERANCE);
        mosaics
            .iter()
            .rev()
            .find(|m| m.scale() <= limit)
            .or_else(|| mosaics.first())
            .cloned()
    }

    pub(crate) fn to_descriptor(&self) -> PyramidDescriptor {
        let mut descriptor = PyramidDescriptor::new(&self.id, &self.crs);
        descriptor.mosaics = self
            .mosaics
            .read()
            .iter()
            .map(|mosaic| mosaic.to_descriptor())
            .collect();
        descriptor
    }
}

impl std::fmt::Debug for Pyramid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pyramid")
            .field("id", &self.id)
            .field("crs", &self.crs.name())
            .field("mosaics", &self.mosaics.read().len())
            .finish()
    }
}

fn sort_by_scale(mosaics: &mut [Arc<Mosaic>]) {
    mosaics.sort_by(|a, b| a.scale().total_cmp(&b.scale()));
}
