//! Resource descriptor document.
//!
//! Each resource keeps one JSON document at `<root>/<resource-id>/descriptor.json`
//! holding everything needed to reopen it: pixel format, no-data values,
//! pyramids with their reference systems, and per-mosaic grid geometry plus
//! the base64 tile-state bitsets.
//!
//! Writes go to a temporary file that is synced and renamed over the
//! previous document, so readers see either the old or the new version.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crs::ReferenceSystem;
use crate::error::StoreError;
use crate::raster::PixelFormatDescriptor;

/// File name of the descriptor inside a resource directory.
pub const DESCRIPTOR_FILE: &str = "descriptor.json";

/// Current document version.
pub const DESCRIPTOR_VERSION: u32 = 1;

fn default_version() -> u32 {
    DESCRIPTOR_VERSION
}

// =============================================================================
// Document types
// =============================================================================

/// Top-level descriptor of a coverage resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(default = "default_version")]
    pub version: u32,

    pub id: String,

    /// Name of the codec format new tiles are written with
    pub tile_format: String,

    /// Whether mosaics without a persisted index track tiles by probing
    #[serde(default)]
    pub probe_tile_state: bool,

    /// Per-band no-data values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub no_data: Vec<Option<f64>>,

    /// Set once the first tile has been written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_format: Option<PixelFormatDescriptor>,

    #[serde(default)]
    pub pyramids: Vec<PyramidDescriptor>,
}

/// One pyramid and its mosaics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyramidDescriptor {
    pub id: String,

    /// Human-readable reference system
    pub crs_wkt: String,

    /// Base64 serialized reference system, for exact round-trip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs_blob: Option<String>,

    #[serde(default)]
    pub mosaics: Vec<MosaicDescriptor>,
}

/// Grid geometry and tile state of one mosaic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicDescriptor {
    pub id: String,
    pub scale: f64,
    pub upper_left: Vec<f64>,
    pub grid_width: u32,
    pub grid_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,

    /// Kept for compatibility with stores that derived identifiers from it
    pub data_pixel_width: u64,
    pub data_pixel_height: u64,

    /// Base64 `exists` bitset; absent in probe mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<String>,

    /// Base64 `empty` bitset; absent in probe mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty: Option<String>,
}

// =============================================================================
// Reference systems
// =============================================================================

impl PyramidDescriptor {
    pub fn new(id: impl Into<String>, crs: &ReferenceSystem) -> Self {
        Self {
            id: id.into(),
            crs_wkt: crs.to_wkt().to_string(),
            crs_blob: Some(STANDARD.encode(crs.to_blob())),
            mosaics: Vec::new(),
        }
    }

    /// Restore the reference system, preferring the blob over the WKT text.
    pub fn reference_system(&self) -> Result<ReferenceSystem, StoreError> {
        if let Some(blob) = &self.crs_blob {
            let restored = STANDARD
                .decode(blob)
                .map_err(|e| StoreError::Crs(format!("invalid base64 blob: {}", e)))
                .and_then(|bytes| ReferenceSystem::from_blob(&bytes));
            match restored {
                Ok(crs) => return Ok(crs),
                Err(e) => {
                    warn!(pyramid = %self.id, error = %e, "Falling back to WKT reference system");
                }
            }
        }
        ReferenceSystem::parse(&self.crs_wkt)
    }
}

// =============================================================================
// Persistence
// =============================================================================

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, tile_format: impl Into<String>) -> Self {
        Self {
            version: DESCRIPTOR_VERSION,
            id: id.into(),
            tile_format: tile_format.into(),
            probe_tile_state: false,
            no_data: Vec::new(),
            pixel_format: None,
            pyramids: Vec::new(),
        }
    }

    /// Path of the descriptor inside `resource_dir`.
    pub fn path(resource_dir: &Path) -> PathBuf {
        resource_dir.join(DESCRIPTOR_FILE)
    }

    /// Whether `resource_dir` holds a descriptor.
    pub fn exists_in(resource_dir: &Path) -> bool {
        Self::path(resource_dir).is_file()
    }

    /// Read the descriptor of `resource_dir`.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no descriptor, `Persistence` if it cannot be
    /// read or parsed.
    pub fn load(resource_dir: &Path) -> Result<Self, StoreError> {
        let path = Self::path(resource_dir);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!(
                    "no descriptor at {}",
                    path.display()
                )));
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };

        let descriptor: ResourceDescriptor =
            serde_json::from_slice(&data).map_err(|e| StoreError::Persistence {
                path: path.clone(),
                message: e.to_string(),
            })?;

        if descriptor.version > DESCRIPTOR_VERSION {
            return Err(StoreError::Persistence {
                path,
                message: format!(
                    "descriptor version {} is newer than supported version {}",
                    descriptor.version, DESCRIPTOR_VERSION
                ),
            });
        }
        Ok(descriptor)
    }

    /// Replace the descriptor of `resource_dir` with this one.
    ///
    /// The document is written to a temporary file, synced to disk, then
    /// renamed into place.
    pub fn write_atomic(&self, resource_dir: &Path) -> Result<(), StoreError> {
        let path = Self::path(resource_dir);
        let temp_path = path.with_extension("json.tmp");
        let persistence = |message: String| StoreError::Persistence {
            path: path.clone(),
            message,
        };

        let data = serde_json::to_vec_pretty(self).map_err(|e| persistence(e.to_string()))?;

        let mut file = File::create(&temp_path)
            .map_err(|e| persistence(format!("create {}: {}", temp_path.display(), e)))?;
        file.write_all(&data)
            .and_then(|_| file.sync_all())
            .map_err(|e| persistence(format!("write {}: {}", temp_path.display(), e)))?;
        drop(file);

        fs::rename(&temp_path, &path).map_err(|e| persistence(format!("rename: {}", e)))?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
