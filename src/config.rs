//! Configuration for the pyramid store.
//!
//! Two layers:
//! - [`StoreConfig`]: library tuning passed to [`TileStore`](crate::TileStore),
//!   with defaults derived from the host and overrides from the environment
//! - [`Cli`]: command-line interface of the `pyramid-store` binary (clap)
//!
//! # Example
//!
//! ```
//! use pyramid_store::config::StoreConfig;
//!
//! let config = StoreConfig::default().with_write_threads(4);
//! assert_eq!(config.queue_capacity, 8);
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Environment Variables
//!
//! - `PYRAMID_WRITE_THREADS` - Tile write worker count (default: available parallelism - 1, at least 1)
//! - `PYRAMID_PROBE_TILE_STATE` - Track tile state by probing the filesystem for new resources (default: false)
//! - `PYRAMID_STORE_ROOT` - Store root directory for the CLI (default: current directory)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::warn;

use crate::tile::{TileFormat, TileWriteExecutor, DEFAULT_PROBE_CACHE_ENTRIES};

// =============================================================================
// Default Values
// =============================================================================

/// Environment variable overriding the write pool size.
pub const WRITE_THREADS_ENV: &str = "PYRAMID_WRITE_THREADS";

/// Environment variable enabling probe mode for new resources.
pub const PROBE_TILE_STATE_ENV: &str = "PYRAMID_PROBE_TILE_STATE";

/// Queue slots per write thread.
pub const QUEUE_SLOTS_PER_THREAD: usize = 2;

/// Default pyramid id used by the CLI.
pub const DEFAULT_PYRAMID_ID: &str = "default";

/// Reference system used by `import` when none is given.
pub const DEFAULT_CRS_WKT: &str = r#"ENGCRS["Image pixels",EDATUM["Unknown"],CS[Cartesian,2],AXIS["x",east],AXIS["y",south],LENGTHUNIT["pixel",1]]"#;

/// Default tile size for `import`.
pub const DEFAULT_TILE_SIZE: u32 = 256;

// =============================================================================
// StoreConfig
// =============================================================================

/// Tuning of a [`TileStore`](crate::TileStore).
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Number of tile write workers
    pub write_threads: usize,

    /// Bounded queue length before submitters run tasks themselves
    pub queue_capacity: usize,

    /// Default probe mode for newly created resources
    pub probe_tile_state: bool,

    /// Coordinates remembered by each probe-mode mosaic
    pub probe_cache_entries: usize,

    /// Format of newly written tiles
    pub tile_format: TileFormat,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let write_threads = TileWriteExecutor::default_threads();
        Self {
            write_threads,
            queue_capacity: write_threads * QUEUE_SLOTS_PER_THREAD,
            probe_tile_state: false,
            probe_cache_entries: DEFAULT_PROBE_CACHE_ENTRIES,
            tile_format: TileFormat::default(),
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by `PYRAMID_WRITE_THREADS` and `PYRAMID_PROBE_TILE_STATE`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup(WRITE_THREADS_ENV) {
            match value.trim().parse::<usize>() {
                Ok(threads) if threads > 0 => config = config.with_write_threads(threads),
                _ => warn!(
                    variable = WRITE_THREADS_ENV,
                    value = %value,
                    "Ignoring invalid write thread count"
                ),
            }
        }

        if let Some(value) = lookup(PROBE_TILE_STATE_ENV) {
            match parse_flag(&value) {
                Some(probe) => config.probe_tile_state = probe,
                None => warn!(
                    variable = PROBE_TILE_STATE_ENV,
                    value = %value,
                    "Ignoring invalid boolean"
                ),
            }
        }

        config
    }

    /// Set the worker count and size the queue to match.
    pub fn with_write_threads(mut self, threads: usize) -> Self {
        self.write_threads = threads;
        self.queue_capacity = threads * QUEUE_SLOTS_PER_THREAD;
        self
    }

    pub fn with_probe_tile_state(mut self, probe: bool) -> Self {
        self.probe_tile_state = probe;
        self
    }

    pub fn with_tile_format(mut self, format: TileFormat) -> Self {
        self.tile_format = format;
        self
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.write_threads == 0 {
            return Err("write_threads must be greater than 0".to_string());
        }
        if self.probe_cache_entries == 0 {
            return Err("probe_cache_entries must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// pyramid-store - Tiled raster pyramid store.
///
/// Stores multi-resolution rasters as directories of tile files with a
/// compact index of existing and empty tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "pyramid-store")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store root directory.
    #[arg(long, global = true, default_value = ".", env = "PYRAMID_STORE_ROOT")]
    pub root: PathBuf,

    /// Number of tile write workers.
    #[arg(long, global = true, env = "PYRAMID_WRITE_THREADS")]
    pub write_threads: Option<usize>,

    /// Track tile state of new resources by probing the filesystem.
    #[arg(long, global = true, default_value_t = false, env = "PYRAMID_PROBE_TILE_STATE")]
    pub probe_tile_state: bool,

    /// Format of newly written tiles (png, tiff, jpeg).
    #[arg(long, global = true, default_value_t = TileFormat::Png)]
    pub format: TileFormat,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    /// Library configuration selected by the command line.
    pub fn store_config(&self) -> StoreConfig {
        let mut config = StoreConfig::default()
            .with_probe_tile_state(self.probe_tile_state)
            .with_tile_format(self.format);
        if let Some(threads) = self.write_threads {
            config = config.with_write_threads(threads);
        }
        config
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show resources, or the pyramids and mosaics of one resource.
    Info(InfoArgs),

    /// Cut an image into tiles and store them as a mosaic.
    Import(ImportArgs),

    /// List the tiles of a mosaic.
    Tiles(TilesArgs),
}

/// Arguments of `info`.
#[derive(Args, Debug, Clone)]
pub struct InfoArgs {
    /// Resource to describe; lists all resources when omitted.
    pub resource: Option<String>,
}

/// Arguments of `import`.
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Image file to import (PNG, TIFF or JPEG).
    pub image: PathBuf,

    /// Target resource, created if missing.
    #[arg(long)]
    pub resource: String,

    /// Target pyramid, created if missing.
    #[arg(long, default_value = DEFAULT_PYRAMID_ID)]
    pub pyramid: String,

    /// Reference system of a new pyramid, as WKT.
    #[arg(long, default_value = DEFAULT_CRS_WKT)]
    pub crs: String,

    /// Mosaic scale in pyramid units per pixel.
    #[arg(long, default_value_t = 1.0)]
    pub scale: f64,

    /// Upper-left corner of the mosaic (comma-separated).
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "0,0")]
    pub upper_left: Vec<f64>,

    /// Tile width and height in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_size: u32,

    /// No-data value applied to every band of a new resource.
    #[arg(long, allow_hyphen_values = true)]
    pub no_data: Option<f64>,
}

impl ImportArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err("scale must be a positive number".to_string());
        }
        if self.upper_left.is_empty() {
            return Err("upper_left needs at least one ordinate".to_string());
        }
        Ok(())
    }
}

/// Arguments of `tiles`.
#[derive(Args, Debug, Clone)]
pub struct TilesArgs {
    /// Resource holding the mosaic.
    pub resource: String,

    /// Pyramid holding the mosaic.
    #[arg(long, default_value = DEFAULT_PYRAMID_ID)]
    pub pyramid: String,

    /// Mosaic id; the finest mosaic is used when neither this nor --scale is set.
    #[arg(long, conflicts_with = "scale")]
    pub mosaic: Option<String>,

    /// Pick the mosaic best suited to this scale.
    #[arg(long)]
    pub scale: Option<f64>,
}

// =============================================================================
// Tests
// =============================================================================
