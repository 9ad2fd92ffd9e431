use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a tile codec while encoding or decoding a tile.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Pixels could not be encoded to the target image format
    #[error("Encode error: {message}")]
    Encode { message: String },

    /// Bytes could not be decoded into pixels
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// The codec cannot represent this pixel layout
    #[error("Unsupported pixel layout for {format}: {reason}")]
    UnsupportedLayout { format: &'static str, reason: String },
}

/// Errors surfaced by the pyramid store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure, tagged with the path that failed
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tile pixel format incompatible with the resource's pixel format
    #[error("Configuration mismatch on {field}: resource has {expected}, tile has {actual}")]
    ConfigurationMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    /// Tile coordinate outside the mosaic grid
    #[error("Tile ({col}, {row}) is outside the {grid_width}x{grid_height} grid")]
    OutsideExtent {
        col: u32,
        row: u32,
        grid_width: u32,
        grid_height: u32,
    },

    /// Encoding or decoding a tile failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The descriptor document could not be written or read back
    #[error("Failed to persist descriptor {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    /// A persisted tile-state bitset could not be decoded
    #[error("Tile index corruption: {0}")]
    IndexCorruption(String),

    /// Operation is deliberately not implemented
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Some tiles of a bulk write failed; every tile was still attempted
    #[error("{failed} of {attempted} tile writes failed, first error: {first}")]
    BatchFailed {
        failed: usize,
        attempted: usize,
        first: Box<StoreError>,
    },

    /// Resource, pyramid or mosaic does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource, pyramid or mosaic already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Caller supplied an invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The owning resource was dropped while a pyramid or mosaic was still in use
    #[error("Resource has been closed")]
    ResourceClosed,

    /// Coordinate reference system could not be parsed
    #[error("Invalid reference system: {0}")]
    Crs(String),

    /// A tile write worker thread could not be started
    #[error("Failed to start tile write worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// A bulk write unit panicked before reporting a result
    #[error("Tile write task for {0} panicked")]
    TaskPanicked(String),
}

impl StoreError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
