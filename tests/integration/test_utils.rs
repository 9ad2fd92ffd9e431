//! Test utilities for integration tests.
//!
//! Store setup on temporary directories, tile builders and test codecs and
//! sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;

use pyramid_store::{
    CancellationFlag, CodecError, CoverageResource, ImageTileCodec, Mosaic, MosaicSpec,
    Photometric, PixelBuffer, Pyramid, ReferenceSystem, ResourceOptions, Samples, StoreConfig,
    StoreError, TileCodec, TileCoord, TileSource, TileStore,
};

/// Geographic WGS 84 definition used by most tests.
pub const WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]]"#;

/// First sample value that makes [`FailingCodec`] refuse to encode.
pub const FAIL_SAMPLE: u16 = 13;

// =============================================================================
// Store setup
// =============================================================================

/// Store on `dir` with a small write pool.
pub fn test_store(dir: &TempDir) -> TileStore {
    TileStore::new(dir.path(), StoreConfig::default().with_write_threads(2)).unwrap()
}

/// Store on `dir` using `codec`.
pub fn store_with_codec(dir: &TempDir, codec: Arc<dyn TileCodec>) -> TileStore {
    TileStore::with_codec(dir.path(), StoreConfig::default().with_write_threads(2), codec).unwrap()
}

/// Resource `id` with one WGS 84 pyramid named "main" and one mosaic.
pub fn setup_mosaic(
    store: &TileStore,
    id: &str,
    options: ResourceOptions,
    spec: MosaicSpec,
) -> (CoverageResource, Arc<Pyramid>, Arc<Mosaic>) {
    let resource = store.create_resource(id, options).unwrap();
    let pyramid = resource.create_pyramid("main", wgs84()).unwrap();
    let mosaic = pyramid.create_mosaic(spec).unwrap();
    (resource, pyramid, mosaic)
}

pub fn wgs84() -> ReferenceSystem {
    ReferenceSystem::parse(WGS84_WKT).unwrap()
}

/// 4x4 grid of 256x256 tiles at scale 10, anchored at the origin.
pub fn scale_10_spec() -> MosaicSpec {
    MosaicSpec::new(10.0, vec![0.0, 0.0], 4, 4, 256)
}

/// Grid of `grid` x `grid` small tiles for fast tests.
pub fn small_spec(grid: u32, tile_size: u32) -> MosaicSpec {
    MosaicSpec::new(1.0, vec![0.0, 0.0], grid, grid, tile_size)
}

// =============================================================================
// Tile builders
// =============================================================================

/// Single-band 16-bit tile filled with `value`.
pub fn gray16_tile(size: u32, value: u16) -> PixelBuffer {
    let samples = vec![value; (size * size) as usize];
    PixelBuffer::new(size, size, 1, Photometric::MinIsBlack, Samples::U16(samples)).unwrap()
}

/// Single-band 16-bit tile with a ramp starting at `start`.
pub fn gray16_ramp(size: u32, start: u16) -> PixelBuffer {
    let samples = (0..size * size)
        .map(|i| start.wrapping_add((i % 1000) as u16))
        .collect();
    PixelBuffer::new(size, size, 1, Photometric::MinIsBlack, Samples::U16(samples)).unwrap()
}

/// Scaled single-band 16-bit tile with samples spanning `min..=max`.
pub fn scaled_tile(size: u32, min: u16, max: u16) -> PixelBuffer {
    let span = (max - min) as u32 + 1;
    let samples = (0..size * size)
        .map(|i| min + (i % span) as u16)
        .collect();
    PixelBuffer::new(size, size, 1, Photometric::Scaled, Samples::U16(samples)).unwrap()
}

/// Three-band 8-bit tile.
pub fn rgb8_tile(size: u32, seed: u8) -> PixelBuffer {
    let samples = (0..size * size * 3)
        .map(|i| seed.wrapping_add(i as u8) | 1)
        .collect();
    PixelBuffer::new(size, size, 3, Photometric::Rgb, Samples::U8(samples)).unwrap()
}

/// Encoded bytes of `tile` in the default tile format.
pub fn encode_png(tile: &PixelBuffer) -> Bytes {
    ImageTileCodec::default().encode(tile).unwrap()
}

// =============================================================================
// Test codec
// =============================================================================

/// PNG codec that fails to encode 16-bit tiles starting with [`FAIL_SAMPLE`].
#[derive(Debug, Default)]
pub struct FailingCodec {
    inner: ImageTileCodec,
}

impl TileCodec for FailingCodec {
    fn format_name(&self) -> &'static str {
        self.inner.format_name()
    }

    fn extension(&self) -> &'static str {
        self.inner.extension()
    }

    fn encode(&self, tile: &PixelBuffer) -> Result<Bytes, CodecError> {
        match tile.samples() {
            Samples::U16(v) if v.first() == Some(&FAIL_SAMPLE) => Err(CodecError::Encode {
                message: "refusing to encode test tile".to_string(),
            }),
            _ => self.inner.encode(tile),
        }
    }

    fn decode(&self, data: &[u8]) -> Result<PixelBuffer, CodecError> {
        self.inner.decode(data)
    }
}

// =============================================================================
// Test source
// =============================================================================

/// Source of constant 16-bit tiles that counts reads and can cancel a batch
/// after a number of them.
pub struct CountingSource {
    reads: AtomicUsize,
    cancel_after: Option<(usize, CancellationFlag)>,
}

impl CountingSource {
    pub fn new() -> Self {
        Self {
            reads: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    pub fn cancelling_after(reads: usize, flag: CancellationFlag) -> Self {
        Self {
            reads: AtomicUsize::new(0),
            cancel_after: Some((reads, flag)),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl TileSource for CountingSource {
    fn read_tile(
        &self,
        coord: TileCoord,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<PixelBuffer, StoreError> {
        let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, flag)) = &self.cancel_after {
            if reads >= *limit {
                flag.cancel();
            }
        }
        let value = 100 + (coord.row * 16 + coord.col) as u16;
        let samples = vec![value; (tile_width * tile_height) as usize];
        PixelBuffer::new(
            tile_width,
            tile_height,
            1,
            Photometric::MinIsBlack,
            Samples::U16(samples),
        )
    }
}
