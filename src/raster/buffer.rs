//! In-memory pixel buffers.
//!
//! A [`PixelBuffer`] is the unit handed to the store on writes and returned
//! from decoded reads. Samples are kept in their native type so that
//! emptiness detection and value-range scans do not need to reinterpret bytes.

use crate::error::StoreError;

use super::format::{Photometric, PixelFormatDescriptor, PlanarLayout, SampleFormat, ValueRange};

// =============================================================================
// Samples
// =============================================================================

/// Typed sample storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Evaluate `$body` with `$v` bound to the inner vector of any variant.
macro_rules! with_samples {
    ($samples:expr, $v:ident => $body:expr) => {
        match $samples {
            Samples::U8($v) => $body,
            Samples::U16($v) => $body,
            Samples::I16($v) => $body,
            Samples::I32($v) => $body,
            Samples::F32($v) => $body,
            Samples::F64($v) => $body,
        }
    };
}

/// Like `with_samples!` but rewraps the result in the same variant.
macro_rules! map_samples {
    ($samples:expr, $v:ident => $body:expr) => {
        match $samples {
            Samples::U8($v) => Samples::U8($body),
            Samples::U16($v) => Samples::U16($body),
            Samples::I16($v) => Samples::I16($body),
            Samples::I32($v) => Samples::I32($body),
            Samples::F32($v) => Samples::F32($body),
            Samples::F64($v) => Samples::F64($body),
        }
    };
}

impl Samples {
    pub fn len(&self) -> usize {
        with_samples!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_format(&self) -> SampleFormat {
        match self {
            Samples::U8(_) | Samples::U16(_) => SampleFormat::Unsigned,
            Samples::I16(_) | Samples::I32(_) => SampleFormat::Signed,
            Samples::F32(_) | Samples::F64(_) => SampleFormat::Float,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            Samples::U8(_) => 8,
            Samples::U16(_) | Samples::I16(_) => 16,
            Samples::I32(_) | Samples::F32(_) => 32,
            Samples::F64(_) => 64,
        }
    }

    fn get(&self, index: usize) -> f64 {
        with_samples!(self, v => v[index] as f64)
    }

    /// Build storage for `format` with every band set to its fill value.
    fn filled(
        format: &PixelFormatDescriptor,
        pixels: usize,
        per_band: &[f64],
    ) -> Result<Samples, StoreError> {
        let bands = format.bands as usize;
        let planar = format.planar;
        let value = |b: usize| per_band.get(b).copied().unwrap_or(0.0);

        let samples = match (format.sample_format, format.bits_per_sample) {
            (SampleFormat::Unsigned, 8) => {
                let fill: Vec<u8> = (0..bands).map(|b| value(b) as u8).collect();
                Samples::U8(fill_plane(pixels, planar, &fill))
            }
            (SampleFormat::Unsigned, 16) => {
                let fill: Vec<u16> = (0..bands).map(|b| value(b) as u16).collect();
                Samples::U16(fill_plane(pixels, planar, &fill))
            }
            (SampleFormat::Signed, 16) => {
                let fill: Vec<i16> = (0..bands).map(|b| value(b) as i16).collect();
                Samples::I16(fill_plane(pixels, planar, &fill))
            }
            (SampleFormat::Signed, 32) => {
                let fill: Vec<i32> = (0..bands).map(|b| value(b) as i32).collect();
                Samples::I32(fill_plane(pixels, planar, &fill))
            }
            (SampleFormat::Float, 32) => {
                let fill: Vec<f32> = (0..bands).map(|b| value(b) as f32).collect();
                Samples::F32(fill_plane(pixels, planar, &fill))
            }
            (SampleFormat::Float, 64) => {
                let fill: Vec<f64> = (0..bands).map(value).collect();
                Samples::F64(fill_plane(pixels, planar, &fill))
            }
            (sample_format, bits) => {
                return Err(StoreError::InvalidArgument(format!(
                    "no sample storage for {} {}-bit samples",
                    sample_format, bits
                )))
            }
        };
        Ok(samples)
    }
}

fn fill_plane<T: Copy>(pixels: usize, planar: PlanarLayout, per_band: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(pixels * per_band.len());
    match planar {
        PlanarLayout::Interleaved => {
            for _ in 0..pixels {
                out.extend_from_slice(per_band);
            }
        }
        PlanarLayout::Banded => {
            for value in per_band {
                out.extend(std::iter::repeat(*value).take(pixels));
            }
        }
    }
    out
}

#[inline]
fn sample_index(
    width: usize,
    height: usize,
    bands: usize,
    planar: PlanarLayout,
    x: usize,
    y: usize,
    band: usize,
) -> usize {
    match planar {
        PlanarLayout::Interleaved => (y * width + x) * bands + band,
        PlanarLayout::Banded => band * width * height + y * width + x,
    }
}

// =============================================================================
// PixelBuffer
// =============================================================================

/// A rectangular block of pixels with its layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    bands: u16,
    planar: PlanarLayout,
    photometric: Photometric,
    samples: Samples,
}

impl PixelBuffer {
    /// Create an interleaved buffer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the sample count does not equal
    /// `width * height * bands` or if any dimension is zero.
    pub fn new(
        width: u32,
        height: u32,
        bands: u16,
        photometric: Photometric,
        samples: Samples,
    ) -> Result<Self, StoreError> {
        if width == 0 || height == 0 || bands == 0 {
            return Err(StoreError::InvalidArgument(format!(
                "pixel buffer dimensions must be non-zero, got {}x{}x{}",
                width, height, bands
            )));
        }
        let expected = width as usize * height as usize * bands as usize;
        if samples.len() != expected {
            return Err(StoreError::InvalidArgument(format!(
                "expected {} samples for {}x{}x{}, got {}",
                expected,
                width,
                height,
                bands,
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            bands,
            planar: PlanarLayout::Interleaved,
            photometric,
            samples,
        })
    }

    /// Reinterpret the samples with another planar layout.
    pub fn with_planar(mut self, planar: PlanarLayout) -> Self {
        self.planar = planar;
        self
    }

    /// Buffer of `format` with every sample set to zero.
    pub fn zeroed(width: u32, height: u32, format: &PixelFormatDescriptor) -> Result<Self, StoreError> {
        Self::filled(width, height, format, &[])
    }

    /// Buffer of `format` with band `b` set to `per_band[b]`.
    ///
    /// Bands without an entry in `per_band` are zero.
    pub fn filled(
        width: u32,
        height: u32,
        format: &PixelFormatDescriptor,
        per_band: &[f64],
    ) -> Result<Self, StoreError> {
        let pixels = width as usize * height as usize;
        let samples = Samples::filled(format, pixels, per_band)?;
        let buffer = Self::new(width, height, format.bands, format.photometric, samples)?;
        Ok(buffer.with_planar(format.planar))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bands(&self) -> u16 {
        self.bands
    }

    pub fn planar(&self) -> PlanarLayout {
        self.planar
    }

    pub fn photometric(&self) -> Photometric {
        self.photometric
    }

    /// Override the photometric interpretation, e.g. after decoding.
    pub fn set_photometric(&mut self, photometric: Photometric) {
        self.photometric = photometric;
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn into_samples(self) -> Samples {
        self.samples
    }

    /// Whether the last band carries alpha.
    pub fn has_alpha(&self) -> bool {
        matches!(
            (self.photometric, self.bands),
            (Photometric::MinIsBlack | Photometric::MinIsWhite, 2) | (Photometric::Rgb, 4)
        )
    }

    /// Describe this buffer's layout.
    pub fn pixel_format(&self) -> PixelFormatDescriptor {
        PixelFormatDescriptor {
            bands: self.bands,
            bits_per_sample: self.samples.bits_per_sample(),
            sample_format: self.samples.sample_format(),
            planar: self.planar,
            photometric: self.photometric,
            palette: None,
            has_alpha: self.has_alpha(),
            value_range: None,
        }
    }

    /// Read one sample as `f64`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate or band is out of range.
    pub fn sample(&self, x: u32, y: u32, band: u16) -> f64 {
        assert!(x < self.width && y < self.height && band < self.bands);
        self.samples.get(self.index(x as usize, y as usize, band as usize))
    }

    #[inline]
    fn index(&self, x: usize, y: usize, band: usize) -> usize {
        sample_index(
            self.width as usize,
            self.height as usize,
            self.bands as usize,
            self.planar,
            x,
            y,
            band,
        )
    }

    /// True when every sample of every band is zero.
    pub fn is_all_zero(&self) -> bool {
        with_samples!(&self.samples, v => v.iter().all(|s| (*s as f64) == 0.0))
    }

    /// Minimum and maximum over all colour bands, ignoring alpha and NaN.
    ///
    /// Returns `None` if no finite sample was found.
    pub fn value_range(&self) -> Option<ValueRange> {
        let colour_bands = if self.has_alpha() {
            self.bands as usize - 1
        } else {
            self.bands as usize
        };

        let mut range: Option<ValueRange> = None;
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                for band in 0..colour_bands {
                    let value = self.samples.get(self.index(x, y, band));
                    if value.is_nan() {
                        continue;
                    }
                    range = Some(match range {
                        Some(r) => ValueRange::new(r.min.min(value), r.max.max(value)),
                        None => ValueRange::new(value, value),
                    });
                }
            }
        }
        range
    }

    /// Copy a `width` x `height` window starting at (`x`, `y`).
    ///
    /// Parts of the window outside this buffer are zero-filled, so edge
    /// tiles of a raster that is not a multiple of the tile size come out
    /// at full tile size.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<PixelBuffer, StoreError> {
        if width == 0 || height == 0 {
            return Err(StoreError::InvalidArgument(
                "crop window must be non-empty".to_string(),
            ));
        }
        let window = Window {
            src_width: self.width as usize,
            src_height: self.height as usize,
            bands: self.bands as usize,
            planar: self.planar,
            x: x as usize,
            y: y as usize,
            width: width as usize,
            height: height as usize,
        };
        let samples = map_samples!(&self.samples, v => window.copy(v));
        Ok(PixelBuffer {
            width,
            height,
            bands: self.bands,
            planar: self.planar,
            photometric: self.photometric,
            samples,
        })
    }
}

struct Window {
    src_width: usize,
    src_height: usize,
    bands: usize,
    planar: PlanarLayout,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

impl Window {
    fn copy<T: Copy + Default>(&self, src: &[T]) -> Vec<T> {
        let mut out = vec![T::default(); self.width * self.height * self.bands];
        for row in 0..self.height {
            let sy = self.y + row;
            if sy >= self.src_height {
                break;
            }
            for col in 0..self.width {
                let sx = self.x + col;
                if sx >= self.src_width {
                    break;
                }
                for band in 0..self.bands {
                    let dst = sample_index(self.width, self.height, self.bands, self.planar, col, row, band);
                    let from = sample_index(
                        self.src_width,
                        self.src_height,
                        self.bands,
                        self.planar,
                        sx,
                        sy,
                        band,
                    );
                    out[dst] = src[from];
                }
            }
        }
        out
    }
}

// =============================================================================
// Tests
// =============================================================================
