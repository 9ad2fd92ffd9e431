//! Pixel format description shared by every mosaic of a resource.
//!
//! The first tile written into a resource fixes its [`PixelFormatDescriptor`].
//! Every later tile must match it on band count, sample format, bits per
//! sample, planar layout and photometric interpretation. The only field that
//! keeps moving afterwards is the value range of scaled formats, which is
//! widened as tiles arrive.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// =============================================================================
// Enumerations
// =============================================================================

/// How the bits of one sample are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    Unsigned,
    Signed,
    Float,
}

impl SampleFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleFormat::Unsigned => "unsigned",
            SampleFormat::Signed => "signed",
            SampleFormat::Float => "float",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sample ordering inside a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanarLayout {
    /// All bands of a pixel are stored together (RGBRGB...)
    Interleaved,
    /// Each band is stored as its own plane (RR..GG..BB..)
    Banded,
}

impl PlanarLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanarLayout::Interleaved => "interleaved",
            PlanarLayout::Banded => "banded",
        }
    }
}

impl fmt::Display for PlanarLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Photometric interpretation of the samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Photometric {
    MinIsWhite,
    MinIsBlack,
    Rgb,
    Palette,
    /// Continuous values rendered through a min/max scale
    Scaled,
}

impl Photometric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Photometric::MinIsWhite => "min_is_white",
            Photometric::MinIsBlack => "min_is_black",
            Photometric::Rgb => "rgb",
            Photometric::Palette => "palette",
            Photometric::Scaled => "scaled",
        }
    }
}

impl fmt::Display for Photometric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Value Range
// =============================================================================

/// Minimum and maximum sample value observed in a scaled resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Smallest range covering both `self` and `other`.
    pub fn union(&self, other: &ValueRange) -> ValueRange {
        ValueRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn contains(&self, other: &ValueRange) -> bool {
        self.min <= other.min && self.max >= other.max
    }
}

// =============================================================================
// PixelFormatDescriptor
// =============================================================================

/// Layout of the pixels stored in every tile of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelFormatDescriptor {
    /// Number of bands (samples per pixel)
    pub bands: u16,

    /// Bits per sample
    pub bits_per_sample: u16,

    /// Sample interpretation
    pub sample_format: SampleFormat,

    /// Sample ordering
    pub planar: PlanarLayout,

    /// Photometric interpretation
    pub photometric: Photometric,

    /// RGBA palette entries, for palette images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<[u8; 4]>>,

    /// Whether the last band is an alpha channel
    #[serde(default)]
    pub has_alpha: bool,

    /// Observed value range, only tracked for scaled formats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_range: Option<ValueRange>,
}

impl PixelFormatDescriptor {
    /// Format used when a placeholder tile is needed before any tile was written.
    pub fn default_opaque() -> Self {
        Self {
            bands: 4,
            bits_per_sample: 8,
            sample_format: SampleFormat::Unsigned,
            planar: PlanarLayout::Interleaved,
            photometric: Photometric::Rgb,
            palette: None,
            has_alpha: true,
            value_range: None,
        }
    }

    /// Whether the value range must be tracked for this format.
    pub fn is_scaled(&self) -> bool {
        self.photometric == Photometric::Scaled
    }

    /// Check that a tile of format `tile` may be stored under `self`.
    ///
    /// Fields are checked in a fixed order and the first mismatch is
    /// reported. Palette, alpha and value range are not compared.
    pub fn check_compatible(&self, tile: &PixelFormatDescriptor) -> Result<(), StoreError> {
        fn mismatch(field: &'static str, expected: impl ToString, actual: impl ToString) -> StoreError {
            StoreError::ConfigurationMismatch {
                field,
                expected: expected.to_string(),
                actual: actual.to_string(),
            }
        }

        if self.bands != tile.bands {
            return Err(mismatch("band count", self.bands, tile.bands));
        }
        if self.sample_format != tile.sample_format {
            return Err(mismatch("sample format", self.sample_format, tile.sample_format));
        }
        if self.bits_per_sample != tile.bits_per_sample {
            return Err(mismatch(
                "bits per sample",
                self.bits_per_sample,
                tile.bits_per_sample,
            ));
        }
        if self.planar != tile.planar {
            return Err(mismatch("planar layout", self.planar, tile.planar));
        }
        if self.photometric != tile.photometric {
            return Err(mismatch(
                "photometric interpretation",
                self.photometric,
                tile.photometric,
            ));
        }
        Ok(())
    }

    /// Same sample layout, ignoring the observed value range.
    pub fn same_layout(&self, other: &PixelFormatDescriptor) -> bool {
        self.check_compatible(other).is_ok()
            && self.palette == other.palette
            && self.has_alpha == other.has_alpha
    }

    /// Widen the tracked value range to cover `range`.
    ///
    /// Returns `true` if the stored range changed.
    pub fn widen_range(&mut self, range: ValueRange) -> bool {
        match self.value_range {
            Some(current) if current.contains(&range) => false,
            Some(current) => {
                self.value_range = Some(current.union(&range));
                true
            }
            None => {
                self.value_range = Some(range);
                true
            }
        }
    }
}

// =============================================================================
// ColorModel
// =============================================================================

/// Display description derived from a [`PixelFormatDescriptor`].
///
/// For scaled formats the display range is the tracked value range, so the
/// model must be rebuilt whenever that range widens.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorModel {
    pub bands: u16,
    pub has_alpha: bool,
    pub palette: Option<Vec<[u8; 4]>>,
    pub display_range: Option<ValueRange>,
}

impl ColorModel {
    pub fn from_format(format: &PixelFormatDescriptor) -> Self {
        let display_range = if format.is_scaled() {
            format.value_range
        } else {
            None
        };
        Self {
            bands: format.bands,
            has_alpha: format.has_alpha,
            palette: format.palette.clone(),
            display_range,
        }
    }

    /// Map a sample to `[0, 1]` using the display range.
    ///
    /// Returns the value unchanged when there is no range to scale against.
    pub fn normalize(&self, value: f64) -> f64 {
        match self.display_range {
            Some(range) if range.max > range.min => {
                ((value - range.min) / (range.max - range.min)).clamp(0.0, 1.0)
            }
            Some(_) => 0.0,
            None => value,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
