//! Coordinate reference system handle.
//!
//! The store never does CRS math. It only needs to persist a pyramid's
//! reference system and hand it back unchanged, so [`ReferenceSystem`] keeps
//! the well-known-text form plus an opaque blob used for exact round-trips.

use crate::error::StoreError;

/// Opaque handle to a coordinate reference system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSystem {
    wkt: String,
    name: String,
}

impl ReferenceSystem {
    /// Parse a well-known-text definition.
    ///
    /// Only the outer structure is checked: a keyword, balanced brackets and
    /// a quoted name as first element.
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        let wkt = text.trim();
        let open = wkt
            .find('[')
            .ok_or_else(|| StoreError::Crs(format!("missing '[' in {:?}", wkt)))?;

        let keyword = &wkt[..open];
        if keyword.is_empty() || !keyword.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::Crs(format!("invalid WKT keyword {:?}", keyword)));
        }

        let mut depth = 0i32;
        let mut in_quotes = false;
        for c in wkt.chars() {
            match c {
                '"' => in_quotes = !in_quotes,
                '[' if !in_quotes => depth += 1,
                ']' if !in_quotes => {
                    depth -= 1;
                    if depth < 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        if depth != 0 || in_quotes || !wkt.ends_with(']') {
            return Err(StoreError::Crs("unbalanced WKT definition".to_string()));
        }

        let name = wkt[open + 1..]
            .trim_start()
            .strip_prefix('"')
            .and_then(|rest| rest.split('"').next())
            .unwrap_or(keyword)
            .to_string();

        Ok(Self {
            wkt: wkt.to_string(),
            name,
        })
    }

    /// Restore from a blob produced by [`ReferenceSystem::to_blob`].
    pub fn from_blob(blob: &[u8]) -> Result<Self, StoreError> {
        let text = std::str::from_utf8(blob)
            .map_err(|e| StoreError::Crs(format!("reference system blob is not UTF-8: {}", e)))?;
        Self::parse(text)
    }

    /// Well-known-text form.
    pub fn to_wkt(&self) -> &str {
        &self.wkt
    }

    /// Serialized form for exact round-trip.
    pub fn to_blob(&self) -> Vec<u8> {
        self.wkt.as_bytes().to_vec()
    }

    /// Name of the reference system (first quoted WKT element).
    pub fn name(&self) -> &str {
        &self.name
    }
}
