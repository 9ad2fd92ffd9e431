//! Growable bit vector with a compact base64 form.
//!
//! Bit `i` lives in byte `i / 8` at position `i % 8` (least significant bit
//! first). Trailing zero bytes are dropped when serializing, so a vector that
//! only ever had low bits set stays short in the descriptor.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    bytes: Vec<u8>,
}

impl BitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> bool {
        self.bytes
            .get(index / 8)
            .map(|byte| byte & (1u8 << (index % 8)) != 0)
            .unwrap_or(false)
    }

    /// Set or clear a bit, growing the vector as needed.
    pub fn set(&mut self, index: usize, value: bool) {
        let byte = index / 8;
        if byte >= self.bytes.len() {
            if !value {
                return;
            }
            self.bytes.resize(byte + 1, 0);
        }
        let mask = 1u8 << (index % 8);
        if value {
            self.bytes[byte] |= mask;
        } else {
            self.bytes[byte] &= !mask;
        }
    }

    /// True when no bit is set.
    pub fn is_clear(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }

    pub fn count_ones(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Indices of set bits, ascending.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bytes.iter().enumerate().flat_map(|(i, byte)| {
            (0..8usize)
                .filter(move |bit| *byte & (1u8 << *bit) != 0)
                .map(move |bit| i * 8 + bit)
        })
    }

    pub fn to_base64(&self) -> String {
        let used = self
            .bytes
            .iter()
            .rposition(|b| *b != 0)
            .map(|last| last + 1)
            .unwrap_or(0);
        STANDARD.encode(&self.bytes[..used])
    }

    pub fn from_base64(text: &str) -> Result<Self, base64::DecodeError> {
        let bytes = STANDARD.decode(text.trim())?;
        Ok(Self { bytes })
    }
}
