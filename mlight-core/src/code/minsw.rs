//! Min-stripe-width binary codes.
//!
//! Unlike Gray code these have no closed-form decode; the bijection is
//! precomputed offline and shipped as a data resource. Decoding a code
//! outside the table's domain yields no match rather than an error.
//!
//! ## `.dat` layout (little-endian)
//!
//! ```text
//! count:        u32          number of codes (1024 in the shipped table)
//! pos_to_code:  [u32; count]
//! code_to_pos:  [u32; count]
//! ```

use std::path::Path;

use crate::error::MlightError;

/// Precomputed min-stripe-width code bijection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinStripeTable {
    pos_to_code: Vec<u32>,
    code_to_pos: Vec<u32>,
}

impl MinStripeTable {
    /// Build from the two parallel conversion arrays.
    pub fn from_arrays(pos_to_code: Vec<u32>, code_to_pos: Vec<u32>) -> Result<Self, MlightError> {
        if pos_to_code.len() != code_to_pos.len() {
            return Err(MlightError::Encoding(format!(
                "conversion arrays differ in length: {} vs {}",
                pos_to_code.len(),
                code_to_pos.len()
            )));
        }
        Ok(Self {
            pos_to_code,
            code_to_pos,
        })
    }

    /// Parse the `.dat` resource layout.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MlightError> {
        if data.len() < 4 {
            return Err(MlightError::Encoding("code table truncated".into()));
        }
        let count = u32::from_le_bytes(data[0..4].try_into().expect("4 bytes")) as usize;
        let expected = 4 + count * 8;
        if data.len() != expected {
            return Err(MlightError::Encoding(format!(
                "code table length {} does not match count {count} (expected {expected})",
                data.len()
            )));
        }

        let word = |i: usize| {
            u32::from_le_bytes(data[4 + i * 4..8 + i * 4].try_into().expect("4 bytes"))
        };
        let pos_to_code = (0..count).map(word).collect();
        let code_to_pos = (count..2 * count).map(word).collect();
        Ok(Self {
            pos_to_code,
            code_to_pos,
        })
    }

    /// Load the `.dat` resource from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MlightError> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Serialize back to the `.dat` layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.len() * 8);
        buf.extend_from_slice(&(self.len() as u32).to_le_bytes());
        for &c in &self.pos_to_code {
            buf.extend_from_slice(&c.to_le_bytes());
        }
        for &p in &self.code_to_pos {
            buf.extend_from_slice(&p.to_le_bytes());
        }
        buf
    }

    /// Number of positions/codes in the bijection.
    pub fn len(&self) -> usize {
        self.pos_to_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos_to_code.is_empty()
    }

    /// Decode a code to its stripe position; `None` outside the domain.
    pub fn code_to_pos(&self, code: u32) -> Option<u32> {
        self.code_to_pos.get(code as usize).copied()
    }

    /// Encode a stripe position; `None` outside the domain.
    pub fn pos_to_code(&self, pos: u32) -> Option<u32> {
        self.pos_to_code.get(pos as usize).copied()
    }

    /// One display row for a pattern: the given bit of each position's
    /// code.
    pub fn stripe_row(&self, bit: u32) -> Vec<bool> {
        self.pos_to_code
            .iter()
            .map(|&code| code & (1 << bit) != 0)
            .collect()
    }

    /// Whether `bit` is set in the code for `pos` (false outside the
    /// domain).
    pub fn bit_of(&self, pos: u32, bit: u32) -> bool {
        self.pos_to_code(pos)
            .map(|code| code & (1 << bit) != 0)
            .unwrap_or(false)
    }
}

/// A small stand-in bijection built from Gray codes, which are a
/// valid (if not stripe-width-optimal) permutation.
#[cfg(test)]
pub(crate) fn test_table(n: usize) -> MinStripeTable {
    let pos_to_code: Vec<u32> = (0..n as u32).map(crate::code::gray::encode).collect();
    let mut code_to_pos = vec![0u32; n];
    for (pos, &code) in pos_to_code.iter().enumerate() {
        code_to_pos[code as usize] = pos as u32;
    }
    MinStripeTable::from_arrays(pos_to_code, code_to_pos).unwrap()
}
