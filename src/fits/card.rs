//! Fixed 80-byte header card records.

use super::FitsError;

/// Byte offset of the boolean sentinel within a card.
const BOOL_OFFSET: usize = 29;

/// One 80-byte header record.
///
/// Layout: bytes 0..8 hold the blank-padded keyword, bytes 8..10 hold
/// `"= "` when a value is present, bytes 10..30 hold the right-justified
/// value field. A boolean value is the single sentinel character `T` or
/// `F` at byte 29.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCard {
    keyword: String,
    has_value: bool,
    bool_value: Option<bool>,
    int_value: Option<i64>,
}

impl HeaderCard {
    /// Record length in bytes.
    pub const LEN: usize = 80;

    /// Parse one card from the first 80 bytes of `raw`.
    pub fn parse(raw: &[u8]) -> Result<Self, FitsError> {
        if raw.len() < Self::LEN {
            return Err(FitsError::ShortCard { got: raw.len() });
        }
        let raw = &raw[..Self::LEN];

        let keyword = String::from_utf8_lossy(&raw[0..8])
            .trim_end_matches(' ')
            .to_string();
        let has_value = &raw[8..10] == b"= ";

        let bool_value = if has_value {
            match raw[BOOL_OFFSET] {
                b'T' => Some(true),
                b'F' => Some(false),
                _ => None,
            }
        } else {
            None
        };

        // A value field that does not parse as an integer is not an
        // error; callers branch on has_int_value.
        let int_value = if has_value {
            String::from_utf8_lossy(&raw[10..30]).trim().parse().ok()
        } else {
            None
        };

        Ok(Self {
            keyword,
            has_value,
            bool_value,
            int_value,
        })
    }

    /// Keyword with trailing blanks stripped; empty for a blank card.
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn has_value(&self) -> bool {
        self.has_value
    }

    pub fn has_bool_value(&self) -> bool {
        self.bool_value.is_some()
    }

    pub fn has_int_value(&self) -> bool {
        self.int_value.is_some()
    }

    pub fn bool_value(&self) -> Result<bool, FitsError> {
        self.bool_value
            .ok_or_else(|| FitsError::NotBool(self.keyword.clone()))
    }

    pub fn int_value(&self) -> Result<i64, FitsError> {
        self.int_value
            .ok_or_else(|| FitsError::NotInt(self.keyword.clone()))
    }
}
