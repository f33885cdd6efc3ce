//! UTF-8 text codec

use crate::{Decoder, Encoder, Result};

/// Decodes raw bytes as UTF-8 text and encodes text as its bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct Text;

impl Text {
    /// Create a new text codec
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Decoder<String> for Text {
    fn decode(&self, raw: &[u8]) -> Result<String> {
        Ok(std::str::from_utf8(raw)?.to_owned())
    }
}

impl Encoder<String> for Text {
    fn encode(&self, item: &String) -> Result<Vec<u8>> {
        Ok(item.as_bytes().to_vec())
    }
}

impl Encoder<str> for Text {
    fn encode(&self, item: &str) -> Result<Vec<u8>> {
        Ok(item.as_bytes().to_vec())
    }
}
