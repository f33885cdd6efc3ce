//! Pass-through codec
//!
//! Hands bytes through untouched in both directions.

use bytes::Bytes;

use crate::{Decoder, Encoder, Result};

/// Decoder and encoder that does not alter the payload
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl PassThrough {
    /// Create a new pass-through codec
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Decoder<Bytes> for PassThrough {
    fn decode(&self, raw: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(raw))
    }
}

impl Decoder<Vec<u8>> for PassThrough {
    fn decode(&self, raw: &[u8]) -> Result<Vec<u8>> {
        Ok(raw.to_vec())
    }
}

impl Encoder<Bytes> for PassThrough {
    fn encode(&self, item: &Bytes) -> Result<Vec<u8>> {
        Ok(item.to_vec())
    }
}

impl Encoder<Vec<u8>> for PassThrough {
    fn encode(&self, item: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(item.clone())
    }
}

impl Encoder<String> for PassThrough {
    fn encode(&self, item: &String) -> Result<Vec<u8>> {
        Ok(item.as_bytes().to_vec())
    }
}
