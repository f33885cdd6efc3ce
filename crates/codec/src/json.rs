//! JSON codecs
//!
//! `JsonDecoder<T>` decodes one JSON document per raw unit into `T`.
//! In strict mode, keys that `T` does not know about are rejected instead of
//! silently dropped. `JsonEncoder` writes one newline-terminated document
//! per item.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{CodecError, Decoder, Encoder, Result};

#[cfg(test)]
#[path = "json_test.rs"]
mod tests;

/// Decodes JSON documents into `T`
///
/// Strict mode reports the first key that deserialization skipped, so
/// aliases and `null` for optional fields are accepted as usual.
pub struct JsonDecoder<T> {
    strict: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    /// Create a lenient decoder (unknown keys are ignored)
    pub const fn new() -> Self {
        Self {
            strict: false,
            _marker: PhantomData,
        }
    }

    /// Create a strict decoder (unknown keys are an error)
    pub const fn strict() -> Self {
        Self {
            strict: true,
            _marker: PhantomData,
        }
    }

    /// Whether unknown keys are rejected
    #[inline]
    pub fn is_strict(&self) -> bool {
        self.strict
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonDecoder<T> {
    fn clone(&self) -> Self {
        Self {
            strict: self.strict,
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for JsonDecoder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonDecoder")
            .field("strict", &self.strict)
            .field("target", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Decoder<T> for JsonDecoder<T>
where
    T: DeserializeOwned,
{
    fn decode(&self, raw: &[u8]) -> Result<T> {
        if !self.strict {
            return Ok(serde_json::from_slice(raw)?);
        }

        let mut unknown = None;
        let mut de = serde_json::Deserializer::from_slice(raw);
        let decoded: T = serde_ignored::deserialize(&mut de, |path| {
            if unknown.is_none() {
                unknown = Some(path.to_string());
            }
        })?;
        de.end()?;

        match unknown {
            Some(path) => Err(CodecError::unknown_field(path)),
            None => Ok(decoded),
        }
    }
}

/// Encodes items as newline-terminated JSON documents
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl JsonEncoder {
    /// Create a new JSON encoder
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl<T> Encoder<T> for JsonEncoder
where
    T: Serialize + ?Sized,
{
    fn encode(&self, item: &T) -> Result<Vec<u8>> {
        let mut out = serde_json::to_vec(item)?;
        out.push(b'\n');
        Ok(out)
    }
}
