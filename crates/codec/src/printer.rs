//! Display-based encoder
//!
//! Formats items with their `Display` implementation. Handy for sinks meant
//! for humans (stdout, plain text files).

use std::fmt::Display;

use crate::{Encoder, Result};

/// Encoder that writes `item.to_string()`
///
/// No separator is appended; processors that want one line per item should
/// produce it themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Printer;

impl Printer {
    /// Create a new printer
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl<T> Encoder<T> for Printer
where
    T: Display + ?Sized,
{
    fn encode(&self, item: &T) -> Result<Vec<u8>> {
        Ok(item.to_string().into_bytes())
    }
}
