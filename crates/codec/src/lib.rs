//! pipekit - Codecs
//!
//! Contracts for turning raw bytes into typed items and back, plus the
//! reference codecs used by the demo pipelines.
//!
//! # Architecture
//!
//! ```text
//! [Source bytes] ──→ Decoder<T> ──→ T ──→ [Processor] ──→ U ──→ Encoder<U> ──→ [Sink bytes]
//! ```
//!
//! The pipeline runtime never inspects items; it only hands them to the
//! codec attached to each source or sink.
//!
//! # Available Codecs
//!
//! | Codec | Decodes to | Encodes from |
//! |-------|------------|--------------|
//! | `PassThrough` | `Bytes`, `Vec<u8>` | `Bytes`, `Vec<u8>`, `String` |
//! | `Text` | `String` (UTF-8 checked) | `String`, `str` |
//! | `JsonDecoder<T>` | any `T: Deserialize` | - |
//! | `JsonEncoder` | - | any `T: Serialize` |
//! | `Printer` | - | any `T: Display` |

mod error;
mod json;
mod passthrough;
mod printer;
mod text;

pub use error::{CodecError, Result};
pub use json::{JsonDecoder, JsonEncoder};
pub use passthrough::PassThrough;
pub use printer::Printer;
pub use text::Text;

/// Decodes one raw unit of input into an item
///
/// Implementors must be `Send + Sync`: a decoder is shared by every read
/// of the source it is attached to.
pub trait Decoder<T>: Send + Sync {
    /// Decode exactly the bytes in `raw`
    fn decode(&self, raw: &[u8]) -> Result<T>;
}

/// Encodes an item into the bytes written to a sink
pub trait Encoder<T: ?Sized>: Send + Sync {
    /// Encode `item` into a fresh buffer
    fn encode(&self, item: &T) -> Result<Vec<u8>>;
}
