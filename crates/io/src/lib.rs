//! pipekit - I/O transports
//!
//! Message readers and byte streams that plug into `pipekit-pipeline`
//! sources and sinks.
//!
//! | Type | Role |
//! |------|------|
//! | `DelimitedReader` | `MessageReader` splitting an `AsyncBufRead` on a delimiter byte |
//! | `MemoryReader` | `MessageReader` replaying in-memory frames |
//! | `MemoryWriter` | `AsyncWrite` collecting into a shared buffer |

mod delimited;
mod memory;

pub use delimited::{DEFAULT_MAX_MESSAGE_SIZE, DelimitedReader};
pub use memory::{MemoryReader, MemoryWriter};
