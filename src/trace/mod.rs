//! Trace decoding: the machine's printed listing back into numeric records.

pub mod grammar;
pub mod decoder;
pub mod record;

pub use grammar::{LineShape, classify};
pub use decoder::{Feed, TraceDecoder, TraceError, TraceRecord, decode_stream};
pub use record::{EntityRecord, FanInMismatch, RecordError, check_fan_in, read_records};
