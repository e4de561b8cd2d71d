//! A streaming, pull-driven TAR archive decoder core: chunked bytes in, typed
//! entries out.
//!
//! This crate is the decoder alone: header parsing (POSIX USTAR, GNU, PAX,
//! base-256 numeric), GNU long-name/long-link and PAX attribute stitching, and GNU
//! old-format sparse-file reconstruction, driven through a consumer-controlled
//! backpressure protocol that keeps at most one entry's [`ByteStream`] live at a
//! time. File-system extraction, decompression, and any particular sync/async/
//! callback façade are left to the caller; [`CallbackSink`] is offered as one thin
//! example of the latter.
#![no_std]

extern crate alloc;

mod byte_queue;
mod byte_stream;
mod callback_sink;
mod decoder;
mod error;
mod extension_store;
mod header_codec;
mod sparse;
mod types;

pub use byte_queue::ByteQueue;
pub use byte_stream::ByteStream;
pub use callback_sink::CallbackSink;
pub use decoder::{Decoder, PollResult};
pub use error::{ChecksumError, DecoderError, HeaderParseError, NumericFieldError, PaxRecordError};
pub use header_codec::{checksum, decode_octal, decode_typeflag, overflow, RawTypeTag};
pub use types::{CorruptField, DecoderOptions, EntryType, FilenameEncoding, Header, SparseRegion, Timestamp};
