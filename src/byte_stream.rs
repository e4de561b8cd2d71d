//! The per-entry payload handle.
//!
//! The decoder owns the write side for as long as bytes remain; the consumer holds
//! a read-only handle that can outlive the entry's lifetime in the decoder (it just
//! stops seeing new chunks once the decoder drops its writer). Both sides share one
//! `Rc<RefCell<_>>` rather than a channel, since the decoder drives everything from
//! a single thread and never needs to hand the writer to another one.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use core::cell::RefCell;

use bytes::Bytes;

use crate::error::DecoderError;

#[derive(Debug)]
struct Inner {
  chunks: VecDeque<Bytes>,
  closed: bool,
  error: Option<DecoderError>,
}

/// A finite, single-pass sequence of byte chunks: an entry's file payload.
#[derive(Debug, Clone)]
pub struct ByteStream {
  inner: Rc<RefCell<Inner>>,
}

/// The decoder's write handle onto a [`ByteStream`]; not exposed to consumers.
#[derive(Debug, Clone)]
pub(crate) struct ByteStreamWriter {
  inner: Rc<RefCell<Inner>>,
}

pub(crate) fn new_pair() -> (ByteStreamWriter, ByteStream) {
  let inner = Rc::new(RefCell::new(Inner {
    chunks: VecDeque::new(),
    closed: false,
    error: None,
  }));
  (
    ByteStreamWriter { inner: inner.clone() },
    ByteStream { inner },
  )
}

impl ByteStreamWriter {
  pub(crate) fn push(&self, chunk: Bytes) {
    if chunk.is_empty() {
      return;
    }
    self.inner.borrow_mut().chunks.push_back(chunk);
  }

  pub(crate) fn close(&self) {
    self.inner.borrow_mut().closed = true;
  }

  pub(crate) fn fail(&self, error: DecoderError) {
    let mut inner = self.inner.borrow_mut();
    inner.error = Some(error);
    inner.closed = true;
  }
}

impl ByteStream {
  /// Pops the next chunk, in order. Returns `None` once the stream has been closed
  /// and fully drained; returns `Err` exactly once if the decoder failed while this
  /// stream was live.
  pub fn next_chunk(&mut self) -> Option<Result<Bytes, DecoderError>> {
    let mut inner = self.inner.borrow_mut();
    if let Some(chunk) = inner.chunks.pop_front() {
      return Some(Ok(chunk));
    }
    if let Some(error) = inner.error.take() {
      return Some(Err(error));
    }
    None
  }

  /// `true` once the decoder will never push another chunk (end of payload, or a
  /// fatal error already delivered).
  #[must_use]
  pub fn is_closed(&self) -> bool {
    let inner = self.inner.borrow();
    inner.closed && inner.chunks.is_empty() && inner.error.is_none()
  }

  /// Drains every remaining chunk into one contiguous buffer.
  ///
  /// # Errors
  /// Propagates a [`DecoderError`] if the decoder failed while streaming this
  /// entry's payload.
  pub fn drain_to_end(&mut self) -> Result<alloc::vec::Vec<u8>, DecoderError> {
    let mut out = alloc::vec::Vec::new();
    while let Some(chunk) = self.next_chunk() {
      out.extend_from_slice(&chunk?);
    }
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn drains_chunks_in_order_then_closes() {
    let (writer, mut reader) = new_pair();
    writer.push(Bytes::from_static(b"ab"));
    writer.push(Bytes::from_static(b"cd"));
    writer.close();
    assert_eq!(reader.drain_to_end().unwrap(), b"abcd");
    assert!(reader.is_closed());
  }

  #[test]
  fn error_surfaces_once_then_stream_ends() {
    let (writer, mut reader) = new_pair();
    writer.push(Bytes::from_static(b"ab"));
    writer.fail(DecoderError::TruncatedArchive);
    assert_eq!(&reader.next_chunk().unwrap().unwrap()[..], b"ab");
    assert!(matches!(reader.next_chunk(), Some(Err(DecoderError::TruncatedArchive))));
    assert!(reader.next_chunk().is_none());
  }
}
