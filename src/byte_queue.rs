use alloc::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::DecoderError;

/// An append-only chained-buffer FIFO.
///
/// Writers append chunks; readers ask "do you have N bytes" and "give me the next N
/// bytes as a single contiguous region." A request fully satisfied by the head chunk
/// is a zero-copy `Bytes::slice`; a request spanning chunk boundaries is copied into
/// a fresh buffer.
#[derive(Debug, Default)]
pub struct ByteQueue {
  chunks: VecDeque<Bytes>,
  len: usize,
}

impl ByteQueue {
  #[must_use]
  pub fn new() -> Self {
    Self {
      chunks: VecDeque::new(),
      len: 0,
    }
  }

  /// Appends a chunk; ownership transfers in. Amortised O(1).
  pub fn append(&mut self, chunk: impl Into<Bytes>) {
    let chunk = chunk.into();
    if chunk.is_empty() {
      return;
    }
    self.len += chunk.len();
    self.chunks.push_back(chunk);
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.len
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  #[must_use]
  pub fn has(&self, n: usize) -> bool {
    self.len >= n
  }

  /// Removes and returns exactly `n` bytes, in order.
  ///
  /// # Errors
  /// Returns [`DecoderError::PreconditionViolation`] if `n > len()`.
  pub fn consume(&mut self, n: usize) -> Result<Bytes, DecoderError> {
    if n > self.len {
      return Err(DecoderError::PreconditionViolation(
        "ByteQueue::consume called with n > len()",
      ));
    }
    self.len -= n;
    if n == 0 {
      return Ok(Bytes::new());
    }

    let head_len = self.chunks.front().map_or(0, Bytes::len);
    if head_len >= n {
      let head = self.chunks.front_mut().expect("checked above");
      let out = head.slice(0, n);
      head.advance(n);
      if head.is_empty() {
        self.chunks.pop_front();
      }
      return Ok(out);
    }

    let mut out = BytesMut::with_capacity(n);
    let mut remaining = n;
    while remaining > 0 {
      let head = self.chunks.front_mut().expect("len invariant guarantees enough data");
      let take = remaining.min(head.len());
      out.extend_from_slice(&head[..take]);
      head.advance(take);
      remaining -= take;
      if head.is_empty() {
        self.chunks.pop_front();
      }
    }
    Ok(out.freeze())
  }

  /// Releases all buffered regions.
  pub fn clear(&mut self) {
    self.chunks.clear();
    self.len = 0;
  }
}
