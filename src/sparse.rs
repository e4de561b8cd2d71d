//! Turns packed sparse-file archive data into the reconstructed virtual file byte
//! stream, holes filled with zeros.

use alloc::vec::Vec;

use bytes::Bytes;

use crate::types::SparseRegion;

/// A reusable 64 KiB buffer of zeros, sliced on each emission rather than
/// reallocated per hole.
const ZERO_CHUNK: usize = 64 * 1024;

pub(crate) struct SparseReconstructor {
  map: Vec<SparseRegion>,
  real_size: u64,
  current_entry_index: usize,
  virtual_position: u64,
  bytes_remaining_in_entry: u64,
  ended: bool,
}

impl SparseReconstructor {
  pub(crate) fn new(map: Vec<SparseRegion>, real_size: u64) -> Self {
    let bytes_remaining_in_entry = map.first().map_or(0, |r| r.numbytes);
    Self {
      map,
      real_size,
      current_entry_index: 0,
      virtual_position: 0,
      bytes_remaining_in_entry,
      ended: false,
    }
  }

  /// Feeds packed archive bytes, returning the reconstructed chunks (zero-filled
  /// holes interleaved with verbatim data) to push downstream in order.
  pub(crate) fn push(&mut self, mut data: &[u8], out: &mut Vec<Bytes>) {
    while !data.is_empty() && self.current_entry_index < self.map.len() {
      let current = self.map[self.current_entry_index];
      if self.virtual_position < current.offset {
        let hole = current.offset - self.virtual_position;
        emit_zeros(hole, out);
        self.virtual_position = current.offset;
      }

      let take = self.bytes_remaining_in_entry.min(data.len() as u64) as usize;
      if take > 0 {
        out.push(Bytes::copy_from_slice(&data[..take]));
        self.bytes_remaining_in_entry -= take as u64;
        self.virtual_position += take as u64;
        data = &data[take..];
      }

      if self.bytes_remaining_in_entry == 0 {
        self.current_entry_index += 1;
        self.bytes_remaining_in_entry = self
          .map
          .get(self.current_entry_index)
          .map_or(0, |r| r.numbytes);
      } else {
        break;
      }
    }
  }

  /// Emits the final hole (if any) and marks the reconstruction done. Idempotent:
  /// a second call is a no-op, so `end` propagates exactly once.
  pub(crate) fn end(&mut self, out: &mut Vec<Bytes>) {
    if self.ended {
      return;
    }
    if self.virtual_position < self.real_size {
      emit_zeros(self.real_size - self.virtual_position, out);
      self.virtual_position = self.real_size;
    }
    self.ended = true;
  }
}

fn emit_zeros(mut len: u64, out: &mut Vec<Bytes>) {
  while len > 0 {
    let take = len.min(ZERO_CHUNK as u64) as usize;
    out.push(zero_bytes(take));
    len -= take as u64;
  }
}

fn zero_bytes(len: usize) -> Bytes {
  static ZEROS: [u8; ZERO_CHUNK] = [0; ZERO_CHUNK];
  Bytes::from_static(&ZEROS[..len])
}
