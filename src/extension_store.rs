//! Pending cross-header state between an extension block and the real entry it
//! decorates.

use alloc::string::String;
use alloc::vec::Vec;

use bytes::Bytes;
use hashbrown::HashMap;

use crate::error::DecoderError;
use crate::header_codec::{self, RawTypeTag};
use crate::types::{CorruptField, EntryType, FilenameEncoding, Header, Timestamp};

/// Which extension-meta header is currently being accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExtensionKind {
  GnuLongPath,
  GnuLongLinkPath,
  PaxHeader,
  PaxGlobalHeader,
}

impl ExtensionKind {
  pub(crate) fn from_tag(tag: RawTypeTag) -> Option<Self> {
    match tag {
      RawTypeTag::GnuLongPath => Some(Self::GnuLongPath),
      RawTypeTag::GnuLongLinkPath => Some(Self::GnuLongLinkPath),
      RawTypeTag::PaxHeader => Some(Self::PaxHeader),
      RawTypeTag::PaxGlobalHeader => Some(Self::PaxGlobalHeader),
      _ => None,
    }
  }
}

#[derive(Debug, Default)]
pub(crate) struct ExtensionStore {
  pending_long_path: Option<String>,
  pending_long_link: Option<String>,
  pending_pax: Option<HashMap<String, String>>,
  global_pax: HashMap<String, String>,
  accum_chunks: Vec<Bytes>,
  accum_remaining: u64,
}

impl ExtensionStore {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Starts accumulating an extension payload of `declared_size` bytes.
  pub(crate) fn begin(&mut self, declared_size: u64) {
    self.accum_chunks.clear();
    self.accum_remaining = declared_size;
  }

  #[must_use]
  pub(crate) fn remaining(&self) -> u64 {
    self.accum_remaining
  }

  /// Feeds up to `accum_remaining` bytes of `chunk`, returning the unconsumed
  /// remainder (empty once the whole chunk was absorbed).
  pub(crate) fn feed(&mut self, chunk: Bytes) {
    debug_assert!(chunk.len() as u64 <= self.accum_remaining);
    self.accum_remaining -= chunk.len() as u64;
    self.accum_chunks.push(chunk);
  }

  /// Concatenates and decodes the accumulated payload per `kind`, storing it as
  /// pending (or merging it into `global_pax`) for the next real header.
  ///
  /// # Errors
  /// Propagates [`DecoderError`] if the payload fails to decode as a NUL-terminated
  /// path (`GnuLongPath`/`GnuLongLinkPath`) or a PAX record stream (`PaxHeader`/
  /// `PaxGlobalHeader`).
  pub(crate) fn finalise(
    &mut self,
    kind: ExtensionKind,
    encoding: FilenameEncoding,
  ) -> Result<(), DecoderError> {
    let payload = self.take_payload();
    match kind {
      ExtensionKind::GnuLongPath => {
        self.pending_long_path = Some(header_codec::decode_long_path(&payload, encoding, CorruptField::Name)?);
      }
      ExtensionKind::GnuLongLinkPath => {
        self.pending_long_link = Some(header_codec::decode_long_path(
          &payload,
          encoding,
          CorruptField::Linkname,
        )?);
      }
      ExtensionKind::PaxHeader => {
        self.pending_pax = Some(header_codec::decode_pax(&payload)?);
      }
      ExtensionKind::PaxGlobalHeader => {
        let records = header_codec::decode_pax(&payload)?;
        self.global_pax.extend(records);
      }
    }
    Ok(())
  }

  fn take_payload(&mut self) -> Vec<u8> {
    let total = self.accum_chunks.iter().map(Bytes::len).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in self.accum_chunks.drain(..) {
      out.extend_from_slice(&chunk);
    }
    out
  }

  /// Applies pending/global extension state to a freshly parsed header, in
  /// precedence order: global PAX, then per-entry PAX (attached to `header.pax`
  /// and cleared), then GNU long path, then GNU long linkname, then trailing-slash
  /// directory promotion.
  pub(crate) fn apply(&mut self, header: &mut Header) {
    for (key, value) in &self.global_pax {
      apply_pax_key(header, key, value);
    }

    if let Some(pax) = self.pending_pax.take() {
      for (key, value) in &pax {
        apply_pax_key(header, key, value);
      }
      header.pax = Some(pax);
    }

    if let Some(long_path) = self.pending_long_path.take() {
      header.name = long_path.into();
    }
    if let Some(long_link) = self.pending_long_link.take() {
      header.linkname = long_link.into();
    }

    if header.entry_type == EntryType::File && header.name.as_str().ends_with('/') {
      header.entry_type = EntryType::Directory;
    }
  }
}

/// `mtime` PAX records are `seconds[.nanoseconds]` decimal, optionally signed.
fn parse_pax_time(value: &str) -> Option<Timestamp> {
  let (sign, value) = value.strip_prefix('-').map_or((1i64, value), |rest| (-1i64, rest));
  let (secs_part, nanos_part) = value.split_once('.').unwrap_or((value, ""));
  let seconds: i64 = secs_part.parse().ok()?;
  let nanos: u32 = if nanos_part.is_empty() {
    0
  } else {
    let mut digits = String::from(nanos_part);
    while digits.len() < 9 {
      digits.push('0');
    }
    digits.truncate(9);
    digits.parse().ok()?
  };
  Some(Timestamp {
    seconds: sign * seconds,
    nanos,
  })
}

fn apply_pax_key(header: &mut Header, key: &str, value: &str) {
  match key {
    "path" => header.name = String::from(value).into(),
    "linkpath" => header.linkname = String::from(value).into(),
    "size" => {
      if let Ok(size) = value.parse() {
        header.size = size;
      }
    }
    "uid" => {
      if let Ok(uid) = value.parse() {
        header.uid = uid;
      }
    }
    "gid" => {
      if let Ok(gid) = value.parse() {
        header.gid = gid;
      }
    }
    "uname" => header.uname = String::from(value),
    "gname" => header.gname = String::from(value),
    "mtime" => {
      if let Some(mtime) = parse_pax_time(value) {
        header.mtime = mtime;
      }
    }
    "atime" => header.pax_atime = parse_pax_time(value),
    "ctime" => header.pax_ctime = parse_pax_time(value),
    _ => {}
  }
}
