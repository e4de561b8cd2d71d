use alloc::string::String;
use core::fmt;

use hashbrown::HashMap;
use relative_path::RelativePathBuf;

/// Seconds + nanoseconds since the Unix epoch.
///
/// Kept as two integers rather than `f64` so that PAX's fractional-second `mtime`
/// records (`seconds.nanoseconds`) round-trip exactly instead of losing bits to
/// float rounding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
  pub seconds: i64,
  pub nanos: u32,
}

impl Timestamp {
  #[must_use]
  pub fn from_seconds(seconds: i64) -> Self {
    Self { seconds, nanos: 0 }
  }
}

/// The resolved type of an entry, after any GNU/PAX extension has been applied.
///
/// Extension-meta typeflags (`L`, `K`, `S`, `x`, `g`, `M`) never reach this enum —
/// the decoder consumes them internally and they never become a surfaced `Header`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
  File,
  HardLink,
  Symlink,
  CharDevice,
  BlockDevice,
  Directory,
  Fifo,
  ContiguousFile,
  GnuDumpDir,
  GnuVolumeHeader,
  /// A typeflag byte not covered by any known format, surfaced only when
  /// `allow_unknown_format` is set.
  Unknown(u8),
}

impl EntryType {
  #[must_use]
  pub fn is_file_like(self) -> bool {
    matches!(
      self,
      EntryType::File | EntryType::ContiguousFile | EntryType::Unknown(_)
    )
  }
}

/// Fully resolved header for one archive entry.
#[derive(Debug, Clone)]
pub struct Header {
  pub name: RelativePathBuf,
  pub mode: u32,
  pub uid: u32,
  pub gid: u32,
  /// Post-extension resolved size; equals the emitted `ByteStream`'s length.
  pub size: u64,
  pub mtime: Timestamp,
  pub entry_type: EntryType,
  pub linkname: RelativePathBuf,
  pub uname: String,
  pub gname: String,
  pub devmajor: u32,
  pub devminor: u32,
  /// Present when per-entry PAX attributes were applied to this header. Carries
  /// every decoded PAX record, well-known or not.
  pub pax: Option<HashMap<String, String>>,
  /// PAX `atime`, when present.
  pub pax_atime: Option<Timestamp>,
  /// PAX `ctime`, when present.
  pub pax_ctime: Option<Timestamp>,
}

impl Header {
  pub(crate) fn empty() -> Self {
    Self {
      name: RelativePathBuf::new(),
      mode: 0,
      uid: 0,
      gid: 0,
      size: 0,
      mtime: Timestamp::default(),
      entry_type: EntryType::File,
      linkname: RelativePathBuf::new(),
      uname: String::new(),
      gname: String::new(),
      devmajor: 0,
      devminor: 0,
      pax: None,
      pax_atime: None,
      pax_ctime: None,
    }
  }
}

/// One `(offset, numbytes)` region of a sparse map: `numbytes` packed bytes of real
/// data land at virtual offset `offset` in the reconstructed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseRegion {
  pub offset: u64,
  pub numbytes: u64,
}

/// Selects the decoder for `name`/`linkname`/prefix/long-path byte strings.
/// `uname`/`gname` are always decoded as UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilenameEncoding {
  #[default]
  Utf8,
  Latin1,
}

/// Decoder construction options.
#[derive(Debug, Clone, Copy)]
pub struct DecoderOptions {
  pub filename_encoding: FilenameEncoding,
  pub allow_unknown_format: bool,
}

impl Default for DecoderOptions {
  fn default() -> Self {
    Self {
      filename_encoding: FilenameEncoding::Utf8,
      allow_unknown_format: false,
    }
  }
}

/// Identifies which header field a parse failure occurred on, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptField {
  Name,
  Checksum,
  Mode,
  Uid,
  Gid,
  Size,
  Mtime,
  Linkname,
  Uname,
  Gname,
  DevMajor,
  DevMinor,
  Prefix,
  RealSize,
  SparseOffset,
  SparseNumBytes,
}

impl fmt::Display for CorruptField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      CorruptField::Name => "header.name",
      CorruptField::Checksum => "header.checksum",
      CorruptField::Mode => "header.mode",
      CorruptField::Uid => "header.uid",
      CorruptField::Gid => "header.gid",
      CorruptField::Size => "header.size",
      CorruptField::Mtime => "header.mtime",
      CorruptField::Linkname => "header.linkname",
      CorruptField::Uname => "header.uname",
      CorruptField::Gname => "header.gname",
      CorruptField::DevMajor => "header.devmajor",
      CorruptField::DevMinor => "header.devminor",
      CorruptField::Prefix => "header.prefix",
      CorruptField::RealSize => "gnu.real_size",
      CorruptField::SparseOffset => "gnu.sparse.offset",
      CorruptField::SparseNumBytes => "gnu.sparse.numbytes",
    };
    f.write_str(s)
  }
}
