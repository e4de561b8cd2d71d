//! Pure functions over 512-byte TAR header blocks.
//!
//! Nothing here touches the [`crate::byte_queue::ByteQueue`] or decoder state; every
//! function takes a block (or a field slice of one) and returns a decoded value or
//! a parse error. The block layout is modeled field for field via `zerocopy`.

use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashMap;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{ChecksumError, HeaderParseError, NumericFieldError, PaxRecordError};
use crate::types::{CorruptField, EntryType, FilenameEncoding, SparseRegion};

pub const BLOCK_SIZE: usize = 512;

/// `name[100] mode[8] uid[8] gid[8] size[12] mtime[12] checksum[8] typeflag[1]
/// linkname[100] magic_version[8]`, followed by `padding` holding whichever of
/// [`CommonHeaderAdditions`] applies.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub(crate) struct V7Header {
  pub name: [u8; 100],
  pub mode: [u8; 8],
  pub uid: [u8; 8],
  pub gid: [u8; 8],
  pub size: [u8; 12],
  pub mtime: [u8; 12],
  pub checksum: [u8; 8],
  pub typeflag: u8,
  pub linkname: [u8; 100],
  pub magic_version: [u8; 8],
  pub padding: [u8; 247],
}

impl V7Header {
  const MAGIC_USTAR: &'static [u8; 6] = b"ustar\0";
  const MAGIC_GNU: &'static [u8; 6] = b"ustar ";
  const VERSION_GNU: &'static [u8; 2] = b" \0";
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub(crate) struct CommonHeaderAdditions {
  pub uname: [u8; 32],
  pub gname: [u8; 32],
  pub devmajor: [u8; 8],
  pub devminor: [u8; 8],
  pub padding: [u8; 167],
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub(crate) struct UstarHeaderAdditions {
  pub prefix: [u8; 155],
  pub pad: [u8; 12],
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub(crate) struct GnuHeaderAdditions {
  pub atime: [u8; 12],
  pub ctime: [u8; 12],
  pub offset: [u8; 12],
  pub longnames: [u8; 4],
  pub unused: [u8; 1],
  pub sparse: [GnuSparseInstruction; 4],
  pub is_extended: [u8; 1],
  pub real_size: [u8; 12],
  pub padding: [u8; 17],
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct GnuSparseInstruction {
  pub offset: [u8; 12],
  pub numbytes: [u8; 12],
}

impl GnuSparseInstruction {
  const ZERO: GnuSparseInstruction = GnuSparseInstruction {
    offset: [0; 12],
    numbytes: [0; 12],
  };

  fn is_zero(&self) -> bool {
    self == &Self::ZERO
  }
}

/// The 512-byte continuation block that follows a GNU sparse header when its
/// `is_extended` flag is set.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub(crate) struct GnuHeaderExtSparse {
  pub sparse: [GnuSparseInstruction; 21],
  pub is_extended: [u8; 1],
  pub padding: [u8; 7],
}

/// The typeflag byte decoded to either a surfaced entry type or an internal
/// extension-meta kind; the extension kinds never reach a `Header`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTypeTag {
  Entry(EntryType),
  GnuLongPath,
  GnuLongLinkPath,
  GnuSparse,
  PaxHeader,
  PaxGlobalHeader,
  /// `'M'`, GNU multi-volume continuation. Multi-volume archives are not
  /// reassembled; this surfaces as `Unknown` rather than stitched across volumes.
  GnuMultiVolume,
}

#[must_use]
pub fn decode_typeflag(byte: u8) -> RawTypeTag {
  match byte {
    0 | b'0' => RawTypeTag::Entry(EntryType::File),
    b'1' => RawTypeTag::Entry(EntryType::HardLink),
    b'2' => RawTypeTag::Entry(EntryType::Symlink),
    b'3' => RawTypeTag::Entry(EntryType::CharDevice),
    b'4' => RawTypeTag::Entry(EntryType::BlockDevice),
    b'5' => RawTypeTag::Entry(EntryType::Directory),
    b'6' => RawTypeTag::Entry(EntryType::Fifo),
    b'7' => RawTypeTag::Entry(EntryType::ContiguousFile),
    b'D' => RawTypeTag::Entry(EntryType::GnuDumpDir),
    b'V' => RawTypeTag::Entry(EntryType::GnuVolumeHeader),
    b'L' => RawTypeTag::GnuLongPath,
    b'K' => RawTypeTag::GnuLongLinkPath,
    b'S' => RawTypeTag::GnuSparse,
    b'M' => RawTypeTag::GnuMultiVolume,
    b'x' => RawTypeTag::PaxHeader,
    b'g' => RawTypeTag::PaxGlobalHeader,
    other => RawTypeTag::Entry(EntryType::Unknown(other)),
  }
}

/// Decodes an octal (or, when the marker bit is set, GNU base-256) numeric field.
///
/// # Errors
/// Returns [`NumericFieldError`] if the field is neither valid octal ASCII nor a
/// well-formed base-256 encoding.
pub fn decode_octal(field: &[u8]) -> Result<i64, NumericFieldError> {
  if field.is_empty() {
    return Ok(0);
  }
  if field[0] & 0x80 != 0 {
    return decode_base256(field);
  }
  let text = core::str::from_utf8(field).map_err(|_| NumericFieldError::InvalidUtf8)?;
  let trimmed = text.trim_matches(|c: char| c == ' ' || c == '\0');
  let digits = trimmed.trim_start_matches('0');
  if digits.is_empty() {
    return Ok(0);
  }
  i64::from_str_radix(digits, 8).map_err(|_| NumericFieldError::InvalidOctalDigit)
}

/// GNU base-256 fallback: bytes `[1..len)` of the field are a big-endian unsigned
/// magnitude (the marker byte at index 0 is excluded), negated when the marker
/// byte's `0x40` bit is set.
fn decode_base256(field: &[u8]) -> Result<i64, NumericFieldError> {
  let negative = field[0] & 0x40 != 0;
  let mut magnitude: u64 = 0;
  for &byte in &field[1..] {
    magnitude = (magnitude << 8) | u64::from(byte);
  }
  let magnitude = i64::try_from(magnitude).map_err(|_| NumericFieldError::InvalidOctalDigit)?;
  Ok(if negative { -magnitude } else { magnitude })
}

fn null_terminated(bytes: &[u8]) -> &[u8] {
  let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
  &bytes[..end]
}

fn decode_string(
  bytes: &[u8],
  encoding: FilenameEncoding,
  field: CorruptField,
) -> Result<String, HeaderParseError> {
  let raw = null_terminated(bytes);
  match encoding {
    FilenameEncoding::Utf8 => core::str::from_utf8(raw)
      .map(String::from)
      .map_err(|_| HeaderParseError::InvalidEncoding { field }),
    FilenameEncoding::Latin1 => Ok(raw.iter().map(|&b| b as char).collect()),
  }
}

/// Unsigned sum of all 512 bytes with the stored-checksum field treated as spaces.
#[must_use]
pub fn checksum(block: &[u8; BLOCK_SIZE]) -> u32 {
  block
    .iter()
    .enumerate()
    .map(|(i, &b)| if (148..156).contains(&i) { 0x20_u32 } else { u32::from(b) })
    .sum()
}

#[must_use]
pub fn is_ustar(block: &[u8; BLOCK_SIZE]) -> bool {
  block[257..263] == *V7Header::MAGIC_USTAR
}

#[must_use]
pub fn is_gnu(block: &[u8; BLOCK_SIZE]) -> bool {
  block[257..263] == *V7Header::MAGIC_GNU && block[263..265] == *V7Header::VERSION_GNU
}

/// `(512 - size % 512) % 512`.
#[must_use]
pub fn overflow(size: u64) -> u64 {
  (BLOCK_SIZE as u64 - size % BLOCK_SIZE as u64) % BLOCK_SIZE as u64
}

/// A parsed, but not yet extension-applied, header block.
pub(crate) struct RawHeader {
  pub name: String,
  pub mode: u32,
  pub uid: u32,
  pub gid: u32,
  pub size: u64,
  pub mtime: i64,
  pub tag: RawTypeTag,
  pub linkname: String,
  pub uname: String,
  pub gname: String,
  pub devmajor: u32,
  pub devminor: u32,
  pub is_gnu: bool,
}

fn field_err(field: CorruptField) -> impl Fn(NumericFieldError) -> HeaderParseError {
  move |source| HeaderParseError::CorruptField { field, source }
}

/// Parses one 512-byte block.
///
/// Returns `Ok(None)` for the all-zero terminator sentinel (checksum equals
/// `8 * 32`). Trailing-slash-means-directory conversion and prefix/long-path
/// precedence are **not** applied here; that is [`crate::extension_store::ExtensionStore::apply`]'s job.
///
/// # Errors
/// [`HeaderParseError::InvalidChecksum`] on checksum mismatch,
/// [`HeaderParseError::InvalidFormat`] on unrecognised magic when unknown formats
/// are disallowed, or a `CorruptField`/`InvalidEncoding` variant for a malformed
/// field.
pub(crate) fn parse_header(
  block: &[u8; BLOCK_SIZE],
  encoding: FilenameEncoding,
  allow_unknown_format: bool,
) -> Result<Option<RawHeader>, HeaderParseError> {
  let computed = checksum(block);
  if computed == 8 * 0x20 {
    return Ok(None);
  }

  let v7 = V7Header::ref_from_bytes(block.as_slice()).expect("V7Header covers exactly one 512-byte block");
  let stored = decode_octal(&v7.checksum).map_err(field_err(CorruptField::Checksum))?;
  #[allow(clippy::cast_sign_loss)]
  let stored = stored as u32;
  if stored != computed {
    return Err(ChecksumError { stored, computed }.into());
  }

  let ustar = is_ustar(block);
  let gnu = is_gnu(block);
  if !ustar && !gnu && !allow_unknown_format {
    return Err(HeaderParseError::InvalidFormat);
  }

  let common = CommonHeaderAdditions::ref_from_bytes(v7.padding.as_slice())
    .expect("CommonHeaderAdditions covers the V7 padding region");

  let mut name = decode_string(&v7.name, encoding, CorruptField::Name)?;
  if ustar {
    let ustar_additions = UstarHeaderAdditions::ref_from_bytes(common.padding.as_slice())
      .expect("UstarHeaderAdditions covers CommonHeaderAdditions' padding region");
    let prefix_raw = null_terminated(&ustar_additions.prefix);
    if !prefix_raw.is_empty() {
      let prefix = decode_string(&ustar_additions.prefix, encoding, CorruptField::Prefix)?;
      name = alloc::format!("{prefix}/{name}");
    }
  }

  let mode = decode_octal(&v7.mode).map_err(field_err(CorruptField::Mode))?;
  let uid = decode_octal(&v7.uid).map_err(field_err(CorruptField::Uid))?;
  let gid = decode_octal(&v7.gid).map_err(field_err(CorruptField::Gid))?;
  let size = decode_octal(&v7.size).map_err(field_err(CorruptField::Size))?;
  let mtime = decode_octal(&v7.mtime).map_err(field_err(CorruptField::Mtime))?;
  let devmajor = decode_octal(&common.devmajor).map_err(field_err(CorruptField::DevMajor))?;
  let devminor = decode_octal(&common.devminor).map_err(field_err(CorruptField::DevMinor))?;

  Ok(Some(RawHeader {
    name,
    #[allow(clippy::cast_sign_loss)]
    mode: mode as u32,
    #[allow(clippy::cast_sign_loss)]
    uid: uid as u32,
    #[allow(clippy::cast_sign_loss)]
    gid: gid as u32,
    #[allow(clippy::cast_sign_loss)]
    size: size as u64,
    mtime,
    tag: decode_typeflag(v7.typeflag),
    linkname: decode_string(&v7.linkname, encoding, CorruptField::Linkname)?,
    uname: decode_string(&common.uname, FilenameEncoding::Utf8, CorruptField::Uname)?,
    gname: decode_string(&common.gname, FilenameEncoding::Utf8, CorruptField::Gname)?,
    #[allow(clippy::cast_sign_loss)]
    devmajor: devmajor as u32,
    #[allow(clippy::cast_sign_loss)]
    devminor: devminor as u32,
    is_gnu: gnu,
  }))
}

/// Reads the GNU old-format sparse map embedded in a `'S'`-typeflag header block:
/// up to 4 `(offset, numbytes)` entries at offset 386, plus `is_extended` (482) and
/// `real_size` (483..495).
pub(crate) fn parse_inline_sparse(
  block: &[u8; BLOCK_SIZE],
) -> Result<(Vec<SparseRegion>, bool, u64), HeaderParseError> {
  let v7 = V7Header::ref_from_bytes(block.as_slice()).expect("V7Header covers exactly one 512-byte block");
  let common = CommonHeaderAdditions::ref_from_bytes(v7.padding.as_slice())
    .expect("CommonHeaderAdditions covers the V7 padding region");
  let gnu = GnuHeaderAdditions::ref_from_bytes(common.padding.as_slice())
    .expect("GnuHeaderAdditions covers the GNU-format padding region");
  let mut regions = Vec::with_capacity(4);
  for entry in &gnu.sparse {
    if entry.is_zero() {
      break;
    }
    let offset = decode_octal(&entry.offset).map_err(field_err(CorruptField::SparseOffset))?;
    let numbytes = decode_octal(&entry.numbytes).map_err(field_err(CorruptField::SparseNumBytes))?;
    #[allow(clippy::cast_sign_loss)]
    regions.push(SparseRegion {
      offset: offset as u64,
      numbytes: numbytes as u64,
    });
  }
  let is_extended = gnu.is_extended[0] != 0;
  let real_size = decode_octal(&gnu.real_size).map_err(field_err(CorruptField::RealSize))?;
  #[allow(clippy::cast_sign_loss)]
  Ok((regions, is_extended, real_size as u64))
}

/// Reads up to 21 `(offset, numbytes)` entries from a GNU sparse continuation
/// block, plus its own `is_extended` flag at offset 504.
pub(crate) fn parse_extended_sparse(
  block: &[u8; BLOCK_SIZE],
) -> Result<(Vec<SparseRegion>, bool), HeaderParseError> {
  let ext = GnuHeaderExtSparse::ref_from_bytes(block.as_slice())
    .expect("GnuHeaderExtSparse covers a full 512-byte block");
  let mut regions = Vec::with_capacity(21);
  for entry in &ext.sparse {
    if entry.is_zero() {
      break;
    }
    let offset = decode_octal(&entry.offset).map_err(field_err(CorruptField::SparseOffset))?;
    let numbytes = decode_octal(&entry.numbytes).map_err(field_err(CorruptField::SparseNumBytes))?;
    #[allow(clippy::cast_sign_loss)]
    regions.push(SparseRegion {
      offset: offset as u64,
      numbytes: numbytes as u64,
    });
  }
  Ok((regions, ext.is_extended[0] != 0))
}

/// Decodes a NUL-terminated GNU long-path/long-linkname payload.
///
/// # Errors
/// [`HeaderParseError::InvalidEncoding`] if the bytes don't decode under `encoding`.
pub(crate) fn decode_long_path(
  bytes: &[u8],
  encoding: FilenameEncoding,
  field: CorruptField,
) -> Result<String, HeaderParseError> {
  decode_string(bytes, encoding, field)
}

/// Parses `"<len> <key>=<value>\n"` PAX records, where `<len>` is the decimal
/// length of the whole record (digits, space, key, `=`, value, newline).
/// Stops cleanly at end of buffer or on a malformed record.
///
/// # Errors
/// [`PaxRecordError`] if a record's length prefix, key, or value is malformed.
pub(crate) fn decode_pax(mut bytes: &[u8]) -> Result<HashMap<String, String>, PaxRecordError> {
  let mut out = HashMap::new();
  while !bytes.is_empty() {
    let Some(space_idx) = bytes.iter().position(|&b| b == b' ') else {
      break;
    };
    let len_text = core::str::from_utf8(&bytes[..space_idx]).map_err(|_| PaxRecordError::InvalidLength)?;
    let record_len: usize = len_text.parse().map_err(|_| PaxRecordError::InvalidLength)?;
    if record_len == 0 || record_len > bytes.len() {
      return Err(PaxRecordError::InvalidLength);
    }
    let record = &bytes[..record_len];
    if record[record_len - 1] != b'\n' {
      return Err(PaxRecordError::MissingTerminator);
    }
    let kv = &record[space_idx + 1..record_len - 1];
    let eq_idx = kv.iter().position(|&b| b == b'=').ok_or(PaxRecordError::InvalidKey)?;
    let key = core::str::from_utf8(&kv[..eq_idx]).map_err(|_| PaxRecordError::InvalidKey)?;
    let value = core::str::from_utf8(&kv[eq_idx + 1..]).map_err(|_| PaxRecordError::InvalidValue)?;
    out.insert(String::from(key), String::from(value));
    bytes = &bytes[record_len..];
  }
  Ok(out)
}
