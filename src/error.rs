use thiserror::Error;

use crate::types::CorruptField;

/// Failure decoding a numeric header field (octal or GNU base-256).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericFieldError {
  #[error("non-UTF8 bytes in octal field")]
  InvalidUtf8,
  #[error("octal digit out of range")]
  InvalidOctalDigit,
}

/// Checksum mismatch on a header block.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("header checksum mismatch: stored {stored}, computed {computed}")]
pub struct ChecksumError {
  pub stored: u32,
  pub computed: u32,
}

/// Failure parsing a single 512-byte header block.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderParseError {
  #[error("invalid checksum: {0}")]
  InvalidChecksum(#[from] ChecksumError),
  #[error("neither USTAR nor GNU magic, and unknown formats are not allowed")]
  InvalidFormat,
  #[error("corrupt {field}: {source}")]
  CorruptField {
    field: CorruptField,
    source: NumericFieldError,
  },
  #[error("corrupt {field}: non-UTF8 bytes")]
  InvalidEncoding { field: CorruptField },
}

/// Failure decoding a PAX extended-header record stream.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaxRecordError {
  #[error("PAX record length field is not a valid decimal number")]
  InvalidLength,
  #[error("PAX record key is not valid UTF-8")]
  InvalidKey,
  #[error("PAX record value is not valid UTF-8")]
  InvalidValue,
  #[error("PAX record does not end in a newline")]
  MissingTerminator,
}

/// The decoder's terminal error taxonomy.
///
/// Every variant is fatal: once raised, the decoder transitions to `Ended` and all
/// subsequent `write` calls are no-ops.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderError {
  #[error("invalid checksum: {0}")]
  InvalidChecksum(#[from] ChecksumError),
  #[error("unrecognised archive format")]
  InvalidFormat,
  #[error("corrupt header field: {0}")]
  HeaderField(HeaderParseError),
  #[error("corrupt PAX record: {0}")]
  PaxRecord(PaxRecordError),
  #[error("archive ended mid-entry")]
  TruncatedArchive,
  #[error("typeflag is not recognised and unknown formats are not allowed")]
  UnknownEntryType,
  #[error("internal precondition violated: {0}")]
  PreconditionViolation(&'static str),
  #[error("decoder closed while an entry stream was live")]
  Aborted,
}

impl From<HeaderParseError> for DecoderError {
  fn from(value: HeaderParseError) -> Self {
    match value {
      HeaderParseError::InvalidChecksum(e) => DecoderError::InvalidChecksum(e),
      HeaderParseError::InvalidFormat => DecoderError::InvalidFormat,
      other => DecoderError::HeaderField(other),
    }
  }
}

impl From<PaxRecordError> for DecoderError {
  fn from(value: PaxRecordError) -> Self {
    DecoderError::PaxRecord(value)
  }
}
