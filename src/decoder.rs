//! The state machine that ties the other four components together.

use alloc::vec::Vec;

use bytes::Bytes;

use crate::byte_queue::ByteQueue;
use crate::byte_stream::{self, ByteStream, ByteStreamWriter};
use crate::error::DecoderError;
use crate::extension_store::{ExtensionKind, ExtensionStore};
use crate::header_codec::{self, RawHeader, RawTypeTag};
use crate::sparse::SparseReconstructor;
use crate::types::{DecoderOptions, EntryType, Header, SparseRegion, Timestamp};

const BLOCK_SIZE: usize = header_codec::BLOCK_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  ReadingHeader,
  FileData,
  Padding,
  GnuLongPath,
  GnuLongLinkPath,
  PaxExtension,
  SparseExtended,
  SparseData,
  Ended,
}

struct PendingEntry {
  header: Header,
  stream: ByteStream,
  emitted: bool,
}

/// The result of one [`Decoder::poll`] call.
pub enum PollResult {
  /// A fully resolved entry; its `ByteStream` may still be receiving chunks.
  /// Call [`Decoder::advance`] once done with (or discarding) it.
  Entry(Header, ByteStream),
  /// No entry ready yet; the decoder needs more input, or is waiting on
  /// [`Decoder::advance`] for the previously emitted entry.
  WouldBlock,
  /// The archive terminator was seen (or input ended cleanly) and no more
  /// entries will be produced.
  Finished,
  /// A fatal, terminal error. No further entries will be produced.
  Error(DecoderError),
}

/// The streaming TAR decoder: chunked bytes in, typed entries out.
pub struct Decoder {
  queue: ByteQueue,
  options: DecoderOptions,
  state: State,
  ext: ExtensionStore,
  extension_kind: Option<ExtensionKind>,
  current_header: Option<Header>,
  entry_remaining: u64,
  padding_remaining: u64,
  sparse_map: Vec<SparseRegion>,
  sparse_real_size: u64,
  sparse_recon: Option<SparseReconstructor>,
  sparse_data_remaining: u64,
  locked: bool,
  pending_entry: Option<PendingEntry>,
  stream_writer: Option<ByteStreamWriter>,
  error: Option<DecoderError>,
  input_ended: bool,
}

impl Decoder {
  #[must_use]
  pub fn new(options: DecoderOptions) -> Self {
    Self {
      queue: ByteQueue::new(),
      options,
      state: State::ReadingHeader,
      ext: ExtensionStore::new(),
      extension_kind: None,
      current_header: None,
      entry_remaining: 0,
      padding_remaining: 0,
      sparse_map: Vec::new(),
      sparse_real_size: 0,
      sparse_recon: None,
      sparse_data_remaining: 0,
      locked: false,
      pending_entry: None,
      stream_writer: None,
      error: None,
      input_ended: false,
    }
  }

  /// Appends a chunk and drives the state machine as far as it can go.
  ///
  /// # Errors
  /// Returns the first fatal [`DecoderError`] discovered while parsing. Once
  /// returned, the decoder is `Ended` and subsequent calls are no-ops.
  pub fn write(&mut self, chunk: impl Into<Bytes>) -> Result<bool, DecoderError> {
    if self.state == State::Ended {
      return Ok(false);
    }
    self.queue.append(chunk.into());
    self.run()?;
    Ok(self.locked)
  }

  /// Marks the input exhausted and drives the state machine to completion.
  ///
  /// If an emitted entry is still awaiting [`Self::advance`] when input ends, the
  /// clean-vs-truncated decision is deferred until that `advance` call unlocks the
  /// decoder — ending input doesn't itself resolve as truncated just because the
  /// consumer hasn't acknowledged the last entry yet.
  ///
  /// # Errors
  /// [`DecoderError::TruncatedArchive`] if the archive ends mid-header, mid-entry,
  /// or mid-padding; any other fatal error discovered while draining buffered
  /// input.
  pub fn end_input(&mut self) -> Result<(), DecoderError> {
    if self.state == State::Ended {
      return Ok(());
    }
    self.input_ended = true;
    self.run()?;
    self.finalize_if_input_ended()
  }

  /// Unlocks the decoder after the consumer is done with (or wants to discard) the
  /// most recently emitted entry.
  ///
  /// # Errors
  /// [`DecoderError::PreconditionViolation`] if called with no pending entry
  /// (double-advance, or advance before any entry was ever produced).
  pub fn advance(&mut self) -> Result<(), DecoderError> {
    if self.pending_entry.take().is_none() {
      return Err(DecoderError::PreconditionViolation(
        "advance called with no pending entry",
      ));
    }
    self.locked = false;
    // Dropping the writer here is what makes a consumer-requested discard work:
    // FileData/SparseData keep consuming queue bytes to stay in sync with the
    // stream but silently drop them once `stream_writer` is gone.
    self.stream_writer = None;
    self.run()?;
    self.finalize_if_input_ended()
  }

  /// `true` once the decoder is parked in `ReadingHeader` with no entry, extension,
  /// or padding bytes outstanding and nothing pending `advance` — the only state in
  /// which ending input is unambiguously clean.
  fn is_clean_stop(&self) -> bool {
    self.state == State::ReadingHeader
      && self.queue.is_empty()
      && self.entry_remaining == 0
      && self.padding_remaining == 0
      && !self.locked
  }

  /// Resolves the clean/truncated/still-pending outcome after a `run()` once input
  /// has ended. A no-op until [`Self::end_input`] has been called.
  fn finalize_if_input_ended(&mut self) -> Result<(), DecoderError> {
    if !self.input_ended || self.state == State::Ended {
      return Ok(());
    }
    if self.locked {
      // Another entry is pending acknowledgement; wait for the next `advance`.
      return Ok(());
    }
    if self.is_clean_stop() {
      self.state = State::Ended;
      return Ok(());
    }
    let err = DecoderError::TruncatedArchive;
    self.raise_error(err);
    Err(err)
  }

  /// Cancels decoding. Any live entry stream receives [`DecoderError::Aborted`];
  /// buffered input is released; the decoder becomes `Ended`.
  pub fn close(&mut self) {
    if self.state == State::Ended {
      return;
    }
    if let Some(writer) = self.stream_writer.take() {
      writer.fail(DecoderError::Aborted);
    }
    self.queue.clear();
    self.pending_entry = None;
    self.locked = false;
    self.state = State::Ended;
  }

  /// Pulls the next decoder event.
  pub fn poll(&mut self) -> PollResult {
    if let Some(pending) = self.pending_entry.as_mut() {
      if pending.emitted {
        return PollResult::WouldBlock;
      }
      pending.emitted = true;
      return PollResult::Entry(pending.header.clone(), pending.stream.clone());
    }
    if self.state == State::Ended {
      return self.terminal_result();
    }
    if let Err(e) = self.run() {
      return PollResult::Error(e);
    }
    if let Some(pending) = self.pending_entry.as_mut() {
      pending.emitted = true;
      return PollResult::Entry(pending.header.clone(), pending.stream.clone());
    }
    if self.state == State::Ended {
      return self.terminal_result();
    }
    PollResult::WouldBlock
  }

  fn terminal_result(&self) -> PollResult {
    match self.error {
      Some(e) => PollResult::Error(e),
      None => PollResult::Finished,
    }
  }

  fn raise_error(&mut self, err: DecoderError) {
    if let Some(writer) = self.stream_writer.take() {
      writer.fail(err);
    }
    self.pending_entry = None;
    self.locked = false;
    self.state = State::Ended;
    self.error = Some(err);
  }

  fn run(&mut self) -> Result<(), DecoderError> {
    loop {
      match self.step() {
        Ok(true) => {}
        Ok(false) => return Ok(()),
        Err(e) => {
          self.raise_error(e);
          return Err(e);
        }
      }
    }
  }

  /// Advances the state machine by one unit of work. `Ok(true)` means call again;
  /// `Ok(false)` means the decoder is suspended awaiting more input or `advance`.
  fn step(&mut self) -> Result<bool, DecoderError> {
    match self.state {
      State::Ended => Ok(false),
      State::ReadingHeader => self.step_reading_header(),
      State::FileData => self.step_file_data(),
      State::Padding => self.step_padding(),
      State::GnuLongPath => self.step_extension(ExtensionKind::GnuLongPath),
      State::GnuLongLinkPath => self.step_extension(ExtensionKind::GnuLongLinkPath),
      State::PaxExtension => {
        let kind = self.extension_kind.expect("PaxExtension state always has an extension_kind");
        self.step_extension(kind)
      }
      State::SparseExtended => self.step_sparse_extended(),
      State::SparseData => self.step_sparse_data(),
    }
  }

  fn step_reading_header(&mut self) -> Result<bool, DecoderError> {
    if self.locked {
      return Ok(false);
    }
    if !self.queue.has(BLOCK_SIZE) {
      return Ok(false);
    }
    let block_bytes = self.queue.consume(BLOCK_SIZE)?;
    let block: [u8; BLOCK_SIZE] = block_bytes
      .as_ref()
      .try_into()
      .expect("consume(BLOCK_SIZE) returns exactly BLOCK_SIZE bytes");
    match header_codec::parse_header(&block, self.options.filename_encoding, self.options.allow_unknown_format)? {
      None => {
        self.state = State::Ended;
        Ok(true)
      }
      Some(raw) => {
        self.dispatch_header(raw, &block)?;
        Ok(true)
      }
    }
  }

  fn dispatch_header(&mut self, raw: RawHeader, block: &[u8; BLOCK_SIZE]) -> Result<(), DecoderError> {
    self.padding_remaining = header_codec::overflow(raw.size);

    if let Some(kind) = ExtensionKind::from_tag(raw.tag) {
      self.ext.begin(raw.size);
      self.extension_kind = Some(kind);
      self.state = match kind {
        ExtensionKind::GnuLongPath => State::GnuLongPath,
        ExtensionKind::GnuLongLinkPath => State::GnuLongLinkPath,
        ExtensionKind::PaxHeader | ExtensionKind::PaxGlobalHeader => State::PaxExtension,
      };
      return Ok(());
    }

    if raw.tag == RawTypeTag::GnuSparse {
      let mut header = build_header(raw);
      let (regions, is_extended, real_size) = header_codec::parse_inline_sparse(block)?;
      self.ext.apply(&mut header);
      header.size = real_size;
      self.sparse_map = regions;
      self.sparse_real_size = real_size;
      if is_extended {
        self.current_header = Some(header);
        self.state = State::SparseExtended;
      } else {
        self.setup_sparse_entry(header);
      }
      return Ok(());
    }

    let entry_type = match raw.tag {
      RawTypeTag::Entry(entry_type) => entry_type,
      RawTypeTag::GnuMultiVolume => EntryType::Unknown(b'M'),
      RawTypeTag::GnuLongPath
      | RawTypeTag::GnuLongLinkPath
      | RawTypeTag::PaxHeader
      | RawTypeTag::PaxGlobalHeader
      | RawTypeTag::GnuSparse => unreachable!("extension and sparse tags handled above"),
    };
    if matches!(entry_type, EntryType::Unknown(_)) && !self.options.allow_unknown_format {
      return Err(DecoderError::UnknownEntryType);
    }

    let mut header = build_header(raw);
    header.entry_type = entry_type;
    self.ext.apply(&mut header);
    self.begin_file_entry(header);
    Ok(())
  }

  fn begin_file_entry(&mut self, header: Header) {
    self.entry_remaining = header.size;
    let (writer, reader) = byte_stream::new_pair();
    self.locked = true;
    if self.entry_remaining == 0 {
      writer.close();
      self.state = if self.padding_remaining > 0 { State::Padding } else { State::ReadingHeader };
    } else {
      self.state = State::FileData;
    }
    self.stream_writer = Some(writer);
    self.pending_entry = Some(PendingEntry {
      header,
      stream: reader,
      emitted: false,
    });
  }

  fn step_file_data(&mut self) -> Result<bool, DecoderError> {
    if self.queue.is_empty() {
      return Ok(false);
    }
    let take = self.entry_remaining.min(self.queue.len() as u64);
    #[allow(clippy::cast_possible_truncation)]
    let data = self.queue.consume(take as usize)?;
    if let Some(writer) = &self.stream_writer {
      writer.push(data);
    }
    self.entry_remaining -= take;
    if self.entry_remaining == 0 {
      if let Some(writer) = self.stream_writer.take() {
        writer.close();
      }
      self.state = if self.padding_remaining > 0 { State::Padding } else { State::ReadingHeader };
    }
    Ok(true)
  }

  fn step_padding(&mut self) -> Result<bool, DecoderError> {
    if self.padding_remaining == 0 {
      self.state = State::ReadingHeader;
      return Ok(true);
    }
    if self.queue.is_empty() {
      return Ok(false);
    }
    let take = self.padding_remaining.min(self.queue.len() as u64);
    #[allow(clippy::cast_possible_truncation)]
    let _discarded = self.queue.consume(take as usize)?;
    self.padding_remaining -= take;
    if self.padding_remaining == 0 {
      self.state = State::ReadingHeader;
    }
    Ok(true)
  }

  fn step_extension(&mut self, kind: ExtensionKind) -> Result<bool, DecoderError> {
    if self.ext.remaining() == 0 {
      self.extension_kind = None;
      self.ext.finalise(kind, self.options.filename_encoding)?;
      self.state = if self.padding_remaining > 0 { State::Padding } else { State::ReadingHeader };
      return Ok(true);
    }
    if self.queue.is_empty() {
      return Ok(false);
    }
    let take = self.ext.remaining().min(self.queue.len() as u64);
    #[allow(clippy::cast_possible_truncation)]
    let chunk = self.queue.consume(take as usize)?;
    self.ext.feed(chunk);
    Ok(true)
  }

  fn step_sparse_extended(&mut self) -> Result<bool, DecoderError> {
    if !self.queue.has(BLOCK_SIZE) {
      return Ok(false);
    }
    let block_bytes = self.queue.consume(BLOCK_SIZE)?;
    let block: [u8; BLOCK_SIZE] = block_bytes
      .as_ref()
      .try_into()
      .expect("consume(BLOCK_SIZE) returns exactly BLOCK_SIZE bytes");
    let (mut regions, is_extended) = header_codec::parse_extended_sparse(&block)?;
    self.sparse_map.append(&mut regions);
    if is_extended {
      return Ok(true);
    }
    let header = self
      .current_header
      .take()
      .expect("SparseExtended is only entered with a current_header set");
    self.setup_sparse_entry(header);
    Ok(true)
  }

  fn setup_sparse_entry(&mut self, mut header: Header) {
    let map = core::mem::take(&mut self.sparse_map);
    let total: u64 = map.iter().map(|r| r.numbytes).sum();
    self.sparse_data_remaining = total;
    self.padding_remaining = header_codec::overflow(total);
    header.entry_type = EntryType::File;

    let mut recon = SparseReconstructor::new(map, self.sparse_real_size);
    let (writer, reader) = byte_stream::new_pair();
    self.locked = true;

    if self.sparse_data_remaining == 0 {
      let mut out = Vec::new();
      recon.end(&mut out);
      for chunk in out {
        writer.push(chunk);
      }
      writer.close();
      self.state = if self.padding_remaining > 0 { State::Padding } else { State::ReadingHeader };
    } else {
      self.sparse_recon = Some(recon);
      self.state = State::SparseData;
    }

    self.stream_writer = Some(writer);
    self.pending_entry = Some(PendingEntry {
      header,
      stream: reader,
      emitted: false,
    });
  }

  fn step_sparse_data(&mut self) -> Result<bool, DecoderError> {
    if self.sparse_data_remaining == 0 {
      if let Some(mut recon) = self.sparse_recon.take() {
        let mut out = Vec::new();
        recon.end(&mut out);
        self.push_sparse_chunks(out);
      }
      if let Some(writer) = self.stream_writer.take() {
        writer.close();
      }
      self.state = if self.padding_remaining > 0 { State::Padding } else { State::ReadingHeader };
      return Ok(true);
    }
    if self.queue.is_empty() {
      return Ok(false);
    }
    let take = self.sparse_data_remaining.min(self.queue.len() as u64);
    #[allow(clippy::cast_possible_truncation)]
    let data = self.queue.consume(take as usize)?;
    self.sparse_data_remaining -= take;
    let mut out = Vec::new();
    if let Some(recon) = &mut self.sparse_recon {
      recon.push(&data, &mut out);
    }
    self.push_sparse_chunks(out);
    Ok(true)
  }

  fn push_sparse_chunks(&mut self, chunks: Vec<Bytes>) {
    if let Some(writer) = &self.stream_writer {
      for chunk in chunks {
        writer.push(chunk);
      }
    }
  }
}

fn build_header(raw: RawHeader) -> Header {
  Header {
    name: raw.name.into(),
    mode: raw.mode,
    uid: raw.uid,
    gid: raw.gid,
    size: raw.size,
    mtime: Timestamp::from_seconds(raw.mtime),
    entry_type: match raw.tag {
      RawTypeTag::Entry(entry_type) => entry_type,
      _ => EntryType::File,
    },
    linkname: raw.linkname.into(),
    uname: raw.uname,
    gname: raw.gname,
    devmajor: raw.devmajor,
    devminor: raw.devminor,
    pax: None,
    pax_atime: None,
    pax_ctime: None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use alloc::string::ToString;
  use alloc::vec;

  fn octal(value: u64, width: usize) -> Vec<u8> {
    let mut s = alloc::format!("{value:o}");
    while s.len() < width - 1 {
      s.insert(0, '0');
    }
    let mut buf = s.into_bytes();
    buf.push(0);
    buf.resize(width, 0);
    buf
  }

  fn name_field(name: &str) -> [u8; 100] {
    let mut buf = [0u8; 100];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    buf
  }

  struct HeaderBuilder {
    block: [u8; BLOCK_SIZE],
  }

  impl HeaderBuilder {
    fn new() -> Self {
      Self { block: [0u8; BLOCK_SIZE] }
    }

    fn name(mut self, name: &str) -> Self {
      self.block[0..100].copy_from_slice(&name_field(name));
      self
    }

    fn mode(mut self, mode: u64) -> Self {
      self.block[100..108].copy_from_slice(&octal(mode, 8));
      self
    }

    fn size(mut self, size: u64) -> Self {
      self.block[124..136].copy_from_slice(&octal(size, 12));
      self
    }

    fn typeflag(mut self, flag: u8) -> Self {
      self.block[156] = flag;
      self
    }

    fn linkname(mut self, name: &str) -> Self {
      let mut buf = [0u8; 100];
      buf[..name.len()].copy_from_slice(name.as_bytes());
      self.block[157..257].copy_from_slice(&buf);
      self
    }

    fn ustar(mut self) -> Self {
      self.block[257..263].copy_from_slice(b"ustar\0");
      self.block[263..265].copy_from_slice(b"00");
      self
    }

    fn uid_base256(mut self, value: u64) -> Self {
      let mut field = [0u8; 8];
      field[0] = 0x80;
      field[1..8].copy_from_slice(&value.to_be_bytes()[1..8]);
      self.block[108..116].copy_from_slice(&field);
      self
    }

    fn gid_base256(mut self, value: u64) -> Self {
      let mut field = [0u8; 8];
      field[0] = 0x80;
      field[1..8].copy_from_slice(&value.to_be_bytes()[1..8]);
      self.block[116..124].copy_from_slice(&field);
      self
    }

    fn finish(mut self) -> [u8; BLOCK_SIZE] {
      self.block[148..156].copy_from_slice(b"        ");
      let sum = header_codec::checksum(&self.block);
      let checksum_field = octal(u64::from(sum), 8);
      self.block[148..148 + 6].copy_from_slice(&checksum_field[..6]);
      self.block[154] = 0;
      self.block[155] = b' ';
      self.block
    }
  }

  fn terminator() -> Vec<u8> {
    vec![0u8; BLOCK_SIZE * 2]
  }

  #[test]
  fn gnu_tar_single_file_entry() {
    let header = HeaderBuilder::new()
      .name("test.txt")
      .mode(0o644)
      .size(14)
      .typeflag(b'0')
      .ustar()
      .finish();
    let payload = b"Hello, world!\n";
    let mut archive = header.to_vec();
    archive.extend_from_slice(payload);
    archive.resize(archive.len() + header_codec::overflow(14) as usize, 0);
    archive.extend_from_slice(&terminator());

    let mut decoder = Decoder::new(DecoderOptions::default());
    decoder.write(Bytes::from(archive)).unwrap();
    decoder.end_input().unwrap();

    match decoder.poll() {
      PollResult::Entry(header, mut stream) => {
        assert_eq!(header.name.as_str(), "test.txt");
        assert_eq!(header.size, 14);
        assert_eq!(header.entry_type, EntryType::File);
        assert_eq!(stream.drain_to_end().unwrap(), payload);
      }
      _ => panic!("expected an entry"),
    }
    decoder.advance().unwrap();
    assert!(matches!(decoder.poll(), PollResult::Finished));
  }

  #[test]
  fn empty_block_termination_produces_zero_entries() {
    let mut decoder = Decoder::new(DecoderOptions::default());
    decoder.write(Bytes::from(terminator())).unwrap();
    decoder.end_input().unwrap();
    assert!(matches!(decoder.poll(), PollResult::Finished));
  }

  #[test]
  fn chunk_invariance_byte_by_byte() {
    let header = HeaderBuilder::new()
      .name("a.txt")
      .mode(0o644)
      .size(5)
      .typeflag(b'0')
      .ustar()
      .finish();
    let mut archive = header.to_vec();
    archive.extend_from_slice(b"abcde");
    archive.resize(archive.len() + header_codec::overflow(5) as usize, 0);
    archive.extend_from_slice(&terminator());

    let mut decoder = Decoder::new(DecoderOptions::default());
    for byte in &archive {
      decoder.write(Bytes::copy_from_slice(core::slice::from_ref(byte))).unwrap();
    }
    decoder.end_input().unwrap();

    match decoder.poll() {
      PollResult::Entry(header, mut stream) => {
        assert_eq!(header.name.as_str(), "a.txt");
        assert_eq!(stream.drain_to_end().unwrap(), b"abcde");
      }
      _ => panic!("expected an entry"),
    }
  }

  #[test]
  fn corrupted_checksum_yields_no_entries() {
    let mut header = HeaderBuilder::new()
      .name("a.txt")
      .mode(0o644)
      .size(0)
      .typeflag(b'0')
      .ustar()
      .finish();
    header[0] = b'b';

    let mut decoder = Decoder::new(DecoderOptions::default());
    let result = decoder.write(Bytes::copy_from_slice(&header));
    assert!(matches!(result, Err(DecoderError::InvalidChecksum(_))));
    assert!(matches!(decoder.poll(), PollResult::Error(DecoderError::InvalidChecksum(_))));
  }

  #[test]
  fn base_256_numeric_fields() {
    let header = HeaderBuilder::new()
      .name("big.txt")
      .mode(0o644)
      .size(0)
      .typeflag(b'0')
      .ustar()
      .uid_base256(116_435_139)
      .gid_base256(1_876_110_778)
      .finish();

    let mut decoder = Decoder::new(DecoderOptions::default());
    decoder.write(Bytes::copy_from_slice(&header)).unwrap();
    match decoder.poll() {
      PollResult::Entry(header, _) => {
        assert_eq!(header.uid, 116_435_139);
        assert_eq!(header.gid, 1_876_110_778);
      }
      _ => panic!("expected an entry"),
    }
  }

  #[test]
  fn name_exactly_100_chars() {
    let name: alloc::string::String = "a".repeat(100);
    let mut block = [0u8; BLOCK_SIZE];
    block[0..100].copy_from_slice(name.as_bytes());
    block[100..108].copy_from_slice(&octal(0o644, 8));
    block[124..136].copy_from_slice(&octal(0, 12));
    block[156] = b'0';
    block[257..263].copy_from_slice(b"ustar\0");
    block[263..265].copy_from_slice(b"00");
    block[148..156].copy_from_slice(b"        ");
    let sum = header_codec::checksum(&block);
    let checksum_field = octal(u64::from(sum), 8);
    block[148..154].copy_from_slice(&checksum_field[..6]);
    block[154] = 0;
    block[155] = b' ';

    let mut decoder = Decoder::new(DecoderOptions::default());
    decoder.write(Bytes::copy_from_slice(&block)).unwrap();
    match decoder.poll() {
      PollResult::Entry(header, _) => assert_eq!(header.name.as_str().len(), 100),
      _ => panic!("expected an entry"),
    }
  }

  #[test]
  fn advance_discards_undrained_bytes() {
    let header = HeaderBuilder::new()
      .name("a.txt")
      .mode(0o644)
      .size(5)
      .typeflag(b'0')
      .ustar()
      .finish();
    let mut archive = header.to_vec();
    archive.extend_from_slice(b"abcde");
    archive.resize(archive.len() + header_codec::overflow(5) as usize, 0);
    archive.extend_from_slice(&terminator());

    let mut decoder = Decoder::new(DecoderOptions::default());
    decoder.write(Bytes::from(archive)).unwrap();
    match decoder.poll() {
      PollResult::Entry(..) => {}
      _ => panic!("expected an entry"),
    }
    // Consumer never reads the stream; advance must still let the archive finish.
    decoder.advance().unwrap();
    assert!(matches!(decoder.poll(), PollResult::Finished));
  }

  #[test]
  fn unknown_typeflag_is_fatal_unless_allowed() {
    let header = HeaderBuilder::new()
      .name("a")
      .mode(0o644)
      .size(0)
      .typeflag(b'?')
      .ustar()
      .finish();

    let mut decoder = Decoder::new(DecoderOptions::default());
    let result = decoder.write(Bytes::copy_from_slice(&header));
    assert!(matches!(result, Err(DecoderError::UnknownEntryType)));

    let mut lenient = Decoder::new(DecoderOptions {
      allow_unknown_format: true,
      ..DecoderOptions::default()
    });
    lenient.write(Bytes::copy_from_slice(&header)).unwrap();
    match lenient.poll() {
      PollResult::Entry(header, _) => assert_eq!(header.entry_type, EntryType::Unknown(b'?')),
      _ => panic!("expected an entry"),
    }
  }

  #[test]
  fn types_tar_directory_then_symlink() {
    let dir = HeaderBuilder::new().name("directory/").mode(0o755).size(0).typeflag(b'5').ustar().finish();
    let link = HeaderBuilder::new()
      .name("directory-link")
      .mode(0o777)
      .size(0)
      .typeflag(b'2')
      .linkname("directory")
      .ustar()
      .finish();

    let mut archive = dir.to_vec();
    archive.extend_from_slice(&link);
    archive.extend_from_slice(&terminator());

    let mut decoder = Decoder::new(DecoderOptions::default());
    decoder.write(Bytes::from(archive)).unwrap();
    decoder.end_input().unwrap();

    match decoder.poll() {
      PollResult::Entry(header, _) => {
        assert_eq!(header.name.as_str(), "directory");
        assert_eq!(header.entry_type, EntryType::Directory);
      }
      _ => panic!("expected the directory entry"),
    }
    decoder.advance().unwrap();

    match decoder.poll() {
      PollResult::Entry(header, _) => {
        assert_eq!(header.name.as_str(), "directory-link");
        assert_eq!(header.entry_type, EntryType::Symlink);
        assert_eq!(header.linkname.as_str(), "directory");
      }
      _ => panic!("expected the symlink entry"),
    }
  }

  #[test]
  fn ustar_prefix_joins_with_name() {
    let prefix = "p".repeat(155);
    let mut block = HeaderBuilder::new().name("filename.txt").mode(0o644).size(16).typeflag(b'0').ustar().finish();
    block[345..345 + prefix.len()].copy_from_slice(prefix.as_bytes());
    block[148..156].copy_from_slice(b"        ");
    let sum = header_codec::checksum(&block);
    let checksum_field = octal(u64::from(sum), 8);
    block[148..154].copy_from_slice(&checksum_field[..6]);
    block[154] = 0;
    block[155] = b' ';

    let mut decoder = Decoder::new(DecoderOptions::default());
    decoder.write(Bytes::copy_from_slice(&block)).unwrap();
    match decoder.poll() {
      PollResult::Entry(header, _) => {
        let expected_len = prefix.len() + 1 + "filename.txt".len();
        assert_eq!(header.name.as_str().len(), expected_len);
        assert!(header.name.as_str().ends_with("filename.txt"));
      }
      _ => panic!("expected an entry"),
    }
  }

  #[test]
  fn sparse_round_trip() {
    let mut header = HeaderBuilder::new().name("sparse.bin").mode(0o644).typeflag(b'S').finish();
    header[257..263].copy_from_slice(b"ustar ");
    header[263..265].copy_from_slice(b" \0");
    // sparse map at 386: two entries (offset, numbytes), each 12+12 octal.
    header[386..398].copy_from_slice(&octal(0, 12));
    header[398..410].copy_from_slice(&octal(4, 12));
    header[410..422].copy_from_slice(&octal(512, 12));
    header[422..434].copy_from_slice(&octal(4, 12));
    header[482] = 0;
    header[483..495].copy_from_slice(&octal(1024, 12));
    // declared on-disk size: packed data length (8 bytes here).
    header[124..136].copy_from_slice(&octal(8, 12));
    header[148..156].copy_from_slice(b"        ");
    let sum = header_codec::checksum(&header);
    let checksum_field = octal(u64::from(sum), 8);
    header[148..154].copy_from_slice(&checksum_field[..6]);
    header[154] = 0;
    header[155] = b' ';

    let mut archive = header.to_vec();
    archive.extend_from_slice(b"AAAA");
    archive.extend_from_slice(b"BBBB");
    archive.extend_from_slice(&terminator());

    let mut decoder = Decoder::new(DecoderOptions::default());
    decoder.write(Bytes::from(archive)).unwrap();
    decoder.end_input().unwrap();

    match decoder.poll() {
      PollResult::Entry(header, mut stream) => {
        assert_eq!(header.entry_type, EntryType::File);
        assert_eq!(header.size, 1024);
        let bytes = stream.drain_to_end().unwrap();
        assert_eq!(bytes.len(), 1024);
        assert_eq!(&bytes[0..4], b"AAAA");
        assert!(bytes[4..512].iter().all(|&b| b == 0));
        assert_eq!(&bytes[512..516], b"BBBB");
        assert!(bytes[516..1024].iter().all(|&b| b == 0));
      }
      _ => panic!("expected the reconstructed sparse entry"),
    }
  }

  #[test]
  fn gnu_long_path_overrides_name() {
    let long_name = "node-v0.11.14/".to_string() + &"x".repeat(90);
    let mut long_path_header = HeaderBuilder::new()
      .name("././@LongLink")
      .mode(0)
      .size((long_name.len() + 1) as u64)
      .typeflag(b'L')
      .finish();
    long_path_header[257..263].copy_from_slice(b"ustar ");
    long_path_header[263..265].copy_from_slice(b" \0");
    long_path_header[148..156].copy_from_slice(b"        ");
    let sum = header_codec::checksum(&long_path_header);
    let checksum_field = octal(u64::from(sum), 8);
    long_path_header[148..154].copy_from_slice(&checksum_field[..6]);
    long_path_header[154] = 0;
    long_path_header[155] = b' ';

    let mut payload = long_name.clone().into_bytes();
    payload.push(0);
    let overflow = header_codec::overflow(payload.len() as u64) as usize;
    payload.resize(payload.len() + overflow, 0);

    let real_header = HeaderBuilder::new().name("node-v0.11.14").mode(0o644).size(0).typeflag(b'0').ustar().finish();

    let mut archive = long_path_header.to_vec();
    archive.extend_from_slice(&payload);
    archive.extend_from_slice(&real_header);
    archive.extend_from_slice(&terminator());

    let mut decoder = Decoder::new(DecoderOptions::default());
    decoder.write(Bytes::from(archive)).unwrap();
    decoder.end_input().unwrap();

    match decoder.poll() {
      PollResult::Entry(header, _) => {
        assert!(header.name.as_str().contains("node-v0.11.14"));
        assert!(header.name.as_str().len() > 100);
      }
      _ => panic!("expected an entry"),
    }
  }
}
