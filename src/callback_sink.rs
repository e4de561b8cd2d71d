//! The callback-style surface over [`Decoder`]: a thin adapter for callers that want
//! `on_entry`/`on_finish`/`on_error` instead of driving [`Decoder::poll`] themselves.
//! Both shapes drive the same inner state machine.
//!
//! `on_entry` is handed the entry's [`Header`] and its [`ByteStream`]; the sink
//! advances the decoder past that entry itself as soon as the callback returns, so a
//! caller that wants the entry's bytes must drain the stream before returning from
//! `on_entry` rather than stashing it for later.

use alloc::boxed::Box;

use bytes::Bytes;

use crate::byte_stream::ByteStream;
use crate::decoder::{Decoder, PollResult};
use crate::error::DecoderError;
use crate::types::{DecoderOptions, Header};

/// Drives a [`Decoder`] and dispatches each resolved event to a caller-provided
/// callback set, matching the reference implementation's emitter shape.
pub struct CallbackSink {
  decoder: Decoder,
  on_entry: Box<dyn FnMut(Header, ByteStream)>,
  on_finish: Box<dyn FnMut()>,
  on_error: Box<dyn FnMut(DecoderError)>,
  done: bool,
}

impl CallbackSink {
  #[must_use]
  pub fn new(
    options: DecoderOptions,
    on_entry: impl FnMut(Header, ByteStream) + 'static,
    on_finish: impl FnMut() + 'static,
    on_error: impl FnMut(DecoderError) + 'static,
  ) -> Self {
    Self {
      decoder: Decoder::new(options),
      on_entry: Box::new(on_entry),
      on_finish: Box::new(on_finish),
      on_error: Box::new(on_error),
      done: false,
    }
  }

  /// Appends a chunk and dispatches any entries (and any further entries their
  /// callbacks unblock) it completes.
  pub fn write(&mut self, chunk: impl Into<Bytes>) {
    if self.done {
      return;
    }
    if let Err(err) = self.decoder.write(chunk) {
      self.fail(err);
      return;
    }
    self.drain();
  }

  /// Marks input exhausted and dispatches the final event.
  pub fn end_input(&mut self) {
    if self.done {
      return;
    }
    if let Err(err) = self.decoder.end_input() {
      self.fail(err);
      return;
    }
    self.drain();
  }

  /// Cancels decoding; any live entry stream receives `Aborted`.
  pub fn close(&mut self) {
    self.decoder.close();
    self.done = true;
  }

  /// Drains every event the decoder can currently produce without new input,
  /// advancing past each dispatched entry so the next one can be reached in the
  /// same call.
  fn drain(&mut self) {
    while !self.done {
      match self.decoder.poll() {
        PollResult::Entry(header, stream) => {
          (self.on_entry)(header, stream);
          if let Err(err) = self.decoder.advance() {
            self.fail(err);
            return;
          }
        }
        PollResult::WouldBlock => return,
        PollResult::Finished => {
          self.done = true;
          (self.on_finish)();
        }
        PollResult::Error(err) => {
          self.done = true;
          (self.on_error)(err);
        }
      }
    }
  }

  fn fail(&mut self, err: DecoderError) {
    self.done = true;
    (self.on_error)(err);
  }
}
