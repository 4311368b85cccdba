//! `engine/mod.rs` — sample-processing engine boundary.
//!
//! The transform pipeline never touches sample arithmetic directly; it hands
//! whole buffers across the [`SampleEngine`] seam and consumes [`Completion`]
//! messages coming back on a channel. The built-in implementation is
//! [`WorkerEngine`] (a dedicated worker thread); tests substitute mocks.

pub mod scale;
pub mod worker;

pub use worker::WorkerEngine;

use crate::format::PcmFormat;

/// One finished feed: the sequence number it was fed under and the processed
/// buffer, scaled in place.
#[derive(Debug)]
pub struct Completion {
    pub seq: u64,
    pub payload: Vec<u8>,
}

/// Where an engine delivers its completions.
///
/// The pipeline driver implements this by wrapping completions into its own
/// command channel, marshaling them onto the single pipeline thread; a plain
/// `flume::Sender<Completion>` works for direct consumers and tests.
pub trait CompletionSink: Send + 'static {
    /// Deliver one completion. Returns `false` when the consumer is gone.
    fn complete(&self, done: Completion) -> bool;
}

impl CompletionSink for flume::Sender<Completion> {
    fn complete(&self, done: Completion) -> bool {
        self.send(done).is_ok()
    }
}

/// Contract with the opaque asynchronous engine.
///
/// Exactly one completion is delivered per `feed`, in feed order, on the
/// channel supplied at engine construction. The pipeline enforces the
/// one-buffer-in-flight contract; the engine does not have to.
pub trait SampleEngine: Send {
    /// Hand one buffer to the engine. Non-blocking; the result arrives later
    /// as a [`Completion`] tagged with `seq`.
    fn feed(&mut self, seq: u64, payload: Vec<u8>);

    /// Reconfigure the PCM format. Affects subsequently fed buffers only,
    /// never a buffer already in flight.
    fn set_format(&mut self, format: PcmFormat);

    /// Reconfigure the gain factor. Affects subsequently fed buffers only.
    fn set_factor(&mut self, factor: f64);
}
