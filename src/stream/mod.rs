//! `stream/mod.rs` — the transform pipeline state machine.
//!
//! Single-threaded core: accepts chunks from upstream, drives the engine one
//! buffer at a time, pushes processed output downstream in input order, and
//! acknowledges each upstream write exactly once, after its push. All methods
//! are called from the driver's single logical thread; engine completions
//! re-enter here as messages (see `driver.rs`).

pub mod driver;
pub mod queue;

pub use driver::{MultiplyHandle, SourceId, UpstreamSource};

use flume::Sender;

use crate::config::{MultiplyOptions, RefeedPolicy};
use crate::engine::{Completion, SampleEngine};
use crate::error::{ProtocolError, StreamError};
use crate::format::{FormatState, PartialFormat, PcmFormat};
use queue::{ChunkQueue, FeedState, QueueEntry};

/// One-shot acknowledgment for an accepted write. Invoked with `Ok(())` once
/// the processed chunk has been pushed downstream, or with
/// [`StreamError::Cancelled`] if the stream is torn down first.
pub type WriteAck = Box<dyn FnOnce(Result<(), StreamError>) + Send + 'static>;

/// Events pushed to the downstream consumer, in causal order.
#[derive(Debug)]
pub enum StreamEvent {
    /// A processed chunk. Output order equals input order.
    Data(Vec<u8>),
    /// The merged format snapshot, re-announced whenever any field changes.
    Format(PcmFormat),
}

/// The pipeline core. [`Multiply::spawn`] wraps it in a driver thread; tests
/// drive it directly with a mock engine.
pub struct Multiply {
    format: FormatState,
    queue: ChunkQueue,
    engine: Box<dyn SampleEngine>,
    out_tx: Sender<StreamEvent>,
    refeed: RefeedPolicy,
    refeed_pending: bool,
    next_seq: u64,
}

impl Multiply {
    pub(crate) fn new(
        engine: Box<dyn SampleEngine>,
        out_tx: Sender<StreamEvent>,
        options: &MultiplyOptions,
    ) -> Result<Self, ProtocolError> {
        let mut pipeline = Self {
            format: FormatState::new(),
            queue: ChunkQueue::new(),
            engine,
            out_tx,
            refeed: options.refeed,
            refeed_pending: false,
            next_seq: 0,
        };
        if let Some(initial) = &options.initial_format {
            pipeline.merge_format(initial)?;
        }
        Ok(pipeline)
    }

    /// Accept one chunk from upstream. The chunk is fed to the engine
    /// immediately when idle; otherwise it queues behind the in-flight buffer
    /// and `ack` stays pending — that deferral is the backpressure point.
    pub fn write(&mut self, chunk: Vec<u8>, ack: WriteAck) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_back(QueueEntry {
            seq,
            payload: Some(chunk),
            ack,
        });
        if self.queue.state() == FeedState::Idle {
            self.feed_head();
        }
    }

    /// Consume one engine completion: dequeue the head, push its processed
    /// payload downstream, fire its ack, and feed the next chunk if any.
    ///
    /// A completion with no queued head, or tagged with the wrong sequence
    /// number, breaks the FIFO contract and is fatal to the stream.
    pub fn handle_completion(&mut self, done: Completion) -> Result<(), ProtocolError> {
        let entry = match self.queue.pop_front() {
            Some(entry) => entry,
            None => return Err(ProtocolError::UnexpectedCompletion),
        };
        if entry.seq != done.seq {
            (entry.ack)(Err(StreamError::Cancelled));
            return Err(ProtocolError::CompletionOutOfOrder {
                expected: entry.seq,
                got: done.seq,
            });
        }

        if self.out_tx.send(StreamEvent::Data(done.payload)).is_err() {
            (entry.ack)(Err(StreamError::Cancelled));
            return Err(ProtocolError::DownstreamClosed);
        }
        (entry.ack)(Ok(()));

        if self.queue.is_empty() {
            self.queue.set_idle();
        } else {
            match self.refeed {
                RefeedPolicy::Immediate => self.feed_head(),
                RefeedPolicy::Deferred => self.refeed_pending = true,
            }
        }
        Ok(())
    }

    /// Run a deferred re-feed, if one is pending. The driver calls this after
    /// each message, so the re-feed happens once completion handling has
    /// unwound rather than inside it.
    pub fn tick(&mut self) {
        if self.refeed_pending {
            self.refeed_pending = false;
            debug_assert!(!self.queue.is_empty());
            self.feed_head();
        }
    }

    /// Merge a partial format update. On change, reconfigures the engine and
    /// announces the full merged snapshot downstream. Returns whether a
    /// change occurred.
    pub fn merge_format(&mut self, partial: &PartialFormat) -> Result<bool, ProtocolError> {
        if !self.format.merge(partial) {
            return Ok(false);
        }
        let snapshot = self.format.snapshot();
        self.engine.set_format(snapshot);
        self.out_tx
            .send(StreamEvent::Format(snapshot))
            .map_err(|_| ProtocolError::DownstreamClosed)?;
        Ok(true)
    }

    pub fn set_factor(&mut self, factor: f64) {
        self.engine.set_factor(factor);
    }

    pub fn current_format(&self) -> PcmFormat {
        self.format.snapshot()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.state() == FeedState::Idle
    }

    /// Teardown: fail every pending acknowledgment with a cancellation error.
    pub fn drain_cancelled(&mut self) {
        self.refeed_pending = false;
        while let Some(entry) = self.queue.pop_front() {
            (entry.ack)(Err(StreamError::Cancelled));
        }
        self.queue.set_idle();
    }

    fn feed_head(&mut self) {
        let head = self
            .queue
            .head_mut()
            .expect("feed_head called on empty queue");
        let payload = head
            .payload
            .take()
            .expect("head chunk already fed to the engine");
        let seq = head.seq;
        self.queue.set_feeding();
        self.engine.feed(seq, payload);
    }
}
