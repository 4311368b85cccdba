//! `stream/driver.rs` — the pipeline's single logical thread.
//!
//! Everything that mutates pipeline state enters through one command channel:
//! upstream writes, format updates, factor changes, pipe attach/detach, and
//! the engine's completions (wrapped back in as commands, which is what
//! marshals them off the engine's worker onto this thread, in feed order).
//! The driver processes commands in arrival order and runs deferred re-feeds
//! between commands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use flume::{Receiver, Sender};

use super::{Multiply, StreamEvent, WriteAck};
use crate::config::MultiplyOptions;
use crate::engine::worker::WorkerEngine;
use crate::engine::{Completion, CompletionSink};
use crate::error::{ConfigError, ProtocolError, StreamError};
use crate::format::PartialFormat;

/// Downstream event channel capacity; pushes block (backpressure) when the
/// consumer falls this far behind.
const OUT_CHANNEL_CAPACITY: usize = 64;

/// Identifies one attached upstream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

impl SourceId {
    /// Generate a process-unique id.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// An upstream source as seen by the pipe-chain listener: its last announced
/// format, read synchronously at attach time, plus a channel of future
/// announcements.
pub struct UpstreamSource {
    pub id: SourceId,
    pub current_format: Option<PartialFormat>,
    pub announcements: Receiver<PartialFormat>,
}

enum Command {
    Write { chunk: Vec<u8>, ack: WriteAck },
    UpdateFormat(PartialFormat),
    SourceFormat(SourceId, PartialFormat),
    SetFactor(f64),
    Attach(UpstreamSource),
    Detach(SourceId),
    EngineDone(Completion),
    Shutdown,
}

/// Routes engine completions back into the driver's command channel.
struct DriverSink(Sender<Command>);

impl CompletionSink for DriverSink {
    fn complete(&self, done: Completion) -> bool {
        self.0.send(Command::EngineDone(done)).is_ok()
    }
}

impl Multiply {
    /// Validate `options`, spawn the built-in worker engine and the driver
    /// thread, and return the control handle plus the downstream event
    /// receiver.
    ///
    /// Fails fast on a non-finite multiply factor, before any thread or
    /// channel is created.
    pub fn spawn(
        options: MultiplyOptions,
    ) -> Result<(MultiplyHandle, Receiver<StreamEvent>), ConfigError> {
        options.validate()?;

        let (out_tx, out_rx) = flume::bounded(OUT_CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = flume::unbounded();

        let engine = WorkerEngine::spawn(options.multiply, DriverSink(cmd_tx.clone()))?;
        let pipeline = Multiply::new(Box::new(engine), out_tx, &options)
            .expect("fresh downstream channel cannot be closed");

        let forward_tx = cmd_tx.clone();
        let driver = std::thread::Builder::new()
            .name("multiply-pcm-driver".into())
            .spawn(move || run_driver(pipeline, cmd_rx, forward_tx))
            .map_err(|err| ConfigError::Thread(err.to_string()))?;

        Ok((
            MultiplyHandle {
                cmd_tx,
                driver: Some(driver),
            },
            out_rx,
        ))
    }
}

fn run_driver(mut pipeline: Multiply, cmd_rx: Receiver<Command>, cmd_tx: Sender<Command>) {
    // One stop handle per attached source; dropping it (on detach or driver
    // exit) ends that source's forwarder. Announcements that race past a
    // detach are filtered here by source id.
    let mut attached: HashMap<SourceId, Sender<()>> = HashMap::new();

    while let Ok(cmd) = cmd_rx.recv() {
        let result = match cmd {
            Command::Write { chunk, ack } => {
                pipeline.write(chunk, ack);
                Ok(())
            }
            Command::UpdateFormat(partial) => pipeline.merge_format(&partial).map(|_| ()),
            Command::SourceFormat(id, partial) => {
                if attached.contains_key(&id) {
                    pipeline.merge_format(&partial).map(|_| ())
                } else {
                    Ok(())
                }
            }
            Command::SetFactor(factor) => {
                pipeline.set_factor(factor);
                Ok(())
            }
            Command::Attach(source) => {
                let merged = match &source.current_format {
                    Some(partial) => pipeline.merge_format(partial).map(|_| ()),
                    None => Ok(()),
                };
                let id = source.id;
                let stop = subscribe(source, cmd_tx.clone());
                attached.insert(id, stop);
                merged
            }
            Command::Detach(id) => {
                attached.remove(&id);
                Ok(())
            }
            Command::EngineDone(done) => pipeline.handle_completion(done),
            Command::Shutdown => break,
        };

        match result {
            Ok(()) => {}
            Err(ProtocolError::DownstreamClosed) => {
                tracing::debug!("downstream disconnected, stopping stream");
                break;
            }
            Err(err) => {
                tracing::error!("fatal stream protocol violation: {}", err);
                break;
            }
        }

        // Deferred re-feed runs here, after the completion that scheduled it
        // has fully unwound.
        pipeline.tick();
    }

    // Teardown: cancel everything still queued, then everything still sitting
    // in the command channel. The engine is released when `pipeline` drops.
    pipeline.drain_cancelled();
    while let Ok(cmd) = cmd_rx.try_recv() {
        if let Command::Write { ack, .. } = cmd {
            ack(Err(StreamError::Cancelled));
        }
    }
}

/// Forward a source's future format announcements into the driver. The
/// forwarder exits when the returned stop handle is dropped (detach or driver
/// exit), when the source drops its sender, or when the driver stops.
fn subscribe(source: UpstreamSource, cmd_tx: Sender<Command>) -> Sender<()> {
    let (stop_tx, stop_rx) = flume::bounded::<()>(1);
    let UpstreamSource {
        id, announcements, ..
    } = source;
    let _ = std::thread::Builder::new()
        .name("multiply-pcm-pipe".into())
        .spawn(move || {
            loop {
                let partial = flume::Selector::new()
                    .recv(&stop_rx, |_| None)
                    .recv(&announcements, |res| res.ok())
                    .wait();
                match partial {
                    Some(partial) => {
                        if cmd_tx.send(Command::SourceFormat(id, partial)).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        });
    stop_tx
}

/// Control handle for a spawned [`Multiply`] stream.
///
/// Dropping the handle shuts the stream down; pending writes are failed with
/// [`StreamError::Cancelled`].
pub struct MultiplyHandle {
    cmd_tx: Sender<Command>,
    driver: Option<JoinHandle<()>>,
}

impl MultiplyHandle {
    /// Hand one chunk to the stream. `ack` fires with `Ok(())` once the
    /// processed chunk has been pushed downstream; deferring that call is the
    /// stream's backpressure signal to the caller.
    pub fn write(&self, chunk: Vec<u8>, ack: WriteAck) -> Result<(), StreamError> {
        if let Err(err) = self.cmd_tx.send(Command::Write { chunk, ack }) {
            if let Command::Write { ack, .. } = err.into_inner() {
                ack(Err(StreamError::Closed));
            }
            return Err(StreamError::Closed);
        }
        Ok(())
    }

    /// Merge a partial format update, as if announced by upstream.
    pub fn update_format(&self, partial: PartialFormat) -> Result<(), StreamError> {
        self.cmd_tx
            .send(Command::UpdateFormat(partial))
            .map_err(|_| StreamError::Closed)
    }

    /// Change the gain factor. Affects buffers fed after the change, never a
    /// buffer already in flight. Rejects non-finite factors.
    pub fn set_factor(&self, factor: f64) -> Result<(), StreamError> {
        if !factor.is_finite() {
            return Err(ConfigError::InvalidFactor(factor).into());
        }
        self.cmd_tx
            .send(Command::SetFactor(factor))
            .map_err(|_| StreamError::Closed)
    }

    /// Attach an upstream source: merge its current format now and follow its
    /// announcements until it detaches or drops its sender.
    pub fn attach(&self, source: UpstreamSource) -> Result<(), StreamError> {
        self.cmd_tx
            .send(Command::Attach(source))
            .map_err(|_| StreamError::Closed)
    }

    /// Detach an upstream source; its further announcements are ignored.
    pub fn detach(&self, id: SourceId) -> Result<(), StreamError> {
        self.cmd_tx
            .send(Command::Detach(id))
            .map_err(|_| StreamError::Closed)
    }

    /// Stop the stream, failing all pending writes with
    /// [`StreamError::Cancelled`], and wait for the driver to exit. The
    /// downstream receiver must be drained or dropped for the driver to
    /// unblock if it is mid-push.
    pub fn shutdown(mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }
    }
}

impl Drop for MultiplyHandle {
    fn drop(&mut self) {
        // Best-effort: don't join here, the driver may be blocked on a
        // downstream push the consumer never drains.
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}
