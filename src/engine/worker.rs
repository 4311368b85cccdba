//! `engine/worker.rs` — the built-in scaling engine.
//!
//! Runs the multiply off the pipeline thread on a dedicated worker, fed over
//! an unbounded flume channel. Feeds, format changes, and factor changes all
//! travel on the same FIFO channel, which is what guarantees that a
//! reconfiguration only affects buffers fed after it.

use flume::{Receiver, Sender};

use super::scale::{SampleLayout, scale_in_place};
use super::{Completion, CompletionSink, SampleEngine};
use crate::error::ConfigError;
use crate::format::PcmFormat;

enum WorkerCommand {
    Feed { seq: u64, payload: Vec<u8> },
    SetFormat(PcmFormat),
    SetFactor(f64),
}

/// Built-in [`SampleEngine`] backed by a worker thread.
///
/// The worker exits when the engine is dropped (its command sender
/// disconnects), releasing the thread exactly once.
pub struct WorkerEngine {
    cmd_tx: Sender<WorkerCommand>,
}

impl WorkerEngine {
    /// Validate `factor` and spawn the worker.
    ///
    /// A non-finite factor is rejected before the thread is spawned, so a
    /// failed construction allocates no engine resource.
    pub fn spawn<S: CompletionSink>(factor: f64, sink: S) -> Result<Self, ConfigError> {
        if !factor.is_finite() {
            return Err(ConfigError::InvalidFactor(factor));
        }

        let (cmd_tx, cmd_rx) = flume::unbounded();
        std::thread::Builder::new()
            .name("multiply-pcm-engine".into())
            .spawn(move || run_worker(cmd_rx, sink, factor))
            .map_err(|err| ConfigError::Thread(err.to_string()))?;

        Ok(Self { cmd_tx })
    }
}

impl SampleEngine for WorkerEngine {
    fn feed(&mut self, seq: u64, payload: Vec<u8>) {
        // A send error means the worker is gone; the pipeline will notice the
        // missing completion when its own channels disconnect.
        let _ = self.cmd_tx.send(WorkerCommand::Feed { seq, payload });
    }

    fn set_format(&mut self, format: PcmFormat) {
        let _ = self.cmd_tx.send(WorkerCommand::SetFormat(format));
    }

    fn set_factor(&mut self, factor: f64) {
        let _ = self.cmd_tx.send(WorkerCommand::SetFactor(factor));
    }
}

fn run_worker<S: CompletionSink>(cmd_rx: Receiver<WorkerCommand>, sink: S, initial: f64) {
    let mut factor = initial;
    let mut layout: Option<SampleLayout> = None;
    let mut warned_no_format = false;

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            WorkerCommand::Feed { seq, mut payload } => {
                match layout {
                    Some(layout) if factor != 1.0 && !payload.is_empty() => {
                        scale_in_place(&mut payload, layout, factor);
                    }
                    Some(_) => {} // unity gain or empty buffer, nothing to do
                    None => {
                        if !warned_no_format {
                            tracing::warn!("no format configured, passing samples through");
                            warned_no_format = true;
                        }
                    }
                }
                if !sink.complete(Completion { seq, payload }) {
                    return; // pipeline gone
                }
            }
            WorkerCommand::SetFormat(format) => {
                layout = match (format.bit_depth, format.signed) {
                    (Some(bit_depth), Some(signed)) => Some(SampleLayout { bit_depth, signed }),
                    _ => None,
                };
            }
            WorkerCommand::SetFactor(new_factor) => {
                factor = new_factor;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format_16_signed() -> PcmFormat {
        PcmFormat {
            channels: Some(2),
            bit_depth: Some(16),
            sample_rate: Some(44100),
            signed: Some(true),
        }
    }

    #[test]
    fn rejects_non_finite_factor() {
        let (done_tx, _done_rx) = flume::unbounded();
        assert!(matches!(
            WorkerEngine::spawn(f64::NAN, done_tx.clone()),
            Err(ConfigError::InvalidFactor(_))
        ));
        assert!(WorkerEngine::spawn(f64::INFINITY, done_tx).is_err());
    }

    #[test]
    fn feeds_complete_in_order_with_scaled_payload() {
        let (done_tx, done_rx) = flume::unbounded();
        let mut engine = WorkerEngine::spawn(2.0, done_tx).unwrap();
        engine.set_format(format_16_signed());

        engine.feed(0, 100i16.to_le_bytes().to_vec());
        engine.feed(1, 200i16.to_le_bytes().to_vec());

        let first = done_rx.recv().unwrap();
        let second = done_rx.recv().unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(i16::from_le_bytes([first.payload[0], first.payload[1]]), 200);
        assert_eq!(second.seq, 1);
        assert_eq!(
            i16::from_le_bytes([second.payload[0], second.payload[1]]),
            400
        );
    }

    #[test]
    fn factor_change_applies_to_subsequent_feeds_only() {
        let (done_tx, done_rx) = flume::unbounded();
        let mut engine = WorkerEngine::spawn(2.0, done_tx).unwrap();
        engine.set_format(format_16_signed());

        engine.feed(0, 10i16.to_le_bytes().to_vec());
        engine.set_factor(3.0);
        engine.feed(1, 10i16.to_le_bytes().to_vec());

        let first = done_rx.recv().unwrap();
        let second = done_rx.recv().unwrap();
        assert_eq!(i16::from_le_bytes([first.payload[0], first.payload[1]]), 20);
        assert_eq!(i16::from_le_bytes([second.payload[0], second.payload[1]]), 30);
    }

    #[test]
    fn unity_factor_echoes_buffer() {
        let (done_tx, done_rx) = flume::unbounded();
        let mut engine = WorkerEngine::spawn(1.0, done_tx).unwrap();
        engine.set_format(format_16_signed());

        let payload = vec![1u8, 2, 3, 4];
        engine.feed(0, payload.clone());
        assert_eq!(done_rx.recv().unwrap().payload, payload);
    }

    #[test]
    fn empty_buffer_still_completes() {
        let (done_tx, done_rx) = flume::unbounded();
        let mut engine = WorkerEngine::spawn(0.5, done_tx).unwrap();
        engine.set_format(format_16_signed());

        engine.feed(7, Vec::new());
        let done = done_rx.recv().unwrap();
        assert_eq!(done.seq, 7);
        assert!(done.payload.is_empty());
    }

    #[test]
    fn no_format_passes_through() {
        let (done_tx, done_rx) = flume::unbounded();
        let mut engine = WorkerEngine::spawn(2.0, done_tx).unwrap();

        let payload = 100i16.to_le_bytes().to_vec();
        engine.feed(0, payload.clone());
        assert_eq!(done_rx.recv().unwrap().payload, payload);
    }
}
