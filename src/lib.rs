//! Streaming PCM gain transform.
//!
//! Chunks written by an upstream producer are scaled by a numeric factor on a
//! worker engine and pushed downstream in input order, one buffer in flight at
//! a time; each write is acknowledged only after its processed chunk has been
//! pushed, which is the stream's backpressure signal. PCM format metadata
//! (channels, bit depth, sample rate, signedness) merges from attached
//! upstream sources and re-announces downstream whenever it changes.
//!
//! ```no_run
//! use multiply_pcm::{Multiply, MultiplyOptions, PartialFormat, StreamEvent};
//!
//! let options = MultiplyOptions::new(0.5).with_initial_format(PartialFormat {
//!     channels: Some(2),
//!     bit_depth: Some(16),
//!     sample_rate: Some(44100),
//!     ..Default::default()
//! });
//! let (handle, events) = Multiply::spawn(options)?;
//!
//! handle.write(vec![0u8; 3840], Box::new(|result| assert!(result.is_ok())))?;
//! while let Ok(event) = events.recv() {
//!     match event {
//!         StreamEvent::Data(chunk) => { /* hand to the next consumer */ }
//!         StreamEvent::Format(format) => println!("format is now {:?}", format),
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod stream;

pub use config::{MultiplyOptions, RefeedPolicy};
pub use engine::{Completion, CompletionSink, SampleEngine, WorkerEngine};
pub use error::{ConfigError, ProtocolError, StreamError};
pub use format::{FormatState, PartialFormat, PcmFormat};
pub use stream::{Multiply, MultiplyHandle, SourceId, StreamEvent, UpstreamSource, WriteAck};
