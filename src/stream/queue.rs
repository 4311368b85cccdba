//! Ordered holding area for chunks accepted from upstream but not yet
//! acknowledged, plus the explicit feed-state tag.
//!
//! Queue-emptiness alone is not the state signal: `FeedState` records whether
//! a buffer is outstanding with the engine, so a deferred re-feed window
//! (completion handled, next feed not yet issued) cannot be mistaken for idle.

use std::collections::VecDeque;

use super::WriteAck;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Queue empty, no feed outstanding.
    Idle,
    /// Exactly one feed outstanding (or a deferred re-feed pending).
    Feeding,
}

/// One accepted chunk paired with its acknowledgment.
///
/// `payload` is `Some` while the chunk waits behind the in-flight head and is
/// taken (moved into the engine) when the chunk is fed.
pub struct QueueEntry {
    pub seq: u64,
    pub payload: Option<Vec<u8>>,
    pub ack: WriteAck,
}

pub struct ChunkQueue {
    entries: VecDeque<QueueEntry>,
    state: FeedState,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            state: FeedState::Idle,
        }
    }

    pub fn push_back(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub fn head_mut(&mut self) -> Option<&mut QueueEntry> {
        self.entries.front_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn set_feeding(&mut self) {
        self.state = FeedState::Feeding;
    }

    pub fn set_idle(&mut self) {
        self.state = FeedState::Idle;
    }
}

impl Default for ChunkQueue {
    fn default() -> Self {
        Self::new()
    }
}
