//! Bounded reorder (jitter) buffer for inbound compressed packets
//!
//! Restores strict sequence order from packets that may arrive out of order.
//! Payloads are released for decoding only in increasing sequence order,
//! starting at the stream cursor `expecting`. Packets ahead of the cursor
//! wait in a window of at most `capacity` entries; when the window
//! overflows the lowest sequences are evicted and never decoded.
//!
//! If the packet at `expecting` never arrives the cursor does not move and
//! the stream stalls until [`ReorderBuffer::reset`].
//!
//! The cursor never wraps. Once `u32::MAX` has been released it sits one
//! past the sequence space and every further packet is stale until reset.

use bytes::Bytes;
use std::collections::BTreeMap;

/// Result of a single [`ReorderBuffer::submit`]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// Payloads ready to decode, in strictly increasing sequence order
    pub released: Vec<(u32, Bytes)>,
    /// Sequences dropped to keep the window within capacity
    pub evicted: Vec<u32>,
    /// The packet was behind the cursor (late or duplicate) and was ignored
    pub stale: bool,
}

impl SubmitOutcome {
    pub fn released_sequences(&self) -> Vec<u32> {
        self.released.iter().map(|(seq, _)| *seq).collect()
    }
}

/// Reorder buffer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderStats {
    pub level: usize,
    pub capacity: usize,
    pub received: u64,
    pub released: u64,
    pub stale: u64,
    pub evicted: u64,
}

pub struct ReorderBuffer {
    /// Packets ahead of the cursor, keyed by sequence
    window: BTreeMap<u32, Bytes>,
    capacity: usize,
    /// Next sequence to release; `u32::MAX + 1` once the sequence space is used up
    expecting: u64,
    received: u64,
    released: u64,
    stale: u64,
    evicted: u64,
}

impl ReorderBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: BTreeMap::new(),
            capacity: capacity.max(1),
            expecting: 0,
            received: 0,
            released: 0,
            stale: 0,
            evicted: 0,
        }
    }

    pub fn submit(&mut self, seq: u32, payload: Bytes) -> SubmitOutcome {
        let mut outcome = SubmitOutcome::default();
        self.received += 1;

        if u64::from(seq) < self.expecting {
            self.stale += 1;
            outcome.stale = true;
            return outcome;
        }

        if u64::from(seq) == self.expecting {
            outcome.released.push((seq, payload));
            self.expecting += 1;

            while let Ok(next_seq) = u32::try_from(self.expecting) {
                let Some(next) = self.window.remove(&next_seq) else {
                    break;
                };
                outcome.released.push((next_seq, next));
                self.expecting += 1;
            }

            self.released += outcome.released.len() as u64;
            return outcome;
        }

        self.window.insert(seq, payload);
        while self.window.len() > self.capacity {
            if let Some((evicted, _)) = self.window.pop_first() {
                outcome.evicted.push(evicted);
            }
        }
        if !outcome.evicted.is_empty() {
            self.evicted += outcome.evicted.len() as u64;
            tracing::debug!(
                "Reorder window full, evicted {:?} while waiting for {}",
                outcome.evicted,
                self.expecting
            );
        }

        outcome
    }

    /// Next sequence the buffer will release
    pub fn expecting(&self) -> u64 {
        self.expecting
    }

    /// Sequences currently waiting, ascending
    pub fn buffered(&self) -> Vec<u32> {
        self.window.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear the window and rewind the cursor to 0. Statistics are kept.
    pub fn reset(&mut self) {
        self.window.clear();
        self.expecting = 0;
    }

    pub fn stats(&self) -> ReorderStats {
        ReorderStats {
            level: self.window.len(),
            capacity: self.capacity,
            received: self.received,
            released: self.released,
            stale: self.stale,
            evicted: self.evicted,
        }
    }
}
