//! # Time-ordered task identifiers.
//!
//! [`IdGenerator`] produces Snowflake-style ids:
//!
//! ```text
//!  63        22 21      12 11         0
//! ┌───────────┬──────────┬────────────┐
//! │ ms since  │ node id  │ sequence   │
//! │ 2024-01-01│ (10 bit) │ (12 bit)   │
//! └───────────┴──────────┴────────────┘
//! ```
//!
//! ## Rules
//! - Ids from one generator are strictly increasing, also under concurrent callers.
//! - More than 4096 ids in one millisecond spin until the next millisecond.
//! - A clock that steps backwards is ignored (the last seen millisecond is reused).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// 2024-01-01T00:00:00Z in Unix milliseconds.
const EPOCH_MS: u64 = 1_704_067_200_000;
const NODE_BITS: u32 = 10;
const SEQ_BITS: u32 = 12;
const MAX_NODE: u16 = (1 << NODE_BITS) - 1;
const MAX_SEQ: u64 = (1 << SEQ_BITS) - 1;

/// Correlation key between a submission and its asynchronous result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Wraps a raw id.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw 64-bit value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Milliseconds since the generator epoch encoded in the id.
    pub const fn millis_since_epoch(self) -> u64 {
        self.0 >> (NODE_BITS + SEQ_BITS)
    }
}

impl fmt::Display for TaskId {
    /// Formats the id in base36 (lowercase).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut n = self.0;
        let mut buf = [0u8; 13];
        let mut i = buf.len();
        loop {
            i -= 1;
            buf[i] = DIGITS[(n % 36) as usize];
            n /= 36;
            if n == 0 {
                break;
            }
        }
        // Only ASCII digits were written.
        f.write_str(std::str::from_utf8(&buf[i..]).map_err(|_| fmt::Error)?)
    }
}

/// Lock-free Snowflake generator.
///
/// State packs `last_ms << 12 | seq` into a single atomic.
#[derive(Debug)]
pub struct IdGenerator {
    node: u64,
    state: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator for `node` (masked to 10 bits).
    pub fn new(node: u16) -> Self {
        Self {
            node: u64::from(node & MAX_NODE),
            state: AtomicU64::new(0),
        }
    }

    /// Allocates the next id.
    pub fn next_id(&self) -> TaskId {
        loop {
            let now = now_ms();
            let cur = self.state.load(Ordering::Acquire);
            let last = cur >> SEQ_BITS;
            let seq = cur & MAX_SEQ;

            let (ms, next_seq) = if now > last {
                (now, 0)
            } else if seq < MAX_SEQ {
                (last, seq + 1)
            } else {
                // Sequence exhausted for this millisecond.
                std::hint::spin_loop();
                continue;
            };

            let next = (ms << SEQ_BITS) | next_seq;
            if self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return TaskId((ms << (NODE_BITS + SEQ_BITS)) | (self.node << SEQ_BITS) | next_seq);
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(EPOCH_MS)
        .saturating_sub(EPOCH_MS)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn base36_formatting() {
        assert_eq!(TaskId::from_raw(0).to_string(), "0");
        assert_eq!(TaskId::from_raw(35).to_string(), "z");
        assert_eq!(TaskId::from_raw(36).to_string(), "10");
        assert_eq!(TaskId::from_raw(u64::MAX).to_string(), "3w5e11264sgsf");
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let generator = IdGenerator::new(7);
        let mut prev = generator.next_id();
        for _ in 0..10_000 {
            let id = generator.next_id();
            assert!(id > prev);
            prev = id;
        }
        assert_eq!((prev.as_u64() >> SEQ_BITS) & u64::from(MAX_NODE), 7);
    }

    #[test]
    fn concurrent_ids_are_unique() {
        let generator = Arc::new(IdGenerator::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let g = Arc::clone(&generator);
                std::thread::spawn(move || (0..2_000).map(|_| g.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 8_000);
    }

    #[test]
    fn node_is_masked() {
        let generator = IdGenerator::new(u16::MAX);
        let id = generator.next_id();
        assert_eq!((id.as_u64() >> SEQ_BITS) & u64::from(MAX_NODE), u64::from(MAX_NODE));
    }
}
