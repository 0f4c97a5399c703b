//! Predictable link identifiers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use securelink_core::{IdGenerator, LinkId};

/// Counts up from 1; the counter fills the first 8 bytes, big-endian.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the `n`-th call (1-based) returns.
    pub fn nth(n: u64) -> LinkId {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&n.to_be_bytes());
        LinkId::from_bytes(bytes)
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> LinkId {
        Self::nth(self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Hands out a fixed script of ids, then falls back to [`SequentialIds`].
///
/// Used to force collisions.
#[derive(Debug, Default)]
pub struct ScriptedIds {
    script: Mutex<VecDeque<LinkId>>,
    fallback: SequentialIds,
}

impl ScriptedIds {
    pub fn new(script: impl IntoIterator<Item = LinkId>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: SequentialIds::new(),
        }
    }
}

impl IdGenerator for ScriptedIds {
    fn next_id(&self) -> LinkId {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        scripted.unwrap_or_else(|| self.fallback.next_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id(), SequentialIds::nth(1));
        assert_eq!(ids.next_id(), SequentialIds::nth(2));
        assert_eq!(SequentialIds::nth(2).time_component(), 2);
    }

    #[test]
    fn test_scripted_then_sequential() {
        let fixed = LinkId::from_bytes([0xee; 16]);
        let ids = ScriptedIds::new([fixed, fixed]);

        assert_eq!(ids.next_id(), fixed);
        assert_eq!(ids.next_id(), fixed);
        assert_eq!(ids.next_id(), SequentialIds::nth(1));
    }
}
