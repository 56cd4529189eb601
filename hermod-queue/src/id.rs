//! Identifier generation for queued items
//!
//! IDs are ULIDs: 26 characters, sortable by creation time, with 80 bits of
//! randomness from the thread-local CSPRNG. The generator additionally
//! remembers the most recently issued IDs and never hands one out twice
//! within that window.

use std::collections::{HashSet, VecDeque};

use hermod_common::ItemId;
use parking_lot::Mutex;
use ulid::Ulid;

/// How many issued IDs are remembered for the uniqueness check
pub const DEFAULT_RECENT_CAPACITY: usize = 4096;

#[derive(Debug, Default)]
struct Recent {
    order: VecDeque<ItemId>,
    seen: HashSet<ItemId>,
}

/// Thread-safe source of fresh [`ItemId`]s
#[derive(Debug)]
pub struct IdGenerator {
    recent: Mutex<Recent>,
    capacity: usize,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RECENT_CAPACITY)
    }
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            recent: Mutex::new(Recent::default()),
            capacity: capacity.max(1),
        }
    }

    /// A fresh identifier, distinct from every recently issued one
    pub fn next_id(&self) -> ItemId {
        let mut recent = self.recent.lock();

        let id = loop {
            let candidate = ItemId::from(Ulid::new());
            if !recent.seen.contains(&candidate) {
                break candidate;
            }
            tracing::warn!(id = %candidate, "Discarding colliding item id");
        };

        if recent.order.len() >= self.capacity
            && let Some(oldest) = recent.order.pop_front()
        {
            recent.seen.remove(&oldest);
        }
        recent.order.push_back(id.clone());
        recent.seen.insert(id.clone());

        id
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_ids_are_distinct() {
        let generator = IdGenerator::new();
        let ids: HashSet<ItemId> = (0..10_000).map(|_| generator.next_id()).collect();

        assert_eq!(ids.len(), 10_000);
        assert!(ids.iter().all(|id| id.as_str().len() >= 6));
    }

    #[test]
    fn test_ids_are_distinct_across_threads() {
        let generator = Arc::new(IdGenerator::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || (0..500).map(|_| generator.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let ids: HashSet<ItemId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(ids.len(), 8 * 500);
    }

    #[test]
    fn test_recent_window_is_bounded() {
        let generator = IdGenerator::with_capacity(16);
        for _ in 0..100 {
            generator.next_id();
        }

        let recent = generator.recent.lock();
        assert_eq!(recent.order.len(), 16);
        assert_eq!(recent.seen.len(), 16);
    }

    #[test]
    fn test_ids_are_filename_safe() {
        let id = IdGenerator::new().next_id();
        assert_eq!(ItemId::from_filename(&id.filename()), Some(id));
    }
}
