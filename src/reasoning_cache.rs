//! Reasoning cache
//!
//! Some chat-completions backends reject an assistant turn that carries tool
//! calls without the matching `reasoning_content`. Hosts often drop reasoning
//! from history, so the adapter remembers it by tool-call id.
//!
//! The cache is bounded: once `capacity` ids are stored, the least recently
//! used entry is evicted.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use lru::LruCache;

pub const DEFAULT_REASONING_CACHE_CAPACITY: usize = 512;

/// Process-lifetime store of reasoning text keyed by tool-call id.
#[derive(Debug)]
pub struct ReasoningCache {
    entries: Mutex<LruCache<String, String>>,
}

impl ReasoningCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn insert(&self, tool_call_id: impl Into<String>, reasoning: impl Into<String>) {
        let reasoning = reasoning.into();
        if reasoning.is_empty() {
            return;
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(tool_call_id.into(), reasoning);
    }

    pub fn get(&self, tool_call_id: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tool_call_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReasoningCache {
    fn default() -> Self {
        Self::new(DEFAULT_REASONING_CACHE_CAPACITY)
    }
}
