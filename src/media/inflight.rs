use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Keys of acquisitions currently running. A second request for the same
/// (chat, URL) pair is dropped while the first holds its guard.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(chat: &str, url: &str) -> String {
        format!("{}_{}", chat, url)
    }

    fn keys(&self) -> MutexGuard<'_, HashSet<String>> {
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks the pair as in flight, or returns `None` if it already is.
    pub fn try_begin(&self, chat: &str, url: &str) -> Option<InFlightGuard> {
        let key = Self::key(chat, url);
        if !self.keys().insert(key.clone()) {
            debug!("Already processing {}", key);
            return None;
        }
        Some(InFlightGuard {
            set: self.clone(),
            key,
        })
    }
}

/// Clears its in-flight marker when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    set: InFlightSet,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.keys().remove(&self.key);
    }
}
