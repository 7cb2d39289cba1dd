//! In-process trigger bus.
//!
//! The crossbar routes fired [`OplogTrigger`]s to registered listeners.
//! Listeners are bucketed by collection name so firing only scans the
//! listeners that could possibly match. Each crossbar instance is owned
//! by the sequencer that fires into it, which keeps independent
//! sequencers (and tests) fully isolated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::oplog::triggers::{ListenerId, OplogTrigger, TriggerPattern};

type TriggerCallback = Arc<dyn Fn(&OplogTrigger) + Send + Sync>;

struct ListenerEntry {
    pattern: TriggerPattern,
    callback: TriggerCallback,
}

#[derive(Default)]
struct Registry {
    /// Listener buckets keyed by the pattern's collection name; patterns
    /// with no collection share the empty-string bucket.
    by_collection: HashMap<String, HashMap<ListenerId, ListenerEntry>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

fn bucket_key(collection: Option<&String>) -> String {
    collection.cloned().unwrap_or_default()
}

/// The trigger bus.
#[derive(Clone, Default)]
pub struct Crossbar {
    registry: Arc<Mutex<Registry>>,
}

impl Crossbar {
    /// An empty crossbar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for triggers matching `pattern`.
    ///
    /// The returned handle deregisters on [`ListenHandle::stop`] or drop.
    pub fn listen(
        &self,
        pattern: TriggerPattern,
        callback: impl Fn(&OplogTrigger) + Send + Sync + 'static,
    ) -> ListenHandle {
        let id = ListenerId::new();
        let key = bucket_key(pattern.collection.as_ref());

        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.by_collection.entry(key.clone()).or_default().insert(
            id,
            ListenerEntry {
                pattern,
                callback: Arc::new(callback),
            },
        );

        ListenHandle {
            registry: Arc::clone(&self.registry),
            bucket: key,
            id,
            stopped: AtomicBool::new(false),
        }
    }

    /// Fires a trigger, synchronously invoking every matching listener.
    ///
    /// Matching listeners are collected first and each is re-checked for
    /// liveness right before its callback runs, so a callback may stop
    /// other listeners mid-fan-out. The registry lock is not held while a
    /// callback runs; callbacks may freely register or stop listeners.
    pub fn fire(&self, trigger: &OplogTrigger) {
        let key = bucket_key(trigger.collection.as_ref());

        let matched: Vec<ListenerId> = {
            let registry = self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match registry.by_collection.get(&key) {
                Some(bucket) => bucket
                    .iter()
                    .filter(|(_, entry)| entry.pattern.matches(trigger))
                    .map(|(id, _)| *id)
                    .collect(),
                None => return,
            }
        };

        for id in matched {
            let callback = {
                let registry = self
                    .registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                registry
                    .by_collection
                    .get(&key)
                    .and_then(|bucket| bucket.get(&id))
                    .map(|entry| Arc::clone(&entry.callback))
            };
            if let Some(callback) = callback {
                callback(trigger);
            }
        }
    }

    /// Number of live listener registrations.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_collection
            .values()
            .map(HashMap::len)
            .sum()
    }
}

impl std::fmt::Debug for Crossbar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crossbar")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Registration handle returned by [`Crossbar::listen`].
///
/// Dropping the handle deregisters the listener.
#[derive(Debug)]
pub struct ListenHandle {
    registry: Arc<Mutex<Registry>>,
    bucket: String,
    id: ListenerId,
    stopped: AtomicBool,
}

impl ListenHandle {
    /// Deregisters the listener. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = registry.by_collection.get_mut(&self.bucket) {
            bucket.remove(&self.id);
            if bucket.is_empty() {
                registry.by_collection.remove(&self.bucket);
            }
        }
    }
}

impl Drop for ListenHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
