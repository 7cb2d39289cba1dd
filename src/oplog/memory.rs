//! In-memory log source.
//!
//! A thread-safe, append-only log implementing [`LogSource`]. Intended
//! for tests and embedded usage, and as a reference implementation of the
//! source contract: appended entries get strictly increasing compound
//! positions stamped from wall-clock seconds, and tailing cursors block
//! on a condvar until new entries arrive.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;

use crate::error::SourceError;
use crate::oplog::entry::{LogPosition, OplogEntry, OplogOp};
use crate::oplog::filter::NamespaceFilter;
use crate::oplog::source::{LogCursor, LogSource};

fn lock_err() -> SourceError {
    SourceError::Connection {
        message: "poisoned log lock".to_string(),
    }
}

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<OplogEntry>,
    last_position: LogPosition,
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<LogState>,
    appended: Condvar,
}

/// An in-process replication log.
#[derive(Debug, Clone)]
pub struct InMemoryOplog {
    shared: Arc<Shared>,
    replica_set: Option<String>,
}

impl InMemoryOplog {
    /// A log belonging to a replica set with the given name.
    #[must_use]
    pub fn replica_set(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            replica_set: Some(name.into()),
        }
    }

    /// A standalone (unreplicated) log. Sequencers refuse to tail it;
    /// useful for exercising the startup failure path.
    #[must_use]
    pub fn standalone() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            replica_set: None,
        }
    }

    /// Appends an operation, stamping the next position.
    ///
    /// Positions take the current wall-clock second and a per-second
    /// ordinal starting at 1, and never regress even if the clock does.
    pub fn append(&self, namespace: impl Into<String>, op: OplogOp) -> LogPosition {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let now_seconds = Utc::now().timestamp().max(0) as u32;
        let candidate = LogPosition::from_parts(now_seconds, 1);
        let position = if candidate > state.last_position {
            candidate
        } else {
            state.last_position.next()
        };
        state.last_position = position;

        state.entries.push(OplogEntry {
            position,
            namespace: namespace.into(),
            op,
        });
        self.shared.appended.notify_all();
        position
    }

    /// Appends a fully specified entry.
    ///
    /// # Panics
    ///
    /// Panics when `entry.position` does not exceed the last appended
    /// position; the log is append-only and totally ordered.
    pub fn append_entry(&self, entry: OplogEntry) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        assert!(
            entry.position > state.last_position,
            "log positions must be strictly increasing: {} after {}",
            entry.position,
            state.last_position
        );
        state.last_position = entry.position;
        state.entries.push(entry);
        self.shared.appended.notify_all();
    }

    /// Closes the log; open cursors start returning errors.
    pub fn close(&self) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.closed = true;
        self.shared.appended.notify_all();
    }

    /// Number of entries appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSource for InMemoryOplog {
    fn replica_set_name(&self) -> Result<Option<String>, SourceError> {
        Ok(self.replica_set.clone())
    }

    fn last_position(
        &self,
        filter: Option<&NamespaceFilter>,
    ) -> Result<Option<LogPosition>, SourceError> {
        let state = self.shared.state.lock().map_err(|_| lock_err())?;
        if state.closed {
            return Err(SourceError::Closed);
        }
        Ok(state
            .entries
            .iter()
            .rev()
            .find(|entry| filter.is_none_or(|f| f.matches(&entry.namespace)))
            .map(|entry| entry.position))
    }

    fn tail(
        &self,
        after: Option<LogPosition>,
        filter: &NamespaceFilter,
    ) -> Result<Box<dyn LogCursor>, SourceError> {
        {
            let state = self.shared.state.lock().map_err(|_| lock_err())?;
            if state.closed {
                return Err(SourceError::Closed);
            }
        }
        Ok(Box::new(MemoryCursor {
            shared: Arc::clone(&self.shared),
            after: after.unwrap_or(LogPosition::ZERO),
            filter: filter.clone(),
        }))
    }
}

struct MemoryCursor {
    shared: Arc<Shared>,
    /// Every returned entry has a position strictly greater than this.
    after: LogPosition,
    filter: NamespaceFilter,
}

impl LogCursor for MemoryCursor {
    fn next(&mut self, timeout: Duration) -> Result<Option<OplogEntry>, SourceError> {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.shared.state.lock().map_err(|_| lock_err())?;

        loop {
            if state.closed {
                return Err(SourceError::Closed);
            }

            // Entries are appended in position order, so the first match
            // past `after` is the next one to deliver.
            let found = state
                .entries
                .iter()
                .find(|entry| entry.position > self.after && self.filter.matches(&entry.namespace))
                .cloned();
            if let Some(entry) = found {
                self.after = entry.position;
                return Ok(Some(entry));
            }

            let now = std::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, wait) = self
                .shared
                .appended
                .wait_timeout(state, deadline - now)
                .map_err(|_| lock_err())?;
            state = guard;
            if wait.timed_out() {
                // Re-check once after a timed-out wait, then report idle.
                continue;
            }
        }
    }
}
