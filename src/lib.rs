//! # Livetail - Incremental Query Observation Engine
//!
//! Livetail keeps a live, ordered or unordered view of a query result set
//! correct as the underlying data set is mutated by many concurrent
//! writers, including writers in other processes reached through a
//! replicated operation log.
//!
//! ## Core Concepts
//!
//! - **Diffing**: turn "old result" + "new result" into the minimal
//!   add/remove/move/change callback sequence, with positional stability
//!   (unchanged relative order is never reported as a move)
//! - **Oplog tailing**: consume an append-only replication log in commit
//!   order, reconstruct logical write events (expanding transactions),
//!   and apply backpressure when consumption falls behind
//! - **Trigger bus**: route normalized write events to the subscriptions
//!   that care, synchronously and in log order
//! - **Catch-up**: block until every write visible "now" has been
//!   processed, giving read-your-writes to callers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use livetail::{InMemoryOplog, OplogTailer, OplogTailerConfig, TriggerPattern};
//!
//! let log = InMemoryOplog::replica_set("rs0");
//! let tailer = OplogTailer::start(Arc::new(log.clone()), "app", OplogTailerConfig::default())?;
//!
//! let subscription = tailer.on_entry(TriggerPattern::collection("tasks"), |trigger| {
//!     // recompute match state, diff, notify observers...
//! })?;
//!
//! // after a write: block until the tailer has seen it
//! tailer.wait_until_caught_up()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod diff;
pub mod document;
pub mod error;
pub mod oplog;
pub mod query;

// Re-export primary types at crate root for convenience
pub use diff::{
    diff_ordered, diff_unordered, make_changed_fields, OrderedCache, OrderedChangeObserver,
    UnorderedCache, UnorderedChangeObserver,
};
pub use document::{apply_changes, DocId, Document, FieldDelta, Fields};
pub use error::{
    ConfigError, LivetailError, LivetailResult, ProtocolError, SequencerError, SourceError,
};
pub use oplog::{
    CommandOp, Crossbar, InMemoryOplog, ListenHandle, ListenerId, LogCursor, LogPosition,
    LogSource, NamespaceFilter, OplogEntry, OplogOp, OplogTailer, OplogTailerConfig, OplogTrigger,
    SkipHandle, TriggerPattern, TxOperation,
};
pub use query::{MatchOutcome, Matcher, Mutator};
