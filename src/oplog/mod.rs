//! Replication-log tailing and trigger fan-out.
//!
//! Writers commit to the replication log; the tailer reads entries in
//! commit order, normalizes them (expanding transactions), and fires
//! trigger notifications that live-query subscriptions consume. A
//! catch-up primitive gives callers read-your-writes: block until
//! everything visible in the log "now" has been fanned out.

/// Trigger bus.
pub mod crossbar;
/// Log entry model.
pub mod entry;
/// Namespace filtering.
pub mod filter;
/// In-memory log source.
pub mod memory;
/// Entry normalization and transaction expansion.
pub(crate) mod normalize;
/// Abstract log source contract.
pub mod source;
/// The tailing sequencer.
pub mod tailer;
/// Trigger descriptors and patterns.
pub mod triggers;

pub use crossbar::{Crossbar, ListenHandle};
pub use entry::{CommandOp, LogPosition, OplogEntry, OplogOp, TxOperation};
pub use filter::NamespaceFilter;
pub use memory::InMemoryOplog;
pub use source::{LogCursor, LogSource};
pub use tailer::{OplogTailer, OplogTailerConfig, SkipHandle};
pub use triggers::{ListenerId, OplogTrigger, TriggerPattern};
