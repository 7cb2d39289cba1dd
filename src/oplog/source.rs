//! Abstract log source contract.
//!
//! The replication log lives outside this process. These traits define
//! the narrow surface the sequencer needs from it: a replica-membership
//! check, a point-in-time "last entry" lookup, and a live-blocking
//! tailing cursor. Adapters translate raw log records into
//! [`OplogEntry`](crate::oplog::entry::OplogEntry) values, keeping only
//! the insert/update/delete/command operation kinds the sequencer
//! consumes.

use std::time::Duration;

use crate::error::SourceError;
use crate::oplog::entry::{LogPosition, OplogEntry};
use crate::oplog::filter::NamespaceFilter;

/// A live tailing cursor over the log.
pub trait LogCursor: Send {
    /// Blocks up to `timeout` for the next entry.
    ///
    /// `Ok(None)` means the wait timed out with no new entry; the cursor
    /// remains usable. The reader accounts consecutive idle waits and
    /// restarts the tailing query when they exceed its idle threshold.
    fn next(&mut self, timeout: Duration) -> Result<Option<OplogEntry>, SourceError>;
}

/// A replication log that can be tailed.
pub trait LogSource: Send + Sync {
    /// The replica-set name of the log's deployment, or `None` when the
    /// source is standalone/unreplicated.
    ///
    /// Tailing an unreplicated source silently returns nothing useful, so
    /// the sequencer refuses to start without a name here.
    fn replica_set_name(&self) -> Result<Option<String>, SourceError>;

    /// The position of the newest entry, by descending-position lookup,
    /// restricted to `filter` when given. A point-in-time snapshot, not a
    /// tailing read. `Ok(None)` means the log is empty.
    fn last_position(
        &self,
        filter: Option<&NamespaceFilter>,
    ) -> Result<Option<LogPosition>, SourceError>;

    /// Opens a tailing cursor over entries with position greater than
    /// `after` (or the whole log when `None`), restricted to `filter`.
    fn tail(
        &self,
        after: Option<LogPosition>,
        filter: &NamespaceFilter,
    ) -> Result<Box<dyn LogCursor>, SourceError>;
}
