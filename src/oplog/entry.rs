//! Replication log entry model.
//!
//! These types are the typed rendition of the fields the sequencer
//! consumes from a raw log record: a compound-timestamp position, a target
//! namespace, and an operation payload. They are serializable so source
//! adapters can decode straight into them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::{DocId, Document};

/// A position in the replication log: a compound timestamp packing
/// wall-clock seconds (high 32 bits) and a per-second sequence counter
/// (low 32 bits).
///
/// Positions are totally ordered and strictly increasing in the order
/// entries are appended by a single log. `next()` steps the packed value
/// by one, which is how synthetic positions for transaction
/// sub-operations stay ordered between their parent and the next real
/// entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct LogPosition(u64);

impl LogPosition {
    /// The smallest position; sorts before every appended entry.
    pub const ZERO: Self = Self(0);

    /// Packs wall-clock seconds and a per-second ordinal.
    #[must_use]
    pub const fn from_parts(seconds: u32, ordinal: u32) -> Self {
        Self(((seconds as u64) << 32) | ordinal as u64)
    }

    /// The wall-clock seconds component.
    #[must_use]
    pub const fn seconds(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The per-second ordinal component.
    #[must_use]
    pub const fn ordinal(self) -> u32 {
        self.0 as u32
    }

    /// The position immediately after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The packed representation.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.seconds(), self.ordinal())
    }
}

/// A write operation recorded in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OplogOp {
    /// A document was inserted.
    Insert {
        /// The inserted document.
        document: Document,
    },

    /// A document was updated in place.
    Update {
        /// Identity of the updated document.
        id: DocId,
        /// The update-operator expression that was applied.
        modifier: serde_json::Value,
    },

    /// A document was deleted.
    Delete {
        /// Identity of the deleted document.
        id: DocId,
    },

    /// A database command.
    Command(CommandOp),
}

impl OplogOp {
    /// The id of the document this operation is about, when it has one.
    #[must_use]
    pub const fn subject_id(&self) -> Option<&DocId> {
        match self {
            Self::Insert { document } => Some(&document.id),
            Self::Update { id, .. } | Self::Delete { id } => Some(id),
            Self::Command(_) => None,
        }
    }
}

/// Command payloads the sequencer understands.
///
/// Anything else a source adapter encounters lands in `Other` and halts
/// the sequencer when drained: guessing at an unrecognized mutation would
/// silently desynchronize every dependent live query.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandOp {
    /// An entire collection was dropped.
    DropCollection {
        collection: String,
    },

    /// The whole database was dropped.
    DropDatabase,

    /// A committed transaction; carries its constituent operations.
    ApplyOps {
        operations: Vec<TxOperation>,
    },

    /// A collection was implicitly created inside a transaction. Carries
    /// no observable write; normalization ignores it.
    CreateCollection {
        collection: String,
    },

    /// An unrecognized command, preserved verbatim for the error report.
    Other(serde_json::Value),
}

/// One operation inside a transaction batch.
///
/// Sub-operations may carry their own log position; those that do not are
/// assigned synthetic positions (parent, parent+1, …) during expansion so
/// they stay totally ordered relative to every other entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOperation {
    /// Position recorded for the sub-operation, when the log supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<LogPosition>,
    /// Target namespace (`database.collection`).
    pub namespace: String,
    /// The operation itself.
    pub op: OplogOp,
}

/// An entry read from the replication log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OplogEntry {
    /// Totally ordered log position.
    pub position: LogPosition,
    /// Target namespace (`database.collection`, or `admin.$cmd` for
    /// transaction commits).
    pub namespace: String,
    /// The recorded operation.
    pub op: OplogOp,
}
