//! Trigger descriptors for the crossbar.
//!
//! A fired trigger is the normalized form of one log entry; a pattern is
//! its all-optional mirror used to subscribe. Both are plain structs with
//! explicit optional fields so matching is exhaustive and statically
//! checkable.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::DocId;
use crate::oplog::entry::OplogEntry;

/// Unique identifier for a crossbar listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Create a new random listener id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// A normalized write notification fired on the crossbar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OplogTrigger {
    /// Collection the write targets, when it targets one.
    pub collection: Option<String>,
    /// Subject document id for insert/update/delete writes.
    pub id: Option<DocId>,
    /// The write dropped the whole collection.
    pub drop_collection: bool,
    /// The write dropped the whole database.
    pub drop_database: bool,
    /// The normalized entry behind the notification. For transaction
    /// sub-operations the position is the synthetic one assigned during
    /// expansion.
    pub entry: OplogEntry,
}

/// A subscription pattern over [`OplogTrigger`]s.
///
/// `None` fields are wildcards; a populated field must equal the fired
/// trigger's value. A whole-collection subscription sets only
/// `collection`; a single-document subscription sets `collection` and
/// `id`; drop subscriptions pin the corresponding flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPattern {
    #[allow(missing_docs)]
    pub collection: Option<String>,
    #[allow(missing_docs)]
    pub id: Option<DocId>,
    #[allow(missing_docs)]
    pub drop_collection: Option<bool>,
    #[allow(missing_docs)]
    pub drop_database: Option<bool>,
}

impl TriggerPattern {
    /// Every write touching `collection` (including its drops).
    #[must_use]
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: Some(name.into()),
            ..Self::default()
        }
    }

    /// Writes touching one document of `collection`.
    #[must_use]
    pub fn document(collection: impl Into<String>, id: impl Into<DocId>) -> Self {
        Self {
            collection: Some(collection.into()),
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Drops of `collection` only.
    #[must_use]
    pub fn collection_drops(collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            drop_collection: Some(true),
            ..Self::default()
        }
    }

    /// Database drops only.
    #[must_use]
    pub fn database_drops() -> Self {
        Self {
            drop_database: Some(true),
            ..Self::default()
        }
    }

    /// Whether a fired trigger satisfies this pattern.
    #[must_use]
    pub fn matches(&self, trigger: &OplogTrigger) -> bool {
        if let Some(collection) = &self.collection {
            if trigger.collection.as_ref() != Some(collection) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if trigger.id.as_ref() != Some(id) {
                return false;
            }
        }
        if let Some(drop_collection) = self.drop_collection {
            if trigger.drop_collection != drop_collection {
                return false;
            }
        }
        if let Some(drop_database) = self.drop_database {
            if trigger.drop_database != drop_database {
                return false;
            }
        }
        true
    }
}
