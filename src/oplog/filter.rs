//! Namespace filtering for tailing queries.
//!
//! The sequencer only cares about writes to one database plus the admin
//! command namespace that transaction commits land in. On top of that
//! base scope a caller may configure an allow-list or a deny-list of
//! collections (mutually exclusive).

use std::collections::BTreeSet;

use regex::Regex;

use crate::error::ConfigError;

/// Namespace transaction commits are recorded under.
pub const ADMIN_COMMAND_NAMESPACE: &str = "admin.$cmd";

#[derive(Debug, Clone)]
enum FilterMode {
    All,
    /// Only these namespaces (full `db.collection` form).
    Include(BTreeSet<String>),
    /// Every namespace except these.
    Exclude(BTreeSet<String>),
}

/// Decides which log namespaces a tailing query should return.
#[derive(Debug, Clone)]
pub struct NamespaceFilter {
    db_name: String,
    base: Regex,
    mode: FilterMode,
}

impl NamespaceFilter {
    /// Builds the filter for one database.
    ///
    /// `include` and `exclude` hold bare collection names. Setting both is
    /// a configuration error; an empty list means "not configured".
    ///
    /// # Errors
    ///
    /// `ConfigError::ConflictingCollectionFilters` when both lists are
    /// non-empty, `ConfigError::InvalidNamespaceFilter` when the database
    /// name produces an unusable pattern.
    pub fn new(db_name: &str, include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        if !include.is_empty() && !exclude.is_empty() {
            return Err(ConfigError::ConflictingCollectionFilters);
        }

        let pattern = format!(
            "^(?:{}\\.|{})",
            regex::escape(db_name),
            regex::escape(ADMIN_COMMAND_NAMESPACE)
        );
        let base = Regex::new(&pattern).map_err(|err| ConfigError::InvalidNamespaceFilter {
            reason: err.to_string(),
        })?;

        let qualify = |collections: &[String]| {
            collections
                .iter()
                .map(|collection| format!("{db_name}.{collection}"))
                .collect::<BTreeSet<_>>()
        };

        let mode = if !include.is_empty() {
            FilterMode::Include(qualify(include))
        } else if !exclude.is_empty() {
            FilterMode::Exclude(qualify(exclude))
        } else {
            FilterMode::All
        };

        Ok(Self {
            db_name: db_name.to_string(),
            base,
            mode,
        })
    }

    /// The database this filter is scoped to.
    #[must_use]
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Whether entries in `namespace` should be returned.
    ///
    /// The admin command namespace always passes: transaction commits must
    /// reach the sequencer regardless of collection filtering, and their
    /// irrelevant sub-operations are discarded after expansion.
    #[must_use]
    pub fn matches(&self, namespace: &str) -> bool {
        if namespace == ADMIN_COMMAND_NAMESPACE {
            return true;
        }
        if !self.base.is_match(namespace) {
            return false;
        }
        match &self.mode {
            FilterMode::All => true,
            FilterMode::Include(namespaces) => namespaces.contains(namespace),
            FilterMode::Exclude(namespaces) => !namespaces.contains(namespace),
        }
    }
}
