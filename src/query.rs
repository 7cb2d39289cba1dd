//! Consumed collaborator interfaces: query matching and document mutation.
//!
//! The observation engine does not evaluate selectors or update operators
//! itself. Subscriptions plug in implementations of these traits; the
//! engine only needs the match verdict (plus the array indices that
//! produced it, for positional updates) and the mutated document state.

use crate::document::Document;
use crate::error::LivetailResult;

/// Outcome of evaluating a selector against a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Whether the document satisfies the selector.
    pub matched: bool,
    /// Indices of the array elements that caused the match, when the
    /// selector reached into an array. Empty otherwise.
    pub array_indices: Vec<usize>,
}

impl MatchOutcome {
    /// A non-match.
    #[must_use]
    pub const fn no_match() -> Self {
        Self {
            matched: false,
            array_indices: Vec::new(),
        }
    }

    /// A match with no array involvement.
    #[must_use]
    pub const fn matched() -> Self {
        Self {
            matched: true,
            array_indices: Vec::new(),
        }
    }

    /// A match produced by specific array elements.
    #[must_use]
    pub fn matched_at(array_indices: Vec<usize>) -> Self {
        Self {
            matched: true,
            array_indices,
        }
    }
}

/// Evaluates whether a document satisfies a selector.
pub trait Matcher: Send + Sync {
    /// Evaluates `selector` against `document`.
    fn matches(&self, selector: &serde_json::Value, document: &Document) -> MatchOutcome;
}

/// Applies an update-operator expression to a document.
pub trait Mutator: Send + Sync {
    /// Returns the mutated document, or an error for a malformed expression.
    fn apply(&self, document: &Document, update: &serde_json::Value) -> LivetailResult<Document>;
}
