//! Result-set diffing for live queries.
//!
//! The differ turns "old result" + "new result" into a minimal callback
//! sequence an observer can apply to transform one into the other. The
//! ordered variant additionally guarantees positional stability: only
//! documents whose relative order actually changed are reported as moved.

/// Field-level delta computation.
pub mod fields;
/// Observer contracts and mirroring caches.
pub mod observer;
/// Ordered list diffing (LCS-stable).
pub mod ordered;
/// Unordered map diffing.
pub mod unordered;

pub use fields::make_changed_fields;
pub use observer::{OrderedCache, OrderedChangeObserver, UnorderedCache, UnorderedChangeObserver};
pub use ordered::diff_ordered;
pub use unordered::diff_unordered;
