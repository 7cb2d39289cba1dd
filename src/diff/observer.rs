//! Observer contracts for query change notifications, plus a mirroring
//! cache observer for callers that need a local copy of the result set.
//!
//! All callbacks have default no-op bodies, so an observer implements only
//! the notifications it cares about.

use std::collections::BTreeMap;

use crate::document::{apply_changes, DocId, Document, FieldDelta, Fields};

/// Callbacks for changes to an ordered query result.
///
/// `before` is the id of the element the subject now precedes; `None`
/// means "at the end of the result".
pub trait OrderedChangeObserver {
    /// A document appeared in the result, positioned before `before`.
    fn added_before(&mut self, id: &DocId, fields: &Fields, before: Option<&DocId>) {
        let _ = (id, fields, before);
    }

    /// A document already in the result changed relative position.
    fn moved_before(&mut self, id: &DocId, before: Option<&DocId>) {
        let _ = (id, before);
    }

    /// A document's fields changed; `delta` reproduces the new version.
    fn changed(&mut self, id: &DocId, delta: &FieldDelta) {
        let _ = (id, delta);
    }

    /// A document left the result.
    fn removed(&mut self, id: &DocId) {
        let _ = id;
    }
}

/// Callbacks for changes to an unordered query result.
pub trait UnorderedChangeObserver {
    /// A document appeared in the result.
    fn added(&mut self, id: &DocId, fields: &Fields) {
        let _ = (id, fields);
    }

    /// A document's fields changed; `delta` reproduces the new version.
    fn changed(&mut self, id: &DocId, delta: &FieldDelta) {
        let _ = (id, delta);
    }

    /// A document left the result.
    fn removed(&mut self, id: &DocId) {
        let _ = id;
    }
}

/// An [`OrderedChangeObserver`] that mirrors the result set locally.
///
/// Feeding it the callback stream of a diff keeps `docs()` equal to the
/// new result list; the diff replay tests lean on this.
///
/// # Panics
///
/// Panics when the callback stream is inconsistent with the cached state
/// (adding a present id, moving or changing an absent id) — such a stream
/// is a programmer error on the producer side.
#[derive(Debug, Default, Clone)]
pub struct OrderedCache {
    docs: Vec<Document>,
}

impl OrderedCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache seeded with an initial result list.
    #[must_use]
    pub fn seeded(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    /// The mirrored, ordered result list.
    #[must_use]
    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    /// Consumes the cache, returning the mirrored list.
    #[must_use]
    pub fn into_docs(self) -> Vec<Document> {
        self.docs
    }

    fn index_of(&self, id: &DocId) -> Option<usize> {
        self.docs.iter().position(|doc| doc.id == *id)
    }

    fn insertion_index(&self, before: Option<&DocId>) -> usize {
        match before {
            Some(anchor) => self
                .index_of(anchor)
                .unwrap_or_else(|| panic!("anchor document {anchor} not in cache")),
            None => self.docs.len(),
        }
    }
}

impl OrderedChangeObserver for OrderedCache {
    fn added_before(&mut self, id: &DocId, fields: &Fields, before: Option<&DocId>) {
        assert!(
            self.index_of(id).is_none(),
            "document {id} added but already cached"
        );
        let at = self.insertion_index(before);
        self.docs.insert(
            at,
            Document {
                id: id.clone(),
                fields: fields.clone(),
            },
        );
    }

    fn moved_before(&mut self, id: &DocId, before: Option<&DocId>) {
        let from = self
            .index_of(id)
            .unwrap_or_else(|| panic!("document {id} moved but not cached"));
        let doc = self.docs.remove(from);
        let at = self.insertion_index(before);
        self.docs.insert(at, doc);
    }

    fn changed(&mut self, id: &DocId, delta: &FieldDelta) {
        let at = self
            .index_of(id)
            .unwrap_or_else(|| panic!("document {id} changed but not cached"));
        apply_changes(&mut self.docs[at].fields, delta);
    }

    fn removed(&mut self, id: &DocId) {
        let at = self
            .index_of(id)
            .unwrap_or_else(|| panic!("document {id} removed but not cached"));
        self.docs.remove(at);
    }
}

/// An [`UnorderedChangeObserver`] that mirrors the result set locally.
#[derive(Debug, Default, Clone)]
pub struct UnorderedCache {
    docs: BTreeMap<DocId, Fields>,
}

impl UnorderedCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache seeded with an initial result map.
    #[must_use]
    pub fn seeded(docs: BTreeMap<DocId, Fields>) -> Self {
        Self { docs }
    }

    /// The mirrored result map.
    #[must_use]
    pub fn docs(&self) -> &BTreeMap<DocId, Fields> {
        &self.docs
    }

    /// Consumes the cache, returning the mirrored map.
    #[must_use]
    pub fn into_docs(self) -> BTreeMap<DocId, Fields> {
        self.docs
    }
}

impl UnorderedChangeObserver for UnorderedCache {
    fn added(&mut self, id: &DocId, fields: &Fields) {
        let previous = self.docs.insert(id.clone(), fields.clone());
        assert!(previous.is_none(), "document {id} added but already cached");
    }

    fn changed(&mut self, id: &DocId, delta: &FieldDelta) {
        let fields = self
            .docs
            .get_mut(id)
            .unwrap_or_else(|| panic!("document {id} changed but not cached"));
        apply_changes(fields, delta);
    }

    fn removed(&mut self, id: &DocId) {
        let removed = self.docs.remove(id);
        assert!(removed.is_some(), "document {id} removed but not cached");
    }
}
