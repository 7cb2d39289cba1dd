//! Unordered result diffing.

use std::collections::BTreeMap;

use crate::diff::fields::make_changed_fields;
use crate::diff::observer::UnorderedChangeObserver;
use crate::document::{DocId, Fields};

/// Diffs two unordered, id-keyed result maps into observer callbacks.
///
/// Common ids with differing fields produce one `changed`, ids only in
/// `new` one `added`, ids only in `old` one `removed`. No positional
/// callbacks exist for unordered results.
pub fn diff_unordered<O>(
    old: &BTreeMap<DocId, Fields>,
    new: &BTreeMap<DocId, Fields>,
    observer: &mut O,
) where
    O: UnorderedChangeObserver + ?Sized,
{
    for (id, new_fields) in new {
        match old.get(id) {
            Some(old_fields) => {
                let delta = make_changed_fields(new_fields, old_fields);
                if !delta.is_empty() {
                    observer.changed(id, &delta);
                }
            }
            None => observer.added(id, new_fields),
        }
    }

    for id in old.keys() {
        if !new.contains_key(id) {
            observer.removed(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::observer::UnorderedCache;
    use serde_json::json;

    fn result(pairs: &[(&str, i64)]) -> BTreeMap<DocId, Fields> {
        pairs
            .iter()
            .map(|(id, n)| {
                let mut fields = Fields::new();
                fields.insert("n".to_string(), json!(n));
                (DocId::from(*id), fields)
            })
            .collect()
    }

    #[test]
    fn replay_reaches_new_state() {
        let old = result(&[("a", 1), ("b", 2), ("c", 3)]);
        let new = result(&[("b", 2), ("c", 30), ("d", 4)]);

        let mut cache = UnorderedCache::seeded(old.clone());
        diff_unordered(&old, &new, &mut cache);
        assert_eq!(cache.into_docs(), new);
    }

    #[test]
    fn identical_maps_emit_nothing() {
        struct FailOnAnything;
        impl UnorderedChangeObserver for FailOnAnything {
            fn added(&mut self, id: &DocId, _fields: &Fields) {
                panic!("unexpected added {id}");
            }
            fn changed(&mut self, id: &DocId, _delta: &crate::document::FieldDelta) {
                panic!("unexpected changed {id}");
            }
            fn removed(&mut self, id: &DocId) {
                panic!("unexpected removed {id}");
            }
        }

        let docs = result(&[("a", 1), ("b", 2)]);
        diff_unordered(&docs, &docs.clone(), &mut FailOnAnything);
    }
}
