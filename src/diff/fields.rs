//! Field-level diffing between two versions of a document.

use crate::document::{FieldDelta, Fields};

/// Computes the delta that turns `old_fields` into `new_fields`.
///
/// Fields whose value differs, and fields only present in `new_fields`,
/// map to the new value. Fields only present in `old_fields` map to unset.
/// Unchanged fields are omitted, so an empty delta means the two versions
/// are identical.
#[must_use]
pub fn make_changed_fields(new_fields: &Fields, old_fields: &Fields) -> FieldDelta {
    let mut delta = FieldDelta::new();

    for (name, old_value) in old_fields {
        match new_fields.get(name) {
            Some(new_value) => {
                if new_value != old_value {
                    delta.insert(name.clone(), Some(new_value.clone()));
                }
            }
            None => {
                delta.insert(name.clone(), None);
            }
        }
    }

    for (name, new_value) in new_fields {
        if !old_fields.contains_key(name) {
            delta.insert(name.clone(), Some(new_value.clone()));
        }
    }

    delta
}
