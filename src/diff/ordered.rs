//! Ordered result diffing.
//!
//! Turns "old ordered result" + "new ordered result" into the minimal
//! callback sequence that transforms one into the other while preserving
//! list order semantics. Documents whose relative order is unchanged are
//! never reported as moved, even when their absolute index shifted because
//! of insertions or removals elsewhere.

use std::collections::{HashMap, HashSet};

use crate::diff::fields::make_changed_fields;
use crate::diff::observer::OrderedChangeObserver;
use crate::document::{DocId, Document};

/// Diffs two ordered, id-unique result lists into observer callbacks.
///
/// Applying the emitted callbacks to `old`, in order, yields exactly `new`
/// (same ids, same order, same field values):
///
/// - documents in both lists with identical fields produce no callback;
/// - documents in both lists with differing fields produce one `changed`
///   whose delta reproduces the new version;
/// - documents only in `new` produce one `added_before` anchored on the
///   following element (or `None` when last);
/// - documents only in `old` produce one `removed`;
/// - documents in both lists at a different relative position produce one
///   `moved_before` (plus a `changed` when fields also differ).
///
/// To decide which documents "moved" (versus merely shifting index because
/// of other edits), the longest subsequence of ids common to both lists in
/// the same relative order is held fixed; everything outside it is moved
/// into place. The common subsequence is found as the longest increasing
/// subsequence of old indices over `new`, O(N·k) for k out-of-place
/// documents, which is plenty for result lists of a few hundred entries.
///
/// # Panics
///
/// Panics when either list contains a duplicate id. That input is a
/// programmer error on the caller's side, not a recoverable condition.
pub fn diff_ordered<O>(old: &[Document], new: &[Document], observer: &mut O)
where
    O: OrderedChangeObserver + ?Sized,
{
    let mut old_index_of_id: HashMap<&DocId, usize> = HashMap::with_capacity(old.len());
    for (index, doc) in old.iter().enumerate() {
        let previous = old_index_of_id.insert(&doc.id, index);
        assert!(previous.is_none(), "duplicate id {} in old results", doc.id);
    }

    let mut new_presence_of_id: HashSet<&DocId> = HashSet::with_capacity(new.len());
    for doc in new {
        assert!(
            new_presence_of_id.insert(&doc.id),
            "duplicate id {} in new results",
            doc.id
        );
    }

    // Longest increasing subsequence of old indices over `new`, tracked as
    // indices into `new`. seq_ends[j] is the index into `new` ending the
    // best common subsequence of length j+1; ptrs chains each member to
    // the subsequence it extends.
    let n = new.len();
    let mut seq_ends = vec![0usize; n];
    let mut ptrs: Vec<Option<usize>> = vec![None; n];
    let mut max_seq_len = 0usize;

    let old_idx = |i_new: usize| old_index_of_id[&new[i_new].id];

    for i in 0..n {
        if !old_index_of_id.contains_key(&new[i].id) {
            continue;
        }
        // Scanning backwards instead of binary searching: a subsequence to
        // extend usually appears within the number of out-of-place docs.
        let mut j = max_seq_len;
        while j > 0 {
            if old_idx(seq_ends[j - 1]) < old_idx(i) {
                break;
            }
            j -= 1;
        }

        ptrs[i] = if j == 0 { None } else { Some(seq_ends[j - 1]) };
        seq_ends[j] = i;
        if j + 1 > max_seq_len {
            max_seq_len = j + 1;
        }
    }

    // Members of the common subsequence, as ascending indices into `new`,
    // with a virtual anchor one past the end: the final group of moved
    // documents is anchored by the end of the list.
    let mut unmoved = Vec::with_capacity(max_seq_len + 1);
    let mut cursor = if max_seq_len == 0 {
        None
    } else {
        Some(seq_ends[max_seq_len - 1])
    };
    while let Some(index) = cursor {
        unmoved.push(index);
        cursor = ptrs[index];
    }
    unmoved.reverse();
    unmoved.push(n);

    for doc in old {
        if !new_presence_of_id.contains(&doc.id) {
            observer.removed(&doc.id);
        }
    }

    // Walk `new` group by group, where a group is a run of added/moved
    // documents anchored on its right by an unmoved document (or the list
    // end). Each group member lands before the anchor; the anchor itself
    // only ever needs a `changed`.
    let mut start_of_group = 0usize;
    for &end_of_group in &unmoved {
        let group_id = new.get(end_of_group).map(|doc| &doc.id);

        for doc in &new[start_of_group..end_of_group] {
            match old_index_of_id.get(&doc.id) {
                None => observer.added_before(&doc.id, &doc.fields, group_id),
                Some(&old_at) => {
                    let delta = make_changed_fields(&doc.fields, &old[old_at].fields);
                    if !delta.is_empty() {
                        observer.changed(&doc.id, &delta);
                    }
                    observer.moved_before(&doc.id, group_id);
                }
            }
        }

        if end_of_group < n {
            let anchor = &new[end_of_group];
            let old_at = old_index_of_id[&anchor.id];
            let delta = make_changed_fields(&anchor.fields, &old[old_at].fields);
            if !delta.is_empty() {
                observer.changed(&anchor.id, &delta);
            }
        }

        start_of_group = end_of_group + 1;
    }
}
