use std::collections::BTreeMap;

use serde_json::json;

use livetail::{
    diff_ordered, diff_unordered, DocId, Document, FieldDelta, Fields, OrderedCache,
    OrderedChangeObserver, UnorderedCache,
};

fn doc(id: &str, n: i64) -> Document {
    Document::new(id).with_field("n", json!(n))
}

fn ids(docs: &[Document]) -> Vec<&str> {
    docs.iter().map(|d| d.id.as_str()).collect()
}

/// Applies the diff's callbacks to `old` and returns the replayed list.
fn replay(old: &[Document], new: &[Document]) -> Vec<Document> {
    let mut cache = OrderedCache::seeded(old.to_vec());
    diff_ordered(old, new, &mut cache);
    cache.into_docs()
}

fn assert_replay_exact(old: &[Document], new: &[Document]) {
    assert_eq!(replay(old, new), new, "replaying {:?} -> {:?}", ids(old), ids(new));
}

/// Counts callbacks per kind, checking replay separately.
#[derive(Debug, Default)]
struct Counter {
    added: usize,
    moved: usize,
    changed: usize,
    removed: usize,
}

impl OrderedChangeObserver for Counter {
    fn added_before(&mut self, _id: &DocId, _fields: &Fields, _before: Option<&DocId>) {
        self.added += 1;
    }
    fn moved_before(&mut self, _id: &DocId, _before: Option<&DocId>) {
        self.moved += 1;
    }
    fn changed(&mut self, _id: &DocId, _delta: &FieldDelta) {
        self.changed += 1;
    }
    fn removed(&mut self, _id: &DocId) {
        self.removed += 1;
    }
}

fn count(old: &[Document], new: &[Document]) -> Counter {
    let mut counter = Counter::default();
    diff_ordered(old, new, &mut counter);
    counter
}

#[test]
fn diffing_a_list_against_itself_emits_nothing() {
    let list = vec![doc("a", 1), doc("b", 2), doc("c", 3)];
    let counter = count(&list, &list.clone());
    assert_eq!(counter.added + counter.moved + counter.changed + counter.removed, 0);
}

#[test]
fn full_reversal_replays_exactly() {
    let old = vec![doc("1", 1), doc("2", 2), doc("3", 3)];
    let new = vec![doc("3", 3), doc("2", 2), doc("1", 1)];

    assert_replay_exact(&old, &new);
    assert_replay_exact(&new, &old);

    // The LCS keeps one element fixed; a three-element reversal needs no
    // more than two moves and nothing else.
    let counter = count(&old, &new);
    assert_eq!(counter.moved, 2);
    assert_eq!(counter.added + counter.changed + counter.removed, 0);
}

#[test]
fn clearing_the_result_emits_only_removals() {
    let old = vec![doc("a", 1), doc("b", 2), doc("c", 3)];
    let new: Vec<Document> = Vec::new();

    assert_replay_exact(&old, &new);

    let counter = count(&old, &new);
    assert_eq!(counter.removed, 3);
    assert_eq!(counter.added + counter.moved + counter.changed, 0);
}

#[test]
fn appending_emits_one_add_and_no_moves() {
    let old = vec![doc("x", 1), doc("y", 2), doc("z", 3)];
    let mut new = old.clone();
    new.push(doc("w", 4));

    assert_replay_exact(&old, &new);

    let counter = count(&old, &new);
    assert_eq!(counter.added, 1);
    assert_eq!(counter.moved + counter.changed + counter.removed, 0);
}

#[test]
fn index_shifts_from_removals_are_not_moves() {
    let old = vec![doc("a", 1), doc("b", 2), doc("c", 3), doc("d", 4)];
    let new = vec![doc("b", 2), doc("c", 3), doc("d", 4)];

    assert_replay_exact(&old, &new);

    let counter = count(&old, &new);
    assert_eq!(counter.removed, 1);
    assert_eq!(counter.moved, 0);
}

#[test]
fn arbitrary_permutations_replay_exactly_in_both_directions() {
    let base = vec![
        doc("a", 1),
        doc("b", 2),
        doc("c", 3),
        doc("d", 4),
        doc("e", 5),
        doc("f", 6),
    ];
    let permutations: Vec<Vec<usize>> = vec![
        vec![5, 4, 3, 2, 1, 0],
        vec![1, 0, 3, 2, 5, 4],
        vec![2, 0, 4, 1, 5, 3],
        vec![5, 0, 1, 2, 3, 4],
        vec![0, 2, 4, 1, 3, 5],
    ];

    for permutation in permutations {
        let new: Vec<Document> = permutation.iter().map(|&i| base[i].clone()).collect();
        assert_replay_exact(&base, &new);
        assert_replay_exact(&new, &base);
    }
}

#[test]
fn disjoint_sets_replay_exactly() {
    let old = vec![doc("a", 1), doc("b", 2), doc("c", 3)];
    let new = vec![doc("x", 10), doc("y", 20)];

    assert_replay_exact(&old, &new);
    assert_replay_exact(&new, &old);

    let counter = count(&old, &new);
    assert_eq!(counter.removed, 3);
    assert_eq!(counter.added, 2);
    assert_eq!(counter.moved, 0);
}

#[test]
fn overlapping_change_with_moves_and_edits_replays_exactly() {
    let old = vec![doc("a", 1), doc("b", 2), doc("c", 3), doc("d", 4)];
    let new = vec![
        doc("d", 40),
        doc("b", 2),
        doc("e", 5),
        Document::new("a").with_field("renamed", json!(true)),
    ];

    assert_replay_exact(&old, &new);
    assert_replay_exact(&new, &old);
}

#[test]
fn changed_delta_carries_sets_and_unsets() {
    #[derive(Default)]
    struct CaptureDelta {
        delta: Option<FieldDelta>,
    }
    impl OrderedChangeObserver for CaptureDelta {
        fn changed(&mut self, _id: &DocId, delta: &FieldDelta) {
            self.delta = Some(delta.clone());
        }
    }

    let old = vec![Document::new("a")
        .with_field("keep", json!(1))
        .with_field("edit", json!("before"))
        .with_field("drop", json!(true))];
    let new = vec![Document::new("a")
        .with_field("keep", json!(1))
        .with_field("edit", json!("after"))
        .with_field("fresh", json!([1]))];

    let mut capture = CaptureDelta::default();
    diff_ordered(&old, &new, &mut capture);
    let delta = capture.delta.expect("changed was not emitted");

    assert_eq!(delta.get("edit"), Some(&Some(json!("after"))));
    assert_eq!(delta.get("fresh"), Some(&Some(json!([1]))));
    assert_eq!(delta.get("drop"), Some(&None));
    assert!(!delta.contains_key("keep"));
}

#[test]
fn unordered_diff_replays_through_a_mirror_cache() {
    let to_map = |pairs: &[(&str, i64)]| -> BTreeMap<DocId, Fields> {
        pairs
            .iter()
            .map(|(id, n)| {
                let mut fields = Fields::new();
                fields.insert("n".to_string(), json!(n));
                (DocId::from(*id), fields)
            })
            .collect()
    };

    let old = to_map(&[("a", 1), ("b", 2), ("c", 3)]);
    let new = to_map(&[("b", 20), ("c", 3), ("d", 4)]);

    let mut cache = UnorderedCache::seeded(old.clone());
    diff_unordered(&old, &new, &mut cache);
    assert_eq!(cache.into_docs(), new);
}
