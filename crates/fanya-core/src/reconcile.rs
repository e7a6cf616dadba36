//! Keyed merge shared by the session and message stores.
//!
//! Given the current sequence and one incoming entity, the merge either
//! replaces the element sharing its key in place or appends the entity at the
//! tail. Relative order of all other elements is never changed, which makes
//! the operation idempotent: merging the same entity twice equals merging it
//! once.

/// What [`merge_in_place`] did with the incoming entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No element shared the key; the entity was appended.
    Inserted,
    /// The element at this index was replaced.
    Replaced(usize),
}

/// Returns `existing` with `incoming` merged by key.
pub fn merge<T, K, F>(existing: &[T], incoming: T, key_of: F) -> Vec<T>
where
    T: Clone,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let mut merged = existing.to_vec();
    merge_in_place(&mut merged, incoming, key_of);
    merged
}

/// Merges `incoming` into `entries` by key without reordering.
pub fn merge_in_place<T, K, F>(entries: &mut Vec<T>, incoming: T, key_of: F) -> MergeOutcome
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let key = key_of(&incoming);
    match entries.iter().position(|entry| key_of(entry) == key) {
        Some(index) => {
            entries[index] = incoming;
            MergeOutcome::Replaced(index)
        }
        None => {
            entries.push(incoming);
            MergeOutcome::Inserted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u32,
        body: &'static str,
    }

    fn row(id: u32, body: &'static str) -> Row {
        Row { id, body }
    }

    #[test]
    fn test_merge_appends_new_key() {
        let merged = merge(&[row(1, "a"), row(2, "b")], row(3, "c"), |r| r.id);
        assert_eq!(merged, vec![row(1, "a"), row(2, "b"), row(3, "c")]);
    }

    #[test]
    fn test_merge_replaces_in_place() {
        let merged = merge(&[row(1, "a"), row(2, "b"), row(3, "c")], row(2, "B"), |r| r.id);
        assert_eq!(merged, vec![row(1, "a"), row(2, "B"), row(3, "c")]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let base = vec![row(5, "x"), row(1, "y")];
        for incoming in [row(1, "z"), row(9, "new")] {
            let once = merge(&base, incoming.clone(), |r| r.id);
            let twice = merge(&once, incoming, |r| r.id);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_merge_in_place_reports_outcome() {
        let mut rows = vec![row(1, "a")];
        assert_eq!(merge_in_place(&mut rows, row(2, "b"), |r| r.id), MergeOutcome::Inserted);
        assert_eq!(
            merge_in_place(&mut rows, row(1, "A"), |r| r.id),
            MergeOutcome::Replaced(0)
        );
        assert_eq!(rows, vec![row(1, "A"), row(2, "b")]);
    }
}
