//! Deterministic history merge.
//!
//! Two histories are walked front to front. Matching passwords are the same
//! state reached independently, so one copy is kept. Otherwise the earlier
//! entry goes first. Ties use `CredentialEntry::merge_order`, which makes the
//! result independent of argument order.

use std::cmp::Ordering;

use super::entry::{CredentialEntry, CredentialHistory};

pub(crate) fn merge_histories(ours: &[CredentialEntry], theirs: &[CredentialEntry]) -> CredentialHistory {
    let mut merged = Vec::with_capacity(ours.len() + theirs.len());
    let (mut i, mut j) = (0, 0);

    while i < ours.len() && j < theirs.len() {
        let (a, b) = (&ours[i], &theirs[j]);
        if a.password == b.password {
            merged.push(smaller(a, b).clone());
            i += 1;
            j += 1;
        } else if a.merge_order(b) == Ordering::Greater {
            merged.push(b.clone());
            j += 1;
        } else {
            merged.push(a.clone());
            i += 1;
        }
    }
    merged.extend_from_slice(&ours[i..]);
    merged.extend_from_slice(&theirs[j..]);

    merged.dedup_by(|next, prev| next.password == prev.password);
    merged
}

fn smaller<'a>(a: &'a CredentialEntry, b: &'a CredentialEntry) -> &'a CredentialEntry {
    if a.merge_order(b) == Ordering::Greater {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(password: &str, time: i64) -> CredentialEntry {
        CredentialEntry {
            host: "example.com".into(),
            url: "http://example.com".into(),
            username: "alice".into(),
            password: password.into(),
            time,
        }
    }

    fn passwords(history: &[CredentialEntry]) -> Vec<&str> {
        history.iter().map(|e| e.password.as_str()).collect()
    }

    #[test]
    fn test_interleaves_by_time() {
        let ours = vec![entry("a", 1), entry("c", 3)];
        let theirs = vec![entry("b", 2), entry("d", 4)];
        assert_eq!(passwords(&merge_histories(&ours, &theirs)), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_same_password_kept_once() {
        let ours = vec![entry("a", 1), entry("b", 5)];
        let theirs = vec![entry("a", 2), entry("c", 3)];
        let merged = merge_histories(&ours, &theirs);
        assert_eq!(passwords(&merged), ["a", "c", "b"]);
        assert_eq!(merged[0].time, 1);
    }

    #[test]
    fn test_remainder_appended() {
        let ours = vec![entry("a", 1)];
        let theirs = vec![entry("b", 2), entry("c", 3), entry("d", 4)];
        assert_eq!(passwords(&merge_histories(&ours, &theirs)), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_adjacent_duplicates_collapsed() {
        let ours = vec![entry("a", 1), entry("a", 2)];
        let theirs = vec![entry("b", 3)];
        let merged = merge_histories(&ours, &theirs);
        assert_eq!(passwords(&merged), ["a", "b"]);
        assert_eq!(merged[0].time, 1);
    }

    #[test]
    fn test_time_tie_is_order_independent() {
        let ours = vec![entry("x", 7)];
        let theirs = vec![entry("y", 7)];
        assert_eq!(merge_histories(&ours, &theirs), merge_histories(&theirs, &ours));
        assert_eq!(passwords(&merge_histories(&theirs, &ours)), ["x", "y"]);
    }

    #[test]
    fn test_empty_side() {
        let ours = vec![entry("a", 1)];
        assert_eq!(merge_histories(&ours, &[]), ours);
        assert_eq!(merge_histories(&[], &ours), ours);
    }
}
