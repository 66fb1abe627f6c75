//! Sorted set storage
//!
//! Members ordered by score with lexicographic tie-break on the member
//! string. Backed by a score index plus an ordered set of (score, member)
//! pairs, so rank ranges and min/max pops are straightforward.

use std::collections::{BTreeSet, HashMap};

/// Score wrapper with a total order (scores are never NaN; the command layer
/// rejects unparseable floats before they get here).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score(pub f64);

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A sorted set of members with f64 scores
#[derive(Debug, Clone, Default)]
pub struct ScoreSet {
    scores: HashMap<String, f64>,
    ordered: BTreeSet<(Score, String)>,
}

impl ScoreSet {
    /// Create an empty sorted set
    pub fn new() -> Self {
        ScoreSet::default()
    }

    /// Insert or update a member. Returns the previous score if the member
    /// already existed.
    pub fn insert(&mut self, member: String, score: f64) -> Option<f64> {
        let old = self.scores.insert(member.clone(), score);
        if let Some(old_score) = old {
            self.ordered.remove(&(Score(old_score), member.clone()));
        }
        self.ordered.insert((Score(score), member));
        old
    }

    /// Remove a member, returning its score
    pub fn remove(&mut self, member: &str) -> Option<f64> {
        let score = self.scores.remove(member)?;
        self.ordered.remove(&(Score(score), member.to_string()));
        Some(score)
    }

    /// Get the score of a member
    pub fn get_score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// True when the set has no members
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Members between two ranks, inclusive, in score order. Negative ranks
    /// count from the end the way Redis range indices do.
    pub fn range_by_rank(&self, start: isize, stop: isize) -> Vec<(String, f64)> {
        let len = self.len() as isize;
        let start = clamp_rank(start, len);
        let stop = clamp_rank(stop, len);
        if start > stop || start >= len {
            return Vec::new();
        }
        self.ordered
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|(score, member)| (member.clone(), score.0))
            .collect()
    }

    /// Pop up to `count` lowest-scored members
    pub fn pop_min(&mut self, count: usize) -> Vec<(String, f64)> {
        let mut popped = Vec::with_capacity(count.min(self.len()));
        for _ in 0..count {
            let entry = match self.ordered.iter().next() {
                Some(entry) => entry.clone(),
                None => break,
            };
            self.ordered.remove(&entry);
            self.scores.remove(&entry.1);
            popped.push((entry.1, entry.0 .0));
        }
        popped
    }

    /// Pop up to `count` highest-scored members
    pub fn pop_max(&mut self, count: usize) -> Vec<(String, f64)> {
        let mut popped = Vec::with_capacity(count.min(self.len()));
        for _ in 0..count {
            let entry = match self.ordered.iter().next_back() {
                Some(entry) => entry.clone(),
                None => break,
            };
            self.ordered.remove(&entry);
            self.scores.remove(&entry.1);
            popped.push((entry.1, entry.0 .0));
        }
        popped
    }
}

fn clamp_rank(rank: isize, len: isize) -> isize {
    if rank < 0 {
        (len + rank).max(0)
    } else {
        // Positive ranks stay uncapped so a start past the end yields an
        // empty range, the way Redis treats rank ranges.
        rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScoreSet {
        let mut zset = ScoreSet::new();
        zset.insert("b".to_string(), 2.0);
        zset.insert("a".to_string(), 1.0);
        zset.insert("c".to_string(), 2.0);
        zset
    }

    #[test]
    fn test_score_order_with_lex_tie_break() {
        let zset = sample();
        let members: Vec<String> = zset
            .range_by_rank(0, -1)
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        assert_eq!(members, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insert_updates_score() {
        let mut zset = sample();
        assert_eq!(zset.insert("a".to_string(), 9.0), Some(1.0));
        assert_eq!(zset.len(), 3);
        let members: Vec<String> = zset
            .range_by_rank(0, -1)
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        assert_eq!(members, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_pop_min_max() {
        let mut zset = sample();
        assert_eq!(zset.pop_min(1), vec![("a".to_string(), 1.0)]);
        assert_eq!(
            zset.pop_max(5),
            vec![("c".to_string(), 2.0), ("b".to_string(), 2.0)]
        );
        assert!(zset.is_empty());
    }

    #[test]
    fn test_negative_ranks() {
        let zset = sample();
        assert_eq!(
            zset.range_by_rank(-2, -1)
                .into_iter()
                .map(|(m, _)| m)
                .collect::<Vec<_>>(),
            vec!["b", "c"]
        );
        assert!(zset.range_by_rank(2, 1).is_empty());
    }

    #[test]
    fn test_start_past_end_is_empty() {
        let zset = sample();
        assert!(zset.range_by_rank(5, 10).is_empty());
        assert!(zset.range_by_rank(3, 3).is_empty());
        // A stop past the end only truncates.
        assert_eq!(zset.range_by_rank(1, 10).len(), 2);
        assert!(ScoreSet::new().range_by_rank(0, -1).is_empty());
    }

    #[test]
    fn test_remove() {
        let mut zset = sample();
        assert_eq!(zset.remove("b"), Some(2.0));
        assert_eq!(zset.remove("b"), None);
        assert_eq!(zset.len(), 2);
    }
}
