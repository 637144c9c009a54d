//! Rank Fuser (C10): Reciprocal Rank Fusion generalised over an arbitrary
//! number of input rankings (vector similarity, BM25, or any future signal),
//! rather than a fixed vector+lexical pair.

use std::collections::HashMap;
use std::hash::Hash;

/// Fuse `rankings` — each an ordered list of item ids, best first — into a
/// single ranking by summing `1 / (k + rank)` across every list an item
/// appears in. Items absent from a ranking simply don't contribute a term
/// for it. Ties broken by the caller's stable sort of the input order.
pub fn reciprocal_rank_fusion<T>(rankings: &[Vec<T>], k: usize) -> Vec<(T, f32)>
where
    T: Eq + Hash + Clone,
{
    let mut scores: HashMap<T, f32> = HashMap::new();
    let mut order: Vec<T> = Vec::new();

    for ranking in rankings {
        for (rank, item) in ranking.iter().enumerate() {
            let entry = scores.entry(item.clone()).or_insert_with(|| {
                order.push(item.clone());
                0.0
            });
            *entry += 1.0 / (k + rank + 1) as f32;
        }
    }

    let mut fused: Vec<(T, f32)> = order
        .into_iter()
        .map(|item| {
            let score = scores[&item];
            (item, score)
        })
        .collect();

    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_ranked_first_everywhere_wins() {
        let rankings = vec![vec!["a", "b", "c"], vec!["a", "c", "b"]];
        let fused = reciprocal_rank_fusion(&rankings, 60);
        assert_eq!(fused[0].0, "a");
    }

    #[test]
    fn item_present_in_more_rankings_outranks_single_ranking_item() {
        let rankings = vec![vec!["a", "b"], vec!["b", "a"], vec!["b"]];
        let fused = reciprocal_rank_fusion(&rankings, 60);
        assert_eq!(fused[0].0, "b");
    }

    #[test]
    fn generalises_beyond_two_rankings() {
        let rankings = vec![vec!["x", "y"], vec!["y", "x"], vec!["x", "y"], vec!["y", "x"]];
        let fused = reciprocal_rank_fusion(&rankings, 60);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn item_missing_from_a_ranking_still_scores_from_the_others() {
        let rankings: Vec<Vec<&str>> = vec![vec!["a", "b"], vec!["b"]];
        let fused = reciprocal_rank_fusion(&rankings, 60);
        let a_score = fused.iter().find(|(item, _)| *item == "a").unwrap().1;
        assert!(a_score > 0.0);
    }
}
