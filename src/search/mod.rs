//! Hybrid search: BM25 lexical scoring (C9) fused with vector similarity
//! ranking via RRF (C10).

mod bm25;
mod rrf;

pub use bm25::Bm25Scorer;
pub use rrf::reciprocal_rank_fusion;

use crate::types::LexicalIndex;

/// One candidate chunk as seen by the hybrid fuser: carries enough to be
/// ranked by both the vector-similarity ordering (already applied upstream,
/// reflected in `vector_rank`) and BM25 lexical scoring.
#[derive(Debug, Clone)]
pub struct HybridCandidate {
    pub chunk_id: i64,
    pub document_id: i64,
    pub lexical_index: LexicalIndex,
    pub keywords: Vec<String>,
}

/// Compute the lexical ranking (by descending BM25 score) for a set of
/// candidates against `query_terms`, ready to be fused against the vector
/// ranking via `reciprocal_rank_fusion`.
pub fn lexical_ranking(
    scorer: &Bm25Scorer,
    query_terms: &[String],
    candidates: &[HybridCandidate],
) -> Vec<i64> {
    let mut scored: Vec<(i64, f32)> = candidates
        .iter()
        .map(|c| {
            let token_count: u32 = c.lexical_index.term_frequencies.values().sum();
            let score = scorer.score(
                query_terms,
                &c.lexical_index.term_frequencies,
                token_count,
                Some(&c.keywords),
            );
            (c.chunk_id, score)
        })
        .filter(|(_, score)| *score > 0.0)
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(id, _)| id).collect()
}

/// Fuse a vector-similarity ranking and a lexical ranking into one ordering
/// of chunk ids via RRF.
pub fn fuse_vector_and_lexical(
    vector_ranking: Vec<i64>,
    lexical_ranking: Vec<i64>,
    rrf_k: usize,
) -> Vec<i64> {
    let rankings = vec![vector_ranking, lexical_ranking];
    reciprocal_rank_fusion(&rankings, rrf_k)
        .into_iter()
        .map(|(id, _)| id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i64, terms: &[(&str, u32)], keywords: &[&str]) -> HybridCandidate {
        HybridCandidate {
            chunk_id: id,
            document_id: 1,
            lexical_index: LexicalIndex {
                term_frequencies: terms.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            },
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn lexical_ranking_orders_by_bm25_score() {
        let scorer = Bm25Scorer::default();
        let candidates = vec![
            candidate(1, &[("deploy", 1)], &[]),
            candidate(2, &[("deploy", 5)], &[]),
        ];
        let ranking = lexical_ranking(&scorer, &["deploy".to_string()], &candidates);
        assert_eq!(ranking, vec![2, 1]);
    }

    #[test]
    fn zero_score_candidates_are_excluded() {
        let scorer = Bm25Scorer::default();
        let candidates = vec![candidate(1, &[("rollback", 1)], &[])];
        let ranking = lexical_ranking(&scorer, &["deploy".to_string()], &candidates);
        assert!(ranking.is_empty());
    }

    #[test]
    fn fusion_surfaces_items_agreed_on_by_both_rankings() {
        let fused = fuse_vector_and_lexical(vec![1, 2, 3], vec![2, 1, 3], 60);
        assert_eq!(fused[0], 1);
    }
}
