//! Simplified BM25 Scorer (C9): term-frequency scoring without a global IDF
//! table, since no corpus-wide document-frequency index is maintained. A
//! multiplicative keyword boost rewards chunks whose LLM-extracted keywords
//! mention a query term.

pub struct Bm25Scorer {
    k1: f32,
    b: f32,
    avg_dl: f32,
    boost: f32,
}

impl Bm25Scorer {
    pub fn new(k1: f32, b: f32, avg_dl: f32, boost: f32) -> Self {
        Self { k1, b, avg_dl, boost }
    }

    /// Score one chunk against `query_terms` (already tokenized/stemmed the
    /// same way the lexical index was built). `token_count` is the chunk's
    /// total stemmed-token count (`L` in the length-normalisation term).
    pub fn score(
        &self,
        query_terms: &[String],
        doc_term_frequencies: &std::collections::HashMap<String, u32>,
        token_count: u32,
        keywords: Option<&[String]>,
    ) -> f32 {
        let mut score = 0.0f32;

        for term in query_terms {
            let tf = doc_term_frequencies.get(term).copied().unwrap_or(0) as f32;
            if tf == 0.0 {
                continue;
            }
            let numerator = tf * (self.k1 + 1.0);
            let denominator =
                tf + self.k1 * (1.0 - self.b + self.b * (token_count as f32 / self.avg_dl));
            score += numerator / denominator;
        }

        if score > 0.0 {
            if let Some(keywords) = keywords {
                let mut boost_multiplier = 1.0f32;
                for term in query_terms {
                    let term_lower = term.to_lowercase();
                    if keywords
                        .iter()
                        .any(|kw| kw.to_lowercase().contains(&term_lower))
                    {
                        boost_multiplier *= self.boost;
                    }
                }
                score *= boost_multiplier;
            }
        }

        score
    }
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Self::new(1.2, 0.75, 1000.0, 1.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn terms(tf: &[(&str, u32)]) -> HashMap<String, u32> {
        tf.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn unmatched_query_terms_score_zero() {
        let scorer = Bm25Scorer::default();
        let doc = terms(&[("deploy", 3)]);
        let score = scorer.score(&["rollback".to_string()], &doc, 10, None);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn higher_term_frequency_scores_higher() {
        let scorer = Bm25Scorer::default();
        let low = terms(&[("deploy", 1)]);
        let high = terms(&[("deploy", 5)]);
        let score_low = scorer.score(&["deploy".to_string()], &low, 1000, None);
        let score_high = scorer.score(&["deploy".to_string()], &high, 1000, None);
        assert!(score_high > score_low);
    }

    #[test]
    fn keyword_match_multiplies_score() {
        let scorer = Bm25Scorer::default();
        let doc = terms(&[("deploy", 2)]);
        let base = scorer.score(&["deploy".to_string()], &doc, 1000, None);
        let boosted = scorer.score(
            &["deploy".to_string()],
            &doc,
            1000,
            Some(&["Kubernetes deployment guide".to_string()]),
        );
        assert!((boosted - base * 1.5).abs() < 1e-4);
    }

    #[test]
    fn boost_compounds_per_matching_term() {
        let scorer = Bm25Scorer::default();
        let doc = terms(&[("deploy", 1), ("rollback", 1)]);
        let query = vec!["deploy".to_string(), "rollback".to_string()];
        let base = scorer.score(&query, &doc, 1000, None);
        let boosted = scorer.score(
            &query,
            &doc,
            1000,
            Some(&["deploy and rollback runbook".to_string()]),
        );
        assert!((boosted - base * 1.5 * 1.5).abs() < 1e-3);
    }

    #[test]
    fn zero_base_score_is_not_boosted_into_nonzero() {
        let scorer = Bm25Scorer::default();
        let doc = terms(&[("deploy", 0)]);
        let score = scorer.score(
            &["deploy".to_string()],
            &doc,
            1000,
            Some(&["deploy guide".to_string()]),
        );
        assert_eq!(score, 0.0);
    }
}
