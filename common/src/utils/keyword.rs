/// Literal implementation of the keyword-index scoring algorithm: lowercase,
/// tokenize on whitespace, score candidates by total case-insensitive
/// occurrence count across all query tokens, break ties by ascending chunk id.
///
/// This operates over an in-memory candidate set; the caller is responsible
/// for bounding that set to `k * limit_multiplier` rows before calling in
/// (the store-level query that does so lives in `storage::graph_store` /
/// the chunk store, since it needs direct access to persisted chunk text).
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub chunk_id: String,
    pub score: u64,
}

/// Lowercase, split on whitespace, drop empty tokens.
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Count non-overlapping, case-insensitive occurrences of `token` in `haystack_lower`.
fn count_occurrences(haystack_lower: &str, token: &str) -> u64 {
    if token.is_empty() {
        return 0;
    }
    haystack_lower.matches(token).count() as u64
}

/// Score one candidate's already-lowercased content against the token set.
fn score_candidate(content_lower: &str, tokens: &[String]) -> u64 {
    tokens
        .iter()
        .map(|token| count_occurrences(content_lower, token))
        .sum()
}

/// Run the keyword search algorithm over a bounded candidate set.
///
/// `candidates` is `(chunk_id, content)` pairs, already limited to at most
/// `k * limit_multiplier` rows by the caller's store query. Returns the top
/// `k` hits, descending by score, ties broken by ascending chunk id.
pub fn search(candidates: &[(String, String)], query: &str, k: usize) -> Vec<KeywordHit> {
    let tokens = tokenize_query(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<KeywordHit> = candidates
        .iter()
        .filter_map(|(chunk_id, content)| {
            let content_lower = content.to_lowercase();
            if !tokens.iter().any(|t| content_lower.contains(t.as_str())) {
                return None;
            }
            let score = score_candidate(&content_lower, &tokens);
            Some(KeywordHit {
                chunk_id: chunk_id.clone(),
                score,
            })
        })
        .collect();

    hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_drops_empty() {
        let tokens = tokenize_query("  Quick   Brown Fox ");
        assert_eq!(tokens, vec!["quick", "brown", "fox"]);
    }

    #[test]
    fn empty_query_yields_no_results() {
        let candidates = vec![("a".to_string(), "anything here".to_string())];
        assert!(search(&candidates, "   ", 5).is_empty());
    }

    #[test]
    fn scores_by_total_occurrences_and_breaks_ties_by_chunk_id() {
        let candidates = vec![
            ("b".to_string(), "fox fox fox".to_string()),
            ("a".to_string(), "fox fox fox".to_string()),
            ("c".to_string(), "fox".to_string()),
        ];
        let hits = search(&candidates, "fox", 3);
        assert_eq!(hits[0].chunk_id, "a");
        assert_eq!(hits[0].score, 3);
        assert_eq!(hits[1].chunk_id, "b");
        assert_eq!(hits[1].score, 3);
        assert_eq!(hits[2].chunk_id, "c");
        assert_eq!(hits[2].score, 1);
    }

    #[test]
    fn adding_a_token_never_removes_a_matching_chunk_below_the_cap() {
        let candidates = vec![
            ("a".to_string(), "the quick brown fox".to_string()),
            ("b".to_string(), "the lazy dog".to_string()),
        ];
        let before = search(&candidates, "quick", 10);
        let after = search(&candidates, "quick dog", 10);
        let before_ids: Vec<_> = before.iter().map(|h| h.chunk_id.clone()).collect();
        let after_ids: Vec<_> = after.iter().map(|h| h.chunk_id.clone()).collect();
        for id in before_ids {
            assert!(after_ids.contains(&id));
        }
    }
}
