//! Graph-augmentation merge (§4.9.4 step 4): dedupe by chunk id while
//! preserving insertion order — `base` keeps its order, then `additional`
//! entries are appended in their own order, skipping anything already seen.

use std::collections::HashSet;

use crate::RetrievedChunk;

pub fn dedupe_preserving_order(base: Vec<RetrievedChunk>, additional: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    let mut seen: HashSet<String> = base.iter().map(|r| r.chunk.id.clone()).collect();
    let mut merged = base;
    for candidate in additional {
        if seen.insert(candidate.chunk.id.clone()) {
            merged.push(candidate);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::chunk::Chunk;

    fn chunk_result(id: &str, graph: bool) -> RetrievedChunk {
        let mut chunk = Chunk::new("doc".into(), 0, None, "content".into());
        chunk.id = id.to_string();
        RetrievedChunk { chunk, score: 1.0, graph, matched_entities: Vec::new() }
    }

    #[test]
    fn base_order_is_preserved_and_duplicates_dropped() {
        let base = vec![chunk_result("a", false), chunk_result("b", false)];
        let additional = vec![chunk_result("b", true), chunk_result("c", true)];

        let merged = dedupe_preserving_order(base, additional);
        let ids: Vec<_> = merged.iter().map(|r| r.chunk.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(!merged[1].graph, "the base hit for b must win over the graph duplicate");
    }
}
