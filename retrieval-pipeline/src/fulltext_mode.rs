//! Fulltext mode (§4.9.2): an optional chat-model query rewrite into a
//! short keyword set, followed by the Keyword Index (§4.3).

use std::collections::HashSet;

use common::{
    error::AppError,
    storage::{chunk_store, db::SurrealDbClient, types::chunk::Chunk},
    utils::generation::{GenerationOptions, GenerationProvider},
};
use tracing::{instrument, warn};

use crate::{ChatTurn, RetrievedChunk, SearchOptions};

const REWRITE_TEMPERATURE: f32 = 0.2;
const REWRITE_MAX_TOKENS: u32 = 50;
const MIN_TOKEN_CHARS: usize = 3;
const MIN_REWRITE_CHARS: usize = 3;
const CONTEXT_TURNS: usize = 3;

#[instrument(skip(db, generator, options), fields(k))]
pub async fn run(
    db: &SurrealDbClient,
    generator: Option<&GenerationProvider>,
    query: &str,
    k: usize,
    options: &SearchOptions,
) -> Result<Vec<RetrievedChunk>, AppError> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let rewritten = match (generator, options.chat_model.as_deref()) {
        (Some(generator), Some(chat_model)) => rewrite_query(generator, chat_model, query, &options.chat_history).await,
        _ => query.to_string(),
    };

    let hits = chunk_store::keyword_search(db, &rewritten, k).await?;
    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        match Chunk::get(db, &hit.chunk_id).await? {
            #[allow(clippy::cast_precision_loss)]
            Some(chunk) => results.push(RetrievedChunk { chunk, score: hit.score as f32, graph: false, matched_entities: Vec::new() }),
            None => warn!(chunk_id = %hit.chunk_id, "keyword hit references a missing chunk; dropping"),
        }
    }
    Ok(results)
}

/// §4.9.2 step 1: ask the chat model for "3-7 keywords separated by spaces",
/// tolerating models that only populate the reasoning channel. Falls back to
/// the original query whenever the rewrite is empty, too short, or the
/// generation call itself fails.
async fn rewrite_query(generator: &GenerationProvider, chat_model: &str, query: &str, chat_history: &[ChatTurn]) -> String {
    let prompt = build_rewrite_prompt(query, chat_history);
    let options = GenerationOptions { temperature: REWRITE_TEMPERATURE, max_tokens: Some(REWRITE_MAX_TOKENS) };

    let response = match generator.generate(chat_model, &prompt, options).await {
        Ok(response) => response,
        Err(err) => {
            warn!(%err, "query rewrite call failed; falling back to the original query");
            return query.to_string();
        }
    };

    let Some(text) = response.text_or_reasoning() else {
        return query.to_string();
    };

    let rewritten = normalize_keywords(extract_keyword_span(text));
    if rewritten.chars().count() < MIN_REWRITE_CHARS {
        return query.to_string();
    }
    rewritten
}

fn build_rewrite_prompt(query: &str, chat_history: &[ChatTurn]) -> String {
    let context: Vec<&ChatTurn> = chat_history
        .iter()
        .filter(|turn| turn.role != "system")
        .rev()
        .take(CONTEXT_TURNS)
        .collect();

    let mut prompt = String::new();
    if !context.is_empty() {
        prompt.push_str("Conversation context:\n");
        for turn in context.into_iter().rev() {
            prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "Question: {query}\n\nRespond with 3-7 keywords separated by spaces, nothing else."
    ));
    prompt
}

/// The model sometimes wraps its answer in a sentence; take the text after
/// a "keywords:" marker if present, otherwise the final sentence.
fn extract_keyword_span(text: &str) -> &str {
    if let Some(pos) = text.to_lowercase().find("keywords:") {
        return text[pos + "keywords:".len()..].trim();
    }
    text.split(['.', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .next_back()
        .unwrap_or(text)
        .trim()
}

fn normalize_keywords(span: &str) -> String {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for token in span.to_lowercase().split_whitespace() {
        let cleaned: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
        if cleaned.chars().count() < MIN_TOKEN_CHARS {
            continue;
        }
        if seen.insert(cleaned.clone()) {
            ordered.push(cleaned);
        }
    }
    ordered.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_span_after_keywords_marker() {
        let text = "Sure thing! keywords: graph neural network training";
        assert_eq!(extract_keyword_span(text), "graph neural network training");
    }

    #[test]
    fn falls_back_to_final_sentence_without_marker() {
        let text = "Here is some reasoning. graph neural network";
        assert_eq!(extract_keyword_span(text), "graph neural network");
    }

    #[test]
    fn normalize_drops_short_tokens_and_dedupes() {
        let normalized = normalize_keywords("Graph graph ai network of things");
        assert_eq!(normalized, "graph network things");
    }
}
