//! Extractor (§4.6): turns one chunk's text into a normalized
//! `{entities, relationships}` structure by calling an external language
//! model with a fixed prompt, then running its output through a tolerant
//! JSON-repair cascade and an ontology validation pass.

use std::str::FromStr;

use common::{
    error::AppError,
    ontology::{EntityType, RelationshipType},
    utils::generation::{GenerationOptions, GenerationProvider},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{instrument, warn};

#[derive(Debug, Clone)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: EntityType,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    pub relationship_type: RelationshipType,
    pub description: Option<String>,
    pub weight: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
}

const EXTRACTION_TEMPERATURE: f32 = 0.1;

pub struct Extractor {
    client: GenerationProvider,
    model: String,
}

impl Extractor {
    pub fn new(client: GenerationProvider, model: String) -> Self {
        Self { client, model }
    }

    /// §4.6 steps 1-5, for a single chunk of text. Never fails the batch: a
    /// chunk whose output cannot be salvaged into anything ontology-valid
    /// yields an empty `ExtractionResult` rather than an `Err`, so the
    /// caller's per-chunk state machine can record it as `skipped` rather
    /// than retrying (§4.8).
    #[instrument(skip(self, chunk_text), fields(chars = chunk_text.len()))]
    pub async fn extract(&self, chunk_text: &str) -> Result<ExtractionResult, AppError> {
        let prompt = build_prompt(chunk_text);
        let response = self
            .client
            .generate(&self.model, &prompt, GenerationOptions { temperature: EXTRACTION_TEMPERATURE, max_tokens: Some(1500) })
            .await?;

        let Some(raw) = response.text_or_reasoning() else {
            warn!("extraction model returned neither a response nor a reasoning field; skipping chunk");
            return Ok(ExtractionResult::default());
        };

        let Some(candidate) = extract_json_object(raw) else {
            warn!("extraction output had no recoverable JSON object; skipping chunk");
            return Ok(ExtractionResult::default());
        };

        let parsed = match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => value,
            Err(first_err) => {
                let repaired = repair_json(&candidate);
                match json_stream_parser::parse_stream(&repaired) {
                    Ok(value) => value,
                    Err(second_err) => {
                        warn!(%first_err, %second_err, "extraction JSON repair cascade exhausted; skipping chunk");
                        return Ok(ExtractionResult::default());
                    }
                }
            }
        };

        Ok(validate(parsed))
    }
}

fn build_prompt(chunk_text: &str) -> String {
    let entity_types = EntityType::ALL.iter().map(EntityType::as_str).collect::<Vec<_>>().join(", ");
    let relationship_types = RelationshipType::ALL.iter().map(RelationshipType::as_str).collect::<Vec<_>>().join(", ");

    format!(
        "Extract entities and relationships from the text below. Respond with a single JSON object \
         of the shape {{\"entities\": [{{\"name\": str, \"type\": str, \"description\": str?}}], \
         \"relationships\": [{{\"source\": str, \"target\": str, \"type\": str, \"description\": str?}}]}}. \
         Use only these entity types: {entity_types}. Use only these relationship types: {relationship_types}. \
         `source` and `target` must be names from the `entities` list. Respond with JSON only, no prose, no \
         Markdown fences.\n\nTEXT:\n{chunk_text}"
    )
}

/// §4.6 step 3: strip Markdown code fences, then take the substring between
/// the first `{` and the last `}`.
fn extract_json_object(raw: &str) -> Option<String> {
    let without_fences = strip_code_fences(raw);
    let start = without_fences.find('{')?;
    let end = without_fences.rfind('}')?;
    if end < start {
        return None;
    }
    Some(without_fences[start..=end].to_string())
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let after_open = after_open.strip_prefix("json").unwrap_or(after_open);
    after_open.rfind("```").map_or(after_open, |end| &after_open[..end]).trim()
}

/// §4.6 step 4: repair single-quoted strings, trailing commas, and bare
/// property names. Applied once, as a plain string transform, before the
/// fallback tolerant parse.
fn repair_json(candidate: &str) -> String {
    let quoted = requote_single_quotes(candidate);
    let bare_keys_quoted = quote_bare_keys(&quoted);
    strip_trailing_commas(&bare_keys_quoted)
}

fn requote_single_quotes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_double = false;
    let mut escaped = false;
    for ch in input.chars() {
        match ch {
            '"' if !escaped => {
                in_double = !in_double;
                out.push(ch);
            }
            '\'' if !in_double => out.push('"'),
            '\\' if !escaped => {
                escaped = true;
                out.push(ch);
                continue;
            }
            _ => out.push(ch),
        }
        escaped = false;
    }
    out
}

fn quote_bare_keys(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        let preceding_is_key_position = matches!(out.trim_end().chars().last(), Some('{') | Some(','));
        if preceding_is_key_position && (ch.is_alphabetic() || ch == '_') {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let next_non_space = chars[i..].iter().find(|c| !c.is_whitespace());
            if next_non_space == Some(&':') {
                out.push('"');
                out.push_str(&word);
                out.push('"');
                continue;
            }
            out.push_str(&word);
            continue;
        }
        out.push(ch);
        i += 1;
    }
    out
}

fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    for (i, &ch) in chars.iter().enumerate() {
        if ch == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if matches!(chars.get(j), Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

#[derive(Deserialize)]
struct RawEntity {
    name: Option<String>,
    #[serde(rename = "type")]
    entity_type: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct RawRelationship {
    source: Option<String>,
    target: Option<String>,
    #[serde(rename = "type")]
    relationship_type: Option<String>,
    description: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Deserialize, Default)]
struct RawExtraction {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
}

/// §4.6 step 5: every entity needs a name and an ontology-valid type; every
/// relationship needs source/target that both appear among the extracted
/// entity names, an ontology-valid type, and a (source-type, target-type)
/// pair the ontology permits for that relationship type. Invalid items are
/// silently discarded rather than failing the whole chunk.
fn validate(value: Value) -> ExtractionResult {
    let raw: RawExtraction = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(_) => return ExtractionResult::default(),
    };

    let mut entities = Vec::new();
    let mut entity_types_by_name = std::collections::HashMap::new();
    for raw_entity in raw.entities {
        let Some(name) = raw_entity.name.filter(|n| !n.trim().is_empty()) else { continue };
        let Some(type_str) = raw_entity.entity_type else { continue };
        let Ok(entity_type) = EntityType::from_str(&type_str) else { continue };
        entity_types_by_name.insert(name.clone(), entity_type);
        entities.push(ExtractedEntity { name, entity_type, description: raw_entity.description });
    }

    let mut relationships = Vec::new();
    for raw_relationship in raw.relationships {
        let Some(source) = raw_relationship.source else { continue };
        let Some(target) = raw_relationship.target else { continue };
        let Some(type_str) = raw_relationship.relationship_type else { continue };
        let Ok(relationship_type) = RelationshipType::from_str(&type_str) else { continue };
        let Some(&source_type) = entity_types_by_name.get(&source) else { continue };
        let Some(&target_type) = entity_types_by_name.get(&target) else { continue };
        if !relationship_type.permits(source_type, target_type) {
            continue;
        }
        relationships.push(ExtractedRelationship {
            source,
            target,
            relationship_type,
            description: raw_relationship.description,
            weight: raw_relationship.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
        });
    }

    ExtractionResult { entities, relationships }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_object_strips_fences_and_prose() {
        let raw = "Sure, here it is:\n```json\n{\"entities\": [], \"relationships\": []}\n```\nHope that helps.";
        let extracted = extract_json_object(raw).expect("object found");
        assert_eq!(extracted, "{\"entities\": [], \"relationships\": []}");
    }

    #[test]
    fn repair_json_fixes_single_quotes_bare_keys_and_trailing_commas() {
        let broken = "{entities: [{'name': 'Kant', 'type': 'PERSON',}], relationships: [],}";
        let repaired = repair_json(broken);
        let value: Value = serde_json::from_str(&repaired).expect("valid after repair");
        assert_eq!(value["entities"][0]["name"], "Kant");
    }

    #[test]
    fn validate_drops_relationships_with_unknown_endpoints() {
        let value = serde_json::json!({
            "entities": [{"name": "Kant", "type": "PERSON"}],
            "relationships": [{"source": "Kant", "target": "Ghost", "type": "RELATED_TO"}],
        });
        let result = validate(value);
        assert_eq!(result.entities.len(), 1);
        assert!(result.relationships.is_empty());
    }

    #[test]
    fn validate_drops_relationships_violating_ontology_pairing() {
        let value = serde_json::json!({
            "entities": [
                {"name": "Kant", "type": "PERSON"},
                {"name": "CorpusX", "type": "DATASET"},
            ],
            "relationships": [{"source": "Kant", "target": "CorpusX", "type": "AUTHORED"}],
        });
        let result = validate(value);
        assert!(result.relationships.is_empty());
    }

    #[test]
    fn validate_keeps_permitted_relationship() {
        let value = serde_json::json!({
            "entities": [
                {"name": "Kant", "type": "PERSON"},
                {"name": "Critique of Pure Reason", "type": "PAPER"},
            ],
            "relationships": [{"source": "Kant", "target": "Critique of Pure Reason", "type": "AUTHORED", "confidence": 0.9}],
        });
        let result = validate(value);
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].weight, 0.9);
    }
}
