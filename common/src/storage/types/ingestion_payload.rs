use serde::{Deserialize, Serialize};

/// The durable work item a queued `IngestionTask` carries (EXP-3
/// worker/queue separation).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestionPayload {
    Ingest { source_path: String },
    BuildGraph { source_path: String, extraction_model: String },
}

impl IngestionPayload {
    pub fn source_path(&self) -> &str {
        match self {
            IngestionPayload::Ingest { source_path } => source_path,
            IngestionPayload::BuildGraph { source_path, .. } => source_path,
        }
    }
}
