use uuid::Uuid;

use crate::stored_object;

stored_object!(EntityMention, "entity_mentions", {
    entity_id: String,
    chunk_id: String,
    mention_text: Option<String>,
    confidence: f32
});

impl EntityMention {
    pub fn new(entity_id: String, chunk_id: String, mention_text: Option<String>, confidence: f32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            entity_id,
            chunk_id,
            mention_text,
            confidence,
        }
    }
}
