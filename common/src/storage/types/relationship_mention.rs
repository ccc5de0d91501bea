use uuid::Uuid;

use crate::stored_object;

stored_object!(RelationshipMention, "relationship_mentions", {
    relationship_id: String,
    chunk_id: String,
    context: Option<String>,
    confidence: f32
});

impl RelationshipMention {
    pub fn new(relationship_id: String, chunk_id: String, context: Option<String>, confidence: f32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            relationship_id,
            chunk_id,
            context,
            confidence,
        }
    }
}
