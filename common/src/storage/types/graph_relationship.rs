use uuid::Uuid;

use crate::stored_object;

stored_object!(GraphRelationship, "relationships", {
    source_entity_id: String,
    target_entity_id: String,
    relationship_type: String,
    description: Option<String>,
    weight: f32
});

impl GraphRelationship {
    pub fn new(
        source_entity_id: String,
        target_entity_id: String,
        relationship_type: String,
        description: Option<String>,
        weight: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source_entity_id,
            target_entity_id,
            relationship_type,
            description,
            weight,
        }
    }
}
