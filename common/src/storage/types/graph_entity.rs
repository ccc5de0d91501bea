use uuid::Uuid;

use crate::stored_object;

stored_object!(GraphEntity, "entities", {
    name: String,
    entity_type: String,
    description: Option<String>
});

impl GraphEntity {
    pub fn new(name: String, entity_type: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name,
            entity_type,
            description,
        }
    }

    /// Text handed to the embedder when building entity vectors (§4.8 step 4).
    pub fn embedding_input(&self) -> String {
        match &self.description {
            Some(description) if !description.trim().is_empty() => {
                format!("{}: {}", self.name, description)
            }
            _ => self.name.clone(),
        }
    }
}
