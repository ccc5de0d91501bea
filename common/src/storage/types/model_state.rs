use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Singleton row holding the currently active embedding model (§4.10). The
/// Model Governor is the only component permitted to write this.
stored_object!(ModelState, "model_state", {
    active_model: String,
    dimension: u32
});

const SINGLETON_ID: &str = "current";

impl ModelState {
    pub fn new(active_model: String, dimension: u32) -> Self {
        let now = Utc::now();
        Self {
            id: SINGLETON_ID.to_string(),
            created_at: now,
            updated_at: now,
            active_model,
            dimension,
        }
    }

    pub async fn get_current(db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        Ok(db.get_item(SINGLETON_ID).await?)
    }

    pub async fn set_current(
        db: &SurrealDbClient,
        active_model: String,
        dimension: u32,
    ) -> Result<Self, AppError> {
        let state = Self::new(active_model, dimension);
        let stored: Option<Self> = db
            .client
            .query("UPDATE type::thing('model_state', $id) CONTENT $content RETURN AFTER")
            .bind(("id", SINGLETON_ID))
            .bind(("content", state))
            .await?
            .take(0)?;
        stored.ok_or_else(|| AppError::InternalStorageError("failed to set model state".into()))
    }
}
