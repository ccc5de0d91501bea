use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid source path: {0}")]
    InvalidPath(String),

    #[error("embedding service error: {0}")]
    EmbeddingServiceError(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("extraction parse failure: {0}")]
    ExtractionParseFailure(String),

    #[error("ontology violation: {0}")]
    OntologyViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("embedding model not installed: {0}")]
    ModelNotInstalled(String),

    #[error("internal storage error: {0}")]
    InternalStorageError(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("processing error: {0}")]
    Processing(String),

    #[error("database error: {0}")]
    Database(#[from] surrealdb::Error),

    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),

    #[error("task join error: {0}")]
    Join(#[from] JoinError),
}

impl AppError {
    /// Whether retrying the operation that produced this error could plausibly succeed.
    ///
    /// Validation/ontology/format errors are permanent; everything else is assumed
    /// to be a transient condition worth a bounded retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AppError::Validation(_)
                | AppError::UnsupportedFormat(_)
                | AppError::InvalidPath(_)
                | AppError::OntologyViolation(_)
                | AppError::NotFound(_)
                | AppError::ModelNotInstalled(_)
        )
    }
}
