use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    OpenAi,
    FastEmbed,
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::OpenAi
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    pub http_port: u16,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,

    // Ingest tuning (§4.7 step 3, §9 "width 8").
    #[serde(default = "default_chunk_size")]
    pub chunk_size_chars: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap_chars: usize,
    #[serde(default = "default_extraction_batch_width")]
    pub extraction_batch_width: usize,
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    // Per-call timeouts (§5 "every external call ... has a configurable timeout").
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_timeout_secs: u64,
    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: u64,

    // Retry/backoff tuning (§4.1 transient I/O retries, EXP-3).
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_extraction_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_extraction_batch_width() -> usize {
    8
}

fn default_embedding_batch_size() -> usize {
    64
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

fn default_extraction_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: String::new(),
            surrealdb_password: String::new(),
            surrealdb_namespace: "retrieval_core".to_string(),
            surrealdb_database: "retrieval_core".to_string(),
            data_dir: default_data_dir(),
            http_port: 8080,
            openai_base_url: default_base_url(),
            embedding_backend: default_embedding_backend(),
            embedding_model: default_embedding_model(),
            extraction_model: default_extraction_model(),
            chunk_size_chars: default_chunk_size(),
            chunk_overlap_chars: default_chunk_overlap(),
            extraction_batch_width: default_extraction_batch_width(),
            embedding_batch_size: default_embedding_batch_size(),
            embedding_timeout_secs: default_embedding_timeout_secs(),
            extraction_timeout_secs: default_extraction_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
