use std::sync::Arc;

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;
use tracing::instrument;

use crate::{error::AppError, utils::config::AppConfig};

/// Abstraction over the embedding backend selected by configuration.
///
/// Exactly one `EmbeddingProvider` is wired up per process. It does not itself
/// enforce the single-active-model invariant (I1) — that is the Model
/// Governor's job (`crate::governor`); this type only knows how to turn text
/// into vectors of its fixed dimension.
#[derive(Clone)]
pub struct EmbeddingProvider {
    backend: Backend,
    dimension: usize,
    model_name: String,
}

#[derive(Clone)]
enum Backend {
    OpenAi {
        client: Arc<Client<OpenAIConfig>>,
    },
    FastEmbed {
        model: Arc<Mutex<TextEmbedding>>,
    },
    /// Deterministic, offline backend used by tests: hashes the input text into
    /// a unit vector of the requested dimension. Never calls out to a network
    /// or a local model runtime.
    Hashed,
}

impl EmbeddingProvider {
    /// Build a provider from configuration. `shared_client`, when present, is
    /// reused instead of constructing a fresh OpenAI client (the same client
    /// used for extraction/query-rewriting generation calls).
    pub async fn from_config(
        config: &AppConfig,
        shared_client: Option<Arc<Client<OpenAIConfig>>>,
    ) -> Result<Self, AppError> {
        match config.embedding_backend {
            crate::utils::config::EmbeddingBackend::OpenAi => {
                let client = shared_client.unwrap_or_else(|| {
                    let openai_config = OpenAIConfig::new()
                        .with_api_key(config.openai_api_key.clone())
                        .with_api_base(config.openai_base_url.clone());
                    Arc::new(Client::with_config(openai_config))
                });

                let dimension = openai_model_dimension(&config.embedding_model)?;

                Ok(Self {
                    backend: Backend::OpenAi { client },
                    dimension,
                    model_name: config.embedding_model.clone(),
                })
            }
            crate::utils::config::EmbeddingBackend::FastEmbed => {
                let fastembed_model = fastembed_model_for_name(&config.embedding_model)?;
                let model = TextEmbedding::try_new(
                    InitOptions::new(fastembed_model).with_show_download_progress(false),
                )
                .map_err(|err| AppError::ModelNotInstalled(err.to_string()))?;
                let dimension = model
                    .embed(vec!["dimension probe"], None)
                    .map_err(|err| AppError::EmbeddingServiceError(err.to_string()))?
                    .first()
                    .map(Vec::len)
                    .ok_or_else(|| {
                        AppError::EmbeddingServiceError("empty probe embedding".to_string())
                    })?;

                Ok(Self {
                    backend: Backend::FastEmbed {
                        model: Arc::new(Mutex::new(model)),
                    },
                    dimension,
                    model_name: config.embedding_model.clone(),
                })
            }
        }
    }

    /// A deterministic, network-free provider for tests. Each distinct input
    /// string hashes to a stable unit vector of `dimension` floats.
    pub fn new_hashed(dimension: usize) -> Self {
        Self {
            backend: Backend::Hashed,
            dimension,
            model_name: "hashed-test-embeddings".to_string(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn backend_label(&self) -> String {
        match &self.backend {
            Backend::OpenAi { .. } => format!("openai:{}", self.model_name),
            Backend::FastEmbed { .. } => format!("fastembed:{}", self.model_name),
            Backend::Hashed => "hashed".to_string(),
        }
    }

    #[instrument(skip_all, fields(chars = text.len()))]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let mut batch = self
            .embed_batch(std::slice::from_ref(&text.to_string()))
            .await?;
        batch
            .pop()
            .ok_or_else(|| AppError::EmbeddingServiceError("empty embedding batch".to_string()))
    }

    #[instrument(skip_all, fields(batch_size = texts.len()))]
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = match &self.backend {
            Backend::OpenAi { client } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(self.model_name.clone())
                    .input(texts.to_vec())
                    .build()
                    .map_err(AppError::OpenAI)?;

                let response = client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(|err| AppError::EmbeddingServiceError(err.to_string()))?;

                response
                    .data
                    .into_iter()
                    .map(|d| d.embedding)
                    .collect::<Vec<_>>()
            }
            Backend::FastEmbed { model } => {
                let mut model = model.lock().await;
                let owned: Vec<String> = texts.to_vec();
                model
                    .embed(owned, None)
                    .map_err(|err| AppError::EmbeddingServiceError(err.to_string()))?
            }
            Backend::Hashed => texts
                .iter()
                .map(|t| hashed_embedding(t, self.dimension))
                .collect(),
        };

        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(AppError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        Ok(vectors)
    }
}

fn openai_model_dimension(model: &str) -> Result<usize, AppError> {
    match model {
        "text-embedding-3-small" => Ok(1536),
        "text-embedding-3-large" => Ok(3072),
        "text-embedding-ada-002" => Ok(1536),
        other => Err(AppError::ModelNotInstalled(format!(
            "unknown OpenAI embedding model dimension for {other}"
        ))),
    }
}

fn fastembed_model_for_name(model: &str) -> Result<EmbeddingModel, AppError> {
    match model {
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => Err(AppError::ModelNotInstalled(format!(
            "unknown FastEmbed model {other}"
        ))),
    }
}

/// Deterministic hash-based unit vector. Not a real embedding space: only
/// useful for exercising index/store plumbing in tests without network I/O.
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = Vec::with_capacity(dimension);
    let bytes = text.as_bytes();
    let mut state: u64 = 1_469_598_103_934_665_603; // FNV offset basis
    for i in 0..dimension {
        for &b in bytes {
            state ^= u64::from(b);
            state = state.wrapping_mul(1_099_511_628_211).wrapping_add(i as u64);
        }
        // map to [-1, 1]
        let scaled = (state % 2_000_001) as f32 / 1_000_000.0 - 1.0;
        vector.push(scaled);
    }

    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_provider_is_deterministic_and_correctly_dimensioned() {
        let provider = EmbeddingProvider::new_hashed(16);
        let a = provider.embed("hello world").await.expect("embed");
        let b = provider.embed("hello world").await.expect("embed");
        let c = provider.embed("goodbye world").await.expect("embed");

        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn hashed_provider_embeds_batches() {
        let provider = EmbeddingProvider::new_hashed(8);
        let batch = provider
            .embed_batch(&["one".to_string(), "two".to_string()])
            .await
            .expect("batch embed");
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|v| v.len() == 8));
    }
}
