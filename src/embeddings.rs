//! # Embedding backends
//!
//! Everything that turns text into vectors sits behind the [`Embedder`] trait, so the
//! index and retriever never care where vectors come from. Three backends ship:
//!
//! - [`OpenAiEmbedder`]: the hosted `POST {api_base}/embeddings` endpoint of any
//!   OpenAI-compatible service, with bounded retry and exponential backoff.
//! - [`SentenceEmbeddingsModel`]: `all-MiniLM-L6-v2` run locally through Candle. Weights
//!   come from the Hugging Face Hub on first use and are cached by `hf-hub`.
//! - [`HashingEmbedder`]: a deterministic lexical embedding with no I/O. Useful offline
//!   and in tests, where reproducible vectors matter more than semantic quality.
//!
//! Every failure is reported as [`CoachError::EmbeddingService`].

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use serde::{Deserialize, Serialize};
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
    time::Duration,
};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::config::{CoachConfig, EmbeddingBackend};
use crate::error::{CoachError, Result};

/// Converts text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Name of the model producing the vectors, for logs.
    fn model_name(&self) -> &str;
}

/// Build the embedder selected by `config.embedding_backend`.
///
/// # Errors
/// Returns [`CoachError::EmbeddingService`] when the local model cannot be loaded.
pub fn embedder_from_config(config: &CoachConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.embedding_backend {
        EmbeddingBackend::Remote => Arc::new(OpenAiEmbedder::new(
            config.api_key.clone(),
            config.api_base.clone(),
            config.embedding_model(),
            config.max_retries,
        )?),
        EmbeddingBackend::Local => Arc::new(SentenceEmbeddingsModel::load(&config.embedding_model())?),
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::default()),
    };
    info!(model = embedder.model_name(), "Embedding backend ready");
    Ok(embedder)
}

// ---------------------------------------------------------------------------
// Remote (OpenAI-compatible) embeddings
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    max_retries: u32,
}

impl OpenAiEmbedder {
    /// Create a client. `api_base` is the versioned root, e.g. `https://api.openai.com/v1`.
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
        max_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoachError::EmbeddingService(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_retries,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.api_base);
        debug!(%url, model = %self.model, "Requesting embedding");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                input: text,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| CoachError::EmbeddingService(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoachError::EmbeddingService(format!(
                "API error {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CoachError::EmbeddingService(format!("malformed response: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CoachError::EmbeddingService("response contained no embedding".into()))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0;
        loop {
            match self.request(text).await {
                Ok(vector) => return Ok(vector),
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                    warn!(attempt, max_retries = self.max_retries, error = %err, "Embedding request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Local sentence-transformer via Candle
// ---------------------------------------------------------------------------

fn local_err(context: &str) -> impl Fn(candle_core::Error) -> CoachError + '_ {
    move |e| CoachError::EmbeddingService(format!("{context}: {e}"))
}

/// Run CPU-bound embedding work on tokio's blocking pool.
async fn run_blocking<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| CoachError::EmbeddingService(format!("embedding task: {e}")))?
}

struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

/// Sentence embeddings computed in-process with Candle.
///
/// Inference runs on the blocking pool so a forward pass never stalls the async runtime.
pub struct SentenceEmbeddingsModel {
    encoder: Arc<BertEncoder>,
    model_id: String,
}

impl SentenceEmbeddingsModel {
    /// Default Hugging Face model id for local embeddings.
    pub const DEFAULT_MODEL_ID: &'static str = "sentence-transformers/all-MiniLM-L6-v2";

    /// Load `model_id` from the Hugging Face Hub (cached after the first download).
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;
        let hub_err = |e: hf_hub::api::sync::ApiError| {
            CoachError::EmbeddingService(format!("fetching {model_id}: {e}"))
        };

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
        let api = Api::new().map_err(hub_err)?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo.get("config.json").map_err(hub_err)?;
        let tokenizer_filename = api_repo.get("tokenizer.json").map_err(hub_err)?;
        let weights_filename = api_repo.get("model.safetensors").map_err(hub_err)?;

        let config = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&config)
            .map_err(|e| CoachError::EmbeddingService(format!("model config: {e}")))?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| CoachError::EmbeddingService(format!("tokenizer: {e}")))?;

        // SAFETY: the safetensors file is owned by the hf-hub cache and not mutated while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)
                .map_err(local_err("loading weights"))?
        };
        let model = BertModel::load(vb, &config).map_err(local_err("building model"))?;

        info!(model_id, "Loaded local sentence embedding model");

        Ok(Self {
            encoder: Arc::new(BertEncoder {
                model,
                tokenizer,
                device,
            }),
            model_id: model_id.to_string(),
        })
    }

    /// Embed `text` on the calling thread.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.encoder.encode(text)
    }
}

impl BertEncoder {
    /// Tokenize, run the model, mean-pool and L2-normalize.
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| CoachError::EmbeddingService(format!("tokenization: {e}")))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(local_err("token ids"))?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(local_err("token type ids"))?;

        let output = self
            .model
            .forward(&token_ids, &token_type_ids, None)
            .map_err(local_err("inference"))?;

        let pooled = self
            .mean_pooling(&output, tokens.get_attention_mask())
            .map_err(local_err("pooling"))?;
        let normalized = Self::normalize(&pooled).map_err(local_err("normalizing"))?;

        normalized.to_vec1::<f32>().map_err(local_err("reading vector"))
    }

    /// Mean over token embeddings, ignoring padding via the attention mask.
    fn mean_pooling(
        &self,
        embeddings: &Tensor,
        attention_mask: &[u32],
    ) -> candle_core::Result<Tensor> {
        // [1, seq_len, 1] so the mask broadcasts over the hidden dimension
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;

        sum.broadcast_div(&count)?.squeeze(0)
    }

    fn normalize(tensor: &Tensor) -> candle_core::Result<Tensor> {
        let norm = tensor.sqr()?.sum_all()?.sqrt()?;
        tensor.broadcast_div(&norm)
    }
}

#[async_trait]
impl Embedder for SentenceEmbeddingsModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoder = Arc::clone(&self.encoder);
        let text = text.to_owned();
        run_blocking(move || encoder.encode(&text)).await
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// ---------------------------------------------------------------------------
// Deterministic lexical embeddings
// ---------------------------------------------------------------------------

/// Feature-hashed bag of words, L2-normalized.
///
/// Each lowercase alphanumeric token is hashed into one of `dimension` buckets. Texts
/// sharing vocabulary score high under cosine similarity; identical input always yields
/// an identical vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.encode(text))
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.encode("How do I handle conflict at work?");
        let b = embedder.encode("How do I handle conflict at work?");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashing_embedder_handles_text_without_tokens() {
        let v = HashingEmbedder::new(8).encode("?!");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn remote_embedder_parses_vector() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("authorization", "Bearer test-key");
                then.status(200).json_body(json!({
                    "object": "list",
                    "data": [{ "object": "embedding", "index": 0, "embedding": [0.25, 0.5, 0.75] }],
                    "model": "text-embedding-3-small"
                }));
            })
            .await;

        let embedder =
            OpenAiEmbedder::new("test-key", server.base_url(), "text-embedding-3-small", 0)
                .unwrap();
        let vector = embedder.embed("hello").await.unwrap();

        mock.assert_async().await;
        assert_eq!(vector, vec![0.25, 0.5, 0.75]);
    }

    #[tokio::test]
    async fn remote_embedder_surfaces_auth_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(401)
                    .json_body(json!({ "error": { "message": "invalid api key" } }));
            })
            .await;

        let embedder =
            OpenAiEmbedder::new("bad-key", server.base_url(), "text-embedding-3-small", 0)
                .unwrap();
        let err = embedder.embed("hello").await.unwrap_err();

        assert!(matches!(err, CoachError::EmbeddingService(ref m) if m.contains("401")));
    }

    #[tokio::test]
    async fn remote_embedder_gives_up_after_retries() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(500).body("upstream unavailable");
            })
            .await;

        let embedder =
            OpenAiEmbedder::new("key", server.base_url(), "text-embedding-3-small", 2).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();

        assert!(matches!(err, CoachError::EmbeddingService(ref m) if m.contains("500")));
    }

    #[tokio::test]
    async fn blocking_work_runs_off_the_async_thread() {
        let caller = std::thread::current().id();
        let worker = run_blocking(|| Ok(std::thread::current().id()))
            .await
            .unwrap();
        assert_ne!(worker, caller);
    }

    #[tokio::test]
    async fn blocking_work_keeps_its_error_and_reports_panics() {
        let err = run_blocking::<Vec<f32>, _>(|| {
            Err(CoachError::EmbeddingService("tokenization: empty".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CoachError::EmbeddingService(ref m) if m == "tokenization: empty"));

        let err = run_blocking::<Vec<f32>, _>(|| panic!("inference crashed"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::EmbeddingService(ref m) if m.starts_with("embedding task")));
    }
}
