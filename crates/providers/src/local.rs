//! Local inference provider: runs a GGUF model in-process.
//!
//! Uses [Candle](https://github.com/huggingface/candle) (Rust-native ML).
//! The model file comes from `model.path` when set, otherwise the
//! quantizations listed in `model.gguf_versions` are downloaded from the
//! Hugging Face hub repository `model.name` into `model.cache_dir`.
//!
//! Supported GGUF architectures: `llama` and `qwen2`. Other architectures
//! (MiniCPM included) are best served through the `llamacpp` provider.
//!
//! Generation is CPU/GPU-bound and blocking, so it runs on tokio's blocking
//! pool. The loaded model sits behind a mutex: concurrent requests are
//! served one at a time.

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama as qllama;
use candle_transformers::models::quantized_qwen2 as qqwen2;
use cpmagent_config::ModelConfig;
use cpmagent_core::error::ProviderError;
use cpmagent_core::message::{Message, Role};
use cpmagent_core::provider::{ProviderRequest, ProviderResponse, Usage};
use hf_hub::api::sync::{Api, ApiBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::model_files;

const SEED: u64 = 299_792_458;

/// Where the weights come from and how to run them.
#[derive(Debug, Clone)]
pub struct LocalModelSpec {
    pub repo: String,
    pub path: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub gguf_versions: Vec<String>,
    pub tokenizer_repo: String,
    pub device: String,
    pub repeat_penalty: f32,
}

impl LocalModelSpec {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            repo: config.name.clone(),
            path: config.path.clone(),
            cache_dir: config.cache_dir.clone(),
            gguf_versions: config.gguf_versions.clone(),
            tokenizer_repo: config.tokenizer_repo.clone(),
            device: config.device.clone(),
            repeat_penalty: config.repeat_penalty,
        }
    }
}

// ── Model acquisition ──────────────────────────────────────────────────

fn hub_api(cache_dir: &Path) -> Result<Api, ProviderError> {
    ApiBuilder::new()
        .with_cache_dir(cache_dir.to_path_buf())
        .build()
        .map_err(|e| ProviderError::Network(format!("Failed to initialize Hugging Face Hub API: {e}")))
}

/// Download the GGUF files matching the configured quantization versions.
///
/// Returns the local paths of every downloaded file. Files already in the
/// cache are not fetched again.
pub fn download_model_files(spec: &LocalModelSpec) -> Result<Vec<PathBuf>, ProviderError> {
    let patterns = model_files::allow_patterns(&spec.gguf_versions)?;
    info!(repo = %spec.repo, cache_dir = %spec.cache_dir.display(), versions = ?spec.gguf_versions, "Downloading model files");

    let api = hub_api(&spec.cache_dir)?;
    let repo = api.model(spec.repo.clone());
    let repo_info = repo
        .info()
        .map_err(|e| ProviderError::ModelNotFound(format!("{}: {e}", spec.repo)))?;

    let wanted: Vec<String> = repo_info
        .siblings
        .into_iter()
        .map(|s| s.rfilename)
        .filter(|name| model_files::matches_any(name, &patterns))
        .collect();

    if wanted.is_empty() {
        return Err(ProviderError::ModelNotFound(format!(
            "No GGUF file in '{}' matches versions {:?}",
            spec.repo, spec.gguf_versions
        )));
    }

    let mut paths = Vec::with_capacity(wanted.len());
    for file in &wanted {
        let path = repo.get(file).map_err(|e| {
            ProviderError::Network(format!("Failed to download '{file}' from '{}': {e}", spec.repo))
        })?;
        info!(path = %path.display(), "Model file ready");
        paths.push(path);
    }
    Ok(paths)
}

/// Resolve the GGUF file to load, downloading it when no local path is configured.
pub fn resolve_model_file(spec: &LocalModelSpec) -> Result<PathBuf, ProviderError> {
    if let Some(path) = &spec.path {
        return model_files::resolve_local_path(path).ok_or_else(|| {
            ProviderError::ModelNotFound(format!("No model file found at {}", path.display()))
        });
    }

    let downloaded = download_model_files(spec)?;
    downloaded
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ModelNotFound(spec.repo.clone()))
}

fn load_tokenizer(model_path: &Path, spec: &LocalModelSpec) -> Result<Tokenizer, ProviderError> {
    let beside = model_path.with_file_name("tokenizer.json");
    let tokenizer_path = if beside.exists() {
        beside
    } else {
        debug!(repo = %spec.tokenizer_repo, "No tokenizer.json next to model file, downloading");
        hub_api(&spec.cache_dir)?
            .model(spec.tokenizer_repo.clone())
            .get("tokenizer.json")
            .map_err(|e| {
                ProviderError::Network(format!(
                    "Failed to download tokenizer from '{}': {e}",
                    spec.tokenizer_repo
                ))
            })?
    };

    Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to load tokenizer: {e}")))
}

fn select_device(name: &str) -> Result<Device, ProviderError> {
    let device = match name {
        "cpu" => Device::Cpu,
        "cuda" => Device::new_cuda(0).map_err(map_candle_err)?,
        "metal" => Device::new_metal(0).map_err(map_candle_err)?,
        "auto" => Device::cuda_if_available(0).unwrap_or(Device::Cpu),
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "Unknown device '{other}', expected auto, cpu, cuda or metal"
            )));
        }
    };
    Ok(device)
}

// ── Loaded model ───────────────────────────────────────────────────────

enum Weights {
    Llama(qllama::ModelWeights),
    Qwen2(qqwen2::ModelWeights),
}

impl Weights {
    fn forward(&mut self, input: &Tensor, index_pos: usize) -> candle_core::Result<Tensor> {
        match self {
            Weights::Llama(m) => m.forward(input, index_pos),
            Weights::Qwen2(m) => m.forward(input, index_pos),
        }
    }
}

/// The loaded model state (tokenizer + weights).
struct LocalModelState {
    weights: Weights,
    tokenizer: Tokenizer,
    device: Device,
    stop_token_ids: Vec<u32>,
    repeat_penalty: f32,
}

impl LocalModelState {
    fn load(spec: &LocalModelSpec) -> Result<Self, ProviderError> {
        let device = select_device(&spec.device)?;
        let model_path = resolve_model_file(spec)?;
        info!(path = %model_path.display(), ?device, "Loading local GGUF model");

        let mut file = std::fs::File::open(&model_path)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to open model file: {e}")))?;

        let gguf = gguf_file::Content::read(&mut file)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to parse GGUF file: {e}")))?;

        let arch = gguf
            .metadata
            .get("general.architecture")
            .and_then(|v| v.to_string().ok())
            .cloned()
            .unwrap_or_else(|| "llama".into());

        let weights = match arch.as_str() {
            "llama" => Weights::Llama(
                qllama::ModelWeights::from_gguf(gguf, &mut file, &device).map_err(map_candle_err)?,
            ),
            "qwen2" => Weights::Qwen2(
                qqwen2::ModelWeights::from_gguf(gguf, &mut file, &device).map_err(map_candle_err)?,
            ),
            other => {
                return Err(ProviderError::ModelNotFound(format!(
                    "GGUF architecture '{other}' is not supported in-process; serve it with llama.cpp instead"
                )));
            }
        };

        let tokenizer = load_tokenizer(&model_path, spec)?;

        let stop_token_ids: Vec<u32> = ["</s>", "<|endoftext|>", "<|im_end|>", "<|eot_id|>"]
            .iter()
            .filter_map(|t| tokenizer.token_to_id(t))
            .collect();
        if stop_token_ids.is_empty() {
            warn!("Tokenizer has no known end-of-sequence token; generation stops at max_tokens");
        }

        info!(arch = %arch, stop_tokens = stop_token_ids.len(), "Local model loaded");

        Ok(Self {
            weights,
            tokenizer,
            device,
            stop_token_ids,
            repeat_penalty: spec.repeat_penalty,
        })
    }

    /// Run inference: tokenize → generate tokens → decode.
    fn generate(
        &mut self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
        top_p: Option<f32>,
    ) -> Result<(String, u32, u32), ProviderError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ProviderError::Inference(format!("Tokenization failed: {e}")))?;

        let prompt_tokens = encoding.get_ids().to_vec();
        let prompt_token_count = prompt_tokens.len() as u32;

        debug!(
            prompt_tokens = prompt_token_count,
            max_tokens,
            temperature,
            "Starting local generation"
        );

        let temperature = (temperature > 0.0).then_some(temperature as f64);
        let mut logits_processor =
            LogitsProcessor::new(SEED, temperature, top_p.map(|p| p as f64));

        let mut generated: Vec<u32> = Vec::new();
        let mut input = Tensor::new(prompt_tokens.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle_err)?;
        let mut index_pos = 0;

        for _ in 0..max_tokens {
            let seq_len = input.dim(1).map_err(map_candle_err)?;
            let logits = self
                .weights
                .forward(&input, index_pos)
                .and_then(|l| l.squeeze(0))
                .map_err(map_candle_err)?;
            index_pos += seq_len;

            let logits = if (self.repeat_penalty - 1.0).abs() > f32::EPSILON && !generated.is_empty() {
                candle_transformers::utils::apply_repeat_penalty(&logits, self.repeat_penalty, &generated)
                    .map_err(map_candle_err)?
            } else {
                logits
            };

            let next_token = logits_processor.sample(&logits).map_err(map_candle_err)?;
            if self.stop_token_ids.contains(&next_token) {
                break;
            }
            generated.push(next_token);

            input = Tensor::new(&[next_token][..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(map_candle_err)?;
        }

        let completion_token_count = generated.len() as u32;
        let output = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| ProviderError::Inference(format!("Detokenization failed: {e}")))?;

        debug!(completion_tokens = completion_token_count, "Generation complete");
        Ok((output, prompt_token_count, completion_token_count))
    }
}

/// ChatML, the template used by MiniCPM, Qwen2 and most small instruct models.
fn format_chatml(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "user", // tool results become user messages
        };
        prompt.push_str("<|im_start|>");
        prompt.push_str(role);
        prompt.push('\n');
        if msg.role == Role::Tool {
            prompt.push_str("[Tool Result] ");
        }
        prompt.push_str(&msg.content);
        prompt.push_str("<|im_end|>\n");
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

/// Map Candle errors to ProviderError.
fn map_candle_err(e: candle_core::Error) -> ProviderError {
    ProviderError::Inference(e.to_string())
}

// ── Local Provider ─────────────────────────────────────────────────────

/// A provider that runs a GGUF-quantized model in-process via Candle.
///
/// The model is loaded lazily on the first request.
pub struct LocalProvider {
    inner: Arc<Mutex<Option<LocalModelState>>>,
    spec: LocalModelSpec,
}

impl LocalProvider {
    pub fn new(spec: LocalModelSpec) -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            spec,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(LocalModelSpec::from_config(config))
    }

    /// Eagerly load the model (downloads if needed, then loads into memory).
    pub fn load(spec: LocalModelSpec) -> Result<Self, ProviderError> {
        let state = LocalModelState::load(&spec)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Some(state))),
            spec,
        })
    }
}

#[async_trait]
impl cpmagent_core::provider::Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let max_tokens = request.max_tokens.unwrap_or(512);
        let temperature = request.temperature;
        let top_p = request.top_p;
        let prompt = format_chatml(&request.messages);
        let spec = self.spec.clone();

        // The owned guard keeps loading and generation serialized across requests.
        let mut guard = self.inner.clone().lock_owned().await;
        let (output, prompt_tokens, completion_tokens) = tokio::task::spawn_blocking(move || {
            if guard.is_none() {
                info!(repo = %spec.repo, "Loading local model on first request");
                *guard = Some(LocalModelState::load(&spec)?);
            }
            match guard.as_mut() {
                Some(state) => state.generate(&prompt, max_tokens, temperature, top_p),
                None => Err(ProviderError::NotConfigured("local model is not loaded".into())),
            }
        })
        .await
        .map_err(|e| ProviderError::Inference(format!("Inference task failed: {e}")))??;

        let clean_output = output
            .trim()
            .trim_end_matches("</s>")
            .trim_end_matches("<|im_end|>")
            .trim()
            .to_string();

        let mut metadata = serde_json::Map::new();
        metadata.insert("provider".into(), serde_json::Value::String("local".into()));
        metadata.insert("engine".into(), serde_json::Value::String("candle".into()));

        Ok(ProviderResponse {
            message: Message::assistant(clean_output),
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
            model: format!("local/{}", request.model),
            metadata,
        })
    }
}
