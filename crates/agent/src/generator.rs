//! Text generator: a provider bound to one model and its sampling settings.

use cpmagent_config::ModelConfig;
use cpmagent_core::error::Result;
use cpmagent_core::message::Message;
use cpmagent_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use tracing::debug;

/// Turns a prompt into model output.
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
}

impl Generator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            top_p: None,
            max_tokens: None,
        }
    }

    /// Sampling settings taken from `[model]`.
    pub fn from_config(provider: Arc<dyn Provider>, config: &ModelConfig) -> Self {
        Self::new(provider, &config.name)
            .with_temperature(config.temperature)
            .with_top_p(config.top_p)
            .with_max_tokens(config.max_tokens)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// A request carrying this generator's model and sampling settings.
    pub fn request(&self, messages: Vec<Message>) -> ProviderRequest {
        let mut request = ProviderRequest::new(&self.model, messages);
        request.temperature = self.temperature;
        request.top_p = self.top_p;
        request.max_tokens = self.max_tokens;
        request
    }

    /// Send `prompt` as a single user message and return the reply text.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let request = self.request(vec![Message::user(prompt)]);
        let start = std::time::Instant::now();
        let response = self.provider.complete(request).await?;
        debug!(
            provider = self.provider.name(),
            model = %response.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = response.message.content.len(),
            "Generated text"
        );
        Ok(response.message.content)
    }
}
