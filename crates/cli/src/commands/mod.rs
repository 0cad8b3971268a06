//! Subcommand implementations and the wiring they share.

pub mod chat;
pub mod config_cmd;
#[cfg(feature = "local")]
pub mod download;
pub mod lookup;
pub mod run;
pub mod serve;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cpmagent_agent::{Generator, PlanExecuteAgent, ToolAgent};
use cpmagent_config::AppConfig;
use cpmagent_core::prompt::PromptLibrary;
use cpmagent_core::tool::ToolRegistry;

/// Load from an explicit path, or from the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => AppConfig::load().context("Failed to load config"),
    }
}

/// Provider, prompts and tools built once from the configuration.
pub struct Runtime {
    pub config: AppConfig,
    pub generator: Generator,
    pub prompts: Arc<PromptLibrary>,
    pub tools: Arc<ToolRegistry>,
}

impl Runtime {
    pub fn build(config: AppConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.gateway.request_timeout_secs);
        let provider = cpmagent_providers::build_provider(&config.model, timeout)
            .with_context(|| format!("Failed to set up provider '{}'", config.model.provider))?;
        let generator = Generator::from_config(provider, &config.model);

        let prompts = PromptLibrary::load(config.prompts.dir.as_deref())
            .context("Failed to load prompt templates")?;
        let tools = cpmagent_tools::default_registry(&config.tools);

        tracing::info!(
            provider = %config.model.provider,
            model = %config.model.name,
            tools = tools.len(),
            "Runtime ready"
        );

        Ok(Self {
            config,
            generator,
            prompts: Arc::new(prompts),
            tools: Arc::new(tools),
        })
    }

    pub fn plan_agent(&self) -> anyhow::Result<PlanExecuteAgent> {
        PlanExecuteAgent::from_config(self.generator.clone(), self.prompts.clone(), &self.config.agent)
            .context("Invalid agent configuration")
    }

    pub fn tool_agent(&self) -> ToolAgent {
        ToolAgent::from_config(
            self.generator.clone(),
            self.prompts.clone(),
            self.tools.clone(),
            &self.config.agent,
        )
    }
}
